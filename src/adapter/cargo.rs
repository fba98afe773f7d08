//! Bencher-format output from `cargo bench`.
//!
//! Both libtest's `#[bench]` harness and Criterion with
//! `--output-format bencher` print one line per benchmark:
//!
//! ```text
//! test end-to-end/wasmtime/wasi-demo-app:latest ... bench:   955,306,575 ns/iter (+/- 112,112,717)
//! ```
//!
//! Any other line (build output, progress, summaries) is ignored.

use std::sync::LazyLock;

use regex::Regex;

use super::Adapter;
use crate::data::{Measurement, Tool};
use crate::error::{BenchError, BenchResult};

static BENCH_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^test (.+) \.\.\. bench:\s+([0-9,.]+) (\S+) \(\+/- ([0-9,.]+)\)\s*$")
        .expect("BENCH_LINE regex should compile")
});

pub struct CargoAdapter;

impl Adapter for CargoAdapter {
    fn tool(&self) -> Tool {
        Tool::Cargo
    }

    fn parse(&self, raw: &[u8]) -> BenchResult<Vec<Measurement>> {
        let text = std::str::from_utf8(raw)
            .map_err(|e| BenchError::parse("cargo", e.valid_up_to(), "output is not UTF-8"))?;

        let mut results = Vec::new();
        let mut offset = 0;
        for line in text.split_inclusive('\n') {
            let line_offset = offset;
            offset += line.len();

            let line = line.trim_end_matches(['\r', '\n']);
            if !line.starts_with("test ") || !line.contains(" ... bench:") {
                continue;
            }

            let caps = BENCH_LINE
                .captures(line)
                .ok_or_else(|| BenchError::parse("cargo", line_offset, "malformed bench line"))?;

            let value = parse_number(&caps[2]).ok_or_else(|| {
                let start = caps.get(2).map_or(0, |m| m.start());
                BenchError::parse("cargo", line_offset + start, "bad value")
            })?;
            let range = caps[4].replace(',', "");

            results.push(
                Measurement::new(caps[1].trim(), value, &caps[3]).with_range(format!("± {range}")),
            );
        }

        Ok(results)
    }
}

fn parse_number(text: &str) -> Option<f64> {
    text.replace(',', "").parse().ok()
}
