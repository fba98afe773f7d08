//! Converts raw benchmark tool output into measurements.
//!
//! Each tool id (`cargo`, `customBiggerIsBetter`, `heyLatency`, ...) has one
//! `Adapter`; `parse` picks it from a fixed table. The adapter also decides
//! which `Tool` the entry is stored under. Parsing is all-or-nothing: any
//! malformed record fails the whole payload.

mod cargo;
mod custom;
mod hey;

use std::collections::HashSet;

use tracing::debug;

pub use cargo::CargoAdapter;
pub use custom::CustomAdapter;
pub use hey::{HeyAdapter, HeyMetric};

use crate::data::{Measurement, Tool};
use crate::error::{BenchError, BenchResult};

/// Parser for one family of tool output
pub trait Adapter: Send + Sync {
    /// Tool the resulting entry is recorded as
    fn tool(&self) -> Tool;

    /// Name callers select this adapter by
    fn id(&self) -> &'static str {
        self.tool().as_str()
    }

    /// Extract measurements in the order the tool reported them
    fn parse(&self, raw: &[u8]) -> BenchResult<Vec<Measurement>>;
}

static CARGO: CargoAdapter = CargoAdapter;
static CUSTOM_BIGGER: CustomAdapter = CustomAdapter::new(Tool::CustomBiggerIsBetter);
static CUSTOM_SMALLER: CustomAdapter = CustomAdapter::new(Tool::CustomSmallerIsBetter);
static HEY_THROUGHPUT: HeyAdapter = HeyAdapter::new(HeyMetric::Throughput);
static HEY_LATENCY: HeyAdapter = HeyAdapter::new(HeyMetric::Latency);

static ADAPTERS: [&dyn Adapter; 5] = [
    &CARGO,
    &CUSTOM_BIGGER,
    &CUSTOM_SMALLER,
    &HEY_THROUGHPUT,
    &HEY_LATENCY,
];

/// Adapter registered under `tool_id`
pub fn adapter_for(tool_id: &str) -> BenchResult<&'static dyn Adapter> {
    ADAPTERS
        .iter()
        .copied()
        .find(|adapter| adapter.id() == tool_id)
        .ok_or_else(|| BenchError::UnsupportedTool(tool_id.to_string()))
}

/// Resolve `tool_id` and parse `raw` with its adapter.
///
/// Every measurement is validated and names must be unique; otherwise
/// nothing is returned.
pub fn parse(tool_id: &str, raw: &[u8]) -> BenchResult<(Tool, Vec<Measurement>)> {
    let adapter = adapter_for(tool_id)?;
    let tool = adapter.tool();
    let measurements = adapter.parse(raw)?;

    if measurements.is_empty() {
        return Err(BenchError::parse(tool_id, 0, "no benchmark results found"));
    }

    {
        let mut names = HashSet::new();
        for m in &measurements {
            m.validate()?;
            if !names.insert(m.name.as_str()) {
                return Err(BenchError::InvalidMeasurement {
                    name: m.name.clone(),
                    reason: "reported more than once".to_string(),
                });
            }
        }
    }

    debug!(%tool, count = measurements.len(), "Parsed tool output");
    Ok((tool, measurements))
}
