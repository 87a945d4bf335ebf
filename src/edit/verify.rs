//! Post-write verification.
//!
//! An edit passes when the container still parses, the edited slice still
//! has a readable header, and no new layout fault appeared in it. Layout
//! faults are structural failures plus section/segment ranges that leave
//! the container or the owning segment.

use crate::config::ParserConfig;
use crate::formats::macho::{parse_container, Container};

/// Fault count of one slice before an edit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Baseline {
    pub slice: usize,
    pub layout_faults: usize,
}

impl Baseline {
    pub fn capture(model: &Container, slice: usize) -> Self {
        Self {
            slice,
            layout_faults: model.slice(slice).map(|s| s.layout_faults()).unwrap_or(0),
        }
    }
}

/// Re-parse `data` and compare against `baseline`. Err carries the reason.
pub fn verify(data: &[u8], config: &ParserConfig, baseline: &Baseline) -> std::result::Result<Container, String> {
    let model = parse_container(data, config).map_err(|e| format!("container no longer parses: {}", e))?;

    let Some(slice) = model.slice(baseline.slice) else {
        let why = model
            .slice_errors
            .iter()
            .find(|e| e.index == baseline.slice)
            .map(|e| e.message.clone())
            .unwrap_or_else(|| "slice disappeared".to_string());
        return Err(format!("slice {} no longer parses: {}", baseline.slice, why));
    };

    let faults = slice.layout_faults();
    if faults > baseline.layout_faults {
        return Err(format!(
            "slice {} layout faults rose from {} to {}",
            baseline.slice, baseline.layout_faults, faults
        ));
    }
    Ok(model)
}
