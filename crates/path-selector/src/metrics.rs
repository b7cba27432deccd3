//! Path metric extraction
//!
//! Turns the raw per-link metadata arrays into summary values. Missing data
//! is never an error and never zero: it is counted, and a path with any gap
//! is reported as incomplete so the rankers can prefer fully announced paths.

use crate::Path;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Carbon total reported when a path announces no carbon data at all (9 decimal precision)
pub const MISSING_CARBON_TOTAL: f64 = 999999.000000000;

/// Latency total reported when a path announces no latency data at all
pub const MISSING_LATENCY_MS: f64 = f64::MAX;

/// Carbon intensity summary for one path
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CarbonSummary {
    /// Sum of announced link intensities (gCO2/TB)
    pub total: f64,
    /// Links without a usable value
    pub missing: usize,
    pub complete: bool,
}

/// Latency and bandwidth summary for one path
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkSummary {
    /// Sum of announced link latencies
    pub total_latency_ms: f64,
    /// Minimum positive link bandwidth, `None` if no link announced one
    pub bottleneck_kbps: Option<u64>,
    /// Latency entries without a usable value
    pub missing: usize,
    pub complete: bool,
    /// Interface crossings (path length)
    pub crossings: usize,
}

impl LinkSummary {
    /// Bottleneck bandwidth with unknown reported as unbounded
    pub fn bottleneck_or_max(&self) -> u64 {
        self.bottleneck_kbps.unwrap_or(u64::MAX)
    }
}

/// Summarize carbon intensity
pub fn carbon_summary(path: &Path) -> CarbonSummary {
    let intensities = &path.metadata.carbon_intensity;

    if intensities.is_empty() {
        debug!("Path {} announces no carbon intensity", path.id);
        return CarbonSummary {
            total: MISSING_CARBON_TOTAL,
            missing: 1,
            complete: false,
        };
    }

    let mut total = 0.0;
    let mut missing = 0;

    for (i, value) in intensities.iter().enumerate() {
        match value {
            Some(v) if *v >= 0 => total += *v as f64,
            _ => {
                missing += 1;
                debug!("Missing carbon intensity on link {} of {}", i, path.id);
            }
        }
    }

    CarbonSummary {
        total,
        missing,
        complete: missing == 0,
    }
}

/// Summarize latency and bottleneck bandwidth
pub fn link_summary(path: &Path) -> LinkSummary {
    let metadata = &path.metadata;

    let (total_latency_ms, missing) = if metadata.latency_ms.is_empty() {
        (MISSING_LATENCY_MS, 1)
    } else {
        metadata
            .latency_ms
            .iter()
            .fold((0.0, 0), |(total, missing), value| match value {
                Some(ms) if ms.is_finite() && *ms >= 0.0 => (total + ms, missing),
                _ => (total, missing + 1),
            })
    };

    let bottleneck_kbps = metadata
        .bandwidth_kbps
        .iter()
        .flatten()
        .copied()
        .filter(|bw| *bw > 0)
        .min();

    let complete =
        !metadata.latency_ms.is_empty() && missing == 0 && !metadata.bandwidth_kbps.is_empty();

    let summary = LinkSummary {
        total_latency_ms,
        bottleneck_kbps,
        missing,
        complete,
        crossings: path.crossings(),
    };

    debug!(
        "Path {} metrics: latency={:.3}ms bandwidth={:?}kbps missing={} complete={}",
        path.id, summary.total_latency_ms, summary.bottleneck_kbps, summary.missing, summary.complete
    );

    summary
}

/// Whether the path can carry an EPIC dataplane
pub fn epic_capable(path: &Path) -> bool {
    path.metadata.epic_capable
}
