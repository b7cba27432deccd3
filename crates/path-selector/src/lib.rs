//! SCION Path Selector
//!
//! Picks, among the paths a SCION daemon returns for a source/destination
//! pair, the one that best satisfies a stated objective, and reports whether
//! the objective could be fulfilled.
//!
//! # Objectives
//!
//! | Objective | Ranker | Tie-break chain |
//! |-----------|--------|-----------------|
//! | Lowest carbon | [`ranker::lowest_carbon`] | complete → fewer missing → lower total |
//! | Bandwidth under latency bound | [`ranker::best_bandwidth`] | complete → fewer missing → higher bottleneck → fewer crossings |
//! | EPIC hidden path | [`ranker::epic_path`] | capable partition → fewer crossings → lower interface IDs |
//! | FABRID policy | [`fabrid::select_policy_path`] | fewer hops → lower ingress at hop 1 |
//!
//! # Pipeline
//!
//! ```text
//! PathSupplier ──► hops / metrics ──► ranker ──► orchestrator ──► DataplaneBuilder
//!                        │                             │
//!                   query engine                  VerdictSink
//! ```
//!
//! Everything between the supplier and the sink is pure: borrowed inputs,
//! one outcome, no shared state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use thiserror::Error;

pub mod config;
pub mod dataplane;
pub mod fabrid;
pub mod hops;
pub mod loader;
pub mod metrics;
pub mod orchestrator;
pub mod query;
pub mod ranker;

pub use config::SelectorConfig;
pub use dataplane::{DataplaneHandle, DataplaneKind, SelectedPath};
pub use hops::{build_hop_chain, HopRecord};
pub use orchestrator::{Objective, RankingOutcome, SelectionOrchestrator};
pub use query::{MatchList, MatchResult, PolicyQuery, QuerySyntaxError};

/// Interface identifier on a border router (0 = none)
pub type InterfaceId = u64;

/// Largest AS number printed in decimal (BGP range)
const MAX_BGP_AS: u64 = u32::MAX as u64;

/// Largest AS number representable in SCION (48 bit)
const MAX_SCION_AS: u64 = (1 << 48) - 1;

#[derive(Error, Debug)]
pub enum SelectorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("No paths available")]
    NoPathsAvailable,
    #[error("No path within latency bound of {bound_ms}ms ({evaluated} evaluated)")]
    NoPathWithinBound { bound_ms: f64, evaluated: usize },
    #[error("Invalid latency bound: {0}")]
    InvalidLatencyBound(f64),
    #[error(transparent)]
    QuerySyntax(#[from] QuerySyntaxError),
    #[error("Path {path} does not support a {required:?} dataplane")]
    IncompatibleDataplane { path: PathId, required: DataplaneKind },
    #[error("Dataplane construction failed: {0}")]
    DataplaneConstruction(String),
    #[error("Path query failed: {0}")]
    PathQueryFailed(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Not enough paths: need {needed}, have {available}")]
    NotEnoughPaths { needed: usize, available: usize },
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

pub type Result<T> = std::result::Result<T, SelectorError>;

/// ISD-AS pair identifying an autonomous system
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IsdAs {
    pub isd: u16,
    pub asn: u64,
}

impl IsdAs {
    pub const fn new(isd: u16, asn: u64) -> Self {
        Self { isd, asn }
    }
}

impl fmt::Display for IsdAs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-", self.isd)?;
        fmt_as(self.asn, f)
    }
}

/// Write an AS number in SCION notation (decimal for BGP ASes, hex groups otherwise)
pub(crate) fn fmt_as(asn: u64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if asn <= MAX_BGP_AS {
        write!(f, "{}", asn)
    } else {
        write!(
            f,
            "{:x}:{:x}:{:x}",
            (asn >> 32) & 0xffff,
            (asn >> 16) & 0xffff,
            asn & 0xffff
        )
    }
}

/// Parse an AS number in SCION notation
pub(crate) fn parse_as(text: &str) -> Option<u64> {
    if !text.contains(':') {
        return text.parse::<u64>().ok().filter(|asn| *asn <= MAX_BGP_AS);
    }

    let groups: Vec<&str> = text.split(':').collect();
    if groups.len() != 3 {
        return None;
    }

    let mut asn = 0u64;
    for group in groups {
        if group.is_empty() || group.len() > 4 {
            return None;
        }
        asn = (asn << 16) | u64::from_str_radix(group, 16).ok()?;
    }

    (asn <= MAX_SCION_AS).then_some(asn)
}

impl FromStr for IsdAs {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self> {
        let (isd, asn) = s
            .split_once('-')
            .ok_or_else(|| SelectorError::InvalidAddress(s.to_string()))?;
        let isd = isd
            .parse::<u16>()
            .map_err(|_| SelectorError::InvalidAddress(s.to_string()))?;
        let asn = parse_as(asn).ok_or_else(|| SelectorError::InvalidAddress(s.to_string()))?;
        Ok(Self { isd, asn })
    }
}

impl TryFrom<String> for IsdAs {
    type Error = SelectorError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<IsdAs> for String {
    fn from(value: IsdAs) -> Self {
        value.to_string()
    }
}

/// FABRID policy identifier advertised by a hop
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PolicyId {
    /// AS-local policy (`L1000`)
    Local(u32),
    /// Globally registered policy (`G7`)
    Global(u32),
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyId::Local(id) => write!(f, "L{}", id),
            PolicyId::Global(id) => write!(f, "G{}", id),
        }
    }
}

impl FromStr for PolicyId {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || format!("invalid policy identifier '{}'", s);
        if let Some(digits) = s.strip_prefix('L') {
            digits.parse().map(PolicyId::Local).map_err(|_| invalid())
        } else if let Some(digits) = s.strip_prefix('G') {
            digits.parse().map(PolicyId::Global).map_err(|_| invalid())
        } else {
            Err(invalid())
        }
    }
}

impl TryFrom<String> for PolicyId {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PolicyId> for String {
    fn from(value: PolicyId) -> Self {
        value.to_string()
    }
}

/// One directional interface crossing on a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathInterface {
    pub isd_as: IsdAs,
    pub id: InterfaceId,
}

impl PathInterface {
    pub fn new(isd_as: IsdAs, id: InterfaceId) -> Self {
        Self { isd_as, id }
    }
}

/// FABRID information for one hop
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FabridHopInfo {
    pub enabled: bool,
    #[serde(default)]
    pub policies: Vec<PolicyId>,
}

/// Per-link and per-hop metadata attached to a path
///
/// Link arrays have one entry per inter-AS link. `None` (JSON `null`) and
/// negative values mean the AS did not announce the metric.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathMetadata {
    /// Link latency in milliseconds
    pub latency_ms: Vec<Option<f64>>,
    /// Link bandwidth in kbit/s
    pub bandwidth_kbps: Vec<Option<u64>>,
    /// Link carbon intensity in gCO2/TB
    pub carbon_intensity: Vec<Option<i64>>,
    /// Whether the path carries EPIC authenticators
    pub epic_capable: bool,
    /// FABRID info, one entry per hop
    pub fabrid_info: Vec<FabridHopInfo>,
}

impl PathMetadata {
    /// True if at least one hop has FABRID enabled
    pub fn has_fabrid_hop(&self) -> bool {
        self.fabrid_info.iter().any(|info| info.enabled)
    }
}

/// Opaque path identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathId(pub String);

impl fmt::Display for PathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PathId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A path between two endpoints as returned by the path supplier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    pub id: PathId,
    pub source: IsdAs,
    pub destination: IsdAs,
    pub interfaces: Vec<PathInterface>,
    #[serde(default)]
    pub metadata: PathMetadata,
    #[serde(default)]
    pub dataplane: DataplaneHandle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub underlay_next_hop: Option<SocketAddr>,
    /// Only returned when hidden (EPIC-eligible) paths are requested
    #[serde(default)]
    pub hidden: bool,
}

impl Path {
    /// Create a path with empty metadata and a standard dataplane
    pub fn new(id: impl Into<String>, interfaces: Vec<PathInterface>) -> Self {
        let source = interfaces.first().map(|i| i.isd_as).unwrap_or_default();
        let destination = interfaces.last().map(|i| i.isd_as).unwrap_or_default();
        Self {
            id: PathId(id.into()),
            source,
            destination,
            interfaces,
            metadata: PathMetadata::default(),
            dataplane: DataplaneHandle::default(),
            underlay_next_hop: None,
            hidden: false,
        }
    }

    pub fn with_metadata(mut self, metadata: PathMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Number of interface crossings
    pub fn crossings(&self) -> usize {
        self.interfaces.len()
    }

    /// Compact `AS#if>AS#if` rendering for logs
    pub fn fingerprint(&self) -> String {
        self.interfaces
            .iter()
            .map(|i| format!("{}#{}", i.isd_as, i.id))
            .collect::<Vec<_>>()
            .join(">")
    }
}
