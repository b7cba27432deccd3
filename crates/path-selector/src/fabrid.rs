//! FABRID policy path selection
//!
//! Candidates are paths that carry FABRID info and whose hop chain matches the
//! policy query. The shortest candidate wins. When nothing matches, the
//! selection falls back to a FABRID-capable path with no policies selected.

use crate::hops::{build_hop_chain, HopRecord};
use crate::query::{MatchList, MatchResult, PolicyQuery};
use crate::{Path, PolicyId, Result, SelectorError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Requires a specific policy on one hop counted from the end of the chain
///
/// `from_end = 1` addresses the last transit hop. Pins that land on the first
/// hop or outside the chain are vacuous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HopPin {
    pub from_end: usize,
    pub policy: PolicyId,
}

impl HopPin {
    pub fn new(from_end: usize, policy: PolicyId) -> Self {
        Self { from_end, policy }
    }

    pub fn satisfied_by(&self, selections: &MatchList) -> bool {
        let Some(index) = selections.len().checked_sub(1 + self.from_end) else {
            return true;
        };
        index < 1 || selections.get(index) == Some(self.policy)
    }
}

impl fmt::Display for HopPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.from_end, self.policy)
    }
}

/// `FROM_END:POLICY`, e.g. `1:L2000`
impl FromStr for HopPin {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (from_end, policy) = s
            .split_once(':')
            .ok_or_else(|| format!("expected FROM_END:POLICY, got '{}'", s))?;
        let from_end = from_end
            .trim()
            .parse()
            .map_err(|_| format!("invalid hop offset '{}'", from_end))?;
        Ok(Self::new(from_end, policy.trim().parse()?))
    }
}

/// Outcome of a FABRID selection
#[derive(Debug, Clone, PartialEq)]
pub struct FabridSelection {
    /// Index into the input paths
    pub index: usize,
    pub hops: Vec<HopRecord>,
    pub match_result: MatchResult,
    pub fulfilled: bool,
}

impl FabridSelection {
    /// Selected policy IDs in hop order
    pub fn policies(&self) -> Vec<PolicyId> {
        self.match_result.match_list.policies()
    }

    fn unconstrained(paths: &[Path], index: usize, fulfilled: bool) -> Self {
        let hops = build_hop_chain(&paths[index]);
        let match_result = PolicyQuery::wildcard_chain(hops.len()).evaluate(&hops, 0);
        Self {
            index,
            hops,
            match_result,
            fulfilled,
        }
    }
}

/// Matching options for [`select_policy_path`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PolicyOptions {
    pub pin: Option<HopPin>,
    pub require_full_coverage: bool,
}

struct PathCandidate {
    index: usize,
    hops: Vec<HopRecord>,
    result: MatchResult,
}

impl PathCandidate {
    fn hop_count(&self) -> usize {
        self.hops.len()
    }

    fn second_ingress(&self) -> u64 {
        self.hops.get(1).map_or(0, |hop| hop.ingress)
    }
}

/// Shortest path whose hop chain satisfies `query`
///
/// Ties on hop count go to the lower ingress interface on the second hop,
/// then to the earlier path.
pub fn select_policy_path(
    paths: &[Path],
    query: &PolicyQuery,
    options: PolicyOptions,
) -> Result<FabridSelection> {
    if paths.is_empty() {
        return Err(SelectorError::NoPathsAvailable);
    }

    let mut best: Option<PathCandidate> = None;

    for (index, path) in paths.iter().enumerate() {
        if path.metadata.fabrid_info.is_empty() {
            debug!("Skipping {}: no FABRID info", path.id);
            continue;
        }

        let hops = build_hop_chain(path);
        let result = query.evaluate(&hops, 0);

        if !result.matched {
            debug!("Path {} does not match query", path.id);
            continue;
        }
        if options.require_full_coverage && !result.covers(hops.len()) {
            debug!(
                "Path {} matched {} of {} hops",
                path.id,
                result.end_cursor,
                hops.len()
            );
            continue;
        }
        if let Some(pin) = &options.pin {
            if !pin.satisfied_by(&result.match_list) {
                debug!("Path {} violates hop pin {}", path.id, pin);
                continue;
            }
        }

        let candidate = PathCandidate {
            index,
            hops,
            result,
        };
        let better = match &best {
            None => true,
            Some(current) => {
                (candidate.hop_count(), candidate.second_ingress())
                    < (current.hop_count(), current.second_ingress())
            }
        };
        if better {
            best = Some(candidate);
        }
    }

    match best {
        Some(candidate) => {
            info!(
                "Policy path {} over {} hops with {:?}",
                paths[candidate.index].id,
                candidate.hop_count(),
                candidate.result.match_list.policies()
            );
            Ok(FabridSelection {
                index: candidate.index,
                hops: candidate.hops,
                match_result: candidate.result,
                fulfilled: true,
            })
        }
        None => {
            let index = first_fabrid_path(paths).unwrap_or(0);
            info!(
                "No path matches query '{}', falling back to {}",
                query, paths[index].id
            );
            Ok(FabridSelection::unconstrained(paths, index, false))
        }
    }
}

/// First path with a FABRID-enabled hop, no policies selected
pub fn fabrid_connectivity(paths: &[Path]) -> Result<FabridSelection> {
    if paths.is_empty() {
        return Err(SelectorError::NoPathsAvailable);
    }

    match first_fabrid_path(paths) {
        Some(index) => {
            info!("FABRID path {}", paths[index].id);
            Ok(FabridSelection::unconstrained(paths, index, true))
        }
        None => {
            info!("No FABRID-enabled path, using {}", paths[0].id);
            Ok(FabridSelection::unconstrained(paths, 0, false))
        }
    }
}

fn first_fabrid_path(paths: &[Path]) -> Option<usize> {
    paths.iter().position(|p| p.metadata.has_fabrid_hop())
}
