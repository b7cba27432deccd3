//! Objective dispatch and the decision driver
//!
//! [`SelectionOrchestrator::decide`] is pure: it maps an objective onto the
//! matching ranker and describes the capability dataplane the winner needs.
//! [`SelectionOrchestrator::realize`] asks a [`DataplaneBuilder`] for that
//! dataplane. [`SelectionOrchestrator::run`] wires a path supplier and a
//! verdict sink around both.

use crate::config::SelectorConfig;
use crate::dataplane::{CapabilityRequest, DataplaneBuilder, DataplaneHandle, EndpointConfig};
use crate::fabrid::{fabrid_connectivity, select_policy_path, FabridSelection, HopPin, PolicyOptions};
use crate::hops::as_trail;
use crate::metrics::{carbon_summary, epic_capable, link_summary, CarbonSummary, LinkSummary};
use crate::query::PolicyQuery;
use crate::{ranker, IsdAs, Path, PathId, PolicyId, Result, SelectedPath, SelectorError};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

/// What the caller wants from the selected path
#[derive(Debug, Clone, PartialEq)]
pub enum Objective {
    /// Any path
    Connectivity,
    LowestCarbon,
    /// Highest bandwidth among paths under the latency bound
    MaxBandwidth { latency_bound_ms: f64 },
    /// Shortest path with an EPIC dataplane
    EpicHidden,
    /// Any path with a FABRID-enabled hop
    FabridConnectivity,
    /// Shortest path satisfying a policy query
    FabridPolicy {
        query: PolicyQuery,
        pin: Option<HopPin>,
    },
}

impl Objective {
    /// Flags the path supplier must honour for this objective
    pub fn query_flags(&self) -> PathQueryFlags {
        match self {
            Objective::EpicHidden => PathQueryFlags {
                hidden: true,
                fabrid_maps: false,
            },
            Objective::FabridConnectivity | Objective::FabridPolicy { .. } => PathQueryFlags {
                hidden: false,
                fabrid_maps: true,
            },
            _ => PathQueryFlags::default(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Objective::Connectivity => "connectivity",
            Objective::LowestCarbon => "carbon",
            Objective::MaxBandwidth { .. } => "bandwidth",
            Objective::EpicHidden => "epic",
            Objective::FabridConnectivity => "fabrid",
            Objective::FabridPolicy { .. } => "policy",
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Objective::MaxBandwidth { latency_bound_ms } => {
                write!(f, "bandwidth (<= {:.3}ms)", latency_bound_ms)
            }
            Objective::FabridPolicy { query, pin: Some(pin) } => {
                write!(f, "policy '{}' pin {}", query, pin)
            }
            Objective::FabridPolicy { query, pin: None } => write!(f, "policy '{}'", query),
            other => f.write_str(other.name()),
        }
    }
}

/// Path query flags passed to the supplier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathQueryFlags {
    /// Include hidden (EPIC-eligible) paths
    pub hidden: bool,
    /// Include FABRID policy maps in the path metadata
    pub fabrid_maps: bool,
}

/// Summary values of the winning path
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuxiliaryMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carbon: Option<CarbonSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<LinkSummary>,
    pub hop_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<PolicyId>,
    pub epic_capable: bool,
    pub paths_evaluated: usize,
}

/// Pure ranking result, before any dataplane is built
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// Index into the evaluated paths
    pub index: usize,
    pub objective_fulfilled: bool,
    pub metrics: AuxiliaryMetrics,
    /// Capability dataplane the winner should carry
    pub capability: Option<CapabilityRequest>,
}

/// Selected path plus compliance verdict
#[derive(Debug, Clone, PartialEq)]
pub struct RankingOutcome {
    pub selected: SelectedPath,
    pub objective_fulfilled: bool,
    pub metrics: AuxiliaryMetrics,
}

/// Source of candidate paths
pub trait PathSupplier {
    /// Fails with [`SelectorError::PathQueryFailed`]
    fn query(&self, src: IsdAs, dst: IsdAs, flags: PathQueryFlags) -> Result<Vec<Path>>;
}

/// Answer from the remote verifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    Failed,
    /// Report once more on each of the next `additional_paths` paths
    Continue { additional_paths: usize },
}

/// Receives decision reports; fails with [`SelectorError::Transport`]
pub trait VerdictSink {
    fn report(&mut self, report: &DecisionReport) -> Result<Verdict>;
}

/// Report of one decision as sent to the sink and written by the CLI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionReport {
    pub objective: String,
    pub path_id: PathId,
    pub fingerprint: String,
    pub objective_fulfilled: bool,
    pub dataplane: DataplaneHandle,
    pub metrics: AuxiliaryMetrics,
    /// ASes on the reverse path, remote first
    pub as_trail: Vec<IsdAs>,
    pub generated_at: String,
}

impl DecisionReport {
    pub fn new(objective: &Objective, outcome: &RankingOutcome, ctx: &DecisionContext) -> Self {
        let base = &outcome.selected.base;
        Self {
            objective: objective.to_string(),
            path_id: base.id.clone(),
            fingerprint: base.fingerprint(),
            objective_fulfilled: outcome.objective_fulfilled,
            dataplane: outcome.selected.dataplane().clone(),
            metrics: outcome.metrics.clone(),
            as_trail: as_trail(base, ctx.local, ctx.remote),
            generated_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Per-decision addressing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecisionContext {
    pub local: IsdAs,
    pub remote: IsdAs,
    pub endpoints: EndpointConfig,
}

impl DecisionContext {
    pub fn new(local: IsdAs, remote: IsdAs) -> Self {
        Self {
            local,
            remote,
            endpoints: EndpointConfig {
                local_ia: local,
                remote_ia: remote,
                ..EndpointConfig::default()
            },
        }
    }
}

/// Runs objectives against path sets
#[derive(Debug, Clone, Default)]
pub struct SelectionOrchestrator {
    config: SelectorConfig,
}

impl SelectionOrchestrator {
    pub fn new(config: SelectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Rank `paths` for `objective`
    pub fn decide(&self, paths: &[Path], objective: &Objective) -> Result<Decision> {
        if paths.is_empty() {
            return Err(SelectorError::NoPathsAvailable);
        }

        info!("Deciding {} over {} paths", objective, paths.len());

        let decision = match objective {
            Objective::Connectivity => self.metric_decision(paths, 0, true),
            Objective::LowestCarbon => {
                let index = ranker::lowest_carbon(paths)?;
                let carbon = carbon_summary(&paths[index]);
                let mut decision = self.metric_decision(paths, index, carbon.complete);
                decision.metrics.carbon = Some(carbon);
                decision
            }
            Objective::MaxBandwidth { latency_bound_ms } => {
                let index = ranker::best_bandwidth(paths, *latency_bound_ms)?;
                let links = link_summary(&paths[index]);
                let mut decision = self.metric_decision(paths, index, links.complete);
                decision.metrics.links = Some(links);
                decision
            }
            Objective::EpicHidden => {
                let index = ranker::epic_path(paths)?;
                let capable = epic_capable(&paths[index]);
                let mut decision = self.metric_decision(paths, index, capable);
                if capable {
                    decision.capability = Some(CapabilityRequest::Epic);
                }
                decision
            }
            Objective::FabridConnectivity => {
                self.fabrid_decision(paths, fabrid_connectivity(paths)?)
            }
            Objective::FabridPolicy { query, pin } => {
                let options = PolicyOptions {
                    pin: *pin,
                    require_full_coverage: self.config.require_full_coverage,
                };
                self.fabrid_decision(paths, select_policy_path(paths, query, options)?)
            }
        };

        info!(
            "Selected {} (fulfilled={})",
            paths[decision.index].id, decision.objective_fulfilled
        );
        Ok(decision)
    }

    fn metric_decision(&self, paths: &[Path], index: usize, fulfilled: bool) -> Decision {
        let path = &paths[index];
        Decision {
            index,
            objective_fulfilled: fulfilled,
            metrics: AuxiliaryMetrics {
                hop_count: crate::build_hop_chain(path).len(),
                epic_capable: epic_capable(path),
                paths_evaluated: paths.len(),
                ..AuxiliaryMetrics::default()
            },
            capability: None,
        }
    }

    fn fabrid_decision(&self, paths: &[Path], selection: FabridSelection) -> Decision {
        let path = &paths[selection.index];
        let policies = selection.policies();
        let capability = path.metadata.has_fabrid_hop().then(|| CapabilityRequest::Fabrid {
            selections: selection.match_result.match_list.selected.clone(),
            hops: selection.hops.clone(),
        });

        Decision {
            index: selection.index,
            objective_fulfilled: selection.fulfilled,
            metrics: AuxiliaryMetrics {
                hop_count: selection.hops.len(),
                policies,
                epic_capable: epic_capable(path),
                paths_evaluated: paths.len(),
                ..AuxiliaryMetrics::default()
            },
            capability,
        }
    }

    /// Build the dataplane the decision asks for
    ///
    /// Dataplane failures fall back to the plain path with the objective
    /// marked unfulfilled when `fallback_to_plain_dataplane` is set.
    pub fn realize(
        &self,
        paths: &[Path],
        decision: Decision,
        builder: &dyn DataplaneBuilder,
        endpoints: &EndpointConfig,
    ) -> Result<RankingOutcome> {
        let path = paths
            .get(decision.index)
            .ok_or(SelectorError::NoPathsAvailable)?;

        let Some(request) = &decision.capability else {
            return Ok(RankingOutcome {
                selected: SelectedPath::plain(path.clone()),
                objective_fulfilled: decision.objective_fulfilled,
                metrics: decision.metrics,
            });
        };

        match builder.build(path, request, endpoints) {
            Ok(handle) => {
                info!("Built {:?} dataplane for {}", handle.kind, path.id);
                Ok(RankingOutcome {
                    selected: SelectedPath::with_dataplane(path.clone(), handle),
                    objective_fulfilled: decision.objective_fulfilled,
                    metrics: decision.metrics,
                })
            }
            Err(
                err @ (SelectorError::IncompatibleDataplane { .. }
                | SelectorError::DataplaneConstruction(_)),
            ) if self.config.fallback_to_plain_dataplane => {
                warn!("{}; using plain dataplane for {}", err, path.id);
                Ok(RankingOutcome {
                    selected: SelectedPath::plain(path.clone()),
                    objective_fulfilled: false,
                    metrics: decision.metrics,
                })
            }
            Err(err) => Err(err),
        }
    }

    /// [`decide`](Self::decide) then [`realize`](Self::realize)
    pub fn select(
        &self,
        paths: &[Path],
        objective: &Objective,
        builder: &dyn DataplaneBuilder,
        endpoints: &EndpointConfig,
    ) -> Result<RankingOutcome> {
        let decision = self.decide(paths, objective)?;
        self.realize(paths, decision, builder, endpoints)
    }

    /// Query, decide, realize and report one decision
    pub fn run(
        &self,
        ctx: &DecisionContext,
        supplier: &dyn PathSupplier,
        builder: &dyn DataplaneBuilder,
        sink: &mut dyn VerdictSink,
        objective: &Objective,
    ) -> Result<Verdict> {
        let paths = supplier.query(ctx.local, ctx.remote, objective.query_flags())?;
        let outcome = self.select(&paths, objective, builder, &ctx.endpoints)?;

        let verdict = sink.report(&DecisionReport::new(objective, &outcome, ctx))?;
        info!("Verdict for {}: {:?}", outcome.selected.id(), verdict);
        Ok(verdict)
    }

    /// Report on the supplied paths in order for as long as the sink asks
    /// for more
    ///
    /// The first path is always reported. A `Continue { additional_paths: n }`
    /// verdict reports once on each of the next `n` paths; the run ends at
    /// the first `Passed` or when the sink stops asking.
    pub fn run_multipath(
        &self,
        ctx: &DecisionContext,
        supplier: &dyn PathSupplier,
        sink: &mut dyn VerdictSink,
    ) -> Result<Verdict> {
        let objective = Objective::Connectivity;
        let paths = supplier.query(ctx.local, ctx.remote, objective.query_flags())?;
        if paths.is_empty() {
            return Err(SelectorError::NoPathsAvailable);
        }

        let mut report_on = |index: usize| -> Result<Verdict> {
            let mut decision = self.metric_decision(&paths, index, true);
            decision.metrics.links = Some(link_summary(&paths[index]));
            let outcome = RankingOutcome {
                selected: SelectedPath::plain(paths[index].clone()),
                objective_fulfilled: decision.objective_fulfilled,
                metrics: decision.metrics,
            };
            info!("Reporting on path {} ({})", index, paths[index].id);
            sink.report(&DecisionReport::new(&objective, &outcome, ctx))
        };

        let mut verdict = report_on(0)?;
        let mut next = 1;

        while let Verdict::Continue { additional_paths } = verdict {
            if additional_paths == 0 {
                break;
            }
            let available = paths.len() - next;
            if additional_paths > available {
                return Err(SelectorError::NotEnoughPaths {
                    needed: additional_paths,
                    available,
                });
            }

            for _ in 0..additional_paths {
                verdict = report_on(next)?;
                next += 1;
                if verdict == Verdict::Passed {
                    return Ok(verdict);
                }
            }
        }

        Ok(verdict)
    }
}
