//! Decision driver tests against in-memory collaborators.

use path_selector::dataplane::{DataplaneKind, DeclaredDataplaneBuilder};
use path_selector::fabrid::HopPin;
use path_selector::orchestrator::{
    DecisionContext, DecisionReport, PathQueryFlags, PathSupplier, Verdict, VerdictSink,
};
use path_selector::{
    FabridHopInfo, IsdAs, Objective, Path, PathInterface, PolicyId, Result, SelectionOrchestrator,
    SelectorError,
};
use std::cell::RefCell;
use std::collections::VecDeque;

const L1000: PolicyId = PolicyId::Local(1000);
const L1001: PolicyId = PolicyId::Local(1001);
const L2000: PolicyId = PolicyId::Local(2000);

fn ia(text: &str) -> IsdAs {
    text.parse().unwrap()
}

fn local() -> IsdAs {
    ia("1-ff00:0:110")
}

fn remote() -> IsdAs {
    ia("2-ff00:0:220")
}

/// local -> transit... -> remote, transit ASes given as (ISD-AS, ingress, egress)
fn make_path(id: &str, transit: &[(&str, u64, u64)]) -> Path {
    let mut interfaces = vec![PathInterface::new(local(), 1)];
    for (as_text, ingress, egress) in transit {
        interfaces.push(PathInterface::new(ia(as_text), *ingress));
        interfaces.push(PathInterface::new(ia(as_text), *egress));
    }
    interfaces.push(PathInterface::new(remote(), 99));
    Path::new(id, interfaces)
}

fn with_fabrid(mut path: Path, per_hop: &[&[PolicyId]]) -> Path {
    path.metadata.fabrid_info = per_hop
        .iter()
        .map(|ids| FabridHopInfo {
            enabled: !ids.is_empty(),
            policies: ids.to_vec(),
        })
        .collect();
    path
}

// ─── Fakes ─────────────────────────────────────────────────────────────

struct InMemorySupplier {
    paths: Vec<Path>,
    seen_flags: RefCell<Vec<PathQueryFlags>>,
}

impl InMemorySupplier {
    fn new(paths: Vec<Path>) -> Self {
        Self {
            paths,
            seen_flags: RefCell::new(Vec::new()),
        }
    }
}

impl PathSupplier for InMemorySupplier {
    fn query(&self, _src: IsdAs, _dst: IsdAs, flags: PathQueryFlags) -> Result<Vec<Path>> {
        self.seen_flags.borrow_mut().push(flags);
        Ok(self
            .paths
            .iter()
            .filter(|p| flags.hidden || !p.hidden)
            .cloned()
            .collect())
    }
}

struct UnreachableDaemon;

impl PathSupplier for UnreachableDaemon {
    fn query(&self, _src: IsdAs, _dst: IsdAs, _flags: PathQueryFlags) -> Result<Vec<Path>> {
        Err(SelectorError::PathQueryFailed("daemon unreachable".to_string()))
    }
}

/// Answers with a fixed verdict script and records every report
struct ScriptedVerifier {
    script: VecDeque<Verdict>,
    reports: Vec<DecisionReport>,
}

impl ScriptedVerifier {
    fn new(script: &[Verdict]) -> Self {
        Self {
            script: script.iter().copied().collect(),
            reports: Vec::new(),
        }
    }

    fn reported_ids(&self) -> Vec<String> {
        self.reports.iter().map(|r| r.path_id.0.clone()).collect()
    }
}

impl VerdictSink for ScriptedVerifier {
    fn report(&mut self, report: &DecisionReport) -> Result<Verdict> {
        self.reports.push(report.clone());
        self.script
            .pop_front()
            .ok_or_else(|| SelectorError::Transport("verifier closed".to_string()))
    }
}

fn ctx() -> DecisionContext {
    DecisionContext::new(local(), remote())
}

// ─── Single decisions ──────────────────────────────────────────────────

#[test]
fn carbon_decision_is_reported() {
    let mut dirty = make_path("dirty", &[("1-ff00:0:111", 2, 3)]);
    dirty.metadata.carbon_intensity = vec![Some(900), Some(900)];
    let mut clean = make_path("clean", &[("1-ff00:0:112", 4, 5)]);
    clean.metadata.carbon_intensity = vec![Some(10), Some(20)];

    let supplier = InMemorySupplier::new(vec![dirty, clean]);
    let mut verifier = ScriptedVerifier::new(&[Verdict::Passed]);

    let verdict = SelectionOrchestrator::default()
        .run(&ctx(), &supplier, &DeclaredDataplaneBuilder, &mut verifier, &Objective::LowestCarbon)
        .unwrap();

    assert_eq!(verdict, Verdict::Passed);
    let report = &verifier.reports[0];
    assert_eq!(report.path_id.0, "clean");
    assert!(report.objective_fulfilled);
    assert_eq!(report.metrics.carbon.map(|c| c.total), Some(30.0));
    assert_eq!(
        report.as_trail,
        vec![remote(), ia("1-ff00:0:112"), local()]
    );
}

#[test]
fn epic_objective_requests_hidden_paths() {
    let visible = make_path("visible", &[]);
    let mut hidden = make_path("hidden", &[("1-ff00:0:111", 2, 3)]);
    hidden.hidden = true;
    hidden.metadata.epic_capable = true;

    let supplier = InMemorySupplier::new(vec![visible, hidden]);
    let mut verifier = ScriptedVerifier::new(&[Verdict::Passed]);

    SelectionOrchestrator::default()
        .run(&ctx(), &supplier, &DeclaredDataplaneBuilder, &mut verifier, &Objective::EpicHidden)
        .unwrap();

    assert!(supplier.seen_flags.borrow()[0].hidden);
    let report = &verifier.reports[0];
    assert_eq!(report.path_id.0, "hidden");
    assert_eq!(report.dataplane.kind, DataplaneKind::Epic);
    assert!(report.objective_fulfilled);
}

#[test]
fn bandwidth_without_surviving_path_is_an_error() {
    let mut slow = make_path("slow", &[]);
    slow.metadata.latency_ms = vec![Some(250.0)];
    slow.metadata.bandwidth_kbps = vec![Some(1_000_000)];

    let supplier = InMemorySupplier::new(vec![slow]);
    let mut verifier = ScriptedVerifier::new(&[]);

    let err = SelectionOrchestrator::default()
        .run(
            &ctx(),
            &supplier,
            &DeclaredDataplaneBuilder,
            &mut verifier,
            &Objective::MaxBandwidth { latency_bound_ms: 100.0 },
        )
        .unwrap_err();

    assert!(matches!(err, SelectorError::NoPathWithinBound { .. }));
    assert!(verifier.reports.is_empty());
}

#[test]
fn supplier_and_transport_failures_surface() {
    let mut verifier = ScriptedVerifier::new(&[Verdict::Passed]);
    let err = SelectionOrchestrator::default()
        .run(&ctx(), &UnreachableDaemon, &DeclaredDataplaneBuilder, &mut verifier, &Objective::Connectivity)
        .unwrap_err();
    assert!(matches!(err, SelectorError::PathQueryFailed(_)));

    let supplier = InMemorySupplier::new(vec![make_path("p", &[])]);
    let mut closed = ScriptedVerifier::new(&[]);
    let err = SelectionOrchestrator::default()
        .run(&ctx(), &supplier, &DeclaredDataplaneBuilder, &mut closed, &Objective::Connectivity)
        .unwrap_err();
    assert!(matches!(err, SelectorError::Transport(_)));
}

// ─── FABRID ────────────────────────────────────────────────────────────

fn isd_policy_paths() -> Vec<Path> {
    vec![
        // ISD 1 transit offers only L1001: violates the ISD 1 branch
        with_fabrid(
            make_path("isd1-wrong", &[("1-ff00:0:111", 2, 3), ("2-ff00:0:221", 4, 5)]),
            &[&[], &[L1001], &[L1001], &[]],
        ),
        with_fabrid(
            make_path("compliant", &[("1-ff00:0:112", 6, 7), ("2-ff00:0:222", 8, 9)]),
            &[&[], &[L1000], &[L1001, L2000], &[]],
        ),
    ]
}

#[test]
fn isd_conditional_policy_query() {
    let query = "{1-0#0,0@0 ? 1-0#0,0@L1000 + 1-0#0,0@0 : 2-0#0,0@0} # \
                 {1-0#0,0@0 ? 1-0#0,0@L1000 + 1-0#0,0@REJECT : 2-0#0,0@L1001 + 2-0#0,0@REJECT} # \
                 {2-0#0,0@0 ? 2-0#0,0@L1001 + 2-0#0,0@L2000 + 2-0#0,0@REJECT : 0-0#0,0@0} # \
                 0-0#0,0@0";
    let objective = Objective::FabridPolicy {
        query: query.parse().unwrap(),
        pin: None,
    };

    let supplier = InMemorySupplier::new(isd_policy_paths());
    let mut verifier = ScriptedVerifier::new(&[Verdict::Passed]);

    SelectionOrchestrator::default()
        .run(&ctx(), &supplier, &DeclaredDataplaneBuilder, &mut verifier, &objective)
        .unwrap();

    assert!(supplier.seen_flags.borrow()[0].fabrid_maps);
    let report = &verifier.reports[0];
    assert_eq!(report.path_id.0, "compliant");
    assert!(report.objective_fulfilled);
    assert_eq!(report.dataplane.kind, DataplaneKind::Fabrid);
    assert_eq!(report.dataplane.policies, vec![L1000, L1001]);
}

#[test]
fn pinned_policy_on_last_transit_hop() {
    let query = "0-0#0,0@0 # 0-0#0,0@L1000 # (0-0#0,0@L2000 + 0-0#0,0@L1001) # 0-0#0,0@0";
    let objective = Objective::FabridPolicy {
        query: query.parse().unwrap(),
        pin: Some(HopPin::new(1, L2000)),
    };

    let supplier = InMemorySupplier::new(isd_policy_paths());
    let mut verifier = ScriptedVerifier::new(&[Verdict::Passed]);

    SelectionOrchestrator::default()
        .run(&ctx(), &supplier, &DeclaredDataplaneBuilder, &mut verifier, &objective)
        .unwrap();

    let report = &verifier.reports[0];
    assert_eq!(report.path_id.0, "compliant");
    assert_eq!(report.metrics.policies, vec![L1000, L2000]);
}

#[test]
fn unsatisfiable_query_falls_back_unfulfilled() {
    let mut paths = isd_policy_paths();
    paths.insert(0, make_path("no-fabrid", &[]));
    let objective = Objective::FabridPolicy {
        query: "0-0#0,0@G1".parse().unwrap(),
        pin: None,
    };

    let supplier = InMemorySupplier::new(paths);
    let mut verifier = ScriptedVerifier::new(&[Verdict::Failed]);

    let verdict = SelectionOrchestrator::default()
        .run(&ctx(), &supplier, &DeclaredDataplaneBuilder, &mut verifier, &objective)
        .unwrap();

    assert_eq!(verdict, Verdict::Failed);
    let report = &verifier.reports[0];
    assert_eq!(report.path_id.0, "isd1-wrong");
    assert!(!report.objective_fulfilled);
    assert!(report.metrics.policies.is_empty());
}

// ─── Multipath ─────────────────────────────────────────────────────────

fn rotation_paths() -> Vec<Path> {
    (0..4)
        .map(|i| make_path(&format!("p{}", i), &[("1-ff00:0:111", 10 + i, 20 + i)]))
        .collect()
}

#[test]
fn multipath_reports_requested_paths_in_order() {
    let supplier = InMemorySupplier::new(rotation_paths());
    let mut verifier = ScriptedVerifier::new(&[
        Verdict::Continue { additional_paths: 2 },
        Verdict::Continue { additional_paths: 0 },
        Verdict::Continue { additional_paths: 1 },
        Verdict::Failed,
    ]);

    let verdict = SelectionOrchestrator::default()
        .run_multipath(&ctx(), &supplier, &mut verifier)
        .unwrap();

    assert_eq!(verdict, Verdict::Failed);
    assert_eq!(verifier.reported_ids(), vec!["p0", "p1", "p2", "p3"]);
}

#[test]
fn multipath_stops_at_first_pass() {
    let supplier = InMemorySupplier::new(rotation_paths());
    let mut verifier = ScriptedVerifier::new(&[
        Verdict::Continue { additional_paths: 3 },
        Verdict::Passed,
    ]);

    let verdict = SelectionOrchestrator::default()
        .run_multipath(&ctx(), &supplier, &mut verifier)
        .unwrap();

    assert_eq!(verdict, Verdict::Passed);
    assert_eq!(verifier.reported_ids(), vec!["p0", "p1"]);
}

#[test]
fn multipath_not_enough_paths() {
    let supplier = InMemorySupplier::new(rotation_paths());
    let mut verifier = ScriptedVerifier::new(&[Verdict::Continue { additional_paths: 4 }]);

    let err = SelectionOrchestrator::default()
        .run_multipath(&ctx(), &supplier, &mut verifier)
        .unwrap_err();

    assert!(matches!(
        err,
        SelectorError::NotEnoughPaths { needed: 4, available: 3 }
    ));
    assert_eq!(verifier.reports.len(), 1);
}
