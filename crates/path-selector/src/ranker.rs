//! Metric-based path rankers
//!
//! Each ranker returns the index of the winning path in the input slice. The
//! first path seeds the best candidate and is only replaced by a strictly
//! better one, so ties resolve to the earliest path.

use crate::metrics::{carbon_summary, epic_capable, link_summary, CarbonSummary, LinkSummary};
use crate::{Path, Result, SelectorError};
use std::cmp::Ordering;
use tracing::{debug, info};

/// Lowest total carbon intensity
///
/// Complete paths beat incomplete ones, then fewer missing links, then lower
/// total intensity.
pub fn lowest_carbon(paths: &[Path]) -> Result<usize> {
    if paths.is_empty() {
        return Err(SelectorError::NoPathsAvailable);
    }

    let summaries: Vec<CarbonSummary> = paths.iter().map(carbon_summary).collect();
    let best = first_minimum(0..paths.len(), |a, b| {
        compare_carbon(&summaries[a], &summaries[b])
    });

    info!(
        "Lowest carbon path {} ({:.3} gCO2/TB, {} missing)",
        paths[best].id, summaries[best].total, summaries[best].missing
    );
    Ok(best)
}

fn compare_carbon(a: &CarbonSummary, b: &CarbonSummary) -> Ordering {
    b.complete
        .cmp(&a.complete)
        .then(a.missing.cmp(&b.missing))
        .then(a.total.total_cmp(&b.total))
}

/// Highest bottleneck bandwidth among paths within `bound_ms` total latency
///
/// Survivors rank by completeness, fewer missing entries, higher bottleneck
/// bandwidth (unknown is worst) and finally fewer interface crossings.
pub fn best_bandwidth(paths: &[Path], bound_ms: f64) -> Result<usize> {
    if !bound_ms.is_finite() || bound_ms < 0.0 {
        return Err(SelectorError::InvalidLatencyBound(bound_ms));
    }
    if paths.is_empty() {
        return Err(SelectorError::NoPathsAvailable);
    }

    let summaries: Vec<LinkSummary> = paths.iter().map(link_summary).collect();
    let within: Vec<usize> = (0..paths.len())
        .filter(|&i| {
            let keep = summaries[i].total_latency_ms <= bound_ms;
            if !keep {
                debug!(
                    "Dropping {}: {:.3}ms exceeds bound {:.3}ms",
                    paths[i].id, summaries[i].total_latency_ms, bound_ms
                );
            }
            keep
        })
        .collect();

    if within.is_empty() {
        return Err(SelectorError::NoPathWithinBound {
            bound_ms,
            evaluated: paths.len(),
        });
    }

    let best = first_minimum(within, |a, b| compare_links(&summaries[a], &summaries[b]));

    info!(
        "Best bandwidth path {} ({:?}kbps, {:.3}ms)",
        paths[best].id, summaries[best].bottleneck_kbps, summaries[best].total_latency_ms
    );
    Ok(best)
}

fn compare_links(a: &LinkSummary, b: &LinkSummary) -> Ordering {
    b.complete
        .cmp(&a.complete)
        .then(a.missing.cmp(&b.missing))
        .then(b.bottleneck_kbps.unwrap_or(0).cmp(&a.bottleneck_kbps.unwrap_or(0)))
        .then(a.crossings.cmp(&b.crossings))
}

/// Shortest path, preferring EPIC-capable ones when any exist
///
/// Equal lengths are broken by comparing interface IDs position by position.
pub fn epic_path(paths: &[Path]) -> Result<usize> {
    if paths.is_empty() {
        return Err(SelectorError::NoPathsAvailable);
    }

    let capable: Vec<usize> = (0..paths.len()).filter(|&i| epic_capable(&paths[i])).collect();
    let pool: Vec<usize> = if capable.is_empty() {
        debug!("No EPIC-capable path among {}", paths.len());
        (0..paths.len()).collect()
    } else {
        capable
    };

    let best = first_minimum(pool, |a, b| compare_shortest(&paths[a], &paths[b]));

    info!(
        "EPIC path {} ({} crossings, capable={})",
        paths[best].id,
        paths[best].crossings(),
        epic_capable(&paths[best])
    );
    Ok(best)
}

fn compare_shortest(a: &Path, b: &Path) -> Ordering {
    a.crossings().cmp(&b.crossings()).then_with(|| {
        a.interfaces
            .iter()
            .map(|i| i.id)
            .cmp(b.interfaces.iter().map(|i| i.id))
    })
}

/// First index whose key is not beaten by any later one
fn first_minimum<I, F>(indices: I, mut compare: F) -> usize
where
    I: IntoIterator<Item = usize>,
    F: FnMut(usize, usize) -> Ordering,
{
    let mut iter = indices.into_iter();
    let mut best = iter.next().unwrap_or(0);
    for i in iter {
        if compare(i, best) == Ordering::Less {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::path;
    use proptest::prelude::*;

    fn carbon_path(id: &str, carbon: Vec<Option<i64>>) -> Path {
        let mut p = path(id, &[(1, 1), (2, 2)]);
        p.metadata.carbon_intensity = carbon;
        p
    }

    fn link_path(id: &str, latency: Vec<Option<f64>>, bandwidth: Vec<Option<u64>>) -> Path {
        let mut p = path(id, &[(1, 1), (2, 2)]);
        p.metadata.latency_ms = latency;
        p.metadata.bandwidth_kbps = bandwidth;
        p
    }

    fn epic(id: &str, ids: &[u64], capable: bool) -> Path {
        let crossings: Vec<(u64, u64)> = ids.iter().enumerate().map(|(i, id)| (i as u64, *id)).collect();
        let mut p = path(id, &crossings);
        p.metadata.epic_capable = capable;
        p
    }

    #[test]
    fn test_carbon_prefers_lowest_total() {
        let paths = vec![
            carbon_path("a", vec![Some(300)]),
            carbon_path("b", vec![Some(100), Some(50)]),
            carbon_path("c", vec![Some(200)]),
        ];
        assert_eq!(lowest_carbon(&paths).unwrap(), 1);
    }

    #[test]
    fn test_carbon_complete_beats_incomplete() {
        let paths = vec![
            carbon_path("partial", vec![Some(1), None]),
            carbon_path("empty", vec![]),
            carbon_path("complete", vec![Some(5_000)]),
        ];
        assert_eq!(lowest_carbon(&paths).unwrap(), 2);

        // Among incomplete paths, fewer missing wins
        let paths = vec![
            carbon_path("two-missing", vec![None, None, Some(1)]),
            carbon_path("one-missing", vec![None, Some(900)]),
        ];
        assert_eq!(lowest_carbon(&paths).unwrap(), 1);
    }

    #[test]
    fn test_carbon_tie_keeps_first() {
        let paths = vec![
            carbon_path("a", vec![Some(10)]),
            carbon_path("b", vec![Some(10)]),
        ];
        assert_eq!(lowest_carbon(&paths).unwrap(), 0);
        assert!(matches!(lowest_carbon(&[]), Err(SelectorError::NoPathsAvailable)));
    }

    #[test]
    fn test_bandwidth_respects_bound() {
        let paths = vec![
            link_path("50", vec![Some(50.0)], vec![Some(100)]),
            link_path("80", vec![Some(80.0)], vec![Some(200)]),
            link_path("150", vec![Some(150.0)], vec![Some(10_000)]),
        ];
        assert_eq!(best_bandwidth(&paths, 100.0).unwrap(), 1);
        assert_eq!(best_bandwidth(&paths, 60.0).unwrap(), 0);
    }

    #[test]
    fn test_bandwidth_errors() {
        assert!(matches!(best_bandwidth(&[], 100.0), Err(SelectorError::NoPathsAvailable)));

        let paths = vec![link_path("slow", vec![Some(500.0)], vec![Some(1)])];
        assert!(matches!(
            best_bandwidth(&paths, 100.0),
            Err(SelectorError::NoPathWithinBound { evaluated: 1, .. })
        ));
        assert!(matches!(
            best_bandwidth(&paths, f64::NAN),
            Err(SelectorError::InvalidLatencyBound(_))
        ));
        assert!(matches!(
            best_bandwidth(&paths, -1.0),
            Err(SelectorError::InvalidLatencyBound(_))
        ));
    }

    #[test]
    fn test_bandwidth_unknown_is_worst() {
        let paths = vec![
            link_path("unknown", vec![Some(10.0)], vec![None]),
            link_path("slow", vec![Some(10.0)], vec![Some(1)]),
        ];
        assert_eq!(best_bandwidth(&paths, 100.0).unwrap(), 1);
    }

    #[test]
    fn test_bandwidth_fewer_crossings_breaks_tie() {
        let mut long = link_path("long", vec![Some(10.0)], vec![Some(500)]);
        long.interfaces.extend(path("x", &[(3, 3), (3, 4)]).interfaces);
        let short = link_path("short", vec![Some(10.0)], vec![Some(500)]);

        assert_eq!(best_bandwidth(&[long, short], 100.0).unwrap(), 1);
    }

    #[test]
    fn test_epic_prefers_capable_then_shortest() {
        let paths = vec![
            epic("a", &[1, 2], false),
            epic("b", &[1, 2, 3], true),
            epic("c", &[1, 1], true),
        ];
        assert_eq!(epic_path(&paths).unwrap(), 2);
    }

    #[test]
    fn test_epic_lexicographic_interfaces() {
        let paths = vec![epic("a", &[3, 1], false), epic("b", &[2, 9], false)];
        assert_eq!(epic_path(&paths).unwrap(), 1);
    }

    fn arb_path() -> impl Strategy<Value = Path> {
        (
            prop::collection::vec((1u64..5, 1u64..20), 0..6),
            prop::collection::vec(prop::option::of(-5i64..500), 0..4),
            prop::collection::vec(prop::option::of(0.0f64..200.0), 0..4),
            prop::collection::vec(prop::option::of(0u64..1_000), 0..4),
            any::<bool>(),
        )
            .prop_map(|(crossings, carbon, latency, bandwidth, capable)| {
                let mut p = path("p", &crossings);
                p.metadata.carbon_intensity = carbon;
                p.metadata.latency_ms = latency;
                p.metadata.bandwidth_kbps = bandwidth;
                p.metadata.epic_capable = capable;
                p
            })
    }

    proptest! {
        #[test]
        fn test_rankers_return_input_index(paths in prop::collection::vec(arb_path(), 1..8)) {
            prop_assert!(lowest_carbon(&paths).unwrap() < paths.len());
            prop_assert!(epic_path(&paths).unwrap() < paths.len());
            if let Ok(i) = best_bandwidth(&paths, 150.0) {
                prop_assert!(i < paths.len());
                prop_assert!(link_summary(&paths[i]).total_latency_ms <= 150.0);
            }
        }

        #[test]
        fn test_complete_carbon_always_wins(paths in prop::collection::vec(arb_path(), 1..8)) {
            let best = lowest_carbon(&paths).unwrap();
            let any_complete = paths.iter().any(|p| carbon_summary(p).complete);
            prop_assert_eq!(carbon_summary(&paths[best]).complete, any_complete);
        }

        #[test]
        fn test_epic_capable_partition(paths in prop::collection::vec(arb_path(), 1..8)) {
            let best = epic_path(&paths).unwrap();
            let any_capable = paths.iter().any(|p| p.metadata.epic_capable);
            prop_assert_eq!(paths[best].metadata.epic_capable, any_capable);
        }
    }
}
