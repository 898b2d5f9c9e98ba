//! Worker selector (component B): `decide_worker`. A pure function -- it
//! reads the graph state and returns a placement decision, but never
//! mutates anything. Keeping it pure is what makes §8 property 6
//! (`decide_worker` never returns an invalid candidate) checkable without
//! any event-loop machinery.

use crate::common::{Key, WorkerAddr};
use crate::errors::{ErrorKind, Result};
use crate::scheduler::graph::GraphState;

/// Choose a worker to run `key` on, or `Ok(None)` if the cluster has no
/// workers at all. Fails with `NoMatchingWorker` only when `key` carries a
/// hard restriction no online worker satisfies.
pub fn decide_worker(state: &GraphState, key: &Key) -> Result<Option<WorkerAddr>> {
    let all_workers: Vec<WorkerAddr> = state.stacks.keys().cloned().collect();

    let candidates = match state.restrictions.get(key) {
        None => all_workers,
        Some(hosts) => {
            let restricted: Vec<WorkerAddr> = all_workers
                .iter()
                .filter(|w| hosts.contains(w.hostname()))
                .cloned()
                .collect();
            if restricted.is_empty() {
                if state.loose_restrictions.contains(key) {
                    all_workers
                } else {
                    return Err(ErrorKind::NoMatchingWorker(key.to_string()).into());
                }
            } else {
                restricted
            }
        }
    };

    if candidates.is_empty() {
        return Ok(None);
    }

    let deps = state.dependencies.get(key).cloned().unwrap_or_default();
    let bytes_local = |w: &WorkerAddr| -> u64 {
        deps.iter()
            .filter(|d| state.who_has.get(*d).map_or(false, |hs| hs.contains(w)))
            .map(|d| state.nbytes.get(d).copied().unwrap_or(0))
            .sum()
    };
    let load = |w: &WorkerAddr| -> usize {
        state.stacks.get(w).map_or(0, Vec::len) + state.processing.get(w).map_or(0, |s| s.len())
    };

    let best = candidates
        .into_iter()
        .map(|w| {
            let score = bytes_local(&w);
            let l = load(&w);
            (w, score, l)
        })
        .min_by(|(w1, s1, l1), (w2, s2, l2)| {
            // maximize score, then minimize load, then lexicographic address.
            s2.cmp(s1)
                .then(l1.cmp(l2))
                .then(w1.as_str().cmp(w2.as_str()))
        })
        .map(|(w, _, _)| w);

    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::RawKey;
    use std::collections::HashSet;

    fn k(s: &str) -> Key {
        RawKey::Str(s.to_string()).canonicalize()
    }

    fn mk_state(workers: &[&str]) -> GraphState {
        let mut g = GraphState::new();
        for w in workers {
            let w = WorkerAddr::new(*w);
            g.stacks.insert(w.clone(), Vec::new());
            g.processing.insert(w.clone(), HashSet::new());
            g.ncores.insert(w, 4);
        }
        g
    }

    #[test]
    fn empty_cluster_returns_none() {
        let g = GraphState::new();
        assert_eq!(decide_worker(&g, &k("x")).unwrap(), None);
    }

    #[test]
    fn hard_restriction_picks_among_allowed() {
        let g = mk_state(&["alice:8000", "bob:8000", "charlie:8000"]);
        let mut g = g;
        g.restrictions.insert(
            k("x"),
            ["alice", "charlie"].iter().map(|s| s.to_string()).collect(),
        );
        let chosen = decide_worker(&g, &k("x")).unwrap().unwrap();
        assert!(chosen.hostname() == "alice" || chosen.hostname() == "charlie");
    }

    #[test]
    fn impossible_hard_restriction_fails() {
        let mut g = mk_state(&["bob:8000"]);
        g.restrictions.insert(
            k("x"),
            ["david", "ethel"].iter().map(|s| s.to_string()).collect(),
        );
        assert!(decide_worker(&g, &k("x")).is_err());
    }

    #[test]
    fn loose_restriction_falls_back() {
        let mut g = mk_state(&["bob:8000"]);
        g.restrictions.insert(
            k("x"),
            ["david", "ethel"].iter().map(|s| s.to_string()).collect(),
        );
        g.loose_restrictions.insert(k("x"));
        let chosen = decide_worker(&g, &k("x")).unwrap().unwrap();
        assert_eq!(chosen.hostname(), "bob");
    }

    #[test]
    fn data_locality_breaks_ties() {
        let mut g = mk_state(&["alice:1", "bob:1"]);
        let x = k("x");
        let y = k("y");
        g.dependencies.insert(y.clone(), [x.clone()].into_iter().collect());
        g.nbytes.insert(x.clone(), 100);
        g.link_who_has(&x, &WorkerAddr::new("alice:1"));
        let chosen = decide_worker(&g, &y).unwrap().unwrap();
        assert_eq!(chosen.hostname(), "alice");
    }

    #[test]
    fn load_breaks_ties_when_locality_is_equal() {
        let mut g = mk_state(&["alice:1", "bob:1"]);
        g.stacks.get_mut(&WorkerAddr::new("alice:1")).unwrap().push(k("busy"));
        let chosen = decide_worker(&g, &k("x")).unwrap().unwrap();
        assert_eq!(chosen.hostname(), "bob");
    }
}
