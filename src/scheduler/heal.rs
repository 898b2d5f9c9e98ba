//! The graph healer (component D): two entry points that rebuild a
//! consistent view of `waiting`/`waiting_data`/`ready`/`released` from raw
//! graph shape plus current placement. `heal` runs after every
//! `update-graph`; `heal_missing_data` runs after a worker or client reports
//! data loss.

use std::collections::{HashSet, VecDeque};

use crate::common::Key;
use crate::scheduler::graph::GraphState;

/// Rebuild `waiting`, `waiting_data`, `ready`, `released` and
/// `finished_results` from `dependencies`/`dependents`/`who_has` plus the
/// current `stacks`/`processing` placement. Idempotent: healing an already
/// healed state is a no-op (§8 property 3).
pub fn heal(state: &mut GraphState) {
    // 1. walk ancestors of every output key (no dependents, or explicitly
    // wanted) to find the set of keys still worth tracking.
    let outputs: Vec<Key> = state
        .dependents
        .iter()
        .filter(|(k, ds)| ds.is_empty() || state.is_wanted(k))
        .map(|(k, _)| k.clone())
        .chain(state.who_wants.keys().cloned())
        .collect();

    let mut accessible: HashSet<Key> = HashSet::new();
    let mut frontier: VecDeque<Key> = outputs.into_iter().collect();
    while let Some(k) = frontier.pop_front() {
        if !accessible.insert(k.clone()) {
            continue;
        }
        // A key already in memory is accessible, but its inputs are done
        // with: don't walk past the in-memory boundary, or every ancestor of
        // a finished result stays live forever.
        if state.who_has.contains_key(&k) {
            continue;
        }
        if let Some(deps) = state.dependencies.get(&k) {
            for d in deps {
                if !accessible.contains(d) {
                    frontier.push_back(d.clone());
                }
            }
        }
    }

    // 2. cull anything previously tracked that fell out of the accessible set.
    let previously_tracked: HashSet<Key> = state
        .waiting
        .keys()
        .cloned()
        .chain(state.ready.iter().cloned())
        .chain(state.stacks.values().flatten().cloned())
        .chain(state.processing.values().flatten().cloned())
        .chain(state.who_has.keys().cloned())
        .collect();
    for k in previously_tracked.difference(&accessible) {
        state.waiting.remove(k);
        state.waiting_data.remove(k);
        state.released.insert(k.clone());
    }
    state.ready.retain(|k| accessible.contains(k));
    for stack in state.stacks.values_mut() {
        stack.retain(|k| accessible.contains(k));
    }
    for procs in state.processing.values_mut() {
        procs.retain(|k| accessible.contains(k));
    }

    // 5. demote stacked/processing keys whose inputs are no longer all in memory.
    let mut demote = Vec::new();
    for (w, stack) in state.stacks.iter() {
        for k in stack {
            if !inputs_in_memory(state, k) {
                demote.push((w.clone(), k.clone(), false));
            }
        }
    }
    for (w, procs) in state.processing.iter() {
        for k in procs {
            if !inputs_in_memory(state, k) {
                demote.push((w.clone(), k.clone(), true));
            }
        }
    }
    for (w, k, was_processing) in &demote {
        if *was_processing {
            state.processing.get_mut(w).unwrap().remove(k);
        } else {
            state.stacks.get_mut(w).unwrap().retain(|x| x != k);
        }
    }
    let demoted: HashSet<Key> = demote.iter().map(|(_, k, _)| k.clone()).collect();

    // 3. (re)compute waiting + promote newly-runnable keys to ready.
    let placed: HashSet<Key> = state
        .stacks
        .values()
        .flatten()
        .cloned()
        .chain(state.processing.values().flatten().cloned())
        .collect();
    state.ready.retain(|k| !demoted.contains(k));
    let mut new_ready = Vec::new();
    for k in &accessible {
        if state.who_has.contains_key(k) {
            state.waiting.remove(k);
            continue;
        }
        let deps = state.dependencies.get(k).cloned().unwrap_or_default();
        let still_waiting: HashSet<Key> = deps
            .into_iter()
            .filter(|d| !state.who_has.contains_key(d))
            .collect();
        if still_waiting.is_empty() {
            state.waiting.remove(k);
            if !placed.contains(k) || demoted.contains(k) {
                if !state.ready.contains(k) {
                    new_ready.push(k.clone());
                }
            }
        } else {
            state.waiting.insert(k.clone(), still_waiting);
        }
    }
    for k in new_ready {
        state.ready.push_back(k);
    }

    // 4. waiting_data: live, unfinished dependents.
    for k in &accessible {
        let dependents = state.dependents.get(k).cloned().unwrap_or_default();
        let wd: HashSet<Key> = dependents
            .into_iter()
            .filter(|d| accessible.contains(d) && !state.who_has.contains_key(d))
            .collect();
        state.waiting_data.insert(k.clone(), wd);
    }

    // 6. finished_results: in-memory keys that some client actually wants.
    state.finished_results = state
        .who_has
        .keys()
        .filter(|k| state.is_wanted(k))
        .cloned()
        .collect();

    state.in_play = accessible;
}

fn inputs_in_memory(state: &GraphState, key: &Key) -> bool {
    state
        .dependencies
        .get(key)
        .map_or(true, |deps| deps.iter().all(|d| state.who_has.contains_key(d)))
}

/// For each lost key, walk its dependents transitively (they can no longer be
/// in memory either, since their input just vanished) and reinstate
/// `waiting`/`waiting_data` for the whole cone. Returns the subset that is
/// immediately ready again (i.e. had no other missing input).
pub fn heal_missing_data(state: &mut GraphState, lost: &[Key]) -> HashSet<Key> {
    let mut affected: HashSet<Key> = HashSet::new();
    let mut frontier: VecDeque<Key> = lost.iter().cloned().collect();
    while let Some(k) = frontier.pop_front() {
        if !affected.insert(k.clone()) {
            continue;
        }
        state.who_has.remove(&k);
        for w in state.has_what.values_mut() {
            w.remove(&k);
        }
        if let Some(dependents) = state.dependents.get(&k).cloned() {
            for d in dependents {
                if state.in_play.contains(&d) {
                    frontier.push_back(d);
                }
            }
        }
    }

    for k in &affected {
        let deps = state.dependencies.get(k).cloned().unwrap_or_default();
        let still_waiting: HashSet<Key> = deps
            .into_iter()
            .filter(|d| !state.who_has.contains_key(d))
            .collect();
        state.waiting.insert(k.clone(), still_waiting);
        for w in state.stacks.values_mut() {
            w.retain(|x| x != k);
        }
        for p in state.processing.values_mut() {
            p.remove(k);
        }
    }

    heal(state);

    affected
        .into_iter()
        .filter(|k| state.ready.contains(k))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{RawKey, WorkerAddr};

    fn k(s: &str) -> Key {
        RawKey::Str(s.to_string()).canonicalize()
    }

    fn chain_graph() -> GraphState {
        let mut g = GraphState::new();
        let (x, y) = (k("x"), k("y"));
        g.dependencies.insert(x.clone(), HashSet::new());
        g.dependencies.insert(y.clone(), [x.clone()].into_iter().collect());
        g.dependents.insert(x.clone(), [y.clone()].into_iter().collect());
        g.dependents.insert(y.clone(), HashSet::new());
        g.who_wants.insert(y.clone(), Default::default());
        g.who_wants
            .get_mut(&y)
            .unwrap()
            .insert(crate::common::ClientId::new("client"));
        g
    }

    #[test]
    fn heal_from_scratch_matches_dask_test_heal() {
        let mut g = chain_graph();
        heal(&mut g);
        assert!(g.waiting[&k("y")].contains(&k("x")));
        assert!(g.ready.contains(&k("x")));
        assert!(g.released.is_empty());
    }

    #[test]
    fn heal_is_idempotent() {
        let mut g = chain_graph();
        heal(&mut g);
        let waiting_before = g.waiting.clone();
        let ready_before = g.ready.clone();
        heal(&mut g);
        assert_eq!(g.waiting, waiting_before);
        assert_eq!(g.ready, ready_before);
    }

    #[test]
    fn heal_releases_ancestor_of_in_memory_result() {
        // y is already in memory; its own dependency x is only reachable by
        // walking past y, so the walk must stop at the who_has boundary and
        // release x rather than keep recomputing it.
        let mut g = chain_graph();
        g.waiting.insert(k("x"), HashSet::new());
        let w = WorkerAddr::new("alice:1");
        g.link_who_has(&k("y"), &w);
        heal(&mut g);
        assert_eq!(g.released, [k("x")].into_iter().collect());
    }

    #[test]
    fn heal_culls_entire_ancestor_chain_behind_in_memory_result() {
        let mut g = GraphState::new();
        let (a, b, x, y) = (k("a"), k("b"), k("x"), k("y"));
        g.dependencies.insert(a.clone(), HashSet::new());
        g.dependencies.insert(b.clone(), [a.clone()].into_iter().collect());
        g.dependencies.insert(x.clone(), [b.clone()].into_iter().collect());
        g.dependencies.insert(y.clone(), [x.clone()].into_iter().collect());
        g.dependents.insert(a.clone(), [b.clone()].into_iter().collect());
        g.dependents.insert(b.clone(), [x.clone()].into_iter().collect());
        g.dependents.insert(x.clone(), [y.clone()].into_iter().collect());
        g.dependents.insert(y.clone(), HashSet::new());
        g.who_wants.insert(y.clone(), Default::default());
        g.who_wants
            .get_mut(&y)
            .unwrap()
            .insert(crate::common::ClientId::new("client"));
        g.waiting.insert(a.clone(), HashSet::new());
        g.waiting.insert(b.clone(), HashSet::new());
        g.waiting.insert(x.clone(), HashSet::new());
        let w = WorkerAddr::new("alice:1");
        g.link_who_has(&y, &w);

        heal(&mut g);
        let released: HashSet<Key> = [a, b, x].into_iter().collect();
        assert_eq!(g.released, released);
    }

    #[test]
    fn heal_culls_unreachable_keys() {
        // A key left over in `ready` from a prior graph generation that is no
        // longer part of `dependencies`/`dependents` at all: it cannot be
        // reached by walking back from any current output, so it is culled.
        let mut g = chain_graph();
        let stray = k("stray");
        g.waiting.insert(stray.clone(), HashSet::new());
        g.ready.push_back(stray.clone());
        heal(&mut g);
        assert!(g.released.contains(&stray));
    }

    #[test]
    fn heal_missing_data_recomputes_descendants() {
        let mut g = chain_graph();
        heal(&mut g);
        let w = WorkerAddr::new("alice:1");
        g.link_who_has(&k("x"), &w);
        g.ready.clear();
        heal(&mut g); // y now ready
        assert!(g.ready.contains(&k("y")));

        let newly_ready = heal_missing_data(&mut g, &[k("x")]);
        assert!(newly_ready.contains(&k("x")));
        assert!(!g.who_has.contains_key(&k("x")));
    }
}
