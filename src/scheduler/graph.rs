//! The graph state store (component A). Holds every entity from the data
//! model and enforces *local* consistency on the handful of bidirectional
//! maps (`who_has`/`has_what`, `who_wants`/`wants_what`). Global invariants
//! (1-8) are checked on demand by [`GraphState::validate`]; the store itself
//! does not decide *when* to mutate -- that is the lifecycle engine's job.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::common::{ClientId, Key, Payload, WorkerAddr};
use crate::errors::{ErrorKind, Result};

/// Toggled by the `--strict` CLI flag / `SKEIN_STRICT_MODE` (see `config.rs`).
/// When set, every mutator that touches more than one map also runs a full
/// `validate()` pass, treating a failure as non-recoverable.
pub static DEBUG_CHECK_CONSISTENCY: AtomicBool = AtomicBool::new(false);

/// Implemented by anything that can assert its own internal consistency.
/// `check_consistency_opt` is the cheap, call-site-friendly variant gated on
/// [`DEBUG_CHECK_CONSISTENCY`]; only tests and `--strict` runs pay for it.
pub trait ConsistencyCheck {
    fn check_consistency(&self) -> Result<()>;

    fn check_consistency_opt(&self) -> Result<()> {
        if DEBUG_CHECK_CONSISTENCY.load(Ordering::Relaxed) {
            self.check_consistency()
        } else {
            Ok(())
        }
    }
}

/// Root cause of an erred key: the exception/traceback pair plus the key
/// where the failure actually originated (propagated unchanged to every
/// descendant per §4.C).
#[derive(Clone, Debug)]
pub struct ErredInfo {
    pub exception: String,
    pub traceback: String,
    pub root: Key,
}

#[derive(Default)]
pub struct GraphState {
    pub dependencies: HashMap<Key, HashSet<Key>>,
    pub dependents: HashMap<Key, HashSet<Key>>,

    pub waiting: HashMap<Key, HashSet<Key>>,
    pub waiting_data: HashMap<Key, HashSet<Key>>,
    pub ready: VecDeque<Key>,

    pub stacks: HashMap<WorkerAddr, Vec<Key>>,
    pub processing: HashMap<WorkerAddr, HashSet<Key>>,

    pub who_has: HashMap<Key, HashSet<WorkerAddr>>,
    pub has_what: HashMap<WorkerAddr, HashSet<Key>>,

    pub nbytes: HashMap<Key, u64>,
    pub task_types: HashMap<Key, String>,
    pub ncores: HashMap<WorkerAddr, usize>,

    pub who_wants: HashMap<Key, HashSet<ClientId>>,
    pub wants_what: HashMap<ClientId, HashSet<Key>>,

    pub restrictions: HashMap<Key, HashSet<String>>,
    pub loose_restrictions: HashSet<Key>,

    pub in_play: HashSet<Key>,
    pub finished_results: HashSet<Key>,
    pub released: HashSet<Key>,
    pub erred: HashMap<Key, ErredInfo>,

    pub payloads: HashMap<Key, Payload>,
}

impl GraphState {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn knows_worker(&self, worker: &WorkerAddr) -> bool {
        self.ncores.contains_key(worker)
    }

    // -- coupled mutators: the store's one job is to keep these pairs in sync --

    pub fn link_who_has(&mut self, key: &Key, worker: &WorkerAddr) {
        self.who_has
            .entry(key.clone())
            .or_insert_with(HashSet::new)
            .insert(worker.clone());
        self.has_what
            .entry(worker.clone())
            .or_insert_with(HashSet::new)
            .insert(key.clone());
    }

    pub fn unlink_who_has(&mut self, key: &Key, worker: &WorkerAddr) {
        if let Some(workers) = self.who_has.get_mut(key) {
            workers.remove(worker);
            if workers.is_empty() {
                self.who_has.remove(key);
            }
        }
        if let Some(keys) = self.has_what.get_mut(worker) {
            keys.remove(key);
            if keys.is_empty() {
                self.has_what.remove(worker);
            }
        }
    }

    pub fn link_wants(&mut self, key: &Key, client: &ClientId) {
        self.who_wants
            .entry(key.clone())
            .or_insert_with(HashSet::new)
            .insert(client.clone());
        self.wants_what
            .entry(client.clone())
            .or_insert_with(HashSet::new)
            .insert(key.clone());
    }

    pub fn unlink_wants(&mut self, key: &Key, client: &ClientId) {
        if let Some(clients) = self.who_wants.get_mut(key) {
            clients.remove(client);
            if clients.is_empty() {
                self.who_wants.remove(key);
            }
        }
        if let Some(keys) = self.wants_what.get_mut(client) {
            keys.remove(key);
            if keys.is_empty() {
                self.wants_what.remove(client);
            }
        }
    }

    pub fn is_wanted(&self, key: &Key) -> bool {
        self.who_wants.get(key).map_or(false, |c| !c.is_empty())
    }

    pub fn has_dependents_in_play(&self, key: &Key) -> bool {
        self.waiting_data
            .get(key)
            .map_or(false, |d| !d.is_empty())
    }

    /// Remove `key` from every worker-indexed collection, ignoring ones it
    /// does not currently occupy. Used by `remove_task`/`remove_worker`.
    pub fn forget_placement(&mut self, key: &Key) {
        for workers in self.stacks.values_mut() {
            workers.retain(|k| k != key);
        }
        for keys in self.processing.values_mut() {
            keys.remove(key);
        }
        let workers: Vec<WorkerAddr> = self
            .who_has
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();
        for w in workers {
            self.unlink_who_has(key, &w);
        }
    }

    /// Checks invariants 1-8 from the data model. `allow_overlap` relaxes
    /// invariant 2 (used transiently while `add_worker` folds in a worker's
    /// pre-existing holdings).
    pub fn validate(&self, allow_overlap: bool) -> Result<()> {
        let mut problems = Vec::new();

        // 1. dependents is the exact inverse of dependencies.
        for (k, deps) in &self.dependencies {
            for d in deps {
                if !self.dependents.get(d).map_or(false, |s| s.contains(k)) {
                    problems.push(format!("{} missing from dependents[{}]", k, d));
                }
            }
        }
        for (d, deps) in &self.dependents {
            for k in deps {
                if !self
                    .dependencies
                    .get(k)
                    .map_or(false, |s| s.contains(d))
                {
                    problems.push(format!("{} missing from dependencies[{}]", d, k));
                }
            }
        }

        // 2. each key lives in exactly one place (unless allow_overlap).
        if !allow_overlap {
            for k in self.in_play.iter() {
                let mut locations = 0;
                if self.waiting.contains_key(k) {
                    locations += 1;
                }
                if self.ready.contains(k) {
                    locations += 1;
                }
                if self.stacks.values().any(|s| s.contains(k)) {
                    locations += 1;
                }
                if self.processing.values().any(|s| s.contains(k)) {
                    locations += 1;
                }
                if self.who_has.contains_key(k) {
                    locations += 1;
                }
                if locations > 1 {
                    problems.push(format!("{} occupies {} locations at once", k, locations));
                }
            }
        }

        // 3. waiting[k] subseteq dependencies[k], and no waiting dep is in memory.
        for (k, waiting) in &self.waiting {
            let deps = self.dependencies.get(k).cloned().unwrap_or_default();
            for d in waiting {
                if !deps.contains(d) {
                    problems.push(format!("waiting[{}] contains non-dependency {}", k, d));
                }
                if self.who_has.contains_key(d) {
                    problems.push(format!("waiting[{}] still lists in-memory dep {}", k, d));
                }
            }
        }

        // 4. waiting_data[k] matches live, unfinished dependents.
        for k in self.in_play.iter() {
            let expected: HashSet<Key> = self
                .dependents
                .get(k)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .filter(|d| self.in_play.contains(d) && !self.who_has.contains_key(d))
                .collect();
            let actual = self.waiting_data.get(k).cloned().unwrap_or_default();
            if actual != expected {
                problems.push(format!(
                    "waiting_data[{}] = {:?}, expected {:?}",
                    k,
                    actual.iter().map(|x| x.to_string()).collect::<Vec<_>>(),
                    expected.iter().map(|x| x.to_string()).collect::<Vec<_>>()
                ));
            }
        }

        // 5. ready iff dependencies subseteq who_has and not already placed/finished.
        for k in &self.ready {
            let deps = self.dependencies.get(k).cloned().unwrap_or_default();
            if !deps.iter().all(|d| self.who_has.contains_key(d)) {
                problems.push(format!("{} is ready but a dependency is missing", k));
            }
        }

        // 6. has_what is the exact inverse of who_has.
        for (k, workers) in &self.who_has {
            for w in workers {
                if !self.has_what.get(w).map_or(false, |s| s.contains(k)) {
                    problems.push(format!("{} missing from has_what[{}]", k, w));
                }
            }
        }
        for (w, keys) in &self.has_what {
            for k in keys {
                if !self.who_has.get(k).map_or(false, |s| s.contains(w)) {
                    problems.push(format!("{} missing from who_has[{}]", w, k));
                }
            }
        }

        // 7. total processing never exceeds total cores.
        let total_processing: usize = self.processing.values().map(HashSet::len).sum();
        let total_cores: usize = self.ncores.values().sum();
        if total_processing > total_cores {
            problems.push(format!(
                "{} tasks processing exceeds {} total cores",
                total_processing, total_cores
            ));
        }
        for (w, keys) in &self.processing {
            if let Some(&cores) = self.ncores.get(w) {
                if keys.len() > cores {
                    problems.push(format!("worker {} overbooked: {} > {}", w, keys.len(), cores));
                }
            }
        }

        // 8. who_wants / wants_what mutual inverse.
        for (k, clients) in &self.who_wants {
            for c in clients {
                if !self.wants_what.get(c).map_or(false, |s| s.contains(k)) {
                    problems.push(format!("{} missing from wants_what[{}]", k, c));
                }
            }
        }
        for (c, keys) in &self.wants_what {
            for k in keys {
                if !self.who_wants.get(k).map_or(false, |s| s.contains(c)) {
                    problems.push(format!("{} missing from who_wants[{}]", c, k));
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ErrorKind::InvariantViolation(problems.join("; ")).into())
        }
    }
}

impl ConsistencyCheck for GraphState {
    fn check_consistency(&self) -> Result<()> {
        self.validate(false)
    }
}
