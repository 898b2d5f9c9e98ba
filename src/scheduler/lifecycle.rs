//! The task lifecycle engine (component C) plus the dispatch step and the
//! top-level event-loop entry point (component E). This is the only piece
//! that mutates [`GraphState`] in response to external events; the graph
//! store itself just holds data, and [`decide_worker`]/[`heal`] are pure
//! transforms it calls out to.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use log::warn;
use tokio::sync::mpsc::UnboundedSender;

use crate::common::{ClientId, Key, Payload, WorkerAddr};
use crate::errors::{ErrorKind, Result};
use crate::scheduler::events::{
    ClientCommand, ClientNotification, Event, GraphUpdate, WorkerCommand, WorkerReply,
};
use crate::scheduler::feed::FeedService;
use crate::scheduler::graph::{ConsistencyCheck, ErredInfo, GraphState};
use crate::scheduler::heal::{heal, heal_missing_data};
use crate::scheduler::selector::decide_worker;

/// Owns the graph state plus the outbound queues needed to talk back to
/// clients and workers. One `Engine` per scheduler process; everything runs
/// on a single task, with no internal locking -- the whole point is that
/// only one place ever mutates the graph at a time.
#[derive(Default)]
pub struct Engine {
    pub graph: GraphState,
    client_queues: std::collections::HashMap<ClientId, UnboundedSender<ClientNotification>>,
    worker_queues: std::collections::HashMap<WorkerAddr, UnboundedSender<WorkerCommand>>,
    feed: FeedService,
    feed_owners: HashMap<u64, ClientId>,
}

impl Engine {
    pub fn new() -> Self {
        Default::default()
    }

    /// Register a client's outbound report queue (§6: `register-client`).
    /// The queue handle itself comes from the transport layer, which is why
    /// this is a distinct method rather than something reachable through
    /// [`Event`].
    pub fn register_client(&mut self, client: ClientId, queue: UnboundedSender<ClientNotification>) {
        self.client_queues.insert(client.clone(), queue);
        self.notify_client(&client, ClientNotification::StreamStart);
    }

    /// Register a worker's outbound compute queue and seed its graph-side
    /// bookkeeping. `keys` are data the worker already holds (e.g. rejoining
    /// after a reconnect).
    pub fn register_worker(
        &mut self,
        address: WorkerAddr,
        ncores: usize,
        keys: Option<Vec<Key>>,
        queue: UnboundedSender<WorkerCommand>,
    ) -> Result<()> {
        if self.graph.knows_worker(&address) {
            return Err(ErrorKind::InvariantViolation(format!("worker {} already registered", address)).into());
        }
        self.graph.stacks.insert(address.clone(), Vec::new());
        self.graph.processing.insert(address.clone(), HashSet::new());
        self.graph.ncores.insert(address.clone(), ncores);
        self.worker_queues.insert(address.clone(), queue);

        if let Some(keys) = keys {
            for k in &keys {
                self.graph.link_who_has(k, &address);
                self.graph.in_play.insert(k.clone());
            }
            self.graph.validate(true)?;
            heal(&mut self.graph);
        }
        self.graph.check_consistency_opt()?;
        Ok(())
    }

    /// Subscribe `client` to a named sampler (§4.F / `feed` wire op). The
    /// subscription is ticked from the event loop's timer, not from here.
    pub fn subscribe_feed(&mut self, client: &ClientId, sampler: &str, interval: Duration) -> Result<()> {
        let id = self.feed.subscribe(sampler, interval)?;
        self.feed_owners.insert(id, client.clone());
        Ok(())
    }

    /// Advance every feed subscription's clock by `dt` and push any samples
    /// that came due to their owning client's report queue.
    pub fn tick_feed(&mut self, dt: Duration) {
        let due = self.feed.tick(&self.graph, dt);
        for (id, data) in due {
            if let Some(client) = self.feed_owners.get(&id).cloned() {
                self.notify_client(&client, ClientNotification::Feed { data });
            }
        }
    }

    /// Drain a disconnected client: forget what it wanted, releasing any key
    /// that nothing else still wants and that has no live dependents.
    pub fn remove_client(&mut self, client: &ClientId) -> Result<()> {
        self.client_queues.remove(client);
        let feed_ids: Vec<u64> = self
            .feed_owners
            .iter()
            .filter(|(_, owner)| owner == client)
            .map(|(&id, _)| id)
            .collect();
        for id in feed_ids {
            self.feed.unsubscribe(id);
            self.feed_owners.remove(&id);
        }
        let wanted: Vec<Key> = self
            .graph
            .wants_what
            .get(client)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .collect();
        for k in wanted {
            self.graph.unlink_wants(&k, client);
            self.release_if_unwanted(&k);
        }
        self.graph.check_consistency_opt()?;
        Ok(())
    }

    /// A worker is gone: requeue anything it was holding or running, drop its
    /// replicas, and re-derive `waiting`/`ready` for whatever that leaves
    /// without a copy anywhere.
    pub fn remove_worker(&mut self, address: &WorkerAddr) -> Result<()> {
        if !self.graph.knows_worker(address) {
            return Err(ErrorKind::UnknownWorker(address.to_string()).into());
        }
        self.worker_queues.remove(address);

        let mut requeue: Vec<Key> = Vec::new();
        if let Some(stack) = self.graph.stacks.remove(address) {
            requeue.extend(stack);
        }
        if let Some(procs) = self.graph.processing.remove(address) {
            requeue.extend(procs);
        }
        self.graph.ncores.remove(address);

        let held: Vec<Key> = self
            .graph
            .has_what
            .get(address)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .collect();
        for k in &held {
            self.graph.unlink_who_has(k, address);
        }
        let lost: Vec<Key> = held
            .into_iter()
            .filter(|k| !self.graph.who_has.contains_key(k))
            .collect();

        for k in requeue {
            if !self.graph.ready.contains(&k) {
                self.graph.ready.push_back(k);
            }
        }
        if !lost.is_empty() {
            heal_missing_data(&mut self.graph, &lost);
        }
        heal(&mut self.graph);
        self.graph.check_consistency_opt()?;
        Ok(())
    }

    /// Merge a newly submitted graph fragment in and re-derive reachability.
    /// Already-accepted tasks from earlier calls are never rolled back: a
    /// restriction that turns out to be unsatisfiable only fails *this* call.
    pub fn update_graph(&mut self, update: GraphUpdate) -> Result<()> {
        for (k, payload) in update.tasks {
            self.graph.payloads.insert(k.clone(), payload);
            self.graph.dependencies.entry(k.clone()).or_insert_with(HashSet::new);
            self.graph.dependents.entry(k).or_insert_with(HashSet::new);
        }
        for (k, deps) in &update.dependencies {
            self.graph
                .dependencies
                .entry(k.clone())
                .or_insert_with(HashSet::new)
                .extend(deps.iter().cloned());
            for d in deps {
                self.graph
                    .dependents
                    .entry(d.clone())
                    .or_insert_with(HashSet::new)
                    .insert(k.clone());
                self.graph.dependencies.entry(d.clone()).or_insert_with(HashSet::new);
            }
        }
        if let Some(restrictions) = update.restrictions {
            self.graph.restrictions.extend(restrictions);
        }
        if let Some(loose) = update.loose_restrictions {
            self.graph.loose_restrictions.extend(loose);
        }
        for k in &update.keys {
            self.graph.link_wants(k, &update.client);
            self.graph.in_play.insert(k.clone());
        }

        heal(&mut self.graph);

        let mut failures = Vec::new();
        let mut unplaceable = Vec::new();
        for k in &update.keys {
            if self.graph.restrictions.contains_key(k) && self.graph.ready.contains(k) {
                if let Err(e) = decide_worker(&self.graph, k) {
                    failures.push(format!("{}: {}", k, e));
                    unplaceable.push((k.clone(), e.to_string()));
                }
            }
        }
        if !failures.is_empty() {
            self.notify_client(
                &update.client,
                ClientNotification::UpdateGraphFailed {
                    reason: failures.join("; "),
                },
            );
        }
        // A restriction nothing can satisfy is not a transient dispatch
        // failure: leaving the key in `ready` would have `dispatch` retry
        // `decide_worker` forever. Per §7, report it and erred-cascade
        // instead (§3 property: every reachable key ends in exactly one of
        // memory/ready/waiting/erred/released).
        for (k, reason) in unplaceable {
            self.fail_cascade(k, reason, String::new());
        }

        self.graph.check_consistency_opt()?;
        Ok(())
    }

    /// A worker finished `key`: record the result, wake anything that was
    /// only waiting on it, and release dependencies nothing needs any more.
    pub fn mark_task_finished(&mut self, key: Key, worker: WorkerAddr, nbytes: u64, type_: String) -> Result<()> {
        if let Some(procs) = self.graph.processing.get_mut(&worker) {
            procs.remove(&key);
        }
        self.graph.link_who_has(&key, &worker);
        self.graph.nbytes.insert(key.clone(), nbytes);
        self.graph.task_types.insert(key.clone(), type_.clone());
        self.graph.in_play.insert(key.clone());

        let dependents = self.graph.dependents.get(&key).cloned().unwrap_or_default();
        for d in dependents {
            let now_empty = match self.graph.waiting.get_mut(&d) {
                Some(w) => {
                    w.remove(&key);
                    w.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.graph.waiting.remove(&d);
                if !self.graph.ready.contains(&d) && !self.is_placed_or_done(&d) {
                    self.graph.ready.push_back(d);
                }
            }
        }

        let deps = self.graph.dependencies.get(&key).cloned().unwrap_or_default();
        for p in deps {
            if let Some(wd) = self.graph.waiting_data.get_mut(&p) {
                wd.remove(&key);
            }
            self.release_if_unwanted(&p);
        }

        if self.graph.is_wanted(&key) {
            self.graph.finished_results.insert(key.clone());
        }

        let workers: Vec<WorkerAddr> = self
            .graph
            .who_has
            .get(&key)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .collect();
        let owners: Vec<ClientId> = self.graph.who_wants.get(&key).cloned().unwrap_or_default().into_iter().collect();
        for c in owners {
            self.notify_client(
                &c,
                ClientNotification::KeyInMemory {
                    key: key.clone(),
                    type_: type_.clone(),
                    workers: workers.clone(),
                },
            );
        }

        self.graph.check_consistency_opt()?;
        Ok(())
    }

    /// A worker failed to compute `key`: mark it and every live dependent
    /// erred with the same root cause, since none of them can ever run now.
    pub fn mark_task_erred(&mut self, key: Key, worker: WorkerAddr, exception: String, traceback: String) -> Result<()> {
        if let Some(procs) = self.graph.processing.get_mut(&worker) {
            procs.remove(&key);
        }
        self.fail_cascade(key, exception, traceback);
        self.graph.check_consistency_opt()?;
        Ok(())
    }

    /// Mark `key` and every live dependent erred with the same root cause,
    /// since none of them can ever run once `key` can't. Shared by a worker
    /// reporting a task failure and by an unplaceable restriction found at
    /// `update_graph` time.
    fn fail_cascade(&mut self, key: Key, exception: String, traceback: String) {
        let mut affected: HashSet<Key> = HashSet::new();
        let mut frontier: VecDeque<Key> = VecDeque::new();
        frontier.push_back(key.clone());
        while let Some(k) = frontier.pop_front() {
            if !affected.insert(k.clone()) {
                continue;
            }
            if let Some(deps) = self.graph.dependents.get(&k).cloned() {
                frontier.extend(deps);
            }
        }

        for k in &affected {
            self.graph.waiting.remove(k);
            self.graph.ready.retain(|x| x != k);
            for procs in self.graph.processing.values_mut() {
                procs.remove(k);
            }
            for stack in self.graph.stacks.values_mut() {
                stack.retain(|x| x != k);
            }
            self.graph.erred.insert(
                k.clone(),
                ErredInfo {
                    exception: exception.clone(),
                    traceback: traceback.clone(),
                    root: key.clone(),
                },
            );
        }

        for k in &affected {
            let owners: Vec<ClientId> = self.graph.who_wants.get(k).cloned().unwrap_or_default().into_iter().collect();
            for c in owners {
                self.notify_client(
                    &c,
                    ClientNotification::TaskErred {
                        key: k.clone(),
                        exception: exception.clone(),
                        traceback: traceback.clone(),
                    },
                );
            }
        }
    }

    /// A worker or client reports that `missing` is no longer actually in
    /// memory anywhere it was believed to be. Re-derive the affected cone and
    /// tell every owning client its data was lost.
    pub fn mark_missing_data(&mut self, missing: Vec<Key>) -> Result<()> {
        let owners: Vec<(Key, Vec<ClientId>)> = missing
            .iter()
            .map(|k| (k.clone(), self.graph.who_wants.get(k).cloned().unwrap_or_default().into_iter().collect()))
            .collect();

        let newly_ready = heal_missing_data(&mut self.graph, &missing);
        for k in newly_ready {
            if !self.graph.ready.contains(&k) {
                self.graph.ready.push_back(k);
            }
        }

        for (k, clients) in owners {
            for c in clients {
                self.notify_client(&c, ClientNotification::LostData { key: k.clone() });
            }
        }

        self.graph.check_consistency_opt()?;
        Ok(())
    }

    /// Run the dispatch step: place every ready key onto a worker's stack via
    /// [`decide_worker`], then promote from each stack into `processing` up to
    /// that worker's core count, emitting a compute-task message per
    /// promotion. Safe to call repeatedly -- it is a no-op once `ready` is
    /// empty and every worker is at capacity.
    pub fn dispatch(&mut self) {
        let pending: Vec<Key> = self.graph.ready.drain(..).collect();
        let mut leftover = VecDeque::new();
        let mut unplaceable = Vec::new();
        for key in pending {
            match decide_worker(&self.graph, &key) {
                Ok(Some(w)) => {
                    self.graph.stacks.entry(w).or_insert_with(Vec::new).push(key);
                }
                Ok(None) => leftover.push_back(key),
                // A hard restriction no online worker satisfies is not going
                // to resolve itself by sitting in `ready`; erred-cascade it
                // instead of retrying forever on every dispatch pass.
                Err(e) => {
                    warn!("cannot place {}: {}", key, e);
                    unplaceable.push((key, e.to_string()));
                }
            }
        }
        self.graph.ready = leftover;
        for (key, reason) in unplaceable {
            self.fail_cascade(key, reason, String::new());
        }

        let workers: Vec<WorkerAddr> = self.graph.stacks.keys().cloned().collect();
        for w in workers {
            let cores = self.graph.ncores.get(&w).copied().unwrap_or(0);
            loop {
                let running = self.graph.processing.get(&w).map_or(0, HashSet::len);
                if running >= cores {
                    break;
                }
                let key = match self.graph.stacks.get_mut(&w).and_then(Vec::pop) {
                    Some(k) => k,
                    None => break,
                };
                self.graph
                    .processing
                    .entry(w.clone())
                    .or_insert_with(HashSet::new)
                    .insert(key.clone());
                let payload = self.graph.payloads.get(&key).cloned().unwrap_or_else(|| Payload {
                    function: Vec::new(),
                    args: Vec::new(),
                    kwargs: None,
                });
                self.send_worker(&w, WorkerCommand::ComputeTask { key, payload });
            }
        }
    }

    /// Pop one event off either input stream, apply it, then run dispatch
    /// (§4.E: "pop one event, invoke 4.C, then run dispatch").
    pub fn apply_event(&mut self, event: Event) -> Result<()> {
        match event {
            Event::Client(client, cmd) => self.apply_client_command(client, cmd)?,
            Event::Worker(reply) => self.apply_worker_reply(reply)?,
            Event::RemoveClient(client) => self.remove_client(&client)?,
        }
        self.dispatch();
        Ok(())
    }

    fn apply_client_command(&mut self, client: ClientId, cmd: ClientCommand) -> Result<()> {
        match cmd {
            // Registration itself runs through `register_client`, which needs
            // the real channel handle the transport layer holds; this arm is
            // reachable only if a peer resends the op after registering.
            ClientCommand::RegisterClient => {}
            ClientCommand::UpdateGraph(update) => self.update_graph(update)?,
            ClientCommand::MissingData { missing } => self.mark_missing_data(missing)?,
            ClientCommand::CloseStream | ClientCommand::Close => self.remove_client(&client)?,
            ClientCommand::Feed { sampler, interval_millis } => {
                if let Err(e) = self.subscribe_feed(&client, &sampler, Duration::from_millis(interval_millis)) {
                    warn!("feed subscription for {} failed: {}", client, e);
                }
            }
        }
        Ok(())
    }

    fn apply_worker_reply(&mut self, reply: WorkerReply) -> Result<()> {
        match reply {
            WorkerReply::AddWorker { .. } => {
                // Registration needs the channel handle too; see `register_worker`.
            }
            WorkerReply::RemoveWorker { address } => self.remove_worker(&address)?,
            WorkerReply::TaskFinished { key, worker, nbytes, type_ } => {
                self.mark_task_finished(key, worker, nbytes, type_)?
            }
            WorkerReply::TaskErred { key, worker, exception, traceback } => {
                self.mark_task_erred(key, worker, exception, traceback)?
            }
            WorkerReply::AddKeys { worker, keys } => {
                for k in keys {
                    self.graph.link_who_has(&k, &worker);
                }
                heal(&mut self.graph);
            }
            WorkerReply::RemoveKeys { worker, keys } => {
                for k in &keys {
                    self.graph.unlink_who_has(k, &worker);
                }
                let lost: Vec<Key> = keys.into_iter().filter(|k| !self.graph.who_has.contains_key(k)).collect();
                if !lost.is_empty() {
                    self.mark_missing_data(lost)?;
                }
            }
            WorkerReply::Heartbeat { .. } => {}
        }
        Ok(())
    }

    fn is_placed_or_done(&self, key: &Key) -> bool {
        self.graph.stacks.values().any(|s| s.contains(key))
            || self.graph.processing.values().any(|s| s.contains(key))
            || self.graph.who_has.contains_key(key)
    }

    /// A key nothing wants and with no live dependents is dead weight:
    /// forget its placement and recurse into its own dependencies, since
    /// releasing it may make one of those unwanted too.
    fn release_if_unwanted(&mut self, key: &Key) {
        if self.graph.is_wanted(key) || self.graph.has_dependents_in_play(key) {
            return;
        }
        if !self.graph.in_play.contains(key) {
            return;
        }
        self.graph.forget_placement(key);
        self.graph.waiting.remove(key);
        self.graph.ready.retain(|k| k != key);
        self.graph.waiting_data.remove(key);
        self.graph.in_play.remove(key);
        self.graph.finished_results.remove(key);
        self.graph.released.insert(key.clone());

        let deps = self.graph.dependencies.get(key).cloned().unwrap_or_default();
        for p in deps {
            if let Some(wd) = self.graph.waiting_data.get_mut(&p) {
                wd.remove(key);
            }
            self.release_if_unwanted(&p);
        }
    }

    fn notify_client(&self, client: &ClientId, note: ClientNotification) {
        if let Some(tx) = self.client_queues.get(client) {
            if tx.send(note).is_err() {
                warn!("report queue for client {} is gone, dropping notification", client);
            }
        }
    }

    fn send_worker(&self, worker: &WorkerAddr, cmd: WorkerCommand) {
        if let Some(tx) = self.worker_queues.get(worker) {
            if tx.send(cmd).is_err() {
                warn!("compute queue for worker {} is gone, dropping command", worker);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{CallSpec, RawKey};
    use std::collections::HashMap;
    use tokio::sync::mpsc::unbounded_channel;

    fn k(s: &str) -> Key {
        RawKey::Str(s.to_string()).canonicalize()
    }

    fn payload() -> Payload {
        crate::common::dumps_task(CallSpec::Other(b"noop".to_vec()))
    }

    fn engine_with_worker(addr: &str, cores: usize) -> (Engine, WorkerAddr) {
        let mut engine = Engine::new();
        let w = WorkerAddr::new(addr);
        let (tx, _rx) = unbounded_channel();
        engine.register_worker(w.clone(), cores, None, tx).unwrap();
        (engine, w)
    }

    fn submit_chain(engine: &mut Engine, client: &ClientId) {
        let (x, y) = (k("x"), k("y"));
        let mut tasks = HashMap::new();
        tasks.insert(x.clone(), payload());
        tasks.insert(y.clone(), payload());
        let mut dependencies = HashMap::new();
        dependencies.insert(y.clone(), [x.clone()].into_iter().collect());
        engine
            .update_graph(GraphUpdate {
                tasks,
                dependencies,
                keys: vec![y],
                client: client.clone(),
                restrictions: None,
                loose_restrictions: None,
            })
            .unwrap();
    }

    #[test]
    fn linear_chain_runs_to_completion() {
        let (mut engine, w) = engine_with_worker("alice:1", 2);
        let client = ClientId::new("c1");
        let (tx, _rx) = unbounded_channel();
        engine.register_client(client.clone(), tx);

        submit_chain(&mut engine, &client);
        engine.dispatch();
        assert!(engine.graph.processing[&w].contains(&k("x")));

        engine.mark_task_finished(k("x"), w.clone(), 8, "int".to_string()).unwrap();
        engine.dispatch();
        assert!(engine.graph.processing[&w].contains(&k("y")));

        engine.mark_task_finished(k("y"), w.clone(), 8, "int".to_string()).unwrap();
        assert!(engine.graph.finished_results.contains(&k("y")));
        // x was only wanted as an input to y, and y is done, so x is released.
        assert!(engine.graph.released.contains(&k("x")));
    }

    #[test]
    fn remove_worker_requeues_its_work() {
        let (mut engine, w) = engine_with_worker("alice:1", 2);
        let client = ClientId::new("c1");
        let (tx, _rx) = unbounded_channel();
        engine.register_client(client.clone(), tx);
        submit_chain(&mut engine, &client);
        engine.dispatch();
        assert!(engine.graph.processing[&w].contains(&k("x")));

        engine.remove_worker(&w).unwrap();
        assert!(engine.graph.ready.contains(&k("x")));
        assert!(!engine.graph.knows_worker(&w));
    }

    #[test]
    fn task_erred_propagates_to_dependents() {
        let (mut engine, w) = engine_with_worker("alice:1", 2);
        let client = ClientId::new("c1");
        let (tx, mut rx) = unbounded_channel();
        engine.register_client(client.clone(), tx);
        submit_chain(&mut engine, &client);
        engine.dispatch();

        engine
            .mark_task_erred(k("x"), w, "boom".to_string(), "trace".to_string())
            .unwrap();
        assert!(engine.graph.erred.contains_key(&k("x")));
        assert!(engine.graph.erred.contains_key(&k("y")));
        assert_eq!(engine.graph.erred[&k("y")].root, k("x"));

        let mut saw_y_erred = false;
        while let Ok(note) = rx.try_recv() {
            if let ClientNotification::TaskErred { key, .. } = note {
                if key == k("y") {
                    saw_y_erred = true;
                }
            }
        }
        assert!(saw_y_erred);
    }

    #[test]
    fn remove_client_releases_unwanted_keys() {
        let (mut engine, w) = engine_with_worker("alice:1", 2);
        let client = ClientId::new("c1");
        let (tx, _rx) = unbounded_channel();
        engine.register_client(client.clone(), tx);
        submit_chain(&mut engine, &client);
        engine.dispatch();
        engine.mark_task_finished(k("x"), w.clone(), 8, "int".to_string()).unwrap();
        engine.dispatch();
        engine.mark_task_finished(k("y"), w, 8, "int".to_string()).unwrap();

        engine.remove_client(&client).unwrap();
        assert!(engine.graph.released.contains(&k("y")));
    }

    #[test]
    fn unplaceable_restriction_erreds_instead_of_looping() {
        let (mut engine, _w) = engine_with_worker("alice:1", 2);
        let client = ClientId::new("c1");
        let (tx, mut rx) = unbounded_channel();
        engine.register_client(client.clone(), tx);

        let x = k("x");
        let mut tasks = HashMap::new();
        tasks.insert(x.clone(), payload());
        let mut restrictions = HashMap::new();
        restrictions.insert(x.clone(), ["nobody".to_string()].into_iter().collect());
        engine
            .update_graph(GraphUpdate {
                tasks,
                dependencies: HashMap::new(),
                keys: vec![x.clone()],
                client: client.clone(),
                restrictions: Some(restrictions),
                loose_restrictions: None,
            })
            .unwrap();

        // The key must not be left sitting in `ready` to be retried forever.
        assert!(!engine.graph.ready.contains(&x));
        assert!(engine.graph.erred.contains_key(&x));

        engine.dispatch();
        assert!(engine.graph.ready.is_empty());
        assert!(!engine.graph.erred.is_empty());

        let mut saw_failed = false;
        while let Ok(note) = rx.try_recv() {
            if matches!(note, ClientNotification::UpdateGraphFailed { .. } | ClientNotification::TaskErred { .. }) {
                saw_failed = true;
            }
        }
        assert!(saw_failed);
    }

    #[test]
    fn feed_subscription_delivers_samples_to_its_owner() {
        let (mut engine, _w) = engine_with_worker("alice:1", 2);
        let client = ClientId::new("c1");
        let (tx, mut rx) = unbounded_channel();
        engine.register_client(client.clone(), tx);

        engine
            .apply_client_command(
                client.clone(),
                ClientCommand::Feed {
                    sampler: "queue-depths".to_string(),
                    interval_millis: 10,
                },
            )
            .unwrap();

        engine.tick_feed(std::time::Duration::from_millis(20));

        let mut saw_feed = false;
        while let Ok(note) = rx.try_recv() {
            if matches!(note, ClientNotification::Feed { .. }) {
                saw_feed = true;
            }
        }
        assert!(saw_feed);
    }

    #[test]
    fn removing_client_stops_its_feed_subscriptions() {
        let (mut engine, _w) = engine_with_worker("alice:1", 2);
        let client = ClientId::new("c1");
        let (tx, _rx) = unbounded_channel();
        engine.register_client(client.clone(), tx);
        engine
            .apply_client_command(
                client.clone(),
                ClientCommand::Feed {
                    sampler: "queue-depths".to_string(),
                    interval_millis: 10,
                },
            )
            .unwrap();
        assert!(!engine.feed_owners.is_empty());

        engine.remove_client(&client).unwrap();
        assert!(engine.feed_owners.is_empty());
    }
}
