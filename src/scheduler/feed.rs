//! The feed service (component F). In the original protocol a client could
//! ship an arbitrary serialized closure for the scheduler to run on a timer;
//! Rust has no safe equivalent of unpickling and calling an arbitrary
//! function sent over the wire, so subscriptions here name one of a fixed
//! set of samplers known to the binary instead.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{json, Value};

use crate::errors::{ErrorKind, Result};
use crate::scheduler::graph::GraphState;

/// A sampler reads the graph state and produces one JSON value per tick.
pub type Sampler = fn(&GraphState) -> Value;

fn sample_processing_counts(state: &GraphState) -> Value {
    let counts: HashMap<String, usize> = state
        .processing
        .iter()
        .map(|(w, keys)| (w.to_string(), keys.len()))
        .collect();
    json!(counts)
}

fn sample_ncores(state: &GraphState) -> Value {
    let counts: HashMap<String, usize> = state
        .ncores
        .iter()
        .map(|(w, &n)| (w.to_string(), n))
        .collect();
    json!(counts)
}

fn sample_queue_depths(state: &GraphState) -> Value {
    json!({
        "ready": state.ready.len(),
        "waiting": state.waiting.len(),
        "erred": state.erred.len(),
    })
}

/// Look up a sampler by name. Unknown names are a client-side mistake, not a
/// graph-consistency problem, so this returns the same error kind as an
/// unresolvable key lookup would for a similarly "you asked for something
/// that doesn't exist" condition.
fn lookup(name: &str) -> Result<Sampler> {
    match name {
        "processing" => Ok(sample_processing_counts),
        "ncores" => Ok(sample_ncores),
        "queue-depths" => Ok(sample_queue_depths),
        other => Err(ErrorKind::UnknownKey(format!("no such feed sampler: {}", other)).into()),
    }
}

struct Subscription {
    sampler: Sampler,
    interval: Duration,
    elapsed: Duration,
}

/// Tracks every active feed subscription, keyed by an opaque subscription id
/// the caller chooses (one client can hold more than one feed at a time).
#[derive(Default)]
pub struct FeedService {
    subscriptions: HashMap<u64, Subscription>,
    next_id: u64,
}

impl FeedService {
    pub fn new() -> Self {
        Default::default()
    }

    /// Register a new subscription, validating the sampler name up front so
    /// a typo fails the `feed` call itself rather than silently never firing.
    pub fn subscribe(&mut self, sampler_name: &str, interval: Duration) -> Result<u64> {
        let sampler = lookup(sampler_name)?;
        let id = self.next_id;
        self.next_id += 1;
        self.subscriptions.insert(
            id,
            Subscription {
                sampler,
                interval,
                elapsed: Duration::from_secs(0),
            },
        );
        Ok(id)
    }

    pub fn unsubscribe(&mut self, id: u64) {
        self.subscriptions.remove(&id);
    }

    /// Advance every subscription's clock by `dt` and return a sample for
    /// each one whose interval has elapsed. Must never block: samplers read
    /// the graph synchronously and are expected to be cheap.
    pub fn tick(&mut self, state: &GraphState, dt: Duration) -> Vec<(u64, Value)> {
        let mut due = Vec::new();
        for (&id, sub) in self.subscriptions.iter_mut() {
            sub.elapsed += dt;
            if sub.elapsed >= sub.interval {
                sub.elapsed = Duration::from_secs(0);
                due.push((id, (sub.sampler)(state)));
            }
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_sampler_is_rejected() {
        let mut feed = FeedService::new();
        assert!(feed.subscribe("does-not-exist", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn tick_fires_once_interval_elapses() {
        let mut feed = FeedService::new();
        let id = feed.subscribe("queue-depths", Duration::from_millis(100)).unwrap();
        let state = GraphState::new();

        let due = feed.tick(&state, Duration::from_millis(40));
        assert!(due.is_empty());

        let due = feed.tick(&state, Duration::from_millis(70));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].0, id);
    }

    #[test]
    fn unsubscribe_stops_future_ticks() {
        let mut feed = FeedService::new();
        let id = feed.subscribe("ncores", Duration::from_millis(10)).unwrap();
        feed.unsubscribe(id);
        let state = GraphState::new();
        let due = feed.tick(&state, Duration::from_millis(50));
        assert!(due.is_empty());
    }
}
