//! Broadcast/proxy auxiliary (component G): fan a request out to every
//! worker in parallel and collect per-worker results without letting one
//! failing worker take down the others.

use std::collections::HashMap;
use std::future::Future;

use crate::common::WorkerAddr;
use crate::errors::Result;

/// Run `f` against every address in `workers` concurrently, returning each
/// worker's own `Result` rather than short-circuiting on the first error.
/// Used for cluster-wide operations like "release these keys everywhere" or
/// "collect worker heartbeats", where one unreachable worker must not block
/// reporting the others.
pub async fn broadcast<F, Fut, T>(workers: Vec<WorkerAddr>, f: F) -> HashMap<WorkerAddr, Result<T>>
where
    F: Fn(WorkerAddr) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let calls = workers.into_iter().map(|w| {
        let fut = f(w.clone());
        async move { (w, fut.await) }
    });
    futures::future::join_all(calls).await.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[tokio::test]
    async fn collects_results_from_every_worker() {
        let workers = vec![WorkerAddr::new("alice:1"), WorkerAddr::new("bob:1")];
        let results = broadcast(workers, |w| async move { Ok(w.to_string()) }).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[&WorkerAddr::new("alice:1")].as_ref().unwrap(), "alice:1");
    }

    #[tokio::test]
    async fn one_failure_does_not_sink_the_others() {
        let workers = vec![WorkerAddr::new("alice:1"), WorkerAddr::new("bob:1")];
        let results = broadcast(workers, |w| async move {
            if w.hostname() == "bob" {
                Err(ErrorKind::UnknownWorker(w.to_string()).into())
            } else {
                Ok(())
            }
        })
        .await;
        assert!(results[&WorkerAddr::new("alice:1")].is_ok());
        assert!(results[&WorkerAddr::new("bob:1")].is_err());
    }
}
