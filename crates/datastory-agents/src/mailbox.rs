//! Named-channel agent pool.
//!
//! A secondary way to run agents: each registered name owns one work channel
//! drained by a fixed number of workers, results from every worker land on a
//! single output channel, and a coordinator collects them with a per-result
//! timeout. Items addressed to an unknown name are answered immediately with a
//! failure.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::MailboxError;

#[async_trait]
pub trait Worker: Send + Sync {
    async fn handle(&self, payload: serde_json::Value) -> Result<serde_json::Value, String>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub id: String,
    pub agent: String,
    pub payload: serde_json::Value,
}

impl WorkItem {
    pub fn new(agent: impl Into<String>, payload: serde_json::Value) -> Self {
        Self { id: uuid::Uuid::new_v4().to_string(), agent: agent.into(), payload }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkResult {
    pub item_id: String,
    pub agent: String,
    pub outcome: Result<serde_json::Value, String>,
}

#[derive(Debug, Default)]
pub struct Collected {
    pub results: Vec<WorkResult>,
    /// The wait for the next result ran out before `expected` arrived.
    pub timed_out: bool,
}

pub struct MailboxRuntime {
    capacity: usize,
    mailboxes: RwLock<HashMap<String, mpsc::Sender<WorkItem>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    results_tx: mpsc::Sender<WorkResult>,
    results_rx: Mutex<mpsc::Receiver<WorkResult>>,
}

impl MailboxRuntime {
    /// `capacity` bounds each work channel and the output channel.
    pub fn new(capacity: usize) -> Self {
        let (results_tx, results_rx) = mpsc::channel(capacity.max(1));
        Self {
            capacity: capacity.max(1),
            mailboxes: RwLock::new(HashMap::new()),
            workers: Mutex::new(Vec::new()),
            results_tx,
            results_rx: Mutex::new(results_rx),
        }
    }

    /// Register `name` with `workers` tasks sharing its channel. Allowed while items are in flight.
    pub async fn register(&self, name: &str, worker: Arc<dyn Worker>, workers: usize) -> Result<(), MailboxError> {
        if workers == 0 {
            return Err(MailboxError::NoWorkers(name.to_string()));
        }
        let mut mailboxes = self.mailboxes.write().await;
        if mailboxes.contains_key(name) {
            return Err(MailboxError::DuplicateAgent(name.to_string()));
        }

        let (tx, rx) = mpsc::channel::<WorkItem>(self.capacity);
        let rx = Arc::new(Mutex::new(rx));
        let mut handles = self.workers.lock().await;
        for n in 0..workers {
            handles.push(tokio::spawn(worker_loop(
                name.to_string(),
                n,
                Arc::clone(&rx),
                Arc::clone(&worker),
                self.results_tx.clone(),
            )));
        }
        mailboxes.insert(name.to_string(), tx);
        info!(agent = name, workers, "Registered mailbox agent");
        Ok(())
    }

    pub async fn agents(&self) -> Vec<String> {
        let mut names: Vec<String> = self.mailboxes.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Route an item to its agent's channel.
    pub async fn submit(&self, item: WorkItem) -> Result<(), MailboxError> {
        let sender = self.mailboxes.read().await.get(&item.agent).cloned();
        match sender {
            Some(tx) => {
                let agent = item.agent.clone();
                tx.send(item).await.map_err(|_| MailboxError::Closed(agent))
            }
            None => {
                warn!(agent = %item.agent, item = %item.id, "No such agent, failing item");
                let result = WorkResult {
                    outcome: Err(format!("Unknown agent '{}'", item.agent)),
                    item_id: item.id,
                    agent: item.agent,
                };
                self.results_tx
                    .send(result)
                    .await
                    .map_err(|e| MailboxError::Closed(e.0.agent))
            }
        }
    }

    /// Drain results until `expected` have arrived or no result shows up within `per_result`.
    pub async fn collect(&self, expected: usize, per_result: Duration) -> Collected {
        let mut rx = self.results_rx.lock().await;
        let mut collected = Collected::default();
        while collected.results.len() < expected {
            match tokio::time::timeout(per_result, rx.recv()).await {
                Ok(Some(result)) => collected.results.push(result),
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        received = collected.results.len(),
                        expected, "Timed out waiting for mailbox results"
                    );
                    collected.timed_out = true;
                    break;
                }
            }
        }
        collected
    }

    /// Close every work channel and wait for the workers to drain.
    pub async fn shutdown(&self) {
        self.mailboxes.write().await.clear();
        let handles: Vec<JoinHandle<()>> = self.workers.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        debug!("Mailbox runtime shut down");
    }
}

async fn worker_loop(
    agent: String,
    index: usize,
    rx: Arc<Mutex<mpsc::Receiver<WorkItem>>>,
    worker: Arc<dyn Worker>,
    results: mpsc::Sender<WorkResult>,
) {
    loop {
        // The lock is held only while waiting for the next item.
        let next = rx.lock().await.recv().await;
        let Some(item) = next else { break };
        debug!(agent = %agent, worker = index, item = %item.id, "Handling item");
        let outcome = worker.handle(item.payload).await;
        let result = WorkResult { item_id: item.id, agent: agent.clone(), outcome };
        if results.send(result).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Doubler {
        delay: Duration,
    }

    #[async_trait]
    impl Worker for Doubler {
        async fn handle(&self, payload: serde_json::Value) -> Result<serde_json::Value, String> {
            tokio::time::sleep(self.delay).await;
            payload["n"].as_i64().map(|n| json!(n * 2)).ok_or_else(|| "missing n".to_string())
        }
    }

    #[tokio::test]
    async fn test_routes_by_name_and_tags_results() {
        let runtime = MailboxRuntime::new(8);
        runtime.register("double", Arc::new(Doubler { delay: Duration::ZERO }), 2).await.unwrap();

        let items: Vec<WorkItem> = (1..=4).map(|n| WorkItem::new("double", json!({"n": n}))).collect();
        for item in items.clone() {
            runtime.submit(item).await.unwrap();
        }
        let collected = runtime.collect(4, Duration::from_secs(1)).await;
        assert!(!collected.timed_out);

        let mut doubled: Vec<i64> = collected
            .results
            .iter()
            .map(|r| r.outcome.as_ref().unwrap().as_i64().unwrap())
            .collect();
        doubled.sort();
        assert_eq!(doubled, vec![2, 4, 6, 8]);
        for item in &items {
            assert!(collected.results.iter().any(|r| r.item_id == item.id && r.agent == "double"));
        }
    }

    #[tokio::test]
    async fn test_unknown_agent_fails_immediately() {
        let runtime = MailboxRuntime::new(4);
        let item = WorkItem::new("nobody", json!({}));
        runtime.submit(item.clone()).await.unwrap();
        let collected = runtime.collect(1, Duration::from_millis(100)).await;
        assert_eq!(collected.results.len(), 1);
        assert_eq!(collected.results[0].item_id, item.id);
        assert!(collected.results[0].outcome.as_ref().unwrap_err().contains("nobody"));
    }

    #[tokio::test]
    async fn test_collect_times_out_per_result() {
        let runtime = MailboxRuntime::new(4);
        runtime
            .register("slow", Arc::new(Doubler { delay: Duration::from_secs(5) }), 1)
            .await
            .unwrap();
        runtime.submit(WorkItem::new("slow", json!({"n": 1}))).await.unwrap();
        let collected = runtime.collect(1, Duration::from_millis(50)).await;
        assert!(collected.timed_out);
        assert!(collected.results.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_and_dynamic_registration() {
        let runtime = MailboxRuntime::new(4);
        runtime.register("a", Arc::new(Doubler { delay: Duration::ZERO }), 1).await.unwrap();
        assert_eq!(
            runtime.register("a", Arc::new(Doubler { delay: Duration::ZERO }), 1).await,
            Err(MailboxError::DuplicateAgent("a".into()))
        );
        assert_eq!(
            runtime.register("b", Arc::new(Doubler { delay: Duration::ZERO }), 0).await,
            Err(MailboxError::NoWorkers("b".into()))
        );

        runtime.submit(WorkItem::new("a", json!({"n": 1}))).await.unwrap();
        runtime.register("b", Arc::new(Doubler { delay: Duration::ZERO }), 1).await.unwrap();
        runtime.submit(WorkItem::new("b", json!({"n": 2}))).await.unwrap();
        let collected = runtime.collect(2, Duration::from_secs(1)).await;
        assert_eq!(collected.results.len(), 2);
        assert_eq!(runtime.agents().await, vec!["a", "b"]);

        runtime.shutdown().await;
        assert!(runtime.agents().await.is_empty());
    }

    #[tokio::test]
    async fn test_worker_error_is_reported() {
        let runtime = MailboxRuntime::new(4);
        runtime.register("double", Arc::new(Doubler { delay: Duration::ZERO }), 1).await.unwrap();
        runtime.submit(WorkItem::new("double", json!({}))).await.unwrap();
        let collected = runtime.collect(1, Duration::from_secs(1)).await;
        assert_eq!(collected.results[0].outcome, Err("missing n".to_string()));
    }
}
