//! In-process [`RunStore`] for tests and database-free runs.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::run::{ExperimentRun, RunStatus, RunStore, StoreError};
use crate::scheduler::EvaluationResult;

#[derive(Default)]
struct Inner {
    runs: HashMap<Uuid, ExperimentRun>,
    results: HashMap<Uuid, Vec<EvaluationResult>>,
}

/// Run store held entirely in memory.
#[derive(Default)]
pub struct MemoryRunStore {
    inner: Mutex<Inner>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a run as-is, replacing any run with the same id.
    pub async fn insert_run(&self, run: ExperimentRun) {
        self.inner.lock().await.runs.insert(run.id, run);
    }
}

fn run_mut(inner: &mut Inner, run_id: Uuid) -> Result<&mut ExperimentRun, StoreError> {
    inner
        .runs
        .get_mut(&run_id)
        .ok_or(StoreError::RunNotFound(run_id))
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn create_run(&self, name: &str) -> Result<ExperimentRun, StoreError> {
        let run = ExperimentRun::new(name);
        self.insert_run(run.clone()).await;
        Ok(run)
    }

    async fn get_run(&self, run_id: Uuid) -> Result<Option<ExperimentRun>, StoreError> {
        Ok(self.inner.lock().await.runs.get(&run_id).cloned())
    }

    async fn mark_running(&self, run_id: Uuid, total_items: u64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let run = run_mut(&mut inner, run_id)?;
        run.status = RunStatus::Running;
        run.started_at = Some(Utc::now());
        run.total_items = total_items;
        run.completed_items = 0;
        run.failed_items = 0;
        Ok(())
    }

    async fn update_counts(
        &self,
        run_id: Uuid,
        completed_items: u64,
        failed_items: u64,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let run = run_mut(&mut inner, run_id)?;
        run.completed_items = completed_items;
        run.failed_items = failed_items;
        Ok(())
    }

    async fn save_results(
        &self,
        run_id: Uuid,
        results: &[EvaluationResult],
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        run_mut(&mut inner, run_id)?;
        inner
            .results
            .entry(run_id)
            .or_default()
            .extend_from_slice(results);
        Ok(())
    }

    async fn complete_run(
        &self,
        run_id: Uuid,
        metrics: serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let run = run_mut(&mut inner, run_id)?;
        run.status = RunStatus::Completed;
        run.metrics = metrics;
        run.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn fail_run(&self, run_id: Uuid, error: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let run = run_mut(&mut inner, run_id)?;
        run.status = RunStatus::Failed;
        run.error_message = Some(error.to_string());
        run.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn cancel_run(&self, run_id: Uuid) -> Result<ExperimentRun, StoreError> {
        let mut inner = self.inner.lock().await;
        let run = run_mut(&mut inner, run_id)?;
        if run.status.is_terminal() {
            return Err(StoreError::RunTerminal {
                run_id,
                status: run.status,
            });
        }
        run.status = RunStatus::Cancelled;
        run.completed_at = Some(Utc::now());
        Ok(run.clone())
    }

    async fn list_results(
        &self,
        run_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<EvaluationResult>, StoreError> {
        let inner = self.inner.lock().await;
        let skip = usize::try_from(offset.max(0)).unwrap_or(usize::MAX);
        let take = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(inner
            .results
            .get(&run_id)
            .map(|rows| rows.iter().skip(skip).take(take).cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};
    use std::collections::BTreeMap;

    fn result(expected: &str) -> EvaluationResult {
        EvaluationResult {
            input_data: Map::new(),
            expected_output: expected.to_string(),
            actual_output: Some(expected.to_string()),
            custom_metrics: BTreeMap::new(),
            latency_ms: 1.0,
            cost_usd: 0.0,
            tokens_used: 0,
            is_success: true,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_run_lifecycle() {
        let store = MemoryRunStore::new();
        let run = store.create_run("baseline").await.unwrap();

        store.mark_running(run.id, 3).await.unwrap();
        store.update_counts(run.id, 2, 1).await.unwrap();
        store.complete_run(run.id, json!({"success_rate": 1.0})).await.unwrap();

        let run = store.get_run(run.id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.total_items, 3);
        assert_eq!(run.completed_items, 2);
        assert_eq!(run.failed_items, 1);
        assert!(run.started_at.is_some());
        assert!(run.completed_at.is_some());
        assert_eq!(run.metrics["success_rate"], 1.0);
    }

    #[tokio::test]
    async fn test_cancel_rules() {
        let store = MemoryRunStore::new();
        let run = store.create_run("r").await.unwrap();

        let cancelled = store.cancel_run(run.id).await.unwrap();
        assert_eq!(cancelled.status, RunStatus::Cancelled);

        let err = store.cancel_run(run.id).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::RunTerminal {
                status: RunStatus::Cancelled,
                ..
            }
        ));

        assert!(matches!(
            store.cancel_run(Uuid::new_v4()).await,
            Err(StoreError::RunNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_results_paging_keeps_order() {
        let store = MemoryRunStore::new();
        let run = store.create_run("r").await.unwrap();
        store
            .save_results(run.id, &[result("a"), result("b")])
            .await
            .unwrap();
        store.save_results(run.id, &[result("c")]).await.unwrap();

        let all = store.list_results(run.id, 100, 0).await.unwrap();
        let names: Vec<_> = all.iter().map(|r| r.expected_output.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);

        let page = store.list_results(run.id, 1, 1).await.unwrap();
        assert_eq!(page[0].expected_output, "b");

        assert!(store.list_results(run.id, 10, 5).await.unwrap().is_empty());
        assert!(store.list_results(Uuid::new_v4(), 10, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_run_operations() {
        let store = MemoryRunStore::new();
        let id = Uuid::new_v4();
        assert!(store.get_run(id).await.unwrap().is_none());
        assert!(store.mark_running(id, 1).await.is_err());
        assert!(store.save_results(id, &[result("x")]).await.is_err());
    }
}
