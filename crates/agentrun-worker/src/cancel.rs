//! Cancellation tokens of the runs executing in this process.

use std::collections::HashMap;

use agentrun_core::RunId;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Maps running runs to their cancellation tokens.
///
/// Shared between the workers (which register runs while they execute) and
/// whoever needs to stop them: the cancel endpoint and shutdown.
#[derive(Default)]
pub struct CancellationRegistry {
    tokens: RwLock<HashMap<RunId, CancellationToken>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token for a run about to execute.
    pub async fn register(&self, run_id: &RunId) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens
            .write()
            .await
            .insert(run_id.clone(), token.clone());
        token
    }

    pub async fn unregister(&self, run_id: &RunId) {
        self.tokens.write().await.remove(run_id);
    }

    /// Signal a run to stop at its next iteration boundary. Returns false if
    /// the run is not executing here.
    pub async fn cancel(&self, run_id: &RunId) -> bool {
        match self.tokens.read().await.get(run_id) {
            Some(token) => {
                token.cancel();
                info!(run_id = %run_id, "Cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Cancel every registered run. Returns how many were signalled.
    pub async fn cancel_all(&self) -> usize {
        let tokens = self.tokens.read().await;
        for token in tokens.values() {
            token.cancel();
        }
        tokens.len()
    }

    pub async fn active(&self) -> Vec<RunId> {
        let mut ids: Vec<RunId> = self.tokens.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}
