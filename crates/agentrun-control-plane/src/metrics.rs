//! Prometheus metrics collection and formatting.
//!
//! This module provides metrics in Prometheus text exposition format.

use std::fmt::Write;
use std::sync::Arc;

use tracing::warn;

use crate::state::AppState;

/// Collect all metrics from AppState and format as Prometheus text.
pub async fn collect_metrics(state: &Arc<AppState>) -> String {
    let mut output = String::new();

    collect_run_metrics(state, &mut output).await;
    collect_queue_metrics(state, &mut output).await;
    collect_webhook_metrics(state, &mut output).await;

    output
}

/// Task runs by status, plus runs executing in this process.
async fn collect_run_metrics(state: &Arc<AppState>, output: &mut String) {
    match state.runs.count_by_status().await {
        Ok(counts) => {
            writeln!(output, "# HELP agentrun_task_runs Number of task runs by status").ok();
            writeln!(output, "# TYPE agentrun_task_runs gauge").ok();
            for (status, count) in counts {
                writeln!(output, "agentrun_task_runs{{status=\"{status}\"}} {count}").ok();
            }
        }
        Err(e) => warn!(error = %e, "Failed to count task runs"),
    }

    let active = state.cancellations.active().await.len();
    writeln!(
        output,
        "# HELP agentrun_runs_executing Task runs executing in this process"
    )
    .ok();
    writeln!(output, "# TYPE agentrun_runs_executing gauge").ok();
    writeln!(output, "agentrun_runs_executing {active}").ok();
}

/// Work queue depth.
async fn collect_queue_metrics(state: &Arc<AppState>, output: &mut String) {
    let stats = match state.broker.queue_stats().await {
        Ok(stats) => stats,
        Err(e) => {
            warn!(error = %e, "Failed to read queue stats");
            return;
        }
    };

    writeln!(
        output,
        "# HELP agentrun_queue_length Entries in the work queue"
    )
    .ok();
    writeln!(output, "# TYPE agentrun_queue_length gauge").ok();
    writeln!(output, "agentrun_queue_length {}", stats.length).ok();

    writeln!(
        output,
        "# HELP agentrun_queue_pending Claimed work queue entries not yet acknowledged"
    )
    .ok();
    writeln!(output, "# TYPE agentrun_queue_pending gauge").ok();
    writeln!(output, "agentrun_queue_pending {}", stats.pending).ok();
}

/// Registered webhooks by state.
async fn collect_webhook_metrics(state: &Arc<AppState>, output: &mut String) {
    let (enabled, disabled) = match state.webhooks.count_enabled().await {
        Ok(counts) => counts,
        Err(e) => {
            warn!(error = %e, "Failed to count webhooks");
            return;
        }
    };

    writeln!(
        output,
        "# HELP agentrun_webhooks Number of registered webhooks by state"
    )
    .ok();
    writeln!(output, "# TYPE agentrun_webhooks gauge").ok();
    writeln!(output, "agentrun_webhooks{{state=\"enabled\"}} {enabled}").ok();
    writeln!(output, "agentrun_webhooks{{state=\"disabled\"}} {disabled}").ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrun_broker::{MemoryBroker, TaskStreamService};
    use agentrun_core::{NewTaskRun, NewWebhook, UserId, WebhookEventType, WebhookUpdate};
    use agentrun_store::{InMemoryTaskRunRepository, InMemoryWebhookRepository, WebhookRepository};
    use agentrun_worker::CancellationRegistry;

    use crate::config::{RelayConfig, WebhookConfig};
    use crate::webhook::WebhookDispatcher;

    #[tokio::test]
    async fn test_collect_metrics() {
        let broker = Arc::new(MemoryBroker::new());
        let webhooks = Arc::new(InMemoryWebhookRepository::new());
        let dispatcher =
            Arc::new(WebhookDispatcher::new(webhooks.clone(), WebhookConfig::default()).unwrap());
        let state = AppState::new(
            broker.clone(),
            Arc::new(InMemoryTaskRunRepository::new()),
            webhooks.clone(),
            Arc::new(CancellationRegistry::new()),
            dispatcher,
            RelayConfig::default(),
        );

        for _ in 0..2 {
            state
                .run_service
                .submit(NewTaskRun {
                    prompt: "p".to_string(),
                    ..Default::default()
                })
                .await
                .unwrap();
        }
        broker.create_consumer_group("workers").await.unwrap();
        broker
            .consume_tasks("workers", "w", 1, std::time::Duration::ZERO)
            .await
            .unwrap();

        for name in ["a", "b"] {
            let hook = webhooks
                .create(NewWebhook {
                    user_id: UserId::new("u1"),
                    name: name.to_string(),
                    url: "http://localhost/hook".to_string(),
                    events: vec![WebhookEventType::TaskCompleted],
                })
                .await
                .unwrap();
            if name == "b" {
                webhooks
                    .update(
                        &hook.id,
                        WebhookUpdate {
                            enabled: Some(false),
                            ..Default::default()
                        },
                    )
                    .await
                    .unwrap();
            }
        }

        let output = collect_metrics(&state).await;

        assert!(output.contains("# TYPE agentrun_task_runs gauge"));
        assert!(output.contains("agentrun_task_runs{status=\"queued\"} 2"));
        assert!(output.contains("agentrun_task_runs{status=\"running\"} 0"));
        assert!(output.contains("agentrun_runs_executing 0"));
        assert!(output.contains("agentrun_queue_length 2"));
        assert!(output.contains("agentrun_queue_pending 1"));
        assert!(output.contains("agentrun_webhooks{state=\"enabled\"} 1"));
        assert!(output.contains("agentrun_webhooks{state=\"disabled\"} 1"));
    }
}
