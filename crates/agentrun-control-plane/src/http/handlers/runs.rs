//! Run submission, lookup, cancellation and human input handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use agentrun_core::{AgentId, HumanInput, NewTaskRun, RunId, TaskId, TaskRun};

use crate::http::responses::{CreateRunRequest, InputAccepted};
use crate::http::{ApiError, Caller};
use crate::state::AppState;

/// Submit a new run of a task.
pub async fn create_run(
    State(state): State<Arc<AppState>>,
    Caller(user_id): Caller,
    Path(task_id): Path<TaskId>,
    Json(req): Json<CreateRunRequest>,
) -> Result<(StatusCode, Json<TaskRun>), ApiError> {
    if req.prompt.trim().is_empty() {
        return Err(ApiError::bad_request("prompt must not be empty"));
    }
    if req.agent_id.trim().is_empty() {
        return Err(ApiError::bad_request("agentId must not be empty"));
    }

    let run = state
        .run_service
        .submit(NewTaskRun {
            task_id,
            user_id,
            agent_id: AgentId::new(req.agent_id),
            prompt: req.prompt,
            system_prompt: req.system_prompt,
            variables: req.variables,
        })
        .await?;

    Ok((StatusCode::ACCEPTED, Json(run)))
}

pub async fn get_run(
    State(state): State<Arc<AppState>>,
    Caller(user_id): Caller,
    Path(run_id): Path<RunId>,
) -> Result<Json<TaskRun>, ApiError> {
    Ok(Json(state.run_service.get(&run_id, &user_id).await?))
}

/// Cancel a run. Returns the run as it stands after the request.
pub async fn cancel_run(
    State(state): State<Arc<AppState>>,
    Caller(user_id): Caller,
    Path(run_id): Path<RunId>,
) -> Result<(StatusCode, Json<TaskRun>), ApiError> {
    let run = state.run_service.cancel(&run_id, &user_id).await?;
    Ok((StatusCode::ACCEPTED, Json(run)))
}

/// Deliver a decision to a run waiting on `request_human_input`.
pub async fn submit_input(
    State(state): State<Arc<AppState>>,
    Caller(user_id): Caller,
    Path(run_id): Path<RunId>,
    Json(input): Json<HumanInput>,
) -> Result<Json<InputAccepted>, ApiError> {
    let entry_id = state
        .run_service
        .submit_input(&run_id, &user_id, input)
        .await?;

    Ok(Json(InputAccepted {
        accepted: true,
        entry_id: entry_id.to_string(),
    }))
}
