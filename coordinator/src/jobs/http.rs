use std::sync::Arc;

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use log::warn;
use serde::{Deserialize, Serialize};

use super::{Job, JobScheduler, JobStatus, Launcher};
use crate::configs::SimulationConfig;

#[derive(Debug, Serialize, Deserialize)]
pub struct RunResponse {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct InfoRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub status: JobStatus,
}

/// Builds the job queue http surface: `POST /run` and `POST /info`.
pub fn router<L>(jobs: Arc<JobScheduler<L>>) -> Router
where
    L: Launcher + 'static,
{
    Router::new()
        .route("/run", post(run::<L>))
        .route("/info", post(info::<L>))
        .with_state(jobs)
}

async fn run<L: Launcher + 'static>(
    State(jobs): State<Arc<JobScheduler<L>>>,
    Json(config): Json<SimulationConfig>,
) -> Result<Json<RunResponse>, (StatusCode, Json<RunResponse>)> {
    if let Err(e) = config.validate() {
        warn!("refusing job {}: {e}", config.name);
        let body = RunResponse {
            status: e.to_string(),
        };
        return Err((StatusCode::BAD_REQUEST, Json(body)));
    }

    jobs.submit(Job::from(config));

    Ok(Json(RunResponse {
        status: "ok".into(),
    }))
}

async fn info<L: Launcher + 'static>(
    State(jobs): State<Arc<JobScheduler<L>>>,
    Json(req): Json<InfoRequest>,
) -> Json<InfoResponse> {
    Json(InfoResponse {
        status: jobs.status(&req.name),
    })
}
