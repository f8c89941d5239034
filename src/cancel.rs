//! Cooperative run control.
//!
//! A run can be paused or cancelled from outside the process via a control
//! plane the pipeline polls between units of work. Cancellation is cooperative:
//! nothing is aborted mid-flight, the orchestrator checks the gateway at its
//! own checkpoints and winds down cleanly.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum PlaneError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
}

/// Externally visible run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Running,
    Paused,
    Cancelled,
}

/// Source of truth for the current run state.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn state(&self) -> Result<RunState, PlaneError>;
}

/// Control plane that never pauses or cancels. Used when no
/// `control_plane_url` is configured.
#[derive(Debug, Default)]
pub struct NullControlPlane;

#[async_trait]
impl ControlPlane for NullControlPlane {
    async fn state(&self) -> Result<RunState, PlaneError> {
        Ok(RunState::Running)
    }
}

/// Control plane backed by an HTTP endpoint returning `{"state": "running"}`.
#[derive(Debug)]
pub struct HttpControlPlane {
    client: reqwest::Client,
    url: String,
}

#[derive(Deserialize)]
struct StateResponse {
    state: RunState,
}

impl HttpControlPlane {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn state(&self) -> Result<RunState, PlaneError> {
        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(PlaneError::HttpStatus(response.status().as_u16()));
        }
        let body: StateResponse = response.json().await?;
        Ok(body.state)
    }
}

/// Raised at a checkpoint once the run has been cancelled.
#[derive(Debug, Error)]
#[error("Run cancelled at: {context}")]
pub struct Cancelled {
    pub context: String,
}

/// Caches control-plane state with a TTL so checkpoints stay cheap, and turns
/// `Paused` into an in-place wait.
pub struct CancellationGateway {
    plane: Box<dyn ControlPlane>,
    cache: Mutex<Option<(Instant, RunState)>>,
    ttl: Duration,
    poll_interval: Duration,
}

impl CancellationGateway {
    pub fn new(plane: Box<dyn ControlPlane>, poll_interval: Duration) -> Self {
        Self {
            plane,
            cache: Mutex::new(None),
            ttl: poll_interval,
            poll_interval,
        }
    }

    /// Gateway that can never cancel.
    pub fn disabled() -> Self {
        Self::new(Box::new(NullControlPlane), Duration::from_secs(5))
    }

    async fn current_state(&self, force: bool) -> RunState {
        let mut cache = self.cache.lock().await;
        if !force {
            if let Some((at, state)) = *cache {
                if at.elapsed() < self.ttl {
                    return state;
                }
            }
        }

        // A control plane that cannot be reached must not stall the run
        let state = match self.plane.state().await {
            Ok(state) => state,
            Err(e) => {
                tracing::debug!(error = %e, "Control plane poll failed, assuming running");
                RunState::Running
            }
        };
        *cache = Some((Instant::now(), state));
        state
    }

    /// Checkpoint: return `Err(Cancelled)` if the run has been cancelled.
    /// `context` names the point in the pipeline for the log line.
    pub async fn check_cancelled(&self, context: &str) -> Result<(), Cancelled> {
        if self.current_state(false).await == RunState::Cancelled {
            tracing::warn!(context, "Run cancelled, winding down");
            return Err(Cancelled {
                context: context.to_string(),
            });
        }
        Ok(())
    }

    /// Block while the run is paused. Cancellation during a pause wins.
    pub async fn wait_if_paused(&self, context: &str) -> Result<(), Cancelled> {
        let mut was_paused = false;
        loop {
            // Paused state must be re-read every cycle, not served from cache
            match self.current_state(was_paused).await {
                RunState::Running => {
                    if was_paused {
                        tracing::info!(context, "Run resumed");
                    }
                    return Ok(());
                }
                RunState::Cancelled => {
                    tracing::warn!(context, "Run cancelled while paused");
                    return Err(Cancelled {
                        context: context.to_string(),
                    });
                }
                RunState::Paused => {
                    if !was_paused {
                        tracing::info!(context, "Run paused, waiting");
                        was_paused = true;
                    }
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }
}

impl std::fmt::Debug for CancellationGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationGateway")
            .field("ttl", &self.ttl)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}
