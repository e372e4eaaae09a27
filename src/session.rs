//! Load/selection state for a map view.
//!
//! The session moves `Loading -> Ready(source)` once every input has loaded, or
//! `Loading -> Error(message)` on the first failure. An error is terminal until
//! [`ViewState::reload`]. Render data is recomputed from the immutable inputs on each
//! request.

use crate::aggregate::{aggregate, AggregateError, AggregateStats};
use crate::config::InputConfig;
use crate::data::{load_inputs, LoadedInputs};
use crate::render::{build_payload, DisplayOptions, RenderPass};
use crate::types::GeometrySource;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum ViewState {
    Loading,
    Error(String),
    Ready(GeometrySource),
}

impl ViewState {
    pub fn loaded(self, selection: GeometrySource) -> Self {
        match self {
            ViewState::Loading => ViewState::Ready(selection),
            other => other,
        }
    }

    pub fn failed(self, message: impl Into<String>) -> Self {
        match self {
            ViewState::Loading => ViewState::Error(message.into()),
            other => other,
        }
    }

    /// Switches the displayed geometry. Only meaningful once ready.
    pub fn select(self, source: GeometrySource) -> Self {
        match self {
            ViewState::Ready(_) => ViewState::Ready(source),
            other => other,
        }
    }

    pub fn reload(self) -> Self {
        ViewState::Loading
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("map data is still loading")]
    Loading,
    #[error("{0}")]
    Failed(String),
}

pub struct MapSession {
    state: ViewState,
    inputs: Option<Arc<LoadedInputs>>,
    default_source: GeometrySource,
}

impl MapSession {
    pub fn new(default_source: GeometrySource) -> Self {
        Self {
            state: ViewState::Loading,
            inputs: None,
            default_source,
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn complete(&mut self, outcome: Result<LoadedInputs, String>) {
        if self.state != ViewState::Loading {
            return;
        }
        let state = std::mem::replace(&mut self.state, ViewState::Loading);
        self.state = match outcome {
            Ok(inputs) => {
                self.inputs = Some(Arc::new(inputs));
                state.loaded(self.default_source)
            }
            Err(message) => {
                self.inputs = None;
                state.failed(message)
            }
        };
    }

    pub fn select(&mut self, source: GeometrySource) -> Result<(), SessionError> {
        self.ready_inputs()?;
        let state = std::mem::replace(&mut self.state, ViewState::Loading);
        self.state = state.select(source);
        Ok(())
    }

    pub fn reload(&mut self) {
        let state = std::mem::replace(&mut self.state, ViewState::Loading);
        self.state = state.reload();
        self.inputs = None;
    }

    pub fn selection(&self) -> Option<GeometrySource> {
        match self.state {
            ViewState::Ready(source) => Some(source),
            _ => None,
        }
    }

    /// Loaded inputs, available only in the ready state.
    pub fn ready_inputs(&self) -> Result<Arc<LoadedInputs>, SessionError> {
        match (&self.state, &self.inputs) {
            (ViewState::Ready(_), Some(inputs)) => Ok(inputs.clone()),
            (ViewState::Error(message), _) => Err(SessionError::Failed(message.clone())),
            _ => Err(SessionError::Loading),
        }
    }

    /// Payload for the current selection, or for `source` when given.
    pub fn render(
        &self,
        source: Option<GeometrySource>,
        options: &DisplayOptions,
    ) -> Result<RenderPass, SessionError> {
        let inputs = self.ready_inputs()?;
        let source = source.or(self.selection()).unwrap_or(self.default_source);
        Ok(build_payload(inputs.geometry(source), &inputs.table, options))
    }

    pub fn stats(&self) -> Result<Result<AggregateStats, AggregateError>, SessionError> {
        Ok(aggregate(&self.ready_inputs()?.table))
    }
}

/// In-flight load owned by a view. Dropping it aborts the load.
///
/// The load itself runs as one task and a supervisor task awaits it, so a load that
/// panics still moves the session to the error state.
pub struct LoadTask {
    load: AbortHandle,
    supervisor: JoinHandle<()>,
}

impl LoadTask {
    pub fn spawn(input: InputConfig, session: Arc<RwLock<MapSession>>) -> Self {
        Self::spawn_load(session, async move {
            load_inputs(&input).await.map_err(|e| {
                error!("Error loading map data: {}", e);
                e.to_string()
            })
        })
    }

    fn spawn_load<F>(session: Arc<RwLock<MapSession>>, load: F) -> Self
    where
        F: Future<Output = Result<LoadedInputs, String>> + Send + 'static,
    {
        let load = tokio::spawn(load);
        let load_abort = load.abort_handle();
        let supervisor = tokio::spawn(async move {
            let outcome = match load.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_cancelled() => return,
                Err(e) => {
                    error!("Map load task failed: {}", e);
                    Err(format!("map load failed: {e}"))
                }
            };
            let mut session = session.write().await;
            session.complete(outcome);
            info!("Map session is now {:?}", session.state());
        });
        Self {
            load: load_abort,
            supervisor,
        }
    }

    /// Waits for the load to settle.
    pub async fn join(mut self) {
        if let Err(e) = (&mut self.supervisor).await {
            if !e.is_cancelled() {
                error!("Map load supervisor failed: {}", e);
            }
        }
    }
}

impl Drop for LoadTask {
    fn drop(&mut self) {
        self.load.abort();
        self.supervisor.abort();
    }
}
