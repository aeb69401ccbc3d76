//! Shared state for the agent's HTTP server.

use std::{path::PathBuf, sync::Arc};

use tokio::sync::RwLock;

use crate::executor::{Executor, LoadedFunction};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// State shared across request handlers: the executor plus the currently
/// loaded function, if any.
#[derive(Clone)]
pub struct AgentState {
    executor: Arc<Executor>,
    loaded: Arc<RwLock<Option<LoadedFunction>>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl AgentState {
    /// Creates agent state with an executor spawning the given driver.
    pub fn new(driver_path: impl Into<PathBuf>) -> Self {
        Self {
            executor: Arc::new(Executor::new(driver_path)),
            loaded: Arc::new(RwLock::new(None)),
        }
    }

    /// Gets the executor.
    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Replaces the loaded function.
    pub async fn set_loaded(&self, function: LoadedFunction) {
        *self.loaded.write().await = Some(function);
    }

    /// Snapshots the loaded function.
    pub async fn loaded(&self) -> Option<LoadedFunction> {
        self.loaded.read().await.clone()
    }
}
