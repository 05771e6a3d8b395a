//! Scene control.
//!
//! [`SceneControl`] is the transport to the production switcher and is the
//! source of truth for which sources exist. [`BroadcastController`] is the
//! command surface the show uses on top of it. Every command is best effort:
//! nothing here tries to make several calls atomic or retries on failure.

pub mod board;

use async_trait::async_trait;
use log::{debug, warn};
use std::sync::Arc;
use thiserror::Error;

pub use board::SceneBoard;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BroadcastError {
    #[error("scene control unreachable: {0}")]
    Unreachable(String),
    #[error("scene {0} does not exist")]
    UnknownScene(String),
    #[error("source {source_name} not found in scene {scene}")]
    SourceNotFound { scene: String, source_name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneSource {
    pub name: String,
    pub id: i64,
}

#[async_trait]
pub trait SceneControl: Send + Sync {
    async fn list_sources(&self, scene: &str) -> Result<Vec<SceneSource>, BroadcastError>;

    async fn set_source_enabled(&self, scene: &str, source_id: i64, enabled: bool) -> Result<(), BroadcastError>;

    async fn switch_scene(&self, scene: &str) -> Result<(), BroadcastError>;
}

#[derive(Clone)]
pub struct BroadcastController {
    scenes: Arc<dyn SceneControl>,
}

impl BroadcastController {
    pub fn new(scenes: Arc<dyn SceneControl>) -> Self {
        Self { scenes }
    }

    /// Hides every source in the scene. One failing source does not stop the
    /// rest; the first error is returned after all have been tried.
    pub async fn disable_all_sources(&self, scene: &str) -> Result<(), BroadcastError> {
        let sources = self.scenes.list_sources(scene).await?;
        let mut first_err = None;
        for source in sources {
            if let Err(e) = self.scenes.set_source_enabled(scene, source.id, false).await {
                warn!("Failed to hide {} in {}: {}", source.name, scene, e);
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    pub async fn set_source_enabled(
        &self,
        scene: &str,
        source_name: &str,
        enabled: bool,
    ) -> Result<(), BroadcastError> {
        // ids can change under us, so look the name up every time
        let sources = self.scenes.list_sources(scene).await?;
        let source = sources
            .into_iter()
            .find(|s| s.name == source_name)
            .ok_or_else(|| BroadcastError::SourceNotFound {
                scene: scene.to_string(),
                source_name: source_name.to_string(),
            })?;
        debug!("Setting {} ({}) in {} enabled={}", source_name, source.id, scene, enabled);
        self.scenes.set_source_enabled(scene, source.id, enabled).await
    }

    pub async fn switch_active_scene(&self, scene: &str) -> Result<(), BroadcastError> {
        debug!("Switching active scene to {}", scene);
        self.scenes.switch_scene(scene).await
    }
}
