//! Application state for the NexDerm server
//!
//! Holds the lazily loaded inference service and server configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use nexderm::config::{InferenceConfig, ModelConfig};
use nexderm::service::InferenceService;

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Path to the checkpoint artifact to serve
    pub checkpoint_path: PathBuf,
    /// Input image size the checkpoint was trained with
    pub image_size: usize,
}

impl ServerConfig {
    pub fn inference_config(&self) -> InferenceConfig {
        let model = ModelConfig {
            input_size: self.image_size,
            ..ModelConfig::binary()
        };
        InferenceConfig::new(&self.checkpoint_path).with_model(model)
    }
}

/// Shared application state
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// The classification service; loads the checkpoint on first use
    pub service: InferenceService,
    /// Server start time
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let service = InferenceService::new(config.inference_config());
        Self {
            config,
            service,
            started_at: Instant::now(),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

pub type SharedState = Arc<AppState>;
