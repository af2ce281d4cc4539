// Image description through a hosted Langflow flow.

pub mod client;
pub mod response;
pub mod stream;

use std::path::{Path, PathBuf};

use tokio::sync::mpsc;

use crate::config::LangflowConfig;
use client::LangflowClient;

/// The vision flow as seen by handlers.
#[derive(Debug, Clone)]
pub enum VisionService {
    Available(LangflowClient),
    /// No flow is configured; every call yields nothing.
    Unavailable,
}

impl VisionService {
    pub fn from_config(config: Option<&LangflowConfig>) -> Self {
        match config {
            Some(config) => VisionService::Available(LangflowClient::new(config.clone())),
            None => VisionService::Unavailable,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, VisionService::Available(_))
    }

    /// Plain-text description of a local image, or `None` when the flow is
    /// unconfigured, fails, or answers without text.
    pub async fn describe(&self, path: &Path) -> Option<String> {
        match self {
            VisionService::Available(client) => client.describe(path).await.map(|t| t.text),
            VisionService::Unavailable => {
                tracing::debug!("Vision flow not configured");
                None
            }
        }
    }

    /// Incremental description chunks. Closes immediately when the flow is
    /// unconfigured.
    pub fn describe_stream(&self, path: PathBuf) -> mpsc::Receiver<String> {
        match self {
            VisionService::Available(client) => client.describe_stream(path),
            VisionService::Unavailable => {
                let (_tx, rx) = mpsc::channel(1);
                rx
            }
        }
    }
}
