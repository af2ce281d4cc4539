//! HTTP client for a hosted Langflow vision flow.
//!
//! Wraps the three calls the arena needs (file upload, flow run, streamed
//! flow run) using [`reqwest`].

use std::path::{Path, PathBuf};

use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::response::{extract_text, FlowText};
use super::stream::{parse_event, EventFilter, LineBuffer, StreamEvent};
use crate::config::LangflowConfig;
use crate::metrics;

/// Prompt sent with every image.
pub const VISION_PROMPT: &str = "Describe the creature in this image for a Dungeons & Dragons \
     battle arena: its appearance, likely abilities and how dangerous it looks.";

/// Buffered chunks between the stream reader and its consumer.
const STREAM_BUFFER: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("Could not read image {}: {source}", path.display())]
    Image {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Langflow returned a non-2xx status code.
    #[error("Langflow API error ({status}): {body}")]
    Api { status: u16, body: String },
}

/// Response of the upload endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadedFile {
    /// Server-side path to reference from the run tweaks.
    #[serde(alias = "filePath", alias = "path")]
    pub file_path: String,
}

#[derive(Debug, Clone)]
pub struct LangflowClient {
    http: reqwest::Client,
    config: LangflowConfig,
}

impl LangflowClient {
    pub fn new(config: LangflowConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Upload a local image to the flow's file store.
    pub async fn upload(&self, path: &Path) -> Result<UploadedFile, VisionError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| VisionError::Image {
            path: path.to_path_buf(),
            source,
        })?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image.png")
            .to_string();

        let form = reqwest::multipart::Form::new()
            .part("file", reqwest::multipart::Part::bytes(bytes).file_name(file_name));

        let response = self
            .authorized(self.http.post(format!(
                "{}/api/v1/files/upload/{}",
                self.config.base_url, self.config.flow_id
            )))
            .multipart(form)
            .send()
            .await?;

        Ok(Self::ensure_success(response).await?.json().await?)
    }

    /// Run the flow on an uploaded file and return the raw response.
    pub async fn run(&self, file_path: &str) -> Result<Value, VisionError> {
        let response = self
            .authorized(self.http.post(self.run_url()))
            .json(&self.run_payload(file_path))
            .send()
            .await?;

        Ok(Self::ensure_success(response).await?.json().await?)
    }

    /// Upload, run and decode. Every failure is logged and reported as
    /// `None`.
    pub async fn describe(&self, path: &Path) -> Option<FlowText> {
        let result = async {
            let uploaded = self.upload(path).await?;
            self.run(&uploaded.file_path).await
        }
        .await;

        match result {
            Ok(body) => {
                let text = extract_text(&body);
                if text.is_none() {
                    tracing::warn!(path = %path.display(), "Flow response carried no text");
                }
                metrics::record_vision("run", if text.is_some() { "ok" } else { "empty" });
                text
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Vision flow failed");
                metrics::record_vision("run", "error");
                None
            }
        }
    }

    /// Stream the description of an image as it is generated.
    ///
    /// The returned receiver yields text chunks and closes when the flow
    /// ends. Errors are logged and close the channel early; they are never
    /// delivered to the receiver.
    pub fn describe_stream(&self, path: PathBuf) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let client = self.clone();
        tokio::spawn(async move {
            match client.pump_stream(&path, &tx).await {
                Ok(()) => metrics::record_vision("stream", "ok"),
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "Vision stream failed");
                    metrics::record_vision("stream", "error");
                }
            }
        });
        rx
    }

    async fn pump_stream(&self, path: &Path, tx: &mpsc::Sender<String>) -> Result<(), VisionError> {
        let uploaded = self.upload(path).await?;
        let response = self
            .authorized(self.http.post(format!("{}?stream=true", self.run_url())))
            .json(&self.run_payload(&uploaded.file_path))
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;

        let mut bytes = response.bytes_stream();
        let mut lines = LineBuffer::default();
        let mut filter = EventFilter::default();

        while let Some(chunk) = bytes.next().await {
            for line in lines.push(&chunk?) {
                if !forward(filter.admit(parse_event(&line)), tx).await {
                    return Ok(());
                }
            }
        }
        if let Some(line) = lines.finish() {
            forward(filter.admit(parse_event(&line)), tx).await;
        }
        Ok(())
    }

    // ---- private helpers ----

    fn run_url(&self) -> String {
        format!("{}/api/v1/run/{}", self.config.base_url, self.config.flow_id)
    }

    fn run_payload(&self, file_path: &str) -> Value {
        let mut tweaks = serde_json::Map::new();
        tweaks.insert(
            self.config.chat_input_id.clone(),
            json!({ "files": [file_path] }),
        );
        json!({
            "input_value": VISION_PROMPT,
            "input_type": "chat",
            "output_type": "chat",
            "tweaks": tweaks,
        })
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.header("x-api-key", key),
            None => request,
        }
    }

    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, VisionError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(VisionError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

/// Send an event's text downstream. Returns false once the stream should
/// stop: the flow ended or nobody is listening any more.
async fn forward(event: StreamEvent, tx: &mpsc::Sender<String>) -> bool {
    match event {
        StreamEvent::End => false,
        other => match other.into_text() {
            Some(text) => tx.send(text).await.is_ok(),
            None => true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(api_key: Option<&str>) -> LangflowClient {
        LangflowClient::new(LangflowConfig {
            base_url: "http://langflow.local".to_string(),
            api_key: api_key.map(str::to_string),
            flow_id: "flow-1".to_string(),
            chat_input_id: "ChatInput-abc".to_string(),
        })
    }

    #[test]
    fn test_run_payload_attaches_file_to_chat_input() {
        let payload = client(None).run_payload("flow-1/goblin.png");
        assert_eq!(payload["input_value"], VISION_PROMPT);
        assert_eq!(payload["input_type"], "chat");
        assert_eq!(
            payload["tweaks"]["ChatInput-abc"]["files"][0],
            "flow-1/goblin.png"
        );
    }

    #[test]
    fn test_run_url() {
        assert_eq!(client(None).run_url(), "http://langflow.local/api/v1/run/flow-1");
    }

    #[test]
    fn test_uploaded_file_aliases() {
        let a: UploadedFile = serde_json::from_str(r#"{"file_path":"x/a.png"}"#).unwrap();
        let b: UploadedFile = serde_json::from_str(r#"{"filePath":"x/b.png"}"#).unwrap();
        assert_eq!(a.file_path, "x/a.png");
        assert_eq!(b.file_path, "x/b.png");
    }

    #[tokio::test]
    async fn test_forward_stops_on_end_and_closed_receiver() {
        let (tx, mut rx) = mpsc::channel(4);
        assert!(forward(StreamEvent::Token("hi".into()), &tx).await);
        assert!(forward(StreamEvent::Ignored, &tx).await);
        assert!(!forward(StreamEvent::End, &tx).await);
        assert_eq!(rx.recv().await, Some("hi".to_string()));

        drop(rx);
        assert!(!forward(StreamEvent::Message("late".into()), &tx).await);
    }

    #[tokio::test]
    async fn test_describe_missing_file_is_none() {
        let c = client(Some("key"));
        assert_eq!(c.describe(Path::new("/definitely/not/here.png")).await, None);
    }

    #[tokio::test]
    async fn test_stream_missing_file_closes_channel() {
        let c = client(None);
        let mut rx = c.describe_stream(PathBuf::from("/definitely/not/here.png"));
        assert_eq!(rx.recv().await, None);
    }
}
