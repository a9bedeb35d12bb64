use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Background ingestion work handed off from the request-handling thread,
/// which returns a `file_id` immediately while this runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Job {
    IngestFile {
        file_id: String,
        original_filename: String,
        content_type: Option<String>,
        bytes: Vec<u8>,
    },
}

#[async_trait::async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: Job) -> anyhow::Result<()>;
}

/// Simple in-memory queue using Tokio channels
pub struct ChannelJobQueue {
    sender: mpsc::Sender<Job>,
}

impl ChannelJobQueue {
    pub fn new(sender: mpsc::Sender<Job>) -> Self {
        Self { sender }
    }
}

#[async_trait::async_trait]
impl JobQueue for ChannelJobQueue {
    async fn enqueue(&self, job: Job) -> anyhow::Result<()> {
        self.sender
            .send(job)
            .await
            .map_err(|e| anyhow::anyhow!("Queue send error: {}", e))
    }
}
