use crate::queue::Job;
use ingestion::IngestionPipeline;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// Drains queued ingestion jobs and drives each through the pipeline,
/// keeping the request-handling thread free once a `file_id` has been
/// handed back to the caller.
pub struct Worker {
    receiver: mpsc::Receiver<Job>,
    pipeline: Arc<IngestionPipeline>,
}

impl Worker {
    pub fn new(receiver: mpsc::Receiver<Job>, pipeline: Arc<IngestionPipeline>) -> Self {
        Self { receiver, pipeline }
    }

    pub async fn run(mut self) {
        info!("ingestion worker started");
        while let Some(job) = self.receiver.recv().await {
            match job {
                Job::IngestFile {
                    file_id,
                    original_filename,
                    content_type,
                    bytes,
                } => {
                    info!(%file_id, %original_filename, "processing ingestion job");
                    self.pipeline
                        .ingest_file_with_id(
                            file_id,
                            &bytes,
                            &original_filename,
                            content_type.as_deref(),
                        )
                        .await;
                }
            }
        }
        info!("ingestion worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{ChannelJobQueue, JobQueue};
    use dashmap::DashMap;
    use haven_core::config::{ChunkingConfig, IngestConfig};
    use haven_core::model::IngestionStage;
    use ingestion::{ChunkStrategy, IngestionPipeline, LocalPrefixEmbedder, NullTranscriber};
    use storage::{ChunkStore, NoOpCipher, Repository};
    use tempfile::tempdir;

    #[tokio::test]
    async fn draining_a_queued_job_runs_it_through_the_pipeline_to_completion() {
        let dir = tempdir().unwrap();
        let chunk_store =
            Arc::new(ChunkStore::new(dir.path().join("chunks"), Arc::new(NoOpCipher)).unwrap());
        let repository = Arc::new(Repository::open(dir.path().join("wal.log")).await.unwrap());
        let pipeline = Arc::new(IngestionPipeline::new(
            chunk_store,
            repository.clone(),
            Arc::new(LocalPrefixEmbedder::new("embedding-default-v1", 16)),
            Arc::new(NullTranscriber),
            IngestConfig::default(),
            ChunkingConfig::default(),
            ChunkStrategy::TokenWindow,
            Arc::new(DashMap::new()),
        ));

        let (sender, receiver) = mpsc::channel(8);
        let queue = ChannelJobQueue::new(sender);
        let worker = Worker::new(receiver, pipeline.clone());
        let worker_handle = tokio::spawn(worker.run());

        queue
            .enqueue(Job::IngestFile {
                file_id: "feed1234".to_string(),
                original_filename: "note.txt".to_string(),
                content_type: None,
                bytes: b"hello from the job queue".to_vec(),
            })
            .await
            .unwrap();

        for _ in 0..100 {
            if matches!(
                pipeline.status(&"feed1234".to_string()).map(|s| s.stage),
                Some(IngestionStage::Complete)
            ) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let status = pipeline.status(&"feed1234".to_string()).unwrap();
        assert_eq!(status.stage, IngestionStage::Complete);
        assert!(repository.len().await > 0);

        drop(queue);
        worker_handle.await.unwrap();
    }
}
