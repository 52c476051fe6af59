//! Pipeline events and the sinks that record them.
//!
//! A sink is handed to the pipeline and listener when they are assembled
//! and is never swapped afterwards.

use std::path::PathBuf;

use uuid::Uuid;

use crate::pipeline::Stage;

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A job was started.
    Started { category: String },
    /// An inbound line was dropped before any job existed.
    Ignored { sender: String, reason: String },
    /// The announcement was handed to the transport.
    Announced { channel: String },
    /// Routing or sending the announcement failed; the job carries on.
    AnnounceFailed { error: String },
    /// The preview image is on disk.
    ImageSaved { path: PathBuf, bytes: u64 },
    /// Special release: finished after the image.
    SpecialFinished,
    /// The artifact is in the durable output directory.
    ArtifactSaved { path: PathBuf, bytes: u64 },
    /// Clip release: dedup, upload and record were skipped.
    ClipSkipped,
    /// A prior record contains the canonical name.
    Duplicate { final_name: String },
    /// Upload succeeded.
    Uploaded,
    /// Upload failed or is not configured; the job carries on.
    UploadFailed { error: String },
    /// A dedup record was inserted.
    Recorded { final_name: String },
    /// Terminal success.
    Completed,
    /// Terminal failure at `stage`.
    Failed { stage: Stage, error: String },
}

/// One event, tagged with the job and release it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineEvent {
    /// `None` for events raised before a job exists.
    pub job_id: Option<Uuid>,
    pub release: String,
    pub kind: EventKind,
}

/// Receives pipeline events.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &PipelineEvent);
}

/// Sink that forwards every event to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: &PipelineEvent) {
        let job_id = event.job_id.map(|id| id.to_string()).unwrap_or_default();
        let release = event.release.as_str();

        match &event.kind {
            EventKind::Started { category } => {
                tracing::info!(job_id, release, category, "job started");
            }
            EventKind::Ignored { sender, reason } => {
                tracing::debug!(sender, reason, "message ignored");
            }
            EventKind::Announced { channel } => {
                tracing::info!(job_id, release, channel, "announced");
            }
            EventKind::AnnounceFailed { error } => {
                tracing::warn!(job_id, release, error, "announce failed");
            }
            EventKind::ImageSaved { path, bytes } => {
                tracing::info!(job_id, release, path = %path.display(), bytes, "image saved");
            }
            EventKind::SpecialFinished => {
                tracing::info!(job_id, release, "special release finished after image");
            }
            EventKind::ArtifactSaved { path, bytes } => {
                tracing::info!(job_id, release, path = %path.display(), bytes, "artifact saved");
            }
            EventKind::ClipSkipped => {
                tracing::info!(job_id, release, "clip release, skipping dedup and upload");
            }
            EventKind::Duplicate { final_name } => {
                tracing::warn!(job_id, release, final_name, "duplicate, upload skipped");
            }
            EventKind::Uploaded => {
                tracing::info!(job_id, release, "uploaded");
            }
            EventKind::UploadFailed { error } => {
                tracing::error!(job_id, release, error, "upload failed");
            }
            EventKind::Recorded { final_name } => {
                tracing::info!(job_id, release, final_name, "recorded");
            }
            EventKind::Completed => {
                tracing::info!(job_id, release, "job completed");
            }
            EventKind::Failed { stage, error } => {
                tracing::error!(job_id, release, stage = ?stage, error, "job failed");
            }
        }
    }
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&self, _event: &PipelineEvent) {}
}
