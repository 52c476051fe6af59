//! Fulfillment pipeline: one release in, announcement and artifact out.
//!
//! Each run walks a fixed sequence of [`Stage`]s, strictly forward:
//!
//! ```text
//! Start → Fetch → Announce → DownloadImage → TypeBranch ─┬─ special ──────────→ Completed
//!                                                        └→ RequireArtifact → DownloadArtifact
//!   → DedupCheck ─┬─ clip ──────────────────→ Completed
//!                 ├─ duplicate ─→ RecordOrSkip → Completed
//!                 └→ Upload ────→ RecordOrSkip → Completed
//! ```
//!
//! Any fatal error ends the run in `Failed`. Announce and Upload are
//! best-effort: their failures are recorded and the run continues.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use nzbrelay_fetch::{MetadataClient, Uploader, fetch_to_file};
use nzbrelay_grammar::{is_clip, is_special};
use nzbrelay_shared::{RelayError, ReleaseJob, Result};
use nzbrelay_storage::DedupStore;
use reqwest::Client;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::events::{EventKind, EventSink, PipelineEvent, TracingSink};
use crate::router::Router;

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Outbound "send text to channel" primitive of the chat transport.
#[async_trait]
pub trait Announcer: Send + Sync {
    async fn send(&self, channel: &str, text: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Stage / outcome
// ---------------------------------------------------------------------------

/// Pipeline states, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Entry point; records the start event.
    Start,
    /// Query the indexer and extract the image and artifact links.
    Fetch,
    /// Post the styled announcement (best-effort).
    Announce,
    /// Download the cover image into the work directory.
    DownloadImage,
    /// Special releases finish here.
    TypeBranch,
    /// Fail when the metadata had no artifact link.
    RequireArtifact,
    /// Download the artifact and copy it to the output directory.
    DownloadArtifact,
    /// Look up the canonical name in the dedup store.
    DedupCheck,
    /// Re-upload the artifact (best-effort).
    Upload,
    /// Insert the dedup record unless the release was a duplicate.
    RecordOrSkip,
    /// Terminal: the run finished.
    Completed,
    /// Terminal: a fatal error stopped the run.
    Failed,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct JobReport {
    /// Id of the run, also carried by its events.
    pub job_id: Uuid,
    /// Release name as announced.
    pub release_name: String,
    /// Canonical dedup key; `None` when dedup was skipped.
    pub final_name: Option<String>,
    /// Downloaded cover image.
    pub image_path: Option<PathBuf>,
    /// Durable artifact copy in the output directory.
    pub artifact_path: Option<PathBuf>,
    /// Set when the release was already recorded.
    pub skip_upload: bool,
    /// Whether the upload endpoint accepted the artifact.
    pub uploaded: bool,
    /// Whether a dedup record was inserted.
    pub recorded: bool,
}

/// How a run ended.
#[derive(Debug)]
pub enum JobOutcome {
    /// The run reached [`Stage::Completed`].
    Completed(JobReport),
    /// A fatal error at `stage` ended the run.
    Failed {
        /// Stage that failed.
        stage: Stage,
        /// The error that ended the run.
        error: RelayError,
    },
}

impl JobOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, JobOutcome::Completed(_))
    }

    pub fn report(&self) -> Option<&JobReport> {
        match self {
            JobOutcome::Completed(report) => Some(report),
            JobOutcome::Failed { .. } => None,
        }
    }
}

/// Mutable state of one run.
struct Run {
    job: ReleaseJob,
    uploaded: bool,
    recorded: bool,
}

impl Run {
    fn into_report(self) -> JobReport {
        JobReport {
            job_id: self.job.id,
            release_name: self.job.release_name,
            final_name: self.job.final_name,
            image_path: self.job.image_path,
            artifact_path: self.job.final_artifact_path,
            skip_upload: self.job.skip_upload,
            uploaded: self.uploaded,
            recorded: self.recorded,
        }
    }
}

// ---------------------------------------------------------------------------
// Final name
// ---------------------------------------------------------------------------

const QUALITY_TOKENS: [&str; 4] = ["_SD", ".720p", ".1080p", ".2160p"];
const CATEGORY_DELIMITER: &str = ".XXX";

/// Canonical name used for dedup: quality tokens removed, then everything
/// from the first `.XXX` onward dropped.
pub fn extract_final_name(release_name: &str) -> String {
    let mut name = release_name.to_string();
    for token in QUALITY_TOKENS {
        name = name.replace(token, "");
    }
    match name.find(CATEGORY_DELIMITER) {
        Some(idx) => name[..idx].to_string(),
        None => name,
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Runs releases through the fulfillment stages.
///
/// Holds no per-job state; one instance serves any number of concurrent runs.
pub struct Pipeline {
    client: Client,
    metadata: MetadataClient,
    uploader: Option<Uploader>,
    store: Arc<dyn DedupStore>,
    router: Router,
    announcer: Arc<dyn Announcer>,
    events: Arc<dyn EventSink>,
    work_dir: PathBuf,
    output_dir: PathBuf,
}

impl Pipeline {
    pub fn new(
        client: Client,
        metadata: MetadataClient,
        router: Router,
        store: Arc<dyn DedupStore>,
        announcer: Arc<dyn Announcer>,
        work_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client,
            metadata,
            uploader: None,
            store,
            router,
            announcer,
            events: Arc::new(TracingSink),
            work_dir: work_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Enable the upload stage. Without an uploader, uploads are reported
    /// as failed and the run continues.
    pub fn with_uploader(mut self, uploader: Uploader) -> Self {
        self.uploader = Some(uploader);
        self
    }

    /// Replace the default [`TracingSink`].
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> Arc<dyn EventSink> {
        Arc::clone(&self.events)
    }

    /// Create the working and output directories.
    pub async fn prepare(&self) -> Result<()> {
        for dir in [&self.work_dir, &self.output_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| RelayError::io(dir.as_path(), e))?;
        }
        Ok(())
    }

    /// Run one release to a terminal stage. Never returns an error: fatal
    /// failures are reported in the outcome.
    #[instrument(skip_all, fields(release = %release_name, category = %category))]
    pub async fn run(&self, release_name: &str, category: &str) -> JobOutcome {
        let mut run = Run {
            job: ReleaseJob::new(release_name, category, &self.work_dir),
            uploaded: false,
            recorded: false,
        };
        let mut stage = Stage::Start;

        while !stage.is_terminal() {
            debug!(job_id = %run.job.id, ?stage, "entering stage");
            stage = match self.step(stage, &mut run).await {
                Ok(next) => next,
                Err(error) => {
                    self.emit(
                        &run.job,
                        EventKind::Failed {
                            stage,
                            error: error.to_string(),
                        },
                    );
                    return JobOutcome::Failed { stage, error };
                }
            };
        }

        self.emit(&run.job, EventKind::Completed);
        JobOutcome::Completed(run.into_report())
    }

    async fn step(&self, stage: Stage, run: &mut Run) -> Result<Stage> {
        let job = &mut run.job;
        match stage {
            Stage::Start => {
                self.emit(
                    job,
                    EventKind::Started {
                        category: job.category.clone(),
                    },
                );
                Ok(Stage::Fetch)
            }

            Stage::Fetch => {
                let links = self.metadata.lookup(&job.release_name).await?;
                let image_url = links.image_url.ok_or_else(|| {
                    RelayError::MissingResource(format!(
                        "no image URL in metadata for {}",
                        job.release_name
                    ))
                })?;
                job.image_url = Some(image_url);
                job.artifact_url = links.artifact_url;
                Ok(Stage::Announce)
            }

            Stage::Announce => {
                self.announce(job).await;
                Ok(Stage::DownloadImage)
            }

            Stage::DownloadImage => {
                let url = required(&job.image_url, "image URL")?;
                let path = self.work_dir.join(format!("{}.jpg", job.file_stem()));
                let bytes = fetch_to_file(&self.client, url, &path, false).await?;
                self.emit(
                    job,
                    EventKind::ImageSaved {
                        path: path.clone(),
                        bytes,
                    },
                );
                job.image_path = Some(path);
                Ok(Stage::TypeBranch)
            }

            Stage::TypeBranch => {
                if is_special(&job.release_name) {
                    self.emit(job, EventKind::SpecialFinished);
                    Ok(Stage::Completed)
                } else {
                    Ok(Stage::RequireArtifact)
                }
            }

            Stage::RequireArtifact => {
                if job.artifact_url.is_none() {
                    return Err(RelayError::MissingResource(format!(
                        "no artifact URL in metadata for {}",
                        job.release_name
                    )));
                }
                Ok(Stage::DownloadArtifact)
            }

            Stage::DownloadArtifact => {
                let url = required(&job.artifact_url, "artifact URL")?;
                let stem = job.file_stem();
                // Concurrent runs of one release must not share a temp file.
                let temp = self.work_dir.join(format!("{stem}.{}.nzb", job.id));
                fetch_to_file(&self.client, url, &temp, true).await?;
                job.temp_artifact_path = Some(temp.clone());

                let durable = self.output_dir.join(format!("{stem}.nzb"));
                let bytes = copy_file(&temp, &durable).await?;
                self.emit(
                    job,
                    EventKind::ArtifactSaved {
                        path: durable.clone(),
                        bytes,
                    },
                );
                job.final_artifact_path = Some(durable);
                Ok(Stage::DedupCheck)
            }

            Stage::DedupCheck => {
                if is_clip(&job.release_name) {
                    self.emit(job, EventKind::ClipSkipped);
                    return Ok(Stage::Completed);
                }
                let final_name = extract_final_name(&job.release_name);
                let existing = self.store.count_matching(&final_name).await?;
                job.final_name = Some(final_name.clone());
                if existing > 0 {
                    job.skip_upload = true;
                    self.emit(job, EventKind::Duplicate { final_name });
                    Ok(Stage::RecordOrSkip)
                } else {
                    Ok(Stage::Upload)
                }
            }

            Stage::Upload => {
                let result = match (&self.uploader, &job.final_artifact_path) {
                    (Some(uploader), Some(path)) => uploader.upload(&job.release_name, path).await,
                    (None, _) => Err(RelayError::Upload("no upload endpoint configured".into())),
                    (_, None) => Err(RelayError::Upload("no artifact to upload".into())),
                };
                match result {
                    Ok(()) => {
                        run.uploaded = true;
                        self.emit(job, EventKind::Uploaded);
                    }
                    Err(e) => self.emit(
                        job,
                        EventKind::UploadFailed {
                            error: e.to_string(),
                        },
                    ),
                }
                Ok(Stage::RecordOrSkip)
            }

            Stage::RecordOrSkip => {
                if !job.skip_upload {
                    let final_name = job
                        .final_name
                        .clone()
                        .unwrap_or_else(|| extract_final_name(&job.release_name));
                    self.store.insert(&final_name).await?;
                    run.recorded = true;
                    self.emit(job, EventKind::Recorded { final_name });
                }
                Ok(Stage::Completed)
            }

            Stage::Completed | Stage::Failed => Ok(stage),
        }
    }

    async fn announce(&self, job: &ReleaseJob) {
        let link = job.image_url.as_deref().unwrap_or_default();
        let result = match self.router.route(&job.category, &job.release_name, link) {
            Ok(route) => self
                .announcer
                .send(&route.channel, &route.message)
                .await
                .map(|()| route.channel),
            Err(e) => Err(e),
        };
        match result {
            Ok(channel) => self.emit(job, EventKind::Announced { channel }),
            Err(e) => self.emit(
                job,
                EventKind::AnnounceFailed {
                    error: e.to_string(),
                },
            ),
        }
    }

    fn emit(&self, job: &ReleaseJob, kind: EventKind) {
        self.events.record(&PipelineEvent {
            job_id: Some(job.id),
            release: job.release_name.clone(),
            kind,
        });
    }
}

fn required<'a>(value: &'a Option<String>, what: &str) -> Result<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| RelayError::MissingResource(what.to_string()))
}

async fn copy_file(from: &Path, to: &Path) -> Result<u64> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| RelayError::io(parent, e))?;
    }
    tokio::fs::copy(from, to)
        .await
        .map_err(|e| RelayError::io(to, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use nzbrelay_fetch::LinkPatterns;
    use nzbrelay_shared::ChannelsConfig;
    use nzbrelay_storage::MemoryStore;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // -----------------------------------------------------------------------
    // Test doubles
    // -----------------------------------------------------------------------

    #[derive(Default)]
    struct RecordingAnnouncer {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl RecordingAnnouncer {
        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Announcer for RecordingAnnouncer {
        async fn send(&self, channel: &str, text: &str) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((channel.to_string(), text.to_string()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<EventKind>>,
    }

    impl RecordingSink {
        fn kinds(&self) -> Vec<EventKind> {
            self.events.lock().unwrap().clone()
        }

        /// Short labels of the side-effect events, in order.
        fn trail(&self) -> Vec<&'static str> {
            self.kinds()
                .iter()
                .filter_map(|k| match k {
                    EventKind::Announced { .. } => Some("announce"),
                    EventKind::ImageSaved { .. } => Some("image"),
                    EventKind::ArtifactSaved { .. } => Some("artifact"),
                    EventKind::Uploaded => Some("upload"),
                    EventKind::Recorded { .. } => Some("record"),
                    _ => None,
                })
                .collect()
        }
    }

    impl EventSink for RecordingSink {
        fn record(&self, event: &PipelineEvent) {
            self.events.lock().unwrap().push(event.kind.clone());
        }
    }

    // -----------------------------------------------------------------------
    // Harness
    // -----------------------------------------------------------------------

    struct Harness {
        server: MockServer,
        _dir: tempfile::TempDir,
        work_dir: PathBuf,
        output_dir: PathBuf,
        store: Arc<MemoryStore>,
        announcer: Arc<RecordingAnnouncer>,
        sink: Arc<RecordingSink>,
        pipeline: Pipeline,
    }

    impl Harness {
        async fn new() -> Self {
            let server = MockServer::start().await;
            let dir = tempfile::tempdir().unwrap();
            let work_dir = dir.path().join("work");
            let output_dir = dir.path().join("out");
            let store = Arc::new(MemoryStore::new());
            let announcer = Arc::new(RecordingAnnouncer::default());
            let sink = Arc::new(RecordingSink::default());

            let client = Client::new();
            let patterns = LinkPatterns::new(
                r"http://127\.0\.0\.1:[0-9]+/img/[0-9a-z_/]+\.jpg",
                r#"http://127\.0\.0\.1:[0-9]+/nzb/\?id=[^<"]+"#,
            )
            .unwrap();
            let metadata = MetadataClient::new(
                client.clone(),
                &format!("{}/xml/", server.uri()),
                "user",
                "key",
                patterns,
            )
            .unwrap();
            let uploader = Uploader::new(
                client.clone(),
                &format!("{}/upload", server.uri()),
                "upkey",
                Duration::from_secs(5),
            )
            .unwrap();

            let pipeline = Pipeline::new(
                client,
                metadata,
                Router::new(&ChannelsConfig::default()),
                store.clone(),
                announcer.clone(),
                &work_dir,
                &output_dir,
            )
            .with_uploader(uploader)
            .with_events(sink.clone());
            pipeline.prepare().await.unwrap();

            Self {
                server,
                _dir: dir,
                work_dir,
                output_dir,
                store,
                announcer,
                sink,
                pipeline,
            }
        }

        fn metadata_body(&self, image: bool, artifact: bool) -> String {
            let mut body = String::from("<rss><item>");
            if image {
                body.push_str(&format!("<img>{}/img/ab/cover_1.jpg</img>", self.server.uri()));
            }
            if artifact {
                body.push_str(&format!(
                    r#"<enclosure url="{}/nzb/?id=77&amp;k=v"/>"#,
                    self.server.uri()
                ));
            }
            body.push_str("</item></rss>");
            body
        }

        async fn mount_metadata(&self, release: &str, image: bool, artifact: bool) {
            Mock::given(method("GET"))
                .and(path("/xml/"))
                .and(query_param("search", release))
                .respond_with(
                    ResponseTemplate::new(200).set_body_string(self.metadata_body(image, artifact)),
                )
                .mount(&self.server)
                .await;
        }

        async fn mount_image(&self, times: u64) {
            Mock::given(method("GET"))
                .and(path("/img/ab/cover_1.jpg"))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(b"JPEG".to_vec()))
                .expect(times)
                .mount(&self.server)
                .await;
        }

        async fn mount_artifact(&self, times: u64) {
            Mock::given(method("GET"))
                .and(path("/nzb/"))
                .and(query_param("id", "77"))
                .and(query_param("k", "v"))
                .respond_with(ResponseTemplate::new(200).set_body_string("<nzb/>"))
                .expect(times)
                .mount(&self.server)
                .await;
        }

        async fn mount_upload(&self, status: u16, times: u64) {
            Mock::given(method("POST"))
                .and(path("/upload"))
                .and(query_param("apikey", "upkey"))
                .respond_with(ResponseTemplate::new(status))
                .expect(times)
                .mount(&self.server)
                .await;
        }
    }

    // -----------------------------------------------------------------------
    // Scenarios
    // -----------------------------------------------------------------------

    #[test]
    fn final_name_strips_quality_and_category_suffix() {
        assert_eq!(
            extract_final_name("Studio.24.05.12.Jane.Doe.XXX.1080p.MP4-GRP"),
            "Studio.24.05.12.Jane.Doe"
        );
        assert_eq!(extract_final_name("Name_SD.720p.Rest"), "Name.Rest");
        assert_eq!(extract_final_name("Plain.Name"), "Plain.Name");
    }

    #[tokio::test]
    async fn full_run_performs_side_effects_in_order() {
        let h = Harness::new().await;
        let release = "Studio.24.05.12.Scene.XXX.1080p.MP4-GRP";
        h.mount_metadata(release, true, true).await;
        h.mount_image(1).await;
        h.mount_artifact(1).await;
        h.mount_upload(200, 1).await;

        let outcome = h.pipeline.run(release, "XXX: HD-CLIPS").await;
        let report = outcome.report().expect("completed");

        assert!(report.uploaded);
        assert!(report.recorded);
        assert!(!report.skip_upload);
        assert_eq!(report.final_name.as_deref(), Some("Studio.24.05.12.Scene"));
        assert_eq!(
            h.sink.trail(),
            vec!["announce", "image", "artifact", "upload", "record"]
        );

        let sent = h.announcer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "#XXX1080");
        assert!(sent[0].1.contains("/img/ab/cover_1.jpg"));

        assert!(h.work_dir.join(format!("{release}.jpg")).exists());
        assert!(
            h.work_dir
                .join(format!("{release}.{}.nzb", report.job_id))
                .exists()
        );
        assert_eq!(
            std::fs::read_to_string(h.output_dir.join(format!("{release}.nzb"))).unwrap(),
            "<nzb/>"
        );
        assert_eq!(h.store.names(), vec!["Studio.24.05.12.Scene".to_string()]);
    }

    #[tokio::test]
    async fn repeated_release_uploads_and_records_once() {
        let h = Harness::new().await;
        let release = "Studio.Repeat.2024.XXX.2160p";
        h.mount_metadata(release, true, true).await;
        h.mount_image(2).await;
        h.mount_artifact(2).await;
        h.mount_upload(200, 1).await;

        let first = h.pipeline.run(release, "XXX: UHD-CLIPS").await;
        let second = h.pipeline.run(release, "XXX: UHD-CLIPS").await;

        assert!(!first.report().unwrap().skip_upload);
        let second = second.report().expect("second run completes");
        assert!(second.skip_upload);
        assert!(!second.uploaded);
        assert!(!second.recorded);

        assert_eq!(h.announcer.sent().len(), 2);
        assert_eq!(h.store.names().len(), 1);
        assert!(h.sink.kinds().iter().any(|k| matches!(
            k,
            EventKind::Duplicate { final_name } if final_name == "Studio.Repeat.2024"
        )));
    }

    #[tokio::test]
    async fn missing_image_fails_before_any_download() {
        let h = Harness::new().await;
        let release = "No.Image.2024";
        h.mount_metadata(release, false, true).await;
        h.mount_image(0).await;
        h.mount_artifact(0).await;
        h.mount_upload(200, 0).await;

        let outcome = h.pipeline.run(release, "XXX: HD-CLIPS").await;
        match outcome {
            JobOutcome::Failed { stage, error } => {
                assert_eq!(stage, Stage::Fetch);
                assert!(matches!(error, RelayError::MissingResource(_)));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(h.announcer.sent().is_empty());
        assert!(h.store.names().is_empty());
    }

    #[tokio::test]
    async fn metadata_error_is_fatal() {
        let h = Harness::new().await;
        Mock::given(method("GET"))
            .and(path("/xml/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&h.server)
            .await;

        let outcome = h.pipeline.run("Any.2024", "XXX: HD-CLIPS").await;
        assert!(matches!(
            outcome,
            JobOutcome::Failed {
                stage: Stage::Fetch,
                error: RelayError::Fetch(_)
            }
        ));
    }

    #[tokio::test]
    async fn special_release_stops_after_image() {
        let h = Harness::new().await;
        let release = "Some.P0RNL0V3R.Release.2024";
        h.mount_metadata(release, true, true).await;
        h.mount_image(1).await;
        h.mount_artifact(0).await;
        h.mount_upload(200, 0).await;

        let outcome = h.pipeline.run(release, "XXX: HD-CLIPS").await;
        assert!(outcome.is_completed());
        assert_eq!(h.sink.trail(), vec!["announce", "image"]);
        assert!(h.sink.kinds().contains(&EventKind::SpecialFinished));
        assert!(h.store.names().is_empty());
    }

    #[tokio::test]
    async fn special_release_completes_without_artifact_link() {
        let h = Harness::new().await;
        let release = "Other.P0RNL0V3R.Release.2024";
        h.mount_metadata(release, true, false).await;
        h.mount_image(1).await;
        h.mount_upload(200, 0).await;

        let outcome = h.pipeline.run(release, "XXX: HD-CLIPS").await;
        let report = outcome.report().expect("special release completes");
        assert!(report.image_path.is_some());
        assert_eq!(report.artifact_path, None);
        assert!(h.sink.kinds().contains(&EventKind::SpecialFinished));
        assert!(h.store.names().is_empty());
    }

    #[tokio::test]
    async fn clip_release_skips_dedup_upload_and_record() {
        let h = Harness::new().await;
        let release = "Studio.Clip.2024.XXX.1080p";
        h.mount_metadata(release, true, true).await;
        h.mount_image(1).await;
        h.mount_artifact(1).await;
        h.mount_upload(200, 0).await;

        let outcome = h.pipeline.run(release, "XXX: HD-CLIPS").await;
        let report = outcome.report().expect("completed");
        assert!(!report.uploaded);
        assert!(!report.recorded);
        assert_eq!(report.final_name, None);
        assert_eq!(h.sink.trail(), vec!["announce", "image", "artifact"]);
        assert!(h.sink.kinds().contains(&EventKind::ClipSkipped));
        assert!(h.store.names().is_empty());
    }

    #[tokio::test]
    async fn missing_artifact_fails_after_image() {
        let h = Harness::new().await;
        let release = "No.Artifact.2024";
        h.mount_metadata(release, true, false).await;
        h.mount_image(1).await;

        let outcome = h.pipeline.run(release, "XXX: TRANS").await;
        match outcome {
            JobOutcome::Failed { stage, error } => {
                assert_eq!(stage, Stage::RequireArtifact);
                assert!(matches!(error, RelayError::MissingResource(_)));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(h.announcer.sent()[0].0, "#XXXGAYTRANS");
        assert!(h.store.names().is_empty());
    }

    #[tokio::test]
    async fn upload_failure_still_records() {
        let h = Harness::new().await;
        let release = "Upload.Fails.2024";
        h.mount_metadata(release, true, true).await;
        h.mount_image(1).await;
        h.mount_artifact(1).await;
        h.mount_upload(500, 1).await;

        let outcome = h.pipeline.run(release, "XXX: HD-CLIPS").await;
        let report = outcome.report().expect("upload failure is not fatal");
        assert!(!report.uploaded);
        assert!(report.recorded);
        assert!(h
            .sink
            .kinds()
            .iter()
            .any(|k| matches!(k, EventKind::UploadFailed { .. })));
        assert_eq!(h.store.names(), vec!["Upload.Fails.2024".to_string()]);
    }

    #[tokio::test]
    async fn image_download_failure_is_fatal_after_announce() {
        let h = Harness::new().await;
        let release = "Broken.Image.2024";
        h.mount_metadata(release, true, true).await;
        Mock::given(method("GET"))
            .and(path("/img/ab/cover_1.jpg"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&h.server)
            .await;
        h.mount_artifact(0).await;

        let outcome = h.pipeline.run(release, "XXX: HD-CLIPS").await;
        assert!(matches!(
            outcome,
            JobOutcome::Failed {
                stage: Stage::DownloadImage,
                error: RelayError::Download { .. }
            }
        ));
        assert_eq!(h.announcer.sent().len(), 1);
    }

    #[tokio::test]
    async fn routing_failure_does_not_abort() {
        let h = Harness::new().await;
        let release = "Unrouted.2024";
        h.mount_metadata(release, true, true).await;
        h.mount_image(1).await;
        h.mount_artifact(1).await;
        h.mount_upload(200, 1).await;

        let channels = ChannelsConfig {
            hd: String::new(),
            ..ChannelsConfig::default()
        };
        let pipeline = Pipeline {
            router: Router::new(&channels),
            ..h.pipeline
        };

        let outcome = pipeline.run(release, "XXX: HD-CLIPS").await;
        assert!(outcome.is_completed());
        assert!(h.announcer.sent().is_empty());
        assert!(h
            .sink
            .kinds()
            .iter()
            .any(|k| matches!(k, EventKind::AnnounceFailed { .. })));
    }

    struct FailingAnnouncer;

    #[async_trait]
    impl Announcer for FailingAnnouncer {
        async fn send(&self, _channel: &str, _text: &str) -> Result<()> {
            Err(RelayError::Transport("not connected".into()))
        }
    }

    #[tokio::test]
    async fn announcer_error_does_not_abort() {
        let h = Harness::new().await;
        let release = "Send.Fails.2024";
        h.mount_metadata(release, true, true).await;
        h.mount_image(1).await;
        h.mount_artifact(1).await;
        h.mount_upload(200, 1).await;

        let pipeline = Pipeline {
            announcer: Arc::new(FailingAnnouncer),
            ..h.pipeline
        };

        let outcome = pipeline.run(release, "XXX: HD-CLIPS").await;
        let report = outcome.report().expect("announce failure is not fatal");
        assert!(report.uploaded);
        assert!(report.recorded);
        assert!(h.sink.kinds().iter().any(|k| matches!(
            k,
            EventKind::AnnounceFailed { error } if error.contains("not connected")
        )));
        assert_eq!(h.sink.trail(), vec!["image", "artifact", "upload", "record"]);
    }

    #[tokio::test]
    async fn concurrent_runs_of_one_release_use_separate_temp_files() {
        let h = Harness::new().await;
        let release = "Same.Time.2024";
        h.mount_metadata(release, true, true).await;
        h.mount_image(2).await;
        h.mount_artifact(2).await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&h.server)
            .await;

        let (a, b) = tokio::join!(
            h.pipeline.run(release, "XXX: HD-CLIPS"),
            h.pipeline.run(release, "XXX: HD-CLIPS"),
        );
        let (a, b) = (a.report().expect("first"), b.report().expect("second"));
        assert_ne!(a.job_id, b.job_id);

        for report in [a, b] {
            let temp = h.work_dir.join(format!("{release}.{}.nzb", report.job_id));
            assert_eq!(std::fs::read_to_string(temp).unwrap(), "<nzb/>");
        }
        assert_eq!(h.store.names(), vec!["Same.Time.2024".to_string()]);
    }
}
