//! Inbound message handling: decide, then spawn.

use std::sync::Arc;

use nzbrelay_grammar::{AnnouncementParser, Verdict, normalize, verdict};
use nzbrelay_shared::InboundMessage;
use tokio::task::JoinHandle;

use crate::events::{EventKind, EventSink, PipelineEvent};
use crate::keywords::KeywordSource;
use crate::pipeline::{JobOutcome, Pipeline};

/// Why a message did not start a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    UnwatchedSender,
    NoMatch,
    NotActionable,
}

impl IgnoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            IgnoreReason::UnwatchedSender => "unwatched sender",
            IgnoreReason::NoMatch => "no grammar match",
            IgnoreReason::NotActionable => "not actionable",
        }
    }
}

/// Result of [`Listener::decide`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Run {
        release_name: String,
        category: String,
        verdict: Verdict,
    },
    Ignored(IgnoreReason),
}

/// Turns inbound chat lines into pipeline runs.
pub struct Listener {
    watched_senders: Vec<String>,
    parser: AnnouncementParser,
    keywords: Arc<dyn KeywordSource>,
    pipeline: Arc<Pipeline>,
    events: Arc<dyn EventSink>,
}

impl Listener {
    pub fn new(
        watched_senders: Vec<String>,
        parser: AnnouncementParser,
        keywords: Arc<dyn KeywordSource>,
        pipeline: Arc<Pipeline>,
    ) -> Self {
        let events = pipeline.events();
        Self {
            watched_senders,
            parser,
            keywords,
            pipeline,
            events,
        }
    }

    /// Sender allow-list, normalize, parse, classify. No side effects
    /// beyond reading a keyword snapshot.
    pub async fn decide(&self, message: &InboundMessage) -> Dispatch {
        if !self.watched_senders.iter().any(|s| s == &message.sender) {
            return Dispatch::Ignored(IgnoreReason::UnwatchedSender);
        }

        let clean = normalize(&message.text);
        let Some(parsed) = self.parser.parse(&clean) else {
            return Dispatch::Ignored(IgnoreReason::NoMatch);
        };

        let keywords = self.keywords.snapshot().await;
        match verdict(&parsed, &keywords) {
            Some(verdict) => Dispatch::Run {
                release_name: parsed.release_name,
                category: parsed.category,
                verdict,
            },
            None => Dispatch::Ignored(IgnoreReason::NotActionable),
        }
    }

    /// Decide and, when actionable, spawn an independent pipeline run.
    ///
    /// The returned handle may be dropped; the run continues detached.
    pub async fn handle(&self, message: &InboundMessage) -> Option<JoinHandle<JobOutcome>> {
        match self.decide(message).await {
            Dispatch::Run {
                release_name,
                category,
                verdict,
            } => {
                tracing::info!(
                    release = %release_name,
                    category = %category,
                    verdict = ?verdict,
                    "release detected"
                );
                let pipeline = Arc::clone(&self.pipeline);
                Some(tokio::spawn(async move {
                    pipeline.run(&release_name, &category).await
                }))
            }
            Dispatch::Ignored(reason) => {
                // Unwatched chatter is too noisy to record.
                if reason != IgnoreReason::UnwatchedSender {
                    self.events.record(&PipelineEvent {
                        job_id: None,
                        release: String::new(),
                        kind: EventKind::Ignored {
                            sender: message.sender.clone(),
                            reason: reason.as_str().to_string(),
                        },
                    });
                }
                None
            }
        }
    }
}
