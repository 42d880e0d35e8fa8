//! Orchestrator - drives compose -> harmonize -> animate -> poll.
//!
//! Validation problems are returned as errors before any request goes out.
//! Everything that happens after a request is sent ends up in the job state
//! instead, so a failed stage never leaves the pipeline stuck as pending.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::job::{format_status, Job, JobKind, JobResult};
use crate::service::{AnimationStatus, Base64Image, GenerationService, ServiceError};

/// Interval between animation status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Which part of the workflow is in front of the user.
#[derive(Debug, Clone, PartialEq)]
pub enum View {
    /// Arranging the collage.
    Editing,
    /// A rendered composite is waiting for harmonization instructions.
    Reviewing { composite_png: Vec<u8> },
    /// The harmonized image, ready to animate.
    Result { harmonized: Base64Image },
}

/// Problems detected before contacting any service.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("No rendered composite to harmonize")]
    NoComposite,

    #[error("No harmonized image to animate")]
    NoHarmonizedImage,

    #[error("Animation description is required")]
    EmptyDescription,

    #[error("{0} job already in progress")]
    Busy(JobKind),
}

/// The polling task for one animate job. Aborted when dropped.
struct PollTask {
    handle: JoinHandle<()>,
}

impl Drop for PollTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Owns the pipeline state: the current view and the latest job of each kind.
pub struct Orchestrator<S: GenerationService> {
    service: Arc<S>,
    poll_interval: Duration,
    view: View,
    harmonize: Job,
    /// Current animate job. Replaced, never reset, when a new job starts.
    animate: watch::Sender<Job>,
    poll_task: Option<PollTask>,
}

impl<S: GenerationService> Orchestrator<S> {
    pub fn new(service: Arc<S>) -> Self {
        Self::with_poll_interval(service, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(service: Arc<S>, poll_interval: Duration) -> Self {
        let (animate, _) = watch::channel(Job::new(JobKind::Animate));
        Self {
            service,
            poll_interval,
            view: View::Editing,
            harmonize: Job::new(JobKind::Harmonize),
            animate,
            poll_task: None,
        }
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn harmonize_job(&self) -> &Job {
        &self.harmonize
    }

    /// Snapshot of the current animate job.
    pub fn animate_job(&self) -> Job {
        self.animate.borrow().clone()
    }

    /// Receiver that sees every update to the current animate job.
    pub fn subscribe_animation(&self) -> watch::Receiver<Job> {
        self.animate.subscribe()
    }

    /// True while a poll task is alive.
    pub fn is_polling(&self) -> bool {
        self.poll_task
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Show a freshly rendered composite for review.
    pub fn review(&mut self, composite_png: Vec<u8>) {
        self.view = View::Reviewing { composite_png };
    }

    /// Leave the review without harmonizing.
    pub fn close_review(&mut self) {
        if matches!(self.view, View::Reviewing { .. }) {
            self.view = View::Editing;
        }
    }

    /// Open the result view on an image harmonized earlier.
    pub fn load_harmonized(&mut self, harmonized: Base64Image) {
        self.view = View::Result { harmonized };
    }

    /// Send the reviewed composite for harmonization.
    ///
    /// On success the view switches to the result. On failure the review is
    /// closed and the error is kept on the harmonize job.
    pub async fn harmonize(&mut self, instructions: &str) -> Result<&Job, OrchestratorError> {
        let composite_png = match &self.view {
            View::Reviewing { composite_png } if !composite_png.is_empty() => {
                composite_png.clone()
            }
            _ => return Err(OrchestratorError::NoComposite),
        };

        self.harmonize = Job::new(JobKind::Harmonize);
        self.harmonize.submit("Harmonizing...");

        match self.service.harmonize(composite_png, instructions).await {
            Ok(harmonized) => {
                log::info!("Harmonization succeeded");
                self.harmonize
                    .succeed(JobResult::Image(harmonized.image.clone()));
                self.harmonize.status_text.clear();
                self.view = View::Result {
                    harmonized: harmonized.image,
                };
            }
            Err(e) => {
                log::error!("Harmonization failed: {}", e);
                self.harmonize
                    .fail(failure_message(&e, "Failed to generate image. Please try again."));
                self.view = View::Editing;
            }
        }

        Ok(&self.harmonize)
    }

    /// Submit the harmonized image for animation and start polling.
    ///
    /// Any previous poll task is stopped first. A blank description is
    /// rejected without touching the current job.
    pub async fn start_animation(&mut self, description: &str) -> Result<(), OrchestratorError> {
        let harmonized = match &self.view {
            View::Result { harmonized } => harmonized.clone(),
            _ => return Err(OrchestratorError::NoHarmonizedImage),
        };
        if description.trim().is_empty() {
            return Err(OrchestratorError::EmptyDescription);
        }
        if self.animate.borrow().is_pending() {
            return Err(OrchestratorError::Busy(JobKind::Animate));
        }

        self.stop_polling();
        let (tx, _) = watch::channel(Job::new(JobKind::Animate));
        self.animate = tx.clone();
        tx.send_modify(|job| {
            job.submit("Starting prediction...");
        });

        let submitted = match harmonized.to_bytes() {
            Ok(image_png) => self.service.submit_animation(image_png, description).await,
            Err(e) => Err(e),
        };

        let ticket = match submitted {
            Ok(ticket) => ticket,
            Err(e) => {
                log::error!("Error creating animation: {}", e);
                tx.send_modify(|job| {
                    job.fail(failure_message(
                        &e,
                        "Failed to create animation. Please try again.",
                    ));
                    job.status_text.clear();
                });
                return Ok(());
            }
        };

        tx.send_modify(|job| {
            job.external_id = Some(ticket.prediction_id.clone());
            job.processing(format_status(&ticket.status));
        });

        let handle = tokio::spawn(poll_until_terminal(
            Arc::clone(&self.service),
            ticket.prediction_id,
            self.poll_interval,
            tx,
        ));
        self.poll_task = Some(PollTask { handle });
        Ok(())
    }

    /// Wait until the current animate job reaches a terminal state.
    pub async fn wait_for_animation(&self) -> Job {
        let mut rx = self.animate.subscribe();
        let result = rx.wait_for(|job| job.is_terminal()).await.map(|job| job.clone());
        result.unwrap_or_else(|_| self.animate_job())
    }

    /// Close the result view: drops the harmonized image, stops polling and
    /// resets the animate job.
    pub fn close_result(&mut self) {
        self.stop_polling();
        let (tx, _) = watch::channel(Job::new(JobKind::Animate));
        self.animate = tx;
        if matches!(self.view, View::Result { .. }) {
            self.view = View::Editing;
        }
    }

    /// Stop the poll task, if any. Safe to call at any time.
    ///
    /// A job that was still pending ends as failed with "Animation cancelled",
    /// so a new animation can be started afterwards.
    pub fn stop_polling(&mut self) {
        if let Some(task) = self.poll_task.take() {
            log::debug!("Stopping animation polling");
            drop(task);
        }
        self.animate.send_if_modified(|job| {
            if !job.is_pending() {
                return false;
            }
            job.fail("Animation cancelled");
            job.status_text.clear();
            true
        });
    }
}

impl<S: GenerationService> Drop for Orchestrator<S> {
    fn drop(&mut self) {
        // abort only; nobody is left to see a cancelled job
        self.poll_task.take();
    }
}

async fn poll_until_terminal<S: GenerationService>(
    service: Arc<S>,
    prediction_id: String,
    interval: Duration,
    tx: watch::Sender<Job>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately; polls start one interval after submit
    ticker.tick().await;

    loop {
        ticker.tick().await;
        log::debug!("Checking animation status for {}", prediction_id);

        match service.poll_animation(&prediction_id).await {
            Ok(AnimationStatus::Running { status }) => {
                tx.send_modify(|job| {
                    job.processing(format_status(&status));
                });
            }
            Ok(AnimationStatus::Completed { video_url }) => {
                log::info!("Animation completed: {}", video_url);
                tx.send_modify(|job| {
                    job.succeed(JobResult::Video { url: video_url });
                    job.status_text = format_status("succeeded");
                });
                break;
            }
            Ok(AnimationStatus::Failed { error }) => {
                log::error!("Animation failed: {}", error);
                tx.send_modify(|job| {
                    job.fail(error);
                    job.status_text = format_status("failed");
                });
                break;
            }
            Err(e) => {
                log::error!("Error checking animation status: {}", e);
                tx.send_modify(|job| {
                    job.fail(failure_message(&e, "Failed to check animation status"));
                    job.status_text.clear();
                });
                break;
            }
        }
    }
}

/// Message shown for a failed stage. Proxy-reported errors keep their text;
/// transport and decoding problems get the stage's generic message.
fn failure_message(error: &ServiceError, generic: &str) -> String {
    match error {
        ServiceError::Api { message, .. } | ServiceError::InvalidResponse(message) => {
            message.clone()
        }
        _ => generic.to_string(),
    }
}
