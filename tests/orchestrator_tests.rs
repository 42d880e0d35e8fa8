//! Orchestrator behavior against a scripted in-process service.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use collage_studio::jobs::{JobResult, JobStatus, Orchestrator, OrchestratorError, View};
use collage_studio::service::{
    AnimationStatus, AnimationTicket, Base64Image, GenerationService, Harmonized, ServiceError,
};

const FAST_POLL: Duration = Duration::from_millis(20);
const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// Fake proxy. Poll responses are played back in order; once the script
/// runs out every poll reports "processing".
#[derive(Default)]
struct ScriptedService {
    harmonize_error: Option<String>,
    submit_error: Option<String>,
    poll_script: Mutex<VecDeque<Result<AnimationStatus, ServiceError>>>,
    poll_delay: Duration,
    harmonize_calls: AtomicUsize,
    submit_calls: AtomicUsize,
    poll_calls: AtomicUsize,
    polls_in_flight: AtomicUsize,
    max_polls_in_flight: AtomicUsize,
}

impl ScriptedService {
    fn with_polls(script: Vec<AnimationStatus>) -> Self {
        Self::with_poll_results(script.into_iter().map(Ok).collect())
    }

    fn with_poll_results(script: Vec<Result<AnimationStatus, ServiceError>>) -> Self {
        Self {
            poll_script: Mutex::new(script.into()),
            ..Default::default()
        }
    }

    fn polls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }
}

impl GenerationService for ScriptedService {
    async fn harmonize(
        &self,
        _composite_png: Vec<u8>,
        instructions: &str,
    ) -> Result<Harmonized, ServiceError> {
        self.harmonize_calls.fetch_add(1, Ordering::SeqCst);
        match &self.harmonize_error {
            Some(message) => Err(ServiceError::Api {
                status: 500,
                message: message.clone(),
            }),
            None => Ok(Harmonized {
                image: Base64Image::new("AAAA"),
                instructions: instructions.to_string(),
            }),
        }
    }

    async fn submit_animation(
        &self,
        _image_png: Vec<u8>,
        _description: &str,
    ) -> Result<AnimationTicket, ServiceError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        match &self.submit_error {
            Some(message) => Err(ServiceError::Api {
                status: 500,
                message: message.clone(),
            }),
            None => Ok(AnimationTicket {
                prediction_id: "p1".to_string(),
                status: "starting".to_string(),
            }),
        }
    }

    async fn poll_animation(&self, prediction_id: &str) -> Result<AnimationStatus, ServiceError> {
        assert_eq!(prediction_id, "p1");
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.polls_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_polls_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        if !self.poll_delay.is_zero() {
            tokio::time::sleep(self.poll_delay).await;
        }

        self.polls_in_flight.fetch_sub(1, Ordering::SeqCst);
        let next = self.poll_script.lock().unwrap().pop_front();
        next.unwrap_or(Ok(AnimationStatus::Running {
            status: "processing".to_string(),
        }))
    }

    async fn generate_image(&self, _prompt: &str) -> Result<Base64Image, ServiceError> {
        Ok(Base64Image::new("AAAA"))
    }
}

fn orchestrator(service: &Arc<ScriptedService>) -> Orchestrator<ScriptedService> {
    Orchestrator::with_poll_interval(Arc::clone(service), FAST_POLL)
}

fn harmonized_image() -> Base64Image {
    Base64Image::new("AAAA")
}

// === Harmonize ===

#[tokio::test]
async fn test_harmonize_success_shows_result() {
    let service = Arc::new(ScriptedService::default());
    let mut orch = orchestrator(&service);
    orch.review(vec![1, 2, 3]);

    let job = orch.harmonize("more contrast").await.unwrap();
    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.result, Some(JobResult::Image(Base64Image::new("AAAA"))));

    match orch.view() {
        View::Result { harmonized } => {
            assert_eq!(harmonized.data_url(), "data:image/png;base64,AAAA");
        }
        other => panic!("Expected result view, got {:?}", other),
    }
}

#[tokio::test]
async fn test_harmonize_failure_returns_to_editing() {
    let service = Arc::new(ScriptedService {
        harmonize_error: Some("OpenAI processing failed".to_string()),
        ..Default::default()
    });
    let mut orch = orchestrator(&service);
    orch.review(vec![1, 2, 3]);

    let job = orch.harmonize("").await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_message.as_deref(), Some("OpenAI processing failed"));
    assert_eq!(orch.view(), &View::Editing);
}

#[tokio::test]
async fn test_harmonize_without_review_makes_no_call() {
    let service = Arc::new(ScriptedService::default());
    let mut orch = orchestrator(&service);

    let err = orch.harmonize("").await.unwrap_err();
    assert_eq!(err, OrchestratorError::NoComposite);
    assert_eq!(service.harmonize_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_close_review_returns_to_editing() {
    let service = Arc::new(ScriptedService::default());
    let mut orch = orchestrator(&service);
    orch.review(vec![1]);
    orch.close_review();
    assert_eq!(orch.view(), &View::Editing);
}

// === Animate ===

#[tokio::test]
async fn test_blank_description_makes_no_call() {
    let service = Arc::new(ScriptedService::default());
    let mut orch = orchestrator(&service);
    orch.load_harmonized(harmonized_image());

    let err = orch.start_animation("   ").await.unwrap_err();
    assert_eq!(err, OrchestratorError::EmptyDescription);
    assert_eq!(service.submit_calls.load(Ordering::SeqCst), 0);
    assert_eq!(orch.animate_job().status, JobStatus::Idle);
    assert!(!orch.is_polling());
}

#[tokio::test]
async fn test_animate_without_harmonized_image() {
    let service = Arc::new(ScriptedService::default());
    let mut orch = orchestrator(&service);

    let err = orch.start_animation("wave").await.unwrap_err();
    assert_eq!(err, OrchestratorError::NoHarmonizedImage);
    assert_eq!(service.submit_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_animation_completes_and_stops_polling() {
    let service = Arc::new(ScriptedService::with_polls(vec![
        AnimationStatus::Running {
            status: "processing".to_string(),
        },
        AnimationStatus::Completed {
            video_url: "https://cdn.example/v.mp4".to_string(),
        },
    ]));
    let mut orch = orchestrator(&service);
    orch.load_harmonized(harmonized_image());

    orch.start_animation("the kite flutters").await.unwrap();
    let submitted = orch.animate_job();
    assert_eq!(submitted.status, JobStatus::Processing);
    assert_eq!(submitted.external_id.as_deref(), Some("p1"));

    let job = tokio::time::timeout(WAIT_LIMIT, orch.wait_for_animation())
        .await
        .expect("animation never finished");
    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(
        job.result,
        Some(JobResult::Video {
            url: "https://cdn.example/v.mp4".to_string()
        })
    );
    assert_eq!(job.status_text, "Animation completed!");

    tokio::time::sleep(FAST_POLL * 5).await;
    assert_eq!(service.polls(), 2);
    assert!(!orch.is_polling());
}

#[tokio::test]
async fn test_animation_failure_is_recorded() {
    let service = Arc::new(ScriptedService::with_polls(vec![AnimationStatus::Failed {
        error: "boom".to_string(),
    }]));
    let mut orch = orchestrator(&service);
    orch.load_harmonized(harmonized_image());

    orch.start_animation("wave").await.unwrap();
    let job = tokio::time::timeout(WAIT_LIMIT, orch.wait_for_animation())
        .await
        .expect("animation never finished");

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_message.as_deref(), Some("boom"));
    assert_eq!(job.result, None);

    tokio::time::sleep(FAST_POLL * 5).await;
    assert_eq!(service.polls(), 1);
}

#[tokio::test]
async fn test_poll_transport_error_fails_job_and_stops_polling() {
    let service = Arc::new(ScriptedService::with_poll_results(vec![Err(
        ServiceError::IoError(std::io::Error::other("connection reset")),
    )]));
    let mut orch = orchestrator(&service);
    orch.load_harmonized(harmonized_image());

    orch.start_animation("wave").await.unwrap();
    let job = tokio::time::timeout(WAIT_LIMIT, orch.wait_for_animation())
        .await
        .expect("animation never finished");

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(
        job.error_message.as_deref(),
        Some("Failed to check animation status")
    );

    tokio::time::sleep(FAST_POLL * 5).await;
    assert_eq!(service.polls(), 1);
    assert!(!orch.is_polling());
}

#[tokio::test]
async fn test_submit_failure_is_recorded_without_polling() {
    let service = Arc::new(ScriptedService {
        submit_error: Some("Animation failed".to_string()),
        ..Default::default()
    });
    let mut orch = orchestrator(&service);
    orch.load_harmonized(harmonized_image());

    orch.start_animation("wave").await.unwrap();
    let job = orch.animate_job();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_message.as_deref(), Some("Animation failed"));
    assert!(!orch.is_polling());

    tokio::time::sleep(FAST_POLL * 3).await;
    assert_eq!(service.polls(), 0);
}

#[tokio::test]
async fn test_second_animation_while_pending_is_busy() {
    let service = Arc::new(ScriptedService::default());
    let mut orch = orchestrator(&service);
    orch.load_harmonized(harmonized_image());

    orch.start_animation("wave").await.unwrap();
    let err = orch.start_animation("wave again").await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Busy(_)));
    assert_eq!(service.submit_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_restart_after_failure_replaces_job() {
    let service = Arc::new(ScriptedService::with_polls(vec![AnimationStatus::Failed {
        error: "boom".to_string(),
    }]));
    let mut orch = orchestrator(&service);
    orch.load_harmonized(harmonized_image());

    orch.start_animation("wave").await.unwrap();
    tokio::time::timeout(WAIT_LIMIT, orch.wait_for_animation())
        .await
        .expect("animation never finished");

    orch.start_animation("wave again").await.unwrap();
    let job = orch.animate_job();
    assert_eq!(job.status, JobStatus::Processing);
    assert_eq!(job.error_message, None);
    assert!(orch.is_polling());
}

#[tokio::test]
async fn test_first_poll_waits_one_interval() {
    let service = Arc::new(ScriptedService::default());
    let mut orch = Orchestrator::with_poll_interval(Arc::clone(&service), Duration::from_millis(300));
    orch.load_harmonized(harmonized_image());

    orch.start_animation("wave").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(service.polls(), 0);
}

#[tokio::test]
async fn test_polls_never_overlap() {
    let service = Arc::new(ScriptedService {
        poll_delay: Duration::from_millis(50),
        ..Default::default()
    });
    let mut orch = Orchestrator::with_poll_interval(Arc::clone(&service), Duration::from_millis(5));
    orch.load_harmonized(harmonized_image());

    orch.start_animation("wave").await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    orch.stop_polling();

    assert!(service.polls() >= 2);
    assert_eq!(service.max_polls_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_first_status_line_follows_ticket() {
    let service = Arc::new(ScriptedService::default());
    let mut orch = orchestrator(&service);
    orch.load_harmonized(harmonized_image());

    orch.start_animation("wave").await.unwrap();
    assert_eq!(orch.animate_job().status_text, "Starting animation process...");
}

// === Teardown ===

#[tokio::test]
async fn test_stop_polling_allows_restart() {
    let service = Arc::new(ScriptedService::default());
    let mut orch = orchestrator(&service);
    orch.load_harmonized(harmonized_image());

    orch.start_animation("wave").await.unwrap();
    orch.stop_polling();

    let stopped = orch.animate_job();
    assert_eq!(stopped.status, JobStatus::Failed);
    assert_eq!(stopped.error_message.as_deref(), Some("Animation cancelled"));
    assert!(!orch.is_polling());

    orch.start_animation("wave again").await.unwrap();
    assert_eq!(orch.animate_job().status, JobStatus::Processing);
    assert!(orch.is_polling());
    assert_eq!(service.submit_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_stop_polling_without_job_keeps_idle() {
    let service = Arc::new(ScriptedService::default());
    let mut orch = orchestrator(&service);
    orch.stop_polling();
    assert_eq!(orch.animate_job().status, JobStatus::Idle);
}

#[tokio::test]
async fn test_stop_polling_leaves_finished_job_alone() {
    let service = Arc::new(ScriptedService::with_polls(vec![AnimationStatus::Completed {
        video_url: "https://cdn.example/v.mp4".to_string(),
    }]));
    let mut orch = orchestrator(&service);
    orch.load_harmonized(harmonized_image());

    orch.start_animation("wave").await.unwrap();
    tokio::time::timeout(WAIT_LIMIT, orch.wait_for_animation())
        .await
        .expect("animation never finished");

    orch.stop_polling();
    let job = orch.animate_job();
    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.error_message, None);
}

#[tokio::test]
async fn test_close_result_stops_polling() {
    let service = Arc::new(ScriptedService::default());
    let mut orch = orchestrator(&service);
    orch.load_harmonized(harmonized_image());

    orch.start_animation("wave").await.unwrap();
    tokio::time::sleep(FAST_POLL * 4).await;
    assert!(orch.is_polling());

    orch.close_result();
    let polls_at_close = service.polls();
    assert_eq!(orch.view(), &View::Editing);
    assert_eq!(orch.animate_job().status, JobStatus::Idle);

    tokio::time::sleep(FAST_POLL * 5).await;
    assert_eq!(service.polls(), polls_at_close);
}

#[tokio::test]
async fn test_dropping_orchestrator_stops_polling() {
    let service = Arc::new(ScriptedService::default());
    let mut orch = orchestrator(&service);
    orch.load_harmonized(harmonized_image());

    orch.start_animation("wave").await.unwrap();
    let mut updates = orch.subscribe_animation();
    updates.borrow_and_update();
    drop(orch);
    let polls_at_drop = service.polls();

    tokio::time::sleep(FAST_POLL * 5).await;
    assert_eq!(service.polls(), polls_at_drop);
    // the poll task owned the sender, so subscribers see the channel close
    assert!(updates.changed().await.is_err());
}
