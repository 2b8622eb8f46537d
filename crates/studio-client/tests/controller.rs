use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

use studio_client::controller::CANCELLED_MESSAGE;
use studio_client::{
    AttemptError, GenerationController, GenerationRequest, GenerationState, GenerationTransport,
    Session,
};
use studio_types::api::{ErrorBody, ErrorDetail, GenerationRecord};
use studio_types::models::{GenerationStatus, ImageMime, Style};

type AttemptResult = Result<GenerationRecord, AttemptError>;

enum Step {
    Respond(AttemptResult),
    /// Never completes.
    Hang,
    /// Completes once the notify fires.
    Gate(Arc<Notify>, AttemptResult),
}

#[derive(Default)]
struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<(Instant, GenerationRequest)>>,
}

impl ScriptedTransport {
    fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            calls: Mutex::default(),
        }
    }

    fn push(&self, step: Step) {
        self.steps.lock().unwrap().push_back(step);
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(at, _)| *at).collect()
    }

    fn requests(&self) -> Vec<GenerationRequest> {
        self.calls.lock().unwrap().iter().map(|(_, r)| r.clone()).collect()
    }
}

impl GenerationTransport for ScriptedTransport {
    async fn create_generation(
        &self,
        _session: &Session,
        request: &GenerationRequest,
    ) -> AttemptResult {
        self.calls
            .lock()
            .unwrap()
            .push((Instant::now(), request.clone()));
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .expect("transport called more times than scripted");
        match step {
            Step::Respond(result) => result,
            Step::Hang => std::future::pending().await,
            Step::Gate(notify, result) => {
                notify.notified().await;
                result
            }
        }
    }
}

fn record(prompt: &str) -> GenerationRecord {
    let id = Uuid::new_v4();
    GenerationRecord {
        id,
        prompt: prompt.into(),
        style: Style::Artistic,
        image_url: format!("/uploads/{}.jpg", id),
        original_image_url: format!("/uploads/original-{}.jpg", id),
        status: GenerationStatus::Completed,
        created_at: Utc::now(),
    }
}

fn overloaded() -> AttemptResult {
    Err(AttemptError::rejected(
        503,
        Some(ErrorBody {
            error: ErrorDetail::Message("Model overloaded".into()),
            retryable: Some(true),
        }),
    ))
}

fn rejected(status: u16, message: &str) -> AttemptResult {
    Err(AttemptError::rejected(
        status,
        Some(ErrorBody {
            error: ErrorDetail::Message(message.into()),
            retryable: None,
        }),
    ))
}

fn request() -> GenerationRequest {
    GenerationRequest::new(
        vec![0x89, b'P', b'N', b'G'],
        "cat.png",
        ImageMime::Png,
        "a cat in a hat",
        Style::Artistic,
    )
}

fn session() -> Session {
    Session::new("token")
}

fn controller(steps: Vec<Step>) -> Arc<GenerationController<ScriptedTransport>> {
    Arc::new(GenerationController::new(ScriptedTransport::new(steps)))
}

async fn wait_for_calls(controller: &GenerationController<ScriptedTransport>, n: usize) {
    while controller.transport().call_count() < n {
        tokio::task::yield_now().await;
    }
}

fn spawn_generate(
    controller: &Arc<GenerationController<ScriptedTransport>>,
) -> tokio::task::JoinHandle<Option<GenerationRecord>> {
    let controller = Arc::clone(controller);
    tokio::spawn(async move { controller.generate(&session(), request()).await })
}

#[tokio::test(start_paused = true)]
async fn first_attempt_success() {
    let expected = record("a cat in a hat");
    let c = controller(vec![Step::Respond(Ok(expected.clone()))]);

    let result = c.generate(&session(), request()).await;

    assert_eq!(result, Some(expected.clone()));
    assert_eq!(
        c.snapshot(),
        GenerationState {
            is_generating: false,
            error: None,
            result: Some(expected),
            retry_count: 0,
        }
    );
    assert_eq!(c.transport().call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn non_retryable_failure_is_terminal() {
    let c = controller(vec![Step::Respond(rejected(400, "Invalid style"))]);

    assert_eq!(c.generate(&session(), request()).await, None);

    let state = c.snapshot();
    assert!(!state.is_generating);
    assert_eq!(state.error.as_deref(), Some("Invalid style"));
    assert_eq!(state.retry_count, 0);
    assert_eq!(c.transport().call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn status_503_without_flag_is_not_retried() {
    let c = controller(vec![Step::Respond(rejected(503, "Model overloaded"))]);

    assert_eq!(c.generate(&session(), request()).await, None);
    assert_eq!(c.snapshot().error.as_deref(), Some("Model overloaded"));
    assert_eq!(c.transport().call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn transport_failure_uses_generic_message() {
    let c = controller(vec![Step::Respond(Err(AttemptError::Transport(
        "connection refused".into(),
    )))]);

    assert_eq!(c.generate(&session(), request()).await, None);
    assert_eq!(c.snapshot().error.as_deref(), Some("Failed to generate image"));
    assert_eq!(c.transport().call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn retries_once_then_succeeds() {
    let expected = record("a cat in a hat");
    let c = controller(vec![
        Step::Respond(overloaded()),
        Step::Respond(Ok(expected.clone())),
    ]);

    let result = c.generate(&session(), request()).await;

    assert_eq!(result, Some(expected.clone()));
    let state = c.snapshot();
    assert!(!state.is_generating);
    assert_eq!(state.error, None);
    assert_eq!(state.result, Some(expected));
    assert_eq!(state.retry_count, 1);

    let times = c.transport().call_times();
    assert_eq!(times.len(), 2);
    assert!(times[1] - times[0] >= Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_three_retries_with_doubling_delays() {
    let c = controller(vec![
        Step::Respond(overloaded()),
        Step::Respond(overloaded()),
        Step::Respond(overloaded()),
        Step::Respond(overloaded()),
    ]);

    assert_eq!(c.generate(&session(), request()).await, None);

    let state = c.snapshot();
    assert!(!state.is_generating);
    assert_eq!(state.error.as_deref(), Some("Model overloaded"));
    assert_eq!(state.retry_count, 3);

    let times = c.transport().call_times();
    assert_eq!(times.len(), 4);
    assert!(times[1] - times[0] >= Duration::from_secs(1));
    assert!(times[2] - times[1] >= Duration::from_secs(2));
    assert!(times[3] - times[2] >= Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn every_retry_sends_the_same_payload() {
    let c = controller(vec![
        Step::Respond(overloaded()),
        Step::Respond(overloaded()),
        Step::Respond(Ok(record("a cat in a hat"))),
    ]);

    assert!(c.generate(&session(), request()).await.is_some());

    let requests = c.transport().requests();
    assert_eq!(requests.len(), 3);
    assert!(requests.iter().all(|r| *r == request()));
}

#[tokio::test(start_paused = true)]
async fn abort_cancels_in_flight_attempt() {
    let c = controller(vec![Step::Hang]);
    let handle = spawn_generate(&c);
    wait_for_calls(&c, 1).await;
    assert!(c.snapshot().is_generating);

    c.abort();

    assert_eq!(handle.await.unwrap(), None);
    let state = c.snapshot();
    assert!(!state.is_generating);
    assert_eq!(state.error.as_deref(), Some(CANCELLED_MESSAGE));
    assert_eq!(state.result, None);
    assert!(!c.is_generating());
}

#[tokio::test(start_paused = true)]
async fn abort_during_backoff_prevents_further_attempts() {
    let c = controller(vec![
        Step::Respond(overloaded()),
        Step::Respond(Ok(record("too late"))),
    ]);
    let handle = spawn_generate(&c);
    wait_for_calls(&c, 1).await;

    c.abort();
    assert_eq!(handle.await.unwrap(), None);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(c.transport().call_count(), 1);
    let state = c.snapshot();
    assert_eq!(state.error.as_deref(), Some(CANCELLED_MESSAGE));
    assert_eq!(state.result, None);
}

#[tokio::test(start_paused = true)]
async fn abort_when_idle_changes_nothing() {
    let c = controller(vec![]);
    c.abort();
    assert_eq!(c.snapshot(), GenerationState::default());
}

#[tokio::test(start_paused = true)]
async fn cancellation_wins_over_a_late_response() {
    let gate = Arc::new(Notify::new());
    let c = controller(vec![Step::Gate(gate.clone(), Ok(record("late")))]);
    let handle = spawn_generate(&c);
    wait_for_calls(&c, 1).await;

    // Response becomes ready and abort lands before the task runs again
    gate.notify_one();
    c.abort();

    assert_eq!(handle.await.unwrap(), None);
    let state = c.snapshot();
    assert_eq!(state.result, None);
    assert_eq!(state.error.as_deref(), Some(CANCELLED_MESSAGE));
    assert!(!state.is_generating);
}

#[tokio::test(start_paused = true)]
async fn concurrent_generate_is_rejected() {
    let gate = Arc::new(Notify::new());
    let expected = record("first");
    let c = controller(vec![Step::Gate(gate.clone(), Ok(expected.clone()))]);
    let first = spawn_generate(&c);
    wait_for_calls(&c, 1).await;

    assert_eq!(c.generate(&session(), request()).await, None);
    let state = c.snapshot();
    assert!(state.is_generating);
    assert_eq!(state.error, None);

    gate.notify_one();
    assert_eq!(first.await.unwrap(), Some(expected));
    assert_eq!(c.transport().call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn new_operation_clears_previous_error() {
    let c = controller(vec![Step::Respond(rejected(400, "No image provided"))]);
    assert_eq!(c.generate(&session(), request()).await, None);

    let expected = record("again");
    c.transport().push(Step::Respond(Ok(expected.clone())));
    assert_eq!(c.generate(&session(), request()).await, Some(expected));
    assert_eq!(c.snapshot().error, None);
}

#[tokio::test(start_paused = true)]
async fn reset_clears_settled_state() {
    let c = controller(vec![Step::Respond(rejected(500, "Generation failed"))]);
    assert_eq!(c.generate(&session(), request()).await, None);
    assert!(c.snapshot().error.is_some());

    c.reset();
    assert_eq!(c.snapshot(), GenerationState::default());
}

#[tokio::test(start_paused = true)]
async fn dropping_generate_releases_the_controller() {
    let c = controller(vec![Step::Hang]);

    let timed_out = tokio::time::timeout(
        Duration::from_secs(5),
        c.generate(&session(), request()),
    )
    .await;
    assert!(timed_out.is_err());

    assert!(!c.is_generating());
    let state = c.snapshot();
    assert!(!state.is_generating);
    assert_eq!(state.error.as_deref(), Some(CANCELLED_MESSAGE));

    let expected = record("after drop");
    c.transport().push(Step::Respond(Ok(expected.clone())));
    assert_eq!(c.generate(&session(), request()).await, Some(expected));
}

#[tokio::test(start_paused = true)]
async fn subscribers_see_generating_flag() {
    let gate = Arc::new(Notify::new());
    let c = controller(vec![Step::Gate(gate.clone(), Ok(record("watched")))]);
    let mut rx = c.subscribe();
    let handle = spawn_generate(&c);

    rx.wait_for(|s| s.is_generating).await.unwrap();
    gate.notify_one();
    rx.wait_for(|s| !s.is_generating && s.result.is_some())
        .await
        .unwrap();
    assert!(handle.await.unwrap().is_some());
}
