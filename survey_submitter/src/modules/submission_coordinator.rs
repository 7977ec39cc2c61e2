pub mod outcome;
pub mod payload;

use crate::{
    config::{EndpointConfig, SubmissionConfig},
    modules::{
        error::{SubmitError, TransportError},
        hidden_frame::FrameHost,
        settle::{race_deadline, Settled},
        transport::{DirectTransport, FormTransport},
    },
};
use chrono::Utc;
use outcome::{classify_body, AmbiguityReason, SubmissionResult};
use payload::SubmissionPayload;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::time::Duration;
use uuid::Uuid;

// Handles
// - Refusing to submit when no endpoint is configured
// - Sending the payload as JSON and interpreting whatever comes back
// - Falling back to a hidden form post when the direct request cannot be read
// - Folding every outcome into exactly one SubmissionResult
//
// Ambiguity resolves optimistically: an empty or unparseable reply, or a form
// post whose response cannot be read, is reported as Ambiguous rather than
// Failed. Blocking a submission that most likely went through is considered
// worse than an unconfirmed one, and callers are expected to say so to the user.
pub struct SubmissionCoordinator {

    // Endpoint URL, None when unset or left at the placeholder
    endpoint: Option<String>,

    // Transport for the direct JSON request
    direct: Arc<dyn DirectTransport>,

    // Transport for the hidden form fallback
    fallback: Arc<dyn FormTransport>,

    // Off-screen frames opened by the fallback
    frames: FrameHost,

    direct_timeout: Duration,
    fallback_timeout: Duration,

    // Set while a submission is running, one submission at a time
    in_flight: Arc<AtomicBool>,
}

// Where the direct attempt left us
enum DirectOutcome {
    Resolved(SubmissionResult),
    FallBack(TransportError),
}

impl SubmissionCoordinator {
    pub fn new(
        endpoint: &EndpointConfig,
        settings: &SubmissionConfig,
        direct: Arc<dyn DirectTransport>,
        fallback: Arc<dyn FormTransport>,
    ) -> Self {
        Self {
            endpoint: endpoint.configured_url().map(str::to_string),
            direct,
            fallback,
            frames: FrameHost::new(),
            direct_timeout: settings.direct_timeout(),
            fallback_timeout: settings.fallback_timeout(),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn frames(&self) -> &FrameHost {
        &self.frames
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    // Checked before anything is sent, an unset endpoint can never succeed
    pub fn endpoint(&self) -> Result<&str, SubmitError> {
        self.endpoint.as_deref().ok_or_else(|| {
            SubmitError::ConfigurationError("Submission endpoint URL is not configured".to_string())
        })
    }

    // Submit one payload. Never returns an error, every path ends in a SubmissionResult
    pub async fn submit(&self, payload: &SubmissionPayload) -> SubmissionResult {
        let url = match self.endpoint() {
            Ok(url) => url.to_string(),
            Err(e) => {
                log::error!("{}", e);
                return SubmissionResult::Failed(e);
            }
        };

        let _guard = match InFlightGuard::acquire(&self.in_flight) {
            Some(guard) => guard,
            None => {
                log::warn!("Submit ignored, another submission is in progress");
                return SubmissionResult::Failed(SubmitError::AlreadyInFlight);
            }
        };

        let submission_id = Uuid::new_v4();

        // Timestamp marks the submit, not when the form was filled
        let json = match payload.stamped(Utc::now()).to_json() {
            Ok(json) => json,
            Err(e) => {
                log::error!("[{}] Error serializing payload: {:?}", submission_id, e);
                return SubmissionResult::Failed(SubmitError::EncodingError(e.to_string()));
            }
        };

        log::info!("[{}] Submitting {} fields to {}", submission_id, payload.len(), url);

        let result = match self.try_direct(&url, json.clone(), submission_id).await {
            DirectOutcome::Resolved(result) => result,
            DirectOutcome::FallBack(err) => {
                log::warn!("[{}] Direct request failed ({}), falling back to form post", submission_id, err);
                self.try_hidden_form(&url, json, submission_id).await
            }
        };

        log::info!("[{}] Submission resolved: {:?}", submission_id, result);
        result
    }

    async fn try_direct(&self, url: &str, json: String, submission_id: Uuid) -> DirectOutcome {
        log::info!("[{}] - Sending direct JSON request...", submission_id);

        match race_deadline(self.direct_timeout, self.direct.post_json(url, json)).await {
            Settled::Completed(Ok(body)) => {
                log::debug!("[{}] -- Received {} byte body", submission_id, body.len());
                DirectOutcome::Resolved(classify_body(&body))
            }
            // Covers the unreadable body case too: the request went out, we just cannot see the answer
            Settled::Completed(Err(err)) => DirectOutcome::FallBack(err),
            Settled::TimedOut => DirectOutcome::FallBack(TransportError::Timeout(format!(
                "no response within {}s",
                self.direct_timeout.as_secs()
            ))),
        }
    }

    async fn try_hidden_form(&self, url: &str, json: String, submission_id: Uuid) -> SubmissionResult {
        // Dropped on every return below, which detaches the frame
        let frame = self.frames.open();
        log::info!("[{}] - Posting hidden form into {}...", submission_id, frame.name());

        match race_deadline(self.fallback_timeout, self.fallback.post_form(url, &frame.name(), json)).await {
            Settled::Completed(Ok(())) => SubmissionResult::Ambiguous(AmbiguityReason::DeliveredUnconfirmed),
            // A browser frame fires its load event even for an error page, so there this
            // case would read as Ambiguous. Here a failed form post means no strategy
            // reached the endpoint, and that is reported as a transport failure
            Settled::Completed(Err(err)) => {
                log::error!("[{}] -- Form post failed as well: {}", submission_id, err);
                SubmissionResult::Failed(SubmitError::TransportError(err))
            }
            Settled::TimedOut => {
                log::error!("[{}] -- Frame did not load within {:?}", submission_id, self.fallback_timeout);
                SubmissionResult::Failed(SubmitError::TransportError(TransportError::Timeout(format!(
                    "form post did not load within {}s",
                    self.fallback_timeout.as_secs()
                ))))
            }
        }
    }
}

// Clears the in-flight flag however the submission ends
struct InFlightGuard {
    flag: Arc<AtomicBool>,
}

impl InFlightGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag: flag.clone() })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::error::ProtocolError;
    use futures::{future::BoxFuture, FutureExt};
    use super::payload::FieldValue;
    use std::sync::{atomic::AtomicUsize, Mutex};
    use tokio::time::{sleep, Instant};

    const URL: &str = "https://script.example.com/exec";

    #[derive(Clone)]
    enum DirectBehaviour {
        Reply(&'static str),
        ReplyAfter(Duration, &'static str),
        Fail(TransportError),
        Hang,
    }

    #[derive(Clone)]
    struct FakeDirect {
        behaviour: DirectBehaviour,
        bodies: Arc<Mutex<Vec<String>>>,
    }

    impl FakeDirect {
        fn new(behaviour: DirectBehaviour) -> Self {
            Self { behaviour, bodies: Arc::new(Mutex::new(Vec::new())) }
        }

        fn calls(&self) -> usize {
            self.bodies.lock().unwrap().len()
        }
    }

    impl DirectTransport for FakeDirect {
        fn post_json(&self, url: &str, body: String) -> BoxFuture<'static, Result<String, TransportError>> {
            assert_eq!(url, URL);
            self.bodies.lock().unwrap().push(body);
            let behaviour = self.behaviour.clone();
            async move {
                match behaviour {
                    DirectBehaviour::Reply(body) => Ok(body.to_string()),
                    DirectBehaviour::ReplyAfter(delay, body) => {
                        sleep(delay).await;
                        Ok(body.to_string())
                    }
                    DirectBehaviour::Fail(err) => Err(err),
                    DirectBehaviour::Hang => futures::future::pending().await,
                }
            }
            .boxed()
        }
    }

    #[derive(Clone)]
    enum FormBehaviour {
        Load,
        LoadAfter(Duration),
        Fail,
        Hang,
    }

    #[derive(Clone)]
    struct FakeForm {
        behaviour: FormBehaviour,
        posts: Arc<Mutex<Vec<(String, String)>>>,
        loads: Arc<AtomicUsize>,
    }

    impl FakeForm {
        fn new(behaviour: FormBehaviour) -> Self {
            Self { behaviour, posts: Arc::new(Mutex::new(Vec::new())), loads: Arc::new(AtomicUsize::new(0)) }
        }

        fn calls(&self) -> usize {
            self.posts.lock().unwrap().len()
        }
    }

    impl FormTransport for FakeForm {
        fn post_form(&self, url: &str, target: &str, json: String) -> BoxFuture<'static, Result<(), TransportError>> {
            assert_eq!(url, URL);
            self.posts.lock().unwrap().push((target.to_string(), json));
            let behaviour = self.behaviour.clone();
            let loads = self.loads.clone();
            async move {
                match behaviour {
                    FormBehaviour::Load => {}
                    FormBehaviour::LoadAfter(delay) => sleep(delay).await,
                    FormBehaviour::Fail => return Err(TransportError::Network("connection refused".to_string())),
                    FormBehaviour::Hang => futures::future::pending::<()>().await,
                }
                loads.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            .boxed()
        }
    }

    fn coordinator(url: Option<&str>, direct: &FakeDirect, form: &FakeForm) -> SubmissionCoordinator {
        SubmissionCoordinator::new(
            &EndpointConfig { url: url.map(str::to_string) },
            &SubmissionConfig::default(),
            Arc::new(direct.clone()),
            Arc::new(form.clone()),
        )
    }

    fn payload() -> SubmissionPayload {
        let mut payload = SubmissionPayload::new();
        payload.insert("Name", FieldValue::Text("Ada".to_string()));
        payload.insert("Email", FieldValue::Text("ada@example.com".to_string()));
        payload.insert("food", FieldValue::Integer(4));
        payload
    }

    #[tokio::test(start_paused = true)]
    async fn test_acknowledged_without_fallback() {
        let direct = FakeDirect::new(DirectBehaviour::Reply(r#"{"success": true, "message": "saved"}"#));
        let form = FakeForm::new(FormBehaviour::Load);
        let coordinator = coordinator(Some(URL), &direct, &form);

        let result = coordinator.submit(&payload()).await;

        assert_eq!(result, SubmissionResult::Acknowledged { message: Some("saved".to_string()) });
        assert_eq!(direct.calls(), 1);
        assert_eq!(form.calls(), 0);
        assert!(!coordinator.is_in_flight());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_is_failure() {
        let direct = FakeDirect::new(DirectBehaviour::Reply(r#"{"success": false, "error": "x"}"#));
        let form = FakeForm::new(FormBehaviour::Load);
        let coordinator = coordinator(Some(URL), &direct, &form);

        let result = coordinator.submit(&payload()).await;

        assert_eq!(
            result,
            SubmissionResult::Failed(SubmitError::ProtocolError(ProtocolError::Rejected("x".to_string())))
        );
        assert_eq!(form.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_markup_page_does_not_fall_back() {
        let direct = FakeDirect::new(DirectBehaviour::Reply("<!DOCTYPE html><html><body>Sign in</body></html>"));
        let form = FakeForm::new(FormBehaviour::Load);
        let coordinator = coordinator(Some(URL), &direct, &form);

        let result = coordinator.submit(&payload()).await;

        assert_eq!(
            result,
            SubmissionResult::Failed(SubmitError::ProtocolError(ProtocolError::DeploymentMisconfigured))
        );
        assert_eq!(form.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unparseable_and_empty_bodies_are_ambiguous() {
        let form = FakeForm::new(FormBehaviour::Load);

        let direct = FakeDirect::new(DirectBehaviour::Reply("Thanks!"));
        let result = coordinator(Some(URL), &direct, &form).submit(&payload()).await;
        assert_eq!(result, SubmissionResult::Ambiguous(AmbiguityReason::UnparseableBody));

        let direct = FakeDirect::new(DirectBehaviour::Reply(""));
        let result = coordinator(Some(URL), &direct, &form).submit(&payload()).await;
        assert_eq!(result, SubmissionResult::Ambiguous(AmbiguityReason::EmptyBody));

        assert_eq!(form.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_error_falls_back_to_form() {
        let direct = FakeDirect::new(DirectBehaviour::Fail(TransportError::Network("blocked".to_string())));
        let form = FakeForm::new(FormBehaviour::LoadAfter(Duration::from_secs(2)));
        let coordinator = coordinator(Some(URL), &direct, &form);
        let started = Instant::now();

        let result = coordinator.submit(&payload()).await;

        assert_eq!(result, SubmissionResult::Ambiguous(AmbiguityReason::DeliveredUnconfirmed));
        assert!(started.elapsed() <= Duration::from_secs(10));
        assert_eq!(direct.calls(), 1);
        assert_eq!(form.calls(), 1);
        assert_eq!(coordinator.frames().live_frames(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_body_falls_back_to_form() {
        let direct = FakeDirect::new(DirectBehaviour::Fail(TransportError::UnreadableBody("opaque".to_string())));
        let form = FakeForm::new(FormBehaviour::Load);
        let coordinator = coordinator(Some(URL), &direct, &form);

        let result = coordinator.submit(&payload()).await;

        assert_eq!(result, SubmissionResult::Ambiguous(AmbiguityReason::DeliveredUnconfirmed));
        assert_eq!(direct.calls(), 1);
        assert_eq!(form.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_posts_same_stamped_payload() {
        let direct = FakeDirect::new(DirectBehaviour::Fail(TransportError::Network("blocked".to_string())));
        let form = FakeForm::new(FormBehaviour::Load);
        let coordinator = coordinator(Some(URL), &direct, &form);

        coordinator.submit(&payload()).await;

        let direct_body = direct.bodies.lock().unwrap()[0].clone();
        let (target, form_body) = form.posts.lock().unwrap()[0].clone();
        assert_eq!(direct_body, form_body);
        assert!(target.starts_with("submission_frame_"));

        let value: serde_json::Value = serde_json::from_str(&direct_body).unwrap();
        assert_eq!(value["Name"], "Ada");
        assert_eq!(value["food"], 4);
        let timestamp = value["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_direct_request_falls_back_after_deadline() {
        let direct = FakeDirect::new(DirectBehaviour::Hang);
        let form = FakeForm::new(FormBehaviour::Load);
        let coordinator = coordinator(Some(URL), &direct, &form);
        let started = Instant::now();

        let result = coordinator.submit(&payload()).await;

        assert_eq!(result, SubmissionResult::Ambiguous(AmbiguityReason::DeliveredUnconfirmed));
        assert!(started.elapsed() >= Duration::from_secs(30));
        assert!(started.elapsed() < Duration::from_secs(31));
    }

    #[tokio::test(start_paused = true)]
    async fn test_direct_reply_just_before_deadline_wins() {
        let direct = FakeDirect::new(DirectBehaviour::ReplyAfter(Duration::from_secs(29), r#"{"success": true}"#));
        let form = FakeForm::new(FormBehaviour::Load);
        let coordinator = coordinator(Some(URL), &direct, &form);

        let result = coordinator.submit(&payload()).await;

        assert_eq!(result, SubmissionResult::Acknowledged { message: None });
        assert_eq!(form.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_timeout_fails_and_removes_frame() {
        let direct = FakeDirect::new(DirectBehaviour::Fail(TransportError::Network("blocked".to_string())));
        let form = FakeForm::new(FormBehaviour::Hang);
        let coordinator = coordinator(Some(URL), &direct, &form);
        let started = Instant::now();

        let result = coordinator.submit(&payload()).await;

        assert!(matches!(
            result,
            SubmissionResult::Failed(SubmitError::TransportError(TransportError::Timeout(_)))
        ));
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert!(started.elapsed() < Duration::from_secs(11));
        assert_eq!(coordinator.frames().live_frames(), 0);
        assert!(!coordinator.is_in_flight());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_load_signal_is_discarded() {
        let direct = FakeDirect::new(DirectBehaviour::Fail(TransportError::Network("blocked".to_string())));
        let form = FakeForm::new(FormBehaviour::LoadAfter(Duration::from_secs(15)));
        let coordinator = coordinator(Some(URL), &direct, &form);

        let result = coordinator.submit(&payload()).await;
        assert!(matches!(result, SubmissionResult::Failed(SubmitError::TransportError(TransportError::Timeout(_)))));

        // The aborted post must never report its load
        sleep(Duration::from_secs(30)).await;
        assert_eq!(form.loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_error_exhausts_strategies() {
        let direct = FakeDirect::new(DirectBehaviour::Fail(TransportError::Network("blocked".to_string())));
        let form = FakeForm::new(FormBehaviour::Fail);
        let coordinator = coordinator(Some(URL), &direct, &form);

        let result = coordinator.submit(&payload()).await;

        assert!(matches!(
            result,
            SubmissionResult::Failed(SubmitError::TransportError(TransportError::Network(_)))
        ));
        assert_eq!(direct.calls(), 1);
        assert_eq!(coordinator.frames().live_frames(), 0);
    }

    #[test]
    fn test_unconfigured_endpoint_fails_without_network() {
        let direct = FakeDirect::new(DirectBehaviour::Reply(r#"{"success": true}"#));
        let form = FakeForm::new(FormBehaviour::Load);

        for url in [None, Some(""), Some(crate::config::PLACEHOLDER_ENDPOINT)] {
            let coordinator = coordinator(url, &direct, &form);
            // Resolves on first poll, before any suspension point
            let result = coordinator.submit(&payload()).now_or_never();
            assert!(matches!(result, Some(SubmissionResult::Failed(SubmitError::ConfigurationError(_)))));
        }
        assert_eq!(direct.calls(), 0);
        assert_eq!(form.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_submits_are_independent() {
        let direct = FakeDirect::new(DirectBehaviour::Reply(r#"{"success": true}"#));
        let form = FakeForm::new(FormBehaviour::Load);
        let coordinator = coordinator(Some(URL), &direct, &form);

        let first = coordinator.submit(&payload()).await;
        assert!(!coordinator.is_in_flight());
        let second = coordinator.submit(&payload()).await;
        assert!(!coordinator.is_in_flight());

        assert_eq!(first, SubmissionResult::Acknowledged { message: None });
        assert_eq!(second, first);
        assert_eq!(direct.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_submit_is_rejected() {
        let direct = FakeDirect::new(DirectBehaviour::ReplyAfter(Duration::from_secs(1), r#"{"success": true}"#));
        let form = FakeForm::new(FormBehaviour::Load);
        let coordinator = coordinator(Some(URL), &direct, &form);
        let payload = payload();

        let (first, second) = tokio::join!(coordinator.submit(&payload), coordinator.submit(&payload));

        let rejected = SubmissionResult::Failed(SubmitError::AlreadyInFlight);
        let acknowledged = SubmissionResult::Acknowledged { message: None };
        assert!(
            (first == acknowledged && second == rejected) || (first == rejected && second == acknowledged),
            "unexpected pair: {:?} / {:?}",
            first,
            second
        );
        assert_eq!(direct.calls(), 1);
        assert!(!coordinator.is_in_flight());
    }
}
