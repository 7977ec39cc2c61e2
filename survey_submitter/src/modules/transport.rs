use crate::modules::error::TransportError;
use futures::{future::BoxFuture, FutureExt};

// Form field the fallback puts the JSON payload in
pub const FORM_DATA_FIELD: &str = "data";

// First strategy: POST the payload as JSON and read the body back
// Futures are 'static so the coordinator can race them against a deadline
pub trait DirectTransport: Send + Sync {
    fn post_json(&self, url: &str, body: String) -> BoxFuture<'static, Result<String, TransportError>>;
}

// Fallback strategy: a form POST into a named frame whose response is never read
// Resolving Ok is the frame's load signal, nothing more
pub trait FormTransport: Send + Sync {
    fn post_form(&self, url: &str, target: &str, json: String) -> BoxFuture<'static, Result<(), TransportError>>;
}

// reqwest-backed implementation of both strategies
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("survey_submitter/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self { client })
    }
}

fn map_send_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else {
        TransportError::Network(err.to_string())
    }
}

impl DirectTransport for HttpTransport {
    fn post_json(&self, url: &str, body: String) -> BoxFuture<'static, Result<String, TransportError>> {
        let request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);

        async move {
            let response = request.send().await.map_err(map_send_error)?;
            log::debug!("Direct request answered with status {}", response.status());

            // A response whose body cannot be read is its own failure mode
            response
                .text()
                .await
                .map_err(|e| TransportError::UnreadableBody(e.to_string()))
        }
        .boxed()
    }
}

impl FormTransport for HttpTransport {
    fn post_form(&self, url: &str, target: &str, json: String) -> BoxFuture<'static, Result<(), TransportError>> {
        let request = self.client.post(url).form(&[(FORM_DATA_FIELD, json)]);
        let target = target.to_string();

        async move {
            let response = request.send().await.map_err(map_send_error)?;
            // The body belongs to the frame and is dropped unread
            log::debug!("Frame {} loaded with status {}", target, response.status());
            Ok(())
        }
        .boxed()
    }
}
