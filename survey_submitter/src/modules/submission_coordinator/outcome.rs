use crate::modules::error::{ProtocolError, SubmitError};
use serde::Deserialize;
use std::fmt;

// Why a submission could not be confirmed either way
#[derive(Debug, Clone, PartialEq)]
pub enum AmbiguityReason {
    // The direct request came back with no body at all
    EmptyBody,
    // A body came back but it was neither an acknowledgement nor an HTML page
    UnparseableBody,
    // The hidden form was delivered, its response can never be read
    DeliveredUnconfirmed,
}

impl fmt::Display for AmbiguityReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmbiguityReason::EmptyBody => write!(f, "endpoint returned an empty response"),
            AmbiguityReason::UnparseableBody => write!(f, "endpoint response could not be parsed"),
            AmbiguityReason::DeliveredUnconfirmed => write!(f, "sent through the form fallback, response unreadable"),
        }
    }
}

// Terminal outcome of one submit
// Ambiguous is its own state: the request left the client but nothing confirmed
// that the endpoint processed it. Callers must not report it as Acknowledged
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionResult {
    Acknowledged { message: Option<String> },
    Ambiguous(AmbiguityReason),
    Failed(SubmitError),
}

impl SubmissionResult {
    // True for outcomes the user should see as (possibly qualified) success
    pub fn is_delivered(&self) -> bool {
        !matches!(self, SubmissionResult::Failed(_))
    }
}

// Acknowledgement body the endpoint sends when it can
#[derive(Debug, Deserialize)]
struct EndpointReply {
    success: bool,
    message: Option<String>,
    error: Option<String>,
}

// Interpret the body returned to the direct request
// The status code is not consulted: the endpoint has been seen answering with
// redirects and odd codes while still writing the row
pub fn classify_body(body: &str) -> SubmissionResult {
    let body = body.trim();
    if body.is_empty() {
        return SubmissionResult::Ambiguous(AmbiguityReason::EmptyBody);
    }

    match serde_json::from_str::<EndpointReply>(body) {
        Ok(reply) if reply.success => SubmissionResult::Acknowledged { message: reply.message },
        Ok(reply) => {
            let reason = reply
                .error
                .or(reply.message)
                .unwrap_or_else(|| "Endpoint rejected the submission".to_string());
            SubmissionResult::Failed(ProtocolError::Rejected(reason).into())
        }
        Err(_) if looks_like_markup(body) => {
            SubmissionResult::Failed(ProtocolError::DeploymentMisconfigured.into())
        }
        Err(_) => SubmissionResult::Ambiguous(AmbiguityReason::UnparseableBody),
    }
}

fn looks_like_markup(body: &str) -> bool {
    let head: String = body.chars().take(512).collect::<String>().to_ascii_lowercase();
    head.starts_with("<!doctype") || head.starts_with("<html") || head.contains("<body")
}
