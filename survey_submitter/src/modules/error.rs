use std::fmt;

// Errors raised while talking to the endpoint
// The coordinator never hands these to its caller directly, it either falls back
// to the next strategy or folds them into a SubmissionResult
#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    // Request never produced a response: connection refused, DNS, blocked request
    Network(String),
    // Response arrived but its body could not be read
    UnreadableBody(String),
    // The transport gave up on its own deadline
    Timeout(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Network(err) => write!(f, "Network error: {}", err),
            TransportError::UnreadableBody(err) => write!(f, "Unreadable response body: {}", err),
            TransportError::Timeout(err) => write!(f, "Transport timeout: {}", err),
        }
    }
}

impl std::error::Error for TransportError {}

// The endpoint answered, and the answer says the submission was not taken
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolError {
    // Structured acknowledgement with success = false
    Rejected(String),
    // An HTML page came back instead of JSON, usually a wrong deployment or access setting
    DeploymentMisconfigured,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::Rejected(err) => write!(f, "{}", err),
            ProtocolError::DeploymentMisconfigured => {
                write!(f, "Endpoint returned an HTML page, check the deployment access settings")
            }
        }
    }
}

// Submission error taxonomy
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitError {
    // Endpoint unset or still the placeholder, no request can succeed
    ConfigurationError(String),
    // Every strategy failed at the transport level
    TransportError(TransportError),
    // The endpoint answered with something recognizably wrong
    ProtocolError(ProtocolError),
    // The payload could not be serialized to JSON
    EncodingError(String),
    // Another submission is still running on this coordinator
    AlreadyInFlight,
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::ConfigurationError(err) => write!(f, "Configuration error: {}", err),
            SubmitError::TransportError(err) => write!(f, "{}", err),
            SubmitError::ProtocolError(err) => write!(f, "Protocol error: {}", err),
            SubmitError::EncodingError(err) => write!(f, "JSON serialization error: {}", err),
            SubmitError::AlreadyInFlight => write!(f, "A submission is already in progress"),
        }
    }
}

impl std::error::Error for SubmitError {}

impl From<TransportError> for SubmitError {
    fn from(err: TransportError) -> Self {
        SubmitError::TransportError(err)
    }
}

impl From<ProtocolError> for SubmitError {
    fn from(err: ProtocolError) -> Self {
        SubmitError::ProtocolError(err)
    }
}

// A single failed field check, keyed by the form field name
#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub enum FormError {
    // One or more fields failed validation
    Invalid(Vec<FieldError>),
    // The generated JSON schema was rejected by the validator
    SchemaError(String),
}

impl fmt::Display for FormError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormError::Invalid(errors) => {
                let fields: Vec<String> = errors
                    .iter()
                    .map(|e| format!("{}: {}", e.field, e.message))
                    .collect();
                write!(f, "Invalid form: {}", fields.join(", "))
            }
            FormError::SchemaError(err) => write!(f, "Schema error: {}", err),
        }
    }
}

impl std::error::Error for FormError {}

// Errors raised while loading Config.toml
#[derive(Debug)]
pub enum ConfigError {
    // The file could not be opened or read
    Io(std::io::Error),
    // The file is not valid TOML or does not match the expected sections
    Parse(toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "Configuration I/O error: {}", err),
            ConfigError::Parse(err) => write!(f, "Configuration parse error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse(err)
    }
}
