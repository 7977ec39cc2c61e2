pub mod config;
pub mod modules;

pub use modules::{
    form_model::{FormContext, RawForm},
    submission_coordinator::{
        outcome::{AmbiguityReason, SubmissionResult},
        payload::{FieldValue, SubmissionPayload},
        SubmissionCoordinator,
    },
    survey_controller::{SurveyController, UiState},
    transport::HttpTransport,
};
