use crate::modules::{
    error::{FieldError, FormError, SubmitError},
    form_model::{FormContext, RawForm},
    submission_coordinator::{outcome::SubmissionResult, SubmissionCoordinator},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MessageKind {
    Success,
    // Sent, but the endpoint never confirmed it
    Qualified,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusMessage {
    pub kind: MessageKind,
    pub text: String,
}

impl StatusMessage {
    fn new(kind: MessageKind, text: impl Into<String>) -> Self {
        Self { kind, text: text.into() }
    }

    pub fn from_result(result: &SubmissionResult) -> Self {
        match result {
            SubmissionResult::Acknowledged { message } => StatusMessage::new(
                MessageKind::Success,
                message.clone().unwrap_or_else(|| "Survey submitted, thank you for taking part!".to_string()),
            ),
            SubmissionResult::Ambiguous(reason) => StatusMessage::new(
                MessageKind::Qualified,
                format!("Survey sent, but receipt could not be confirmed ({})", reason),
            ),
            SubmissionResult::Failed(SubmitError::ConfigurationError(_)) => StatusMessage::new(
                MessageKind::Error,
                "The survey is not set up yet, please contact the administrator",
            ),
            SubmissionResult::Failed(err) => StatusMessage::new(
                MessageKind::Error,
                format!("Submission failed: {}", err),
            ),
        }
    }
}

// Everything the user currently sees that can change
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UiState {
    pub current_page: usize,
    // Submit affordance is disabled while this is set
    pub submitting: bool,
    pub field_errors: Vec<FieldError>,
    pub message: Option<StatusMessage>,
}

// Sets `submitting` for its lifetime
struct SubmittingScope<'a> {
    ui: &'a mut UiState,
}

impl<'a> SubmittingScope<'a> {
    fn enter(ui: &'a mut UiState) -> Self {
        ui.submitting = true;
        Self { ui }
    }
}

impl Drop for SubmittingScope<'_> {
    fn drop(&mut self) {
        self.ui.submitting = false;
    }
}

// Owns the survey definition, the UI state and the coordinator
pub struct SurveyController {
    context: FormContext,
    coordinator: SubmissionCoordinator,
    ui: UiState,
}

impl SurveyController {
    pub fn new(context: FormContext, coordinator: SubmissionCoordinator) -> Self {
        Self { context, coordinator, ui: UiState::default() }
    }

    pub fn ui(&self) -> &UiState {
        &self.ui
    }

    pub fn context(&self) -> &FormContext {
        &self.context
    }

    pub fn coordinator(&self) -> &SubmissionCoordinator {
        &self.coordinator
    }

    pub fn is_last_page(&self) -> bool {
        self.ui.current_page + 1 >= self.context.page_count()
    }

    // Move forward only if the current page validates
    pub fn next_page(&mut self, raw: &RawForm) -> Result<usize, FormError> {
        if let Err(e) = self.context.validate_page(raw, self.ui.current_page) {
            self.record_form_error(&e);
            return Err(e);
        }
        self.ui.field_errors.clear();
        if !self.is_last_page() {
            self.ui.current_page += 1;
        }
        Ok(self.ui.current_page)
    }

    // Re-check one field and refresh only that field's errors
    pub fn check_field(&mut self, raw: &RawForm, name: &str) -> Result<(), FormError> {
        self.ui.field_errors.retain(|e| e.field != name);
        let result = self.context.validate_field(raw, name);
        if let Err(FormError::Invalid(errors)) = &result {
            self.ui.field_errors.extend(errors.iter().cloned());
        }
        result
    }

    pub fn previous_page(&mut self) -> usize {
        self.ui.current_page = self.ui.current_page.saturating_sub(1);
        self.ui.field_errors.clear();
        self.ui.current_page
    }

    // Validate everything and hand the payload to the coordinator
    // Returns None when validation stopped the submit before any request
    pub async fn submit(&mut self, raw: &RawForm) -> Option<SubmissionResult> {
        self.ui.message = None;

        let payload = match self.context.collect(raw) {
            Ok(payload) => payload,
            Err(e) => {
                log::info!("Submit blocked by validation: {}", e);
                self.record_form_error(&e);
                self.ui.message = Some(StatusMessage::new(
                    MessageKind::Error,
                    "Please check the highlighted fields and try again",
                ));
                return None;
            }
        };
        self.ui.field_errors.clear();

        let result = {
            let _scope = SubmittingScope::enter(&mut self.ui);
            self.coordinator.submit(&payload).await
        };

        self.ui.message = Some(StatusMessage::from_result(&result));
        if result.is_delivered() {
            self.ui.current_page = 0;
        }
        Some(result)
    }

    fn record_form_error(&mut self, error: &FormError) {
        self.ui.field_errors = match error {
            FormError::Invalid(errors) => errors.clone(),
            FormError::SchemaError(_) => Vec::new(),
        };
    }
}
