use crate::modules::{
    error::{FieldError, FormError},
    submission_coordinator::payload::{FieldValue, SubmissionPayload},
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    Text,
    Integer,
    // Multi-select, e.g. checkboxes
    List,
}

// Extra check applied once a value is present
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constraint {
    None,
    MinChars(u64),
    Email,
    // Satisfaction rating on a 1..=5 scale
    Rating,
}

// One survey question
#[derive(Debug, Clone)]
pub struct FieldSpec {
    // Name of the input in the form
    pub name: &'static str,
    // Key the endpoint expects, matched by name and case-sensitive
    pub key: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    // Human name used in "is required" messages
    pub label: &'static str,
    pub constraint: Constraint,
    // Shown when the constraint fails
    pub message: &'static str,
}

impl FieldSpec {
    fn schema(&self) -> Value {
        let mut schema = match self.kind {
            FieldKind::Text => json!({ "type": "string" }),
            FieldKind::Integer => json!({ "type": "integer" }),
            FieldKind::List => json!({ "type": "array", "items": { "type": "string" } }),
        };
        match self.constraint {
            Constraint::None => {}
            Constraint::MinChars(min) => schema["minLength"] = json!(min),
            Constraint::Email => schema["pattern"] = json!(EMAIL_PATTERN),
            Constraint::Rating => {
                schema["minimum"] = json!(1);
                schema["maximum"] = json!(5);
            }
        }
        schema
    }
}

// A raw answer as it comes out of the form
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    One(String),
    Many(Vec<String>),
}

// Raw answers keyed by form field name, not yet validated
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawForm(HashMap<String, RawValue>);

impl RawForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: &str) -> &mut Self {
        self.0.insert(name.to_string(), RawValue::One(value.to_string()));
        self
    }

    pub fn set_many(&mut self, name: &str, values: &[&str]) -> &mut Self {
        self.0.insert(
            name.to_string(),
            RawValue::Many(values.iter().map(|v| v.to_string()).collect()),
        );
        self
    }

    // First value, trimmed. Missing fields read as empty
    fn text(&self, name: &str) -> String {
        match self.0.get(name) {
            Some(RawValue::One(value)) => value.trim().to_string(),
            Some(RawValue::Many(values)) => values.first().map(|v| v.trim().to_string()).unwrap_or_default(),
            None => String::new(),
        }
    }

    fn list(&self, name: &str) -> Vec<String> {
        let values: Vec<&String> = match self.0.get(name) {
            Some(RawValue::One(value)) => vec![value],
            Some(RawValue::Many(values)) => values.iter().collect(),
            None => Vec::new(),
        };
        values
            .into_iter()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect()
    }
}

// Immutable description of the survey: its questions, their pages and the
// compiled schema the answers are checked against
pub struct FormContext {
    fields: Vec<FieldSpec>,
    pages: Vec<Vec<&'static str>>,
    validator: jsonschema::Validator,
}

impl FormContext {
    pub fn new(fields: Vec<FieldSpec>, pages: Vec<Vec<&'static str>>) -> Result<Self, FormError> {
        let properties: Map<String, Value> = fields
            .iter()
            .map(|field| (field.name.to_string(), field.schema()))
            .collect();
        let schema = json!({ "type": "object", "properties": properties });

        let validator = jsonschema::validator_for(&schema)
            .map_err(|e| FormError::SchemaError(e.to_string()))?;

        for name in pages.iter().flatten() {
            if !fields.iter().any(|f| f.name == *name) {
                return Err(FormError::SchemaError(format!("page refers to unknown field {}", name)));
            }
        }

        Ok(Self { fields, pages, validator })
    }

    // The satisfaction survey, split over three pages
    pub fn survey() -> Result<Self, FormError> {
        let fields = vec![
            field("name", "Name", FieldKind::Text, true, "Name", Constraint::MinChars(2), "Name must be at least 2 characters"),
            field("email", "Email", FieldKind::Text, true, "Email", Constraint::Email, "Please enter a valid email address"),
            field("gender", "Gender", FieldKind::Text, false, "Gender", Constraint::None, ""),
            field("age", "Age", FieldKind::Integer, false, "Age", Constraint::None, "Age must be a whole number"),
            field("transportation", "transportation", FieldKind::Text, false, "Transportation", Constraint::None, ""),
            field("interest", "Interest", FieldKind::List, false, "Interests", Constraint::None, ""),
            field("feedback", "Feedback", FieldKind::Text, false, "Feedback", Constraint::None, ""),
            field("food", "food", FieldKind::Integer, true, "Food satisfaction", Constraint::Rating, "Please choose a food satisfaction rating"),
            field("drink", "drink", FieldKind::Integer, true, "Drinking water satisfaction", Constraint::Rating, "Please choose a drinking water satisfaction rating"),
            field("stay", "stay", FieldKind::Integer, true, "Accommodation satisfaction", Constraint::Rating, "Please choose an accommodation satisfaction rating"),
            field("travel", "travel", FieldKind::Integer, true, "Travel frequency satisfaction", Constraint::Rating, "Please choose a travel frequency satisfaction rating"),
        ];
        let pages = vec![
            vec!["name", "email", "gender", "age"],
            vec!["transportation", "interest", "food", "drink"],
            vec!["stay", "travel", "feedback"],
        ];
        Self::new(fields, pages)
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page_fields(&self, page: usize) -> &[&'static str] {
        self.pages.get(page).map(Vec::as_slice).unwrap_or(&[])
    }

    // Validate every field
    pub fn validate(&self, raw: &RawForm) -> Result<(), FormError> {
        self.validate_fields(raw, |_| true)
    }

    // Validate only the fields shown on one page
    pub fn validate_page(&self, raw: &RawForm, page: usize) -> Result<(), FormError> {
        let names = self.page_fields(page);
        self.validate_fields(raw, |field| names.contains(&field.name))
    }

    // Validate a single field, as when the user leaves it
    // Names without a field spec have no rules and always pass
    pub fn validate_field(&self, raw: &RawForm, name: &str) -> Result<(), FormError> {
        self.validate_fields(raw, |field| field.name == name)
    }

    fn validate_fields<P: Fn(&FieldSpec) -> bool>(&self, raw: &RawForm, in_scope: P) -> Result<(), FormError> {
        let mut errors = Vec::<FieldError>::new();
        let mut instance = Map::new();

        for spec in self.fields.iter().filter(|f| in_scope(*f)) {
            match spec.kind {
                FieldKind::List => {
                    let values = raw.list(spec.name);
                    if values.is_empty() {
                        if spec.required {
                            errors.push(required_error(spec));
                        }
                        continue;
                    }
                    instance.insert(spec.name.to_string(), json!(values));
                }
                FieldKind::Text | FieldKind::Integer => {
                    let text = raw.text(spec.name);
                    if text.is_empty() {
                        if spec.required {
                            errors.push(required_error(spec));
                        }
                        continue;
                    }
                    if spec.kind == FieldKind::Text {
                        instance.insert(spec.name.to_string(), json!(text));
                        continue;
                    }
                    match text.parse::<i64>() {
                        Ok(number) => {
                            instance.insert(spec.name.to_string(), json!(number));
                        }
                        Err(_) => errors.push(FieldError {
                            field: spec.name.to_string(),
                            message: format!("{} must be a whole number", spec.label),
                        }),
                    }
                }
            }
        }

        // Check the typed values against the schema
        let instance = Value::Object(instance);
        for error in self.validator.iter_errors(&instance) {
            let path = error.instance_path.to_string();
            let name = path.trim_start_matches('/').split('/').next().unwrap_or_default();
            let spec = match self.fields.iter().find(|f| f.name == name) {
                Some(spec) => spec,
                None => continue,
            };
            if errors.iter().any(|e| e.field == spec.name) {
                continue;
            }
            log::debug!("Field {} failed schema check: {}", spec.name, error);
            errors.push(FieldError {
                field: spec.name.to_string(),
                message: spec.message.to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(FormError::Invalid(errors))
        }
    }

    // Validate and build the ordered payload, one entry per field
    // Empty answers are sent as "" so the endpoint always sees every column
    pub fn collect(&self, raw: &RawForm) -> Result<SubmissionPayload, FormError> {
        self.validate(raw)?;

        let mut payload = SubmissionPayload::new();
        for spec in &self.fields {
            let value = match spec.kind {
                FieldKind::Text => FieldValue::Text(raw.text(spec.name)),
                FieldKind::Integer => match raw.text(spec.name).parse::<i64>() {
                    Ok(number) => FieldValue::Integer(number),
                    Err(_) => FieldValue::empty(),
                },
                FieldKind::List => {
                    let values = raw.list(spec.name);
                    if values.is_empty() {
                        FieldValue::empty()
                    } else {
                        FieldValue::List(values)
                    }
                }
            };
            payload.insert(spec.key, value);
        }
        Ok(payload)
    }
}

fn field(
    name: &'static str,
    key: &'static str,
    kind: FieldKind,
    required: bool,
    label: &'static str,
    constraint: Constraint,
    message: &'static str,
) -> FieldSpec {
    FieldSpec { name, key, kind, required, label, constraint, message }
}

fn required_error(spec: &FieldSpec) -> FieldError {
    FieldError {
        field: spec.name.to_string(),
        message: format!("{} is required", spec.label),
    }
}
