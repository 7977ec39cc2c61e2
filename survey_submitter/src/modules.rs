pub mod error;
pub mod form_model;
pub mod hidden_frame;
pub mod settle;
pub mod submission_coordinator;
pub mod survey_controller;
pub mod transport;
