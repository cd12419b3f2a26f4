pub mod auth_service;
pub mod exam_service;

pub use auth_service::AuthService;
pub use exam_service::{ExamService, SubmitOutcome, SUBMISSION_ALREADY_COMPLETED};
