pub mod answer;
pub mod answer_sheet;
pub mod attempt;
pub mod credential;
pub mod dto;
pub mod loaders;
pub mod role;

pub use answer::{AnswerRecord, FlushReport, SyncState};
pub use answer_sheet::{AnswerSheet, SheetAnswer};
pub use attempt::{AttemptStatus, ExamAttempt, MAX_DURATION_SECONDS};
pub use credential::{Credential, Identity, PersistedCredential};
pub use dto::{
    AuthResponse, ErrorResponse, ExamDetail, ExamQuestion, ExamSubmission, LoginRequest,
    PageResponse, RefreshTokenRequest, StartSubmissionRequest, StudentAnswerRequest,
};
pub use loaders::{load_all_answer_sheets, load_answer_sheet};
pub use role::Role;
