pub mod answer_relay;
pub mod attempt_ctx;
pub mod attempt_flow;
pub mod exam_timer;
pub mod submission_finalizer;

pub use answer_relay::AnswerRelay;
pub use attempt_ctx::AttemptCtx;
pub use attempt_flow::AttemptFlow;
pub use exam_timer::{format_remaining, ExamTimer, TimerState};
pub use submission_finalizer::{
    ExamEvent, FinalizeOutcome, FinalizeTrigger, RetryPolicy, SubmissionFinalizer,
};
