//! 考试上下文
//!
//! 封装"我正在处理哪场考试的哪次提交"这一信息

use std::fmt::Display;

use crate::models::ExamAttempt;

/// 考试上下文（只用于标识和日志）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptCtx {
    /// 服务端分配的提交 ID
    pub submission_id: i64,

    /// 考试 ID
    pub exam_id: i64,

    /// 考试名称（可能没有）
    pub exam_name: Option<String>,
}

impl AttemptCtx {
    pub fn new(submission_id: i64, exam_id: i64, exam_name: Option<String>) -> Self {
        Self {
            submission_id,
            exam_id,
            exam_name,
        }
    }
}

impl From<&ExamAttempt> for AttemptCtx {
    fn from(attempt: &ExamAttempt) -> Self {
        Self::new(
            attempt.submission_id,
            attempt.exam_id,
            attempt.exam_name.clone(),
        )
    }
}

impl Display for AttemptCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.exam_name {
            Some(name) => write!(
                f,
                "[考试 #{} {} 提交 #{}]",
                self.exam_id, name, self.submission_id
            ),
            None => write!(f, "[考试 #{} 提交 #{}]", self.exam_id, self.submission_id),
        }
    }
}
