//! 考试会话管理器
//!
//! 保证同一客户端同时只有一场进行中的考试（只有它持有运行中的计时器），
//! 并在重启后根据考试记录恢复。

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{AppResult, ExamError};
use crate::infrastructure::JsonFile;
use crate::models::{AttemptStatus, ExamAttempt, MAX_DURATION_SECONDS};
use crate::services::ExamService;
use crate::workflow::{AttemptFlow, FinalizeTrigger, RetryPolicy};

/// 考试会话管理器
pub struct ExamSessionManager {
    exam_service: ExamService,
    journal: Option<JsonFile>,
    policy: RetryPolicy,
    active: Mutex<Option<Arc<AttemptFlow>>>,
}

impl ExamSessionManager {
    pub fn new(exam_service: ExamService, journal: Option<JsonFile>, policy: RetryPolicy) -> Self {
        Self {
            exam_service,
            journal,
            policy,
            active: Mutex::new(None),
        }
    }

    /// 开始一场新考试
    ///
    /// 已有未完成的考试时返回 `AttemptAlreadyActive`。
    pub async fn begin(&self, exam_id: i64) -> AppResult<Arc<AttemptFlow>> {
        let mut active = self.active.lock().await;
        if let Some(flow) = active.as_ref() {
            if flow.status() != AttemptStatus::Completed {
                return Err(ExamError::AttemptAlreadyActive {
                    submission_id: flow.ctx().submission_id,
                }
                .into());
            }
        }

        let exam = self.exam_service.fetch_exam(exam_id).await?;
        let duration_seconds = exam.duration_seconds();
        if !(1..=MAX_DURATION_SECONDS).contains(&duration_seconds) {
            return Err(ExamError::InvalidDuration {
                exam_id,
                seconds: duration_seconds,
            }
            .into());
        }

        let submission = self.exam_service.start_submission(exam_id).await?;
        let attempt = ExamAttempt::new(
            submission.id,
            exam_id,
            exam.name.or(submission.exam_name),
            duration_seconds,
            Utc::now(),
        );

        let flow = AttemptFlow::new(
            attempt,
            self.exam_service.clone(),
            self.journal.clone(),
            self.policy,
        );
        flow.launch()?;
        *active = Some(Arc::clone(&flow));
        Ok(flow)
    }

    /// 根据考试记录恢复上次未完成的考试
    ///
    /// 没有记录时返回 None。已过截止时间，或上次停在交卷中，会立即交卷。
    pub async fn resume(&self) -> AppResult<Option<Arc<AttemptFlow>>> {
        let Some(journal) = &self.journal else {
            return Ok(None);
        };
        let Some(attempt) = journal.load_or_discard::<ExamAttempt>() else {
            return Ok(None);
        };

        let mut active = self.active.lock().await;
        if let Some(flow) = active.as_ref() {
            if flow.status() != AttemptStatus::Completed {
                return Ok(Some(Arc::clone(flow)));
            }
        }

        match attempt.status {
            AttemptStatus::Completed => {
                journal.remove()?;
                return Ok(None);
            }
            AttemptStatus::Finalizing => {
                warn!("上次交卷未完成 (提交 #{})，重新交卷", attempt.submission_id)
            }
            AttemptStatus::InProgress => {
                info!("🔄 恢复进行中的考试 (提交 #{})", attempt.submission_id)
            }
        }
        if !attempt.has_valid_duration() {
            warn!(
                "⚠️ 考试记录中的时长异常 ({} 秒)，按上限计算截止时间",
                attempt.duration_seconds
            );
        }

        let was_finalizing = attempt.status == AttemptStatus::Finalizing;
        let flow = AttemptFlow::new(
            attempt,
            self.exam_service.clone(),
            Some(journal.clone()),
            self.policy,
        );
        if was_finalizing {
            flow.finalize_in_background(FinalizeTrigger::Resumed);
        } else {
            flow.launch()?;
        }

        *active = Some(Arc::clone(&flow));
        Ok(Some(flow))
    }

    /// 当前考试（包括已完成但尚未被替换的）
    pub async fn active(&self) -> Option<Arc<AttemptFlow>> {
        self.active.lock().await.clone()
    }

    /// 当前进行中的考试；没有时返回 `NoActiveAttempt`
    pub async fn require_active(&self) -> AppResult<Arc<AttemptFlow>> {
        match self.active().await {
            Some(flow) if flow.status() != AttemptStatus::Completed => Ok(flow),
            _ => Err(ExamError::NoActiveAttempt.into()),
        }
    }
}
