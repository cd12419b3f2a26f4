use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 单场考试时长上限（7 天）
pub const MAX_DURATION_SECONDS: u64 = 7 * 24 * 3600;

/// 考试状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptStatus {
    /// 作答中
    InProgress,
    /// 交卷中
    Finalizing,
    /// 已完成
    Completed,
}

/// 一次考试（服务端的一条 submission）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamAttempt {
    pub submission_id: i64,
    pub exam_id: i64,
    #[serde(default)]
    pub exam_name: Option<String>,
    pub duration_seconds: u64,
    pub started_at: DateTime<Utc>,
    pub status: AttemptStatus,
}

impl ExamAttempt {
    pub fn new(
        submission_id: i64,
        exam_id: i64,
        exam_name: Option<String>,
        duration_seconds: u64,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            submission_id,
            exam_id,
            exam_name,
            duration_seconds,
            started_at,
            status: AttemptStatus::InProgress,
        }
    }

    /// 时长在 1 秒到 `MAX_DURATION_SECONDS` 之间
    pub fn has_valid_duration(&self) -> bool {
        (1..=MAX_DURATION_SECONDS).contains(&self.duration_seconds)
    }

    /// 绝对截止时间；时长超出上限时按上限计算
    pub fn deadline(&self) -> DateTime<Utc> {
        let seconds = self.duration_seconds.min(MAX_DURATION_SECONDS) as i64;
        chrono::Duration::try_seconds(seconds)
            .and_then(|duration| self.started_at.checked_add_signed(duration))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// 距离截止还剩多久；已过期返回 0
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        (self.deadline() - now).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline()
    }
}
