//! 交卷状态机
//!
//! `InProgress → Finalizing → Completed`，失败时 `Finalizing → InProgress`。
//!
//! 触发方只有计时器到期、用户确认交卷、恢复考试和自动重试。
//! 入口处的状态检查保证同一时刻只有一个交卷流程在进行，
//! 完成之后的任何触发都是空操作。

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::AppResult;
use crate::infrastructure::JsonFile;
use crate::models::{AttemptStatus, ExamAttempt, ExamSubmission};
use crate::services::{ExamService, SubmitOutcome};
use crate::utils::lock;
use crate::workflow::{AnswerRelay, AttemptCtx, ExamTimer};

const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// 交卷触发来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeTrigger {
    /// 计时器到期
    TimerExpired,
    /// 用户确认交卷
    UserConfirmed,
    /// 恢复考试时发现已过期或上次交卷未完成
    Resumed,
    /// 失败后的自动重试
    Retry,
}

impl fmt::Display for FinalizeTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FinalizeTrigger::TimerExpired => "时间到",
            FinalizeTrigger::UserConfirmed => "用户交卷",
            FinalizeTrigger::Resumed => "恢复考试",
            FinalizeTrigger::Retry => "自动重试",
        };
        f.write_str(label)
    }
}

/// 交卷结果
#[derive(Debug, Clone, PartialEq)]
pub enum FinalizeOutcome {
    /// 本次调用完成了交卷；之前已交过时没有 submission
    Completed(Option<ExamSubmission>),
    /// 状态不是 InProgress，什么都没做
    Skipped(AttemptStatus),
}

/// 考试事件（给界面用）
#[derive(Debug, Clone, PartialEq)]
pub enum ExamEvent {
    /// 交卷前仍有答案未能同步
    SyncWarning { unsynced: Vec<i64> },
    /// 交卷失败；`will_retry` 为 false 时需要用户手动重试
    FinalizeFailed {
        attempt: u32,
        message: String,
        will_retry: bool,
    },
    /// 交卷完成
    Completed { submission: Option<ExamSubmission> },
    /// 会话终止，需要重新登录
    SessionTerminated,
}

/// 自动重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 连续失败多少次后停止自动重试
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.finalize_max_attempts.max(1),
            base_delay: Duration::from_millis(config.finalize_retry_base_ms),
        }
    }

    /// 第 `failures` 次失败后的等待时间：第一次立即重试，之后指数退避
    pub fn delay_for(&self, failures: u32) -> Duration {
        if failures <= 1 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(failures - 2);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(MAX_RETRY_DELAY)
            .min(MAX_RETRY_DELAY)
    }
}

/// 交卷状态机
pub struct SubmissionFinalizer {
    ctx: AttemptCtx,
    attempt: Mutex<ExamAttempt>,
    deadline: Instant,
    timer: Arc<ExamTimer>,
    relay: Arc<AnswerRelay>,
    exam_service: ExamService,
    journal: Option<JsonFile>,
    policy: RetryPolicy,
    failures: AtomicU32,
    // 截止时间之后的连续失败次数，自动重试只看它
    overdue_failures: AtomicU32,
    status_tx: watch::Sender<AttemptStatus>,
    events: broadcast::Sender<ExamEvent>,
}

impl SubmissionFinalizer {
    pub fn new(
        attempt: ExamAttempt,
        deadline: Instant,
        timer: Arc<ExamTimer>,
        relay: Arc<AnswerRelay>,
        exam_service: ExamService,
        journal: Option<JsonFile>,
        policy: RetryPolicy,
    ) -> Self {
        let (status_tx, _) = watch::channel(attempt.status);
        let (events, _) = broadcast::channel(32);
        Self {
            ctx: AttemptCtx::from(&attempt),
            attempt: Mutex::new(attempt),
            deadline,
            timer,
            relay,
            exam_service,
            journal,
            policy,
            failures: AtomicU32::new(0),
            overdue_failures: AtomicU32::new(0),
            status_tx,
            events,
        }
    }

    pub fn status(&self) -> AttemptStatus {
        lock(&self.attempt).status
    }

    pub fn attempt(&self) -> ExamAttempt {
        lock(&self.attempt).clone()
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// 连续失败次数
    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn subscribe_status(&self) -> watch::Receiver<AttemptStatus> {
        self.status_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ExamEvent> {
        self.events.subscribe()
    }

    /// 按截止时间启动计时器，到期时触发交卷
    pub fn arm_timer(self: &Arc<Self>) -> AppResult<()> {
        let weak = Arc::downgrade(self);
        self.timer.start_at(self.deadline, move || {
            if let Some(finalizer) = weak.upgrade() {
                tokio::spawn(async move {
                    let _ = finalizer.finalize(FinalizeTrigger::TimerExpired).await;
                });
            }
        })
    }

    /// 写入考试记录（用于恢复）
    pub fn persist(&self) {
        let Some(journal) = &self.journal else {
            return;
        };
        let snapshot = self.attempt();
        let result = if snapshot.status == AttemptStatus::Completed {
            journal.remove()
        } else {
            journal.save(&snapshot)
        };
        if let Err(e) = result {
            warn!("{} ⚠️ 考试记录写入失败: {}", self.ctx, e);
        }
    }

    fn set_status(&self, status: AttemptStatus) {
        lock(&self.attempt).status = status;
        self.persist();
        self.status_tx.send_replace(status);
    }

    /// 交卷
    ///
    /// 状态不是 InProgress 时直接返回 `Skipped`。失败时回到 InProgress，
    /// 并根据截止时间决定重新计时还是安排自动重试，错误原样返回。
    pub async fn finalize(self: &Arc<Self>, trigger: FinalizeTrigger) -> AppResult<FinalizeOutcome> {
        {
            let mut attempt = lock(&self.attempt);
            if attempt.status != AttemptStatus::InProgress {
                debug!(
                    "{} 忽略交卷请求 ({})，当前状态 {:?}",
                    self.ctx, trigger, attempt.status
                );
                return Ok(FinalizeOutcome::Skipped(attempt.status));
            }
            attempt.status = AttemptStatus::Finalizing;
        }
        self.persist();
        self.status_tx.send_replace(AttemptStatus::Finalizing);

        info!("{} 📤 开始交卷 ({})", self.ctx, trigger);
        self.timer.cancel();

        let report = self.relay.flush_pending().await;
        if !report.is_clean() {
            warn!(
                "{} ⚠️ {} 道题的答案未能同步: {:?}",
                self.ctx,
                report.unsynced.len(),
                report.unsynced
            );
            let _ = self.events.send(ExamEvent::SyncWarning {
                unsynced: report.unsynced.clone(),
            });
        }

        match self.exam_service.submit(self.ctx.submission_id).await {
            Ok(outcome) => {
                let submission = match outcome {
                    SubmitOutcome::Submitted(submission) => Some(submission),
                    SubmitOutcome::AlreadyCompleted => None,
                };
                self.complete(submission.clone());
                Ok(FinalizeOutcome::Completed(submission))
            }
            Err(e) => {
                self.handle_failure(&e.to_string(), e.is_session_terminated(), e.is_transient());
                Err(e)
            }
        }
    }

    fn complete(&self, submission: Option<ExamSubmission>) {
        self.relay.close();
        self.failures.store(0, Ordering::SeqCst);
        self.overdue_failures.store(0, Ordering::SeqCst);
        self.set_status(AttemptStatus::Completed);

        match &submission {
            Some(s) => info!(
                "{} ✅ 交卷成功，得分: {}",
                self.ctx,
                s.total_score
                    .map(|score| score.to_string())
                    .unwrap_or_else(|| "待评分".to_string())
            ),
            None => info!("{} ✅ 交卷成功（之前已提交）", self.ctx),
        }
        let _ = self.events.send(ExamEvent::Completed { submission });
    }

    fn handle_failure(self: &Arc<Self>, message: &str, session_terminated: bool, transient: bool) {
        self.set_status(AttemptStatus::InProgress);
        let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;

        if session_terminated {
            error!("{} ❌ 交卷失败，会话已终止: {}", self.ctx, message);
            let _ = self.events.send(ExamEvent::SessionTerminated);
            self.emit_failed(failures, message, false);
            return;
        }

        if Instant::now() < self.deadline {
            // 还没到截止时间：恢复计时，到期时再交
            warn!("{} ⚠️ 交卷失败 (第 {} 次): {}", self.ctx, failures, message);
            let rearmed = match self.arm_timer() {
                Ok(()) => true,
                Err(e) => {
                    warn!("{} ⚠️ 无法恢复计时: {}", self.ctx, e);
                    false
                }
            };
            self.emit_failed(failures, message, rearmed);
            return;
        }

        // 截止前的失败不计入；到期后第一次失败立即重试
        let overdue = self.overdue_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if transient && overdue < self.policy.max_attempts {
            let delay = self.policy.delay_for(overdue);
            warn!(
                "{} ⚠️ 交卷失败 (第 {} 次)，{:?} 后重试: {}",
                self.ctx, failures, delay, message
            );
            self.emit_failed(failures, message, true);
            self.schedule_retry(delay);
        } else {
            error!(
                "{} ❌ 交卷失败 (第 {} 次，到期后第 {} 次)，停止自动重试: {}",
                self.ctx, failures, overdue, message
            );
            self.emit_failed(failures, message, false);
        }
    }

    fn emit_failed(&self, attempt: u32, message: &str, will_retry: bool) {
        let _ = self.events.send(ExamEvent::FinalizeFailed {
            attempt,
            message: message.to_string(),
            will_retry,
        });
    }

    fn schedule_retry(self: &Arc<Self>, delay: Duration) {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Some(finalizer) = weak.upgrade() {
                let _ = finalizer.finalize(FinalizeTrigger::Retry).await;
            }
        });
    }
}
