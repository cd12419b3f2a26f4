//! 单场考试流程 - 流程层
//!
//! 把计时器、答案同步和交卷状态机组装在一起，对外只暴露
//! 作答、交卷和订阅状态这几个动作

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::info;

use crate::error::AppResult;
use crate::infrastructure::JsonFile;
use crate::models::{AnswerRecord, AttemptStatus, ExamAttempt, SyncState};
use crate::services::ExamService;
use crate::workflow::{
    format_remaining, AnswerRelay, AttemptCtx, ExamEvent, ExamTimer, FinalizeOutcome,
    FinalizeTrigger, RetryPolicy, SubmissionFinalizer,
};

/// 单场考试流程
pub struct AttemptFlow {
    ctx: AttemptCtx,
    timer: Arc<ExamTimer>,
    relay: Arc<AnswerRelay>,
    finalizer: Arc<SubmissionFinalizer>,
}

impl AttemptFlow {
    /// 创建考试流程；截止时间由 `started_at + duration` 换算成本地时钟
    ///
    /// 传入的状态只能是 InProgress 或 Finalizing，后者会被视为上次交卷未完成，
    /// 回到 InProgress 等待重新交卷。
    pub fn new(
        mut attempt: ExamAttempt,
        exam_service: ExamService,
        journal: Option<JsonFile>,
        policy: RetryPolicy,
    ) -> Arc<Self> {
        attempt.status = AttemptStatus::InProgress;
        let ctx = AttemptCtx::from(&attempt);
        let deadline = Instant::now() + attempt.remaining_at(Utc::now());

        let timer = Arc::new(ExamTimer::new());
        let relay = Arc::new(AnswerRelay::new(ctx.clone(), exam_service.clone()));
        let finalizer = Arc::new(SubmissionFinalizer::new(
            attempt,
            deadline,
            Arc::clone(&timer),
            Arc::clone(&relay),
            exam_service,
            journal,
            policy,
        ));

        Arc::new(Self {
            ctx,
            timer,
            relay,
            finalizer,
        })
    }

    pub fn ctx(&self) -> &AttemptCtx {
        &self.ctx
    }

    /// 开始计时；已过截止时间则立即交卷
    pub fn launch(&self) -> AppResult<()> {
        self.finalizer.persist();
        let remaining = self.finalizer.deadline().saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            info!("{} ⏰ 考试时间已过，立即交卷", self.ctx);
            self.finalize_in_background(FinalizeTrigger::Resumed);
            return Ok(());
        }

        info!(
            "{} ⏱️ 开始计时，剩余 {}",
            self.ctx,
            format_remaining(remaining.as_secs())
        );
        self.finalizer.arm_timer()
    }

    /// 在后台交卷（恢复考试时使用）
    pub fn finalize_in_background(&self, trigger: FinalizeTrigger) -> JoinHandle<()> {
        let finalizer = Arc::clone(&self.finalizer);
        tokio::spawn(async move {
            let _ = finalizer.finalize(trigger).await;
        })
    }

    /// 作答
    pub fn record_answer(
        &self,
        question_id: i64,
        answer: impl Into<String>,
    ) -> AppResult<JoinHandle<SyncState>> {
        self.relay.record(question_id, answer)
    }

    /// 用户确认交卷
    pub async fn submit(&self) -> AppResult<FinalizeOutcome> {
        self.finalizer.finalize(FinalizeTrigger::UserConfirmed).await
    }

    pub fn status(&self) -> AttemptStatus {
        self.finalizer.status()
    }

    pub fn attempt(&self) -> ExamAttempt {
        self.finalizer.attempt()
    }

    /// 剩余时间；计时器未运行时为 None
    pub fn remaining(&self) -> Option<Duration> {
        self.timer.remaining()
    }

    pub fn answers(&self) -> Vec<AnswerRecord> {
        self.relay.answers()
    }

    pub fn answer(&self, question_id: i64) -> Option<AnswerRecord> {
        self.relay.get(question_id)
    }

    pub fn subscribe_status(&self) -> watch::Receiver<AttemptStatus> {
        self.finalizer.subscribe_status()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ExamEvent> {
        self.finalizer.subscribe_events()
    }

    /// 倒计时显示（剩余整秒数）
    pub fn subscribe_countdown(&self) -> watch::Receiver<u64> {
        self.timer.subscribe()
    }

    /// 等待考试完成
    pub async fn wait_completed(&self) {
        let mut status = self.subscribe_status();
        while *status.borrow_and_update() != AttemptStatus::Completed {
            if status.changed().await.is_err() {
                return;
            }
        }
    }
}
