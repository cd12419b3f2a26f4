//! 答案同步
//!
//! `record` 先更新本地记录，再在后台上传。每条记录带本地递增的版本号，
//! 上传结果只写回发出时的那个版本：旧版本的上传即使晚到，也不会改动
//! 新答案的同步状态。上传失败不自动重试，由交卷前的 `flush_pending` 补发；
//! 仍在途的最新版本上传会被等待，而不是重复发送。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future::{join_all, BoxFuture, Shared};
use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{AppResult, ExamError};
use crate::models::{AnswerRecord, FlushReport, SyncState};
use crate::services::ExamService;
use crate::utils::{lock, logging::truncate_text};
use crate::workflow::AttemptCtx;

type SharedUpload = Shared<BoxFuture<'static, SyncState>>;

#[derive(Default)]
struct AnswerBook {
    records: HashMap<i64, AnswerRecord>,
    // 每道题最新一次在途上传 (版本号, 结果)
    in_flight: HashMap<i64, (u64, SharedUpload)>,
    next_version: u64,
    closed: bool,
}

/// 答案同步器
pub struct AnswerRelay {
    ctx: AttemptCtx,
    exam_service: ExamService,
    book: Mutex<AnswerBook>,
}

impl AnswerRelay {
    pub fn new(ctx: AttemptCtx, exam_service: ExamService) -> Self {
        Self {
            ctx,
            exam_service,
            book: Mutex::new(AnswerBook::default()),
        }
    }

    /// 记录一道题的答案并在后台上传
    ///
    /// # 返回
    /// 上传任务的 handle，结果是这一次上传的同步状态
    pub fn record(
        self: &Arc<Self>,
        question_id: i64,
        answer: impl Into<String>,
    ) -> AppResult<JoinHandle<SyncState>> {
        let answer = answer.into();
        if answer.trim().is_empty() {
            return Err(ExamError::EmptyAnswer { question_id }.into());
        }

        let relay = Arc::clone(self);
        let upload_answer = answer.clone();
        let (version, upload) = {
            let mut book = lock(&self.book);
            if book.closed {
                return Err(ExamError::AttemptClosed {
                    submission_id: self.ctx.submission_id,
                }
                .into());
            }
            book.next_version += 1;
            let version = book.next_version;
            book.records.insert(
                question_id,
                AnswerRecord {
                    question_id,
                    given_answer: answer.clone(),
                    version,
                    sync_state: SyncState::Pending,
                },
            );
            let upload: SharedUpload = async move {
                relay.upload(question_id, upload_answer, version).await
            }
            .boxed()
            .shared();
            book.in_flight.insert(question_id, (version, upload.clone()));
            (version, upload)
        };

        debug!(
            "{} 题目 {} 作答 v{}: {}",
            self.ctx,
            question_id,
            version,
            truncate_text(&answer, 30)
        );

        Ok(tokio::spawn(upload))
    }

    async fn upload(&self, question_id: i64, answer: String, version: u64) -> SyncState {
        let state = match self
            .exam_service
            .record_answer(self.ctx.submission_id, question_id, &answer)
            .await
        {
            Ok(()) => SyncState::Sent,
            Err(e) => {
                warn!("{} ⚠️ 题目 {} 上传失败: {}", self.ctx, question_id, e);
                SyncState::Failed
            }
        };
        self.settle(question_id, version, state);
        state
    }

    // 只有版本号仍是最新的记录才更新
    fn settle(&self, question_id: i64, version: u64, state: SyncState) {
        let mut book = lock(&self.book);
        if matches!(book.in_flight.get(&question_id), Some((v, _)) if *v == version) {
            book.in_flight.remove(&question_id);
        }
        match book.records.get_mut(&question_id) {
            Some(record) if record.version == version => record.sync_state = state,
            Some(record) => debug!(
                "题目 {} 已有更新的答案 v{}，忽略 v{} 的上传结果",
                question_id, record.version, version
            ),
            None => {}
        }
    }

    /// 补发所有未确认的答案（交卷前调用）
    ///
    /// 最新版本仍在上传中的先等它结束，失败了再补发。
    pub async fn flush_pending(&self) -> FlushReport {
        let pending: Vec<(i64, String, u64, Option<SharedUpload>)> = {
            let book = lock(&self.book);
            book.records
                .values()
                .filter(|r| r.sync_state != SyncState::Sent)
                .map(|r| {
                    let in_flight = book
                        .in_flight
                        .get(&r.question_id)
                        .filter(|(version, _)| *version == r.version)
                        .map(|(_, upload)| upload.clone());
                    (r.question_id, r.given_answer.clone(), r.version, in_flight)
                })
                .collect()
        };

        if pending.is_empty() {
            return FlushReport::default();
        }

        info!("{} 🔁 补发 {} 道未同步的答案", self.ctx, pending.len());
        let results = join_all(pending.into_iter().map(
            |(question_id, answer, version, in_flight)| async move {
                if let Some(upload) = in_flight {
                    if upload.await == SyncState::Sent {
                        return SyncState::Sent;
                    }
                }
                self.upload(question_id, answer, version).await
            },
        ))
        .await;
        let synced = results.iter().filter(|s| **s == SyncState::Sent).count();

        let mut unsynced: Vec<i64> = {
            let book = lock(&self.book);
            book.records
                .values()
                .filter(|r| r.sync_state != SyncState::Sent)
                .map(|r| r.question_id)
                .collect()
        };
        unsynced.sort_unstable();

        FlushReport { synced, unsynced }
    }

    /// 考试完成后关闭，不再接受答案
    pub fn close(&self) {
        lock(&self.book).closed = true;
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.book).closed
    }

    pub fn get(&self, question_id: i64) -> Option<AnswerRecord> {
        lock(&self.book).records.get(&question_id).cloned()
    }

    /// 所有答案，按题目 ID 排序
    pub fn answers(&self) -> Vec<AnswerRecord> {
        let mut answers: Vec<AnswerRecord> = lock(&self.book).records.values().cloned().collect();
        answers.sort_by_key(|r| r.question_id);
        answers
    }

    pub fn answered_count(&self) -> usize {
        lock(&self.book).records.len()
    }
}
