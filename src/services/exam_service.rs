/// 考试接口服务
///
/// 封装考试相关的 REST 调用，全部经过 AuthorizedClient
use std::sync::Arc;

use reqwest::StatusCode;
use tracing::{debug, info};

use crate::clients::{decode_response, error_from_response, AuthorizedClient};
use crate::error::{AppError, AppResult, ApiError};
use crate::infrastructure::ApiRequest;
use crate::models::{
    ExamDetail, ExamQuestion, ExamSubmission, PageResponse, StartSubmissionRequest,
    StudentAnswerRequest,
};

/// 重复交卷时后端返回的错误码
pub const SUBMISSION_ALREADY_COMPLETED: &str = "EXAM-SUBMISSION-DOMAIN-005";

/// 交卷结果
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// 本次交卷成功
    Submitted(ExamSubmission),
    /// 之前已经交过（上一次的响应丢失了）
    AlreadyCompleted,
}

/// 考试接口服务
#[derive(Clone)]
pub struct ExamService {
    client: Arc<AuthorizedClient>,
}

impl ExamService {
    pub fn new(client: Arc<AuthorizedClient>) -> Self {
        Self { client }
    }

    /// 获取考试详情（含时长）
    pub async fn fetch_exam(&self, exam_id: i64) -> AppResult<ExamDetail> {
        self.client
            .send_json(ApiRequest::get(format!("/exams/{}", exam_id)))
            .await
    }

    /// 获取考试题目（一次取 100 题，按 ID 排序）
    pub async fn fetch_questions(&self, exam_id: i64) -> AppResult<Vec<ExamQuestion>> {
        let request = ApiRequest::get("/exam-questions")
            .with_query("examId", exam_id)
            .with_query("page", 0)
            .with_query("size", 100)
            .with_query("sort", "id,asc");
        let page: PageResponse<ExamQuestion> = self.client.send_json(request).await?;
        debug!("考试 {} 共 {} 道题", exam_id, page.content.len());
        Ok(page.content)
    }

    /// 开始考试，返回服务端分配的 submission
    pub async fn start_submission(&self, exam_id: i64) -> AppResult<ExamSubmission> {
        let body = to_body("POST /exam-submissions", &StartSubmissionRequest { exam_id })?;
        let submission: ExamSubmission = self
            .client
            .send_json(ApiRequest::post("/exam-submissions", body))
            .await?;
        info!("✓ 考试已开始: 提交 #{} (考试 {})", submission.id, exam_id);
        Ok(submission)
    }

    /// 上传一道题的答案
    pub async fn record_answer(
        &self,
        submission_id: i64,
        question_id: i64,
        given_answer: &str,
    ) -> AppResult<()> {
        let body = to_body(
            "POST /student-answers",
            &StudentAnswerRequest {
                submission_id,
                question_id,
                given_answer: given_answer.to_string(),
            },
        )?;
        let _: serde_json::Value = self
            .client
            .send_json(ApiRequest::post("/student-answers", body))
            .await?;
        Ok(())
    }

    /// 交卷
    ///
    /// 409 + `SUBMISSION_ALREADY_COMPLETED` 视为已完成。
    pub async fn submit(&self, submission_id: i64) -> AppResult<SubmitOutcome> {
        let request = ApiRequest::put(format!("/exam-submissions/{}/submit", submission_id));
        let endpoint = request.endpoint();
        let response = self.client.send(request).await?;

        if response.status == StatusCode::CONFLICT {
            let error = error_from_response(&endpoint, &response);
            if is_already_completed(&error) {
                info!("提交 #{} 之前已完成", submission_id);
                return Ok(SubmitOutcome::AlreadyCompleted);
            }
            return Err(error);
        }

        let submission = decode_response(&endpoint, response)?;
        Ok(SubmitOutcome::Submitted(submission))
    }
}

fn to_body<T: serde::Serialize>(endpoint: &str, value: &T) -> AppResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| AppError::json_parse_failed(endpoint, e))
}

fn is_already_completed(error: &AppError) -> bool {
    match error {
        AppError::Api(ApiError::BadResponse {
            status: 409,
            code,
            message,
            ..
        }) => {
            code.as_deref() == Some(SUBMISSION_ALREADY_COMPLETED)
                || message.to_lowercase().contains("already completed")
        }
        _ => false,
    }
}
