//! 测试用的进程内假后端
//!
//! 实现 `HttpTransport`，按接口记录调用次数，可以让指定调用变慢、失败或被拒绝。

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use exam_session::error::AppResult;
use exam_session::models::{Credential, Identity, Role};
use exam_session::services::SUBMISSION_ALREADY_COMPLETED;
use exam_session::{ApiRequest, ApiResponse, AuthorizedClient, CredentialStore, HttpTransport};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::StatusCode;
use serde_json::{json, Value};

pub const STUDENT_EMAIL: &str = "ogrenci@okul.com";
pub const STUDENT_PASSWORD: &str = "sifre123";
pub const EXAM_ID: i64 = 1;

/// 一次被记录的调用
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: String,
    pub path: String,
    pub bearer: Option<String>,
    pub body: Option<Value>,
}

#[derive(Default)]
struct BackendState {
    token_seq: u32,
    valid_access: Option<String>,
    valid_refresh: Option<String>,
    refresh_delay: Duration,
    refresh_status: Option<u16>,
    exam_duration_minutes: u64,
    next_submission_id: i64,
    answer_delays: HashMap<String, Duration>,
    failing_answers: HashSet<String>,
    stored_answers: HashMap<(i64, i64), String>,
    submit_delay: Duration,
    submit_failures: u32,
    forbid_submit: bool,
    submitted: HashSet<i64>,
    calls: Vec<RecordedCall>,
}

/// 假后端
pub struct FakeBackend {
    state: Mutex<BackendState>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(BackendState {
                exam_duration_minutes: 30,
                next_submission_id: 100,
                ..Default::default()
            }),
        })
    }

    fn with<R>(&self, f: impl FnOnce(&mut BackendState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    // ---------- 配置 ----------

    /// 签发一对新 token（相当于登录成功）
    pub fn issue_credential(&self) -> Credential {
        let (access, refresh) = self.with(rotate_tokens);
        Credential::new(
            access,
            refresh,
            Identity {
                email: STUDENT_EMAIL.to_string(),
                role: Role::Student,
            },
        )
    }

    /// 让当前 access token 过期
    pub fn expire_access_token(&self) {
        self.with(|s| s.valid_access = None);
    }

    pub fn current_access_token(&self) -> Option<String> {
        self.with(|s| s.valid_access.clone())
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        self.with(|s| s.refresh_delay = delay);
    }

    /// refresh 接口固定返回该状态码
    pub fn set_refresh_status(&self, status: u16) {
        self.with(|s| s.refresh_status = Some(status));
    }

    pub fn set_exam_duration_minutes(&self, minutes: u64) {
        self.with(|s| s.exam_duration_minutes = minutes);
    }

    /// 上传该答案时延迟响应
    pub fn set_answer_delay(&self, answer: &str, delay: Duration) {
        self.with(|s| s.answer_delays.insert(answer.to_string(), delay));
    }

    /// 上传该答案时返回 500
    pub fn fail_answer(&self, answer: &str) {
        self.with(|s| s.failing_answers.insert(answer.to_string()));
    }

    pub fn heal_answer(&self, answer: &str) {
        self.with(|s| s.failing_answers.remove(answer));
    }

    pub fn set_submit_delay(&self, delay: Duration) {
        self.with(|s| s.submit_delay = delay);
    }

    /// 接下来 `count` 次交卷返回 503
    pub fn fail_next_submits(&self, count: u32) {
        self.with(|s| s.submit_failures = count);
    }

    /// 交卷返回 403
    pub fn forbid_submit(&self) {
        self.with(|s| s.forbid_submit = true);
    }

    /// 标记为已交卷（模拟上一次交卷的响应丢失）
    pub fn mark_submitted(&self, submission_id: i64) {
        self.with(|s| s.submitted.insert(submission_id));
    }

    // ---------- 观察 ----------

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.with(|s| s.calls.clone())
    }

    /// 按方法和路径统计调用次数
    pub fn count(&self, method: &str, path: &str) -> usize {
        self.with(|s| {
            s.calls
                .iter()
                .filter(|c| c.method == method && c.path == path)
                .count()
        })
    }

    pub fn refresh_calls(&self) -> usize {
        self.count("POST", "/auth/refresh-token")
    }

    pub fn submit_calls(&self, submission_id: i64) -> usize {
        self.count("PUT", &format!("/exam-submissions/{}/submit", submission_id))
    }

    pub fn stored_answer(&self, submission_id: i64, question_id: i64) -> Option<String> {
        self.with(|s| s.stored_answers.get(&(submission_id, question_id)).cloned())
    }

    pub fn is_submitted(&self, submission_id: i64) -> bool {
        self.with(|s| s.submitted.contains(&submission_id))
    }

    // ---------- 路由 ----------

    async fn handle(&self, request: ApiRequest) -> AppResult<ApiResponse> {
        let method = request.method.as_str().to_string();
        self.with(|s| {
            s.calls.push(RecordedCall {
                method: method.clone(),
                path: request.path.clone(),
                bearer: request.bearer.clone(),
                body: request.body.clone(),
            })
        });

        match (method.as_str(), request.path.as_str()) {
            ("POST", "/auth/login") => return Ok(self.login(&request)),
            ("POST", "/auth/refresh-token") => return Ok(self.refresh(&request).await),
            _ => {}
        }

        let authorized = self.with(|s| {
            s.valid_access.is_some() && s.valid_access == request.bearer
        });
        if !authorized {
            return Ok(error(StatusCode::UNAUTHORIZED, "AUTH-001", "Token expired"));
        }

        let path = request.path.clone();
        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        let response = match (method.as_str(), segments.as_slice()) {
            ("GET", ["ping"]) => ok(json!({ "ok": true })),
            ("GET", ["always-401"]) => error(StatusCode::UNAUTHORIZED, "AUTH-001", "Token expired"),
            ("GET", ["admin", ..]) => error(StatusCode::FORBIDDEN, "AUTH-003", "Access denied"),
            ("GET", ["exams", id]) => self.exam(id),
            ("GET", ["exam-questions"]) => ok(json!({
                "content": [
                    { "id": 1, "questionText": "2 + 2 = ?", "options": ["3", "4"], "score": 5.0 },
                    { "id": 2, "questionText": "Başkent?", "options": ["İstanbul", "Ankara"], "score": 5.0 },
                    { "id": 5, "questionText": "Renk?", "options": ["A", "B"], "score": 5.0 }
                ],
                "totalElements": 3
            })),
            ("POST", ["exam-submissions"]) => self.start_submission(&request),
            ("POST", ["student-answers"]) => self.student_answer(&request).await,
            ("PUT", ["exam-submissions", id, "submit"]) => self.submit(id).await,
            _ => error(StatusCode::NOT_FOUND, "NOT-FOUND", "No route"),
        };
        Ok(response)
    }

    fn login(&self, request: &ApiRequest) -> ApiResponse {
        let body = request.body.clone().unwrap_or(Value::Null);
        if body["email"] != STUDENT_EMAIL || body["password"] != STUDENT_PASSWORD {
            return error(StatusCode::UNAUTHORIZED, "AUTH-002", "Bad credentials");
        }
        let (access, refresh) = self.with(rotate_tokens);
        auth_response(&access, &refresh)
    }

    async fn refresh(&self, request: &ApiRequest) -> ApiResponse {
        let (delay, forced) = self.with(|s| (s.refresh_delay, s.refresh_status));
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(status) = forced {
            let status = StatusCode::from_u16(status).unwrap();
            return error(status, "AUTH-004", "Refresh failed");
        }

        let presented = request
            .body
            .as_ref()
            .and_then(|b| b["refreshToken"].as_str())
            .map(str::to_string);
        let valid = self.with(|s| s.valid_refresh.is_some() && s.valid_refresh == presented);
        if !valid {
            return error(StatusCode::UNAUTHORIZED, "AUTH-005", "Invalid refresh token");
        }
        let (access, refresh) = self.with(rotate_tokens);
        auth_response(&access, &refresh)
    }

    fn exam(&self, id: &str) -> ApiResponse {
        let minutes = self.with(|s| s.exam_duration_minutes);
        let id: i64 = id.parse().unwrap_or(0);
        ok(json!({ "id": id, "name": "Deneme Sınavı", "durationInMinutes": minutes }))
    }

    fn start_submission(&self, request: &ApiRequest) -> ApiResponse {
        let exam_id = request
            .body
            .as_ref()
            .and_then(|b| b["examId"].as_i64())
            .unwrap_or(0);
        let id = self.with(|s| {
            s.next_submission_id += 1;
            s.next_submission_id
        });
        ok(json!({ "id": id, "examId": exam_id, "examName": "Deneme Sınavı", "studentId": 9 }))
    }

    async fn student_answer(&self, request: &ApiRequest) -> ApiResponse {
        let body = request.body.clone().unwrap_or(Value::Null);
        let answer = body["givenAnswer"].as_str().unwrap_or_default().to_string();
        let submission_id = body["submissionId"].as_i64().unwrap_or(0);
        let question_id = body["questionId"].as_i64().unwrap_or(0);

        let delay = self.with(|s| s.answer_delays.get(&answer).copied());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self.with(|s| s.failing_answers.contains(&answer));
        if failing {
            return error(StatusCode::INTERNAL_SERVER_ERROR, "SERVER", "Database unavailable");
        }
        self.with(|s| {
            s.stored_answers
                .insert((submission_id, question_id), answer.clone())
        });
        ok(json!({ "submissionId": submission_id, "questionId": question_id, "givenAnswer": answer }))
    }

    async fn submit(&self, id: &str) -> ApiResponse {
        let id: i64 = id.parse().unwrap_or(0);
        let delay = self.with(|s| s.submit_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.with(|s| {
            if s.forbid_submit {
                return error(StatusCode::FORBIDDEN, "AUTH-003", "Access denied");
            }
            if s.submit_failures > 0 {
                s.submit_failures -= 1;
                return error(StatusCode::SERVICE_UNAVAILABLE, "SERVER", "Try again later");
            }
            if !s.submitted.insert(id) {
                return error(
                    StatusCode::CONFLICT,
                    SUBMISSION_ALREADY_COMPLETED,
                    "Submission already completed",
                );
            }
            ok(json!({
                "id": id,
                "examId": EXAM_ID,
                "examName": "Deneme Sınavı",
                "submittedAt": "2026-10-19T10:00:00",
                "totalScore": 10.0
            }))
        })
    }
}

impl HttpTransport for FakeBackend {
    fn execute(&self, request: ApiRequest) -> BoxFuture<'_, AppResult<ApiResponse>> {
        self.handle(request).boxed()
    }
}

fn rotate_tokens(state: &mut BackendState) -> (String, String) {
    state.token_seq += 1;
    let access = format!("access-{}", state.token_seq);
    let refresh = format!("refresh-{}", state.token_seq);
    state.valid_access = Some(access.clone());
    state.valid_refresh = Some(refresh.clone());
    (access, refresh)
}

fn ok(body: Value) -> ApiResponse {
    ApiResponse::json(StatusCode::OK, &body)
}

fn error(status: StatusCode, code: &str, message: &str) -> ApiResponse {
    ApiResponse::json(status, &json!({ "code": code, "message": message }))
}

fn auth_response(access: &str, refresh: &str) -> ApiResponse {
    ok(json!({
        "accessToken": access,
        "refreshToken": refresh,
        "email": STUDENT_EMAIL,
        "role": "ROLE_STUDENT"
    }))
}

/// 已登录的客户端
pub fn logged_in_client(backend: &Arc<FakeBackend>) -> (Arc<AuthorizedClient>, CredentialStore) {
    let store = CredentialStore::in_memory();
    store.set(backend.issue_credential());
    let transport: Arc<dyn HttpTransport> = backend.clone();
    let client = Arc::new(AuthorizedClient::new(transport, store.clone()));
    (client, store)
}
