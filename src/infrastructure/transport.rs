//! HTTP 传输 - 基础设施层
//!
//! 只暴露"发一个请求、拿回状态码和正文"的能力，不认识 token 也不处理重试

use std::fmt;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::error::{AppError, AppResult, ConfigError};

/// 一次出站请求
#[derive(Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// 相对于 base url 的路径，例如 `/exam-submissions`
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Bearer token，由 AuthorizedClient 填写
    pub bearer: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            bearer: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    /// 用于日志和错误信息的端点描述，例如 `PUT /exam-submissions/3/submit`
    pub fn endpoint(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

// bearer 不打印
impl fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("has_body", &self.body.is_some())
            .field("has_bearer", &self.bearer.is_some())
            .finish()
    }
}

/// 原始响应：状态码 + 正文文本
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json(status: StatusCode, body: &Value) -> Self {
        Self::new(status, body.to_string())
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// HTTP 传输能力
///
/// 没有拿到响应（连接失败、超时）时返回 `ApiError::RequestFailed`；
/// 任何状态码都算拿到了响应，由上层解释。
pub trait HttpTransport: Send + Sync {
    fn execute(&self, request: ApiRequest) -> BoxFuture<'_, AppResult<ApiResponse>>;
}

/// 基于 reqwest 的传输实现
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestTransport {
    /// 创建新的传输
    ///
    /// # 参数
    /// - `base_url`: 接口根路径，例如 `http://localhost:8080/api`
    /// - `timeout`: 单次请求超时
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if reqwest::Url::parse(&base_url).is_err() {
            return Err(ConfigError::InvalidValue {
                name: "API_BASE_URL".to_string(),
                reason: format!("'{}' 不是合法的 URL", base_url),
            }
            .into());
        }

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::api_request_failed("client builder", e))?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(&self, request: ApiRequest) -> AppResult<ApiResponse> {
        let endpoint = request.endpoint();
        let url = format!("{}{}", self.base_url, request.path);
        debug!("→ {}", endpoint);

        let mut builder = self
            .client
            .request(request.method, &url)
            .header(reqwest::header::ACCEPT, "application/json");
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AppError::api_request_failed(endpoint.clone(), e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::api_request_failed(endpoint.clone(), e))?;
        debug!("← {} {}", endpoint, status.as_u16());

        Ok(ApiResponse { status, body })
    }
}

impl HttpTransport for ReqwestTransport {
    fn execute(&self, request: ApiRequest) -> BoxFuture<'_, AppResult<ApiResponse>> {
        self.send(request).boxed()
    }
}
