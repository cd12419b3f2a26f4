/// 带凭证的 API 客户端
///
/// 所有出站请求都经过这里：附加 access token，401 时续期并重试一次，
/// 403 时清除凭证并终止会话。其余状态码原样交给调用方。
use std::sync::Arc;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{ApiError, AppError, AppResult, SessionError};
use crate::infrastructure::{ApiRequest, ApiResponse, HttpTransport};
use crate::models::ErrorResponse;
use crate::session::{CredentialStore, SessionRefresher};

/// 单次逻辑调用所处的阶段；只有两个阶段，重试次数由此封顶
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// 第一次发送
    FirstAttempt,
    /// 续期后的唯一一次重试
    Retried,
}

/// 带凭证的 API 客户端
pub struct AuthorizedClient {
    transport: Arc<dyn HttpTransport>,
    store: CredentialStore,
    refresher: Arc<SessionRefresher>,
}

impl AuthorizedClient {
    pub fn new(transport: Arc<dyn HttpTransport>, store: CredentialStore) -> Self {
        let refresher = Arc::new(SessionRefresher::new(
            Arc::clone(&transport),
            store.clone(),
        ));
        Self {
            transport,
            store,
            refresher,
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn refresher(&self) -> &Arc<SessionRefresher> {
        &self.refresher
    }

    /// 发送需要登录的请求
    pub async fn send(&self, request: ApiRequest) -> AppResult<ApiResponse> {
        let endpoint = request.endpoint();
        let mut token = self.store.access_token();
        let mut stage = Stage::FirstAttempt;

        loop {
            let mut outgoing = request.clone();
            outgoing.bearer = token.clone();
            let response = self.transport.execute(outgoing).await?;

            match response.status {
                StatusCode::FORBIDDEN => {
                    warn!("✗ {} 返回 403，会话无效", endpoint);
                    self.store.clear();
                    return Err(AppError::session_terminated(format!(
                        "{} 返回 403",
                        endpoint
                    )));
                }
                StatusCode::UNAUTHORIZED => {
                    let Some(used) = token.as_deref() else {
                        return Err(SessionError::NotAuthenticated { endpoint }.into());
                    };
                    if stage == Stage::Retried {
                        warn!("✗ {} 续期后仍返回 401", endpoint);
                        return Err(SessionError::Unauthorized { endpoint }.into());
                    }

                    debug!("{} 返回 401，续期后重试", endpoint);
                    let credential = self.refresher.refresh_stale(Some(used)).await?;
                    token = Some(credential.access_token);
                    stage = Stage::Retried;
                }
                _ => return Ok(response),
            }
        }
    }

    /// 发送不需要登录的请求（登录本身），不附加 token，也不续期
    pub async fn send_public(&self, request: ApiRequest) -> AppResult<ApiResponse> {
        let mut request = request;
        request.bearer = None;
        self.transport.execute(request).await
    }

    /// 发送请求并把成功响应解析为 `T`
    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> AppResult<T> {
        let endpoint = request.endpoint();
        let response = self.send(request).await?;
        decode_response(&endpoint, response)
    }
}

/// 解析响应：2xx 解析正文（空正文按 `null` 处理），其他状态转换为 `BadResponse`
pub fn decode_response<T: DeserializeOwned>(endpoint: &str, response: ApiResponse) -> AppResult<T> {
    if !response.is_success() {
        return Err(error_from_response(endpoint, &response));
    }

    let body = if response.body.trim().is_empty() {
        "null"
    } else {
        response.body.as_str()
    };
    serde_json::from_str(body).map_err(|e| AppError::json_parse_failed(endpoint, e))
}

/// 把失败响应整理成一条错误信息
pub fn error_from_response(endpoint: &str, response: &ApiResponse) -> AppError {
    let status = response.status.as_u16();
    let parsed = serde_json::from_str::<ErrorResponse>(&response.body).ok();

    let message = parsed
        .as_ref()
        .and_then(ErrorResponse::user_message)
        .or_else(|| {
            let raw = response.body.trim();
            (!raw.is_empty() && parsed.is_none()).then(|| raw.to_string())
        })
        .unwrap_or_else(|| format!("HTTP {}", status));

    AppError::Api(ApiError::BadResponse {
        endpoint: endpoint.to_string(),
        status,
        code: parsed.and_then(|p| p.code),
        message,
    })
}
