//! 会话续期
//!
//! 同一时刻最多只有一个 refresh 请求在途。在途期间的调用者拿到同一个
//! `Shared` 结果，不会重复发请求。续期在独立的 tokio 任务中进行，
//! 发起者被取消也不影响其他等待者。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use crate::error::{AppError, SessionError};
use crate::infrastructure::{ApiRequest, HttpTransport};
use crate::models::{AuthResponse, Credential, RefreshTokenRequest};
use crate::session::CredentialStore;
use crate::utils::lock;

const REFRESH_PATH: &str = "/auth/refresh-token";

/// 续期失败原因（可 clone，所有等待者共享同一个结果）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshFailure {
    /// refresh token 本身无效或过期，凭证已被清除
    Rejected,
    /// 网络或服务端暂时不可用，凭证保留
    Unavailable(String),
}

impl From<RefreshFailure> for AppError {
    fn from(failure: RefreshFailure) -> Self {
        match failure {
            RefreshFailure::Rejected => {
                AppError::session_terminated("refresh token 已失效，请重新登录")
            }
            RefreshFailure::Unavailable(reason) => {
                AppError::Session(SessionError::RefreshUnavailable { reason })
            }
        }
    }
}

pub type RefreshOutcome = Result<Credential, RefreshFailure>;

type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

struct InFlight {
    generation: u64,
    outcome: SharedRefresh,
}

/// 会话续期器
pub struct SessionRefresher {
    transport: Arc<dyn HttpTransport>,
    store: CredentialStore,
    in_flight: Arc<Mutex<Option<InFlight>>>,
    generation: AtomicU64,
}

impl SessionRefresher {
    pub fn new(transport: Arc<dyn HttpTransport>, store: CredentialStore) -> Self {
        Self {
            transport,
            store,
            in_flight: Arc::new(Mutex::new(None)),
            generation: AtomicU64::new(0),
        }
    }

    /// 用 refresh token 换一对新凭证
    pub async fn refresh(&self) -> RefreshOutcome {
        self.join_or_start(None)?.await
    }

    /// 某个请求用 `used_token` 收到了 401 时调用
    ///
    /// 如果存储里的 access token 已经不是 `used_token`（别的续期刚完成），
    /// 直接返回当前凭证，不再发起网络请求。
    pub async fn refresh_stale(&self, used_token: Option<&str>) -> RefreshOutcome {
        self.join_or_start(used_token)?.await
    }

    /// 已经发起的续期次数
    pub fn refresh_count(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }

    pub fn is_refreshing(&self) -> bool {
        lock(&self.in_flight).is_some()
    }

    // 同步完成"加入或发起"，锁不跨 await
    fn join_or_start(&self, used_token: Option<&str>) -> Result<SharedRefresh, RefreshFailure> {
        let mut slot = lock(&self.in_flight);
        if let Some(in_flight) = slot.as_ref() {
            debug!("续期已在进行中，等待同一结果 (#{})", in_flight.generation);
            return Ok(in_flight.outcome.clone());
        }

        if let Some(used) = used_token {
            match self.store.get() {
                Some(current) if current.access_token != used => {
                    debug!("凭证已被其他请求续期，直接使用新凭证");
                    return Ok(futures::future::ready(Ok(current)).boxed().shared());
                }
                None => return Err(RefreshFailure::Rejected),
                Some(_) => {}
            }
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let outcome = self.spawn_refresh(generation);
        *slot = Some(InFlight {
            generation,
            outcome: outcome.clone(),
        });
        Ok(outcome)
    }

    fn spawn_refresh(&self, generation: u64) -> SharedRefresh {
        let transport = Arc::clone(&self.transport);
        let store = self.store.clone();
        let slot = Arc::clone(&self.in_flight);

        let handle = tokio::spawn(async move {
            let outcome = exchange_refresh_token(transport.as_ref(), &store).await;
            let mut guard = lock(&slot);
            if guard.as_ref().map(|f| f.generation) == Some(generation) {
                *guard = None;
            }
            outcome
        });

        async move {
            handle.await.unwrap_or_else(|e| {
                Err(RefreshFailure::Unavailable(format!("续期任务异常退出: {}", e)))
            })
        }
        .boxed()
        .shared()
    }
}

/// 4xx 中除了 408 / 429 都说明 refresh token 本身不可用
fn is_rejection(status: StatusCode) -> bool {
    status.is_client_error()
        && status != StatusCode::REQUEST_TIMEOUT
        && status != StatusCode::TOO_MANY_REQUESTS
}

async fn exchange_refresh_token(
    transport: &dyn HttpTransport,
    store: &CredentialStore,
) -> RefreshOutcome {
    let Some(refresh_token) = store.refresh_token() else {
        warn!("⚠️ 没有 refresh token，无法续期");
        return Err(RefreshFailure::Rejected);
    };

    let body = serde_json::to_value(RefreshTokenRequest {
        refresh_token: refresh_token.clone(),
    })
    .map_err(|e| RefreshFailure::Unavailable(e.to_string()))?;

    info!("🔄 access token 已过期，正在续期...");
    let response = match transport.execute(ApiRequest::post(REFRESH_PATH, body)).await {
        Ok(response) => response,
        Err(e) => {
            warn!("⚠️ 续期请求失败，保留现有凭证: {}", e);
            return Err(RefreshFailure::Unavailable(e.to_string()));
        }
    };

    if is_rejection(response.status) {
        warn!(
            "✗ refresh token 被拒绝 (HTTP {})，会话终止",
            response.status.as_u16()
        );
        store.clear();
        return Err(RefreshFailure::Rejected);
    }

    if !response.is_success() {
        warn!("⚠️ 续期接口暂不可用 (HTTP {})", response.status.as_u16());
        return Err(RefreshFailure::Unavailable(format!(
            "HTTP {}",
            response.status.as_u16()
        )));
    }

    let credential = serde_json::from_str::<AuthResponse>(&response.body)
        .ok()
        .and_then(AuthResponse::into_credential)
        .ok_or_else(|| RefreshFailure::Unavailable("续期响应无法解析".to_string()))?;

    // 续期途中用户登出或换了账号：不覆盖
    match store.refresh_token() {
        None => {
            debug!("续期期间凭证已被清除，丢弃续期结果");
            Err(RefreshFailure::Rejected)
        }
        Some(current) if current != refresh_token => store.get().ok_or(RefreshFailure::Rejected),
        Some(_) => {
            store.set(credential.clone());
            info!("✓ 会话续期成功");
            Ok(credential)
        }
    }
}
