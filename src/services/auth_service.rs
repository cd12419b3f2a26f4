/// 登录服务
///
/// 负责登录、OAuth2 回调、登出；凭证只通过 CredentialStore 写入
use std::sync::Arc;

use tracing::{info, warn};

use crate::clients::{decode_response, AuthorizedClient};
use crate::error::{AppError, AppResult, SessionError};
use crate::infrastructure::ApiRequest;
use crate::models::{AuthResponse, Credential, Identity, LoginRequest, Role};
use crate::session::CredentialStore;

const LOGIN_PATH: &str = "/auth/login";

/// 登录服务
#[derive(Clone)]
pub struct AuthService {
    client: Arc<AuthorizedClient>,
}

impl AuthService {
    pub fn new(client: Arc<AuthorizedClient>) -> Self {
        Self { client }
    }

    fn store(&self) -> &CredentialStore {
        self.client.store()
    }

    /// 邮箱密码登录
    ///
    /// 登录请求不带 token，也不会触发续期；401 就是账号或密码错误。
    pub async fn login(&self, email: &str, password: &str) -> AppResult<Identity> {
        let body = serde_json::to_value(LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        })
        .map_err(|e| AppError::json_parse_failed(LOGIN_PATH, e))?;
        let request = ApiRequest::post(LOGIN_PATH, body);
        let endpoint = request.endpoint();

        info!("正在登录: {}", email);
        let response = self.client.send_public(request).await?;
        let auth: AuthResponse = decode_response(&endpoint, response)?;
        let credential = auth
            .into_credential()
            .ok_or_else(|| AppError::Other("登录响应缺少 token 或角色无法识别".to_string()))?;

        let identity = credential.identity.clone();
        self.store().set(credential);
        info!("✓ 登录成功: {} ({})", identity.email, identity.role.name());
        Ok(identity)
    }

    /// 处理 OAuth2 登录回调地址
    ///
    /// 成功时地址中带有 `accessToken`、`refreshToken`、`email`、`role`；
    /// 失败时带有 `error`。
    pub fn complete_oauth_callback(&self, callback_url: &str) -> AppResult<Identity> {
        let url = reqwest::Url::parse(callback_url).map_err(|e| SessionError::OAuthCallback {
            reason: format!("回调地址无法解析: {}", e),
        })?;

        let param = |name: &str| {
            url.query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
                .filter(|value| !value.is_empty())
        };

        if let Some(code) = param("error") {
            warn!("✗ OAuth2 登录失败: {}", code);
            return Err(SessionError::OAuthCallback {
                reason: oauth_error_message(&code).to_string(),
            }
            .into());
        }

        let (Some(access_token), Some(refresh_token), Some(email), Some(role)) = (
            param("accessToken"),
            param("refreshToken"),
            param("email"),
            param("role"),
        ) else {
            return Err(SessionError::OAuthCallback {
                reason: "回调参数不完整".to_string(),
            }
            .into());
        };

        let role = Role::from_str(&role).ok_or_else(|| SessionError::OAuthCallback {
            reason: format!("未知角色: {}", role),
        })?;

        let identity = Identity { email, role };
        self.store()
            .set(Credential::new(access_token, refresh_token, identity.clone()));
        info!("✓ OAuth2 登录成功: {}", identity.email);
        Ok(identity)
    }

    /// 登出：清除凭证并通知订阅者
    pub fn logout(&self) {
        if self.store().clear() {
            info!("已登出");
        }
    }

    pub fn current_user(&self) -> Option<Identity> {
        self.store().identity()
    }

    pub fn is_authenticated(&self) -> bool {
        self.store().is_authenticated()
    }

    /// 确认当前账号可以参加考试
    pub fn ensure_student(&self) -> AppResult<Identity> {
        let identity = self.current_user().ok_or_else(|| SessionError::NotAuthenticated {
            endpoint: "exam".to_string(),
        })?;
        if !identity.role.can_take_exams() {
            return Err(AppError::Other(format!(
                "{} 是{}账号，不能参加考试",
                identity.email,
                identity.role.name()
            )));
        }
        Ok(identity)
    }
}

fn oauth_error_message(code: &str) -> &'static str {
    match code {
        "email_not_found" => "该邮箱未在系统中注册，请先注册",
        "user_not_registered" => "该用户尚未完成注册，请先注册",
        _ => "OAuth2 登录过程中发生错误",
    }
}
