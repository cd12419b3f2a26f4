use serde::{Deserialize, Serialize};
use std::fmt;

use super::role::Role;

/// 登录身份信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub email: String,
    pub role: Role,
}

/// 访问凭证：access token、refresh token 与身份信息
///
/// 两个 token 总是一起替换，不存在只更新其中一个的路径。
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    pub identity: Identity,
}

impl Credential {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        identity: Identity,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            identity,
        }
    }
}

// token 不进日志
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"***")
            .field("refresh_token", &"***")
            .field("identity", &self.identity)
            .finish()
    }
}

/// 磁盘上的凭证格式，沿用前端 localStorage 的四个键名
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedCredential {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_role: Option<String>,
}

impl PersistedCredential {
    /// 四个键齐全且角色可识别时才视为已登录
    pub fn into_credential(self) -> Option<Credential> {
        let access_token = self.access_token.filter(|t| !t.is_empty())?;
        let refresh_token = self.refresh_token.filter(|t| !t.is_empty())?;
        let email = self.user_email.filter(|e| !e.is_empty())?;
        let role = Role::from_str(self.user_role.as_deref()?)?;
        Some(Credential::new(
            access_token,
            refresh_token,
            Identity { email, role },
        ))
    }
}

impl From<&Credential> for PersistedCredential {
    fn from(credential: &Credential) -> Self {
        Self {
            access_token: Some(credential.access_token.clone()),
            refresh_token: Some(credential.refresh_token.clone()),
            user_email: Some(credential.identity.email.clone()),
            user_role: Some(credential.identity.role.code().to_string()),
        }
    }
}
