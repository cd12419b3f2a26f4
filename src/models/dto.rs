//! REST 接口的请求 / 响应结构（字段名为 camelCase）

use serde::{Deserialize, Serialize};

use super::credential::{Credential, Identity};
use super::role::Role;

/// 登录请求
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// 刷新 token 请求
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

/// 登录 / 刷新接口的响应
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub email: String,
    pub role: String,
}

impl AuthResponse {
    /// 转换为凭证；token 为空或角色无法识别时返回 None
    pub fn into_credential(self) -> Option<Credential> {
        if self.access_token.is_empty() || self.refresh_token.is_empty() {
            return None;
        }
        let role = Role::from_str(&self.role)?;
        Some(Credential::new(
            self.access_token,
            self.refresh_token,
            Identity {
                email: self.email,
                role,
            },
        ))
    }
}

/// 后端统一错误体 `{code, message, errors}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub errors: Option<Vec<String>>,
}

impl ErrorResponse {
    /// 合并成一条可以直接展示给用户的消息
    pub fn user_message(&self) -> Option<String> {
        if let Some(errors) = self.errors.as_ref().filter(|e| !e.is_empty()) {
            return Some(errors.join(", "));
        }
        self.message.clone().filter(|m| !m.is_empty())
    }
}

/// 考试详情
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamDetail {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub course_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_minutes")]
    pub duration_in_minutes: u64,
}

impl ExamDetail {
    pub fn duration_seconds(&self) -> u64 {
        self.duration_in_minutes.saturating_mul(60)
    }
}

/// 考试题目
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamQuestion {
    pub id: i64,
    #[serde(default)]
    pub question_text: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub score: Option<f64>,
}

/// 分页响应，只关心 content
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T> {
    #[serde(default = "Vec::new")]
    pub content: Vec<T>,
    #[serde(default)]
    pub total_elements: Option<u64>,
}

/// 开始考试请求
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSubmissionRequest {
    pub exam_id: i64,
}

/// 提交记录（服务端的 ExamSubmission）
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamSubmission {
    pub id: i64,
    pub exam_id: i64,
    #[serde(default)]
    pub exam_name: Option<String>,
    #[serde(default)]
    pub student_id: Option<i64>,
    #[serde(default)]
    pub student_name: Option<String>,
    #[serde(default)]
    pub submitted_at: Option<String>,
    #[serde(default)]
    pub total_score: Option<f64>,
}

/// 单题作答上传
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAnswerRequest {
    pub submission_id: i64,
    pub question_id: i64,
    pub given_answer: String,
}

// 时长既可能是数字也可能是字符串
fn deserialize_minutes<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Visitor;
    use std::fmt;

    struct MinutesVisitor;

    impl<'de> Visitor<'de> for MinutesVisitor {
        type Value = u64;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a non-negative number of minutes")
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value)
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            u64::try_from(value).map_err(|_| E::custom("duration must not be negative"))
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            value.trim().parse().map_err(E::custom)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(0)
        }
    }

    deserializer.deserialize_any(MinutesVisitor)
}
