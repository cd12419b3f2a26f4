use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 会话 / 凭证相关错误
    #[error("会话错误: {0}")]
    Session(#[from] SessionError),
    /// API 调用错误
    #[error("API错误: {0}")]
    Api(#[from] ApiError),
    /// 考试流程错误
    #[error("考试错误: {0}")]
    Exam(#[from] ExamError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 其他错误
    #[error("错误: {0}")]
    Other(String),
}

/// 会话相关错误
#[derive(Debug, Error)]
pub enum SessionError {
    /// 本地没有凭证，但接口要求登录
    #[error("尚未登录，无法访问 {endpoint}")]
    NotAuthenticated { endpoint: String },
    /// 会话已被终止（refresh token 失效或服务端判定会话无效），需要重新登录
    #[error("会话已终止: {reason}")]
    SessionTerminated { reason: String },
    /// 刷新接口暂时不可用，本地凭证保留
    #[error("会话续期暂时不可用: {reason}")]
    RefreshUnavailable { reason: String },
    /// 续期并重试一次后仍被拒绝
    #[error("续期后仍无权访问 {endpoint}")]
    Unauthorized { endpoint: String },
    /// OAuth2 回调失败
    #[error("OAuth2 登录失败: {reason}")]
    OAuthCallback { reason: String },
}

/// API 调用错误
#[derive(Debug, Error)]
pub enum ApiError {
    /// 网络请求失败（没有拿到响应）
    #[error("API请求失败 ({endpoint}): {source}")]
    RequestFailed {
        endpoint: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// API 返回错误响应（校验 / 业务规则错误原样透传）
    #[error("API返回错误响应 ({endpoint}): status={status}, code={code:?}, message={message}")]
    BadResponse {
        endpoint: String,
        status: u16,
        code: Option<String>,
        message: String,
    },
    /// JSON 解析失败
    #[error("JSON解析失败 ({endpoint}): {source}")]
    JsonParseFailed {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

/// 考试流程错误
#[derive(Debug, Error)]
pub enum ExamError {
    /// 已经有一场进行中的考试
    #[error("已有进行中的考试 (提交 #{submission_id})，请先完成")]
    AttemptAlreadyActive { submission_id: i64 },
    /// 考试已完成，不再接受答案
    #[error("考试已结束 (提交 #{submission_id})，不再接受答案")]
    AttemptClosed { submission_id: i64 },
    /// 计时器已在运行
    #[error("计时器已在运行")]
    TimerRunning,
    /// 计时器已到期，同一场考试不能重新计时
    #[error("计时器已到期，不能重新启动")]
    TimerExpired,
    /// 空答案
    #[error("题目 {question_id} 的答案不能为空")]
    EmptyAnswer { question_id: i64 },
    /// 当前没有进行中的考试
    #[error("当前没有进行中的考试")]
    NoActiveAttempt,
    /// 考试时长为 0 或超出上限
    #[error("考试 {exam_id} 的时长不合法: {seconds} 秒")]
    InvalidDuration { exam_id: i64, seconds: u64 },
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 写入文件失败
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 删除文件失败
    #[error("删除文件失败 ({path}): {source}")]
    DeleteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// JSON 文件内容无法解析或序列化
    #[error("JSON文件处理失败 ({path}): {source}")]
    JsonFailed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    /// 目录不存在
    #[error("目录不存在: {path}")]
    DirectoryNotFound { path: String },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置值不合法
    #[error("配置项 {name} 不合法: {reason}")]
    InvalidValue { name: String, reason: String },
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建API请求失败错误
    pub fn api_request_failed(
        endpoint: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Api(ApiError::RequestFailed {
            endpoint: endpoint.into(),
            source: Box::new(source),
        })
    }

    /// 创建JSON解析失败错误
    pub fn json_parse_failed(endpoint: impl Into<String>, source: serde_json::Error) -> Self {
        AppError::Api(ApiError::JsonParseFailed {
            endpoint: endpoint.into(),
            source,
        })
    }

    /// 创建会话终止错误
    pub fn session_terminated(reason: impl Into<String>) -> Self {
        AppError::Session(SessionError::SessionTerminated {
            reason: reason.into(),
        })
    }

    /// 创建文件读取错误
    pub fn file_read_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source,
        })
    }

    /// 创建文件写入错误
    pub fn file_write_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::WriteFailed {
            path: path.into(),
            source,
        })
    }

    /// 是否为会话终止（需要重新登录）
    pub fn is_session_terminated(&self) -> bool {
        matches!(
            self,
            AppError::Session(SessionError::SessionTerminated { .. })
                | AppError::Session(SessionError::NotAuthenticated { .. })
        )
    }

    /// 是否为可重试的暂时性错误（网络失败、服务端 5xx、续期暂不可用）
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Api(ApiError::RequestFailed { .. }) => true,
            AppError::Api(ApiError::BadResponse { status, .. }) => {
                *status >= 500 || *status == 408 || *status == 429
            }
            AppError::Session(SessionError::RefreshUnavailable { .. }) => true,
            _ => false,
        }
    }

    /// 服务端返回的 HTTP 状态码（如果有）
    pub fn status(&self) -> Option<u16> {
        match self {
            AppError::Api(ApiError::BadResponse { status, .. }) => Some(*status),
            _ => None,
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn bad_response(status: u16) -> AppError {
        AppError::Api(ApiError::BadResponse {
            endpoint: "PUT /exam-submissions/1/submit".to_string(),
            status,
            code: None,
            message: "x".to_string(),
        })
    }

    #[test]
    fn test_transient_classification() {
        assert!(bad_response(503).is_transient());
        assert!(bad_response(429).is_transient());
        assert!(!bad_response(400).is_transient());
        assert!(!AppError::session_terminated("403").is_transient());
    }

    #[test]
    fn test_session_terminated_classification() {
        assert!(AppError::session_terminated("refresh rejected").is_session_terminated());
        assert!(!bad_response(500).is_session_terminated());
        assert_eq!(bad_response(409).status(), Some(409));
    }
}
