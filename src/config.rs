use std::time::Duration;

use crate::error::{AppResult, ConfigError};

/// 程序配置文件
#[derive(Clone, Debug)]
pub struct Config {
    /// 后端 REST 接口根路径
    pub api_base_url: String,
    /// 单次请求超时（秒）
    pub request_timeout_secs: u64,
    /// 凭证持久化文件（相当于浏览器的 localStorage）
    pub credential_file: String,
    /// 进行中考试的记录文件，刷新/重启后用于恢复
    pub attempt_file: String,
    /// 答题卡 TOML 文件存放目录
    pub answer_sheet_folder: String,
    // --- 登录信息 ---
    pub login_email: String,
    pub login_password: String,
    // --- 交卷重试策略 ---
    /// 连续失败多少次后停止自动重试
    pub finalize_max_attempts: u32,
    /// 重试退避的基础间隔（毫秒）
    pub finalize_retry_base_ms: u64,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080/api".to_string(),
            request_timeout_secs: 30,
            credential_file: ".exam_session/credentials.json".to_string(),
            attempt_file: ".exam_session/attempt.json".to_string(),
            answer_sheet_folder: "answer_sheets".to_string(),
            login_email: String::new(),
            login_password: String::new(),
            finalize_max_attempts: 5,
            finalize_retry_base_ms: 500,
            verbose_logging: false,
            output_log_file: "exam_session.log".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            api_base_url: std::env::var("API_BASE_URL").unwrap_or(default.api_base_url),
            request_timeout_secs: std::env::var("REQUEST_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.request_timeout_secs),
            credential_file: std::env::var("CREDENTIAL_FILE").unwrap_or(default.credential_file),
            attempt_file: std::env::var("ATTEMPT_FILE").unwrap_or(default.attempt_file),
            answer_sheet_folder: std::env::var("ANSWER_SHEET_FOLDER").unwrap_or(default.answer_sheet_folder),
            login_email: std::env::var("LOGIN_EMAIL").unwrap_or(default.login_email),
            login_password: std::env::var("LOGIN_PASSWORD").unwrap_or(default.login_password),
            finalize_max_attempts: std::env::var("FINALIZE_MAX_ATTEMPTS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.finalize_max_attempts),
            finalize_retry_base_ms: std::env::var("FINALIZE_RETRY_BASE_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.finalize_retry_base_ms),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
        }
    }

    /// 校验配置
    pub fn validate(&self) -> AppResult<()> {
        if reqwest::Url::parse(&self.api_base_url).is_err() {
            return Err(ConfigError::InvalidValue {
                name: "API_BASE_URL".to_string(),
                reason: format!("'{}' 不是合法的 URL", self.api_base_url),
            }
            .into());
        }
        if self.finalize_max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                name: "FINALIZE_MAX_ATTEMPTS".to_string(),
                reason: "至少为 1".to_string(),
            }
            .into());
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn has_login(&self) -> bool {
        !self.login_email.is_empty() && !self.login_password.is_empty()
    }
}
