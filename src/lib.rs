//! # Exam Session
//!
//! 考试系统客户端的会话与限时考试引擎
//!
//! ## 架构设计
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 只暴露能力，不认识考试业务
//! - `HttpTransport` - 发请求、拿回状态码和正文
//! - `JsonFile` - 小体量状态文件（相当于 localStorage）
//!
//! ### ② 会话层（Session / Clients）
//! - `CredentialStore` - 凭证的唯一持有者，变化时广播通知
//! - `SessionRefresher` - 续期，同一时刻最多一个 refresh 在途
//! - `AuthorizedClient` - 附加 token，401 续期后重试一次，403 终止会话
//!
//! ### ③ 业务能力层（Services）
//! - `AuthService` - 登录 / OAuth2 回调 / 登出
//! - `ExamService` - 考试、题目、提交、答案接口
//!
//! ### ④ 流程层（Workflow）
//! - `ExamTimer` - 按绝对截止时间到期的单次计时器
//! - `AnswerRelay` - 按版本号同步答案，后写者为准
//! - `SubmissionFinalizer` - 只交卷一次的状态机
//! - `AttemptFlow` - 单场考试的组装
//!
//! ### ⑤ 编排层（Orchestration）
//! - `ExamSessionManager` - 只允许一场进行中的考试，支持恢复
//! - `App` - 批量答题卡运行器
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod session;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::AuthorizedClient;
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::{ApiRequest, ApiResponse, HttpTransport, JsonFile, ReqwestTransport};
pub use models::{AttemptStatus, Credential, ExamAttempt, Identity, Role, SyncState};
pub use orchestrator::{App, ExamSessionManager, RunStats};
pub use services::{AuthService, ExamService};
pub use session::{CredentialEvent, CredentialStore, RefreshFailure, SessionRefresher};
pub use workflow::{AttemptFlow, ExamEvent, ExamTimer, FinalizeOutcome, FinalizeTrigger, TimerState};
