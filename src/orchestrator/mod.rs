//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责考试会话的生命周期和批量调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `session_manager` - 考试会话管理器
//! - 保证同一时刻只有一场进行中的考试
//! - 开始考试（获取时长、创建提交、启动计时）
//! - 根据考试记录恢复上次未完成的考试
//!
//! ### `exam_runner` - 应用运行器
//! - 管理应用生命周期（初始化、登录、运行）
//! - 批量加载答题卡（Vec<AnswerSheet>）
//! - 逐场作答、交卷或等待到期
//! - 输出全局统计信息
//!
//! ## 层次关系
//!
//! ```text
//! exam_runner (处理 Vec<AnswerSheet>)
//!     ↓
//! session_manager (一场进行中的考试)
//!     ↓
//! workflow::AttemptFlow (计时器 / 答案同步 / 交卷状态机)
//!     ↓
//! services (能力层：auth / exam)
//!     ↓
//! clients::AuthorizedClient → session (凭证与续期)
//!     ↓
//! infrastructure (基础设施：HttpTransport / JsonFile)
//! ```

pub mod exam_runner;
pub mod session_manager;

// 重新导出主要类型
pub use exam_runner::{App, RunStats};
pub use session_manager::ExamSessionManager;
