use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::clients::AuthorizedClient;
use crate::config::Config;
use crate::infrastructure::{HttpTransport, JsonFile, ReqwestTransport};
use crate::models::{load_all_answer_sheets, AnswerSheet, SyncState};
use crate::orchestrator::ExamSessionManager;
use crate::services::{AuthService, ExamService};
use crate::session::{CredentialEvent, CredentialStore};
use crate::utils::logging;
use crate::workflow::{format_remaining, AttemptFlow, ExamEvent, FinalizeOutcome, RetryPolicy};

/// 应用主结构
pub struct App {
    config: Config,
    store: CredentialStore,
    client: Arc<AuthorizedClient>,
    auth: AuthService,
    exams: ExamService,
    manager: ExamSessionManager,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        config.validate()?;
        logging::init_log_file(&config.output_log_file)?;
        log_startup(&config);

        let transport: Arc<dyn HttpTransport> = Arc::new(
            ReqwestTransport::new(&config.api_base_url, config.request_timeout())
                .context("无法创建 HTTP 客户端")?,
        );
        Ok(Self::with_transport(config, transport))
    }

    /// 使用指定的传输创建应用（测试时传入假后端）
    pub fn with_transport(config: Config, transport: Arc<dyn HttpTransport>) -> Self {
        let store = CredentialStore::persistent(JsonFile::new(&config.credential_file));
        let client = Arc::new(AuthorizedClient::new(transport, store.clone()));
        let auth = AuthService::new(Arc::clone(&client));
        let exams = ExamService::new(Arc::clone(&client));
        let manager = ExamSessionManager::new(
            exams.clone(),
            Some(JsonFile::new(&config.attempt_file)),
            RetryPolicy::from_config(&config),
        );

        Self {
            config,
            store,
            client,
            auth,
            exams,
            manager,
        }
    }

    pub fn manager(&self) -> &ExamSessionManager {
        &self.manager
    }

    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<RunStats> {
        let _watcher = self.watch_session();
        self.ensure_login().await?;
        let identity = self.auth.ensure_student()?;
        info!("👤 当前用户: {} ({})", identity.email, identity.role.name());

        let mut stats = RunStats::default();

        if let Some(flow) = self.manager.resume().await? {
            info!("{} 等待恢复的考试完成...", flow.ctx());
            stats.resumed += 1;
            self.finish(&flow, false, &mut stats).await;
        }

        let sheets = load_sheets(&self.config).await?;
        if sheets.is_empty() {
            warn!("⚠️ 没有找到待提交的答题卡，程序结束");
            print_final_stats(&stats, &self.config, self.client.refresher().refresh_count());
            return Ok(stats);
        }
        info!("✓ 找到 {} 张答题卡", sheets.len());
        stats.total = sheets.len();

        for (index, sheet) in sheets.iter().enumerate() {
            log_sheet_start(index + 1, sheets.len(), sheet);
            match self.take_exam(sheet, &mut stats).await {
                Ok(()) => {}
                Err(e) => {
                    error!("[答题卡 {}] ❌ 处理失败: {:#}", index + 1, e);
                    stats.failed += 1;
                    if !self.store.is_authenticated() {
                        error!("❌ 会话已终止，停止处理剩余答题卡");
                        break;
                    }
                }
            }
        }

        print_final_stats(&stats, &self.config, self.client.refresher().refresh_count());
        Ok(stats)
    }

    async fn ensure_login(&self) -> Result<()> {
        if self.auth.is_authenticated() {
            return Ok(());
        }
        if !self.config.has_login() {
            anyhow::bail!("未登录，请设置 LOGIN_EMAIL 和 LOGIN_PASSWORD");
        }
        self.auth
            .login(&self.config.login_email, &self.config.login_password)
            .await
            .context("登录失败")?;
        Ok(())
    }

    async fn take_exam(&self, sheet: &AnswerSheet, stats: &mut RunStats) -> Result<()> {
        let questions = self.exams.fetch_questions(sheet.exam_id).await?;
        let flow = self
            .manager
            .begin(sheet.exam_id)
            .await
            .with_context(|| format!("无法开始考试 {}", sheet.exam_id))?;
        info!("{} 共 {} 道题", flow.ctx(), questions.len());

        let mut uploads: Vec<JoinHandle<SyncState>> = Vec::new();
        for answer in &sheet.answers {
            if !questions.is_empty() && !questions.iter().any(|q| q.id == answer.question_id) {
                warn!("{} ⚠️ 题目 {} 不在本场考试中，跳过", flow.ctx(), answer.question_id);
                continue;
            }
            match flow.record_answer(answer.question_id, answer.answer.as_str()) {
                Ok(handle) => uploads.push(handle),
                Err(e) => warn!("{} ⚠️ 跳过题目 {}: {}", flow.ctx(), answer.question_id, e),
            }
        }

        for handle in uploads {
            if let Ok(SyncState::Sent) = handle.await {
                stats.answers_synced += 1;
            }
        }
        stats.answers_recorded += flow.answers().len();

        self.finish(&flow, sheet.submit_on_finish, stats).await;
        Ok(())
    }

    /// 交卷（或等待计时器到期），直到考试完成或放弃自动重试
    async fn finish(&self, flow: &Arc<AttemptFlow>, submit_now: bool, stats: &mut RunStats) {
        let mut events = flow.subscribe_events();

        if submit_now {
            match flow.submit().await {
                Ok(FinalizeOutcome::Completed(_)) => {
                    stats.completed += 1;
                    return;
                }
                Ok(FinalizeOutcome::Skipped(status)) => {
                    info!("{} 交卷请求被忽略，当前状态 {:?}", flow.ctx(), status)
                }
                Err(e) => warn!("{} ⚠️ 交卷失败，等待自动重试: {}", flow.ctx(), e),
            }
        } else if let Some(remaining) = flow.remaining() {
            info!(
                "{} ⏳ 等待计时器到期自动交卷 (剩余 {})",
                flow.ctx(),
                format_remaining(remaining.as_secs())
            );
        }

        loop {
            tokio::select! {
                _ = flow.wait_completed() => {
                    stats.completed += 1;
                    return;
                }
                event = events.recv() => match event {
                    Ok(ExamEvent::FinalizeFailed { will_retry: false, message, .. }) => {
                        error!("{} ❌ 交卷最终失败，请手动重试: {}", flow.ctx(), message);
                        stats.failed += 1;
                        return;
                    }
                    Ok(ExamEvent::SyncWarning { unsynced }) => {
                        warn!("{} ⚠️ 未同步的题目: {:?}", flow.ctx(), unsynced);
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        flow.wait_completed().await;
                        stats.completed += 1;
                        return;
                    }
                },
            }
        }
    }

    // 凭证被清除时提示重新登录
    fn watch_session(&self) -> JoinHandle<()> {
        let mut events = self.store.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(CredentialEvent::Cleared) => warn!("🔒 会话已结束，请重新登录"),
                    Ok(CredentialEvent::Stored) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

/// 运行统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub resumed: usize,
    pub answers_recorded: usize,
    pub answers_synced: usize,
}

async fn load_sheets(config: &Config) -> Result<Vec<AnswerSheet>> {
    info!("\n📁 正在扫描答题卡...");
    if !std::path::Path::new(&config.answer_sheet_folder).exists() {
        return Ok(Vec::new());
    }
    load_all_answer_sheets(&config.answer_sheet_folder).await
}

// ========== 日志辅助函数 ==========

fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 考试会话");
    info!("🌐 接口地址: {}", config.api_base_url);
    info!("📂 答题卡目录: {}", config.answer_sheet_folder);
    info!("{}", "=".repeat(60));
}

fn log_sheet_start(index: usize, total: usize, sheet: &AnswerSheet) {
    info!("\n{}", "=".repeat(60));
    info!("📝 开始第 {}/{} 场考试: {}", index, total, sheet.display_name());
    info!(
        "📄 考试 {}，{} 道作答，{}",
        sheet.exam_id,
        sheet.answers.len(),
        if sheet.submit_on_finish {
            "作答后立即交卷"
        } else {
            "等待时间到自动交卷"
        }
    );
    info!("{}", "=".repeat(60));
}

fn print_final_stats(stats: &RunStats, config: &Config, refresh_count: u64) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 完成: {}/{}", stats.completed, stats.total + stats.resumed);
    info!("❌ 失败: {}", stats.failed);
    info!("🔄 恢复: {}", stats.resumed);
    info!(
        "✍️ 答案: 已同步 {}/{}",
        stats.answers_synced, stats.answers_recorded
    );
    info!("🔑 会话续期: {} 次", refresh_count);
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", config.output_log_file);
}
