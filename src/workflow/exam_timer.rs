//! 考试计时器
//!
//! `Idle → Running → Expired`，到期回调只触发一次。
//!
//! 到期由一个 `sleep_until(deadline)` 任务负责，和每秒一次的显示刷新分开：
//! 显示刷新丢几拍（进程被挂起等）不影响到期时间。
//! 取消时除了 abort 任务，还会推进 generation；已经排队的到期任务醒来后
//! 发现 generation 不一致就什么都不做。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::error::{AppResult, ExamError};
use crate::utils::lock;

/// 计时器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// 未启动或已取消
    Idle,
    /// 计时中
    Running,
    /// 已到期（终态）
    Expired,
}

struct TimerSlot {
    state: TimerState,
    deadline: Option<Instant>,
    generation: u64,
    expiry_task: Option<JoinHandle<()>>,
    ticker_task: Option<JoinHandle<()>>,
}

impl TimerSlot {
    fn abort_tasks(&mut self) {
        if let Some(task) = self.expiry_task.take() {
            task.abort();
        }
        if let Some(task) = self.ticker_task.take() {
            task.abort();
        }
    }
}

/// 考试计时器
pub struct ExamTimer {
    slot: Arc<Mutex<TimerSlot>>,
    remaining: Arc<watch::Sender<u64>>,
}

impl Default for ExamTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl ExamTimer {
    pub fn new() -> Self {
        let (remaining, _) = watch::channel(0);
        Self {
            slot: Arc::new(Mutex::new(TimerSlot {
                state: TimerState::Idle,
                deadline: None,
                generation: 0,
                expiry_task: None,
                ticker_task: None,
            })),
            remaining: Arc::new(remaining),
        }
    }

    /// 从现在开始计时 `duration`
    pub fn start<F>(&self, duration: Duration, on_expire: F) -> AppResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.start_at(Instant::now() + duration, on_expire)
    }

    /// 以绝对截止时间启动
    ///
    /// 只能从 `Idle` 启动；到期后不能再次启动。
    pub fn start_at<F>(&self, deadline: Instant, on_expire: F) -> AppResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut slot = lock(&self.slot);
        match slot.state {
            TimerState::Running => return Err(ExamError::TimerRunning.into()),
            TimerState::Expired => return Err(ExamError::TimerExpired.into()),
            TimerState::Idle => {}
        }

        slot.generation += 1;
        let generation = slot.generation;
        slot.state = TimerState::Running;
        slot.deadline = Some(deadline);
        self.remaining
            .send_replace(whole_seconds(deadline.saturating_duration_since(Instant::now())));

        let shared = Arc::clone(&self.slot);
        let remaining = Arc::clone(&self.remaining);
        slot.expiry_task = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            {
                let mut slot = lock(&shared);
                if slot.generation != generation || slot.state != TimerState::Running {
                    debug!("计时器已取消，忽略到期");
                    return;
                }
                slot.state = TimerState::Expired;
                slot.deadline = None;
                // 自己的 handle 直接丢弃即可
                slot.expiry_task = None;
                if let Some(ticker) = slot.ticker_task.take() {
                    ticker.abort();
                }
            }
            remaining.send_replace(0);
            debug!("⏰ 计时器到期");
            on_expire();
        }));

        let remaining = Arc::clone(&self.remaining);
        slot.ticker_task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let left = whole_seconds(deadline.saturating_duration_since(Instant::now()));
                remaining.send_replace(left);
                if left == 0 {
                    break;
                }
            }
        }));

        Ok(())
    }

    /// 取消计时：`Running → Idle`
    ///
    /// # 返回
    /// 是否真的取消了一个正在运行的计时器；已到期或未启动时什么都不做
    pub fn cancel(&self) -> bool {
        let mut slot = lock(&self.slot);
        if slot.state != TimerState::Running {
            return false;
        }
        slot.state = TimerState::Idle;
        slot.generation += 1;
        slot.deadline = None;
        slot.abort_tasks();
        debug!("计时器已取消");
        true
    }

    pub fn state(&self) -> TimerState {
        lock(&self.slot).state
    }

    /// 剩余时间；未运行时为 None
    pub fn remaining(&self) -> Option<Duration> {
        let slot = lock(&self.slot);
        match (slot.state, slot.deadline) {
            (TimerState::Running, Some(deadline)) => {
                Some(deadline.saturating_duration_since(Instant::now()))
            }
            _ => None,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        lock(&self.slot).deadline
    }

    /// 订阅剩余秒数（约每秒更新一次，用于显示）
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.remaining.subscribe()
    }
}

impl Drop for ExamTimer {
    fn drop(&mut self) {
        lock(&self.slot).abort_tasks();
    }
}

/// 向上取整到整秒：还剩 0.3 秒时显示 1
fn whole_seconds(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

/// 把剩余秒数格式化为 `h:mm:ss`（一小时以上）或 `m:ss`
pub fn format_remaining(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(0), "0:00");
        assert_eq!(format_remaining(59), "0:59");
        assert_eq!(format_remaining(600), "10:00");
        assert_eq!(format_remaining(3600), "1:00:00");
        assert_eq!(format_remaining(3725), "1:02:05");
    }

    #[test]
    fn test_whole_seconds_rounds_up() {
        assert_eq!(whole_seconds(Duration::from_millis(300)), 1);
        assert_eq!(whole_seconds(Duration::from_secs(2)), 2);
        assert_eq!(whole_seconds(Duration::ZERO), 0);
    }
}
