use serde::Serialize;

/// 答案同步状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncState {
    /// 已记录，等待上传结果
    Pending,
    /// 服务端已确认
    Sent,
    /// 上传失败，交卷前补发
    Failed,
}

/// 单题作答记录，按题目 ID 唯一
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerRecord {
    pub question_id: i64,
    pub given_answer: String,
    /// 本地递增版本号，每次作答都会变
    pub version: u64,
    pub sync_state: SyncState,
}

/// 交卷前补发的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// 本次补发成功的数量
    pub synced: usize,
    /// 补发后仍未同步的题目
    pub unsynced: Vec<i64>,
}

impl FlushReport {
    pub fn is_clean(&self) -> bool {
        self.unsynced.is_empty()
    }
}
