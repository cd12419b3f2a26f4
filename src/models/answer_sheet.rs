use serde::{Deserialize, Serialize};

/// 答题卡中的一题
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetAnswer {
    pub question_id: i64,
    pub answer: String,
}

/// 答题卡：一个 TOML 文件对应一场考试
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerSheet {
    pub exam_id: i64,
    /// 作答完毕后立即交卷；为 false 时等待计时器到期自动交卷
    #[serde(default = "default_submit_on_finish")]
    pub submit_on_finish: bool,
    #[serde(default)]
    pub answers: Vec<SheetAnswer>,
    #[serde(skip_serializing, skip_deserializing)]
    pub file_path: Option<String>,
}

fn default_submit_on_finish() -> bool {
    true
}

impl AnswerSheet {
    /// 日志中展示用的名称
    pub fn display_name(&self) -> String {
        self.file_path
            .clone()
            .unwrap_or_else(|| format!("exam-{}", self.exam_id))
    }
}
