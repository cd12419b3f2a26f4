use crate::models::answer_sheet::AnswerSheet;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// 从 TOML 文件加载一张答题卡
pub async fn load_answer_sheet(toml_file_path: &Path) -> Result<AnswerSheet> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取答题卡: {}", toml_file_path.display()))?;

    let mut sheet: AnswerSheet = toml::from_str(&content)
        .with_context(|| format!("无法解析答题卡: {}", toml_file_path.display()))?;

    sheet.file_path = Some(toml_file_path.to_string_lossy().to_string());

    Ok(sheet)
}

/// 加载文件夹中所有答题卡，按文件名排序；单个文件解析失败只记录警告
pub async fn load_all_answer_sheets(folder_path: &str) -> Result<Vec<AnswerSheet>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        anyhow::bail!("文件夹不存在: {}", folder_path);
    }

    let mut paths = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut sheets = Vec::new();
    for path in paths {
        tracing::info!(
            "正在加载答题卡: {}",
            path.file_name().unwrap_or_default().to_string_lossy()
        );

        match load_answer_sheet(&path).await {
            Ok(sheet) => {
                tracing::info!("考试 {} 共 {} 道作答", sheet.exam_id, sheet.answers.len());
                sheets.push(sheet);
            }
            Err(e) => {
                tracing::warn!("加载答题卡失败 {}: {:#}", path.display(), e);
            }
        }
    }

    Ok(sheets)
}
