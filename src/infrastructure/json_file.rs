//! JSON 状态文件 - 基础设施层
//!
//! 相当于浏览器的 localStorage：小体量、同步读写、整体替换

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::{AppError, AppResult, FileError};

/// 一个以 JSON 保存的状态文件
#[derive(Debug, Clone)]
pub struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn display(&self) -> String {
        self.path.display().to_string()
    }

    /// 读取文件；不存在返回 None
    pub fn load<T: DeserializeOwned>(&self) -> AppResult<Option<T>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AppError::file_read_failed(self.display(), e)),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| {
                FileError::JsonFailed {
                    path: self.display(),
                    source,
                }
                .into()
            })
    }

    /// 读取文件；内容损坏时记录警告并删除，视为不存在
    pub fn load_or_discard<T: DeserializeOwned>(&self) -> Option<T> {
        match self.load() {
            Ok(value) => value,
            Err(e) => {
                warn!("⚠️ 状态文件无法使用，已丢弃: {}", e);
                let _ = self.remove();
                None
            }
        }
    }

    /// 整体写入：先写临时文件再 rename，读者不会看到写了一半的内容
    pub fn save<T: Serialize>(&self, value: &T) -> AppResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::file_write_failed(parent.display().to_string(), e))?;
        }

        let content = serde_json::to_string_pretty(value).map_err(|source| FileError::JsonFailed {
            path: self.display(),
            source,
        })?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, content)
            .map_err(|e| AppError::file_write_failed(tmp.display().to_string(), e))?;
        fs::rename(&tmp, &self.path).map_err(|e| AppError::file_write_failed(self.display(), e))
    }

    /// 删除文件；不存在不算错误
    pub fn remove(&self) -> AppResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(FileError::DeleteFailed {
                path: self.display(),
                source,
            }
            .into()),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[test]
    fn test_save_creates_parent_and_load_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let file = JsonFile::new(dir.path().join("nested").join("state.json"));

        assert_eq!(file.load::<Sample>().unwrap(), None);
        let sample = Sample {
            name: "deneme".to_string(),
            count: 2,
        };
        file.save(&sample).unwrap();
        assert_eq!(file.load::<Sample>().unwrap(), Some(sample));
        assert!(!dir.path().join("nested").join("state.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();

        let file = JsonFile::new(&path);
        assert!(file.load::<Sample>().is_err());
        assert_eq!(file.load_or_discard::<Sample>(), None);
        assert!(!path.exists());
        file.remove().unwrap();
    }
}
