//! 凭证存储
//!
//! 凭证的唯一持有者。所有修改只能通过 `set` / `clear`，
//! 修改后通过广播通知订阅者（AuthorizedClient、界面跳转登录等）。

use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::infrastructure::JsonFile;
use crate::models::{Credential, Identity, PersistedCredential};

/// 凭证变化通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialEvent {
    /// 登录或续期后写入了新凭证
    Stored,
    /// 凭证被清除（登出或会话终止），界面应回到登录页
    Cleared,
}

struct StoreInner {
    current: RwLock<Option<Credential>>,
    file: Option<JsonFile>,
    events: broadcast::Sender<CredentialEvent>,
}

/// 凭证存储（可廉价 clone，共享同一份状态）
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<StoreInner>,
}

impl CredentialStore {
    fn with_state(current: Option<Credential>, file: Option<JsonFile>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(StoreInner {
                current: RwLock::new(current),
                file,
                events,
            }),
        }
    }

    /// 只存在内存中的凭证存储
    pub fn in_memory() -> Self {
        Self::with_state(None, None)
    }

    /// 持久化到文件的凭证存储，启动时读取已有凭证
    ///
    /// 文件缺键或角色无法识别时视为未登录，并删除该文件。
    pub fn persistent(file: JsonFile) -> Self {
        let loaded = file
            .load_or_discard::<PersistedCredential>()
            .and_then(PersistedCredential::into_credential);

        match &loaded {
            Some(credential) => info!(
                "✓ 已恢复登录状态: {} ({})",
                credential.identity.email,
                credential.identity.role.name()
            ),
            None => {
                if file.exists() {
                    warn!("⚠️ 凭证文件不完整，已清除: {}", file.path().display());
                    if let Err(e) = file.remove() {
                        warn!("⚠️ 删除凭证文件失败: {}", e);
                    }
                }
            }
        }

        Self::with_state(loaded, Some(file))
    }

    /// 当前凭证
    pub fn get(&self) -> Option<Credential> {
        self.read().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.read().as_ref().map(|c| c.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read().as_ref().map(|c| c.refresh_token.clone())
    }

    pub fn identity(&self) -> Option<Identity> {
        self.read().as_ref().map(|c| c.identity.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().is_some()
    }

    /// 整体替换凭证
    ///
    /// 文件和内存在同一把写锁下更新，和 `clear` 互斥。
    /// 持久化失败只记录警告：内存中的凭证仍然有效，本次会话不受影响。
    pub fn set(&self, credential: Credential) {
        {
            let mut current = self.write();
            if let Some(file) = &self.inner.file {
                if let Err(e) = file.save(&PersistedCredential::from(&credential)) {
                    warn!("⚠️ 凭证持久化失败: {}", e);
                }
            }
            debug!("凭证已更新: {}", credential.identity.email);
            *current = Some(credential);
        }
        let _ = self.inner.events.send(CredentialEvent::Stored);
    }

    /// 清除凭证；只有原先存在凭证时才发出 `Cleared` 通知
    ///
    /// # 返回
    /// 是否真的清除了凭证
    pub fn clear(&self) -> bool {
        let previous = {
            let mut current = self.write();
            if let Some(file) = &self.inner.file {
                if let Err(e) = file.remove() {
                    warn!("⚠️ 删除凭证文件失败: {}", e);
                }
            }
            current.take()
        };

        match previous {
            Some(credential) => {
                info!("凭证已清除: {}", credential.identity.email);
                let _ = self.inner.events.send(CredentialEvent::Cleared);
                true
            }
            None => false,
        }
    }

    /// 订阅凭证变化
    pub fn subscribe(&self) -> broadcast::Receiver<CredentialEvent> {
        self.inner.events.subscribe()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Option<Credential>> {
        self.inner
            .current
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Option<Credential>> {
        self.inner
            .current
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
