//! 会话层：凭证的唯一持有者和续期器

pub mod credential_store;
pub mod refresher;

pub use credential_store::{CredentialEvent, CredentialStore};
pub use refresher::{RefreshFailure, RefreshOutcome, SessionRefresher};
