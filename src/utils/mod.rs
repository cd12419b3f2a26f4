pub mod logging;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// 获取互斥锁；某个持锁线程 panic 后依然返回内部数据
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
