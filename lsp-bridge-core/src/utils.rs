pub(crate) mod canonical_uri;
pub mod file_uri;
pub mod line_ending;
pub(crate) mod read_file;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// ロックを取る。他のスレッドがパニックしていても中身を使い続ける。
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
