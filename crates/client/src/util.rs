use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks ignoring poisoning; snapshot state stays usable after a panicked
/// holder because every writer replaces it wholesale.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
