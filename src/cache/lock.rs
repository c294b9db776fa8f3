//! Poison-tolerant access to the response store lock.

use std::sync::{LockResult, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

pub(crate) fn read<'a, T>(lock: &'a RwLock<T>, op: &'static str) -> RwLockReadGuard<'a, T> {
    recover(lock.read(), "read", op)
}

pub(crate) fn write<'a, T>(lock: &'a RwLock<T>, op: &'static str) -> RwLockWriteGuard<'a, T> {
    recover(lock.write(), "write", op)
}

fn recover<G>(result: LockResult<G>, mode: &'static str, op: &'static str) -> G {
    result.unwrap_or_else(|poisoned| {
        warn!(
            target = "quill::cache::lock",
            op,
            mode,
            "response store lock was poisoned; continuing with its current contents"
        );
        poisoned.into_inner()
    })
}
