//! Durable record store: one JSON document per concern, guarded by a
//! sibling lock file.

mod lock;
mod record;

pub use lock::{DocumentLock, LockGuard};
pub use record::RecordStore;

use crate::domain::CoreError;

/// Run blocking filesystem work off the async scheduling path.
///
/// 遅いロック待ちで無関係なタスクを止めないため、ファイル I/O はすべて
/// dedicated blocking thread で実行する。
pub(crate) async fn run_blocking<R>(
    work: impl FnOnce() -> Result<R, CoreError> + Send + 'static,
) -> Result<R, CoreError>
where
    R: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| CoreError::Other(format!("blocking task failed: {err}")))?
}
