//! Store Access Scheduling
//!
//! One logical writer per store. Writes queue FIFO behind a fair mutex;
//! migrations take the gate exclusively so no read observes a half-upgraded
//! schema; plain reads share the gate and run concurrently.
//!
//! Permits are owned so they can move into `spawn_blocking` closures and
//! stay held until the blocking SQLite work finishes, even if the awaiting
//! future is dropped.

use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// Shared read access.
pub struct ReadPermit {
    _gate: OwnedRwLockReadGuard<()>,
}

/// Serialized write access. Holds the writer queue and shared gate.
pub struct WritePermit {
    _writer: OwnedMutexGuard<()>,
    _gate: OwnedRwLockReadGuard<()>,
}

/// Exclusive access for schema migrations.
pub struct ExclusivePermit {
    _gate: OwnedRwLockWriteGuard<()>,
}

#[derive(Clone, Default)]
pub struct AccessGate {
    gate: Arc<RwLock<()>>,
    writer: Arc<Mutex<()>>,
}

impl AccessGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn read(&self) -> ReadPermit {
        ReadPermit {
            _gate: self.gate.clone().read_owned().await,
        }
    }

    /// Wait for this writer's turn. Concurrent writers complete in the
    /// order they called `write`.
    pub async fn write(&self) -> WritePermit {
        let writer = self.writer.clone().lock_owned().await;
        let gate = self.gate.clone().read_owned().await;
        WritePermit {
            _writer: writer,
            _gate: gate,
        }
    }

    /// Wait until every in-flight read and write has drained, then block
    /// all new ones until the permit drops.
    pub async fn exclusive(&self) -> ExclusivePermit {
        ExclusivePermit {
            _gate: self.gate.clone().write_owned().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_reads_run_concurrently() {
        let gate = AccessGate::new();
        let _a = gate.read().await;
        let b = tokio::time::timeout(Duration::from_millis(100), gate.read()).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_exclusive_blocks_reads() {
        let gate = AccessGate::new();
        let permit = gate.exclusive().await;
        let blocked = tokio::time::timeout(Duration::from_millis(50), gate.read()).await;
        assert!(blocked.is_err());
        drop(permit);
        let resumed = tokio::time::timeout(Duration::from_millis(100), gate.read()).await;
        assert!(resumed.is_ok());
    }

    #[tokio::test]
    async fn test_writes_complete_in_submission_order() {
        let gate = AccessGate::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let first = gate.write().await;
        let mut handles = Vec::new();
        for i in 0..5 {
            let gate = gate.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                let _permit = gate.write().await;
                order.lock().unwrap().push(i);
            }));
            // Let each task enqueue before spawning the next.
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        drop(first);
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_write_does_not_block_reads() {
        let gate = AccessGate::new();
        let _w = gate.write().await;
        let r = tokio::time::timeout(Duration::from_millis(100), gate.read()).await;
        assert!(r.is_ok());
    }
}
