use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use arbor_ledger::StreamKey;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-key FIFO queues for read-modify-write updates.
///
/// `tokio`'s mutex hands the lock to waiters in arrival order, so holding a
/// key's guard puts every later updater of that key in line behind us.
#[derive(Default)]
pub struct KeyLocks {
    queues: Mutex<HashMap<StreamKey, Arc<AsyncMutex<()>>>>,
}

/// Holds a key's place at the head of its queue. The queue entry is dropped
/// once nobody else is waiting.
pub struct KeyGuard<'a> {
    locks: &'a KeyLocks,
    stream: StreamKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, stream: &StreamKey) -> KeyGuard<'_> {
        let queue = {
            let mut queues = self.queues.lock().expect("lock poisoned");
            queues.entry(stream.clone()).or_default().clone()
        };
        let guard = queue.lock_owned().await;
        KeyGuard {
            locks: self,
            stream: stream.clone(),
            guard: Some(guard),
        }
    }

    pub fn queued_keys(&self) -> usize {
        self.queues.lock().expect("lock poisoned").len()
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut queues = self.locks.queues.lock().expect("lock poisoned");
        if queues
            .get(&self.stream)
            .is_some_and(|queue| Arc::strong_count(queue) == 1)
        {
            queues.remove(&self.stream);
        }
    }
}
