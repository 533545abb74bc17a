//! Deferred index writes.
//!
//! In deferred mode the synchronizer computes the text at save time and
//! queues the write here. Nothing reaches the backend until the host calls
//! `IndexSynchronizer::flush`, which drains the queue in FIFO order.

use std::collections::VecDeque;
use std::sync::Mutex;

use mirror_types::AssociationKey;

/// A queued index write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteTask {
    Upsert {
        entity_type: String,
        key: AssociationKey,
        text: String,
    },
    Delete {
        entity_type: String,
        key: AssociationKey,
    },
}

impl WriteTask {
    pub fn entity_type(&self) -> &str {
        match self {
            WriteTask::Upsert { entity_type, .. } | WriteTask::Delete { entity_type, .. } => {
                entity_type
            }
        }
    }

    pub fn key(&self) -> &AssociationKey {
        match self {
            WriteTask::Upsert { key, .. } | WriteTask::Delete { key, .. } => key,
        }
    }
}

/// Ordered queue of pending writes. Tasks for the same key are not merged.
#[derive(Debug, Default)]
pub struct WriteQueue {
    tasks: Mutex<VecDeque<WriteTask>>,
}

impl WriteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, task: WriteTask) {
        self.lock().push_back(task);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Take every queued task. Tasks pushed afterwards stay for the next drain.
    pub fn drain(&self) -> VecDeque<WriteTask> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<WriteTask>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Result of a flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub executed: usize,
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upsert(key: &str, text: &str) -> WriteTask {
        WriteTask::Upsert {
            entity_type: "Page".to_string(),
            key: AssociationKey::from(key),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_drain_is_fifo_and_empties() {
        let queue = WriteQueue::new();
        queue.push(upsert("a", "one"));
        queue.push(upsert("a", "two"));
        queue.push(WriteTask::Delete {
            entity_type: "Page".to_string(),
            key: AssociationKey::from("b"),
        });
        assert_eq!(queue.len(), 3);

        let tasks: Vec<_> = queue.drain().into_iter().collect();
        assert_eq!(tasks[0], upsert("a", "one"));
        assert_eq!(tasks[1], upsert("a", "two"));
        assert_eq!(tasks[2].key().as_str(), "b");
        assert_eq!(tasks[2].entity_type(), "Page");
        assert!(queue.is_empty());

        queue.push(upsert("c", "later"));
        assert_eq!(queue.len(), 1);
    }
}
