//! In-process partitioned log
//!
//! Mirrors the broker semantics the pipeline depends on: records with the same
//! key go to the same partition and keep their order, each consumer group
//! keeps its own committed position per partition, and a member that stops
//! without committing leaves its records to be delivered again. Faults
//! (unavailable broker, transient fetch errors) can be injected.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::{EventPublisher, FetchError, LogRecord, PublishError, RecordSource};

struct LogInner {
    topic: String,
    partitions: Vec<Mutex<Vec<LogRecord>>>,
    /// (group, partition) -> next offset to deliver after a restart
    committed: Mutex<HashMap<(String, i32), i64>>,
    appended: Notify,
    unavailable: AtomicBool,
}

/// Shared handle to an in-process log
#[derive(Clone)]
pub struct MemoryLog {
    inner: Arc<LogInner>,
}

impl MemoryLog {
    pub fn new(topic: impl Into<String>, partitions: usize) -> Self {
        let partitions = partitions.max(1);
        Self {
            inner: Arc::new(LogInner {
                topic: topic.into(),
                partitions: (0..partitions).map(|_| Mutex::new(Vec::new())).collect(),
                committed: Mutex::new(HashMap::new()),
                appended: Notify::new(),
                unavailable: AtomicBool::new(false),
            }),
        }
    }

    pub fn partition_count(&self) -> usize {
        self.inner.partitions.len()
    }

    /// Partition a key routes to; records without a key go to partition 0
    pub fn partition_for(&self, key: Option<&[u8]>) -> i32 {
        match key {
            Some(key) => {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                (hasher.finish() % self.inner.partitions.len() as u64) as i32
            }
            None => 0,
        }
    }

    /// Append a record without going through a publisher
    ///
    /// Used to place payloads on the log that no well-behaved producer would
    /// write, such as malformed bytes.
    pub fn append_raw(&self, key: Option<&[u8]>, payload: Option<&[u8]>) -> (i32, i64) {
        let partition = self.partition_for(key);
        let offset = {
            let mut records = self.inner.partitions[partition as usize].lock();
            let offset = records.len() as i64;
            records.push(LogRecord {
                topic: self.inner.topic.clone(),
                partition,
                offset,
                key: key.map(<[u8]>::to_vec),
                payload: payload.map(<[u8]>::to_vec),
            });
            offset
        };
        self.inner.appended.notify_waiters();
        (partition, offset)
    }

    /// Every record currently stored, partition by partition
    pub fn records(&self) -> Vec<LogRecord> {
        self.inner
            .partitions
            .iter()
            .flat_map(|p| p.lock().clone())
            .collect()
    }

    /// Records stored on one partition, in offset order
    pub fn partition_records(&self, partition: i32) -> Vec<LogRecord> {
        self.inner
            .partitions
            .get(partition as usize)
            .map(|p| p.lock().clone())
            .unwrap_or_default()
    }

    /// Committed position of `group_id` on `partition`
    pub fn committed_offset(&self, group_id: &str, partition: i32) -> Option<i64> {
        self.inner
            .committed
            .lock()
            .get(&(group_id.to_string(), partition))
            .copied()
    }

    /// Simulate the broker going away (or coming back)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
        self.inner.appended.notify_waiters();
    }

    pub fn publisher(&self) -> MemoryPublisher {
        MemoryPublisher {
            log: self.clone(),
            closed: AtomicBool::new(false),
            attempts: AtomicU64::new(0),
        }
    }

    /// Join `group_id`, starting from the group's committed positions
    pub fn subscribe(&self, group_id: impl Into<String>) -> MemorySource {
        let group_id = group_id.into();
        let positions = {
            let committed = self.inner.committed.lock();
            (0..self.inner.partitions.len() as i32)
                .map(|p| {
                    committed
                        .get(&(group_id.clone(), p))
                        .copied()
                        .unwrap_or(0)
                })
                .collect()
        };

        MemorySource {
            log: self.clone(),
            group_id,
            positions: Mutex::new(positions),
            next_partition: AtomicUsize::new(0),
            injected_failures: AtomicU32::new(0),
            closed: AtomicBool::new(false),
        }
    }

    fn is_unavailable(&self) -> bool {
        self.inner.unavailable.load(Ordering::SeqCst)
    }
}

/// Publisher writing into a [`MemoryLog`]
pub struct MemoryPublisher {
    log: MemoryLog,
    closed: AtomicBool,
    attempts: AtomicU64,
}

impl MemoryPublisher {
    /// Calls to `publish`, successful or not
    pub fn publish_attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventPublisher for MemoryPublisher {
    async fn publish(&self, key: &[u8], value: &[u8]) -> Result<(), PublishError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.is_closed() {
            return Err(PublishError::Closed);
        }
        if self.log.is_unavailable() {
            return Err(PublishError::BrokerUnavailable(
                "no broker reachable for memory log".to_string(),
            ));
        }

        self.log.append_raw(Some(key), Some(value));
        Ok(())
    }

    async fn close(&self) -> Result<(), PublishError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), PublishError> {
        if self.is_closed() {
            return Err(PublishError::Closed);
        }
        if self.log.is_unavailable() {
            return Err(PublishError::BrokerUnavailable(
                "no broker reachable for memory log".to_string(),
            ));
        }
        Ok(())
    }
}

/// Single consumer-group member reading every partition of a [`MemoryLog`]
pub struct MemorySource {
    log: MemoryLog,
    group_id: String,
    positions: Mutex<Vec<i64>>,
    next_partition: AtomicUsize,
    injected_failures: AtomicU32,
    closed: AtomicBool,
}

impl MemorySource {
    /// Make the next `count` fetches fail with a transport error
    pub fn fail_next_fetches(&self, count: u32) {
        self.injected_failures.store(count, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    fn take_next(&self) -> Option<LogRecord> {
        let partitions = &self.log.inner.partitions;
        let mut positions = self.positions.lock();
        let start = self.next_partition.load(Ordering::Relaxed);

        for step in 0..partitions.len() {
            let partition = (start + step) % partitions.len();
            let records = partitions[partition].lock();
            let position = positions[partition];
            if let Some(record) = records.get(position as usize) {
                positions[partition] = position + 1;
                self.next_partition
                    .store((partition + 1) % partitions.len(), Ordering::Relaxed);
                return Some(record.clone());
            }
        }
        None
    }
}

#[async_trait]
impl RecordSource for MemorySource {
    async fn fetch(&self, max_wait: Duration) -> Result<Option<LogRecord>, FetchError> {
        let deadline = Instant::now() + max_wait;

        loop {
            if self.is_closed() {
                return Err(FetchError::Closed);
            }

            let injected = self
                .injected_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if injected {
                return Err(FetchError::Transport("injected fetch failure".to_string()));
            }
            if self.log.is_unavailable() {
                return Err(FetchError::Transport(
                    "no broker reachable for memory log".to_string(),
                ));
            }

            // Register interest before checking so an append in between still wakes us
            let appended = self.log.inner.appended.notified();

            if let Some(record) = self.take_next() {
                return Ok(Some(record));
            }

            if tokio::time::timeout_at(deadline, appended).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn commit(&self, record: &LogRecord) -> Result<(), FetchError> {
        if self.is_closed() {
            return Err(FetchError::Closed);
        }

        let mut committed = self.log.inner.committed.lock();
        let entry = committed
            .entry((self.group_id.clone(), record.partition))
            .or_insert(0);
        *entry = (*entry).max(record.offset + 1);
        Ok(())
    }

    async fn close(&self) -> Result<(), FetchError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_same_key_keeps_publish_order() {
        let log = MemoryLog::new("payment_events", 4);
        let publisher = log.publisher();

        for i in 0..20 {
            let key = format!("user-{}", i % 3);
            publisher
                .publish(key.as_bytes(), i.to_string().as_bytes())
                .await
                .unwrap();
        }

        let source = log.subscribe("g");
        let mut seen: HashMap<String, Vec<i32>> = HashMap::new();
        while let Some(record) = source.fetch(Duration::from_millis(10)).await.unwrap() {
            let value: i32 = String::from_utf8(record.payload.clone().unwrap())
                .unwrap()
                .parse()
                .unwrap();
            seen.entry(record.key_lossy()).or_default().push(value);
        }

        for (key, values) in seen {
            let mut sorted = values.clone();
            sorted.sort();
            assert_eq!(values, sorted, "order broken for {}", key);
        }
    }

    #[tokio::test]
    async fn test_uncommitted_records_are_redelivered() {
        let log = MemoryLog::new("payment_events", 1);
        log.append_raw(Some(b"u1"), Some(b"a"));
        log.append_raw(Some(b"u1"), Some(b"b"));

        let first = log.subscribe("g");
        let a = first.fetch(Duration::from_millis(10)).await.unwrap().unwrap();
        first.commit(&a).await.unwrap();
        let b = first.fetch(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(b.payload.as_deref(), Some(&b"b"[..]));
        first.close().await.unwrap();

        let second = log.subscribe("g");
        let again = second.fetch(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(again, b);
        assert_eq!(log.committed_offset("g", 0), Some(1));
    }

    #[tokio::test]
    async fn test_groups_track_positions_independently() {
        let log = MemoryLog::new("payment_events", 2);
        log.append_raw(Some(b"u1"), Some(b"x"));

        let a = log.subscribe("group-a");
        let b = log.subscribe("group-b");
        assert!(a.fetch(Duration::from_millis(10)).await.unwrap().is_some());
        assert!(b.fetch(Duration::from_millis(10)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_fetch_waits_for_append() {
        let log = MemoryLog::new("payment_events", 2);
        let source = log.subscribe("g");

        let writer = log.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.append_raw(Some(b"u1"), Some(b"late"));
        });

        let record = source.fetch(Duration::from_secs(2)).await.unwrap();
        assert_eq!(record.unwrap().payload.as_deref(), Some(&b"late"[..]));
    }

    #[tokio::test]
    async fn test_fetch_times_out_empty() {
        let log = MemoryLog::new("payment_events", 1);
        let source = log.subscribe("g");
        assert!(source.fetch(Duration::from_millis(10)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let log = MemoryLog::new("payment_events", 1);
        let publisher = log.publisher();
        let source = log.subscribe("g");

        log.set_unavailable(true);
        assert!(matches!(
            publisher.publish(b"u1", b"v").await,
            Err(PublishError::BrokerUnavailable(_))
        ));
        assert!(matches!(
            source.fetch(Duration::from_millis(10)).await,
            Err(FetchError::Transport(_))
        ));

        log.set_unavailable(false);
        source.fail_next_fetches(2);
        assert_err!(source.fetch(Duration::from_millis(10)).await);
        assert_err!(source.fetch(Duration::from_millis(10)).await);
        assert_ok!(source.fetch(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_publisher_close_is_idempotent() {
        let log = MemoryLog::new("payment_events", 1);
        let publisher = log.publisher();

        assert!(publisher.close().await.is_ok());
        assert!(publisher.close().await.is_ok());
        assert!(matches!(
            publisher.publish(b"u1", b"v").await,
            Err(PublishError::Closed)
        ));
        assert_eq!(publisher.publish_attempts(), 1);
    }
}
