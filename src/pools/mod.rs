use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::clock::Clock;

#[derive(Debug, PartialEq, Eq)]
pub enum PoolError {
    DuplicateWorker { address: String },
    WorkerNotReady { address: String },
    Empty,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateWorker { address } => {
                write!(f, "duplicate worker identity {address}")
            }
            Self::WorkerNotReady { address } => write!(f, "worker {address} not ready"),
            Self::Empty => write!(f, "cannot dequeue from an empty worker pool"),
        }
    }
}

impl std::error::Error for PoolError {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerRecord {
    pub address: String,
    pub expires_at: u64,
}

// `order` is keyed by a rising sequence number, so its first entry routes next.
pub struct WorkerPool {
    clock: Arc<dyn Clock>,
    liveness_window_ms: u64,
    next_sequence: u64,
    order: BTreeMap<u64, WorkerRecord>,
    index: HashMap<String, u64>,
}

impl WorkerPool {
    pub fn new(clock: Arc<dyn Clock>, liveness_window_ms: u64) -> Self {
        Self {
            clock,
            liveness_window_ms,
            next_sequence: 0,
            order: BTreeMap::new(),
            index: HashMap::new(),
        }
    }

    pub fn append(&mut self, address: &str) -> Result<(), PoolError> {
        if self.index.contains_key(address) {
            return Err(PoolError::DuplicateWorker {
                address: address.to_owned(),
            });
        }

        self.push_tail(address.to_owned());
        Ok(())
    }

    pub fn delete(&mut self, address: &str) -> bool {
        match self.index.remove(address) {
            Some(sequence) => {
                self.order.remove(&sequence);
                true
            }
            None => false,
        }
    }

    pub fn refresh(&mut self, address: &str) -> Result<(), PoolError> {
        let sequence = self
            .index
            .remove(address)
            .ok_or_else(|| PoolError::WorkerNotReady {
                address: address.to_owned(),
            })?;
        let record = self.order.remove(&sequence);
        debug_assert!(record.is_some(), "pool index out of sync for {address}");

        self.push_tail(address.to_owned());
        Ok(())
    }

    pub fn dequeue_front(&mut self) -> Result<String, PoolError> {
        let (_, record) = self.order.pop_first().ok_or(PoolError::Empty)?;
        self.index.remove(&record.address);
        Ok(record.address)
    }

    // Strictly before `now_ms`; a worker expiring exactly now survives.
    pub fn purge_expired(&mut self, now_ms: u64) -> Vec<String> {
        let mut evicted = Vec::new();
        self.order.retain(|_, record| {
            if record.expires_at < now_ms {
                evicted.push(record.address.clone());
                false
            } else {
                true
            }
        });

        for address in &evicted {
            self.index.remove(address);
        }

        evicted
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[cfg(test)]
    pub fn contains(&self, address: &str) -> bool {
        self.index.contains_key(address)
    }

    #[cfg(test)]
    pub fn expires_at(&self, address: &str) -> Option<u64> {
        let sequence = self.index.get(address)?;
        self.order.get(sequence).map(|record| record.expires_at)
    }

    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.order.values().map(|record| record.address.as_str())
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> Vec<WorkerRecord> {
        self.order.values().cloned().collect()
    }

    fn push_tail(&mut self, address: String) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let expires_at = self.clock.now_ms().saturating_add(self.liveness_window_ms);
        self.index.insert(address.clone(), sequence);
        self.order.insert(
            sequence,
            WorkerRecord {
                address,
                expires_at,
            },
        );
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("liveness_window_ms", &self.liveness_window_ms)
            .field("records", &self.order.values().collect::<Vec<_>>())
            .field("clock", &"<dyn Clock>")
            .finish()
    }
}
