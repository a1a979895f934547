//! Record of client invocations, kept for correlating server errors.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

/// Metadata of one [`invoke`](crate::SignalRClient::invoke) call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationRecord {
    pub index: u64,
    pub hub_name: String,
    pub method: String,
    pub data: Vec<Value>,
}

#[derive(Debug, Default)]
struct LogState {
    next_index: u64,
    records: BTreeMap<u64, InvocationRecord>,
}

/// Append-only log keyed by a monotonic index.
///
/// Indices start at 0 and are never reused. With a retention limit the
/// oldest records are evicted once the log grows past it; without one the
/// log grows for the lifetime of the connection.
#[derive(Debug)]
pub(crate) struct InvocationLog {
    retention: Option<usize>,
    state: Mutex<LogState>,
}

impl InvocationLog {
    pub(crate) fn new(retention: Option<usize>) -> Self {
        Self {
            retention,
            state: Mutex::new(LogState::default()),
        }
    }

    /// Allocates the next index and stores the record under it.
    pub(crate) fn record(&self, hub_name: &str, method: &str, data: Vec<Value>) -> u64 {
        let mut state = self.state.lock();
        let index = state.next_index;
        state.next_index += 1;
        state.records.insert(
            index,
            InvocationRecord {
                index,
                hub_name: hub_name.to_string(),
                method: method.to_string(),
                data,
            },
        );
        if let Some(limit) = self.retention {
            while state.records.len() > limit {
                state.records.pop_first();
            }
        }
        index
    }

    /// Looks up a record. Negative and unknown indices yield `None`.
    pub(crate) fn get(&self, index: i64) -> Option<InvocationRecord> {
        let index = u64::try_from(index).ok()?;
        self.state.lock().records.get(&index).cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_indices_are_monotonic() {
        let log = InvocationLog::new(None);
        let indices: Vec<u64> = (0..5)
            .map(|i| log.record("chat", &format!("m{i}"), vec![json!(i)]))
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert_eq!(log.len(), 5);
    }

    #[test]
    fn test_get_record() {
        let log = InvocationLog::new(None);
        log.record("chat", "send", vec![json!("x")]);
        let record = log.get(0).unwrap();
        assert_eq!(record.hub_name, "chat");
        assert_eq!(record.method, "send");
        assert_eq!(record.data, vec![json!("x")]);
        assert!(log.get(1).is_none());
        assert!(log.get(-1).is_none());
    }

    #[test]
    fn test_retention_evicts_oldest() {
        let log = InvocationLog::new(Some(2));
        for _ in 0..4 {
            log.record("chat", "send", Vec::new());
        }
        assert_eq!(log.len(), 2);
        assert!(log.get(1).is_none());
        assert!(log.get(2).is_some());
        assert!(log.get(3).is_some());
        assert_eq!(log.record("chat", "send", Vec::new()), 4);
    }
}
