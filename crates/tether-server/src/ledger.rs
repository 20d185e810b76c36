use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Bytes received so far for each in-flight upload, keyed by connection
/// identifier.
///
/// One slot per connection: a client has at most one tracked upload. An
/// entry exists only while a transfer is unfinished; it is dropped once the
/// declared size is reached and kept when the peer disconnects early so the
/// same identifier can resume.
#[derive(Debug, Default)]
pub struct TransferLedger {
    entries: Mutex<HashMap<String, i64>>,
}

impl TransferLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, i64>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Offset to resume from, creating a zero entry if none exists.
    /// Returns `(offset, resumed)`.
    pub fn begin(&self, conn_id: &str) -> (i64, bool) {
        let mut entries = self.entries();
        match entries.get(conn_id) {
            Some(&offset) => (offset, true),
            None => {
                entries.insert(conn_id.to_string(), 0);
                (0, false)
            }
        }
    }

    /// Add `len` bytes to the entry and return the new total.
    pub fn advance(&self, conn_id: &str, len: usize) -> i64 {
        let mut entries = self.entries();
        let received = entries.entry(conn_id.to_string()).or_insert(0);
        *received += len as i64;
        *received
    }

    pub fn get(&self, conn_id: &str) -> Option<i64> {
        self.entries().get(conn_id).copied()
    }

    /// Drop the entry; returns the last recorded offset.
    pub fn finish(&self, conn_id: &str) -> Option<i64> {
        self.entries().remove(conn_id)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_creates_then_resumes() {
        let ledger = TransferLedger::new();
        assert_eq!(ledger.begin("a"), (0, false));
        ledger.advance("a", 8192);
        assert_eq!(ledger.begin("a"), (8192, true));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn advance_accumulates_and_finish_removes() {
        let ledger = TransferLedger::new();
        ledger.begin("a");
        assert_eq!(ledger.advance("a", 100), 100);
        assert_eq!(ledger.advance("a", 50), 150);
        assert_eq!(ledger.get("a"), Some(150));
        assert_eq!(ledger.finish("a"), Some(150));
        assert_eq!(ledger.get("a"), None);
        assert!(ledger.is_empty());
    }

    #[test]
    fn connections_are_isolated() {
        let ledger = TransferLedger::new();
        ledger.begin("10.0.0.1:5000");
        ledger.begin("10.0.0.2:5000");
        ledger.advance("10.0.0.1:5000", 10);
        ledger.advance("10.0.0.2:5000", 20);
        ledger.finish("10.0.0.1:5000");
        assert_eq!(ledger.get("10.0.0.1:5000"), None);
        assert_eq!(ledger.get("10.0.0.2:5000"), Some(20));
    }
}
