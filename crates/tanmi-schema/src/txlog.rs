use serde::{Deserialize, Serialize};

/// One step of a `link` transaction. `source`/`target` are absolute paths;
/// their meaning is inverted on replay (`inverse()` below) rather than
/// carrying a separate undo payload, since every operation here is its own
/// reverse given the same two paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub operation: Operation,
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Unlink,
    Link,
    Replace,
    Absorb,
}

impl TransactionRecord {
    pub fn new(operation: Operation, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            operation,
            source: source.into(),
            target: target.into(),
        }
    }

    /// The record that undoes this one, for strict-reverse replay.
    ///
    /// - `link` (symlink created at `source` pointing at `target`) undoes to
    ///   `unlink` of that same `source`.
    /// - `replace` (a local directory at `source` was dropped and replaced
    ///   by a link into `target`) undoes to `unlink`; the original directory
    ///   contents are not recoverable from the log alone, matching the
    ///   transaction log's scope (crash recovery undoes the *link*, not a
    ///   content loss that already happened synchronously).
    /// - `absorb` (content moved from `source` into `target`) undoes to a
    ///   reverse move, `target` back to `source`.
    /// - `unlink` (a link at `source` was removed) undoes to recreating the
    ///   link at `source` pointing at `target`.
    pub fn inverse(&self) -> TransactionRecord {
        match self.operation {
            Operation::Link | Operation::Replace => {
                TransactionRecord::new(Operation::Unlink, self.source.clone(), self.target.clone())
            }
            Operation::Unlink => {
                TransactionRecord::new(Operation::Link, self.source.clone(), self.target.clone())
            }
            Operation::Absorb => {
                TransactionRecord::new(Operation::Absorb, self.target.clone(), self.source.clone())
            }
        }
    }
}
