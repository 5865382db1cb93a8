//! Isolation levels

use optimist_core::StoreError;
use std::fmt;
use std::str::FromStr;

/// Isolation guaranteed to transactions
///
/// Levels are ordered: serializable implies snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum IsolationLevel {
    /// No read tracking; commits never conflict
    None,
    /// Reads see a consistent view; changes observed mid-transaction conflict
    Snapshot,
    /// Snapshot plus read/write conflicts with concurrently committed writers
    #[default]
    Serializable,
}

impl IsolationLevel {
    /// True if reads are recorded
    pub fn is_snapshot(self) -> bool {
        self >= IsolationLevel::Snapshot
    }

    /// True if forward-marked conflicts abort the commit
    pub fn is_serializable(self) -> bool {
        self == IsolationLevel::Serializable
    }

    /// Lowercase name as used in configuration files
    pub fn as_str(self) -> &'static str {
        match self {
            IsolationLevel::None => "none",
            IsolationLevel::Snapshot => "snapshot",
            IsolationLevel::Serializable => "serializable",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IsolationLevel {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(IsolationLevel::None),
            "snapshot" => Ok(IsolationLevel::Snapshot),
            "serializable" => Ok(IsolationLevel::Serializable),
            other => Err(StoreError::invalid_input(format!(
                "unknown isolation level '{}': expected none, snapshot or serializable",
                other
            ))),
        }
    }
}
