use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global resource key counter
static NEXT_RESOURCE_KEY: AtomicU64 = AtomicU64::new(1);

/// Identity under which a resource is bound in a transaction registry.
///
/// Session factories and data sources each allocate one at construction, so
/// "one factory ⇒ one session per transaction" falls out of the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey(u64);

impl ResourceKey {
    /// Allocate a fresh, process-unique key
    pub fn new() -> Self {
        ResourceKey(NEXT_RESOURCE_KEY.fetch_add(1, Ordering::SeqCst))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ResourceKey {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "resource_{}", self.0)
    }
}

/// Statement execution strategy, fixed for the lifetime of a session holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutorMode {
    #[default]
    Simple,
    Reuse,
    Batch,
}

impl std::fmt::Display for ExecutorMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutorMode::Simple => write!(f, "SIMPLE"),
            ExecutorMode::Reuse => write!(f, "REUSE"),
            ExecutorMode::Batch => write!(f, "BATCH"),
        }
    }
}

impl std::str::FromStr for ExecutorMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SIMPLE" => Ok(ExecutorMode::Simple),
            "REUSE" => Ok(ExecutorMode::Reuse),
            "BATCH" => Ok(ExecutorMode::Batch),
            other => Err(format!("Unknown executor mode: {}", other)),
        }
    }
}

/// Offset/limit window applied to a select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowBounds {
    pub offset: usize,
    pub limit: usize,
}

impl RowBounds {
    pub const DEFAULT: RowBounds = RowBounds {
        offset: 0,
        limit: usize::MAX,
    };

    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }
}

impl Default for RowBounds {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Outcome of one flushed batch statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    pub statement: String,
    pub update_counts: Vec<u64>,
}

impl BatchResult {
    pub fn new(statement: impl Into<String>, update_counts: Vec<u64>) -> Self {
        Self {
            statement: statement.into(),
            update_counts,
        }
    }
}

/// Forward-only, buffered result cursor.
#[derive(Debug)]
pub struct Cursor {
    rows: std::vec::IntoIter<Value>,
    position: usize,
    open: bool,
}

impl Cursor {
    pub fn new(rows: Vec<Value>) -> Self {
        Self {
            rows: rows.into_iter(),
            position: 0,
            open: true,
        }
    }

    /// Number of rows handed out so far
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn close(&mut self) {
        self.open = false;
    }
}

impl Iterator for Cursor {
    type Item = Value;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.open {
            return None;
        }
        match self.rows.next() {
            Some(row) => {
                self.position += 1;
                Some(row)
            }
            None => {
                self.open = false;
                None
            }
        }
    }
}
