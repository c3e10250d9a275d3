//! Error types.

use std::fmt;

/// Result type for fallible map operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Which kind of node an allocation was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Node without children.
    Leaf,
    /// Node with `len + 1` children.
    Internal,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Leaf => f.write_str("leaf"),
            NodeKind::Internal => f.write_str("internal"),
        }
    }
}

/// Errors returned by [`BTreeMap`](crate::gb::BTreeMap) operations.
///
/// Absence of a key is not an error, it is reported as `None`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The allocator could not provide memory for a new node.
    ///
    /// The map is left exactly as it was before the failed call.
    #[error("allocation of {kind} node failed")]
    Alloc {
        /// Kind of node that was being created.
        kind: NodeKind,
    },
}
