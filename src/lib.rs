#![deny(missing_docs)]

//! This crate implements an in-memory ordered map, [BTreeMap], backed by a B-tree.
//!
//! Nodes hold between `B-1` and `2B-1` keys (the root may hold fewer). Insertion splits
//! full nodes and promotes the median; removal borrows from or merges with siblings.
//! Both walk an explicit path stack rather than recursing, and iteration uses its own
//! explicit stack, so no operation's call depth depends on the height of the tree.
//!
//! Keys are ordered through the [KeyOrd] trait, nodes are allocated through an
//! [`allocator_api2`] allocator and allocation failure is reported as [Error::Alloc].
//!
//! Most of the implementation is in the [gb] module, see [gb::BTreeMap].
//!
//! # Example
//!
//! ```
//!     use btree_store::BTreeMap;
//!     let mut mymap = BTreeMap::new();
//!     mymap.fetch_put("England", "London")?;
//!     mymap.fetch_put("France", "Paris")?;
//!     assert_eq!(mymap.get(&"France"), Some(&"Paris"));
//!     assert_eq!(mymap.fetch_remove(&"England"), Some(("England", "London")));
//! # Ok::<(), btree_store::Error>(())
//! ```
//!
//!# Features
//!
//! This crate supports the following cargo features:
//! - `unsafe-optim` : skips bounds assertions on node storage in release builds.

/// Module with version of BTreeMap that allows B to be specified as generic constant.
pub mod gb;

mod error;
mod node;
mod ord;
mod vecs;

pub use error::{Error, NodeKind, Result};
pub use ord::KeyOrd;

/// Default B value, giving nodes a capacity of 11 keys.
pub const DB: usize = 6;

/// BTreeMap with default branching parameter [DB], using the global allocator.
pub type BTreeMap<K, V> = gb::BTreeMap<K, V, DB>;

/// Iterator returned by [BTreeMap::iter].
pub type Iter<'a, K, V> = gb::Iter<'a, K, V, DB>;

/// Iterator returned by [BTreeMap::keys].
pub type Keys<'a, K, V> = gb::Keys<'a, K, V, DB>;

/// Iterator returned by [BTreeMap::values].
pub type Values<'a, K, V> = gb::Values<'a, K, V, DB>;

// Tests.

/* mimalloc cannot be used with miri */
#[cfg(all(test, not(miri)))]
use mimalloc::MiMalloc;

#[cfg(all(test, not(miri)))]
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[cfg(test)]
mod mytests;

#[cfg(test)]
mod proptests;
