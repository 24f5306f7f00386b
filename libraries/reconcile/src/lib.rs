//! This is a library for reconciling survey datasets that were edited offline on several devices.
//!
//! Reconciliation strategy:
//! 1. Every domain object that matters for conflict resolution is a "versioned entity": it carries an `id`,
//!    `createdAt`, `updatedAt` and a monotonically increasing `version`.
//! 2. When a device saves, it "touches" the whole tree under the save point, bumping every version in it.
//!    (There is no per-field diffing. Versions inflate, merges get more frequent, but nothing is ever missed.)
//! 3. A device sends its whole dataset to the authority. The authority merges it into what it has stored,
//!    persists the result and hands it back (and to everyone else who is listening).
//! 4. The device merges that result into its *current* local state, since the user may have kept typing
//!    while the request was in flight. Edits the authority hasn't seen yet are carried over the merge
//!    with [`rebase_dataset`].
//!
//! The merge is an explicit last-writer-wins tree merge, not a CRDT. In particular, deletions do not propagate:
//! a list member that one side dropped survives a merge with a side that still has it.

mod dataset;
mod error;
pub mod identity;
pub mod merge;
pub mod protocol;
pub mod rebase;
pub mod storage;
pub mod tree;
pub mod version;

pub use dataset::{Dataset, Object};
pub use error::Error;
pub use merge::{merge, merge_dataset};
pub use rebase::{rebase, rebase_dataset};
pub use tree::Stamp;
pub use version::{compare_versioned, ensure, touch};
