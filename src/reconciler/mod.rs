//! Child Reconciler - Diff a node's old children against a new description.
//!
//! Produces the new work-in-progress child list of one node, reusing old
//! buffers where `(key, type)` matches and flagging what commit must do:
//!
//! - `PLACEMENT` on new or moved children
//! - `CHILD_DELETION` on the parent, with the deleted children in `deletions`
//!
//! # Pattern: keyed lists
//!
//! ```text
//! old:  a(0) b(1) c(2)        new: b a c
//!
//! b → reuse, old index 1 ≥ last_placed 0   → stays,  last_placed = 1
//! a → reuse, old index 0 < last_placed 1   → PLACEMENT (moved)
//! c → reuse, old index 2 ≥ last_placed 1   → stays,  last_placed = 2
//! ```
//!
//! A child only moves when its old index is behind something already kept,
//! which marks the fewest moves for the common cases without computing a
//! longest increasing subsequence.
//!
//! On mount (`track_side_effects == false`) nothing is flagged: the whole
//! subtree is inserted at once by the nearest placed ancestor.

mod child;

pub(crate) use child::ChildReconciler;
