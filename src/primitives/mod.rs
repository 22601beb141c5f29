//! Primitives - The description vocabulary.
//!
//! Components return [`Node`] values built from these pieces:
//! - [`h`] - Host element (`div`, `span`, ...)
//! - [`component`] / [`component_of`] - Function component element
//! - [`class`] - Class component element
//! - [`fragment`] - Children without a wrapping host node
//! - [`text`] - Text content (plain `&str`, `String` and numbers convert too)
//!
//! # Identity
//!
//! Elements are matched across renders by `(key, type)`. Keys come from
//! [`ElementBuilder::key`]; without one the position among siblings is used.
//! Types compare by host tag, function pointer / closure allocation, or
//! class `TypeId`.

mod element;
mod types;

pub use element::*;
pub use types::*;
