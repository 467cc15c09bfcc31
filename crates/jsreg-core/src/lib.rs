//! # jsreg-core - Foundational Types
//!
//! Leaf crate of the jsreg workspace. It owns the pieces of the schema
//! registry that do not depend on a validation engine or on the network:
//!
//! - [`OrderedSet`]: a set of named items with "must run after" edges,
//!   iterated in a stable topological order. The schema registry keeps its
//!   pre- and post-validation transforms in two of these.
//! - [`JsonPointer`]: RFC 6901 paths used to locate nodes while visiting a
//!   JSON tree and to report where a violation occurred.
//! - [`OrderError`]: the failure modes of dependency ordering.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `jsreg-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod error;
pub mod ordered;
pub mod pointer;

pub use error::OrderError;
pub use ordered::OrderedSet;
pub use pointer::JsonPointer;
