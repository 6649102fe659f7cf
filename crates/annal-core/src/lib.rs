//! # annal-core
//!
//! Core types shared by every annal crate.
//!
//! - Revision and entity identifiers
//! - Change kinds and field types
//! - Entity metadata (fields, identifier, associations)
//! - Revision, audit row and reconstructed entity structs
//! - Snapshot type and the pure snapshot diff
//! - Cross-cutting error types

pub mod entities;
pub mod enums;
pub mod errors;
pub mod ids;
pub mod metadata;
pub mod snapshot;
