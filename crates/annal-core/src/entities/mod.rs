//! Records produced and read by the audit engine.
//!
//! - `Revision` rows live in the revisions table.
//! - `AuditRow`s live in the per-entity shadow tables.
//! - `AuditedEntity` is an entity reconstructed at a past revision.

mod audit_row;
mod audited_entity;
mod revision;

pub use audit_row::AuditRow;
pub use audited_entity::AuditedEntity;
pub use revision::Revision;
