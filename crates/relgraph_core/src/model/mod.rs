//! Record-level domain model.
//!
//! # Responsibility
//! - Define record identity, lifecycle and the canonical/local attribute
//!   overlay carried by every record.
//!
//! # Invariants
//! - Every record is identified by a stable `RecordKey`.
//! - Records never reference each other directly; relationships store keys.

pub mod key;
pub mod lifecycle;
pub mod record;
