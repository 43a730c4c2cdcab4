//! Incident lifecycle management
//!
//! Owns every mutation of an incident record. Status moves forward only:
//!
//! ```text
//! NEW ──┐
//!       ├─ update ─> IN_PROGRESS ─ resolve ─> RESOLVED ─ close ─> CLOSED
//! ASSIGNED ┘
//! ```
//!
//! Derived composite keys are recomputed on every write.

mod service;

pub use service::{
    BatchCreateError, BatchCreateResult, IncidentLifecycle, IncidentPage, PageRequest,
    SearchFilter,
};
