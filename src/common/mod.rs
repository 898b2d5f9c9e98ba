//! Small shared vocabulary used by both the graph state store and the
//! transport scaffolding: identifiers and the opaque task payload. Kept
//! separate from `scheduler` so the wire-level types don't depend on the
//! graph engine.

pub mod id;
pub mod payload;

pub use self::id::{ClientId, Key, RawKey, WorkerAddr};
pub use self::payload::{dumps_task, CallSpec, Payload};
