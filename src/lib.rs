//! `skein`: a task scheduler for a distributed computation cluster. Holds the
//! graph state, decides where tasks run, and drives workers to completion.
//! Does not execute tasks itself -- that is a worker's job, and wire
//! transport is deliberately thin (see `net`).

pub mod common;
pub mod config;
pub mod errors;
pub mod logging;
pub mod net;
pub mod scheduler;

pub use errors::{Error, ErrorKind, Result};

/// Wire protocol version, bumped whenever a message shape in `scheduler::events`
/// or `net::codec` changes incompatibly.
pub const PROTOCOL_VERSION: u32 = 1;
