//! Wire transport: framing (`codec`) plus the TCP accept loop (`listener`)
//! that drives the single-writer [`scheduler::lifecycle::Engine`](crate::scheduler::lifecycle::Engine).

pub mod codec;
pub mod listener;

pub use codec::MessageCodec;
pub use listener::{serve, Inbound};
