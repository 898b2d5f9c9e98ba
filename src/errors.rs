//! Crate-wide error type. One `error_chain!` family, mirroring the rest of the
//! state store and lifecycle engine which propagate with `?`/`bail!` and only
//! `unwrap()` on invariant checks considered non-recoverable.

use error_chain::error_chain;

error_chain! {
    errors {
        /// `decide_worker` could not satisfy a hard restriction.
        NoMatchingWorker(key: String) {
            description("no worker matches the restrictions for this key")
            display("no worker matches the restrictions for key {}", key)
        }
        /// Reference to a worker address the graph has never seen.
        UnknownWorker(addr: String) {
            description("unknown worker")
            display("unknown worker {}", addr)
        }
        /// Reference to a client id the graph has never registered.
        UnknownClient(id: String) {
            description("unknown client")
            display("unknown client {}", id)
        }
        /// Reference to a key the graph has never seen.
        UnknownKey(key: String) {
            description("unknown key")
            display("unknown key {}", key)
        }
        /// A `validate()` failure: a bug in the scheduler, not a user-visible condition.
        InvariantViolation(diagnostic: String) {
            description("scheduler invariant violated")
            display("invariant violation: {}", diagnostic)
        }
        /// A single inbound message failed to parse; the session stays open.
        Serialization(diagnostic: String) {
            description("failed to deserialize a wire message")
            display("serialization error: {}", diagnostic)
        }
    }

    foreign_links {
        Io(::std::io::Error);
        Json(::serde_json::Error);
        AddrParse(::std::net::AddrParseError);
    }
}
