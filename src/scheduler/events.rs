//! Typed message contract consumed/produced by the event loop (component E).
//! These are the Rust-native equivalents of the `op`-tagged wire messages in
//! §6; the transport layer (`net`) is responsible for framing them, the core
//! only ever sees these enums.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::common::{ClientId, Key, Payload, WorkerAddr};

/// A graph submission, already key-normalized by the caller (§6 key
/// normalization happens before this point -- see `common::id::RawKey`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GraphUpdate {
    pub tasks: HashMap<Key, Payload>,
    pub dependencies: HashMap<Key, HashSet<Key>>,
    pub keys: Vec<Key>,
    pub client: ClientId,
    pub restrictions: Option<HashMap<Key, HashSet<String>>>,
    pub loose_restrictions: Option<HashSet<Key>>,
}

/// Everything a client can send the scheduler.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ClientCommand {
    RegisterClient,
    UpdateGraph(GraphUpdate),
    MissingData { missing: Vec<Key> },
    CloseStream,
    Close,
    Feed {
        sampler: String,
        interval_millis: u64,
    },
}

/// Everything a worker can report back.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum WorkerReply {
    AddWorker {
        address: WorkerAddr,
        ncores: usize,
        keys: Option<Vec<Key>>,
    },
    RemoveWorker {
        address: WorkerAddr,
    },
    TaskFinished {
        key: Key,
        worker: WorkerAddr,
        nbytes: u64,
        type_: String,
    },
    TaskErred {
        key: Key,
        worker: WorkerAddr,
        exception: String,
        traceback: String,
    },
    AddKeys {
        worker: WorkerAddr,
        keys: Vec<Key>,
    },
    RemoveKeys {
        worker: WorkerAddr,
        keys: Vec<Key>,
    },
    Heartbeat {
        worker: WorkerAddr,
    },
}

/// One item off either input stream (§4.E: "two logical input streams").
/// Registering a client or worker's outbound queue happens out of band
/// (the transport layer is the only thing that holds the channel handle);
/// these variants only carry the graph-affecting part of the protocol.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Event {
    Client(ClientId, ClientCommand),
    Worker(WorkerReply),
    RemoveClient(ClientId),
}

/// Outbound notification, delivered on a client's report queue.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ClientNotification {
    StreamStart,
    KeyInMemory {
        key: Key,
        type_: String,
        workers: Vec<WorkerAddr>,
    },
    TaskErred {
        key: Key,
        exception: String,
        traceback: String,
    },
    LostData {
        key: Key,
    },
    StreamClosed,
    /// Result of a `feed` subscription tick (§4.F); the payload is whatever
    /// the named sampler produced, already serialized.
    Feed {
        data: serde_json::Value,
    },
    /// A submitted graph could not be scheduled at all (e.g. `NoMatchingWorker`).
    UpdateGraphFailed {
        reason: String,
    },
}

/// Outbound instruction, delivered on a worker's compute queue.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum WorkerCommand {
    ComputeTask { key: Key, payload: Payload },
    ReleaseKeys { keys: Vec<Key> },
}
