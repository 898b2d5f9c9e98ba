//! The scheduler core: graph state (A), worker selection (B), lifecycle
//! transitions (C), the healer (D), the event loop (E), the feed service
//! (F), and the broadcast auxiliary (G).

pub mod broadcast;
pub mod events;
pub mod feed;
pub mod graph;
pub mod heal;
pub mod lifecycle;
pub mod selector;

pub use broadcast::broadcast;
pub use events::{ClientCommand, ClientNotification, Event, GraphUpdate, WorkerCommand, WorkerReply};
pub use feed::FeedService;
pub use graph::{ConsistencyCheck, ErredInfo, GraphState, DEBUG_CHECK_CONSISTENCY};
pub use heal::{heal, heal_missing_data};
pub use lifecycle::Engine;
pub use selector::decide_worker;
