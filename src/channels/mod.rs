//! Channel abstraction for message I/O.

pub mod adapter;
pub mod bridge;
pub mod filters;
pub mod listener;
pub mod memory;
pub mod shared;

pub use adapter::*;
pub use bridge::HttpBridgeAdapter;
pub use listener::{ListenerConfig, ListenerCursor, MessageListener};
pub use memory::InMemoryAdapter;
pub use shared::SharedAdapter;
