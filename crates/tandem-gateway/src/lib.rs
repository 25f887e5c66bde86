pub mod aggregator;
pub mod connection;
pub mod coordinator;
pub mod error;
pub mod hub;
pub mod listener;
pub mod presence;
pub mod router;
pub mod store;

pub use coordinator::Relay;
pub use hub::{ConnId, Hub};
