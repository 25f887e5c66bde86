pub mod events;
pub mod ids;
pub mod models;

pub use ids::{RoomId, UserId};
