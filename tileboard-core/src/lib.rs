//! Board model and client-side reconciliation for tileboard.
pub mod board;
pub mod error;
pub mod events;
pub mod grid;
pub mod media;
pub mod session;
pub mod store;
pub mod types;

pub use board::BoardState;
pub use error::{StoreError, StoreResult};
pub use session::BoardSession;
