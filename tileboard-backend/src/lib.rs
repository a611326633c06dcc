/// Tileboard backend: write endpoints, backend clients, realtime feed.
pub mod api;
pub mod client;
pub mod config;
pub mod log_bridge;
pub mod realtime;
pub mod server;
pub mod state;
pub mod store;
pub mod view;
