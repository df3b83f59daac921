//! Job-group event stream client.
//!
//! Provides the gateway REST client, the per-group stream connection
//! with keepalive, jittered reconnection, and the multiplexed
//! [`JobGroupRegistry`](registry::JobGroupRegistry) that keeps one live
//! stream per tracked job group.

pub mod api;
pub mod callbacks;
pub mod config;
pub mod connection;
pub mod keepalive;
pub mod reconnect;
pub mod registry;
pub mod transport;
pub mod watcher;
