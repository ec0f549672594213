//! runlet API server library.
//!
//! Exposes the building blocks (config, state, error handling, routes,
//! the run handler) so integration tests and the binary entrypoint share
//! the exact same stack.

pub mod config;
pub mod error;
pub mod handlers;
pub mod router;
pub mod routes;
pub mod state;
