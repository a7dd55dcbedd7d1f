//! Sparkit API server library.
//!
//! Exposes config, state, error handling, the router and its routes so the
//! binary entrypoint and integration tests build the exact same app.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
