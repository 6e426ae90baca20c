//! Library half of the supervisor binary: split out so integration tests
//! can exercise the Admin API router without going through `main`.

pub mod app_state;
pub mod auth;
pub mod config;
pub mod resources;
pub mod routes;
pub mod supervisor;
