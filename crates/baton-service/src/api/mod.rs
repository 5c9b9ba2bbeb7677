//! API surfaces exposed by the daemon

pub mod rest;

pub use rest::create_router;
