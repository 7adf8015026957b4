//! API endpoint handlers.
//!
//! Handlers are thin: they parse the request, call the engine for the
//! session principal and map errors through `ApiError`.

pub mod archive;
pub mod health;
pub mod patients;
