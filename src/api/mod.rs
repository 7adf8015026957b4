//! HTTP surface for the patient records engines.
//!
//! Routes are nested under `/api/` and, apart from the health probe, run
//! behind a middleware stack: Principal → Access log → Handler.
//!
//! The router is composable: `api_router()` returns a `Router` that can be
//! mounted on any axum server instance.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use router::api_router;
pub use server::{start_api_server, ApiServer, ServerInfo};
pub use types::ApiContext;
