//! HTTP gateway for CodeGenesis.
//!
//! Serves the authenticated project, preview, profile, key and agent
//! conversation APIs the dashboard talks to. Persistence, identity and code
//! generation are delegated to the collaborators in `codegenesis-providers`.

pub mod auth;
pub mod error;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod rate_limit;
pub mod routes;
pub mod server;
pub mod state;
pub mod templates;
pub mod vault;

pub use server::{build_router, start_gateway};
pub use state::GatewayState;
