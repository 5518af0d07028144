//! HTTP surface: router construction, request/response types, and the
//! server bind/serve lifecycle, kept as separate concerns per module.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use error::ApiError;
pub use router::build_router;
pub use server::serve;
pub use types::ApiContext;
