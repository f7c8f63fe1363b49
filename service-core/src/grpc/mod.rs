//! gRPC utilities shared across services.

pub mod error;
pub mod server;

pub use error::{GrpcResult, IntoStatus};
pub use server::{reflection_service, GrpcServerBuilder};
