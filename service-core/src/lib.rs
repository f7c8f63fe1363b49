pub mod config;
pub mod error;
pub mod grpc;
pub mod observability;

pub use serde;
pub use serde_json;
pub use tokio;
pub use tracing;
