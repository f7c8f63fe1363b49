//! gRPC server builder utilities.
//!
//! Standard server construction shared by the fleet: HTTP/2 keepalive,
//! per-connection concurrency limits and gRPC reflection.

use std::time::Duration;

use tonic::transport::Server;
use tonic_reflection::server::v1::{ServerReflection, ServerReflectionServer};

/// Builder for configuring a gRPC server with the fleet defaults.
pub struct GrpcServerBuilder {
    service_name: String,
    http2_keepalive_interval: Option<Duration>,
    http2_keepalive_timeout: Option<Duration>,
    concurrency_limit: Option<usize>,
}

impl GrpcServerBuilder {
    /// Create a new server builder for the given service name.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            http2_keepalive_interval: Some(Duration::from_secs(30)),
            http2_keepalive_timeout: Some(Duration::from_secs(10)),
            concurrency_limit: None,
        }
    }

    /// Set HTTP/2 keepalive interval.
    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.http2_keepalive_interval = Some(interval);
        self
    }

    /// Set HTTP/2 keepalive timeout.
    pub fn with_keepalive_timeout(mut self, timeout: Duration) -> Self {
        self.http2_keepalive_timeout = Some(timeout);
        self
    }

    /// Set the per-connection concurrency limit.
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = Some(limit);
        self
    }

    /// Get the service name.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Build a tonic `Server` with the configured settings.
    pub fn build_server(&self) -> Server {
        let mut server = Server::builder();

        if let Some(interval) = self.http2_keepalive_interval {
            server = server.http2_keepalive_interval(Some(interval));
        }

        if let Some(timeout) = self.http2_keepalive_timeout {
            server = server.http2_keepalive_timeout(Some(timeout));
        }

        if let Some(limit) = self.concurrency_limit {
            server = server.concurrency_limit_per_connection(limit);
        }

        server
    }
}

/// Create a gRPC reflection service from encoded file descriptor sets.
pub fn reflection_service(
    descriptor_sets: &[&'static [u8]],
) -> Result<ServerReflectionServer<impl ServerReflection>, tonic_reflection::server::Error> {
    let mut builder = tonic_reflection::server::Builder::configure();
    for set in descriptor_sets {
        builder = builder.register_encoded_file_descriptor_set(set);
    }
    builder.build_v1()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_keeps_service_name() {
        let builder = GrpcServerBuilder::new("auth-service").with_concurrency_limit(64);
        assert_eq!(builder.service_name(), "auth-service");
    }
}
