use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Duration;
use tokio::signal;

use auth_service::config::AuthConfig;
use auth_service::db::{
    self, PostgresDomainRepository, PostgresKeyRepository, PostgresPolicyRepository,
};
use auth_service::grpc::proto::auth::auth_service_server::AuthServiceServer;
use auth_service::grpc::proto::auth::domain_service_server::DomainServiceServer;
use auth_service::grpc::proto::auth::policy_service_server::PolicyServiceServer;
use auth_service::grpc::{proto, AuthServiceImpl, DomainServiceImpl, PolicyServiceImpl};
use auth_service::services::{AuthService, RelationEngineAgent, Tokenizer};
use service_core::grpc::{reflection_service, GrpcServerBuilder};
use service_core::observability::init_tracing;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Load configuration - fail fast if invalid
    let config = AuthConfig::from_env()?;

    init_tracing(&config.service_name, &config.log_level);

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting authorization service"
    );

    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool).await?;

    let keys = Arc::new(PostgresKeyRepository::new(pool.clone()));
    let domains = Arc::new(PostgresDomainRepository::new(pool.clone()));
    let policies = Arc::new(PostgresPolicyRepository::new(pool.clone()));
    let agent = Arc::new(RelationEngineAgent::connect(&config.relation_engine.endpoint).await?);
    let tokenizer = Tokenizer::new(config.token.secret.as_bytes());

    let svc = AuthService::new(
        keys,
        domains,
        policies,
        agent,
        tokenizer,
        Duration::minutes(config.token.access_duration_minutes),
        Duration::hours(config.token.refresh_duration_hours),
        Duration::hours(config.token.invitation_duration_hours),
    );

    let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<AuthServiceServer<AuthServiceImpl>>()
        .await;

    let reflection = reflection_service(&[proto::auth::FILE_DESCRIPTOR_SET])?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.grpc_port));
    tracing::info!("gRPC server listening on {}", addr);

    GrpcServerBuilder::new(&config.service_name)
        .build_server()
        .add_service(health_service)
        .add_service(reflection)
        .add_service(AuthServiceServer::new(AuthServiceImpl::new(svc.clone())))
        .add_service(PolicyServiceServer::new(PolicyServiceImpl::new(svc.clone())))
        .add_service(DomainServiceServer::new(DomainServiceImpl::new(svc)))
        .serve_with_shutdown(addr, shutdown_signal())
        .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
