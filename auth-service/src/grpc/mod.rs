//! gRPC service implementations for auth-service.

pub mod auth_service;
pub mod domain_service;
pub mod policy_service;

// Include the generated proto code
pub mod proto {
    pub mod auth {
        tonic::include_proto!("gridmesh.auth.v1");

        // File descriptor set for gRPC reflection
        pub const FILE_DESCRIPTOR_SET: &[u8] =
            tonic::include_file_descriptor_set!("auth_service_descriptor");
    }

    pub mod relation {
        tonic::include_proto!("gridmesh.relation.v1");
    }
}

pub use auth_service::AuthServiceImpl;
pub use domain_service::DomainServiceImpl;
pub use policy_service::PolicyServiceImpl;

use service_core::grpc::IntoStatus;
use tonic::Status;

use crate::models::PolicyReq;
use crate::services::AuthError;

impl IntoStatus for AuthError {
    fn into_status(self) -> Status {
        let message = self.to_string();
        match self {
            AuthError::Authentication | AuthError::KeyExpired => {
                Status::unauthenticated(message)
            }
            AuthError::Authorization | AuthError::DomainAuthorization => {
                Status::permission_denied(message)
            }
            AuthError::NotFound => Status::not_found(message),
            AuthError::Conflict => Status::already_exists(message),
            AuthError::InvalidPolicy(_) | AuthError::InvalidStatus | AuthError::Malformed(_) => {
                Status::invalid_argument(message)
            }
            AuthError::CreateEntity(err)
            | AuthError::UpdateEntity(err)
            | AuthError::ViewEntity(err)
            | AuthError::RemoveEntity(err)
            | AuthError::Rollback(err) => {
                // Log the full error but don't expose it to clients
                tracing::error!(error = %err, "Store failure");
                Status::internal("Internal server error")
            }
        }
    }
}

impl From<AuthError> for Status {
    fn from(err: AuthError) -> Self {
        err.into_status()
    }
}

pub(crate) fn to_policy_req(pr: proto::auth::PolicyReq) -> PolicyReq {
    PolicyReq {
        domain: pr.domain,
        subject: pr.subject,
        subject_type: pr.subject_type,
        subject_kind: pr.subject_kind,
        subject_relation: pr.subject_relation,
        relation: pr.relation,
        permission: pr.permission,
        object: pr.object,
        object_kind: pr.object_kind,
        object_type: pr.object_type,
    }
}

pub(crate) fn to_proto_policy(pr: PolicyReq) -> proto::auth::PolicyReq {
    proto::auth::PolicyReq {
        domain: pr.domain,
        subject: pr.subject,
        subject_type: pr.subject_type,
        subject_kind: pr.subject_kind,
        subject_relation: pr.subject_relation,
        relation: pr.relation,
        permission: pr.permission,
        object: pr.object,
        object_kind: pr.object_kind,
        object_type: pr.object_type,
    }
}
