//! gRPC implementation of AuthService.

use chrono::DateTime;
use service_core::grpc::IntoStatus;
use tonic::{Request, Response, Status};

use crate::grpc::proto::auth as pb;
use crate::grpc::to_policy_req;
use crate::models::{Key, KeyType, Token};
use crate::services::AuthService;

pub struct AuthServiceImpl {
    svc: AuthService,
}

impl AuthServiceImpl {
    pub fn new(svc: AuthService) -> Self {
        Self { svc }
    }
}

fn to_proto_token(token: Token) -> pb::Token {
    pb::Token {
        access_token: token.access_token,
        refresh_token: token.refresh_token,
        access_type: token.access_type,
    }
}

fn parse_key_type(tag: u32) -> Result<KeyType, Status> {
    KeyType::try_from(tag)
        .map_err(|tag| Status::invalid_argument(format!("unknown key type tag {tag}")))
}

#[tonic::async_trait]
impl pb::auth_service_server::AuthService for AuthServiceImpl {
    async fn issue(&self, request: Request<pb::IssueReq>) -> Result<Response<pb::Token>, Status> {
        let req = request.into_inner();
        let key = Key {
            key_type: parse_key_type(req.r#type)?,
            subject: req.subject,
            user: req.user,
            domain: req.domain_id,
            expires_at: req.expires_at.and_then(|t| DateTime::from_timestamp(t, 0)),
            ..Key::default()
        };

        let token = self
            .svc
            .issue(&req.token, key)
            .await
            .map_err(IntoStatus::into_status)?;
        Ok(Response::new(to_proto_token(token)))
    }

    async fn refresh(
        &self,
        request: Request<pb::RefreshReq>,
    ) -> Result<Response<pb::Token>, Status> {
        let req = request.into_inner();
        let key = Key {
            key_type: KeyType::Refresh,
            domain: req.domain_id,
            ..Key::default()
        };

        let token = self
            .svc
            .issue(&req.refresh_token, key)
            .await
            .map_err(IntoStatus::into_status)?;
        Ok(Response::new(to_proto_token(token)))
    }

    async fn revoke(
        &self,
        request: Request<pb::RevokeReq>,
    ) -> Result<Response<pb::RevokeRes>, Status> {
        let req = request.into_inner();
        self.svc
            .revoke(&req.token, &req.id)
            .await
            .map_err(IntoStatus::into_status)?;
        Ok(Response::new(pb::RevokeRes {}))
    }

    async fn retrieve_key(
        &self,
        request: Request<pb::RetrieveKeyReq>,
    ) -> Result<Response<pb::KeyRes>, Status> {
        let req = request.into_inner();
        let key = self
            .svc
            .retrieve_key(&req.token, &req.id)
            .await
            .map_err(IntoStatus::into_status)?;

        Ok(Response::new(pb::KeyRes {
            id: key.id,
            r#type: key.key_type as u32,
            subject: key.subject,
            issued_at: key.issued_at.timestamp(),
            expires_at: key.expires_at.map(|t| t.timestamp()),
        }))
    }

    async fn identify(
        &self,
        request: Request<pb::IdentityReq>,
    ) -> Result<Response<pb::IdentityRes>, Status> {
        let req = request.into_inner();
        let key = self
            .svc
            .identify(&req.token)
            .await
            .map_err(IntoStatus::into_status)?;

        Ok(Response::new(pb::IdentityRes {
            id: key.id,
            subject: key.subject,
            user: key.user,
            domain_id: key.domain,
        }))
    }

    async fn authorize(
        &self,
        request: Request<pb::AuthorizeReq>,
    ) -> Result<Response<pb::AuthorizeRes>, Status> {
        let req = request.into_inner();
        let policy = to_policy_req(req.policy.unwrap_or_default());
        self.svc
            .authorize(policy)
            .await
            .map_err(IntoStatus::into_status)?;
        Ok(Response::new(pb::AuthorizeRes { authorized: true }))
    }
}
