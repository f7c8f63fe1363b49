//! gRPC implementation of DomainService.

use std::str::FromStr;

use service_core::grpc::IntoStatus;
use tonic::{Request, Response, Status};

use crate::grpc::proto::auth as pb;
use crate::models::{Domain, DomainReq, DomainStatus, DomainsPage, Page};
use crate::services::AuthService;

pub struct DomainServiceImpl {
    svc: AuthService,
}

impl DomainServiceImpl {
    pub fn new(svc: AuthService) -> Self {
        Self { svc }
    }
}

fn to_proto_domain(domain: Domain) -> pb::Domain {
    pb::Domain {
        id: domain.id,
        name: domain.name,
        alias: domain.alias,
        tags: domain.tags,
        metadata: if domain.metadata.is_null() {
            String::new()
        } else {
            domain.metadata.to_string()
        },
        status: domain.status,
        created_by: domain.created_by,
        created_at: domain.created_at.timestamp(),
        updated_by: domain.updated_by,
        updated_at: domain.updated_at.map(|t| t.timestamp()),
        permission: domain.permission.unwrap_or_default(),
    }
}

fn to_proto_page(page: DomainsPage) -> pb::DomainsPage {
    pb::DomainsPage {
        total: page.total,
        offset: page.offset,
        limit: page.limit,
        domains: page.domains.into_iter().map(to_proto_domain).collect(),
    }
}

fn parse_metadata(raw: &str) -> Result<serde_json::Value, Status> {
    if raw.is_empty() {
        return Ok(serde_json::Value::Object(Default::default()));
    }
    serde_json::from_str(raw)
        .map_err(|e| Status::invalid_argument(format!("malformed metadata: {e}")))
}

fn parse_status(raw: &str) -> Result<DomainStatus, Status> {
    DomainStatus::from_str(raw).map_err(|e| Status::invalid_argument(e))
}

fn parse_status_filter(raw: &str) -> Result<Option<DomainStatus>, Status> {
    if raw.is_empty() {
        return Ok(None);
    }
    parse_status(raw).map(Some)
}

#[tonic::async_trait]
impl pb::domain_service_server::DomainService for DomainServiceImpl {
    async fn create_domain(
        &self,
        request: Request<pb::CreateDomainReq>,
    ) -> Result<Response<pb::Domain>, Status> {
        let req = request.into_inner();
        let status = if req.status.is_empty() {
            DomainStatus::Enabled
        } else {
            parse_status(&req.status)?
        };
        let domain = Domain::new(
            req.name,
            req.alias,
            req.tags,
            parse_metadata(&req.metadata)?,
            status,
            String::new(),
        );

        let created = self
            .svc
            .create_domain(&req.token, domain)
            .await
            .map_err(IntoStatus::into_status)?;
        Ok(Response::new(to_proto_domain(created)))
    }

    async fn retrieve_domain(
        &self,
        request: Request<pb::RetrieveDomainReq>,
    ) -> Result<Response<pb::Domain>, Status> {
        let req = request.into_inner();
        let domain = self
            .svc
            .retrieve_domain(&req.token, &req.id)
            .await
            .map_err(IntoStatus::into_status)?;
        Ok(Response::new(to_proto_domain(domain)))
    }

    async fn retrieve_domain_permissions(
        &self,
        request: Request<pb::RetrieveDomainPermissionsReq>,
    ) -> Result<Response<pb::Permissions>, Status> {
        let req = request.into_inner();
        let permissions = self
            .svc
            .retrieve_domain_permissions(&req.token, &req.id)
            .await
            .map_err(IntoStatus::into_status)?;
        Ok(Response::new(pb::Permissions { permissions }))
    }

    async fn update_domain(
        &self,
        request: Request<pb::UpdateDomainReq>,
    ) -> Result<Response<pb::Domain>, Status> {
        let req = request.into_inner();
        let patch = DomainReq {
            name: req.name,
            alias: req.alias,
            tags: (!req.tags.is_empty()).then_some(req.tags),
            metadata: match req.metadata.as_deref() {
                Some(raw) => Some(parse_metadata(raw)?),
                None => None,
            },
            status: None,
        };

        let updated = self
            .svc
            .update_domain(&req.token, &req.id, patch)
            .await
            .map_err(IntoStatus::into_status)?;
        Ok(Response::new(to_proto_domain(updated)))
    }

    async fn change_domain_status(
        &self,
        request: Request<pb::ChangeDomainStatusReq>,
    ) -> Result<Response<pb::Domain>, Status> {
        let req = request.into_inner();
        let patch = DomainReq {
            status: Some(parse_status(&req.status)?),
            ..DomainReq::default()
        };

        let updated = self
            .svc
            .change_domain_status(&req.token, &req.id, patch)
            .await
            .map_err(IntoStatus::into_status)?;
        Ok(Response::new(to_proto_domain(updated)))
    }

    async fn list_domains(
        &self,
        request: Request<pb::ListDomainsReq>,
    ) -> Result<Response<pb::DomainsPage>, Status> {
        let req = request.into_inner();
        let page = Page {
            offset: req.offset,
            limit: req.limit,
            name: (!req.name.is_empty()).then_some(req.name),
            tag: (!req.tag.is_empty()).then_some(req.tag),
            permission: (!req.permission.is_empty()).then_some(req.permission),
            status: parse_status_filter(&req.status)?,
            subject_id: None,
        };

        let domains = self
            .svc
            .list_domains(&req.token, page)
            .await
            .map_err(IntoStatus::into_status)?;
        Ok(Response::new(to_proto_page(domains)))
    }

    async fn assign_users(
        &self,
        request: Request<pb::AssignUsersReq>,
    ) -> Result<Response<pb::AssignRes>, Status> {
        let req = request.into_inner();
        self.svc
            .assign_users(&req.token, &req.domain_id, &req.user_ids, &req.relation)
            .await
            .map_err(IntoStatus::into_status)?;
        Ok(Response::new(pb::AssignRes { ok: true }))
    }

    async fn unassign_users(
        &self,
        request: Request<pb::UnassignUsersReq>,
    ) -> Result<Response<pb::AssignRes>, Status> {
        let req = request.into_inner();
        self.svc
            .unassign_users(&req.token, &req.domain_id, &req.user_ids)
            .await
            .map_err(IntoStatus::into_status)?;
        Ok(Response::new(pb::AssignRes { ok: true }))
    }

    async fn list_user_domains(
        &self,
        request: Request<pb::ListUserDomainsReq>,
    ) -> Result<Response<pb::DomainsPage>, Status> {
        let req = request.into_inner();
        let page = Page {
            offset: req.offset,
            limit: req.limit,
            permission: (!req.permission.is_empty()).then_some(req.permission),
            status: parse_status_filter(&req.status)?,
            ..Page::default()
        };

        let domains = self
            .svc
            .list_user_domains(&req.token, &req.user_id, page)
            .await
            .map_err(IntoStatus::into_status)?;
        Ok(Response::new(to_proto_page(domains)))
    }
}
