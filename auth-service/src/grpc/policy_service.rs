//! gRPC implementation of PolicyService.

use service_core::grpc::IntoStatus;
use tonic::{Request, Response, Status};

use crate::grpc::proto::auth as pb;
use crate::grpc::{to_policy_req, to_proto_policy};
use crate::services::AuthService;

pub struct PolicyServiceImpl {
    svc: AuthService,
}

impl PolicyServiceImpl {
    pub fn new(svc: AuthService) -> Self {
        Self { svc }
    }
}

#[tonic::async_trait]
impl pb::policy_service_server::PolicyService for PolicyServiceImpl {
    async fn add_policy(
        &self,
        request: Request<pb::PolicyReq>,
    ) -> Result<Response<pb::PolicyRes>, Status> {
        let pr = to_policy_req(request.into_inner());
        self.svc
            .add_policy(pr)
            .await
            .map_err(IntoStatus::into_status)?;
        Ok(Response::new(pb::PolicyRes { ok: true }))
    }

    async fn add_policies(
        &self,
        request: Request<pb::PoliciesReq>,
    ) -> Result<Response<pb::PolicyRes>, Status> {
        let prs = request
            .into_inner()
            .policies
            .into_iter()
            .map(to_policy_req)
            .collect();
        self.svc
            .add_policies(prs)
            .await
            .map_err(IntoStatus::into_status)?;
        Ok(Response::new(pb::PolicyRes { ok: true }))
    }

    async fn delete_policy_filter(
        &self,
        request: Request<pb::PolicyReq>,
    ) -> Result<Response<pb::PolicyRes>, Status> {
        let pr = to_policy_req(request.into_inner());
        self.svc
            .delete_policy_filter(pr)
            .await
            .map_err(IntoStatus::into_status)?;
        Ok(Response::new(pb::PolicyRes { ok: true }))
    }

    async fn delete_policies(
        &self,
        request: Request<pb::PoliciesReq>,
    ) -> Result<Response<pb::PolicyRes>, Status> {
        let prs = request
            .into_inner()
            .policies
            .into_iter()
            .map(to_policy_req)
            .collect();
        self.svc
            .delete_policies(prs)
            .await
            .map_err(IntoStatus::into_status)?;
        Ok(Response::new(pb::PolicyRes { ok: true }))
    }

    async fn list_policies(
        &self,
        request: Request<pb::ListPoliciesReq>,
    ) -> Result<Response<pb::ListPoliciesRes>, Status> {
        let req = request.into_inner();
        let filter = to_policy_req(req.filter.unwrap_or_default());
        let (policies, next) = self
            .svc
            .list_policies(filter, &req.next_page_token, req.limit)
            .await
            .map_err(IntoStatus::into_status)?;
        Ok(Response::new(pb::ListPoliciesRes {
            policies: policies.into_iter().map(to_proto_policy).collect(),
            next_page_token: next.unwrap_or_default(),
        }))
    }

    async fn list_objects(
        &self,
        request: Request<pb::ListObjectsReq>,
    ) -> Result<Response<pb::ListObjectsRes>, Status> {
        let req = request.into_inner();
        let pr = to_policy_req(req.policy.unwrap_or_default());
        let page = self
            .svc
            .list_objects(pr, &req.next_page_token, req.limit)
            .await
            .map_err(IntoStatus::into_status)?;
        Ok(Response::new(pb::ListObjectsRes {
            policies: page.policies,
            next_page_token: page.next_page_token.unwrap_or_default(),
        }))
    }

    async fn list_all_objects(
        &self,
        request: Request<pb::PolicyReq>,
    ) -> Result<Response<pb::ListObjectsRes>, Status> {
        let pr = to_policy_req(request.into_inner());
        let page = self
            .svc
            .list_all_objects(pr)
            .await
            .map_err(IntoStatus::into_status)?;
        Ok(Response::new(pb::ListObjectsRes {
            policies: page.policies,
            next_page_token: String::new(),
        }))
    }

    async fn count_objects(
        &self,
        request: Request<pb::PolicyReq>,
    ) -> Result<Response<pb::CountRes>, Status> {
        let pr = to_policy_req(request.into_inner());
        let count = self
            .svc
            .count_objects(pr)
            .await
            .map_err(IntoStatus::into_status)?;
        Ok(Response::new(pb::CountRes { count }))
    }

    async fn list_subjects(
        &self,
        request: Request<pb::ListSubjectsReq>,
    ) -> Result<Response<pb::ListSubjectsRes>, Status> {
        let req = request.into_inner();
        let pr = to_policy_req(req.policy.unwrap_or_default());
        let page = self
            .svc
            .list_subjects(pr, &req.next_page_token, req.limit)
            .await
            .map_err(IntoStatus::into_status)?;
        Ok(Response::new(pb::ListSubjectsRes {
            policies: page.policies,
            next_page_token: page.next_page_token.unwrap_or_default(),
        }))
    }

    async fn list_all_subjects(
        &self,
        request: Request<pb::PolicyReq>,
    ) -> Result<Response<pb::ListSubjectsRes>, Status> {
        let pr = to_policy_req(request.into_inner());
        let page = self
            .svc
            .list_all_subjects(pr)
            .await
            .map_err(IntoStatus::into_status)?;
        Ok(Response::new(pb::ListSubjectsRes {
            policies: page.policies,
            next_page_token: String::new(),
        }))
    }

    async fn count_subjects(
        &self,
        request: Request<pb::PolicyReq>,
    ) -> Result<Response<pb::CountRes>, Status> {
        let pr = to_policy_req(request.into_inner());
        let count = self
            .svc
            .count_subjects(pr)
            .await
            .map_err(IntoStatus::into_status)?;
        Ok(Response::new(pb::CountRes { count }))
    }

    async fn list_permissions(
        &self,
        request: Request<pb::ListPermissionsReq>,
    ) -> Result<Response<pb::ListPermissionsRes>, Status> {
        let req = request.into_inner();
        let pr = to_policy_req(req.policy.unwrap_or_default());
        let permissions = self
            .svc
            .list_permissions(pr, req.filter)
            .await
            .map_err(IntoStatus::into_status)?;
        Ok(Response::new(pb::ListPermissionsRes { permissions }))
    }
}
