//! Policy evaluation and mutation against the external relation-tuple engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tonic::transport::{Channel, Endpoint};

use crate::grpc::proto::relation::relation_service_client::RelationServiceClient;
use crate::grpc::proto::relation::{
    CheckReq, DeleteRelationsReq, LookupResourcesReq, LookupSubjectsReq, Relationship, WriteReq,
};
use crate::models::policy::{switch_to_permission, DOMAIN_PERMISSIONS};
use crate::models::{PolicyReq, PolicyRes};
use crate::services::error::AuthError;

const LOOKUP_PAGE_SIZE: u64 = 100;

/// Decision engine fronting the external relation-tuple service.
///
/// Mutations are mirrored into the durable policy store by the caller;
/// this trait only talks to the engine.
#[async_trait]
pub trait PolicyAgent: Send + Sync {
    /// Succeeds iff the engine can derive the requested permission.
    async fn check_policy(&self, pr: &PolicyReq) -> Result<(), AuthError>;

    async fn add_policy(&self, pr: &PolicyReq) -> Result<(), AuthError>;
    async fn add_policies(&self, prs: &[PolicyReq]) -> Result<(), AuthError>;
    async fn delete_policy_filter(&self, pr: &PolicyReq) -> Result<(), AuthError>;
    async fn delete_policies(&self, prs: &[PolicyReq]) -> Result<(), AuthError>;

    async fn retrieve_objects(
        &self,
        pr: &PolicyReq,
        next_page_token: &str,
        limit: u64,
    ) -> Result<(Vec<PolicyRes>, String), AuthError>;
    async fn retrieve_all_objects(&self, pr: &PolicyReq) -> Result<Vec<PolicyRes>, AuthError>;
    async fn retrieve_all_objects_count(&self, pr: &PolicyReq) -> Result<u64, AuthError>;

    async fn retrieve_subjects(
        &self,
        pr: &PolicyReq,
        next_page_token: &str,
        limit: u64,
    ) -> Result<(Vec<PolicyRes>, String), AuthError>;
    async fn retrieve_all_subjects(&self, pr: &PolicyReq) -> Result<Vec<PolicyRes>, AuthError>;
    async fn retrieve_all_subjects_count(&self, pr: &PolicyReq) -> Result<u64, AuthError>;

    /// Which of `filter` the subject holds on the object; an empty filter
    /// evaluates the full permission vocabulary.
    async fn retrieve_permissions(
        &self,
        pr: &PolicyReq,
        filter: &[String],
    ) -> Result<Vec<String>, AuthError>;
}

/// The permission a request is actually asking for.
fn requested_permission(pr: &PolicyReq) -> String {
    if pr.permission.is_empty() {
        switch_to_permission(&pr.relation).to_string()
    } else {
        pr.permission.clone()
    }
}

fn to_relationship(pr: &PolicyReq) -> Relationship {
    Relationship {
        object_type: pr.object_type.clone(),
        object: pr.object.clone(),
        relation: if pr.relation.is_empty() {
            pr.permission.clone()
        } else {
            pr.relation.clone()
        },
        subject_type: pr.subject_type.clone(),
        subject: pr.subject.clone(),
        subject_relation: pr.subject_relation.clone(),
    }
}

/// gRPC client implementation of [`PolicyAgent`].
#[derive(Clone)]
pub struct RelationEngineAgent {
    client: RelationServiceClient<Channel>,
}

impl RelationEngineAgent {
    /// Dial the relation engine at `endpoint`.
    pub async fn connect(endpoint: &str) -> Result<Self, tonic::transport::Error> {
        let channel = Endpoint::from_shared(endpoint.to_string())?
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .connect()
            .await?;

        tracing::info!(endpoint = %endpoint, "Connected to relation engine");

        Ok(Self {
            client: RelationServiceClient::new(channel),
        })
    }
}

#[async_trait]
impl PolicyAgent for RelationEngineAgent {
    async fn check_policy(&self, pr: &PolicyReq) -> Result<(), AuthError> {
        let req = CheckReq {
            object_type: pr.object_type.clone(),
            object: pr.object.clone(),
            permission: requested_permission(pr),
            subject_type: pr.subject_type.clone(),
            subject: pr.subject.clone(),
            subject_relation: pr.subject_relation.clone(),
        };

        let mut client = self.client.clone();
        let res = client
            .check(req)
            .await
            .map_err(|_| AuthError::Authorization)?;
        if res.into_inner().allowed {
            Ok(())
        } else {
            Err(AuthError::Authorization)
        }
    }

    async fn add_policy(&self, pr: &PolicyReq) -> Result<(), AuthError> {
        self.add_policies(std::slice::from_ref(pr)).await
    }

    async fn add_policies(&self, prs: &[PolicyReq]) -> Result<(), AuthError> {
        let req = WriteReq {
            additions: prs.iter().map(to_relationship).collect(),
            deletions: vec![],
        };
        let mut client = self.client.clone();
        client
            .write(req)
            .await
            .map_err(|e| AuthError::CreateEntity(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn delete_policy_filter(&self, pr: &PolicyReq) -> Result<(), AuthError> {
        let req = DeleteRelationsReq {
            object_type: pr.object_type.clone(),
            object: pr.object.clone(),
            relation: pr.relation.clone(),
            subject_type: pr.subject_type.clone(),
            subject: pr.subject.clone(),
        };
        let mut client = self.client.clone();
        client
            .delete_relations(req)
            .await
            .map_err(|e| AuthError::RemoveEntity(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn delete_policies(&self, prs: &[PolicyReq]) -> Result<(), AuthError> {
        let req = WriteReq {
            additions: vec![],
            deletions: prs.iter().map(to_relationship).collect(),
        };
        let mut client = self.client.clone();
        client
            .write(req)
            .await
            .map_err(|e| AuthError::RemoveEntity(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn retrieve_objects(
        &self,
        pr: &PolicyReq,
        next_page_token: &str,
        limit: u64,
    ) -> Result<(Vec<PolicyRes>, String), AuthError> {
        let req = LookupResourcesReq {
            object_type: pr.object_type.clone(),
            permission: requested_permission(pr),
            subject_type: pr.subject_type.clone(),
            subject: pr.subject.clone(),
            subject_relation: pr.subject_relation.clone(),
            limit,
            page_token: next_page_token.to_string(),
        };
        let mut client = self.client.clone();
        let res = client
            .lookup_resources(req)
            .await
            .map_err(|e| AuthError::ViewEntity(anyhow::anyhow!(e)))?
            .into_inner();

        let policies = res
            .resource_ids
            .into_iter()
            .map(|object| PolicyRes {
                namespace: pr.object_type.clone(),
                subject: pr.subject.clone(),
                object,
            })
            .collect();
        Ok((policies, res.next_page_token))
    }

    async fn retrieve_all_objects(&self, pr: &PolicyReq) -> Result<Vec<PolicyRes>, AuthError> {
        let mut all = Vec::new();
        let mut token = String::new();
        loop {
            let (page, next) = self.retrieve_objects(pr, &token, LOOKUP_PAGE_SIZE).await?;
            all.extend(page);
            if next.is_empty() {
                return Ok(all);
            }
            token = next;
        }
    }

    async fn retrieve_all_objects_count(&self, pr: &PolicyReq) -> Result<u64, AuthError> {
        Ok(self.retrieve_all_objects(pr).await?.len() as u64)
    }

    async fn retrieve_subjects(
        &self,
        pr: &PolicyReq,
        next_page_token: &str,
        limit: u64,
    ) -> Result<(Vec<PolicyRes>, String), AuthError> {
        let req = LookupSubjectsReq {
            object_type: pr.object_type.clone(),
            object: pr.object.clone(),
            permission: requested_permission(pr),
            subject_type: pr.subject_type.clone(),
            limit,
            page_token: next_page_token.to_string(),
        };
        let mut client = self.client.clone();
        let res = client
            .lookup_subjects(req)
            .await
            .map_err(|e| AuthError::ViewEntity(anyhow::anyhow!(e)))?
            .into_inner();

        let policies = res
            .subject_ids
            .into_iter()
            .map(|subject| PolicyRes {
                namespace: pr.object_type.clone(),
                subject,
                object: pr.object.clone(),
            })
            .collect();
        Ok((policies, res.next_page_token))
    }

    async fn retrieve_all_subjects(&self, pr: &PolicyReq) -> Result<Vec<PolicyRes>, AuthError> {
        let mut all = Vec::new();
        let mut token = String::new();
        loop {
            let (page, next) = self.retrieve_subjects(pr, &token, LOOKUP_PAGE_SIZE).await?;
            all.extend(page);
            if next.is_empty() {
                return Ok(all);
            }
            token = next;
        }
    }

    async fn retrieve_all_subjects_count(&self, pr: &PolicyReq) -> Result<u64, AuthError> {
        Ok(self.retrieve_all_subjects(pr).await?.len() as u64)
    }

    async fn retrieve_permissions(
        &self,
        pr: &PolicyReq,
        filter: &[String],
    ) -> Result<Vec<String>, AuthError> {
        let candidates: Vec<String> = if filter.is_empty() {
            DOMAIN_PERMISSIONS.iter().map(|p| p.to_string()).collect()
        } else {
            filter.to_vec()
        };

        let mut held = Vec::new();
        for permission in candidates {
            let mut check = pr.clone();
            check.permission = permission.clone();
            check.relation.clear();
            if self.check_policy(&check).await.is_ok() {
                held.push(permission);
            }
        }
        Ok(held)
    }
}

/// In-memory relation engine for tests: stores tuples and derives
/// permissions through the relation table, with injectable write failures.
#[derive(Default)]
pub struct MockPolicyAgent {
    tuples: Mutex<Vec<PolicyReq>>,
    pub fail_add_policies: AtomicBool,
    pub fail_delete_policies: AtomicBool,
}

impl MockPolicyAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tuple directly, bypassing failure injection.
    pub fn seed(&self, pr: PolicyReq) {
        self.tuples.lock().unwrap().push(pr);
    }

    pub fn tuples(&self) -> Vec<PolicyReq> {
        self.tuples.lock().unwrap().clone()
    }

    fn grants(stored: &PolicyReq, permission: &str) -> bool {
        // administrators hold every permission on their object, as the
        // engine schema derives
        if stored.relation == crate::models::policy::ADMINISTRATOR_RELATION {
            return true;
        }
        switch_to_permission(&stored.relation) == permission
            || stored.relation == permission
            || stored.permission == permission
    }

    fn matches_filter(stored: &PolicyReq, filter: &PolicyReq) -> bool {
        (filter.subject.is_empty() || stored.subject == filter.subject)
            && (filter.subject_type.is_empty() || stored.subject_type == filter.subject_type)
            && (filter.relation.is_empty() || stored.relation == filter.relation)
            && (filter.object.is_empty() || stored.object == filter.object)
            && (filter.object_type.is_empty() || stored.object_type == filter.object_type)
    }
}

#[async_trait]
impl PolicyAgent for MockPolicyAgent {
    async fn check_policy(&self, pr: &PolicyReq) -> Result<(), AuthError> {
        let wanted = requested_permission(pr);
        let tuples = self.tuples.lock().unwrap();
        let allowed = tuples.iter().any(|t| {
            t.subject == pr.subject
                && t.object == pr.object
                && t.object_type == pr.object_type
                && Self::grants(t, &wanted)
        });
        if allowed {
            Ok(())
        } else {
            Err(AuthError::Authorization)
        }
    }

    async fn add_policy(&self, pr: &PolicyReq) -> Result<(), AuthError> {
        self.add_policies(std::slice::from_ref(pr)).await
    }

    async fn add_policies(&self, prs: &[PolicyReq]) -> Result<(), AuthError> {
        if self.fail_add_policies.load(Ordering::SeqCst) {
            return Err(AuthError::CreateEntity(anyhow::anyhow!(
                "injected agent write failure"
            )));
        }
        self.tuples.lock().unwrap().extend_from_slice(prs);
        Ok(())
    }

    async fn delete_policy_filter(&self, pr: &PolicyReq) -> Result<(), AuthError> {
        if self.fail_delete_policies.load(Ordering::SeqCst) {
            return Err(AuthError::RemoveEntity(anyhow::anyhow!(
                "injected agent delete failure"
            )));
        }
        self.tuples
            .lock()
            .unwrap()
            .retain(|t| !Self::matches_filter(t, pr));
        Ok(())
    }

    async fn delete_policies(&self, prs: &[PolicyReq]) -> Result<(), AuthError> {
        if self.fail_delete_policies.load(Ordering::SeqCst) {
            return Err(AuthError::RemoveEntity(anyhow::anyhow!(
                "injected agent delete failure"
            )));
        }
        let mut tuples = self.tuples.lock().unwrap();
        for pr in prs {
            tuples.retain(|t| !Self::matches_filter(t, pr));
        }
        Ok(())
    }

    async fn retrieve_objects(
        &self,
        pr: &PolicyReq,
        _next_page_token: &str,
        _limit: u64,
    ) -> Result<(Vec<PolicyRes>, String), AuthError> {
        let tuples = self.tuples.lock().unwrap();
        let policies = tuples
            .iter()
            .filter(|t| t.subject == pr.subject && t.object_type == pr.object_type)
            .map(|t| PolicyRes {
                namespace: t.object_type.clone(),
                subject: t.subject.clone(),
                object: t.object.clone(),
            })
            .collect();
        Ok((policies, String::new()))
    }

    async fn retrieve_all_objects(&self, pr: &PolicyReq) -> Result<Vec<PolicyRes>, AuthError> {
        Ok(self.retrieve_objects(pr, "", 0).await?.0)
    }

    async fn retrieve_all_objects_count(&self, pr: &PolicyReq) -> Result<u64, AuthError> {
        Ok(self.retrieve_all_objects(pr).await?.len() as u64)
    }

    async fn retrieve_subjects(
        &self,
        pr: &PolicyReq,
        _next_page_token: &str,
        _limit: u64,
    ) -> Result<(Vec<PolicyRes>, String), AuthError> {
        let tuples = self.tuples.lock().unwrap();
        let policies = tuples
            .iter()
            .filter(|t| t.object == pr.object && t.object_type == pr.object_type)
            .map(|t| PolicyRes {
                namespace: t.object_type.clone(),
                subject: t.subject.clone(),
                object: t.object.clone(),
            })
            .collect();
        Ok((policies, String::new()))
    }

    async fn retrieve_all_subjects(&self, pr: &PolicyReq) -> Result<Vec<PolicyRes>, AuthError> {
        Ok(self.retrieve_subjects(pr, "", 0).await?.0)
    }

    async fn retrieve_all_subjects_count(&self, pr: &PolicyReq) -> Result<u64, AuthError> {
        Ok(self.retrieve_all_subjects(pr).await?.len() as u64)
    }

    async fn retrieve_permissions(
        &self,
        pr: &PolicyReq,
        filter: &[String],
    ) -> Result<Vec<String>, AuthError> {
        let candidates: Vec<String> = if filter.is_empty() {
            DOMAIN_PERMISSIONS.iter().map(|p| p.to_string()).collect()
        } else {
            filter.to_vec()
        };

        let mut held = Vec::new();
        for permission in candidates {
            let mut check = pr.clone();
            check.permission = permission.clone();
            check.relation.clear();
            if self.check_policy(&check).await.is_ok() {
                held.push(permission);
            }
        }
        Ok(held)
    }
}
