//! Durable mirror of relation tuples.
//!
//! The relation engine decides; this table is the platform's own record,
//! used for domain scans and audits without a round trip to the engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use tracing::instrument;

use crate::models::PolicyReq;
use crate::services::error::AuthError;

/// Durable store of relation tuples.
#[async_trait]
pub trait PolicyRepository: Send + Sync {
    async fn add_policy(&self, pr: &PolicyReq) -> Result<(), AuthError>;
    /// Transactional bulk insert; a duplicate tuple conflicts.
    async fn add_policies(&self, prs: &[PolicyReq]) -> Result<(), AuthError>;
    /// Delete every tuple matching the non-empty fields of `pr`.
    async fn delete_policy_filter(&self, pr: &PolicyReq) -> Result<(), AuthError>;
    async fn delete_policies(&self, prs: &[PolicyReq]) -> Result<(), AuthError>;
    /// Offset-cursor paged listing; the second element is the next cursor.
    async fn retrieve_policies(
        &self,
        filter: &PolicyReq,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<PolicyReq>, Option<String>), AuthError>;
}

/// PostgreSQL-backed policy store.
#[derive(Clone)]
pub struct PostgresPolicyRepository {
    pool: PgPool,
}

impl PostgresPolicyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert<'e, E>(executor: E, pr: &PolicyReq) -> Result<(), AuthError>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query(
            r#"
            INSERT INTO policies (subject_type, subject, relation, object_type, object, domain)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&pr.subject_type)
        .bind(&pr.subject)
        .bind(&pr.relation)
        .bind(&pr.object_type)
        .bind(&pr.object)
        .bind(&pr.domain)
        .execute(executor)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AuthError::Conflict
            }
            _ => AuthError::CreateEntity(anyhow::anyhow!("failed to save policy: {}", e)),
        })?;
        Ok(())
    }

    async fn delete<'e, E>(executor: E, pr: &PolicyReq) -> Result<u64, AuthError>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        let result = sqlx::query(
            r#"
            DELETE FROM policies
            WHERE ($1 = '' OR subject_type = $1)
              AND ($2 = '' OR subject = $2)
              AND ($3 = '' OR relation = $3)
              AND ($4 = '' OR object_type = $4)
              AND ($5 = '' OR object = $5)
              AND ($6 = '' OR domain = $6)
            "#,
        )
        .bind(&pr.subject_type)
        .bind(&pr.subject)
        .bind(&pr.relation)
        .bind(&pr.object_type)
        .bind(&pr.object)
        .bind(&pr.domain)
        .execute(executor)
        .await
        .map_err(|e| AuthError::RemoveEntity(anyhow::anyhow!("failed to delete policy: {}", e)))?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl PolicyRepository for PostgresPolicyRepository {
    #[instrument(skip(self, pr), fields(subject = %pr.subject, object = %pr.object))]
    async fn add_policy(&self, pr: &PolicyReq) -> Result<(), AuthError> {
        Self::insert(&self.pool, pr).await
    }

    #[instrument(skip(self, prs), fields(count = prs.len()))]
    async fn add_policies(&self, prs: &[PolicyReq]) -> Result<(), AuthError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AuthError::CreateEntity(anyhow::anyhow!(e)))?;
        for pr in prs {
            Self::insert(&mut *tx, pr).await?;
        }
        tx.commit()
            .await
            .map_err(|e| AuthError::CreateEntity(anyhow::anyhow!(e)))?;
        Ok(())
    }

    #[instrument(skip(self, pr), fields(subject = %pr.subject, object = %pr.object))]
    async fn delete_policy_filter(&self, pr: &PolicyReq) -> Result<(), AuthError> {
        Self::delete(&self.pool, pr).await?;
        Ok(())
    }

    #[instrument(skip(self, prs), fields(count = prs.len()))]
    async fn delete_policies(&self, prs: &[PolicyReq]) -> Result<(), AuthError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AuthError::RemoveEntity(anyhow::anyhow!(e)))?;
        for pr in prs {
            Self::delete(&mut *tx, pr).await?;
        }
        tx.commit()
            .await
            .map_err(|e| AuthError::RemoveEntity(anyhow::anyhow!(e)))?;
        Ok(())
    }

    #[instrument(skip(self, filter))]
    async fn retrieve_policies(
        &self,
        filter: &PolicyReq,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<PolicyReq>, Option<String>), AuthError> {
        let rows = sqlx::query_as::<_, (String, String, String, String, String, String)>(
            r#"
            SELECT subject_type, subject, relation, object_type, object, domain
            FROM policies
            WHERE ($1 = '' OR subject_type = $1)
              AND ($2 = '' OR subject = $2)
              AND ($3 = '' OR relation = $3)
              AND ($4 = '' OR object_type = $4)
              AND ($5 = '' OR object = $5)
              AND ($6 = '' OR domain = $6)
            ORDER BY subject_type, subject, relation, object_type, object
            OFFSET $7 LIMIT $8
            "#,
        )
        .bind(&filter.subject_type)
        .bind(&filter.subject)
        .bind(&filter.relation)
        .bind(&filter.object_type)
        .bind(&filter.object)
        .bind(&filter.domain)
        .bind(offset as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AuthError::ViewEntity(anyhow::anyhow!("failed to list policies: {}", e)))?;

        let full_page = rows.len() as u64 == limit && limit > 0;
        let policies: Vec<PolicyReq> = rows
            .into_iter()
            .map(
                |(subject_type, subject, relation, object_type, object, domain)| PolicyReq {
                    subject_type,
                    subject,
                    relation,
                    object_type,
                    object,
                    domain,
                    ..PolicyReq::default()
                },
            )
            .collect();

        let next = full_page.then(|| (offset + policies.len() as u64).to_string());
        Ok((policies, next))
    }
}

/// In-memory policy store for tests, with injectable write failures.
#[derive(Default)]
pub struct MockPolicyRepository {
    policies: Mutex<Vec<PolicyReq>>,
    pub fail_add: AtomicBool,
    pub fail_delete: AtomicBool,
}

impl MockPolicyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored(&self) -> Vec<PolicyReq> {
        self.policies.lock().unwrap().clone()
    }

    fn matches(stored: &PolicyReq, filter: &PolicyReq) -> bool {
        (filter.subject_type.is_empty() || stored.subject_type == filter.subject_type)
            && (filter.subject.is_empty() || stored.subject == filter.subject)
            && (filter.relation.is_empty() || stored.relation == filter.relation)
            && (filter.object_type.is_empty() || stored.object_type == filter.object_type)
            && (filter.object.is_empty() || stored.object == filter.object)
            && (filter.domain.is_empty() || stored.domain == filter.domain)
    }
}

#[async_trait]
impl PolicyRepository for MockPolicyRepository {
    async fn add_policy(&self, pr: &PolicyReq) -> Result<(), AuthError> {
        self.add_policies(std::slice::from_ref(pr)).await
    }

    async fn add_policies(&self, prs: &[PolicyReq]) -> Result<(), AuthError> {
        if self.fail_add.load(Ordering::SeqCst) {
            return Err(AuthError::CreateEntity(anyhow::anyhow!(
                "injected store failure"
            )));
        }
        self.policies.lock().unwrap().extend_from_slice(prs);
        Ok(())
    }

    async fn delete_policy_filter(&self, pr: &PolicyReq) -> Result<(), AuthError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(AuthError::RemoveEntity(anyhow::anyhow!(
                "injected store failure"
            )));
        }
        self.policies
            .lock()
            .unwrap()
            .retain(|stored| !Self::matches(stored, pr));
        Ok(())
    }

    async fn delete_policies(&self, prs: &[PolicyReq]) -> Result<(), AuthError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(AuthError::RemoveEntity(anyhow::anyhow!(
                "injected store failure"
            )));
        }
        let mut policies = self.policies.lock().unwrap();
        for pr in prs {
            policies.retain(|stored| !Self::matches(stored, pr));
        }
        Ok(())
    }

    async fn retrieve_policies(
        &self,
        filter: &PolicyReq,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<PolicyReq>, Option<String>), AuthError> {
        let policies = self.policies.lock().unwrap();
        let matching: Vec<PolicyReq> = policies
            .iter()
            .filter(|stored| Self::matches(stored, filter))
            .skip(offset as usize)
            .take(if limit == 0 { usize::MAX } else { limit as usize })
            .cloned()
            .collect();
        let next = (limit > 0 && matching.len() as u64 == limit)
            .then(|| (offset + matching.len() as u64).to_string());
        Ok((matching, next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::policy::{CONTRIBUTOR_RELATION, THING_TYPE, USER_TYPE};

    fn tuple(object: &str) -> PolicyReq {
        PolicyReq {
            subject: "u1".to_string(),
            subject_type: USER_TYPE.to_string(),
            relation: CONTRIBUTOR_RELATION.to_string(),
            object: object.to_string(),
            object_type: THING_TYPE.to_string(),
            ..PolicyReq::default()
        }
    }

    #[tokio::test]
    async fn retrieve_policies_pages_with_an_offset_cursor() {
        let repo = MockPolicyRepository::new();
        for i in 0..5 {
            repo.add_policy(&tuple(&format!("thing-{i}"))).await.unwrap();
        }

        let filter = PolicyReq {
            subject: "u1".to_string(),
            ..PolicyReq::default()
        };

        let (page, next) = repo.retrieve_policies(&filter, 0, 2).await.unwrap();
        assert_eq!(page.len(), 2);
        let cursor: u64 = next.expect("cursor expected").parse().unwrap();

        let (rest, next) = repo.retrieve_policies(&filter, cursor, 10).await.unwrap();
        assert_eq!(rest.len(), 3);
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn delete_filter_removes_only_matching_tuples() {
        let repo = MockPolicyRepository::new();
        repo.add_policies(&[tuple("thing-1"), tuple("thing-2")])
            .await
            .unwrap();

        repo.delete_policy_filter(&PolicyReq {
            object: "thing-1".to_string(),
            ..PolicyReq::default()
        })
        .await
        .unwrap();

        let stored = repo.stored();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].object, "thing-2");
    }

    #[tokio::test]
    async fn delete_filter_scopes_by_domain() {
        let repo = MockPolicyRepository::new();
        let mut scoped = tuple("thing-1");
        scoped.domain = "d1".to_string();
        let mut other = tuple("thing-2");
        other.domain = "d2".to_string();
        repo.add_policies(&[scoped, other]).await.unwrap();

        repo.delete_policy_filter(&PolicyReq {
            subject: "u1".to_string(),
            domain: "d1".to_string(),
            ..PolicyReq::default()
        })
        .await
        .unwrap();

        let stored = repo.stored();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].domain, "d2");

        let (page, _) = repo
            .retrieve_policies(
                &PolicyReq {
                    domain: "d2".to_string(),
                    ..PolicyReq::default()
                },
                0,
                10,
            )
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
    }
}
