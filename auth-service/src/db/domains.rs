//! Domain persistence and the domain-side policy mirror.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPool;
use sqlx::{Postgres, QueryBuilder};
use tracing::instrument;

use crate::models::policy::{encode_domain_user_id, relations_for_permission};
use crate::models::{Domain, DomainReq, DomainStatus, DomainsPage, Page, PolicyReq};
use crate::services::error::AuthError;

/// Store of domains and the policy tuples that scope users to them.
///
/// `save_policies`/`delete_policies` mirror relation-engine writes so that
/// domain scans never need the engine.
#[async_trait]
pub trait DomainRepository: Send + Sync {
    async fn save(&self, domain: &Domain) -> Result<Domain, AuthError>;
    async fn retrieve_by_id(&self, id: &str) -> Result<Domain, AuthError>;
    async fn update(
        &self,
        id: &str,
        updated_by: &str,
        req: &DomainReq,
    ) -> Result<Domain, AuthError>;
    async fn list_domains(&self, page: &Page) -> Result<DomainsPage, AuthError>;
    async fn save_policies(&self, policies: &[PolicyReq]) -> Result<(), AuthError>;
    async fn delete_policies(&self, policies: &[PolicyReq]) -> Result<(), AuthError>;
}

const DOMAIN_COLUMNS: &str = "d.id, d.name, d.alias, d.tags, d.metadata, d.status, \
     d.created_by, d.created_at, d.updated_by, d.updated_at";

/// PostgreSQL-backed domain store.
#[derive(Clone)]
pub struct PostgresDomainRepository {
    pool: PgPool,
}

impl PostgresDomainRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append the ACL join and WHERE clauses shared by the page and count
    /// queries.
    fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, page: &Page) {
        if let Some(subject) = &page.subject_id {
            qb.push(
                " JOIN policies pc ON pc.object_type = 'domain' \
                 AND pc.object = d.id AND pc.subject = d.id || '_' || ",
            );
            qb.push_bind(subject.clone());
            if let Some(permission) = &page.permission {
                qb.push(" AND pc.relation = ANY(");
                qb.push_bind(relations_for_permission(permission));
                qb.push(")");
            }
        }

        qb.push(" WHERE 1 = 1");

        if let Some(status) = page.status {
            if status != DomainStatus::All {
                qb.push(" AND d.status = ");
                qb.push_bind(status.as_str().to_string());
            }
        }
        if let Some(name) = &page.name {
            qb.push(" AND d.name ILIKE ");
            qb.push_bind(format!("%{}%", name));
        }
        if let Some(tag) = &page.tag {
            qb.push(" AND ");
            qb.push_bind(tag.clone());
            qb.push(" = ANY(d.tags)");
        }
    }
}

#[async_trait]
impl DomainRepository for PostgresDomainRepository {
    #[instrument(skip(self, domain), fields(id = %domain.id, alias = %domain.alias))]
    async fn save(&self, domain: &Domain) -> Result<Domain, AuthError> {
        let saved = sqlx::query_as::<_, Domain>(
            r#"
            INSERT INTO domains (id, name, alias, tags, metadata, status, created_by, created_at, updated_by, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id, name, alias, tags, metadata, status, created_by, created_at, updated_by, updated_at
            "#,
        )
        .bind(&domain.id)
        .bind(&domain.name)
        .bind(&domain.alias)
        .bind(&domain.tags)
        .bind(&domain.metadata)
        .bind(&domain.status)
        .bind(&domain.created_by)
        .bind(domain.created_at)
        .bind(&domain.updated_by)
        .bind(domain.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AuthError::Conflict
            }
            _ => AuthError::CreateEntity(anyhow::anyhow!("failed to save domain: {}", e)),
        })?;

        tracing::info!(id = %saved.id, name = %saved.name, "Domain created");
        Ok(saved)
    }

    #[instrument(skip(self))]
    async fn retrieve_by_id(&self, id: &str) -> Result<Domain, AuthError> {
        let domain = sqlx::query_as::<_, Domain>(&format!(
            "SELECT {DOMAIN_COLUMNS} FROM domains d WHERE d.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AuthError::ViewEntity(anyhow::anyhow!("failed to retrieve domain: {}", e)))?;

        domain.ok_or(AuthError::NotFound)
    }

    #[instrument(skip(self, req), fields(id = id))]
    async fn update(
        &self,
        id: &str,
        updated_by: &str,
        req: &DomainReq,
    ) -> Result<Domain, AuthError> {
        let updated = sqlx::query_as::<_, Domain>(
            r#"
            UPDATE domains SET
                name = COALESCE($2, name),
                alias = COALESCE($3, alias),
                tags = COALESCE($4, tags),
                metadata = COALESCE($5, metadata),
                status = COALESCE($6, status),
                updated_by = $7,
                updated_at = now()
            WHERE id = $1
            RETURNING id, name, alias, tags, metadata, status, created_by, created_at, updated_by, updated_at
            "#,
        )
        .bind(id)
        .bind(&req.name)
        .bind(&req.alias)
        .bind(&req.tags)
        .bind(&req.metadata)
        .bind(req.status.map(|s| s.as_str().to_string()))
        .bind(updated_by)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AuthError::Conflict
            }
            _ => AuthError::UpdateEntity(anyhow::anyhow!("failed to update domain: {}", e)),
        })?;

        updated.ok_or(AuthError::NotFound)
    }

    #[instrument(skip(self, page))]
    async fn list_domains(&self, page: &Page) -> Result<DomainsPage, AuthError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT DISTINCT {DOMAIN_COLUMNS} FROM domains d"
        ));
        Self::push_filters(&mut qb, page);
        qb.push(" ORDER BY d.created_at");
        qb.push(" OFFSET ");
        qb.push_bind(page.offset as i64);
        if page.limit > 0 {
            qb.push(" LIMIT ");
            qb.push_bind(page.limit as i64);
        }

        let domains: Vec<Domain> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AuthError::ViewEntity(anyhow::anyhow!("failed to list domains: {}", e)))?;

        let mut count_qb =
            QueryBuilder::<Postgres>::new("SELECT COUNT(DISTINCT d.id) FROM domains d");
        Self::push_filters(&mut count_qb, page);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                AuthError::ViewEntity(anyhow::anyhow!("failed to count domains: {}", e))
            })?;

        Ok(DomainsPage {
            total: total as u64,
            offset: page.offset,
            limit: page.limit,
            domains,
        })
    }

    #[instrument(skip(self, policies), fields(count = policies.len()))]
    async fn save_policies(&self, policies: &[PolicyReq]) -> Result<(), AuthError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AuthError::CreateEntity(anyhow::anyhow!(e)))?;
        for pr in policies {
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
            .execute(&mut *tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                    AuthError::Conflict
                }
                _ => AuthError::CreateEntity(anyhow::anyhow!("failed to save policy: {}", e)),
            })?;
        }
        tx.commit()
            .await
            .map_err(|e| AuthError::CreateEntity(anyhow::anyhow!(e)))?;
        Ok(())
    }

    #[instrument(skip(self, policies), fields(count = policies.len()))]
    async fn delete_policies(&self, policies: &[PolicyReq]) -> Result<(), AuthError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AuthError::RemoveEntity(anyhow::anyhow!(e)))?;
        for pr in policies {
            sqlx::query(
                r#"
                DELETE FROM policies
                WHERE subject_type = $1 AND subject = $2
                  AND object_type = $3 AND object = $4
                  AND ($5 = '' OR relation = $5)
                "#,
            )
            .bind(&pr.subject_type)
            .bind(&pr.subject)
            .bind(&pr.object_type)
            .bind(&pr.object)
            .bind(&pr.relation)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AuthError::RemoveEntity(anyhow::anyhow!("failed to delete policy: {}", e))
            })?;
        }
        tx.commit()
            .await
            .map_err(|e| AuthError::RemoveEntity(anyhow::anyhow!(e)))?;
        Ok(())
    }
}

/// In-memory domain store for tests, with injectable failures.
#[derive(Default)]
pub struct MockDomainRepository {
    domains: Mutex<HashMap<String, Domain>>,
    policies: Mutex<Vec<PolicyReq>>,
    pub fail_save: AtomicBool,
    pub fail_update: AtomicBool,
    pub fail_list: AtomicBool,
    pub fail_save_policies: AtomicBool,
    pub fail_delete_policies: AtomicBool,
}

impl MockDomainRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a domain directly, bypassing failure injection.
    pub fn seed(&self, domain: Domain) {
        self.domains.lock().unwrap().insert(domain.id.clone(), domain);
    }

    pub fn stored_policies(&self) -> Vec<PolicyReq> {
        self.policies.lock().unwrap().clone()
    }

    pub fn stored_domains(&self) -> Vec<Domain> {
        self.domains.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl DomainRepository for MockDomainRepository {
    async fn save(&self, domain: &Domain) -> Result<Domain, AuthError> {
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(AuthError::CreateEntity(anyhow::anyhow!(
                "injected save failure"
            )));
        }
        let mut domains = self.domains.lock().unwrap();
        if domains.values().any(|d| d.alias == domain.alias) || domains.contains_key(&domain.id) {
            return Err(AuthError::Conflict);
        }
        domains.insert(domain.id.clone(), domain.clone());
        Ok(domain.clone())
    }

    async fn retrieve_by_id(&self, id: &str) -> Result<Domain, AuthError> {
        self.domains
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or(AuthError::NotFound)
    }

    async fn update(
        &self,
        id: &str,
        updated_by: &str,
        req: &DomainReq,
    ) -> Result<Domain, AuthError> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(AuthError::UpdateEntity(anyhow::anyhow!(
                "injected update failure"
            )));
        }
        let mut domains = self.domains.lock().unwrap();
        let domain = domains.get_mut(id).ok_or(AuthError::NotFound)?;
        if let Some(name) = &req.name {
            domain.name = name.clone();
        }
        if let Some(alias) = &req.alias {
            domain.alias = alias.clone();
        }
        if let Some(tags) = &req.tags {
            domain.tags = tags.clone();
        }
        if let Some(metadata) = &req.metadata {
            domain.metadata = metadata.clone();
        }
        if let Some(status) = req.status {
            domain.status = status.as_str().to_string();
        }
        domain.updated_by = updated_by.to_string();
        domain.updated_at = Some(Utc::now());
        Ok(domain.clone())
    }

    async fn list_domains(&self, page: &Page) -> Result<DomainsPage, AuthError> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(AuthError::ViewEntity(anyhow::anyhow!(
                "injected list failure"
            )));
        }
        let domains = self.domains.lock().unwrap();
        let policies = self.policies.lock().unwrap();

        let mut matching: Vec<Domain> = domains
            .values()
            .filter(|d| {
                if let Some(subject) = &page.subject_id {
                    let scoped = encode_domain_user_id(&d.id, subject);
                    if !policies
                        .iter()
                        .any(|p| p.object == d.id && p.subject == scoped)
                    {
                        return false;
                    }
                }
                if let Some(status) = page.status {
                    if status != DomainStatus::All && d.status() != status {
                        return false;
                    }
                }
                if let Some(name) = &page.name {
                    if !d.name.contains(name.as_str()) {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let total = matching.len() as u64;
        let domains = matching
            .into_iter()
            .skip(page.offset as usize)
            .take(if page.limit == 0 {
                usize::MAX
            } else {
                page.limit as usize
            })
            .collect();

        Ok(DomainsPage {
            total,
            offset: page.offset,
            limit: page.limit,
            domains,
        })
    }

    async fn save_policies(&self, policies: &[PolicyReq]) -> Result<(), AuthError> {
        if self.fail_save_policies.load(Ordering::SeqCst) {
            return Err(AuthError::CreateEntity(anyhow::anyhow!(
                "injected policy mirror failure"
            )));
        }
        self.policies.lock().unwrap().extend_from_slice(policies);
        Ok(())
    }

    async fn delete_policies(&self, policies: &[PolicyReq]) -> Result<(), AuthError> {
        if self.fail_delete_policies.load(Ordering::SeqCst) {
            return Err(AuthError::RemoveEntity(anyhow::anyhow!(
                "injected policy mirror failure"
            )));
        }
        let mut stored = self.policies.lock().unwrap();
        for pr in policies {
            stored.retain(|p| {
                !(p.subject == pr.subject
                    && p.object == pr.object
                    && p.object_type == pr.object_type
                    && (pr.relation.is_empty() || p.relation == pr.relation))
            });
        }
        Ok(())
    }
}
