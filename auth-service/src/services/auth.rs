//! Orchestration of tokens, policies and domains.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::db::domains::DomainRepository;
use crate::db::keys::KeyRepository;
use crate::db::policies::PolicyRepository;
use crate::models::policy::{
    decode_domain_user_id, encode_domain_user_id, ADMINISTRATOR_RELATION, ADMIN_PERMISSION,
    DOMAIN_RELATION, DOMAIN_TYPE, DOMAINS_KIND, GRIDMESH_OBJECT, MEMBER_RELATION,
    MEMBERSHIP_PERMISSION, PLATFORM_TYPE, SHARE_PERMISSION, TOKEN_KIND, USER_TYPE, USERS_KIND,
    VIEW_PERMISSION,
};
use crate::models::{
    Domain, DomainReq, DomainStatus, DomainsPage, Key, KeyType, Page, PolicyPage, PolicyReq, Token,
};
use crate::services::agent::PolicyAgent;
use crate::services::error::AuthError;
use crate::services::tokens::Tokenizer;

const DEF_LIST_LIMIT: u64 = 100;

/// The user id behind a subject that may be a `{domain}_{user}` composite.
fn subject_user_id(subject: &str) -> String {
    let (_, user) = decode_domain_user_id(subject);
    if user.is_empty() {
        subject.to_string()
    } else {
        user
    }
}

/// The authorization and identity core.
///
/// All collaborators are injected handles; the service holds no state of
/// its own beyond the signing secret inside the tokenizer.
#[derive(Clone)]
pub struct AuthService {
    keys: Arc<dyn KeyRepository>,
    domains: Arc<dyn DomainRepository>,
    policies: Arc<dyn PolicyRepository>,
    agent: Arc<dyn PolicyAgent>,
    tokenizer: Tokenizer,
    access_duration: Duration,
    refresh_duration: Duration,
    invitation_duration: Duration,
}

impl AuthService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        keys: Arc<dyn KeyRepository>,
        domains: Arc<dyn DomainRepository>,
        policies: Arc<dyn PolicyRepository>,
        agent: Arc<dyn PolicyAgent>,
        tokenizer: Tokenizer,
        access_duration: Duration,
        refresh_duration: Duration,
        invitation_duration: Duration,
    ) -> Self {
        Self {
            keys,
            domains,
            policies,
            agent,
            tokenizer,
            access_duration,
            refresh_duration,
            invitation_duration,
        }
    }

    // -------------------------------------------------------------------------
    // Token operations
    // -------------------------------------------------------------------------

    /// Issue a key of the requested type.
    pub async fn issue(&self, token: &str, key: Key) -> Result<Token, AuthError> {
        let mut key = key;
        key.issued_at = Utc::now();
        match key.key_type {
            KeyType::Api => self.api_key(token, key).await,
            KeyType::Refresh => self.refresh_key(token, key).await,
            KeyType::Recovery => self.recovery_key(key),
            KeyType::Invitation => self.invitation_key(token, key).await,
            KeyType::Access => self.access_key(token, key).await,
        }
    }

    /// Remove the API key `id` issued by the caller.
    pub async fn revoke(&self, token: &str, id: &str) -> Result<(), AuthError> {
        if token.is_empty() {
            return Err(AuthError::Authentication);
        }
        let caller = self
            .tokenizer
            .parse(token)
            .map_err(|_| AuthError::Authentication)?;
        self.keys.remove(&caller.subject, id).await
    }

    /// Fetch the caller's stored API key `id`.
    pub async fn retrieve_key(&self, token: &str, id: &str) -> Result<Key, AuthError> {
        let caller = self
            .tokenizer
            .parse(token)
            .map_err(|_| AuthError::Authentication)?;
        if caller.key_type != KeyType::Access {
            return Err(AuthError::Authentication);
        }
        self.keys.retrieve(&caller.subject, id).await
    }

    /// Validate `token` and return its claims.
    pub async fn identify(&self, token: &str) -> Result<Key, AuthError> {
        let key = match self.tokenizer.parse(token) {
            Ok(key) => key,
            Err(AuthError::KeyExpired) => {
                // best-effort removal of the stored key behind an expired token
                if let Some(expired) = self.tokenizer.parse_expired(token) {
                    if expired.key_type == KeyType::Api && !expired.id.is_empty() {
                        let _ = self.keys.remove(&expired.subject, &expired.id).await;
                    }
                }
                return Err(AuthError::KeyExpired);
            }
            Err(err) => return Err(err),
        };

        match key.key_type {
            KeyType::Access | KeyType::Refresh | KeyType::Recovery | KeyType::Invitation => Ok(key),
            KeyType::Api => {
                let stored = self
                    .keys
                    .retrieve(&key.subject, &key.id)
                    .await
                    .map_err(|_| AuthError::Authentication)?;
                if stored.is_expired() {
                    let _ = self.keys.remove(&key.subject, &key.id).await;
                    return Err(AuthError::KeyExpired);
                }
                Ok(key)
            }
        }
    }

    async fn access_key(&self, token: &str, mut key: Key) -> Result<Token, AuthError> {
        if !token.is_empty() {
            let caller = self
                .tokenizer
                .parse(token)
                .map_err(|_| AuthError::Authentication)?;
            if caller.key_type != KeyType::Access && caller.key_type != KeyType::Refresh {
                return Err(AuthError::Authentication);
            }
            if key.subject.is_empty() {
                key.subject = caller.subject;
            }
            if key.user.is_empty() {
                key.user = caller.user;
            }
            if key.domain.is_empty() {
                key.domain = caller.domain;
            }
        }
        self.issue_pair(key).await
    }

    async fn refresh_key(&self, token: &str, mut key: Key) -> Result<Token, AuthError> {
        if token.is_empty() {
            return Err(AuthError::Authentication);
        }
        let caller = self.tokenizer.parse(token)?;
        if caller.key_type != KeyType::Refresh {
            return Err(AuthError::Authentication);
        }
        key.id = caller.id;
        key.subject = caller.subject;
        key.user = caller.user;
        if key.domain.is_empty() {
            key.domain = caller.domain;
        }
        self.issue_pair(key).await
    }

    async fn issue_pair(&self, mut key: Key) -> Result<Token, AuthError> {
        key.subject = self.check_user_domain(&key).await?;

        key.key_type = KeyType::Access;
        key.expires_at = Some(key.issued_at + self.access_duration);
        let access_token = self.tokenizer.issue(&key)?;

        key.key_type = KeyType::Refresh;
        key.expires_at = Some(key.issued_at + self.refresh_duration);
        let refresh_token = self.tokenizer.issue(&key)?;

        Ok(Token::new(access_token, Some(refresh_token)))
    }

    async fn api_key(&self, token: &str, mut key: Key) -> Result<Token, AuthError> {
        if token.is_empty() {
            return Err(AuthError::Authentication);
        }
        let caller = self
            .tokenizer
            .parse(token)
            .map_err(|_| AuthError::Authentication)?;
        if caller.key_type != KeyType::Access {
            return Err(AuthError::Authentication);
        }

        if key.id.is_empty() {
            key.id = Uuid::new_v4().to_string();
        }
        key.issuer = caller.subject.clone();
        key.subject = caller.subject;
        if key.user.is_empty() {
            key.user = caller.user;
        }
        if key.domain.is_empty() {
            key.domain = caller.domain;
        }

        self.keys.save(&key).await?;
        let access_token = self.tokenizer.issue(&key)?;
        Ok(Token::new(access_token, None))
    }

    fn recovery_key(&self, mut key: Key) -> Result<Token, AuthError> {
        key.expires_at = None;
        let access_token = self.tokenizer.issue(&key)?;
        Ok(Token::new(access_token, None))
    }

    async fn invitation_key(&self, token: &str, mut key: Key) -> Result<Token, AuthError> {
        key.expires_at = Some(key.issued_at + self.invitation_duration);
        if !token.is_empty() {
            let caller = self.tokenizer.parse(token)?;
            if key.subject.is_empty() {
                key.subject = caller.subject;
            }
            if key.user.is_empty() {
                key.user = caller.user;
            }
        }

        key.subject = self
            .check_user_domain(&key)
            .await
            .map_err(|_| AuthError::DomainAuthorization)?;

        let access_token = self.tokenizer.issue(&key)?;
        Ok(Token::new(access_token, None))
    }

    /// Domain admission: platform admins pass as themselves, members pass
    /// as the domain-scoped composite subject.
    async fn check_user_domain(&self, key: &Key) -> Result<String, AuthError> {
        let user_id = if key.subject.is_empty() {
            key.user.clone()
        } else {
            subject_user_id(&key.subject)
        };

        if key.domain.is_empty() {
            return Ok(if key.subject.is_empty() {
                key.user.clone()
            } else {
                key.subject.clone()
            });
        }

        let admin = PolicyReq {
            subject: user_id.clone(),
            subject_type: USER_TYPE.to_string(),
            permission: ADMIN_PERMISSION.to_string(),
            object: GRIDMESH_OBJECT.to_string(),
            object_type: PLATFORM_TYPE.to_string(),
            ..PolicyReq::default()
        };
        if self.authorize(admin).await.is_ok() {
            return Ok(user_id);
        }

        let domain_user = encode_domain_user_id(&key.domain, &user_id);
        let member = PolicyReq {
            subject: domain_user.clone(),
            subject_type: USER_TYPE.to_string(),
            permission: MEMBERSHIP_PERMISSION.to_string(),
            object: key.domain.clone(),
            object_type: DOMAIN_TYPE.to_string(),
            ..PolicyReq::default()
        };
        self.authorize(member).await?;
        Ok(domain_user)
    }

    // -------------------------------------------------------------------------
    // Authorization
    // -------------------------------------------------------------------------

    /// Decide whether the subject may perform the requested action.
    pub async fn authorize(&self, pr: PolicyReq) -> Result<(), AuthError> {
        let mut pr = pr;
        if pr.object_type == PLATFORM_TYPE && pr.object != GRIDMESH_OBJECT {
            return Err(AuthError::Malformed("invalid platform id".to_string()));
        }

        if pr.subject_kind == TOKEN_KIND {
            let key = self.identify(&pr.subject).await?;
            if key.subject.is_empty() {
                return Err(AuthError::Authentication);
            }
            pr.subject = key.subject;
            if pr.domain.is_empty() {
                pr.domain = key.domain;
            }
        }

        self.check_policy(&pr).await
    }

    async fn check_policy(&self, pr: &PolicyReq) -> Result<(), AuthError> {
        if pr.object_type == DOMAIN_TYPE && !pr.object.is_empty() {
            return self.check_domain(pr).await;
        }
        self.agent
            .check_policy(pr)
            .await
            .map_err(|_| AuthError::Authorization)
    }

    /// Domain-scoped check with the status fallback: platform admins may
    /// still act on disabled and frozen domains.
    async fn check_domain(&self, pr: &PolicyReq) -> Result<(), AuthError> {
        if self.agent.check_policy(pr).await.is_ok() {
            return Ok(());
        }

        let domain = self.domains.retrieve_by_id(&pr.object).await?;
        match domain.status() {
            DomainStatus::Disabled | DomainStatus::Freeze => {
                let admin = PolicyReq {
                    subject: pr.subject.clone(),
                    subject_type: pr.subject_type.clone(),
                    permission: ADMIN_PERMISSION.to_string(),
                    object: GRIDMESH_OBJECT.to_string(),
                    object_type: PLATFORM_TYPE.to_string(),
                    ..PolicyReq::default()
                };
                self.agent
                    .check_policy(&admin)
                    .await
                    .map_err(|_| AuthError::DomainAuthorization)
            }
            _ => Err(AuthError::DomainAuthorization),
        }
    }

    // -------------------------------------------------------------------------
    // Policy mutation
    // -------------------------------------------------------------------------

    fn validate_policy(pr: &PolicyReq) -> Result<(), AuthError> {
        if pr.object_type == PLATFORM_TYPE && pr.object != GRIDMESH_OBJECT {
            return Err(AuthError::InvalidPolicy("invalid platform object".to_string()));
        }
        Ok(())
    }

    /// Write one tuple to the agent, mirrored into the policy store.
    pub async fn add_policy(&self, pr: PolicyReq) -> Result<(), AuthError> {
        Self::validate_policy(&pr)?;
        self.agent.add_policy(&pr).await?;
        if let Err(err) = self.policies.add_policy(&pr).await {
            if let Err(rerr) = self.agent.delete_policies(std::slice::from_ref(&pr)).await {
                return Err(AuthError::rollback(rerr, err));
            }
            return Err(err);
        }
        Ok(())
    }

    pub async fn add_policies(&self, prs: Vec<PolicyReq>) -> Result<(), AuthError> {
        for pr in &prs {
            Self::validate_policy(pr)?;
        }
        self.agent.add_policies(&prs).await?;
        if let Err(err) = self.policies.add_policies(&prs).await {
            if let Err(rerr) = self.agent.delete_policies(&prs).await {
                return Err(AuthError::rollback(rerr, err));
            }
            return Err(err);
        }
        Ok(())
    }

    /// Delete every tuple matching the non-empty fields of `pr`.
    pub async fn delete_policy_filter(&self, pr: PolicyReq) -> Result<(), AuthError> {
        Self::validate_policy(&pr)?;
        self.agent.delete_policy_filter(&pr).await?;
        // filter deletions are not replayable, so no compensation here
        self.policies.delete_policy_filter(&pr).await
    }

    pub async fn delete_policies(&self, prs: Vec<PolicyReq>) -> Result<(), AuthError> {
        for pr in &prs {
            Self::validate_policy(pr)?;
        }
        self.agent.delete_policies(&prs).await?;
        if let Err(err) = self.policies.delete_policies(&prs).await {
            if let Err(rerr) = self.agent.add_policies(&prs).await {
                return Err(AuthError::rollback(rerr, err));
            }
            return Err(err);
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Policy listing
    // -------------------------------------------------------------------------

    /// Page through the durable policy mirror. The cursor is the offset of
    /// the next page; an empty token starts from the beginning.
    pub async fn list_policies(
        &self,
        filter: PolicyReq,
        next_page_token: &str,
        limit: u64,
    ) -> Result<(Vec<PolicyReq>, Option<String>), AuthError> {
        let limit = if limit == 0 { DEF_LIST_LIMIT } else { limit };
        let offset: u64 = if next_page_token.is_empty() {
            0
        } else {
            next_page_token
                .parse()
                .map_err(|_| AuthError::Malformed("invalid page token".to_string()))?
        };
        self.policies.retrieve_policies(&filter, offset, limit).await
    }

    pub async fn list_objects(
        &self,
        pr: PolicyReq,
        next_page_token: &str,
        limit: u64,
    ) -> Result<PolicyPage, AuthError> {
        let limit = if limit == 0 { DEF_LIST_LIMIT } else { limit };
        let (policies, next) = self.agent.retrieve_objects(&pr, next_page_token, limit).await?;
        Ok(PolicyPage {
            policies: policies.into_iter().map(|p| p.object).collect(),
            next_page_token: (!next.is_empty()).then_some(next),
        })
    }

    pub async fn list_all_objects(&self, pr: PolicyReq) -> Result<PolicyPage, AuthError> {
        let policies = self.agent.retrieve_all_objects(&pr).await?;
        Ok(PolicyPage {
            policies: policies.into_iter().map(|p| p.object).collect(),
            next_page_token: None,
        })
    }

    pub async fn count_objects(&self, pr: PolicyReq) -> Result<u64, AuthError> {
        self.agent.retrieve_all_objects_count(&pr).await
    }

    pub async fn list_subjects(
        &self,
        pr: PolicyReq,
        next_page_token: &str,
        limit: u64,
    ) -> Result<PolicyPage, AuthError> {
        let limit = if limit == 0 { DEF_LIST_LIMIT } else { limit };
        let (policies, next) = self.agent.retrieve_subjects(&pr, next_page_token, limit).await?;
        Ok(PolicyPage {
            policies: policies.into_iter().map(|p| p.subject).collect(),
            next_page_token: (!next.is_empty()).then_some(next),
        })
    }

    pub async fn list_all_subjects(&self, pr: PolicyReq) -> Result<PolicyPage, AuthError> {
        let policies = self.agent.retrieve_all_subjects(&pr).await?;
        Ok(PolicyPage {
            policies: policies.into_iter().map(|p| p.subject).collect(),
            next_page_token: None,
        })
    }

    pub async fn count_subjects(&self, pr: PolicyReq) -> Result<u64, AuthError> {
        self.agent.retrieve_all_subjects_count(&pr).await
    }

    pub async fn list_permissions(
        &self,
        pr: PolicyReq,
        filter: Vec<String>,
    ) -> Result<Vec<String>, AuthError> {
        self.agent.retrieve_permissions(&pr, &filter).await
    }

    // -------------------------------------------------------------------------
    // Domain lifecycle
    // -------------------------------------------------------------------------

    /// Create a domain and seed its policies, compensating on partial
    /// failure so that either everything exists or nothing does.
    pub async fn create_domain(&self, token: &str, mut domain: Domain) -> Result<Domain, AuthError> {
        let key = self.identify(token).await?;
        let status = domain.status();
        if status != DomainStatus::Enabled && status != DomainStatus::Disabled {
            return Err(AuthError::InvalidStatus);
        }

        domain.id = Uuid::new_v4().to_string();
        domain.created_by = subject_user_id(&key.subject);
        domain.created_at = Utc::now();

        let seeds = Self::domain_seed_policies(&domain.created_by, &domain.id);
        self.agent.add_policies(&seeds).await?;

        if let Err(err) = self.domains.save_policies(&seeds).await {
            if let Err(rerr) = self.agent.delete_policies(&seeds).await {
                return Err(AuthError::rollback(rerr, err));
            }
            return Err(err);
        }

        match self.domains.save(&domain).await {
            Ok(saved) => {
                tracing::info!(id = %saved.id, created_by = %saved.created_by, "Domain created");
                Ok(saved)
            }
            Err(err) => {
                if let Err(rerr) = self.domains.delete_policies(&seeds).await {
                    return Err(AuthError::rollback(rerr, err));
                }
                if let Err(rerr) = self.agent.delete_policies(&seeds).await {
                    return Err(AuthError::rollback(rerr, err));
                }
                Err(err)
            }
        }
    }

    /// The three tuples every new domain starts with: the creator as
    /// administrator and member, and the domain linked under the platform.
    fn domain_seed_policies(user_id: &str, domain_id: &str) -> Vec<PolicyReq> {
        let domain_user = encode_domain_user_id(domain_id, user_id);
        vec![
            PolicyReq {
                domain: domain_id.to_string(),
                subject: domain_user.clone(),
                subject_type: USER_TYPE.to_string(),
                subject_kind: USERS_KIND.to_string(),
                relation: ADMINISTRATOR_RELATION.to_string(),
                object: domain_id.to_string(),
                object_type: DOMAIN_TYPE.to_string(),
                ..PolicyReq::default()
            },
            PolicyReq {
                domain: domain_id.to_string(),
                subject: domain_user,
                subject_type: USER_TYPE.to_string(),
                subject_kind: USERS_KIND.to_string(),
                relation: MEMBER_RELATION.to_string(),
                object: domain_id.to_string(),
                object_type: DOMAIN_TYPE.to_string(),
                ..PolicyReq::default()
            },
            PolicyReq {
                subject: domain_id.to_string(),
                subject_type: DOMAIN_TYPE.to_string(),
                subject_kind: DOMAINS_KIND.to_string(),
                relation: DOMAIN_RELATION.to_string(),
                object: GRIDMESH_OBJECT.to_string(),
                object_type: PLATFORM_TYPE.to_string(),
                ..PolicyReq::default()
            },
        ]
    }

    /// Fetch a domain; callers without membership get the public view.
    pub async fn retrieve_domain(&self, token: &str, id: &str) -> Result<Domain, AuthError> {
        let key = self.identify(token).await?;
        let domain = self
            .domains
            .retrieve_by_id(id)
            .await
            .map_err(|e| AuthError::ViewEntity(anyhow::anyhow!(e)))?;

        let user = subject_user_id(&key.subject);
        let member = PolicyReq {
            subject: encode_domain_user_id(id, &user),
            subject_type: USER_TYPE.to_string(),
            permission: MEMBERSHIP_PERMISSION.to_string(),
            object: id.to_string(),
            object_type: DOMAIN_TYPE.to_string(),
            ..PolicyReq::default()
        };
        if self.authorize(member).await.is_err() {
            return Ok(Domain {
                id: domain.id,
                name: domain.name,
                alias: domain.alias,
                tags: Vec::new(),
                metadata: serde_json::Value::default(),
                status: String::new(),
                created_by: String::new(),
                created_at: domain.created_at,
                updated_by: String::new(),
                updated_at: None,
                permission: None,
            });
        }
        Ok(domain)
    }

    /// Which permissions the caller holds on the domain.
    pub async fn retrieve_domain_permissions(
        &self,
        token: &str,
        id: &str,
    ) -> Result<Vec<String>, AuthError> {
        let key = self.identify(token).await?;
        let user = subject_user_id(&key.subject);
        let subject = encode_domain_user_id(id, &user);

        let member = PolicyReq {
            subject: subject.clone(),
            subject_type: USER_TYPE.to_string(),
            permission: MEMBERSHIP_PERMISSION.to_string(),
            object: id.to_string(),
            object_type: DOMAIN_TYPE.to_string(),
            ..PolicyReq::default()
        };
        self.authorize(member)
            .await
            .map_err(|_| AuthError::DomainAuthorization)?;

        self.domains.retrieve_by_id(id).await?;

        let pr = PolicyReq {
            subject,
            subject_type: USER_TYPE.to_string(),
            object: id.to_string(),
            object_type: DOMAIN_TYPE.to_string(),
            ..PolicyReq::default()
        };
        self.agent.retrieve_permissions(&pr, &[]).await
    }

    pub async fn update_domain(
        &self,
        token: &str,
        id: &str,
        req: DomainReq,
    ) -> Result<Domain, AuthError> {
        let key = self.identify(token).await?;
        let user = subject_user_id(&key.subject);

        let admin = PolicyReq {
            subject: encode_domain_user_id(id, &user),
            subject_type: USER_TYPE.to_string(),
            permission: ADMIN_PERMISSION.to_string(),
            object: id.to_string(),
            object_type: DOMAIN_TYPE.to_string(),
            ..PolicyReq::default()
        };
        self.authorize(admin)
            .await
            .map_err(|_| AuthError::DomainAuthorization)?;

        self.domains.retrieve_by_id(id).await?;
        self.domains.update(id, &user, &req).await
    }

    pub async fn change_domain_status(
        &self,
        token: &str,
        id: &str,
        req: DomainReq,
    ) -> Result<Domain, AuthError> {
        if let Some(status) = req.status {
            if status != DomainStatus::Enabled
                && status != DomainStatus::Disabled
                && status != DomainStatus::Freeze
            {
                return Err(AuthError::InvalidStatus);
            }
        }

        let key = self.identify(token).await?;
        self.domains.retrieve_by_id(id).await?;

        let user = subject_user_id(&key.subject);
        let admin = PolicyReq {
            subject: encode_domain_user_id(id, &user),
            subject_type: USER_TYPE.to_string(),
            permission: ADMIN_PERMISSION.to_string(),
            object: id.to_string(),
            object_type: DOMAIN_TYPE.to_string(),
            ..PolicyReq::default()
        };
        self.authorize(admin)
            .await
            .map_err(|_| AuthError::DomainAuthorization)?;

        self.domains.update(id, &user, &req).await
    }

    /// Domains visible to the caller; platform admins see everything.
    pub async fn list_domains(&self, token: &str, mut page: Page) -> Result<DomainsPage, AuthError> {
        let key = self.identify(token).await?;
        let user = subject_user_id(&key.subject);
        page.subject_id = Some(user.clone());

        let admin = PolicyReq {
            subject: user,
            subject_type: USER_TYPE.to_string(),
            permission: ADMIN_PERMISSION.to_string(),
            object: GRIDMESH_OBJECT.to_string(),
            object_type: PLATFORM_TYPE.to_string(),
            ..PolicyReq::default()
        };
        if self.agent.check_policy(&admin).await.is_ok() {
            page.subject_id = None;
        }

        self.domains
            .list_domains(&page)
            .await
            .map_err(|e| AuthError::ViewEntity(anyhow::anyhow!(e)))
    }

    /// Grant `relation` on the domain to each user.
    pub async fn assign_users(
        &self,
        token: &str,
        domain_id: &str,
        user_ids: &[String],
        relation: &str,
    ) -> Result<(), AuthError> {
        // the caller needs both share and view on the domain
        for permission in [SHARE_PERMISSION, VIEW_PERMISSION] {
            let pr = PolicyReq {
                subject: token.to_string(),
                subject_type: USER_TYPE.to_string(),
                subject_kind: TOKEN_KIND.to_string(),
                permission: permission.to_string(),
                object: domain_id.to_string(),
                object_type: DOMAIN_TYPE.to_string(),
                ..PolicyReq::default()
            };
            self.authorize(pr).await?;
        }

        // every assignee must exist on the platform
        for user_id in user_ids {
            let pr = PolicyReq {
                subject: user_id.clone(),
                subject_type: USER_TYPE.to_string(),
                permission: MEMBERSHIP_PERMISSION.to_string(),
                object: GRIDMESH_OBJECT.to_string(),
                object_type: PLATFORM_TYPE.to_string(),
                ..PolicyReq::default()
            };
            self.authorize(pr)
                .await
                .map_err(|_| AuthError::DomainAuthorization)?;
        }

        let policies: Vec<PolicyReq> = user_ids
            .iter()
            .map(|user_id| PolicyReq {
                domain: domain_id.to_string(),
                subject: encode_domain_user_id(domain_id, user_id),
                subject_type: USER_TYPE.to_string(),
                subject_kind: USERS_KIND.to_string(),
                relation: relation.to_string(),
                object: domain_id.to_string(),
                object_type: DOMAIN_TYPE.to_string(),
                ..PolicyReq::default()
            })
            .collect();

        self.agent.add_policies(&policies).await?;
        if let Err(err) = self.domains.save_policies(&policies).await {
            if let Err(rerr) = self.agent.delete_policies(&policies).await {
                return Err(AuthError::rollback(rerr, err));
            }
            return Err(err);
        }

        tracing::info!(domain_id = domain_id, users = user_ids.len(), relation = relation, "Users assigned to domain");
        Ok(())
    }

    /// Remove every relation the users hold on the domain.
    pub async fn unassign_users(
        &self,
        token: &str,
        domain_id: &str,
        user_ids: &[String],
    ) -> Result<(), AuthError> {
        let admin = PolicyReq {
            subject: token.to_string(),
            subject_type: USER_TYPE.to_string(),
            subject_kind: TOKEN_KIND.to_string(),
            permission: ADMIN_PERMISSION.to_string(),
            object: domain_id.to_string(),
            object_type: DOMAIN_TYPE.to_string(),
            ..PolicyReq::default()
        };
        self.authorize(admin).await?;

        let policies: Vec<PolicyReq> = user_ids
            .iter()
            .map(|user_id| PolicyReq {
                domain: domain_id.to_string(),
                subject: encode_domain_user_id(domain_id, user_id),
                subject_type: USER_TYPE.to_string(),
                object: domain_id.to_string(),
                object_type: DOMAIN_TYPE.to_string(),
                ..PolicyReq::default()
            })
            .collect();

        self.agent.delete_policies(&policies).await?;
        self.domains.delete_policies(&policies).await?;

        tracing::info!(domain_id = domain_id, users = user_ids.len(), "Users unassigned from domain");
        Ok(())
    }

    /// Domains a user belongs to. Only the user themselves or a platform
    /// admin may ask.
    pub async fn list_user_domains(
        &self,
        token: &str,
        user_id: &str,
        mut page: Page,
    ) -> Result<DomainsPage, AuthError> {
        let key = self.identify(token).await?;
        let caller = subject_user_id(&key.subject);

        let admin = PolicyReq {
            subject: caller.clone(),
            subject_type: USER_TYPE.to_string(),
            permission: ADMIN_PERMISSION.to_string(),
            object: GRIDMESH_OBJECT.to_string(),
            object_type: PLATFORM_TYPE.to_string(),
            ..PolicyReq::default()
        };
        if self.agent.check_policy(&admin).await.is_err() && caller != user_id {
            return Err(AuthError::Authorization);
        }

        page.subject_id = Some(user_id.to_string());
        self.domains
            .list_domains(&page)
            .await
            .map_err(|e| AuthError::ViewEntity(anyhow::anyhow!(e)))
    }
}
