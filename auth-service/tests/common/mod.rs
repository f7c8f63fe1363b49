//! Test helper module for auth-service integration tests.
//!
//! Wires an `AuthService` to the in-memory stores and relation agent so the
//! full orchestration paths run without PostgreSQL or the engine.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::Duration;

use auth_service::db::{MockDomainRepository, MockKeyRepository, MockPolicyRepository};
use auth_service::models::policy::{
    encode_domain_user_id, ADMINISTRATOR_RELATION, DOMAIN_TYPE, GRIDMESH_OBJECT, MEMBER_RELATION,
    PLATFORM_TYPE, USER_TYPE,
};
use auth_service::models::{Domain, DomainStatus, Key, KeyType, PolicyReq, Token};
use auth_service::services::{AuthService, MockPolicyAgent, Tokenizer};

pub const SECRET: &[u8] = b"integration-test-secret";
pub const USER_ID: &str = "d4ebb847-5d0e-4e46-bdd9-b6aceaaa3a22";
pub const USER_EMAIL: &str = "test@example.com";

pub struct TestAuth {
    pub svc: AuthService,
    pub keys: Arc<MockKeyRepository>,
    pub domains: Arc<MockDomainRepository>,
    pub policies: Arc<MockPolicyRepository>,
    pub agent: Arc<MockPolicyAgent>,
    pub tokenizer: Tokenizer,
}

pub fn test_auth() -> TestAuth {
    let keys = Arc::new(MockKeyRepository::new());
    let domains = Arc::new(MockDomainRepository::new());
    let policies = Arc::new(MockPolicyRepository::new());
    let agent = Arc::new(MockPolicyAgent::new());
    let tokenizer = Tokenizer::new(SECRET);

    let svc = AuthService::new(
        keys.clone(),
        domains.clone(),
        policies.clone(),
        agent.clone(),
        tokenizer.clone(),
        Duration::minutes(30),
        Duration::hours(24),
        Duration::hours(168),
    );

    TestAuth {
        svc,
        keys,
        domains,
        policies,
        agent,
        tokenizer,
    }
}

impl TestAuth {
    /// Issue an access/refresh pair for the default test user.
    pub async fn login(&self) -> Token {
        self.login_as(USER_ID).await
    }

    pub async fn login_as(&self, subject: &str) -> Token {
        self.svc
            .issue(
                "",
                Key {
                    key_type: KeyType::Access,
                    subject: subject.to_string(),
                    user: USER_EMAIL.to_string(),
                    ..Key::default()
                },
            )
            .await
            .expect("login expected to succeed")
    }

    /// Issue a domain-scoped access pair; the subject must already be a
    /// member of (or platform admin over) the domain.
    pub async fn login_to_domain(&self, subject: &str, domain_id: &str) -> Token {
        self.svc
            .issue(
                "",
                Key {
                    key_type: KeyType::Access,
                    subject: subject.to_string(),
                    user: USER_EMAIL.to_string(),
                    domain: domain_id.to_string(),
                    ..Key::default()
                },
            )
            .await
            .expect("domain login expected to succeed")
    }

    pub fn grant_platform_admin(&self, user_id: &str) {
        self.agent.seed(PolicyReq {
            subject: user_id.to_string(),
            subject_type: USER_TYPE.to_string(),
            relation: ADMINISTRATOR_RELATION.to_string(),
            object: GRIDMESH_OBJECT.to_string(),
            object_type: PLATFORM_TYPE.to_string(),
            ..PolicyReq::default()
        });
    }

    pub fn grant_platform_membership(&self, user_id: &str) {
        self.agent.seed(PolicyReq {
            subject: user_id.to_string(),
            subject_type: USER_TYPE.to_string(),
            relation: MEMBER_RELATION.to_string(),
            object: GRIDMESH_OBJECT.to_string(),
            object_type: PLATFORM_TYPE.to_string(),
            ..PolicyReq::default()
        });
    }

    /// Grant `relation` on `domain_id` to `user_id` through the agent,
    /// using the domain-scoped composite subject.
    pub fn grant_domain_relation(&self, domain_id: &str, user_id: &str, relation: &str) {
        self.agent.seed(PolicyReq {
            domain: domain_id.to_string(),
            subject: encode_domain_user_id(domain_id, user_id),
            subject_type: USER_TYPE.to_string(),
            relation: relation.to_string(),
            object: domain_id.to_string(),
            object_type: DOMAIN_TYPE.to_string(),
            ..PolicyReq::default()
        });
    }

    /// Insert a domain row directly into the store.
    pub fn seed_domain(&self, id: &str, status: DomainStatus) -> Domain {
        let mut domain = Domain::new(
            format!("domain-{id}"),
            format!("alias-{id}"),
            vec![],
            serde_json::json!({}),
            status,
            USER_ID.to_string(),
        );
        domain.id = id.to_string();
        self.domains.seed(domain.clone());
        domain
    }
}
