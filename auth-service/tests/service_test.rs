//! Token and authorization integration tests over the in-memory backends.

mod common;

use chrono::{Duration, Utc};
use common::{test_auth, USER_EMAIL, USER_ID};

use auth_service::models::policy::{
    encode_domain_user_id, ADMIN_PERMISSION, CONTRIBUTOR_RELATION, DOMAIN_TYPE, GRIDMESH_OBJECT,
    MEMBERSHIP_PERMISSION, MEMBER_RELATION, PLATFORM_TYPE, THING_TYPE, TOKEN_KIND, USERS_KIND,
    USER_TYPE, VIEW_PERMISSION,
};
use auth_service::models::{DomainStatus, Key, KeyType, PolicyReq};
use auth_service::services::AuthError;

#[tokio::test]
async fn issue_access_pair_with_caller_token_keeps_requested_subject() {
    // Arrange
    let auth = test_auth();
    let caller = auth.login().await;

    // Act
    let pair = auth
        .svc
        .issue(
            &caller.access_token,
            Key {
                key_type: KeyType::Access,
                subject: "u1".to_string(),
                ..Key::default()
            },
        )
        .await
        .expect("issue expected to succeed");

    // Assert
    let identity = auth.svc.identify(&pair.access_token).await.expect("identify");
    assert_eq!(identity.subject, "u1");
    assert_eq!(identity.key_type, KeyType::Access);

    let refresh = pair.refresh_token.expect("refresh token expected");
    let identity = auth.svc.identify(&refresh).await.expect("identify refresh");
    assert_eq!(identity.key_type, KeyType::Refresh);
}

#[tokio::test]
async fn issue_access_with_api_caller_token_is_rejected() {
    let auth = test_auth();
    let caller = auth.login().await;
    let api = auth
        .svc
        .issue(
            &caller.access_token,
            Key {
                key_type: KeyType::Api,
                expires_at: Some(Utc::now() + Duration::minutes(10)),
                ..Key::default()
            },
        )
        .await
        .expect("api issue");

    let err = auth
        .svc
        .issue(
            &api.access_token,
            Key {
                key_type: KeyType::Access,
                subject: "u1".to_string(),
                ..Key::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Authentication));
}

#[tokio::test]
async fn domain_login_scopes_the_subject_to_the_domain() {
    // Arrange
    let auth = test_auth();
    auth.seed_domain("d1", DomainStatus::Enabled);
    auth.grant_domain_relation("d1", USER_ID, MEMBER_RELATION);

    // Act
    let pair = auth.login_to_domain(USER_ID, "d1").await;

    // Assert
    let identity = auth.svc.identify(&pair.access_token).await.expect("identify");
    assert_eq!(identity.subject, encode_domain_user_id("d1", USER_ID));
    assert_eq!(identity.domain, "d1");
}

#[tokio::test]
async fn platform_admin_logs_into_any_domain_unscoped() {
    let auth = test_auth();
    auth.grant_platform_admin(USER_ID);

    let pair = auth.login_to_domain(USER_ID, "d1").await;

    let identity = auth.svc.identify(&pair.access_token).await.expect("identify");
    assert_eq!(identity.subject, USER_ID);
}

#[tokio::test]
async fn domain_login_without_membership_fails() {
    let auth = test_auth();

    // no domain row at all
    let err = auth
        .svc
        .issue(
            "",
            Key {
                key_type: KeyType::Access,
                subject: USER_ID.to_string(),
                domain: "missing".to_string(),
                ..Key::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NotFound));

    // disabled domain, caller is neither member nor platform admin
    auth.seed_domain("d1", DomainStatus::Disabled);
    let err = auth
        .svc
        .issue(
            "",
            Key {
                key_type: KeyType::Access,
                subject: USER_ID.to_string(),
                domain: "d1".to_string(),
                ..Key::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::DomainAuthorization));
}

#[tokio::test]
async fn refresh_reissues_the_pair() {
    let auth = test_auth();
    let pair = auth.login().await;
    let refresh = pair.refresh_token.expect("refresh token");

    let next = auth
        .svc
        .issue(
            &refresh,
            Key {
                key_type: KeyType::Refresh,
                ..Key::default()
            },
        )
        .await
        .expect("refresh expected to succeed");

    let identity = auth.svc.identify(&next.access_token).await.expect("identify");
    assert_eq!(identity.subject, USER_ID);
    assert_eq!(identity.user, USER_EMAIL);
}

#[tokio::test]
async fn refresh_rejects_access_and_empty_tokens() {
    let auth = test_auth();
    let pair = auth.login().await;

    let err = auth
        .svc
        .issue(
            &pair.access_token,
            Key {
                key_type: KeyType::Refresh,
                ..Key::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Authentication));

    let err = auth
        .svc
        .issue(
            "",
            Key {
                key_type: KeyType::Refresh,
                ..Key::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Authentication));
}

#[tokio::test]
async fn recovery_key_is_issued_without_caller_token_and_not_persisted() {
    let auth = test_auth();

    let token = auth
        .svc
        .issue(
            "",
            Key {
                key_type: KeyType::Recovery,
                subject: "u1".to_string(),
                ..Key::default()
            },
        )
        .await
        .expect("recovery issue expected to succeed");

    assert!(token.refresh_token.is_none());
    assert!(auth.keys.is_empty());

    let identity = auth.svc.identify(&token.access_token).await.expect("identify");
    assert_eq!(identity.key_type, KeyType::Recovery);
    assert_eq!(identity.subject, "u1");
    assert!(identity.expires_at.is_none());
}

#[tokio::test]
async fn api_key_requires_a_caller_token() {
    let auth = test_auth();

    let err = auth
        .svc
        .issue(
            "",
            Key {
                key_type: KeyType::Api,
                ..Key::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Authentication));
    assert!(auth.keys.is_empty());
}

#[tokio::test]
async fn api_key_round_trip_and_save_failure() {
    let auth = test_auth();
    let caller = auth.login().await;

    let api = auth
        .svc
        .issue(
            &caller.access_token,
            Key {
                key_type: KeyType::Api,
                expires_at: Some(Utc::now() + Duration::minutes(10)),
                ..Key::default()
            },
        )
        .await
        .expect("api issue expected to succeed");
    assert_eq!(auth.keys.len(), 1);

    let identity = auth.svc.identify(&api.access_token).await.expect("identify");
    assert_eq!(identity.key_type, KeyType::Api);
    assert_eq!(identity.subject, USER_ID);

    // store failure surfaces to the caller
    auth.keys
        .fail_save
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let err = auth
        .svc
        .issue(
            &caller.access_token,
            Key {
                key_type: KeyType::Api,
                ..Key::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::CreateEntity(_)));
}

#[tokio::test]
async fn expired_api_key_is_reported_and_reaped() {
    // Arrange
    let auth = test_auth();
    let caller = auth.login().await;
    let api = auth
        .svc
        .issue(
            &caller.access_token,
            Key {
                key_type: KeyType::Api,
                expires_at: Some(Utc::now() - Duration::seconds(2)),
                ..Key::default()
            },
        )
        .await
        .expect("expired api issue still signs");
    assert_eq!(auth.keys.len(), 1);

    // Act
    let err = auth.svc.identify(&api.access_token).await.unwrap_err();

    // Assert: expiry reported and the stored key reaped best-effort
    assert!(matches!(err, AuthError::KeyExpired));
    assert!(auth.keys.is_empty());
}

#[tokio::test]
async fn identify_api_key_missing_from_store_is_authentication() {
    let auth = test_auth();
    let caller = auth.login().await;
    let api = auth
        .svc
        .issue(
            &caller.access_token,
            Key {
                key_type: KeyType::Api,
                expires_at: Some(Utc::now() + Duration::minutes(10)),
                ..Key::default()
            },
        )
        .await
        .expect("api issue");

    let identity = auth.svc.identify(&api.access_token).await.expect("identify");
    auth.svc
        .revoke(&caller.access_token, &identity.id)
        .await
        .expect("revoke");

    let err = auth.svc.identify(&api.access_token).await.unwrap_err();
    assert!(matches!(err, AuthError::Authentication));
}

#[tokio::test]
async fn identify_rejects_garbage_tokens() {
    let auth = test_auth();
    let err = auth.svc.identify("invalid").await.unwrap_err();
    assert!(matches!(err, AuthError::Authentication));
}

#[tokio::test]
async fn invitation_key_checks_domain_admission() {
    let auth = test_auth();

    // no domain requested: signs directly
    let token = auth
        .svc
        .issue(
            "",
            Key {
                key_type: KeyType::Invitation,
                subject: "u1".to_string(),
                ..Key::default()
            },
        )
        .await
        .expect("invitation issue expected to succeed");
    let identity = auth.svc.identify(&token.access_token).await.expect("identify");
    assert_eq!(identity.key_type, KeyType::Invitation);
    assert!(identity.expires_at.is_some());

    // unknown subject against a real domain fails as a domain error
    auth.seed_domain("d1", DomainStatus::Enabled);
    let err = auth
        .svc
        .issue(
            "",
            Key {
                key_type: KeyType::Invitation,
                domain: "d1".to_string(),
                ..Key::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::DomainAuthorization));

    // members are scoped like access keys
    auth.grant_domain_relation("d1", "u2", MEMBER_RELATION);
    let token = auth
        .svc
        .issue(
            "",
            Key {
                key_type: KeyType::Invitation,
                subject: "u2".to_string(),
                domain: "d1".to_string(),
                ..Key::default()
            },
        )
        .await
        .expect("member invitation");
    let identity = auth.svc.identify(&token.access_token).await.expect("identify");
    assert_eq!(identity.subject, encode_domain_user_id("d1", "u2"));
}

#[tokio::test]
async fn revoke_requires_token_and_reports_missing_keys() {
    let auth = test_auth();
    let caller = auth.login().await;

    let err = auth.svc.revoke("", "some-id").await.unwrap_err();
    assert!(matches!(err, AuthError::Authentication));

    let err = auth
        .svc
        .revoke(&caller.access_token, "never-saved")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NotFound));
}

#[tokio::test]
async fn retrieve_key_requires_an_access_token() {
    let auth = test_auth();
    let caller = auth.login().await;
    let api = auth
        .svc
        .issue(
            &caller.access_token,
            Key {
                key_type: KeyType::Api,
                expires_at: Some(Utc::now() + Duration::minutes(10)),
                ..Key::default()
            },
        )
        .await
        .expect("api issue");
    let api_identity = auth.svc.identify(&api.access_token).await.expect("identify");

    // access token works
    let stored = auth
        .svc
        .retrieve_key(&caller.access_token, &api_identity.id)
        .await
        .expect("retrieve key");
    assert_eq!(stored.subject, USER_ID);

    // an API token cannot read keys
    let err = auth
        .svc
        .retrieve_key(&api.access_token, &api_identity.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Authentication));

    // unknown id
    let err = auth
        .svc
        .retrieve_key(&caller.access_token, "missing")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NotFound));
}

#[tokio::test]
async fn authorize_rejects_foreign_platform_objects() {
    // the platform object is a fixed sentinel, regardless of the caller
    let auth = test_auth();
    auth.grant_platform_admin(USER_ID);
    let caller = auth.login().await;

    let err = auth
        .svc
        .authorize(PolicyReq {
            subject: caller.access_token.clone(),
            subject_type: USER_TYPE.to_string(),
            subject_kind: TOKEN_KIND.to_string(),
            object: "not-the-platform".to_string(),
            object_type: PLATFORM_TYPE.to_string(),
            permission: ADMIN_PERMISSION.to_string(),
            ..PolicyReq::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Malformed(_)));
}

#[tokio::test]
async fn authorize_resolves_token_subjects() {
    let auth = test_auth();
    auth.grant_platform_admin(USER_ID);
    let caller = auth.login().await;

    auth.svc
        .authorize(PolicyReq {
            subject: caller.access_token.clone(),
            subject_type: USER_TYPE.to_string(),
            subject_kind: TOKEN_KIND.to_string(),
            object: GRIDMESH_OBJECT.to_string(),
            object_type: PLATFORM_TYPE.to_string(),
            permission: ADMIN_PERMISSION.to_string(),
            ..PolicyReq::default()
        })
        .await
        .expect("platform admin check expected to pass");
}

#[tokio::test]
async fn authorize_denies_unrelated_subjects() {
    let auth = test_auth();

    let err = auth
        .svc
        .authorize(PolicyReq {
            subject: "stranger".to_string(),
            subject_type: USER_TYPE.to_string(),
            subject_kind: USERS_KIND.to_string(),
            object: GRIDMESH_OBJECT.to_string(),
            object_type: PLATFORM_TYPE.to_string(),
            permission: ADMIN_PERMISSION.to_string(),
            ..PolicyReq::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Authorization));
}

#[tokio::test]
async fn platform_admin_acts_on_frozen_and_disabled_domains() {
    // Arrange: frozen domain, caller holds nothing on it but is platform admin
    let auth = test_auth();
    auth.seed_domain("d1", DomainStatus::Freeze);
    auth.grant_platform_admin(USER_ID);
    let caller = auth.login().await;

    // Act / Assert
    auth.svc
        .authorize(PolicyReq {
            subject: caller.access_token.clone(),
            subject_type: USER_TYPE.to_string(),
            subject_kind: TOKEN_KIND.to_string(),
            object: "d1".to_string(),
            object_type: DOMAIN_TYPE.to_string(),
            permission: ADMIN_PERMISSION.to_string(),
            ..PolicyReq::default()
        })
        .await
        .expect("platform admin expected to pass the frozen-domain fallback");

    auth.seed_domain("d2", DomainStatus::Disabled);
    auth.svc
        .authorize(PolicyReq {
            subject: caller.access_token,
            subject_type: USER_TYPE.to_string(),
            subject_kind: TOKEN_KIND.to_string(),
            object: "d2".to_string(),
            object_type: DOMAIN_TYPE.to_string(),
            permission: ADMIN_PERMISSION.to_string(),
            ..PolicyReq::default()
        })
        .await
        .expect("platform admin expected to pass the disabled-domain fallback");
}

#[tokio::test]
async fn non_admins_are_refused_on_frozen_and_enabled_domains() {
    let auth = test_auth();
    auth.seed_domain("d1", DomainStatus::Freeze);
    auth.grant_domain_relation("d1", USER_ID, MEMBER_RELATION);

    // membership does not survive the freeze fallback
    let err = auth
        .svc
        .authorize(PolicyReq {
            subject: encode_domain_user_id("d1", USER_ID),
            subject_type: USER_TYPE.to_string(),
            object: "d1".to_string(),
            object_type: DOMAIN_TYPE.to_string(),
            permission: ADMIN_PERMISSION.to_string(),
            ..PolicyReq::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::DomainAuthorization));

    // an enabled domain with a failing check is an ordinary refusal
    auth.seed_domain("d2", DomainStatus::Enabled);
    let err = auth
        .svc
        .authorize(PolicyReq {
            subject: USER_ID.to_string(),
            subject_type: USER_TYPE.to_string(),
            object: "d2".to_string(),
            object_type: DOMAIN_TYPE.to_string(),
            permission: VIEW_PERMISSION.to_string(),
            ..PolicyReq::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::DomainAuthorization));
}

#[tokio::test]
async fn authorize_with_expired_or_empty_subject_tokens_fails() {
    let auth = test_auth();

    let expired = auth
        .tokenizer
        .issue(&Key {
            key_type: KeyType::Access,
            subject: USER_ID.to_string(),
            issued_at: Utc::now() - Duration::minutes(10),
            expires_at: Some(Utc::now() - Duration::minutes(5)),
            ..Key::default()
        })
        .expect("sign expired token");
    let err = auth
        .svc
        .authorize(PolicyReq {
            subject: expired,
            subject_type: USER_TYPE.to_string(),
            subject_kind: TOKEN_KIND.to_string(),
            object: GRIDMESH_OBJECT.to_string(),
            object_type: PLATFORM_TYPE.to_string(),
            permission: ADMIN_PERMISSION.to_string(),
            ..PolicyReq::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::KeyExpired));

    let empty_subject = auth
        .tokenizer
        .issue(&Key {
            key_type: KeyType::Access,
            expires_at: Some(Utc::now() + Duration::minutes(5)),
            ..Key::default()
        })
        .expect("sign empty-subject token");
    let err = auth
        .svc
        .authorize(PolicyReq {
            subject: empty_subject,
            subject_type: USER_TYPE.to_string(),
            subject_kind: TOKEN_KIND.to_string(),
            object: GRIDMESH_OBJECT.to_string(),
            object_type: PLATFORM_TYPE.to_string(),
            permission: ADMIN_PERMISSION.to_string(),
            ..PolicyReq::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Authentication));
}

#[tokio::test]
async fn add_policy_validates_and_mirrors() {
    let auth = test_auth();

    // platform-object rule
    let err = auth
        .svc
        .add_policy(PolicyReq {
            subject: USER_ID.to_string(),
            subject_type: USER_TYPE.to_string(),
            object: "invalid".to_string(),
            object_type: PLATFORM_TYPE.to_string(),
            permission: ADMIN_PERMISSION.to_string(),
            ..PolicyReq::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidPolicy(_)));
    assert!(auth.agent.tuples().is_empty());

    // happy path writes agent and store
    auth.svc
        .add_policy(PolicyReq {
            subject: USER_ID.to_string(),
            subject_type: USER_TYPE.to_string(),
            relation: CONTRIBUTOR_RELATION.to_string(),
            object: "thing-1".to_string(),
            object_type: THING_TYPE.to_string(),
            ..PolicyReq::default()
        })
        .await
        .expect("add policy");
    assert_eq!(auth.agent.tuples().len(), 1);
    assert_eq!(auth.policies.stored().len(), 1);
}

#[tokio::test]
async fn add_policy_store_failure_reverses_the_agent_write() {
    let auth = test_auth();
    auth.policies
        .fail_add
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let err = auth
        .svc
        .add_policy(PolicyReq {
            subject: USER_ID.to_string(),
            subject_type: USER_TYPE.to_string(),
            relation: CONTRIBUTOR_RELATION.to_string(),
            object: "thing-1".to_string(),
            object_type: THING_TYPE.to_string(),
            ..PolicyReq::default()
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::CreateEntity(_)));
    assert!(auth.agent.tuples().is_empty());
    assert!(auth.policies.stored().is_empty());
}

#[tokio::test]
async fn add_policy_failed_reversal_is_a_rollback_error() {
    let auth = test_auth();
    auth.policies
        .fail_add
        .store(true, std::sync::atomic::Ordering::SeqCst);
    auth.agent
        .fail_delete_policies
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let err = auth
        .svc
        .add_policy(PolicyReq {
            subject: USER_ID.to_string(),
            subject_type: USER_TYPE.to_string(),
            relation: CONTRIBUTOR_RELATION.to_string(),
            object: "thing-1".to_string(),
            object_type: THING_TYPE.to_string(),
            ..PolicyReq::default()
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::Rollback(_)));
}

#[tokio::test]
async fn delete_policies_removes_from_agent_and_store() {
    let auth = test_auth();
    let pr = PolicyReq {
        subject: USER_ID.to_string(),
        subject_type: USER_TYPE.to_string(),
        relation: CONTRIBUTOR_RELATION.to_string(),
        object: "thing-1".to_string(),
        object_type: THING_TYPE.to_string(),
        ..PolicyReq::default()
    };
    auth.svc.add_policy(pr.clone()).await.expect("add policy");

    auth.svc
        .delete_policies(vec![pr])
        .await
        .expect("delete policies");
    assert!(auth.agent.tuples().is_empty());
    assert!(auth.policies.stored().is_empty());
}

#[tokio::test]
async fn list_objects_returns_a_terminal_page() {
    let auth = test_auth();
    for i in 0..3 {
        auth.agent.seed(PolicyReq {
            subject: USER_ID.to_string(),
            subject_type: USER_TYPE.to_string(),
            relation: CONTRIBUTOR_RELATION.to_string(),
            object: format!("thing-{i}"),
            object_type: THING_TYPE.to_string(),
            ..PolicyReq::default()
        });
    }

    let pr = PolicyReq {
        subject: USER_ID.to_string(),
        subject_type: USER_TYPE.to_string(),
        relation: CONTRIBUTOR_RELATION.to_string(),
        object_type: THING_TYPE.to_string(),
        ..PolicyReq::default()
    };

    // limit 0 falls back to the default page size; no cursor means terminal
    let page = auth.svc.list_objects(pr.clone(), "", 0).await.expect("list");
    assert_eq!(page.policies.len(), 3);
    assert!(page.next_page_token.is_none());

    let count = auth.svc.count_objects(pr.clone()).await.expect("count");
    assert_eq!(count, 3);

    let all = auth.svc.list_all_objects(pr).await.expect("list all");
    assert_eq!(all.policies.len(), 3);
}

#[tokio::test]
async fn list_subjects_mirrors_object_lookups() {
    let auth = test_auth();
    auth.agent.seed(PolicyReq {
        subject: "u1".to_string(),
        subject_type: USER_TYPE.to_string(),
        relation: CONTRIBUTOR_RELATION.to_string(),
        object: "thing-1".to_string(),
        object_type: THING_TYPE.to_string(),
        ..PolicyReq::default()
    });
    auth.agent.seed(PolicyReq {
        subject: "u2".to_string(),
        subject_type: USER_TYPE.to_string(),
        relation: CONTRIBUTOR_RELATION.to_string(),
        object: "thing-1".to_string(),
        object_type: THING_TYPE.to_string(),
        ..PolicyReq::default()
    });

    let pr = PolicyReq {
        object: "thing-1".to_string(),
        object_type: THING_TYPE.to_string(),
        permission: VIEW_PERMISSION.to_string(),
        ..PolicyReq::default()
    };

    let page = auth.svc.list_subjects(pr.clone(), "", 10).await.expect("list");
    assert_eq!(page.policies.len(), 2);

    let count = auth.svc.count_subjects(pr).await.expect("count");
    assert_eq!(count, 2);
}

#[tokio::test]
async fn list_policies_pages_the_mirror_and_honours_domain_scope() {
    // Arrange: three thing tuples in d1, one in d2
    let auth = test_auth();
    for i in 0..3 {
        auth.svc
            .add_policy(PolicyReq {
                domain: "d1".to_string(),
                subject: USER_ID.to_string(),
                subject_type: USER_TYPE.to_string(),
                relation: CONTRIBUTOR_RELATION.to_string(),
                object: format!("thing-{i}"),
                object_type: THING_TYPE.to_string(),
                ..PolicyReq::default()
            })
            .await
            .expect("add policy");
    }
    auth.svc
        .add_policy(PolicyReq {
            domain: "d2".to_string(),
            subject: USER_ID.to_string(),
            subject_type: USER_TYPE.to_string(),
            relation: CONTRIBUTOR_RELATION.to_string(),
            object: "thing-other".to_string(),
            object_type: THING_TYPE.to_string(),
            ..PolicyReq::default()
        })
        .await
        .expect("add policy");

    let filter = PolicyReq {
        domain: "d1".to_string(),
        subject: USER_ID.to_string(),
        ..PolicyReq::default()
    };

    // Act: walk the mirror two tuples at a time
    let (first, cursor) = auth
        .svc
        .list_policies(filter.clone(), "", 2)
        .await
        .expect("first page");
    assert_eq!(first.len(), 2);
    let cursor = cursor.expect("cursor expected");

    let (rest, cursor) = auth
        .svc
        .list_policies(filter.clone(), &cursor, 2)
        .await
        .expect("second page");

    // Assert: the d2 tuple never shows up, and the listing terminates
    assert_eq!(rest.len(), 1);
    assert!(cursor.is_none());
    assert!(first.iter().chain(rest.iter()).all(|p| p.domain == "d1"));

    let err = auth
        .svc
        .list_policies(filter, "not-a-cursor", 2)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Malformed(_)));
}

#[tokio::test]
async fn list_permissions_reports_held_permissions() {
    let auth = test_auth();
    auth.grant_domain_relation("d1", USER_ID, MEMBER_RELATION);

    let pr = PolicyReq {
        subject: encode_domain_user_id("d1", USER_ID),
        subject_type: USER_TYPE.to_string(),
        object: "d1".to_string(),
        object_type: DOMAIN_TYPE.to_string(),
        ..PolicyReq::default()
    };

    let held = auth
        .svc
        .list_permissions(
            pr.clone(),
            vec![
                ADMIN_PERMISSION.to_string(),
                MEMBERSHIP_PERMISSION.to_string(),
            ],
        )
        .await
        .expect("list permissions");
    assert_eq!(held, vec![MEMBERSHIP_PERMISSION.to_string()]);

    // empty filter evaluates the whole vocabulary
    let held = auth
        .svc
        .list_permissions(pr, vec![])
        .await
        .expect("list permissions");
    assert_eq!(held, vec![MEMBERSHIP_PERMISSION.to_string()]);
}
