//! Grant lifecycle tests run against every in-process backend configuration.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use grantstore::{
    AuthorizationGrant, CachingGrantStorage, GrantStorage, InMemoryGrantStorage, IssuedToken,
    TokenBindingPolicy, TokenKind,
};
use time::{Duration, OffsetDateTime};

fn memory() -> Arc<dyn GrantStorage> {
    Arc::new(InMemoryGrantStorage::new())
}

fn cached() -> Arc<dyn GrantStorage> {
    Arc::new(CachingGrantStorage::new(
        Arc::new(InMemoryGrantStorage::new()),
        StdDuration::from_secs(60),
        1_000,
    ))
}

fn backends() -> Vec<(&'static str, Arc<dyn GrantStorage>)> {
    vec![("memory", memory()), ("cached", cached())]
}

fn grant(client: &str, principal: &str) -> AuthorizationGrant {
    AuthorizationGrant::new(client, principal, "authorization_code")
}

fn with_access_expiry(client: &str, principal: &str, token: &str, expires_at: OffsetDateTime) -> AuthorizationGrant {
    let mut g = grant(client, principal);
    g.bind_tokens(
        IssuedToken::new(token, expires_at - Duration::hours(1)).expiring_at(expires_at),
        None,
        &TokenBindingPolicy::default(),
    );
    g
}

#[tokio::test]
async fn test_end_to_end_scenario() {
    for (name, storage) in backends() {
        let now = OffsetDateTime::now_utc();
        let policy = TokenBindingPolicy::default();

        let mut g = grant("client1", "alice").with_state("abc");
        storage.save(&g).await.unwrap();
        let found = storage.find_by_state("abc").await.unwrap().expect(name);
        assert_eq!(found.id, g.id, "{name}");

        g.bind_authorization_code(IssuedToken::new("code1", now), &policy);
        storage.save(&g).await.unwrap();
        let by_code = storage.find_by_authorization_code("code1").await.unwrap().expect(name);
        assert_eq!(by_code.id, g.id, "{name}");
        assert_eq!(by_code.state.as_deref(), Some("abc"), "{name}");

        g.bind_tokens(
            IssuedToken::new("tok1", now).expiring_at(now + Duration::seconds(3600)),
            None,
            &policy,
        );
        storage.save(&g).await.unwrap();
        let by_access = storage.find_by_access_token("tok1").await.unwrap().expect(name);
        assert_eq!(by_access.id, g.id, "{name}");

        let deleted = storage
            .delete_by_access_token_expires_at_before(now + Duration::seconds(7200))
            .await
            .unwrap();
        assert_eq!(deleted, 1, "{name}");
        assert!(storage.find_by_access_token("tok1").await.unwrap().is_none(), "{name}");
        assert!(storage.find_by_state("abc").await.unwrap().is_none(), "{name}");
    }
}

#[tokio::test]
async fn test_code_exchange_survives_stale_save() {
    for (name, storage) in backends() {
        let now = OffsetDateTime::now_utc();
        let policy = TokenBindingPolicy::default();

        let mut g = grant("client1", "alice").with_state("abc");
        g.bind_authorization_code(
            IssuedToken::new("code1", now).expiring_at(now + Duration::minutes(5)),
            &policy,
        );
        storage.save(&g).await.unwrap();

        let before_exchange = storage.find_by_state("abc").await.unwrap().expect(name);
        let exchanged = storage.consume_authorization_code("code1", now).await.unwrap();
        assert!(exchanged.is_some(), "{name}");

        let updated = before_exchange.with_attributes(serde_json::json!({"scope": "profile"}));
        storage.save(&updated).await.unwrap();

        let second = storage.consume_authorization_code("code1", now).await.unwrap();
        assert!(second.is_none(), "{name}: code exchanged twice");
        let found = storage.find_by_authorization_code("code1").await.unwrap().expect(name);
        assert_eq!(found.attributes["scope"], "profile", "{name}");
    }
}

#[tokio::test]
async fn test_progressive_binding_resolves_to_same_record() {
    for (name, storage) in backends() {
        let now = OffsetDateTime::now_utc();
        let policy = TokenBindingPolicy::default();
        let mut g = grant("client1", "alice").with_state("s-1");
        storage.save(&g).await.unwrap();

        assert!(storage.find_by_authorization_code("c-1").await.unwrap().is_none());

        g.bind_authorization_code(IssuedToken::new("c-1", now), &policy);
        storage.save(&g).await.unwrap();
        assert_eq!(storage.find_by_state("s-1").await.unwrap().unwrap().id, g.id);
        assert_eq!(storage.find_by_authorization_code("c-1").await.unwrap().unwrap().id, g.id);

        g.bind_tokens(
            IssuedToken::new("a-1", now),
            Some(IssuedToken::new("r-1", now)),
            &policy,
        );
        storage.save(&g).await.unwrap();

        for kind in TokenKind::ALL {
            let value = g.token_value(kind).unwrap().to_string();
            let found = storage.find_by_token(&value, Some(kind)).await.unwrap();
            assert_eq!(found.map(|f| f.id), Some(g.id), "{name}: {kind}");
        }
        assert_eq!(storage.count().await.unwrap(), 1, "{name}");
    }
}

#[tokio::test]
async fn test_strict_binding_policy_clears_superseded_keys() {
    for (name, storage) in backends() {
        let now = OffsetDateTime::now_utc();
        let policy = TokenBindingPolicy::strict();
        let mut g = grant("client1", "alice").with_state("s-1");
        storage.save(&g).await.unwrap();

        g.bind_authorization_code(IssuedToken::new("c-1", now), &policy);
        storage.save(&g).await.unwrap();
        assert!(storage.find_by_state("s-1").await.unwrap().is_none(), "{name}");

        g.bind_tokens(IssuedToken::new("a-1", now), None, &policy);
        storage.save(&g).await.unwrap();
        assert!(storage.find_by_authorization_code("c-1").await.unwrap().is_none(), "{name}");
        assert!(storage.find_by_access_token("a-1").await.unwrap().is_some(), "{name}");
    }
}

#[tokio::test]
async fn test_uniqueness_per_key() {
    for (name, storage) in backends() {
        let now = OffsetDateTime::now_utc();

        let mut first = grant("client1", "alice").with_state("s");
        first.bind_authorization_code(IssuedToken::new("c", now), &TokenBindingPolicy::default());
        first.bind_tokens(
            IssuedToken::new("a", now),
            Some(IssuedToken::new("r", now)),
            &TokenBindingPolicy::default(),
        );
        storage.save(&first).await.unwrap();

        let cases: [(TokenKind, AuthorizationGrant); 4] = [
            (TokenKind::State, grant("client2", "bob").with_state("s")),
            (TokenKind::AuthorizationCode, {
                let mut g = grant("client2", "bob");
                g.authorization_code = Some(IssuedToken::new("c", now));
                g
            }),
            (TokenKind::AccessToken, {
                let mut g = grant("client2", "bob");
                g.access_token = Some(IssuedToken::new("a", now));
                g
            }),
            (TokenKind::RefreshToken, {
                let mut g = grant("client2", "bob");
                g.refresh_token = Some(IssuedToken::new("r", now));
                g
            }),
        ];

        for (kind, duplicate) in cases {
            let err = storage.save(&duplicate).await.unwrap_err();
            assert!(err.is_conflict(), "{name}: {kind}");
            assert_eq!(err.conflict_kind(), Some(kind), "{name}");
        }

        // Re-saving the owner with the same values is not a conflict.
        assert!(storage.save(&first).await.is_ok(), "{name}");
        assert_eq!(storage.count().await.unwrap(), 1, "{name}");
    }
}

#[tokio::test]
async fn test_lookup_absent_after_delete() {
    for (name, storage) in backends() {
        let now = OffsetDateTime::now_utc();
        let g = with_access_expiry("client1", "alice", "tok", now + Duration::hours(1));
        let saved = storage.save(&g).await.unwrap();

        let found = storage.find_by_access_token("tok").await.unwrap().unwrap();
        assert_eq!(found, saved, "{name}");

        assert!(storage.delete_by_id(g.id).await.unwrap(), "{name}");
        assert!(storage.find_by_access_token("tok").await.unwrap().is_none(), "{name}");
        assert!(storage.find_by_token("tok", None).await.unwrap().is_none(), "{name}");
    }
}

#[tokio::test]
async fn test_bulk_revocation_matches_both_fields() {
    for (name, storage) in backends() {
        let a1 = grant("client1", "alice").with_state("a1");
        let a2 = grant("client1", "alice").with_state("a2");
        let other_principal = grant("client1", "bob").with_state("b1");
        let other_client = grant("client2", "alice").with_state("c1");
        for g in [&a1, &a2, &other_principal, &other_client] {
            storage.save(g).await.unwrap();
        }

        let listed = storage
            .find_all_by_registered_client_id_and_principal_name("client1", "alice")
            .await
            .unwrap();
        assert_eq!(listed.len(), 2, "{name}");

        let deleted = storage
            .delete_by_registered_client_id_and_principal_name("client1", "alice")
            .await
            .unwrap();
        assert_eq!(deleted, 2, "{name}");

        assert!(storage.find_by_state("a1").await.unwrap().is_none(), "{name}");
        assert!(storage.find_by_state("a2").await.unwrap().is_none(), "{name}");
        assert!(storage.find_by_state("b1").await.unwrap().is_some(), "{name}");
        assert!(storage.find_by_state("c1").await.unwrap().is_some(), "{name}");

        let again = storage
            .delete_by_registered_client_id_and_principal_name("client1", "alice")
            .await
            .unwrap();
        assert_eq!(again, 0, "{name}");
        assert!(
            storage
                .find_all_by_registered_client_id_and_principal_name("client1", "alice")
                .await
                .unwrap()
                .is_empty()
        );
    }
}

#[tokio::test]
async fn test_sweep_boundary_is_strict() {
    for (name, storage) in backends() {
        let t = OffsetDateTime::now_utc();
        let before = with_access_expiry("client1", "alice", "t-1", t - Duration::seconds(1));
        let at = with_access_expiry("client1", "alice", "t", t);
        let after = with_access_expiry("client1", "alice", "t+1", t + Duration::seconds(1));
        for g in [&before, &at, &after] {
            storage.save(g).await.unwrap();
        }

        let deleted = storage.delete_by_access_token_expires_at_before(t).await.unwrap();
        assert_eq!(deleted, 1, "{name}");
        assert!(storage.find_by_access_token("t-1").await.unwrap().is_none(), "{name}");
        assert!(storage.find_by_access_token("t").await.unwrap().is_some(), "{name}");
        assert!(storage.find_by_access_token("t+1").await.unwrap().is_some(), "{name}");

        assert_eq!(storage.delete_by_access_token_expires_at_before(t).await.unwrap(), 0);
    }
}

#[tokio::test]
async fn test_sweep_keeps_live_access_token_with_expired_refresh() {
    for (name, storage) in backends() {
        let now = OffsetDateTime::now_utc();
        let mut g = with_access_expiry("client1", "alice", "tok", now + Duration::hours(1));
        g.refresh_token = Some(IssuedToken::new("ref", now - Duration::days(2)).expiring_at(now - Duration::days(1)));
        storage.save(&g).await.unwrap();

        assert_eq!(storage.delete_by_access_token_expires_at_before(now).await.unwrap(), 0, "{name}");
        assert!(storage.find_by_refresh_token("ref").await.unwrap().is_some(), "{name}");
    }
}

#[tokio::test]
async fn test_invalid_grant_is_rejected() {
    for (name, storage) in backends() {
        let err = storage.save(&grant("", "alice")).await.unwrap_err();
        assert!(err.is_client_error(), "{name}");
        assert!(!err.is_conflict(), "{name}");
        assert_eq!(storage.count().await.unwrap(), 0, "{name}");
    }
}

#[tokio::test]
async fn test_attributes_pass_through() {
    for (name, storage) in backends() {
        let attributes = serde_json::json!({
            "scopes": ["openid", "profile"],
            "nested": {"x": 1}
        });
        let g = grant("client1", "alice")
            .with_state("abc")
            .with_attributes(attributes.clone());
        storage.save(&g).await.unwrap();

        let found = storage.find_by_state("abc").await.unwrap().unwrap();
        assert_eq!(found.attributes, attributes, "{name}");
        assert_eq!(found.authorization_grant_type, "authorization_code", "{name}");
    }
}
