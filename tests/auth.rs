//! Bearer issuance and authentication against a real SQLite store.

mod common;

use std::time::{Duration as StdDuration, Instant};

use chrono::{Duration, Utc};
use common::{ScriptedProvider, TOKEN_KEY, TestContext};
use headb::auth::{HashParams, TokenCodec};
use headb::error::Error;
use headb::store::Store;
use headb::types::UserStatus;

fn forging_codec() -> TokenCodec {
    let key: [u8; 32] = TOKEN_KEY.as_bytes().try_into().unwrap();
    TokenCodec::new(&key)
}

#[test]
fn test_issue_then_authenticate() {
    let ctx = TestContext::new();
    let user = ctx.accepted_user("alice");

    let issued = ctx.identity.generate_key_for(&user.id).unwrap();
    let caller = ctx.identity.authenticate(&issued.bearer).unwrap();
    assert_eq!(caller.user_id, user.id);
    assert_eq!(caller.key_id, issued.key.id);

    assert!(matches!(ctx.identity.authenticate(""), Err(Error::Unauthenticated)));
    assert!(matches!(
        ctx.identity.authenticate(&format!("{}x", issued.bearer)),
        Err(Error::Unauthenticated)
    ));
}

#[test]
fn test_raw_verifier_is_never_stored() {
    let ctx = TestContext::new();
    let user = ctx.accepted_user("alice");
    let issued = ctx.identity.generate_key_for(&user.id).unwrap();

    let hashed: String = ctx
        .store
        .connection()
        .query_row("SELECT hashed_value FROM api_keys", [], |row| row.get(0))
        .unwrap();
    assert!(hashed.starts_with("$argon2id$"));
    assert!(!hashed.contains(&issued.bearer));
}

#[test]
fn test_repeated_use_advances_last_used() {
    let ctx = TestContext::new();
    let user = ctx.accepted_user("alice");
    let issued = ctx.identity.generate_key_for(&user.id).unwrap();
    assert!(issued.key.last_used_at.is_none());

    ctx.identity.authenticate(&issued.bearer).unwrap();
    let first = ctx
        .store
        .get_api_key(&issued.key.id)
        .unwrap()
        .unwrap()
        .last_used_at
        .expect("touched");

    std::thread::sleep(StdDuration::from_millis(5));
    ctx.identity.authenticate(&issued.bearer).unwrap();
    let second = ctx
        .store
        .get_api_key(&issued.key.id)
        .unwrap()
        .unwrap()
        .last_used_at
        .expect("touched");

    assert!(second >= first);
    assert_eq!(ctx.count("api_keys"), 1);
}

#[test]
fn test_deleted_key_is_rejected() {
    let ctx = TestContext::new();
    let user = ctx.accepted_user("alice");
    let issued = ctx.identity.generate_key_for(&user.id).unwrap();

    ctx.identity.delete_key(&issued.key.id).unwrap();
    assert!(matches!(
        ctx.identity.authenticate(&issued.bearer),
        Err(Error::Unauthenticated)
    ));
}

#[test]
fn test_wrong_verifier_is_rejected() {
    let ctx = TestContext::new();
    let user = ctx.accepted_user("alice");
    let issued = ctx.identity.generate_key_for(&user.id).unwrap();

    let forged = forging_codec()
        .encrypt("not-the-verifier", &issued.key.id, Utc::now() + Duration::days(1))
        .unwrap();
    assert!(matches!(
        ctx.identity.authenticate(&forged),
        Err(Error::Unauthenticated)
    ));
}

#[test]
fn test_expired_bearer_is_rejected() {
    let ctx = TestContext::new();
    let user = ctx.accepted_user("alice");
    let issued = ctx.identity.generate_key_for(&user.id).unwrap();

    let claims = forging_codec().decrypt(&issued.bearer).unwrap();
    let expired = forging_codec()
        .encrypt(&claims.key_value, &claims.key_id, Utc::now() - Duration::seconds(1))
        .unwrap();
    assert!(matches!(
        ctx.identity.authenticate(&expired),
        Err(Error::Unauthenticated)
    ));
}

#[test]
fn test_only_accepted_users_authenticate() {
    let ctx = TestContext::new();

    for status in [UserStatus::Pending, UserStatus::Denied] {
        let user = ctx.accepted_user(&format!("user-{status}"));
        ctx.store
            .connection()
            .execute(
                "UPDATE users SET status = ?1 WHERE id = ?2",
                [status.as_str(), user.id.as_str()],
            )
            .unwrap();

        let issued = ctx.identity.generate_key_for(&user.id).unwrap();
        assert!(
            matches!(ctx.identity.authenticate(&issued.bearer), Err(Error::Unauthenticated)),
            "{status}"
        );
    }
}

#[test]
fn test_deleted_user_takes_keys_with_it() {
    let ctx = TestContext::new();
    let user = ctx.accepted_user("alice");
    let issued = ctx.identity.generate_key_for(&user.id).unwrap();

    ctx.store.delete_user(&user.id).unwrap();
    assert_eq!(ctx.count("api_keys"), 0);
    assert!(ctx.identity.authenticate(&issued.bearer).is_err());
}

#[test]
fn test_bearer_from_other_deployment_is_rejected() {
    let ctx = TestContext::new();
    let user = ctx.accepted_user("alice");
    let issued = ctx.identity.generate_key_for(&user.id).unwrap();

    let other = TokenCodec::new(&[9u8; 32]);
    let foreign = other
        .encrypt("verifier", &issued.key.id, Utc::now() + Duration::days(1))
        .unwrap();
    assert!(ctx.identity.authenticate(&foreign).is_err());
}

fn median(mut samples: Vec<StdDuration>) -> StdDuration {
    samples.sort();
    samples[samples.len() / 2]
}

#[test]
fn test_unknown_key_costs_as_much_as_wrong_verifier() {
    let params = HashParams {
        memory_kib: 4 * 1024,
        iterations: 2,
        parallelism: 1,
    };
    let ctx = TestContext::build(ScriptedProvider::new(), params);
    let user = ctx.accepted_user("alice");
    let issued = ctx.identity.generate_key_for(&user.id).unwrap();

    let expires = Utc::now() + Duration::days(1);
    let wrong_verifier = forging_codec()
        .encrypt("not-the-verifier", &issued.key.id, expires)
        .unwrap();
    let unknown_key = forging_codec()
        .encrypt("not-the-verifier", "no-such-key", expires)
        .unwrap();

    let time = |bearer: &str| {
        (0..15)
            .map(|_| {
                let start = Instant::now();
                assert!(ctx.identity.authenticate(bearer).is_err());
                start.elapsed()
            })
            .collect::<Vec<_>>()
    };

    let mismatch = median(time(&wrong_verifier));
    let missing = median(time(&unknown_key));

    assert!(missing * 2 >= mismatch, "missing {missing:?} vs mismatch {mismatch:?}");
    assert!(mismatch * 2 >= missing, "missing {missing:?} vs mismatch {mismatch:?}");
}
