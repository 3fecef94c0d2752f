//! Runs against the database named by `DATABASE_URL`. Ignored by default:
//! `DATABASE_URL=postgres://... cargo test --test postgres_ledger -- --ignored`.

use std::sync::Arc;

use futures_util::future::join_all;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use referral_ledger::repositories::postgres::PgLedgerStore;
use referral_ledger::repositories::{LedgerStore, StoreError};
use referral_ledger::services::codes::CodeGenerator;
use referral_ledger::services::referrals::ReferralRequestHandler;
use referral_ledger::services::ReferralError;

const NEEDS_POSTGRES: &str = "needs a Postgres database at DATABASE_URL";

async fn store() -> PgLedgerStore {
    let url = std::env::var("DATABASE_URL").expect(NEEDS_POSTGRES);

    let conn = PgPoolOptions::new()
        .max_connections(20)
        .connect(&url)
        .await
        .unwrap();
    let store = PgLedgerStore::new(conn);
    store.migrate().await.unwrap();
    store
}

/// Ids unique to one test run, so runs do not see each other's rows.
fn id(name: &str) -> String {
    format!("{name}-{}", Uuid::new_v4())
}

#[tokio::test]
#[ignore = "needs a Postgres database at DATABASE_URL"]
async fn unique_constraints_map_to_store_errors() {
    let store = store().await;
    let owner = id("alice");
    let code = id("code");

    store.insert_referrer(&owner, &code).await.unwrap();

    assert_eq!(
        store.insert_referrer(&owner, &id("other")).await,
        Err(StoreError::DuplicateOwner)
    );
    assert_eq!(
        store.insert_referrer(&id("carol"), &code).await,
        Err(StoreError::DuplicateCode)
    );
}

#[tokio::test]
#[ignore = "needs a Postgres database at DATABASE_URL"]
async fn redeem_is_all_or_nothing() {
    let store = store().await;
    let owner = id("alice");
    let code = id("code");
    let bob = id("bob");
    store.insert_referrer(&owner, &code).await.unwrap();

    assert_eq!(
        store.redeem(&id("missing"), &bob).await,
        Err(StoreError::CodeNotFound)
    );
    assert!(!store.has_redeemed(&bob).await.unwrap());

    let referrer = store.redeem(&code, &bob).await.unwrap();
    assert_eq!(referrer.count, 1);
    assert!(store.has_redeemed(&bob).await.unwrap());

    assert_eq!(store.redeem(&code, &bob).await, Err(StoreError::AlreadyRedeemed));
    assert_eq!(
        store.redeem(&id("missing"), &bob).await,
        Err(StoreError::AlreadyRedeemed)
    );
    let referrer = store.get_referrer_by_code(&code).await.unwrap().unwrap();
    assert_eq!(referrer.count, 1);
    assert_eq!(store.redemptions_for_code(&code).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore = "needs a Postgres database at DATABASE_URL"]
async fn concurrent_redemptions_against_postgres() {
    let store = store().await;
    let handler = ReferralRequestHandler::new(
        Arc::new(store),
        CodeGenerator::default(),
        "https://t.me/example_channel".to_string(),
    );
    let owner = id("alice");
    let code = handler.create(&owner).await.unwrap();

    let distinct = (0..50).map(|n| {
        let handler = handler.clone();
        let code = code.clone();
        tokio::spawn(async move { handler.redeem(&id(&format!("user{n}")), &code).await })
    });
    assert!(join_all(distinct).await.into_iter().all(|r| r.unwrap().is_ok()));
    assert_eq!(handler.check(&owner).await, Ok(50));

    let bob = id("bob");
    let duplicates = (0..50).map(|_| {
        let handler = handler.clone();
        let code = code.clone();
        let bob = bob.clone();
        tokio::spawn(async move { handler.redeem(&bob, &code).await })
    });
    let results: Vec<_> = join_all(duplicates)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| **r == Err(ReferralError::AlreadyRedeemed))
            .count(),
        49
    );
    assert_eq!(handler.check(&owner).await, Ok(51));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore = "needs a Postgres database at DATABASE_URL"]
async fn concurrent_creates_against_postgres() {
    let store = store().await;
    let handler = ReferralRequestHandler::new(
        Arc::new(store),
        CodeGenerator::default(),
        "https://t.me/example_channel".to_string(),
    );
    let owner = id("alice");

    let tasks = (0..20).map(|_| {
        let handler = handler.clone();
        let owner = owner.clone();
        tokio::spawn(async move { handler.create(&owner).await })
    });
    let codes: Vec<String> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    assert!(codes.iter().all(|code| *code == codes[0]));
}
