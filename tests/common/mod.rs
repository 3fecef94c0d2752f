#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use referral_ledger::models::referrals::{Redemption, Referrer};
use referral_ledger::repositories::memory::MemoryLedgerStore;
use referral_ledger::repositories::{LedgerStore, StoreError};

/// Fails every call as if the database connection were gone.
pub struct UnavailableStore;

fn unavailable() -> StoreError {
    StoreError::Unavailable("connection refused".to_string())
}

#[async_trait]
impl LedgerStore for UnavailableStore {
    async fn get_referrer_by_owner(&self, _: &str) -> Result<Option<Referrer>, StoreError> {
        Err(unavailable())
    }

    async fn get_referrer_by_code(&self, _: &str) -> Result<Option<Referrer>, StoreError> {
        Err(unavailable())
    }

    async fn insert_referrer(&self, _: &str, _: &str) -> Result<Referrer, StoreError> {
        Err(unavailable())
    }

    async fn has_redeemed(&self, _: &str) -> Result<bool, StoreError> {
        Err(unavailable())
    }

    async fn redeem(&self, _: &str, _: &str) -> Result<Referrer, StoreError> {
        Err(unavailable())
    }

    async fn redemptions_for_code(&self, _: &str) -> Result<Vec<Redemption>, StoreError> {
        Err(unavailable())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(unavailable())
    }
}

/// Reports every drawn code as free, then loses the first `lost_races`
/// inserts to another writer with `DuplicateCode`.
pub struct ContestedStore {
    inner: MemoryLedgerStore,
    lost_races: u32,
    pub code_lookups: AtomicU32,
    pub inserts: AtomicU32,
}

impl ContestedStore {
    pub fn new(lost_races: u32) -> Self {
        ContestedStore {
            inner: MemoryLedgerStore::new(),
            lost_races,
            code_lookups: AtomicU32::new(0),
            inserts: AtomicU32::new(0),
        }
    }

    pub fn code_lookups(&self) -> u32 {
        self.code_lookups.load(Ordering::SeqCst)
    }

    pub fn inserts(&self) -> u32 {
        self.inserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerStore for ContestedStore {
    async fn get_referrer_by_owner(&self, owner_id: &str) -> Result<Option<Referrer>, StoreError> {
        self.inner.get_referrer_by_owner(owner_id).await
    }

    async fn get_referrer_by_code(&self, code: &str) -> Result<Option<Referrer>, StoreError> {
        self.code_lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.get_referrer_by_code(code).await
    }

    async fn insert_referrer(&self, owner_id: &str, code: &str) -> Result<Referrer, StoreError> {
        let attempt = self.inserts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.lost_races {
            return Err(StoreError::DuplicateCode);
        }
        self.inner.insert_referrer(owner_id, code).await
    }

    async fn has_redeemed(&self, redeemer_id: &str) -> Result<bool, StoreError> {
        self.inner.has_redeemed(redeemer_id).await
    }

    async fn redeem(&self, code: &str, redeemer_id: &str) -> Result<Referrer, StoreError> {
        self.inner.redeem(code, redeemer_id).await
    }

    async fn redemptions_for_code(&self, code: &str) -> Result<Vec<Redemption>, StoreError> {
        self.inner.redemptions_for_code(code).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}
