use async_trait::async_trait;

use crate::models::referrals::{Redemption, Referrer};

pub mod memory;
pub mod postgres;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Owner already has a referral code")]
    DuplicateOwner,
    #[error("Referral code is already taken")]
    DuplicateCode,
    #[error("Redeemer has already used a referral code")]
    AlreadyRedeemed,
    #[error("Referral code not found")]
    CodeNotFound,
    #[error("Ledger store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence for referrers and redemptions.
///
/// `redeem` is the only operation that touches both record kinds, and it must
/// apply the redemption insert and the count increment as one unit: either
/// both are visible afterwards or neither is.
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    async fn get_referrer_by_owner(&self, owner_id: &str) -> Result<Option<Referrer>, StoreError>;

    async fn get_referrer_by_code(&self, code: &str) -> Result<Option<Referrer>, StoreError>;

    async fn insert_referrer(&self, owner_id: &str, code: &str) -> Result<Referrer, StoreError>;

    async fn has_redeemed(&self, redeemer_id: &str) -> Result<bool, StoreError>;

    /// Fails with `AlreadyRedeemed` before `CodeNotFound` when both apply.
    async fn redeem(&self, code: &str, redeemer_id: &str) -> Result<Referrer, StoreError>;

    async fn redemptions_for_code(&self, code: &str) -> Result<Vec<Redemption>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
