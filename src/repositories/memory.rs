use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{LedgerStore, StoreError};
use crate::models::referrals::{Redemption, Referrer};

#[derive(Default)]
struct Ledger {
    referrers: HashMap<String, Referrer>,
    owners_by_code: HashMap<String, String>,
    redemptions: HashMap<String, Redemption>,
}

impl Ledger {
    fn referrer_by_code(&self, code: &str) -> Option<&Referrer> {
        self.owners_by_code
            .get(code)
            .and_then(|owner_id| self.referrers.get(owner_id))
    }
}

/// A ledger held in process memory. Every operation takes the same lock, so
/// `redeem` is trivially atomic with respect to every other call.
#[derive(Clone, Default)]
pub struct MemoryLedgerStore {
    ledger: Arc<Mutex<Ledger>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn get_referrer_by_owner(&self, owner_id: &str) -> Result<Option<Referrer>, StoreError> {
        let ledger = self.ledger.lock().await;
        Ok(ledger.referrers.get(owner_id).cloned())
    }

    async fn get_referrer_by_code(&self, code: &str) -> Result<Option<Referrer>, StoreError> {
        let ledger = self.ledger.lock().await;
        Ok(ledger.referrer_by_code(code).cloned())
    }

    async fn insert_referrer(&self, owner_id: &str, code: &str) -> Result<Referrer, StoreError> {
        let mut ledger = self.ledger.lock().await;

        if ledger.referrers.contains_key(owner_id) {
            return Err(StoreError::DuplicateOwner);
        }
        if ledger.owners_by_code.contains_key(code) {
            return Err(StoreError::DuplicateCode);
        }

        let referrer = Referrer {
            owner_id: owner_id.to_string(),
            code: code.to_string(),
            count: 0,
            created_at: chrono::Utc::now().naive_utc(),
        };
        ledger
            .owners_by_code
            .insert(code.to_string(), owner_id.to_string());
        ledger
            .referrers
            .insert(owner_id.to_string(), referrer.clone());

        Ok(referrer)
    }

    async fn has_redeemed(&self, redeemer_id: &str) -> Result<bool, StoreError> {
        let ledger = self.ledger.lock().await;
        Ok(ledger.redemptions.contains_key(redeemer_id))
    }

    async fn redeem(&self, code: &str, redeemer_id: &str) -> Result<Referrer, StoreError> {
        let mut ledger = self.ledger.lock().await;

        if ledger.redemptions.contains_key(redeemer_id) {
            return Err(StoreError::AlreadyRedeemed);
        }
        let owner_id = ledger
            .owners_by_code
            .get(code)
            .cloned()
            .ok_or(StoreError::CodeNotFound)?;

        let referrer = ledger
            .referrers
            .get_mut(&owner_id)
            .ok_or(StoreError::CodeNotFound)?;
        referrer.count += 1;
        let referrer = referrer.clone();

        ledger.redemptions.insert(
            redeemer_id.to_string(),
            Redemption {
                redeemer_id: redeemer_id.to_string(),
                code: code.to_string(),
                redeemed_at: chrono::Utc::now().naive_utc(),
            },
        );

        Ok(referrer)
    }

    async fn redemptions_for_code(&self, code: &str) -> Result<Vec<Redemption>, StoreError> {
        let ledger = self.ledger.lock().await;

        let mut redemptions: Vec<Redemption> = ledger
            .redemptions
            .values()
            .filter(|redemption| redemption.code == code)
            .cloned()
            .collect();
        redemptions.sort_by(|a, b| {
            a.redeemed_at
                .cmp(&b.redeemed_at)
                .then_with(|| a.redeemer_id.cmp(&b.redeemer_id))
        });

        Ok(redemptions)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_rejects_duplicate_owner_and_code() {
        let store = MemoryLedgerStore::new();
        store.insert_referrer("alice", "abc").await.unwrap();

        assert_eq!(
            store.insert_referrer("alice", "xyz").await,
            Err(StoreError::DuplicateOwner)
        );
        assert_eq!(
            store.insert_referrer("carol", "abc").await,
            Err(StoreError::DuplicateCode)
        );
        assert!(store.get_referrer_by_code("xyz").await.unwrap().is_none());
        assert!(store.get_referrer_by_owner("carol").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn redeem_records_redemption_and_increments_count() {
        let store = MemoryLedgerStore::new();
        store.insert_referrer("alice", "abc").await.unwrap();

        let referrer = store.redeem("abc", "bob").await.unwrap();
        assert_eq!(referrer.owner_id, "alice");
        assert_eq!(referrer.count, 1);
        assert!(store.has_redeemed("bob").await.unwrap());

        let redemptions = store.redemptions_for_code("abc").await.unwrap();
        assert_eq!(redemptions.len(), 1);
        assert_eq!(redemptions[0].redeemer_id, "bob");
    }

    #[tokio::test]
    async fn unknown_code_leaves_no_redemption() {
        let store = MemoryLedgerStore::new();

        assert_eq!(store.redeem("nope", "bob").await, Err(StoreError::CodeNotFound));
        assert!(!store.has_redeemed("bob").await.unwrap());
    }

    #[tokio::test]
    async fn already_redeemed_wins_over_unknown_code() {
        let store = MemoryLedgerStore::new();
        store.insert_referrer("alice", "abc").await.unwrap();
        store.redeem("abc", "bob").await.unwrap();

        assert_eq!(store.redeem("nope", "bob").await, Err(StoreError::AlreadyRedeemed));
        assert_eq!(store.redeem("abc", "bob").await, Err(StoreError::AlreadyRedeemed));
        assert_eq!(store.get_referrer_by_code("abc").await.unwrap().unwrap().count, 1);
    }
}
