use async_trait::async_trait;
use sqlx::PgPool;

use super::{LedgerStore, StoreError};
use crate::models::referrals::{Redemption, Referrer};

const REFERRERS_OWNER_CONSTRAINT: &str = "referrers_pkey";
const REFERRERS_CODE_CONSTRAINT: &str = "referrers_code_key";
const REDEMPTIONS_REDEEMER_CONSTRAINT: &str = "redemptions_pkey";

#[derive(Clone)]
pub struct PgLedgerStore {
    conn: PgPool,
}

impl PgLedgerStore {
    pub fn new(conn: PgPool) -> Self {
        PgLedgerStore { conn }
    }

    pub async fn migrate(&self) -> Result<(), anyhow::Error> {
        sqlx::migrate!("./migrations").run(&self.conn).await?;
        Ok(())
    }
}

fn map_sqlx_error(error: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_error) = &error {
        if db_error.is_unique_violation() {
            match db_error.constraint() {
                Some(REFERRERS_OWNER_CONSTRAINT) => return StoreError::DuplicateOwner,
                Some(REFERRERS_CODE_CONSTRAINT) => return StoreError::DuplicateCode,
                Some(REDEMPTIONS_REDEEMER_CONSTRAINT) => return StoreError::AlreadyRedeemed,
                _ => {}
            }
        }
    }

    log::error!("Ledger store error: {}", error);
    StoreError::Unavailable(error.to_string())
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn get_referrer_by_owner(&self, owner_id: &str) -> Result<Option<Referrer>, StoreError> {
        log::debug!("Fetching referrer by owner: {}", owner_id);

        sqlx::query_as::<_, Referrer>(
            "SELECT owner_id, code, count, created_at FROM referrers WHERE owner_id = $1",
        )
        .bind(owner_id)
        .fetch_optional(&self.conn)
        .await
        .map_err(map_sqlx_error)
    }

    async fn get_referrer_by_code(&self, code: &str) -> Result<Option<Referrer>, StoreError> {
        log::debug!("Fetching referrer by code: {}", code);

        sqlx::query_as::<_, Referrer>(
            "SELECT owner_id, code, count, created_at FROM referrers WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&self.conn)
        .await
        .map_err(map_sqlx_error)
    }

    async fn insert_referrer(&self, owner_id: &str, code: &str) -> Result<Referrer, StoreError> {
        log::debug!("Inserting referrer: owner={}, code={}", owner_id, code);

        sqlx::query_as::<_, Referrer>(
            r#"
                INSERT INTO referrers (owner_id, code)
                VALUES ($1, $2)
                RETURNING owner_id, code, count, created_at
            "#,
        )
        .bind(owner_id)
        .bind(code)
        .fetch_one(&self.conn)
        .await
        .map_err(map_sqlx_error)
    }

    async fn has_redeemed(&self, redeemer_id: &str) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM redemptions WHERE redeemer_id = $1)",
        )
        .bind(redeemer_id)
        .fetch_one(&self.conn)
        .await
        .map_err(map_sqlx_error)
    }

    async fn redeem(&self, code: &str, redeemer_id: &str) -> Result<Referrer, StoreError> {
        log::debug!("Redeeming code {} for {}", code, redeemer_id);

        // Dropping the transaction on an early return rolls it back.
        let mut tx = self.conn.begin().await.map_err(map_sqlx_error)?;

        let redeemed = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM redemptions WHERE redeemer_id = $1)",
        )
        .bind(redeemer_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        if redeemed {
            return Err(StoreError::AlreadyRedeemed);
        }

        let referrer = sqlx::query_as::<_, Referrer>(
            "SELECT owner_id, code, count, created_at FROM referrers WHERE code = $1 FOR UPDATE",
        )
        .bind(code)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        if referrer.is_none() {
            return Err(StoreError::CodeNotFound);
        }

        // A concurrent redemption by the same user blocks on the primary key
        // until the other transaction finishes, then inserts nothing.
        let inserted = sqlx::query(
            r#"
                INSERT INTO redemptions (redeemer_id, code)
                VALUES ($1, $2)
                ON CONFLICT (redeemer_id) DO NOTHING
            "#,
        )
        .bind(redeemer_id)
        .bind(code)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        if inserted.rows_affected() == 0 {
            return Err(StoreError::AlreadyRedeemed);
        }

        let referrer = sqlx::query_as::<_, Referrer>(
            r#"
                UPDATE referrers SET count = count + 1
                WHERE code = $1
                RETURNING owner_id, code, count, created_at
            "#,
        )
        .bind(code)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(referrer)
    }

    async fn redemptions_for_code(&self, code: &str) -> Result<Vec<Redemption>, StoreError> {
        sqlx::query_as::<_, Redemption>(
            r#"
                SELECT redeemer_id, code, redeemed_at FROM redemptions
                WHERE code = $1
                ORDER BY redeemed_at, redeemer_id
            "#,
        )
        .bind(code)
        .fetch_all(&self.conn)
        .await
        .map_err(map_sqlx_error)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.conn)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }
}
