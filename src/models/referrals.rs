use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, sqlx::FromRow)]
pub struct Referrer {
    pub owner_id: String,
    pub code: String,
    pub count: i64,
    pub created_at: chrono::NaiveDateTime,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, sqlx::FromRow)]
pub struct Redemption {
    pub redeemer_id: String,
    pub code: String,
    pub redeemed_at: chrono::NaiveDateTime,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewReferral {
    pub owner_id: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewRedemption {
    pub redeemer_id: String,
    pub code: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChatCommand {
    pub user_id: String,
    pub text: String,
}
