use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use super::codes::CodeGenerator;
use super::{ReferralError, RequestHandler, Service};
use crate::models::referrals::Redemption;
use crate::repositories::{LedgerStore, StoreError};

pub enum ReferralRequest {
    Create {
        owner_id: String,
        response: oneshot::Sender<Result<String, ReferralError>>,
    },
    Check {
        owner_id: String,
        response: oneshot::Sender<Result<i64, ReferralError>>,
    },
    Redeem {
        redeemer_id: String,
        code: String,
        response: oneshot::Sender<Result<RedeemOutcome, ReferralError>>,
    },
    Redemptions {
        owner_id: String,
        response: oneshot::Sender<Result<Vec<Redemption>, ReferralError>>,
    },
    Health {
        response: oneshot::Sender<Result<(), ReferralError>>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RedeemOutcome {
    pub referrer_id: String,
    pub code: String,
    pub count: i64,
    pub invite_link: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum ReferralEvent {
    Redeemed {
        referrer_id: String,
        redeemer_id: String,
        count: i64,
    },
}

/// Sends a request built by `build` down `channel` and waits for its answer.
pub async fn request<T>(
    channel: &mpsc::Sender<ReferralRequest>,
    build: impl FnOnce(oneshot::Sender<Result<T, ReferralError>>) -> ReferralRequest,
) -> Result<T, ReferralError> {
    let (response_tx, response_rx) = oneshot::channel();

    channel
        .send(build(response_tx))
        .await
        .map_err(|e| ReferralError::Internal(format!("Referral service unreachable: {}", e)))?;

    response_rx
        .await
        .map_err(|e| ReferralError::Internal(format!("Referral service dropped request: {}", e)))?
}

fn require_identity(id: &str) -> Result<&str, ReferralError> {
    if id.trim().is_empty() {
        return Err(ReferralError::MissingIdentity);
    }
    Ok(id)
}

#[derive(Clone)]
pub struct ReferralRequestHandler {
    store: Arc<dyn LedgerStore>,
    generator: CodeGenerator,
    invite_link: String,
    events: Option<mpsc::Sender<ReferralEvent>>,
}

impl ReferralRequestHandler {
    pub fn new(store: Arc<dyn LedgerStore>, generator: CodeGenerator, invite_link: String) -> Self {
        ReferralRequestHandler {
            store,
            generator,
            invite_link,
            events: None,
        }
    }

    pub fn with_events(mut self, events: mpsc::Sender<ReferralEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Returns the owner's code, minting one on the first call.
    pub async fn create(&self, owner_id: &str) -> Result<String, ReferralError> {
        let owner_id = require_identity(owner_id)?;

        if let Some(referrer) = self.store.get_referrer_by_owner(owner_id).await? {
            log::debug!("{owner_id} already owns code {}.", referrer.code);
            return Ok(referrer.code);
        }

        // Lookups and insert races draw from the same attempt budget; once it
        // is spent `generate_counted` fails with GenerationExhausted.
        let mut attempts = 0;
        loop {
            let code = self
                .generator
                .generate_counted(self.store.as_ref(), owner_id, &mut attempts)
                .await?;

            match self.store.insert_referrer(owner_id, &code).await {
                Ok(referrer) => {
                    log::info!("Created referral code {} for {owner_id}.", referrer.code);
                    return Ok(referrer.code);
                }
                Err(StoreError::DuplicateCode) => {
                    log::debug!("Code {code} was taken before insert, drawing again.");
                }
                Err(StoreError::DuplicateOwner) => {
                    // A concurrent create for the same owner won.
                    return self
                        .store
                        .get_referrer_by_owner(owner_id)
                        .await?
                        .map(|referrer| referrer.code)
                        .ok_or_else(|| {
                            ReferralError::Internal(format!(
                                "Referrer {owner_id} vanished after a duplicate insert"
                            ))
                        });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub async fn check(&self, owner_id: &str) -> Result<i64, ReferralError> {
        let owner_id = require_identity(owner_id)?;

        self.store
            .get_referrer_by_owner(owner_id)
            .await?
            .map(|referrer| referrer.count)
            .ok_or(ReferralError::NotFound)
    }

    pub async fn redeem(
        &self,
        redeemer_id: &str,
        code: &str,
    ) -> Result<RedeemOutcome, ReferralError> {
        let redeemer_id = require_identity(redeemer_id)?;
        if code.trim().is_empty() {
            return Err(ReferralError::MissingCode);
        }

        // Unknown codes fall through so the store decides between
        // AlreadyRedeemed and CodeNotFound.
        if let Some(referrer) = self.store.get_referrer_by_code(code).await? {
            if referrer.owner_id == redeemer_id {
                log::warn!("{redeemer_id} tried to redeem their own code {code}.");
                return Err(ReferralError::SelfReferral);
            }
        }

        let referrer = self.store.redeem(code, redeemer_id).await.map_err(|e| {
            log::warn!("Redemption of {code} by {redeemer_id} rejected: {e}");
            ReferralError::from(e)
        })?;
        log::info!(
            "{redeemer_id} redeemed {code}; {} now has {} referrals.",
            referrer.owner_id,
            referrer.count
        );

        self.notify(ReferralEvent::Redeemed {
            referrer_id: referrer.owner_id.clone(),
            redeemer_id: redeemer_id.to_string(),
            count: referrer.count,
        });

        Ok(RedeemOutcome {
            referrer_id: referrer.owner_id,
            code: referrer.code,
            count: referrer.count,
            invite_link: self.invite_link.clone(),
        })
    }

    pub async fn redemptions(&self, owner_id: &str) -> Result<Vec<Redemption>, ReferralError> {
        let owner_id = require_identity(owner_id)?;

        let referrer = self
            .store
            .get_referrer_by_owner(owner_id)
            .await?
            .ok_or(ReferralError::NotFound)?;

        Ok(self.store.redemptions_for_code(&referrer.code).await?)
    }

    pub async fn health(&self) -> Result<(), ReferralError> {
        Ok(self.store.ping().await?)
    }

    fn notify(&self, event: ReferralEvent) {
        if let Some(events) = &self.events {
            if let Err(e) = events.try_send(event) {
                log::warn!("Could not deliver referral event: {}", e);
            }
        }
    }
}

#[async_trait]
impl RequestHandler<ReferralRequest> for ReferralRequestHandler {
    async fn handle_request(&self, request: ReferralRequest) {
        match request {
            ReferralRequest::Create { owner_id, response } => {
                let result = self.create(&owner_id).await;
                let _ = response.send(result);
            }
            ReferralRequest::Check { owner_id, response } => {
                let result = self.check(&owner_id).await;
                let _ = response.send(result);
            }
            ReferralRequest::Redeem {
                redeemer_id,
                code,
                response,
            } => {
                let result = self.redeem(&redeemer_id, &code).await;
                let _ = response.send(result);
            }
            ReferralRequest::Redemptions { owner_id, response } => {
                let result = self.redemptions(&owner_id).await;
                let _ = response.send(result);
            }
            ReferralRequest::Health { response } => {
                let result = self.health().await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct ReferralService;

impl ReferralService {
    pub fn new() -> Self {
        ReferralService {}
    }
}

impl Default for ReferralService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Service<ReferralRequest, ReferralRequestHandler> for ReferralService {}
