use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::repositories::{LedgerStore, StoreError};
use crate::settings::Settings;

pub mod codes;
pub mod http;
pub mod referrals;

#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum ReferralError {
    #[error("No referral code exists for this user")]
    NotFound,
    #[error("Users can not redeem their own referral code")]
    SelfReferral,
    #[error("User has already been referred")]
    AlreadyRedeemed,
    #[error("Referral code does not exist")]
    CodeNotFound,
    #[error("Could not generate a unique referral code after {0} attempts")]
    GenerationExhausted(u32),
    #[error("A user identifier is required")]
    MissingIdentity,
    #[error("A referral code is required")]
    MissingCode,
    #[error("Ledger store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReferralError {
    pub fn kind(&self) -> &'static str {
        match self {
            ReferralError::NotFound => "NotFound",
            ReferralError::SelfReferral => "SelfReferral",
            ReferralError::AlreadyRedeemed => "AlreadyRedeemed",
            ReferralError::CodeNotFound => "CodeNotFound",
            ReferralError::GenerationExhausted(_) => "GenerationExhausted",
            ReferralError::MissingIdentity => "MissingIdentity",
            ReferralError::MissingCode => "MissingCode",
            ReferralError::StoreUnavailable(_) => "StoreUnavailable",
            ReferralError::Internal(_) => "Internal",
        }
    }
}

impl From<StoreError> for ReferralError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::AlreadyRedeemed => ReferralError::AlreadyRedeemed,
            StoreError::CodeNotFound => ReferralError::CodeNotFound,
            StoreError::Unavailable(e) => ReferralError::StoreUnavailable(e),
            // Creation races are resolved inside the service.
            e @ (StoreError::DuplicateOwner | StoreError::DuplicateCode) => {
                ReferralError::Internal(e.to_string())
            }
        }
    }
}

#[async_trait]
pub trait RequestHandler<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn handle_request(&self, request: T);
}

#[async_trait]
pub trait Service<T, H>: Send + Sync + 'static
where
    T: Send + 'static,
    H: RequestHandler<T> + Clone + Send,
{
    async fn run(&mut self, handler: H, receiver: &mut mpsc::Receiver<T>) {
        while let Some(request) = receiver.recv().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                handler.handle_request(request).await;
            });
        }
    }
}

pub async fn start_services(
    store: Arc<dyn LedgerStore>,
    settings: Settings,
    listen: String,
) -> Result<(), anyhow::Error> {
    let (referral_tx, mut referral_rx) = mpsc::channel(512);
    let (event_tx, mut event_rx) = mpsc::channel(512);

    let mut referral_service = referrals::ReferralService::new();

    log::info!("Starting referral service.");
    let generator = codes::CodeGenerator::new(settings.codes.length, settings.codes.max_attempts);
    let handler = referrals::ReferralRequestHandler::new(
        store,
        generator,
        settings.channel.invite_link.clone(),
    )
    .with_events(event_tx);
    tokio::spawn(async move {
        referral_service.run(handler, &mut referral_rx).await;
    });

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                referrals::ReferralEvent::Redeemed {
                    referrer_id,
                    redeemer_id,
                    count,
                } => {
                    log::info!("{redeemer_id} joined through {referrer_id}, who has now referred {count} users.");
                }
            }
        }
    });

    log::info!("Starting HTTP server.");
    http::start_http_server(&listen, referral_tx, settings.channel.invite_link).await
}
