//! Chat commands understood by the bot, parsed into a closed set of variants.

use std::str::FromStr;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::services::referrals::{self, ReferralRequest};
use crate::services::ReferralError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Create,
    Check,
    Start { code: Option<String> },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Message is empty")]
    Empty,
    #[error("Unknown command: {0}")]
    Unknown(String),
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut parts = text.split_whitespace();
        let head = parts.next().ok_or(CommandError::Empty)?;

        let name = head
            .strip_prefix('/')
            .ok_or_else(|| CommandError::Unknown(head.to_string()))?;
        // Group chats address commands as `/start@SomeBot`.
        let name = match name.split_once('@') {
            Some((name, _)) => name,
            None => name,
        };

        match name.to_ascii_lowercase().as_str() {
            "create" => Ok(Command::Create),
            "check" => Ok(Command::Check),
            "start" => Ok(Command::Start {
                code: parts.next().map(str::to_string),
            }),
            _ => Err(CommandError::Unknown(head.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum CommandReply {
    Created {
        code: String,
        link: String,
    },
    Count {
        count: i64,
    },
    Redeemed {
        referrer_id: String,
        count: i64,
        invite_link: String,
    },
    NoCode {
        invite_link: String,
    },
}

pub fn referral_link(invite_link: &str, code: &str) -> String {
    format!("{invite_link}?start={code}")
}

impl Command {
    pub async fn dispatch(
        self,
        channel: &mpsc::Sender<ReferralRequest>,
        user_id: String,
        invite_link: &str,
    ) -> Result<CommandReply, ReferralError> {
        match self {
            Command::Create => {
                let code = referrals::request(channel, |response| ReferralRequest::Create {
                    owner_id: user_id,
                    response,
                })
                .await?;

                Ok(CommandReply::Created {
                    link: referral_link(invite_link, &code),
                    code,
                })
            }
            Command::Check => {
                let count = referrals::request(channel, |response| ReferralRequest::Check {
                    owner_id: user_id,
                    response,
                })
                .await?;

                Ok(CommandReply::Count { count })
            }
            Command::Start { code: None } => Ok(CommandReply::NoCode {
                invite_link: invite_link.to_string(),
            }),
            Command::Start { code: Some(code) } => {
                let outcome = referrals::request(channel, |response| ReferralRequest::Redeem {
                    redeemer_id: user_id,
                    code,
                    response,
                })
                .await?;

                Ok(CommandReply::Redeemed {
                    referrer_id: outcome.referrer_id,
                    count: outcome.count,
                    invite_link: outcome.invite_link,
                })
            }
        }
    }
}
