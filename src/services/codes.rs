use uuid::Uuid;

use super::ReferralError;
use crate::repositories::LedgerStore;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
// Largest multiple of the alphabet size that fits in a byte.
const UNBIASED_LIMIT: u8 = (256 / ALPHABET.len() * ALPHABET.len()) as u8;

pub const DEFAULT_CODE_LENGTH: usize = 15;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const MIN_CODE_LENGTH: usize = 4;
pub const MAX_CODE_LENGTH: usize = 32;

/// Draws random lowercase alphanumeric codes and checks them against the
/// ledger before handing them out.
#[derive(Clone, Debug)]
pub struct CodeGenerator {
    length: usize,
    max_attempts: u32,
}

impl Default for CodeGenerator {
    fn default() -> Self {
        CodeGenerator::new(DEFAULT_CODE_LENGTH, DEFAULT_MAX_ATTEMPTS)
    }
}

impl CodeGenerator {
    pub fn new(length: usize, max_attempts: u32) -> Self {
        CodeGenerator {
            length: length.clamp(MIN_CODE_LENGTH, MAX_CODE_LENGTH),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn symbol(byte: u8) -> Option<char> {
        if byte >= UNBIASED_LIMIT {
            return None;
        }
        Some(ALPHABET[byte as usize % ALPHABET.len()] as char)
    }

    pub fn draw(&self) -> String {
        let mut code = String::with_capacity(self.length);

        while code.len() < self.length {
            let uuid = Uuid::new_v4();
            // Bytes 6 and 8 carry the version and variant bits.
            for (index, byte) in uuid.as_bytes().iter().enumerate() {
                if index == 6 || index == 8 {
                    continue;
                }
                if code.len() == self.length {
                    break;
                }
                if let Some(symbol) = Self::symbol(*byte) {
                    code.push(symbol);
                }
            }
        }

        code
    }

    pub async fn generate(
        &self,
        store: &dyn LedgerStore,
        owner_id: &str,
    ) -> Result<String, ReferralError> {
        let mut attempts = 0;
        self.generate_counted(store, owner_id, &mut attempts).await
    }

    /// Like `generate`, but draws against a budget shared with the caller.
    /// `attempts` counts draws already spent and is advanced by each draw.
    pub async fn generate_counted(
        &self,
        store: &dyn LedgerStore,
        owner_id: &str,
        attempts: &mut u32,
    ) -> Result<String, ReferralError> {
        while *attempts < self.max_attempts {
            *attempts += 1;
            let code = self.draw();

            if store.get_referrer_by_code(&code).await?.is_none() {
                return Ok(code);
            }
            log::debug!("Code collision for {owner_id} on attempt {attempts}.");
        }

        log::error!(
            "Could not draw an unused code for {owner_id} in {} attempts.",
            self.max_attempts
        );
        Err(ReferralError::GenerationExhausted(self.max_attempts))
    }
}
