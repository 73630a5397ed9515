use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::bonus::LevelProgress;

/// No 0/O or 1/I/L so codes survive being read aloud.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
pub const CODE_LEN: usize = 8;

pub fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Codes are matched case-insensitively with surrounding whitespace ignored.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralCode {
    pub user_id: Uuid,
    pub code: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralRelation {
    pub referrer_id: Uuid,
    pub referee_id: Uuid,
    pub code: String,
    pub registered_at: DateTime<Utc>,
}

/// Outcome of inserting a relation keyed on the referee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationInsert {
    Inserted,
    Existing(ReferralRelation),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum ReferralOutcome {
    Registered { relation: ReferralRelation },
    /// Replay of an already applied registration; no new effects.
    AlreadyRegistered { relation: ReferralRelation },
}

impl ReferralOutcome {
    pub fn relation(&self) -> &ReferralRelation {
        match self {
            ReferralOutcome::Registered { relation }
            | ReferralOutcome::AlreadyRegistered { relation } => relation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralCodePreview {
    pub valid: bool,
    pub referrer_display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralStats {
    pub code: Option<String>,
    pub referee_count: i64,
    pub lifetime_referral_bonus: i64,
    pub level: LevelProgress,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterReferralRequest {
    pub code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralCodeQuery {
    pub display_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_use_the_unambiguous_alphabet() {
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let code = generate_code(&mut rng);
            assert_eq!(code.len(), CODE_LEN);
            assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn normalize_trims_and_uppercases() {
        assert_eq!(normalize_code("  abcd2345 "), "ABCD2345");
    }
}
