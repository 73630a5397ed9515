use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::product::Tier;

/// Declarative unlock condition, stored as `{"type": "...", ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AchievementCondition {
    ReferralCount { at_least: i64 },
    ReferralTotal { at_least: i64 },
    CashbackTotal { at_least: i64 },
    TierReached { tier: Tier },
    MonthsSubscribed { at_least: u32 },
    FreezesCompleted { at_least: u32 },
    DiaryStreak { days: u32 },
    DiaryEntries { at_least: i64 },
}

impl AchievementCondition {
    pub fn is_met(&self, agg: &AchievementAggregates) -> bool {
        match self {
            AchievementCondition::ReferralCount { at_least } => agg.referral_count >= *at_least,
            AchievementCondition::ReferralTotal { at_least } => agg.referral_total >= *at_least,
            AchievementCondition::CashbackTotal { at_least } => agg.cashback_total >= *at_least,
            AchievementCondition::TierReached { tier } => {
                agg.months_purchased > 0 && agg.tier >= *tier
            }
            AchievementCondition::MonthsSubscribed { at_least } => {
                agg.months_purchased >= *at_least
            }
            AchievementCondition::FreezesCompleted { at_least } => {
                agg.freezes_completed >= *at_least
            }
            AchievementCondition::DiaryStreak { days } => agg.diary_streak >= *days,
            AchievementCondition::DiaryEntries { at_least } => agg.diary_entries >= *at_least,
        }
    }
}

/// Pre-typed criteria shape: a free-form `type` string plus one threshold.
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyCriteria {
    #[serde(rename = "type")]
    pub kind: String,
    pub threshold: i64,
}

impl TryFrom<LegacyCriteria> for AchievementCondition {
    type Error = AppError;

    fn try_from(legacy: LegacyCriteria) -> Result<Self, Self::Error> {
        let t = legacy.threshold;
        let as_u32 = || {
            u32::try_from(t)
                .map_err(|_| AppError::Internal(format!("Threshold {t} out of range")))
        };
        Ok(match legacy.kind.as_str() {
            "referrals" | "referral_count" => AchievementCondition::ReferralCount { at_least: t },
            "referral_total" | "referral_bonus" => {
                AchievementCondition::ReferralTotal { at_least: t }
            }
            "cashback" | "cashback_total" => AchievementCondition::CashbackTotal { at_least: t },
            "months" | "months_subscribed" => {
                AchievementCondition::MonthsSubscribed { at_least: as_u32()? }
            }
            "freezes" | "freezes_completed" => {
                AchievementCondition::FreezesCompleted { at_least: as_u32()? }
            }
            "streak" | "diary_streak" => AchievementCondition::DiaryStreak { days: as_u32()? },
            "diary_entries" | "entries" => AchievementCondition::DiaryEntries { at_least: t },
            other => {
                return Err(AppError::Internal(format!(
                    "Unknown legacy achievement criteria '{other}'"
                )))
            }
        })
    }
}

/// Either the current tagged shape or the legacy one.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ConditionDocument {
    Current(AchievementCondition),
    Legacy(LegacyCriteria),
}

impl TryFrom<ConditionDocument> for AchievementCondition {
    type Error = AppError;

    fn try_from(doc: ConditionDocument) -> Result<Self, Self::Error> {
        match doc {
            ConditionDocument::Current(c) => Ok(c),
            ConditionDocument::Legacy(l) => l.try_into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "StoredDefinition")]
pub struct AchievementDefinition {
    pub id: String,
    pub title: String,
    pub reward: i64,
    pub condition: AchievementCondition,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredDefinition {
    id: String,
    title: String,
    #[serde(default)]
    reward: i64,
    #[serde(alias = "criteria")]
    condition: ConditionDocument,
}

impl TryFrom<StoredDefinition> for AchievementDefinition {
    type Error = AppError;

    fn try_from(stored: StoredDefinition) -> Result<Self, Self::Error> {
        if stored.reward < 0 {
            return Err(AppError::Internal(format!(
                "Achievement '{}' has a negative reward",
                stored.id
            )));
        }
        Ok(Self {
            id: stored.id,
            title: stored.title,
            reward: stored.reward,
            condition: stored.condition.try_into()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementUnlock {
    pub user_id: Uuid,
    pub achievement_id: String,
    pub unlocked_at: DateTime<Utc>,
    pub reward: i64,
    pub reward_credited: bool,
}

/// Snapshot of everything conditions are evaluated against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementAggregates {
    pub tier: Tier,
    pub months_purchased: u32,
    pub freezes_completed: u32,
    pub referral_count: i64,
    pub referral_total: i64,
    pub cashback_total: i64,
    pub diary_streak: u32,
    pub diary_entries: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_current_tagged_shape() {
        let def: AchievementDefinition = serde_json::from_value(serde_json::json!({
            "id": "first_referral",
            "title": "First friend",
            "reward": 100,
            "condition": { "type": "referral_count", "at_least": 1 }
        }))
        .unwrap();
        assert_eq!(def.condition, AchievementCondition::ReferralCount { at_least: 1 });
    }

    #[test]
    fn migrates_legacy_criteria() {
        let def: AchievementDefinition = serde_json::from_value(serde_json::json!({
            "id": "week_streak",
            "title": "Seven days",
            "reward": 50,
            "criteria": { "type": "streak", "threshold": 7 }
        }))
        .unwrap();
        assert_eq!(def.condition, AchievementCondition::DiaryStreak { days: 7 });
    }

    #[test]
    fn rejects_unknown_legacy_type_and_negative_reward() {
        let unknown = serde_json::from_value::<AchievementDefinition>(serde_json::json!({
            "id": "x", "title": "x", "criteria": { "type": "games_played", "threshold": 1 }
        }));
        assert!(unknown.is_err());
        let negative = serde_json::from_value::<AchievementDefinition>(serde_json::json!({
            "id": "x", "title": "x", "reward": -1,
            "condition": { "type": "diary_entries", "at_least": 1 }
        }));
        assert!(negative.is_err());
    }

    #[test]
    fn tier_condition_requires_a_purchase() {
        let cond = AchievementCondition::TierReached { tier: Tier::Pro };
        let mut agg = AchievementAggregates {
            tier: Tier::Elite,
            ..Default::default()
        };
        assert!(!cond.is_met(&agg));
        agg.months_purchased = 1;
        assert!(cond.is_met(&agg));
        agg.tier = Tier::Basic;
        assert!(!cond.is_met(&agg));
    }
}
