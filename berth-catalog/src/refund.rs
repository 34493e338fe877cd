use berth_core::{CoreError, Quota};
use serde::{Deserialize, Serialize};

use crate::pricing::scale;

/// One band of the cancellation table: `[from_hours, to_hours)` before departure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefundTier {
    pub from_hours: u32,
    /// Open-ended when absent.
    pub to_hours: Option<u32>,
    /// Share of the fare withheld.
    pub charge_percent: u32,
}

impl RefundTier {
    pub fn new(from_hours: u32, to_hours: Option<u32>, charge_percent: u32) -> Self {
        Self {
            from_hours,
            to_hours,
            charge_percent,
        }
    }

    pub fn label(&self) -> String {
        match self.to_hours {
            Some(to) => format!("{}h-{}h", self.from_hours, to),
            None => format!("{}h+", self.from_hours),
        }
    }

    fn contains(&self, minutes: i64) -> bool {
        let from = self.from_hours as i64 * 60;
        minutes >= from && self.to_hours.map_or(true, |to| minutes < to as i64 * 60)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("refund tier table is empty")]
    Empty,

    #[error("refund tiers must start at 0h")]
    MissingZero,

    #[error("refund tiers are not contiguous at {0}h")]
    Gap(u32),

    #[error("only the last refund tier may be open-ended")]
    Unbounded,

    #[error("refund tier {0} has a charge above 100%")]
    ChargeOutOfRange(String),

    #[error("cancellation charge for {0} is lower than for an earlier tier")]
    ChargeDecreases(String),

    #[error("train departed {0} minutes ago")]
    Departed(i64),
}

impl From<PolicyError> for CoreError {
    fn from(err: PolicyError) -> Self {
        CoreError::ValidationError(err.to_string())
    }
}

/// Which tier applied and how much of the fare it keeps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefundAssessment {
    pub tier: String,
    pub charge_percent: u32,
}

impl RefundAssessment {
    /// Used by chart preparation when it reclaims a waitlisted berth.
    pub fn full() -> Self {
        Self {
            tier: "FULL".to_string(),
            charge_percent: 0,
        }
    }

    pub fn refund_for(&self, fare_paise: i64) -> i64 {
        scale(fare_paise, 100 - self.charge_percent.min(100) as i64, 100)
    }
}

#[derive(Debug, Clone)]
pub struct RefundPolicy {
    tiers: Vec<RefundTier>,
}

impl RefundPolicy {
    /// Validate and index a tier table. The bands must cover `[0h, ∞)` without
    /// gaps and the charge must not drop as departure gets closer.
    pub fn new(mut tiers: Vec<RefundTier>) -> Result<Self, PolicyError> {
        if tiers.is_empty() {
            return Err(PolicyError::Empty);
        }
        tiers.sort_by_key(|t| t.from_hours);

        if tiers[0].from_hours != 0 {
            return Err(PolicyError::MissingZero);
        }
        for tier in &tiers {
            if tier.charge_percent > 100 {
                return Err(PolicyError::ChargeOutOfRange(tier.label()));
            }
        }
        for pair in tiers.windows(2) {
            let (nearer, further) = (&pair[0], &pair[1]);
            match nearer.to_hours {
                None => return Err(PolicyError::Unbounded),
                Some(to) if to != further.from_hours || to <= nearer.from_hours => {
                    return Err(PolicyError::Gap(to))
                }
                Some(_) => {}
            }
            if further.charge_percent > nearer.charge_percent {
                return Err(PolicyError::ChargeDecreases(nearer.label()));
            }
        }
        if let Some(last) = tiers.last() {
            if let Some(to) = last.to_hours {
                return Err(PolicyError::Gap(to));
            }
        }

        Ok(Self { tiers })
    }

    /// 48h+ 10%, 12h-48h 25%, 4h-12h 50%, under 4h 100%.
    pub fn standard() -> Self {
        Self {
            tiers: vec![
                RefundTier::new(0, Some(4), 100),
                RefundTier::new(4, Some(12), 50),
                RefundTier::new(12, Some(48), 25),
                RefundTier::new(48, None, 10),
            ],
        }
    }

    pub fn tiers(&self) -> &[RefundTier] {
        &self.tiers
    }

    pub fn assess(&self, quota: Quota, minutes_to_departure: i64) -> Result<RefundAssessment, PolicyError> {
        if minutes_to_departure < 0 {
            return Err(PolicyError::Departed(-minutes_to_departure));
        }
        if quota.is_tatkal() {
            return Ok(RefundAssessment {
                tier: quota.code().to_string(),
                charge_percent: 100,
            });
        }
        self.tiers
            .iter()
            .find(|t| t.contains(minutes_to_departure))
            .map(|t| RefundAssessment {
                tier: t.label(),
                charge_percent: t.charge_percent,
            })
            .ok_or(PolicyError::Gap(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_tiers() {
        let policy = RefundPolicy::standard();
        let at = |hours: i64| policy.assess(Quota::General, hours * 60).unwrap();

        assert_eq!(at(72).charge_percent, 10);
        assert_eq!(at(48).tier, "48h+");
        assert_eq!(at(47).charge_percent, 25);
        assert_eq!(at(11).tier, "4h-12h");
        assert_eq!(at(0).charge_percent, 100);
        assert_eq!(at(72).refund_for(61_360), 55_224);
    }

    #[test]
    fn test_refund_never_grows_closer_to_departure() {
        let policy = RefundPolicy::standard();
        let mut last_refund = i64::MAX;
        for minutes in (0..=96 * 60).rev().step_by(30) {
            let refund = policy.assess(Quota::Ladies, minutes).unwrap().refund_for(100_000);
            assert!(refund <= last_refund);
            last_refund = refund;
        }
    }

    #[test]
    fn test_tatkal_refunds_nothing() {
        let policy = RefundPolicy::standard();
        for quota in [Quota::Tatkal, Quota::PremiumTatkal] {
            let assessment = policy.assess(quota, 200 * 60).unwrap();
            assert_eq!(assessment.refund_for(80_000), 0);
        }
    }

    #[test]
    fn test_departed_train() {
        assert_eq!(
            RefundPolicy::standard().assess(Quota::General, -5),
            Err(PolicyError::Departed(5))
        );
    }

    #[test]
    fn test_tier_table_validation() {
        assert_eq!(RefundPolicy::new(vec![]).unwrap_err(), PolicyError::Empty);
        assert_eq!(
            RefundPolicy::new(vec![RefundTier::new(2, None, 10)]).unwrap_err(),
            PolicyError::MissingZero
        );
        assert_eq!(
            RefundPolicy::new(vec![RefundTier::new(0, Some(4), 100), RefundTier::new(6, None, 10)]).unwrap_err(),
            PolicyError::Gap(4)
        );
        assert!(matches!(
            RefundPolicy::new(vec![RefundTier::new(0, Some(4), 20), RefundTier::new(4, None, 50)]),
            Err(PolicyError::ChargeDecreases(_))
        ));
        let ok = RefundPolicy::new(vec![RefundTier::new(24, None, 5), RefundTier::new(0, Some(24), 50)]).unwrap();
        assert_eq!(ok.tiers()[0].from_hours, 0);
    }

    #[test]
    fn test_full_refund() {
        assert_eq!(RefundAssessment::full().refund_for(12_345), 12_345);
    }
}
