use berth_core::{CoachClass, Quota};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What happens when a passenger's pool has no free seat.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverflowPolicy {
    /// Fall through to a RAC slot, then to the waitlist.
    RacThenWaitlist,
    /// Reject the whole booking.
    Reject,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AllocationStrategy {
    pub pool: Quota,
    pub overflow: OverflowPolicy,
}

impl AllocationStrategy {
    pub fn new(pool: Quota, overflow: OverflowPolicy) -> Self {
        Self { pool, overflow }
    }
}

/// Strategy table keyed by (class, quota).
///
/// Unless overridden, the general quota overflows into RAC and the waitlist and
/// every other quota draws only from its own pool.
#[derive(Debug, Clone)]
pub struct QuotaPolicy {
    overrides: HashMap<(CoachClass, Quota), AllocationStrategy>,
    max_passengers: usize,
    tatkal_max_passengers: usize,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self::new(6, 4)
    }
}

impl QuotaPolicy {
    pub fn new(max_passengers: usize, tatkal_max_passengers: usize) -> Self {
        Self {
            overrides: HashMap::new(),
            max_passengers,
            tatkal_max_passengers,
        }
    }

    pub fn with_strategy(mut self, class: CoachClass, quota: Quota, strategy: AllocationStrategy) -> Self {
        self.overrides.insert((class, quota), strategy);
        self
    }

    pub fn strategy(&self, class: CoachClass, quota: Quota) -> AllocationStrategy {
        if let Some(strategy) = self.overrides.get(&(class, quota)) {
            return *strategy;
        }
        match quota {
            Quota::General => AllocationStrategy::new(Quota::General, OverflowPolicy::RacThenWaitlist),
            other => AllocationStrategy::new(other, OverflowPolicy::Reject),
        }
    }

    /// Quota a passenger actually books under. Only general bookings are upgraded.
    pub fn effective_quota(&self, requested: Quota, senior: bool) -> Quota {
        if requested == Quota::General && senior {
            Quota::Senior
        } else {
            requested
        }
    }

    /// Strategies to try in order for one passenger.
    ///
    /// An upgraded senior tries the senior pool first and falls back to the general
    /// pool with general overflow; an explicit request gets exactly one strategy.
    pub fn chain(&self, class: CoachClass, requested: Quota, effective: Quota) -> Vec<AllocationStrategy> {
        let mut chain = Vec::with_capacity(2);
        if effective != requested {
            chain.push(AllocationStrategy::new(effective, OverflowPolicy::Reject));
        }
        chain.push(self.strategy(class, requested));
        chain
    }

    pub fn max_passengers(&self, quota: Quota) -> usize {
        if quota.is_tatkal() {
            self.tatkal_max_passengers.min(self.max_passengers)
        } else {
            self.max_passengers
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_strategies() {
        let policy = QuotaPolicy::default();
        assert_eq!(
            policy.strategy(CoachClass::Sleeper, Quota::General),
            AllocationStrategy::new(Quota::General, OverflowPolicy::RacThenWaitlist)
        );
        for quota in [Quota::Tatkal, Quota::PremiumTatkal, Quota::Ladies, Quota::Senior, Quota::Disabled, Quota::Duty] {
            let strategy = policy.strategy(CoachClass::ThirdAc, quota);
            assert_eq!(strategy.pool, quota);
            assert_eq!(strategy.overflow, OverflowPolicy::Reject);
        }
    }

    #[test]
    fn test_senior_upgrade_chain_falls_back_to_general() {
        let policy = QuotaPolicy::default();
        let effective = policy.effective_quota(Quota::General, true);
        assert_eq!(effective, Quota::Senior);

        let chain = policy.chain(CoachClass::Sleeper, Quota::General, effective);
        assert_eq!(
            chain,
            vec![
                AllocationStrategy::new(Quota::Senior, OverflowPolicy::Reject),
                AllocationStrategy::new(Quota::General, OverflowPolicy::RacThenWaitlist),
            ]
        );

        // Explicit senior request never falls back.
        let explicit = policy.chain(CoachClass::Sleeper, Quota::Senior, Quota::Senior);
        assert_eq!(explicit.len(), 1);
        assert_eq!(policy.effective_quota(Quota::Tatkal, true), Quota::Tatkal);
    }

    #[test]
    fn test_overrides_and_party_limits() {
        let policy = QuotaPolicy::default().with_strategy(
            CoachClass::FirstAc,
            Quota::General,
            AllocationStrategy::new(Quota::General, OverflowPolicy::Reject),
        );
        assert_eq!(policy.strategy(CoachClass::FirstAc, Quota::General).overflow, OverflowPolicy::Reject);
        assert_eq!(
            policy.strategy(CoachClass::SecondAc, Quota::General).overflow,
            OverflowPolicy::RacThenWaitlist
        );
        assert_eq!(policy.max_passengers(Quota::General), 6);
        assert_eq!(policy.max_passengers(Quota::PremiumTatkal), 4);
    }
}
