use berth_core::{CoachClass, CoreError, Gender, Quota};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-km rate for one (class, quota) pair; loaded from configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FareRate {
    pub coach_class: CoachClass,
    pub quota: Quota,
    pub rate_paise_per_km: i64,
    #[serde(default)]
    pub default_discount_percent: u32,
    /// Flat per-passenger surcharge (reservation fee, superfast charge, ...).
    #[serde(default)]
    pub addon_paise: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    pub tax_percent: u32,
    pub free_below_age: u8,
    pub disabled_discount_percent: u32,
    pub senior_discount_percent: u32,
    pub senior_male_age: u8,
    pub senior_female_age: u8,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            tax_percent: 18,
            free_below_age: 6,
            disabled_discount_percent: 50,
            senior_discount_percent: 40,
            senior_male_age: 60,
            senior_female_age: 50,
        }
    }
}

/// The fare-relevant facts about one traveller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FarePassenger {
    pub age: u8,
    pub gender: Gender,
    pub senior: bool,
    pub disabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PassengerFare {
    pub base_paise: i64,
    pub discount_percent: u32,
    pub discount_paise: i64,
    pub addon_paise: i64,
    /// Discounted base plus surcharge, before tax.
    pub fare_paise: i64,
    pub tax_paise: i64,
    /// What the passenger pays; the amounts sum to the quote total.
    pub total_paise: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FareQuote {
    pub passengers: Vec<PassengerFare>,
    pub subtotal_paise: i64,
    pub tax_paise: i64,
    pub total_paise: i64,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FareError {
    #[error("no fare rate configured for {class} / {quota}")]
    MissingRate { class: CoachClass, quota: Quota },

    #[error("duplicate fare rate for {class} / {quota}")]
    DuplicateRate { class: CoachClass, quota: Quota },
}

impl From<FareError> for CoreError {
    fn from(err: FareError) -> Self {
        CoreError::ValidationError(err.to_string())
    }
}

/// `value * numerator / denominator`, rounded half up.
pub(crate) fn scale(value: i64, numerator: i64, denominator: i64) -> i64 {
    (value * numerator * 2 + denominator) / (denominator * 2)
}

/// Pure fare computation over the configured rate table.
pub struct FareCalculator {
    rates: HashMap<(CoachClass, Quota), FareRate>,
    config: PricingConfig,
}

impl FareCalculator {
    pub fn new(rates: Vec<FareRate>, config: PricingConfig) -> Result<Self, FareError> {
        let mut table = HashMap::new();
        for rate in rates {
            let key = (rate.coach_class, rate.quota);
            if table.insert(key, rate).is_some() {
                return Err(FareError::DuplicateRate {
                    class: key.0,
                    quota: key.1,
                });
            }
        }
        Ok(Self { rates: table, config })
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    pub fn rate(&self, class: CoachClass, quota: Quota) -> Option<&FareRate> {
        self.rates.get(&(class, quota))
    }

    /// Senior by declaration or by the age threshold for the passenger's gender.
    pub fn is_senior(&self, passenger: &FarePassenger) -> bool {
        let threshold = match passenger.gender {
            Gender::Female => self.config.senior_female_age,
            Gender::Male | Gender::Transgender => self.config.senior_male_age,
        };
        passenger.senior || passenger.age >= threshold
    }

    fn discount_percent(&self, rate: &FareRate, passenger: &FarePassenger) -> u32 {
        if passenger.disabled {
            self.config.disabled_discount_percent
        } else if self.is_senior(passenger) {
            self.config.senior_discount_percent
        } else {
            rate.default_discount_percent
        }
    }

    /// Price a party. Children below the free age pay nothing, surcharge included;
    /// tax is charged once on the subtotal and apportioned back to passengers.
    pub fn quote(
        &self,
        distance_km: u32,
        class: CoachClass,
        quota: Quota,
        passengers: &[FarePassenger],
    ) -> Result<FareQuote, FareError> {
        let rate = self
            .rate(class, quota)
            .ok_or(FareError::MissingRate { class, quota })?;
        let tax_percent = self.config.tax_percent as i64;

        let mut lines: Vec<PassengerFare> = passengers
            .iter()
            .map(|p| {
                if p.age < self.config.free_below_age {
                    return PassengerFare {
                        base_paise: 0,
                        discount_percent: 100,
                        discount_paise: 0,
                        addon_paise: 0,
                        fare_paise: 0,
                        tax_paise: 0,
                        total_paise: 0,
                    };
                }
                let base = distance_km as i64 * rate.rate_paise_per_km;
                let discount_percent = self.discount_percent(rate, p).min(100);
                let discount = scale(base, discount_percent as i64, 100);
                let fare = base - discount + rate.addon_paise;
                PassengerFare {
                    base_paise: base,
                    discount_percent,
                    discount_paise: discount,
                    addon_paise: rate.addon_paise,
                    fare_paise: fare,
                    tax_paise: scale(fare, tax_percent, 100),
                    total_paise: 0,
                }
            })
            .collect();

        let subtotal: i64 = lines.iter().map(|l| l.fare_paise).sum();
        let tax = scale(subtotal, tax_percent, 100);

        // Per-line rounding can drift from the tax on the subtotal; the last payer absorbs it.
        let drift = tax - lines.iter().map(|l| l.tax_paise).sum::<i64>();
        if let Some(last) = lines.iter_mut().rev().find(|l| l.fare_paise > 0) {
            last.tax_paise += drift;
        }
        for line in &mut lines {
            line.total_paise = line.fare_paise + line.tax_paise;
        }

        Ok(FareQuote {
            passengers: lines,
            subtotal_paise: subtotal,
            tax_paise: tax,
            total_paise: subtotal + tax,
        })
    }

    /// One adult of no concession, used to annotate search results.
    pub fn adult_fare(&self, distance_km: u32, class: CoachClass, quota: Quota) -> Option<i64> {
        let adult = FarePassenger {
            age: 30,
            gender: Gender::Male,
            senior: false,
            disabled: false,
        };
        self.quote(distance_km, class, quota, &[adult])
            .ok()
            .map(|q| q.total_paise)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adult(age: u8) -> FarePassenger {
        FarePassenger {
            age,
            gender: Gender::Male,
            senior: false,
            disabled: false,
        }
    }

    fn calculator() -> FareCalculator {
        FareCalculator::new(
            vec![
                FareRate {
                    coach_class: CoachClass::Sleeper,
                    quota: Quota::General,
                    rate_paise_per_km: 100,
                    default_discount_percent: 0,
                    addon_paise: 2_000,
                },
                FareRate {
                    coach_class: CoachClass::Sleeper,
                    quota: Quota::Tatkal,
                    rate_paise_per_km: 130,
                    default_discount_percent: 0,
                    addon_paise: 2_000,
                },
                FareRate {
                    coach_class: CoachClass::ThirdAc,
                    quota: Quota::Duty,
                    rate_paise_per_km: 250,
                    default_discount_percent: 25,
                    addon_paise: 4_000,
                },
            ],
            PricingConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_single_adult_fare_with_tax() {
        let quote = calculator()
            .quote(500, CoachClass::Sleeper, Quota::General, &[adult(30)])
            .unwrap();

        assert_eq!(quote.passengers[0].base_paise, 50_000);
        assert_eq!(quote.subtotal_paise, 52_000);
        assert_eq!(quote.total_paise, 61_360); // 613.60
        assert_eq!(quote.passengers[0].total_paise, 61_360);
    }

    #[test]
    fn test_young_child_always_free() {
        let calc = calculator();
        for (distance, class, quota) in [
            (500, CoachClass::Sleeper, Quota::General),
            (2_900, CoachClass::Sleeper, Quota::Tatkal),
            (40, CoachClass::ThirdAc, Quota::Duty),
        ] {
            let quote = calc.quote(distance, class, quota, &[adult(4)]).unwrap();
            assert_eq!(quote.passengers[0].total_paise, 0);
            assert_eq!(quote.total_paise, 0);
        }
    }

    #[test]
    fn test_concessions() {
        let calc = calculator();
        let senior_woman = FarePassenger {
            age: 52,
            gender: Gender::Female,
            senior: false,
            disabled: false,
        };
        let disabled = FarePassenger {
            disabled: true,
            ..adult(65)
        };
        let quote = calc
            .quote(1_000, CoachClass::Sleeper, Quota::General, &[senior_woman, disabled, adult(59)])
            .unwrap();

        assert_eq!(quote.passengers[0].discount_percent, 40);
        assert_eq!(quote.passengers[0].fare_paise, 60_000 + 2_000);
        assert_eq!(quote.passengers[1].discount_percent, 50);
        assert_eq!(quote.passengers[1].fare_paise, 50_000 + 2_000);
        assert_eq!(quote.passengers[2].discount_percent, 0);

        let duty = calc.quote(100, CoachClass::ThirdAc, Quota::Duty, &[adult(30)]).unwrap();
        assert_eq!(duty.passengers[0].fare_paise, 18_750 + 4_000);
    }

    #[test]
    fn test_line_totals_add_up_to_quote_total() {
        let calc = calculator();
        let party = [adult(30), adult(31), adult(3), adult(33)];
        let quote = calc.quote(333, CoachClass::Sleeper, Quota::Tatkal, &party).unwrap();
        let sum: i64 = quote.passengers.iter().map(|p| p.total_paise).sum();
        assert_eq!(sum, quote.total_paise);
        assert_eq!(quote.passengers[2].total_paise, 0);
    }

    #[test]
    fn test_missing_rate() {
        let err = calculator()
            .quote(100, CoachClass::FirstAc, Quota::General, &[adult(30)])
            .unwrap_err();
        assert_eq!(
            err,
            FareError::MissingRate {
                class: CoachClass::FirstAc,
                quota: Quota::General
            }
        );
    }
}
