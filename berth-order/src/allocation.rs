use berth_catalog::{OverflowPolicy, QuotaPolicy, SeatLayoutMapper};
use berth_core::{
    Booking, BookingStatus, CoachInventory, ContactInfo, CoreError, CoreResult, Passenger,
    PassengerStatus, Pnr, Quota, Route, SeatAssignment, SeatInventory,
};
use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, warn};

use crate::models::PassengerRequest;

/// One passenger after validation and pricing, ready to be placed.
#[derive(Debug, Clone)]
pub struct PlannedPassenger {
    pub request: PassengerRequest,
    /// Quota after the senior upgrade.
    pub quota: Quota,
    pub fare_paise: i64,
}

/// Everything the locked section needs; built before the lock is taken.
#[derive(Debug, Clone)]
pub struct AllocationPlan {
    pub pnr: Pnr,
    pub train_number: String,
    pub journey_date: NaiveDate,
    pub quota: Quota,
    pub route: Route,
    pub contact: ContactInfo,
    pub passengers: Vec<PlannedPassenger>,
    pub total_fare_paise: i64,
}

enum Placement {
    Confirmed { seat: SeatAssignment, pool: Quota },
    Rac { sequence: u32, berth: Option<u32> },
    Waitlisted { sequence: u32 },
}

/// Take the lowest free seat of `pool`, honouring the berth preference of `preference`.
///
/// A ground-level substitute is used only when that exact seat is free in the same
/// pool; otherwise the originally chosen seat is taken as mapped.
pub(crate) fn claim_seat(
    record: &mut SeatInventory,
    pool: Quota,
    preference: Quota,
) -> CoreResult<Option<SeatAssignment>> {
    let class = record.key.coach_class;
    let units = record.coach_units;
    let Some(seats) = record.pool_mut(pool) else {
        return Ok(None);
    };
    let Some(index) = seats.lowest_free() else {
        return Ok(None);
    };

    let mapped = SeatLayoutMapper::map(class, index, preference, units)?;
    if mapped.running_index == index {
        seats.claim(index);
        return Ok(Some(mapped));
    }
    if seats.claim(mapped.running_index) {
        return Ok(Some(mapped));
    }
    seats.claim(index);
    Ok(Some(SeatLayoutMapper::locate(class, index, units)?))
}

/// Turns a plan into a booking against a locked inventory.
pub struct AllocationEngine<'a> {
    policy: &'a QuotaPolicy,
}

impl<'a> AllocationEngine<'a> {
    pub fn new(policy: &'a QuotaPolicy) -> Self {
        Self { policy }
    }

    /// Place every passenger in request order. Any rejection fails the whole call;
    /// the caller discards the mutated inventory.
    pub fn allocate(
        &self,
        inventory: &mut CoachInventory,
        plan: AllocationPlan,
        now: NaiveDateTime,
    ) -> CoreResult<Booking> {
        if inventory.bookings.contains_key(&plan.pnr) {
            return Err(CoreError::ConflictError(format!("PNR {} already issued", plan.pnr)));
        }

        let key = inventory.key().clone();
        let class = key.coach_class;
        let charted = inventory.record.chart_prepared;
        let mut next_rac = inventory.rac_queue().len() as u32 + 1;
        let mut passengers = Vec::with_capacity(plan.passengers.len());

        for (position, planned) in plan.passengers.iter().enumerate() {
            let id = position as u32 + 1;
            let mut placement = None;

            for strategy in self.policy.chain(class, plan.quota, planned.quota) {
                if let Some(seat) = claim_seat(&mut inventory.record, strategy.pool, planned.quota)? {
                    placement = Some(Placement::Confirmed {
                        seat,
                        pool: strategy.pool,
                    });
                    break;
                }
                // Charted runs sell confirmed seats only.
                if strategy.overflow == OverflowPolicy::RacThenWaitlist && !charted {
                    let record = &mut inventory.record;
                    placement = Some(if record.rac.take_slot() {
                        let berth = record.rac.take_berth();
                        next_rac += 1;
                        Placement::Rac {
                            sequence: next_rac - 1,
                            berth,
                        }
                    } else {
                        record.waitlist_length += 1;
                        record.waitlist_issued += 1;
                        Placement::Waitlisted {
                            sequence: record.waitlist_length,
                        }
                    });
                    break;
                }
            }

            let placement = placement.ok_or_else(|| {
                warn!(%key, quota = %planned.quota, passenger = id, "quota exhausted");
                CoreError::CapacityExhausted(format!(
                    "no {} seats left for {} (passenger {})",
                    planned.quota, key, id
                ))
            })?;

            let (status, seat, seat_pool, sequence, rac_berth) = match placement {
                Placement::Confirmed { seat, pool } => (PassengerStatus::Cnf, Some(seat), Some(pool), None, None),
                Placement::Rac { sequence, berth } => (PassengerStatus::Rac, None, None, Some(sequence), berth),
                Placement::Waitlisted { sequence } => (PassengerStatus::Wtl, None, None, Some(sequence), None),
            };
            debug!(pnr = %plan.pnr, passenger = id, status = %status, ?sequence, "passenger placed");

            passengers.push(Passenger {
                id,
                name: planned.request.name.trim().to_string(),
                age: planned.request.age,
                gender: planned.request.gender,
                senior: planned.request.senior,
                disabled: planned.request.disabled,
                quota: planned.quota,
                seat_pool,
                status,
                booked_status: status,
                seat,
                sequence,
                rac_berth,
                fare_paise: planned.fare_paise,
                refund_paise: None,
                cancellation: None,
            });
        }

        let booking = Booking {
            pnr: plan.pnr,
            train_number: plan.train_number,
            journey_date: plan.journey_date,
            coach_class: class,
            quota: plan.quota,
            source: plan.route.source,
            destination: plan.route.destination,
            distance_km: plan.route.distance_km,
            contact: plan.contact,
            status: BookingStatus::derive(passengers.iter().map(|p| p.status)),
            total_fare_paise: plan.total_fare_paise,
            passengers,
            created_at: now,
            updated_at: now,
        };
        inventory.bookings.insert(booking.pnr.clone(), booking.clone());
        Ok(booking)
    }
}
