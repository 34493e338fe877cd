use berth_catalog::{OverflowPolicy, QuotaPolicy, RefundAssessment};
use berth_core::{
    BookingStatus, CancellationReason, CancellationRecord, CoachInventory, CoreError, CoreResult,
    PassengerStatus, Pnr, Quota, SeatAssignment,
};
use chrono::NaiveDateTime;
use std::collections::BTreeSet;
use tracing::debug;

use crate::models::{Promotion, RefundLine};

/// A passenger who moved up, before the final sequence numbers are known.
#[derive(Debug, Clone)]
pub(crate) struct Moved {
    pub pnr: Pnr,
    pub passenger_id: u32,
    pub from: PassengerStatus,
}

/// Resolve moves against the committed-to-be state.
pub(crate) fn promotions(inventory: &CoachInventory, moved: &[Moved]) -> Vec<Promotion> {
    moved
        .iter()
        .filter_map(|m| {
            let p = inventory.passenger(&m.pnr, m.passenger_id)?;
            Some(Promotion {
                pnr: m.pnr.clone(),
                passenger_id: m.passenger_id,
                from: m.from,
                to: p.status,
                seat: p.seat.clone(),
                sequence: p.sequence,
            })
        })
        .collect()
}

/// Mark one passenger CAN and return what they were holding.
///
/// The RAC slot and berth go straight back to the record; a confirmed pool seat is
/// handed to the caller so reflow can decide who gets it.
pub(crate) fn release_passenger(
    inventory: &mut CoachInventory,
    pnr: &Pnr,
    passenger_id: u32,
    assessment: &RefundAssessment,
    reason: CancellationReason,
    now: NaiveDateTime,
) -> CoreResult<(RefundLine, Option<(Quota, SeatAssignment)>)> {
    let passenger = inventory.passenger_mut(pnr, passenger_id)?;
    let prior = passenger.status;
    if prior == PassengerStatus::Can {
        return Err(CoreError::ValidationError(format!(
            "passenger {} on PNR {} is already cancelled",
            passenger_id, pnr
        )));
    }

    let refund = assessment.refund_for(passenger.fare_paise);
    let seat = passenger.seat.take();
    let pool = passenger.seat_pool.take();
    let berth = passenger.rac_berth.take();
    passenger.status = PassengerStatus::Can;
    passenger.sequence = None;
    passenger.refund_paise = Some(refund);
    passenger.cancellation = Some(CancellationRecord {
        tier: assessment.tier.clone(),
        charge_percent: assessment.charge_percent,
        reason,
        cancelled_at: now,
    });

    let mut freed = None;
    match prior {
        PassengerStatus::Cnf => {
            // Charted RAC pairs sit on shared berths outside every pool; those stay put.
            if let (Some(seat), Some(pool)) = (seat, pool) {
                freed = Some((pool, seat));
            }
        }
        PassengerStatus::Rac => {
            inventory.record.rac.return_slot()?;
            if let Some(berth) = berth {
                inventory.record.rac.release_berth(berth)?;
            }
        }
        PassengerStatus::Wtl | PassengerStatus::Can => {}
    }

    let line = RefundLine {
        passenger_id,
        amount_paise: refund,
        tier: assessment.tier.clone(),
        charge_percent: assessment.charge_percent,
    };
    Ok((line, freed))
}

#[derive(Debug)]
pub struct CancellationOutcome {
    pub booking_status: BookingStatus,
    pub refunds: Vec<RefundLine>,
    pub promotions: Vec<Promotion>,
}

/// Cancels passengers and reflows the freed capacity inside one locked inventory.
pub struct CancellationEngine<'a> {
    policy: &'a QuotaPolicy,
}

impl<'a> CancellationEngine<'a> {
    pub fn new(policy: &'a QuotaPolicy) -> Self {
        Self { policy }
    }

    /// An empty `passenger_ids` cancels everyone still live on the PNR.
    pub fn cancel(
        &self,
        inventory: &mut CoachInventory,
        pnr: &Pnr,
        passenger_ids: &[u32],
        assessment: &RefundAssessment,
        now: NaiveDateTime,
    ) -> CoreResult<CancellationOutcome> {
        let booking = inventory
            .bookings
            .get(pnr)
            .ok_or_else(|| CoreError::NotFoundError(format!("PNR {}", pnr)))?;

        let targets: Vec<u32> = if passenger_ids.is_empty() {
            booking.passengers.iter().filter(|p| p.is_live()).map(|p| p.id).collect()
        } else {
            let mut seen = BTreeSet::new();
            let mut ids = Vec::with_capacity(passenger_ids.len());
            for id in passenger_ids {
                if booking.passenger(*id).is_none() {
                    return Err(CoreError::ValidationError(format!(
                        "passenger {} does not belong to PNR {}",
                        id, pnr
                    )));
                }
                if seen.insert(*id) {
                    ids.push(*id);
                }
            }
            ids
        };
        if targets.is_empty() {
            return Err(CoreError::ValidationError(format!("PNR {} is already fully cancelled", pnr)));
        }

        let mut refunds = Vec::with_capacity(targets.len());
        let mut freed = Vec::new();
        for id in targets {
            let (line, seat) = release_passenger(
                inventory,
                pnr,
                id,
                assessment,
                CancellationReason::PassengerRequest,
                now,
            )?;
            refunds.push(line);
            freed.extend(seat);
        }

        let moved = self.reflow(inventory, freed)?;
        inventory.renumber();

        let mut touched: BTreeSet<Pnr> = moved.iter().map(|m| m.pnr.clone()).collect();
        touched.insert(pnr.clone());
        for touched_pnr in &touched {
            inventory.booking_mut(touched_pnr)?.refresh_status(now);
        }

        let booking_status = inventory.booking_mut(pnr)?.status;
        Ok(CancellationOutcome {
            booking_status,
            refunds,
            promotions: promotions(inventory, &moved),
        })
    }

    /// Hand freed seats to the RAC queue (or the waitlist when RAC is empty), then
    /// refill RAC slots from the waitlist. Seats nobody can take return to their pool.
    pub(crate) fn reflow(
        &self,
        inventory: &mut CoachInventory,
        freed: Vec<(Quota, SeatAssignment)>,
    ) -> CoreResult<Vec<Moved>> {
        let class = inventory.key().coach_class;
        let charted = inventory.record.chart_prepared;
        let mut moved = Vec::new();

        for (pool, seat) in freed {
            let overflows = self.policy.strategy(class, pool).overflow == OverflowPolicy::RacThenWaitlist;
            let candidate = if overflows && !charted {
                inventory
                    .rac_queue()
                    .into_iter()
                    .next()
                    .or_else(|| inventory.waitlist_queue().into_iter().next())
            } else {
                None
            };

            let Some(entry) = candidate else {
                let index = seat.running_index;
                inventory
                    .record
                    .pool_mut(pool)
                    .ok_or_else(|| {
                        CoreError::InvariantViolation(format!("seat {} freed into missing pool {}", index, pool))
                    })?
                    .release(index)?;
                continue;
            };

            let (from, berth) = inventory
                .passenger(&entry.pnr, entry.passenger_id)
                .map(|p| (p.status, p.rac_berth))
                .ok_or_else(|| CoreError::InvariantViolation(format!("queued PNR {} vanished", entry.pnr)))?;
            if from == PassengerStatus::Rac {
                inventory.record.rac.return_slot()?;
                if let Some(berth) = berth {
                    inventory.record.rac.release_berth(berth)?;
                }
            }

            debug!(pnr = %entry.pnr, passenger = entry.passenger_id, seat = %seat, "freed seat reassigned");
            let passenger = inventory.passenger_mut(&entry.pnr, entry.passenger_id)?;
            passenger.status = PassengerStatus::Cnf;
            passenger.seat = Some(seat);
            passenger.seat_pool = Some(pool);
            passenger.sequence = None;
            passenger.rac_berth = None;
            moved.push(Moved {
                pnr: entry.pnr,
                passenger_id: entry.passenger_id,
                from,
            });
        }

        if charted {
            return Ok(moved);
        }

        while inventory.record.rac.remaining > 0 {
            let Some(entry) = inventory.waitlist_queue().into_iter().next() else {
                break;
            };
            let sequence = inventory.rac_queue().last().map_or(1, |e| e.sequence + 1);
            inventory.record.rac.take_slot();
            let berth = inventory.record.rac.take_berth();

            debug!(pnr = %entry.pnr, passenger = entry.passenger_id, "waitlist moved to RAC");
            let passenger = inventory.passenger_mut(&entry.pnr, entry.passenger_id)?;
            passenger.status = PassengerStatus::Rac;
            passenger.sequence = Some(sequence);
            passenger.rac_berth = berth;
            moved.push(Moved {
                pnr: entry.pnr,
                passenger_id: entry.passenger_id,
                from: PassengerStatus::Wtl,
            });
        }

        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::AllocationEngine;
    use crate::fixtures::*;

    fn charge(percent: u32) -> RefundAssessment {
        RefundAssessment {
            tier: "test".to_string(),
            charge_percent: percent,
        }
    }

    #[test]
    fn test_cancelling_confirmed_promotes_rac_head() {
        let mut inventory = inventory(1, 3);
        let policy = QuotaPolicy::default();
        AllocationEngine::new(&policy)
            .allocate(&mut inventory, plan("4100000001", Quota::General, vec![adult("A"), adult("B")]), now())
            .unwrap();
        let freed_seat = inventory.passenger(&pnr("4100000001"), 1).unwrap().seat.clone();

        let outcome = CancellationEngine::new(&policy)
            .cancel(&mut inventory, &pnr("4100000001"), &[1], &charge(25), now())
            .unwrap();

        assert_eq!(outcome.refunds[0].amount_paise, 7_500);
        assert_eq!(outcome.promotions.len(), 1);
        let promoted = &outcome.promotions[0];
        assert_eq!((promoted.passenger_id, promoted.from, promoted.to), (2, PassengerStatus::Rac, PassengerStatus::Cnf));
        assert_eq!(promoted.seat, freed_seat);
        assert!(inventory.rac_queue().is_empty());
        assert_eq!(inventory.record.rac.remaining, 3);
        assert_eq!(outcome.booking_status, BookingStatus::Confirmed);
        inventory.verify().unwrap();
    }

    #[test]
    fn test_reflow_chain_keeps_numbers_contiguous() {
        let mut inventory = inventory(1, 2);
        let policy = QuotaPolicy::default();
        let engine = AllocationEngine::new(&policy);
        engine
            .allocate(&mut inventory, plan("4100000001", Quota::General, vec![adult("A")]), now())
            .unwrap();
        engine
            .allocate(&mut inventory, plan("4100000002", Quota::General, vec![adult("B"), adult("C")]), now())
            .unwrap();
        engine
            .allocate(&mut inventory, plan("4100000003", Quota::General, vec![adult("D"), adult("E"), adult("F")]), now())
            .unwrap();
        // A CNF; B, C RAC 1-2; D, E, F WTL 1-3.

        let outcome = CancellationEngine::new(&policy)
            .cancel(&mut inventory, &pnr("4100000001"), &[], &charge(10), now())
            .unwrap();
        assert_eq!(outcome.booking_status, BookingStatus::Cancelled);

        let rac: Vec<(String, u32, u32)> = inventory
            .rac_queue()
            .into_iter()
            .map(|e| (e.pnr.to_string(), e.passenger_id, e.sequence))
            .collect();
        assert_eq!(rac, vec![("4100000002".into(), 2, 1), ("4100000003".into(), 1, 2)]);

        let wtl: Vec<(u32, u32)> = inventory.waitlist_queue().into_iter().map(|e| (e.passenger_id, e.sequence)).collect();
        assert_eq!(wtl, vec![(2, 1), (3, 2)]);
        assert_eq!(inventory.record.waitlist_length, 2);
        assert_eq!(inventory.bookings[&pnr("4100000002")].status, BookingStatus::Rac);
        inventory.verify().unwrap();

        // Dropping a RAC holder pulls the waitlist head up.
        CancellationEngine::new(&policy)
            .cancel(&mut inventory, &pnr("4100000003"), &[1], &charge(10), now())
            .unwrap();
        let rac: Vec<(u32, u32)> = inventory.rac_queue().into_iter().map(|e| (e.passenger_id, e.sequence)).collect();
        assert_eq!(rac, vec![(2, 1), (2, 2)]);
        assert_eq!(inventory.waitlist_queue().len(), 1);
        inventory.verify().unwrap();
    }

    #[test]
    fn test_partial_cancel_leaves_booking_status() {
        let mut inventory = inventory(4, 0);
        let policy = QuotaPolicy::default();
        AllocationEngine::new(&policy)
            .allocate(&mut inventory, plan("4100000001", Quota::General, vec![adult("A"), adult("B")]), now())
            .unwrap();
        let outcome = CancellationEngine::new(&policy)
            .cancel(&mut inventory, &pnr("4100000001"), &[2, 2], &charge(50), now())
            .unwrap();
        assert_eq!(outcome.refunds.len(), 1);
        assert_eq!(outcome.booking_status, BookingStatus::Confirmed);
        assert_eq!(inventory.record.remaining(Quota::General), 3);
    }

    #[test]
    fn test_tatkal_seat_returns_to_its_pool() {
        let mut inventory = inventory(1, 2);
        let policy = QuotaPolicy::default();
        let engine = AllocationEngine::new(&policy);
        engine
            .allocate(&mut inventory, plan("4100000001", Quota::Tatkal, vec![adult("A")]), now())
            .unwrap();
        engine
            .allocate(&mut inventory, plan("4100000002", Quota::General, vec![adult("B"), adult("C")]), now())
            .unwrap();

        let outcome = CancellationEngine::new(&policy)
            .cancel(&mut inventory, &pnr("4100000001"), &[], &charge(100), now())
            .unwrap();
        assert!(outcome.promotions.is_empty());
        assert_eq!(outcome.refunds[0].amount_paise, 0);
        assert_eq!(inventory.record.remaining(Quota::Tatkal), 2);
        assert_eq!(inventory.rac_queue().len(), 1);
    }

    #[test]
    fn test_invalid_targets() {
        let mut inventory = inventory(4, 0);
        let policy = QuotaPolicy::default();
        AllocationEngine::new(&policy)
            .allocate(&mut inventory, plan("4100000001", Quota::General, vec![adult("A")]), now())
            .unwrap();
        let engine = CancellationEngine::new(&policy);

        let err = engine.cancel(&mut inventory, &pnr("4100000001"), &[9], &charge(10), now()).unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));

        engine.cancel(&mut inventory, &pnr("4100000001"), &[1], &charge(10), now()).unwrap();
        let err = engine.cancel(&mut inventory, &pnr("4100000001"), &[1], &charge(10), now()).unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
        let err = engine.cancel(&mut inventory, &pnr("4100000001"), &[], &charge(10), now()).unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
        let err = engine.cancel(&mut inventory, &pnr("4999999999"), &[], &charge(10), now()).unwrap_err();
        assert!(matches!(err, CoreError::NotFoundError(_)));
    }
}
