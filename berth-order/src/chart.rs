use berth_catalog::{RefundAssessment, SeatLayoutMapper};
use berth_core::{
    CancellationReason, CoachInventory, CoreError, CoreResult, PassengerStatus, Pnr, Train,
};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::cancellation::{promotions, release_passenger, Moved};
use crate::models::{ChartReport, RefundLine};

/// How long before origin departure the chart is drawn up, in minutes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChartWindow {
    pub opens_minutes_before: i64,
    pub closes_minutes_before: i64,
}

impl Default for ChartWindow {
    fn default() -> Self {
        Self {
            opens_minutes_before: 255,
            closes_minutes_before: 225,
        }
    }
}

impl ChartWindow {
    pub fn contains(&self, departure: NaiveDateTime, now: NaiveDateTime) -> bool {
        let lead = (departure - now).num_minutes();
        lead >= self.closes_minutes_before && lead <= self.opens_minutes_before
    }

    /// Journey dates of `train` whose window is open at `now`.
    ///
    /// Today and tomorrow are both considered, so an early-morning departure is
    /// charted the evening before.
    pub fn due_dates(&self, train: &Train, now: NaiveDateTime) -> Vec<NaiveDate> {
        let today = now.date();
        [today, today + Duration::days(1)]
            .into_iter()
            .filter(|date| train.runs_on_date(*date))
            .filter(|date| {
                train
                    .origin_departure_at(*date)
                    .is_some_and(|departure| self.contains(departure, now))
            })
            .collect()
    }
}

/// Result of charting one inventory, plus the refunds to report per PNR.
#[derive(Debug)]
pub struct ChartOutcome {
    pub report: ChartReport,
    pub reclaimed: BTreeMap<Pnr, Vec<RefundLine>>,
}

/// Confirm every RAC holder onto a shared berth and clear the waitlist.
///
/// Holders that already own a berth each take one partner without a berth, in queue
/// order; the leftover berthless holders pair up on free berths. A charted record is
/// left untouched.
pub fn prepare(inventory: &mut CoachInventory, now: NaiveDateTime) -> CoreResult<ChartOutcome> {
    let key = inventory.key().clone();
    if inventory.record.chart_prepared {
        return Ok(ChartOutcome {
            report: ChartReport {
                key,
                already_prepared: true,
                rac_confirmed: 0,
                waitlist_cancelled: 0,
                promotions: Vec::new(),
            },
            reclaimed: BTreeMap::new(),
        });
    }

    let queue = inventory.rac_queue();
    let (holders, loose): (Vec<_>, Vec<_>) = queue.into_iter().partition(|entry| {
        inventory
            .passenger(&entry.pnr, entry.passenger_id)
            .is_some_and(|p| p.rac_berth.is_some())
    });

    let mut groups = Vec::new();
    for (position, holder) in holders.iter().enumerate() {
        let berth = inventory
            .passenger(&holder.pnr, holder.passenger_id)
            .and_then(|p| p.rac_berth)
            .ok_or_else(|| CoreError::InvariantViolation(format!("RAC holder on {} lost its berth", holder.pnr)))?;
        let mut group = vec![holder.clone()];
        group.extend(loose.get(position).cloned());
        groups.push((berth, group));
    }
    let unpaired = loose.get(holders.len()..).unwrap_or_default();
    for pair in unpaired.chunks(2) {
        let berth = inventory.record.rac.take_berth().ok_or_else(|| {
            CoreError::InvariantViolation(format!("no shared berth left to chart {}", key))
        })?;
        groups.push((berth, pair.to_vec()));
    }

    let mut moved = Vec::new();
    for (berth, group) in groups {
        let seat = SeatLayoutMapper::locate(key.coach_class, berth, inventory.record.coach_units)?;
        for entry in group {
            inventory.record.rac.return_slot()?;
            let passenger = inventory.passenger_mut(&entry.pnr, entry.passenger_id)?;
            passenger.status = PassengerStatus::Cnf;
            passenger.seat = Some(seat.clone());
            passenger.seat_pool = None;
            passenger.rac_berth = None;
            passenger.sequence = None;
            debug!(pnr = %entry.pnr, passenger = entry.passenger_id, seat = %seat, "RAC charted");
            moved.push(Moved {
                pnr: entry.pnr,
                passenger_id: entry.passenger_id,
                from: PassengerStatus::Rac,
            });
        }
    }

    let full = RefundAssessment::full();
    let mut reclaimed: BTreeMap<Pnr, Vec<RefundLine>> = BTreeMap::new();
    for entry in inventory.waitlist_queue() {
        let (line, _) = release_passenger(
            inventory,
            &entry.pnr,
            entry.passenger_id,
            &full,
            CancellationReason::NoShowReclaim,
            now,
        )?;
        reclaimed.entry(entry.pnr).or_default().push(line);
    }

    inventory.renumber();
    inventory.record.chart_prepared = true;

    let touched: BTreeSet<Pnr> = moved
        .iter()
        .map(|m| m.pnr.clone())
        .chain(reclaimed.keys().cloned())
        .collect();
    for pnr in &touched {
        inventory.booking_mut(pnr)?.refresh_status(now);
    }

    let waitlist_cancelled = reclaimed.values().map(|lines| lines.len() as u32).sum();
    Ok(ChartOutcome {
        report: ChartReport {
            key,
            already_prepared: false,
            rac_confirmed: moved.len() as u32,
            waitlist_cancelled,
            promotions: promotions(inventory, &moved),
        },
        reclaimed,
    })
}
