use berth_catalog::{CoachLayout, FareCalculator, FarePassenger, QuotaPolicy, RefundPolicy};
use berth_core::search::{ClassAvailability, QuotaAvailability, SearchQuery, TrainOption};
use berth_core::{
    AvailabilityCache, Booking, Clock, CoachClass, CoachInventory, CoreError, CoreResult,
    EventSink, InventoryKey, InventoryStore, Pnr, Quota, SeatInventory, TrainCatalog,
};
use berth_shared::{
    BookingAllocatedEvent, BookingEvent, ChartPreparedEvent, PassengerPromotedEvent,
    PassengersCancelledEvent,
};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::allocation::{AllocationEngine, AllocationPlan, PlannedPassenger};
use crate::cancellation::CancellationEngine;
use crate::chart::{self, ChartWindow};
use crate::models::{
    AllocationReceipt, AllocationRequest, CancellationReceipt, ChartReport, PassengerOutcome,
    PassengerStatusLine, PnrStatusView, Promotion,
};
use crate::pnr;

const PNR_ATTEMPTS: usize = 8;
const MAX_AGE: u8 = 125;

/// Reference rules the service applies; loaded once at startup.
pub struct BookingRules {
    pub fares: FareCalculator,
    pub quotas: QuotaPolicy,
    pub refunds: RefundPolicy,
    pub chart_window: ChartWindow,
}

/// Entry point for every reservation operation.
///
/// Validation happens before any lock is taken. Mutations run on a clone of the
/// locked aggregate, are verified, then committed; events and cache invalidation
/// follow the commit and never fail the call.
pub struct ReservationService {
    store: Arc<dyn InventoryStore>,
    catalog: Arc<dyn TrainCatalog>,
    events: Arc<dyn EventSink>,
    cache: Option<Arc<dyn AvailabilityCache>>,
    clock: Arc<dyn Clock>,
    rules: BookingRules,
}

impl ReservationService {
    pub fn new(
        store: Arc<dyn InventoryStore>,
        catalog: Arc<dyn TrainCatalog>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        rules: BookingRules,
    ) -> Self {
        Self {
            store,
            catalog,
            events,
            cache: None,
            clock,
            rules,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn AvailabilityCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn rules(&self) -> &BookingRules {
        &self.rules
    }

    /// Create the inventory for one scheduled run of one class.
    #[instrument(skip(self, capacities))]
    pub async fn provision(
        &self,
        train_number: &str,
        journey_date: NaiveDate,
        coach_class: CoachClass,
        capacities: &[(Quota, u32)],
        rac_capacity: u32,
    ) -> CoreResult<SeatInventory> {
        let train = self.train(train_number).await?;
        let units = train.coach_units(coach_class).ok_or_else(|| {
            CoreError::ValidationError(format!("train {} carries no {} coaches", train_number, coach_class))
        })?;

        let key = InventoryKey::new(train_number, journey_date, coach_class);
        let record = SeatInventory::provision(key, units, capacities, rac_capacity)?;
        let seats = CoachLayout::for_class(coach_class).total_seats(units);
        if record.last_index() > seats {
            return Err(CoreError::ValidationError(format!(
                "{} needs {} seats but {} {} coaches hold {}",
                record.key,
                record.last_index(),
                units,
                coach_class,
                seats
            )));
        }

        self.store.provision(record.clone()).await?;
        info!(key = %record.key, seats = record.last_index(), "inventory provisioned");
        Ok(record)
    }

    /// Committed counters for one key, bypassing the cache.
    pub async fn inventory(&self, key: &InventoryKey) -> CoreResult<Option<SeatInventory>> {
        self.store.snapshot(key).await
    }

    #[instrument(skip(self, request), fields(train = %request.train_number, date = %request.journey_date, class = %request.coach_class, quota = %request.quota))]
    pub async fn allocate(&self, request: AllocationRequest) -> CoreResult<AllocationReceipt> {
        let now = self.clock.now();
        self.validate(&request, now)?;

        let train = self.train(&request.train_number).await?;
        if !train.runs_on_date(request.journey_date) {
            return Err(CoreError::ValidationError(format!(
                "train {} does not run on {}",
                train.number, request.journey_date
            )));
        }
        if train.coach_units(request.coach_class).is_none() {
            return Err(CoreError::ValidationError(format!(
                "train {} carries no {} coaches",
                train.number, request.coach_class
            )));
        }
        let route = train.route(&request.source, &request.destination)?;
        if route.departure_at(request.journey_date) <= now {
            return Err(CoreError::ValidationError(format!(
                "train {} has already left {}",
                train.number, route.source
            )));
        }

        let fare_passengers: Vec<FarePassenger> = request
            .passengers
            .iter()
            .map(|p| FarePassenger {
                age: p.age,
                gender: p.gender,
                senior: p.senior,
                disabled: p.disabled,
            })
            .collect();
        let quote = self.rules.fares.quote(
            route.distance_km,
            request.coach_class,
            request.quota,
            &fare_passengers,
        )?;

        let passengers = request
            .passengers
            .iter()
            .zip(fare_passengers.iter())
            .zip(quote.passengers.iter())
            .map(|((p, fp), line)| PlannedPassenger {
                request: p.clone(),
                quota: self
                    .rules
                    .quotas
                    .effective_quota(request.quota, self.rules.fares.is_senior(fp)),
                fare_paise: line.total_paise,
            })
            .collect();

        let key = InventoryKey::new(request.train_number.clone(), request.journey_date, request.coach_class);
        let plan = AllocationPlan {
            pnr: self.fresh_pnr().await?,
            train_number: request.train_number,
            journey_date: request.journey_date,
            quota: request.quota,
            route,
            contact: request.contact,
            passengers,
            total_fare_paise: quote.total_paise,
        };

        let guard = self.store.lock(&key, &[]).await?;
        let mut working = guard.inventory().clone();
        let booking = AllocationEngine::new(&self.rules.quotas).allocate(&mut working, plan, now)?;
        working.verify()?;
        let version = guard.commit(working).await?;

        info!(pnr = %booking.pnr, status = %booking.status, passengers = booking.passengers.len(), "booking committed");
        self.after_commit(&key, version, vec![allocated_event(&booking, now)]).await;
        Ok(receipt(&booking))
    }

    #[instrument(skip(self))]
    pub async fn cancel(&self, pnr: &Pnr, passenger_ids: &[u32]) -> CoreResult<CancellationReceipt> {
        let now = self.clock.now();
        let booking = self.booking(pnr).await?;
        let train = self.train(&booking.train_number).await?;
        let route = train.route(&booking.source, &booking.destination)?;
        let minutes = (route.departure_at(booking.journey_date) - now).num_minutes();
        let assessment = self.rules.refunds.assess(booking.quota, minutes)?;

        let key = booking.key();
        let guard = self.store.lock(&key, std::slice::from_ref(pnr)).await?;
        let mut working = guard.inventory().clone();
        let outcome = CancellationEngine::new(&self.rules.quotas).cancel(
            &mut working,
            pnr,
            passenger_ids,
            &assessment,
            now,
        )?;
        working.verify()?;
        let version = guard.commit(working).await?;

        let total_refund_paise = outcome.refunds.iter().map(|r| r.amount_paise).sum();
        info!(
            pnr = %pnr,
            cancelled = outcome.refunds.len(),
            refund_paise = total_refund_paise,
            promoted = outcome.promotions.len(),
            tier = %assessment.tier,
            "cancellation committed"
        );

        let mut events = vec![BookingEvent::PassengersCancelled(PassengersCancelledEvent {
            pnr: pnr.to_string(),
            train_number: key.train_number.clone(),
            journey_date: key.journey_date,
            coach_class: key.coach_class.code().to_string(),
            passenger_ids: outcome.refunds.iter().map(|r| r.passenger_id).collect(),
            refund_paise: total_refund_paise,
            booking_status: outcome.booking_status.code().to_string(),
            reason: berth_core::CancellationReason::PassengerRequest.code().to_string(),
            timestamp: timestamp(now),
        })];
        events.extend(outcome.promotions.iter().map(|p| promoted_event(p, now)));
        self.after_commit(&key, version, events).await;

        Ok(CancellationReceipt {
            pnr: pnr.clone(),
            booking_status: outcome.booking_status,
            refunds: outcome.refunds,
            total_refund_paise,
            promotions: outcome.promotions,
        })
    }

    #[instrument(skip(self))]
    pub async fn pnr_status(&self, pnr: &Pnr) -> CoreResult<PnrStatusView> {
        let booking = self.booking(pnr).await?;
        let chart_prepared = self
            .store
            .snapshot(&booking.key())
            .await?
            .is_some_and(|record| record.chart_prepared);

        Ok(PnrStatusView {
            pnr: booking.pnr.clone(),
            train_number: booking.train_number.clone(),
            journey_date: booking.journey_date,
            coach_class: booking.coach_class,
            quota: booking.quota,
            source: booking.source.clone(),
            destination: booking.destination.clone(),
            status: booking.status,
            chart_prepared,
            total_fare_paise: booking.total_fare_paise,
            passengers: booking
                .passengers
                .iter()
                .map(|p| PassengerStatusLine {
                    passenger_id: p.id,
                    name: p.name.clone(),
                    booked_status: p.booked_status,
                    status: p.status,
                    seat: p.seat.clone(),
                    sequence: p.sequence,
                    fare_paise: p.fare_paise,
                    refund_paise: p.refund_paise,
                })
                .collect(),
        })
    }

    /// Point-in-time availability; takes no lock.
    #[instrument(skip(self))]
    pub async fn search(&self, query: &SearchQuery) -> CoreResult<Vec<TrainOption>> {
        if query.source.eq_ignore_ascii_case(&query.destination) {
            return Err(CoreError::ValidationError("source and destination are the same".to_string()));
        }

        let mut options = Vec::new();
        for train in self.catalog.trains_between(&query.source, &query.destination).await? {
            if !train.runs_on_date(query.date) {
                continue;
            }
            let Ok(route) = train.route(&query.source, &query.destination) else {
                continue;
            };

            let mut classes = Vec::new();
            for class in train.composition.keys() {
                let key = InventoryKey::new(train.number.clone(), query.date, *class);
                let Some(record) = self.availability(&key).await? else {
                    continue;
                };
                classes.push(ClassAvailability {
                    coach_class: *class,
                    chart_prepared: record.chart_prepared,
                    rac_remaining: record.rac.remaining,
                    waitlist_length: record.waitlist_length,
                    quotas: record
                        .pools
                        .iter()
                        .map(|(quota, pool)| QuotaAvailability {
                            quota: *quota,
                            capacity: pool.capacity,
                            remaining: pool.remaining(),
                            adult_fare_paise: self.rules.fares.adult_fare(route.distance_km, *class, *quota),
                        })
                        .collect(),
                });
            }

            options.push(TrainOption {
                train_number: train.number.clone(),
                train_name: train.name.clone(),
                source: route.source.clone(),
                destination: route.destination.clone(),
                departure: route.departure_at(query.date),
                arrival: route.arrival_at(query.date),
                distance_km: route.distance_km,
                classes,
            });
        }
        options.sort_by_key(|o| o.departure);
        Ok(options)
    }

    /// Chart every provisioned class of one run. Safe to repeat.
    #[instrument(skip(self))]
    pub async fn prepare_chart(&self, train_number: &str, journey_date: NaiveDate) -> CoreResult<Vec<ChartReport>> {
        let now = self.clock.now();
        let keys = self.store.keys_for_run(train_number, journey_date).await?;
        if keys.is_empty() {
            return Err(CoreError::NotFoundError(format!(
                "no inventory for train {} on {}",
                train_number, journey_date
            )));
        }

        let mut reports = Vec::with_capacity(keys.len());
        for key in keys {
            reports.push(self.prepare_key(&key, now).await?);
        }
        Ok(reports)
    }

    /// One pass of the chart worker: chart every run whose window is open now.
    /// A failing key is logged and retried on the next pass.
    pub async fn run_chart_window(&self) -> CoreResult<Vec<ChartReport>> {
        let now = self.clock.now();
        let mut reports = Vec::new();
        for train in self.catalog.all_trains().await? {
            for date in self.rules.chart_window.due_dates(&train, now) {
                for key in self.store.keys_for_run(&train.number, date).await? {
                    match self.prepare_key(&key, now).await {
                        Ok(report) => reports.push(report),
                        Err(e) => warn!(%key, error = %e, "chart preparation deferred"),
                    }
                }
            }
        }
        Ok(reports)
    }

    /// Drop inventory for runs whose journey date has passed.
    pub async fn retire_past_runs(&self) -> CoreResult<usize> {
        let today = self.clock.now().date();
        let retired = self.store.retire_before(today).await?;
        if retired > 0 {
            info!(before = %today, retired, "past runs retired");
        }
        Ok(retired)
    }

    async fn prepare_key(&self, key: &InventoryKey, now: NaiveDateTime) -> CoreResult<ChartReport> {
        let guard = self.store.lock(key, &[]).await?;
        let mut working: CoachInventory = guard.inventory().clone();
        let outcome = chart::prepare(&mut working, now)?;
        let report = outcome.report;
        if report.already_prepared {
            // Dropping the guard releases the lock without writing.
            return Ok(report);
        }

        working.verify()?;
        let statuses: BTreeMap<Pnr, String> = outcome
            .reclaimed
            .keys()
            .filter_map(|pnr| working.bookings.get(pnr).map(|b| (pnr.clone(), b.status.code().to_string())))
            .collect();
        let version = guard.commit(working).await?;

        info!(
            %key,
            rac_confirmed = report.rac_confirmed,
            waitlist_cancelled = report.waitlist_cancelled,
            "chart prepared"
        );

        let mut events: Vec<BookingEvent> = report.promotions.iter().map(|p| promoted_event(p, now)).collect();
        for (pnr, lines) in &outcome.reclaimed {
            let status = statuses.get(pnr).cloned().unwrap_or_default();
            events.push(BookingEvent::PassengersCancelled(PassengersCancelledEvent {
                pnr: pnr.to_string(),
                train_number: key.train_number.clone(),
                journey_date: key.journey_date,
                coach_class: key.coach_class.code().to_string(),
                passenger_ids: lines.iter().map(|l| l.passenger_id).collect(),
                refund_paise: lines.iter().map(|l| l.amount_paise).sum(),
                booking_status: status,
                reason: berth_core::CancellationReason::NoShowReclaim.code().to_string(),
                timestamp: timestamp(now),
            }));
        }
        events.push(BookingEvent::ChartPrepared(ChartPreparedEvent {
            train_number: key.train_number.clone(),
            journey_date: key.journey_date,
            coach_class: key.coach_class.code().to_string(),
            rac_confirmed: report.rac_confirmed,
            waitlist_cancelled: report.waitlist_cancelled,
            timestamp: timestamp(now),
        }));
        self.after_commit(key, version, events).await;
        Ok(report)
    }

    fn validate(&self, request: &AllocationRequest, now: NaiveDateTime) -> CoreResult<()> {
        let limit = self.rules.quotas.max_passengers(request.quota);
        if request.passengers.is_empty() || request.passengers.len() > limit {
            return Err(CoreError::ValidationError(format!(
                "a {} booking takes 1 to {} passengers, got {}",
                request.quota,
                limit,
                request.passengers.len()
            )));
        }
        for (position, p) in request.passengers.iter().enumerate() {
            if p.name.trim().is_empty() {
                return Err(CoreError::ValidationError(format!("passenger {} has no name", position + 1)));
            }
            if p.age > MAX_AGE {
                return Err(CoreError::ValidationError(format!(
                    "passenger {} age {} is out of range",
                    position + 1,
                    p.age
                )));
            }
        }
        if request.train_number.trim().is_empty() {
            return Err(CoreError::ValidationError("train number is required".to_string()));
        }
        if request.source.eq_ignore_ascii_case(&request.destination) {
            return Err(CoreError::ValidationError("source and destination are the same".to_string()));
        }
        if request.journey_date < now.date() {
            return Err(CoreError::ValidationError(format!(
                "journey date {} is in the past",
                request.journey_date
            )));
        }
        if request.contact.mobile.expose().trim().is_empty() {
            return Err(CoreError::ValidationError("contact mobile is required".to_string()));
        }
        Ok(())
    }

    async fn train(&self, number: &str) -> CoreResult<berth_core::Train> {
        self.catalog
            .train(number)
            .await?
            .ok_or_else(|| CoreError::NotFoundError(format!("train {}", number)))
    }

    async fn booking(&self, pnr: &Pnr) -> CoreResult<Booking> {
        self.store
            .find_booking(pnr)
            .await?
            .ok_or_else(|| CoreError::NotFoundError(format!("PNR {}", pnr)))
    }

    async fn fresh_pnr(&self) -> CoreResult<Pnr> {
        for _ in 0..PNR_ATTEMPTS {
            let candidate = pnr::generate(&mut rand::thread_rng())?;
            if self.store.find_booking(&candidate).await?.is_none() {
                return Ok(candidate);
            }
        }
        Err(CoreError::ConflictError("could not draw an unused PNR".to_string()))
    }

    async fn availability(&self, key: &InventoryKey) -> CoreResult<Option<SeatInventory>> {
        if let Some(cache) = &self.cache {
            match cache.get(key).await {
                Ok(Some(record)) => return Ok(Some(record)),
                Ok(None) => {}
                Err(e) => warn!(%key, error = %e, "availability cache read failed"),
            }
        }

        let record = self.store.snapshot(key).await?;
        if let (Some(cache), Some(record)) = (&self.cache, &record) {
            if let Err(e) = cache.put(record).await {
                warn!(%key, error = %e, "availability cache write failed");
            }
        }
        Ok(record)
    }

    async fn after_commit(&self, key: &InventoryKey, version: u64, events: Vec<BookingEvent>) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.invalidate(key, version).await {
                error!(%key, error = %e, "availability cache invalidation failed");
            }
        }
        for event in &events {
            if let Err(e) = self.events.publish(event).await {
                error!(event = event.name(), key = %event.key(), error = %e, "event publish failed");
            }
        }
    }
}

fn timestamp(now: NaiveDateTime) -> i64 {
    now.and_utc().timestamp()
}

fn receipt(booking: &Booking) -> AllocationReceipt {
    AllocationReceipt {
        pnr: booking.pnr.clone(),
        status: booking.status,
        passengers: booking
            .passengers
            .iter()
            .map(|p| PassengerOutcome {
                passenger_id: p.id,
                name: p.name.clone(),
                status: p.status,
                quota: p.quota,
                seat: p.seat.clone(),
                sequence: p.sequence,
                fare_paise: p.fare_paise,
            })
            .collect(),
        total_fare_paise: booking.total_fare_paise,
    }
}

fn allocated_event(booking: &Booking, now: NaiveDateTime) -> BookingEvent {
    BookingEvent::BookingAllocated(BookingAllocatedEvent {
        pnr: booking.pnr.to_string(),
        train_number: booking.train_number.clone(),
        journey_date: booking.journey_date,
        coach_class: booking.coach_class.code().to_string(),
        quota: booking.quota.code().to_string(),
        booking_status: booking.status.code().to_string(),
        passenger_count: booking.passengers.len() as u32,
        total_fare_paise: booking.total_fare_paise,
        timestamp: timestamp(now),
    })
}

fn promoted_event(promotion: &Promotion, now: NaiveDateTime) -> BookingEvent {
    BookingEvent::PassengerPromoted(PassengerPromotedEvent {
        pnr: promotion.pnr.to_string(),
        passenger_id: promotion.passenger_id,
        from_status: promotion.from.code().to_string(),
        to_status: promotion.to.code().to_string(),
        seat: promotion.seat.as_ref().map(|s| s.to_string()),
        sequence: promotion.sequence,
        timestamp: timestamp(now),
    })
}
