use async_trait::async_trait;
use berth_core::{
    Booking, CancellationRecord, CoachClass, CoachInventory, ContactInfo, CoreError, CoreResult,
    InventoryKey, InventoryLock, InventoryStore, Passenger, Pnr, QuotaPool, Quota, RacPool,
    SeatAssignment, SeatInventory,
};
use berth_shared::Masked;
use chrono::{NaiveDate, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::database::storage_error;

pub struct PgInventoryStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgInventoryStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }
}

// Enum columns hold the same codes the JSON API uses.
fn encode<T: Serialize>(value: &T) -> CoreResult<String> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(code)) => Ok(code),
        Ok(other) => Err(CoreError::StorageError(format!("{} is not a text code", other))),
        Err(e) => Err(CoreError::StorageError(e.to_string())),
    }
}

fn decode<T: DeserializeOwned>(column: &str, code: &str) -> CoreResult<T> {
    serde_json::from_value(serde_json::Value::String(code.to_string()))
        .map_err(|e| CoreError::StorageError(format!("bad {} '{}': {}", column, code, e)))
}

#[derive(sqlx::FromRow)]
struct InventoryRow {
    train_number: String,
    journey_date: NaiveDate,
    coach_class: String,
    coach_units: i32,
    pools: Json<BTreeMap<Quota, QuotaPool>>,
    rac: Json<RacPool>,
    waitlist_length: i32,
    waitlist_issued: i32,
    chart_prepared: bool,
    version: i64,
}

impl InventoryRow {
    fn into_record(self) -> CoreResult<SeatInventory> {
        let coach_class: CoachClass = decode("coach_class", &self.coach_class)?;
        Ok(SeatInventory {
            key: InventoryKey::new(self.train_number, self.journey_date, coach_class),
            coach_units: self.coach_units as u32,
            pools: self.pools.0,
            rac: self.rac.0,
            waitlist_length: self.waitlist_length as u32,
            waitlist_issued: self.waitlist_issued as u32,
            version: self.version as u64,
            chart_prepared: self.chart_prepared,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    pnr: String,
    train_number: String,
    journey_date: NaiveDate,
    coach_class: String,
    quota: String,
    source: String,
    destination: String,
    distance_km: i32,
    mobile: String,
    email: Option<String>,
    status: String,
    total_fare_paise: i64,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

#[derive(sqlx::FromRow)]
struct PassengerRow {
    pnr: String,
    passenger_id: i32,
    name: String,
    age: i16,
    gender: String,
    senior: bool,
    disabled: bool,
    quota: String,
    seat_pool: Option<String>,
    status: String,
    booked_status: String,
    seat: Option<Json<SeatAssignment>>,
    sequence: Option<i32>,
    rac_berth: Option<i32>,
    fare_paise: i64,
    refund_paise: Option<i64>,
    cancellation: Option<Json<CancellationRecord>>,
}

impl PassengerRow {
    fn into_passenger(self) -> CoreResult<Passenger> {
        Ok(Passenger {
            id: self.passenger_id as u32,
            name: self.name,
            age: self.age as u8,
            gender: decode("gender", &self.gender)?,
            senior: self.senior,
            disabled: self.disabled,
            quota: decode("quota", &self.quota)?,
            seat_pool: self.seat_pool.as_deref().map(|q| decode("seat_pool", q)).transpose()?,
            status: decode("status", &self.status)?,
            booked_status: decode("booked_status", &self.booked_status)?,
            seat: self.seat.map(|s| s.0),
            sequence: self.sequence.map(|s| s as u32),
            rac_berth: self.rac_berth.map(|b| b as u32),
            fare_paise: self.fare_paise,
            refund_paise: self.refund_paise,
            cancellation: self.cancellation.map(|c| c.0),
        })
    }
}

fn assemble(row: BookingRow, passengers: Vec<Passenger>) -> CoreResult<Booking> {
    Ok(Booking {
        pnr: Pnr::parse(&row.pnr)?,
        train_number: row.train_number,
        journey_date: row.journey_date,
        coach_class: decode("coach_class", &row.coach_class)?,
        quota: decode("quota", &row.quota)?,
        source: row.source,
        destination: row.destination,
        distance_km: row.distance_km as u32,
        contact: ContactInfo {
            mobile: Masked(row.mobile),
            email: row.email.map(Masked),
        },
        status: decode("status", &row.status)?,
        total_fare_paise: row.total_fare_paise,
        passengers,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

const INVENTORY_COLUMNS: &str = "train_number, journey_date, coach_class, coach_units, pools, rac, \
     waitlist_length, waitlist_issued, chart_prepared, version";

const BOOKING_COLUMNS: &str = "b.pnr, b.train_number, b.journey_date, b.coach_class, b.quota, b.source, \
     b.destination, b.distance_km, b.mobile, b.email, b.status, b.total_fare_paise, b.created_at, b.updated_at";

async fn fetch_inventory(
    conn: &mut PgConnection,
    key: &InventoryKey,
    for_update: bool,
) -> CoreResult<Option<SeatInventory>> {
    let sql = format!(
        "SELECT {} FROM seat_inventory WHERE train_number = $1 AND journey_date = $2 AND coach_class = $3{}",
        INVENTORY_COLUMNS,
        if for_update { " FOR UPDATE" } else { "" }
    );
    let row: Option<InventoryRow> = sqlx::query_as(&sql)
        .bind(&key.train_number)
        .bind(key.journey_date)
        .bind(key.coach_class.code())
        .fetch_optional(&mut *conn)
        .await
        .map_err(storage_error)?;
    row.map(InventoryRow::into_record).transpose()
}

/// Attach passengers to booking rows, preserving passenger order.
async fn hydrate(conn: &mut PgConnection, rows: Vec<BookingRow>) -> CoreResult<BTreeMap<Pnr, Booking>> {
    if rows.is_empty() {
        return Ok(BTreeMap::new());
    }
    let pnrs: Vec<String> = rows.iter().map(|r| r.pnr.clone()).collect();
    let passenger_rows: Vec<PassengerRow> = sqlx::query_as(
        "SELECT pnr, passenger_id, name, age, gender, senior, disabled, quota, seat_pool, status, \
         booked_status, seat, sequence, rac_berth, fare_paise, refund_paise, cancellation \
         FROM passengers WHERE pnr = ANY($1) ORDER BY pnr, passenger_id",
    )
    .bind(&pnrs)
    .fetch_all(&mut *conn)
    .await
    .map_err(storage_error)?;

    let mut by_pnr: BTreeMap<String, Vec<Passenger>> = BTreeMap::new();
    for row in passenger_rows {
        let pnr = row.pnr.clone();
        by_pnr.entry(pnr).or_default().push(row.into_passenger()?);
    }

    let mut bookings = BTreeMap::new();
    for row in rows {
        let passengers = by_pnr.remove(&row.pnr).unwrap_or_default();
        let booking = assemble(row, passengers)?;
        bookings.insert(booking.pnr.clone(), booking);
    }
    Ok(bookings)
}

async fn upsert_booking(conn: &mut PgConnection, booking: &Booking) -> CoreResult<()> {
    sqlx::query(
        "INSERT INTO bookings (pnr, train_number, journey_date, coach_class, quota, source, destination, \
         distance_km, mobile, email, status, total_fare_paise, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
         ON CONFLICT (pnr) DO UPDATE SET status = EXCLUDED.status, updated_at = EXCLUDED.updated_at",
    )
    .bind(booking.pnr.as_str())
    .bind(&booking.train_number)
    .bind(booking.journey_date)
    .bind(booking.coach_class.code())
    .bind(booking.quota.code())
    .bind(&booking.source)
    .bind(&booking.destination)
    .bind(booking.distance_km as i32)
    .bind(booking.contact.mobile.expose())
    .bind(booking.contact.email.as_ref().map(|e| e.expose().clone()))
    .bind(booking.status.code())
    .bind(booking.total_fare_paise)
    .bind(booking.created_at)
    .bind(booking.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(storage_error)?;

    for passenger in &booking.passengers {
        sqlx::query(
            "INSERT INTO passengers (pnr, passenger_id, name, age, gender, senior, disabled, quota, seat_pool, \
             status, booked_status, seat, sequence, rac_berth, fare_paise, refund_paise, cancellation) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17) \
             ON CONFLICT (pnr, passenger_id) DO UPDATE SET seat_pool = EXCLUDED.seat_pool, \
             status = EXCLUDED.status, seat = EXCLUDED.seat, sequence = EXCLUDED.sequence, \
             rac_berth = EXCLUDED.rac_berth, refund_paise = EXCLUDED.refund_paise, \
             cancellation = EXCLUDED.cancellation",
        )
        .bind(booking.pnr.as_str())
        .bind(passenger.id as i32)
        .bind(&passenger.name)
        .bind(passenger.age as i16)
        .bind(encode(&passenger.gender)?)
        .bind(passenger.senior)
        .bind(passenger.disabled)
        .bind(passenger.quota.code())
        .bind(passenger.seat_pool.map(|q| q.code()))
        .bind(passenger.status.code())
        .bind(passenger.booked_status.code())
        .bind(passenger.seat.as_ref().map(Json))
        .bind(passenger.sequence.map(|s| s as i32))
        .bind(passenger.rac_berth.map(|b| b as i32))
        .bind(passenger.fare_paise)
        .bind(passenger.refund_paise)
        .bind(passenger.cancellation.as_ref().map(Json))
        .execute(&mut *conn)
        .await
        .map_err(storage_error)?;
    }
    Ok(())
}

#[async_trait]
impl InventoryStore for PgInventoryStore {
    async fn provision(&self, record: SeatInventory) -> CoreResult<()> {
        let result = sqlx::query(
            "INSERT INTO seat_inventory (train_number, journey_date, coach_class, coach_units, pools, rac, \
             waitlist_length, waitlist_issued, chart_prepared, version) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) ON CONFLICT DO NOTHING",
        )
        .bind(&record.key.train_number)
        .bind(record.key.journey_date)
        .bind(record.key.coach_class.code())
        .bind(record.coach_units as i32)
        .bind(Json(&record.pools))
        .bind(Json(&record.rac))
        .bind(record.waitlist_length as i32)
        .bind(record.waitlist_issued as i32)
        .bind(record.chart_prepared)
        .bind(record.version as i64)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::ValidationError(format!("{} is already provisioned", record.key)));
        }
        Ok(())
    }

    #[instrument(skip(self, include), fields(key = %key))]
    async fn lock(&self, key: &InventoryKey, include: &[Pnr]) -> CoreResult<Box<dyn InventoryLock>> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        // SET does not take bind parameters.
        sqlx::query(&format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

        let record = fetch_inventory(&mut tx, key, true)
            .await?
            .ok_or_else(|| CoreError::NotFoundError(format!("no inventory for {}", key)))?;

        let included: Vec<String> = include.iter().map(|p| p.as_str().to_string()).collect();
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings b \
             WHERE b.train_number = $1 AND b.journey_date = $2 AND b.coach_class = $3 \
             AND (b.pnr = ANY($4) OR EXISTS ( \
                 SELECT 1 FROM passengers p WHERE p.pnr = b.pnr AND p.status IN ('RAC', 'WTL')))",
            BOOKING_COLUMNS
        ))
        .bind(&key.train_number)
        .bind(key.journey_date)
        .bind(key.coach_class.code())
        .bind(&included)
        .fetch_all(&mut *tx)
        .await
        .map_err(storage_error)?;

        let bookings = hydrate(&mut tx, rows).await?;
        debug!(version = record.version, bookings = bookings.len(), "inventory row locked");

        Ok(Box::new(PgLock {
            tx,
            snapshot: CoachInventory { record, bookings },
        }))
    }

    async fn snapshot(&self, key: &InventoryKey) -> CoreResult<Option<SeatInventory>> {
        let mut conn = self.pool.acquire().await.map_err(storage_error)?;
        fetch_inventory(&mut conn, key, false).await
    }

    async fn keys_for_run(&self, train_number: &str, journey_date: NaiveDate) -> CoreResult<Vec<InventoryKey>> {
        let classes: Vec<(String,)> = sqlx::query_as(
            "SELECT coach_class FROM seat_inventory WHERE train_number = $1 AND journey_date = $2 \
             ORDER BY coach_class",
        )
        .bind(train_number)
        .bind(journey_date)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        classes
            .into_iter()
            .map(|(code,)| Ok(InventoryKey::new(train_number, journey_date, decode("coach_class", &code)?)))
            .collect()
    }

    async fn find_booking(&self, pnr: &Pnr) -> CoreResult<Option<Booking>> {
        let mut conn = self.pool.acquire().await.map_err(storage_error)?;
        let rows: Vec<BookingRow> = sqlx::query_as(&format!("SELECT {} FROM bookings b WHERE b.pnr = $1", BOOKING_COLUMNS))
            .bind(pnr.as_str())
            .fetch_all(&mut *conn)
            .await
            .map_err(storage_error)?;
        Ok(hydrate(&mut conn, rows).await?.remove(pnr))
    }
}

struct PgLock {
    tx: Transaction<'static, Postgres>,
    snapshot: CoachInventory,
}

#[async_trait]
impl InventoryLock for PgLock {
    fn inventory(&self) -> &CoachInventory {
        &self.snapshot
    }

    async fn commit(self: Box<Self>, inventory: CoachInventory) -> CoreResult<u64> {
        let PgLock { mut tx, snapshot } = *self;
        if inventory.key() != snapshot.key() {
            return Err(CoreError::InvariantViolation(format!(
                "lock on {} cannot commit {}",
                snapshot.key(),
                inventory.key()
            )));
        }

        let mut written = 0;
        for (pnr, booking) in &inventory.bookings {
            if snapshot.bookings.get(pnr) == Some(booking) {
                continue;
            }
            upsert_booking(&mut tx, booking).await?;
            written += 1;
        }

        let record = &inventory.record;
        let key = &record.key;
        let result = sqlx::query(
            "UPDATE seat_inventory SET pools = $4, rac = $5, waitlist_length = $6, waitlist_issued = $7, \
             chart_prepared = $8, version = version + 1, updated_at = NOW() \
             WHERE train_number = $1 AND journey_date = $2 AND coach_class = $3 AND version = $9",
        )
        .bind(&key.train_number)
        .bind(key.journey_date)
        .bind(key.coach_class.code())
        .bind(Json(&record.pools))
        .bind(Json(&record.rac))
        .bind(record.waitlist_length as i32)
        .bind(record.waitlist_issued as i32)
        .bind(record.chart_prepared)
        .bind(snapshot.record.version as i64)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() != 1 {
            return Err(CoreError::ConflictError(format!("{} changed under the lock", key)));
        }

        tx.commit().await.map_err(storage_error)?;
        let version = snapshot.record.version + 1;
        debug!(%key, version, bookings = written, "inventory committed");
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_core::{Gender, PassengerStatus};

    #[test]
    fn test_enum_codes_match_api_codes() {
        assert_eq!(encode(&Gender::Transgender).unwrap(), "T");
        assert_eq!(encode(&PassengerStatus::Wtl).unwrap(), "WTL");
        assert_eq!(encode(&Quota::Tatkal).unwrap(), Quota::Tatkal.code());
        assert_eq!(decode::<CoachClass>("coach_class", "3A").unwrap(), CoachClass::ThirdAc);
        assert!(decode::<Gender>("gender", "X").is_err());
    }
}
