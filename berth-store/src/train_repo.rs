use async_trait::async_trait;
use berth_core::{CoachClass, CoreResult, Stop, Train, TrainCatalog};
use chrono::Weekday;
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::BTreeMap;

use crate::database::storage_error;

pub struct PgTrainCatalog {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct TrainRow {
    number: String,
    name: String,
    runs_on: Json<Vec<Weekday>>,
    composition: Json<BTreeMap<CoachClass, u32>>,
}

#[derive(sqlx::FromRow)]
struct StopRow {
    train_number: String,
    sequence: i32,
    station_code: String,
    arrival_offset_minutes: Option<i64>,
    departure_offset_minutes: Option<i64>,
    distance_km: i32,
}

impl From<StopRow> for Stop {
    fn from(row: StopRow) -> Self {
        Stop {
            station_code: row.station_code,
            sequence: row.sequence as u32,
            arrival_offset_minutes: row.arrival_offset_minutes,
            departure_offset_minutes: row.departure_offset_minutes,
            distance_km: row.distance_km as u32,
        }
    }
}

impl PgTrainCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Replace a train and its stops; used when seeding reference data.
    pub async fn upsert(&self, train: &Train) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        sqlx::query(
            "INSERT INTO trains (number, name, runs_on, composition) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (number) DO UPDATE SET name = EXCLUDED.name, runs_on = EXCLUDED.runs_on, \
             composition = EXCLUDED.composition",
        )
        .bind(&train.number)
        .bind(&train.name)
        .bind(Json(&train.runs_on))
        .bind(Json(&train.composition))
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        sqlx::query("DELETE FROM train_stops WHERE train_number = $1")
            .bind(&train.number)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

        for stop in &train.stops {
            sqlx::query(
                "INSERT INTO train_stops (train_number, sequence, station_code, arrival_offset_minutes, \
                 departure_offset_minutes, distance_km) VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(&train.number)
            .bind(stop.sequence as i32)
            .bind(&stop.station_code)
            .bind(stop.arrival_offset_minutes)
            .bind(stop.departure_offset_minutes)
            .bind(stop.distance_km as i32)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
        }

        tx.commit().await.map_err(storage_error)
    }

    async fn load(&self, numbers: Option<Vec<String>>) -> CoreResult<Vec<Train>> {
        let trains: Vec<TrainRow> = match &numbers {
            Some(numbers) => sqlx::query_as(
                "SELECT number, name, runs_on, composition FROM trains WHERE number = ANY($1) ORDER BY number",
            )
            .bind(numbers)
            .fetch_all(&self.pool)
            .await,
            None => sqlx::query_as("SELECT number, name, runs_on, composition FROM trains ORDER BY number")
                .fetch_all(&self.pool)
                .await,
        }
        .map_err(storage_error)?;

        if trains.is_empty() {
            return Ok(Vec::new());
        }
        let wanted: Vec<String> = trains.iter().map(|t| t.number.clone()).collect();
        let stops: Vec<StopRow> = sqlx::query_as(
            "SELECT train_number, sequence, station_code, arrival_offset_minutes, departure_offset_minutes, \
             distance_km FROM train_stops WHERE train_number = ANY($1) ORDER BY train_number, sequence",
        )
        .bind(&wanted)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        let mut by_train: BTreeMap<String, Vec<Stop>> = BTreeMap::new();
        for row in stops {
            by_train.entry(row.train_number.clone()).or_default().push(row.into());
        }

        Ok(trains
            .into_iter()
            .map(|row| Train {
                stops: by_train.remove(&row.number).unwrap_or_default(),
                number: row.number,
                name: row.name,
                runs_on: row.runs_on.0,
                composition: row.composition.0,
            })
            .collect())
    }
}

#[async_trait]
impl TrainCatalog for PgTrainCatalog {
    async fn train(&self, number: &str) -> CoreResult<Option<Train>> {
        Ok(self.load(Some(vec![number.to_string()])).await?.into_iter().next())
    }

    async fn trains_between(&self, source: &str, destination: &str) -> CoreResult<Vec<Train>> {
        let numbers: Vec<(String,)> = sqlx::query_as(
            "SELECT s.train_number FROM train_stops s \
             JOIN train_stops d ON d.train_number = s.train_number AND d.sequence > s.sequence \
             WHERE s.station_code = $1 AND d.station_code = $2",
        )
        .bind(source)
        .bind(destination)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        if numbers.is_empty() {
            return Ok(Vec::new());
        }
        self.load(Some(numbers.into_iter().map(|(n,)| n).collect())).await
    }

    async fn all_trains(&self) -> CoreResult<Vec<Train>> {
        self.load(None).await
    }
}
