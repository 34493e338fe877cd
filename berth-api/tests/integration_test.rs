use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use berth_api::{app, AppState};
use berth_catalog::{FareCalculator, FareRate, PricingConfig, QuotaPolicy, RefundPolicy};
use berth_core::{CoachClass, FixedClock, Quota, Stop, Train};
use berth_order::{BookingRules, ChartWindow, ReservationService};
use berth_store::{BroadcastEventSink, MemoryInventoryStore, StaticTrainCatalog};
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const ADULT_500KM: i64 = 61_360;

fn journey_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 11, 2).unwrap()
}

fn train() -> Train {
    let stop = |code: &str, sequence, arrival, departure, distance_km| Stop {
        station_code: code.to_string(),
        sequence,
        arrival_offset_minutes: arrival,
        departure_offset_minutes: departure,
        distance_km,
    };
    Train {
        number: "12951".to_string(),
        name: "Night Mail".to_string(),
        runs_on: vec![],
        stops: vec![
            stop("AAA", 1, None, Some(17 * 60), 0),
            stop("BBB", 2, Some(22 * 60), Some(22 * 60 + 10), 250),
            stop("CCC", 3, Some(28 * 60 + 20), None, 500),
        ],
        composition: BTreeMap::from([(CoachClass::Sleeper, 12)]),
    }
}

fn rate(quota: Quota, rate_paise_per_km: i64) -> FareRate {
    FareRate {
        coach_class: CoachClass::Sleeper,
        quota,
        rate_paise_per_km,
        default_discount_percent: 0,
        addon_paise: 2_000,
    }
}

async fn test_app(general: u32, rac: u32) -> Router {
    let clock = Arc::new(FixedClock::new(
        NaiveDate::from_ymd_opt(2026, 10, 20).unwrap().and_hms_opt(10, 0, 0).unwrap(),
    ));
    let events = BroadcastEventSink::new(64);
    let rules = BookingRules {
        fares: FareCalculator::new(
            vec![rate(Quota::General, 100), rate(Quota::Tatkal, 150)],
            PricingConfig::default(),
        )
        .unwrap(),
        quotas: QuotaPolicy::default(),
        refunds: RefundPolicy::standard(),
        chart_window: ChartWindow::default(),
    };
    let service = ReservationService::new(
        Arc::new(MemoryInventoryStore::new(Duration::from_secs(5))),
        Arc::new(StaticTrainCatalog::new(vec![train()])),
        Arc::new(events.clone()),
        clock,
        rules,
    );
    service
        .provision(
            "12951",
            journey_date(),
            CoachClass::Sleeper,
            &[(Quota::General, general), (Quota::Tatkal, 2)],
            rac,
        )
        .await
        .unwrap();

    app(AppState {
        service: Arc::new(service),
        events,
    })
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn booking(quota: &str, names: &[&str]) -> Value {
    let passengers: Vec<Value> = names
        .iter()
        .map(|name| json!({ "name": name, "age": 30, "gender": "F" }))
        .collect();
    json!({
        "train_number": "12951",
        "journey_date": "2026-11-02",
        "source": "AAA",
        "destination": "CCC",
        "coach_class": "SL",
        "quota": quota,
        "contact": { "mobile": "9876543210" },
        "passengers": passengers
    })
}

#[tokio::test]
async fn test_health() {
    let app = test_app(1, 0).await;
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_booking_lifecycle() {
    let app = test_app(1, 2).await;

    let (status, receipt) = send(&app, "POST", "/v1/bookings", Some(booking("GN", &["Asha", "Bela"]))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(receipt["status"], "RAC");
    assert_eq!(receipt["passengers"][0]["status"], "CNF");
    assert_eq!(receipt["passengers"][1]["status"], "RAC");
    assert_eq!(receipt["total_fare_paise"], 2 * ADULT_500KM);
    let pnr = receipt["pnr"].as_str().unwrap().to_string();
    assert_eq!(pnr.len(), 10);

    let (status, view) = send(&app, "GET", &format!("/v1/bookings/{}", pnr), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["train_number"], "12951");
    assert_eq!(view["chart_prepared"], false);
    assert_eq!(view["passengers"].as_array().unwrap().len(), 2);

    let (status, cancelled) = send(
        &app,
        "POST",
        &format!("/v1/bookings/{}/cancel", pnr),
        Some(json!({ "passenger_ids": [1] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["booking_status"], "CONFIRMED");
    assert_eq!(cancelled["total_refund_paise"], ADULT_500KM * 90 / 100);
    assert_eq!(cancelled["promotions"][0]["to"], "CNF");

    // A bare POST cancels whoever is left.
    let (status, cancelled) = send(&app, "POST", &format!("/v1/bookings/{}/cancel", pnr), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["booking_status"], "CANCELLED");

    let (status, error) = send(&app, "POST", &format!("/v1/bookings/{}/cancel", pnr), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["kind"], "VALIDATION");
}

#[tokio::test]
async fn test_search_lists_availability_and_fares() {
    let app = test_app(5, 2).await;
    send(&app, "POST", "/v1/bookings", Some(booking("GN", &["Asha"]))).await;

    let (status, options) = send(
        &app,
        "GET",
        "/v1/trains/search?source=AAA&destination=CCC&date=2026-11-02",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let options = options.as_array().unwrap();
    assert_eq!(options.len(), 1);
    assert_eq!(options[0]["distance_km"], 500);

    let class = &options[0]["classes"][0];
    assert_eq!(class["coach_class"], "SL");
    let general = class["quotas"]
        .as_array()
        .unwrap()
        .iter()
        .find(|q| q["quota"] == "GN")
        .unwrap();
    assert_eq!(general["remaining"], 4);
    assert_eq!(general["adult_fare_paise"], ADULT_500KM);
}

#[tokio::test]
async fn test_errors_carry_kind_and_status() {
    let app = test_app(1, 0).await;

    let (status, error) = send(&app, "POST", "/v1/bookings", Some(booking("GN", &[]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["kind"], "VALIDATION");

    let (status, error) = send(&app, "POST", "/v1/bookings", Some(booking("TQ", &["A", "B", "C"]))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["kind"], "CAPACITY_EXHAUSTED");

    let (status, error) = send(&app, "GET", "/v1/bookings/1234567890", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["kind"], "NOT_FOUND");

    let (status, _) = send(&app, "GET", "/v1/bookings/not-a-pnr", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "POST", "/v1/charts/12951/02-11-2026", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, error) = send(&app, "POST", "/v1/charts/99999/2026-11-02", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["kind"], "NOT_FOUND");
}

#[tokio::test]
async fn test_malformed_bodies_are_validation_errors() {
    let app = test_app(1, 0).await;

    let mut bad_class = booking("GN", &["Asha"]);
    bad_class["coach_class"] = json!("ZZ");
    let (status, error) = send(&app, "POST", "/v1/bookings", Some(bad_class)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["kind"], "VALIDATION");
    assert!(error["message"].as_str().unwrap().contains("unknown coach class code 'ZZ'"));

    let mut too_old = booking("GN", &["Asha"]);
    too_old["passengers"][0]["age"] = json!(300);
    let (status, error) = send(&app, "POST", "/v1/bookings", Some(too_old)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["kind"], "VALIDATION");

    let mut bad_quota = booking("GN", &["Asha"]);
    bad_quota["quota"] = json!("XX");
    let (status, error) = send(&app, "POST", "/v1/bookings", Some(bad_quota)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["kind"], "VALIDATION");

    let (status, error) = send(&app, "POST", "/v1/bookings/4512345678/cancel", Some(json!({ "passenger_ids": "all" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["kind"], "VALIDATION");

    let (status, error) = send(&app, "GET", "/v1/trains/search?source=AAA&destination=CCC", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["kind"], "VALIDATION");
}

#[tokio::test]
async fn test_manual_chart_preparation() {
    let app = test_app(1, 2).await;
    let (_, receipt) = send(&app, "POST", "/v1/bookings", Some(booking("GN", &["A", "B", "C", "D"]))).await;
    assert_eq!(receipt["passengers"][3]["status"], "WTL");

    let (status, reports) = send(&app, "POST", "/v1/charts/12951/2026-11-02", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reports[0]["already_prepared"], false);
    assert_eq!(reports[0]["rac_confirmed"], 2);
    assert_eq!(reports[0]["waitlist_cancelled"], 1);

    let (_, reports) = send(&app, "POST", "/v1/charts/12951/2026-11-02", None).await;
    assert_eq!(reports[0]["already_prepared"], true);

    let pnr = receipt["pnr"].as_str().unwrap();
    let (_, view) = send(&app, "GET", &format!("/v1/bookings/{}", pnr), None).await;
    assert_eq!(view["chart_prepared"], true);
    assert_eq!(view["status"], "CONFIRMED");
    assert_eq!(view["passengers"][3]["status"], "CAN");
}

#[tokio::test]
async fn test_event_stream_opens() {
    let app = test_app(1, 0).await;
    let request = Request::builder()
        .uri("/v1/events?key=1234567890")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
}
