use berth_core::{CoreResult, InventoryKey};
use berth_order::ReservationService;
use berth_store::SeedData;
use chrono::{Duration, NaiveDate};
use tracing::{debug, info};

/// Provision every templated class for each day a train runs in `[from, from + days)`.
/// Runs that already exist are skipped.
pub async fn provision_runs(
    service: &ReservationService,
    seed: &SeedData,
    from: NaiveDate,
    days: u32,
) -> CoreResult<u32> {
    let mut created = 0;
    for template in &seed.inventory {
        let Some(train) = seed.trains.iter().find(|t| t.number == template.train_number) else {
            continue;
        };
        let capacities = template.capacities();

        for offset in 0..days {
            let date = from + Duration::days(offset as i64);
            if !train.runs_on_date(date) {
                continue;
            }
            let key = InventoryKey::new(train.number.clone(), date, template.coach_class);
            if service.inventory(&key).await?.is_some() {
                debug!("{} already provisioned", key);
                continue;
            }
            service
                .provision(&train.number, date, template.coach_class, &capacities, template.rac_capacity)
                .await?;
            created += 1;
        }
    }
    info!("Provisioned {} train runs from seed data", created);
    Ok(created)
}
