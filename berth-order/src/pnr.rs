use berth_core::{CoreResult, Pnr};
use rand::Rng;

/// Draw a random 10-digit PNR; the leading digit is never zero.
pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> CoreResult<Pnr> {
    let value: u64 = rng.gen_range(1_000_000_000..10_000_000_000);
    Pnr::parse(&value.to_string())
}
