use crate::domain::{DailyPriceTable, ExchangeRate, HourlyPrice, SpotError, HOURS_PER_DAY};

const KWH_PER_MWH: f64 = 1000.0;

/// Convert a day of EUR/MWh prices into CZK/kWh, rounded to two decimals.
pub(crate) fn convert(
    table: &DailyPriceTable,
    rate: ExchangeRate,
) -> Result<Vec<HourlyPrice>, SpotError> {
    if table.values().len() != HOURS_PER_DAY {
        return Err(SpotError::InvariantViolation(format!(
            "price table holds {} values instead of {}",
            table.values().len(),
            HOURS_PER_DAY
        )));
    }

    Ok(table
        .values()
        .iter()
        .enumerate()
        .map(|(hour, eur_per_mwh)| HourlyPrice {
            hour: format!("{hour}:00"),
            czk_per_kwh: round_to_cents(eur_per_mwh * rate.czk_per_eur() / KWH_PER_MWH),
        })
        .collect())
}

/// Halves go to the even neighbour.
fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}
