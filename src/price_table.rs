use std::io::Cursor;

use calamine::{Data, Range, Reader, Xls};
use log::debug;

use crate::domain::{DailyPriceTable, SpotError, HOURS_PER_DAY};

/// Rows above the hourly table: report title, market date and column headers.
const HEADER_ROWS: u32 = 6;
/// Column B holds the price in EUR/MWh.
const PRICE_COLUMN: u32 = 1;

/// Read the 24 hourly prices out of an OTE day-ahead `.xls` report.
pub(crate) fn parse(file_bytes: &[u8]) -> Result<DailyPriceTable, SpotError> {
    let mut workbook = Xls::new(Cursor::new(file_bytes))
        .map_err(|e| SpotError::MalformedPriceFile(format!("cannot open workbook: {e}")))?;

    let sheet_names = workbook.sheet_names();
    let first_sheet = sheet_names
        .first()
        .ok_or_else(|| SpotError::MalformedPriceFile("workbook has no sheets".to_string()))?;

    let range = workbook
        .worksheet_range(first_sheet)
        .map_err(|e| SpotError::MalformedPriceFile(format!("cannot read sheet: {e}")))?;

    debug!("read sheet \"{}\" spanning {:?}", first_sheet, range.end());

    extract_hourly_values(&range)
}

/// Take column B of the 24 rows following the header, in row order.
pub(crate) fn extract_hourly_values(range: &Range<Data>) -> Result<DailyPriceTable, SpotError> {
    let first_row = HEADER_ROWS;
    let last_row = HEADER_ROWS + HOURS_PER_DAY as u32 - 1;

    let values = (first_row..=last_row)
        .map(|row| match range.get_value((row, PRICE_COLUMN)) {
            Some(Data::Float(value)) => Ok(*value),
            Some(Data::Int(value)) => Ok(*value as f64),
            Some(Data::Empty) | None => Err(SpotError::MalformedPriceFile(format!(
                "expected {} hourly rows, row {} is missing",
                HOURS_PER_DAY,
                row + 1
            ))),
            Some(other) => Err(SpotError::MalformedPriceFile(format!(
                "non-numeric price {:?} in row {}",
                other,
                row + 1
            ))),
        })
        .collect::<Result<Vec<f64>, SpotError>>()?;

    DailyPriceTable::new(values)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Day-ahead report for 15.6.2024 as downloaded from OTE, trimmed to the
    /// hourly price and volume columns.
    pub(crate) const PRICE_FILE: &[u8] = include_bytes!("../fixtures/DT_15_06_2024_CZ.xls");

    pub(crate) const PRICE_FILE_VALUES: [f64; 24] = [
        96.52, 90.03, 88.12, 85.40, 87.00, 95.11, 110.35, 125.80, 104.20, 80.00, 45.51, 12.07,
        0.50, -1.20, 5.03, 30.70, 78.90, 110.00, 145.62, 190.40, 210.85, 160.30, 120.01, 101.99,
    ];

    /// Lay out a sheet the way OTE does: six header rows, then hour in
    /// column A and price in column B.
    fn sheet_with_prices(prices: &[Data]) -> Range<Data> {
        let last_row = (HEADER_ROWS as usize + prices.len()).max(HEADER_ROWS as usize + 1) as u32;
        let mut range = Range::new((0, 0), (last_row, 2));

        range.set_value((0, 0), Data::String("Výsledky denního trhu".to_string()));
        range.set_value((5, 0), Data::String("Hodina".to_string()));
        range.set_value((5, 1), Data::String("Cena (EUR/MWh)".to_string()));

        for (hour, price) in prices.iter().enumerate() {
            let row = HEADER_ROWS + hour as u32;
            range.set_value((row, 0), Data::Int(hour as i64 + 1));
            range.set_value((row, 1), price.clone());
        }

        range
    }

    #[test]
    fn test_extract_hourly_values() {
        let prices = (0..24)
            .map(|hour| Data::Float(80.0 + hour as f64 * 0.5))
            .collect::<Vec<Data>>();

        let table = extract_hourly_values(&sheet_with_prices(&prices)).unwrap();

        assert_eq!(table.values().len(), 24);
        assert_eq!(table.values()[0], 80.0);
        assert_eq!(table.values()[23], 91.5);
    }

    #[test]
    fn test_extract_hourly_values_accepts_integers() {
        let mut prices = vec![Data::Float(100.25); 24];
        prices[3] = Data::Int(-5);

        let table = extract_hourly_values(&sheet_with_prices(&prices)).unwrap();

        assert_eq!(table.values()[3], -5.0);
        assert_eq!(table.values()[4], 100.25);
    }

    #[test]
    fn test_extract_hourly_values_ignores_rows_after_the_day() {
        let mut prices = vec![Data::Float(50.0); 24];
        prices.push(Data::String("Celkem".to_string()));

        let table = extract_hourly_values(&sheet_with_prices(&prices)).unwrap();

        assert_eq!(table.values(), &[50.0; 24]);
    }

    #[test]
    fn test_extract_hourly_values_fewer_than_24_rows() {
        let prices = vec![Data::Float(50.0); 23];

        let result = extract_hourly_values(&sheet_with_prices(&prices));

        assert!(matches!(result, Err(SpotError::MalformedPriceFile(_))));
    }

    #[test]
    fn test_extract_hourly_values_non_numeric_cell() {
        let mut prices = vec![Data::Float(50.0); 24];
        prices[12] = Data::String("n/a".to_string());

        let result = extract_hourly_values(&sheet_with_prices(&prices));

        assert!(matches!(result, Err(SpotError::MalformedPriceFile(_))));
    }

    #[test]
    fn test_extract_hourly_values_gap_in_rows() {
        let mut prices = vec![Data::Float(50.0); 24];
        prices[7] = Data::Empty;

        let result = extract_hourly_values(&sheet_with_prices(&prices));

        assert!(matches!(result, Err(SpotError::MalformedPriceFile(_))));
    }

    #[test]
    fn test_parse_price_file() {
        let table = parse(PRICE_FILE).unwrap();

        assert_eq!(table.values(), &PRICE_FILE_VALUES);
    }

    #[test]
    fn test_parse_truncated_price_file() {
        let result = parse(&PRICE_FILE[..PRICE_FILE.len() / 2]);

        assert!(matches!(result, Err(SpotError::MalformedPriceFile(_))));
    }

    #[test]
    fn test_parse_rejects_non_spreadsheet_bytes() {
        let result = parse(b"<html><body>404 Not Found</body></html>");

        assert!(matches!(result, Err(SpotError::MalformedPriceFile(_))));
    }

    #[test]
    fn test_parse_rejects_empty_body() {
        assert!(matches!(parse(&[]), Err(SpotError::MalformedPriceFile(_))));
    }
}
