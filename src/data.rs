use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use tracing::info;

use crate::asset::Asset;
use crate::error::OptimizerError;

/// Load a wide price table: a date column followed by one column per ticker.
///
/// Column order becomes universe order. An unparsable or non-finite price is
/// an error; rows are never skipped.
pub fn load_prices_csv(path: &Path) -> Result<Vec<Asset>, OptimizerError> {
    let file = std::fs::File::open(path).map_err(|err| {
        OptimizerError::input(format!("failed to open {}: {err}", path.display()))
    })?;
    let assets = read_prices(file)?;
    info!(
        path = %path.display(),
        tickers = assets.len(),
        periods = assets.first().map_or(0, |a| a.returns().len()),
        "loaded price data"
    );
    Ok(assets)
}

pub fn read_prices<R: Read>(reader: R) -> Result<Vec<Asset>, OptimizerError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let tickers: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();
    if tickers.is_empty() {
        return Err(OptimizerError::input("price table has no ticker columns"));
    }
    let mut seen = HashSet::new();
    for ticker in &tickers {
        if ticker.is_empty() {
            return Err(OptimizerError::input("price table has an unnamed ticker column"));
        }
        if !seen.insert(ticker.as_str()) {
            return Err(OptimizerError::input(format!("duplicate ticker column {ticker}")));
        }
    }

    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); tickers.len()];
    for (row_idx, rec) in rdr.records().enumerate() {
        let rec = rec?;
        let line = row_idx + 2;
        if rec.len() != tickers.len() + 1 {
            return Err(OptimizerError::input(format!(
                "line {line}: expected {} fields, found {}",
                tickers.len() + 1,
                rec.len()
            )));
        }
        for (col, ticker) in tickers.iter().enumerate() {
            let raw = rec.get(col + 1).unwrap_or_default();
            let price = raw
                .parse::<f64>()
                .ok()
                .filter(|p| p.is_finite())
                .ok_or_else(|| {
                    OptimizerError::input(format!("line {line}: invalid price {raw:?} for {ticker}"))
                })?;
            columns[col].push(price);
        }
    }

    let rows = columns.first().map_or(0, Vec::len);
    if rows < 2 {
        return Err(OptimizerError::input(format!(
            "need at least 2 price rows, found {rows}"
        )));
    }

    Ok(tickers
        .into_iter()
        .zip(columns)
        .map(|(ticker, prices)| Asset::from_prices(ticker, prices))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_columns_in_header_order() {
        let csv = "Date,AAA,BBB\n2024-01-02,10,20\n2024-01-03,11,19\n2024-01-04,12.1,19\n";
        let assets = read_prices(csv.as_bytes()).unwrap();
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].ticker(), "AAA");
        assert_eq!(assets[1].ticker(), "BBB");
        assert_eq!(assets[0].prices(), &[10.0, 11.0, 12.1]);
        assert_eq!(assets[1].returns().len(), 2);
        assert!((assets[1].returns()[0] + 0.05).abs() < 1e-12);
        assert_eq!(assets[1].returns()[1], 0.0);
    }

    #[test]
    fn rejects_non_numeric_price() {
        let csv = "Date,AAA\n2024-01-02,10\n2024-01-03,n/a\n";
        let err = read_prices(csv.as_bytes()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("line 3"), "{msg}");
        assert!(msg.contains("AAA"), "{msg}");
    }

    #[test]
    fn rejects_empty_and_non_finite_cells() {
        assert!(read_prices("Date,AAA\nd1,10\nd2,\n".as_bytes()).is_err());
        assert!(read_prices("Date,AAA\nd1,10\nd2,inf\n".as_bytes()).is_err());
    }

    #[test]
    fn rejects_short_tables() {
        assert!(matches!(
            read_prices("Date,AAA\nd1,10\n".as_bytes()),
            Err(OptimizerError::Input { .. })
        ));
        assert!(matches!(
            read_prices("Date\nd1\nd2\n".as_bytes()),
            Err(OptimizerError::Input { .. })
        ));
    }

    #[test]
    fn rejects_duplicate_tickers() {
        let err = read_prices("Date,AAA,AAA\nd1,1,2\nd2,1,2\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn missing_file_is_input_error() {
        let err = load_prices_csv(Path::new("/nonexistent/prices.csv")).unwrap_err();
        assert!(matches!(err, OptimizerError::Input { .. }));
    }
}
