//! Trade dataset ingestion
//!
//! Reads the synthetic stock-trade CSV, keeps the columns the analysis needs
//! and drops rows whose numeric columns are missing or unparsable.

use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};

/// One executed trade
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub timestamp: String,
    pub ticker: String,
    pub broker_id: String,
    pub quantity: f64,
    pub trade_value: f64,
    pub sector: String,
    pub country: String,
}

/// Raw CSV row before numeric cleaning. Extra columns are ignored.
#[derive(Debug, Deserialize)]
struct RawTrade {
    timestamp: String,
    ticker: String,
    broker_id: String,
    #[serde(deserialize_with = "csv::invalid_option")]
    quantity: Option<f64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    trade_value: Option<f64>,
    sector: String,
    country: String,
}

impl RawTrade {
    fn into_trade(self) -> Option<Trade> {
        let quantity = self.quantity.filter(|q| q.is_finite())?;
        let trade_value = self.trade_value.filter(|v| v.is_finite())?;
        Some(Trade {
            timestamp: self.timestamp,
            ticker: self.ticker,
            broker_id: self.broker_id,
            quantity,
            trade_value,
            sector: self.sector,
            country: self.country,
        })
    }
}

/// Load and clean trades from a CSV file.
pub fn load_trades(path: impl AsRef<Path>) -> Result<Vec<Trade>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)?;
    let trades = read_trades(file)?;
    info!("Loaded {} trades from {}", trades.len(), path.display());
    Ok(trades)
}

/// Parse and clean trades from any CSV source with a header row.
pub fn read_trades<R: Read>(reader: R) -> Result<Vec<Trade>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let headers = csv_reader.headers()?.clone();

    let mut trades = Vec::new();
    let mut dropped = 0usize;
    for record in csv_reader.records() {
        let record = record?;
        // Short rows are missing cells, not columns.
        if record.len() < headers.len() {
            dropped += 1;
            continue;
        }
        match record.deserialize::<RawTrade>(Some(&headers))?.into_trade() {
            Some(trade) => trades.push(trade),
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        warn!(
            "Dropped {} short rows or rows with missing or non-numeric quantity/trade_value",
            dropped
        );
    }
    if trades.is_empty() {
        return Err(Error::DatasetError(
            "no valid trades after cleaning".to_string(),
        ));
    }
    Ok(trades)
}

pub fn filter_broker<'a>(trades: &'a [Trade], broker_id: &str) -> Vec<&'a Trade> {
    trades.iter().filter(|t| t.broker_id == broker_id).collect()
}

pub fn filter_sector<'a>(trades: &'a [Trade], sector: &str) -> Vec<&'a Trade> {
    trades.iter().filter(|t| t.sector == sector).collect()
}
