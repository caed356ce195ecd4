use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

/// One executed (or backtested) trade, rendered to a spreadsheet row in
/// declaration order: timestamp, symbol, price, quantity, pnl, then any
/// extension fields in the order the caller supplied them.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub price: f64,
    pub quantity: f64,
    pub pnl: f64,
    /// Caller-supplied extension fields, appended after the fixed columns.
    pub extra: Vec<(String, Value)>,
}

impl TradeRecord {
    pub fn new(
        timestamp: DateTime<Utc>,
        symbol: impl Into<String>,
        price: f64,
        quantity: f64,
        pnl: f64,
    ) -> Self {
        TradeRecord {
            timestamp,
            symbol: symbol.into(),
            price,
            quantity,
            pnl,
            extra: Vec::new(),
        }
    }

    pub fn with_extra(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.push((name.into(), value.into()));
        self
    }

    pub fn cells(&self) -> Vec<Value> {
        let mut cells = vec![
            Value::String(
                self.timestamp
                    .to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
            Value::String(self.symbol.clone()),
            Value::from(self.price),
            Value::from(self.quantity),
            Value::from(self.pnl),
        ];
        cells.extend(self.extra.iter().map(|(_, value)| value.clone()));
        cells
    }
}

/// Per-symbol PnL total; `symbol` is the unique key within the summary sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryEntry {
    pub symbol: String,
    pub total_pnl: f64,
}

impl SummaryEntry {
    pub fn new(symbol: impl Into<String>, total_pnl: f64) -> Self {
        SummaryEntry {
            symbol: symbol.into(),
            total_pnl,
        }
    }

    pub fn cells(&self) -> Vec<Value> {
        vec![
            Value::String(self.symbol.clone()),
            Value::from(self.total_pnl),
        ]
    }
}

/// Win/loss totals derived from a set of trade records.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WinStats {
    pub total: usize,
    pub wins: usize,
    pub losses: usize,
    pub ratio: f64,
}

impl WinStats {
    /// A trade counts as a win when its pnl is strictly positive.
    pub fn from_records(records: &[TradeRecord]) -> Self {
        let total = records.len();
        let wins = records.iter().filter(|record| record.pnl > 0.0).count();
        let ratio = if total == 0 {
            0.0
        } else {
            wins as f64 / total as f64
        };
        WinStats {
            total,
            wins,
            losses: total - wins,
            ratio,
        }
    }
}

/// Human-readable one-liner for a strategy signal, suitable for alerting.
pub fn signal_alert(symbol: &str, date: &str, signal: &str, price: f64) -> String {
    format!("[{}] Strategy Signal ({}): {} at {:.2}", symbol, date, signal, price)
}
