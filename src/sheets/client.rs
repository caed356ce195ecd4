use std::fmt::Debug;
use std::path::Path;

use error_stack::{report, Context, Result, ResultExt};
use google_sheets4::api::{
    AddSheetRequest, BatchUpdateSpreadsheetRequest, ClearValuesRequest, Request, SheetProperties,
    ValueRange,
};
use google_sheets4::{hyper, hyper_rustls, Sheets};
use serde_json::Value;
use tracing::instrument;

use crate::trade::{SummaryEntry, TradeRecord, WinStats};

use super::auth::{self, AuthError};
use super::http_client::http_client;
use super::value_range_factory::ValueRangeFactory;

type SheetsHub = Sheets<hyper_rustls::HttpsConnector<hyper::client::HttpConnector>>;

pub const SUMMARY_SHEET_TITLE: &str = "P&L Summary";
pub const WIN_RATIO_SHEET_TITLE: &str = "Win Ratio";

#[derive(Debug)]
pub enum LogError {
    NotAuthenticated,
    FailedToResolveSpreadsheet,
    FailedToAppendRows,
}

impl std::fmt::Display for LogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl Context for LogError {}

#[derive(Debug)]
pub enum SummaryError {
    NotAuthenticated,
    FailedToResolveSpreadsheet,
    FailedToCreateSheet,
    FailedToClearSheet,
    FailedToWriteRows,
}

impl std::fmt::Display for SummaryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl Context for SummaryError {}

#[derive(Debug)]
pub enum WinRatioError {
    NotAuthenticated,
    FailedToResolveSpreadsheet,
    FailedToCreateSheet,
    FailedToClearSheet,
    FailedToWriteRows,
}

impl std::fmt::Display for WinRatioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl Context for WinRatioError {}

#[derive(Debug, Clone, Copy)]
enum ReplaceSheetError {
    FailedToResolveSpreadsheet,
    FailedToCreateSheet,
    FailedToClearSheet,
    FailedToWriteRows,
}

impl std::fmt::Display for ReplaceSheetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl Context for ReplaceSheetError {}

impl From<&ReplaceSheetError> for SummaryError {
    fn from(err: &ReplaceSheetError) -> Self {
        match err {
            ReplaceSheetError::FailedToResolveSpreadsheet => SummaryError::FailedToResolveSpreadsheet,
            ReplaceSheetError::FailedToCreateSheet => SummaryError::FailedToCreateSheet,
            ReplaceSheetError::FailedToClearSheet => SummaryError::FailedToClearSheet,
            ReplaceSheetError::FailedToWriteRows => SummaryError::FailedToWriteRows,
        }
    }
}

impl From<&ReplaceSheetError> for WinRatioError {
    fn from(err: &ReplaceSheetError) -> Self {
        match err {
            ReplaceSheetError::FailedToResolveSpreadsheet => WinRatioError::FailedToResolveSpreadsheet,
            ReplaceSheetError::FailedToCreateSheet => WinRatioError::FailedToCreateSheet,
            ReplaceSheetError::FailedToClearSheet => WinRatioError::FailedToClearSheet,
            ReplaceSheetError::FailedToWriteRows => WinRatioError::FailedToWriteRows,
        }
    }
}

/// Thin client over the Sheets hub. Construct with [`SheetClient::new`], then
/// call [`SheetClient::authenticate`] once; the authenticated hub is cached
/// for all subsequent operations. The client has no internal synchronization:
/// callers sharing one instance across tasks must serialize access themselves.
pub struct SheetClient {
    hub: Option<SheetsHub>,
    summary_sheet_title: Box<str>,
    win_ratio_sheet_title: Box<str>,
}

impl Debug for SheetClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SheetClient {{ authenticated: {} }}",
            self.is_authenticated()
        )
    }
}

impl Default for SheetClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SheetClient {
    pub fn new() -> Self {
        Self::with_titles(SUMMARY_SHEET_TITLE, WIN_RATIO_SHEET_TITLE)
    }

    pub fn with_titles(
        summary_sheet_title: impl Into<Box<str>>,
        win_ratio_sheet_title: impl Into<Box<str>>,
    ) -> Self {
        SheetClient {
            hub: None,
            summary_sheet_title: summary_sheet_title.into(),
            win_ratio_sheet_title: win_ratio_sheet_title.into(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.hub.is_some()
    }

    /// Reads the service account key at `priv_key_path` and establishes an
    /// authorized session. On failure no session is cached and a later retry
    /// is up to the caller.
    #[instrument]
    pub async fn authenticate(&mut self, priv_key_path: &Path) -> Result<(), AuthError> {
        let client = http_client();
        let authenticator = match auth::auth(priv_key_path, client.clone()).await {
            Ok(authenticator) => authenticator,
            Err(report) => {
                tracing::error!(
                    "authentication failed for key '{}': {:?}",
                    priv_key_path.display(),
                    report
                );
                return Err(report);
            }
        };

        self.hub = Some(Sheets::new(client, authenticator));
        tracing::info!(
            "authenticated with service account key '{}'",
            priv_key_path.display()
        );
        Ok(())
    }

    /// Appends `record` as one trailing row on the first worksheet of the
    /// target spreadsheet, field order preserved verbatim.
    #[instrument(skip(record), fields(symbol = %record.symbol))]
    pub async fn log_trade(
        &self,
        spreadsheet_id: &str,
        record: &TradeRecord,
    ) -> Result<(), LogError> {
        self.log_trades(spreadsheet_id, std::slice::from_ref(record))
            .await
            .attach_printable_lazy(|| {
                format!("trade: {} @ {}", record.symbol, record.timestamp)
            })
    }

    /// Bulk form of [`SheetClient::log_trade`]: appends all records as
    /// consecutive rows in a single append call, input order preserved.
    /// An empty slice performs no remote call.
    #[instrument(skip(records), fields(records = records.len()))]
    pub async fn log_trades(
        &self,
        spreadsheet_id: &str,
        records: &[TradeRecord],
    ) -> Result<(), LogError> {
        if records.is_empty() {
            tracing::info!("no trade rows to append to spreadsheet {}", spreadsheet_id);
            return Ok(());
        }

        let result = self.try_log_trades(spreadsheet_id, records).await;
        match &result {
            Ok(()) => tracing::info!(
                "appended {} trade row(s) to spreadsheet {}",
                records.len(),
                spreadsheet_id
            ),
            Err(report) => tracing::error!(
                "log_trades failed for spreadsheet {}: {:?}",
                spreadsheet_id,
                report
            ),
        }
        result
    }

    async fn try_log_trades(
        &self,
        spreadsheet_id: &str,
        records: &[TradeRecord],
    ) -> Result<(), LogError> {
        let hub = self.hub.as_ref().ok_or(report!(LogError::NotAuthenticated))?;

        let response = hub
            .spreadsheets()
            .get(spreadsheet_id)
            .doit()
            .await
            .change_context(LogError::FailedToResolveSpreadsheet)
            .attach_printable_lazy(|| format!("spreadsheet id: {}", spreadsheet_id))?;

        let first_sheet_title = response
            .1
            .sheets
            .as_ref()
            .and_then(|sheets| sheets.first())
            .and_then(|sheet| sheet.properties.as_ref())
            .and_then(|props| props.title.clone())
            .ok_or(report!(LogError::FailedToResolveSpreadsheet))
            .attach_printable("spreadsheet has no first worksheet")?;

        let rows = records.iter().map(TradeRecord::cells).collect();
        hub.spreadsheets()
            .values_append(
                ValueRange::from_rows(rows),
                spreadsheet_id,
                &sheet_anchor(&first_sheet_title),
            )
            .value_input_option("USER_ENTERED")
            .insert_data_option("INSERT_ROWS")
            .doit()
            .await
            .map(|_| ())
            .change_context(LogError::FailedToAppendRows)
            .attach_printable_lazy(|| format!("worksheet: {}", first_sheet_title))
    }

    /// Full-replaces the summary worksheet with a header row plus exactly one
    /// row per entry, in caller order. Symbols absent from `entries` are gone
    /// afterwards; the worksheet is created when missing.
    #[instrument(skip(entries), fields(entries = entries.len()))]
    pub async fn update_summary(
        &self,
        spreadsheet_id: &str,
        entries: &[SummaryEntry],
    ) -> Result<(), SummaryError> {
        let result = self.try_update_summary(spreadsheet_id, entries).await;
        match &result {
            Ok(()) => tracing::info!(
                "summary sheet now holds {} symbol(s) in spreadsheet {}",
                entries.len(),
                spreadsheet_id
            ),
            Err(report) => tracing::error!(
                "update_summary failed for spreadsheet {}: {:?}",
                spreadsheet_id,
                report
            ),
        }
        result
    }

    async fn try_update_summary(
        &self,
        spreadsheet_id: &str,
        entries: &[SummaryEntry],
    ) -> Result<(), SummaryError> {
        let hub = self
            .hub
            .as_ref()
            .ok_or(report!(SummaryError::NotAuthenticated))?;

        replace_sheet_rows(
            hub,
            spreadsheet_id,
            &self.summary_sheet_title,
            summary_rows(entries),
        )
        .await
        .map_err(|report| {
            let context: SummaryError = report.current_context().into();
            report.change_context(context)
        })
    }

    /// Derives [`WinStats`] from `records` and full-replaces the win ratio
    /// worksheet with them. An empty record set writes a ratio of 0.
    #[instrument(skip(records), fields(records = records.len()))]
    pub async fn update_win_ratio(
        &self,
        spreadsheet_id: &str,
        records: &[TradeRecord],
    ) -> Result<(), WinRatioError> {
        let stats = WinStats::from_records(records);
        let result = self.try_update_win_ratio(spreadsheet_id, &stats).await;
        match &result {
            Ok(()) => tracing::info!(
                "win ratio sheet updated in spreadsheet {}: {} win(s) out of {} trade(s)",
                spreadsheet_id,
                stats.wins,
                stats.total
            ),
            Err(report) => tracing::error!(
                "update_win_ratio failed for spreadsheet {}: {:?}",
                spreadsheet_id,
                report
            ),
        }
        result
    }

    async fn try_update_win_ratio(
        &self,
        spreadsheet_id: &str,
        stats: &WinStats,
    ) -> Result<(), WinRatioError> {
        let hub = self
            .hub
            .as_ref()
            .ok_or(report!(WinRatioError::NotAuthenticated))?;

        replace_sheet_rows(
            hub,
            spreadsheet_id,
            &self.win_ratio_sheet_title,
            win_ratio_rows(stats),
        )
        .await
        .map_err(|report| {
            let context: WinRatioError = report.current_context().into();
            report.change_context(context)
        })
    }
}

/// Header plus one row per entry, caller order kept as-is.
pub fn summary_rows(entries: &[SummaryEntry]) -> Vec<Vec<Value>> {
    std::iter::once(vec![Value::from("Symbol"), Value::from("Total PnL")])
        .chain(entries.iter().map(SummaryEntry::cells))
        .collect()
}

pub fn win_ratio_rows(stats: &WinStats) -> Vec<Vec<Value>> {
    vec![
        vec![Value::from("Total Trades"), Value::from(stats.total)],
        vec![Value::from("Wins"), Value::from(stats.wins)],
        vec![Value::from("Losses"), Value::from(stats.losses)],
        vec![Value::from("Win Ratio"), Value::from(stats.ratio)],
    ]
}

/// Clears the worksheet named `title` (creating it when absent) and writes
/// `rows` starting at A1, as one logical replace.
async fn replace_sheet_rows(
    hub: &SheetsHub,
    spreadsheet_id: &str,
    title: &str,
    rows: Vec<Vec<Value>>,
) -> Result<(), ReplaceSheetError> {
    let response = hub
        .spreadsheets()
        .get(spreadsheet_id)
        .doit()
        .await
        .change_context(ReplaceSheetError::FailedToResolveSpreadsheet)
        .attach_printable_lazy(|| format!("spreadsheet id: {}", spreadsheet_id))?;

    let sheet_exists = response
        .1
        .sheets
        .unwrap_or_default()
        .iter()
        .any(|sheet| {
            sheet
                .properties
                .as_ref()
                .and_then(|props| props.title.as_deref())
                == Some(title)
        });

    if sheet_exists {
        hub.spreadsheets()
            .values_clear(
                ClearValuesRequest::default(),
                spreadsheet_id,
                &quoted_sheet_title(title),
            )
            .doit()
            .await
            .map(|_| ())
            .change_context(ReplaceSheetError::FailedToClearSheet)
            .attach_printable_lazy(|| format!("worksheet: {}", title))?;
    } else {
        let request = BatchUpdateSpreadsheetRequest {
            requests: Some(vec![Request {
                add_sheet: Some(AddSheetRequest {
                    properties: Some(SheetProperties {
                        title: Some(title.to_string()),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        };
        hub.spreadsheets()
            .batch_update(request, spreadsheet_id)
            .doit()
            .await
            .map(|_| ())
            .change_context(ReplaceSheetError::FailedToCreateSheet)
            .attach_printable_lazy(|| format!("worksheet: {}", title))?;
    }

    hub.spreadsheets()
        .values_update(
            ValueRange::from_rows(rows),
            spreadsheet_id,
            &sheet_anchor(title),
        )
        .value_input_option("USER_ENTERED")
        .doit()
        .await
        .map(|_| ())
        .change_context(ReplaceSheetError::FailedToWriteRows)
        .attach_printable_lazy(|| format!("worksheet: {}", title))
}

/// Worksheet title quoted for A1 notation, inner quotes doubled.
fn quoted_sheet_title(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

fn sheet_anchor(title: &str) -> String {
    format!("{}!A1", quoted_sheet_title(title))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::sync::{Arc, Mutex};
    use tracing::instrument::WithSubscriber;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone)]
    struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CaptureWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CaptureWriter {
        type Writer = CaptureWriter;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn sample_record() -> TradeRecord {
        TradeRecord::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            "AAPL",
            150.0,
            10.0,
            25.5,
        )
    }

    #[tokio::test]
    async fn test_log_trade_before_authenticate_fails() {
        let client = SheetClient::new();
        let report = client
            .log_trade("sheet1", &sample_record())
            .await
            .unwrap_err();
        assert!(matches!(
            report.current_context(),
            LogError::NotAuthenticated
        ));
    }

    #[tokio::test]
    async fn test_log_trades_empty_is_noop() {
        let client = SheetClient::new();
        assert!(client.log_trades("sheet1", &[]).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_summary_before_authenticate_fails() {
        let client = SheetClient::new();
        let report = client
            .update_summary("sheet1", &[SummaryEntry::new("AAPL", 100.0)])
            .await
            .unwrap_err();
        assert!(matches!(
            report.current_context(),
            SummaryError::NotAuthenticated
        ));
    }

    #[tokio::test]
    async fn test_update_win_ratio_before_authenticate_fails() {
        let client = SheetClient::new();
        let report = client
            .update_win_ratio("sheet1", &[sample_record()])
            .await
            .unwrap_err();
        assert!(matches!(
            report.current_context(),
            WinRatioError::NotAuthenticated
        ));
    }

    #[tokio::test]
    async fn test_failed_log_trade_emits_one_error_log_line() {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::fmt()
            .with_writer(CaptureWriter(Arc::clone(&buffer)))
            .with_ansi(false)
            .finish();

        let client = SheetClient::new();
        let result = client
            .log_trade("sheet1", &sample_record())
            .with_subscriber(subscriber)
            .await;
        assert!(result.is_err());

        let output = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        let error_lines: Vec<&str> = output
            .lines()
            .filter(|line| line.contains("ERROR"))
            .collect();
        assert_eq!(error_lines.len(), 1);
        assert!(error_lines[0].contains("log_trades failed for spreadsheet sheet1"));
        assert!(error_lines[0].contains("NotAuthenticated"));
    }

    #[tokio::test]
    async fn test_log_trades_success_path_emits_info_log_line() {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::fmt()
            .with_writer(CaptureWriter(Arc::clone(&buffer)))
            .with_ansi(false)
            .finish();

        let client = SheetClient::new();
        let result = client
            .log_trades("sheet1", &[])
            .with_subscriber(subscriber)
            .await;
        assert!(result.is_ok());

        let output = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        let info_lines: Vec<&str> = output
            .lines()
            .filter(|line| line.contains("INFO"))
            .collect();
        assert_eq!(info_lines.len(), 1);
        assert!(info_lines[0].contains("no trade rows to append to spreadsheet sheet1"));
    }

    #[tokio::test]
    async fn test_failed_authenticate_caches_no_session() {
        let mut client = SheetClient::new();
        let result = client
            .authenticate(Path::new("/nonexistent/service_account.json"))
            .await;
        assert!(result.is_err());
        assert!(!client.is_authenticated());
    }

    #[test]
    fn test_summary_rows_header_and_order() {
        let entries = vec![
            SummaryEntry::new("AAPL", 100.0),
            SummaryEntry::new("MSFT", -20.0),
        ];
        let rows = summary_rows(&entries);
        assert_eq!(
            rows,
            vec![
                vec![Value::from("Symbol"), Value::from("Total PnL")],
                vec![Value::from("AAPL"), Value::from(100.0)],
                vec![Value::from("MSFT"), Value::from(-20.0)],
            ]
        );
    }

    #[test]
    fn test_summary_rows_idempotent_for_same_entries() {
        let entries = vec![
            SummaryEntry::new("AAPL", 100.0),
            SummaryEntry::new("MSFT", -20.0),
        ];
        assert_eq!(summary_rows(&entries), summary_rows(&entries));
    }

    #[test]
    fn test_summary_rows_empty_entries_keep_header() {
        let rows = summary_rows(&[]);
        assert_eq!(
            rows,
            vec![vec![Value::from("Symbol"), Value::from("Total PnL")]]
        );
    }

    #[test]
    fn test_win_ratio_rows() {
        let stats = WinStats {
            total: 4,
            wins: 3,
            losses: 1,
            ratio: 0.75,
        };
        let rows = win_ratio_rows(&stats);
        assert_eq!(rows.len(), 4);
        assert_eq!(
            rows[0],
            vec![Value::from("Total Trades"), Value::from(4)]
        );
        assert_eq!(rows[3], vec![Value::from("Win Ratio"), Value::from(0.75)]);
    }

    #[test]
    fn test_quoted_sheet_title_escapes_quotes() {
        assert_eq!(quoted_sheet_title("P&L Summary"), "'P&L Summary'");
        assert_eq!(quoted_sheet_title("Bob's Sheet"), "'Bob''s Sheet'");
    }

    #[test]
    fn test_sheet_anchor() {
        assert_eq!(sheet_anchor("Trade Log"), "'Trade Log'!A1");
    }
}
