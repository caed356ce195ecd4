pub mod config;
pub mod sheets;
pub mod trade;

// Re-export key types for easy access
pub use config::{AppConfig, SheetsConfig};
pub use sheets::auth::AuthError;
pub use sheets::client::{LogError, SheetClient, SummaryError, WinRatioError};
pub use trade::{signal_alert, SummaryEntry, TradeRecord, WinStats};
