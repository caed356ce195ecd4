use config::Config;
use error_stack::{Context, Result, ResultExt};

fn default_summary_sheet_title() -> Box<str> {
    crate::sheets::client::SUMMARY_SHEET_TITLE.into()
}

fn default_win_ratio_sheet_title() -> Box<str> {
    crate::sheets::client::WIN_RATIO_SHEET_TITLE.into()
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct SheetsConfig {
    /// Path to the Google service account private key file.
    pub priv_key: Box<str>,
    pub spreadsheet_id: Box<str>,
    #[serde(default = "default_summary_sheet_title")]
    pub summary_sheet_title: Box<str>,
    #[serde(default = "default_win_ratio_sheet_title")]
    pub win_ratio_sheet_title: Box<str>,
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct AppConfig {
    pub sheets: SheetsConfig,
}

#[derive(Debug)]
pub enum ConfigError {
    FailedToRead,
    FailedToDeserialize,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl Context for ConfigError {}

impl AppConfig {
    /// Reads `Config.{toml,json,yaml,...}` from the working directory.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("Config")
    }

    pub fn load_from(name: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(config::File::with_name(name))
            .build()
            .change_context(ConfigError::FailedToRead)
            .attach_printable_lazy(|| format!("config file name: {}", name))?
            .try_deserialize()
            .change_context(ConfigError::FailedToDeserialize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn parse(toml: &str) -> AppConfig {
        Config::builder()
            .add_source(config::File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_sheet_titles_default() {
        let config = parse(
            r#"
            [sheets]
            priv_key = "service_account.json"
            spreadsheet_id = "sheet1"
            "#,
        );
        assert_eq!(config.sheets.priv_key.as_ref(), "service_account.json");
        assert_eq!(config.sheets.spreadsheet_id.as_ref(), "sheet1");
        assert_eq!(config.sheets.summary_sheet_title.as_ref(), "P&L Summary");
        assert_eq!(config.sheets.win_ratio_sheet_title.as_ref(), "Win Ratio");
    }

    #[test]
    fn test_sheet_titles_overridden() {
        let config = parse(
            r#"
            [sheets]
            priv_key = "key.json"
            spreadsheet_id = "sheet1"
            summary_sheet_title = "Summary"
            win_ratio_sheet_title = "Stats"
            "#,
        );
        assert_eq!(config.sheets.summary_sheet_title.as_ref(), "Summary");
        assert_eq!(config.sheets.win_ratio_sheet_title.as_ref(), "Stats");
    }

    #[test]
    fn test_missing_spreadsheet_id_fails() {
        let result: std::result::Result<AppConfig, _> = Config::builder()
            .add_source(config::File::from_str(
                r#"
                [sheets]
                priv_key = "key.json"
                "#,
                FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize();
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_config_file_fails() {
        let result = AppConfig::load_from("definitely_not_a_config_file");
        assert!(result.is_err());
    }
}
