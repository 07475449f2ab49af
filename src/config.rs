use crate::warehouse::bigquery::TableRef;
use crate::warehouse::schema::{
    DEFAULT_PARTITION_FIELD, FieldSchema, TableSpec, default_clustering_fields, default_schema,
};
use anyhow::{Context, Result, anyhow, bail};
use chrono::NaiveTime;
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

const APP_DIR: &str = ".tracksync";
const CONFIG_FILE: &str = "config.json";
const DEFAULT_SYNC_TIME: &str = "06:00";
const DEFAULT_SQLITE_TABLE: &str = "time_entries";
pub const DEFAULT_ROLLBACK_DAYS: u32 = 7;
pub const DEFAULT_FAILURE_CHANNEL: &str = "error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarehouseBackend {
    #[serde(rename = "bigquery")]
    BigQuery,
    #[serde(rename = "sqlite")]
    Sqlite,
}

impl WarehouseBackend {
    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "bigquery" | "bq" => Ok(Self::BigQuery),
            "sqlite" => Ok(Self::Sqlite),
            other => bail!("Unsupported warehouse backend: {other}. Expected bigquery|sqlite"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BigQuery => "bigquery",
            Self::Sqlite => "sqlite",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub toggl_api_token: Option<String>,
    pub toggl_mail_address: Option<String>,
    pub toggl_api_base_url: String,
    pub toggl_reports_base_url: String,
    pub warehouse_backend: WarehouseBackend,
    pub table_id: String,
    pub bq_access_token: Option<String>,
    pub bq_api_base_url: String,
    pub bq_location: Option<String>,
    pub sqlite_path: PathBuf,
    pub slack_oauth_token: Option<String>,
    pub slack_api_base_url: String,
    pub rollback_days: u32,
    pub request_delay_ms: u64,
    pub http_timeout_seconds: u64,
    pub table_schema: Vec<FieldSchema>,
    pub time_partitioning_field: Option<String>,
    pub clustering_fields: Vec<String>,
    pub failure_channel: String,
    pub sync_time: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            toggl_api_token: None,
            toggl_mail_address: None,
            toggl_api_base_url: "https://api.track.toggl.com/api/v8".to_string(),
            toggl_reports_base_url: "https://api.track.toggl.com/reports/api/v2".to_string(),
            warehouse_backend: WarehouseBackend::BigQuery,
            table_id: String::new(),
            bq_access_token: None,
            bq_api_base_url: "https://bigquery.googleapis.com".to_string(),
            bq_location: None,
            sqlite_path: default_root_dir().join("warehouse.db"),
            slack_oauth_token: None,
            slack_api_base_url: "https://slack.com/api".to_string(),
            rollback_days: DEFAULT_ROLLBACK_DAYS,
            request_delay_ms: 1000,
            http_timeout_seconds: 30,
            table_schema: default_schema(),
            time_partitioning_field: Some(DEFAULT_PARTITION_FIELD.to_string()),
            clustering_fields: default_clustering_fields(),
            failure_channel: DEFAULT_FAILURE_CHANNEL.to_string(),
            sync_time: DEFAULT_SYNC_TIME.to_string(),
        }
    }
}

impl Config {
    pub fn config_path() -> PathBuf {
        default_root_dir().join(CONFIG_FILE)
    }

    /// Defaults, then `~/.tracksync/config.json` when present, then the environment.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();
        let mut config = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = read("TOGGL_API_TOKEN") {
            self.toggl_api_token = Some(value);
        }
        if let Some(value) = read("TOGGL_MAIL_ADDRESS") {
            self.toggl_mail_address = Some(value);
        }
        if let Some(value) = read("BQ_TABLE_ID") {
            self.table_id = value.trim().to_string();
        }
        if let Some(value) = read("BQ_ACCESS_TOKEN") {
            self.bq_access_token = Some(value);
        }
        if let Some(value) = read("SLACK_OAUTH_TOKEN") {
            self.slack_oauth_token = Some(value);
        }
        if let Some(value) = read("TRACKSYNC_WAREHOUSE") {
            self.warehouse_backend = WarehouseBackend::parse(&value)?;
        }
        if let Some(value) = read("TRACKSYNC_SQLITE_PATH") {
            self.sqlite_path = expand_home(value.trim());
        }
        if let Some(value) = read("TRACKSYNC_ROLLBACK_DAYS") {
            self.rollback_days = value
                .trim()
                .parse::<u32>()
                .map_err(|_| anyhow!("TRACKSYNC_ROLLBACK_DAYS must be a number"))?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        require(&self.toggl_api_token, "TOGGL_API_TOKEN")?;
        require(&self.toggl_mail_address, "TOGGL_MAIL_ADDRESS")?;
        require(&self.slack_oauth_token, "SLACK_OAUTH_TOKEN")?;

        match self.warehouse_backend {
            WarehouseBackend::BigQuery => {
                if self.table_id.is_empty() {
                    bail!("BQ_TABLE_ID is not set");
                }
                TableRef::parse(&self.table_id)?;
                require(&self.bq_access_token, "BQ_ACCESS_TOKEN")?;
            }
            WarehouseBackend::Sqlite => {
                crate::warehouse::sqlite::validate_table_name(&self.sqlite_table_name())?;
            }
        }

        [
            ("toggl_api_base_url", &self.toggl_api_base_url),
            ("toggl_reports_base_url", &self.toggl_reports_base_url),
            ("bq_api_base_url", &self.bq_api_base_url),
            ("slack_api_base_url", &self.slack_api_base_url),
        ]
        .iter()
        .try_for_each(|(key, value)| {
            Url::parse(value)
                .map(|_| ())
                .with_context(|| format!("{key} is not a valid URL: {value}"))
        })?;

        if self.rollback_days == 0 {
            bail!("rollback_days must be at least 1");
        }

        if self.failure_channel.trim().is_empty() {
            bail!("failure_channel must not be empty");
        }

        self.table_spec().validate()?;
        self.parse_sync_time()?;

        Ok(())
    }

    pub fn table_spec(&self) -> TableSpec {
        TableSpec {
            schema: self.table_schema.clone(),
            time_partitioning_field: self.time_partitioning_field.clone(),
            clustering_fields: self.clustering_fields.clone(),
        }
    }

    /// Column the replace-window delete filters on.
    pub fn timestamp_column(&self) -> &str {
        self.time_partitioning_field
            .as_deref()
            .unwrap_or(DEFAULT_PARTITION_FIELD)
    }

    /// Last segment of `table_id`, or a fixed name when unset.
    pub fn sqlite_table_name(&self) -> String {
        self.table_id
            .rsplit('.')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_SQLITE_TABLE)
            .to_string()
    }

    pub fn parse_sync_time(&self) -> Result<NaiveTime> {
        parse_hhmm(&self.sync_time)
    }

    pub fn display_entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("toggl_api_token", mask(&self.toggl_api_token)),
            (
                "toggl_mail_address",
                self.toggl_mail_address
                    .clone()
                    .unwrap_or_else(|| "not_set".to_string()),
            ),
            ("warehouse_backend", self.warehouse_backend.as_str().to_string()),
            ("table_id", self.table_id.clone()),
            ("bq_access_token", mask(&self.bq_access_token)),
            ("sqlite_path", self.sqlite_path.display().to_string()),
            ("slack_oauth_token", mask(&self.slack_oauth_token)),
            ("rollback_days", self.rollback_days.to_string()),
            ("request_delay_ms", self.request_delay_ms.to_string()),
            ("failure_channel", self.failure_channel.clone()),
            ("sync_time", self.sync_time.clone()),
        ]
    }
}

fn require(value: &Option<String>, key: &str) -> Result<()> {
    value
        .as_deref()
        .filter(|value| !value.trim().is_empty())
        .map(|_| ())
        .with_context(|| format!("{key} is not set"))
}

fn mask(value: &Option<String>) -> String {
    value
        .as_ref()
        .map(|_| "***set***".to_string())
        .unwrap_or_else(|| "not_set".to_string())
}

pub fn parse_hhmm(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .with_context(|| format!("Invalid time format: {value}. Example: 06:00 (24-hour format)",))
}

pub fn expand_home(raw: &str) -> PathBuf {
    raw.strip_prefix("~/")
        .and_then(|stripped| home_dir().map(|home| home.join(stripped)))
        .unwrap_or_else(|| PathBuf::from(raw))
}

fn default_root_dir() -> PathBuf {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}
