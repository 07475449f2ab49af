use crate::config::Config;
use crate::report::{RawEntry, ReportSource};
use anyhow::{Context, Result, anyhow, bail};
use chrono::NaiveDate;
use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use serde_json::Value;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

/// Toggl's basic-auth password when authenticating with an API token.
const API_TOKEN_PASSWORD: &str = "api_token";

#[derive(Debug, Deserialize)]
struct DetailedReportPage {
    #[serde(default)]
    total_count: Option<u64>,
    data: Vec<RawEntry>,
}

pub struct ReportClient {
    client: Client,
    api_token: String,
    user_agent: String,
    reports_base_url: String,
    workspace_id: i64,
    request_delay: Duration,
}

impl ReportClient {
    /// Builds the client and resolves the caller's workspace.
    pub fn connect(config: &Config) -> Result<Self> {
        let api_token = config
            .toggl_api_token
            .clone()
            .context("TOGGL_API_TOKEN is not set")?;
        let user_agent = config
            .toggl_mail_address
            .clone()
            .context("TOGGL_MAIL_ADDRESS is not set")?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_seconds.max(5)))
            .build()
            .context("Failed to create Toggl HTTP client")?;

        let workspaces_url = format!(
            "{}/workspaces",
            config.toggl_api_base_url.trim_end_matches('/')
        );
        let response = client
            .get(&workspaces_url)
            .basic_auth(&api_token, Some(API_TOKEN_PASSWORD))
            .send()
            .context("Toggl workspace lookup failed")?;
        let workspace_id = parse_workspace_id(&read_body(response, "workspace lookup")?)?;

        info!(workspace_id, "resolved Toggl workspace");

        Ok(Self {
            client,
            api_token,
            user_agent,
            reports_base_url: config.toggl_reports_base_url.trim_end_matches('/').to_string(),
            workspace_id,
            request_delay: Duration::from_millis(config.request_delay_ms),
        })
    }

    fn report_for_date(&self, date: NaiveDate) -> Result<Vec<RawEntry>> {
        let day = date.format("%Y-%m-%d").to_string();
        let workspace_id = self.workspace_id.to_string();

        let response = self
            .client
            .get(format!("{}/details", self.reports_base_url))
            .basic_auth(&self.api_token, Some(API_TOKEN_PASSWORD))
            .query(&[
                ("user_agent", self.user_agent.as_str()),
                ("workspace_id", workspace_id.as_str()),
                ("since", day.as_str()),
                ("until", day.as_str()),
            ])
            .send()
            .with_context(|| format!("Toggl report request failed for {day}"))?;

        let body = read_body(response, "detailed report")?;
        let page = parse_detailed_report(&body)
            .with_context(|| format!("Invalid Toggl report for {day}"))?;

        let total = page.total_count.unwrap_or_default();
        if total > page.data.len() as u64 {
            warn!(
                date = %day,
                total,
                returned = page.data.len(),
                "Toggl report returned fewer entries than total_count"
            );
        }

        Ok(page.data)
    }
}

impl ReportSource for ReportClient {
    fn detailed_report(&self, dates: &[NaiveDate]) -> Result<Vec<RawEntry>> {
        let mut entries = Vec::new();

        for date in dates {
            let page = self.report_for_date(*date);
            // Rate limit applies whether or not the request succeeded.
            thread::sleep(self.request_delay);
            let page = page?;

            info!(date = %date, entries = page.len(), "fetched Toggl detailed report");
            entries.extend(page);
        }

        if let (Some(first), Some(last)) = (dates.first(), dates.last()) {
            info!(
                from = %first,
                to = %last,
                entries = entries.len(),
                "got detailed report"
            );
        }

        Ok(entries)
    }
}

fn read_body(response: Response, what: &str) -> Result<String> {
    let status = response.status();
    let body = response
        .text()
        .with_context(|| format!("Failed to read Toggl {what} response"))?;

    if !status.is_success() {
        bail!("Toggl {what} error {status}: {body}");
    }

    Ok(body)
}

fn parse_workspace_id(body: &str) -> Result<i64> {
    let parsed: Value = serde_json::from_str(body)
        .with_context(|| format!("Failed to parse Toggl workspaces: {body}"))?;

    parsed
        .as_array()
        .and_then(|workspaces| workspaces.first())
        .and_then(|workspace| workspace.get("id"))
        .and_then(Value::as_i64)
        .ok_or_else(|| anyhow!("Toggl workspace list is empty or malformed: {body}"))
}

fn parse_detailed_report(body: &str) -> Result<DetailedReportPage> {
    serde_json::from_str(body).with_context(|| format!("Failed to parse Toggl report: {body}"))
}
