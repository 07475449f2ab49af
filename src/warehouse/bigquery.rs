use crate::config::Config;
use crate::formatter::TimeEntryRow;
use crate::warehouse::schema::{FieldType, TableSpec};
use crate::warehouse::{TableStatus, TimestampRange, WAREHOUSE_TIME_ZONE, Warehouse};
use anyhow::{Context, Result, anyhow, bail};
use regex::Regex;
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

const MULTIPART_BOUNDARY: &str = "tracksync_load_boundary";
const JOB_POLL_INTERVAL: Duration = Duration::from_secs(1);
const QUERY_WAIT_MS: u64 = 10_000;

/// `project.dataset.table`, where the project may itself be domain-scoped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    pub fn parse(table_id: &str) -> Result<Self> {
        let pattern = Regex::new(r"^([A-Za-z0-9:.\-]+)\.(\w+)\.([\w\-]+)$")
            .context("Invalid table id pattern")?;
        let captures = pattern.captures(table_id.trim()).with_context(|| {
            format!("Invalid BigQuery table id: {table_id}. Expected project.dataset.table")
        })?;

        Ok(Self {
            project: captures[1].to_string(),
            dataset: captures[2].to_string(),
            table: captures[3].to_string(),
        })
    }

    pub fn qualified(&self) -> String {
        format!("{}.{}.{}", self.project, self.dataset, self.table)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    job_reference: JobReference,
    #[serde(default)]
    num_dml_affected_rows: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobResource {
    job_reference: JobReference,
    status: JobStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    state: String,
    #[serde(default)]
    error_result: Option<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ErrorProto {
    fn describe(&self) -> String {
        format!(
            "{}: {}",
            self.reason.as_deref().unwrap_or("error"),
            self.message.as_deref().unwrap_or("no message")
        )
    }
}

pub struct BigQueryWarehouse {
    client: Client,
    base_url: String,
    table: TableRef,
    spec: TableSpec,
    location: Option<String>,
}

impl BigQueryWarehouse {
    pub fn new(config: &Config) -> Result<Self> {
        let table = TableRef::parse(&config.table_id)?;
        let spec = config.table_spec();
        spec.validate()?;

        let token = config
            .bq_access_token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
            .context("BQ_ACCESS_TOKEN is not set")?;

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}"))
                .context("Failed to build Authorization header")?,
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_seconds.max(5)))
            .default_headers(headers)
            .build()
            .context("Failed to create BigQuery HTTP client")?;

        Ok(Self {
            client,
            base_url: config.bq_api_base_url.trim_end_matches('/').to_string(),
            table,
            spec,
            location: config.bq_location.clone(),
        })
    }

    fn project_url(&self) -> String {
        format!("{}/bigquery/v2/projects/{}", self.base_url, self.table.project)
    }

    fn tables_url(&self) -> String {
        format!("{}/datasets/{}/tables", self.project_url(), self.table.dataset)
    }

    fn location_query(&self, reference: &JobReference) -> Vec<(&'static str, String)> {
        reference
            .location
            .clone()
            .or_else(|| self.location.clone())
            .map(|location| vec![("location", location)])
            .unwrap_or_default()
    }

    fn create_table(&self) -> Result<TableStatus> {
        let response = self
            .client
            .post(self.tables_url())
            .json(&table_resource(&self.table, &self.spec))
            .send()
            .context("BigQuery tables.insert request failed")?;

        if response.status() == StatusCode::CONFLICT {
            return Ok(TableStatus::AlreadyExists);
        }

        read_body(response, "tables.insert")?;
        Ok(TableStatus::Created)
    }

    fn wait_for_query(&self, mut response: QueryResponse) -> Result<QueryResponse> {
        while !response.job_complete {
            debug!(job_id = %response.job_reference.job_id, "waiting for BigQuery query");
            let mut query = self.location_query(&response.job_reference);
            query.push(("timeoutMs", QUERY_WAIT_MS.to_string()));

            let http = self
                .client
                .get(format!(
                    "{}/queries/{}",
                    self.project_url(),
                    response.job_reference.job_id
                ))
                .query(&query)
                .send()
                .context("BigQuery jobs.getQueryResults request failed")?;
            response = parse_json(&read_body(http, "jobs.getQueryResults")?)?;
        }

        if let Some(error) = response.errors.first() {
            bail!("BigQuery query failed: {}", error.describe());
        }

        Ok(response)
    }

    fn wait_for_job(&self, mut job: JobResource) -> Result<JobResource> {
        while job.status.state != "DONE" {
            debug!(job_id = %job.job_reference.job_id, state = %job.status.state, "waiting for BigQuery job");
            thread::sleep(JOB_POLL_INTERVAL);

            let http = self
                .client
                .get(format!(
                    "{}/jobs/{}",
                    self.project_url(),
                    job.job_reference.job_id
                ))
                .query(&self.location_query(&job.job_reference))
                .send()
                .context("BigQuery jobs.get request failed")?;
            job = parse_json(&read_body(http, "jobs.get")?)?;
        }

        if let Some(error) = &job.status.error_result {
            bail!("BigQuery load job failed: {}", error.describe());
        }

        Ok(job)
    }
}

impl Warehouse for BigQueryWarehouse {
    fn ensure_table(&self) -> Result<TableStatus> {
        let response = self
            .client
            .get(format!("{}/{}", self.tables_url(), self.table.table))
            .send()
            .context("BigQuery tables.get request failed")?;

        let status = if response.status() == StatusCode::NOT_FOUND {
            self.create_table()?
        } else {
            read_body(response, "tables.get")?;
            TableStatus::AlreadyExists
        };

        match status {
            TableStatus::Created => info!(table = %self.table.qualified(), "table is created"),
            TableStatus::AlreadyExists => {
                info!(table = %self.table.qualified(), "table already exists")
            }
        }

        Ok(status)
    }

    fn delete_rows(&self, range: &TimestampRange, column: &str) -> Result<u64> {
        match self.spec.field(column) {
            Some(field) if field.field_type == FieldType::Timestamp => {}
            _ => bail!("column `{column}` is not a TIMESTAMP column of the table schema"),
        }

        let mut request = delete_request(&self.table, column, range);
        if let Some(location) = &self.location {
            request["location"] = json!(location);
        }

        let http = self
            .client
            .post(format!("{}/queries", self.project_url()))
            .json(&request)
            .send()
            .context("BigQuery jobs.query request failed")?;

        let response = self.wait_for_query(parse_json(&read_body(http, "jobs.query")?)?)?;

        response
            .num_dml_affected_rows
            .as_deref()
            .map(|count| {
                count
                    .parse::<u64>()
                    .with_context(|| format!("Invalid numDmlAffectedRows: {count}"))
            })
            .transpose()
            .map(Option::unwrap_or_default)
    }

    fn append_rows(&self, rows: &[TimeEntryRow]) -> Result<u64> {
        if rows.is_empty() {
            info!("no rows to insert");
            return Ok(0);
        }

        let payload = ndjson_rows(&self.spec, rows)?;
        let body = multipart_body(&load_configuration(&self.table, &self.spec), &payload)?;

        let http = self
            .client
            .post(format!(
                "{}/upload/bigquery/v2/projects/{}/jobs",
                self.base_url, self.table.project
            ))
            .query(&[("uploadType", "multipart")])
            .header(
                CONTENT_TYPE,
                format!("multipart/related; boundary={MULTIPART_BOUNDARY}"),
            )
            .body(body)
            .send()
            .context("BigQuery load job request failed")?;

        let job = parse_json::<JobResource>(&read_body(http, "jobs.insert")?)?;
        self.wait_for_job(job)?;

        Ok(rows.len() as u64)
    }
}

fn read_body(response: Response, what: &str) -> Result<String> {
    let status = response.status();
    let body = response
        .text()
        .with_context(|| format!("Failed to read BigQuery {what} response"))?;

    if !status.is_success() {
        bail!("BigQuery {what} error {status}: {body}");
    }

    Ok(body)
}

fn parse_json<T: serde::de::DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body).with_context(|| format!("Failed to parse BigQuery response: {body}"))
}

fn schema_json(spec: &TableSpec) -> Value {
    json!({
        "fields": spec.schema.iter().map(|field| field.to_json()).collect::<Vec<_>>(),
    })
}

fn table_resource(table: &TableRef, spec: &TableSpec) -> Value {
    let mut resource = json!({
        "tableReference": {
            "projectId": table.project,
            "datasetId": table.dataset,
            "tableId": table.table,
        },
        "schema": schema_json(spec),
    });

    if let Some(field) = &spec.time_partitioning_field {
        resource["timePartitioning"] = json!({ "type": "DAY", "field": field });
    }

    if !spec.clustering_fields.is_empty() {
        resource["clustering"] = json!({ "fields": spec.clustering_fields });
    }

    resource
}

fn delete_request(table: &TableRef, column: &str, range: &TimestampRange) -> Value {
    let query = format!(
        "DELETE FROM `{table}` WHERE `{column}` >= TIMESTAMP(@start, '{zone}') AND `{column}` <= TIMESTAMP(@end, '{zone}')",
        table = table.qualified(),
        zone = WAREHOUSE_TIME_ZONE,
    );

    let parameter = |name: &str, value: String| {
        json!({
            "name": name,
            "parameterType": { "type": "STRING" },
            "parameterValue": { "value": value },
        })
    };

    json!({
        "query": query,
        "useLegacySql": false,
        "parameterMode": "NAMED",
        "queryParameters": [
            parameter("start", range.start_text()),
            parameter("end", range.end_text()),
        ],
        "timeoutMs": QUERY_WAIT_MS,
    })
}

fn load_configuration(table: &TableRef, spec: &TableSpec) -> Value {
    json!({
        "configuration": {
            "load": {
                "destinationTable": {
                    "projectId": table.project,
                    "datasetId": table.dataset,
                    "tableId": table.table,
                },
                "schema": schema_json(spec),
                "sourceFormat": "NEWLINE_DELIMITED_JSON",
                "writeDisposition": "WRITE_APPEND",
                "createDisposition": "CREATE_NEVER",
            }
        }
    })
}

fn ndjson_rows(spec: &TableSpec, rows: &[TimeEntryRow]) -> Result<String> {
    rows.iter()
        .map(|row| {
            let cells = row.cells();
            spec.validate_row(&cells)
                .with_context(|| format!("Row {} does not match the table schema", row.id))?;

            let object = cells
                .iter()
                .map(|(name, cell)| (name.to_string(), cell.to_json()))
                .collect::<Map<_, _>>();
            serde_json::to_string(&Value::Object(object)).map_err(|error| anyhow!(error))
        })
        .collect::<Result<Vec<_>>>()
        .map(|lines| lines.join("\n"))
}

fn multipart_body(metadata: &Value, payload: &str) -> Result<Vec<u8>> {
    let metadata = serde_json::to_string(metadata).context("Failed to serialize load job")?;

    Ok(format!(
        "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n--{b}\r\nContent-Type: application/octet-stream\r\n\r\n{payload}\r\n--{b}--\r\n",
        b = MULTIPART_BOUNDARY
    )
    .into_bytes())
}

#[cfg(test)]
mod tests {
    use super::{
        BigQueryWarehouse, TableRef, delete_request, load_configuration, multipart_body,
        ndjson_rows, table_resource,
    };
    use crate::config::Config;
    use crate::formatter::TimeEntryRow;
    use crate::warehouse::schema::{
        DEFAULT_PARTITION_FIELD, TableSpec, default_clustering_fields, default_schema,
    };
    use crate::warehouse::{TableStatus, TimestampRange, Warehouse};
    use chrono::{NaiveDate, TimeZone, Utc};
    use mockito::{Matcher, Server, ServerGuard};
    use serde_json::{Value, json};

    const TABLE_PATH: &str = "/bigquery/v2/projects/my-project/datasets/toggl/tables/time_entries";
    const TABLES_PATH: &str = "/bigquery/v2/projects/my-project/datasets/toggl/tables";
    const QUERIES_PATH: &str = "/bigquery/v2/projects/my-project/queries";
    const UPLOAD_PATH: &str = "/upload/bigquery/v2/projects/my-project/jobs";

    fn warehouse_for(server: &ServerGuard) -> BigQueryWarehouse {
        let config = Config {
            table_id: "my-project.toggl.time_entries".to_string(),
            bq_access_token: Some("ya29.token".to_string()),
            bq_api_base_url: server.url(),
            ..Config::default()
        };
        BigQueryWarehouse::new(&config).expect("warehouse")
    }

    fn window() -> TimestampRange {
        TimestampRange::for_dates(
            NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
        )
        .unwrap()
    }

    fn sample_row(id: i64) -> TimeEntryRow {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
        TimeEntryRow {
            id,
            project: Some("Reading".to_string()),
            description: None,
            start,
            end: start,
            updated: start,
            second: 0,
            minute: 0.0,
            hour: 0.0,
            tag1: None,
            tag2: None,
            tag3: None,
        }
    }

    #[test]
    fn existing_table_is_left_alone() {
        let mut server = Server::new();
        let get = server
            .mock("GET", TABLE_PATH)
            .match_query(Matcher::Any)
            .match_header("authorization", "Bearer ya29.token")
            .with_status(200)
            .with_body(r#"{"id": "my-project:toggl.time_entries"}"#)
            .expect(1)
            .create();
        let insert = server.mock("POST", TABLES_PATH).match_query(Matcher::Any).expect(0).create();

        let status = warehouse_for(&server).ensure_table().expect("ensured");

        assert_eq!(status, TableStatus::AlreadyExists);
        get.assert();
        insert.assert();
    }

    #[test]
    fn missing_table_is_created_with_partitioning_and_clustering() {
        let mut server = Server::new();
        let _get = server
            .mock("GET", TABLE_PATH)
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body(r#"{"error": {"code": 404}}"#)
            .create();
        let insert = server
            .mock("POST", TABLES_PATH)
            .match_query(Matcher::Any)
            .match_body(Matcher::PartialJson(json!({
                "tableReference": {"tableId": "time_entries"},
                "timePartitioning": {"type": "DAY", "field": "start"},
                "clustering": {"fields": ["project", "tag1", "tag2", "tag3"]},
            })))
            .with_status(200)
            .with_body("{}")
            .expect(1)
            .create();

        let status = warehouse_for(&server).ensure_table().expect("ensured");

        assert_eq!(status, TableStatus::Created);
        insert.assert();
    }

    #[test]
    fn create_conflict_counts_as_existing() {
        let mut server = Server::new();
        let _get = server
            .mock("GET", TABLE_PATH)
            .match_query(Matcher::Any)
            .with_status(404)
            .create();
        let _insert = server
            .mock("POST", TABLES_PATH)
            .match_query(Matcher::Any)
            .with_status(409)
            .with_body(r#"{"error": {"status": "ALREADY_EXISTS"}}"#)
            .create();

        let status = warehouse_for(&server).ensure_table().expect("ensured");
        assert_eq!(status, TableStatus::AlreadyExists);
    }

    #[test]
    fn table_lookup_failure_is_an_error() {
        let mut server = Server::new();
        let _get = server
            .mock("GET", TABLE_PATH)
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body("permission denied")
            .create();

        let error = warehouse_for(&server).ensure_table().expect_err("forbidden");
        assert!(error.to_string().contains("403"));
    }

    #[test]
    fn delete_waits_for_query_and_reports_affected_rows() {
        let mut server = Server::new();
        let _query = server
            .mock("POST", QUERIES_PATH)
            .match_query(Matcher::Any)
            .match_body(Matcher::PartialJson(json!({
                "useLegacySql": false,
                "parameterMode": "NAMED",
            })))
            .with_status(200)
            .with_body(
                r#"{"jobComplete": false, "jobReference": {"jobId": "q1", "location": "asia-northeast1"}}"#,
            )
            .create();
        let results = server
            .mock("GET", format!("{QUERIES_PATH}/q1").as_str())
            .match_query(Matcher::UrlEncoded(
                "location".to_string(),
                "asia-northeast1".to_string(),
            ))
            .with_status(200)
            .with_body(
                r#"{"jobComplete": true, "jobReference": {"jobId": "q1"}, "numDmlAffectedRows": "5"}"#,
            )
            .expect(1)
            .create();

        let deleted = warehouse_for(&server)
            .delete_rows(&window(), "start")
            .expect("deleted");

        assert_eq!(deleted, 5);
        results.assert();
    }

    #[test]
    fn delete_surfaces_query_errors() {
        let mut server = Server::new();
        let _query = server
            .mock("POST", QUERIES_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"jobComplete": true, "jobReference": {"jobId": "q2"}, "errors": [{"reason": "invalidQuery", "message": "Unrecognized name"}]}"#,
            )
            .create();

        let error = warehouse_for(&server)
            .delete_rows(&window(), "start")
            .expect_err("query failed");
        assert!(error.to_string().contains("invalidQuery"));
    }

    #[test]
    fn delete_rejects_non_timestamp_column_without_request() {
        let mut server = Server::new();
        let query = server.mock("POST", QUERIES_PATH).match_query(Matcher::Any).expect(0).create();

        assert!(warehouse_for(&server).delete_rows(&window(), "project").is_err());
        query.assert();
    }

    #[test]
    fn append_polls_load_job_until_done() {
        let mut server = Server::new();
        let upload = server
            .mock("POST", UPLOAD_PATH)
            .match_query(Matcher::UrlEncoded(
                "uploadType".to_string(),
                "multipart".to_string(),
            ))
            .match_header(
                "content-type",
                Matcher::Regex("^multipart/related; boundary=".to_string()),
            )
            .match_body(Matcher::Regex("WRITE_APPEND".to_string()))
            .with_status(200)
            .with_body(r#"{"jobReference": {"jobId": "load1"}, "status": {"state": "RUNNING"}}"#)
            .expect(1)
            .create();
        let poll = server
            .mock("GET", "/bigquery/v2/projects/my-project/jobs/load1")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"jobReference": {"jobId": "load1"}, "status": {"state": "DONE"}}"#)
            .expect(1)
            .create();

        let inserted = warehouse_for(&server)
            .append_rows(&[sample_row(1), sample_row(2)])
            .expect("appended");

        assert_eq!(inserted, 2);
        upload.assert();
        poll.assert();
    }

    #[test]
    fn append_surfaces_load_error_result() {
        let mut server = Server::new();
        let _upload = server
            .mock("POST", UPLOAD_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"jobReference": {"jobId": "load2"}, "status": {"state": "DONE", "errorResult": {"reason": "invalid", "message": "schema mismatch"}}}"#,
            )
            .create();

        let error = warehouse_for(&server)
            .append_rows(&[sample_row(1)])
            .expect_err("load failed");
        assert!(error.to_string().contains("schema mismatch"));
    }

    #[test]
    fn append_of_no_rows_skips_the_load_job() {
        let mut server = Server::new();
        let upload = server.mock("POST", UPLOAD_PATH).match_query(Matcher::Any).expect(0).create();

        assert_eq!(warehouse_for(&server).append_rows(&[]).expect("appended"), 0);
        upload.assert();
    }

    fn table() -> TableRef {
        TableRef::parse("my-project.toggl.time_entries").expect("table ref")
    }

    fn spec() -> TableSpec {
        TableSpec {
            schema: default_schema(),
            time_partitioning_field: Some(DEFAULT_PARTITION_FIELD.to_string()),
            clustering_fields: default_clustering_fields(),
        }
    }

    #[test]
    fn parses_table_ids() {
        let parsed = table();
        assert_eq!(parsed.project, "my-project");
        assert_eq!(parsed.dataset, "toggl");
        assert_eq!(parsed.table, "time_entries");

        let scoped = TableRef::parse("example.com:analytics.toggl.entries").expect("scoped");
        assert_eq!(scoped.project, "example.com:analytics");
        assert_eq!(scoped.dataset, "toggl");

        assert!(TableRef::parse("just_a_table").is_err());
        assert!(TableRef::parse("p.d.t; DROP").is_err());
    }

    #[test]
    fn table_resource_declares_partitioning_and_clustering() {
        let resource = table_resource(&table(), &spec());

        assert_eq!(resource["schema"]["fields"].as_array().unwrap().len(), 12);
        assert_eq!(resource["schema"]["fields"][0]["name"], "id");
        assert_eq!(resource["schema"]["fields"][0]["mode"], "REQUIRED");
        assert_eq!(resource["timePartitioning"]["type"], "DAY");
        assert_eq!(resource["timePartitioning"]["field"], "start");
        assert_eq!(
            resource["clustering"]["fields"],
            serde_json::json!(["project", "tag1", "tag2", "tag3"])
        );
    }

    #[test]
    fn delete_request_binds_tokyo_bounds() {
        let range = TimestampRange::for_dates(
            NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
        )
        .unwrap();
        let request = delete_request(&table(), "start", &range);

        let query = request["query"].as_str().unwrap();
        assert!(query.starts_with("DELETE FROM `my-project.toggl.time_entries`"));
        assert!(query.contains("`start` >= TIMESTAMP(@start, 'Asia/Tokyo')"));
        assert!(query.contains("`start` <= TIMESTAMP(@end, 'Asia/Tokyo')"));
        assert_eq!(
            request["queryParameters"][0]["parameterValue"]["value"],
            "2024-03-04 00:00:00"
        );
        assert_eq!(
            request["queryParameters"][1]["parameterValue"]["value"],
            "2024-03-10 23:59:59"
        );
    }

    #[test]
    fn load_job_appends_with_explicit_schema() {
        let config = load_configuration(&table(), &spec());
        let load = &config["configuration"]["load"];

        assert_eq!(load["writeDisposition"], "WRITE_APPEND");
        assert_eq!(load["sourceFormat"], "NEWLINE_DELIMITED_JSON");
        assert_eq!(load["schema"]["fields"].as_array().unwrap().len(), 12);
    }

    #[test]
    fn rows_serialize_as_newline_delimited_json() {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
        let row = TimeEntryRow {
            id: 7,
            project: None,
            description: Some("review".to_string()),
            start,
            end: start,
            updated: start,
            second: 0,
            minute: 0.0,
            hour: 0.0,
            tag1: Some("a".to_string()),
            tag2: None,
            tag3: None,
        };

        let payload = ndjson_rows(&spec(), &[row.clone(), row]).unwrap();
        let lines = payload.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);

        let parsed: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["id"], 7);
        assert_eq!(parsed["project"], Value::Null);
        assert_eq!(parsed["start"], "2024-03-04 00:00:00.000000 UTC");
        assert_eq!(parsed["tag1"], "a");

        let body = String::from_utf8(multipart_body(&serde_json::json!({}), &payload).unwrap())
            .unwrap();
        assert!(body.ends_with("--tracksync_load_boundary--\r\n"));
    }
}
