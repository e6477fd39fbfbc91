// Snowflake session over the SQL REST API
// Each statement is posted to /api/v2/statements; long-running statements are polled
use crate::config::WarehouseConfig;
use crate::error::SyncError;
use crate::services::warehouse::adapter::{Statement, StatementResult, WarehouseSession};
use crate::services::warehouse::statements::StatementBuilder;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use url::Url;
use uuid::Uuid;

const STATEMENTS_PATH: &str = "/api/v2/statements";
const TOKEN_TYPE_HEADER: &str = "X-Snowflake-Authorization-Token-Type";
/// Code reported when a success status carries an unreadable body
pub const INVALID_RESPONSE_CODE: &str = "INVALID_RESPONSE";
const USER_AGENT: &str = concat!("warehouse-sync/", env!("CARGO_PKG_VERSION"));

pub struct SnowflakeSession {
    base_url: String,
    client: Client,
    token: String,
    token_type: String,
    context: SessionContext,
    statement_timeout_secs: u64,
    poll_interval: Duration,
    max_poll_attempts: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
struct SessionContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warehouse: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<String>,
}

#[derive(Debug, Serialize)]
struct SqlApiRequest<'a> {
    statement: &'a str,
    timeout: u64,
    #[serde(flatten)]
    context: &'a SessionContext,
}

#[derive(Debug, Default, Deserialize)]
struct SqlApiResponse {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(rename = "statementHandle", default)]
    statement_handle: Option<String>,
    #[serde(rename = "resultSetMetaData", default)]
    result_set_meta_data: Option<ResultSetMetaData>,
    #[serde(default)]
    data: Vec<Vec<Value>>,
}

#[derive(Debug, Default, Deserialize)]
struct ResultSetMetaData {
    #[serde(rename = "rowType", default)]
    row_type: Vec<RowType>,
    #[serde(rename = "partitionInfo", default)]
    partition_info: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct RowType {
    name: String,
}

/// What a single HTTP exchange told us about the statement
enum Progress {
    Done(SqlApiResponse),
    Running(String),
}

impl SnowflakeSession {
    pub fn new(config: &WarehouseConfig) -> Result<Self, SyncError> {
        let base_url = Self::base_url(config)?;

        if config.token.trim().is_empty() {
            return Err(SyncError::Config(
                "warehouse.token must be set (SNOWFLAKE_TOKEN)".to_string(),
            ));
        }
        let token_type = config.token_type.trim().to_uppercase();
        if !matches!(
            token_type.as_str(),
            "OAUTH" | "KEYPAIR_JWT" | "PROGRAMMATIC_ACCESS_TOKEN"
        ) {
            return Err(SyncError::Config(format!(
                "Unsupported warehouse.token_type: {}",
                config.token_type
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.statement_timeout_secs.max(1)))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SyncError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            client,
            token: config.token.clone(),
            token_type,
            context: SessionContext {
                role: config.role.clone(),
                warehouse: config.warehouse.clone(),
                database: config.database.clone(),
                schema: config.schema.clone(),
            },
            statement_timeout_secs: config.statement_timeout_secs,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_poll_attempts: config.max_poll_attempts,
        })
    }

    /// Build the session and verify it can run a statement
    pub async fn connect(config: &WarehouseConfig) -> Result<Self, SyncError> {
        let session = Self::new(config)?;
        tracing::info!(
            "Connecting to Snowflake account {} as {}",
            config.account,
            config.user.as_deref().unwrap_or("<token subject>")
        );
        session.test_connection().await?;
        tracing::info!("Successfully connected to Snowflake");
        Ok(session)
    }

    pub async fn test_connection(&self) -> Result<(), SyncError> {
        self.execute(&StatementBuilder::connection_check())
            .await
            .map(|_| ())
            .map_err(|e| SyncError::Connection(format!("Connection test failed: {}", e)))
    }

    fn base_url(config: &WarehouseConfig) -> Result<String, SyncError> {
        if let Some(host) = config.host.as_deref().filter(|h| !h.trim().is_empty()) {
            let candidate = if host.contains("://") {
                host.to_string()
            } else {
                format!("https://{}", host)
            };
            let url = Url::parse(&candidate)
                .map_err(|e| SyncError::Config(format!("Invalid warehouse host: {}", e)))?;
            if url.scheme() != "https" && url.scheme() != "http" {
                return Err(SyncError::Config(
                    "warehouse.host must use http:// or https://".to_string(),
                ));
            }
            return Ok(candidate.trim_end_matches('/').to_string());
        }

        let account = config.account.trim();
        if account.is_empty() {
            return Err(SyncError::Config(
                "warehouse.account must be set (SNOWFLAKE_ACCOUNT)".to_string(),
            ));
        }
        if !account
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(SyncError::Config(format!(
                "Invalid warehouse account identifier: {}",
                account
            )));
        }
        Ok(format!("https://{}.snowflakecomputing.com", account.to_lowercase()))
    }

    /// Bound on one whole exchange: the statement timeout plus every allowed poll
    fn time_budget(&self) -> Duration {
        Duration::from_secs(self.statement_timeout_secs)
            .saturating_add(self.poll_interval.saturating_mul(self.max_poll_attempts))
            .max(Duration::from_secs(1))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .bearer_auth(&self.token)
            .header(TOKEN_TYPE_HEADER, &self.token_type)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    async fn submit(&self, statement: &Statement) -> Result<Progress, SyncError> {
        let request = SqlApiRequest {
            statement: &statement.sql,
            timeout: self.statement_timeout_secs,
            context: &self.context,
        };

        let response = self
            .authorize(self.client.post(format!("{}{}", self.base_url, STATEMENTS_PATH)))
            .query(&[("requestId", Uuid::new_v4().to_string())])
            .json(&request)
            .send()
            .await
            .map_err(|e| SyncError::Connection(format!("HTTP request failed: {}", e)))?;

        Self::read_progress(statement, response).await
    }

    async fn poll(&self, statement: &Statement, handle: &str) -> Result<Progress, SyncError> {
        let response = self
            .authorize(
                self.client
                    .get(format!("{}{}/{}", self.base_url, STATEMENTS_PATH, handle)),
            )
            .send()
            .await
            .map_err(|e| SyncError::Connection(format!("HTTP request failed: {}", e)))?;

        Self::read_progress(statement, response).await
    }

    async fn fetch_partition(
        &self,
        statement: &Statement,
        handle: &str,
        partition: usize,
    ) -> Result<Vec<Vec<Value>>, SyncError> {
        let response = self
            .authorize(
                self.client
                    .get(format!("{}{}/{}", self.base_url, STATEMENTS_PATH, handle)),
            )
            .query(&[("partition", partition.to_string())])
            .send()
            .await
            .map_err(|e| SyncError::Connection(format!("HTTP request failed: {}", e)))?;

        match Self::read_progress(statement, response).await? {
            Progress::Done(body) => Ok(body.data),
            Progress::Running(_) => Err(SyncError::Internal(format!(
                "Partition {} of statement {} is not ready",
                partition, handle
            ))),
        }
    }

    async fn read_progress(
        statement: &Statement,
        response: reqwest::Response,
    ) -> Result<Progress, SyncError> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SyncError::Connection(format!("Failed to read response body: {}", e)))?;

        match status {
            StatusCode::OK | StatusCode::ACCEPTED => {
                let body: SqlApiResponse = serde_json::from_str(&text).map_err(|e| {
                    statement.rejected(
                        INVALID_RESPONSE_CODE,
                        format!("Response is not a statement result: {}", e),
                    )
                })?;
                if status == StatusCode::OK {
                    return Ok(Progress::Done(body));
                }
                body.statement_handle.map(Progress::Running).ok_or_else(|| {
                    SyncError::Internal(format!(
                        "{} {} was accepted without a statement handle",
                        statement.kind, statement.object
                    ))
                })
            }
            _ => {
                // Error bodies are not always JSON; the status stands in for a code
                let body: SqlApiResponse = serde_json::from_str(&text).unwrap_or_default();
                let code = body
                    .code
                    .unwrap_or_else(|| format!("HTTP_{}", status.as_u16()));
                let message = body.message.unwrap_or_else(|| {
                    if text.is_empty() {
                        status.to_string()
                    } else {
                        text
                    }
                });
                Err(statement.rejected(code, message))
            }
        }
    }

    async fn run(&self, statement: &Statement) -> Result<StatementResult, SyncError> {
        let start_time = Instant::now();

        let mut progress = self.submit(statement).await?;
        let mut attempts = 0;
        let body = loop {
            match progress {
                Progress::Done(body) => break body,
                Progress::Running(handle) => {
                    if attempts >= self.max_poll_attempts {
                        return Err(SyncError::Timeout {
                            operation: format!("{} {}", statement.kind, statement.object),
                            seconds: start_time.elapsed().as_secs(),
                        });
                    }
                    attempts += 1;
                    tracing::debug!(
                        "{} {} still running (handle {}), poll {}",
                        statement.kind,
                        statement.object,
                        handle,
                        attempts
                    );
                    tokio::time::sleep(self.poll_interval).await;
                    progress = self.poll(statement, &handle).await?;
                }
            }
        };

        let metadata = body.result_set_meta_data.unwrap_or_default();
        let mut data = body.data;
        if let Some(handle) = body.statement_handle.as_deref() {
            for partition in 1..metadata.partition_info.len() {
                data.extend(self.fetch_partition(statement, handle, partition).await?);
            }
        }

        // Convert Snowflake rows to standard JSON objects
        let mut json_rows = Vec::with_capacity(data.len());
        for row_values in data {
            let mut row_obj = serde_json::Map::new();
            for (idx, column) in metadata.row_type.iter().enumerate() {
                let value = row_values.get(idx).cloned().unwrap_or(Value::Null);
                row_obj.insert(column.name.clone(), value);
            }
            json_rows.push(Value::Object(row_obj));
        }

        Ok(StatementResult {
            rows: json_rows,
            execution_time_ms: start_time.elapsed().as_millis() as u64,
        })
    }
}

#[async_trait::async_trait]
impl WarehouseSession for SnowflakeSession {
    async fn execute(&self, statement: &Statement) -> Result<StatementResult, SyncError> {
        tracing::debug!("Executing {} {}: {}", statement.kind, statement.object, statement.sql);

        let budget = self.time_budget();
        tokio::time::timeout(budget, self.run(statement))
            .await
            .map_err(|_| SyncError::Timeout {
                operation: format!("{} {}", statement.kind, statement.object),
                seconds: budget.as_secs(),
            })?
    }
}
