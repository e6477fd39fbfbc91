use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::Path;

use crate::error::SyncError;

/// Config file looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "warehouse-sync";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub deployment: DeploymentConfig,
    pub warehouse: WarehouseConfig,
    pub aws: AwsConfig,
    #[serde(default)]
    pub functions: Vec<FunctionConfig>,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentConfig {
    pub service: String,
    pub stage: String,
    #[serde(default)]
    pub stack_name: Option<String>,
    pub endpoint_output_key: String,
    pub role_output_key: String,
}

#[derive(Clone, Deserialize)]
pub struct WarehouseConfig {
    pub kind: String,
    pub account: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    pub token: String,
    pub token_type: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub warehouse: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    pub not_found_code: String,
    pub statement_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AwsConfig {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub endpoint_url: Option<String>,
    pub request_timeout_secs: u64,
    pub compute_service_principal: String,
}

/// Per-function metadata block
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FunctionConfig {
    pub name: String,
    #[serde(default)]
    pub http_path: Option<String>,
    #[serde(default)]
    pub arguments: String,
    #[serde(default)]
    pub returns: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            kind: "snowflake".to_string(),
            account: String::new(),
            host: None,
            user: None,
            token: String::new(),
            token_type: "OAUTH".to_string(),
            role: None,
            warehouse: None,
            database: None,
            schema: None,
            not_found_code: "002003".to_string(),
            statement_timeout_secs: 60,
            poll_interval_ms: 500,
            max_poll_attempts: 120,
        }
    }
}

// The token never appears in logs
impl fmt::Debug for WarehouseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarehouseConfig")
            .field("kind", &self.kind)
            .field("account", &self.account)
            .field("host", &self.host)
            .field("user", &self.user)
            .field("token", &"***")
            .field("token_type", &self.token_type)
            .field("role", &self.role)
            .field("warehouse", &self.warehouse)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("not_found_code", &self.not_found_code)
            .field("statement_timeout_secs", &self.statement_timeout_secs)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("max_poll_attempts", &self.max_poll_attempts)
            .finish()
    }
}

impl Config {
    /// Load from `path`, or `warehouse-sync.{toml,yaml,json}` if present, then `.env`
    /// and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, SyncError> {
        // Try to load from .env file
        let _ = dotenv::dotenv();

        let mut builder = config::Config::builder()
            .set_default("deployment.service", "")?
            .set_default("deployment.stage", "dev")?
            .set_default("deployment.endpoint_output_key", "ServiceEndpoint")?
            .set_default("deployment.role_output_key", "IamRoleLambdaExecutionArn")?
            .set_default("warehouse.kind", "snowflake")?
            .set_default("warehouse.account", "")?
            .set_default("warehouse.token", "")?
            .set_default("warehouse.token_type", "OAUTH")?
            .set_default("warehouse.not_found_code", "002003")?
            .set_default("warehouse.statement_timeout_secs", 60)?
            .set_default("warehouse.poll_interval_ms", 500)?
            .set_default("warehouse.max_poll_attempts", 120)?
            .set_default("aws.request_timeout_secs", 30)?
            .set_default("aws.compute_service_principal", "lambda.amazonaws.com")?
            .set_default("logging.level", "info")?;

        builder = match path {
            Some(path) => builder.add_source(config::File::from(path).required(true)),
            None => builder.add_source(config::File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        // Load from environment variables
        let overrides = [
            ("SNOWFLAKE_ACCOUNT", "warehouse.account"),
            ("SNOWFLAKE_HOST", "warehouse.host"),
            ("SNOWFLAKE_USER", "warehouse.user"),
            ("SNOWFLAKE_TOKEN", "warehouse.token"),
            ("SNOWFLAKE_TOKEN_TYPE", "warehouse.token_type"),
            ("SNOWFLAKE_ROLE", "warehouse.role"),
            ("SNOWFLAKE_WAREHOUSE", "warehouse.warehouse"),
            ("SNOWFLAKE_DATABASE", "warehouse.database"),
            ("SNOWFLAKE_SCHEMA", "warehouse.schema"),
            ("AWS_REGION", "aws.region"),
            ("AWS_ENDPOINT_URL", "aws.endpoint_url"),
            ("STAGE", "deployment.stage"),
        ];
        for (var, key) in overrides {
            if let Ok(value) = env::var(var) {
                builder = builder.set_override(key, value)?;
            }
        }

        if let Ok(log_level) = env::var("RUST_LOG") {
            builder = builder.set_override("logging.level", log_level)?;
        }

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), SyncError> {
        if self.deployment.stack_name.is_none() && self.deployment.service.trim().is_empty() {
            return Err(SyncError::Config(
                "deployment.service or deployment.stack_name must be set".to_string(),
            ));
        }
        if self.warehouse.not_found_code.trim().is_empty() {
            return Err(SyncError::Config(
                "warehouse.not_found_code cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Deployed stack name, `{service}-{stage}` unless set explicitly
    pub fn stack_name(&self) -> String {
        match &self.deployment.stack_name {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => format!("{}-{}", self.deployment.service, self.deployment.stage),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_config_defaults() {
        let file = write_config(
            r#"
            [deployment]
            service = "snowflake-aws-nodejs"
            "#,
        );

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.deployment.endpoint_output_key, "ServiceEndpoint");
        assert_eq!(config.deployment.role_output_key, "IamRoleLambdaExecutionArn");
        assert_eq!(config.warehouse.kind, "snowflake");
        assert_eq!(config.aws.compute_service_principal, "lambda.amazonaws.com");
        assert_eq!(config.aws.request_timeout_secs, 30);
        assert!(config.functions.is_empty());
    }

    #[test]
    fn test_config_functions_and_stack_name() {
        let file = write_config(
            r#"
            [deployment]
            service = "my-api"
            stack_name = "my-api-prod"

            [warehouse]
            account = "xy12345"
            not_found_code = "002043"

            [[functions]]
            name = "get-user"
            http_path = "users"
            arguments = "(id NUMBER)"
            returns = "VARIANT"

            [[functions]]
            name = "scheduled-cleanup"
            "#,
        );

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.stack_name(), "my-api-prod");
        assert_eq!(config.warehouse.not_found_code, "002043");
        assert_eq!(config.functions.len(), 2);
        assert_eq!(config.functions[0].http_path.as_deref(), Some("users"));
        assert_eq!(config.functions[1].http_path, None);
        assert_eq!(config.functions[1].returns, "");
    }

    #[test]
    fn test_missing_service_is_rejected() {
        let file = write_config("[logging]\nlevel = \"debug\"\n");
        assert!(matches!(
            Config::load(Some(file.path())),
            Err(SyncError::Config(_))
        ));
    }

    #[test]
    fn test_token_is_masked_in_debug() {
        let warehouse = WarehouseConfig {
            token: "super-secret".to_string(),
            ..WarehouseConfig::default()
        };
        let rendered = format!("{:?}", warehouse);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("***"));
    }
}
