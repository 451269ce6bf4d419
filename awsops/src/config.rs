use anyhow::{Context, Result, anyhow, ensure};
use aws_config::{BehaviorVersion, SdkConfig};
use aws_credential_types::{Credentials, provider::SharedCredentialsProvider};
use aws_sdk_kinesis as kinesis;
use aws_sdk_sqs as sqs;
use config::{Config, Environment, File, Map};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::drain::{DrainMode, DrainSettings};
use crate::kinesis::TailSettings;
use crate::retry::RetryPolicy;

/// Looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "awsops.toml";

pub const DEFAULT_REPORT_URL: &str =
    "https://001sg6kjid.execute-api.us-west-2.amazonaws.com/prod/scan";

const LOCALSTACK_ENDPOINT: &str = "http://localhost:4566";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeMode {
    Local,
    #[default]
    Aws,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub mode: RuntimeMode,
    /// Falls back to the SDK's default region chain when unset.
    pub region: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SqsConfig {
    pub endpoint_url: Option<String>,
    /// Long-poll wait per receive; the queue's own setting applies when unset.
    pub wait_secs: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DrainConfig {
    pub concurrency: usize,
    pub keep: bool,
    pub until_empty: bool,
    pub retry_attempts: u32,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            keep: false,
            until_empty: false,
            retry_attempts: 3,
            retry_base_ms: 200,
            retry_max_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KinesisConfig {
    pub endpoint_url: Option<String>,
    pub poll_interval_ms: u64,
    pub record_limit: i32,
}

impl Default for KinesisConfig {
    fn default() -> Self {
        Self {
            endpoint_url: None,
            poll_interval_ms: 1_000,
            record_limit: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub report_url: String,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            report_url: DEFAULT_REPORT_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub runtime: RuntimeConfig,
    pub sqs: SqsConfig,
    pub drain: DrainConfig,
    pub kinesis: KinesisConfig,
    pub scanner: ScannerConfig,
}

/// Values given on the command line; they win over file and environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
}

impl AppConfig {
    /// Load and MERGE, later sources overriding earlier ones:
    ///  - config file (`path`, or `awsops.toml` if present)
    ///  - environment (APP_* with "__" nesting)
    ///  - command-line overrides
    pub fn load(path: Option<&str>, overrides: &Overrides) -> Result<Self> {
        Self::load_with_env(path, overrides, None)
    }

    /// `env` replaces the process environment when given.
    fn load_with_env(
        path: Option<&str>,
        overrides: &Overrides,
        env: Option<Map<String, String>>,
    ) -> Result<Self> {
        let mut builder = Config::builder();

        match path {
            Some(p) => {
                if !Path::new(p).exists() {
                    return Err(anyhow!(
                        "Config not found at '{}'. Create it (e.g. copy awsops.example.toml) or drop --config.",
                        p
                    ));
                }
                builder = builder.add_source(File::with_name(p));
            }
            None => {
                builder = builder.add_source(File::with_name(DEFAULT_CONFIG_PATH).required(false));
            }
        }

        // e.g. APP_RUNTIME__REGION=eu-west-1, APP_DRAIN__CONCURRENCY=4
        builder = builder.add_source(
            Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        builder = builder
            .set_override_option("runtime.region", overrides.region.clone())
            .context("applying region override")?
            .set_override_option("sqs.endpoint_url", overrides.endpoint_url.clone())
            .context("applying endpoint override")?
            .set_override_option("kinesis.endpoint_url", overrides.endpoint_url.clone())
            .context("applying endpoint override")?;

        let cfg = builder.build().context("building merged config")?;
        let out: AppConfig = cfg.try_deserialize().context("deserializing AppConfig")?;
        Ok(out)
    }

    pub fn region_label(&self) -> &str {
        self.runtime.region.as_deref().unwrap_or("<default>")
    }

    /// Endpoint for a service: explicit setting first, LocalStack in local mode.
    fn endpoint_for(&self, explicit: &Option<String>) -> Option<String> {
        explicit.clone().or_else(|| {
            matches!(self.runtime.mode, RuntimeMode::Local).then(|| LOCALSTACK_ENDPOINT.to_string())
        })
    }

    pub fn drain_settings(&self) -> Result<DrainSettings> {
        let d = &self.drain;
        ensure!(d.concurrency > 0, "drain concurrency must be at least 1");
        ensure!(d.retry_attempts > 0, "drain retry_attempts must be at least 1");

        Ok(DrainSettings {
            concurrency: d.concurrency,
            keep_messages: d.keep,
            mode: if d.until_empty {
                DrainMode::UntilEmpty
            } else {
                DrainMode::OneBatch
            },
            wait_secs: self.sqs.wait_secs,
            retry: RetryPolicy::new(
                d.retry_attempts,
                Duration::from_millis(d.retry_base_ms),
                Duration::from_millis(d.retry_max_ms),
            ),
        })
    }

    pub fn tail_settings(&self) -> Result<TailSettings> {
        let k = &self.kinesis;
        ensure!(
            (1..=10_000).contains(&k.record_limit),
            "kinesis record_limit must be between 1 and 10000 (got {})",
            k.record_limit
        );
        Ok(TailSettings {
            record_limit: k.record_limit,
            poll_interval: Duration::from_millis(k.poll_interval_ms),
        })
    }
}

/// Shared SDK config. Local mode or an explicit endpoint gets static dummy
/// creds so SSO/profile resolution is bypassed.
pub async fn load_sdk_config(cfg: &AppConfig, endpoint_url: Option<&str>) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());

    if let Some(region) = &cfg.runtime.region {
        loader = loader.region(aws_config::Region::new(region.clone()));
    }

    let using_localstack = matches!(cfg.runtime.mode, RuntimeMode::Local) || endpoint_url.is_some();
    if using_localstack {
        let creds = Credentials::new("test", "test", None, None, "localstack");
        loader = loader.credentials_provider(SharedCredentialsProvider::new(creds));
    }
    if let Some(ep) = endpoint_url {
        loader = loader.endpoint_url(ep);
    }

    loader.load().await
}

pub async fn build_sqs_client(cfg: &AppConfig) -> Result<sqs::Client> {
    let endpoint = cfg.endpoint_for(&cfg.sqs.endpoint_url);
    let shared_cfg = load_sdk_config(cfg, endpoint.as_deref()).await;
    Ok(sqs::Client::new(&shared_cfg))
}

pub async fn build_kinesis_client(cfg: &AppConfig) -> Result<kinesis::Client> {
    let endpoint = cfg.endpoint_for(&cfg.kinesis.endpoint_url);
    let shared_cfg = load_sdk_config(cfg, endpoint.as_deref()).await;
    Ok(kinesis::Client::new(&shared_cfg))
}

/// Config for the scanner's multi-service clients.
pub async fn scanner_sdk_config(cfg: &AppConfig) -> SdkConfig {
    let endpoint = cfg.endpoint_for(&None);
    load_sdk_config(cfg, endpoint.as_deref()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn defaults_apply_to_missing_sections() {
        let f = write_config("[runtime]\nregion = \"eu-west-1\"\n");
        let cfg = AppConfig::load(f.path().to_str(), &Overrides::default()).unwrap();

        assert_eq!(cfg.runtime.region.as_deref(), Some("eu-west-1"));
        assert_eq!(cfg.runtime.mode, RuntimeMode::Aws);
        assert_eq!(cfg.drain.concurrency, 10);
        assert!(!cfg.drain.keep);
        assert_eq!(cfg.kinesis.record_limit, 10);
        assert_eq!(cfg.scanner.report_url, DEFAULT_REPORT_URL);
    }

    #[test]
    fn cli_overrides_win_over_file() {
        let f = write_config(
            "[runtime]\nregion = \"eu-west-1\"\n[sqs]\nendpoint_url = \"http://file:1\"\n",
        );
        let overrides = Overrides {
            region: Some("ap-south-1".into()),
            endpoint_url: Some("http://cli:2".into()),
        };
        let cfg = AppConfig::load(f.path().to_str(), &overrides).unwrap();

        assert_eq!(cfg.runtime.region.as_deref(), Some("ap-south-1"));
        assert_eq!(cfg.sqs.endpoint_url.as_deref(), Some("http://cli:2"));
        assert_eq!(cfg.kinesis.endpoint_url.as_deref(), Some("http://cli:2"));
    }

    #[test]
    fn app_env_vars_nest_with_double_underscore() {
        let env = Map::from([
            ("APP_DRAIN__CONCURRENCY".to_string(), "4".to_string()),
            ("APP_RUNTIME__REGION".to_string(), "eu-west-1".to_string()),
            ("APP_KINESIS__POLL_INTERVAL_MS".to_string(), "250".to_string()),
            ("OTHER_DRAIN__CONCURRENCY".to_string(), "99".to_string()),
        ]);
        let f = write_config("[drain]\nconcurrency = 2\n");

        let cfg = AppConfig::load_with_env(f.path().to_str(), &Overrides::default(), Some(env))
            .unwrap();

        assert_eq!(cfg.drain.concurrency, 4);
        assert_eq!(cfg.runtime.region.as_deref(), Some("eu-west-1"));
        assert_eq!(cfg.kinesis.poll_interval_ms, 250);
    }

    #[test]
    fn cli_region_wins_over_env() {
        let env = Map::from([("APP_RUNTIME__REGION".to_string(), "eu-west-1".to_string())]);
        let overrides = Overrides {
            region: Some("us-east-2".into()),
            endpoint_url: None,
        };
        let f = write_config("");

        let cfg = AppConfig::load_with_env(f.path().to_str(), &overrides, Some(env)).unwrap();

        assert_eq!(cfg.runtime.region.as_deref(), Some("us-east-2"));
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let err = AppConfig::load(Some("/definitely/not/here.toml"), &Overrides::default())
            .unwrap_err();
        assert!(err.to_string().contains("Config not found"));
    }

    #[test]
    fn drain_settings_follow_flags() {
        let f = write_config("[drain]\nconcurrency = 3\nkeep = true\nuntil_empty = true\n");
        let cfg = AppConfig::load(f.path().to_str(), &Overrides::default()).unwrap();
        let s = cfg.drain_settings().unwrap();

        assert_eq!(s.concurrency, 3);
        assert!(s.keep_messages);
        assert_eq!(s.mode, DrainMode::UntilEmpty);
        assert_eq!(s.retry.max_attempts, 3);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut cfg = AppConfig::default();
        cfg.drain.concurrency = 0;
        assert!(cfg.drain_settings().is_err());
    }

    #[test]
    fn local_mode_defaults_to_localstack_endpoint() {
        let mut cfg = AppConfig::default();
        assert_eq!(cfg.endpoint_for(&None), None);

        cfg.runtime.mode = RuntimeMode::Local;
        assert_eq!(cfg.endpoint_for(&None).as_deref(), Some(LOCALSTACK_ENDPOINT));
        assert_eq!(
            cfg.endpoint_for(&Some("http://x:1".into())).as_deref(),
            Some("http://x:1")
        );
    }
}
