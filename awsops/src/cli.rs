use anyhow::Result;
use clap::Args as ClapArgs;

use crate::config::{AppConfig, Overrides};

/// Common flags shared by all binaries.
/// Use with `#[command(flatten)] common: CommonArgs`.
#[derive(Clone, Debug, ClapArgs)]
pub struct CommonArgs {
    /// Path to a config file (defaults to ./awsops.toml when present)
    #[arg(long)]
    pub config: Option<String>,

    /// AWS region, e.g. us-east-1
    #[arg(short, long, env = "AWS_REGION")]
    pub region: Option<String>,

    /// Override the service endpoint (e.g. LocalStack at http://localhost:4566)
    #[arg(long)]
    pub endpoint_url: Option<String>,
}

/// Merge file + env + CLI flags into an AppConfig.
pub fn merged_config(common: &CommonArgs) -> Result<AppConfig> {
    let overrides = Overrides {
        region: common.region.clone(),
        endpoint_url: common.endpoint_url.clone(),
    };
    AppConfig::load(common.config.as_deref(), &overrides)
}
