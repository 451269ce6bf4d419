use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use super::Inventory;

/// Body POSTed to the analysis service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub resources: Inventory,
    pub aws_account_id: String,
    pub email: String,
}

pub async fn send_report(http: &reqwest::Client, url: &str, report: &ScanReport) -> Result<()> {
    let resp = http
        .post(url)
        .json(report)
        .send()
        .await
        .with_context(|| format!("posting scan report to {url}"))?;

    let status = resp.status();
    resp.error_for_status()
        .with_context(|| format!("scan report rejected by {url}"))?;

    info!(%status, resources = report.resources.resource_count(), "scan report delivered");
    Ok(())
}
