use anyhow::{Context, Result};
use awsops::cli::{CommonArgs, merged_config};
use awsops::config::scanner_sdk_config;
use awsops::logging;
use awsops::scanner::{self, AwsInventory, InventorySource, ScanReport};
use clap::Parser;
use tracing::info;

/// Scan the account's serverless resources and send the metadata for analysis.
#[derive(Parser, Debug)]
#[command(name = "scan")]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Send the report to this email (needed with --yes or --dry-run)
    #[arg(long)]
    email: Option<String>,

    /// Consent to sending resource metadata to the analysis service
    #[arg(short, long)]
    yes: bool,

    /// Print the report instead of sending it
    #[arg(long)]
    dry_run: bool,
}

impl Args {
    fn email(&self) -> Result<&str> {
        self.email
            .as_deref()
            .context("--email is required with --yes or --dry-run")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let args = Args::parse();

    let cfg = merged_config(&args.common)?;

    println!("[scan] this command scans AWS resources in the account you're connected to");
    println!(
        "[scan] metadata about those resources is sent to {} for analysis",
        cfg.scanner.report_url
    );
    if !args.yes && !args.dry_run {
        println!("[scan] pass --yes to give permission to send resource metadata (or --dry-run)");
        return Ok(());
    }
    let email = args.email()?.to_string();

    let shared = scanner_sdk_config(&cfg).await;
    let inventory = AwsInventory::new(&shared);

    println!("[scan] scanning DynamoDB tables, Lambda functions, SNS topics and SQS queues...");
    let resources = scanner::scan(&inventory).await?;
    println!("[scan] found {} AWS resources", resources.resource_count());

    let report = ScanReport {
        resources,
        aws_account_id: inventory.account_id().await?,
        email,
    };

    if args.dry_run {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("serializing scan report")?
        );
        return Ok(());
    }

    info!(url = %cfg.scanner.report_url, "sending scan report");
    let http = reqwest::Client::new();
    scanner::send_report(&http, &cfg.scanner.report_url, &report).await?;
    println!("[scan] metadata sent; look for an email in your inbox soon");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consent_notice_needs_no_email() {
        let args = Args::try_parse_from(["scan"]).unwrap();
        assert!(!args.yes && !args.dry_run);
        assert!(args.email.is_none());
    }

    #[test]
    fn email_is_required_once_consent_is_given() {
        let args = Args::try_parse_from(["scan", "--yes"]).unwrap();
        assert!(args.email().unwrap_err().to_string().contains("--email"));

        let args = Args::try_parse_from(["scan", "--dry-run", "--email", "ops@example.com"]).unwrap();
        assert_eq!(args.email().unwrap(), "ops@example.com");
    }
}
