use anyhow::{Context, Result, bail};
use awsops::cli::{CommonArgs, merged_config};
use awsops::config::build_sqs_client;
use awsops::drain::{self, DrainCoordinator, DrainReport};
use awsops::{export, logging, shutdown};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, warn};

/// Drain an SQS (dead-letter) queue into a JSON-lines file.
#[derive(Parser, Debug)]
#[command(name = "drain-sqs")]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Name of the SQS queue, e.g. task-queue-dlq-dev
    #[arg(short = 'n', long)]
    queue_name: String,

    /// File the drained messages are written to (JSON lines)
    #[arg(short, long)]
    target_path: PathBuf,

    /// How many concurrent pollers to run [config default: 10]
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Keep the messages in the queue instead of deleting them
    #[arg(short, long)]
    keep: bool,

    /// Keep polling after the first batch until the queue looks empty
    #[arg(long)]
    until_empty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let args = Args::parse();

    let mut cfg = merged_config(&args.common)?;
    if let Some(c) = args.concurrency {
        cfg.drain.concurrency = c;
    }
    cfg.drain.keep |= args.keep;
    cfg.drain.until_empty |= args.until_empty;
    let settings = cfg.drain_settings()?;

    let client = build_sqs_client(&cfg).await?;

    println!(
        "[drain] finding the SQS queue [{}] in [{}]",
        args.queue_name,
        cfg.region_label()
    );
    let queue_url = drain::resolve_queue(&client, &args.queue_name)
        .await
        .with_context(|| format!("resolving queue {}", args.queue_name))?;

    println!(
        "[drain] exporting messages from [{}] to [{}] with {} concurrent pollers (keep={} mode={:?})",
        queue_url,
        args.target_path.display(),
        settings.concurrency,
        settings.keep_messages,
        settings.mode
    );

    let coordinator = DrainCoordinator::new(Arc::new(client), settings);
    // the target is created before the first receive; written even if a poller fails
    let (report, written) =
        export::drain_to_file(&coordinator, &queue_url, &args.target_path, shutdown::ctrl_c())
            .await?;
    summarize(&report, written);

    if !report.is_success() {
        bail!(
            "drain incomplete: {} poller(s) failed, {} panicked",
            report.errors().count(),
            report.panicked
        );
    }

    println!("[drain] all done!");
    Ok(())
}

fn summarize(report: &DrainReport, written: usize) {
    println!(
        "[drain] {} messages drained ({} written, {} deleted) over {} receives",
        report.message_count(),
        written,
        report.deleted_ids().count(),
        report.receive_count()
    );

    for failed in report.failed_deletes() {
        warn!(
            message_id = %failed.id,
            code = %failed.code,
            sender_fault = failed.sender_fault,
            "message was not deleted"
        );
        println!("[drain] not deleted: message_id={} code={}", failed.id, failed.code);
    }

    for (poller, err) in report.errors() {
        error!(poller, error = %err, "poller failed");
    }
}
