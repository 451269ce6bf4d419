use anyhow::Result;
use awsops::cli::{CommonArgs, merged_config};
use awsops::config::build_kinesis_client;
use awsops::kinesis::{self, StreamClient};
use awsops::{logging, shutdown};
use clap::Parser;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Tail the records going into a Kinesis stream.
#[derive(Parser, Debug)]
#[command(name = "tail-kinesis")]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Name of the Kinesis stream, e.g. event-stream-dev
    #[arg(short = 'n', long)]
    stream_name: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let args = Args::parse();

    let cfg = merged_config(&args.common)?;
    let settings = cfg.tail_settings()?;
    let client = Arc::new(build_kinesis_client(&cfg).await?);

    eprintln!(
        "[tail] checking Kinesis stream [{}] in [{}]",
        args.stream_name,
        cfg.region_label()
    );
    // the SDK client has an inherent describe_stream builder of the same name
    let stream = StreamClient::describe_stream(client.as_ref(), &args.stream_name).await?;

    eprintln!(
        "[tail] polling Kinesis stream [{}] ({} shards, {})...",
        args.stream_name,
        stream.shard_ids.len(),
        stream.status
    );
    eprintln!("[tail] press Ctrl-C to stop");

    let stop = shutdown::ctrl_c();
    let (tx, mut rx) = mpsc::channel::<kinesis::TailedRecord>(256);

    let printer = tokio::spawn(async move {
        while let Some(record) = rx.recv().await {
            println!("{}", record.data_lossy());
        }
    });

    let tailed = kinesis::tail_stream(
        client,
        &args.stream_name,
        &stream.shard_ids,
        settings,
        stop,
        tx,
    )
    .await;

    // tail_stream dropped every sender, so the printer drains and exits
    let _ = printer.await;
    eprintln!("[tail] stopped");
    tailed
}
