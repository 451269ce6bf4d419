use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::error;

use crate::drain::{DrainCoordinator, DrainReport};
use crate::sqs::{Message, QueueClient};

/// JSON-lines target for drained messages. The file is created (and
/// truncated) when the exporter is, so an unwritable path fails before any
/// message is received.
pub struct Exporter {
    path: PathBuf,
    out: BufWriter<File>,
}

impl Exporter {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
        })
    }

    /// Write one line per message and flush. Returns lines written.
    pub fn write_messages<'a, I>(mut self, messages: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a Message>,
    {
        let mut written = 0;
        for m in messages {
            serde_json::to_writer(&mut self.out, m)
                .with_context(|| format!("serializing message {}", m.message_id))?;
            self.out.write_all(b"\n")?;
            written += 1;
        }
        self.out
            .flush()
            .with_context(|| format!("flushing {}", self.path.display()))?;
        Ok(written)
    }
}

/// Open `path`, drain the queue, then export everything the pollers
/// received. Returns the report and the number of lines written.
pub async fn drain_to_file<C>(
    coordinator: &DrainCoordinator<C>,
    queue_url: &str,
    path: &Path,
    shutdown: watch::Receiver<bool>,
) -> Result<(DrainReport, usize)>
where
    C: QueueClient + ?Sized + 'static,
{
    let exporter = Exporter::create(path)?;
    let report = coordinator.drain(queue_url, shutdown).await;

    match exporter.write_messages(report.messages()) {
        Ok(written) => Ok((report, written)),
        Err(e) => {
            error!(
                path = %path.display(),
                messages = report.message_count(),
                deleted = report.deleted_ids().count(),
                error = %e,
                "export failed after drain"
            );
            Err(e)
        }
    }
}
