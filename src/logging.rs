use tokio::sync::broadcast;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::MakeWriter;

/// Capacity of the log tee; slow log streams simply lag and skip lines.
pub(crate) const LOG_CHANNEL_CAPACITY: usize = 500;

/// Tees every formatted log line into a broadcast channel so the web surface
/// can stream it, while still writing to stdout unless suppressed.
#[derive(Clone)]
pub(crate) struct LogTeeMakeWriter {
    pub sender: broadcast::Sender<String>,
    pub suppress_stdout: bool,
}

impl<'a> MakeWriter<'a> for LogTeeMakeWriter {
    type Writer = LogTeeWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogTeeWriter {
            sender: self.sender.clone(),
            suppress_stdout: self.suppress_stdout,
        }
    }
}

pub(crate) struct LogTeeWriter {
    sender: broadcast::Sender<String>,
    suppress_stdout: bool,
}

impl std::io::Write for LogTeeWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let msg = String::from_utf8_lossy(buf).to_string();
        let _ = self.sender.send(msg); // Ignored if no receivers
        if !self.suppress_stdout {
            std::io::stdout().write_all(buf)?;
        }
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        if !self.suppress_stdout {
            std::io::stdout().flush()?;
        }
        Ok(())
    }
}

/// Installs the global subscriber and returns the tee sender. The `send`
/// command suppresses stdout so its progress output stays readable.
pub(crate) fn init_tracing(suppress_stdout: bool) -> broadcast::Sender<String> {
    let (log_tx, _) = broadcast::channel::<String>(LOG_CHANNEL_CAPACITY);
    let make_writer = LogTeeMakeWriter {
        sender: log_tx.clone(),
        suppress_stdout,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(make_writer)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok(); // Already set in tests
    log_tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn writer_forwards_lines_to_subscribers() {
        let (tx, mut rx) = broadcast::channel(8);
        let make_writer = LogTeeMakeWriter {
            sender: tx,
            suppress_stdout: true,
        };

        let mut writer = make_writer.make_writer();
        writer.write_all(b"INFO blastr: hello\n").unwrap();
        writer.flush().unwrap();

        assert_eq!(rx.try_recv().unwrap(), "INFO blastr: hello\n");
    }

    #[test]
    fn writer_without_subscribers_still_succeeds() {
        let (tx, _) = broadcast::channel::<String>(8);
        let mut writer = LogTeeWriter {
            sender: tx,
            suppress_stdout: true,
        };
        assert_eq!(writer.write(b"dropped").unwrap(), 7);
    }
}
