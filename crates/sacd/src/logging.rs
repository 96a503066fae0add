//! Log destination setup
//!
//! Records go either to stderr (with timestamps) or to the local syslog
//! socket, one datagram per event with facility `daemon` and a severity
//! taken from the event level. Without an explicit choice, syslog is used
//! unless stderr is a terminal.

use std::io::{self, IsTerminal, Write};
use std::os::unix::net::UnixDatagram;
use std::path::Path;
use std::sync::Arc;
use tracing::{Level, Metadata};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::FmtSubscriber;

/// Local syslog socket
pub const SYSLOG_SOCKET: &str = "/dev/log";

/// syslog facility `daemon`
const LOG_DAEMON: u8 = 3 << 3;

/// Program name prefixed to syslog records
const IDENT: &str = "sacd";

/// syslog(3) severity for a tracing level
fn severity(level: &Level) -> u8 {
    match *level {
        Level::ERROR => 3,
        Level::WARN => 4,
        Level::INFO => 6,
        Level::DEBUG | Level::TRACE => 7,
    }
}

/// Whether to log to syslog
pub fn use_syslog(requested: Option<bool>) -> bool {
    requested.unwrap_or_else(|| !io::stderr().is_terminal())
}

/// Install the global subscriber
pub fn init(debug: bool, syslog: bool) -> anyhow::Result<()> {
    let level = if debug { Level::DEBUG } else { Level::INFO };

    if syslog {
        let writer = Syslog::connect(SYSLOG_SOCKET)?;
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_writer(writer)
            .with_ansi(false)
            .without_time()
            .with_target(false)
            .with_file(debug)
            .with_line_number(debug)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_writer(io::stderr)
            .with_target(false)
            .with_file(debug)
            .with_line_number(debug)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}

/// `MakeWriter` for a connected syslog datagram socket
#[derive(Debug, Clone)]
pub struct Syslog {
    socket: Arc<UnixDatagram>,
}

impl Syslog {
    /// Connect to the syslog socket at `path`
    pub fn connect(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let socket = UnixDatagram::unbound()?;
        socket.connect(path).map_err(|e| {
            io::Error::new(e.kind(), format!("Failed to connect to {}: {}", path.display(), e))
        })?;
        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    fn record(&self, level: &Level) -> SyslogRecord {
        SyslogRecord {
            socket: Arc::clone(&self.socket),
            priority: LOG_DAEMON | severity(level),
            buf: Vec::new(),
        }
    }
}

impl<'a> MakeWriter<'a> for Syslog {
    type Writer = SyslogRecord;

    fn make_writer(&'a self) -> Self::Writer {
        self.record(&Level::INFO)
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        self.record(meta.level())
    }
}

/// One syslog record; sent as a single datagram when dropped
#[derive(Debug)]
pub struct SyslogRecord {
    socket: Arc<UnixDatagram>,
    priority: u8,
    buf: Vec<u8>,
}

impl SyslogRecord {
    fn datagram(&self) -> Vec<u8> {
        let message = self.buf.strip_suffix(b"\n").unwrap_or(&self.buf);

        let mut datagram = format!("<{}>{}[{}]: ", self.priority, IDENT, std::process::id()).into_bytes();
        datagram.extend_from_slice(message);
        datagram
    }
}

impl Write for SyslogRecord {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for SyslogRecord {
    fn drop(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        // Nowhere left to report a failure to log
        let _ = self.socket.send(&self.datagram());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_severity() {
        assert_eq!(severity(&Level::ERROR), 3);
        assert_eq!(severity(&Level::WARN), 4);
        assert_eq!(severity(&Level::INFO), 6);
        assert_eq!(severity(&Level::DEBUG), 7);
    }

    #[test]
    fn test_explicit_destination_wins() {
        assert!(use_syslog(Some(true)));
        assert!(!use_syslog(Some(false)));
    }

    #[test]
    fn test_record_is_one_datagram() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log");
        let server = UnixDatagram::bind(&path).unwrap();

        let syslog = Syslog::connect(&path).unwrap();
        {
            let mut record = syslog.record(&Level::WARN);
            write!(record, " WARN Disabling plugin: ").unwrap();
            writeln!(record, "dns").unwrap();
        }

        let mut buf = [0u8; 256];
        let len = server.recv(&mut buf).unwrap();
        let datagram = std::str::from_utf8(&buf[..len]).unwrap();

        assert!(datagram.starts_with("<28>sacd["), "{}", datagram);
        assert!(datagram.ends_with("]:  WARN Disabling plugin: dns"), "{}", datagram);
    }

    #[test]
    fn test_empty_record_is_not_sent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log");
        let server = UnixDatagram::bind(&path).unwrap();
        server.set_nonblocking(true).unwrap();

        let syslog = Syslog::connect(&path).unwrap();
        drop(syslog.record(&Level::INFO));

        let mut buf = [0u8; 16];
        assert!(server.recv(&mut buf).is_err());
    }

    #[test]
    fn test_connect_missing_socket() {
        let dir = TempDir::new().unwrap();

        assert!(Syslog::connect(dir.path().join("missing")).is_err());
    }
}
