//! Client for the index service
//!
//! Connects over a Unix socket and streams rows as they arrive. One
//! connection serves one search call: the main query first, then any
//! coverage probes, strictly one after another.

use crate::backend::protocol::{read_message, write_message, Request, Response};
use crate::backend::{BackendSession, IndexQuery, IndexedBackend, RowEvent, RowStream};
use crate::error::{Result, SearchError};
use crate::utils::app_data::SearchConfig;
use std::io::{BufReader, BufWriter, ErrorKind};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Write timeout for requests
const WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Extra time allowed on reads beyond the query timeout, for the service to
/// report the timeout itself
const READ_GRACE: Duration = Duration::from_secs(5);

/// Read timeout while waiting for a pong
const PING_TIMEOUT: Duration = Duration::from_secs(2);

/// Get the socket path for the index service
/// Uses a per-user runtime directory for security
pub fn default_socket_path() -> PathBuf {
    // Try XDG_RUNTIME_DIR first (most secure, tmpfs-backed)
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join("hybridfind.sock");
    }

    // Fall back to user's home directory
    if let Some(home) = dirs::home_dir() {
        return home.join(".local").join("run").join("hybridfind.sock");
    }

    // Last resort: /tmp with user ID
    let uid = unsafe { libc::getuid() };
    PathBuf::from(format!("/tmp/hybridfind-{}.sock", uid))
}

/// Index service reachable over a Unix socket
#[derive(Debug, Clone)]
pub struct SocketBackend {
    socket_path: PathBuf,
}

impl SocketBackend {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    /// Use the configured socket, or the per-user default
    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(config.socket_path.clone().unwrap_or_else(default_socket_path))
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl IndexedBackend for SocketBackend {
    fn connect(&self) -> Result<Box<dyn BackendSession>> {
        // Quick check if socket exists
        if !self.socket_path.exists() {
            return Err(SearchError::BackendUnreachable(format!(
                "no socket at {}",
                self.socket_path.display()
            )));
        }

        let stream = UnixStream::connect(&self.socket_path).map_err(|e| {
            SearchError::BackendUnreachable(format!("{}: {}", self.socket_path.display(), e))
        })?;
        let _ = stream.set_write_timeout(Some(WRITE_TIMEOUT));

        let mut session = SocketSession::new(stream)
            .map_err(|e| SearchError::BackendUnreachable(e.to_string()))?;

        // Ping to verify the service is actually answering
        session
            .ping()
            .map_err(|e| SearchError::BackendUnreachable(format!("ping failed: {}", e)))?;

        Ok(Box::new(session))
    }
}

/// One connection to the index service
pub struct SocketSession {
    reader: Arc<Mutex<BufReader<UnixStream>>>,
    writer: BufWriter<UnixStream>,
    /// Set while a query's answer hasn't been read to its terminal message
    in_flight: Arc<AtomicBool>,
}

impl SocketSession {
    fn new(stream: UnixStream) -> std::io::Result<Self> {
        let reader = BufReader::new(stream.try_clone()?);
        let writer = BufWriter::new(stream);
        Ok(Self {
            reader: Arc::new(Mutex::new(reader)),
            writer,
            in_flight: Arc::new(AtomicBool::new(false)),
        })
    }

    fn ping(&mut self) -> Result<()> {
        write_message(&mut self.writer, &Request::Ping)?;

        let mut reader = self
            .reader
            .lock()
            .map_err(|_| SearchError::Protocol("connection lock poisoned".to_string()))?;
        reader.get_ref().set_read_timeout(Some(PING_TIMEOUT))?;

        let response: Response = read_message(&mut *reader)?;
        match response {
            Response::Pong => Ok(()),
            Response::Error { message } => Err(SearchError::Query(message)),
            other => Err(SearchError::Protocol(format!("expected pong, got {:?}", other))),
        }
    }
}

impl BackendSession for SocketSession {
    fn execute(&mut self, query: &IndexQuery<'_>) -> Result<RowStream> {
        if self.in_flight.load(Ordering::SeqCst) {
            return Err(SearchError::Protocol(
                "previous query on this connection was not finished".to_string(),
            ));
        }

        {
            let reader = self
                .reader
                .lock()
                .map_err(|_| SearchError::Protocol("connection lock poisoned".to_string()))?;
            let read_timeout = if query.timeout_secs == 0 {
                None
            } else {
                Some(Duration::from_secs(query.timeout_secs) + READ_GRACE)
            };
            reader.get_ref().set_read_timeout(read_timeout)?;
        }

        let request = Request::Query {
            text: query.text.clone(),
            timeout_secs: query.timeout_secs,
            limit: query.limit,
        };
        write_message(&mut self.writer, &request)?;
        self.in_flight.store(true, Ordering::SeqCst);

        Ok(Box::new(SocketRowStream {
            reader: Arc::clone(&self.reader),
            in_flight: Arc::clone(&self.in_flight),
            done: false,
        }))
    }
}

/// Rows of one query, read from the connection as they are consumed
struct SocketRowStream {
    reader: Arc<Mutex<BufReader<UnixStream>>>,
    in_flight: Arc<AtomicBool>,
    done: bool,
}

impl SocketRowStream {
    fn finish(&mut self, clean: bool) {
        self.done = true;
        if clean {
            self.in_flight.store(false, Ordering::SeqCst);
        }
    }
}

impl Iterator for SocketRowStream {
    type Item = RowEvent;

    fn next(&mut self) -> Option<RowEvent> {
        if self.done {
            return None;
        }

        let message = match self.reader.lock() {
            Ok(mut reader) => Some(read_message::<_, Response>(&mut *reader)),
            Err(_) => None,
        };
        let Some(message) = message else {
            self.finish(false);
            return Some(RowEvent::Failed("connection lock poisoned".to_string()));
        };

        match message {
            Ok(Response::Row(row)) => Some(RowEvent::Row(row)),
            Ok(Response::End) => {
                self.finish(true);
                None
            }
            Ok(Response::Timeout) => {
                self.finish(true);
                Some(RowEvent::TimedOut)
            }
            Ok(Response::Error { message }) => {
                self.finish(true);
                Some(RowEvent::Failed(message))
            }
            Ok(Response::Pong) => {
                self.finish(false);
                Some(RowEvent::Failed("unexpected pong in row stream".to_string()))
            }
            // The service went quiet past the query timeout
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                self.finish(false);
                Some(RowEvent::TimedOut)
            }
            Err(e) => {
                self.finish(false);
                Some(RowEvent::Failed(format!("connection error: {}", e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_without_socket_is_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SocketBackend::new(dir.path().join("missing.sock"));
        match backend.connect() {
            Err(SearchError::BackendUnreachable(msg)) => assert!(msg.contains("missing.sock")),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("connected to a missing socket"),
        }
    }

    #[test]
    fn test_from_config_prefers_configured_socket() {
        let config = SearchConfig {
            socket_path: Some(PathBuf::from("/run/custom.sock")),
            ..SearchConfig::default()
        };
        let backend = SocketBackend::from_config(&config);
        assert_eq!(backend.socket_path(), Path::new("/run/custom.sock"));
    }

    fn row_stream(reader: UnixStream) -> SocketRowStream {
        SocketRowStream {
            reader: Arc::new(Mutex::new(BufReader::new(reader))),
            in_flight: Arc::new(AtomicBool::new(true)),
            done: false,
        }
    }

    #[test]
    fn test_row_stream_reads_until_end() {
        let (ours, mut theirs) = UnixStream::pair().unwrap();
        let row = crate::backend::Row {
            path: "/srv/a.jpg".to_string(),
            ..Default::default()
        };
        write_message(&mut theirs, &Response::Row(row)).unwrap();
        write_message(&mut theirs, &Response::End).unwrap();

        let mut stream = row_stream(ours);
        let in_flight = Arc::clone(&stream.in_flight);
        assert!(matches!(stream.next(), Some(RowEvent::Row(r)) if r.path == "/srv/a.jpg"));
        assert!(stream.next().is_none());
        assert!(stream.next().is_none());
        assert!(!in_flight.load(Ordering::SeqCst));
    }

    #[test]
    fn test_row_stream_poisoned_reader_fails_once() {
        let (ours, _theirs) = UnixStream::pair().unwrap();
        let mut stream = row_stream(ours);

        let reader = Arc::clone(&stream.reader);
        let _ = std::thread::spawn(move || {
            let _guard = reader.lock().unwrap();
            panic!("poison the reader");
        })
        .join();

        assert!(matches!(stream.next(), Some(RowEvent::Failed(msg)) if msg.contains("poisoned")));
        assert!(stream.next().is_none());
        // A broken connection keeps the session busy
        assert!(stream.in_flight.load(Ordering::SeqCst));
    }

    #[test]
    fn test_default_socket_path_has_name() {
        let path = default_socket_path();
        let name = path.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("hybridfind"));
        assert!(name.ends_with(".sock"));
    }
}
