//! Loopback feed delivering observed portal traffic to the observer.
//!
//! A browser-side companion posts one JSON object per observed portal
//! request, newline-delimited, to this listener. Each connection is read on
//! its own thread; a malformed line is dropped without closing the
//! connection. The listener lives for the process lifetime.

use std::io::{self, BufRead, BufReader};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use crate::observer::{TrafficObserver, TrafficRecord};

/// Default bind address for the capture feed.
pub const DEFAULT_FEED_ADDR: &str = "127.0.0.1:48719";

/// Handle to a running capture feed listener.
pub struct CaptureFeed {
    local_addr: SocketAddr,
}

impl CaptureFeed {
    /// Address the listener actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// Bind `addr` and start accepting feed connections in the background.
pub fn spawn(addr: &str, observer: Arc<TrafficObserver>) -> io::Result<CaptureFeed> {
    let listener = TcpListener::bind(addr)?;
    let local_addr = listener.local_addr()?;
    tracing::info!(%local_addr, "capture feed listening");
    thread::spawn(move || accept_loop(listener, observer));
    Ok(CaptureFeed { local_addr })
}

fn accept_loop(listener: TcpListener, observer: Arc<TrafficObserver>) {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let observer = Arc::clone(&observer);
                thread::spawn(move || serve_connection(stream, observer));
            }
            Err(err) => {
                tracing::debug!("capture feed accept failed: {err}");
            }
        }
    }
}

fn serve_connection(stream: TcpStream, observer: Arc<TrafficObserver>) {
    let reader = BufReader::new(stream);
    for line in reader.lines() {
        match line {
            Ok(line) => handle_line(&line, &observer),
            Err(err) => {
                tracing::debug!("capture feed connection closed: {err}");
                break;
            }
        }
    }
}

fn handle_line(line: &str, observer: &TrafficObserver) {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return;
    }
    match serde_json::from_str::<TrafficRecord>(trimmed) {
        Ok(record) => observer.observe(&record),
        Err(err) => {
            tracing::debug!("discarding malformed capture record: {err}");
        }
    }
}
