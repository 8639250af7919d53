//! Telemetry correlation for captured frames.
//!
//! Frame sources attach a `Telemetry` record to every frame they build. The
//! pipeline core never calls a `MetadataSource` directly; it only carries the
//! record along with the frame and copies it into each detection.
//!
//! Two sources exist:
//! - `FileMetadataSource`: a recorded log, matched to frames by nearest timestamp
//! - `NetworkMetadataSource`: a live TCP feed, where the latest record wins
//!
//! Both read the same line format: `epoch_ms,lat,lon,alt,heading`.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader};
use std::net::TcpStream;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

/// One positional sample.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub timestamp_ms: u64,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub heading: f64,
}

impl Telemetry {
    /// Parse one `epoch_ms,lat,lon,alt,heading` line.
    pub fn parse_line(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split(',').map(|field| field.trim()).collect();
        if fields.len() != 5 {
            return Err(anyhow!(
                "telemetry record must have 5 fields, got {}",
                fields.len()
            ));
        }
        let timestamp_ms = fields[0]
            .parse()
            .map_err(|_| anyhow!("invalid telemetry timestamp {:?}", fields[0]))?;
        let number = |idx: usize, name: &str| -> Result<f64> {
            fields[idx]
                .parse()
                .map_err(|_| anyhow!("invalid telemetry {} {:?}", name, fields[idx]))
        };
        Ok(Self {
            timestamp_ms,
            latitude: number(1, "latitude")?,
            longitude: number(2, "longitude")?,
            altitude: number(3, "altitude")?,
            heading: number(4, "heading")?,
        })
    }
}

/// Supplies telemetry for a frame at construction time.
pub trait MetadataSource: Send + Sync {
    /// Telemetry best matching a capture instant, if any is known.
    fn metadata_at(&self, captured_at: SystemTime) -> Option<Telemetry>;
}

/// Telemetry replayed from a recorded log file.
#[derive(Debug)]
pub struct FileMetadataSource {
    records: Vec<Telemetry>,
}

impl FileMetadataSource {
    pub fn open(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read telemetry log {}", path.display()))?;
        Self::from_log(&raw)
            .with_context(|| format!("invalid telemetry log {}", path.display()))
    }

    /// Parse a whole log. Blank lines, `#` comments and a leading header row are skipped.
    pub fn from_log(raw: &str) -> Result<Self> {
        let mut records = Vec::new();
        for (idx, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if records.is_empty() && is_header(line) {
                continue;
            }
            let record =
                Telemetry::parse_line(line).with_context(|| format!("line {}", idx + 1))?;
            records.push(record);
        }
        records.sort_by_key(|record| record.timestamp_ms);
        log::info!("telemetry log loaded: {} records", records.len());
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl MetadataSource for FileMetadataSource {
    fn metadata_at(&self, captured_at: SystemTime) -> Option<Telemetry> {
        let target = epoch_ms(captured_at);
        let idx = self
            .records
            .partition_point(|record| record.timestamp_ms < target);
        let after = self.records.get(idx);
        let before = idx.checked_sub(1).and_then(|i| self.records.get(i));
        match (before, after) {
            (Some(b), Some(a)) => {
                if target - b.timestamp_ms <= a.timestamp_ms - target {
                    Some(b.clone())
                } else {
                    Some(a.clone())
                }
            }
            (Some(only), None) | (None, Some(only)) => Some(only.clone()),
            (None, None) => None,
        }
    }
}

/// Telemetry streamed over TCP, one record per line.
pub struct NetworkMetadataSource {
    latest: Arc<Mutex<Option<Telemetry>>>,
    peer: String,
}

impl NetworkMetadataSource {
    pub fn connect(addr: &str, port: &str) -> Result<Self> {
        let port: u16 = port
            .parse()
            .map_err(|_| anyhow!("telemetry port must be a number, got {:?}", port))?;
        let peer = format!("{}:{}", addr, port);
        let stream = TcpStream::connect((addr, port))
            .with_context(|| format!("failed to connect to telemetry feed {}", peer))?;
        log::info!("telemetry feed connected: {}", peer);

        let latest = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&latest);
        let reader_peer = peer.clone();
        std::thread::Builder::new()
            .name("telemetry-reader".into())
            .spawn(move || read_feed(stream, sink, &reader_peer))
            .context("failed to spawn telemetry reader")?;

        Ok(Self { latest, peer })
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }
}

impl MetadataSource for NetworkMetadataSource {
    fn metadata_at(&self, _captured_at: SystemTime) -> Option<Telemetry> {
        self.latest.lock().ok().and_then(|latest| latest.clone())
    }
}

fn read_feed(stream: TcpStream, latest: Arc<Mutex<Option<Telemetry>>>, peer: &str) {
    for line in BufReader::new(stream).lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                log::error!("telemetry feed {} read failed: {}", peer, e);
                return;
            }
        };
        match Telemetry::parse_line(&line) {
            Ok(record) => {
                if let Ok(mut slot) = latest.lock() {
                    *slot = Some(record);
                }
            }
            Err(e) => log::debug!("telemetry feed {}: skipping record: {}", peer, e),
        }
    }
    log::warn!("telemetry feed {} closed", peer);
}

fn is_header(line: &str) -> bool {
    line.split(',')
        .next()
        .is_some_and(|first| first.trim().parse::<u64>().is_err())
}

pub(crate) fn epoch_ms(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;
    use std::time::Duration;

    const LOG: &str = "epoch_ms,lat,lon,alt,heading\n\
                       # recorded on the test range\n\
                       3000,43.47,-80.54,120.0,90.0\n\
                       1000,43.46,-80.53,100.0,45.0\n\
                       \n\
                       2000,43.465,-80.535,110.0,60.0\n";

    fn at_ms(ms: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(ms)
    }

    #[test]
    fn parses_log_and_skips_header_and_comments() -> Result<()> {
        let source = FileMetadataSource::from_log(LOG)?;
        assert_eq!(source.len(), 3);
        Ok(())
    }

    #[test]
    fn picks_nearest_record() -> Result<()> {
        let source = FileMetadataSource::from_log(LOG)?;
        assert_eq!(source.metadata_at(at_ms(0)).unwrap().timestamp_ms, 1000);
        assert_eq!(source.metadata_at(at_ms(1400)).unwrap().timestamp_ms, 1000);
        assert_eq!(source.metadata_at(at_ms(1600)).unwrap().timestamp_ms, 2000);
        assert_eq!(source.metadata_at(at_ms(9000)).unwrap().timestamp_ms, 3000);
        Ok(())
    }

    #[test]
    fn empty_log_yields_no_metadata() -> Result<()> {
        let source = FileMetadataSource::from_log("")?;
        assert!(source.is_empty());
        assert!(source.metadata_at(SystemTime::now()).is_none());
        Ok(())
    }

    #[test]
    fn rejects_malformed_record() {
        let err = FileMetadataSource::from_log("1000,43.0,-80.0\n").unwrap_err();
        assert!(format!("{:#}", err).contains("5 fields"));
    }

    #[test]
    fn network_source_tracks_latest_record() -> Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port().to_string();
        let server = std::thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            conn.write_all(b"1000,1.0,2.0,3.0,4.0\ngarbage\n2000,5.0,6.0,7.0,8.0\n")
                .unwrap();
        });

        let source = NetworkMetadataSource::connect("127.0.0.1", &port)?;
        server.join().unwrap();

        let mut latest = None;
        for _ in 0..100 {
            latest = source.metadata_at(SystemTime::now());
            if latest.as_ref().is_some_and(|t| t.timestamp_ms == 2000) {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(latest.unwrap().latitude, 5.0);
        Ok(())
    }

    #[test]
    fn network_source_rejects_bad_port() {
        assert!(NetworkMetadataSource::connect("127.0.0.1", "port").is_err());
    }
}
