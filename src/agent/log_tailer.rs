// File tailing: seek to EOF, follow appends, reopen on rotation

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader, SeekFrom};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::models::{LogLevel, LogLine};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Pluggable line-to-record conversion. Format-specific parsers (web access
/// logs etc.) implement this; the default builds a plain record with the
/// heuristic level.
pub trait LogTransformer: Send + Sync {
    fn transform(&self, path: &str, service: &str, raw: &str) -> Option<LogLine>;
}

fn default_line(path: &str, service: &str, raw: &str) -> LogLine {
    LogLine {
        source_path: path.to_string(),
        service: service.to_string(),
        host: String::new(),
        timestamp: Utc::now(),
        level: LogLevel::classify(raw),
        message: raw.to_string(),
    }
}

#[cfg(unix)]
async fn inode_of(path: &PathBuf) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    tokio::fs::metadata(path).await.ok().map(|m| m.ino())
}

#[cfg(not(unix))]
async fn inode_of(_path: &PathBuf) -> Option<u64> {
    None
}

/// Tail one file forever. Starts at EOF so a restart never backfills old
/// lines; rotation (inode change or truncation) reopens from the start of
/// the new file. Lines block on the channel when it is full.
pub async fn tail_file(
    path: PathBuf,
    service: String,
    out: mpsc::Sender<LogLine>,
    transformer: Option<Arc<dyn LogTransformer>>,
) {
    let path_str = path.to_string_lossy().into_owned();
    let mut file = match File::open(&path).await {
        Ok(f) => f,
        Err(e) => {
            warn!("cannot tail {}: {}", path_str, e);
            return;
        }
    };
    if let Err(e) = file.seek(SeekFrom::End(0)).await {
        warn!("cannot seek {}: {}", path_str, e);
        return;
    }
    let mut inode = inode_of(&path).await;
    let mut reader = BufReader::new(file);
    let mut pos = reader
        .stream_position()
        .await
        .unwrap_or(0);

    loop {
        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                tokio::time::sleep(POLL_INTERVAL).await;
                // rotation: new inode, or the file shrank under us
                let current_inode = inode_of(&path).await;
                let current_len = tokio::fs::metadata(&path).await.map(|m| m.len()).ok();
                let rotated = (current_inode.is_some() && current_inode != inode)
                    || current_len.is_some_and(|len| len < pos);
                if rotated {
                    debug!("log rotated, reopening {}", path_str);
                    match File::open(&path).await {
                        Ok(f) => {
                            reader = BufReader::new(f);
                            inode = current_inode;
                            pos = 0;
                        }
                        Err(e) => warn!("reopen {} failed: {}", path_str, e),
                    }
                }
            }
            Ok(n) => {
                pos += n as u64;
                let trimmed = line.trim_end_matches(['\n', '\r']);
                if trimmed.is_empty() {
                    continue;
                }
                let record = match &transformer {
                    Some(t) => match t.transform(&path_str, &service, trimmed) {
                        Some(r) => r,
                        None => continue,
                    },
                    None => default_line(&path_str, &service, trimmed),
                };
                if out.send(record).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                warn!("read error on {}: {}", path_str, e);
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn tail_emits_only_lines_appended_after_start() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        {
            let mut f = std::fs::File::create(&path).unwrap();
            writeln!(f, "old line that must not be emitted").unwrap();
        }

        let (tx, mut rx) = mpsc::channel(16);
        let handle = tokio::spawn(tail_file(path.clone(), "app".into(), tx, None));

        // give the tailer time to open and seek to EOF
        tokio::time::sleep(Duration::from_millis(200)).await;
        {
            let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            writeln!(f, "fresh ERROR line").unwrap();
        }

        let got = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for line")
            .expect("channel closed");
        assert_eq!(got.message, "fresh ERROR line");
        assert_eq!(got.level, LogLevel::Error);
        assert_eq!(got.service, "app");
        handle.abort();
    }
}
