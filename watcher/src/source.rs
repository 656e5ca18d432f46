use bytes::{Buf, Bytes, BytesMut};
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use zonewatch_common::config::{SourceConfig, SourceMode};

const BOUNDARY: &[u8] = b"--frame\r\n";
const HEADER_END: &[u8] = b"\r\n\r\n";
const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// What a frame source hands to the detection loop.
#[derive(Debug)]
pub enum SourceEvent {
    /// One encoded image (JPEG or PNG).
    Frame(Bytes),
    /// The source reconnected; frames before and after are not consecutive.
    Restarted,
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("HTTP connection failed: {0}")]
    HttpConnect(reqwest::Error),
    #[error("HTTP stream error: {0}")]
    HttpStream(reqwest::Error),
    #[error("HTTP status {0}")]
    HttpStatus(u16),
    #[error("failed to read {0}: {1}")]
    Io(String, std::io::Error),
}

/// Start the configured source on the runtime. The task ends when the source
/// is exhausted (directory mode) or the receiver is dropped.
pub fn spawn_source(config: SourceConfig, tx: mpsc::Sender<SourceEvent>) -> JoinHandle<()> {
    let interval = config.frame_interval();
    tokio::spawn(async move {
        match config.mode {
            SourceMode::Mjpeg => run_mjpeg_source(&config.url, &tx).await,
            SourceMode::Polling => run_polling_source(&config.url, interval, &tx).await,
            SourceMode::Directory => {
                if let Err(e) = run_directory_source(Path::new(&config.path), interval, &tx).await {
                    error!(error = %e, "directory source failed");
                }
            }
        }
    })
}

// =========================================================================
// MJPEG multipart stream
// =========================================================================

/// Parse state for the MJPEG multipart stream.
enum ParseState {
    /// Looking for the boundary marker `--frame\r\n`.
    SeekingBoundary,
    /// Found boundary, now looking for end of part headers `\r\n\r\n`.
    SeekingHeaderEnd,
    /// Collecting image bytes until the next boundary.
    CollectingImage,
}

/// Incremental splitter for `multipart/x-mixed-replace` MJPEG bodies.
pub struct MjpegParser {
    buffer: BytesMut,
    state: ParseState,
    /// Offset in `buffer` from which the next boundary search starts.
    scan_from: usize,
}

impl Default for MjpegParser {
    fn default() -> Self {
        Self::new()
    }
}

impl MjpegParser {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(256 * 1024),
            state: ParseState::SeekingBoundary,
            scan_from: 0,
        }
    }

    /// Append a chunk of the HTTP body and return every image it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.buffer.extend_from_slice(chunk);
        let mut images = Vec::new();

        loop {
            match self.state {
                ParseState::SeekingBoundary => match find_subsequence(&self.buffer, BOUNDARY) {
                    Some(pos) => {
                        self.buffer.advance(pos + BOUNDARY.len());
                        self.state = ParseState::SeekingHeaderEnd;
                    }
                    None => {
                        // Keep a tail in case the boundary spans chunks.
                        let keep = BOUNDARY.len() - 1;
                        if self.buffer.len() > keep {
                            self.buffer.advance(self.buffer.len() - keep);
                        }
                        return images;
                    }
                },
                ParseState::SeekingHeaderEnd => match find_subsequence(&self.buffer, HEADER_END) {
                    Some(pos) => {
                        self.buffer.advance(pos + HEADER_END.len());
                        self.scan_from = 0;
                        self.state = ParseState::CollectingImage;
                    }
                    None => return images,
                },
                ParseState::CollectingImage => {
                    match find_subsequence(&self.buffer[self.scan_from..], BOUNDARY) {
                        Some(pos) => {
                            let mut image = self.buffer.split_to(self.scan_from + pos);
                            self.buffer.advance(BOUNDARY.len());
                            if image.ends_with(b"\r\n") {
                                image.truncate(image.len() - 2);
                            }
                            if !image.is_empty() {
                                images.push(image.freeze());
                            }
                            self.state = ParseState::SeekingHeaderEnd;
                        }
                        None => {
                            self.scan_from = self.buffer.len().saturating_sub(BOUNDARY.len() - 1);
                            return images;
                        }
                    }
                }
            }
        }
    }
}

/// Consume an MJPEG stream, reconnecting with exponential backoff.
/// Returns once the receiver is gone.
pub async fn run_mjpeg_source(stream_url: &str, tx: &mpsc::Sender<SourceEvent>) {
    let mut backoff = Duration::from_secs(2);
    let max_backoff = Duration::from_secs(30);
    let mut first = true;

    loop {
        if !first && tx.send(SourceEvent::Restarted).await.is_err() {
            return;
        }
        first = false;

        info!(url = stream_url, "connecting to MJPEG stream");
        match consume_stream(stream_url, tx).await {
            Ok(true) => {
                info!("stream ended cleanly, reconnecting");
                backoff = Duration::from_secs(2);
            }
            Ok(false) => {
                debug!("frame receiver closed, stopping MJPEG source");
                return;
            }
            Err(e) => {
                error!(error = %e, "stream error, reconnecting in {:?}", backoff);
            }
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(max_backoff);
    }
}

/// Returns `Ok(false)` when the receiver went away.
async fn consume_stream(url: &str, tx: &mpsc::Sender<SourceEvent>) -> Result<bool, SourceError> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(SourceError::HttpConnect)?;
    let response = client
        .get(url)
        .send()
        .await
        .map_err(SourceError::HttpConnect)?;

    if !response.status().is_success() {
        return Err(SourceError::HttpStatus(response.status().as_u16()));
    }
    info!(status = %response.status(), "connected to MJPEG stream");

    let mut byte_stream = response.bytes_stream();
    let mut parser = MjpegParser::new();

    while let Some(chunk) = byte_stream.next().await {
        let chunk = chunk.map_err(SourceError::HttpStream)?;
        for image in parser.push(&chunk) {
            debug!(bytes = image.len(), "MJPEG frame received");
            if tx.send(SourceEvent::Frame(image)).await.is_err() {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

// =========================================================================
// Snapshot polling
// =========================================================================

/// Fetch a single snapshot every `interval`. A success after any failure is
/// reported as a restart so the detector re-baselines.
pub async fn run_polling_source(
    frame_url: &str,
    interval: Duration,
    tx: &mpsc::Sender<SourceEvent>,
) {
    let client = reqwest::Client::new();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut interrupted = false;

    info!(url = frame_url, ?interval, "polling camera snapshots");
    loop {
        ticker.tick().await;

        let event = match fetch_snapshot(&client, frame_url).await {
            Ok(image) => {
                if interrupted {
                    info!("camera reachable again");
                    if tx.send(SourceEvent::Restarted).await.is_err() {
                        return;
                    }
                    interrupted = false;
                }
                SourceEvent::Frame(image)
            }
            Err(e) => {
                if !interrupted {
                    warn!(error = %e, "failed to fetch camera frame");
                }
                interrupted = true;
                continue;
            }
        };

        if tx.send(event).await.is_err() {
            return;
        }
    }
}

async fn fetch_snapshot(client: &reqwest::Client, url: &str) -> Result<Bytes, SourceError> {
    let resp = client.get(url).send().await.map_err(SourceError::HttpConnect)?;
    if !resp.status().is_success() {
        return Err(SourceError::HttpStatus(resp.status().as_u16()));
    }
    resp.bytes().await.map_err(SourceError::HttpStream)
}

// =========================================================================
// Directory replay
// =========================================================================

/// Image files in `dir`, sorted by file name.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>, SourceError> {
    let entries =
        std::fs::read_dir(dir).map_err(|e| SourceError::Io(dir.display().to_string(), e))?;
    let mut images: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    images.sort();
    Ok(images)
}

/// Replay every image in `dir` at `interval`, then stop.
pub async fn run_directory_source(
    dir: &Path,
    interval: Duration,
    tx: &mpsc::Sender<SourceEvent>,
) -> Result<(), SourceError> {
    let images = list_images(dir)?;
    info!(dir = dir.display().to_string(), count = images.len(), "replaying image directory");

    let mut ticker = tokio::time::interval(interval);
    for path in images {
        ticker.tick().await;
        let data = match tokio::fs::read(&path).await {
            Ok(d) => d,
            Err(e) => {
                warn!(
                    path = path.display().to_string(),
                    error = %e,
                    "failed to read image, skipping"
                );
                continue;
            }
        };
        if tx.send(SourceEvent::Frame(Bytes::from(data))).await.is_err() {
            break;
        }
    }
    info!("image directory exhausted");
    Ok(())
}

/// Find the position of `needle` in `haystack`.
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
