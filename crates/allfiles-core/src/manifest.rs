//! Manifest filter pipeline
//!
//! A manifest is a recursive listing where each directory starts with a
//! `path:` header followed by one line per entry:
//!
//! ```text
//! ./videos:
//! drwxr-xr-x 4.0K clips
//! -rw-r--r-- 1.2G holiday 2019.mp4
//! ```
//!
//! The file is read line by line on a producer task and every entry that
//! passes the filter is handed over a bounded channel, so the manifest is
//! never held in memory and the producer waits for the consumer.

use crate::error::AllfilesError;
use crate::filter::EntryFilter;
use crate::size::parse_size;
use allfiles_types::{CoreEvent, FileEntry, FilterConfig};
use futures::Stream;
use std::borrow::Cow;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::SplitStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, warn};

/// What a single manifest line turned out to be
#[derive(Debug, PartialEq, Eq)]
enum Step {
    Header,
    Skipped,
    Rejected,
    Accepted(FileEntry),
    /// Entry line before any directory header
    Orphan,
}

/// Line state machine plus filter predicates
struct Scanner {
    filter: EntryFilter,
    current_directory: Option<String>,
    line: u64,
}

impl Scanner {
    fn new(filter: EntryFilter) -> Self {
        Self {
            filter,
            current_directory: None,
            line: 0,
        }
    }

    fn scan(&mut self, line: &str) -> Result<Step, AllfilesError> {
        self.line += 1;

        if let Some(directory) = line.strip_suffix(':') {
            // A bare `:` leaves no directory to resolve entries against
            self.current_directory = (!directory.is_empty()).then(|| directory.to_string());
            return Ok(Step::Header);
        }
        let Some(directory) = self.current_directory.as_deref() else {
            return Ok(Step::Orphan);
        };
        if line.is_empty() || line.starts_with('d') {
            return Ok(Step::Skipped);
        }
        // Checked before parsing so excluded trees never fail on their sizes
        if !self.filter.accepts_path(directory) {
            return Ok(Step::Rejected);
        }

        let mut parts = line.splitn(3, ' ');
        let (Some(_flags), Some(size), Some(name)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(AllfilesError::MalformedEntry {
                line: self.line,
                content: line.to_string(),
            });
        };
        let entry = FileEntry::new(directory, name, parse_size(size)?);

        if !self.filter.accepts_size(entry.size_bytes)
            || !self.filter.accepts_extension(&entry.extension())
        {
            return Ok(Step::Rejected);
        }
        Ok(Step::Accepted(entry))
    }
}

/// Builds filtered entry streams out of manifests
#[derive(Debug, Clone)]
pub struct ManifestFilter {
    filter: EntryFilter,
    event_tx: broadcast::Sender<CoreEvent>,
}

impl ManifestFilter {
    pub fn new(config: FilterConfig, event_tx: broadcast::Sender<CoreEvent>) -> Self {
        Self {
            filter: EntryFilter::new(config),
            event_tx,
        }
    }

    pub fn config(&self) -> &FilterConfig {
        self.filter.config()
    }

    /// Open a manifest file and start streaming its accepted entries.
    ///
    /// # Errors
    ///
    /// Returns [`AllfilesError::Manifest`] if the file cannot be opened.
    pub async fn open(&self, path: impl AsRef<Path>) -> Result<ManifestStream, AllfilesError> {
        let path = path.as_ref();
        let file = File::open(path).await.map_err(|source| AllfilesError::Manifest {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Reading manifest {}", path.display());
        Ok(self.stream(BufReader::new(file)))
    }

    /// Stream accepted entries out of any buffered reader.
    /// Must be called from within a tokio runtime.
    pub fn stream<R>(&self, reader: R) -> ManifestStream
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(1);
        let scanner = Scanner::new(self.filter.clone());
        tokio::spawn(produce(scanner, reader, tx, self.event_tx.clone()));
        ManifestStream { rx }
    }
}

async fn produce<R>(
    mut scanner: Scanner,
    reader: R,
    tx: mpsc::Sender<Result<FileEntry, AllfilesError>>,
    event_tx: broadcast::Sender<CoreEvent>,
) where
    R: AsyncBufRead + Unpin,
{
    let mut lines = SplitStream::new(reader.split(b'\n'));
    let mut accepted = 0u64;

    while let Some(raw) = lines.next().await {
        let step = raw.map_err(AllfilesError::from).and_then(|raw| {
            let text = decode_line(&raw, scanner.line + 1);
            scanner.scan(&text)
        });

        match step {
            Ok(Step::Accepted(entry)) => {
                accepted += 1;
                if tx.send(Ok(entry)).await.is_err() {
                    debug!("Manifest consumer went away at line {}", scanner.line);
                    return;
                }
            }
            Ok(Step::Orphan) => {
                let reason = "entry before any directory header".to_string();
                error!("Manifest truncated at line {}: {}", scanner.line, reason);
                let _ = event_tx.send(CoreEvent::ManifestTruncated {
                    line: scanner.line,
                    reason,
                });
                return;
            }
            Ok(Step::Header | Step::Skipped | Step::Rejected) => {}
            Err(e) => {
                error!("Manifest aborted at line {}: {}", scanner.line, e);
                let _ = tx.send(Err(e)).await;
                return;
            }
        }
    }

    debug!("Manifest finished: {} lines, {} accepted", scanner.line, accepted);
    let _ = event_tx.send(CoreEvent::ManifestFinished {
        lines: scanner.line,
        accepted,
    });
}

/// Listings come from arbitrary filesystems, so names are not always UTF-8.
/// Invalid bytes become U+FFFD and the line is still scanned.
fn decode_line(raw: &[u8], line: u64) -> Cow<'_, str> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let text = String::from_utf8_lossy(raw);
    if let Cow::Owned(_) = text {
        warn!("Line {} is not valid UTF-8, invalid bytes replaced", line);
    }
    text
}

/// Single-pass stream of accepted entries.
///
/// Yields an `Err` item only for fatal problems (unreadable input,
/// malformed entry or size); the stream ends right after it.
#[derive(Debug)]
pub struct ManifestStream {
    rx: mpsc::Receiver<Result<FileEntry, AllfilesError>>,
}

impl ManifestStream {
    /// Next accepted entry, `None` once the manifest is exhausted
    pub async fn next(&mut self) -> Option<Result<FileEntry, AllfilesError>> {
        self.rx.recv().await
    }
}

impl Stream for ManifestStream {
    type Item = Result<FileEntry, AllfilesError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{normalize_extensions, FilterSettings};
    use std::io::Write;
    use std::time::Duration;
    use tokio_test::io::Builder;

    fn manifest_filter(config: FilterConfig) -> (ManifestFilter, broadcast::Receiver<CoreEvent>) {
        let (event_tx, event_rx) = broadcast::channel(16);
        (ManifestFilter::new(config, event_tx), event_rx)
    }

    async fn collect(mut stream: ManifestStream) -> Vec<Result<FileEntry, AllfilesError>> {
        let mut items = Vec::new();
        while let Some(item) = stream.next().await {
            items.push(item);
        }
        items
    }

    /// Mock input; must be read to the end
    fn reader(text: &str) -> BufReader<tokio_test::io::Mock> {
        BufReader::new(Builder::new().read(text.as_bytes()).build())
    }

    /// For streams that stop before the end of input
    fn cursor(text: &str) -> std::io::Cursor<Vec<u8>> {
        std::io::Cursor::new(text.as_bytes().to_vec())
    }

    const MANIFEST: &str = "\
./media:
drwxr-xr-x 4.0K clips
-rw-r--r-- 2M intro.mp4
-rw-r--r-- 12K notes.txt

-rw-r--r-- 1.5M outro final.MP4
./media/clips:
-rw-r--r-- 0 empty.mp4
-rw-r--r-- 512 tiny.mp4
";

    #[test]
    fn test_scanner_steps() {
        let mut scanner = Scanner::new(EntryFilter::new(FilterConfig::default()));
        assert_eq!(scanner.scan("-rw 1K a.txt").unwrap(), Step::Orphan);
        assert_eq!(scanner.scan("./a:").unwrap(), Step::Header);
        assert_eq!(scanner.scan("").unwrap(), Step::Skipped);
        assert_eq!(scanner.scan("drwx 4.0K sub").unwrap(), Step::Skipped);
        assert_eq!(
            scanner.scan("-rw 1K my report.pdf").unwrap(),
            Step::Accepted(FileEntry::new("./a", "my report.pdf", 1024))
        );
        assert_eq!(scanner.scan("-rw 0 empty").unwrap(), Step::Rejected);
        assert_eq!(scanner.line, 6);
    }

    #[test]
    fn test_scanner_malformed_lines() {
        let mut scanner = Scanner::new(EntryFilter::new(FilterConfig::default()));
        scanner.scan("./a:").unwrap();
        assert!(matches!(
            scanner.scan("-rw-only-two 1K"),
            Err(AllfilesError::MalformedEntry { line: 2, .. })
        ));
        assert!(matches!(
            scanner.scan("-rw 12Q name.bin"),
            Err(AllfilesError::InvalidSize(_))
        ));
    }

    #[test]
    fn test_bare_colon_header_has_no_directory() {
        let mut scanner = Scanner::new(EntryFilter::new(FilterConfig::default()));
        assert_eq!(scanner.scan("./a:").unwrap(), Step::Header);
        assert_eq!(scanner.scan(":").unwrap(), Step::Header);
        assert_eq!(scanner.scan("-rw 1K a.bin").unwrap(), Step::Orphan);
    }

    #[test]
    fn test_excluded_path_never_parses_size() {
        let mut scanner = Scanner::new(EntryFilter::new(FilterConfig {
            exclude_path_prefixes: ["tmp/".to_string()].into(),
            ..Default::default()
        }));
        scanner.scan("tmp/x:").unwrap();
        assert_eq!(scanner.scan("-rw ??? broken").unwrap(), Step::Rejected);
    }

    #[tokio::test]
    async fn test_stream_default_filter_keeps_order() {
        let (filter, _events) = manifest_filter(FilterConfig::default());
        let entries: Vec<_> = collect(filter.stream(reader(MANIFEST)))
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();

        let paths: Vec<_> = entries.iter().map(FileEntry::full_path).collect();
        assert_eq!(
            paths,
            vec![
                "media/intro.mp4",
                "media/notes.txt",
                "media/outro final.MP4",
                "media/clips/tiny.mp4",
            ]
        );
        assert_eq!(entries[2].size_bytes, 1572864);
    }

    #[tokio::test]
    async fn test_stream_include_extension() {
        let (filter, _events) = manifest_filter(FilterConfig {
            include_extensions: normalize_extensions(&["mp4"]),
            ..Default::default()
        });
        let names: Vec<_> = collect(filter.stream(reader(MANIFEST)))
            .await
            .into_iter()
            .map(|e| e.unwrap().file_name)
            .collect();
        assert_eq!(names, vec!["intro.mp4", "outro final.MP4", "tiny.mp4"]);
    }

    #[tokio::test]
    async fn test_stream_size_and_path_filters() {
        let config = FilterSettings {
            min_size: "1K".to_string(),
            max_size: Some("1.5M".to_string()),
            exclude_paths: vec!["./media/clips".to_string()],
            ..Default::default()
        }
        .resolve()
        .unwrap();
        let (filter, _events) = manifest_filter(config);
        let names: Vec<_> = collect(filter.stream(reader(MANIFEST)))
            .await
            .into_iter()
            .map(|e| e.unwrap().file_name)
            .collect();
        assert_eq!(names, vec!["notes.txt", "outro final.MP4"]);
    }

    #[tokio::test]
    async fn test_orphan_entry_truncates_stream() {
        let (filter, mut events) = manifest_filter(FilterConfig::default());
        let items = collect(filter.stream(reader("a:\n-rw 1K a.bin\n"))).await;
        assert_eq!(items.len(), 1);

        let (filter, mut events2) = manifest_filter(FilterConfig::default());
        let items = collect(filter.stream(cursor("-rw 1K a.bin\na:\n-rw 1K b.bin\n"))).await;
        assert!(items.is_empty());
        assert!(matches!(
            events2.recv().await.unwrap(),
            CoreEvent::ManifestTruncated { line: 1, .. }
        ));
        assert_eq!(
            events.recv().await.unwrap(),
            CoreEvent::ManifestFinished { lines: 2, accepted: 1 }
        );
    }

    #[tokio::test]
    async fn test_malformed_size_ends_with_error() {
        let (filter, _events) = manifest_filter(FilterConfig::default());
        let text = "a:\n-rw 1K ok.bin\n-rw lots bad.bin\n-rw 1K never.bin\n";
        let items = collect(filter.stream(cursor(text))).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap().file_name, "ok.bin");
        assert!(matches!(items[1], Err(AllfilesError::InvalidSize(_))));
    }

    #[tokio::test]
    async fn test_non_utf8_name_does_not_end_stream() {
        let (filter, mut events) = manifest_filter(FilterConfig::default());
        let mut bytes = b"a:\r\n-rw 1K good1.bin\n-rw 1K caf".to_vec();
        bytes.extend_from_slice(b"\xE9.bin\n-rw 1K good2.bin\n");
        let items = collect(filter.stream(std::io::Cursor::new(bytes))).await;

        let names: Vec<_> = items.into_iter().map(|e| e.unwrap().file_name).collect();
        assert_eq!(names, vec!["good1.bin", "caf\u{FFFD}.bin", "good2.bin"]);
        assert_eq!(
            events.recv().await.unwrap(),
            CoreEvent::ManifestFinished { lines: 4, accepted: 3 }
        );
    }

    #[test]
    fn test_decode_line_strips_carriage_return() {
        assert_eq!(decode_line(b"./a b:\r", 1), "./a b:");
        assert_eq!(decode_line(b"-rw 1 \xFF", 2), "-rw 1 \u{FFFD}");
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let (filter, _events) = manifest_filter(FilterConfig::default());
        let err = filter.open("/definitely/not/here/ALL_FILES").await.unwrap_err();
        assert!(matches!(err, AllfilesError::Manifest { .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_open_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MANIFEST.as_bytes()).unwrap();
        let (filter, _events) = manifest_filter(FilterConfig::default());
        let items = collect(filter.open(file.path()).await.unwrap()).await;
        assert_eq!(items.len(), 4);
    }

    #[tokio::test]
    async fn test_dropping_stream_stops_producer() {
        let text: String = std::iter::once("a:\n".to_string())
            .chain((0..1000).map(|i| format!("-rw 1K f{i}.bin\n")))
            .collect();
        let (filter, mut events) = manifest_filter(FilterConfig::default());
        let mut stream = filter.stream(cursor(&text));
        assert_eq!(stream.next().await.unwrap().unwrap().file_name, "f0.bin");
        drop(stream);
        drop(filter);

        // The producer holds the last event sender; it must return early,
        // without reaching the end of the listing
        let next = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap();
        assert_eq!(next, Err(broadcast::error::RecvError::Closed));
    }
}
