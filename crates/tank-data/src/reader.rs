//! Raw feed access: CSV files on disk and CSV over HTTP.
//!
//! Everything here returns an untyped [`RawTable`]; interpretation of the
//! columns belongs to the normalizer.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tank_core::error::{Result, TankError};
use tank_core::models::{SourceLocation, TankSource};
use tracing::{debug, warn};

const UTF8_BOM: char = '\u{feff}';

// ── RawTable ──────────────────────────────────────────────────────────────────

/// Header row plus string cells, exactly as read from the source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ── FeedReader ────────────────────────────────────────────────────────────────

/// Anything that can turn a [`SourceLocation`] into a [`RawTable`].
///
/// Implementations block until the source has been read.
pub trait FeedReader: Send + Sync {
    fn read(&self, location: &SourceLocation) -> Result<RawTable>;
}

/// Reads local files directly and fetches URLs with a blocking HTTP client.
#[derive(Debug, Clone)]
pub struct CsvFeedReader {
    timeout: Duration,
}

impl CsvFeedReader {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn fetch_url(&self, url: &str) -> Result<RawTable> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| TankError::fetch(url, e))?;

        let response = client
            .get(url)
            .header("Accept", "text/csv")
            .send()
            .map_err(|e| TankError::fetch_transient(url, e))?;

        if !response.status().is_success() {
            return Err(status_error(url, response.status()));
        }

        let body = response
            .text()
            .map_err(|e| TankError::fetch_transient(url, e))?;
        debug!("fetched {} bytes from {}", body.len(), url);
        parse_csv(&body, url)
    }
}

/// Server errors and 429 may clear up on retry; other statuses will not.
fn status_error(url: &str, status: reqwest::StatusCode) -> TankError {
    let reason = format!("HTTP {}", status);
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        TankError::fetch_transient(url, reason)
    } else {
        TankError::fetch(url, reason)
    }
}

impl Default for CsvFeedReader {
    fn default() -> Self {
        Self::new(Duration::from_secs(20))
    }
}

impl FeedReader for CsvFeedReader {
    fn read(&self, location: &SourceLocation) -> Result<RawTable> {
        match location {
            SourceLocation::File(path) => read_csv_file(path),
            SourceLocation::Url(url) => self.fetch_url(url),
        }
    }
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse CSV text (optionally BOM-prefixed) into a [`RawTable`].
///
/// Ragged rows are accepted; cells are trimmed. A malformed document is a
/// [`TankError::Fetch`] against `location`.
pub fn parse_csv(text: &str, location: &str) -> Result<RawTable> {
    let text = text.strip_prefix(UTF8_BOM).unwrap_or(text);

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| TankError::fetch(location, format!("malformed CSV header: {}", e)))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record
            .map_err(|e| TankError::fetch(location, format!("malformed CSV row {}: {}", i + 1, e)))?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    debug!("{}: {} columns, {} rows", location, headers.len(), rows.len());
    Ok(RawTable::new(headers, rows))
}

/// Read a UTF-8 CSV file from disk.
pub fn read_csv_file(path: &Path) -> Result<RawTable> {
    let location = path.display().to_string();
    let bytes = std::fs::read(path).map_err(|e| TankError::fetch(&location, e))?;
    let text = String::from_utf8(bytes)
        .map_err(|e| TankError::fetch(&location, format!("not valid UTF-8: {}", e)))?;
    parse_csv(&text, &location)
}

// ── Discovery ─────────────────────────────────────────────────────────────────

/// Find all `.csv` files recursively under `dir`, sorted by path.
pub fn find_csv_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        warn!("Data directory does not exist: {}", dir.display());
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("csv"))
                    .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    files
}

/// One file-mode tank per CSV under `dir`, named after the file stem.
///
/// Stems already present in `known` are skipped so configured tanks keep
/// their settings.
pub fn discover_tanks(dir: &Path, capacity: f64, known: &[TankSource]) -> Vec<TankSource> {
    let mut found = Vec::new();
    for path in find_csv_files(dir) {
        let Some(id) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
            continue;
        };
        if known.iter().chain(found.iter()).any(|t: &TankSource| t.id == id) {
            debug!("skipping {}: tank {} already configured", path.display(), id);
            continue;
        }
        found.push(TankSource {
            id,
            location: SourceLocation::File(path),
            capacity,
        });
    }
    found
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    // ── parse_csv ─────────────────────────────────────────────────────────────

    #[test]
    fn test_parse_csv_headers_and_rows() {
        let table = parse_csv(
            "created_at,entry_id,field1\n2024-01-15 08:00:00 UTC,1,50\n2024-01-15 09:00:00 UTC,2,80\n",
            "mem",
        )
        .unwrap();
        assert_eq!(table.headers(), &["created_at", "entry_id", "field1"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[1][2], "80");
    }

    #[test]
    fn test_parse_csv_strips_bom() {
        let table = parse_csv("\u{feff}created_at,field1\nx,1\n", "mem").unwrap();
        assert_eq!(table.headers()[0], "created_at");
    }

    #[test]
    fn test_parse_csv_trims_cells_and_accepts_ragged_rows() {
        let table = parse_csv(" Created_At , field1 \n a , 1 \nb\n", "mem").unwrap();
        assert_eq!(table.headers(), &["Created_At", "field1"]);
        assert_eq!(table.rows()[0], vec!["a".to_string(), "1".to_string()]);
        assert_eq!(table.rows()[1], vec!["b".to_string()]);
    }

    #[test]
    fn test_parse_csv_empty_text() {
        let table = parse_csv("", "mem").unwrap();
        assert!(table.headers().is_empty());
        assert!(table.is_empty());
    }

    // ── read_csv_file ─────────────────────────────────────────────────────────

    #[test]
    fn test_read_csv_file() {
        let tmp = TempDir::new().unwrap();
        let path = write_file(tmp.path(), "t.csv", "created_at,field1\n2024-01-15,10\n");
        let table = read_csv_file(&path).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_read_missing_file_is_fetch_error() {
        let err = read_csv_file(Path::new("/no/such/tank.csv")).unwrap_err();
        assert!(matches!(err, TankError::Fetch { .. }));
        assert!(!err.is_transient());
        assert!(err.to_string().contains("/no/such/tank.csv"));
    }

    #[test]
    fn test_read_non_utf8_is_fetch_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.csv");
        std::fs::write(&path, [0x63u8, 0x2c, 0xff, 0xfe, 0x0a]).unwrap();
        let err = read_csv_file(&path).unwrap_err();
        assert!(err.to_string().contains("not valid UTF-8"));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_status_error_retries_only_server_side() {
        use reqwest::StatusCode;
        assert!(status_error("u", StatusCode::SERVICE_UNAVAILABLE).is_transient());
        assert!(status_error("u", StatusCode::INTERNAL_SERVER_ERROR).is_transient());
        assert!(status_error("u", StatusCode::TOO_MANY_REQUESTS).is_transient());
        assert!(!status_error("u", StatusCode::NOT_FOUND).is_transient());
        assert!(!status_error("u", StatusCode::UNAUTHORIZED).is_transient());
        assert_eq!(
            status_error("u", StatusCode::NOT_FOUND).to_string(),
            "Failed to fetch u: HTTP 404 Not Found"
        );
    }

    #[test]
    fn test_feed_reader_reads_file_location() {
        let tmp = TempDir::new().unwrap();
        let path = write_file(tmp.path(), "t.csv", "created_at,field1\n2024-01-15,10\n");
        let reader = CsvFeedReader::default();
        let table = reader.read(&SourceLocation::File(path)).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_feed_reader_unreachable_url_is_fetch_error() {
        let reader = CsvFeedReader::new(Duration::from_secs(2));
        let err = reader
            .read(&SourceLocation::Url("http://127.0.0.1:9/feeds.csv".into()))
            .unwrap_err();
        assert!(matches!(err, TankError::Fetch { .. }));
        assert!(err.is_transient());
    }

    // ── discovery ─────────────────────────────────────────────────────────────

    #[test]
    fn test_find_csv_files_recursive_and_sorted() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "b.csv", "");
        write_file(tmp.path(), "sub/a.CSV", "");
        write_file(tmp.path(), "notes.txt", "");
        let files = find_csv_files(tmp.path());
        assert_eq!(files.len(), 2);
        assert!(files.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_find_csv_files_missing_dir() {
        assert!(find_csv_files(Path::new("/no/such/dir")).is_empty());
    }

    #[test]
    fn test_discover_tanks_uses_stem_and_skips_known() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "roof.csv", "");
        write_file(tmp.path(), "sump.csv", "");
        let known = vec![TankSource {
            id: "roof".into(),
            location: SourceLocation::Url("u".into()),
            capacity: 500.0,
        }];
        let tanks = discover_tanks(tmp.path(), 10_000.0, &known);
        assert_eq!(tanks.len(), 1);
        assert_eq!(tanks[0].id, "sump");
        assert_eq!(tanks[0].capacity, 10_000.0);
    }
}
