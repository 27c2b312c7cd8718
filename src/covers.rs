use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use rand::Rng as _;
use reqwest::blocking::Client;
use reqwest::header::REFERER;
use sha2::{Digest as _, Sha256};

use crate::formats::{Book, is_remote_url};

pub const DEFAULT_MAX_RETRIES: usize = 3;
pub const DEFAULT_MIN_DELAY_MS: u64 = 800;
pub const DEFAULT_MAX_DELAY_MS: u64 = 1600;

const DEFAULT_EXTENSION: &str = ".jpg";
const FALLBACK_KEY: &str = "cover";

/// Downloads the bytes of one cover image.
pub trait CoverFetcher {
    fn fetch(&self, url: &str, referer: Option<&str>) -> anyhow::Result<Vec<u8>>;
}

impl<F> CoverFetcher for F
where
    F: Fn(&str, Option<&str>) -> anyhow::Result<Vec<u8>>,
{
    fn fetch(&self, url: &str, referer: Option<&str>) -> anyhow::Result<Vec<u8>> {
        self(url, referer)
    }
}

pub struct HttpCoverFetcher {
    client: Client,
}

impl HttpCoverFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl CoverFetcher for HttpCoverFetcher {
    fn fetch(&self, url: &str, referer: Option<&str>) -> anyhow::Result<Vec<u8>> {
        let mut request = self.client.get(url);
        if let Some(referer) = referer {
            request = request.header(REFERER, referer);
        }
        let response = request
            .send()
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .with_context(|| format!("GET {url}"))?;
        let bytes = response
            .bytes()
            .with_context(|| format!("read body: {url}"))?;
        Ok(bytes.to_vec())
    }
}

/// How hard to try for each cover.
///
/// Every attempt, including the first, is preceded by a uniformly random pause
/// in `min_delay..=max_delay`. The pause does not grow between attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPolicy {
    pub max_retries: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            min_delay: Duration::from_millis(DEFAULT_MIN_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }
}

impl FetchPolicy {
    pub fn without_delay(max_retries: usize) -> Self {
        Self {
            max_retries,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    fn attempts(&self) -> usize {
        self.max_retries.max(1)
    }

    /// A `max_delay` below `min_delay` pins the pause to `min_delay`.
    fn pause_duration(&self) -> Duration {
        let min = self.min_delay.as_millis() as u64;
        let max = (self.max_delay.as_millis() as u64).max(min);
        let millis = if min == max {
            min
        } else {
            rand::rng().random_range(min..=max)
        };
        Duration::from_millis(millis)
    }

    fn pause(&self) {
        let pause = self.pause_duration();
        if !pause.is_zero() {
            std::thread::sleep(pause);
        }
    }
}

#[derive(Debug, Clone)]
pub struct CoverFailure {
    /// The book as left after the failure (`cover_image` is `None`).
    pub book: Book,
    pub reference: Option<String>,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct CoverReport {
    pub reused: usize,
    pub downloaded: usize,
    pub failures: Vec<CoverFailure>,
}

/// File name a book's cover is cached under.
///
/// The stem is the subject id, else a short hash of the book URL, else the
/// title, reduced to `[A-Za-z0-9._-]`. The extension comes from the remote
/// reference with any query string removed.
pub fn cache_file_name(book: &Book) -> String {
    let reference = book.cover_image.as_deref().unwrap_or_default();
    let without_query = reference.split('?').next().unwrap_or_default();
    let extension = Path::new(without_query)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_owned());

    let identifier = book
        .book_id
        .clone()
        .filter(|id| !id.is_empty())
        .or_else(|| (!book.douban_url.is_empty()).then(|| url_hash(&book.douban_url)))
        .unwrap_or_else(|| book.title.clone());

    format!("{}{extension}", safe_file_stem(&identifier))
}

pub fn expected_cover_path(book: &Book, cache_dir: &Path) -> PathBuf {
    cache_dir.join(cache_file_name(book))
}

/// First 10 hex characters of the SHA-256 of `url`. Covers cached under an
/// MD5-based name by older tools are not recognised and get downloaded again.
fn url_hash(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    hex::encode(&digest[..5])
}

fn safe_file_stem(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut replacing = false;
    for ch in name.trim().chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            out.push(ch);
            replacing = false;
        } else if !replacing {
            out.push('_');
            replacing = true;
        }
    }
    if out.is_empty() {
        FALLBACK_KEY.to_owned()
    } else {
        out
    }
}

/// Points books at covers already present in `cache_dir`, before any download.
///
/// Returns how many books were matched. Distinct books can derive the same
/// cache key; that is logged, not corrected.
pub fn reuse_cached_covers(books: &mut [Book], cache_dir: &Path) -> anyhow::Result<usize> {
    if !cache_dir.is_dir() {
        return Ok(0);
    }

    let mut reused = 0_usize;
    for book in books.iter_mut() {
        let dest = expected_cover_path(book, cache_dir);
        if dest.exists() {
            book.cover_image = Some(dest.to_string_lossy().to_string());
            reused += 1;
        }
    }

    if reused > 0 {
        let file_count = count_files(cache_dir)?;
        if reused > file_count {
            tracing::warn!(
                reused,
                file_count,
                dir = %cache_dir.display(),
                "more books reuse a cached cover than there are files; some cache keys collide"
            );
        }
    }

    Ok(reused)
}

pub fn count_files(dir: &Path) -> anyhow::Result<usize> {
    let mut count = 0_usize;
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("read cover dir: {}", dir.display()))?
    {
        let entry = entry.with_context(|| format!("read cover dir entry: {}", dir.display()))?;
        if entry.path().is_file() {
            count += 1;
        }
    }
    Ok(count)
}

/// Downloads covers for `books` into `cache_dir`, one book at a time.
///
/// On success a book's `cover_image` becomes the local path. Books that end up
/// without a cover are reported as failures and their `cover_image` is cleared;
/// the batch always runs to completion.
pub fn download_covers<'a, F>(
    books: impl IntoIterator<Item = &'a mut Book>,
    cache_dir: &Path,
    fetcher: &F,
    policy: &FetchPolicy,
) -> anyhow::Result<CoverReport>
where
    F: CoverFetcher + ?Sized,
{
    std::fs::create_dir_all(cache_dir)
        .with_context(|| format!("create cover dir: {}", cache_dir.display()))?;

    let mut report = CoverReport::default();
    for book in books {
        let reference = book.cover_image.clone();
        match acquire_cover(book, cache_dir, fetcher, policy) {
            Ok(Acquired::Reused) => report.reused += 1,
            Ok(Acquired::Downloaded) => report.downloaded += 1,
            Err(err) => {
                tracing::warn!(
                    title = %book.title,
                    reference = reference.as_deref().unwrap_or("-"),
                    "failed to acquire cover: {err:#}"
                );
                book.cover_image = None;
                report.failures.push(CoverFailure {
                    book: book.clone(),
                    reference,
                    error: format!("{err:#}"),
                });
            }
        }
    }

    tracing::info!(
        reused = report.reused,
        downloaded = report.downloaded,
        failed = report.failures.len(),
        "cover download complete"
    );
    Ok(report)
}

enum Acquired {
    Reused,
    Downloaded,
}

fn acquire_cover<F>(
    book: &mut Book,
    cache_dir: &Path,
    fetcher: &F,
    policy: &FetchPolicy,
) -> anyhow::Result<Acquired>
where
    F: CoverFetcher + ?Sized,
{
    let Some(reference) = book.cover_image.clone() else {
        anyhow::bail!("book has no cover image");
    };

    let dest = expected_cover_path(book, cache_dir);
    if dest.exists() {
        book.cover_image = Some(dest.to_string_lossy().to_string());
        return Ok(Acquired::Reused);
    }
    if !is_remote_url(&reference) {
        anyhow::bail!("local cover is missing: {reference}");
    }

    let referer = (!book.douban_url.is_empty()).then_some(book.douban_url.as_str());
    let mut last_err = None;
    for attempt in 1..=policy.attempts() {
        policy.pause();
        let result = fetcher
            .fetch(&reference, referer)
            .and_then(|bytes| write_atomically(&dest, &bytes));
        match result {
            Ok(()) => {
                tracing::debug!(attempt, dest = %dest.display(), "downloaded cover");
                book.cover_image = Some(dest.to_string_lossy().to_string());
                return Ok(Acquired::Downloaded);
            }
            Err(err) => {
                tracing::debug!(attempt, url = %reference, "cover attempt failed: {err:#}");
                last_err = Some(err);
            }
        }
    }

    let err = last_err.unwrap_or_else(|| anyhow::anyhow!("no download attempt made"));
    Err(err.context(format!(
        "giving up on {reference} after {} attempts",
        policy.attempts()
    )))
}

fn write_atomically(dest: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let dir = dest
        .parent()
        .ok_or_else(|| anyhow::anyhow!("cover path must have parent: {}", dest.display()))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("create temp file in {}", dir.display()))?;
    tmp.write_all(bytes)
        .with_context(|| format!("write cover: {}", dest.display()))?;
    tmp.persist(dest)
        .map_err(|err| err.error)
        .with_context(|| format!("persist cover: {}", dest.display()))?;
    Ok(())
}
