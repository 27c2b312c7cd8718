use std::fs::OpenOptions;
use std::io::{BufReader, BufWriter, Write as _};
use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

/// One entry of a user's want-to-read list.
///
/// Field names are the keys of the batch JSON file and must stay stable.
/// Optional fields serialize as `null` rather than being omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Book {
    pub title: String,
    pub douban_url: String,
    /// Remote URL after scraping; local cache path (or `None`) after covers are acquired.
    pub cover_image: Option<String>,
    pub authors: Vec<String>,
    pub publisher: Option<String>,
    pub publish_date: Option<String>,
    pub rating: Option<f64>,
    pub rating_count: Option<u64>,
    pub summary: Option<String>,
    pub raw_pub: Option<String>,
    pub book_id: Option<String>,
    pub added_at: Option<String>,
}

impl Book {
    pub fn has_remote_cover(&self) -> bool {
        self.cover_image.as_deref().is_some_and(is_remote_url)
    }

    /// Cover is a local path that currently exists on disk.
    pub fn has_local_cover(&self) -> bool {
        match self.cover_image.as_deref() {
            Some(cover) if !is_remote_url(cover) => Path::new(cover).exists(),
            _ => false,
        }
    }
}

pub fn is_remote_url(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}

pub fn load_books(path: &Path) -> anyhow::Result<Vec<Book>> {
    let file = OpenOptions::new()
        .read(true)
        .open(path)
        .with_context(|| format!("open book list: {}", path.display()))?;
    let books: Vec<Book> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parse book list: {}", path.display()))?;
    Ok(books)
}

pub fn save_books(path: &Path, books: &[Book]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create book list parent dir: {}", parent.display()))?;
    }

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .with_context(|| format!("create book list: {}", path.display()))?;
    let mut out = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut out, books).context("serialize book list")?;
    out.write_all(b"\n").context("write book list newline")?;
    out.flush()
        .with_context(|| format!("flush book list: {}", path.display()))?;
    Ok(())
}
