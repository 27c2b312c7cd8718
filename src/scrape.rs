use std::collections::VecDeque;
use std::iter::FusedIterator;
use std::path::PathBuf;

use anyhow::Context as _;
use reqwest::blocking::Client;
use url::Url;

use crate::cli::ScrapeArgs;
use crate::formats::Book;
use crate::parse::PageParser;

/// Wish lists are paginated 15 items per page.
pub const PAGE_SIZE: usize = 15;

pub const DEFAULT_BASE_URL: &str = "https://book.douban.com";

/// Fetches the markup of one wish-list page.
pub trait PageSource {
    fn fetch_page(&mut self, user_id: &str, start: usize) -> anyhow::Result<String>;
}

impl<F> PageSource for F
where
    F: FnMut(&str, usize) -> anyhow::Result<String>,
{
    fn fetch_page(&mut self, user_id: &str, start: usize) -> anyhow::Result<String> {
        self(user_id, start)
    }
}

pub struct HttpPageSource {
    client: Client,
    base_url: Url,
}

impl HttpPageSource {
    pub fn new(client: Client, base_url: &str) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url).context("parse --base-url")?;
        if base_url.scheme() != "http" && base_url.scheme() != "https" {
            anyhow::bail!("--base-url must be http/https: {base_url}");
        }
        Ok(Self { client, base_url })
    }

    pub fn page_url(&self, user_id: &str, start: usize) -> anyhow::Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow::anyhow!("base url cannot carry a path: {}", self.base_url))?
            .pop_if_empty()
            .extend(["people", user_id, "wish"]);
        url.query_pairs_mut()
            .clear()
            .append_pair("start", &start.to_string());
        Ok(url)
    }
}

impl PageSource for HttpPageSource {
    fn fetch_page(&mut self, user_id: &str, start: usize) -> anyhow::Result<String> {
        let url = self.page_url(user_id, start)?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .with_context(|| format!("GET {url}"))?;
        response
            .text()
            .with_context(|| format!("read body: {url}"))
    }
}

/// Lazily walks a user's wish list page by page.
///
/// Stops when a page has no items, when the page cap is reached, or when the
/// page has no next link. A fetch error is yielded once and ends the sequence.
pub struct WishList<S> {
    source: S,
    parser: PageParser,
    user_id: String,
    max_pages: Option<usize>,
    start: usize,
    pages_fetched: usize,
    pending: VecDeque<Book>,
    finished: bool,
}

impl<S: PageSource> WishList<S> {
    pub fn new(
        source: S,
        parser: PageParser,
        user_id: impl Into<String>,
        max_pages: Option<usize>,
    ) -> Self {
        Self {
            source,
            parser,
            user_id: user_id.into(),
            max_pages,
            start: 0,
            pages_fetched: 0,
            pending: VecDeque::new(),
            finished: false,
        }
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    fn fetch_next_page(&mut self) -> anyhow::Result<()> {
        let html = self
            .source
            .fetch_page(&self.user_id, self.start)
            .with_context(|| format!("fetch wish list page at start={}", self.start))?;
        self.pages_fetched += 1;

        let page = self.parser.parse_page(&html);
        tracing::debug!(
            start = self.start,
            items = page.books.len(),
            has_next = page.has_next,
            "parsed wish list page"
        );

        if page.books.is_empty() {
            self.finished = true;
            return Ok(());
        }
        self.pending.extend(page.books);

        let capped = self
            .max_pages
            .is_some_and(|max_pages| self.pages_fetched >= max_pages);
        if capped || !page.has_next {
            self.finished = true;
        } else {
            self.start += PAGE_SIZE;
        }
        Ok(())
    }
}

impl<S: PageSource> Iterator for WishList<S> {
    type Item = anyhow::Result<Book>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(book) = self.pending.pop_front() {
                return Some(Ok(book));
            }
            if self.finished {
                return None;
            }
            if let Err(err) = self.fetch_next_page() {
                self.finished = true;
                return Some(Err(err));
            }
        }
    }
}

impl<S: PageSource> FusedIterator for WishList<S> {}

pub fn scrape_books(
    user_id: &str,
    max_pages: Option<usize>,
    base_url: &str,
) -> anyhow::Result<Vec<Book>> {
    let client = crate::http::browser_client(crate::http::DEFAULT_TIMEOUT)?;
    let source = HttpPageSource::new(client, base_url)?;
    let parser = PageParser::new().context("build page parser")?;

    tracing::info!(user = user_id, ?max_pages, "scrape wish list");
    let mut wish_list = WishList::new(source, parser, user_id, max_pages);
    let books = wish_list.by_ref().collect::<anyhow::Result<Vec<_>>>()?;
    tracing::info!(
        books = books.len(),
        pages = wish_list.pages_fetched(),
        "scrape complete"
    );
    Ok(books)
}

pub fn default_output_path(user_id: &str) -> PathBuf {
    PathBuf::from(format!("douban_wish_{user_id}.json"))
}

pub fn run(args: ScrapeArgs) -> anyhow::Result<()> {
    let output = args
        .output
        .map(PathBuf::from)
        .unwrap_or_else(|| default_output_path(&args.user_id));

    let books = scrape_books(
        &args.user_id,
        args.max_pages.map(|n| n as usize),
        &args.base_url,
    )?;
    crate::formats::save_books(&output, &books)?;

    println!("Saved {} books to {}", books.len(), output.display());
    Ok(())
}
