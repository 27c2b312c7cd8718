use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::formats::Book;

pub const UNKNOWN_TITLE: &str = "未知标题";

/// Books found on one wish-list page plus whether a next page is linked.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedPage {
    pub books: Vec<Book>,
    pub has_next: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PubInfo {
    pub authors: Vec<String>,
    pub publisher: Option<String>,
    pub publish_date: Option<String>,
}

/// Splits a `作者 / 出版社 / 出版日期` line.
///
/// Everything except the last two segments is treated as an author. Lines with
/// fewer segments degrade to publisher-only or author + publisher.
pub fn split_pub_line(line: &str) -> PubInfo {
    let parts = line
        .split('/')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_owned)
        .collect::<Vec<_>>();

    match parts.as_slice() {
        [] => PubInfo::default(),
        [publisher] => PubInfo {
            authors: Vec::new(),
            publisher: Some(publisher.clone()),
            publish_date: None,
        },
        [author, publisher] => PubInfo {
            authors: vec![author.clone()],
            publisher: Some(publisher.clone()),
            publish_date: None,
        },
        [authors @ .., publisher, publish_date] => PubInfo {
            authors: authors.to_vec(),
            publisher: Some(publisher.clone()),
            publish_date: Some(publish_date.clone()),
        },
    }
}

/// Compiled selectors for the wish-list page template.
///
/// Every field extractor returns an `Option`; a missing element never fails
/// the item or the page.
#[derive(Debug)]
pub struct PageParser {
    item: Selector,
    title_link: Selector,
    cover: Selector,
    pub_line: Selector,
    rating: Selector,
    rating_count: Selector,
    paragraph: Selector,
    added_at: Selector,
    next_page: Selector,
    subject_id: Regex,
    digits: Regex,
}

impl PageParser {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            item: selector("li.subject-item")?,
            title_link: selector("h2 a")?,
            cover: selector(".pic img")?,
            pub_line: selector(".pub")?,
            rating: selector(".rating-info .rating_nums, .rating_nums")?,
            rating_count: selector(".rating-info .pl, .rating_people .pl")?,
            paragraph: selector("p")?,
            added_at: selector(".short-note .date, .ft .date, .oper-date, span.date")?,
            next_page: selector("span.next a")?,
            subject_id: Regex::new(r"/subject/(\d+)/")?,
            digits: Regex::new(r"(\d+)")?,
        })
    }

    pub fn parse_page(&self, html: &str) -> ParsedPage {
        let document = Html::parse_document(html);
        let books = document
            .select(&self.item)
            .map(|item| self.parse_item(item))
            .collect();
        let has_next = document.select(&self.next_page).next().is_some();

        ParsedPage { books, has_next }
    }

    /// Numeric subject id embedded in a book URL.
    pub fn book_id(&self, url: &str) -> Option<String> {
        self.subject_id
            .captures(url)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_owned())
    }

    fn parse_item(&self, item: ElementRef<'_>) -> Book {
        let title_link = item.select(&self.title_link).next();
        let title = title_link
            .map(|link| stripped_text(link, ""))
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| UNKNOWN_TITLE.to_owned());
        let link = title_link
            .and_then(|link| link.value().attr("href"))
            .map(|href| href.split('?').next().unwrap_or(href).to_owned());

        let raw_pub = self.pub_line(item);
        let PubInfo {
            authors,
            publisher,
            publish_date,
        } = split_pub_line(raw_pub.as_deref().unwrap_or_default());

        Book {
            title,
            book_id: link.as_deref().and_then(|url| self.book_id(url)),
            douban_url: link.unwrap_or_default(),
            cover_image: self.cover(item),
            authors,
            publisher,
            publish_date,
            rating: self.rating(item),
            rating_count: self.rating_count(item),
            summary: self.summary(item),
            raw_pub,
            added_at: self.added_at(item),
        }
    }

    fn cover(&self, item: ElementRef<'_>) -> Option<String> {
        item.select(&self.cover)
            .next()
            .and_then(|img| img.value().attr("src"))
            .map(str::to_owned)
    }

    fn pub_line(&self, item: ElementRef<'_>) -> Option<String> {
        let line = stripped_text(item.select(&self.pub_line).next()?, " ");
        (!line.is_empty()).then_some(line)
    }

    fn rating(&self, item: ElementRef<'_>) -> Option<f64> {
        let text = stripped_text(item.select(&self.rating).next()?, "");
        text.parse::<f64>().ok()
    }

    fn rating_count(&self, item: ElementRef<'_>) -> Option<u64> {
        let label = item.select(&self.rating_count).next()?.text().collect::<String>();
        let digits = self.digits.captures(&label)?.get(1)?;
        digits.as_str().parse::<u64>().ok()
    }

    fn summary(&self, item: ElementRef<'_>) -> Option<String> {
        item.select(&self.paragraph)
            .filter(|p| {
                !p.value().classes().any(|class| {
                    matches!(class, "rating-info" | "pub" | "subject-abstract")
                })
            })
            .map(|p| stripped_text(p, " "))
            .find(|text| !text.is_empty())
    }

    fn added_at(&self, item: ElementRef<'_>) -> Option<String> {
        let text = stripped_text(item.select(&self.added_at).next()?, "");
        (!text.is_empty()).then_some(text)
    }
}

fn selector(css: &str) -> anyhow::Result<Selector> {
    Selector::parse(css).map_err(|err| anyhow::anyhow!("parse selector {css:?}: {err}"))
}

fn stripped_text(element: ElementRef<'_>, separator: &str) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}
