use std::path::{Component, Path, PathBuf};

use anyhow::Context as _;

use crate::cli::{CoverFetchArgs, LayoutArgs, PaletteArgs, RenderArgs};
use crate::covers::{FetchPolicy, HttpCoverFetcher};
use crate::formats::{Book, is_remote_url};

pub const META_CHAR_LIMIT: usize = 160;
pub const NO_INFO_PLACEHOLDER: &str = "暂无信息";
const ELLIPSIS: char = '…';
const PAGE_INDEX_STEM: &str = "index";
const DEFAULT_EXTENSION: &str = ".md";
/// Widest table the renderer will lay out; every column gets its own `<col>`.
pub const MAX_COLUMNS: usize = 1_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    pub primary: String,
    pub background: String,
    pub card_background: String,
    pub text: String,
    pub muted: String,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            primary: "#1f6feb".to_owned(),
            background: "#0d1117".to_owned(),
            card_background: "#161b22".to_owned(),
            text: "#e6edf3".to_owned(),
            muted: "#8b949e".to_owned(),
        }
    }
}

impl From<&PaletteArgs> for Palette {
    fn from(args: &PaletteArgs) -> Self {
        Self {
            primary: args.primary_color.clone(),
            background: args.bg_color.clone(),
            card_background: args.card_bg.clone(),
            text: args.text_color.clone(),
            muted: args.muted_color.clone(),
        }
    }
}

/// Columns per table row and table rows per output page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageGeometry {
    columns: usize,
    rows: usize,
}

impl PageGeometry {
    /// Non-positive values are raised to 1 and columns are capped at [`MAX_COLUMNS`].
    pub fn clamped(columns: i64, rows: i64) -> Self {
        Self {
            columns: usize::try_from(columns.max(1))
                .unwrap_or(usize::MAX)
                .min(MAX_COLUMNS),
            rows: usize::try_from(rows.max(1)).unwrap_or(usize::MAX),
        }
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn page_size(&self) -> usize {
        self.columns.saturating_mul(self.rows)
    }
}

/// Where page `index` (1-based) of a rendering rooted at `output` is written.
///
/// Page 1 is `output` itself; page N is `<stem>_N/index<ext>` next to it.
pub fn page_output_path(output: &Path, index: usize) -> PathBuf {
    if index <= 1 {
        return output.to_path_buf();
    }

    let stem = output
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default();
    let extension = output
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_owned());

    output
        .with_file_name(format!("{stem}_{index}"))
        .join(format!("{PAGE_INDEX_STEM}{extension}"))
}

/// Copies `books` with each local cover rewritten relative to `page_dir`.
///
/// Remote covers and local paths that no longer exist become `None`.
pub fn prepare_page_books(books: &[Book], page_dir: &Path) -> anyhow::Result<Vec<Book>> {
    let cwd = std::env::current_dir().context("read current dir")?;
    let page_dir = absolutize(&cwd, page_dir);
    let page_dir = page_dir
        .canonicalize()
        .with_context(|| format!("resolve page dir: {}", page_dir.display()))?;

    Ok(books
        .iter()
        .map(|book| Book {
            cover_image: book
                .cover_image
                .as_deref()
                .and_then(|cover| relative_cover(&cwd, cover, &page_dir)),
            ..book.clone()
        })
        .collect())
}

fn relative_cover(cwd: &Path, cover: &str, page_dir: &Path) -> Option<String> {
    if is_remote_url(cover) {
        return None;
    }
    let target = absolutize(cwd, Path::new(cover)).canonicalize().ok()?;
    Some(to_slash(&relative_path(&target, page_dir)))
}

fn absolutize(cwd: &Path, path: &Path) -> PathBuf {
    if path.as_os_str().is_empty() {
        cwd.to_path_buf()
    } else if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

fn relative_path(target: &Path, base: &Path) -> PathBuf {
    let target = target.components().collect::<Vec<_>>();
    let base = base.components().collect::<Vec<_>>();
    let common = target
        .iter()
        .zip(&base)
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..base.len() {
        rel.push(Component::ParentDir.as_os_str());
    }
    for component in &target[common..] {
        rel.push(component.as_os_str());
    }
    rel
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Shortens `text` to at most `limit` characters, ending in `…` when cut.
pub fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_owned();
    }
    let mut out = text
        .chars()
        .take(limit.saturating_sub(1))
        .collect::<String>();
    out.push(ELLIPSIS);
    out
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// One card: the cover (local files only) or a placeholder, then the publication line.
pub fn render_cell(book: &Book, palette: &Palette) -> String {
    let meta = match book.raw_pub.as_deref().filter(|line| !line.is_empty()) {
        Some(line) => truncate(line, META_CHAR_LIMIT),
        None => NO_INFO_PLACEHOLDER.to_owned(),
    };

    let cover_src = book
        .cover_image
        .as_deref()
        .filter(|cover| !cover.is_empty() && !is_remote_url(cover))
        .map(|cover| cover.replace('\\', "/"));

    let cover = match cover_src {
        Some(src) => format!(
            r#"<a href="{href}" target="_blank" rel="noopener noreferrer"><img src="{src}" alt="cover" style="width:160px; height:220px; object-fit:cover; border-radius:10px; border:1px solid {primary}20;" /></a>"#,
            href = escape_html(&book.douban_url),
            src = escape_html(&src),
            primary = palette.primary,
        ),
        None => format!(
            r#"<div style="width:160px; height:220px; margin:0 auto; background:{primary}20; border-radius:10px;"></div>"#,
            primary = palette.primary,
        ),
    };

    format!(
        concat!(
            r#"<div style="background:{card_bg}; border:1px solid {primary}30; border-radius:12px; padding:12px; color:{text}; font-family:'Segoe UI','Helvetica Neue',Arial,sans-serif; box-shadow:0 8px 24px -12px #000; text-align:center;">"#,
            "\n",
            r#"  <div style="margin-bottom:10px;">"#,
            "\n    {cover}\n  </div>\n",
            r#"  <div style="font-size:13px; color:{muted}; line-height:1.5;">{meta}</div>"#,
            "\n</div>"
        ),
        card_bg = palette.card_background,
        primary = palette.primary,
        text = palette.text,
        cover = cover,
        muted = palette.muted,
        meta = escape_html(&meta),
    )
}

/// Full-width table with `columns` cells per row, filled row-major.
pub fn build_table(books: &[Book], columns: usize, palette: &Palette) -> String {
    let columns = columns.max(1);
    let col_width = format!("{:.2}%", 100.0 / columns as f64);

    let mut cols = String::new();
    for _ in 0..columns {
        cols.push_str(&format!("<col style='width:{col_width};' />"));
    }

    let mut rows = String::new();
    for chunk in books.chunks(columns) {
        rows.push_str("<tr>");
        for book in chunk {
            rows.push_str(&format!(
                "<td style='padding:10px; vertical-align:top;'>{}</td>",
                render_cell(book, palette)
            ));
        }
        rows.push_str("</tr>");
    }

    format!(
        concat!(
            r#"<table style="width:100%; border-collapse:separate; border-spacing:0 10px; background:{bg};">"#,
            "\n  <colgroup>\n    {cols}\n  </colgroup>\n",
            "  <tbody>\n    {rows}\n  </tbody>\n",
            "</table>\n"
        ),
        bg = palette.background,
        cols = cols,
        rows = rows,
    )
}

/// Splits `books` into pages of `geometry.page_size()` and writes one table per page.
///
/// Returns the written paths in page order.
pub fn render_pages(
    books: &[Book],
    output: &Path,
    geometry: PageGeometry,
    palette: &Palette,
) -> anyhow::Result<Vec<PathBuf>> {
    let mut saved = Vec::new();
    for (idx, page_books) in books.chunks(geometry.page_size()).enumerate() {
        let out_path = page_output_path(output, idx + 1);
        let page_dir = out_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        if !page_dir.as_os_str().is_empty() {
            std::fs::create_dir_all(&page_dir)
                .with_context(|| format!("create page dir: {}", page_dir.display()))?;
        }

        let prepared = prepare_page_books(page_books, &page_dir)?;
        let content = build_table(&prepared, geometry.columns(), palette);
        std::fs::write(&out_path, content)
            .with_context(|| format!("write page: {}", out_path.display()))?;
        tracing::debug!(page = idx + 1, books = page_books.len(), path = %out_path.display(), "wrote page");
        saved.push(out_path);
    }
    Ok(saved)
}

/// Everything the render stage needs besides the books themselves.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub output: PathBuf,
    pub img_dir: PathBuf,
    pub geometry: PageGeometry,
    pub palette: Palette,
    pub skip_download: bool,
    pub policy: FetchPolicy,
}

impl RenderOptions {
    pub fn from_args(
        output: PathBuf,
        layout: &LayoutArgs,
        palette: &PaletteArgs,
        fetch: &CoverFetchArgs,
    ) -> Self {
        Self {
            output,
            img_dir: PathBuf::from(&layout.img_dir),
            geometry: PageGeometry::clamped(layout.columns, layout.rows_per_page),
            palette: Palette::from(palette),
            skip_download: layout.skip_download,
            policy: fetch.policy(),
        }
    }
}

/// Reuses cached covers, downloads the rest unless skipped, then writes pages.
pub fn render_collection(mut books: Vec<Book>, options: &RenderOptions) -> anyhow::Result<()> {
    let reused = crate::covers::reuse_cached_covers(&mut books, &options.img_dir)?;
    if reused > 0 {
        println!(
            "Reused {reused} existing cover(s) from {}",
            options.img_dir.display()
        );
    }

    if options.skip_download {
        if books.iter().any(|book| !book.has_local_cover()) {
            println!("Skipped download; some covers missing locally and will render as placeholder.");
        }
    } else {
        let need_download = books
            .iter_mut()
            .filter(|book| !book.has_local_cover() && book.cover_image.is_some())
            .collect::<Vec<_>>();
        if !need_download.is_empty() {
            tracing::info!(count = need_download.len(), dir = %options.img_dir.display(), "download covers");
            let client = crate::http::browser_client(crate::http::DEFAULT_TIMEOUT)?;
            let fetcher = HttpCoverFetcher::new(client);
            let report = crate::covers::download_covers(
                need_download,
                &options.img_dir,
                &fetcher,
                &options.policy,
            )?;
            if report.failures.is_empty() {
                println!("Downloaded covers for {} book(s).", report.downloaded);
            } else {
                println!(
                    "WARNING: {} covers failed to download.",
                    report.failures.len()
                );
                for failure in &report.failures {
                    println!(" - {} ({})", failure.book.title, failure.book.douban_url);
                }
            }
        }
    }

    let saved = render_pages(&books, &options.output, options.geometry, &options.palette)?;
    println!("Saved Markdown to:");
    for path in &saved {
        println!(" - {}", path.display());
    }

    let local_count = books.iter().filter(|book| book.has_local_cover()).count();
    println!("Local covers available: {local_count} / {}", books.len());
    if !options.skip_download {
        println!("Images saved to {}", options.img_dir.display());
    }

    Ok(())
}

pub fn default_output_path(json_path: &Path) -> PathBuf {
    let stem = json_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "books".to_owned());
    PathBuf::from(format!("{stem}{DEFAULT_EXTENSION}"))
}

pub fn run(args: RenderArgs) -> anyhow::Result<()> {
    let json_path = PathBuf::from(&args.json_path);
    let output = args
        .output
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| default_output_path(&json_path));

    let books = crate::formats::load_books(&json_path)?;
    tracing::info!(books = books.len(), input = %json_path.display(), "render book list");

    let options = RenderOptions::from_args(output, &args.layout, &args.palette, &args.fetch);
    render_collection(books, &options)
}
