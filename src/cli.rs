use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Log per-page and per-cover details to stderr.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scrape a user's want-to-read list into a JSON file.
    Scrape(ScrapeArgs),
    /// Download covers and render a JSON book list into paged tables.
    Render(RenderArgs),
    /// Scrape, then render, in one run.
    Build(BuildArgs),
}

#[derive(Debug, Args)]
pub struct ScrapeArgs {
    /// Douban account id, e.g. `qtmuniao`.
    pub user_id: String,

    /// Path to save JSON data (default: `douban_wish_<user_id>.json`).
    #[arg(long, short)]
    pub output: Option<String>,

    /// Maximum number of pages to fetch (15 books per page).
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_pages: Option<u32>,

    /// Catalog site root.
    #[arg(long, default_value = crate::scrape::DEFAULT_BASE_URL)]
    pub base_url: String,
}

#[derive(Debug, Args)]
pub struct RenderArgs {
    /// JSON book list (created by `scrape`).
    pub json_path: String,

    /// Output Markdown path (default: `<json stem>.md`).
    #[arg(long, short)]
    pub output: Option<String>,

    #[command(flatten)]
    pub layout: LayoutArgs,

    #[command(flatten)]
    pub palette: PaletteArgs,

    #[command(flatten)]
    pub fetch: CoverFetchArgs,
}

#[derive(Debug, Args)]
pub struct BuildArgs {
    /// Douban account id, e.g. `qtmuniao`.
    pub user_id: String,

    /// Maximum number of pages to fetch (15 books per page).
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_pages: Option<u32>,

    /// Catalog site root.
    #[arg(long, default_value = crate::scrape::DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Path to save JSON data (default: `douban_wish_<user_id>.json`).
    #[arg(long)]
    pub json: Option<String>,

    /// Output Markdown path (default: `<json stem>.md`).
    #[arg(long, short)]
    pub output: Option<String>,

    #[command(flatten)]
    pub layout: LayoutArgs,

    #[command(flatten)]
    pub palette: PaletteArgs,

    #[command(flatten)]
    pub fetch: CoverFetchArgs,
}

#[derive(Debug, Args)]
pub struct LayoutArgs {
    /// Directory to store downloaded covers.
    #[arg(long, default_value = "img")]
    pub img_dir: String,

    /// Number of columns in the table (values below 1 are raised to 1).
    #[arg(long, default_value_t = 3, allow_negative_numbers = true)]
    pub columns: i64,

    /// Table rows per page before splitting (values below 1 are raised to 1).
    #[arg(long, default_value_t = 10, allow_negative_numbers = true)]
    pub rows_per_page: i64,

    /// Skip downloading covers; books without a local cover render a placeholder.
    #[arg(long)]
    pub skip_download: bool,
}

#[derive(Debug, Args)]
pub struct PaletteArgs {
    /// Primary accent color.
    #[arg(long, default_value = "#1f6feb")]
    pub primary_color: String,

    /// Page background color.
    #[arg(long, default_value = "#0d1117")]
    pub bg_color: String,

    /// Card background color.
    #[arg(long, default_value = "#161b22")]
    pub card_bg: String,

    /// Text color.
    #[arg(long, default_value = "#e6edf3")]
    pub text_color: String,

    /// Muted text color.
    #[arg(long, default_value = "#8b949e")]
    pub muted_color: String,
}

#[derive(Debug, Args)]
pub struct CoverFetchArgs {
    /// Download attempts per cover.
    #[arg(long, default_value_t = crate::covers::DEFAULT_MAX_RETRIES)]
    pub retries: usize,

    /// Lower bound of the random pause before each download attempt.
    #[arg(long, default_value_t = crate::covers::DEFAULT_MIN_DELAY_MS)]
    pub min_delay_ms: u64,

    /// Upper bound of the random pause before each download attempt.
    #[arg(long, default_value_t = crate::covers::DEFAULT_MAX_DELAY_MS)]
    pub max_delay_ms: u64,
}

impl CoverFetchArgs {
    pub fn policy(&self) -> crate::covers::FetchPolicy {
        crate::covers::FetchPolicy {
            max_retries: self.retries,
            min_delay: std::time::Duration::from_millis(self.min_delay_ms),
            max_delay: std::time::Duration::from_millis(self.max_delay_ms),
        }
    }
}
