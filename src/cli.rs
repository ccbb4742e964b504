use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Ingest(IngestArgs),
    List(ListArgs),
    Search(SearchArgs),
    Detail(DetailArgs),
    Pages(PagesArgs),
    Delete(DeleteArgs),
}

#[derive(Debug, Clone, Args)]
pub struct CatalogOpts {
    /// Catalog root directory (default: $TANKOBON_LIBRARY_DIR, then ./library).
    #[arg(long)]
    pub library_dir: Option<PathBuf>,

    /// Externally visible base URL for asset links (default: $TANKOBON_BASE_URL).
    #[arg(long)]
    pub base_url: Option<String>,

    /// URL path prefix under which page assets are served (default: $TANKOBON_STATIC_PATH).
    #[arg(long)]
    pub static_path: Option<String>,
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Title identifier passed to the fetch command.
    pub title_id: String,

    /// Program that downloads raw pages (default: $TANKOBON_FETCH_COMMAND).
    /// It receives the title identifier as its last argument.
    #[arg(long)]
    pub fetch_command: Option<String>,

    /// Extra arguments inserted before the title identifier.
    #[arg(last = true)]
    pub fetch_args: Vec<String>,

    /// Seconds to wait for the fetch command before giving up.
    #[arg(long)]
    pub fetch_timeout_secs: Option<u64>,

    #[command(flatten)]
    pub catalog: CatalogOpts,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// 1-based page number.
    #[arg(long, default_value_t = 1)]
    pub page: usize,

    /// Titles per page.
    #[arg(long, default_value_t = 20)]
    pub page_size: usize,

    /// Return the most recently updated titles instead of the paged listing.
    #[arg(long)]
    pub latest: bool,

    /// Maximum titles returned with --latest.
    #[arg(long, default_value_t = 10)]
    pub limit: usize,

    #[command(flatten)]
    pub catalog: CatalogOpts,
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    /// Case-insensitive keyword matched against name and description;
    /// an empty keyword matches everything.
    pub keyword: String,

    /// Keep only titles carrying this tag (repeatable).
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// 1-based page number.
    #[arg(long, default_value_t = 1)]
    pub page: usize,

    /// Titles per page.
    #[arg(long, default_value_t = 20)]
    pub page_size: usize,

    #[command(flatten)]
    pub catalog: CatalogOpts,
}

#[derive(Debug, Args)]
pub struct DetailArgs {
    /// Title identifier.
    pub title_id: String,

    #[command(flatten)]
    pub catalog: CatalogOpts,
}

#[derive(Debug, Args)]
pub struct PagesArgs {
    /// Chapter identifier of the form "<title-id>-<ordinal>".
    pub chapter_id: String,

    #[command(flatten)]
    pub catalog: CatalogOpts,
}

#[derive(Debug, Args)]
pub struct DeleteArgs {
    /// Title identifier.
    pub title_id: String,

    #[command(flatten)]
    pub catalog: CatalogOpts,
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{rendered}");
    Ok(())
}
