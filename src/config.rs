use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use url::Url;

use crate::cli::CatalogOpts;

pub const DEFAULT_LIBRARY_DIR: &str = "library";
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";
pub const DEFAULT_STATIC_PATH: &str = "/static";
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 300;

/// Staging area under the library root where the external fetcher is
/// run and its output discovered.
pub const STAGING_DIR: &str = "incoming";

#[derive(Debug, Clone)]
pub struct Config {
    /// Catalog root: index files plus one asset directory per title.
    pub library_dir: PathBuf,
    /// Externally visible base URL, used only for URL materialization.
    pub base_url: String,
    /// URL path prefix under which page assets are served.
    pub static_path: String,
    /// Bound on a single external fetcher invocation.
    pub fetch_timeout: Duration,
}

impl Config {
    /// CLI flags win over `TANKOBON_*` environment variables, which win
    /// over the defaults.
    pub fn resolve(opts: &CatalogOpts) -> anyhow::Result<Self> {
        let library_dir = opts
            .library_dir
            .clone()
            .or_else(|| std::env::var("TANKOBON_LIBRARY_DIR").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LIBRARY_DIR));

        let base_url = opts
            .base_url
            .clone()
            .or_else(|| std::env::var("TANKOBON_BASE_URL").ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
        let base_url = normalize_base_url(&base_url)?;

        let static_path = opts
            .static_path
            .clone()
            .or_else(|| std::env::var("TANKOBON_STATIC_PATH").ok())
            .unwrap_or_else(|| DEFAULT_STATIC_PATH.to_owned());
        let static_path = normalize_static_path(&static_path);

        let fetch_timeout = match std::env::var("TANKOBON_FETCH_TIMEOUT_SECS") {
            Ok(raw) => Duration::from_secs(
                raw.parse()
                    .with_context(|| format!("invalid TANKOBON_FETCH_TIMEOUT_SECS={raw:?}"))?,
            ),
            Err(_) => Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
        };

        Ok(Self {
            library_dir,
            base_url,
            static_path,
            fetch_timeout,
        })
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.library_dir.join(STAGING_DIR)
    }

    pub fn title_dir(&self, title_id: &str) -> PathBuf {
        self.library_dir.join(title_id)
    }
}

pub fn normalize_base_url(raw: &str) -> anyhow::Result<String> {
    let url = Url::parse(raw).with_context(|| format!("parse base url: {raw}"))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        anyhow::bail!("base url must be http/https: {raw}");
    }
    Ok(raw.trim_end_matches('/').to_owned())
}

pub fn normalize_static_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.starts_with('/') {
        trimmed.to_owned()
    } else {
        format!("/{trimmed}")
    }
}
