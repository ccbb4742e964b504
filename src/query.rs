use std::sync::Arc;

use crate::cli::{self, DetailArgs, ListArgs, PagesArgs, SearchArgs};
use crate::config::Config;
use crate::error::Result;
use crate::model::{self, Page, Paginated, Title};
use crate::store::{CatalogStore, LocalFsCatalogStore};

/// `chapter_pages` trusts `page_count` from the index and never touches
/// the filesystem, so the served extension is fixed.
const PAGE_EXTENSION: &str = "jpg";

/// Read side of the catalog. All operations work on the index files
/// only; a failed or corrupt read degrades to an empty result instead
/// of failing the caller.
pub struct CatalogQueryService {
    store: Arc<dyn CatalogStore>,
    base_url: String,
    static_path: String,
}

impl CatalogQueryService {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        base_url: impl Into<String>,
        static_path: impl Into<String>,
    ) -> Self {
        Self {
            store,
            base_url: base_url.into(),
            static_path: static_path.into(),
        }
    }

    /// Paged listing in index-file order. Out-of-range pages yield an
    /// empty slice, not an error.
    pub async fn list(&self, page: usize, page_size: usize) -> Paginated<Title> {
        let titles = self.titles_or_empty().await;
        self.paginate(titles, page, page_size)
    }

    /// Recency variant: the `limit` most recently updated titles.
    pub async fn latest(&self, limit: usize) -> Vec<Title> {
        let mut titles = self.titles_or_empty().await;
        titles.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        titles.truncate(limit);
        titles
            .into_iter()
            .map(|title| self.with_resolved_cover(title))
            .collect()
    }

    /// Case-insensitive substring match on display name and
    /// description, plus tag membership. Filtering happens on the full
    /// set before pagination; an empty keyword matches everything.
    pub async fn search(
        &self,
        keyword: &str,
        page: usize,
        page_size: usize,
        tags: &[String],
    ) -> Paginated<Title> {
        let needle = keyword.to_lowercase();
        let matches: Vec<Title> = self
            .titles_or_empty()
            .await
            .into_iter()
            .filter(|title| {
                let keyword_hit = needle.is_empty()
                    || title.display_name.to_lowercase().contains(&needle)
                    || title.description.to_lowercase().contains(&needle);
                let tag_hit = tags.is_empty() || tags.iter().any(|tag| title.tags.contains(tag));
                keyword_hit && tag_hit
            })
            .collect();
        self.paginate(matches, page, page_size)
    }

    /// Title plus its chapters, joined by scanning the chapter index on
    /// `title_id` and ordered by reading ordinal.
    pub async fn detail(&self, title_id: &str) -> Option<Title> {
        let mut title = self
            .titles_or_empty()
            .await
            .into_iter()
            .find(|title| title.id == title_id)?;

        let mut chapters = match self.store.list_chapters(Some(title_id)).await {
            Ok(chapters) => chapters,
            Err(err) => {
                tracing::error!(?err, title_id, "chapter index unreadable; serving title without chapters");
                Vec::new()
            }
        };
        chapters.sort_by_key(|chapter| chapter.ordinal);
        title.chapters = Some(chapters);
        Some(self.with_resolved_cover(title))
    }

    /// Resolves a chapter id to its ordered page URLs. A malformed id
    /// is a client error; an unknown chapter is `None`.
    pub async fn chapter_pages(&self, chapter_id: &str) -> Result<Option<Vec<Page>>> {
        let (title_id, ordinal) = model::parse_chapter_id(chapter_id)?;

        let chapters = match self.store.list_chapters(Some(&title_id)).await {
            Ok(chapters) => chapters,
            Err(err) => {
                tracing::error!(?err, chapter_id, "chapter index unreadable; serving no pages");
                return Ok(None);
            }
        };
        let Some(chapter) = chapters.into_iter().find(|chapter| chapter.ordinal == ordinal)
        else {
            return Ok(None);
        };

        let pages = (1..=chapter.page_count)
            .map(|position| {
                let relative = format!(
                    "{title_id}/{}",
                    model::page_file_name(position, PAGE_EXTENSION)
                );
                Page {
                    id: format!("{chapter_id}-{position}"),
                    chapter_id: chapter_id.to_owned(),
                    ordinal: position,
                    url: self.resolve_asset_url(&relative),
                }
            })
            .collect();
        Ok(Some(pages))
    }

    /// The one place where internal relative references become
    /// externally dereferenceable URLs. Already-qualified values pass
    /// through unchanged.
    fn resolve_asset_url(&self, reference: &str) -> String {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            return reference.to_owned();
        }
        let relative = reference.trim_start_matches('/');
        format!("{}{}/{relative}", self.base_url, self.static_path)
    }

    fn with_resolved_cover(&self, mut title: Title) -> Title {
        title.cover_reference = self.resolve_asset_url(&title.cover_reference);
        title
    }

    fn paginate(&self, titles: Vec<Title>, page: usize, page_size: usize) -> Paginated<Title> {
        let page = page.max(1);
        let page_size = page_size.max(1);
        let total = titles.len();
        let start = (page - 1).saturating_mul(page_size).min(total);
        let end = start.saturating_add(page_size).min(total);
        let items = titles[start..end]
            .iter()
            .cloned()
            .map(|title| self.with_resolved_cover(title))
            .collect();
        Paginated {
            items,
            total,
            page,
            page_size,
            has_more: end < total,
        }
    }

    async fn titles_or_empty(&self) -> Vec<Title> {
        match self.store.list_titles().await {
            Ok(titles) => titles,
            Err(err) => {
                tracing::error!(?err, "title index unreadable; serving empty list");
                Vec::new()
            }
        }
    }
}

fn service_for(config: &Config) -> CatalogQueryService {
    CatalogQueryService::new(
        Arc::new(LocalFsCatalogStore::new(config.library_dir.clone())),
        config.base_url.clone(),
        config.static_path.clone(),
    )
}

pub async fn list(args: ListArgs) -> anyhow::Result<()> {
    let config = Config::resolve(&args.catalog)?;
    let service = service_for(&config);

    if args.latest {
        let titles = service.latest(args.limit).await;
        cli::print_json(&titles)
    } else {
        let result = service.list(args.page, args.page_size).await;
        cli::print_json(&result)
    }
}

pub async fn search(args: SearchArgs) -> anyhow::Result<()> {
    let config = Config::resolve(&args.catalog)?;
    let service = service_for(&config);

    let result = service
        .search(&args.keyword, args.page, args.page_size, &args.tags)
        .await;
    cli::print_json(&result)
}

pub async fn detail(args: DetailArgs) -> anyhow::Result<()> {
    let config = Config::resolve(&args.catalog)?;
    let service = service_for(&config);

    match service.detail(&args.title_id).await {
        Some(title) => cli::print_json(&title),
        None => anyhow::bail!("title not found: {}", args.title_id),
    }
}

pub async fn pages(args: PagesArgs) -> anyhow::Result<()> {
    let config = Config::resolve(&args.catalog)?;
    let service = service_for(&config);

    match service.chapter_pages(&args.chapter_id).await? {
        Some(pages) => cli::print_json(&pages),
        None => anyhow::bail!("chapter not found: {}", args.chapter_id),
    }
}
