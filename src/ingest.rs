use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::Context as _;
use chrono::Utc;
use tokio::sync::{Mutex, Semaphore};

use crate::cli::{self, DeleteArgs, IngestArgs};
use crate::config::Config;
use crate::error::{CatalogError, Result};
use crate::fetch::{CommandFetcher, Fetcher};
use crate::model::{self, Chapter, LifecycleState, Title};
use crate::notify::{CatalogAction, EventBroadcaster};
use crate::store::{CatalogStore, LocalFsCatalogStore};

const MAX_CONCURRENT_INGESTS: usize = 4;

/// Orchestrates one title's path from raw fetch output to catalog
/// records: fetch, discover, normalize, derive, persist, clean up,
/// notify. Runs for the same title identifier never interleave; runs
/// for different identifiers may proceed in parallel.
pub struct IngestionPipeline {
    config: Config,
    store: Arc<dyn CatalogStore>,
    fetcher: Arc<dyn Fetcher>,
    events: EventBroadcaster,
    title_locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
    dispatch_slots: Arc<Semaphore>,
}

impl IngestionPipeline {
    pub fn new(
        config: Config,
        store: Arc<dyn CatalogStore>,
        fetcher: Arc<dyn Fetcher>,
        events: EventBroadcaster,
    ) -> Self {
        Self {
            config,
            store,
            fetcher,
            events,
            title_locks: std::sync::Mutex::new(HashMap::new()),
            dispatch_slots: Arc::new(Semaphore::new(MAX_CONCURRENT_INGESTS)),
        }
    }

    pub fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    /// Ingests one title. A canonical directory already on disk means
    /// the title was ingested before; the stored record is returned
    /// without re-fetching.
    pub async fn ingest(&self, title_id: &str) -> Result<Title> {
        model::validate_title_id(title_id)?;
        let lock = self.title_lock(title_id);
        let _guard = lock.lock().await;

        let target_dir = self.config.title_dir(title_id);
        if target_dir.exists() {
            tracing::info!(title_id, "canonical directory present; skipping fetch");
            return self.existing_record(title_id).await;
        }

        let staging_dir = self.config.staging_dir();
        tokio::fs::create_dir_all(&staging_dir)
            .await
            .with_context(|| format!("create staging dir: {}", staging_dir.display()))?;

        let before = subdirectories(&staging_dir)?;
        self.fetcher
            .fetch(title_id, &staging_dir)
            .await
            .context("run fetcher")?;
        let Some(discovered) = newest_new_subdirectory(&staging_dir, &before)? else {
            return Err(CatalogError::FetchFailed(title_id.to_owned()));
        };
        tracing::info!(title_id, raw = %discovered.display(), "fetcher output located");

        let outcome = self
            .normalize_and_persist(title_id, &discovered, &target_dir)
            .await;

        if let Err(err) = std::fs::remove_dir_all(&discovered) {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(raw = %discovered.display(), ?err, "failed to remove raw fetch directory");
            }
        }

        let title = outcome?;
        self.events.publish(CatalogAction::TitleAdded, title_id);
        tracing::info!(title_id, "ingest complete");
        Ok(title)
    }

    /// Cascade delete: record, chapters, asset directory. Idempotent;
    /// notifies only when a record was actually removed.
    pub async fn delete_title(&self, title_id: &str) -> Result<bool> {
        let lock = self.title_lock(title_id);
        let _guard = lock.lock().await;
        delete_title(self.store.as_ref(), &self.events, title_id).await
    }

    /// Background unit of work: returns immediately, the ingest runs
    /// on the runtime under a bounded number of concurrent slots.
    /// Outcome is observable through the event channel and the logs.
    pub fn dispatch(self: &Arc<Self>, title_id: &str) {
        let pipeline = Arc::clone(self);
        let slots = Arc::clone(&self.dispatch_slots);
        let title_id = title_id.to_owned();
        tokio::spawn(async move {
            let _permit = slots
                .acquire_owned()
                .await
                .expect("ingest semaphore is closed");
            match pipeline.ingest(&title_id).await {
                Ok(_) => tracing::info!(title_id, "background ingest finished"),
                Err(err) => tracing::error!(title_id, ?err, "background ingest failed"),
            }
        });
    }

    fn title_lock(&self, title_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .title_locks
            .lock()
            .expect("title lock table is poisoned");
        Arc::clone(locks.entry(title_id.to_owned()).or_default())
    }

    async fn normalize_and_persist(
        &self,
        title_id: &str,
        discovered: &Path,
        target_dir: &Path,
    ) -> Result<Title> {
        let pages = crate::normalize::normalize(discovered, target_dir).context("normalize pages")?;
        if pages.is_empty() {
            return Err(CatalogError::NoPages(title_id.to_owned()));
        }

        let display_name = discovered
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(title_id);
        let title = build_title_record(title_id, display_name, &pages);
        let chapter = build_chapter_record(title_id, pages.len() as u32);

        self.store
            .upsert_title(&title)
            .await
            .context("upsert title record")?;
        self.store
            .upsert_chapter(&chapter)
            .await
            .context("upsert chapter record")?;

        let mut title = title;
        title.chapters = Some(vec![chapter]);
        Ok(title)
    }

    async fn existing_record(&self, title_id: &str) -> Result<Title> {
        let titles = self.store.list_titles().await.context("read title index")?;
        let Some(mut title) = titles.into_iter().find(|title| title.id == title_id) else {
            return Err(anyhow::anyhow!(
                "directory for title {title_id:?} exists but the catalog has no record; delete the title to re-ingest"
            )
            .into());
        };
        let mut chapters = self
            .store
            .list_chapters(Some(title_id))
            .await
            .context("read chapter index")?;
        chapters.sort_by_key(|chapter| chapter.ordinal);
        title.chapters = Some(chapters);
        Ok(title)
    }
}

/// Shared by the pipeline and the CLI delete path.
pub async fn delete_title(
    store: &dyn CatalogStore,
    events: &EventBroadcaster,
    title_id: &str,
) -> Result<bool> {
    model::validate_title_id(title_id)?;
    let removed = store.delete_title(title_id).await.context("delete title")?;
    if removed {
        events.publish(CatalogAction::TitleDeleted, title_id);
        tracing::info!(title_id, "title deleted");
    } else {
        tracing::info!(title_id, "delete was a no-op; title not in catalog");
    }
    Ok(removed)
}

/// Default metadata until the fetcher collaborator grows a richer
/// contract: name from the raw directory, cover from the first page.
fn build_title_record(title_id: &str, display_name: &str, pages: &[String]) -> Title {
    Title {
        id: title_id.to_owned(),
        display_name: display_name.to_owned(),
        cover_reference: format!("{title_id}/{}", pages[0]),
        author: "Unknown".to_owned(),
        description: String::new(),
        tags: Vec::new(),
        last_updated: Utc::now().date_naive(),
        lifecycle_state: LifecycleState::Completed,
        chapters: None,
    }
}

fn build_chapter_record(title_id: &str, page_count: u32) -> Chapter {
    Chapter {
        id: model::chapter_id(title_id, 1),
        title_id: title_id.to_owned(),
        display_name: "Chapter 1".to_owned(),
        ordinal: 1,
        last_updated: Utc::now().date_naive(),
        page_count,
    }
}

fn subdirectories(dir: &Path) -> anyhow::Result<HashSet<OsString>> {
    let mut names = HashSet::new();
    for entry in
        std::fs::read_dir(dir).with_context(|| format!("read staging dir: {}", dir.display()))?
    {
        let entry = entry.context("read staging dir entry")?;
        if entry.file_type().context("read file type")?.is_dir() {
            names.insert(entry.file_name());
        }
    }
    Ok(names)
}

/// The fetcher's output naming is not ours, so its result is located
/// by set difference around the invocation; when several directories
/// appeared, the most recently modified one wins.
fn newest_new_subdirectory(
    dir: &Path,
    before: &HashSet<OsString>,
) -> anyhow::Result<Option<PathBuf>> {
    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in
        std::fs::read_dir(dir).with_context(|| format!("read staging dir: {}", dir.display()))?
    {
        let entry = entry.context("read staging dir entry")?;
        if !entry.file_type().context("read file type")?.is_dir() {
            continue;
        }
        if before.contains(&entry.file_name()) {
            continue;
        }
        let modified = entry
            .metadata()
            .context("read metadata")?
            .modified()
            .context("read modification time")?;
        match &newest {
            Some((best, _)) if *best >= modified => {}
            _ => newest = Some((modified, entry.path())),
        }
    }
    Ok(newest.map(|(_, path)| path))
}

pub async fn run(args: IngestArgs) -> anyhow::Result<()> {
    let config = Config::resolve(&args.catalog)?;

    let program = args
        .fetch_command
        .clone()
        .or_else(|| std::env::var("TANKOBON_FETCH_COMMAND").ok())
        .context("no fetch command: pass --fetch-command or set TANKOBON_FETCH_COMMAND")?;
    let timeout = args
        .fetch_timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(config.fetch_timeout);
    let fetcher = CommandFetcher::new(program, args.fetch_args.clone(), timeout);

    let pipeline = IngestionPipeline::new(
        config.clone(),
        Arc::new(LocalFsCatalogStore::new(config.library_dir.clone())),
        Arc::new(fetcher),
        EventBroadcaster::new(16),
    );

    let title = pipeline.ingest(&args.title_id).await?;
    cli::print_json(&title)
}

pub async fn delete(args: DeleteArgs) -> anyhow::Result<()> {
    let config = Config::resolve(&args.catalog)?;
    let store = LocalFsCatalogStore::new(config.library_dir.clone());
    let events = EventBroadcaster::new(16);

    let removed = delete_title(&store, &events, &args.title_id).await?;
    cli::print_json(&serde_json::json!({
        "title_id": args.title_id,
        "deleted": removed,
    }))
}
