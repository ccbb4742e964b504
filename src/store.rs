use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;

use crate::model::{Chapter, Title};

pub const TITLES_FILE: &str = "comics.json";
pub const CHAPTERS_FILE: &str = "chapters.json";

/// Persistent catalog index: titles and chapters in two JSON array
/// files plus one asset directory per title. Backends are swappable;
/// [`LocalFsCatalogStore`] is the filesystem implementation.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn upsert_title(&self, record: &Title) -> anyhow::Result<()>;
    async fn upsert_chapter(&self, record: &Chapter) -> anyhow::Result<()>;
    /// Removes the title record, every chapter referencing it, and the
    /// title's asset directory. Returns false when no record existed.
    async fn delete_title(&self, title_id: &str) -> anyhow::Result<bool>;
    async fn list_titles(&self) -> anyhow::Result<Vec<Title>>;
    async fn list_chapters(&self, title_id: Option<&str>) -> anyhow::Result<Vec<Chapter>>;
}

#[derive(Debug)]
pub struct LocalFsCatalogStore {
    root: PathBuf,
    titles_write: Mutex<()>,
    chapters_write: Mutex<()>,
}

impl LocalFsCatalogStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            titles_write: Mutex::new(()),
            chapters_write: Mutex::new(()),
        }
    }

    fn titles_path(&self) -> PathBuf {
        self.root.join(TITLES_FILE)
    }

    fn chapters_path(&self) -> PathBuf {
        self.root.join(CHAPTERS_FILE)
    }

    fn title_dir(&self, title_id: &str) -> PathBuf {
        self.root.join(title_id)
    }
}

#[async_trait]
impl CatalogStore for LocalFsCatalogStore {
    async fn upsert_title(&self, record: &Title) -> anyhow::Result<()> {
        let _guard = self.titles_write.lock().await;

        let mut record = record.clone();
        record.chapters = None;

        let path = self.titles_path();
        let mut titles: Vec<Title> = read_json_list(&path).await?;
        match titles.iter_mut().find(|existing| existing.id == record.id) {
            Some(existing) => *existing = record,
            None => titles.push(record),
        }
        write_json_atomic(&path, &titles).await.context("write title index")
    }

    async fn upsert_chapter(&self, record: &Chapter) -> anyhow::Result<()> {
        let _guard = self.chapters_write.lock().await;

        let path = self.chapters_path();
        let mut chapters: Vec<Chapter> = read_json_list(&path).await?;
        match chapters.iter_mut().find(|existing| existing.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => chapters.push(record.clone()),
        }
        write_json_atomic(&path, &chapters)
            .await
            .context("write chapter index")
    }

    async fn delete_title(&self, title_id: &str) -> anyhow::Result<bool> {
        let removed = {
            let _guard = self.titles_write.lock().await;
            let path = self.titles_path();
            let mut titles: Vec<Title> = read_json_list(&path).await?;
            let before = titles.len();
            titles.retain(|title| title.id != title_id);
            if titles.len() != before {
                write_json_atomic(&path, &titles)
                    .await
                    .context("write title index")?;
                true
            } else {
                false
            }
        };

        {
            let _guard = self.chapters_write.lock().await;
            let path = self.chapters_path();
            let mut chapters: Vec<Chapter> = read_json_list(&path).await?;
            let before = chapters.len();
            chapters.retain(|chapter| chapter.title_id != title_id);
            if chapters.len() != before {
                write_json_atomic(&path, &chapters)
                    .await
                    .context("write chapter index")?;
            }
        }

        let asset_dir = self.title_dir(title_id);
        match fs::remove_dir_all(&asset_dir).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("remove asset dir: {}", asset_dir.display())
                });
            }
        }

        Ok(removed)
    }

    async fn list_titles(&self) -> anyhow::Result<Vec<Title>> {
        read_json_list(&self.titles_path()).await
    }

    async fn list_chapters(&self, title_id: Option<&str>) -> anyhow::Result<Vec<Chapter>> {
        let mut chapters: Vec<Chapter> = read_json_list(&self.chapters_path()).await?;
        if let Some(title_id) = title_id {
            chapters.retain(|chapter| chapter.title_id == title_id);
        }
        Ok(chapters)
    }
}

/// An absent index file reads as an empty list, not an error; the
/// files are created lazily on first write.
async fn read_json_list<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(err).with_context(|| format!("read index: {}", path.display()));
        }
    };
    serde_json::from_slice(&bytes).with_context(|| format!("parse index: {}", path.display()))
}

/// Readers must never observe a torn file, so writes land in a temp
/// file next to the target and replace it via rename.
async fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("index path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("create catalog dir: {}", parent.display()))?;

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    let data = serde_json::to_vec_pretty(value).context("serialize index")?;
    fs::write(&tmp_path, &data)
        .await
        .with_context(|| format!("write tmp index: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("rename tmp index to final: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::model::LifecycleState;

    fn title(id: &str, name: &str) -> Title {
        Title {
            id: id.to_owned(),
            display_name: name.to_owned(),
            cover_reference: format!("{id}/00001.jpg"),
            author: "Unknown".to_owned(),
            description: String::new(),
            tags: Vec::new(),
            last_updated: NaiveDate::from_ymd_opt(2026, 8, 5).unwrap(),
            lifecycle_state: LifecycleState::Completed,
            chapters: None,
        }
    }

    fn chapter(title_id: &str, ordinal: u32, page_count: u32) -> Chapter {
        Chapter {
            id: crate::model::chapter_id(title_id, ordinal),
            title_id: title_id.to_owned(),
            display_name: format!("Chapter {ordinal}"),
            ordinal,
            last_updated: NaiveDate::from_ymd_opt(2026, 8, 5).unwrap(),
            page_count,
        }
    }

    #[tokio::test]
    async fn absent_index_files_read_as_empty() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let store = LocalFsCatalogStore::new(temp.path());

        assert!(store.list_titles().await?.is_empty());
        assert!(store.list_chapters(None).await?.is_empty());
        assert!(!temp.path().join(TITLES_FILE).exists());
        Ok(())
    }

    #[tokio::test]
    async fn upsert_twice_yields_identical_file_with_one_record() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let store = LocalFsCatalogStore::new(temp.path());
        let record = title("t1", "Example");

        store.upsert_title(&record).await?;
        let first = std::fs::read(temp.path().join(TITLES_FILE))?;

        store.upsert_title(&record).await?;
        let second = std::fs::read(temp.path().join(TITLES_FILE))?;

        assert_eq!(first, second);
        assert_eq!(store.list_titles().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn upsert_replaces_in_place_and_appends_new() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let store = LocalFsCatalogStore::new(temp.path());

        store.upsert_title(&title("t1", "First")).await?;
        store.upsert_title(&title("t2", "Second")).await?;
        store.upsert_title(&title("t1", "First, renamed")).await?;

        let titles = store.list_titles().await?;
        assert_eq!(titles.len(), 2);
        assert_eq!(titles[0].id, "t1");
        assert_eq!(titles[0].display_name, "First, renamed");
        assert_eq!(titles[1].id, "t2");
        Ok(())
    }

    #[tokio::test]
    async fn titles_are_stored_without_chapters() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let store = LocalFsCatalogStore::new(temp.path());

        let mut record = title("t1", "Example");
        record.chapters = Some(vec![chapter("t1", 1, 3)]);
        store.upsert_title(&record).await?;

        let raw = std::fs::read_to_string(temp.path().join(TITLES_FILE))?;
        assert!(!raw.contains("chapters"));
        Ok(())
    }

    #[tokio::test]
    async fn delete_cascades_to_chapters_and_assets() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let store = LocalFsCatalogStore::new(temp.path());

        store.upsert_title(&title("t1", "Doomed")).await?;
        store.upsert_title(&title("t2", "Survivor")).await?;
        store.upsert_chapter(&chapter("t1", 1, 3)).await?;
        store.upsert_chapter(&chapter("t1", 2, 5)).await?;
        store.upsert_chapter(&chapter("t2", 1, 1)).await?;

        let asset_dir = temp.path().join("t1");
        std::fs::create_dir_all(&asset_dir)?;
        std::fs::write(asset_dir.join("00001.jpg"), b"page")?;

        assert!(store.delete_title("t1").await?);
        assert!(!asset_dir.exists());

        let titles = store.list_titles().await?;
        assert_eq!(titles.len(), 1);
        assert_eq!(titles[0].id, "t2");

        let chapters = store.list_chapters(None).await?;
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].title_id, "t2");

        assert!(!store.delete_title("t1").await?);
        Ok(())
    }

    #[tokio::test]
    async fn chapter_filter_by_title_id() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let store = LocalFsCatalogStore::new(temp.path());

        store.upsert_chapter(&chapter("t1", 1, 3)).await?;
        store.upsert_chapter(&chapter("t2", 1, 4)).await?;

        let filtered = store.list_chapters(Some("t2")).await?;
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].page_count, 4);
        Ok(())
    }

    #[tokio::test]
    async fn non_ascii_text_survives_round_trips() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let store = LocalFsCatalogStore::new(temp.path());

        let mut record = title("t1", "鋼の錬金術師");
        record.tags = vec!["冒険".to_owned(), "ファンタジー".to_owned()];
        store.upsert_title(&record).await?;
        store.upsert_title(&record).await?;

        let raw = std::fs::read_to_string(temp.path().join(TITLES_FILE))?;
        assert!(raw.contains("鋼の錬金術師"));

        let titles = store.list_titles().await?;
        assert_eq!(titles[0].display_name, "鋼の錬金術師");
        assert_eq!(titles[0].tags, ["冒険", "ファンタジー"]);
        Ok(())
    }
}
