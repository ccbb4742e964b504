use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result};

/// Separator between the title id and the chapter ordinal in a chapter id.
/// Title ids must not contain it; see [`validate_title_id`].
pub const CHAPTER_ID_SEPARATOR: char = '-';

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Ongoing,
    Completed,
}

/// One comic/series entry in the catalog.
///
/// `chapters` is populated only on detail reads and omitted from list
/// reads and from the persisted index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Title {
    pub id: String,
    pub display_name: String,
    pub cover_reference: String,
    pub author: String,
    pub description: String,
    pub tags: Vec<String>,
    pub last_updated: NaiveDate,
    pub lifecycle_state: LifecycleState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapters: Option<Vec<Chapter>>,
}

/// One orderable unit of pages within a title. `title_id` is a
/// non-owning back-reference; chapters are found by scanning, never by
/// following a pointer from the title.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chapter {
    pub id: String,
    pub title_id: String,
    pub display_name: String,
    pub ordinal: u32,
    pub last_updated: NaiveDate,
    pub page_count: u32,
}

/// Derived at read time from a chapter's `page_count`; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page {
    pub id: String,
    pub chapter_id: String,
    pub ordinal: u32,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub has_more: bool,
}

pub fn chapter_id(title_id: &str, ordinal: u32) -> String {
    format!("{title_id}{CHAPTER_ID_SEPARATOR}{ordinal}")
}

/// Parses a chapter id back into `(title_id, ordinal)`.
///
/// The id must contain exactly one separator and a 1-based decimal
/// ordinal; anything else is a client error.
pub fn parse_chapter_id(id: &str) -> Result<(String, u32)> {
    if id.chars().filter(|ch| *ch == CHAPTER_ID_SEPARATOR).count() != 1 {
        return Err(CatalogError::MalformedChapterId(id.to_owned()));
    }
    let (title_id, ordinal) = id
        .split_once(CHAPTER_ID_SEPARATOR)
        .ok_or_else(|| CatalogError::MalformedChapterId(id.to_owned()))?;
    if title_id.is_empty() {
        return Err(CatalogError::MalformedChapterId(id.to_owned()));
    }
    let ordinal: u32 = ordinal
        .parse()
        .map_err(|_| CatalogError::MalformedChapterId(id.to_owned()))?;
    if ordinal == 0 {
        return Err(CatalogError::MalformedChapterId(id.to_owned()));
    }
    Ok((title_id.to_owned(), ordinal))
}

/// Canonical page file name: 1-based position, zero-padded to 5 digits.
pub fn page_file_name(position: u32, extension: &str) -> String {
    format!("{position:05}.{extension}")
}

/// Title ids name filesystem directories and embed into chapter ids,
/// so they must be path-safe and separator-free.
pub fn validate_title_id(title_id: &str) -> Result<()> {
    let reject = |reason| Err(CatalogError::InvalidTitleId(title_id.to_owned(), reason));

    if title_id.is_empty() {
        return reject("must not be empty");
    }
    if title_id.contains(['/', '\\']) || title_id.contains("..") {
        return reject("must not contain path separators or '..'");
    }
    if title_id.starts_with('.') {
        return reject("must not start with '.'");
    }
    if title_id.contains(CHAPTER_ID_SEPARATOR) {
        return reject("must not contain '-'");
    }
    Ok(())
}
