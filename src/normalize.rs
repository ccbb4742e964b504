use std::path::{Path, PathBuf};

use anyhow::Context as _;

/// Extensions accepted as page images; everything else is ignored.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Copies the page images of `source_dir` into a clean `target_dir`
/// under canonical names (1-based position, zero-padded to 5 digits,
/// original extension preserved) and returns the new file names in
/// reading order.
///
/// Reading order is the numeric value of the first run of decimal
/// digits in each file stem; files without digits sort first. An empty
/// source yields an empty list and leaves `target_dir` untouched. The
/// caller owns removal of `source_dir`.
pub fn normalize(source_dir: &Path, target_dir: &Path) -> anyhow::Result<Vec<String>> {
    let mut sources: Vec<(u64, String, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(source_dir)
        .with_context(|| format!("read source dir: {}", source_dir.display()))?
    {
        let entry = entry.context("read source dir entry")?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(extension) = path.extension().and_then(|ext| ext.to_str()) else {
            continue;
        };
        if !IMAGE_EXTENSIONS
            .iter()
            .any(|allowed| extension.eq_ignore_ascii_case(allowed))
        {
            continue;
        }
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let stem = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default();
        sources.push((page_sort_key(stem), name.to_owned(), path.clone()));
    }

    if sources.is_empty() {
        return Ok(Vec::new());
    }
    sources.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    if target_dir.exists() {
        std::fs::remove_dir_all(target_dir)
            .with_context(|| format!("clear stale target dir: {}", target_dir.display()))?;
    }
    std::fs::create_dir_all(target_dir)
        .with_context(|| format!("create target dir: {}", target_dir.display()))?;

    let mut copied = Vec::with_capacity(sources.len());
    for (position, (_, name, source_path)) in sources.into_iter().enumerate() {
        let extension = Path::new(&name)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        let new_name = crate::model::page_file_name(position as u32 + 1, extension);
        let target_path = target_dir.join(&new_name);
        std::fs::copy(&source_path, &target_path).with_context(|| {
            format!(
                "copy page: {} -> {}",
                source_path.display(),
                target_path.display()
            )
        })?;
        copied.push(new_name);
    }

    Ok(copied)
}

/// First run of decimal digits in the file stem, as an integer; 0 when
/// the stem has no digits.
fn page_sort_key(file_stem: &str) -> u64 {
    let mut digits = String::new();
    for ch in file_stem.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
        } else if !digits.is_empty() {
            break;
        }
    }
    if digits.is_empty() {
        return 0;
    }
    digits.parse().unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_key_takes_first_digit_run() {
        assert_eq!(page_sort_key("cover"), 0);
        assert_eq!(page_sort_key("img_12"), 12);
        assert_eq!(page_sort_key("007_outtake_99"), 7);
        assert_eq!(page_sort_key("page10"), 10);
    }

    #[test]
    fn orders_digitless_files_first_and_preserves_extensions() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let source = temp.path().join("raw");
        std::fs::create_dir_all(&source)?;
        std::fs::write(source.join("img_3.png"), b"three")?;
        std::fs::write(source.join("img_1.jpg"), b"one")?;
        std::fs::write(source.join("cover.webp"), b"zero")?;
        let target = temp.path().join("canonical");

        let pages = normalize(&source, &target)?;
        assert_eq!(pages, ["00001.webp", "00002.jpg", "00003.png"]);
        assert_eq!(std::fs::read(target.join("00001.webp"))?, b"zero");
        assert_eq!(std::fs::read(target.join("00002.jpg"))?, b"one");
        assert_eq!(std::fs::read(target.join("00003.png"))?, b"three");
        Ok(())
    }

    #[test]
    fn non_image_files_are_ignored() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let source = temp.path().join("raw");
        std::fs::create_dir_all(&source)?;
        std::fs::write(source.join("001.jpg"), b"page")?;
        std::fs::write(source.join("info.txt"), b"not a page")?;
        std::fs::write(source.join("thumbs.db"), b"noise")?;
        let target = temp.path().join("canonical");

        let pages = normalize(&source, &target)?;
        assert_eq!(pages, ["00001.jpg"]);
        assert!(!target.join("info.txt").exists());
        Ok(())
    }

    #[test]
    fn empty_source_leaves_existing_target_untouched() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let source = temp.path().join("raw");
        std::fs::create_dir_all(&source)?;
        std::fs::write(source.join("notes.txt"), b"no images here")?;
        let target = temp.path().join("canonical");
        std::fs::create_dir_all(&target)?;
        std::fs::write(target.join("00001.jpg"), b"previous ingest")?;

        let pages = normalize(&source, &target)?;
        assert!(pages.is_empty());
        assert_eq!(std::fs::read(target.join("00001.jpg"))?, b"previous ingest");
        Ok(())
    }

    #[test]
    fn reingest_clears_stale_pages() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let source = temp.path().join("raw");
        std::fs::create_dir_all(&source)?;
        std::fs::write(source.join("1.png"), b"fresh")?;
        let target = temp.path().join("canonical");
        std::fs::create_dir_all(&target)?;
        std::fs::write(target.join("00009.png"), b"stale")?;

        let pages = normalize(&source, &target)?;
        assert_eq!(pages, ["00001.png"]);
        assert!(!target.join("00009.png").exists());
        Ok(())
    }

    #[test]
    fn uppercase_extensions_are_accepted() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let source = temp.path().join("raw");
        std::fs::create_dir_all(&source)?;
        std::fs::write(source.join("01.JPG"), b"page")?;
        let target = temp.path().join("canonical");

        let pages = normalize(&source, &target)?;
        assert_eq!(pages, ["00001.JPG"]);
        Ok(())
    }
}
