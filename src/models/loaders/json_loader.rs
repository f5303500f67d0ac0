use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{AppError, FileError};
use crate::models::chapter::{chapter_file_name, translated_file_name, BookMetadata, ExtractedChapter};
use crate::models::translation::TranslatedChapter;

/// 读取并解析单个 JSON 文件
pub async fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取JSON文件: {}", path.display()))?;

    serde_json::from_str(&content).with_context(|| format!("无法解析JSON文件: {}", path.display()))
}

/// 以缩进格式写入 JSON 文件（非 ASCII 字符原样保留）
///
/// 先写临时文件再重命名，中途中断不会留下半个文件
pub async fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("无法创建目录: {}", parent.display()))?;
        }
    }

    let content = serde_json::to_string_pretty(value)?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, content)
        .await
        .with_context(|| format!("无法写入文件: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("无法重命名文件: {}", path.display()))?;
    Ok(())
}

/// 列出目录下满足条件的文件，按文件名排序
pub async fn list_files<F>(folder: &Path, predicate: F) -> Result<Vec<PathBuf>>
where
    F: Fn(&str) -> bool,
{
    if !folder.is_dir() {
        return Err(AppError::from(FileError::DirectoryNotFound {
            path: folder.display().to_string(),
        })
        .into());
    }

    let mut files = Vec::new();
    let mut entries = fs::read_dir(folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder.display()))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(&predicate)
            .unwrap_or(false);
        if matches {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// 是否为原文章节文件（chapter_NNN.json）
pub fn is_extracted_chapter_file(name: &str) -> bool {
    name.starts_with("chapter_") && name.ends_with(".json") && !name.ends_with("_translated.json")
}

/// 是否为译文章节文件（chapter_NNN_translated.json）
pub fn is_translated_chapter_file(name: &str) -> bool {
    name.starts_with("chapter_") && name.ends_with("_translated.json")
}

/// 读取 metadata.json
pub async fn load_metadata(extracted_dir: &Path) -> Result<BookMetadata> {
    let path = extracted_dir.join("metadata.json");
    if !path.exists() {
        anyhow::bail!("未找到 {}，请先执行 extract", path.display());
    }
    load_json(&path).await
}

/// 读取指定编号的原文章节
pub async fn load_extracted_chapter(extracted_dir: &Path, number: usize) -> Result<ExtractedChapter> {
    load_json(&extracted_dir.join(chapter_file_name(number))).await
}

/// 读取指定编号的译文章节（不存在时返回 None）
pub async fn load_translated_chapter(
    translations_dir: &Path,
    number: usize,
) -> Result<Option<TranslatedChapter>> {
    let path = translations_dir.join(translated_file_name(number));
    if !path.exists() {
        return Ok(None);
    }
    load_json(&path).await.map(Some)
}

/// 从文件夹中加载所有译文章节
///
/// 无法解析的文件只记录警告并跳过
pub async fn load_all_translated(folder: &Path) -> Result<Vec<(PathBuf, TranslatedChapter)>> {
    let files = list_files(folder, is_translated_chapter_file).await?;
    let mut chapters = Vec::with_capacity(files.len());

    for path in files {
        match load_json::<TranslatedChapter>(&path).await {
            Ok(chapter) => {
                tracing::debug!(
                    "已加载 {} ({} 段)",
                    path.file_name().unwrap_or_default().to_string_lossy(),
                    chapter.paragraphs.len()
                );
                chapters.push((path, chapter));
            }
            Err(e) => {
                tracing::warn!("加载文件失败 {}: {:#}", path.display(), e);
            }
        }
    }

    Ok(chapters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_kind_predicates() {
        assert!(is_extracted_chapter_file("chapter_001.json"));
        assert!(!is_extracted_chapter_file("chapter_001_translated.json"));
        assert!(!is_extracted_chapter_file("metadata.json"));
        assert!(is_translated_chapter_file("chapter_001_translated.json"));
        assert!(!is_translated_chapter_file("chapter_001.json"));
    }

    #[tokio::test]
    async fn test_save_then_load_and_skip_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        let chapter = TranslatedChapter {
            number: 1,
            title: "Введение".to_string(),
            paragraphs: vec!["Первый абзац.".to_string()],
            summary: String::new(),
            original_word_count: 2,
            translator: "test".to_string(),
            start_page: Some(0),
            end_page: Some(3),
        };
        save_json(&dir.path().join(translated_file_name(1)), &chapter)
            .await
            .unwrap();
        tokio::fs::write(dir.path().join(translated_file_name(2)), "{ not json")
            .await
            .unwrap();

        let loaded = load_all_translated(dir.path()).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].1, chapter);

        let raw = tokio::fs::read_to_string(dir.path().join(translated_file_name(1)))
            .await
            .unwrap();
        assert!(raw.contains("Введение"), "非 ASCII 文本应原样写入");
        assert!(!dir.path().join("chapter_001_translated.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_missing_folder_is_directory_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = list_files(&dir.path().join("nope"), |_| true).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AppError>(),
            Some(AppError::File(FileError::DirectoryNotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_missing_translation_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_translated_chapter(dir.path(), 5).await.unwrap().is_none());
    }
}
