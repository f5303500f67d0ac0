//! 进度报告

use anyhow::Result;
use tracing::info;

use crate::config::Config;
use crate::models::loaders::{is_translated_chapter_file, list_files, load_json, load_metadata};
use crate::models::{ProgressFile, TranslatedChapter};
use crate::services::ProgressTracker;
use crate::utils::logging;

/// 预览的译文文件数
const PREVIEW_FILES: usize = 5;
const PREVIEW_CHARS: usize = 100;

/// 单个译文文件的预览
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedPreview {
    pub file_name: String,
    pub paragraphs: usize,
    pub preview: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusReport {
    /// metadata.json 中的章节数（未拆分时为 None）
    pub extracted_chapters: Option<usize>,
    pub total_pages: usize,
    pub translated_files: usize,
    pub previews: Vec<TranslatedPreview>,
    pub progress: ProgressFile,
    pub pending: Vec<usize>,
}

/// 汇总各目录状态
pub async fn collect_status(config: &Config) -> Result<StatusReport> {
    let mut report = StatusReport::default();
    let translations = config.translations_path();

    let tracker = ProgressTracker::load(&config.progress_path(), &translations).await;
    report.progress = tracker.progress().clone();

    if let Ok(metadata) = load_metadata(&config.extracted_path()).await {
        report.extracted_chapters = Some(metadata.chapters.len());
        report.total_pages = metadata.total_pages;
        report.pending = metadata
            .chapters
            .iter()
            .map(|c| c.number)
            .filter(|n| !tracker.is_chapter_translated(*n))
            .collect();
    }

    if translations.exists() {
        let files = list_files(&translations, is_translated_chapter_file).await?;
        report.translated_files = files.len();
        for path in files.iter().take(PREVIEW_FILES) {
            let Ok(chapter) = load_json::<TranslatedChapter>(path).await else {
                continue;
            };
            report.previews.push(TranslatedPreview {
                file_name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                paragraphs: chapter.paragraphs.len(),
                preview: chapter
                    .paragraphs
                    .first()
                    .map(|p| logging::truncate_text(p, PREVIEW_CHARS))
                    .unwrap_or_default(),
            });
        }
    }

    Ok(report)
}

impl StatusReport {
    pub fn log(&self) {
        logging::log_section("📊 项目状态");
        match self.extracted_chapters {
            Some(n) => info!("📖 已拆分: {} 章, {} 页", n, self.total_pages),
            None => info!("❌ 尚未拆分书籍"),
        }

        if self.translated_files == 0 {
            info!("❌ 还没有译文");
        } else {
            info!("✅ 已翻译: {} 章", self.translated_files);
            for preview in &self.previews {
                info!("  📄 {} ({} 段)", preview.file_name, preview.paragraphs);
                info!("     {}", preview.preview);
            }
        }

        logging::log_stats_lines(&[
            (
                "📈 进度文件",
                format!(
                    "{}/{} 章完成",
                    self.progress.completed_chapters, self.progress.total_chapters
                ),
            ),
            (
                "⏳ 当前章节",
                self.progress
                    .current_chapter
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            ("📝 待翻译", format!("{:?}", self.pending)),
        ]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::loaders::save_json;
    use crate::models::{translated_file_name, BookMetadata, ChapterEntry};

    fn entry(number: usize) -> ChapterEntry {
        ChapterEntry {
            number,
            title: format!("Chapter {}", number),
            start_page: number,
            end_page: number,
            page_count: 1,
            status: "extracted".to_string(),
        }
    }

    #[tokio::test]
    async fn test_status_lists_pending_and_previews() {
        let dir = tempfile::tempdir().unwrap();
        let path = |name: &str| dir.path().join(name).to_string_lossy().into_owned();
        let config = Config {
            extracted_dir: path("extracted"),
            translations_dir: path("translations"),
            progress_dir: path("progress"),
            ..Config::default()
        };

        let metadata = BookMetadata {
            total_pages: 3,
            chapters: vec![entry(0), entry(1), entry(2)],
            extraction_complete: true,
            ..Default::default()
        };
        save_json(&config.extracted_path().join("metadata.json"), &metadata)
            .await
            .unwrap();
        let translated = TranslatedChapter {
            number: 1,
            title: "Глава".to_string(),
            paragraphs: vec!["а".repeat(150), "б".to_string()],
            summary: String::new(),
            original_word_count: 0,
            translator: String::new(),
            start_page: None,
            end_page: None,
        };
        save_json(&config.translations_path().join(translated_file_name(1)), &translated)
            .await
            .unwrap();

        let report = collect_status(&config).await.unwrap();
        assert_eq!(report.extracted_chapters, Some(3));
        assert_eq!(report.pending, vec![0, 2]);
        assert_eq!(report.translated_files, 1);
        assert_eq!(report.previews[0].paragraphs, 2);
        assert_eq!(report.previews[0].preview.chars().count(), 103);
    }

    #[tokio::test]
    async fn test_status_of_empty_project() {
        let dir = tempfile::tempdir().unwrap();
        let path = |name: &str| dir.path().join(name).to_string_lossy().into_owned();
        let config = Config {
            extracted_dir: path("extracted"),
            translations_dir: path("translations"),
            progress_dir: path("progress"),
            ..Config::default()
        };
        let report = collect_status(&config).await.unwrap();
        assert_eq!(report.extracted_chapters, None);
        assert_eq!(report.translated_files, 0);
        assert!(report.pending.is_empty());
    }
}
