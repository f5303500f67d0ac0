//! 翻译进度
//!
//! 进度文件只是辅助记录，译文文件是否存在才是章节完成的最终依据

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::models::loaders::{load_json, save_json};
use crate::models::{translated_file_name, ChapterProgress, ChapterStatus, ProgressFile};

pub const PROGRESS_FILE_NAME: &str = "translation_progress.json";

/// 进度跟踪器
///
/// 每次修改立即落盘；并发场景下放在 `tokio::sync::Mutex` 后共享
pub struct ProgressTracker {
    progress_file: PathBuf,
    translations_dir: PathBuf,
    progress: ProgressFile,
}

impl ProgressTracker {
    /// 读取已有进度，文件损坏时从空进度开始
    pub async fn load(progress_dir: &Path, translations_dir: &Path) -> Self {
        let progress_file = progress_dir.join(PROGRESS_FILE_NAME);
        let progress = if progress_file.exists() {
            match load_json::<ProgressFile>(&progress_file).await {
                Ok(progress) => progress,
                Err(e) => {
                    warn!("进度文件无法解析，重新开始记录: {:#}", e);
                    ProgressFile::default()
                }
            }
        } else {
            ProgressFile::default()
        };

        Self {
            progress_file,
            translations_dir: translations_dir.to_path_buf(),
            progress,
        }
    }

    pub fn progress(&self) -> &ProgressFile {
        &self.progress
    }

    pub async fn set_total_chapters(&mut self, total: usize) -> Result<()> {
        self.progress.total_chapters = total;
        self.save().await
    }

    pub async fn mark_chapter_start(&mut self, chapter: usize, paragraphs_total: usize) -> Result<()> {
        self.progress.current_chapter = Some(chapter);
        let now = now_iso();
        let entry = self
            .progress
            .chapters
            .entry(chapter.to_string())
            .or_insert_with(|| ChapterProgress {
                status: ChapterStatus::InProgress,
                started_at: Some(now),
                completed_at: None,
                paragraphs_total,
                paragraphs_completed: 0,
            });
        if entry.status != ChapterStatus::Completed {
            entry.status = ChapterStatus::InProgress;
            entry.paragraphs_total = paragraphs_total;
        }
        self.save().await
    }

    pub async fn mark_chapter_complete(&mut self, chapter: usize) -> Result<()> {
        let now = now_iso();
        let entry = self
            .progress
            .chapters
            .entry(chapter.to_string())
            .or_insert_with(|| ChapterProgress {
                status: ChapterStatus::Pending,
                started_at: None,
                completed_at: None,
                paragraphs_total: 0,
                paragraphs_completed: 0,
            });
        if entry.status != ChapterStatus::Completed {
            entry.status = ChapterStatus::Completed;
            entry.completed_at = Some(now);
            entry.paragraphs_completed = entry.paragraphs_total;
            self.progress.completed_chapters += 1;
        }
        self.save().await
    }

    /// 进度记录为完成，或译文文件已存在
    pub fn is_chapter_translated(&self, chapter: usize) -> bool {
        let recorded = self
            .progress
            .chapters
            .get(&chapter.to_string())
            .map(|c| c.status == ChapterStatus::Completed)
            .unwrap_or(false);
        recorded || self.translations_dir.join(translated_file_name(chapter)).exists()
    }

    async fn save(&mut self) -> Result<()> {
        self.progress.last_updated = Some(now_iso());
        save_json(&self.progress_file, &self.progress).await
    }
}

fn now_iso() -> String {
    chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_progress_persists_and_counts_once() {
        let dir = tempfile::tempdir().unwrap();
        let progress_dir = dir.path().join("progress");
        let translations = dir.path().join("translations");

        let mut tracker = ProgressTracker::load(&progress_dir, &translations).await;
        tracker.mark_chapter_start(4, 12).await.unwrap();
        assert!(!tracker.is_chapter_translated(4));
        tracker.mark_chapter_complete(4).await.unwrap();
        tracker.mark_chapter_complete(4).await.unwrap();

        let reloaded = ProgressTracker::load(&progress_dir, &translations).await;
        let progress = reloaded.progress();
        assert_eq!(progress.completed_chapters, 1);
        assert_eq!(progress.current_chapter, Some(4));
        assert_eq!(progress.chapters["4"].status, ChapterStatus::Completed);
        assert_eq!(progress.chapters["4"].paragraphs_completed, 12);
        assert!(progress.last_updated.is_some());
        assert!(reloaded.is_chapter_translated(4));
    }

    #[tokio::test]
    async fn test_translation_file_counts_as_done() {
        let dir = tempfile::tempdir().unwrap();
        let translations = dir.path().join("translations");
        tokio::fs::create_dir_all(&translations).await.unwrap();
        tokio::fs::write(translations.join(translated_file_name(2)), "{}")
            .await
            .unwrap();

        let tracker = ProgressTracker::load(&dir.path().join("progress"), &translations).await;
        assert!(tracker.is_chapter_translated(2));
        assert!(!tracker.is_chapter_translated(3));
    }

    #[tokio::test]
    async fn test_progress_file_uses_snake_case_status() {
        let dir = tempfile::tempdir().unwrap();
        let progress_dir = dir.path().join("progress");
        let mut tracker = ProgressTracker::load(&progress_dir, dir.path()).await;
        tracker.mark_chapter_start(0, 3).await.unwrap();

        let raw = tokio::fs::read_to_string(progress_dir.join(PROGRESS_FILE_NAME))
            .await
            .unwrap();
        assert!(raw.contains("\"in_progress\""));
    }
}
