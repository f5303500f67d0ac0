//! 章节上下文
//!
//! 为每一章准备翻译上下文：上一章摘要、风格指南、术语和人名表

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::models::loaders::{load_json, load_translated_chapter, save_json};

/// 上一章没有摘要时截取的字符数
const PREVIOUS_TEXT_CHARS: usize = 500;

const STYLE_GUIDE: &str = "Руководство по стилю перевода:
- Используй принятую в России профессиональную терминологию
- Технические термины без устоявшегося перевода оставляй в оригинале
- Сохраняй оригинальные названия моделей, стандартов и организаций (CMMI, SEI)
- Адаптируй идиомы к русскому контексту
- Стиль: формальный, технический, связный";

/// 一章的翻译上下文（context/context_chapter_NNN.json）
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChapterContext {
    pub chapter: usize,
    #[serde(default)]
    pub previous_summary: String,
    #[serde(default)]
    pub key_terms: BTreeMap<String, String>,
    #[serde(default)]
    pub character_names: BTreeMap<String, String>,
    #[serde(default)]
    pub style_notes: String,
}

impl ChapterContext {
    /// 拼接到系统提示后的上下文段落
    pub fn to_prompt_section(&self) -> String {
        let mut parts = Vec::new();
        if !self.style_notes.is_empty() {
            parts.push(self.style_notes.clone());
        }
        if !self.previous_summary.is_empty() {
            parts.push(format!("Краткое содержание предыдущей главы:\n{}", self.previous_summary));
        }
        if !self.key_terms.is_empty() {
            let terms = self
                .key_terms
                .iter()
                .map(|(en, ru)| format!("- {} → {}", en, ru))
                .collect::<Vec<_>>()
                .join("\n");
            parts.push(format!("Ключевые термины:\n{}", terms));
        }
        if !self.character_names.is_empty() {
            let names = self
                .character_names
                .iter()
                .map(|(en, ru)| format!("- {} → {}", en, ru))
                .collect::<Vec<_>>()
                .join("\n");
            parts.push(format!("Имена и названия:\n{}", names));
        }
        parts.join("\n\n")
    }
}

/// 上下文管理器
pub struct ContextManager {
    translations_dir: PathBuf,
    context_dir: PathBuf,
}

impl ContextManager {
    pub fn new(translations_dir: impl Into<PathBuf>, context_dir: impl Into<PathBuf>) -> Self {
        Self {
            translations_dir: translations_dir.into(),
            context_dir: context_dir.into(),
        }
    }

    fn context_file(&self, chapter: usize) -> PathBuf {
        self.context_dir
            .join(format!("context_chapter_{:03}.json", chapter))
    }

    fn terms_file(&self, chapter: usize) -> PathBuf {
        self.context_dir.join(format!("terms_chapter_{:03}.json", chapter))
    }

    fn names_file(&self, chapter: usize) -> PathBuf {
        self.context_dir.join(format!("names_chapter_{:03}.json", chapter))
    }

    /// 生成并保存第 `chapter` 章的上下文
    pub async fn create_context_for_chapter(&self, chapter: usize) -> Result<ChapterContext> {
        let mut context = ChapterContext {
            chapter,
            style_notes: STYLE_GUIDE.to_string(),
            ..Default::default()
        };

        if chapter > 0 {
            let prev = chapter - 1;
            if let Some(summary) = self.previous_summary(prev).await {
                context.previous_summary = summary;
            }
            context.key_terms = load_map_or_empty(&self.terms_file(prev)).await;
            context.character_names = load_map_or_empty(&self.names_file(prev)).await;
        }

        save_json(&self.context_file(chapter), &context).await?;
        debug!("已生成第 {} 章上下文", chapter);
        Ok(context)
    }

    /// 读取已保存的上下文
    pub async fn load_chapter_context(&self, chapter: usize) -> Result<Option<ChapterContext>> {
        let path = self.context_file(chapter);
        if !path.exists() {
            return Ok(None);
        }
        load_json(&path).await.map(Some)
    }

    pub async fn save_chapter_terms(
        &self,
        chapter: usize,
        terms: &BTreeMap<String, String>,
    ) -> Result<()> {
        save_json(&self.terms_file(chapter), terms).await
    }

    pub async fn save_chapter_names(
        &self,
        chapter: usize,
        names: &BTreeMap<String, String>,
    ) -> Result<()> {
        save_json(&self.names_file(chapter), names).await
    }

    /// 上一章的摘要；没有摘要时取正文开头
    async fn previous_summary(&self, prev: usize) -> Option<String> {
        let chapter = match load_translated_chapter(&self.translations_dir, prev).await {
            Ok(chapter) => chapter?,
            Err(e) => {
                warn!("读取第 {} 章译文失败: {:#}", prev, e);
                return None;
            }
        };

        if !chapter.summary.trim().is_empty() {
            return Some(chapter.summary);
        }

        let text: String = chapter
            .paragraphs
            .join(" ")
            .chars()
            .take(PREVIOUS_TEXT_CHARS)
            .collect();
        Some(format!("Предыдущая глава: {}...", text))
    }
}

async fn load_map_or_empty(path: &Path) -> BTreeMap<String, String> {
    if !path.exists() {
        return BTreeMap::new();
    }
    match load_json(path).await {
        Ok(map) => map,
        Err(e) => {
            warn!("无法读取 {}: {:#}", path.display(), e);
            BTreeMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{translated_file_name, TranslatedChapter};

    fn translated(number: usize, summary: &str, paragraphs: Vec<String>) -> TranslatedChapter {
        TranslatedChapter {
            number,
            title: "Глава".to_string(),
            paragraphs,
            summary: summary.to_string(),
            original_word_count: 0,
            translator: "test".to_string(),
            start_page: None,
            end_page: None,
        }
    }

    #[tokio::test]
    async fn test_first_chapter_has_only_style_guide() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ContextManager::new(dir.path().join("translations"), dir.path().join("context"));
        let context = manager.create_context_for_chapter(0).await.unwrap();
        assert!(context.previous_summary.is_empty());
        assert!(!context.style_notes.is_empty());
        assert_eq!(manager.load_chapter_context(0).await.unwrap(), Some(context));
    }

    #[tokio::test]
    async fn test_previous_summary_and_terms_are_carried() {
        let dir = tempfile::tempdir().unwrap();
        let translations = dir.path().join("translations");
        let manager = ContextManager::new(&translations, dir.path().join("context"));

        save_json(
            &translations.join(translated_file_name(2)),
            &translated(2, "Резюме второй главы", vec![]),
        )
        .await
        .unwrap();
        let mut terms = BTreeMap::new();
        terms.insert("Process Area".to_string(), "область процессов".to_string());
        manager.save_chapter_terms(2, &terms).await.unwrap();

        let context = manager.create_context_for_chapter(3).await.unwrap();
        assert_eq!(context.previous_summary, "Резюме второй главы");
        assert_eq!(context.key_terms, terms);
        assert!(context.to_prompt_section().contains("Process Area → область процессов"));
    }

    #[tokio::test]
    async fn test_missing_summary_uses_text_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let translations = dir.path().join("translations");
        let manager = ContextManager::new(&translations, dir.path().join("context"));
        let long = "я".repeat(600);
        save_json(
            &translations.join(translated_file_name(0)),
            &translated(0, "", vec![long]),
        )
        .await
        .unwrap();

        let context = manager.create_context_for_chapter(1).await.unwrap();
        assert!(context.previous_summary.starts_with("Предыдущая глава: "));
        assert_eq!(
            context.previous_summary.chars().count(),
            "Предыдущая глава: ".chars().count() + 500 + 3
        );
    }
}
