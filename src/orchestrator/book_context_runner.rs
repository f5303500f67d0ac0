//! 书籍背景 - 编排层
//!
//! 读取译文章节（没有译文时读拆分后的章节），生成 `book_context.json`

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::clients::LlmBackend;
use crate::config::Config;
use crate::models::loaders::{
    is_extracted_chapter_file, list_files, load_all_translated, load_json, load_metadata,
    save_json,
};
use crate::models::ExtractedChapter;
use crate::services::book_context::SampleChapter;
use crate::services::{BookContext, BookContextExtractor};
use crate::utils::logging;

/// 有译文时取译文，否则取拆分后的原文
async fn load_samples(config: &Config) -> Result<Vec<SampleChapter>> {
    let translations = config.translations_path();
    if translations.is_dir() {
        let translated = load_all_translated(&translations).await?;
        if !translated.is_empty() {
            info!("🔍 取样译文: {}", translations.display());
            return Ok(translated
                .into_iter()
                .map(|(_, chapter)| SampleChapter::from(chapter))
                .collect());
        }
    }

    let extracted = config.extracted_path();
    let files = list_files(&extracted, is_extracted_chapter_file).await?;
    info!("🔍 取样原文: {}", extracted.display());
    let mut chapters = Vec::with_capacity(files.len());
    for file in &files {
        match load_json::<ExtractedChapter>(file).await {
            Ok(chapter) => chapters.push(SampleChapter::from(chapter)),
            Err(e) => warn!("跳过无法解析的章节: {:#}", e),
        }
    }
    Ok(chapters)
}

/// 生成书籍背景并写入 `output`
pub async fn run_book_context(
    config: &Config,
    backend: Arc<dyn LlmBackend>,
    output: &Path,
) -> Result<BookContext> {
    let chapters = load_samples(config).await?;
    if chapters.is_empty() {
        anyhow::bail!("没有可取样的章节，请先运行 extract");
    }
    logging::log_section("📖 提取书籍背景");
    info!("📚 {} 章, 模型 {}", chapters.len(), backend.model_name());

    let extracted = config.extracted_path();
    let book_title = load_metadata(&extracted)
        .await
        .map(|m| m.book_title)
        .unwrap_or_default();

    let context = BookContextExtractor::new(backend)
        .extract(&book_title, &chapters)
        .await;
    save_json(output, &context).await?;

    let structure = context.structure.clone().unwrap_or_default();
    logging::log_stats_lines(&[
        ("📚 书名", context.title.clone().unwrap_or_else(|| "-".to_string())),
        (
            "📊 技术难度",
            context.technical_level.clone().unwrap_or_default(),
        ),
        (
            "🎯 目标读者",
            context.target_audience.clone().unwrap_or_default(),
        ),
        ("🔑 关键概念", context.key_concepts.join(", ")),
        ("📂 平均段落数", structure.average_chapter_size.to_string()),
        ("💾 输出", output.display().to_string()),
    ]);
    Ok(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::LlmRequest;
    use crate::models::{chapter_file_name, translated_file_name, BookMetadata, TranslatedChapter};
    use crate::orchestrator::adaptation_runner::load_book_context;
    use async_trait::async_trait;

    struct ThemeBackend {
        fail: bool,
    }

    #[async_trait]
    impl LlmBackend for ThemeBackend {
        async fn complete(&self, request: &LlmRequest) -> Result<String> {
            if self.fail {
                anyhow::bail!("offline");
            }
            assert!(request.user.contains("Название книги: Process Guide"));
            Ok("Ответ:\n{\"book_purpose\": \"Книга об улучшении процессов.\", \
                \"key_concepts\": [\"уровни зрелости\", \" \"]}"
                .to_string())
        }

        fn model_name(&self) -> &str {
            "theme"
        }
    }

    fn config_in(root: &Path) -> Config {
        Config {
            extracted_dir: root.join("extracted").to_string_lossy().into_owned(),
            translations_dir: root.join("translations").to_string_lossy().into_owned(),
            ..Config::default()
        }
    }

    async fn extracted_book(root: &Path) -> Config {
        let config = config_in(root);
        let extracted = config.extracted_path();
        for number in 0..2 {
            let chapter = ExtractedChapter {
                number,
                title: format!("Chapter {}", number + 1),
                start_page: 0,
                end_page: 0,
                paragraphs: vec![
                    "The CMMI model describes process maturity.".to_string(),
                    "[IMAGE_C000_I00]".to_string(),
                ],
                word_count: 6,
            };
            save_json(&extracted.join(chapter_file_name(number)), &chapter)
                .await
                .unwrap();
        }
        let metadata = BookMetadata {
            book_title: "Process Guide".to_string(),
            extraction_complete: true,
            ..Default::default()
        };
        save_json(&extracted.join("metadata.json"), &metadata)
            .await
            .unwrap();
        config
    }

    #[tokio::test]
    async fn test_written_context_is_loaded_by_adaptation() {
        let dir = tempfile::tempdir().unwrap();
        let config = extracted_book(dir.path()).await;
        let output = dir.path().join("book_context.json");

        let context = run_book_context(&config, Arc::new(ThemeBackend { fail: false }), &output)
            .await
            .unwrap();
        assert_eq!(context.title.as_deref(), Some("Process Guide"));
        assert_eq!(context.technical_level.as_deref(), Some("начальный"));
        assert_eq!(
            context.book_purpose.as_deref(),
            Some("Книга об улучшении процессов.")
        );
        assert_eq!(context.key_concepts, vec!["уровни зрелости".to_string()]);
        let structure = context.structure.clone().unwrap();
        assert_eq!(structure.total_chapters, 2);
        assert!(structure.has_images);

        let loaded = load_book_context(Some(output.as_path())).await;
        assert_eq!(loaded, Some(context));
    }

    #[tokio::test]
    async fn test_llm_failure_keeps_heuristic_fields() {
        let dir = tempfile::tempdir().unwrap();
        let config = extracted_book(dir.path()).await;
        let output = dir.path().join("book_context.json");

        let context = run_book_context(&config, Arc::new(ThemeBackend { fail: true }), &output)
            .await
            .unwrap();
        assert!(context.book_purpose.is_none());
        assert!(context.key_concepts.is_empty());
        assert_eq!(
            context.target_audience.as_deref(),
            Some("начинающие специалисты и студенты")
        );
        assert!(output.exists());
    }

    #[tokio::test]
    async fn test_translations_are_preferred() {
        let dir = tempfile::tempdir().unwrap();
        let config = extracted_book(dir.path()).await;
        let chapter = TranslatedChapter {
            number: 0,
            title: "Глава 1".to_string(),
            paragraphs: vec!["Модель CMMI описывает зрелость процессов.".to_string()],
            summary: String::new(),
            original_word_count: 6,
            translator: String::new(),
            start_page: None,
            end_page: None,
        };
        save_json(
            &config.translations_path().join(translated_file_name(0)),
            &chapter,
        )
        .await
        .unwrap();

        let context = run_book_context(
            &config,
            Arc::new(ThemeBackend { fail: false }),
            &dir.path().join("book_context.json"),
        )
        .await
        .unwrap();
        let structure = context.structure.unwrap();
        assert_eq!(structure.total_chapters, 1);
        assert_eq!(structure.chapters[0].title, "Глава 1");
        assert!(!structure.has_images);
    }

    #[tokio::test]
    async fn test_requires_extracted_chapters() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        tokio::fs::create_dir_all(config.extracted_path()).await.unwrap();
        let result = run_book_context(
            &config,
            Arc::new(ThemeBackend { fail: false }),
            &dir.path().join("book_context.json"),
        )
        .await;
        assert!(result.is_err());
    }
}
