//! 文本后处理阶段 - 编排层
//!
//! 过滤、术语、读音、成书四个单线程阶段：读取一个目录，写出另一个目录或文件

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::clients::LlmBackend;
use crate::config::Config;
use crate::models::loaders::{load_json, load_metadata, save_json};
use crate::services::term_extractor::TermsFile;
use crate::services::{
    BlacklistFilter, BookCompiler, CompiledBook, FilterConfig, FilterStats, PhoneticGenerator,
    PhoneticReplacer, PhoneticsFile, TermExtractor,
};
use crate::utils::logging;

/// 成书和读音替换的输入目录
pub fn text_source_dir(config: &Config, use_filtered: bool) -> PathBuf {
    if use_filtered {
        config.filtered_path()
    } else {
        config.translations_path()
    }
}

/// 黑名单过滤：translations → translations_filtered
pub async fn run_filter(config: &Config) -> Result<FilterStats> {
    logging::log_section("🧹 黑名单过滤");
    let filter_config = FilterConfig::load_or_create(&PathBuf::from(&config.filter_config_file))
        .await
        .with_context(|| format!("无法加载过滤配置: {}", config.filter_config_file))?;

    let mut filter = BlacklistFilter::new(filter_config);
    let stats = filter
        .process_directory(&config.translations_path(), &config.filtered_path())
        .await?;
    stats.log_summary();
    info!("📁 结果目录: {}", config.filtered_path().display());
    Ok(stats)
}

/// 术语提取：写出 extracted_terms.json
pub async fn run_terms(config: &Config, min_frequency: usize) -> Result<usize> {
    logging::log_section("🔍 术语提取");
    let extractor = TermExtractor::new();
    let mut report = extractor
        .extract_from_directory(&config.translations_path())
        .await?;
    report.retain_min_frequency(min_frequency);
    report.log_summary();

    let out = PathBuf::from(&config.terms_file);
    save_json(&out, &report.to_output()).await?;
    info!("💾 已保存: {}", out.display());
    Ok(report.total_unique())
}

/// 根据术语文件生成读音词典：写出 phonetics.json
pub async fn run_generate_phonetics(
    config: &Config,
    backend: Arc<dyn LlmBackend>,
    workers: usize,
) -> Result<PhoneticsFile> {
    logging::log_section("🗣️ 生成读音词典");
    let terms_path = PathBuf::from(&config.terms_file);
    let terms: TermsFile = load_json(&terms_path)
        .await
        .with_context(|| format!("请先运行 terms 生成 {}", terms_path.display()))?;
    info!("📚 术语总数: {}", terms.all_terms().len());

    let generator = PhoneticGenerator::new(backend, workers);
    let file = PhoneticsFile::new(generator.generate_all(&terms).await);

    let out = PathBuf::from(&config.phonetics_file);
    save_json(&out, &file).await?;
    logging::log_stats_lines(&[
        ("📝 读音总数", file.total_terms.to_string()),
        ("🔤 缩写", file.statistics.abbreviations.to_string()),
        ("🔗 复合术语", file.statistics.compound_terms.to_string()),
        ("📄 单词", file.statistics.single_words.to_string()),
        ("💾 文件", out.display().to_string()),
    ]);
    Ok(file)
}

/// 读音替换：输入目录 → translations_phonetic
pub async fn run_phonetic_replacement(config: &Config, use_filtered: bool) -> Result<usize> {
    logging::log_section("🔊 读音替换");
    let replacer = PhoneticReplacer::load(&PathBuf::from(&config.phonetics_file)).await?;
    info!("📖 读音规则: {}", replacer.len());

    let processed = replacer
        .process_directory(&text_source_dir(config, use_filtered), &config.phonetic_path())
        .await?;
    info!("✅ 已处理 {} 个文件 → {}", processed, config.phonetic_path().display());
    Ok(processed)
}

/// 汇编 Markdown 与 HTML
pub async fn run_compile(config: &Config, use_filtered: bool) -> Result<CompiledBook> {
    logging::log_section("📚 汇编成书");
    let (title, author) = match load_metadata(&config.extracted_path()).await {
        Ok(metadata) => (metadata.book_title, metadata.book_info.author),
        Err(_) => (String::new(), String::new()),
    };

    let compiler = BookCompiler::new(title, author);
    let book = compiler
        .compile(&text_source_dir(config, use_filtered), &config.output_path())
        .await?;
    logging::log_stats_lines(&[
        ("📖 章节", book.chapters.to_string()),
        ("📝 段落", book.paragraphs.to_string()),
        ("📄 Markdown", book.markdown_path.display().to_string()),
        ("🌐 HTML", book.html_path.display().to_string()),
    ]);
    Ok(book)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{translated_file_name, TranslatedChapter};

    fn config_in(root: &std::path::Path) -> Config {
        let path = |name: &str| root.join(name).to_string_lossy().into_owned();
        Config {
            extracted_dir: path("extracted"),
            translations_dir: path("translations"),
            filtered_dir: path("translations_filtered"),
            phonetic_dir: path("translations_phonetic"),
            output_dir: path("output"),
            filter_config_file: path("filter.toml"),
            phonetics_file: path("phonetics.json"),
            terms_file: path("extracted_terms.json"),
            ..Config::default()
        }
    }

    async fn write_translation(config: &Config, number: usize, paragraphs: &[&str]) {
        let chapter = TranslatedChapter {
            number,
            title: format!("Глава {}", number),
            paragraphs: paragraphs.iter().map(|p| p.to_string()).collect(),
            summary: String::new(),
            original_word_count: 0,
            translator: String::new(),
            start_page: None,
            end_page: None,
        };
        save_json(&config.translations_path().join(translated_file_name(number)), &chapter)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_filter_creates_default_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        write_translation(&config, 0, &["Текст главы."]).await;

        let stats = run_filter(&config).await.unwrap();
        assert_eq!(stats.total_chapters, 1);
        assert!(PathBuf::from(&config.filter_config_file).exists());
        assert!(config.filtered_path().join(translated_file_name(0)).exists());
    }

    #[tokio::test]
    async fn test_compile_falls_back_to_default_title() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        write_translation(&config, 0, &["Первый абзац."]).await;

        let book = run_compile(&config, false).await.unwrap();
        assert_eq!(book.chapters, 1);
        assert!(book
            .markdown_path
            .ends_with(format!("{}.md", crate::services::book_compiler::DEFAULT_BOOK_TITLE)));
    }

    #[tokio::test]
    async fn test_phonetic_replacement_uses_builtin_table() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        write_translation(&config, 0, &["Модель CMMI.", "[IMAGE_1]"]).await;

        assert_eq!(run_phonetic_replacement(&config, false).await.unwrap(), 1);
        let chapter: TranslatedChapter =
            load_json(&config.phonetic_path().join(translated_file_name(0)))
                .await
                .unwrap();
        assert_eq!(chapter.paragraphs[0], "Модель си-эм-эм-ай.");
        assert_eq!(chapter.paragraphs[1], "[IMAGE_1]");
    }
}
