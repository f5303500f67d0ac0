//! 书籍拆分流水线 - 编排层
//!
//! PDF → 按页文本 → 章节范围 → `chapter_NNN.json` + `metadata.json`
//! TXT / Markdown → 全文 → 标题切章 → 同样的输出

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{info, warn};

use crate::config::Config;
use crate::infrastructure::{BookFormat, BookText, PdfReader, PdfText, TextReader};
use crate::models::loaders::save_json;
use crate::models::{chapter_file_name, BookMetadata, ChapterEntry, ExtractedChapter};
use crate::services::chapter_splitter::{
    build_chapter, split_pages_into_chapters, verify_extraction, ExtractionReport,
};
use crate::services::split_book_text;
use crate::utils::logging;

/// 读取书籍并写出章节文件，格式由扩展名决定
pub async fn run_extract(config: &Config, input: &Path) -> Result<BookMetadata> {
    let format = BookFormat::detect(input)
        .await
        .with_context(|| format!("无法识别书籍文件: {}", input.display()))?;
    logging::log_section(&format!(
        "📖 拆分书籍 ({}): {}",
        format.as_str(),
        input.display()
    ));

    match format {
        BookFormat::Pdf => {
            let text = PdfReader::read(input)
                .await
                .with_context(|| format!("无法读取 PDF: {}", input.display()))?;
            info!("📄 共 {} 页", text.page_count());

            let metadata = write_chapters(&text, &config.extracted_path()).await?;
            log_report(&verify_extraction(&metadata));
            Ok(metadata)
        }
        BookFormat::Text | BookFormat::Markdown => {
            let book = TextReader::read(input)
                .await
                .with_context(|| format!("无法读取文本: {}", input.display()))?;
            info!("📄 共 {} 字符", book.text.chars().count());
            write_text_chapters(&book, format, &config.extracted_path()).await
        }
    }
}

/// 拆分章节并写入输出目录
pub async fn write_chapters(text: &PdfText, out_dir: &Path) -> Result<BookMetadata> {
    tokio::fs::create_dir_all(out_dir)
        .await
        .with_context(|| format!("无法创建目录: {}", out_dir.display()))?;

    let spans = split_pages_into_chapters(&text.pages);
    info!("📚 识别到 {} 章", spans.len());

    let mut entries = Vec::with_capacity(spans.len());
    for (number, span) in spans.iter().enumerate() {
        let chapter = build_chapter(number, span, &text.pages);
        if chapter.paragraphs.is_empty() {
            warn!("章节 {} ({}) 没有可用段落", number, chapter.title);
        }
        save_json(&out_dir.join(chapter_file_name(number)), &chapter).await?;
        info!(
            "  ✓ {:03} {} (第 {}-{} 页, {} 段)",
            number,
            logging::truncate_text(&chapter.title, 60),
            span.start_page + 1,
            span.end_page + 1,
            chapter.paragraphs.len()
        );
        entries.push(ChapterEntry {
            number,
            title: chapter.title,
            start_page: span.start_page,
            end_page: span.end_page,
            page_count: span.page_count(),
            status: "extracted".to_string(),
        });
    }

    let metadata = BookMetadata {
        total_pages: text.page_count(),
        chapters: entries,
        extraction_complete: true,
        book_title: text.info.title.clone(),
        book_info: text.info.clone(),
        source_format: BookFormat::Pdf.as_str().to_string(),
    };
    save_json(&out_dir.join("metadata.json"), &metadata).await?;
    Ok(metadata)
}

/// 文本书籍：按标题切章后写入输出目录
///
/// 没有页码，页范围记为 0
pub async fn write_text_chapters(
    book: &BookText,
    format: BookFormat,
    out_dir: &Path,
) -> Result<BookMetadata> {
    let chapters = split_book_text(&book.text, format);
    if chapters.is_empty() {
        anyhow::bail!("文本中没有可用段落");
    }
    tokio::fs::create_dir_all(out_dir)
        .await
        .with_context(|| format!("无法创建目录: {}", out_dir.display()))?;
    info!("📚 识别到 {} 章", chapters.len());

    let mut entries = Vec::with_capacity(chapters.len());
    for (number, chapter) in chapters.into_iter().enumerate() {
        let word_count = chapter
            .paragraphs
            .iter()
            .map(|p| p.split_whitespace().count())
            .sum();
        let extracted = ExtractedChapter {
            number,
            title: chapter.title,
            start_page: 0,
            end_page: 0,
            paragraphs: chapter.paragraphs,
            word_count,
        };
        save_json(&out_dir.join(chapter_file_name(number)), &extracted).await?;
        info!(
            "  ✓ {:03} {} ({} 段)",
            number,
            logging::truncate_text(&extracted.title, 60),
            extracted.paragraphs.len()
        );
        entries.push(ChapterEntry {
            number,
            title: extracted.title,
            start_page: 0,
            end_page: 0,
            page_count: 0,
            status: "extracted".to_string(),
        });
    }

    let metadata = BookMetadata {
        total_pages: 0,
        chapters: entries,
        extraction_complete: true,
        book_title: book.info.title.clone(),
        book_info: book.info.clone(),
        source_format: format.as_str().to_string(),
    };
    save_json(&out_dir.join("metadata.json"), &metadata).await?;
    Ok(metadata)
}

fn log_report(report: &ExtractionReport) {
    logging::log_section("🔍 拆分检查");
    if report.is_clean() {
        info!("✅ 所有页面恰好覆盖一次");
    }
    for (idx, pages) in &report.overlapping {
        warn!("⚠️ 章节 {} 与前面章节重叠 {} 页", idx, pages.len());
    }
    if !report.missing_pages.is_empty() {
        warn!("⚠️ 未覆盖页面: {}", report.missing_pages.len());
    }
    logging::log_stats_lines(&[
        ("📊 平均页数", format!("{:.1}", report.average_pages)),
        ("📉 最少页数", report.min_pages.to_string()),
        ("📈 最多页数", report.max_pages.to_string()),
    ]);
}
