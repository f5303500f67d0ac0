use serde::{Deserialize, Serialize};

/// 图片占位符前缀
pub const IMAGE_PLACEHOLDER_PREFIX: &str = "[IMAGE_";

/// 判断段落是否为图片占位符
pub fn is_image_placeholder(paragraph: &str) -> bool {
    paragraph.starts_with(IMAGE_PLACEHOLDER_PREFIX)
}

/// 原文章节文件名
pub fn chapter_file_name(number: usize) -> String {
    format!("chapter_{:03}.json", number)
}

/// 译文章节文件名
pub fn translated_file_name(number: usize) -> String {
    format!("chapter_{:03}_translated.json", number)
}

/// 从 PDF 拆分出的章节
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedChapter {
    pub number: usize,
    pub title: String,
    pub start_page: usize,
    pub end_page: usize,
    pub paragraphs: Vec<String>,
    pub word_count: usize,
}

impl ExtractedChapter {
    /// 非占位符段落
    pub fn text_paragraphs(&self) -> impl Iterator<Item = &String> {
        self.paragraphs.iter().filter(|p| !is_image_placeholder(p))
    }
}

/// 元数据中的章节条目
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChapterEntry {
    pub number: usize,
    pub title: String,
    pub start_page: usize,
    pub end_page: usize,
    pub page_count: usize,
    pub status: String,
}

/// PDF 文档信息
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BookInfo {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub keywords: String,
}

/// 拆分结果元数据（metadata.json）
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BookMetadata {
    pub total_pages: usize,
    pub chapters: Vec<ChapterEntry>,
    pub extraction_complete: bool,
    #[serde(default)]
    pub book_title: String,
    #[serde(default)]
    pub book_info: BookInfo,
    /// 输入格式：pdf / txt / markdown
    #[serde(default)]
    pub source_format: String,
}

impl BookMetadata {
    /// 按编号查找章节
    pub fn chapter(&self, number: usize) -> Option<&ChapterEntry> {
        self.chapters.iter().find(|c| c.number == number)
    }
}
