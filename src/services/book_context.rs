//! 书籍背景提取
//!
//! 从前几章（优先译文，没有时用拆分后的原文）取样，推断技术难度、目标读者和章节结构，
//! 再让 LLM 用俄语概括书的主题和关键概念。结果即 `book_context.json`，
//! 供听书改写时放进提示词

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

use crate::clients::{LlmBackend, LlmRequest};
use crate::models::{is_image_placeholder, ExtractedChapter, TranslatedChapter};

/// 取样的章节数
pub const SAMPLE_CHAPTERS: usize = 3;
/// 每章取样的段落数
pub const SAMPLE_PARAGRAPHS: usize = 5;
/// 结构概览中列出的章节数
const OUTLINE_CHAPTERS: usize = 10;
/// 章节标题可作书名的最短长度（不含）
const TITLE_MIN_CHARS: usize = 10;
/// 发给 LLM 的样本上限（字符）
const PROMPT_SAMPLE_CHARS: usize = 4000;

const CONTEXT_ANALYST_PROMPT: &str = "Ты — редактор технической литературы. \
По фрагментам книги ты кратко и точно описываешь её тему и ключевые понятия на русском языке.";

static UPPERCASE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Z]{2,}").expect("合法的正则"));
static FORMULA_SIGN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[=<>≤≥∈∀∃]").expect("合法的正则"));

/// 取样用的章节
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleChapter {
    pub number: usize,
    pub title: String,
    pub paragraphs: Vec<String>,
}

impl From<ExtractedChapter> for SampleChapter {
    fn from(chapter: ExtractedChapter) -> Self {
        Self {
            number: chapter.number,
            title: chapter.title,
            paragraphs: chapter.paragraphs,
        }
    }
}

impl From<TranslatedChapter> for SampleChapter {
    fn from(chapter: TranslatedChapter) -> Self {
        Self {
            number: chapter.number,
            title: chapter.title,
            paragraphs: chapter.paragraphs,
        }
    }
}

/// 结构概览中的一章
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChapterOutline {
    pub number: usize,
    pub title: String,
    pub paragraphs_count: usize,
    pub has_images: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BookStructure {
    pub total_chapters: usize,
    /// 前若干章
    pub chapters: Vec<ChapterOutline>,
    pub has_images: bool,
    /// 平均每章段落数
    pub average_chapter_size: usize,
}

/// book_context.json
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BookContext {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub target_audience: Option<String>,
    #[serde(default)]
    pub technical_level: Option<String>,
    #[serde(default)]
    pub book_purpose: Option<String>,
    #[serde(default)]
    pub key_concepts: Vec<String>,
    #[serde(default)]
    pub structure: Option<BookStructure>,
}

/// 按大写缩写和公式符号的数量判断技术难度
pub fn technical_level(text: &str) -> &'static str {
    let technical_terms = UPPERCASE_RUN.find_iter(text).count();
    let formulas = FORMULA_SIGN.find_iter(text).count();

    if technical_terms > 50 || formulas > 10 {
        "высокий"
    } else if technical_terms > 20 {
        "средний"
    } else {
        "начальный"
    }
}

pub fn audience_for(level: &str) -> &'static str {
    match level {
        "высокий" => "опытные специалисты и эксперты",
        "средний" => "специалисты с базовыми знаниями",
        _ => "начинающие специалисты и студенты",
    }
}

/// 前几章的开头段落（跳过图片占位符）
pub fn sample_text(chapters: &[SampleChapter]) -> String {
    chapters
        .iter()
        .take(SAMPLE_CHAPTERS)
        .flat_map(|c| {
            c.paragraphs
                .iter()
                .take(SAMPLE_PARAGRAPHS)
                .filter(|p| !p.is_empty() && !is_image_placeholder(p))
        })
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn outline(chapters: &[SampleChapter]) -> BookStructure {
    let outlines: Vec<ChapterOutline> = chapters
        .iter()
        .map(|c| ChapterOutline {
            number: c.number,
            title: c.title.clone(),
            paragraphs_count: c.paragraphs.len(),
            has_images: c.paragraphs.iter().any(|p| is_image_placeholder(p)),
        })
        .collect();

    let total_paragraphs: usize = outlines.iter().map(|c| c.paragraphs_count).sum();
    BookStructure {
        total_chapters: outlines.len(),
        has_images: outlines.iter().any(|c| c.has_images),
        average_chapter_size: total_paragraphs.checked_div(outlines.len()).unwrap_or(0),
        chapters: outlines.into_iter().take(OUTLINE_CHAPTERS).collect(),
    }
}

/// 书名：优先元数据，否则取前几章中第一个足够长的标题
pub fn guess_title(book_title: &str, chapters: &[SampleChapter]) -> Option<String> {
    if !book_title.trim().is_empty() {
        return Some(book_title.trim().to_string());
    }
    chapters
        .iter()
        .take(SAMPLE_CHAPTERS)
        .map(|c| c.title.trim())
        .find(|t| t.chars().count() > TITLE_MIN_CHARS)
        .map(str::to_string)
}

/// LLM 给出的主题概括
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ThemeSummary {
    #[serde(default)]
    pub book_purpose: String,
    #[serde(default)]
    pub key_concepts: Vec<String>,
}

/// 取第一个 `{` 到最后一个 `}` 解析
pub fn parse_theme_response(response: &str) -> Option<ThemeSummary> {
    let (Some(start), Some(end)) = (response.find('{'), response.rfind('}')) else {
        warn!("⚠️ 响应中没有 JSON");
        return None;
    };
    if end <= start {
        return None;
    }
    match serde_json::from_str::<ThemeSummary>(&response[start..=end]) {
        Ok(summary) => Some(summary),
        Err(e) => {
            warn!("⚠️ JSON 解析失败: {}", e);
            None
        }
    }
}

pub struct BookContextExtractor {
    backend: Arc<dyn LlmBackend>,
}

impl BookContextExtractor {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend }
    }

    fn build_prompt(title: Option<&str>, sample: &str) -> String {
        let sample: String = sample.chars().take(PROMPT_SAMPLE_CHARS).collect();
        format!(
            "Название книги: {}\n\n\
Фрагменты из первых глав:\n{}\n\n\
Опиши в 1-2 предложениях, о чём эта книга и для чего она написана, \
и перечисли до 7 ключевых понятий. Пиши по-русски.\n\
Формат ответа - JSON объект:\n\
{{\"book_purpose\": \"...\", \"key_concepts\": [\"...\"]}}",
            title.unwrap_or("неизвестно"),
            sample
        )
    }

    /// 请求 LLM 概括主题；失败时返回 None
    pub async fn summarize(&self, title: Option<&str>, sample: &str) -> Option<ThemeSummary> {
        if sample.trim().is_empty() {
            return None;
        }
        let request = LlmRequest::new(Self::build_prompt(title, sample))
            .with_system(CONTEXT_ANALYST_PROMPT)
            .with_temperature(0.3)
            .with_max_tokens(800);

        match self.backend.complete(&request).await {
            Ok(response) => parse_theme_response(&response),
            Err(e) => {
                warn!("❌ 主题概括失败: {:#}", e);
                None
            }
        }
    }

    /// 由章节得到书籍背景
    pub async fn extract(&self, book_title: &str, chapters: &[SampleChapter]) -> BookContext {
        let sample = sample_text(chapters);
        let level = technical_level(&sample);
        let title = guess_title(book_title, chapters);
        debug!("样本 {} 字符, 技术难度 {}", sample.chars().count(), level);

        let mut context = BookContext {
            title,
            target_audience: Some(audience_for(level).to_string()),
            technical_level: Some(level.to_string()),
            structure: Some(outline(chapters)),
            ..Default::default()
        };

        if let Some(summary) = self.summarize(context.title.as_deref(), &sample).await {
            let purpose = summary.book_purpose.trim();
            if !purpose.is_empty() {
                context.book_purpose = Some(purpose.to_string());
            }
            context.key_concepts = summary
                .key_concepts
                .into_iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
        }
        context
    }
}
