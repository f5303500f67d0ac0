//! 听书改写
//!
//! 把书面技术文本改写成适合朗读的口语化讲述

use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

use crate::clients::{LlmBackend, LlmRequest};
use crate::models::{is_image_placeholder, AdaptationMetadata, AdaptedChapter, TranslatedChapter};
use crate::services::book_context::BookContext;

/// 每次改写的段落数
pub const DEFAULT_GROUP_SIZE: usize = 5;
/// 前后各取的上下文段落数
const CONTEXT_PARAGRAPHS: usize = 2;
/// 上下文截取长度（字符）
const CONTEXT_CHARS: usize = 500;

pub const ADAPTATION_STYLE: &str = "professional_casual";
pub const EXPLANATION_DEPTH: &str = "moderate";

pub const NARRATOR_PROMPT: &str = "Ты — опытный технический эксперт и прекрасный рассказчик. \
Твоя задача — адаптировать технические тексты для аудиоформата, сохраняя точность и добавляя ясность.
Ты объясняешь сложные концепции доступным языком, как будто ведешь профессиональную беседу с коллегой.
Используй примеры, аналогии и связующие фразы, чтобы текст легко воспринимался на слух.
Твой стиль — профессиональный, но не сухой; информативный, но не скучный; точный, но не заумный.";

/// 需要特别改写的文本特征
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProblemReport {
    pub abbreviations: Vec<String>,
    pub references: Vec<String>,
    pub has_lists: bool,
    pub has_formulas: bool,
    pub has_tables: bool,
    pub complex_sentences: usize,
}

impl ProblemReport {
    pub fn is_empty(&self) -> bool {
        self.abbreviations.is_empty()
            && self.references.is_empty()
            && !self.has_lists
            && !self.has_formulas
            && !self.has_tables
            && self.complex_sentences == 0
    }
}

static ABBREVIATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z]{2,}\b").expect("合法的正则"));
static SECTION_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:см\.|see|раздел|section|глава|chapter)\s+[\d.]+").expect("合法的正则")
});
static FIGURE_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:Figure|Table|Рис\.|Табл\.)\s+[\d.]+").expect("合法的正则"));
static BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*[•·\-*]\s+").expect("合法的正则"));
static MATH_SYMBOL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[=<>≤≥∈∀∃∑∏∫]").expect("合法的正则"));

/// 找出缩写、交叉引用、列表、公式、表格和长句
pub fn detect_problems(text: &str) -> ProblemReport {
    let mut references: Vec<String> = SECTION_REFERENCE
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect();
    references.extend(FIGURE_REFERENCE.find_iter(text).map(|m| m.as_str().to_string()));

    ProblemReport {
        abbreviations: ABBREVIATION
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect(),
        references,
        has_lists: BULLET.is_match(text),
        has_formulas: MATH_SYMBOL.is_match(text),
        has_tables: text.matches('|').count() > 3,
        complex_sentences: text
            .split('.')
            .filter(|s| s.split_whitespace().count() > 30)
            .count(),
    }
}

fn tail_chars(text: &str, n: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(n)).collect()
}

fn head_chars(text: &str, n: usize) -> String {
    text.chars().take(n).collect()
}

/// 听书改写服务
pub struct AudioAdapter {
    backend: Arc<dyn LlmBackend>,
    group_size: usize,
    book_context: Option<BookContext>,
}

impl AudioAdapter {
    pub fn new(backend: Arc<dyn LlmBackend>, group_size: usize) -> Self {
        Self {
            backend,
            group_size: group_size.max(1),
            book_context: None,
        }
    }

    pub fn with_book_context(mut self, context: BookContext) -> Self {
        self.book_context = Some(context);
        self
    }

    fn book_section(&self) -> String {
        let Some(ctx) = &self.book_context else {
            return String::new();
        };
        let mut section = format!(
            "Контекст книги:\n- Тема: {}\n- Аудитория: {}\n- Технический уровень: {}\n",
            ctx.title.as_deref().unwrap_or("техническая документация"),
            ctx.target_audience.as_deref().unwrap_or("специалисты"),
            ctx.technical_level.as_deref().unwrap_or("средний"),
        );
        if let Some(purpose) = &ctx.book_purpose {
            section.push_str(&format!("- Цель книги: {}\n", purpose));
        }
        if !ctx.key_concepts.is_empty() {
            section.push_str(&format!("- Ключевые понятия: {}\n", ctx.key_concepts.join(", ")));
        }
        section
    }

    pub fn adaptation_prompt(&self, text: &str, context_before: &str, context_after: &str) -> String {
        let before = if context_before.is_empty() {
            "(начало главы)".to_string()
        } else {
            tail_chars(context_before, CONTEXT_CHARS)
        };
        let after = if context_after.is_empty() {
            "(конец главы)".to_string()
        } else {
            head_chars(context_after, CONTEXT_CHARS)
        };

        format!(
            "Адаптируй следующий технический текст для прослушивания в формате аудиокниги.

{book}

ЦЕЛЬ: Превратить формальный технический текст в живой профессиональный пересказ, как будто опытный эксперт объясняет материал заинтересованному коллеге.

ПРАВИЛА АДАПТАЦИИ:
1. Сохрани всю важную информацию и логику изложения; замени сложные предложения на несколько простых; добавь связующие фразы между мыслями.
2. При первом упоминании аббревиатуры расшифруй её и кратко поясни сложные термины.
3. Преобразуй списки в связный рассказ (\"Во-первых...\", \"Следующий важный момент...\").
4. Замени ссылки вида \"см. раздел 3.2\" и номера рисунков и таблиц описанием словами.
5. Объясни формулы словами, символы замени словами (\"x > y\" → \"икс больше игрек\").
6. Используй \"мы\" вместо безличных конструкций и риторические вопросы для вовлечения.
7. Разбей длинные абзацы на короткие смысловые блоки, разделённые пустой строкой.

КОНТЕКСТ ПРЕДЫДУЩЕГО ТЕКСТА:
{before}

ТЕКСТ ДЛЯ АДАПТАЦИИ:
{text}

КОНТЕКСТ ПОСЛЕДУЮЩЕГО ТЕКСТА:
{after}

ВАЖНО: сохрани профессиональный тон, не упрощай до примитива, текст должен звучать естественно при чтении вслух.

Адаптированный текст:",
            book = self.book_section(),
        )
    }

    /// 改写一组段落；失败时返回原文
    pub async fn adapt_group(
        &self,
        paragraphs: &[String],
        context_before: &str,
        context_after: &str,
    ) -> String {
        let text = paragraphs
            .iter()
            .filter(|p| !p.is_empty() && !is_image_placeholder(p))
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n\n");
        if text.trim().is_empty() {
            return String::new();
        }

        let problems = detect_problems(&text);
        if !problems.is_empty() {
            debug!(
                "待改写特征: 缩写 {} / 引用 {} / 长句 {}",
                problems.abbreviations.len(),
                problems.references.len(),
                problems.complex_sentences
            );
        }

        let request = LlmRequest::new(self.adaptation_prompt(&text, context_before, context_after))
            .with_system(NARRATOR_PROMPT)
            .with_temperature(0.7)
            .with_max_tokens(4000);
        match self.backend.complete(&request).await {
            Ok(adapted) => adapted,
            Err(e) => {
                warn!("❌ 改写失败，保留原文: {:#}", e);
                text
            }
        }
    }

    /// 把章节标题改成口播开场；失败时保留原标题
    pub async fn adapt_title(&self, title: &str, chapter_number: usize) -> String {
        let prompt = format!(
            "Преобразуй заголовок главы для аудиокниги.
Добавь вступительную фразу, которая вводит слушателя в новую главу.

Оригинальный заголовок: {}
Номер главы: {}

Пример результата:
\"Глава третья. Процессные области CMMI. В этой главе мы подробно разберем, что такое процессные области и как они помогают улучшить разработку.\"

Адаптированный заголовок:",
            title, chapter_number
        );
        let request = LlmRequest::new(prompt)
            .with_system(NARRATOR_PROMPT)
            .with_temperature(0.5)
            .with_max_tokens(500);
        match self.backend.complete(&request).await {
            Ok(adapted) => adapted,
            Err(e) => {
                warn!("标题改写失败，保留原标题: {:#}", e);
                title.to_string()
            }
        }
    }

    /// 改写整章
    pub async fn adapt_chapter(&self, chapter: &TranslatedChapter) -> AdaptedChapter {
        let title = if chapter.title.is_empty() {
            String::new()
        } else {
            self.adapt_title(&chapter.title, chapter.number).await
        };

        let paragraphs = &chapter.paragraphs;
        let mut adapted_paragraphs = Vec::new();
        for start in (0..paragraphs.len()).step_by(self.group_size) {
            let end = (start + self.group_size).min(paragraphs.len());
            let before = paragraphs[start.saturating_sub(CONTEXT_PARAGRAPHS)..start].join("\n");
            let after_end = (end + CONTEXT_PARAGRAPHS).min(paragraphs.len());
            let after = paragraphs[end..after_end].join("\n");

            let adapted = self.adapt_group(&paragraphs[start..end], &before, &after).await;
            if !adapted.is_empty() {
                adapted_paragraphs.extend(adapted.split("\n\n").map(str::to_string));
            }
        }

        AdaptedChapter {
            title,
            original_paragraphs: chapter.paragraphs.clone(),
            adapted_paragraphs,
            adaptation_metadata: AdaptationMetadata {
                style: ADAPTATION_STYLE.to_string(),
                depth: EXPLANATION_DEPTH.to_string(),
                chapter_number: chapter.number,
            },
        }
    }
}

/// 改写结果文件名
pub fn adapted_file_name(translated_stem: &str) -> String {
    format!("{}_audio.json", translated_stem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingBackend {
        prompts: Mutex<Vec<LlmRequest>>,
        fail: bool,
    }

    #[async_trait]
    impl LlmBackend for RecordingBackend {
        async fn complete(&self, request: &LlmRequest) -> anyhow::Result<String> {
            self.prompts.lock().unwrap().push(request.clone());
            if self.fail {
                anyhow::bail!("offline");
            }
            if request.user.contains("Адаптированный заголовок") {
                Ok("Глава первая. Введение.".to_string())
            } else {
                Ok("Первая мысль.\n\nВторая мысль.".to_string())
            }
        }

        fn model_name(&self) -> &str {
            "recording"
        }
    }

    fn chapter(paragraphs: usize) -> TranslatedChapter {
        TranslatedChapter {
            number: 1,
            title: "Введение".to_string(),
            paragraphs: (0..paragraphs).map(|i| format!("Абзац номер {}.", i)).collect(),
            summary: String::new(),
            original_word_count: 0,
            translator: String::new(),
            start_page: None,
            end_page: None,
        }
    }

    #[test]
    fn test_detect_problems() {
        let text = "• пункт\nСм. 3.2 и Figure 2.1 показывают, что x > y для CMMI | a | b | c | d";
        let report = detect_problems(text);
        assert_eq!(report.abbreviations, vec!["CMMI".to_string()]);
        assert_eq!(report.references, vec!["См. 3.2".to_string(), "Figure 2.1".to_string()]);
        assert!(report.has_lists);
        assert!(report.has_formulas);
        assert!(report.has_tables);
        assert!(!detect_problems("Простой текст.").has_tables);
    }

    #[test]
    fn test_prompt_context_is_bounded() {
        let backend = Arc::new(RecordingBackend {
            prompts: Mutex::new(Vec::new()),
            fail: false,
        });
        let adapter = AudioAdapter::new(backend, 5);
        let before = "я".repeat(600);
        let prompt = adapter.adaptation_prompt("текст", &before, "");
        assert!(prompt.contains(&"я".repeat(500)));
        assert!(!prompt.contains(&"я".repeat(501)));
        assert!(prompt.contains("(конец главы)"));
    }

    #[test]
    fn test_prompt_carries_book_context() {
        let backend = Arc::new(RecordingBackend {
            prompts: Mutex::new(Vec::new()),
            fail: false,
        });
        let adapter = AudioAdapter::new(backend, 5).with_book_context(BookContext {
            title: Some("CMMI для разработки".to_string()),
            book_purpose: Some("Улучшение процессов".to_string()),
            key_concepts: vec!["уровни зрелости".to_string(), "процессные области".to_string()],
            ..Default::default()
        });
        let prompt = adapter.adaptation_prompt("текст", "", "");
        assert!(prompt.contains("- Тема: CMMI для разработки"));
        assert!(prompt.contains("- Аудитория: специалисты"));
        assert!(prompt.contains("- Цель книги: Улучшение процессов"));
        assert!(prompt.contains("- Ключевые понятия: уровни зрелости, процессные области"));
    }

    #[tokio::test]
    async fn test_adapt_chapter_groups_and_splits() {
        let backend = Arc::new(RecordingBackend {
            prompts: Mutex::new(Vec::new()),
            fail: false,
        });
        let adapter = AudioAdapter::new(backend.clone(), 5);
        let adapted = adapter.adapt_chapter(&chapter(7)).await;

        assert_eq!(adapted.title, "Глава первая. Введение.");
        // 7 段分两组，每组返回两段
        assert_eq!(adapted.adapted_paragraphs.len(), 4);
        assert_eq!(adapted.original_paragraphs.len(), 7);
        assert_eq!(adapted.adaptation_metadata.chapter_number, 1);

        let prompts = backend.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 3);
        assert_eq!(prompts[1].temperature, 0.7);
        assert!(prompts[1].user.contains("(начало главы)"));
        assert!(prompts[2].user.contains("Абзац номер 3.\nАбзац номер 4."));
    }

    #[tokio::test]
    async fn test_failure_keeps_original_text() {
        let backend = Arc::new(RecordingBackend {
            prompts: Mutex::new(Vec::new()),
            fail: true,
        });
        let adapter = AudioAdapter::new(backend, 5);
        let mut ch = chapter(2);
        ch.paragraphs.insert(0, "[IMAGE_001]".to_string());
        let adapted = adapter.adapt_chapter(&ch).await;
        assert_eq!(adapted.title, "Введение");
        assert_eq!(
            adapted.adapted_paragraphs,
            vec!["Абзац номер 0.".to_string(), "Абзац номер 1.".to_string()]
        );
    }
}
