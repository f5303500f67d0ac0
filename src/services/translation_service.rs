//! 翻译服务 - 业务能力层
//!
//! 只负责"把一个段落组翻译成俄语"的能力，不关心重试和调度
//!
//! - 提示词构建（译者身份 + 章节上下文 + 俄语指令）
//! - 译文按空行拆回段落，图片占位符保持原位
//! - 缺失段落逐段兜底翻译，兜底也失败时保留原文
//! - 章节标题翻译与摘要生成

use anyhow::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::clients::{LlmBackend, LlmRequest};
use crate::config::Config;
use crate::models::{is_image_placeholder, ParagraphGroup};
use crate::services::context_service::ChapterContext;
use crate::utils::logging;

/// 译者身份
pub const TRANSLATOR_PERSONA: &str = "Ты профессиональный переводчик технической литературы с английского на русский язык.

Твоя задача - создавать точные, читаемые переводы.

Ключевые принципы:
1. Сохраняй техническую точность
2. Используй принятую русскоязычную терминологию
3. Обеспечивай связность текста
4. Адаптируй для русскоязычной аудитории
5. Сохраняй форматирование и структуру

Стиль: формальный, технический, профессиональный.";

/// 摘要生成失败时的默认值
pub const DEFAULT_SUMMARY: &str = "Резюме главы";

const TITLE_MAX_TOKENS: u32 = 100;
const SUMMARY_MAX_TOKENS: u32 = 200;
const SUMMARY_PARAGRAPHS: usize = 3;

/// 每百万 token 的价格（美元）
const INPUT_PRICE_PER_MILLION: f64 = 0.14;
const OUTPUT_PRICE_PER_MILLION: f64 = 0.28;

/// 翻译统计
///
/// 在所有任务间共享，计数器均为原子类型
#[derive(Debug)]
pub struct TranslationStats {
    pub api_calls: AtomicUsize,
    pub api_errors: AtomicUsize,
    pub chars_sent: AtomicUsize,
    pub chars_received: AtomicUsize,
    pub completed_blocks: AtomicUsize,
    pub total_blocks: AtomicUsize,
    pub completed_chapters: AtomicUsize,
    pub total_chapters: AtomicUsize,
    started: Instant,
}

impl Default for TranslationStats {
    fn default() -> Self {
        Self {
            api_calls: AtomicUsize::new(0),
            api_errors: AtomicUsize::new(0),
            chars_sent: AtomicUsize::new(0),
            chars_received: AtomicUsize::new(0),
            completed_blocks: AtomicUsize::new(0),
            total_blocks: AtomicUsize::new(0),
            completed_chapters: AtomicUsize::new(0),
            total_chapters: AtomicUsize::new(0),
            started: Instant::now(),
        }
    }
}

impl TranslationStats {
    pub fn record_call(&self, sent: usize, received: usize) {
        self.api_calls.fetch_add(1, Ordering::Relaxed);
        self.chars_sent.fetch_add(sent, Ordering::Relaxed);
        self.chars_received.fetch_add(received, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.api_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// 估算费用：按 4 字符 1 token 计
    pub fn estimated_cost(&self) -> f64 {
        let input_tokens = self.chars_sent.load(Ordering::Relaxed) as f64 / 4.0;
        let output_tokens = self.chars_received.load(Ordering::Relaxed) as f64 / 4.0;
        (input_tokens * INPUT_PRICE_PER_MILLION + output_tokens * OUTPUT_PRICE_PER_MILLION)
            / 1_000_000.0
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// 打印最终统计
    pub fn log_report(&self, workers: usize) {
        let elapsed = self.elapsed();
        let api_calls = self.api_calls.load(Ordering::Relaxed);
        let mut lines = vec![
            (
                "✅ 已翻译章节",
                format!(
                    "{}/{}",
                    self.completed_chapters.load(Ordering::Relaxed),
                    self.total_chapters.load(Ordering::Relaxed)
                ),
            ),
            (
                "📦 已处理段落组",
                format!(
                    "{}/{}",
                    self.completed_blocks.load(Ordering::Relaxed),
                    self.total_blocks.load(Ordering::Relaxed)
                ),
            ),
            ("⏱️ 总耗时", format_duration(elapsed)),
            ("🚀 并发数", workers.to_string()),
            ("📤 发送字符", self.chars_sent.load(Ordering::Relaxed).to_string()),
            ("📥 接收字符", self.chars_received.load(Ordering::Relaxed).to_string()),
            ("🌐 API 请求", api_calls.to_string()),
            ("❌ 错误", self.api_errors.load(Ordering::Relaxed).to_string()),
            ("💰 估算费用", format!("${:.2}", self.estimated_cost())),
        ];
        if api_calls > 0 {
            let avg = elapsed.as_secs_f64() / api_calls as f64;
            lines.push(("⚡ 平均每请求", format!("{:.1} 秒", avg)));
        }

        logging::log_section("📊 翻译完成");
        logging::log_stats_lines(&lines);
    }
}

/// 格式化为 H:MM:SS
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// 翻译服务
pub struct TranslationService {
    backend: Arc<dyn LlmBackend>,
    temperature: f32,
    max_tokens: u32,
    stats: Arc<TranslationStats>,
}

impl TranslationService {
    pub fn new(backend: Arc<dyn LlmBackend>, config: &Config, stats: Arc<TranslationStats>) -> Self {
        Self {
            backend,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            stats,
        }
    }

    pub fn stats(&self) -> &Arc<TranslationStats> {
        &self.stats
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    /// 系统提示：译者身份 + 章节上下文
    pub fn system_prompt(context: Option<&ChapterContext>) -> String {
        match context.map(ChapterContext::to_prompt_section) {
            Some(section) if !section.is_empty() => format!("{}\n\n{}", TRANSLATOR_PERSONA, section),
            _ => TRANSLATOR_PERSONA.to_string(),
        }
    }

    /// 用户提示
    pub fn user_prompt(text: &str) -> String {
        format!(
            "Переведи следующий текст на русский язык.
Требования:
1. Сохрани все плейсхолдеры [IMAGE_XXX] без изменений
2. Используй профессиональную терминологию
3. Сохрани структуру абзацев (разделение через \\n\\n)
4. Адаптируй под русскоязычного читателя

Текст для перевода:
{}",
            text
        )
    }

    async fn call(&self, request: LlmRequest) -> Result<String> {
        let sent = request.user.chars().count();
        match self.backend.complete(&request).await {
            Ok(answer) => {
                self.stats.record_call(sent, answer.chars().count());
                Ok(answer)
            }
            Err(e) => {
                self.stats.record_error();
                Err(e)
            }
        }
    }

    /// 单次请求翻译一个段落组，并拆回段落
    pub async fn translate_group(
        &self,
        group: &ParagraphGroup,
        context: Option<&ChapterContext>,
    ) -> Result<Vec<String>> {
        let request = LlmRequest::new(Self::user_prompt(&group.text))
            .with_system(Self::system_prompt(context))
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        let translated = self.call(request).await?;
        Ok(self.reassemble(group, &translated).await)
    }

    /// 按原段落结构还原译文
    pub async fn reassemble(&self, group: &ParagraphGroup, translated: &str) -> Vec<String> {
        let parts = split_translation(translated);
        let slots = assign_parts(&group.paragraphs, parts);

        let mut result = Vec::with_capacity(slots.len());
        for (original, slot) in group.paragraphs.iter().zip(slots) {
            match slot {
                Some(text) => result.push(text),
                None => {
                    debug!("译文段落不足，逐段兜底: {}", logging::truncate_text(original, 40));
                    result.push(self.fallback_paragraph(original).await);
                }
            }
        }
        result
    }

    /// 逐段兜底翻译整个组
    pub async fn fallback_group(&self, group: &ParagraphGroup) -> Vec<String> {
        let mut result = Vec::with_capacity(group.paragraphs.len());
        for paragraph in &group.paragraphs {
            if is_image_placeholder(paragraph) {
                result.push(paragraph.clone());
            } else {
                result.push(self.fallback_paragraph(paragraph).await);
            }
        }
        result
    }

    /// 单段翻译，失败时返回原文
    pub async fn fallback_paragraph(&self, paragraph: &str) -> String {
        let request = LlmRequest::new(format!(
            "Переведи следующий текст на русский язык, сохраняя все плейсхолдеры [IMAGE_XXX] без изменений. Верни только перевод.\n\n{}",
            paragraph
        ))
        .with_system(TRANSLATOR_PERSONA)
        .with_temperature(self.temperature)
        .with_max_tokens(self.max_tokens);

        match self.call(request).await {
            Ok(text) => text,
            Err(e) => {
                warn!("兜底翻译失败，保留原文: {:#}", e);
                paragraph.to_string()
            }
        }
    }

    /// 翻译章节标题，失败时保留原标题
    pub async fn translate_title(&self, title: &str) -> String {
        if title.trim().is_empty() {
            return title.to_string();
        }
        let request = LlmRequest::new(format!(
            "Переведи заголовок главы на русский язык. Верни только перевод, без кавычек и пояснений.\n\n{}",
            title
        ))
        .with_system(TRANSLATOR_PERSONA)
        .with_temperature(self.temperature)
        .with_max_tokens(TITLE_MAX_TOKENS);

        match self.call(request).await {
            Ok(text) => text.trim_matches(|c: char| c == '"' || c == '«' || c == '»').trim().to_string(),
            Err(e) => {
                warn!("标题翻译失败: {:#}", e);
                title.to_string()
            }
        }
    }

    /// 根据前三段生成摘要
    pub async fn generate_summary(&self, paragraphs: &[String]) -> String {
        let text = paragraphs
            .iter()
            .filter(|p| !is_image_placeholder(p) && !p.trim().is_empty())
            .take(SUMMARY_PARAGRAPHS)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n");
        if text.is_empty() {
            return DEFAULT_SUMMARY.to_string();
        }

        let request = LlmRequest::new(format!(
            "Создай краткое резюме (2-3 предложения) следующего текста:\n\n{}\n\nРезюме:",
            text
        ))
        .with_temperature(self.temperature)
        .with_max_tokens(SUMMARY_MAX_TOKENS);

        match self.call(request).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!("摘要生成失败: {:#}", e);
                DEFAULT_SUMMARY.to_string()
            }
        }
    }
}

/// 按空行拆分译文，去掉空片段
pub fn split_translation(translated: &str) -> Vec<String> {
    translated
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// 把译文片段依次分配给文本段落
///
/// 占位符原样保留；片段不足的位置为 None；多出的片段并入最后一个文本段落
pub fn assign_parts(originals: &[String], parts: Vec<String>) -> Vec<Option<String>> {
    let mut parts = parts.into_iter();
    let mut slots: Vec<Option<String>> = originals
        .iter()
        .map(|original| {
            if is_image_placeholder(original) {
                Some(original.clone())
            } else {
                parts.next()
            }
        })
        .collect();

    let extra: Vec<String> = parts.collect();
    if !extra.is_empty() {
        let last_text = originals
            .iter()
            .rposition(|p| !is_image_placeholder(p))
            .and_then(|idx| slots[idx].as_mut());
        if let Some(last) = last_text {
            for part in extra {
                last.push_str("\n\n");
                last.push_str(&part);
            }
        }
    }
    slots
}
