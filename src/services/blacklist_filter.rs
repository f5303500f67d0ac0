//! 黑名单过滤 - 译文后处理
//!
//! 按 `filter.toml` 中的黑名单删除符号、短语和正则匹配内容

use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

use crate::error::{AppError, AppResult, FileError};
use crate::models::loaders::{list_files, load_json, save_json, is_translated_chapter_file};
use crate::models::{is_image_placeholder, TranslatedChapter};

pub const POSTPROCESS_LOG_NAME: &str = "postprocess_log.txt";

/// 正则黑名单条目
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatternRule {
    pub pattern: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Blacklist {
    #[serde(default)]
    pub phrases: Vec<String>,
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<PatternRule>,
}

/// 未写出的键取默认值
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FilterSettings {
    pub remove_empty_paragraphs: bool,
    pub case_sensitive: bool,
    pub trim_whitespace: bool,
    pub min_paragraph_length: usize,
    pub log_removals: bool,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            remove_empty_paragraphs: true,
            case_sensitive: false,
            trim_whitespace: true,
            min_paragraph_length: 10,
            log_removals: true,
        }
    }
}

/// 过滤配置（filter.toml）
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FilterConfig {
    #[serde(default)]
    pub blacklist: Blacklist,
    #[serde(default)]
    pub settings: FilterSettings,
}

impl FilterConfig {
    /// 读取配置；文件不存在时写入默认配置
    pub async fn load_or_create(path: &Path) -> AppResult<Self> {
        let path_str = path.display().to_string();
        if !path.exists() {
            warn!("⚠️ 未找到 {}，写入默认配置", path_str);
            let config = Self::default();
            let content = toml::to_string_pretty(&config)
                .map_err(|e| AppError::Other(format!("无法序列化默认过滤配置: {}", e)))?;
            tokio::fs::write(path, content)
                .await
                .map_err(|e| AppError::file_write_failed(&path_str, e))?;
            return Ok(config);
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AppError::file_read_failed(&path_str, e))?;
        toml::from_str(&content).map_err(|e| {
            FileError::TomlParseFailed {
                path: path_str,
                source: Box::new(e),
            }
            .into()
        })
    }
}

/// 过滤统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterStats {
    pub total_chapters: usize,
    pub total_paragraphs: usize,
    pub removed_paragraphs: usize,
    pub modified_paragraphs: usize,
    pub removed_phrases: BTreeMap<String, usize>,
    pub removed_symbols: BTreeMap<String, usize>,
    pub removed_patterns: BTreeMap<String, usize>,
}

impl FilterStats {
    pub fn log_summary(&self) {
        crate::utils::logging::log_section("📊 后处理统计");
        crate::utils::logging::log_stats_lines(&[
            ("📚 处理章节", self.total_chapters.to_string()),
            ("📝 处理段落", self.total_paragraphs.to_string()),
            ("✏️ 修改段落", self.modified_paragraphs.to_string()),
            ("🗑️ 删除段落", self.removed_paragraphs.to_string()),
        ]);
        for (symbol, count) in &self.removed_symbols {
            info!("  🔤 '{}': {} 次", symbol, count);
        }
        for (phrase, count) in &self.removed_phrases {
            info!("  📝 '{}': {} 次", crate::utils::truncate_text(phrase, 50), count);
        }
        for (pattern, count) in &self.removed_patterns {
            info!("  🔍 {}: {} 次", pattern, count);
        }
    }
}

/// 黑名单过滤器
pub struct BlacklistFilter {
    config: FilterConfig,
    phrases: Vec<(Regex, String)>,
    patterns: Vec<(Regex, String)>,
    stats: FilterStats,
    log_entries: Vec<String>,
}

static MULTI_SPACE: std::sync::LazyLock<Regex> =
    std::sync::LazyLock::new(|| Regex::new(r" +").expect("合法的正则"));
static MULTI_NEWLINE: std::sync::LazyLock<Regex> =
    std::sync::LazyLock::new(|| Regex::new(r"\n{3,}").expect("合法的正则"));

impl BlacklistFilter {
    /// 编译黑名单；无法编译的正则只记录警告
    pub fn new(config: FilterConfig) -> Self {
        let case_insensitive = !config.settings.case_sensitive;

        let phrases = config
            .blacklist
            .phrases
            .iter()
            .filter(|p| !p.is_empty())
            .filter_map(|phrase| {
                RegexBuilder::new(&regex::escape(phrase))
                    .case_insensitive(case_insensitive)
                    .build()
                    .ok()
                    .map(|re| (re, phrase.clone()))
            })
            .collect();

        let patterns = config
            .blacklist
            .patterns
            .iter()
            .filter(|rule| !rule.pattern.is_empty())
            .filter_map(|rule| {
                match RegexBuilder::new(&rule.pattern)
                    .case_insensitive(case_insensitive)
                    .build()
                {
                    Ok(re) => {
                        let description = if rule.description.is_empty() {
                            rule.pattern.clone()
                        } else {
                            rule.description.clone()
                        };
                        Some((re, description))
                    }
                    Err(e) => {
                        warn!("⚠️ 正则编译失败 '{}': {}", rule.pattern, e);
                        None
                    }
                }
            })
            .collect();

        Self {
            config,
            phrases,
            patterns,
            stats: FilterStats::default(),
            log_entries: Vec::new(),
        }
    }

    pub fn stats(&self) -> &FilterStats {
        &self.stats
    }

    pub fn log_entries(&self) -> &[String] {
        &self.log_entries
    }

    fn note(&mut self, entry: String) {
        if self.config.settings.log_removals {
            self.log_entries.push(entry);
        }
    }

    /// 过滤一段文本：符号 → 短语 → 正则 → 空白整理
    pub fn filter_text(&mut self, text: &str, context: &str) -> String {
        if text.is_empty() {
            return String::new();
        }
        let mut result = text.to_string();

        for symbol in self.config.blacklist.symbols.clone() {
            if symbol.is_empty() {
                continue;
            }
            let count = result.matches(symbol.as_str()).count();
            if count > 0 {
                result = result.replace(symbol.as_str(), "");
                *self.stats.removed_symbols.entry(symbol.clone()).or_insert(0) += count;
                self.note(format!("{}: 删除符号 '{}' ({} 次)", context, symbol, count));
            }
        }

        let mut phrase_hits = Vec::new();
        for (re, phrase) in &self.phrases {
            let count = re.find_iter(&result).count();
            if count > 0 {
                result = re.replace_all(&result, "").into_owned();
                phrase_hits.push((phrase.clone(), count));
            }
        }
        for (phrase, count) in phrase_hits {
            *self.stats.removed_phrases.entry(phrase.clone()).or_insert(0) += count;
            self.note(format!("{}: 删除短语 '{}' ({} 次)", context, phrase, count));
        }

        let mut pattern_hits = Vec::new();
        for (re, description) in &self.patterns {
            let count = re.find_iter(&result).count();
            if count > 0 {
                result = re.replace_all(&result, "").into_owned();
                pattern_hits.push((description.clone(), count));
            }
        }
        for (description, count) in pattern_hits {
            *self.stats.removed_patterns.entry(description.clone()).or_insert(0) += count;
            self.note(format!("{}: 删除模式 '{}' ({} 次)", context, description, count));
        }

        if self.config.settings.trim_whitespace {
            let collapsed = MULTI_SPACE.replace_all(&result, " ");
            let trimmed = collapsed
                .split('\n')
                .map(str::trim)
                .collect::<Vec<_>>()
                .join("\n");
            result = MULTI_NEWLINE.replace_all(&trimmed, "\n\n").into_owned();
        }

        if result != text {
            self.stats.modified_paragraphs += 1;
        }
        result
    }

    /// 去掉空白后是否短于最小长度
    pub fn is_paragraph_empty(&self, text: &str) -> bool {
        let len = text.chars().filter(|c| !c.is_whitespace()).count();
        len < self.config.settings.min_paragraph_length
    }

    /// 过滤一章，占位符原样保留
    pub fn process_chapter(&mut self, chapter: &TranslatedChapter, name: &str) -> TranslatedChapter {
        self.stats.total_chapters += 1;
        let mut filtered = chapter.clone();

        if !chapter.title.is_empty() {
            filtered.title = self.filter_text(&chapter.title, &format!("{}: 标题", name));
        }

        filtered.paragraphs = Vec::with_capacity(chapter.paragraphs.len());
        for (idx, paragraph) in chapter.paragraphs.iter().enumerate() {
            self.stats.total_paragraphs += 1;
            if is_image_placeholder(paragraph) {
                filtered.paragraphs.push(paragraph.clone());
                continue;
            }

            let context = format!("{}, 段落 {}", name, idx + 1);
            let text = self.filter_text(paragraph, &context);
            if self.config.settings.remove_empty_paragraphs && self.is_paragraph_empty(&text) {
                self.stats.removed_paragraphs += 1;
                self.note(format!("{}: 过滤后为空，已删除", context));
            } else {
                filtered.paragraphs.push(text);
            }
        }
        filtered
    }

    /// 过滤目录中的全部译文并写入输出目录
    pub async fn process_directory(&mut self, input: &Path, output: &Path) -> Result<FilterStats> {
        let files = list_files(input, is_translated_chapter_file).await?;
        if files.is_empty() {
            anyhow::bail!("{} 中没有译文文件", input.display());
        }
        info!("📚 待处理章节: {}", files.len());
        info!(
            "📋 黑名单: 短语 {} / 符号 {} / 模式 {}",
            self.config.blacklist.phrases.len(),
            self.config.blacklist.symbols.len(),
            self.config.blacklist.patterns.len()
        );

        tokio::fs::create_dir_all(output)
            .await
            .with_context(|| format!("无法创建目录: {}", output.display()))?;

        for path in files {
            let chapter: TranslatedChapter = match load_json(&path).await {
                Ok(chapter) => chapter,
                Err(e) => {
                    warn!("跳过无法解析的文件 {}: {:#}", path.display(), e);
                    continue;
                }
            };
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let filtered = self.process_chapter(&chapter, &name);
            if let Some(file_name) = path.file_name() {
                save_json(&output.join(file_name), &filtered).await?;
            }
        }

        if self.config.settings.log_removals && !self.log_entries.is_empty() {
            let mut content = format!(
                "后处理日志 {}\n{}\n\n",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S"),
                "=".repeat(60)
            );
            for entry in &self.log_entries {
                content.push_str(entry);
                content.push('\n');
            }
            let log_path = output.join(POSTPROCESS_LOG_NAME);
            tokio::fs::write(&log_path, content)
                .await
                .with_context(|| format!("无法写入 {}", log_path.display()))?;
        }

        Ok(self.stats.clone())
    }
}
