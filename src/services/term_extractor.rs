//! 英文术语提取
//!
//! 从俄文译文中找出残留的英文术语，供语音词典生成使用

use anyhow::Result;
use regex::Regex;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;
use tracing::info;

use crate::models::loaders::load_all_translated;
use crate::models::{is_image_placeholder, TranslatedChapter};

/// 输出文件中保留的高频术语数量
pub const TOP_FREQUENT: usize = 100;

/// 术语类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermKind {
    Abbreviation,
    Camelcase,
    Dotted,
    Level,
    Compound,
    Version,
    EnglishWord,
    Known,
}

pub type TermsByKind = BTreeMap<TermKind, BTreeSet<String>>;

const STOP_WORDS: &[&str] = &[
    "Figure", "Table", "Chapter", "Section", "Page", "The", "This", "That", "These", "Those", "A",
    "An", "And", "Or", "But", "In", "On", "At", "To", "For", "I", "II", "III", "IV", "V", "VI",
    "VII", "VIII", "IX", "X",
];

const KNOWN_TERMS: &[&str] = &[
    "CMMI",
    "SEI",
    "SCAMPI",
    "CMU",
    "Process Area",
    "Maturity Level",
    "Capability Level",
    "Generic Goal",
    "Specific Goal",
    "Generic Practice",
    "Specific Practice",
    "Generic Goals",
    "Specific Goals",
    "CAR",
    "CM",
    "DAR",
    "IPM",
    "MA",
    "OPD",
    "OPF",
    "OPM",
    "OPP",
    "OT",
    "PI",
    "PMC",
    "PP",
    "PPQA",
    "QPM",
    "RD",
    "REQM",
    "RSKM",
    "SAM",
    "TS",
    "VAL",
    "VER",
    "Software Engineering Institute",
    "Carnegie Mellon University",
    "Development",
    "Acquisition",
    "Services",
    "Agile",
    "Scrum",
    "DevOps",
    "Waterfall",
    "High Maturity",
    "Appraisal",
    "Assessment",
];

/// 术语提取器
pub struct TermExtractor {
    rules: Vec<(Regex, TermKind)>,
    latin_word: Regex,
    stop_words: HashSet<&'static str>,
}

impl Default for TermExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl TermExtractor {
    pub fn new() -> Self {
        let rules = [
            (r"\b[A-Z]{2,}\b", TermKind::Abbreviation),
            (r"\b[A-Z][a-z]+(?:[A-Z][a-z]+)+\b", TermKind::Camelcase),
            (r"\b[A-Z](?:\.[A-Z])+\.?\b", TermKind::Dotted),
            (r"\bLevel\s+\d+\b", TermKind::Level),
            (r"\b[A-Z][a-z]+\s+[A-Z][a-z]+\b", TermKind::Compound),
            (r"\b[Vv](?:ersion)?\s*\d+\.\d+\b", TermKind::Version),
        ]
        .into_iter()
        .map(|(pattern, kind)| (Regex::new(pattern).expect("合法的正则"), kind))
        .collect();

        Self {
            rules,
            latin_word: Regex::new(r"[A-Za-z]+").expect("合法的正则"),
            stop_words: STOP_WORDS.iter().copied().collect(),
        }
    }

    /// 按类别提取一段文本中的术语
    pub fn extract_from_text(&self, text: &str) -> TermsByKind {
        let mut terms = TermsByKind::new();

        for (re, kind) in &self.rules {
            for m in re.find_iter(text) {
                self.insert(&mut terms, *kind, m.as_str());
            }
        }

        // 前后都是西里尔字母或空白的拉丁单词
        for m in self.latin_word.find_iter(text) {
            let before = text[..m.start()].chars().next_back();
            let after = text[m.end()..].chars().next();
            if before.is_some_and(is_cyrillic_or_space) && after.is_some_and(is_cyrillic_or_space) {
                self.insert(&mut terms, TermKind::EnglishWord, m.as_str());
            }
        }

        for term in KNOWN_TERMS {
            if text.contains(term) {
                terms.entry(TermKind::Known).or_default().insert(term.to_string());
            }
        }

        terms
    }

    fn insert(&self, terms: &mut TermsByKind, kind: TermKind, term: &str) {
        if !self.stop_words.contains(term) {
            terms.entry(kind).or_default().insert(term.to_string());
        }
    }

    /// 提取章节标题和文本段落中的术语
    pub fn extract_from_chapter(&self, chapter: &TranslatedChapter) -> TermsByKind {
        let mut terms = self.extract_from_text(&chapter.title);
        for paragraph in &chapter.paragraphs {
            if paragraph.is_empty() || is_image_placeholder(paragraph) {
                continue;
            }
            merge_terms(&mut terms, self.extract_from_text(paragraph));
        }
        terms
    }

    /// 汇总目录下全部译文的术语，频率按出现的文件数计
    pub async fn extract_from_directory(&self, dir: &Path) -> Result<TermReport> {
        let chapters = load_all_translated(dir).await?;
        info!("📚 待分析文件: {}", chapters.len());

        let mut report = TermReport::default();
        for (_, chapter) in &chapters {
            let chapter_terms = self.extract_from_chapter(chapter);
            let distinct: BTreeSet<&String> = chapter_terms.values().flatten().collect();
            for term in distinct {
                *report.frequency.entry(term.clone()).or_insert(0) += 1;
            }
            merge_terms(&mut report.terms, chapter_terms);
        }
        report.files = chapters.len();
        Ok(report)
    }
}

fn is_cyrillic_or_space(c: char) -> bool {
    matches!(c, 'а'..='я' | 'А'..='Я') || c.is_whitespace()
}

fn merge_terms(into: &mut TermsByKind, from: TermsByKind) {
    for (kind, set) in from {
        into.entry(kind).or_default().extend(set);
    }
}

/// 目录级提取结果
#[derive(Debug, Default, Clone)]
pub struct TermReport {
    pub terms: TermsByKind,
    pub frequency: HashMap<String, usize>,
    pub files: usize,
}

impl TermReport {
    /// 只保留出现在至少 `min_frequency` 个文件中的术语
    pub fn retain_min_frequency(&mut self, min_frequency: usize) {
        if min_frequency <= 1 {
            return;
        }
        let frequency = &self.frequency;
        for set in self.terms.values_mut() {
            set.retain(|t| frequency.get(t).copied().unwrap_or(0) >= min_frequency);
        }
        self.terms.retain(|_, set| !set.is_empty());
    }

    pub fn total_unique(&self) -> usize {
        self.terms.values().map(BTreeSet::len).sum()
    }

    /// 按频率降序，同频按字母序
    pub fn ranked(&self) -> Vec<(String, usize)> {
        let mut ranked: Vec<(String, usize)> =
            self.frequency.iter().map(|(t, c)| (t.clone(), *c)).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
    }

    pub fn to_output(&self) -> ExtractedTerms {
        let mut ranked = self.ranked();
        ranked.truncate(TOP_FREQUENT);
        ExtractedTerms {
            total_unique_terms: self.total_unique(),
            terms_by_type: self
                .terms
                .iter()
                .map(|(k, set)| (*k, set.iter().cloned().collect()))
                .collect(),
            term_frequency: RankedFrequency(ranked),
            statistics: self.terms.iter().map(|(k, set)| (*k, set.len())).collect(),
        }
    }

    pub fn log_summary(&self) {
        crate::utils::logging::log_section("📊 术语统计");
        info!("📝 唯一术语: {}", self.total_unique());
        for (kind, set) in &self.terms {
            info!("  • {:?}: {}", kind, set.len());
        }
        info!("🔝 高频术语:");
        for (term, count) in self.ranked().into_iter().take(20) {
            info!("  {:3}x - {}", count, term);
        }
    }
}

/// 保持排名顺序序列化为 JSON 对象
#[derive(Debug, Clone, PartialEq)]
pub struct RankedFrequency(pub Vec<(String, usize)>);

impl Serialize for RankedFrequency {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (term, count) in &self.0 {
            map.serialize_entry(term, count)?;
        }
        map.end()
    }
}

/// extracted_terms.json
#[derive(Debug, Clone, Serialize)]
pub struct ExtractedTerms {
    pub total_unique_terms: usize,
    pub terms_by_type: BTreeMap<TermKind, Vec<String>>,
    pub term_frequency: RankedFrequency,
    pub statistics: BTreeMap<TermKind, usize>,
}

/// 读取术语文件时只关心分类列表
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TermsFile {
    #[serde(default)]
    pub terms_by_type: BTreeMap<String, Vec<String>>,
}

impl TermsFile {
    /// 去重后的全部术语
    pub fn all_terms(&self) -> BTreeSet<String> {
        self.terms_by_type.values().flatten().cloned().collect()
    }
}
