//! 英文术语的俄语读音替换
//!
//! TTS 不支持 SSML，只能把英文术语直接改写成西里尔字母拼读

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use phf::phf_map;
use regex::{NoExpand, Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clients::{LlmBackend, LlmRequest};
use crate::models::loaders::{list_files, load_json, save_json, is_translated_chapter_file};
use crate::models::{is_image_placeholder, TranslatedChapter};
use crate::services::term_extractor::TermsFile;

/// 每次请求生成读音的术语数
pub const GENERATE_BATCH_SIZE: usize = 20;

/// 内置读音表
pub static BUILTIN_PHONETICS: phf::Map<&'static str, &'static str> = phf_map! {
    "CMMI" => "си-эм-эм-ай",
    "SEI" => "эс-и-ай",
    "SCAMPI" => "скампи",
    "CMU" => "си-эм-ю",
    "CAR" => "си-эй-ар",
    "CM" => "си-эм",
    "DAR" => "ди-эй-ар",
    "IPM" => "ай-пи-эм",
    "MA" => "эм-эй",
    "OPD" => "оу-пи-ди",
    "OPF" => "оу-пи-эф",
    "OPM" => "оу-пи-эм",
    "OPP" => "оу-пи-пи",
    "OT" => "оу-ти",
    "PI" => "пи-ай",
    "PMC" => "пи-эм-си",
    "PP" => "пи-пи",
    "PPQA" => "пи-пи-кью-эй",
    "QPM" => "кью-пи-эм",
    "RD" => "ар-ди",
    "REQM" => "рек-эм",
    "RSKM" => "риск-эм",
    "SAM" => "сэм",
    "Process Area" => "про́цесс э́риа",
    "Process Areas" => "про́цесс э́риаз",
    "Maturity Level" => "мэтью́рити ле́вел",
    "Capability Level" => "кейпэби́лити ле́вел",
    "Generic Goal" => "джене́рик гоул",
    "Specific Goal" => "специ́фик гоул",
    "Generic Practice" => "джене́рик прэ́ктис",
    "Specific Practice" => "специ́фик прэ́ктис",
    "Generic Goals" => "джене́рик гоулз",
    "Specific Goals" => "специ́фик гоулз",
    "Software Engineering Institute" => "со́фтвер энжини́ринг и́нститьют",
    "Carnegie Mellon University" => "ка́рнеги ме́ллон юниве́рсити",
    "Carnegie Mellon" => "ка́рнеги ме́ллон",
    "Agile" => "э́джайл",
    "Scrum" => "скрам",
    "DevOps" => "дев-опс",
    "Waterfall" => "во́терфол",
    "Version" => "вёршн",
    "Development" => "девело́пмент",
    "Acquisition" => "эквизи́шн",
    "Services" => "сёрвисез",
    "Level 1" => "левел ван",
    "Level 2" => "левел ту",
    "Level 3" => "левел фри",
    "Level 4" => "левел фор",
    "Level 5" => "левел файв",
};

/// 同时收录带点写法（C.M.M.I.）的缩写
const DOTTED_ABBREVIATIONS: &[&str] = &[
    "CMMI", "SEI", "CAR", "CM", "DAR", "IPM", "MA", "OPD", "OPF", "OPM", "OPP", "OT", "PI", "PMC",
    "PP", "PPQA", "QPM", "RD", "REQM", "RSKM", "SAM",
];

/// 提示词中的示例
const PROMPT_EXAMPLES: &[(&str, &str)] = &[
    ("CMMI", "си-эм-эм-ай"),
    ("SEI", "эс-и-ай"),
    ("API", "эй-пи-ай"),
    ("URL", "ю-ар-эл"),
    ("HTML", "эйч-ти-эм-эл"),
    ("Process Area", "про́цесс э́риа"),
    ("Maturity Level", "мэтью́рити ле́вел"),
    ("Software Engineering", "со́фтвер энжини́ринг"),
    ("Development", "девело́пмент"),
    ("Services", "сёрвисез"),
    ("Agile", "э́джайл"),
    ("Level", "левел"),
    ("C.M.M.I.", "си-эм-эм-ай"),
    ("U.S.A.", "ю-эс-эй"),
];

const PHONETIC_EXPERT_PROMPT: &str = "Ты - эксперт по фонетике и транскрипции. Создаешь точные фонетические транскрипции английских терминов на русский язык для синтезаторов речи.";

/// `CMMI` → `C.M.M.I.`
pub fn dotted_variant(abbreviation: &str) -> String {
    let letters: Vec<String> = abbreviation.chars().map(String::from).collect();
    format!("{}.", letters.join("."))
}

/// phonetics.json
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PhoneticsFile {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub generated_at: String,
    #[serde(default)]
    pub total_terms: usize,
    pub phonetics: BTreeMap<String, String>,
    #[serde(default)]
    pub statistics: PhoneticsStatistics,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PhoneticsStatistics {
    pub abbreviations: usize,
    pub compound_terms: usize,
    pub single_words: usize,
}

impl PhoneticsFile {
    pub fn new(phonetics: BTreeMap<String, String>) -> Self {
        let is_upper = |k: &str| k.chars().any(char::is_alphabetic) && !k.chars().any(char::is_lowercase);
        let statistics = PhoneticsStatistics {
            abbreviations: phonetics.keys().filter(|k| is_upper(k)).count(),
            compound_terms: phonetics.keys().filter(|k| k.contains(' ')).count(),
            single_words: phonetics
                .keys()
                .filter(|k| !k.contains(' ') && !is_upper(k))
                .count(),
        };
        Self {
            version: "1.0".to_string(),
            generated_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            total_terms: phonetics.len(),
            phonetics,
            statistics,
        }
    }
}

/// 编译好的读音替换表
pub struct PhoneticReplacer {
    /// 按术语长度降序
    rules: Vec<(Regex, String, String)>,
}

impl PhoneticReplacer {
    /// 仅内置读音
    pub fn builtin() -> Self {
        Self::from_entries(builtin_entries())
    }

    /// 用户词典覆盖内置读音
    pub fn with_user_dictionary(user: &BTreeMap<String, String>) -> Self {
        let mut entries = builtin_entries();
        entries.extend(user.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self::from_entries(entries)
    }

    /// 读取 phonetics.json（不存在时只用内置读音）
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("未找到 {}，使用内置读音表", path.display());
            return Ok(Self::builtin());
        }
        let file: PhoneticsFile = load_json(path).await?;
        info!("📖 已加载用户读音词典: {} 条", file.phonetics.len());
        Ok(Self::with_user_dictionary(&file.phonetics))
    }

    fn from_entries(entries: BTreeMap<String, String>) -> Self {
        let mut rules: Vec<(Regex, String, String)> = entries
            .into_iter()
            .filter(|(term, _)| !term.trim().is_empty())
            .filter_map(|(term, reading)| {
                let pattern = word_pattern(&term);
                match RegexBuilder::new(&pattern).case_insensitive(true).build() {
                    Ok(re) => Some((re, term, reading)),
                    Err(e) => {
                        warn!("⚠️ 跳过无法编译的术语 '{}': {}", term, e);
                        None
                    }
                }
            })
            .collect();
        rules.sort_by(|a, b| {
            b.1.chars()
                .count()
                .cmp(&a.1.chars().count())
                .then_with(|| a.1.cmp(&b.1))
        });
        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 整词、忽略大小写、长术语优先
    pub fn replace_in_text(&self, text: &str) -> String {
        let mut result = text.to_string();
        for (re, _, reading) in &self.rules {
            if re.is_match(&result) {
                result = re.replace_all(&result, NoExpand(reading)).into_owned();
            }
        }
        result
    }

    /// 替换标题和非占位符段落
    pub fn process_chapter(&self, chapter: &TranslatedChapter) -> TranslatedChapter {
        let mut out = chapter.clone();
        out.title = self.replace_in_text(&chapter.title);
        out.paragraphs = chapter
            .paragraphs
            .iter()
            .map(|p| {
                if p.is_empty() || is_image_placeholder(p) {
                    p.clone()
                } else {
                    self.replace_in_text(p)
                }
            })
            .collect();
        out
    }

    /// 处理目录下全部译文，返回处理的文件数
    pub async fn process_directory(&self, input: &Path, output: &Path) -> Result<usize> {
        let files = list_files(input, is_translated_chapter_file).await?;
        info!("📚 待处理文件: {}", files.len());
        tokio::fs::create_dir_all(output)
            .await
            .with_context(|| format!("无法创建目录: {}", output.display()))?;

        let mut processed = 0;
        for path in files {
            let chapter: TranslatedChapter = load_json(&path).await?;
            let Some(file_name) = path.file_name() else {
                continue;
            };
            save_json(&output.join(file_name), &self.process_chapter(&chapter)).await?;
            info!("✅ 已处理: {}", file_name.to_string_lossy());
            processed += 1;
        }
        Ok(processed)
    }
}

fn builtin_entries() -> BTreeMap<String, String> {
    let mut entries: BTreeMap<String, String> = BUILTIN_PHONETICS
        .entries()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    for abbr in DOTTED_ABBREVIATIONS {
        if let Some(reading) = BUILTIN_PHONETICS.get(abbr) {
            entries
                .entry(dotted_variant(abbr))
                .or_insert_with(|| reading.to_string());
        }
    }
    entries
}

/// 只在术语首尾是单词字符时加 `\b`
fn word_pattern(term: &str) -> String {
    let is_word = |c: Option<char>| c.is_some_and(|c| c.is_alphanumeric() || c == '_');
    let mut pattern = String::new();
    if is_word(term.chars().next()) {
        pattern.push_str(r"\b");
    }
    pattern.push_str(&regex::escape(term));
    if is_word(term.chars().next_back()) {
        pattern.push_str(r"\b");
    }
    pattern
}

/// 借助 LLM 生成读音
pub struct PhoneticGenerator {
    backend: Arc<dyn LlmBackend>,
    batch_size: usize,
    workers: usize,
}

impl PhoneticGenerator {
    pub fn new(backend: Arc<dyn LlmBackend>, workers: usize) -> Self {
        Self {
            backend,
            batch_size: GENERATE_BATCH_SIZE,
            workers: workers.max(1),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    fn build_prompt(terms: &[String]) -> String {
        let examples = PROMPT_EXAMPLES
            .iter()
            .take(10)
            .map(|(en, ru)| format!("{}: {}", en, ru))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "Создай фонетическую транскрипцию на русском языке для следующих английских терминов.\n\
Транскрипция должна помочь правильному произношению при чтении вслух синтезатором речи.\n\n\
Правила:\n\
1. Для аббревиатур - произносить по буквам через дефис (FBI → эф-би-ай)\n\
2. Для слов - фонетическая запись кириллицей с ударениями (Development → девело́пмент)\n\
3. Для составных терминов - транскрипция каждого слова (Process Area → про́цесс э́риа)\n\
4. Использовать ударения где нужно (знак ́ после ударной гласной)\n\n\
Примеры:\n{}\n\n\
Термины для транскрипции:\n{}\n\n\
Формат ответа - JSON объект, где ключ - оригинальный термин, значение - транскрипция:\n\
{{\"термин\": \"транскрипция\"}}",
            examples,
            terms.join("\n")
        )
    }

    /// 生成一批读音；请求失败时返回空表
    pub async fn generate_batch(&self, terms: &[String]) -> BTreeMap<String, String> {
        if terms.is_empty() {
            return BTreeMap::new();
        }
        let request = LlmRequest::new(Self::build_prompt(terms))
            .with_system(PHONETIC_EXPERT_PROMPT)
            .with_temperature(0.3)
            .with_max_tokens(2000);

        match self.backend.complete(&request).await {
            Ok(response) => parse_phonetic_response(&response, terms),
            Err(e) => {
                warn!("❌ 读音生成失败: {:#}", e);
                BTreeMap::new()
            }
        }
    }

    /// 为术语文件中尚无读音的术语生成读音，结果以示例打底
    pub async fn generate_all(&self, terms: &TermsFile) -> BTreeMap<String, String> {
        let mut phonetics: BTreeMap<String, String> = PROMPT_EXAMPLES
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let pending: Vec<String> = terms
            .all_terms()
            .into_iter()
            .filter(|t| !phonetics.contains_key(t))
            .collect();
        info!("📝 待生成读音: {}", pending.len());
        if pending.is_empty() {
            return phonetics;
        }

        let batches: Vec<Vec<String>> = pending.chunks(self.batch_size).map(<[String]>::to_vec).collect();
        info!("📦 批次数: {}", batches.len());

        let results: Vec<BTreeMap<String, String>> = stream::iter(batches)
            .map(|batch| async move { self.generate_batch(&batch).await })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        for result in results {
            if let Some((term, reading)) = result.iter().next() {
                info!("  ✓ {} → {}", term, reading);
            }
            phonetics.extend(result);
        }
        phonetics
    }
}

/// 取第一个 `{` 到最后一个 `}` 解析 JSON，失败时逐行匹配
pub fn parse_phonetic_response(response: &str, terms: &[String]) -> BTreeMap<String, String> {
    let (Some(start), Some(end)) = (response.find('{'), response.rfind('}')) else {
        warn!("⚠️ 响应中没有 JSON");
        return parse_lines(response, terms);
    };
    if end <= start {
        return parse_lines(response, terms);
    }
    match serde_json::from_str::<BTreeMap<String, String>>(&response[start..=end]) {
        Ok(map) => map,
        Err(e) => {
            warn!("⚠️ JSON 解析失败: {}", e);
            parse_lines(response, terms)
        }
    }
}

fn parse_lines(response: &str, terms: &[String]) -> BTreeMap<String, String> {
    const SEPARATORS: [&str; 4] = [":", "→", "-", "—"];
    let quotes: &[char] = &['"', '\''];
    let mut result = BTreeMap::new();

    for line in response.lines() {
        for term in terms {
            if !line.contains(term.as_str()) {
                continue;
            }
            for sep in SEPARATORS {
                let Some((key, value)) = line.split_once(sep) else {
                    continue;
                };
                let key = key.trim().trim_matches(quotes);
                let value = value.trim().trim_matches(quotes).trim_end_matches(',');
                let value = value.trim().trim_matches(quotes);
                if key.contains(term.as_str()) && !value.is_empty() {
                    result.insert(term.clone(), value.to_string());
                    break;
                }
            }
        }
    }
    result
}
