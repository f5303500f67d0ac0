//! 章节拆分 - 业务能力层
//!
//! 把按页切好的文本拆成章节，只做纯计算，不碰文件
//!
//! 拆分顺序：
//! 1. 从每页开头几行识别章节标题，得到一份类似目录的条目列表
//! 2. 条目足够时按目录拆分（合并过短章节、消除重叠、补齐漏页）
//! 3. 否则每 30 页一章

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

use crate::models::{BookMetadata, ExtractedChapter};

/// 章节最少页数，不足时与后续条目合并
pub const MIN_PAGES: usize = 2;
/// 没有目录时每章的页数
pub const PAGES_PER_CHAPTER: usize = 30;
/// 合并标题时的长度上限
const MERGED_TITLE_LIMIT: usize = 100;
/// 标题最大长度
const TITLE_MAX_CHARS: usize = 150;
/// 段落最少字符数（不含）
const MIN_PARAGRAPH_CHARS: usize = 10;

static PRIMARY_HEADINGS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r"^(Chapter|CHAPTER|Глава|ГЛАВА)\s+(\d+|[IVX]+)\b",
        r"^(Part|PART|Часть|ЧАСТЬ)\s+(\d+|[IVX]+)\b",
        r"^(Appendix|APPENDIX|Приложение)\b",
        r"^(Introduction|INTRODUCTION|Введение)\s*$",
    ])
});

static SECONDARY_HEADINGS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r"^(Section|SECTION|Раздел)\s+(\d+|[IVX]+)\b",
        r"^(\d+)\.\s+[A-ZА-Я][a-zа-яA-Za-z\s]+$",
    ])
});

static TITLE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r"^(Chapter|CHAPTER|Глава)\s+(\d+|[IVX]+)",
        r"^(Part|PART|Часть)\s+(\d+|[IVX]+)",
        r"^(\d+\.)\s+[A-ZА-Я][a-zа-я]+",
        r"^(Section|SECTION|Раздел)\s+(\d+)",
    ])
});

static TRAILING_PAGE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\d+\s*$").expect("合法的正则"));
static HORIZONTAL_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+").expect("合法的正则"));
static LEADING_LINE_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]+").expect("合法的正则"));
static TRAILING_LINE_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+\n").expect("合法的正则"));
static BLANK_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{4,}").expect("合法的正则"));

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("合法的正则"))
        .collect()
}

/// 目录条目（页码从 0 开始）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineEntry {
    pub level: u8,
    pub title: String,
    pub page: usize,
}

/// 章节页码范围（闭区间）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterSpan {
    pub title: String,
    pub start_page: usize,
    pub end_page: usize,
}

impl ChapterSpan {
    pub fn page_count(&self) -> usize {
        self.end_page + 1 - self.start_page
    }
}

/// 拆分完整性报告
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionReport {
    /// (章节序号, 与前面章节重叠的页)
    pub overlapping: Vec<(usize, Vec<usize>)>,
    pub missing_pages: Vec<usize>,
    pub average_pages: f64,
    pub min_pages: usize,
    pub max_pages: usize,
}

impl ExtractionReport {
    pub fn is_clean(&self) -> bool {
        self.overlapping.is_empty() && self.missing_pages.is_empty()
    }
}

/// 从每页前 10 行识别章节标题
pub fn detect_outline(pages: &[String]) -> Vec<OutlineEntry> {
    let mut entries = Vec::new();

    for (page_idx, page) in pages.iter().enumerate() {
        for line in page.lines().take(10) {
            let line = line.trim();
            if line.chars().count() < 3 {
                continue;
            }
            let level = if PRIMARY_HEADINGS.iter().any(|re| re.is_match(line)) {
                1
            } else if SECONDARY_HEADINGS.iter().any(|re| re.is_match(line)) {
                2
            } else {
                continue;
            };
            entries.push(OutlineEntry {
                level,
                title: line.to_string(),
                page: page_idx,
            });
            break;
        }
    }

    filter_outline(entries)
}

/// 只保留顶层条目或带章节关键词的条目
pub fn filter_outline(entries: Vec<OutlineEntry>) -> Vec<OutlineEntry> {
    const KEYWORDS: [&str; 8] = [
        "chapter",
        "part",
        "introduction",
        "глава",
        "часть",
        "appendix",
        "process area",
        "section",
    ];
    entries
        .into_iter()
        .filter(|e| {
            let lower = e.title.to_lowercase();
            e.level <= 2 || KEYWORDS.iter().any(|k| lower.contains(k))
        })
        .collect()
}

/// 按目录拆分章节
///
/// 每个条目到下一个条目之前的一页为止；过短的条目与后续条目合并，
/// 之后消除重叠并把漏掉的页并入相邻章节
pub fn split_by_outline(outline: &[OutlineEntry], total_pages: usize) -> Vec<ChapterSpan> {
    if outline.is_empty() || total_pages == 0 {
        return Vec::new();
    }
    let last_page = total_pages - 1;
    let end_before = |idx: usize| -> usize {
        match outline.get(idx + 1) {
            Some(next) => next.page.saturating_sub(1),
            None => last_page,
        }
    };

    // 合并过短的章节
    let mut merged: Vec<ChapterSpan> = Vec::new();
    let mut i = 0;
    while i < outline.len() {
        let current = &outline[i];
        let mut title = current.title.clone();
        let start = current.page;
        let mut end = end_before(i);

        while end.saturating_sub(start) < MIN_PAGES - 1 && i + 1 < outline.len() {
            i += 1;
            end = end_before(i);
            let next = &outline[i];
            if next.level <= current.level + 1 && title.chars().count() < MERGED_TITLE_LIMIT {
                title.push_str(" / ");
                title.push_str(&next.title);
            }
        }

        merged.push(ChapterSpan {
            title,
            start_page: start,
            end_page: end.min(last_page),
        });
        i += 1;
    }

    // 消除重叠并丢弃无效范围
    let mut chapters: Vec<ChapterSpan> = Vec::with_capacity(merged.len());
    let mut prev_end: Option<usize> = None;
    for span in merged {
        let mut start = span.start_page;
        if let Some(prev) = prev_end {
            if start <= prev {
                start = prev + 1;
            }
        }
        prev_end = Some(span.end_page);

        if start < total_pages && span.end_page >= start {
            chapters.push(ChapterSpan {
                title: clean_title(&span.title),
                start_page: start,
                end_page: span.end_page,
            });
        }
    }

    attach_uncovered_pages(&mut chapters, total_pages);
    chapters
}

/// 把未覆盖的页并入紧邻的章节，直到没有可并入的页
fn attach_uncovered_pages(chapters: &mut [ChapterSpan], total_pages: usize) {
    loop {
        let covered: BTreeSet<usize> = chapters
            .iter()
            .flat_map(|c| c.start_page..=c.end_page)
            .collect();
        let mut changed = false;

        for page in (0..total_pages).filter(|p| !covered.contains(p)) {
            if let Some(ch) = chapters.iter_mut().find(|c| c.end_page + 1 == page) {
                ch.end_page = page;
                changed = true;
                break;
            }
            if let Some(ch) = chapters.iter_mut().find(|c| c.start_page == page + 1) {
                ch.start_page = page;
                changed = true;
                break;
            }
        }

        if !changed {
            break;
        }
    }
}

/// 按固定页数拆分
pub fn split_by_pages(pages: &[String], pages_per_chapter: usize) -> Vec<ChapterSpan> {
    let per = pages_per_chapter.max(1);
    let mut chapters = Vec::new();

    for start in (0..pages.len()).step_by(per) {
        let end = (start + per - 1).min(pages.len() - 1);
        let text = pages[start..=end].join("\n");
        chapters.push(ChapterSpan {
            title: find_chapter_title(&text, chapters.len()),
            start_page: start,
            end_page: end,
        });
    }
    chapters
}

/// 选择拆分方式：识别到至少两个章节时按目录，否则按页
pub fn split_pages_into_chapters(pages: &[String]) -> Vec<ChapterSpan> {
    let outline = detect_outline(pages);
    let chapters = split_by_outline(&outline, pages.len());
    if chapters.len() >= 2 {
        chapters
    } else {
        split_by_pages(pages, PAGES_PER_CHAPTER)
    }
}

/// 在文本前 20 行中寻找章节标题
pub fn find_chapter_title(text: &str, chapter_index: usize) -> String {
    for line in text.lines().take(20) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if TITLE_PATTERNS.iter().any(|re| re.is_match(line)) {
            return clean_title(line);
        }

        let len = line.chars().count();
        let starts_upper = line.chars().next().map(char::is_uppercase).unwrap_or(false);
        if len > 5
            && len < 100
            && !line.ends_with('.')
            && !line.ends_with(',')
            && starts_upper
            && line.split_whitespace().count() < 15
        {
            return clean_title(line);
        }
    }

    format!("Часть {}", chapter_index + 1)
}

/// 清理标题：去掉末尾页码、合并空白、限制长度
pub fn clean_title(title: &str) -> String {
    let without_page = TRAILING_PAGE_NUMBER.replace(title, "");
    let collapsed = without_page.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() > TITLE_MAX_CHARS {
        collapsed.chars().take(TITLE_MAX_CHARS - 3).collect::<String>() + "..."
    } else {
        collapsed
    }
}

/// 清理文本，保留换行结构
pub fn clean_text(text: &str) -> String {
    let text = HORIZONTAL_SPACE.replace_all(text, " ");
    let text = LEADING_LINE_SPACE.replace_all(&text, "\n");
    let text = TRAILING_LINE_SPACE.replace_all(&text, "\n");
    let text = BLANK_RUNS.replace_all(&text, "\n\n\n");
    text.trim().to_string()
}

/// 按空行切分段落，丢弃过短的片段
pub fn split_into_paragraphs(text: &str) -> Vec<String> {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| p.chars().count() > MIN_PARAGRAPH_CHARS)
        .map(str::to_string)
        .collect()
}

/// 根据页码范围生成章节
pub fn build_chapter(number: usize, span: &ChapterSpan, pages: &[String]) -> ExtractedChapter {
    let end = span.end_page.min(pages.len().saturating_sub(1));
    let raw = if span.start_page <= end {
        pages[span.start_page..=end].join("\n")
    } else {
        String::new()
    };
    let text = clean_text(&raw);

    ExtractedChapter {
        number,
        title: span.title.clone(),
        start_page: span.start_page,
        end_page: span.end_page,
        paragraphs: split_into_paragraphs(&text),
        word_count: text.split_whitespace().count(),
    }
}

/// 检查页码覆盖情况
pub fn verify_extraction(metadata: &BookMetadata) -> ExtractionReport {
    let mut covered = BTreeSet::new();
    let mut report = ExtractionReport::default();

    for (idx, chapter) in metadata.chapters.iter().enumerate() {
        let pages: BTreeSet<usize> = (chapter.start_page..=chapter.end_page).collect();
        let overlap: Vec<usize> = covered.intersection(&pages).copied().collect();
        if !overlap.is_empty() {
            report.overlapping.push((idx, overlap));
        }
        covered.extend(pages);
    }

    report.missing_pages = (0..metadata.total_pages)
        .filter(|p| !covered.contains(p))
        .collect();

    let sizes: Vec<usize> = metadata.chapters.iter().map(|c| c.page_count).collect();
    if !sizes.is_empty() {
        report.average_pages = sizes.iter().sum::<usize>() as f64 / sizes.len() as f64;
        report.min_pages = sizes.iter().copied().min().unwrap_or(0);
        report.max_pages = sizes.iter().copied().max().unwrap_or(0);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChapterEntry;

    fn entry(level: u8, title: &str, page: usize) -> OutlineEntry {
        OutlineEntry {
            level,
            title: title.to_string(),
            page,
        }
    }

    #[test]
    fn test_clean_title_strips_page_numbers_and_caps_length() {
        assert_eq!(clean_title("  Chapter 1   Introduction   12 "), "Chapter 1 Introduction");
        let long = "A".repeat(200);
        let cleaned = clean_title(&long);
        assert_eq!(cleaned.chars().count(), 150);
        assert!(cleaned.ends_with("..."));
    }

    #[test]
    fn test_clean_text_keeps_line_structure() {
        let text = "  Line\t\tone  \n   line two\n\n\n\n\n\nNext";
        assert_eq!(clean_text(text), "Line one\nline two\n\n\nNext");
    }

    #[test]
    fn test_split_into_paragraphs_drops_short_fragments() {
        let text = "Short one\n\nThis paragraph is long enough.\n\n  12  \n\nAnother real paragraph here.";
        let paragraphs = split_into_paragraphs(text);
        assert_eq!(
            paragraphs,
            vec![
                "This paragraph is long enough.".to_string(),
                "Another real paragraph here.".to_string()
            ]
        );
    }

    #[test]
    fn test_find_chapter_title() {
        assert_eq!(find_chapter_title("\nChapter 3 Planning\nbody", 0), "Chapter 3 Planning");
        assert_eq!(
            find_chapter_title("Managing Requirements\nThe text starts here.", 0),
            "Managing Requirements"
        );
        assert_eq!(find_chapter_title("lowercase only.\nends with dot.", 4), "Часть 5");
    }

    #[test]
    fn test_detect_outline_from_page_heads() {
        let pages = vec![
            "Chapter 1 Introduction\ntext".to_string(),
            "just body text".to_string(),
            "Section 2 Details\nmore".to_string(),
        ];
        let outline = detect_outline(&pages);
        assert_eq!(
            outline,
            vec![entry(1, "Chapter 1 Introduction", 0), entry(2, "Section 2 Details", 2)]
        );
    }

    #[test]
    fn test_split_by_outline_merges_short_chapters() {
        let outline = vec![
            entry(1, "Chapter 1 Basics", 0),
            entry(2, "Section Overview", 1),
            entry(1, "Chapter 2 Advanced", 5),
        ];
        let spans = split_by_outline(&outline, 10);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].title, "Chapter 1 Basics / Section Overview");
        assert_eq!((spans[0].start_page, spans[0].end_page), (0, 4));
        assert_eq!((spans[1].start_page, spans[1].end_page), (5, 9));
    }

    #[test]
    fn test_split_by_outline_covers_leading_pages() {
        let outline = vec![entry(1, "Chapter 1", 3), entry(1, "Chapter 2", 6)];
        let spans = split_by_outline(&outline, 9);
        assert_eq!(spans[0].start_page, 0);
        assert_eq!(spans.last().map(|s| s.end_page), Some(8));
        let total: usize = spans.iter().map(ChapterSpan::page_count).sum();
        assert_eq!(total, 9);
    }

    #[test]
    fn test_split_by_pages_fallback() {
        let pages: Vec<String> = (0..65).map(|i| format!("page {}", i)).collect();
        let spans = split_by_pages(&pages, PAGES_PER_CHAPTER);
        assert_eq!(spans.len(), 3);
        assert_eq!((spans[2].start_page, spans[2].end_page), (60, 64));
        assert_eq!(spans[0].title, "Часть 1");
    }

    #[test]
    fn test_split_without_headings_uses_pages() {
        let pages: Vec<String> = (0..40).map(|_| "plain body text.".to_string()).collect();
        let spans = split_pages_into_chapters(&pages);
        assert_eq!(spans.len(), 2);
    }

    #[test]
    fn test_verify_extraction_reports_gaps_and_overlaps() {
        let chapter = |start, end| ChapterEntry {
            number: 0,
            title: String::new(),
            start_page: start,
            end_page: end,
            page_count: end - start + 1,
            status: "extracted".to_string(),
        };
        let metadata = BookMetadata {
            total_pages: 10,
            chapters: vec![chapter(0, 4), chapter(4, 6)],
            extraction_complete: true,
            ..Default::default()
        };
        let report = verify_extraction(&metadata);
        assert_eq!(report.overlapping, vec![(1, vec![4])]);
        assert_eq!(report.missing_pages, vec![7, 8, 9]);
        assert_eq!(report.min_pages, 3);
        assert_eq!(report.max_pages, 5);
        assert!(!report.is_clean());
    }
}
