//! 文本书籍拆分 - 业务能力层
//!
//! TXT / Markdown 全文 → 章节，只做纯计算
//!
//! 拆分顺序：
//! 1. Markdown 取一、二级标题；没有时与 TXT 一样找 `Chapter 1` / `Глава 2` 这类标题行
//! 2. 第一个标题之前有正文时单独成为"前言"
//! 3. 一个标题都没有时按字数切成若干"部分"
//!
//! Markdown 图片 `![..](..)` 变成 `[IMAGE_C{章:03}_I{序号:02}]` 占位段落

use regex::Regex;
use std::sync::LazyLock;

use crate::infrastructure::BookFormat;

/// 没有标题时每章的字符数
pub const CHARS_PER_CHAPTER: usize = 10_000;
/// 大段文本按句子重新分段时每段的句数
pub const SENTENCES_PER_PARAGRAPH: usize = 8;
/// 段落最少字符数（不含）
const MIN_PARAGRAPH_CHARS: usize = 10;
const TITLE_MAX_CHARS: usize = 150;
const PREFACE_TITLE: &str = "Предисловие";
const UNTITLED: &str = "Без названия";

/// 句点后不断句的缩写（小写）
const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "inc", "ltd", "corp", "co", "vs", "etc", "i.e",
    "e.g", "ph.d", "fig", "no", "т.е", "т.д", "т.п", "см", "рис",
];

static TEXT_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^[ \t]*((?:Chapter|CHAPTER|Part|PART|Глава|ГЛАВА|Часть|ЧАСТЬ)[ \t]+(?:\d+|[IVX]+)\b[^\n]*)$",
    )
    .expect("合法的正则")
});
static MARKDOWN_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,2}[ \t]+([^\n]+?)[ \t#]*$").expect("合法的正则"));
static MARKDOWN_SUBHEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#{3,6}[ \t]+").expect("合法的正则"));
static MARKDOWN_IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").expect("合法的正则"));
static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*\n").expect("合法的正则"));
static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+[ \t\n]+").expect("合法的正则"));

/// 从文本书籍拆出的章节
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChapter {
    pub title: String,
    pub paragraphs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Block {
    Text(String),
    Image,
}

struct Heading {
    start: usize,
    body_start: usize,
    title: String,
}

/// 拆分全文
pub fn split_book_text(text: &str, format: BookFormat) -> Vec<TextChapter> {
    split_with_limit(text, format, CHARS_PER_CHAPTER)
}

fn split_with_limit(text: &str, format: BookFormat, chars_per_chapter: usize) -> Vec<TextChapter> {
    let headings = find_headings(text, format);

    let raw: Vec<(String, Vec<Block>)> = if headings.is_empty() {
        group_into_parts(split_blocks(text, format), chars_per_chapter)
    } else {
        let mut raw = Vec::new();
        let preface = split_blocks(&text[..headings[0].start], format);
        if preface.iter().any(|b| matches!(b, Block::Text(_))) {
            raw.push((PREFACE_TITLE.to_string(), preface));
        }
        for (i, heading) in headings.iter().enumerate() {
            let end = headings.get(i + 1).map(|h| h.start).unwrap_or(text.len());
            let blocks = split_blocks(&text[heading.body_start..end], format);
            // 只有标题没有正文（例如书名）
            if blocks.is_empty() {
                continue;
            }
            raw.push((heading.title.clone(), blocks));
        }
        raw
    };

    raw.into_iter()
        .enumerate()
        .map(|(number, (title, blocks))| TextChapter {
            title,
            paragraphs: render_blocks(number, blocks),
        })
        .collect()
}

fn find_headings(text: &str, format: BookFormat) -> Vec<Heading> {
    let collect = |re: &Regex| -> Vec<Heading> {
        re.captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let title = caps.get(1)?;
                Some(Heading {
                    start: whole.start(),
                    body_start: whole.end(),
                    title: clean_heading(title.as_str()),
                })
            })
            .collect()
    };

    if format == BookFormat::Markdown {
        let headings = collect(&MARKDOWN_HEADING);
        if !headings.is_empty() {
            return headings;
        }
    }
    collect(&TEXT_HEADING)
}

/// 标题：去掉装饰符号、合并空白、限制长度
pub fn clean_heading(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches(|c: char| c == '#' || c == '*' || c == '_' || c == '=');
    let collapsed = trimmed.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        UNTITLED.to_string()
    } else if collapsed.chars().count() > TITLE_MAX_CHARS {
        collapsed.chars().take(TITLE_MAX_CHARS - 3).collect::<String>() + "..."
    } else {
        collapsed
    }
}

/// 按空行切段，段内换行合并为空格
fn split_blocks(body: &str, format: BookFormat) -> Vec<Block> {
    let mut blocks = Vec::new();

    for chunk in PARAGRAPH_BREAK.split(body) {
        let mut chunk = chunk.trim().to_string();
        if chunk.is_empty() {
            continue;
        }

        let mut images = 0;
        if format == BookFormat::Markdown {
            images = MARKDOWN_IMAGE.find_iter(&chunk).count();
            if images > 0 {
                chunk = MARKDOWN_IMAGE.replace_all(&chunk, "").into_owned();
            }
            chunk = MARKDOWN_SUBHEADING.replace(chunk.trim_start(), "").into_owned();
        }

        let text = chunk.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.chars().count() > MIN_PARAGRAPH_CHARS {
            let sentences = split_sentences(&text);
            if sentences.len() > SENTENCES_PER_PARAGRAPH * 2 {
                blocks.extend(
                    sentences
                        .chunks(SENTENCES_PER_PARAGRAPH)
                        .map(|group| Block::Text(group.join(" "))),
                );
            } else {
                blocks.push(Block::Text(text));
            }
        }
        for _ in 0..images {
            blocks.push(Block::Image);
        }
    }

    blocks
}

fn is_abbreviation(word: &str) -> bool {
    let word = word.trim_start_matches(['(', '"', '«']);
    let mut chars = word.chars();
    let single_initial = matches!((chars.next(), chars.next()), (Some(c), None) if c.is_uppercase());
    single_initial || ABBREVIATIONS.contains(&word.to_lowercase().as_str())
}

/// 按句末标点断句：下一句须以大写字母开头，缩写和姓名首字母不断
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for m in SENTENCE_END.find_iter(text) {
        let next_upper = text[m.end()..]
            .chars()
            .next()
            .map(char::is_uppercase)
            .unwrap_or(false);
        if !next_upper {
            continue;
        }
        let last_word = text[start..m.start()]
            .rsplit(char::is_whitespace)
            .next()
            .unwrap_or("");
        if is_abbreviation(last_word) {
            continue;
        }
        sentences.push(text[start..m.end()].trim().to_string());
        start = m.end();
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

/// 没有标题时按字数把段落分成若干部分
fn group_into_parts(blocks: Vec<Block>, chars_per_chapter: usize) -> Vec<(String, Vec<Block>)> {
    let mut parts = Vec::new();
    let mut current = Vec::new();
    let mut size = 0;

    for block in blocks {
        let len = match &block {
            Block::Text(text) => text.chars().count(),
            Block::Image => 0,
        };
        if size + len > chars_per_chapter && !current.is_empty() {
            parts.push((
                format!("Часть {}", parts.len() + 1),
                std::mem::take(&mut current),
            ));
            size = 0;
        }
        current.push(block);
        size += len;
    }
    if !current.is_empty() {
        parts.push((format!("Часть {}", parts.len() + 1), current));
    }
    parts
}

fn render_blocks(chapter: usize, blocks: Vec<Block>) -> Vec<String> {
    let mut image_index = 0;
    blocks
        .into_iter()
        .map(|block| match block {
            Block::Text(text) => text,
            Block::Image => {
                let placeholder = format!("[IMAGE_C{:03}_I{:02}]", chapter, image_index);
                image_index += 1;
                placeholder
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::is_image_placeholder;

    const MARKDOWN_BOOK: &str = "# The Process Book

## Chapter 1 Getting Started

First paragraph of the first chapter,
wrapped over two lines.

![Maturity levels](img/levels.png)

### Process details

Second paragraph with more words.

## Chapter 2 Next Steps

Only paragraph of chapter two.
";

    #[test]
    fn test_markdown_headings_images_and_subheadings() {
        let chapters = split_book_text(MARKDOWN_BOOK, BookFormat::Markdown);
        assert_eq!(chapters.len(), 2);

        assert_eq!(chapters[0].title, "Chapter 1 Getting Started");
        assert_eq!(
            chapters[0].paragraphs,
            vec![
                "First paragraph of the first chapter, wrapped over two lines.".to_string(),
                "[IMAGE_C000_I00]".to_string(),
                "Process details".to_string(),
                "Second paragraph with more words.".to_string(),
            ]
        );
        assert!(is_image_placeholder(&chapters[0].paragraphs[1]));

        assert_eq!(chapters[1].title, "Chapter 2 Next Steps");
        assert_eq!(chapters[1].paragraphs, vec!["Only paragraph of chapter two.".to_string()]);
    }

    #[test]
    fn test_text_headings_keep_preface() {
        let text = "A short note before everything starts.\n\n\
                    Chapter 1 Intro\n\nThe first chapter body text.\n\n\
                    Глава 2 Процессы\n\nТекст второй главы книги.";
        let chapters = split_book_text(text, BookFormat::Text);
        let titles: Vec<&str> = chapters.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Предисловие", "Chapter 1 Intro", "Глава 2 Процессы"]);
        assert_eq!(chapters[2].paragraphs, vec!["Текст второй главы книги.".to_string()]);
    }

    #[test]
    fn test_markdown_image_syntax_is_plain_text_in_txt() {
        let chapters = split_book_text("Look at ![this](a.png) picture here.", BookFormat::Text);
        assert_eq!(chapters[0].paragraphs, vec!["Look at ![this](a.png) picture here.".to_string()]);
    }

    #[test]
    fn test_without_headings_splits_into_parts_by_size() {
        let paragraph = "Plain paragraph without any heading at all.";
        let text = vec![paragraph; 5].join("\n\n");
        let chapters = split_with_limit(&text, BookFormat::Text, 100);
        assert_eq!(chapters.len(), 3);
        assert_eq!(chapters[0].title, "Часть 1");
        assert_eq!(chapters[0].paragraphs.len(), 2);
        assert_eq!(chapters[2].title, "Часть 3");
        assert_eq!(chapters[2].paragraphs.len(), 1);
    }

    #[test]
    fn test_sentences_respect_abbreviations_and_initials() {
        let sentences = split_sentences("Dr. Smith came. He left! Then e.g. this. J. Doe wrote it. Final");
        assert_eq!(
            sentences,
            vec!["Dr. Smith came.", "He left!", "Then e.g. this.", "J. Doe wrote it.", "Final"]
        );
    }

    #[test]
    fn test_wall_of_text_is_split_by_sentences() {
        let text = (1..=20)
            .map(|n| format!("Sentence number {} is here.", n))
            .collect::<Vec<_>>()
            .join(" ");
        let chapters = split_book_text(&text, BookFormat::Text);
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].paragraphs.len(), 3);
        assert!(chapters[0].paragraphs[0].starts_with("Sentence number 1 is here."));
        assert!(chapters[0].paragraphs[2].ends_with("Sentence number 20 is here."));
    }

    #[test]
    fn test_clean_heading() {
        assert_eq!(clean_heading("  **Chapter  3**  "), "Chapter 3");
        assert_eq!(clean_heading("###"), "Без названия");
    }
}
