//! 成书 - 把译文章节汇编为 Markdown 和 HTML

use anyhow::{Context, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::info;

use crate::models::loaders::load_all_translated;
use crate::models::{is_image_placeholder, TranslatedChapter};

pub const DEFAULT_BOOK_TITLE: &str = "Переведённая книга";

static CONTROL_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").expect("合法的正则")
});
static UNSAFE_FILE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[/\\:*?"<>|]"#).expect("合法的正则"));

/// 去掉 XML 不允许的控制字符（保留换行和制表符）
pub fn strip_control_chars(text: &str) -> String {
    CONTROL_CHARS.replace_all(text, "").into_owned()
}

/// 转义 XML 特殊字符并去掉控制字符
pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in strip_control_chars(text).chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// `[IMAGE_001]` → `IMAGE_001`
fn figure_id(placeholder: &str) -> &str {
    placeholder.trim().trim_start_matches('[').trim_end_matches(']')
}

fn chapter_heading(chapter: &TranslatedChapter) -> String {
    if chapter.title.trim().is_empty() {
        format!("Глава {}", chapter.number)
    } else {
        chapter.title.trim().to_string()
    }
}

/// 输出文件的主名
pub fn book_file_stem(title: &str) -> String {
    let stem = UNSAFE_FILE_CHARS.replace_all(title.trim(), "_").into_owned();
    if stem.is_empty() {
        DEFAULT_BOOK_TITLE.to_string()
    } else {
        stem
    }
}

/// 成书结果
#[derive(Debug, Clone)]
pub struct CompiledBook {
    pub markdown_path: PathBuf,
    pub html_path: PathBuf,
    pub chapters: usize,
    pub paragraphs: usize,
}

pub struct BookCompiler {
    title: String,
    author: String,
}

impl BookCompiler {
    pub fn new(title: impl Into<String>, author: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            title: if title.trim().is_empty() {
                DEFAULT_BOOK_TITLE.to_string()
            } else {
                title
            },
            author: author.into(),
        }
    }

    pub fn render_markdown(&self, chapters: &[TranslatedChapter]) -> String {
        let mut out = format!("# {}\n\n", strip_control_chars(&self.title));
        if !self.author.is_empty() {
            out.push_str(&format!("*{}*\n\n", strip_control_chars(&self.author)));
        }

        for chapter in chapters {
            out.push_str("---\n\n");
            out.push_str(&format!("## {}\n\n", strip_control_chars(&chapter_heading(chapter))));
            for paragraph in &chapter.paragraphs {
                if paragraph.trim().is_empty() {
                    continue;
                }
                if is_image_placeholder(paragraph) {
                    out.push_str(&format!("*[Рисунок: {}]*\n\n", figure_id(paragraph)));
                } else {
                    out.push_str(strip_control_chars(paragraph).trim());
                    out.push_str("\n\n");
                }
            }
        }
        out
    }

    pub fn render_html(&self, chapters: &[TranslatedChapter]) -> String {
        let title = escape_xml(&self.title);
        let mut out = format!(
            "<!DOCTYPE html>\n<html lang=\"ru\">\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n\
<style>\nbody {{ max-width: 45em; margin: 2em auto; font-family: serif; line-height: 1.5; }}\n\
h1, h2, .author {{ text-align: center; }}\np {{ text-align: justify; text-indent: 1.5em; }}\n\
figure {{ text-align: center; color: #555; font-style: italic; }}\n\
section {{ page-break-before: always; }}\n</style>\n</head>\n<body>\n\
<header>\n<h1>{title}</h1>\n"
        );
        if !self.author.is_empty() {
            out.push_str(&format!("<p class=\"author\">{}</p>\n", escape_xml(&self.author)));
        }
        out.push_str("</header>\n");

        for chapter in chapters {
            out.push_str(&format!(
                "<section id=\"chapter-{}\">\n<h2>{}</h2>\n",
                chapter.number,
                escape_xml(&chapter_heading(chapter))
            ));
            for paragraph in &chapter.paragraphs {
                if paragraph.trim().is_empty() {
                    continue;
                }
                if is_image_placeholder(paragraph) {
                    out.push_str(&format!(
                        "<figure><figcaption>Рисунок {}</figcaption></figure>\n",
                        escape_xml(figure_id(paragraph))
                    ));
                } else {
                    out.push_str(&format!("<p>{}</p>\n", escape_xml(paragraph.trim())));
                }
            }
            out.push_str("</section>\n");
        }
        out.push_str("</body>\n</html>\n");
        out
    }

    /// 读取目录中的译文，按文件名顺序写出 `<书名>.md` 和 `<书名>.html`
    pub async fn compile(&self, input: &Path, output: &Path) -> Result<CompiledBook> {
        let chapters: Vec<TranslatedChapter> = load_all_translated(input)
            .await?
            .into_iter()
            .map(|(_, chapter)| chapter)
            .collect();
        if chapters.is_empty() {
            anyhow::bail!("{} 中没有可汇编的译文", input.display());
        }
        info!("📚 汇编 {} 章: {}", chapters.len(), input.display());

        tokio::fs::create_dir_all(output)
            .await
            .with_context(|| format!("无法创建目录: {}", output.display()))?;

        let stem = book_file_stem(&self.title);
        let markdown_path = output.join(format!("{}.md", stem));
        let html_path = output.join(format!("{}.html", stem));

        tokio::fs::write(&markdown_path, self.render_markdown(&chapters))
            .await
            .with_context(|| format!("无法写入 {}", markdown_path.display()))?;
        tokio::fs::write(&html_path, self.render_html(&chapters))
            .await
            .with_context(|| format!("无法写入 {}", html_path.display()))?;

        Ok(CompiledBook {
            markdown_path,
            html_path,
            chapters: chapters.len(),
            paragraphs: chapters.iter().map(|c| c.paragraphs.len()).sum(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::loaders::save_json;
    use crate::models::translated_file_name;

    fn chapter(number: usize, title: &str, paragraphs: &[&str]) -> TranslatedChapter {
        TranslatedChapter {
            number,
            title: title.to_string(),
            paragraphs: paragraphs.iter().map(|p| p.to_string()).collect(),
            summary: String::new(),
            original_word_count: 0,
            translator: String::new(),
            start_page: None,
            end_page: None,
        }
    }

    #[test]
    fn test_escape_xml_and_control_chars() {
        assert_eq!(
            escape_xml("a < b & \"c\"\u{0007} 'd'\n"),
            "a &lt; b &amp; &quot;c&quot; &apos;d&apos;\n"
        );
    }

    #[test]
    fn test_html_renders_placeholders_as_figures() {
        let compiler = BookCompiler::new("Книга", "Автор");
        let html = compiler.render_html(&[chapter(0, "", &["[IMAGE_007]", "", "x < y"])]);
        assert!(html.contains("<h2>Глава 0</h2>"));
        assert!(html.contains("<figcaption>Рисунок IMAGE_007</figcaption>"));
        assert!(html.contains("<p>x &lt; y</p>"));
        assert!(html.contains("<p class=\"author\">Автор</p>"));
    }

    #[test]
    fn test_markdown_layout() {
        let compiler = BookCompiler::new("", "");
        let md = compiler.render_markdown(&[chapter(1, "Введение", &["Первый абзац.", "[IMAGE_1]"])]);
        assert!(md.starts_with(&format!("# {}\n\n", DEFAULT_BOOK_TITLE)));
        assert!(md.contains("## Введение\n\nПервый абзац.\n\n*[Рисунок: IMAGE_1]*\n\n"));
    }

    #[test]
    fn test_file_stem_is_sanitised() {
        assert_eq!(book_file_stem("CMMI: версия 1.3/ред"), "CMMI_ версия 1.3_ред");
    }

    #[tokio::test]
    async fn test_compile_writes_both_formats_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("translations");
        let output = dir.path().join("output");
        save_json(&input.join(translated_file_name(1)), &chapter(1, "Вторая", &["Б"]))
            .await
            .unwrap();
        save_json(&input.join(translated_file_name(0)), &chapter(0, "Первая", &["А"]))
            .await
            .unwrap();

        let book = BookCompiler::new("Тест", "").compile(&input, &output).await.unwrap();
        assert_eq!(book.chapters, 2);
        let md = tokio::fs::read_to_string(&book.markdown_path).await.unwrap();
        assert!(md.find("## Первая").unwrap() < md.find("## Вторая").unwrap());
        assert!(book.html_path.exists());
    }
}
