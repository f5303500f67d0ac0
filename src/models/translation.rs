use serde::{Deserialize, Serialize};

use super::chapter::is_image_placeholder;

/// 已翻译的章节（chapter_NNN_translated.json）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranslatedChapter {
    pub number: usize,
    pub title: String,
    pub paragraphs: Vec<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub original_word_count: usize,
    #[serde(default)]
    pub translator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_page: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_page: Option<usize>,
}

impl TranslatedChapter {
    /// 非占位符、非空的段落
    pub fn text_paragraphs(&self) -> impl Iterator<Item = &String> {
        self.paragraphs
            .iter()
            .filter(|p| !p.trim().is_empty() && !is_image_placeholder(p))
    }
}

/// 一次请求发送的段落组
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParagraphGroup {
    /// 需要翻译的文本（不含占位符，以空行连接）
    pub text: String,
    /// 组内全部段落（含占位符，保持原始顺序）
    pub paragraphs: Vec<String>,
    pub has_images: bool,
}

impl ParagraphGroup {
    pub fn from_paragraphs(paragraphs: Vec<String>) -> Self {
        let text = paragraphs
            .iter()
            .filter(|p| !is_image_placeholder(p))
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n\n");
        let has_images = paragraphs.iter().any(|p| is_image_placeholder(p));
        Self {
            text,
            paragraphs,
            has_images,
        }
    }

    /// 组内是否有需要翻译的文本
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// 段落组的翻译结果
#[derive(Debug, Clone, PartialEq)]
pub struct BlockTranslation {
    pub paragraphs: Vec<String>,
    pub status: BlockStatus,
}

/// 段落组处理状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockStatus {
    /// 正常翻译
    Translated,
    /// 无文本，原样保留
    Skipped,
    /// 所有重试失败，已逐段兜底
    Fallback { error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_text_excludes_placeholders() {
        let group = ParagraphGroup::from_paragraphs(vec![
            "First paragraph.".to_string(),
            "[IMAGE_001]".to_string(),
            "Second paragraph.".to_string(),
        ]);
        assert_eq!(group.text, "First paragraph.\n\nSecond paragraph.");
        assert!(group.has_images);
        assert!(group.has_text());
    }

    #[test]
    fn test_translated_chapter_defaults() {
        let json = r#"{"number": 2, "title": "Глава", "paragraphs": ["[IMAGE_1]", " ", "Текст"]}"#;
        let chapter: TranslatedChapter = serde_json::from_str(json).unwrap();
        assert_eq!(chapter.summary, "");
        assert_eq!(chapter.start_page, None);
        assert_eq!(chapter.text_paragraphs().count(), 1);
    }
}
