use serde::{Deserialize, Serialize};

use super::translation::TranslatedChapter;

/// 改写为听书风格的章节
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdaptedChapter {
    pub title: String,
    pub original_paragraphs: Vec<String>,
    pub adapted_paragraphs: Vec<String>,
    pub adaptation_metadata: AdaptationMetadata,
}

impl AdaptedChapter {
    /// 以改写后的文本作为朗读来源
    pub fn into_speech_chapter(self) -> TranslatedChapter {
        TranslatedChapter {
            number: self.adaptation_metadata.chapter_number,
            title: self.title,
            paragraphs: self.adapted_paragraphs,
            summary: String::new(),
            original_word_count: 0,
            translator: String::new(),
            start_page: None,
            end_page: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdaptationMetadata {
    pub style: String,
    pub depth: String,
    pub chapter_number: usize,
}

/// 有声书元数据（audiobook_metadata.json）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudiobookMetadata {
    pub voice: String,
    pub model: String,
    pub speed: f32,
    pub chapters_count: usize,
    pub fragments_count: usize,
    pub failed_fragments: usize,
    pub generation_date: String,
}
