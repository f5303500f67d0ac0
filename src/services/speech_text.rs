//! 朗读文本准备与有声书分片

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::models::{is_image_placeholder, TranslatedChapter};
use crate::services::phonetic_service::PhoneticReplacer;

/// 每个音频片段默认包含的段落数
pub const DEFAULT_PARAGRAPHS_PER_GROUP: usize = 3;

static IMAGE_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[IMAGE_[^\]]+\]").expect("合法的正则"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("合法的正则"));
static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([.!?])\s+").expect("合法的正则"));

/// 去占位符、合并空白、替换读音、句末换行
pub fn prepare_text_for_speech(text: &str, phonetics: Option<&PhoneticReplacer>) -> String {
    let text = IMAGE_PLACEHOLDER.replace_all(text, "");
    let mut text = WHITESPACE.replace_all(&text, " ").into_owned();
    if let Some(replacer) = phonetics {
        text = replacer.replace_in_text(&text);
    }
    SENTENCE_END.replace_all(&text, "$1\n").trim().to_string()
}

/// 片段在章节中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SpeechPart {
    Intro,
    Group(usize),
}

/// 一个待合成的音频片段
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechTask {
    pub chapter: usize,
    pub part: SpeechPart,
    /// 已准备好的朗读文本
    pub text: String,
    pub file_name: String,
}

impl SpeechTask {
    pub fn new(chapter: usize, part: SpeechPart, text: String) -> Self {
        let file_name = match part {
            SpeechPart::Intro => format!("chapter_{:03}_intro.mp3", chapter),
            SpeechPart::Group(g) => format!("chapter_{:03}_group_{:03}.mp3", chapter, g),
        };
        Self {
            chapter,
            part,
            text,
            file_name,
        }
    }

    /// 合并顺序：章节、开场、段落组
    pub fn order_key(&self) -> (usize, SpeechPart) {
        (self.chapter, self.part)
    }

    pub fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(&self.file_name)
    }

    pub fn label(&self) -> String {
        match self.part {
            SpeechPart::Intro => format!("ch{}_intro", self.chapter),
            SpeechPart::Group(g) => format!("ch{}_g{}", self.chapter, g),
        }
    }
}

/// 每章一个开场片段，外加每 `paragraphs_per_group` 个文本段落一个片段
///
/// 准备后为空的片段不生成任务
pub fn build_speech_tasks(
    chapters: &[TranslatedChapter],
    paragraphs_per_group: usize,
    phonetics: Option<&PhoneticReplacer>,
) -> Vec<SpeechTask> {
    let per_group = paragraphs_per_group.max(1);
    let mut tasks = Vec::new();

    for chapter in chapters {
        let title = if chapter.title.trim().is_empty() {
            format!("Глава {}", chapter.number)
        } else {
            chapter.title.trim().to_string()
        };
        let intro = prepare_text_for_speech(
            &format!("Глава {}. {}.", chapter.number, title),
            phonetics,
        );
        if !intro.is_empty() {
            tasks.push(SpeechTask::new(chapter.number, SpeechPart::Intro, intro));
        }

        let text_paragraphs: Vec<&str> = chapter
            .paragraphs
            .iter()
            .filter(|p| !p.is_empty() && !is_image_placeholder(p))
            .map(String::as_str)
            .collect();

        for (group_idx, group) in text_paragraphs.chunks(per_group).enumerate() {
            let text = prepare_text_for_speech(&group.join("\n\n"), phonetics);
            if !text.is_empty() {
                tasks.push(SpeechTask::new(chapter.number, SpeechPart::Group(group_idx), text));
            }
        }
    }

    tasks.sort_by_key(SpeechTask::order_key);
    tasks
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn test_prepare_text() {
        let text = "Первое  предложение. [IMAGE_001] Второе?\n\nТретье!";
        assert_eq!(
            prepare_text_for_speech(text, None),
            "Первое предложение.\nВторое?\nТретье!"
        );
    }

    #[test]
    fn test_prepare_text_with_phonetics() {
        let replacer = PhoneticReplacer::builtin();
        assert_eq!(
            prepare_text_for_speech("Модель CMMI. Конец", Some(&replacer)),
            "Модель си-эм-эм-ай.\nКонец"
        );
    }

    #[test]
    fn test_tasks_group_text_paragraphs_only() {
        let chapters = vec![chapter(
            2,
            "Обзор",
            &["Один.", "[IMAGE_1]", "", "Два.", "Три.", "Четыре."],
        )];
        let tasks = build_speech_tasks(&chapters, 3, None);
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].file_name, "chapter_002_intro.mp3");
        assert_eq!(tasks[0].text, "Глава 2.\nОбзор.");
        assert_eq!(tasks[1].file_name, "chapter_002_group_000.mp3");
        assert_eq!(tasks[1].text, "Один.\nДва.\nТри.");
        assert_eq!(tasks[2].file_name, "chapter_002_group_001.mp3");
        assert_eq!(tasks[2].label(), "ch2_g1");
    }

    #[test]
    fn test_intro_sorts_before_groups() {
        let chapters = vec![chapter(1, "Б", &["Текст."]), chapter(0, "А", &["Текст."])];
        let tasks = build_speech_tasks(&chapters, 3, None);
        let order: Vec<(usize, SpeechPart)> = tasks.iter().map(SpeechTask::order_key).collect();
        assert_eq!(
            order,
            vec![
                (0, SpeechPart::Intro),
                (0, SpeechPart::Group(0)),
                (1, SpeechPart::Intro),
                (1, SpeechPart::Group(0)),
            ]
        );
    }
}
