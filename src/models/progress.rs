use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 章节翻译状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChapterStatus {
    Pending,
    InProgress,
    Completed,
}

/// 单章进度
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChapterProgress {
    pub status: ChapterStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub paragraphs_total: usize,
    #[serde(default)]
    pub paragraphs_completed: usize,
}

/// 进度文件（progress/translation_progress.json）
///
/// 章节以字符串编号为键
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProgressFile {
    #[serde(default)]
    pub chapters: BTreeMap<String, ChapterProgress>,
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub total_chapters: usize,
    #[serde(default)]
    pub completed_chapters: usize,
    #[serde(default)]
    pub current_chapter: Option<usize>,
}
