//! 段落分组
//!
//! 把章节段落按字符数装箱，每组一次请求

use crate::models::{is_image_placeholder, ParagraphGroup};

/// 默认每组最大字符数
pub const DEFAULT_MAX_CHARS: usize = 800;

/// 按字符上限分组
///
/// 图片占位符先暂存，在下一个文本段落之前并入当前组（没有后续文本时并入最后一组）；
/// 只有当前组非空且加入新段落会超限时才开新组，因此超长段落会单独成组
pub fn group_paragraphs(paragraphs: &[String], max_chars: usize) -> Vec<ParagraphGroup> {
    let mut groups = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_len = 0usize;
    let mut pending_images: Vec<String> = Vec::new();

    for paragraph in paragraphs {
        if is_image_placeholder(paragraph) {
            pending_images.push(paragraph.clone());
            continue;
        }

        current.append(&mut pending_images);

        let len = paragraph.chars().count();
        if current_len + len > max_chars && !current.is_empty() {
            groups.push(ParagraphGroup::from_paragraphs(std::mem::take(&mut current)));
            current_len = 0;
        }

        current.push(paragraph.clone());
        current_len += len;
    }

    current.append(&mut pending_images);
    if !current.is_empty() {
        groups.push(ParagraphGroup::from_paragraphs(current));
    }

    groups
}
