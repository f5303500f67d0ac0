//! 段落组处理上下文
//!
//! 封装"我正在处理哪一章的第几个段落组"这一信息

use std::fmt::Display;
use std::sync::Arc;

use crate::services::context_service::ChapterContext;

/// 段落组处理上下文
#[derive(Debug, Clone)]
pub struct BlockCtx {
    /// 章节编号
    pub chapter: usize,

    /// 段落组在章节中的索引（从0开始）
    pub block_index: usize,

    /// 章节段落组总数
    pub total_blocks: usize,

    /// 章节翻译上下文（同章所有段落组共享）
    pub context: Arc<ChapterContext>,
}

impl BlockCtx {
    pub fn new(
        chapter: usize,
        block_index: usize,
        total_blocks: usize,
        context: Arc<ChapterContext>,
    ) -> Self {
        Self {
            chapter,
            block_index,
            total_blocks,
            context,
        }
    }
}

impl Display for BlockCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[章节 #{} 段落组 {}/{}]",
            self.chapter,
            self.block_index + 1,
            self.total_blocks
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_one_based() {
        let ctx = BlockCtx::new(3, 0, 7, Arc::new(ChapterContext::default()));
        assert_eq!(ctx.to_string(), "[章节 #3 段落组 1/7]");
    }
}
