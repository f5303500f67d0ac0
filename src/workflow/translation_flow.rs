//! 段落组翻译流程 - 流程层
//!
//! 核心职责：定义"一个段落组"的完整处理流程
//!
//! 流程顺序：
//! 1. 无文本 → 原样返回
//! 2. 整组翻译，失败按固定间隔重试
//! 3. 重试耗尽 → 逐段兜底（兜底失败保留原文）

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::models::{BlockStatus, BlockTranslation, ParagraphGroup};
use crate::services::TranslationService;
use crate::workflow::block_ctx::BlockCtx;

/// 段落组翻译流程
///
/// - 决定何时重试、何时兜底
/// - 不持有调度资源（Semaphore）
/// - 只依赖业务能力（services）
pub struct TranslationFlow {
    service: Arc<TranslationService>,
    max_retries: usize,
    retry_delay: Duration,
}

impl TranslationFlow {
    pub fn new(service: Arc<TranslationService>, config: &Config) -> Self {
        Self {
            service,
            max_retries: config.max_retries.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    pub async fn run(&self, group: &ParagraphGroup, ctx: &BlockCtx) -> BlockTranslation {
        if !group.has_text() {
            debug!("{} 无文本，跳过", ctx);
            return BlockTranslation {
                paragraphs: group.paragraphs.clone(),
                status: BlockStatus::Skipped,
            };
        }

        let mut last_error = String::new();
        for retry_count in 0..self.max_retries {
            match self.service.translate_group(group, Some(ctx.context.as_ref())).await {
                Ok(paragraphs) => {
                    info!("{} ✓ 翻译完成 ({} 字符)", ctx, group.text.chars().count());
                    return BlockTranslation {
                        paragraphs,
                        status: BlockStatus::Translated,
                    };
                }
                Err(e) => {
                    last_error = format!("{:#}", e);
                    warn!(
                        "{} ⚠️ 翻译失败 (第 {}/{} 次): {}",
                        ctx,
                        retry_count + 1,
                        self.max_retries,
                        last_error
                    );
                    if retry_count + 1 < self.max_retries {
                        sleep(self.retry_delay).await;
                    }
                }
            }
        }

        warn!("{} ❌ 重试耗尽，逐段兜底翻译", ctx);
        BlockTranslation {
            paragraphs: self.service.fallback_group(group).await,
            status: BlockStatus::Fallback { error: last_error },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{LlmBackend, LlmRequest};
    use crate::services::context_service::ChapterContext;
    use crate::services::TranslationStats;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 前 `failures` 次调用失败，之后返回带前缀的原文
    struct FlakyBackend {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmBackend for FlakyBackend {
        async fn complete(&self, request: &LlmRequest) -> anyhow::Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                anyhow::bail!("temporary failure {}", n);
            }
            let text = request.user.lines().last().unwrap_or_default();
            Ok(format!("RU {}", text))
        }

        fn model_name(&self) -> &str {
            "flaky"
        }
    }

    fn flow(failures: usize) -> (TranslationFlow, Arc<FlakyBackend>) {
        let backend = Arc::new(FlakyBackend {
            failures,
            calls: AtomicUsize::new(0),
        });
        let mut config = Config::default();
        config.retry_delay_ms = 0;
        let service = TranslationService::new(
            backend.clone(),
            &config,
            Arc::new(TranslationStats::default()),
        );
        (TranslationFlow::new(Arc::new(service), &config), backend)
    }

    fn ctx() -> BlockCtx {
        BlockCtx::new(0, 0, 1, Arc::new(ChapterContext::default()))
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let (flow, backend) = flow(2);
        let group = ParagraphGroup::from_paragraphs(vec!["Hello world.".to_string()]);
        let result = flow.run(&group, &ctx()).await;
        assert_eq!(result.status, BlockStatus::Translated);
        assert_eq!(result.paragraphs, vec!["RU Hello world.".to_string()]);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fall_back_per_paragraph() {
        let (flow, _backend) = flow(3);
        let group = ParagraphGroup::from_paragraphs(vec![
            "[IMAGE_001]".to_string(),
            "Only paragraph.".to_string(),
        ]);
        let result = flow.run(&group, &ctx()).await;
        assert!(matches!(result.status, BlockStatus::Fallback { .. }));
        assert_eq!(
            result.paragraphs,
            vec!["[IMAGE_001]".to_string(), "RU Only paragraph.".to_string()]
        );
    }

    #[tokio::test]
    async fn test_group_without_text_is_skipped() {
        let (flow, backend) = flow(0);
        let group = ParagraphGroup::from_paragraphs(vec!["[IMAGE_001]".to_string()]);
        let result = flow.run(&group, &ctx()).await;
        assert_eq!(result.status, BlockStatus::Skipped);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }
}
