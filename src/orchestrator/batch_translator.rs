//! 批量翻译调度器 - 编排层
//!
//! ## 职责
//!
//! 本模块负责整本书的并行翻译：选章、拆任务、限流执行、按章收集并落盘。
//!
//! ## 核心功能
//!
//! 1. **选章**：显式章节号、`--all`，或默认的"尚未翻译"
//! 2. **拆任务**：每章创建上下文并分组，每个段落组一个任务（`BlockCtx`）
//! 3. **并发控制**：使用 Semaphore 限制同时在途的段落组数量
//! 4. **按章收集**：一章的所有段落组到齐后，按组顺序拼接、翻译标题、生成摘要、写文件
//! 5. **可中断**：收到 Ctrl-C 后不再派发新任务，在途任务跑完，未凑齐的章节不写入
//! 6. **全局统计**：结束时输出调用次数、字符数和估算费用
//!
//! ## 设计特点
//!
//! - **续跑依据**：译文文件存在即视为完成，中断后再次运行只处理剩余章节
//! - **向下委托**：单个段落组的重试与兜底交给 `workflow::TranslationFlow`

use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tracing::{error, info, warn};

use crate::clients::LlmBackend;
use crate::config::Config;
use crate::models::loaders::{load_extracted_chapter, load_metadata, save_json};
use crate::models::{
    chapter_file_name, translated_file_name, BlockStatus, BlockTranslation, BookMetadata,
    ChapterEntry, ExtractedChapter, ParagraphGroup, TranslatedChapter,
};
use crate::services::{
    group_paragraphs, ContextManager, ProgressTracker, TranslationService, TranslationStats,
};
use crate::utils::logging;
use crate::workflow::{BlockCtx, TranslationFlow};

/// 待翻译章节的选择方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChapterSelection {
    /// 尚未翻译的章节
    Pending,
    /// 全部章节（已完成的仍会跳过）
    All,
    /// 指定章节号
    Only(Vec<usize>),
}

impl ChapterSelection {
    pub fn from_args(chapters: Vec<usize>, all: bool) -> Self {
        if !chapters.is_empty() {
            ChapterSelection::Only(chapters)
        } else if all {
            ChapterSelection::All
        } else {
            ChapterSelection::Pending
        }
    }

    pub fn select<'a>(
        &self,
        metadata: &'a BookMetadata,
        tracker: &ProgressTracker,
    ) -> Vec<&'a ChapterEntry> {
        metadata
            .chapters
            .iter()
            .filter(|entry| match self {
                ChapterSelection::Pending => !tracker.is_chapter_translated(entry.number),
                ChapterSelection::All => true,
                ChapterSelection::Only(numbers) => numbers.contains(&entry.number),
            })
            .collect()
    }
}

/// 单个段落组任务
struct BlockTask {
    group: ParagraphGroup,
    ctx: BlockCtx,
}

/// 段落组完成消息
struct BlockDone {
    chapter: usize,
    block_index: usize,
    translation: BlockTranslation,
}

/// 一章的收集状态
struct ChapterAssembly {
    source: ExtractedChapter,
    total_blocks: usize,
    blocks: BTreeMap<usize, BlockTranslation>,
}

impl ChapterAssembly {
    fn is_complete(&self) -> bool {
        self.blocks.len() == self.total_blocks
    }

    /// 按段落组顺序拼接
    fn paragraphs(&self) -> Vec<String> {
        self.blocks
            .values()
            .flat_map(|block| block.paragraphs.iter().cloned())
            .collect()
    }

    fn fallback_blocks(&self) -> usize {
        self.blocks
            .values()
            .filter(|b| matches!(b.status, BlockStatus::Fallback { .. }))
            .count()
    }
}

/// 一次运行的结果
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    /// 本次写入的章节
    pub translated: Vec<usize>,
    /// 此前已完成而跳过的章节
    pub skipped: Vec<usize>,
    /// 源文件缺失的章节
    pub missing: Vec<usize>,
    /// 源文件无法解析的章节
    pub unreadable: Vec<usize>,
    /// 因中断而未写入的章节
    pub unfinished: Vec<usize>,
    pub interrupted: bool,
}

/// 批量翻译器
pub struct BatchTranslator {
    config: Config,
    service: Arc<TranslationService>,
    flow: Arc<TranslationFlow>,
    tracker: Arc<Mutex<ProgressTracker>>,
    contexts: ContextManager,
}

impl BatchTranslator {
    pub async fn new(config: Config, backend: Arc<dyn LlmBackend>) -> Self {
        let stats = Arc::new(TranslationStats::default());
        let service = Arc::new(TranslationService::new(backend, &config, stats));
        let flow = Arc::new(TranslationFlow::new(service.clone(), &config));
        let tracker = ProgressTracker::load(&config.progress_path(), &config.translations_path()).await;
        let contexts = ContextManager::new(config.translations_path(), config.context_path());

        Self {
            config,
            service,
            flow,
            tracker: Arc::new(Mutex::new(tracker)),
            contexts,
        }
    }

    pub fn stats(&self) -> &Arc<TranslationStats> {
        self.service.stats()
    }

    /// 运行翻译，Ctrl-C 时停止派发
    pub async fn run(&self, selection: &ChapterSelection) -> Result<BatchSummary> {
        self.run_until(selection, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("无法监听 Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// 运行翻译，`shutdown` 完成时停止派发新任务
    pub async fn run_until<F>(&self, selection: &ChapterSelection, shutdown: F) -> Result<BatchSummary>
    where
        F: Future<Output = ()>,
    {
        let metadata = load_metadata(&self.config.extracted_path())
            .await
            .context("请先运行 extract 拆分 PDF")?;

        let selected: Vec<ChapterEntry> = {
            let mut tracker = self.tracker.lock().await;
            tracker.set_total_chapters(metadata.chapters.len()).await?;
            selection.select(&metadata, &tracker).into_iter().cloned().collect()
        };

        let mut summary = BatchSummary::default();
        if selected.is_empty() {
            info!("✅ 所有章节都已翻译");
            return Ok(summary);
        }

        logging::log_startup("并行翻译", self.config.max_concurrent_blocks);
        info!(
            "🤖 模型: {} ({:?})",
            self.config.active_model_name(),
            self.config.llm_provider
        );
        info!("📚 选中 {} 章", selected.len());
        self.stats()
            .total_chapters
            .store(selected.len(), Ordering::Relaxed);

        let (tasks, mut assemblies) = self.prepare(&selected, &mut summary).await?;
        self.stats().total_blocks.store(tasks.len(), Ordering::Relaxed);
        info!("📦 共 {} 个段落组待翻译", tasks.len());

        let (tx, mut rx) = mpsc::unbounded_channel::<BlockDone>();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_blocks.max(1)));
        let flow = self.flow.clone();

        // 派发：逐个申请许可，收到停止信号即退出
        let launcher = async move {
            tokio::pin!(shutdown);
            for task in tasks {
                let permit = tokio::select! {
                    biased;
                    _ = &mut shutdown => {
                        warn!("⏸️ 收到停止信号，等待在途任务完成...");
                        return Ok(true);
                    }
                    permit = semaphore.clone().acquire_owned() => permit?,
                };
                let flow = flow.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    let translation = flow.run(&task.group, &task.ctx).await;
                    let _ = tx.send(BlockDone {
                        chapter: task.ctx.chapter,
                        block_index: task.ctx.block_index,
                        translation,
                    });
                });
            }
            Ok::<bool, anyhow::Error>(false)
        };

        // 收集：一章凑齐即落盘
        let collector = async {
            while let Some(done) = rx.recv().await {
                self.stats().completed_blocks.fetch_add(1, Ordering::Relaxed);
                let Some(assembly) = assemblies.get_mut(&done.chapter) else {
                    continue;
                };
                assembly.blocks.insert(done.block_index, done.translation);
                if assembly.is_complete() {
                    if let Some(assembly) = assemblies.remove(&done.chapter) {
                        match self.save_chapter(assembly).await {
                            Ok(()) => summary.translated.push(done.chapter),
                            Err(e) => error!("[章节 {}] ❌ 保存失败: {:#}", done.chapter, e),
                        }
                    }
                }
            }
        };

        let (launched, ()) = tokio::join!(launcher, collector);
        summary.interrupted = launched?;

        summary.unfinished = assemblies.into_keys().collect();
        summary.unfinished.sort_unstable();
        if !summary.unfinished.is_empty() {
            warn!("⚠️ 未完成的章节（下次运行继续）: {:?}", summary.unfinished);
        }

        self.stats().log_report(self.config.max_concurrent_blocks);
        info!("💡 使用 compile 命令汇编成书");
        Ok(summary)
    }

    /// 为选中的章节创建上下文和段落组任务
    async fn prepare(
        &self,
        selected: &[ChapterEntry],
        summary: &mut BatchSummary,
    ) -> Result<(Vec<BlockTask>, HashMap<usize, ChapterAssembly>)> {
        let extracted_dir = self.config.extracted_path();
        let mut tasks = Vec::new();
        let mut assemblies = HashMap::new();

        for entry in selected {
            let number = entry.number;
            if self.tracker.lock().await.is_chapter_translated(number) {
                info!("[章节 {}] 已翻译，跳过", number);
                self.stats().completed_chapters.fetch_add(1, Ordering::Relaxed);
                summary.skipped.push(number);
                continue;
            }
            if !extracted_dir.join(chapter_file_name(number)).exists() {
                warn!("[章节 {}] 源文件不存在，跳过", number);
                summary.missing.push(number);
                continue;
            }

            let source = match load_extracted_chapter(&extracted_dir, number).await {
                Ok(source) => source,
                Err(e) => {
                    error!("[章节 {}] ❌ 源文件无法读取，跳过: {:#}", number, e);
                    summary.unreadable.push(number);
                    continue;
                }
            };
            let context = Arc::new(self.contexts.create_context_for_chapter(number).await?);
            let groups = group_paragraphs(&source.paragraphs, self.config.max_chars_per_group);
            self.tracker
                .lock()
                .await
                .mark_chapter_start(number, source.paragraphs.len())
                .await?;

            let assembly = ChapterAssembly {
                source,
                total_blocks: groups.len(),
                blocks: BTreeMap::new(),
            };
            if groups.is_empty() {
                self.save_chapter(assembly).await?;
                summary.translated.push(number);
                continue;
            }

            let total_blocks = groups.len();
            for (block_index, group) in groups.into_iter().enumerate() {
                tasks.push(BlockTask {
                    group,
                    ctx: BlockCtx::new(number, block_index, total_blocks, context.clone()),
                });
            }
            assemblies.insert(number, assembly);
        }

        Ok((tasks, assemblies))
    }

    /// 拼接段落、翻译标题、生成摘要并写文件
    async fn save_chapter(&self, assembly: ChapterAssembly) -> Result<()> {
        let number = assembly.source.number;
        let paragraphs = assembly.paragraphs();
        let fallback = assembly.fallback_blocks();
        if fallback > 0 {
            warn!("[章节 {}] {} 个段落组使用了兜底翻译", number, fallback);
        }

        let chapter = TranslatedChapter {
            number,
            title: self.service.translate_title(&assembly.source.title).await,
            summary: self.service.generate_summary(&paragraphs).await,
            paragraphs,
            original_word_count: assembly.source.word_count,
            translator: self.service.model_name().to_string(),
            start_page: Some(assembly.source.start_page),
            end_page: Some(assembly.source.end_page),
        };

        save_json(&self.translated_path(number), &chapter).await?;
        self.tracker.lock().await.mark_chapter_complete(number).await?;
        self.stats().completed_chapters.fetch_add(1, Ordering::Relaxed);
        info!("✅ [章节 {}] 已翻译并保存: {}", number, chapter.title);
        Ok(())
    }

    fn translated_path(&self, number: usize) -> PathBuf {
        self.config.translations_path().join(translated_file_name(number))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::LlmRequest;
    use crate::models::loaders::load_translated_chapter;
    use async_trait::async_trait;

    /// 把每段文本前加 "RU:" 作为译文
    struct PrefixBackend;

    #[async_trait]
    impl LlmBackend for PrefixBackend {
        async fn complete(&self, request: &LlmRequest) -> Result<String> {
            match request.user.split_once("Текст для перевода:\n") {
                Some((_, text)) => Ok(text
                    .split("\n\n")
                    .map(|p| format!("RU:{}", p.trim()))
                    .collect::<Vec<_>>()
                    .join("\n\n")),
                None => Ok("Краткое резюме.".to_string()),
            }
        }

        fn model_name(&self) -> &str {
            "prefix"
        }
    }

    fn test_config(root: &std::path::Path) -> Config {
        let dir = |name: &str| root.join(name).to_string_lossy().into_owned();
        Config {
            extracted_dir: dir("extracted"),
            translations_dir: dir("translations"),
            progress_dir: dir("progress"),
            context_dir: dir("context"),
            max_concurrent_blocks: 2,
            max_chars_per_group: 40,
            retry_delay_ms: 1,
            ..Config::default()
        }
    }

    async fn write_source(config: &Config, numbers: &[usize]) {
        let extracted = config.extracted_path();
        let mut entries = Vec::new();
        for &number in numbers {
            let chapter = ExtractedChapter {
                number,
                title: format!("Chapter {}", number),
                start_page: number * 2,
                end_page: number * 2 + 1,
                paragraphs: vec![
                    "First paragraph of the chapter.".to_string(),
                    "[IMAGE_001]".to_string(),
                    "Second paragraph of the chapter.".to_string(),
                ],
                word_count: 10,
            };
            save_json(&extracted.join(chapter_file_name(number)), &chapter)
                .await
                .unwrap();
            entries.push(ChapterEntry {
                number,
                title: chapter.title.clone(),
                start_page: chapter.start_page,
                end_page: chapter.end_page,
                page_count: 2,
                status: "extracted".to_string(),
            });
        }
        let metadata = BookMetadata {
            total_pages: numbers.len() * 2,
            chapters: entries,
            extraction_complete: true,
            ..Default::default()
        };
        save_json(&extracted.join("metadata.json"), &metadata).await.unwrap();
    }

    #[test]
    fn test_selection_from_args() {
        assert_eq!(ChapterSelection::from_args(vec![], false), ChapterSelection::Pending);
        assert_eq!(ChapterSelection::from_args(vec![], true), ChapterSelection::All);
        assert_eq!(
            ChapterSelection::from_args(vec![3], true),
            ChapterSelection::Only(vec![3])
        );
    }

    #[tokio::test]
    async fn test_translates_chapters_and_keeps_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        write_source(&config, &[0, 1]).await;

        let translator = BatchTranslator::new(config.clone(), Arc::new(PrefixBackend)).await;
        let summary = translator
            .run_until(&ChapterSelection::Pending, std::future::pending())
            .await
            .unwrap();

        let mut translated = summary.translated.clone();
        translated.sort_unstable();
        assert_eq!(translated, vec![0, 1]);
        assert!(!summary.interrupted);

        let chapter = load_translated_chapter(&config.translations_path(), 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(chapter.paragraphs.len(), 3);
        assert_eq!(chapter.paragraphs[1], "[IMAGE_001]");
        assert!(chapter.paragraphs[0].starts_with("RU:"));
        assert_eq!(chapter.translator, "prefix");
        assert_eq!(chapter.start_page, Some(2));

        // 再次运行时全部跳过
        let again = BatchTranslator::new(config.clone(), Arc::new(PrefixBackend)).await;
        let summary = again
            .run_until(&ChapterSelection::All, std::future::pending())
            .await
            .unwrap();
        assert!(summary.translated.is_empty());
        assert_eq!(summary.skipped.len(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_before_dispatch_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        write_source(&config, &[0]).await;

        let translator = BatchTranslator::new(config.clone(), Arc::new(PrefixBackend)).await;
        let summary = translator
            .run_until(&ChapterSelection::Pending, async {})
            .await
            .unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.unfinished, vec![0]);
        assert!(!config.translations_path().join(translated_file_name(0)).exists());
    }

    #[tokio::test]
    async fn test_missing_source_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        write_source(&config, &[0, 1]).await;
        tokio::fs::remove_file(config.extracted_path().join(chapter_file_name(1)))
            .await
            .unwrap();

        let translator = BatchTranslator::new(config.clone(), Arc::new(PrefixBackend)).await;
        let summary = translator
            .run_until(&ChapterSelection::Only(vec![1]), std::future::pending())
            .await
            .unwrap();
        assert_eq!(summary.missing, vec![1]);
        assert!(summary.translated.is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_source_does_not_stop_batch() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        write_source(&config, &[0, 1]).await;
        tokio::fs::write(config.extracted_path().join(chapter_file_name(0)), "{ broken")
            .await
            .unwrap();

        let translator = BatchTranslator::new(config.clone(), Arc::new(PrefixBackend)).await;
        let summary = translator
            .run_until(&ChapterSelection::Pending, std::future::pending())
            .await
            .unwrap();

        assert_eq!(summary.unreadable, vec![0]);
        assert_eq!(summary.translated, vec![1]);
        assert!(summary.missing.is_empty());
        assert!(!config.translations_path().join(translated_file_name(0)).exists());
    }
}
