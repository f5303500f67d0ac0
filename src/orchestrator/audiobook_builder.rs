//! 有声书生成器 - 编排层
//!
//! ## 职责
//!
//! 把译文（或听书改写稿）切分为音频片段，限流并发合成，最后合并为一个 MP3。
//!
//! ## 核心功能
//!
//! 1. **加载章节**：译文目录，或改写目录（`*_audio.json`）
//! 2. **拆片段**：每章一个开场片段，外加每 N 段一个片段
//! 3. **续跑**：`temp_audio/` 中已存在且非空的片段直接复用
//! 4. **并发合成**：Semaphore 限流；失败片段以较少并发重试一轮
//! 5. **合并**：按章节、开场、段落组顺序合并为 `audiobook_complete.mp3`
//! 6. **元数据**：写出 `audiobook_metadata.json`，可选清理临时片段

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::clients::SpeechBackend;
use crate::infrastructure::{AudioMerger, MergeMethod};
use crate::models::loaders::{list_files, load_all_translated, load_json, save_json};
use crate::models::{AdaptedChapter, AudiobookMetadata, TranslatedChapter};
use crate::services::{build_speech_tasks, PhoneticReplacer, SpeechTask};
use crate::utils::logging;

pub const TEMP_AUDIO_DIR: &str = "temp_audio";
pub const AUDIOBOOK_FILE_NAME: &str = "audiobook_complete.mp3";
pub const AUDIOBOOK_METADATA_FILE_NAME: &str = "audiobook_metadata.json";

/// 朗读文本来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechSource {
    /// `chapter_NNN_translated.json` 目录
    Translations(PathBuf),
    /// `*_audio.json` 改写目录
    Adapted(PathBuf),
}

/// 按章节编号排序加载朗读用章节
pub async fn load_speech_chapters(source: &SpeechSource) -> Result<Vec<TranslatedChapter>> {
    let mut chapters: Vec<TranslatedChapter> = match source {
        SpeechSource::Translations(dir) => load_all_translated(dir)
            .await?
            .into_iter()
            .map(|(_, chapter)| chapter)
            .collect(),
        SpeechSource::Adapted(dir) => {
            let mut chapters = Vec::new();
            for path in list_files(dir, |name| name.ends_with("_audio.json")).await? {
                match load_json::<AdaptedChapter>(&path).await {
                    Ok(adapted) => chapters.push(adapted.into_speech_chapter()),
                    Err(e) => warn!("加载文件失败 {}: {:#}", path.display(), e),
                }
            }
            chapters
        }
    };
    chapters.sort_by_key(|c| c.number);
    Ok(chapters)
}

/// 失败片段重试时的并发数
pub fn retry_workers(workers: usize) -> usize {
    (workers / 2).clamp(1, 5)
}

/// 生成参数
#[derive(Debug, Clone)]
pub struct AudiobookOptions {
    pub source: SpeechSource,
    pub output_dir: PathBuf,
    pub workers: usize,
    pub paragraphs_per_group: usize,
    /// 合并后删除临时片段
    pub cleanup: bool,
}

/// 生成结果
#[derive(Debug, Clone)]
pub struct AudiobookResult {
    pub output: PathBuf,
    pub metadata: AudiobookMetadata,
    pub merge_method: MergeMethod,
}

/// 有声书生成器
pub struct AudiobookBuilder {
    backend: Arc<dyn SpeechBackend>,
    merger: AudioMerger,
    phonetics: Option<PhoneticReplacer>,
    options: AudiobookOptions,
}

impl AudiobookBuilder {
    pub fn new(backend: Arc<dyn SpeechBackend>, options: AudiobookOptions) -> Self {
        Self {
            backend,
            merger: AudioMerger::new(),
            phonetics: None,
            options,
        }
    }

    pub fn with_phonetics(mut self, phonetics: PhoneticReplacer) -> Self {
        self.phonetics = Some(phonetics);
        self
    }

    pub fn with_merger(mut self, merger: AudioMerger) -> Self {
        self.merger = merger;
        self
    }

    fn temp_dir(&self) -> PathBuf {
        self.options.output_dir.join(TEMP_AUDIO_DIR)
    }

    pub async fn build(&self) -> Result<AudiobookResult> {
        let chapters = load_speech_chapters(&self.options.source).await?;
        if chapters.is_empty() {
            anyhow::bail!("没有可朗读的章节");
        }

        let temp_dir = self.temp_dir();
        tokio::fs::create_dir_all(&temp_dir)
            .await
            .with_context(|| format!("无法创建目录: {}", temp_dir.display()))?;

        let tasks = build_speech_tasks(
            &chapters,
            self.options.paragraphs_per_group,
            self.phonetics.as_ref(),
        );

        logging::log_startup("有声书生成", self.options.workers);
        info!(
            "🎙️ 声音 {} / 模型 {} / 语速 {}",
            self.backend.voice(),
            self.backend.model(),
            self.backend.speed()
        );
        info!("📚 {} 章, {} 个片段", chapters.len(), tasks.len());

        let (mut ready, pending) = partition_existing(tasks, &temp_dir).await;
        if !ready.is_empty() {
            info!("♻️ 复用已有片段: {}", ready.len());
        }

        let (done, failed) = self
            .generate_round(pending, self.options.workers, &temp_dir)
            .await;
        ready.extend(done);

        let mut still_failed = Vec::new();
        if !failed.is_empty() {
            let workers = retry_workers(self.options.workers);
            warn!("⚠️ {} 个片段失败，以 {} 个并发重试", failed.len(), workers);
            let (done, failed) = self.generate_round(failed, workers, &temp_dir).await;
            ready.extend(done);
            still_failed = failed;
        }
        for task in &still_failed {
            error!("❌ 片段最终失败: {}", task.label());
        }
        if ready.is_empty() {
            anyhow::bail!("没有生成任何音频片段");
        }

        ready.sort_by_key(SpeechTask::order_key);
        let fragments: Vec<PathBuf> = ready.iter().map(|t| t.path_in(&temp_dir)).collect();

        let output = self.options.output_dir.join(AUDIOBOOK_FILE_NAME);
        info!("🎵 合并 {} 个片段...", fragments.len());
        let merge_method = self.merger.merge(&fragments, &output).await?;

        let metadata = AudiobookMetadata {
            voice: self.backend.voice().to_string(),
            model: self.backend.model().to_string(),
            speed: self.backend.speed(),
            chapters_count: chapters.len(),
            fragments_count: fragments.len(),
            failed_fragments: still_failed.len(),
            generation_date: chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
        };
        save_json(
            &self.options.output_dir.join(AUDIOBOOK_METADATA_FILE_NAME),
            &metadata,
        )
        .await?;

        let size_mb = tokio::fs::metadata(&output)
            .await
            .map(|m| m.len() as f64 / (1024.0 * 1024.0))
            .unwrap_or_default();
        logging::log_section("✅ 有声书已生成");
        logging::log_stats_lines(&[
            ("📀 文件", output.display().to_string()),
            ("📊 大小", format!("{:.1} MB", size_mb)),
            ("🧩 片段", fragments.len().to_string()),
            ("❌ 失败片段", still_failed.len().to_string()),
        ]);

        if self.options.cleanup {
            cleanup_fragments(&temp_dir).await?;
        }

        Ok(AudiobookResult {
            output,
            metadata,
            merge_method,
        })
    }

    /// 并发合成一轮，返回 (成功, 失败)
    async fn generate_round(
        &self,
        tasks: Vec<SpeechTask>,
        workers: usize,
        temp_dir: &Path,
    ) -> (Vec<SpeechTask>, Vec<SpeechTask>) {
        let semaphore = Arc::new(Semaphore::new(workers.max(1)));
        let total = tasks.len();
        let mut handles = Vec::with_capacity(total);

        for (idx, task) in tasks.into_iter().enumerate() {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!("无法获取并发许可: {}", e);
                    break;
                }
            };
            let backend = self.backend.clone();
            let path = task.path_in(temp_dir);

            let handle = tokio::spawn(async move {
                let _permit = permit;
                let result = synthesize_to_file(backend.as_ref(), &task.text, &path).await;
                match &result {
                    Ok(()) => info!("  ✓ [{}/{}] {}", idx + 1, total, task.label()),
                    Err(e) => warn!("  ✗ [{}/{}] {}: {:#}", idx + 1, total, task.label(), e),
                }
                (task, result.is_ok())
            });
            handles.push(handle);
        }

        let mut done = Vec::new();
        let mut failed = Vec::new();
        for handle in handles {
            match handle.await {
                Ok((task, true)) => done.push(task),
                Ok((task, false)) => failed.push(task),
                Err(e) => error!("任务执行失败: {}", e),
            }
        }
        (done, failed)
    }
}

/// 合成并写入片段，先写 `.part` 再重命名
async fn synthesize_to_file(backend: &dyn SpeechBackend, text: &str, path: &Path) -> Result<()> {
    let audio = backend.synthesize(text).await?;
    let part = path.with_extension("mp3.part");
    tokio::fs::write(&part, &audio)
        .await
        .with_context(|| format!("无法写入 {}", part.display()))?;
    tokio::fs::rename(&part, path)
        .await
        .with_context(|| format!("无法重命名 {}", path.display()))?;
    Ok(())
}

/// 分出已存在且非空的片段
async fn partition_existing(
    tasks: Vec<SpeechTask>,
    temp_dir: &Path,
) -> (Vec<SpeechTask>, Vec<SpeechTask>) {
    let mut ready = Vec::new();
    let mut pending = Vec::new();
    for task in tasks {
        let reusable = tokio::fs::metadata(task.path_in(temp_dir))
            .await
            .map(|m| m.len() > 0)
            .unwrap_or(false);
        if reusable {
            ready.push(task);
        } else {
            pending.push(task);
        }
    }
    (ready, pending)
}

/// 删除临时片段
pub async fn cleanup_fragments(temp_dir: &Path) -> Result<usize> {
    let files = list_files(temp_dir, |name| name.ends_with(".mp3")).await?;
    for file in &files {
        tokio::fs::remove_file(file)
            .await
            .with_context(|| format!("无法删除 {}", file.display()))?;
    }
    info!("🧹 已删除 {} 个临时片段", files.len());
    Ok(files.len())
}
