//! 听书改写调度 - 编排层
//!
//! 对输入目录中的每个译文章节并发调用 `AudioAdapter`，
//! 结果写为 `<原文件名>_audio.json`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::clients::LlmBackend;
use crate::models::loaders::{list_files, load_json, save_json};
use crate::models::TranslatedChapter;
use crate::services::audio_adapter::{adapted_file_name, ADAPTATION_STYLE};
use crate::services::{AudioAdapter, BookContext};
use crate::utils::logging;

/// 改写参数
#[derive(Debug, Clone)]
pub struct AdaptOptions {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// 可选的书籍背景（book_context.json）
    pub context_file: Option<PathBuf>,
    pub workers: usize,
    pub group_size: usize,
}

/// 读取书籍背景，文件不存在或无法解析时返回 None
pub async fn load_book_context(path: Option<&Path>) -> Option<BookContext> {
    let path = path?;
    if !path.exists() {
        return None;
    }
    match load_json::<BookContext>(path).await {
        Ok(context) => Some(context),
        Err(e) => {
            warn!("书籍背景文件无法解析，忽略: {:#}", e);
            None
        }
    }
}

/// 改写目录中的全部译文章节，返回成功写出的文件
pub async fn run_adaptation(
    backend: Arc<dyn LlmBackend>,
    options: &AdaptOptions,
) -> Result<Vec<PathBuf>> {
    let files = list_files(&options.input_dir, |name| name.ends_with("_translated.json")).await?;
    if files.is_empty() {
        anyhow::bail!("{} 中没有译文章节", options.input_dir.display());
    }
    tokio::fs::create_dir_all(&options.output_dir)
        .await
        .with_context(|| format!("无法创建目录: {}", options.output_dir.display()))?;

    let mut adapter = AudioAdapter::new(backend, options.group_size);
    if let Some(context) = load_book_context(options.context_file.as_deref()).await {
        adapter = adapter.with_book_context(context);
    }
    let adapter = Arc::new(adapter);

    logging::log_startup("听书改写", options.workers);
    info!("📚 {} 章待改写", files.len());
    info!("⚙️ 每组 {} 段，风格 {}", options.group_size, ADAPTATION_STYLE);

    let semaphore = Arc::new(Semaphore::new(options.workers.max(1)));
    let mut handles = Vec::new();

    for file in files {
        let permit = semaphore.clone().acquire_owned().await?;
        let adapter = adapter.clone();
        let output_dir = options.output_dir.clone();

        let handle = tokio::spawn(async move {
            let _permit = permit;
            let chapter: TranslatedChapter = load_json(&file).await?;
            let adapted = adapter.adapt_chapter(&chapter).await;

            let stem = file
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let out = output_dir.join(adapted_file_name(&stem));
            save_json(&out, &adapted).await?;
            info!("  ✓ {} → {}", chapter.number, out.display());
            Ok::<PathBuf, anyhow::Error>(out)
        });
        handles.push(handle);
    }

    let mut written = Vec::new();
    for handle in handles {
        match handle.await {
            Ok(Ok(path)) => written.push(path),
            Ok(Err(e)) => error!("❌ 改写失败: {:#}", e),
            Err(e) => error!("❌ 任务执行失败: {}", e),
        }
    }
    written.sort();

    logging::log_section("✅ 改写完成");
    logging::log_stats_lines(&[
        ("📚 已改写", written.len().to_string()),
        ("📁 输出目录", options.output_dir.display().to_string()),
    ]);
    Ok(written)
}
