//! 音频合并 - 基础设施层
//!
//! 优先调用外部 ffmpeg（concat demuxer，不重新编码），
//! ffmpeg 不可用时直接拼接 MP3 字节流

use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult, AudioError};

/// 合并方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMethod {
    Ffmpeg,
    ByteConcat,
}

/// 音频合并器
pub struct AudioMerger {
    ffmpeg_binary: String,
}

impl AudioMerger {
    pub fn new() -> Self {
        Self {
            ffmpeg_binary: "ffmpeg".to_string(),
        }
    }

    /// 使用指定的 ffmpeg 可执行文件
    pub fn with_ffmpeg(binary: impl Into<String>) -> Self {
        Self {
            ffmpeg_binary: binary.into(),
        }
    }

    /// 按给定顺序合并音频片段
    pub async fn merge(&self, fragments: &[PathBuf], output: &Path) -> AppResult<MergeMethod> {
        if fragments.is_empty() {
            return Err(AudioError::NoFragments.into());
        }

        match self.merge_with_ffmpeg(fragments, output).await {
            Ok(()) => Ok(MergeMethod::Ffmpeg),
            Err(e) => {
                warn!("⚠️ ffmpeg 合并失败: {}，改用字节拼接", e);
                concat_bytes(fragments, output).await?;
                Ok(MergeMethod::ByteConcat)
            }
        }
    }

    async fn merge_with_ffmpeg(&self, fragments: &[PathBuf], output: &Path) -> AppResult<()> {
        let list_file = output.with_extension("concat_list.txt");
        let mut list = String::new();
        for fragment in fragments {
            let absolute = std::path::absolute(fragment)?;
            // concat 列表中单引号需要转义
            let escaped = absolute.display().to_string().replace('\'', "'\\''");
            list.push_str(&format!("file '{}'\n", escaped));
        }
        fs::write(&list_file, list)
            .await
            .map_err(|e| AppError::file_write_failed(list_file.display().to_string(), e))?;

        debug!("调用 {} 合并 {} 个片段", self.ffmpeg_binary, fragments.len());
        let result = Command::new(&self.ffmpeg_binary)
            .args(["-y", "-loglevel", "error", "-f", "concat", "-safe", "0", "-i"])
            .arg(&list_file)
            .args(["-c", "copy"])
            .arg(output)
            .output()
            .await;

        let _ = fs::remove_file(&list_file).await;

        let result = result.map_err(|e| AudioError::FfmpegFailed(e.to_string()))?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
            return Err(AudioError::FfmpegFailed(stderr).into());
        }

        info!("✓ ffmpeg 合并完成: {}", output.display());
        Ok(())
    }
}

impl Default for AudioMerger {
    fn default() -> Self {
        Self::new()
    }
}

/// 直接拼接 MP3 字节流
///
/// 除第一个片段外，去掉每个片段开头的 ID3v2 标签
pub async fn concat_bytes(fragments: &[PathBuf], output: &Path) -> AppResult<()> {
    if fragments.is_empty() {
        return Err(AudioError::NoFragments.into());
    }

    let mut out = fs::File::create(output)
        .await
        .map_err(|e| AppError::file_write_failed(output.display().to_string(), e))?;

    for (idx, fragment) in fragments.iter().enumerate() {
        let bytes = fs::read(fragment)
            .await
            .map_err(|e| AppError::file_read_failed(fragment.display().to_string(), e))?;
        let body = if idx == 0 { &bytes[..] } else { strip_id3v2(&bytes) };
        out.write_all(body).await?;
    }
    out.flush().await?;
    Ok(())
}

/// 跳过开头的 ID3v2 标签
fn strip_id3v2(bytes: &[u8]) -> &[u8] {
    if bytes.len() < 10 || &bytes[..3] != b"ID3" {
        return bytes;
    }
    // 标签长度为 4 字节 syncsafe 整数
    let size = bytes[6..10]
        .iter()
        .fold(0usize, |acc, b| (acc << 7) | (*b as usize & 0x7f));
    let footer = if bytes[5] & 0x10 != 0 { 10 } else { 0 };
    let end = 10 + size + footer;
    if end > bytes.len() {
        bytes
    } else {
        &bytes[end..]
    }
}
