//! 书籍文件读取 - 基础设施层
//!
//! 判断输入格式，读取 TXT / Markdown 全文

use std::path::Path;
use tracing::warn;

use crate::error::{AppError, AppResult, FileError};
use crate::models::BookInfo;

/// 输入书籍格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookFormat {
    Pdf,
    Text,
    Markdown,
}

impl BookFormat {
    /// 按扩展名判断；未知扩展名时看文件头是否为 `%PDF`
    pub async fn detect(path: &Path) -> AppResult<Self> {
        let path_str = path.display().to_string();
        if !path.is_file() {
            return Err(FileError::NotFound { path: path_str }.into());
        }

        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => Ok(BookFormat::Pdf),
            "txt" | "text" => Ok(BookFormat::Text),
            "md" | "markdown" => Ok(BookFormat::Markdown),
            _ => {
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|e| AppError::file_read_failed(&path_str, e))?;
                if bytes.starts_with(b"%PDF") {
                    Ok(BookFormat::Pdf)
                } else {
                    Ok(BookFormat::Text)
                }
            }
        }
    }

    /// 写入 metadata.json 的格式名
    pub fn as_str(&self) -> &'static str {
        match self {
            BookFormat::Pdf => "pdf",
            BookFormat::Text => "txt",
            BookFormat::Markdown => "markdown",
        }
    }
}

/// 文本书籍全文
#[derive(Debug, Clone)]
pub struct BookText {
    pub text: String,
    pub info: BookInfo,
}

/// 由文件名得到书名
pub fn title_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().replace(['_', '-'], " "))
        .unwrap_or_default()
}

/// 文本书籍读取器
pub struct TextReader;

impl TextReader {
    /// 读取全文，统一换行符
    ///
    /// 非 UTF-8 内容按有损方式解码
    pub async fn read(path: &Path) -> AppResult<BookText> {
        let path_str = path.display().to_string();
        if !path.is_file() {
            return Err(FileError::NotFound { path: path_str }.into());
        }
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AppError::file_read_failed(&path_str, e))?;

        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => {
                warn!("⚠️ {} 不是 UTF-8 编码，无法识别的字符已替换", path_str);
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        };

        Ok(BookText {
            text: text.replace("\r\n", "\n"),
            info: BookInfo {
                title: title_from_path(path),
                ..Default::default()
            },
        })
    }
}
