//! PDF 文本读取 - 基础设施层
//!
//! 文本提取完全交给 `pdf-extract`，这里只负责把结果切成页

use std::path::Path;

use crate::error::{AppError, AppResult, FileError, PdfError};
use crate::infrastructure::text_reader::title_from_path;
use crate::models::BookInfo;

/// 按页切分后的 PDF 文本
#[derive(Debug, Clone)]
pub struct PdfText {
    pub pages: Vec<String>,
    /// 文档信息；`pdf-extract` 不读取信息字典，标题取自文件名
    pub info: BookInfo,
}

impl PdfText {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// PDF 读取器
pub struct PdfReader;

impl PdfReader {
    /// 读取 PDF 并按页返回文本
    ///
    /// 提取是 CPU 密集操作，放到阻塞线程池执行
    pub async fn read(path: &Path) -> AppResult<PdfText> {
        let path_str = path.display().to_string();
        if !path.is_file() {
            return Err(FileError::NotFound { path: path_str }.into());
        }
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AppError::file_read_failed(&path_str, e))?;

        let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| AppError::Other(format!("PDF 提取任务异常: {}", e)))?
            .map_err(|e| PdfError::ExtractionFailed {
                path: path_str.clone(),
                source: e.to_string().into(),
            })?;

        if text.trim().is_empty() {
            return Err(PdfError::EmptyDocument { path: path_str }.into());
        }

        let title = title_from_path(path);

        Ok(PdfText {
            pages: split_pages(&text),
            info: BookInfo {
                title,
                ..Default::default()
            },
        })
    }
}

/// 按换页符切分页面
///
/// `pdf-extract` 在页与页之间插入 `\x0C`；没有换页符时退化为按三个换行切分
pub fn split_pages(text: &str) -> Vec<String> {
    let raw: Vec<&str> = if text.contains('\x0C') {
        text.split('\x0C').collect()
    } else {
        text.split("\n\n\n").collect()
    };

    let mut pages: Vec<String> = raw.into_iter().map(str::to_string).collect();

    // 末尾换页符会产生一个空页
    while pages.len() > 1 && pages.last().map(|p| p.trim().is_empty()).unwrap_or(false) {
        pages.pop();
    }
    pages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_on_form_feed_drops_trailing_empty_page() {
        let pages = split_pages("page one\x0Cpage two\x0C\n");
        assert_eq!(pages, vec!["page one".to_string(), "page two".to_string()]);
    }

    #[test]
    fn test_split_without_form_feed_uses_triple_newline() {
        let pages = split_pages("a\n\nb\n\n\nc");
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0], "a\n\nb");
    }

    #[tokio::test]
    async fn test_missing_file_is_file_error() {
        let err = PdfReader::read(Path::new("/definitely/not/here.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::File(FileError::NotFound { .. })));
    }
}
