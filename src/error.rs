use thiserror::Error;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// PDF 读取错误
    #[error("PDF错误: {0}")]
    Pdf(#[from] PdfError),
    /// LLM 服务错误
    #[error("LLM错误: {0}")]
    Llm(#[from] LlmError),
    /// 语音合成错误
    #[error("TTS错误: {0}")]
    Tts(#[from] TtsError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// 音频合并错误
    #[error("音频错误: {0}")]
    Audio(#[from] AudioError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// JSON 序列化错误
    #[error("JSON解析失败: {0}")]
    Json(#[from] serde_json::Error),
    /// 其他错误
    #[error("错误: {0}")]
    Other(String),
}

/// PDF 相关错误
#[derive(Debug, Error)]
pub enum PdfError {
    /// 文本提取失败
    #[error("无法提取 PDF 文本 ({path}): {source}")]
    ExtractionFailed { path: String, source: BoxedSource },
    /// 文档没有可用文本
    #[error("PDF 中没有可提取的文本: {path}")]
    EmptyDocument { path: String },
}

/// LLM 服务错误
#[derive(Debug, Error)]
pub enum LlmError {
    /// API 调用失败
    #[error("LLM API调用失败 (模型: {model}): {source}")]
    ApiCallFailed { model: String, source: BoxedSource },
    /// 返回非成功状态码
    #[error("LLM 返回错误状态 (模型: {model}): HTTP {status}")]
    BadStatus { model: String, status: u16 },
    /// 返回内容为空
    #[error("LLM返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
    /// 请求构建失败
    #[error("LLM 请求构建失败: {0}")]
    RequestBuild(String),
}

/// 语音合成错误
#[derive(Debug, Error)]
pub enum TtsError {
    /// 请求失败
    #[error("TTS 请求失败 ({endpoint}): {source}")]
    RequestFailed { endpoint: String, source: BoxedSource },
    /// 返回非成功状态码
    #[error("TTS 返回错误状态 ({endpoint}): HTTP {status} {message}")]
    BadStatus {
        endpoint: String,
        status: u16,
        message: String,
    },
    /// 返回的音频为空
    #[error("TTS 返回空音频: {endpoint}")]
    EmptyAudio { endpoint: String },
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 文件不存在
    #[error("文件不存在: {path}")]
    NotFound { path: String },
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed { path: String, source: BoxedSource },
    /// 写入文件失败
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed { path: String, source: BoxedSource },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed { path: String, source: BoxedSource },
    /// 目录不存在
    #[error("目录不存在: {path}")]
    DirectoryNotFound { path: String },
}

/// 音频合并错误
#[derive(Debug, Error)]
pub enum AudioError {
    /// 没有可合并的片段
    #[error("没有可合并的音频片段")]
    NoFragments,
    /// ffmpeg 执行失败
    #[error("ffmpeg 执行失败: {0}")]
    FfmpegFailed(String),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 缺少必需的配置项
    #[error("缺少配置项 {var_name}")]
    Missing { var_name: String },
    /// 配置值无效
    #[error("配置项 {var_name} 的值 '{value}' 无效")]
    Invalid { var_name: String, value: String },
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: String::new(),
            source: Box::new(err),
        })
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::File(FileError::TomlParseFailed {
            path: String::new(),
            source: Box::new(err),
        })
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建文件读取错误
    pub fn file_read_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 创建文件写入错误
    pub fn file_write_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::File(FileError::WriteFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 创建LLM API调用错误
    pub fn llm_api_failed(
        model: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Llm(LlmError::ApiCallFailed {
            model: model.into(),
            source: Box::new(source),
        })
    }

    /// 创建 TTS 请求错误
    pub fn tts_request_failed(
        endpoint: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Tts(TtsError::RequestFailed {
            endpoint: endpoint.into(),
            source: Box::new(source),
        })
    }
}

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context() {
        let err: AppError = LlmError::EmptyContent {
            model: "deepseek-chat".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "LLM错误: LLM返回内容为空 (模型: deepseek-chat)");

        let err = AppError::file_read_failed(
            "extracted/chapter_001.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("extracted/chapter_001.json"));
    }

    #[test]
    fn test_source_chain_is_preserved() {
        use std::error::Error as _;
        let err = AppError::tts_request_failed(
            "http://localhost/audio/speech",
            std::io::Error::new(std::io::ErrorKind::TimedOut, "timeout"),
        );
        let inner = err.source().expect("TtsError 应该作为 source");
        assert!(inner.source().is_some());
    }
}
