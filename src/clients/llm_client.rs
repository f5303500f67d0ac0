//! LLM 客户端
//!
//! 封装所有与 LLM API 相关的调用逻辑，对上层只暴露 `LlmBackend`
//!
//! ## 技术栈
//! - `async-openai`：兼容 OpenAI API 的服务（DeepSeek、OpenAI 等）
//! - `reqwest`：本地 Ollama 的 `/api/generate` 接口

use anyhow::Result;
use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{Config, LlmProvider};
use crate::error::{AppError, LlmError};

/// Ollama 单次生成的超时时间
const OLLAMA_TIMEOUT: Duration = Duration::from_secs(600);

/// 一次补全请求
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub system: Option<String>,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl LlmRequest {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            system: None,
            user: user.into(),
            temperature: 0.3,
            max_tokens: 2000,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// LLM 后端
///
/// 返回去掉首尾空白的文本；空内容视为错误
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(&self, request: &LlmRequest) -> Result<String>;

    fn model_name(&self) -> &str;
}

/// 根据配置创建后端
pub fn create_backend(config: &Config) -> Result<Arc<dyn LlmBackend>> {
    let backend: Arc<dyn LlmBackend> = match config.llm_provider {
        LlmProvider::OpenAi => {
            config.check_llm_credentials()?;
            Arc::new(OpenAiBackend::new(config))
        }
        LlmProvider::Ollama => Arc::new(OllamaBackend::new(config)?),
    };
    debug!("使用 LLM 后端: {}", backend.model_name());
    Ok(backend)
}

/// 兼容 OpenAI API 的后端
pub struct OpenAiBackend {
    client: Client<OpenAIConfig>,
    model_name: String,
}

impl OpenAiBackend {
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
        }
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn complete(&self, request: &LlmRequest) -> Result<String> {
        debug!(
            "调用 LLM API，模型: {}，用户消息 {} 字符",
            self.model_name,
            request.user.chars().count()
        );

        let mut messages = Vec::new();

        if let Some(system) = &request.system {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(system.as_str())
                .build()
                .map_err(|e| LlmError::RequestBuild(e.to_string()))?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(request.user.as_str())
            .build()
            .map_err(|e| LlmError::RequestBuild(e.to_string()))?;
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(request.temperature)
            .max_tokens(request.max_tokens)
            .build()
            .map_err(|e| LlmError::RequestBuild(e.to_string()))?;

        let response = self.client.chat().create(chat_request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            AppError::from(LlmError::ApiCallFailed {
                model: self.model_name.clone(),
                source: e.to_string().into(),
            })
        })?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default();

        non_empty(content, &self.model_name)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// 本地 Ollama 后端
///
/// `/api/generate` 没有独立的系统消息，系统提示拼在 prompt 前面
pub struct OllamaBackend {
    http: reqwest::Client,
    base_url: String,
    model_name: String,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: String,
}

impl OllamaBackend {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(OLLAMA_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: config.ollama_base_url.trim_end_matches('/').to_string(),
            model_name: config.ollama_model_name.clone(),
        })
    }

    fn build_prompt(request: &LlmRequest) -> String {
        match &request.system {
            Some(system) => format!("{}\n\n{}", system, request.user),
            None => request.user.clone(),
        }
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    async fn complete(&self, request: &LlmRequest) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let body = json!({
            "model": self.model_name,
            "prompt": Self::build_prompt(request),
            "stream": false,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
                "top_p": 0.9,
                "top_k": 40,
                "repeat_penalty": 1.1
            }
        });

        debug!("调用 Ollama: {} ({})", url, self.model_name);
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::llm_api_failed(&self.model_name, e))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Ollama 返回错误状态: {}", status);
            return Err(LlmError::BadStatus {
                model: self.model_name.clone(),
                status: status.as_u16(),
            }
            .into());
        }

        let parsed: OllamaResponse = response
            .json()
            .await
            .map_err(|e| AppError::llm_api_failed(&self.model_name, e))?;

        non_empty(parsed.response, &self.model_name)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

fn non_empty(content: String, model: &str) -> Result<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(LlmError::EmptyContent {
            model: model.to_string(),
        }
        .into());
    }
    Ok(trimmed.to_string())
}
