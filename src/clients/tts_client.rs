//! 语音合成客户端
//!
//! 调用兼容 OpenAI 的 `/audio/speech` 接口，返回 MP3 字节

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::config::Config;
use crate::error::{AppError, AppResult, TtsError};

/// `/audio/speech` 接口的内置声音（id, 描述）
///
/// 这些声音不区分语言，俄语由输入文本决定
pub const KNOWN_VOICES: &[(&str, &str)] = &[
    ("onyx", "低沉男声（默认，对应 male）"),
    ("echo", "男声"),
    ("fable", "叙事男声"),
    ("alloy", "中性声音"),
    ("nova", "女声（对应 female）"),
    ("shimmer", "柔和女声"),
];

/// 把 male / female 别名解析为具体声音
pub fn resolve_voice(voice: &str) -> String {
    match voice.trim().to_ascii_lowercase().as_str() {
        "male" => "onyx".to_string(),
        "female" => "nova".to_string(),
        other => other.to_string(),
    }
}

/// 语音合成后端
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    async fn synthesize(&self, text: &str) -> AppResult<Vec<u8>>;

    fn voice(&self) -> &str;

    fn model(&self) -> &str;

    fn speed(&self) -> f32;
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    speed: f32,
    response_format: &'a str,
}

/// TTS 客户端
#[derive(Clone)]
pub struct TtsClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    voice: String,
    speed: f32,
}

impl TtsClient {
    pub fn new(config: &Config) -> AppResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if !config.tts_api_key.is_empty() {
            let value = HeaderValue::from_str(&format!("Bearer {}", config.tts_api_key))
                .map_err(|_| AppError::Other("TTS API key 含有非法字符".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let endpoint = format!(
            "{}/audio/speech",
            config.tts_api_base_url.trim_end_matches('/')
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| AppError::tts_request_failed(&endpoint, e))?;

        Ok(Self {
            http,
            endpoint,
            model: config.tts_model_name.clone(),
            voice: resolve_voice(&config.tts_voice),
            // 接口接受 0.25 ~ 4.0
            speed: config.tts_speed.clamp(0.25, 4.0),
        })
    }

    pub fn voice(&self) -> &str {
        &self.voice
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// 合成一段文本
    pub async fn synthesize(&self, text: &str) -> AppResult<Vec<u8>> {
        let body = SpeechRequest {
            model: &self.model,
            voice: &self.voice,
            input: text,
            speed: self.speed,
            response_format: "mp3",
        };

        debug!("TTS 请求: {} 字符, 声音 {}", text.chars().count(), self.voice);
        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::tts_request_failed(&self.endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TtsError::BadStatus {
                endpoint: self.endpoint.clone(),
                status: status.as_u16(),
                message: crate::utils::truncate_text(message.trim(), 200),
            }
            .into());
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::tts_request_failed(&self.endpoint, e))?;
        if bytes.is_empty() {
            return Err(TtsError::EmptyAudio {
                endpoint: self.endpoint.clone(),
            }
            .into());
        }
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl SpeechBackend for TtsClient {
    async fn synthesize(&self, text: &str) -> AppResult<Vec<u8>> {
        TtsClient::synthesize(self, text).await
    }

    fn voice(&self) -> &str {
        TtsClient::voice(self)
    }

    fn model(&self) -> &str {
        TtsClient::model(self)
    }

    fn speed(&self) -> f32 {
        TtsClient::speed(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_aliases() {
        assert_eq!(resolve_voice("male"), "onyx");
        assert_eq!(resolve_voice("Female"), "nova");
        assert_eq!(resolve_voice("shimmer"), "shimmer");
    }

    #[test]
    fn test_aliases_resolve_to_listed_voices() {
        for alias in ["male", "female"] {
            let voice = resolve_voice(alias);
            assert!(KNOWN_VOICES.iter().any(|(id, _)| *id == voice), "{} 不在列表中", voice);
        }
    }

    #[test]
    fn test_client_builds_endpoint_and_clamps_speed() {
        let mut config = Config::default();
        config.tts_api_base_url = "http://localhost:8880/v1/".to_string();
        config.tts_speed = 10.0;
        config.tts_voice = "female".to_string();
        let client = TtsClient::new(&config).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:8880/v1/audio/speech");
        assert_eq!(client.speed(), 4.0);
        assert_eq!(client.voice(), "nova");
    }

    #[test]
    fn test_request_body_shape() {
        let body = SpeechRequest {
            model: "tts-1",
            voice: "onyx",
            input: "Глава 1.",
            speed: 1.0,
            response_format: "mp3",
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["input"], "Глава 1.");
        assert_eq!(value["response_format"], "mp3");
    }

    #[tokio::test]
    #[ignore = "需要可用的 TTS 服务和 API key"]
    async fn test_synthesize_real_service() {
        let client = TtsClient::new(&Config::from_env()).unwrap();
        let audio = client.synthesize("Проверка связи.").await.unwrap();
        assert!(!audio.is_empty());
    }
}
