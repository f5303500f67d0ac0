pub mod llm_client;
pub mod tts_client;

pub use llm_client::{create_backend, LlmBackend, LlmRequest, OllamaBackend, OpenAiBackend};
pub use tts_client::{resolve_voice, SpeechBackend, TtsClient, KNOWN_VOICES};
