use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ConfigError;

/// LLM 服务提供方
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LlmProvider {
    /// 兼容 OpenAI API 的服务（DeepSeek、OpenAI 等）
    OpenAi,
    /// 本地 Ollama 服务
    Ollama,
}

impl FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "deepseek" => Ok(LlmProvider::OpenAi),
            "ollama" => Ok(LlmProvider::Ollama),
            other => Err(format!("未知的 LLM 提供方: {}", other)),
        }
    }
}

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    // --- 目录布局 ---
    /// 拆分后的章节 JSON 目录
    pub extracted_dir: String,
    /// 译文目录
    pub translations_dir: String,
    /// 黑名单过滤后的译文目录
    pub filtered_dir: String,
    /// 语音替换后的译文目录
    pub phonetic_dir: String,
    /// 听书改写后的目录
    pub adapted_dir: String,
    /// 翻译进度目录
    pub progress_dir: String,
    /// 章节上下文目录
    pub context_dir: String,
    /// 成书输出目录
    pub output_dir: String,
    /// 有声书输出目录
    pub audiobook_dir: String,
    /// 黑名单配置文件
    pub filter_config_file: String,
    /// 语音词典文件
    pub phonetics_file: String,
    /// 术语文件
    pub terms_file: String,
    /// 运行日志文件
    pub output_log_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,

    // --- LLM 配置 ---
    pub llm_provider: LlmProvider,
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    pub ollama_base_url: String,
    pub ollama_model_name: String,
    pub temperature: f32,
    pub max_tokens: u32,

    // --- 翻译流水线 ---
    /// 同时翻译的段落组数量
    pub max_concurrent_blocks: usize,
    /// 每个段落组的最大字符数
    pub max_chars_per_group: usize,
    /// 单个段落组的最大尝试次数
    pub max_retries: usize,
    /// 重试间隔（毫秒）
    pub retry_delay_ms: u64,

    // --- TTS 配置 ---
    pub tts_api_base_url: String,
    pub tts_api_key: String,
    pub tts_model_name: String,
    pub tts_voice: String,
    pub tts_speed: f32,
    /// 同时合成的音频片段数量
    pub max_concurrent_speech: usize,
    /// 每个音频片段包含的段落数
    pub paragraphs_per_audio_group: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            extracted_dir: "extracted".to_string(),
            translations_dir: "translations".to_string(),
            filtered_dir: "translations_filtered".to_string(),
            phonetic_dir: "translations_phonetic".to_string(),
            adapted_dir: "audio_adapted".to_string(),
            progress_dir: "progress".to_string(),
            context_dir: "context".to_string(),
            output_dir: "output".to_string(),
            audiobook_dir: "audiobook".to_string(),
            filter_config_file: "filter.toml".to_string(),
            phonetics_file: "phonetics.json".to_string(),
            terms_file: "extracted_terms.json".to_string(),
            output_log_file: "translation_log.txt".to_string(),
            verbose_logging: false,
            llm_provider: LlmProvider::OpenAi,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.deepseek.com/v1".to_string(),
            llm_model_name: "deepseek-chat".to_string(),
            ollama_base_url: "http://localhost:11434".to_string(),
            ollama_model_name: "llama3.1:8b".to_string(),
            temperature: 0.3,
            max_tokens: 3000,
            max_concurrent_blocks: 25,
            max_chars_per_group: 800,
            max_retries: 3,
            retry_delay_ms: 2000,
            tts_api_base_url: "https://api.openai.com/v1".to_string(),
            tts_api_key: String::new(),
            tts_model_name: "tts-1".to_string(),
            tts_voice: "onyx".to_string(),
            tts_speed: 1.0,
            max_concurrent_speech: 10,
            paragraphs_per_audio_group: 3,
        }
    }
}

impl Config {
    /// 从环境变量加载配置，无法解析的值取默认值
    pub fn from_env() -> Self {
        Self::from_env_checked().0
    }

    /// 从环境变量加载配置，同时返回被忽略的无效值
    pub fn from_env_checked() -> (Self, Vec<ConfigError>) {
        let default = Self::default();
        let mut env = EnvReader::default();
        let config = Self {
            extracted_dir: env.string("EXTRACTED_DIR", default.extracted_dir),
            translations_dir: env.string("TRANSLATIONS_DIR", default.translations_dir),
            filtered_dir: env.string("FILTERED_DIR", default.filtered_dir),
            phonetic_dir: env.string("PHONETIC_DIR", default.phonetic_dir),
            adapted_dir: env.string("ADAPTED_DIR", default.adapted_dir),
            progress_dir: env.string("PROGRESS_DIR", default.progress_dir),
            context_dir: env.string("CONTEXT_DIR", default.context_dir),
            output_dir: env.string("OUTPUT_DIR", default.output_dir),
            audiobook_dir: env.string("AUDIOBOOK_DIR", default.audiobook_dir),
            filter_config_file: env.string("FILTER_CONFIG_FILE", default.filter_config_file),
            phonetics_file: env.string("PHONETICS_FILE", default.phonetics_file),
            terms_file: env.string("TERMS_FILE", default.terms_file),
            output_log_file: env.string("OUTPUT_LOG_FILE", default.output_log_file),
            verbose_logging: env.parse("VERBOSE_LOGGING", default.verbose_logging),
            llm_provider: env.parse("LLM_PROVIDER", default.llm_provider),
            // DEEPSEEK_API_KEY 作为备选
            llm_api_key: std::env::var("LLM_API_KEY")
                .or_else(|_| std::env::var("DEEPSEEK_API_KEY"))
                .unwrap_or(default.llm_api_key),
            llm_api_base_url: env.string("LLM_API_BASE_URL", default.llm_api_base_url),
            llm_model_name: env.string("LLM_MODEL_NAME", default.llm_model_name),
            ollama_base_url: env.string("OLLAMA_BASE_URL", default.ollama_base_url),
            ollama_model_name: env.string("OLLAMA_MODEL", default.ollama_model_name),
            temperature: env.parse("TEMPERATURE", default.temperature),
            max_tokens: env.parse("MAX_TOKENS", default.max_tokens),
            max_concurrent_blocks: env.parse("MAX_CONCURRENT_BLOCKS", default.max_concurrent_blocks),
            max_chars_per_group: env.parse("MAX_CHARS_PER_GROUP", default.max_chars_per_group),
            max_retries: env.parse("MAX_RETRIES", default.max_retries),
            retry_delay_ms: env.parse("RETRY_DELAY_MS", default.retry_delay_ms),
            tts_api_base_url: env.string("TTS_API_BASE_URL", default.tts_api_base_url),
            tts_api_key: std::env::var("TTS_API_KEY")
                .or_else(|_| std::env::var("OPENAI_API_KEY"))
                .unwrap_or(default.tts_api_key),
            tts_model_name: env.string("TTS_MODEL_NAME", default.tts_model_name),
            tts_voice: env.string("TTS_VOICE", default.tts_voice),
            tts_speed: env.parse("TTS_SPEED", default.tts_speed),
            max_concurrent_speech: env.parse("MAX_CONCURRENT_SPEECH", default.max_concurrent_speech),
            paragraphs_per_audio_group: env.parse(
                "PARAGRAPHS_PER_AUDIO_GROUP",
                default.paragraphs_per_audio_group,
            ),
        };
        (config, env.invalid)
    }

    /// 检查当前 LLM 提供方需要的凭据
    ///
    /// Ollama 不需要 key
    pub fn check_llm_credentials(&self) -> Result<(), ConfigError> {
        if self.llm_provider == LlmProvider::OpenAi && self.llm_api_key.trim().is_empty() {
            return Err(ConfigError::Missing {
                var_name: "LLM_API_KEY".to_string(),
            });
        }
        Ok(())
    }

    /// 当前提供方实际使用的模型名称
    pub fn active_model_name(&self) -> &str {
        match self.llm_provider {
            LlmProvider::OpenAi => &self.llm_model_name,
            LlmProvider::Ollama => &self.ollama_model_name,
        }
    }

    pub fn extracted_path(&self) -> PathBuf {
        PathBuf::from(&self.extracted_dir)
    }

    pub fn translations_path(&self) -> PathBuf {
        PathBuf::from(&self.translations_dir)
    }

    pub fn filtered_path(&self) -> PathBuf {
        PathBuf::from(&self.filtered_dir)
    }

    pub fn phonetic_path(&self) -> PathBuf {
        PathBuf::from(&self.phonetic_dir)
    }

    pub fn adapted_path(&self) -> PathBuf {
        PathBuf::from(&self.adapted_dir)
    }

    pub fn audiobook_path(&self) -> PathBuf {
        PathBuf::from(&self.audiobook_dir)
    }

    pub fn progress_path(&self) -> PathBuf {
        PathBuf::from(&self.progress_dir)
    }

    pub fn context_path(&self) -> PathBuf {
        PathBuf::from(&self.context_dir)
    }

    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(&self.output_dir)
    }
}

/// 读取环境变量，记录无法解析的值
#[derive(Default)]
struct EnvReader {
    invalid: Vec<ConfigError>,
}

impl EnvReader {
    fn string(&self, name: &str, default: String) -> String {
        std::env::var(name).unwrap_or(default)
    }

    fn parse<T: FromStr>(&mut self, name: &str, default: T) -> T {
        let Ok(raw) = std::env::var(name) else {
            return default;
        };
        match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                self.invalid.push(ConfigError::Invalid {
                    var_name: name.to_string(),
                    value: raw,
                });
                default
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parse() {
        assert_eq!("OpenAI".parse::<LlmProvider>().unwrap(), LlmProvider::OpenAi);
        assert_eq!("deepseek".parse::<LlmProvider>().unwrap(), LlmProvider::OpenAi);
        assert_eq!(" ollama ".parse::<LlmProvider>().unwrap(), LlmProvider::Ollama);
        assert!("claude".parse::<LlmProvider>().is_err());
    }

    #[test]
    fn test_defaults_follow_pipeline_layout() {
        let config = Config::default();
        assert_eq!(config.max_chars_per_group, 800);
        assert_eq!(config.max_concurrent_blocks, 25);
        assert_eq!(config.paragraphs_per_audio_group, 3);
        assert_eq!(config.active_model_name(), "deepseek-chat");

        let config = Config {
            llm_provider: LlmProvider::Ollama,
            ..Config::default()
        };
        assert_eq!(config.active_model_name(), "llama3.1:8b");
    }

    #[test]
    fn test_env_parse_records_invalid_values() {
        let mut env = EnvReader::default();
        std::env::set_var("BOOK_TRANSLATOR_TEST_WORKERS", "not-a-number");
        assert_eq!(env.parse("BOOK_TRANSLATOR_TEST_WORKERS", 7usize), 7);
        std::env::set_var("BOOK_TRANSLATOR_TEST_WORKERS", "12");
        assert_eq!(env.parse("BOOK_TRANSLATOR_TEST_WORKERS", 7usize), 12);
        std::env::remove_var("BOOK_TRANSLATOR_TEST_WORKERS");
        assert_eq!(env.parse("BOOK_TRANSLATOR_TEST_WORKERS", 7usize), 7);

        assert_eq!(env.invalid.len(), 1);
        match &env.invalid[0] {
            ConfigError::Invalid { var_name, value } => {
                assert_eq!(var_name, "BOOK_TRANSLATOR_TEST_WORKERS");
                assert_eq!(value, "not-a-number");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_openai_provider_requires_key() {
        let mut config = Config::default();
        assert!(matches!(
            config.check_llm_credentials(),
            Err(ConfigError::Missing { ref var_name }) if var_name == "LLM_API_KEY"
        ));

        config.llm_api_key = "sk-test".to_string();
        assert!(config.check_llm_credentials().is_ok());

        config.llm_api_key.clear();
        config.llm_provider = LlmProvider::Ollama;
        assert!(config.check_llm_credentials().is_ok());
    }
}
