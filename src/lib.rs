//! # Book Translator
//!
//! 把英文技术书籍（PDF / TXT / Markdown）翻译为俄语，并进一步生成可收听的有声书
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure / Clients）
//! - `infrastructure/` - 持有外部资源（书籍文件、ffmpeg 进程），只暴露能力
//! - `clients/` - LLM（async-openai / Ollama）与 TTS（reqwest）客户端
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个章节或段落组
//! - `TranslationService` - 段落组翻译、标题翻译、摘要
//! - `ContextManager` / `ProgressTracker` - 章节上下文与进度
//! - `BlacklistFilter` / `TermExtractor` / `PhoneticReplacer` - 文本后处理
//! - `AudioAdapter` / `BookCompiler` - 听书改写与成书
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个段落组"的完整处理流程
//! - `BlockCtx` - 上下文封装（章节号 + 段落组索引）
//! - `TranslationFlow` - 流程编排（翻译 → 重试 → 逐段兜底）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_translator` - 并行翻译，管理并发与中断
//! - `orchestrator/audiobook_builder` - 有声书片段合成与合并
//! - 其余阶段：拆分、过滤、术语、读音、改写、成书、进度
//!
//! ## 模块结构

pub mod app;
pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use app::{App, Cli, Command};
pub use clients::{LlmBackend, LlmRequest, SpeechBackend};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{ExtractedChapter, TranslatedChapter};
pub use orchestrator::{BatchTranslator, ChapterSelection};
pub use workflow::{BlockCtx, TranslationFlow};
