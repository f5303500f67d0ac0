//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责各个处理阶段的批量调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `extract_pipeline` - 书籍拆分
//! - 读取 PDF / TXT / Markdown，识别章节，写出 `chapter_NNN.json` 和 `metadata.json`
//!
//! ### `book_context_runner` - 书籍背景
//! - 取样前几章，生成听书改写用的 `book_context.json`
//!
//! ### `batch_translator` - 并行翻译
//! - 选章、创建章节上下文、拆分段落组
//! - 控制并发数量（Semaphore）
//! - 按章收集结果，凑齐即落盘；支持 Ctrl-C 中断续跑
//! - 输出全局统计信息
//!
//! ### `text_stages` - 文本后处理
//! - 黑名单过滤、术语提取、读音词典、读音替换、汇编成书
//!
//! ### `adaptation_runner` - 听书改写
//! - 按章并发调用 LLM 改写
//!
//! ### `audiobook_builder` - 有声书
//! - 片段拆分、并发合成、失败重试、合并与元数据
//!
//! ### `status_report` - 进度报告
//!
//! ## 层次关系
//!
//! ```text
//! batch_translator (处理 Vec<Chapter>)
//!     ↓
//! workflow::TranslationFlow (处理单个段落组)
//!     ↓
//! services (能力层：translation / context / progress)
//!     ↓
//! clients / infrastructure (LLM、TTS、PDF/文本读取、ffmpeg)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：每个模块对应一个处理阶段
//! 2. **资源隔离**：只有编排层持有 Semaphore 和后台任务
//! 3. **向下依赖**：编排层 → workflow → services → clients / infrastructure
//! 4. **无业务逻辑**：只做调度和统计，不做具体文本处理

pub mod adaptation_runner;
pub mod audiobook_builder;
pub mod batch_translator;
pub mod book_context_runner;
pub mod extract_pipeline;
pub mod status_report;
pub mod text_stages;

// 重新导出主要类型
pub use adaptation_runner::{run_adaptation, AdaptOptions};
pub use audiobook_builder::{AudiobookBuilder, AudiobookOptions, AudiobookResult, SpeechSource};
pub use batch_translator::{BatchSummary, BatchTranslator, ChapterSelection};
pub use book_context_runner::run_book_context;
pub use extract_pipeline::run_extract;
pub use status_report::{collect_status, StatusReport};
