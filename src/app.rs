//! 命令行入口
//!
//! 每个子命令对应一个处理阶段，命令行参数覆盖环境变量配置

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::clients::{create_backend, resolve_voice, TtsClient, KNOWN_VOICES};
use crate::config::Config;
use crate::orchestrator::audiobook_builder::SpeechSource;
use crate::orchestrator::text_stages;
use crate::orchestrator::{
    collect_status, run_adaptation, run_book_context, run_extract, AdaptOptions,
    AudiobookBuilder, AudiobookOptions, BatchTranslator, ChapterSelection,
};
use crate::services::audio_adapter::DEFAULT_GROUP_SIZE;
use crate::services::PhoneticReplacer;
use crate::utils::logging;

#[derive(Parser, Debug)]
#[command(name = "book-translator", version, about = "PDF / TXT / Markdown 书籍翻译为俄语并生成有声书")]
pub struct Cli {
    /// 显示 debug 级别日志
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 把 PDF / TXT / Markdown 书籍拆分为章节 JSON
    Extract {
        /// 书籍文件，格式由扩展名决定
        input: PathBuf,
    },
    /// 从拆分后的章节生成书籍背景（听书改写使用）
    Context {
        #[arg(short, long, default_value = "book_context.json")]
        output: PathBuf,
    },
    /// 并行翻译章节
    Translate {
        /// 只翻译指定章节
        chapters: Vec<usize>,
        /// 翻译全部章节（已完成的仍会跳过）
        #[arg(short, long)]
        all: bool,
        /// 并发段落组数
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// 按黑名单过滤译文
    Filter,
    /// 提取英文术语
    Terms {
        /// 最少出现的文件数
        #[arg(long, default_value_t = 2)]
        min_frequency: usize,
    },
    /// 读音替换；加 --generate 时用 LLM 生成读音词典
    Phonetics {
        #[arg(long)]
        generate: bool,
        /// 生成读音时的并发请求数
        #[arg(short, long, default_value_t = 5)]
        workers: usize,
        /// 以过滤后的译文为输入
        #[arg(long)]
        use_filtered: bool,
    },
    /// 把译文改写为适合收听的文本
    Adapt(AdaptArgs),
    /// 汇编 Markdown 和 HTML 成书
    Compile {
        #[arg(long)]
        use_filtered: bool,
    },
    /// 生成有声书
    Audiobook(AudiobookArgs),
    /// 列出可用的声音
    Voices,
    /// 查看翻译进度
    Status,
}

#[derive(Args, Debug)]
pub struct AdaptArgs {
    /// 输入目录（默认为译文目录）
    #[arg(long)]
    pub input_dir: Option<PathBuf>,
    /// 输出目录（默认为改写目录）
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
    /// 书籍背景文件
    #[arg(long, default_value = "book_context.json")]
    pub context: PathBuf,
    #[arg(short, long, default_value_t = 5)]
    pub workers: usize,
    /// 每次改写的段落数
    #[arg(long, default_value_t = DEFAULT_GROUP_SIZE)]
    pub group_size: usize,
}

#[derive(Args, Debug)]
pub struct AudiobookArgs {
    /// 声音（male / female 或具体名称）
    #[arg(long)]
    pub voice: Option<String>,
    #[arg(long)]
    pub speed: Option<f32>,
    #[arg(short, long)]
    pub workers: Option<usize>,
    #[arg(long)]
    pub paragraphs_per_group: Option<usize>,
    /// 不做读音替换
    #[arg(long)]
    pub disable_phonetic: bool,
    /// 朗读改写稿而不是译文
    #[arg(long)]
    pub adapted: bool,
    /// 合并后删除临时片段
    #[arg(long)]
    pub cleanup: bool,
}

/// 应用主结构
pub struct App {
    config: Config,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// 运行子命令
    pub async fn run(mut self, command: Command) -> Result<()> {
        match command {
            Command::Extract { input } => {
                run_extract(&self.config, &input).await?;
            }
            Command::Context { output } => {
                let backend = create_backend(&self.config)?;
                run_book_context(&self.config, backend, &output).await?;
            }
            Command::Translate {
                chapters,
                all,
                workers,
            } => {
                if let Some(workers) = workers {
                    self.config.max_concurrent_blocks = workers;
                }
                logging::init_log_file(&self.config.output_log_file, "翻译日志")?;
                let backend = create_backend(&self.config)?;
                let translator = BatchTranslator::new(self.config.clone(), backend).await;
                let summary = translator
                    .run(&ChapterSelection::from_args(chapters, all))
                    .await?;
                logging::append_log_line(
                    &self.config.output_log_file,
                    &format!(
                        "完成 {:?} / 跳过 {:?} / 缺失 {:?} / 无法读取 {:?} / 未完成 {:?}",
                        summary.translated,
                        summary.skipped,
                        summary.missing,
                        summary.unreadable,
                        summary.unfinished
                    ),
                )?;
            }
            Command::Filter => {
                text_stages::run_filter(&self.config).await?;
            }
            Command::Terms { min_frequency } => {
                text_stages::run_terms(&self.config, min_frequency).await?;
            }
            Command::Phonetics {
                generate,
                workers,
                use_filtered,
            } => {
                if generate {
                    let backend = create_backend(&self.config)?;
                    text_stages::run_generate_phonetics(&self.config, backend, workers).await?;
                } else {
                    text_stages::run_phonetic_replacement(&self.config, use_filtered).await?;
                }
            }
            Command::Adapt(args) => {
                let backend = create_backend(&self.config)?;
                let options = AdaptOptions {
                    input_dir: args
                        .input_dir
                        .unwrap_or_else(|| self.config.translations_path()),
                    output_dir: args.output_dir.unwrap_or_else(|| self.config.adapted_path()),
                    context_file: Some(args.context),
                    workers: args.workers,
                    group_size: args.group_size,
                };
                run_adaptation(backend, &options).await?;
            }
            Command::Compile { use_filtered } => {
                text_stages::run_compile(&self.config, use_filtered).await?;
            }
            Command::Audiobook(args) => self.run_audiobook(args).await?,
            Command::Voices => {
                logging::log_section("🎙️ 可用声音");
                for (voice, description) in KNOWN_VOICES {
                    info!("  {:<8} {}", voice, description);
                }
                info!("当前配置: {}", resolve_voice(&self.config.tts_voice));
            }
            Command::Status => {
                collect_status(&self.config).await?.log();
            }
        }
        Ok(())
    }

    async fn run_audiobook(mut self, args: AudiobookArgs) -> Result<()> {
        if let Some(voice) = args.voice {
            self.config.tts_voice = voice;
        }
        if let Some(speed) = args.speed {
            self.config.tts_speed = speed;
        }
        if let Some(workers) = args.workers {
            self.config.max_concurrent_speech = workers;
        }
        if let Some(per_group) = args.paragraphs_per_group {
            self.config.paragraphs_per_audio_group = per_group;
        }

        let source = if args.adapted {
            SpeechSource::Adapted(self.config.adapted_path())
        } else {
            SpeechSource::Translations(self.config.translations_path())
        };
        let options = AudiobookOptions {
            source,
            output_dir: self.config.audiobook_path(),
            workers: self.config.max_concurrent_speech,
            paragraphs_per_group: self.config.paragraphs_per_audio_group,
            cleanup: args.cleanup,
        };

        let client = TtsClient::new(&self.config)?;
        let mut builder = AudiobookBuilder::new(Arc::new(client), options);
        if !args.disable_phonetic {
            let replacer = PhoneticReplacer::load(&PathBuf::from(&self.config.phonetics_file)).await?;
            info!("🔊 读音替换规则: {}", replacer.len());
            builder = builder.with_phonetics(replacer);
        }
        builder.build().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_translate_arguments() {
        let cli = Cli::parse_from(["book-translator", "translate", "3", "5", "-w", "8"]);
        match cli.command {
            Command::Translate {
                chapters,
                all,
                workers,
            } => {
                assert_eq!(chapters, vec![3, 5]);
                assert!(!all);
                assert_eq!(workers, Some(8));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_audiobook_and_terms_defaults() {
        let cli = Cli::parse_from([
            "book-translator",
            "-v",
            "audiobook",
            "--voice",
            "female",
            "--disable-phonetic",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Command::Audiobook(args) => {
                assert_eq!(args.voice.as_deref(), Some("female"));
                assert!(args.disable_phonetic);
                assert!(!args.cleanup);
                assert_eq!(args.workers, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let cli = Cli::parse_from(["book-translator", "terms"]);
        assert!(matches!(cli.command, Command::Terms { min_frequency: 2 }));
    }

    #[test]
    fn test_parse_extract_and_context() {
        let cli = Cli::parse_from(["book-translator", "extract", "book.md"]);
        assert!(matches!(cli.command, Command::Extract { input } if input == PathBuf::from("book.md")));

        let cli = Cli::parse_from(["book-translator", "context"]);
        match cli.command {
            Command::Context { output } => assert_eq!(output, PathBuf::from("book_context.json")),
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
