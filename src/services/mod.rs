pub mod audio_adapter;
pub mod blacklist_filter;
pub mod book_compiler;
pub mod book_context;
pub mod chapter_splitter;
pub mod context_service;
pub mod paragraph_grouper;
pub mod phonetic_service;
pub mod progress_tracker;
pub mod speech_text;
pub mod term_extractor;
pub mod text_splitter;
pub mod translation_service;

pub use audio_adapter::AudioAdapter;
pub use blacklist_filter::{BlacklistFilter, FilterConfig, FilterStats};
pub use book_compiler::{BookCompiler, CompiledBook};
pub use book_context::{BookContext, BookContextExtractor};
pub use context_service::{ChapterContext, ContextManager};
pub use paragraph_grouper::group_paragraphs;
pub use phonetic_service::{PhoneticGenerator, PhoneticReplacer, PhoneticsFile};
pub use progress_tracker::ProgressTracker;
pub use speech_text::{build_speech_tasks, prepare_text_for_speech, SpeechTask};
pub use term_extractor::{TermExtractor, TermReport};
pub use text_splitter::{split_book_text, TextChapter};
pub use translation_service::{TranslationService, TranslationStats};
