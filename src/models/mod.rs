pub mod audio;
pub mod chapter;
pub mod loaders;
pub mod progress;
pub mod translation;

pub use audio::{AdaptationMetadata, AdaptedChapter, AudiobookMetadata};
pub use chapter::{
    chapter_file_name, is_image_placeholder, translated_file_name, BookInfo, BookMetadata,
    ChapterEntry, ExtractedChapter,
};
pub use progress::{ChapterProgress, ChapterStatus, ProgressFile};
pub use translation::{BlockStatus, BlockTranslation, ParagraphGroup, TranslatedChapter};
