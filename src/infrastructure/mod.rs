//! 基础设施层
//!
//! 持有外部资源（书籍文件、ffmpeg 进程），只暴露能力

pub mod audio_merger;
pub mod pdf_reader;
pub mod text_reader;

pub use audio_merger::{concat_bytes, AudioMerger, MergeMethod};
pub use pdf_reader::{split_pages, PdfReader, PdfText};
pub use text_reader::{BookFormat, BookText, TextReader};
