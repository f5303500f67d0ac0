pub mod json_loader;

pub use json_loader::{
    is_extracted_chapter_file, is_translated_chapter_file, list_files, load_all_translated,
    load_extracted_chapter, load_json, load_metadata, load_translated_chapter, save_json,
};
