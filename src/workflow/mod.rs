pub mod block_ctx;
pub mod translation_flow;

pub use block_ctx::BlockCtx;
pub use translation_flow::TranslationFlow;
