//! JoyCaption
//!
//! 提示词构建, 单图/流式打标与文件夹批量打标

pub mod caption_length;
pub mod caption_type;
pub mod extra_options;
pub mod generation;
pub mod prompt_builder;

pub mod batch;
pub mod predictor;
pub mod stream;

pub use batch::{run_batch, BatchRequest, BatchRun, BatchStatus, FailurePolicy};
pub use caption_length::CaptionLength;
pub use caption_type::CaptionType;
pub use generation::GenerationParams;
pub use predictor::{caption_once, CaptionModel, SharedModel};
pub use prompt_builder::{build_prompt, PromptRequest};
pub use stream::{stream_caption, CaptionStream, StreamOptions};
