//! 错误处理

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // ==================== 标准库错误 ====================
    #[error("io error, {0}")]
    Io(std::io::Error),
    // std::sync::Mutex poison
    #[error("lock error, {0}")]
    LockError(String),

    #[error("decode error, {0}")]
    Decode(String),
    #[error("serde json error, {0}")]
    SerdeJsonError(#[from] serde_json::Error),
    #[error("regex error, {0}")]
    RegexError(#[from] regex::Error),

    // ==================== 输入错误 ====================
    #[error("invalid argument, {0}")]
    InvalidArgument(String),
    #[error("invalid parameter, {0}")]
    InvalidParameter(String),
    #[error("invalid directory, {0}")]
    InvalidDirectory(String),
    #[error("file not found, {0}")]
    FileNotFound(String),

    // ==================== 图像错误 ====================
    #[error("image error, {0}")]
    ImageError(#[from] image::ImageError),

    // ==================== 模型错误 ====================
    #[error("tensor error, {0}")]
    TensorErr(#[from] candle_core::Error),
    #[error("tokenizer error, {0}")]
    Tokenizer(String),
    #[error("hf hub error, {0}")]
    HfHub(#[from] hf_hub::api::sync::ApiError),
    #[error("model config error, {0}")]
    ModelConfig(String),
    #[error("inference error, {0}")]
    Inference(String),

    // ==================== 生成控制 ====================
    #[error("generation timed out after {duration_ms}ms without new output")]
    GenerationTimeout { duration_ms: u64 },
    #[error("generation cancelled")]
    Cancelled,

    // ==================== 批处理 ====================
    #[error("{path}: {source}")]
    BatchItem {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Error::LockError(e.to_string())
    }
}

/// 错误类别, 用于区分文件 IO 与模型推理失败
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// 调用方输入错误
    Input,
    /// 文件读写/图片解码
    Io,
    /// 模型加载与推理
    Model,
    /// 生成超时/取消
    Generation,
    /// 锁/线程等系统错误
    System,
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidArgument(_)
            | Error::InvalidParameter(_)
            | Error::InvalidDirectory(_)
            | Error::Decode(_) => ErrorCategory::Input,
            Error::Io(_) | Error::FileNotFound(_) | Error::ImageError(_) => ErrorCategory::Io,
            Error::TensorErr(_)
            | Error::Tokenizer(_)
            | Error::HfHub(_)
            | Error::ModelConfig(_)
            | Error::Inference(_) => ErrorCategory::Model,
            Error::GenerationTimeout { .. } | Error::Cancelled => ErrorCategory::Generation,
            Error::LockError(_)
            | Error::SerdeJsonError(_)
            | Error::RegexError(_) => ErrorCategory::System,
            Error::BatchItem { source, .. } => source.category(),
        }
    }

    /// 模型推理相关错误, 对资源耗尽敏感
    pub fn is_inference(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Model | ErrorCategory::Generation
        )
    }

    /// 为批处理中的单个文件附加路径
    pub fn for_file(self, path: impl Into<PathBuf>) -> Self {
        Error::BatchItem {
            path: path.into(),
            source: Box::new(self),
        }
    }
}
