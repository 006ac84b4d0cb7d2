//! 工具

pub mod file_scanner;
pub use file_scanner::{ImageScanner, IMAGE_EXTENSIONS};

pub mod log;
pub use self::log::init_logger;

pub mod time;
pub use time::{estimate_remaining, seconds_to_hms, seconds_to_ms};
