//! 公共库

pub mod utils;
