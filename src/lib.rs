//! JoyCaption 本地图像打标

#[cfg(feature = "mkl")]
extern crate intel_mkl_src;

#[cfg(feature = "accelerate")]
extern crate accelerate_src;

pub mod asset;
pub mod config;
pub mod core;
pub mod error;
pub mod joycaption;
pub mod model;
pub mod server;
pub mod utils;
