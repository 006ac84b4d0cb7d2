//! 文件扫描

use std::path::{Path, PathBuf};

use log::warn;
use walkdir::WalkDir;

use crate::error::Error;

/// 支持的图片格式
pub const IMAGE_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "webp", "bmp", "gif", "tiff"];

/// 图片扫描器
#[derive(Debug, Clone)]
pub struct ImageScanner {
    file_extensions: Vec<String>,
}

impl Default for ImageScanner {
    fn default() -> Self {
        Self {
            file_extensions: IMAGE_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

impl ImageScanner {
    /// 扫描目录下一层的图片文件, 按文件名排序
    ///
    /// 目录不存在时返回空列表.
    pub fn scan(&self, dir: &Path) -> Result<Vec<PathBuf>, Error> {
        if !dir.is_dir() {
            warn!("not a directory, {}", dir.display());
            return Ok(Vec::new());
        }
        let mut files = self.single_scan(dir)?;
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(files)
    }

    /// 单层扫描实现
    fn single_scan(&self, dir: &Path) -> Result<Vec<PathBuf>, Error> {
        let walker = WalkDir::new(dir).min_depth(1).max_depth(1).into_iter();

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| {
                Error::InvalidDirectory(format!("{}: {e}", dir.display()))
            })?;
            if entry.file_type().is_file() && self.is_img_file(entry.path()) {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    /// 图像文件检测
    pub fn is_img_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|s| s.to_str())
            .map(|ext| {
                self.file_extensions
                    .iter()
                    .any(|e| ext.eq_ignore_ascii_case(e))
            })
            .unwrap_or(false)
    }
}
