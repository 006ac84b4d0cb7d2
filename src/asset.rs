//! 模型文件下载与缓存
//!
//! 以 (仓库, 文件名) 为键, 文件缓存在本地目录, 已存在时不再下载

use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

use hf_hub::api::sync::{Api, ApiBuilder};
use serde::Deserialize;
use tracing::info;

use crate::error::Error;

pub const MODEL_REPO: &str = "fancyfeast/llama-joycaption-beta-one-hf-llava";

pub const CONFIG_FILE: &str = "config.json";
pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const WEIGHTS_INDEX_FILE: &str = "model.safetensors.index.json";
pub const WEIGHTS_FILE: &str = "model.safetensors";

/// 默认缓存目录: ~/.cache/joycaption
pub fn default_cache_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cache")
        .join("joycaption")
}

/// 加载模型所需的本地文件
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub weights: Vec<PathBuf>,
}

impl ModelFiles {
    /// 从已下载好的本地目录读取
    pub fn from_dir(dir: &Path) -> Result<Self, Error> {
        let require = |name: &str| -> Result<PathBuf, Error> {
            let path = dir.join(name);
            if !path.is_file() {
                return Err(Error::FileNotFound(path.display().to_string()));
            }
            Ok(path)
        };

        let config = require(CONFIG_FILE)?;
        let tokenizer = require(TOKENIZER_FILE)?;
        let index = dir.join(WEIGHTS_INDEX_FILE);
        let weights = if index.is_file() {
            weight_files_from_index(&fs::read(&index)?)?
                .iter()
                .map(|name| require(name))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            vec![require(WEIGHTS_FILE)?]
        };

        Ok(Self {
            config,
            tokenizer,
            weights,
        })
    }
}

#[derive(Deserialize)]
struct WeightsIndex {
    weight_map: std::collections::HashMap<String, String>,
}

/// safetensors 分片文件名, 去重并排序
pub fn weight_files_from_index(data: &[u8]) -> Result<Vec<String>, Error> {
    let index: WeightsIndex = serde_json::from_slice(data)?;
    let files: BTreeSet<String> = index.weight_map.into_values().collect();
    if files.is_empty() {
        return Err(Error::ModelConfig("empty safetensors weight_map".to_string()));
    }
    Ok(files.into_iter().collect())
}

/// huggingface hub 文件缓存
pub struct AssetStore {
    api: Api,
}

impl AssetStore {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self, Error> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir)?;
        let api = ApiBuilder::new()
            .with_cache_dir(cache_dir)
            .with_progress(true)
            .build()?;
        Ok(Self { api })
    }

    /// 确保文件存在于本地缓存, 返回本地路径
    pub fn ensure_asset(&self, repo: &str, filename: &str) -> Result<PathBuf, Error> {
        let path = self.api.model(repo.to_string()).get(filename)?;
        info!("asset ready: {repo}/{filename}");
        Ok(path)
    }

    /// 下载模型的全部文件
    pub fn model_files(&self, repo: &str) -> Result<ModelFiles, Error> {
        let config = self.ensure_asset(repo, CONFIG_FILE)?;
        let tokenizer = self.ensure_asset(repo, TOKENIZER_FILE)?;

        // 单文件权重的仓库没有 index
        let weights = match self.ensure_asset(repo, WEIGHTS_INDEX_FILE) {
            Ok(index) => weight_files_from_index(&fs::read(index)?)?
                .iter()
                .map(|name| self.ensure_asset(repo, name))
                .collect::<Result<Vec<_>, _>>()?,
            Err(Error::HfHub(e)) => {
                info!("no weights index in {repo} ({e}), using {WEIGHTS_FILE}");
                vec![self.ensure_asset(repo, WEIGHTS_FILE)?]
            }
            Err(e) => return Err(e),
        };

        Ok(ModelFiles {
            config,
            tokenizer,
            weights,
        })
    }
}
