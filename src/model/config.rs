//! LLaVA 配置 (config.json)

use candle_transformers::models::llama::LlamaConfig;
use serde::Deserialize;
use serde_json::Value;

use crate::error::Error;

/// SigLIP 视觉塔配置, 缺省值与 SiglipVisionConfig 一致
#[derive(Debug, Clone, Deserialize)]
pub struct VisionConfig {
    #[serde(default = "default_vision_hidden_size")]
    pub hidden_size: usize,
    #[serde(default = "default_vision_intermediate_size")]
    pub intermediate_size: usize,
    #[serde(default = "default_vision_layers")]
    pub num_hidden_layers: usize,
    #[serde(default = "default_vision_heads")]
    pub num_attention_heads: usize,
    #[serde(default = "default_image_size")]
    pub image_size: usize,
    #[serde(default = "default_patch_size")]
    pub patch_size: usize,
    #[serde(default = "default_layer_norm_eps")]
    pub layer_norm_eps: f64,
    #[serde(default = "default_num_channels")]
    pub num_channels: usize,
}

fn default_vision_hidden_size() -> usize {
    768
}
fn default_vision_intermediate_size() -> usize {
    3072
}
fn default_vision_layers() -> usize {
    12
}
fn default_vision_heads() -> usize {
    12
}
fn default_image_size() -> usize {
    224
}
fn default_patch_size() -> usize {
    16
}
fn default_layer_norm_eps() -> f64 {
    1e-6
}
fn default_num_channels() -> usize {
    3
}

impl VisionConfig {
    pub fn num_patches(&self) -> usize {
        let per_side = self.image_size / self.patch_size;
        per_side * per_side
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JoyCaptionConfig {
    pub vision_config: VisionConfig,
    /// 语言模型配置, 交给 candle 的 LlamaConfig 解析
    pub text_config: Value,
    #[serde(default = "default_vision_feature_layer")]
    pub vision_feature_layer: i64,
    #[serde(default = "default_projector_hidden_act")]
    pub projector_hidden_act: String,
    #[serde(default = "default_projector_bias")]
    pub multimodal_projector_bias: bool,
}

fn default_vision_feature_layer() -> i64 {
    -2
}
fn default_projector_hidden_act() -> String {
    "gelu".to_string()
}
fn default_projector_bias() -> bool {
    true
}

impl JoyCaptionConfig {
    pub fn from_slice(data: &[u8]) -> Result<Self, Error> {
        let config: JoyCaptionConfig = serde_json::from_slice(data)?;
        config.vision_layers()?;
        if config.projector_hidden_act != "gelu" {
            return Err(Error::ModelConfig(format!(
                "unsupported projector activation: {}",
                config.projector_hidden_act
            )));
        }
        Ok(config)
    }

    pub fn llama_config(&self) -> Result<LlamaConfig, Error> {
        serde_json::from_value(self.text_config.clone())
            .map_err(|e| Error::ModelConfig(format!("text_config, {e}")))
    }

    pub fn text_hidden_size(&self) -> Result<usize, Error> {
        self.text_config
            .get("hidden_size")
            .and_then(Value::as_u64)
            .map(|v| v as usize)
            .ok_or_else(|| Error::ModelConfig("text_config.hidden_size missing".to_string()))
    }

    /// 视觉塔需要执行的层数
    ///
    /// hidden_states 共 num_hidden_layers + 1 项, 第 0 项为 embedding 输出
    pub fn vision_layers(&self) -> Result<usize, Error> {
        let total = self.vision_config.num_hidden_layers as i64;
        let layers = if self.vision_feature_layer < 0 {
            total + 1 + self.vision_feature_layer
        } else {
            self.vision_feature_layer
        };
        if !(0..=total).contains(&layers) {
            return Err(Error::ModelConfig(format!(
                "vision_feature_layer {} out of range",
                self.vision_feature_layer
            )));
        }
        Ok(layers as usize)
    }

    /// 结束符, text_config.eos_token_id 可以是单个或数组
    pub fn eos_token_ids(&self) -> Vec<u32> {
        match self.text_config.get("eos_token_id") {
            Some(Value::Number(n)) => n.as_u64().map(|v| vec![v as u32]).unwrap_or_default(),
            Some(Value::Array(ids)) => ids
                .iter()
                .filter_map(Value::as_u64)
                .map(|v| v as u32)
                .collect(),
            _ => Vec::new(),
        }
    }
}
