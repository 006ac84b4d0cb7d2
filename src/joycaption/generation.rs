//! 生成参数

use candle_transformers::generation::Sampling;
use serde::{Deserialize, Serialize};

use crate::error::Error;

pub const TEMPERATURE_RANGE: (f64, f64) = (0.0, 2.0);
pub const TOP_P_RANGE: (f64, f64) = (0.0, 1.0);
pub const MAX_NEW_TOKENS_RANGE: (usize, usize) = (1, 2048);

/// 采样参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// 0 表示贪心解码
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// nucleus 采样阈值, 仅在 temperature > 0 时生效
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: usize,
    /// 随机种子, 不指定时每次随机
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_temperature() -> f64 {
    0.6
}

fn default_top_p() -> f64 {
    0.9
}

fn default_max_new_tokens() -> usize {
    512
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_new_tokens: default_max_new_tokens(),
            seed: None,
        }
    }
}

impl GenerationParams {
    /// 贪心解码参数
    pub fn greedy(max_new_tokens: usize) -> Self {
        Self {
            temperature: 0.0,
            max_new_tokens,
            ..Default::default()
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = top_p;
        self
    }

    pub fn with_max_new_tokens(mut self, max_new_tokens: usize) -> Self {
        self.max_new_tokens = max_new_tokens;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn is_greedy(&self) -> bool {
        self.temperature <= 0.0
    }

    /// 校验参数范围, 与界面滑块一致
    pub fn validate(&self) -> Result<(), Error> {
        let (t_min, t_max) = TEMPERATURE_RANGE;
        if !(t_min..=t_max).contains(&self.temperature) {
            return Err(Error::InvalidParameter(format!(
                "temperature must be within [{t_min}, {t_max}], got {}",
                self.temperature
            )));
        }
        let (p_min, p_max) = TOP_P_RANGE;
        if !(p_min..=p_max).contains(&self.top_p) {
            return Err(Error::InvalidParameter(format!(
                "top_p must be within [{p_min}, {p_max}], got {}",
                self.top_p
            )));
        }
        let (n_min, n_max) = MAX_NEW_TOKENS_RANGE;
        if !(n_min..=n_max).contains(&self.max_new_tokens) {
            return Err(Error::InvalidParameter(format!(
                "max_new_tokens must be within [{n_min}, {n_max}], got {}",
                self.max_new_tokens
            )));
        }
        Ok(())
    }

    /// 采样策略
    pub fn sampling(&self) -> Sampling {
        if self.is_greedy() {
            return Sampling::ArgMax;
        }
        if self.top_p >= 1.0 {
            Sampling::All {
                temperature: self.temperature,
            }
        } else {
            Sampling::TopP {
                p: self.top_p,
                temperature: self.temperature,
            }
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed.unwrap_or_else(rand::random)
    }
}
