//! SigLIP 视觉塔
//!
//! 只执行到 `vision_feature_layer` 指定的层, 不经过 post_layernorm

use candle_core::{DType, Module, Result, Tensor};
use candle_nn::{Conv2d, Conv2dConfig, Embedding, LayerNorm, Linear, VarBuilder};

use super::config::VisionConfig;

#[derive(Debug, Clone)]
struct VisionEmbeddings {
    patch_embedding: Conv2d,
    position_embedding: Embedding,
}

impl VisionEmbeddings {
    fn new(vb: VarBuilder, cfg: &VisionConfig) -> Result<Self> {
        let conv_cfg = Conv2dConfig {
            stride: cfg.patch_size,
            ..Default::default()
        };
        let patch_embedding = candle_nn::conv2d(
            cfg.num_channels,
            cfg.hidden_size,
            cfg.patch_size,
            conv_cfg,
            vb.pp("patch_embedding"),
        )?;
        let position_embedding = candle_nn::embedding(
            cfg.num_patches(),
            cfg.hidden_size,
            vb.pp("position_embedding"),
        )?;
        Ok(Self {
            patch_embedding,
            position_embedding,
        })
    }
}

impl Module for VisionEmbeddings {
    fn forward(&self, pixel_values: &Tensor) -> Result<Tensor> {
        // [b, c, h, w] -> [b, hidden, h/p, w/p] -> [b, n, hidden]
        let xs = self.patch_embedding.forward(pixel_values)?;
        let xs = xs.flatten_from(2)?.transpose(1, 2)?;
        xs.broadcast_add(self.position_embedding.embeddings())
    }
}

#[derive(Debug, Clone)]
struct Attention {
    q_proj: Linear,
    k_proj: Linear,
    v_proj: Linear,
    out_proj: Linear,
    num_heads: usize,
    head_dim: usize,
    scale: f64,
}

impl Attention {
    fn new(vb: VarBuilder, cfg: &VisionConfig) -> Result<Self> {
        let dim = cfg.hidden_size;
        let head_dim = dim / cfg.num_attention_heads;
        Ok(Self {
            q_proj: candle_nn::linear(dim, dim, vb.pp("q_proj"))?,
            k_proj: candle_nn::linear(dim, dim, vb.pp("k_proj"))?,
            v_proj: candle_nn::linear(dim, dim, vb.pp("v_proj"))?,
            out_proj: candle_nn::linear(dim, dim, vb.pp("out_proj"))?,
            num_heads: cfg.num_attention_heads,
            head_dim,
            scale: (head_dim as f64).powf(-0.5),
        })
    }

    fn split_heads(&self, xs: &Tensor, b: usize, n: usize) -> Result<Tensor> {
        xs.reshape((b, n, self.num_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()
    }
}

impl Module for Attention {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let in_dtype = xs.dtype();
        let (b, n, dim) = xs.dims3()?;

        let q = self.split_heads(&self.q_proj.forward(xs)?, b, n)?;
        let k = self.split_heads(&self.k_proj.forward(xs)?, b, n)?;
        let v = self.split_heads(&self.v_proj.forward(xs)?, b, n)?;

        // softmax 在 f32 下计算
        let q = (q.to_dtype(DType::F32)? * self.scale)?;
        let k = k.to_dtype(DType::F32)?;
        let v = v.to_dtype(DType::F32)?;

        let attn = q.matmul(&k.t()?.contiguous()?)?;
        let attn = candle_nn::ops::softmax_last_dim(&attn)?;
        let out = attn
            .matmul(&v)?
            .to_dtype(in_dtype)?
            .transpose(1, 2)?
            .reshape((b, n, dim))?;
        self.out_proj.forward(&out)
    }
}

#[derive(Debug, Clone)]
struct Mlp {
    fc1: Linear,
    fc2: Linear,
}

impl Mlp {
    fn new(vb: VarBuilder, cfg: &VisionConfig) -> Result<Self> {
        Ok(Self {
            fc1: candle_nn::linear(cfg.hidden_size, cfg.intermediate_size, vb.pp("fc1"))?,
            fc2: candle_nn::linear(cfg.intermediate_size, cfg.hidden_size, vb.pp("fc2"))?,
        })
    }
}

impl Module for Mlp {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        // gelu_pytorch_tanh
        self.fc2.forward(&self.fc1.forward(xs)?.gelu()?)
    }
}

#[derive(Debug, Clone)]
struct EncoderLayer {
    layer_norm1: LayerNorm,
    self_attn: Attention,
    layer_norm2: LayerNorm,
    mlp: Mlp,
}

impl EncoderLayer {
    fn new(vb: VarBuilder, cfg: &VisionConfig) -> Result<Self> {
        let eps = cfg.layer_norm_eps;
        Ok(Self {
            layer_norm1: candle_nn::layer_norm(cfg.hidden_size, eps, vb.pp("layer_norm1"))?,
            self_attn: Attention::new(vb.pp("self_attn"), cfg)?,
            layer_norm2: candle_nn::layer_norm(cfg.hidden_size, eps, vb.pp("layer_norm2"))?,
            mlp: Mlp::new(vb.pp("mlp"), cfg)?,
        })
    }
}

impl Module for EncoderLayer {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let residual = xs;
        let xs = self.self_attn.forward(&self.layer_norm1.forward(xs)?)?;
        let xs = (xs + residual)?;
        let residual = &xs;
        let out = self.mlp.forward(&self.layer_norm2.forward(&xs)?)?;
        out + residual
    }
}

/// 视觉塔, 输出 [b, num_patches, hidden]
#[derive(Debug, Clone)]
pub struct SiglipVisionTower {
    embeddings: VisionEmbeddings,
    layers: Vec<EncoderLayer>,
}

impl SiglipVisionTower {
    /// `num_layers`: 实际执行的 encoder 层数
    pub fn load(vb: VarBuilder, cfg: &VisionConfig, num_layers: usize) -> Result<Self> {
        let embeddings = VisionEmbeddings::new(vb.pp("embeddings"), cfg)?;
        let vb_layers = vb.pp("encoder").pp("layers");
        let layers = (0..num_layers)
            .map(|i| EncoderLayer::new(vb_layers.pp(i), cfg))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { embeddings, layers })
    }
}

impl Module for SiglipVisionTower {
    fn forward(&self, pixel_values: &Tensor) -> Result<Tensor> {
        let mut xs = self.embeddings.forward(pixel_values)?;
        for layer in &self.layers {
            xs = layer.forward(&xs)?;
        }
        Ok(xs)
    }
}

/// 多模态投影: linear -> gelu -> linear
#[derive(Debug, Clone)]
pub struct Projector {
    linear_1: Linear,
    linear_2: Linear,
}

impl Projector {
    pub fn load(vb: VarBuilder, vision_hidden: usize, text_hidden: usize, bias: bool) -> Result<Self> {
        let linear: fn(usize, usize, VarBuilder) -> Result<Linear> = if bias {
            candle_nn::linear
        } else {
            candle_nn::linear_no_bias
        };
        Ok(Self {
            linear_1: linear(vision_hidden, text_hidden, vb.pp("linear_1"))?,
            linear_2: linear(text_hidden, text_hidden, vb.pp("linear_2"))?,
        })
    }
}

impl Module for Projector {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        self.linear_2.forward(&self.linear_1.forward(xs)?.gelu_erf()?)
    }
}
