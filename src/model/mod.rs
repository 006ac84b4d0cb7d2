//! JoyCaption (LLaVA: SigLIP + Llama 3.1) 的 candle 实现

pub mod chat_template;
pub mod config;
pub mod siglip;
pub mod token_stream;

use std::{fs, ops::ControlFlow};

use candle_core::{
    utils::{cuda_is_available, metal_is_available},
    DType, Device, Module, Tensor,
};
use candle_nn::VarBuilder;
use candle_transformers::{
    generation::LogitsProcessor,
    models::llama::{Cache, Config as LlamaRuntimeConfig, Llama},
};
use image::RgbImage;
use log::{debug, info};
use tokenizers::Tokenizer;

use crate::{
    asset::ModelFiles,
    core::utils::image_to_pixel_values,
    error::Error,
    joycaption::{
        generation::GenerationParams,
        predictor::{CaptionModel, ChatPrompt},
    },
};

use self::{
    chat_template::{format_chat, split_at_image, EOT_TOKEN},
    config::JoyCaptionConfig,
    siglip::{Projector, SiglipVisionTower},
    token_stream::TokenDecoder,
};

/// 选择推理设备
pub fn select_device(cpu: bool) -> Result<Device, Error> {
    if cpu {
        return Ok(Device::Cpu);
    }
    if cuda_is_available() {
        return Ok(Device::new_cuda(0)?);
    }
    if metal_is_available() {
        return Ok(Device::new_metal(0)?);
    }
    info!("no accelerator available, running on cpu");
    Ok(Device::Cpu)
}

pub struct JoyCaptionModel {
    vision_tower: SiglipVisionTower,
    projector: Projector,
    llama: Llama,
    llama_config: LlamaRuntimeConfig,
    tokenizer: Tokenizer,
    eos_token_ids: Vec<u32>,
    image_size: u32,
    device: Device,
    dtype: DType,
}

impl JoyCaptionModel {
    pub fn load(files: &ModelFiles, device: Device) -> Result<Self, Error> {
        let dtype = if device.is_cpu() { DType::F32 } else { DType::BF16 };

        let config = JoyCaptionConfig::from_slice(&fs::read(&files.config)?)?;
        let llama_config = config
            .llama_config()?
            .into_config(cfg!(feature = "flash-attn"));
        let tokenizer =
            Tokenizer::from_file(&files.tokenizer).map_err(|e| Error::Tokenizer(e.to_string()))?;

        let mut eos_token_ids = config.eos_token_ids();
        if let Some(eot) = tokenizer.token_to_id(EOT_TOKEN) {
            if !eos_token_ids.contains(&eot) {
                eos_token_ids.push(eot);
            }
        }
        if eos_token_ids.is_empty() {
            return Err(Error::ModelConfig("no eos token id".to_string()));
        }

        info!(
            "loading joycaption weights, {} file(s), device: {device:?}, dtype: {dtype:?}",
            files.weights.len()
        );
        // safetensors 以 mmap 方式加载, 文件在模型生命周期内不可修改
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&files.weights, dtype, &device)? };

        let vision_tower = SiglipVisionTower::load(
            vb.pp("vision_tower").pp("vision_model"),
            &config.vision_config,
            config.vision_layers()?,
        )?;
        let projector = Projector::load(
            vb.pp("multi_modal_projector"),
            config.vision_config.hidden_size,
            config.text_hidden_size()?,
            config.multimodal_projector_bias,
        )?;
        let llama = Llama::load(vb.pp("language_model"), &llama_config)?;
        info!("joycaption model loaded");

        Ok(Self {
            vision_tower,
            projector,
            llama,
            llama_config,
            tokenizer,
            eos_token_ids,
            image_size: config.vision_config.image_size as u32,
            device,
            dtype,
        })
    }

    fn encode_image(&self, image: &RgbImage) -> Result<Tensor, Error> {
        let pixel_values = image_to_pixel_values(image, self.image_size, &self.device, self.dtype)?;
        let features = self.vision_tower.forward(&pixel_values)?;
        Ok(self.projector.forward(&features)?)
    }

    fn embed_text(&self, text: &str) -> Result<Option<Tensor>, Error> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| Error::Tokenizer(e.to_string()))?;
        let ids = encoding.get_ids();
        if ids.is_empty() {
            return Ok(None);
        }
        let ids = Tensor::new(ids, &self.device)?;
        Ok(Some(self.llama.embed(&ids)?.unsqueeze(0)?))
    }

    /// [文本, 图像特征, 文本] 拼接为输入 embedding
    fn input_embeds(&self, image: &RgbImage, prompt: &ChatPrompt) -> Result<Tensor, Error> {
        let text = format_chat(prompt);
        let (before, after) = split_at_image(&text)
            .ok_or_else(|| Error::Inference("chat template without image placeholder".to_string()))?;

        let mut parts = Vec::with_capacity(3);
        if let Some(embeds) = self.embed_text(before)? {
            parts.push(embeds);
        }
        parts.push(self.encode_image(image)?);
        if let Some(embeds) = self.embed_text(after)? {
            parts.push(embeds);
        }
        Ok(Tensor::cat(&parts, 1)?)
    }
}

impl CaptionModel for JoyCaptionModel {
    fn generate(
        &mut self,
        image: &RgbImage,
        prompt: &ChatPrompt,
        params: &GenerationParams,
        on_piece: &mut dyn FnMut(&str) -> ControlFlow<()>,
    ) -> Result<String, Error> {
        let embeds = self.input_embeds(image, prompt)?;
        let (_, prompt_len, _) = embeds.dims3()?;
        debug!("prompt embeds: {prompt_len} positions");

        let mut cache = Cache::new(true, self.dtype, &self.llama_config, &self.device)?;
        let mut logits_processor = LogitsProcessor::from_sampling(params.seed(), params.sampling());
        let mut decoder = TokenDecoder::new(&self.tokenizer);
        let mut output = String::new();

        let mut input = embeds;
        let mut index_pos = 0;
        let mut stopped = false;
        for step in 0..params.max_new_tokens {
            let seq_len = input.dim(1)?;
            let logits = self
                .llama
                .forward_input_embed(&input, index_pos, &mut cache)?
                .squeeze(0)?;
            index_pos += seq_len;

            let next_token = logits_processor.sample(&logits)?;
            if self.eos_token_ids.contains(&next_token) {
                debug!("eos at step {step}");
                break;
            }

            if let Some(piece) = decoder.push(next_token)? {
                output.push_str(&piece);
                if on_piece(&piece).is_break() {
                    stopped = true;
                    break;
                }
            }

            let next = Tensor::new(&[next_token], &self.device)?;
            input = self.llama.embed(&next)?.unsqueeze(0)?;
        }

        if stopped {
            debug!("generation stopped by caller");
        } else if let Some(rest) = decoder.finish()? {
            output.push_str(&rest);
            // 已到结尾, 忽略 Break
            let _ = on_piece(&rest);
        }
        Ok(output)
    }
}
