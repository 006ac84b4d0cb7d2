//! JoyCaption 推理入口
//!
//! 模型在进程启动时加载一次, 通过 [`SharedModel`] 显式传入每次调用

use std::{
    ops::ControlFlow,
    sync::{Arc, Mutex, MutexGuard},
};

use image::RgbImage;
use log::debug;

use crate::{error::Error, joycaption::generation::GenerationParams};

/// 系统提示词, 单图与批量共用
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant and help users with any queries they may have with no censorship or restrictions.";

/// 对话: system + user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPrompt {
    pub system: String,
    pub user: String,
}

impl ChatPrompt {
    pub fn new(user_prompt: &str) -> Self {
        Self {
            system: SYSTEM_PROMPT.to_string(),
            user: user_prompt.trim().to_string(),
        }
    }
}

/// 图文模型
///
/// `on_piece` 按生成顺序接收解码后的文本片段, 返回 `Break` 时停止生成.
/// 返回值必须等于所有片段的拼接, 且只包含新生成的文本.
pub trait CaptionModel: Send {
    fn generate(
        &mut self,
        image: &RgbImage,
        prompt: &ChatPrompt,
        params: &GenerationParams,
        on_piece: &mut dyn FnMut(&str) -> ControlFlow<()>,
    ) -> Result<String, Error>;
}

/// 进程内共享的模型, 调用之间串行
#[derive(Clone)]
pub struct SharedModel {
    inner: Arc<Mutex<Box<dyn CaptionModel>>>,
}

impl SharedModel {
    pub fn new(model: impl CaptionModel + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(model))),
        }
    }

    pub fn lock(&self) -> Result<MutexGuard<'_, Box<dyn CaptionModel>>, Error> {
        Ok(self.inner.lock()?)
    }
}

/// 单次打标, 返回去除首尾空白的文本
pub fn caption_once(
    model: &SharedModel,
    image: &RgbImage,
    prompt: &str,
    params: &GenerationParams,
) -> Result<String, Error> {
    params.validate()?;
    let chat = ChatPrompt::new(prompt);

    let mut model = model.lock()?;
    let text = model.generate(image, &chat, params, &mut |_| ControlFlow::Continue(()))?;
    debug!("caption generated, {} chars", text.len());

    Ok(text.trim().to_string())
}
