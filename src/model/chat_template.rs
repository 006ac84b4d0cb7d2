//! Llama 3 对话模板
//!
//! 图片占位符放在 user 消息开头, 推理时替换为图像 embedding

use crate::joycaption::predictor::ChatPrompt;

pub const IMAGE_TOKEN: &str = "<image>";
pub const EOT_TOKEN: &str = "<|eot_id|>";

/// 生成 add_generation_prompt 形式的对话文本
pub fn format_chat(prompt: &ChatPrompt) -> String {
    format!(
        "<|begin_of_text|><|start_header_id|>system<|end_header_id|>\n\n{}{EOT_TOKEN}\
         <|start_header_id|>user<|end_header_id|>\n\n{IMAGE_TOKEN}{}{EOT_TOKEN}\
         <|start_header_id|>assistant<|end_header_id|>\n\n",
        prompt.system, prompt.user
    )
}

/// 按第一个图片占位符切分
pub fn split_at_image(text: &str) -> Option<(&str, &str)> {
    text.split_once(IMAGE_TOKEN)
}
