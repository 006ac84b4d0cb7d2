//! 提示词构建
//!
//! 模板 + 额外选项 + 占位符替换, 纯函数, 无副作用

use std::borrow::Cow;

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::{
    error::Error,
    joycaption::{
        caption_length::CaptionLength, caption_type::CaptionType, extra_options::NAME_PLACEHOLDER,
    },
};

lazy_static! {
    static ref PLACEHOLDER_RE: Regex = Regex::new(r"\{(name|length|word_count)\}")
        .expect("placeholder regex is valid");
}

/// 提示词参数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptRequest {
    #[serde(default)]
    pub caption_type: CaptionType,
    #[serde(default)]
    pub caption_length: CaptionLength,
    #[serde(default)]
    pub extra_options: Vec<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl PromptRequest {
    pub fn new(caption_type: CaptionType, caption_length: CaptionLength) -> Self {
        Self {
            caption_type,
            caption_length,
            ..Default::default()
        }
    }

    pub fn with_extra_options<S: Into<String>>(
        mut self,
        extra_options: impl IntoIterator<Item = S>,
    ) -> Self {
        self.extra_options = extra_options.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// 构建最终提示词
    pub fn build(&self) -> String {
        let template = self
            .caption_type
            .template(self.caption_length.template_row());

        let mut prompt = String::from(template);
        if !self.extra_options.is_empty() {
            prompt.push(' ');
            prompt.push_str(&self.extra_options.join(" "));
        }

        let name = self
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(NAME_PLACEHOLDER);
        let length = self.caption_length.to_string();

        substitute(&prompt, name, &length).into_owned()
    }
}

/// 单次替换, 替换结果不会被再次扫描
fn substitute<'a>(prompt: &'a str, name: &str, length: &str) -> Cow<'a, str> {
    PLACEHOLDER_RE.replace_all(prompt, |caps: &Captures| match &caps[1] {
        "name" => name.to_string(),
        // length / word_count 都使用选择器原值
        _ => length.to_string(),
    })
}

/// 字符串入口, 与界面下拉框的取值一致
///
/// 未知的打标类型或长度返回 [`Error::InvalidArgument`]
pub fn build_prompt<S: AsRef<str>>(
    caption_type: &str,
    caption_length: &str,
    extra_options: &[S],
    name: Option<&str>,
) -> Result<String, Error> {
    let request = PromptRequest {
        caption_type: CaptionType::parse(caption_type)?,
        caption_length: caption_length.parse()?,
        extra_options: extra_options
            .iter()
            .map(|o| o.as_ref().to_string())
            .collect(),
        name: name.map(str::to_string),
    };
    Ok(request.build())
}
