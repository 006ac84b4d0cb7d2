//! 打标长度选择器
//!
//! - `any`: 不限长度
//! - 数字: 字数上限, 原样写入提示词 (保留前导零, 不限位数)
//! - very short / short / medium-length / long / very long: 描述性长度

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

use crate::error::Error;

/// 下拉框中的字数选项: 20, 30, ..., 260
pub const WORD_COUNT_CHOICES: std::ops::RangeInclusive<u32> = 20..=260;
const WORD_COUNT_STEP: usize = 10;

/// 描述性长度
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, AsRefStr, EnumIter,
)]
pub enum LengthDescriptor {
    #[strum(to_string = "very short")]
    VeryShort,
    #[strum(to_string = "short")]
    Short,
    #[strum(to_string = "medium-length")]
    MediumLength,
    #[strum(to_string = "long")]
    Long,
    #[strum(to_string = "very long")]
    VeryLong,
}

/// 长度选择器
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CaptionLength {
    Any,
    /// 仅由 ASCII 数字组成的原始文本
    WordCount(String),
    Qualitative(LengthDescriptor),
}

impl Default for CaptionLength {
    fn default() -> Self {
        CaptionLength::Qualitative(LengthDescriptor::Long)
    }
}

impl CaptionLength {
    /// 模板行号
    pub fn template_row(&self) -> usize {
        match self {
            CaptionLength::Any => 0,
            CaptionLength::WordCount(_) => 1,
            CaptionLength::Qualitative(_) => 2,
        }
    }

    /// 下拉框选项
    pub fn choices() -> Vec<String> {
        let mut choices = vec![CaptionLength::Any.to_string()];
        choices.extend(LengthDescriptor::iter().map(|d| d.to_string()));
        choices.extend(
            WORD_COUNT_CHOICES
                .step_by(WORD_COUNT_STEP)
                .map(|i| i.to_string()),
        );
        choices
    }
}

impl fmt::Display for CaptionLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptionLength::Any => f.write_str("any"),
            CaptionLength::WordCount(n) => write!(f, "{n}"),
            CaptionLength::Qualitative(d) => f.write_str(d.as_ref()),
        }
    }
}

impl FromStr for CaptionLength {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "any" {
            return Ok(CaptionLength::Any);
        }
        if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(CaptionLength::WordCount(s.to_string()));
        }
        s.parse::<LengthDescriptor>()
            .map(CaptionLength::Qualitative)
            .map_err(|_| Error::InvalidArgument(format!("unknown caption length: {s:?}")))
    }
}

impl TryFrom<String> for CaptionLength {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CaptionLength> for String {
    fn from(value: CaptionLength) -> Self {
        value.to_string()
    }
}
