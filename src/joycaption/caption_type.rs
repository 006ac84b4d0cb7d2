//! JoyCaption 打标类型
//!
//! 每种类型对应一组模板: [不限长度, 字数限制, 描述性长度]

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

use crate::error::Error;

/// 打标类型
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    Display,
    AsRefStr,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub enum CaptionType {
    #[default]
    #[strum(to_string = "Descriptive")]
    Descriptive,
    #[strum(to_string = "Descriptive (Casual)")]
    DescriptiveCasual,
    #[strum(to_string = "Straightforward")]
    Straightforward,
    #[strum(to_string = "Stable Diffusion Prompt")]
    StableDiffusionPrompt,
    #[strum(to_string = "MidJourney")]
    MidJourney,
    #[strum(to_string = "Danbooru tag list")]
    DanbooruTagList,
    #[strum(to_string = "e621 tag list")]
    E621TagList,
    #[strum(to_string = "Rule34 tag list")]
    Rule34TagList,
    #[strum(to_string = "Booru-like tag list")]
    BooruLikeTagList,
    #[strum(to_string = "Art Critic")]
    ArtCritic,
    #[strum(to_string = "Product Listing")]
    ProductListing,
    #[strum(to_string = "Social Media Post")]
    SocialMediaPost,
}

impl CaptionType {
    /// 下拉框选项, 顺序与模板表一致
    pub fn choices() -> Vec<String> {
        Self::iter().map(|t| t.to_string()).collect()
    }

    /// 按长度选择器的行号取模板
    pub fn template(&self, row: usize) -> &'static str {
        self.templates()[row.min(2)]
    }

    pub fn templates(&self) -> &'static [&'static str; 3] {
        match self {
            CaptionType::Descriptive => &[
                "Write a detailed description for this image.",
                "Write a detailed description for this image in {word_count} words or less.",
                "Write a {length} detailed description for this image.",
            ],
            CaptionType::DescriptiveCasual => &[
                "Write a descriptive caption for this image in a casual tone.",
                "Write a descriptive caption for this image in a casual tone within {word_count} words.",
                "Write a {length} descriptive caption for this image in a casual tone.",
            ],
            CaptionType::Straightforward => &[
                "Write a straightforward caption for this image. Begin with the main subject and medium. Mention pivotal elements—people, objects, scenery—using confident, definite language. Focus on concrete details like color, shape, texture, and spatial relationships. Show how elements interact. Omit mood and speculative wording. If text is present, quote it exactly. Note any watermarks, signatures, or compression artifacts. Never mention what's absent, resolution, or unobservable details. Vary your sentence structure and keep the description concise, without starting with “This image is…” or similar phrasing.",
                "Write a straightforward caption for this image within {word_count} words. Begin with the main subject and medium. Mention pivotal elements—people, objects, scenery—using confident, definite language. Focus on concrete details like color, shape, texture, and spatial relationships. Show how elements interact. Omit mood and speculative wording. If text is present, quote it exactly. Note any watermarks, signatures, or compression artifacts. Never mention what's absent, resolution, or unobservable details. Vary your sentence structure and keep the description concise, without starting with “This image is…” or similar phrasing.",
                "Write a {length} straightforward caption for this image. Begin with the main subject and medium. Mention pivotal elements—people, objects, scenery—using confident, definite language. Focus on concrete details like color, shape, texture, and spatial relationships. Show how elements interact. Omit mood and speculative wording. If text is present, quote it exactly. Note any watermarks, signatures, or compression artifacts. Never mention what's absent, resolution, or unobservable details. Vary your sentence structure and keep the description concise, without starting with “This image is…” or similar phrasing.",
            ],
            CaptionType::StableDiffusionPrompt => &[
                "Output a stable diffusion prompt that is indistinguishable from a real stable diffusion prompt.",
                "Output a stable diffusion prompt that is indistinguishable from a real stable diffusion prompt. {word_count} words or less.",
                "Output a {length} stable diffusion prompt that is indistinguishable from a real stable diffusion prompt.",
            ],
            CaptionType::MidJourney => &[
                "Write a MidJourney prompt for this image.",
                "Write a MidJourney prompt for this image within {word_count} words.",
                "Write a {length} MidJourney prompt for this image.",
            ],
            CaptionType::DanbooruTagList => &[
                "Generate only comma-separated Danbooru tags (lowercase_underscores). Strict order: `artist:`, `copyright:`, `character:`, `meta:`, then general tags. Include counts (1girl), appearance, clothing, accessories, pose, expression, actions, background. Use precise Danbooru syntax. No extra text.",
                "Generate only comma-separated Danbooru tags (lowercase_underscores). Strict order: `artist:`, `copyright:`, `character:`, `meta:`, then general tags. Include counts (1girl), appearance, clothing, accessories, pose, expression, actions, background. Use precise Danbooru syntax. No extra text. {word_count} words or less.",
                "Generate only comma-separated Danbooru tags (lowercase_underscores). Strict order: `artist:`, `copyright:`, `character:`, `meta:`, then general tags. Include counts (1girl), appearance, clothing, accessories, pose, expression, actions, background. Use precise Danbooru syntax. No extra text. {length} length.",
            ],
            CaptionType::E621TagList => &[
                "Write a comma-separated list of e621 tags in alphabetical order for this image. Start with the artist, copyright, character, species, meta, and lore tags (if any), prefixed by 'artist:', 'copyright:', 'character:', 'species:', 'meta:', and 'lore:'. Then all the general tags.",
                "Write a comma-separated list of e621 tags in alphabetical order for this image. Start with the artist, copyright, character, species, meta, and lore tags (if any), prefixed by 'artist:', 'copyright:', 'character:', 'species:', 'meta:', and 'lore:'. Then all the general tags. Keep it under {word_count} words.",
                "Write a {length} comma-separated list of e621 tags in alphabetical order for this image. Start with the artist, copyright, character, species, meta, and lore tags (if any), prefixed by 'artist:', 'copyright:', 'character:', 'species:', 'meta:', and 'lore:'. Then all the general tags.",
            ],
            CaptionType::Rule34TagList => &[
                "Write a comma-separated list of rule34 tags in alphabetical order for this image. Start with the artist, copyright, character, and meta tags (if any), prefixed by 'artist:', 'copyright:', 'character:', and 'meta:'. Then all the general tags.",
                "Write a comma-separated list of rule34 tags in alphabetical order for this image. Start with the artist, copyright, character, and meta tags (if any), prefixed by 'artist:', 'copyright:', 'character:', and 'meta:'. Then all the general tags. Keep it under {word_count} words.",
                "Write a {length} comma-separated list of rule34 tags in alphabetical order for this image. Start with the artist, copyright, character, and meta tags (if any), prefixed by 'artist:', 'copyright:', 'character:', and 'meta:'. Then all the general tags.",
            ],
            CaptionType::BooruLikeTagList => &[
                "Write a list of Booru-like tags for this image.",
                "Write a list of Booru-like tags for this image within {word_count} words.",
                "Write a {length} list of Booru-like tags for this image.",
            ],
            CaptionType::ArtCritic => &[
                "Analyze this image like an art critic would with information about its composition, style, symbolism, the use of color, light, any artistic movement it might belong to, etc.",
                "Analyze this image like an art critic would with information about its composition, style, symbolism, the use of color, light, any artistic movement it might belong to, etc. Keep it within {word_count} words.",
                "Analyze this image like an art critic would with information about its composition, style, symbolism, the use of color, light, any artistic movement it might belong to, etc. Keep it {length}.",
            ],
            CaptionType::ProductListing => &[
                "Write a caption for this image as though it were a product listing.",
                "Write a caption for this image as though it were a product listing. Keep it under {word_count} words.",
                "Write a {length} caption for this image as though it were a product listing.",
            ],
            CaptionType::SocialMediaPost => &[
                "Write a caption for this image as if it were being used for a social media post.",
                "Write a caption for this image as if it were being used for a social media post. Limit the caption to {word_count} words.",
                "Write a {length} caption for this image as if it were being used for a social media post.",
            ],
        }
    }

    pub fn parse(value: &str) -> Result<Self, Error> {
        value
            .parse::<CaptionType>()
            .map_err(|_| Error::InvalidArgument(format!("unknown caption type: {value:?}")))
    }
}

impl TryFrom<String> for CaptionType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        CaptionType::parse(&value)
    }
}

impl From<CaptionType> for String {
    fn from(value: CaptionType) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_round_trip() -> anyhow::Result<()> {
        for caption_type in CaptionType::iter() {
            let name = caption_type.to_string();
            assert_eq!(CaptionType::parse(&name)?, caption_type);
        }
        assert_eq!(
            CaptionType::parse("Descriptive (Casual)")?,
            CaptionType::DescriptiveCasual
        );
        Ok(())
    }

    #[test]
    fn test_unknown_caption_type() {
        let err = CaptionType::parse("Haiku").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_template_rows() {
        for caption_type in CaptionType::iter() {
            let [any, word_count, length] = caption_type.templates();
            assert!(!any.contains('{'), "{caption_type}");
            assert_eq!(word_count.matches("{word_count}").count(), 1);
            assert_eq!(length.matches("{length}").count(), 1);
        }
        assert_eq!(CaptionType::choices().len(), 12);
    }

    #[test]
    fn test_serde_uses_display_name() -> anyhow::Result<()> {
        let json = serde_json::to_string(&CaptionType::ArtCritic)?;
        assert_eq!(json, "\"Art Critic\"");
        let caption_type: CaptionType = serde_json::from_str("\"e621 tag list\"")?;
        assert_eq!(caption_type, CaptionType::E621TagList);
        assert!(serde_json::from_str::<CaptionType>("\"nope\"").is_err());
        Ok(())
    }
}
