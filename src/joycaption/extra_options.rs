//! JoyCaption Extra Options
//!
//! 额外选项目录, 勾选后按顺序追加到模板之后

use serde::Serialize;
use strum::IntoEnumIterator;
use strum_macros::{EnumIter, EnumString, IntoStaticStr};

/// 唯一带有 `{name}` 占位符的选项
pub const NAME_OPTION: &str =
    "If there is a person/character in the image you must refer to them as {name}.";

/// 未填写人物名称时的占位符
pub const NAME_PLACEHOLDER: &str = "{NAME}";

/// 额外选项, key 为 snake_case 名称
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, IntoStaticStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum ExtraOption {
    ReferCharacterName,
    ExcludePeopleInfo,
    IncludeLighting,
    IncludeCameraAngle,
    IncludeWatermarkInfo,
    #[strum(serialize = "include_JPEG_artifacts")]
    IncludeJpegArtifacts,
    IncludeExif,
    ExcludeSexual,
    ExcludeImageResolution,
    IncludeAestheticQuality,
    IncludeCompositionStyle,
    ExcludeText,
    SpecifyDepthField,
    SpecifyLightingSources,
    DoNotUseAmbiguousLanguage,
    IncludeNsfwRating,
    OnlyDescribeMostImportantElements,
    DoNotIncludeArtistNameOrTitle,
    IdentifyImageOrientation,
    UseVulgarSlangAndProfanity,
    DoNotUsePoliteEuphemisms,
    IncludeCharacterAge,
    IncludeCameraShotType,
    ExcludeMoodFeeling,
    IncludeCameraVantageHeight,
    MentionWatermarkExplicitly,
    AvoidMetaDescriptivePhrases,
}

impl ExtraOption {
    pub fn key(&self) -> &'static str {
        self.into()
    }

    /// 选项原文
    pub fn text(&self) -> &'static str {
        match self {
            ExtraOption::ReferCharacterName => NAME_OPTION,
            ExtraOption::ExcludePeopleInfo => "Do NOT include information about people/characters that cannot be changed (like ethnicity, gender, etc), but do still include changeable attributes (like hair style).",
            ExtraOption::IncludeLighting => "Include information about lighting.",
            ExtraOption::IncludeCameraAngle => "Include information about camera angle.",
            ExtraOption::IncludeWatermarkInfo => "Include information about whether there is a watermark or not.",
            ExtraOption::IncludeJpegArtifacts => "Include information about whether there are JPEG artifacts or not.",
            ExtraOption::IncludeExif => "If it is a photo you MUST include information about what camera was likely used and details such as aperture, shutter speed, ISO, etc.",
            ExtraOption::ExcludeSexual => "Do NOT include anything sexual; keep it PG.",
            ExtraOption::ExcludeImageResolution => "Do NOT mention the image's resolution.",
            ExtraOption::IncludeAestheticQuality => "You MUST include information about the subjective aesthetic quality of the image from low to very high.",
            ExtraOption::IncludeCompositionStyle => "Include information on the image's composition style, such as leading lines, rule of thirds, or symmetry.",
            ExtraOption::ExcludeText => "Do NOT mention any text that is in the image.",
            ExtraOption::SpecifyDepthField => "Specify the depth of field and whether the background is in focus or blurred.",
            ExtraOption::SpecifyLightingSources => "If applicable, mention the likely use of artificial or natural lighting sources.",
            ExtraOption::DoNotUseAmbiguousLanguage => "Do NOT use any ambiguous language.",
            ExtraOption::IncludeNsfwRating => "Include whether the image is sfw, suggestive, or nsfw.",
            ExtraOption::OnlyDescribeMostImportantElements => "ONLY describe the most important elements of the image.",
            ExtraOption::DoNotIncludeArtistNameOrTitle => "If it is a work of art, do not include the artist's name or the title of the work.",
            ExtraOption::IdentifyImageOrientation => "Identify the image orientation (portrait, landscape, or square) and aspect ratio if obvious.",
            ExtraOption::UseVulgarSlangAndProfanity => r#"Use vulgar slang and profanity, such as (but not limited to) "fucking," "slut," "cock," etc."#,
            ExtraOption::DoNotUsePoliteEuphemisms => "Do NOT use polite euphemisms—lean into blunt, casual phrasing.",
            ExtraOption::IncludeCharacterAge => "Include information about the ages of any people/characters when applicable.",
            ExtraOption::IncludeCameraShotType => "Mention whether the image depicts an extreme close-up, close-up, medium close-up, medium shot, cowboy shot, medium wide shot, wide shot, or extreme wide shot.",
            ExtraOption::ExcludeMoodFeeling => "Do not mention the mood/feeling/etc of the image.",
            ExtraOption::IncludeCameraVantageHeight => "Explicitly specify the vantage height (eye-level, low-angle worm’s-eye, bird’s-eye, drone, rooftop, etc.).",
            ExtraOption::MentionWatermarkExplicitly => "If there is a watermark, you must mention it.",
            ExtraOption::AvoidMetaDescriptivePhrases => r#"Your response will be used by a text-to-image model, so avoid useless meta phrases like “This image shows…”, "You are looking at...", etc."#,
        }
    }

    /// 全部选项, 顺序即界面顺序
    pub fn catalog() -> Vec<ExtraOptionEntry> {
        Self::iter()
            .map(|o| ExtraOptionEntry {
                key: o.key(),
                text: o.text(),
            })
            .collect()
    }
}

/// 前端展示用
#[derive(Debug, Clone, Serialize)]
pub struct ExtraOptionEntry {
    pub key: &'static str,
    pub text: &'static str,
}

/// 是否需要填写人物名称
pub fn requires_name<S: AsRef<str>>(extra_options: &[S]) -> bool {
    extra_options.iter().any(|o| o.as_ref() == NAME_OPTION)
}
