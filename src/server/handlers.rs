use std::{convert::Infallible, path::PathBuf};

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::{
    core::utils::decode_base64_image,
    error::{Error, ErrorCategory},
    joycaption::{
        batch::{run_batch, BatchRequest, FailurePolicy},
        caption_length::CaptionLength,
        caption_type::CaptionType,
        extra_options::{requires_name, ExtraOption, ExtraOptionEntry, NAME_OPTION},
        generation::{GenerationParams, MAX_NEW_TOKENS_RANGE, TEMPERATURE_RANGE, TOP_P_RANGE},
        prompt_builder::PromptRequest,
        stream::{stream_caption, StreamOptions},
    },
};

use super::AppState;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// 错误响应, 输入错误返回 400
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError(Error::InvalidArgument(e.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.category() {
            ErrorCategory::Input => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("request failed, {}", self.0);
        }
        (status, [(header::CONTENT_TYPE, TEXT_PLAIN)], self.0.to_string()).into_response()
    }
}

pub async fn index() -> Html<&'static str> {
    Html(include_str!("page.html"))
}

#[derive(Debug, Serialize)]
pub struct Bounds<T> {
    pub min: T,
    pub max: T,
}

#[derive(Debug, Serialize)]
pub struct OptionsResponse {
    pub caption_types: Vec<String>,
    pub caption_lengths: Vec<String>,
    pub extra_options: Vec<ExtraOptionEntry>,
    pub name_option: &'static str,
    pub default_caption_type: String,
    pub default_caption_length: String,
    pub default_params: GenerationParams,
    pub temperature: Bounds<f64>,
    pub top_p: Bounds<f64>,
    pub max_new_tokens: Bounds<usize>,
}

pub async fn options() -> Json<OptionsResponse> {
    Json(OptionsResponse {
        caption_types: CaptionType::choices(),
        caption_lengths: CaptionLength::choices(),
        extra_options: ExtraOption::catalog(),
        name_option: NAME_OPTION,
        default_caption_type: CaptionType::default().to_string(),
        default_caption_length: CaptionLength::default().to_string(),
        default_params: GenerationParams::default(),
        temperature: Bounds {
            min: TEMPERATURE_RANGE.0,
            max: TEMPERATURE_RANGE.1,
        },
        top_p: Bounds {
            min: TOP_P_RANGE.0,
            max: TOP_P_RANGE.1,
        },
        max_new_tokens: Bounds {
            min: MAX_NEW_TOKENS_RANGE.0,
            max: MAX_NEW_TOKENS_RANGE.1,
        },
    })
}

#[derive(Debug, Serialize)]
pub struct PromptResponse {
    pub prompt: String,
    pub name_required: bool,
}

pub async fn prompt(
    payload: Result<Json<PromptRequest>, JsonRejection>,
) -> Result<Json<PromptResponse>, ApiError> {
    let Json(request) = payload?;
    Ok(Json(PromptResponse {
        prompt: request.build(),
        name_required: requires_name(&request.extra_options),
    }))
}

#[derive(Debug, Deserialize)]
pub struct CaptionRequest {
    /// base64 或 data URL
    #[serde(default)]
    pub image: Option<String>,
    pub prompt: String,
    #[serde(flatten)]
    pub params: GenerationParams,
}

fn text_stream<S>(stream: S) -> Response
where
    S: futures::Stream<Item = Result<String, Infallible>> + Send + 'static,
{
    ([(header::CONTENT_TYPE, TEXT_PLAIN)], Body::from_stream(stream)).into_response()
}

/// 单图流式打标, 错误作为最后一段文本输出
pub async fn caption(
    State(state): State<AppState>,
    payload: Result<Json<CaptionRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    let image = request
        .image
        .as_deref()
        .filter(|data| !data.trim().is_empty())
        .map(decode_base64_image)
        .transpose()?;

    let options = StreamOptions::default().with_timeout(state.stream_timeout);
    let stream = stream_caption(&state.model, image, &request.prompt, request.params, options)
        .into_stream()
        .map(|item| match item {
            Ok(text) => Ok(text),
            Err(e) => {
                warn!("caption stream ended with error, {e}");
                Ok(format!("\n[error] {e}"))
            }
        });
    Ok(text_stream(stream))
}

#[derive(Debug, Deserialize)]
pub struct BatchApiRequest {
    pub input_dir: PathBuf,
    #[serde(flatten)]
    pub prompt: PromptRequest,
    #[serde(flatten)]
    pub params: GenerationParams,
    /// 单张失败后继续
    #[serde(default)]
    pub continue_on_error: bool,
}

impl From<BatchApiRequest> for BatchRequest {
    fn from(request: BatchApiRequest) -> Self {
        let policy = if request.continue_on_error {
            FailurePolicy::Skip
        } else {
            FailurePolicy::Abort
        };
        BatchRequest::new(request.input_dir, request.prompt)
            .with_params(request.params)
            .with_failure_policy(policy)
    }
}

/// 批量打标, 每行一条状态
pub async fn batch(
    State(state): State<AppState>,
    payload: Result<Json<BatchApiRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    let request = BatchRequest::from(request);
    request.params.validate()?;
    info!("batch request for {}", request.input_dir.display());

    let (tx, rx) = mpsc::channel::<String>(16);
    let model = state.model.clone();
    tokio::task::spawn_blocking(move || {
        let run = match run_batch(&model, &request) {
            Ok(run) => run,
            Err(e) => {
                let _ = tx.blocking_send(format!("[error] {e}\n"));
                return;
            }
        };
        for status in run {
            let line = match status {
                Ok(status) => format!("{status}\n"),
                Err(e) => format!("[error] {e}\n"),
            };
            // 客户端断开后停止
            if tx.blocking_send(line).is_err() {
                warn!("batch client disconnected");
                return;
            }
        }
    });

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|line| (Ok(line), rx))
    });
    Ok(text_stream(stream))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use axum::{body::to_bytes, http::Request, Router};
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use image::{ImageFormat, RgbImage};
    use rand::RngCore;
    use tower::ServiceExt;

    use crate::{
        joycaption::{
            predictor::{tests::EchoModel, SharedModel},
            prompt_builder::build_prompt,
            stream::NO_IMAGE_MESSAGE,
        },
        server::{router, AppState},
    };

    fn app() -> Router {
        router(AppState::new(SharedModel::new(EchoModel::new(
            " A cat on a mat. ",
        ))))
    }

    async fn post_json(app: Router, uri: &str, body: &str) -> anyhow::Result<(u16, String)> {
        let request = Request::post(uri)
            .header("content-type", "application/json")
            .body(axum::body::Body::from(body.to_string()))?;
        let response = app.oneshot(request).await?;
        let status = response.status().as_u16();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        Ok((status, String::from_utf8(bytes.to_vec())?))
    }

    #[tokio::test]
    async fn test_options() -> anyhow::Result<()> {
        let request = Request::get("/api/options").body(axum::body::Body::empty())?;
        let response = app().oneshot(request).await?;
        assert_eq!(response.status().as_u16(), 200);

        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let value: serde_json::Value = serde_json::from_slice(&bytes)?;
        assert_eq!(value["caption_types"].as_array().map(Vec::len), Some(12));
        assert_eq!(value["caption_lengths"].as_array().map(Vec::len), Some(31));
        assert_eq!(value["extra_options"].as_array().map(Vec::len), Some(27));
        assert_eq!(value["default_caption_type"], "Descriptive");
        Ok(())
    }

    #[tokio::test]
    async fn test_prompt_matches_builder() -> anyhow::Result<()> {
        let body = serde_json::json!({
            "caption_type": "Straightforward",
            "caption_length": "medium-length",
            "extra_options": [crate::joycaption::extra_options::NAME_OPTION],
            "name": "Alice",
        });
        let (status, text) = post_json(app(), "/api/prompt", &body.to_string()).await?;
        assert_eq!(status, 200);

        let value: serde_json::Value = serde_json::from_str(&text)?;
        let expected = build_prompt(
            "Straightforward",
            "medium-length",
            &[crate::joycaption::extra_options::NAME_OPTION],
            Some("Alice"),
        )?;
        assert_eq!(value["prompt"], expected);
        assert_eq!(value["name_required"], true);
        Ok(())
    }

    #[tokio::test]
    async fn test_prompt_unknown_style() -> anyhow::Result<()> {
        let body = r#"{"caption_type": "Limerick", "caption_length": "long"}"#;
        let (status, _) = post_json(app(), "/api/prompt", body).await?;
        assert_eq!(status, 400);
        Ok(())
    }

    #[tokio::test]
    async fn test_caption_without_image() -> anyhow::Result<()> {
        let body = r#"{"prompt": "Write a caption."}"#;
        let (status, text) = post_json(app(), "/api/caption", body).await?;
        assert_eq!(status, 200);
        assert_eq!(text, NO_IMAGE_MESSAGE);
        Ok(())
    }

    #[tokio::test]
    async fn test_caption_streams_text() -> anyhow::Result<()> {
        let mut png = Vec::new();
        RgbImage::new(4, 4).write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
        let body = serde_json::json!({
            "image": format!("data:image/png;base64,{}", STANDARD.encode(&png)),
            "prompt": "Write a caption.",
            "temperature": 0.0,
        });
        let (status, text) = post_json(app(), "/api/caption", &body.to_string()).await?;
        assert_eq!(status, 200);
        assert_eq!(text, "A cat on a mat.");
        Ok(())
    }

    #[tokio::test]
    async fn test_caption_large_upload() -> anyhow::Result<()> {
        // 随机像素几乎无法压缩, PNG 约 3 MB
        let mut pixels = vec![0u8; 1000 * 1000 * 3];
        rand::rng().fill_bytes(&mut pixels);
        let image = RgbImage::from_raw(1000, 1000, pixels)
            .ok_or_else(|| anyhow::anyhow!("bad pixel buffer"))?;
        let mut png = Vec::new();
        image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

        let body = serde_json::json!({
            "image": format!("data:image/png;base64,{}", STANDARD.encode(&png)),
            "prompt": "Write a caption.",
            "temperature": 0.0,
        })
        .to_string();
        assert!(body.len() > 2 * 1024 * 1024);

        let (status, text) = post_json(app(), "/api/caption", &body).await?;
        assert_eq!(status, 200, "{text}");
        assert_eq!(text, "A cat on a mat.");
        Ok(())
    }

    #[tokio::test]
    async fn test_caption_bad_image() -> anyhow::Result<()> {
        let body = r#"{"image": "not base64!", "prompt": "Write a caption."}"#;
        let (status, _) = post_json(app(), "/api/caption", body).await?;
        assert_eq!(status, 400);
        Ok(())
    }

    #[tokio::test]
    async fn test_caption_blank_number_fields() -> anyhow::Result<()> {
        let mut png = Vec::new();
        RgbImage::new(4, 4).write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
        let image = format!("data:image/png;base64,{}", STANDARD.encode(&png));

        // NaN 经 JSON.stringify 变成 null, 服务端拒绝
        let body = serde_json::json!({
            "image": image,
            "prompt": "Write a caption.",
            "temperature": null,
        });
        let (status, _) = post_json(app(), "/api/caption", &body.to_string()).await?;
        assert_eq!(status, 400);

        // 页面改用 /api/options 给出的默认值
        let request = Request::get("/").body(axum::body::Body::empty())?;
        let bytes = to_bytes(app().oneshot(request).await?.into_body(), usize::MAX).await?;
        let page = String::from_utf8(bytes.to_vec())?;
        assert!(page.contains("Number.isFinite"));
        assert!(page.contains("defaults = options.default_params"));

        let request = Request::get("/api/options").body(axum::body::Body::empty())?;
        let bytes = to_bytes(app().oneshot(request).await?.into_body(), usize::MAX).await?;
        let options: serde_json::Value = serde_json::from_slice(&bytes)?;
        let defaults = &options["default_params"];
        let body = serde_json::json!({
            "image": image,
            "prompt": "Write a caption.",
            "temperature": defaults["temperature"],
            "top_p": defaults["top_p"],
            "max_new_tokens": defaults["max_new_tokens"],
        });
        let (status, text) = post_json(app(), "/api/caption", &body.to_string()).await?;
        assert_eq!(status, 200, "{text}");
        assert_eq!(text, "A cat on a mat.");
        Ok(())
    }

    #[tokio::test]
    async fn test_batch_empty_folder() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let body = serde_json::json!({
            "input_dir": dir.path(),
            "caption_type": "Descriptive",
            "caption_length": "long",
        });
        let (status, text) = post_json(app(), "/api/batch", &body.to_string()).await?;
        assert_eq!(status, 200);
        assert_eq!(text, "No images found.\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_batch_writes_captions() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        RgbImage::new(4, 4).save(dir.path().join("a.png"))?;
        RgbImage::new(4, 4).save(dir.path().join("b.png"))?;
        let body = serde_json::json!({
            "input_dir": dir.path(),
            "temperature": 0.0,
        });
        let (status, text) = post_json(app(), "/api/batch", &body.to_string()).await?;
        assert_eq!(status, 200);

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("1/2 done"));
        assert!(lines[2].starts_with("Finished 2 images"));

        let caption = std::fs::read_to_string(dir.path().join("_joycaption_output").join("a.txt"))?;
        assert_eq!(caption, "A cat on a mat.");
        Ok(())
    }
}
