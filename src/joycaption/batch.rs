//! 文件夹批量打标
//!
//! 逐个处理目录下的图片, 每张图片写一个同名 `.txt`, 并输出进度状态

use std::{
    fmt, fs,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    core::utils::load_rgb_image,
    error::Error,
    joycaption::{
        generation::GenerationParams, predictor::caption_once, predictor::SharedModel,
        prompt_builder::PromptRequest,
    },
    utils::{estimate_remaining, seconds_to_hms, seconds_to_ms, ImageScanner},
};

/// 输出目录名, 位于输入目录下
pub const OUTPUT_DIR_NAME: &str = "_joycaption_output";

/// 单个文件失败时的处理方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// 返回错误并结束整个批次
    #[default]
    Abort,
    /// 记录失败状态后继续下一张
    Skip,
}

#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub input_dir: PathBuf,
    pub prompt: PromptRequest,
    pub params: GenerationParams,
    pub failure_policy: FailurePolicy,
}

impl BatchRequest {
    pub fn new(input_dir: impl Into<PathBuf>, prompt: PromptRequest) -> Self {
        Self {
            input_dir: input_dir.into(),
            prompt,
            params: GenerationParams::default(),
            failure_policy: FailurePolicy::default(),
        }
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }
}

/// 批处理状态
#[derive(Debug, Clone, PartialEq)]
pub enum BatchStatus {
    NoImages,
    Progress {
        done: usize,
        total: usize,
        eta: Duration,
    },
    Failed {
        done: usize,
        total: usize,
        path: PathBuf,
        reason: String,
    },
    Finished {
        captioned: usize,
        failed: usize,
        output_dir: PathBuf,
        elapsed: Duration,
    },
}

impl BatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::NoImages | BatchStatus::Finished { .. })
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchStatus::NoImages => f.write_str("No images found."),
            BatchStatus::Progress { done, total, eta } => {
                write!(f, "{done}/{total} done - ETA {}", seconds_to_ms(*eta))
            }
            BatchStatus::Failed {
                done,
                total,
                path,
                reason,
            } => write!(f, "{done}/{total} failed - {}: {reason}", path.display()),
            BatchStatus::Finished {
                captioned,
                failed,
                output_dir,
                elapsed,
            } => {
                write!(f, "Finished {captioned} images")?;
                if *failed > 0 {
                    write!(f, " ({failed} failed)")?;
                }
                write!(
                    f,
                    " in {} -> {}",
                    seconds_to_hms(*elapsed),
                    output_dir.display()
                )
            }
        }
    }
}

/// 批处理任务, 按需逐张处理
pub struct BatchRun {
    model: SharedModel,
    files: std::vec::IntoIter<PathBuf>,
    total: usize,
    done: usize,
    captioned: usize,
    failed: usize,
    output_dir: PathBuf,
    prompt: String,
    params: GenerationParams,
    failure_policy: FailurePolicy,
    started: Instant,
    finished: bool,
}

/// 创建批处理任务
///
/// 没有图片时不会创建输出目录.
pub fn run_batch(model: &SharedModel, request: &BatchRequest) -> Result<BatchRun, Error> {
    request.params.validate()?;

    let files = ImageScanner::default().scan(&request.input_dir)?;
    let output_dir = request.input_dir.join(OUTPUT_DIR_NAME);
    if !files.is_empty() {
        fs::create_dir_all(&output_dir)?;
    }
    info!(
        "batch caption, {} images in {}",
        files.len(),
        request.input_dir.display()
    );

    Ok(BatchRun {
        model: model.clone(),
        total: files.len(),
        files: files.into_iter(),
        done: 0,
        captioned: 0,
        failed: 0,
        output_dir,
        prompt: request.prompt.build(),
        params: request.params,
        failure_policy: request.failure_policy,
        started: Instant::now(),
        finished: false,
    })
}

impl BatchRun {
    /// 输出文件路径: <output_dir>/<stem>.txt
    pub fn caption_path(&self, image_path: &Path) -> PathBuf {
        let mut name = image_path
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_default();
        name.push(".txt");
        self.output_dir.join(name)
    }

    fn caption_file(&self, path: &Path) -> Result<(), Error> {
        let image = load_rgb_image(path)?;
        let caption = caption_once(&self.model, &image, &self.prompt, &self.params)?;
        fs::write(self.caption_path(path), caption)?;
        Ok(())
    }
}

impl Iterator for BatchRun {
    type Item = Result<BatchStatus, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.total == 0 {
            self.finished = true;
            return Some(Ok(BatchStatus::NoImages));
        }

        let Some(path) = self.files.next() else {
            self.finished = true;
            let status = BatchStatus::Finished {
                captioned: self.captioned,
                failed: self.failed,
                output_dir: self.output_dir.clone(),
                elapsed: self.started.elapsed(),
            };
            info!("{status}");
            return Some(Ok(status));
        };

        self.done += 1;
        let result = self.caption_file(&path);
        let eta = estimate_remaining(self.started.elapsed(), self.done, self.total);

        match result {
            Ok(()) => {
                self.captioned += 1;
                Some(Ok(BatchStatus::Progress {
                    done: self.done,
                    total: self.total,
                    eta,
                }))
            }
            Err(e) => match self.failure_policy {
                FailurePolicy::Abort => {
                    error!("batch aborted, {}: {e}", path.display());
                    self.finished = true;
                    Some(Err(e.for_file(path)))
                }
                FailurePolicy::Skip => {
                    warn!("skip {}: {e}", path.display());
                    self.failed += 1;
                    Some(Ok(BatchStatus::Failed {
                        done: self.done,
                        total: self.total,
                        path,
                        reason: e.to_string(),
                    }))
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;
    use crate::{
        error::ErrorCategory,
        joycaption::{
            caption_length::CaptionLength, caption_type::CaptionType,
            predictor::tests::EchoModel,
        },
    };

    fn write_png(dir: &Path, name: &str) -> anyhow::Result<()> {
        RgbImage::from_pixel(4, 4, Rgb([10, 20, 30])).save(dir.join(name))?;
        Ok(())
    }

    fn request(dir: &Path) -> BatchRequest {
        let prompt = PromptRequest::new(CaptionType::Descriptive, CaptionLength::Any);
        BatchRequest::new(dir, prompt).with_params(GenerationParams::greedy(64))
    }

    fn read(path: PathBuf) -> anyhow::Result<String> {
        Ok(fs::read_to_string(path)?)
    }

    #[test]
    fn test_no_images() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("readme.txt"), "x")?;
        let model = SharedModel::new(EchoModel::new("a caption"));

        let statuses = run_batch(&model, &request(dir.path()))?.collect::<Result<Vec<_>, _>>()?;
        assert_eq!(statuses, vec![BatchStatus::NoImages]);
        assert!(statuses[0].to_string().contains("No images"));
        assert!(!dir.path().join(OUTPUT_DIR_NAME).exists());
        Ok(())
    }

    #[test]
    fn test_batch_writes_captions() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        for name in ["b.png", "a.PNG", "c.jpg"] {
            write_png(dir.path(), name)?;
        }
        let model = SharedModel::new(EchoModel::new(" a small square "));

        let statuses = run_batch(&model, &request(dir.path()))?.collect::<Result<Vec<_>, _>>()?;
        assert_eq!(statuses.len(), 4);
        for (i, status) in statuses[..3].iter().enumerate() {
            assert!(
                matches!(status, BatchStatus::Progress { done, total: 3, .. } if *done == i + 1)
            );
            assert!(status.to_string().starts_with(&format!("{}/3 done - ETA ", i + 1)));
        }
        assert!(matches!(
            statuses[3],
            BatchStatus::Finished { captioned: 3, failed: 0, .. }
        ));
        assert!(statuses[3].to_string().starts_with("Finished 3 images in "));

        let output_dir = dir.path().join(OUTPUT_DIR_NAME);
        let mut names: Vec<_> = fs::read_dir(&output_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);
        assert_eq!(read(output_dir.join("a.txt"))?, "a small square");
        Ok(())
    }

    #[test]
    fn test_rerun_overwrites() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        write_png(dir.path(), "only.webp.png")?;

        let first = SharedModel::new(EchoModel::new("first caption"));
        run_batch(&first, &request(dir.path()))?.collect::<Result<Vec<_>, _>>()?;
        let second = SharedModel::new(EchoModel::new("second"));
        let statuses = run_batch(&second, &request(dir.path()))?.collect::<Result<Vec<_>, _>>()?;
        assert_eq!(statuses.len(), 2);

        let output_dir = dir.path().join(OUTPUT_DIR_NAME);
        assert_eq!(fs::read_dir(&output_dir)?.count(), 1);
        assert_eq!(read(output_dir.join("only.webp.txt"))?, "second");
        Ok(())
    }

    #[test]
    fn test_abort_on_bad_image() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        write_png(dir.path(), "a.png")?;
        fs::write(dir.path().join("bad.png"), b"not an image")?;
        write_png(dir.path(), "c.png")?;
        let model = SharedModel::new(EchoModel::new("caption"));

        let mut run = run_batch(&model, &request(dir.path()))?;
        assert!(matches!(run.next(), Some(Ok(BatchStatus::Progress { done: 1, .. }))));
        let err = run.next().and_then(Result::err);
        match err {
            Some(err @ Error::BatchItem { .. }) => {
                assert_eq!(err.category(), ErrorCategory::Io);
                assert!(err.to_string().contains("bad.png"));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(run.next().is_none());
        assert!(!dir.path().join(OUTPUT_DIR_NAME).join("c.txt").exists());
        Ok(())
    }

    #[test]
    fn test_skip_bad_image() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        write_png(dir.path(), "a.png")?;
        fs::write(dir.path().join("bad.png"), b"not an image")?;
        write_png(dir.path(), "c.png")?;
        let model = SharedModel::new(EchoModel::new("caption"));

        let request = request(dir.path()).with_failure_policy(FailurePolicy::Skip);
        let statuses = run_batch(&model, &request)?.collect::<Result<Vec<_>, _>>()?;
        assert_eq!(statuses.len(), 4);
        assert!(matches!(&statuses[1], BatchStatus::Failed { done: 2, path, .. } if path.ends_with("bad.png")));
        assert!(matches!(
            statuses[3],
            BatchStatus::Finished { captioned: 2, failed: 1, .. }
        ));
        assert!(statuses[3].to_string().contains("(1 failed)"));
        assert!(dir.path().join(OUTPUT_DIR_NAME).join("c.txt").exists());
        Ok(())
    }

    #[test]
    fn test_status_text() {
        let status = BatchStatus::Progress {
            done: 2,
            total: 5,
            eta: Duration::from_secs(95),
        };
        assert_eq!(status.to_string(), "2/5 done - ETA 01:35");
        assert!(!status.is_terminal());
        assert!(BatchStatus::NoImages.is_terminal());
    }
}
