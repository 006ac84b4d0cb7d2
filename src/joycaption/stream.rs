//! 流式打标
//!
//! 生成在独立线程中执行, 文本片段通过 channel 交给调用方.
//! 排队等待模型与生成过程分别计时, 超时后取消生成并返回错误.

use std::{ops::ControlFlow, thread, time::Duration};

use futures::Stream;
use image::RgbImage;
use log::{error, warn};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;

use crate::{
    error::Error,
    joycaption::{
        generation::GenerationParams,
        predictor::{ChatPrompt, SharedModel},
    },
};

pub const NO_IMAGE_MESSAGE: &str = "No image provided. Please upload an image.";

/// 等待下一个片段的默认超时
pub const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_secs(10);

/// 等待其他调用释放模型的默认超时
pub const DEFAULT_QUEUE_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// 生成开始后, 两次输出之间的最长间隔
    pub timeout: Duration,
    /// 模型被占用时的最长排队时间
    pub queue_timeout: Duration,
    pub cancel: CancellationToken,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_STREAM_TIMEOUT,
            queue_timeout: DEFAULT_QUEUE_TIMEOUT,
            cancel: CancellationToken::new(),
        }
    }
}

impl StreamOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_queue_timeout(mut self, queue_timeout: Duration) -> Self {
        self.queue_timeout = queue_timeout;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

enum StreamEvent {
    /// 已获得模型
    Started,
    Chunk(String),
    Done,
    Failed(Error),
}

/// 流式输出, 有限且不可重放
pub struct CaptionStream {
    rx: Option<UnboundedReceiver<StreamEvent>>,
    timeout: Duration,
    queue_timeout: Duration,
    started: bool,
    cancel: CancellationToken,
}

impl CaptionStream {
    /// 下一个文本片段, `None` 表示结束
    pub async fn next_chunk(&mut self) -> Option<Result<String, Error>> {
        loop {
            let limit = if self.started {
                self.timeout
            } else {
                self.queue_timeout
            };
            let rx = self.rx.as_mut()?;

            let event = match tokio::time::timeout(limit, rx.recv()).await {
                Ok(Some(event)) => event,
                Ok(None) => StreamEvent::Failed(Error::Inference(
                    "generation worker exited unexpectedly".to_string(),
                )),
                Err(_) => {
                    warn!("no output within {limit:?}, cancelling generation");
                    self.cancel.cancel();
                    StreamEvent::Failed(Error::GenerationTimeout {
                        duration_ms: limit.as_millis() as u64,
                    })
                }
            };

            if let Some(item) = self.accept(event) {
                return item;
            }
        }
    }

    /// `None` 表示继续等待
    fn accept(&mut self, event: StreamEvent) -> Option<Option<Result<String, Error>>> {
        match event {
            StreamEvent::Started => {
                self.started = true;
                None
            }
            StreamEvent::Chunk(text) => Some(Some(Ok(text))),
            StreamEvent::Done => {
                self.rx = None;
                Some(None)
            }
            StreamEvent::Failed(e) => {
                self.rx = None;
                Some(Some(Err(e)))
            }
        }
    }

    /// 拼接全部片段
    pub async fn collect_text(mut self) -> Result<String, Error> {
        let mut text = String::new();
        while let Some(chunk) = self.next_chunk().await {
            text.push_str(&chunk?);
        }
        Ok(text)
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<String, Error>> + Send {
        futures::stream::unfold(self, |mut stream| async move {
            stream.next_chunk().await.map(|item| (item, stream))
        })
    }
}

impl Drop for CaptionStream {
    fn drop(&mut self) {
        // 调用方不再读取时停止生成
        if self.rx.is_some() {
            self.cancel.cancel();
        }
    }
}

/// 流式打标
///
/// 未提供图片时只输出一条提示信息.
pub fn stream_caption(
    model: &SharedModel,
    image: Option<RgbImage>,
    prompt: &str,
    params: GenerationParams,
    options: StreamOptions,
) -> CaptionStream {
    let (tx, rx) = unbounded_channel();
    let cancel = options.cancel.child_token();
    let stream = CaptionStream {
        rx: Some(rx),
        timeout: options.timeout,
        queue_timeout: options.queue_timeout,
        started: false,
        cancel: cancel.clone(),
    };

    let Some(image) = image else {
        let _ = tx.send(StreamEvent::Chunk(NO_IMAGE_MESSAGE.to_string()));
        let _ = tx.send(StreamEvent::Done);
        return stream;
    };
    if let Err(e) = params.validate() {
        let _ = tx.send(StreamEvent::Failed(e));
        return stream;
    }

    let model = model.clone();
    let chat = ChatPrompt::new(prompt);
    let worker_tx = tx.clone();
    let spawned = thread::Builder::new()
        .name("joycaption-stream".to_string())
        .spawn(move || {
            let event = match produce(&model, &image, &chat, &params, &cancel, &worker_tx) {
                Ok(()) if cancel.is_cancelled() => StreamEvent::Failed(Error::Cancelled),
                Ok(()) => StreamEvent::Done,
                Err(e) => {
                    error!("stream caption failed, {e}");
                    StreamEvent::Failed(e)
                }
            };
            let _ = worker_tx.send(event);
        });
    if let Err(e) = spawned {
        let _ = tx.send(StreamEvent::Failed(e.into()));
    }

    stream
}

fn produce(
    model: &SharedModel,
    image: &RgbImage,
    chat: &ChatPrompt,
    params: &GenerationParams,
    cancel: &CancellationToken,
    tx: &UnboundedSender<StreamEvent>,
) -> Result<(), Error> {
    let mut model = model.lock()?;
    // 等锁期间可能已经超时
    if cancel.is_cancelled() {
        return Ok(());
    }
    // 此后开始按输出间隔计时
    if tx.send(StreamEvent::Started).is_err() {
        return Ok(());
    }

    let mut trim = EdgeWhitespace::default();
    model.generate(image, chat, params, &mut |piece| {
        if cancel.is_cancelled() {
            return ControlFlow::Break(());
        }
        if let Some(chunk) = trim.push(piece) {
            if tx.send(StreamEvent::Chunk(chunk)).is_err() {
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    })?;
    Ok(())
}

/// 去掉整段文本首尾的空白, 使片段拼接结果与 `caption_once` 一致
///
/// 尾部空白先暂存, 后面出现非空白字符时再一起输出.
#[derive(Debug, Default)]
struct EdgeWhitespace {
    started: bool,
    pending: String,
}

impl EdgeWhitespace {
    fn push(&mut self, piece: &str) -> Option<String> {
        let piece = if self.started {
            piece
        } else {
            piece.trim_start()
        };
        if piece.is_empty() {
            return None;
        }
        self.started = true;

        let body = piece.trim_end();
        if body.is_empty() {
            self.pending.push_str(piece);
            return None;
        }

        let mut chunk = std::mem::take(&mut self.pending);
        chunk.push_str(body);
        self.pending.push_str(&piece[body.len()..]);
        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;
    use crate::joycaption::predictor::{caption_once, tests::EchoModel, CaptionModel};

    /// 每个片段之前等待一段时间
    struct SlowModel {
        delay: Duration,
        pieces: usize,
        emitted: Arc<AtomicUsize>,
    }

    impl CaptionModel for SlowModel {
        fn generate(
            &mut self,
            _image: &RgbImage,
            _prompt: &ChatPrompt,
            _params: &GenerationParams,
            on_piece: &mut dyn FnMut(&str) -> ControlFlow<()>,
        ) -> Result<String, Error> {
            let mut full = String::new();
            for i in 0..self.pieces {
                thread::sleep(self.delay);
                let piece = format!("w{i} ");
                self.emitted.fetch_add(1, Ordering::SeqCst);
                full.push_str(&piece);
                if on_piece(&piece).is_break() {
                    break;
                }
            }
            Ok(full)
        }
    }

    #[test]
    fn test_edge_whitespace() {
        let mut trim = EdgeWhitespace::default();
        let pieces = ["  ", "\nA", " cat", " ", " sat.", "  \n"];
        let out: String = pieces.iter().filter_map(|p| trim.push(p)).collect();
        assert_eq!(out, "A cat  sat.");
    }

    #[tokio::test]
    async fn test_no_image() -> anyhow::Result<()> {
        let model = SharedModel::new(EchoModel::new("unused"));
        let mut stream = stream_caption(
            &model,
            None,
            "prompt",
            GenerationParams::default(),
            StreamOptions::default(),
        );
        assert_eq!(stream.next_chunk().await.transpose()?, Some(NO_IMAGE_MESSAGE.to_string()));
        assert!(stream.next_chunk().await.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_stream_matches_caption_once() -> anyhow::Result<()> {
        let model = SharedModel::new(EchoModel::new("  A red fox   jumps over the fence.\n "));
        let image = RgbImage::new(4, 4);
        let params = GenerationParams::greedy(512);

        let once = caption_once(&model, &image, "Describe.", &params)?;
        let streamed = stream_caption(
            &model,
            Some(image),
            "Describe.",
            params,
            StreamOptions::default(),
        )
        .collect_text()
        .await?;
        assert_eq!(streamed, once);
        assert_eq!(streamed, "A red fox   jumps over the fence.");
        Ok(())
    }

    #[tokio::test]
    async fn test_chunks_in_order() -> anyhow::Result<()> {
        let model = SharedModel::new(EchoModel::new("one two three"));
        let mut stream = stream_caption(
            &model,
            Some(RgbImage::new(1, 1)),
            "p",
            GenerationParams::greedy(16),
            StreamOptions::default(),
        );
        let mut chunks = Vec::new();
        while let Some(chunk) = stream.next_chunk().await {
            chunks.push(chunk?);
        }
        assert_eq!(chunks, vec!["one", " two", " three"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_timeout() -> anyhow::Result<()> {
        let emitted = Arc::new(AtomicUsize::new(0));
        let model = SharedModel::new(SlowModel {
            delay: Duration::from_millis(500),
            pieces: 4,
            emitted: emitted.clone(),
        });
        let options = StreamOptions::default().with_timeout(Duration::from_millis(50));
        let mut stream = stream_caption(
            &model,
            Some(RgbImage::new(1, 1)),
            "p",
            GenerationParams::greedy(16),
            options,
        );

        let err = stream.next_chunk().await.and_then(Result::err);
        assert!(matches!(err, Some(Error::GenerationTimeout { duration_ms: 50 })));
        assert!(stream.next_chunk().await.is_none());

        // 超时后生成线程在下一个片段处停止
        thread::sleep(Duration::from_millis(1200));
        assert!(emitted.load(Ordering::SeqCst) < 4);
        Ok(())
    }

    /// 后台线程连续占用模型
    fn occupy(model: &SharedModel, calls: usize) -> thread::JoinHandle<()> {
        let model = model.clone();
        let handle = thread::spawn(move || {
            let image = RgbImage::new(1, 1);
            for _ in 0..calls {
                let _ = caption_once(&model, &image, "p", &GenerationParams::greedy(16));
            }
        });
        // 等后台线程先拿到锁
        thread::sleep(Duration::from_millis(50));
        handle
    }

    #[tokio::test]
    async fn test_waits_for_busy_model() -> anyhow::Result<()> {
        let model = SharedModel::new(SlowModel {
            delay: Duration::from_millis(100),
            pieces: 3,
            emitted: Arc::new(AtomicUsize::new(0)),
        });
        let busy = occupy(&model, 3);

        // 排队时间超过输出间隔超时, 但不算超时
        let options = StreamOptions::default().with_timeout(Duration::from_millis(250));
        let text = stream_caption(
            &model,
            Some(RgbImage::new(1, 1)),
            "p",
            GenerationParams::greedy(16),
            options,
        )
        .collect_text()
        .await?;
        assert_eq!(text, "w0 w1 w2");

        busy.join().map_err(|_| anyhow::anyhow!("busy thread panicked"))?;
        Ok(())
    }

    #[tokio::test]
    async fn test_queue_timeout() -> anyhow::Result<()> {
        let emitted = Arc::new(AtomicUsize::new(0));
        let model = SharedModel::new(SlowModel {
            delay: Duration::from_millis(100),
            pieces: 3,
            emitted: emitted.clone(),
        });
        let busy = occupy(&model, 2);

        let options = StreamOptions::default()
            .with_timeout(Duration::from_secs(5))
            .with_queue_timeout(Duration::from_millis(100));
        let mut stream = stream_caption(
            &model,
            Some(RgbImage::new(1, 1)),
            "p",
            GenerationParams::greedy(16),
            options,
        );
        let err = stream.next_chunk().await.and_then(Result::err);
        assert!(matches!(err, Some(Error::GenerationTimeout { duration_ms: 100 })));
        assert!(stream.next_chunk().await.is_none());

        busy.join().map_err(|_| anyhow::anyhow!("busy thread panicked"))?;
        // 排队超时的请求拿到锁后不再生成
        thread::sleep(Duration::from_millis(100));
        assert_eq!(emitted.load(Ordering::SeqCst), 6);
        Ok(())
    }

    #[tokio::test]
    async fn test_cancel() -> anyhow::Result<()> {
        let emitted = Arc::new(AtomicUsize::new(0));
        let model = SharedModel::new(SlowModel {
            delay: Duration::from_millis(20),
            pieces: 200,
            emitted: emitted.clone(),
        });
        let cancel = CancellationToken::new();
        let options = StreamOptions::default()
            .with_timeout(Duration::from_secs(5))
            .with_cancel(cancel.clone());
        let mut stream = stream_caption(
            &model,
            Some(RgbImage::new(1, 1)),
            "p",
            GenerationParams::greedy(512),
            options,
        );

        assert_eq!(stream.next_chunk().await.transpose()?, Some("w0".to_string()));
        cancel.cancel();

        let mut cancelled = false;
        while let Some(chunk) = stream.next_chunk().await {
            if let Err(e) = chunk {
                cancelled = matches!(e, Error::Cancelled);
            }
        }
        assert!(cancelled);
        assert!(emitted.load(Ordering::SeqCst) < 200);
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_params() {
        let model = SharedModel::new(EchoModel::new("x"));
        let params = GenerationParams::default().with_top_p(1.5);
        let mut stream = stream_caption(
            &model,
            Some(RgbImage::new(1, 1)),
            "p",
            params,
            StreamOptions::default(),
        );
        let err = stream.next_chunk().await.and_then(Result::err);
        assert!(matches!(err, Some(Error::InvalidParameter(_))));
    }
}
