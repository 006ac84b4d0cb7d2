//! 命令行配置

use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

use clap::Parser;

use crate::{
    asset::{default_cache_dir, MODEL_REPO},
    joycaption::stream::DEFAULT_STREAM_TIMEOUT,
};

#[derive(Parser, Debug, Clone)]
#[command(name = "joycaption")]
#[command(version, about = "JoyCaption 本地图像打标服务")]
pub struct Cli {
    /// 监听端口
    #[arg(long, default_value_t = 7860)]
    pub port: u16,

    /// 监听地址
    #[arg(long, default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// huggingface 模型仓库
    #[arg(long, default_value = MODEL_REPO)]
    pub model_repo: String,

    /// 本地模型目录, 指定后不再下载
    #[arg(long)]
    pub model_dir: Option<PathBuf>,

    /// 模型缓存目录, 默认 ~/.cache/joycaption
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// 强制使用 CPU
    #[arg(long)]
    pub cpu: bool,

    /// 流式输出等待超时 (秒)
    #[arg(long, default_value_t = DEFAULT_STREAM_TIMEOUT.as_secs())]
    pub stream_timeout_secs: u64,

    /// 输出 debug 日志
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

/// 模型来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    Hub { repo: String, cache_dir: PathBuf },
    Local(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub model: ModelSource,
    pub cpu: bool,
    pub stream_timeout: Duration,
    pub verbose: bool,
}

impl From<Cli> for ServerConfig {
    fn from(cli: Cli) -> Self {
        let model = match cli.model_dir {
            Some(dir) => ModelSource::Local(dir),
            None => ModelSource::Hub {
                repo: cli.model_repo,
                cache_dir: cli.cache_dir.unwrap_or_else(default_cache_dir),
            },
        };
        Self {
            addr: SocketAddr::new(cli.host, cli.port),
            model,
            cpu: cli.cpu,
            stream_timeout: Duration::from_secs(cli.stream_timeout_secs),
            verbose: cli.verbose,
        }
    }
}
