use anyhow::Context;
use clap::Parser;
use tracing::info;

use silentrain_joycaption::{
    asset::{AssetStore, ModelFiles},
    config::{Cli, ModelSource, ServerConfig},
    joycaption::SharedModel,
    model::{select_device, JoyCaptionModel},
    server::{serve, AppState},
    utils::init_logger,
};

fn load_model(config: &ServerConfig) -> anyhow::Result<JoyCaptionModel> {
    let files = match &config.model {
        ModelSource::Local(dir) => ModelFiles::from_dir(dir)?,
        ModelSource::Hub { repo, cache_dir } => {
            info!("fetching {repo} into {}", cache_dir.display());
            AssetStore::new(cache_dir)?.model_files(repo)?
        }
    };
    let device = select_device(config.cpu)?;
    let model = JoyCaptionModel::load(&files, device).context("load joycaption model")?;
    Ok(model)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from(Cli::parse());
    init_logger(config.verbose);

    // 加载耗时较长, 放到阻塞线程
    let model = {
        let config = config.clone();
        tokio::task::spawn_blocking(move || load_model(&config)).await??
    };

    let state = AppState::new(SharedModel::new(model)).with_stream_timeout(config.stream_timeout);
    serve(config.addr, state).await?;
    Ok(())
}
