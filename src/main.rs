use anyhow::Result;
use cme_auto_study::config::AppConfig;
use cme_auto_study::orchestrator::App;
use cme_auto_study::utils::logging;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    // 加载配置
    let config = AppConfig::load()?;

    // 初始化并运行应用
    App::initialize(config).await?.run().await?;

    Ok(())
}
