use anyhow::Result;
use book_translator::utils::logging;
use book_translator::{App, Cli, Config};
use clap::Parser;
use tracing::warn;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 加载配置
    let (mut config, invalid) = Config::from_env_checked();
    config.verbose_logging |= cli.verbose;

    // 初始化日志
    logging::init(config.verbose_logging);
    for issue in &invalid {
        warn!("⚠️ {}，已使用默认值", issue);
    }

    App::new(config).run(cli.command).await
}
