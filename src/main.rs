//! # Service Gateway 主程序
//!
//! 加载配置、构建共享组件、启动后台任务并运行网关服务器，收到退出信号后优雅关闭。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;

use service_gateway::{
    app::{AppContext, AppTasks},
    config::ConfigManager,
    lerror, linfo,
    logging::{self, LogComponent, LogStage},
    management::GatewayServer,
    proxy::RouteTable,
};

/// 命令行参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// 配置文件路径（也可通过 GATEWAY_CONFIG_PATH 指定）
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 日志级别（RUST_LOG 优先）
    #[arg(long)]
    log_level: Option<String>,

    /// 只校验配置并打印路由表，不启动服务
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init_optimized_logging(cli.log_level.as_ref());

    let manager = match ConfigManager::new(cli.config) {
        Ok(manager) => manager,
        Err(e) => {
            lerror!(
                "system",
                LogStage::Startup,
                LogComponent::Config,
                "config_load_failed",
                &format!("配置加载失败: {e}")
            );
            if cli.check_config {
                std::process::exit(1);
            }
            return Err(e).context("配置加载失败");
        }
    };

    let config = manager.config();

    if cli.check_config {
        let routes = RouteTable::from_config(&config).context("路由表构建失败")?;
        println!("配置有效: {}", manager.source_path().display());
        for route in routes.routes() {
            println!(
                "  {:<24} -> {}{}",
                route.path_prefix, route.base_url, route.target_prefix
            );
        }
        return Ok(());
    }

    let context = Arc::new(AppContext::from_config(config).context("组件初始化失败")?);
    let tasks = AppTasks::spawn(&context);

    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Main,
        "service_starting",
        "网关启动",
        config_path = manager.source_path().display().to_string(),
        routes = context.routes.len(),
        background_tasks = tasks.running()
    );

    let server = GatewayServer::new(Arc::clone(&context));
    let result = server.serve(shutdown_signal()).await;

    tasks.shutdown();
    context.pool.close();

    if let Err(e) = result {
        lerror!(
            "system",
            LogStage::Shutdown,
            LogComponent::Main,
            "service_failed",
            &format!("网关异常退出: {e}")
        );
        return Err(e.into());
    }

    linfo!(
        "system",
        LogStage::Shutdown,
        LogComponent::Main,
        "service_shutdown",
        "网关正常关闭"
    );
    Ok(())
}

/// 等待 Ctrl+C 或 SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            lerror!(
                "system",
                LogStage::Shutdown,
                LogComponent::Main,
                "ctrl_c_error",
                &format!("无法监听 Ctrl+C: {e}")
            );
            std::future::pending::<()>().await;
        }
        "Ctrl+C"
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                lerror!(
                    "system",
                    LogStage::Shutdown,
                    LogComponent::Main,
                    "sigterm_error",
                    &format!("无法监听 SIGTERM: {e}")
                );
                std::future::pending::<()>().await;
            }
        }
        "SIGTERM"
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&str>();

    let reason = tokio::select! {
        reason = ctrl_c => reason,
        reason = terminate => reason,
    };

    linfo!(
        "system",
        LogStage::Shutdown,
        LogComponent::Main,
        "shutdown_initiated",
        &format!("收到 {reason}，开始优雅关闭")
    );
}
