//! 术前流转服务主程序
//!
//! 从标准输入读取命令，向标准输出写响应，后台运行叫号超时清理。

mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use commands::Dispatcher;
use preop_admin::{init_tracing, ConfigValidator, FlowConfig, FlowMetrics};
use preop_core::SystemClock;
use preop_store::MemoryStore;
use preop_workflow::{BroadcastEventBus, FlowEngine, FlowEvent, StationScheduler};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// 术前流转服务命令行参数
#[derive(Parser, Debug)]
#[command(name = "preop-server")]
#[command(about = "术前门诊患者流转调度服务")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 日志级别，覆盖配置文件
    #[arg(short, long)]
    log_level: Option<String>,

    /// 叫号超时清理间隔（秒），覆盖配置文件
    #[arg(short, long)]
    sweep_interval_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = FlowConfig::load(args.config.as_deref())?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if let Some(secs) = args.sweep_interval_secs {
        config.sweeper.interval_secs = secs;
    }

    init_tracing(&config.logging)?;
    ConfigValidator::new().validate(&config)?;

    info!("Starting preop flow server");
    info!(
        "  capacity: default {}, overrides {:?}",
        config.scheduler.default_capacity, config.scheduler.capacity_overrides
    );
    info!("  priority streak limit: {}", config.scheduler.priority_streak_limit);
    info!("  call timeout: {}s", config.scheduler.call_timeout_secs);

    let engine = Arc::new(FlowEngine::new(
        Arc::new(MemoryStore::new()),
        StationScheduler::new(config.scheduler.clone()),
        Arc::new(SystemClock),
        Arc::new(BroadcastEventBus::new(config.announcements.bus_capacity)),
    ));

    for seed in &config.stations {
        let station = engine
            .create_station(seed.clone())
            .await
            .with_context(|| format!("Failed to create station {} {}", seed.step, seed.station_number))?;
        info!("Station ready: {} ({}) id={}", station.name, station.step, station.id);
    }

    let metrics = FlowMetrics::new()?;
    let event_task = spawn_event_logger(engine.event_bus().subscribe(), metrics.clone());
    let sweeper_task = spawn_sweeper(Arc::clone(&engine), config.sweeper.interval());

    let dispatcher = Dispatcher::new(engine, metrics, config.announcements.limit);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        let response = dispatcher.handle(&line).await;
        let mut payload = serde_json::to_string(&response)?;
        payload.push('\n');
        stdout.write_all(payload.as_bytes()).await?;
        stdout.flush().await?;
    }

    info!("Input closed, shutting down");
    sweeper_task.abort();
    event_task.abort();
    Ok(())
}

/// 定期取消超时未开始的叫号
fn spawn_sweeper(engine: Arc<FlowEngine>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match engine.expire_stale_calls().await {
                Ok(0) => {}
                Ok(expired) => info!("Sweeper expired {} stale calls", expired),
                Err(e) => error!("Sweeper failed: {}", e),
            }
        }
    })
}

/// 记录每个事件并更新指标
fn spawn_event_logger(mut rx: broadcast::Receiver<FlowEvent>, metrics: FlowMetrics) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    metrics.observe(&event);
                    match serde_json::to_string(&event) {
                        Ok(json) => info!("Flow event {}: {}", event.name(), json),
                        Err(e) => warn!("Failed to serialize event {}: {}", event.name(), e),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event logger lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
