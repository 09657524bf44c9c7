//! # Preop 管理模块
//!
//! 提供配置加载与校验、日志初始化和 Prometheus 指标

pub mod config;
pub mod logging;
pub mod metrics;

pub use config::{AnnouncementConfig, ConfigValidator, FlowConfig, LoggingConfig, SweeperConfig};
pub use logging::init_tracing;
pub use metrics::FlowMetrics;
