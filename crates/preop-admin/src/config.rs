//! 配置管理
//!
//! 从可选的配置文件与 `PREOP` 前缀的环境变量加载流转配置，并在启动前校验

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use preop_core::CircuitStep;
use preop_workflow::{NewStation, SchedulerConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{error, info};

/// 流转系统完整配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct FlowConfig {
    /// 调度配置
    pub scheduler: SchedulerConfig,
    /// 启动时创建的站点
    pub stations: Vec<NewStation>,
    /// 叫号公告配置
    pub announcements: AnnouncementConfig,
    /// 超时清理任务配置
    pub sweeper: SweeperConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// 叫号公告配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnnouncementConfig {
    /// 大屏默认展示条数
    pub limit: usize,
    /// 事件总线缓冲区大小
    pub bus_capacity: usize,
}

impl Default for AnnouncementConfig {
    fn default() -> Self {
        Self {
            limit: 5,
            bus_capacity: 1024,
        }
    }
}

/// 超时清理任务配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SweeperConfig {
    /// 清理间隔（秒）
    pub interval_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self { interval_secs: 30 }
    }
}

impl SweeperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别或过滤表达式
    pub level: String,
    /// 输出 JSON 格式
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl FlowConfig {
    /// 加载配置
    ///
    /// 给定路径时配置文件必须存在；环境变量如 `PREOP_SCHEDULER__CALL_TIMEOUT_SECS`
    /// 覆盖文件中的值。
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix("PREOP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration sources")?;

        let config: FlowConfig = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        match path {
            Some(path) => info!("Configuration loaded successfully from: {}", path),
            None => info!("Configuration loaded from defaults and environment"),
        }
        Ok(config)
    }
}

/// 配置验证器
#[derive(Debug)]
pub struct ConfigValidator {
    /// 验证规则
    validation_rules: Vec<ValidationRule>,
}

/// 验证规则
#[derive(Debug)]
struct ValidationRule {
    /// 字段路径
    field_path: String,
    /// 验证函数
    validator: fn(&FlowConfig) -> Result<()>,
    /// 错误消息
    error_message: String,
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigValidator {
    /// 创建新的配置验证器
    pub fn new() -> Self {
        let validation_rules = vec![
            ValidationRule {
                field_path: "scheduler.default_capacity".to_string(),
                validator: |config| {
                    if config.scheduler.default_capacity == 0 {
                        Err(anyhow::anyhow!("Default station capacity cannot be 0"))
                    } else {
                        Ok(())
                    }
                },
                error_message: "Invalid default capacity".to_string(),
            },
            ValidationRule {
                field_path: "scheduler.capacity_overrides".to_string(),
                validator: |config| {
                    match config
                        .scheduler
                        .capacity_overrides
                        .iter()
                        .find(|(_, capacity)| **capacity == 0)
                    {
                        Some((step, _)) => Err(anyhow::anyhow!("Capacity for {} cannot be 0", step)),
                        None => Ok(()),
                    }
                },
                error_message: "Invalid capacity override".to_string(),
            },
            ValidationRule {
                field_path: "scheduler.priority_streak_limit".to_string(),
                validator: |config| {
                    if config.scheduler.priority_streak_limit == 0 {
                        Err(anyhow::anyhow!("Priority streak limit cannot be 0"))
                    } else {
                        Ok(())
                    }
                },
                error_message: "Invalid priority rotation threshold".to_string(),
            },
            ValidationRule {
                field_path: "scheduler.call_timeout_secs".to_string(),
                validator: |config| {
                    if config.scheduler.call_timeout_secs == 0 {
                        Err(anyhow::anyhow!("Call timeout cannot be 0"))
                    } else {
                        Ok(())
                    }
                },
                error_message: "Invalid call timeout".to_string(),
            },
            ValidationRule {
                field_path: "stations".to_string(),
                validator: |config| {
                    let mut seen = HashSet::new();
                    for station in &config.stations {
                        if station.station_number < 1 {
                            return Err(anyhow::anyhow!(
                                "Station number must be positive: {} {}",
                                station.step,
                                station.station_number
                            ));
                        }
                        if !seen.insert((station.step, station.station_number)) {
                            return Err(anyhow::anyhow!(
                                "Duplicate station: {} {}",
                                station.step,
                                station.station_number
                            ));
                        }
                    }
                    Ok(())
                },
                error_message: "Invalid station seed".to_string(),
            },
            ValidationRule {
                field_path: "stations.specialty".to_string(),
                validator: |config| {
                    match config
                        .stations
                        .iter()
                        .find(|s| s.specialty.is_some() && s.step != CircuitStep::Especialista)
                    {
                        Some(station) => Err(anyhow::anyhow!(
                            "Specialty is only allowed on especialista stations, got {} {}",
                            station.step,
                            station.station_number
                        )),
                        None => Ok(()),
                    }
                },
                error_message: "Invalid station specialty".to_string(),
            },
            ValidationRule {
                field_path: "sweeper.interval_secs".to_string(),
                validator: |config| {
                    if config.sweeper.interval_secs == 0 {
                        Err(anyhow::anyhow!("Sweeper interval cannot be 0"))
                    } else {
                        Ok(())
                    }
                },
                error_message: "Invalid sweeper interval".to_string(),
            },
        ];

        Self { validation_rules }
    }

    /// 验证配置
    pub fn validate(&self, config: &FlowConfig) -> Result<()> {
        for rule in &self.validation_rules {
            if let Err(e) = (rule.validator)(config) {
                error!("Configuration validation failed for {}: {}", rule.field_path, e);
                return Err(anyhow::anyhow!("{}: {}", rule.error_message, e));
            }
        }

        info!("Configuration validation passed");
        Ok(())
    }
}
