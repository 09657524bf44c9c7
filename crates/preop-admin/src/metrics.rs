//! 流转监控指标
//!
//! 由事件流驱动的 Prometheus 计数器，按文本格式导出

use anyhow::{Context, Result};
use preop_core::PreopError;
use preop_workflow::FlowEvent;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::debug;

/// 流转指标收集器
#[derive(Debug, Clone)]
pub struct FlowMetrics {
    /// Prometheus指标注册表
    registry: Registry,
    /// 登记患者数
    registrations_total: IntCounter,
    /// 按环节统计的叫号次数
    calls_total: IntCounterVec,
    /// 按原因统计的叫号拒绝次数
    call_rejections_total: IntCounterVec,
    /// 超时自动取消次数
    call_expiries_total: IntCounter,
    /// 完成全部环节的患者数
    completions_total: IntCounter,
}

impl FlowMetrics {
    /// 创建并注册全部指标
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let registrations_total = IntCounter::with_opts(Opts::new(
            "preop_patients_registered_total",
            "Total number of registered patients",
        ))?;

        let calls_total = IntCounterVec::new(
            Opts::new("preop_calls_total", "Total number of patient calls per step"),
            &["step", "pool"],
        )?;

        let call_rejections_total = IntCounterVec::new(
            Opts::new(
                "preop_call_rejections_total",
                "Total number of rejected call attempts per reason",
            ),
            &["reason"],
        )?;

        let call_expiries_total = IntCounter::with_opts(Opts::new(
            "preop_call_expiries_total",
            "Total number of calls cancelled by timeout",
        ))?;

        let completions_total = IntCounter::with_opts(Opts::new(
            "preop_patients_completed_total",
            "Total number of patients that completed every step",
        ))?;

        registry.register(Box::new(registrations_total.clone()))?;
        registry.register(Box::new(calls_total.clone()))?;
        registry.register(Box::new(call_rejections_total.clone()))?;
        registry.register(Box::new(call_expiries_total.clone()))?;
        registry.register(Box::new(completions_total.clone()))?;

        Ok(Self {
            registry,
            registrations_total,
            calls_total,
            call_rejections_total,
            call_expiries_total,
            completions_total,
        })
    }

    /// 根据已提交的事件更新计数
    pub fn observe(&self, event: &FlowEvent) {
        match event {
            FlowEvent::PatientRegistered { .. } => self.registrations_total.inc(),
            FlowEvent::PatientCalled {
                call,
                from_priority_pool,
            } => {
                let pool = if *from_priority_pool { "priority" } else { "normal" };
                self.calls_total
                    .with_label_values(&[call.step.as_str(), pool])
                    .inc();
            }
            FlowEvent::CallExpired { .. } => self.call_expiries_total.inc(),
            FlowEvent::PatientCompleted { .. } => self.completions_total.inc(),
            _ => {}
        }
    }

    /// 记录叫号被拒绝的原因，其他错误忽略
    pub fn record_rejection(&self, error: &PreopError) {
        let reason = match error {
            PreopError::CapacityExceeded { .. } => "capacity_exceeded",
            PreopError::NoCandidates { .. } => "no_candidates",
            PreopError::EcgPrerequisiteNotMet { .. } => "ecg_prerequisite",
            PreopError::SpecialtyNotBound { .. } => "specialty_not_bound",
            PreopError::StationInactive(_) => "station_inactive",
            _ => return,
        };
        debug!("Call rejected: {}", reason);
        self.call_rejections_total.with_label_values(&[reason]).inc();
    }

    /// 以 Prometheus 文本格式导出
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .context("Failed to encode metrics")?;
        String::from_utf8(buffer).context("Metrics output is not valid UTF-8")
    }
}
