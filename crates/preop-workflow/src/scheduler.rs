//! 站点调度
//!
//! 为站点挑选下一位叫号患者。依次检查：站点状态、容量、专科绑定、候选集、
//! 心电图前置条件、子队列偏好，最后按优先级轮转挑选最早的候选。
//!
//! 轮转计数器保存在存储中，按 (环节, 专科) 队列区分，随事务一起提交。

use crate::catalog;
use crate::ledger::StepLedger;
use chrono::Duration;
use preop_core::{
    CircuitStep, FlowType, Patient, PatientStep, PreopError, Result, Station, StepStatus,
};
use preop_store::{FlowTx, RotationKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// 调度配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 默认每个站点同时服务的患者数
    pub default_capacity: usize,
    /// 按环节覆盖的容量
    pub capacity_overrides: HashMap<CircuitStep, usize>,
    /// 连续叫优先患者的上限，达到后必须叫一位普通患者
    pub priority_streak_limit: u32,
    /// 叫号后未开始服务的超时时间
    pub call_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let mut capacity_overrides = HashMap::new();
        capacity_overrides.insert(CircuitStep::ExamesLabEcg, 2);
        capacity_overrides.insert(CircuitStep::Agendamento, 2);
        Self {
            default_capacity: 1,
            capacity_overrides,
            priority_streak_limit: 3,
            call_timeout_secs: 180,
        }
    }
}

impl SchedulerConfig {
    pub fn capacity_for(&self, step: CircuitStep) -> usize {
        self.capacity_overrides
            .get(&step)
            .copied()
            .unwrap_or(self.default_capacity)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::seconds(i64::try_from(self.call_timeout_secs).unwrap_or(i64::MAX))
    }
}

/// 调度结果
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub step: PatientStep,
    pub patient: Patient,
    /// 是否从优先池中选出
    pub from_priority_pool: bool,
    pub rotation_key: RotationKey,
    /// 叫号提交后应写回的轮转计数
    pub next_counter: u32,
}

/// 站点调度器
#[derive(Debug, Clone, Default)]
pub struct StationScheduler {
    config: SchedulerConfig,
}

type Candidate = (PatientStep, Patient);

impl StationScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// 为站点挑选下一位患者，只读，不修改任何状态
    pub fn select<T: FlowTx + ?Sized>(&self, tx: &mut T, station: &Station) -> Result<Selection> {
        if !station.is_active {
            return Err(PreopError::StationInactive(station.name.clone()));
        }

        let capacity = self.config.capacity_for(station.step);
        let current = StepLedger::new(&mut *tx).count_active(station.step, station.station_number);
        if current >= capacity {
            return Err(PreopError::CapacityExceeded {
                station_number: station.station_number,
                current,
                capacity,
            });
        }

        let bound_specialty = if station.step == CircuitStep::Especialista {
            Some(station.current_specialty.ok_or(PreopError::SpecialtyNotBound {
                station_number: station.station_number,
            })?)
        } else {
            None
        };

        let mut candidates = Vec::new();
        let pending = StepLedger::new(&mut *tx).list_for_step(station.step, &[StepStatus::Pending]);
        for row in pending {
            let patient = tx.patient(row.patient_id).ok_or_else(|| {
                PreopError::DataIntegrity(format!(
                    "step {} references missing patient {}",
                    row.id, row.patient_id
                ))
            })?;
            if !patient.is_callable() {
                continue;
            }
            if bound_specialty.is_some_and(|s| patient.specialty != s) {
                continue;
            }
            candidates.push((row, patient));
        }
        if candidates.is_empty() {
            return Err(PreopError::NoCandidates { step: station.step });
        }

        let required = catalog::station_prerequisites(station);
        if !required.is_empty() {
            let waiting = candidates.len();
            candidates.retain(|(_, patient)| prerequisites_met(&mut *tx, patient.id, required));
            if candidates.is_empty() {
                tracing::debug!(
                    "Station {} has {} candidates blocked by the ECG prerequisite",
                    station.name,
                    waiting
                );
                return Err(PreopError::EcgPrerequisiteNotMet { waiting });
            }
        }

        let candidates = prefer_sub_queue(station.step, candidates);

        let rotation_key = RotationKey::new(station.step, bound_specialty);
        let streak = tx.rotation_counter(&rotation_key);
        let (priority, normal): (Vec<Candidate>, Vec<Candidate>) =
            candidates.into_iter().partition(|(_, p)| p.is_priority);

        let (chosen, from_priority_pool, next_counter) =
            if streak >= self.config.priority_streak_limit && !normal.is_empty() {
                (oldest(normal), false, 0)
            } else if !priority.is_empty() {
                (oldest(priority), true, streak.saturating_add(1))
            } else {
                (oldest(normal), false, 0)
            };
        let Some((step, patient)) = chosen else {
            return Err(PreopError::NoCandidates { step: station.step });
        };

        tracing::debug!(
            "Station {} selected patient {} (priority pool: {}, streak {} -> {})",
            station.name,
            patient.id,
            from_priority_pool,
            streak,
            next_counter
        );

        Ok(Selection {
            step,
            patient,
            from_priority_pool,
            rotation_key,
            next_counter,
        })
    }
}

/// 前置环节都已完成；没有对应环节记录的患者也不放行
fn prerequisites_met<T: FlowTx + ?Sized>(tx: &mut T, patient_id: Uuid, required: &[CircuitStep]) -> bool {
    let rows = StepLedger::new(tx).list_for_patient(patient_id);
    required.iter().all(|step| {
        rows.iter()
            .any(|row| row.step == *step && row.status == StepStatus::Completed)
    })
}

/// 子队列偏好：心电图站点优先心内科通道患者，专科站点优先首诊
fn prefer_sub_queue(step: CircuitStep, candidates: Vec<Candidate>) -> Vec<Candidate> {
    let preferred: fn(&Patient) -> bool = match step {
        CircuitStep::ExamesLabEcg => Patient::is_cardio_track,
        CircuitStep::Especialista => |p| p.flow_type != FlowType::ConsultaRetorno,
        _ => return candidates,
    };
    let (fast, rest): (Vec<Candidate>, Vec<Candidate>) =
        candidates.into_iter().partition(|(_, p)| preferred(p));
    if fast.is_empty() {
        rest
    } else {
        fast
    }
}

fn oldest(pool: Vec<Candidate>) -> Option<Candidate> {
    pool.into_iter().min_by_key(|(step, _)| step.created_at)
}
