//! 环节台账
//!
//! 患者环节记录的唯一权威来源。所有状态变更都经过 [`StepStateMachine`]，
//! 写入使用条件更新，状态被并发修改时返回 `LostRace`。

use crate::state_machine::{StepEvent, StepStateMachine};
use chrono::{DateTime, Utc};
use preop_core::{CircuitStep, PatientStep, PreopError, Result, StepStatus};
use preop_store::{FlowTx, StepFilter};
use std::collections::HashSet;
use uuid::Uuid;

/// 一次状态转换的结果
#[derive(Debug, Clone, PartialEq)]
pub struct StepTransition {
    pub before: StepStatus,
    pub row: PatientStep,
}

impl StepTransition {
    pub fn after(&self) -> StepStatus {
        self.row.status
    }
}

/// 环节台账
pub struct StepLedger<'t, T: FlowTx + ?Sized> {
    tx: &'t mut T,
    state_machine: StepStateMachine,
}

impl<'t, T: FlowTx + ?Sized> StepLedger<'t, T> {
    pub fn new(tx: &'t mut T) -> Self {
        Self {
            tx,
            state_machine: StepStateMachine::new(),
        }
    }

    /// 为患者新增一组待处理环节
    ///
    /// 任一环节已有未完成记录，或输入中重复出现，整组都不会写入。
    pub fn add_steps(
        &mut self,
        patient_id: Uuid,
        steps: &[CircuitStep],
        now: DateTime<Utc>,
    ) -> Result<Vec<PatientStep>> {
        let mut seen = HashSet::new();
        for &step in steps {
            if !seen.insert(step) || self.find_open(patient_id, step).is_some() {
                return Err(PreopError::DuplicateStep { patient_id, step });
            }
        }

        let mut created = Vec::with_capacity(steps.len());
        for &step in steps {
            let row = PatientStep::pending(patient_id, step, now);
            self.tx.insert_step(row.clone())?;
            created.push(row);
        }

        tracing::debug!("Added {} steps for patient {}", created.len(), patient_id);
        Ok(created)
    }

    /// 按事件推进环节状态
    ///
    /// `station_number` 只在叫号时写入；回退到等待时清空叫号信息。
    pub fn transition(
        &mut self,
        step_id: Uuid,
        event: StepEvent,
        now: DateTime<Utc>,
        station_number: Option<i32>,
    ) -> Result<StepTransition> {
        let mut row = self
            .tx
            .step(step_id)
            .ok_or_else(|| PreopError::NotFound(format!("Step {} not found", step_id)))?;
        let before = row.status;
        row.status = self.state_machine.transition(before, event)?;

        match event {
            StepEvent::Call => {
                row.called_at = Some(now);
                row.station_number = station_number;
            }
            StepEvent::Start => row.started_at = Some(now),
            StepEvent::Finish => row.completed_at = Some(now),
            StepEvent::Cancel | StepEvent::Expire => {
                row.called_at = None;
                row.started_at = None;
                row.station_number = None;
            }
            StepEvent::ForceComplete => {
                row.started_at.get_or_insert(now);
                row.completed_at = Some(now);
            }
        }

        self.tx.update_step(row.clone(), before)?;
        tracing::debug!(
            "Step {} ({}) of patient {}: {} -> {}",
            row.id,
            row.step,
            row.patient_id,
            before,
            row.status
        );
        Ok(StepTransition { before, row })
    }

    /// 按 (患者, 环节) 推进未完成的记录
    pub fn transition_for(
        &mut self,
        patient_id: Uuid,
        step: CircuitStep,
        event: StepEvent,
        now: DateTime<Utc>,
        station_number: Option<i32>,
    ) -> Result<StepTransition> {
        let row = self.find_open(patient_id, step).ok_or_else(|| {
            PreopError::NotFound(format!("No open {} step for patient {}", step, patient_id))
        })?;
        self.transition(row.id, event, now, station_number)
    }

    pub fn get(&self, step_id: Uuid) -> Result<PatientStep> {
        self.tx
            .step(step_id)
            .ok_or_else(|| PreopError::NotFound(format!("Step {} not found", step_id)))
    }

    /// 患者在该环节上未完成的记录
    pub fn find_open(&self, patient_id: Uuid, step: CircuitStep) -> Option<PatientStep> {
        self.tx
            .steps(&StepFilter::for_patient(patient_id).with_step(step))
            .into_iter()
            .find(|row| row.status != StepStatus::Completed)
    }

    pub fn list_for_patient(&self, patient_id: Uuid) -> Vec<PatientStep> {
        self.tx.steps(&StepFilter::for_patient(patient_id))
    }

    /// 某环节下的记录，`statuses` 为空时不按状态过滤
    pub fn list_for_step(&self, step: CircuitStep, statuses: &[StepStatus]) -> Vec<PatientStep> {
        let mut filter = StepFilter::for_step(step);
        if !statuses.is_empty() {
            filter = filter.with_statuses(statuses);
        }
        self.tx.steps(&filter)
    }

    /// 站点当前占用数（已叫号或服务中）
    pub fn count_active(&self, step: CircuitStep, station_number: i32) -> usize {
        self.tx
            .steps(
                &StepFilter::for_step(step)
                    .with_statuses(&[StepStatus::Called, StepStatus::InProgress])
                    .with_station_number(station_number),
            )
            .len()
    }

    /// 患者的全部环节是否都已完成；没有任何环节时返回 false
    pub fn is_all_completed(&self, patient_id: Uuid) -> bool {
        let rows = self.list_for_patient(patient_id);
        !rows.is_empty() && rows.iter().all(|row| row.status == StepStatus::Completed)
    }

    pub fn delete(&mut self, step_id: Uuid) -> Result<PatientStep> {
        let row = self.get(step_id)?;
        self.tx.delete_step(step_id)?;
        Ok(row)
    }
}
