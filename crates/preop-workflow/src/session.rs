//! 叫号会话
//!
//! 站点上单次叫号的生命周期：叫号、开始、结束、取消与超时自动取消。
//! 每个方法只在调用方提供的事务内写入，原子性由事务保证。

use crate::announcements::AnnouncementFeed;
use crate::events::FlowEvent;
use crate::ledger::{StepLedger, StepTransition};
use crate::registry::PatientRegistry;
use crate::scheduler::Selection;
use crate::state_machine::StepEvent;
use chrono::{DateTime, Duration, Utc};
use preop_core::{
    CircuitStep, DischargeOutcome, Patient, PatientStep, PreopError, Result, Station, StepStatus,
    TvCall,
};
use preop_store::{FlowTx, StationFilter, StepFilter};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 结束服务时附带的结局信息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServiceOutcome {
    /// 专科判定有手术指征，重新进入术前流程
    SurgeryIndicated { needs_cardio: bool },
    /// 专科判定无手术指征
    Discharged { outcome: DischargeOutcome },
    /// 排期环节确认手术日期
    SchedulingConfirmed {
        surgery_date_defined: bool,
        #[serde(default)]
        reason: Option<String>,
    },
}

impl ServiceOutcome {
    /// 该结局所属的环节
    pub fn step(&self) -> CircuitStep {
        match self {
            Self::SurgeryIndicated { .. } | Self::Discharged { .. } => CircuitStep::Especialista,
            Self::SchedulingConfirmed { .. } => CircuitStep::Agendamento,
        }
    }

    fn ensure_fits(&self, station: &Station) -> Result<()> {
        if self.step() != station.step {
            return Err(PreopError::Validation(format!(
                "结局 {:?} 不适用于 {} 站点",
                self, station.step
            )));
        }
        Ok(())
    }
}

/// 结束服务的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinishReport {
    pub step: PatientStep,
    pub patient: Patient,
    pub patient_completed: bool,
    pub reentered_steps: Vec<PatientStep>,
}

/// 叫号会话
pub struct CallSession<'t, T: FlowTx + ?Sized> {
    tx: &'t mut T,
    events: &'t mut Vec<FlowEvent>,
}

impl<'t, T: FlowTx + ?Sized> CallSession<'t, T> {
    pub fn new(tx: &'t mut T, events: &'t mut Vec<FlowEvent>) -> Self {
        Self { tx, events }
    }

    fn load_station(&self, station_id: Uuid) -> Result<Station> {
        self.tx
            .station(station_id)
            .ok_or_else(|| PreopError::NotFound(format!("Station {} not found", station_id)))
    }

    fn record(&mut self, transition: &StepTransition) {
        self.events.push(FlowEvent::StepTransitioned {
            patient_id: transition.row.patient_id,
            step_id: transition.row.id,
            step: transition.row.step,
            from: transition.before,
            to: transition.row.status,
            station_number: transition.row.station_number,
        });
    }

    /// 站点上处于给定状态的叫号记录，按叫号时间升序
    fn rows_at(&self, station: &Station, statuses: &[StepStatus], patient_id: Option<Uuid>) -> Vec<PatientStep> {
        let mut rows: Vec<PatientStep> = self
            .tx
            .steps(
                &StepFilter::for_step(station.step)
                    .with_statuses(statuses)
                    .with_station_number(station.station_number),
            )
            .into_iter()
            .filter(|row| patient_id.map_or(true, |id| row.patient_id == id))
            .collect();
        rows.sort_by_key(|row| row.called_at);
        rows
    }

    /// 提交调度结果：标记服务中、推进到已叫号、绑定站点、发布公告、写回轮转计数
    pub fn open(&mut self, station_id: Uuid, selection: Selection, now: DateTime<Utc>) -> Result<TvCall> {
        let mut station = self.load_station(station_id)?;
        let Selection {
            step,
            patient,
            from_priority_pool,
            rotation_key,
            next_counter,
        } = selection;

        let patient = PatientRegistry::new(&mut *self.tx).mark_being_served(patient.id, true)?;
        let transition = StepLedger::new(&mut *self.tx).transition(
            step.id,
            StepEvent::Call,
            now,
            Some(station.station_number),
        )?;

        station.bind_patient(patient.id);
        self.tx.update_station(station.clone())?;

        let call = AnnouncementFeed::new(&mut *self.tx).announce(&patient, &station, now)?;
        self.tx.set_rotation_counter(rotation_key, next_counter);

        tracing::info!(
            "Called patient {} to {} (priority pool: {})",
            patient.id,
            station.name,
            from_priority_pool
        );
        self.record(&transition);
        self.events.push(FlowEvent::PatientCalled {
            call: call.clone(),
            from_priority_pool,
        });
        Ok(call)
    }

    /// 开始服务：默认取该站点最早叫号的患者
    pub fn start(&mut self, station_id: Uuid, patient_id: Option<Uuid>, now: DateTime<Utc>) -> Result<PatientStep> {
        let station = self.load_station(station_id)?;
        let row = self
            .rows_at(&station, &[StepStatus::Called], patient_id)
            .into_iter()
            .next()
            .ok_or(PreopError::NoPatientCalled {
                station_number: station.station_number,
                expected: StepStatus::Called,
            })?;

        let transition = StepLedger::new(&mut *self.tx).transition(row.id, StepEvent::Start, now, None)?;
        AnnouncementFeed::new(&mut *self.tx).deactivate(row.patient_id, row.step)?;

        tracing::info!("Started service of patient {} at {}", row.patient_id, station.name);
        self.record(&transition);
        Ok(transition.row)
    }

    /// 结束服务并执行完成级联
    pub fn finish(
        &mut self,
        station_id: Uuid,
        patient_id: Option<Uuid>,
        outcome: Option<ServiceOutcome>,
        now: DateTime<Utc>,
    ) -> Result<FinishReport> {
        let station = self.load_station(station_id)?;
        if let Some(outcome) = &outcome {
            outcome.ensure_fits(&station)?;
        }
        let row = self
            .rows_at(&station, &[StepStatus::InProgress], patient_id)
            .into_iter()
            .next()
            .ok_or(PreopError::NoPatientCalled {
                station_number: station.station_number,
                expected: StepStatus::InProgress,
            })?;

        let transition = StepLedger::new(&mut *self.tx).transition(row.id, StepEvent::Finish, now, None)?;
        self.record(&transition);
        self.release_bindings(&row)?;

        let mut registry = PatientRegistry::new(&mut *self.tx);
        let mut reentered_steps = Vec::new();
        match outcome {
            Some(ServiceOutcome::SurgeryIndicated { needs_cardio }) => {
                reentered_steps = registry.reenter_circuit(row.patient_id, needs_cardio, now)?;
                self.events.push(FlowEvent::CircuitReentered {
                    patient_id: row.patient_id,
                    needs_cardio,
                });
            }
            Some(ServiceOutcome::Discharged { outcome }) => {
                registry.record_discharge(row.patient_id, outcome)?;
            }
            Some(ServiceOutcome::SchedulingConfirmed {
                surgery_date_defined: false,
                reason,
            }) => {
                let patient = registry.mark_pending_scheduling(row.patient_id, reason, now)?;
                self.events.push(FlowEvent::SchedulingPending {
                    patient_id: row.patient_id,
                    reason: patient.scheduling_pending_reason.unwrap_or_default(),
                });
            }
            Some(ServiceOutcome::SchedulingConfirmed {
                surgery_date_defined: true,
                ..
            }) => {
                if registry.get(row.patient_id)?.pending_surgery_scheduling {
                    registry.clear_pending_scheduling(row.patient_id)?;
                }
            }
            None => {}
        }

        let patient_completed = registry.complete_if_done(row.patient_id, now)?;
        let patient = registry.get(row.patient_id)?;
        if patient_completed {
            self.events.push(FlowEvent::PatientCompleted {
                patient_id: row.patient_id,
            });
        }

        tracing::info!(
            "Finished {} for patient {} at {} (circuit completed: {})",
            row.step,
            row.patient_id,
            station.name,
            patient_completed
        );
        Ok(FinishReport {
            step: transition.row,
            patient,
            patient_completed,
            reentered_steps,
        })
    }

    /// 取消叫号：默认取该站点最近一次叫号
    pub fn cancel(&mut self, station_id: Uuid, patient_id: Option<Uuid>, now: DateTime<Utc>) -> Result<PatientStep> {
        let station = self.load_station(station_id)?;
        let row = self
            .rows_at(&station, &[StepStatus::Called, StepStatus::InProgress], patient_id)
            .pop()
            .ok_or(PreopError::NoPatientCalled {
                station_number: station.station_number,
                expected: StepStatus::Called,
            })?;

        let transition = self.revert(&row, StepEvent::Cancel, now)?;
        tracing::info!("Cancelled call of patient {} at {}", row.patient_id, station.name);
        Ok(transition.row)
    }

    /// 取消所有叫号超过 `timeout` 仍未开始服务的记录
    pub fn expire_stale(&mut self, now: DateTime<Utc>, timeout: Duration) -> Result<Vec<PatientStep>> {
        let stale: Vec<PatientStep> = self
            .tx
            .steps(&StepFilter {
                statuses: Some(vec![StepStatus::Called]),
                ..Default::default()
            })
            .into_iter()
            .filter(|row| row.called_at.is_some_and(|at| now - at > timeout))
            .collect();

        let mut expired = Vec::with_capacity(stale.len());
        for row in stale {
            self.revert(&row, StepEvent::Expire, now)?;
            tracing::warn!(
                "Call of patient {} for {} at station {:?} expired",
                row.patient_id,
                row.step,
                row.station_number
            );
            self.events.push(FlowEvent::CallExpired {
                patient_id: row.patient_id,
                step_id: row.id,
                step: row.step,
                station_number: row.station_number,
            });
            expired.push(row);
        }
        Ok(expired)
    }

    fn revert(&mut self, row: &PatientStep, event: StepEvent, now: DateTime<Utc>) -> Result<StepTransition> {
        let transition = StepLedger::new(&mut *self.tx).transition(row.id, event, now, None)?;
        self.record(&transition);
        self.release_bindings(row)?;
        Ok(transition)
    }

    /// 解除一次叫号占用的资源：服务中标志、站点绑定和公告
    pub fn release_bindings(&mut self, row: &PatientStep) -> Result<()> {
        PatientRegistry::new(&mut *self.tx).mark_being_served(row.patient_id, false)?;

        let stations = self.tx.stations(&StationFilter {
            step: Some(row.step),
            active_only: false,
        });
        for mut station in stations {
            if station.release_patient(row.patient_id) {
                self.tx.update_station(station)?;
            }
        }

        AnnouncementFeed::new(&mut *self.tx).deactivate(row.patient_id, row.step)?;
        Ok(())
    }
}
