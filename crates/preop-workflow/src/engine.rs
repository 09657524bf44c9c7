//! 流转引擎
//!
//! 对外的命令/查询入口。每个操作在一个存储事务内完成，事务开始时先惰性处理
//! 超时叫号；提交成功后才发布事件。

use crate::announcements::AnnouncementFeed;
use crate::catalog;
use crate::events::{BroadcastEventBus, EventBus, FlowEvent};
use crate::ledger::StepLedger;
use crate::registry::PatientRegistry;
use crate::reporting::{DayReport, ReportingAggregator};
use crate::scheduler::{SchedulerConfig, StationScheduler};
use crate::session::{CallSession, FinishReport, ServiceOutcome};
use crate::state_machine::StepEvent;
use chrono::{DateTime, Utc};
use preop_core::{
    CircuitStep, Clock, DateRange, MedicalSpecialty, NewPatient, Patient, PatientStep, PreopError,
    QueueStats, Result, Station, SystemClock, TvCall,
};
use preop_store::{FlowStore, FlowTx, MemoryStore, PatientFilter, StationFilter, StepFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// 登记结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegisteredPatient {
    pub patient: Patient,
    pub steps: Vec<PatientStep>,
}

/// 叫号结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallTicket {
    pub call: TvCall,
    pub step: PatientStep,
    pub patient: Patient,
    pub from_priority_pool: bool,
}

/// 新建站点参数
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewStation {
    pub step: CircuitStep,
    pub station_number: i32,
    pub name: String,
    #[serde(default)]
    pub specialty: Option<MedicalSpecialty>,
}

/// 流转引擎
pub struct FlowEngine {
    store: Arc<dyn FlowStore>,
    scheduler: StationScheduler,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventBus>,
}

impl FlowEngine {
    pub fn new(
        store: Arc<dyn FlowStore>,
        scheduler: StationScheduler,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            store,
            scheduler,
            clock,
            events,
        }
    }

    /// 内存存储、系统时钟和默认事件总线
    pub fn in_memory(config: SchedulerConfig) -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            StationScheduler::new(config),
            Arc::new(SystemClock),
            Arc::new(BroadcastEventBus::default()),
        )
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn event_bus(&self) -> Arc<dyn EventBus> {
        Arc::clone(&self.events)
    }

    pub fn scheduler_config(&self) -> &SchedulerConfig {
        self.scheduler.config()
    }

    /// 在一个事务中执行操作
    async fn run<R, F>(&self, op: &'static str, f: F) -> Result<R>
    where
        R: Send,
        F: FnOnce(&mut dyn FlowTx, DateTime<Utc>, &mut Vec<FlowEvent>) -> Result<R> + Send,
    {
        let mut tx = self.store.begin().await?;
        // 取锁之后再读时钟，保证事务内时间单调
        let now = self.clock.now();
        let mut events = Vec::new();

        let timeout = self.scheduler.config().call_timeout();
        let expired = CallSession::new(tx.as_mut(), &mut events).expire_stale(now, timeout);
        let outcome = match expired {
            Ok(_) => f(tx.as_mut(), now, &mut events),
            Err(err) => Err(err),
        };

        let value = match outcome {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("{} rejected ({:?}): {}", op, err.kind(), err);
                return Err(err);
            }
        };
        tx.commit()?;

        for event in events {
            if let Err(err) = self.events.publish(event).await {
                tracing::warn!("Failed to publish event after {}: {}", op, err);
            }
        }
        Ok(value)
    }

    fn load_station(tx: &dyn FlowTx, station_id: Uuid) -> Result<Station> {
        tx.station(station_id)
            .ok_or_else(|| PreopError::NotFound(format!("Station {} not found", station_id)))
    }

    // ========== 命令 ==========

    pub async fn register_patient(&self, input: NewPatient) -> Result<RegisteredPatient> {
        self.run("register_patient", move |tx, now, events| {
            let (patient, steps) = PatientRegistry::new(tx).register(input, now)?;
            events.push(FlowEvent::PatientRegistered {
                patient_id: patient.id,
                steps: steps.iter().map(|s| s.step).collect(),
            });
            Ok(RegisteredPatient { patient, steps })
        })
        .await
    }

    /// 为站点叫下一位患者
    pub async fn call_next(&self, station_id: Uuid) -> Result<CallTicket> {
        let scheduler = &self.scheduler;
        self.run("call_next", move |tx, now, events| {
            let station = Self::load_station(tx, station_id)?;
            let selection = scheduler.select(&mut *tx, &station)?;
            let from_priority_pool = selection.from_priority_pool;
            let call = CallSession::new(&mut *tx, events).open(station_id, selection, now)?;

            let step = StepLedger::new(&mut *tx)
                .find_open(call.patient_id, call.step)
                .ok_or_else(|| PreopError::Internal(format!("called step of {} vanished", call.patient_id)))?;
            let patient = PatientRegistry::new(tx).get(call.patient_id)?;
            Ok(CallTicket {
                call,
                step,
                patient,
                from_priority_pool,
            })
        })
        .await
    }

    pub async fn start_service(&self, station_id: Uuid) -> Result<PatientStep> {
        self.start_service_for(station_id, None).await
    }

    /// 开始服务；容量为 2 的站点可以指定患者
    pub async fn start_service_for(&self, station_id: Uuid, patient_id: Option<Uuid>) -> Result<PatientStep> {
        self.run("start_service", move |tx, now, events| {
            CallSession::new(tx, events).start(station_id, patient_id, now)
        })
        .await
    }

    pub async fn finish_service(&self, station_id: Uuid, outcome: Option<ServiceOutcome>) -> Result<FinishReport> {
        self.finish_service_for(station_id, None, outcome).await
    }

    pub async fn finish_service_for(
        &self,
        station_id: Uuid,
        patient_id: Option<Uuid>,
        outcome: Option<ServiceOutcome>,
    ) -> Result<FinishReport> {
        self.run("finish_service", move |tx, now, events| {
            CallSession::new(tx, events).finish(station_id, patient_id, outcome, now)
        })
        .await
    }

    pub async fn cancel_call(&self, station_id: Uuid) -> Result<PatientStep> {
        self.cancel_call_for(station_id, None).await
    }

    pub async fn cancel_call_for(&self, station_id: Uuid, patient_id: Option<Uuid>) -> Result<PatientStep> {
        self.run("cancel_call", move |tx, now, events| {
            CallSession::new(tx, events).cancel(station_id, patient_id, now)
        })
        .await
    }

    /// 手动追加环节；已完成的患者会重新打开
    pub async fn add_step(&self, patient_id: Uuid, step: CircuitStep) -> Result<PatientStep> {
        self.run("add_step", move |tx, now, events| {
            add_steps_reopening(tx, patient_id, &[step], now, events)?
                .into_iter()
                .find(|row| row.step == step)
                .ok_or_else(|| PreopError::Internal("no step was added".to_string()))
        })
        .await
    }

    /// 追加心内科评估；缺少化验/心电图环节时一并补上
    pub async fn add_cardio_step(&self, patient_id: Uuid) -> Result<Vec<PatientStep>> {
        self.run("add_cardio_step", move |tx, now, events| {
            PatientRegistry::new(&mut *tx).get(patient_id)?;
            let existing = StepLedger::new(&mut *tx).list_for_patient(patient_id);
            if existing.iter().any(|row| row.step == CircuitStep::Cardiologista) {
                return Err(PreopError::StepAlreadyAdded {
                    patient_id,
                    step: CircuitStep::Cardiologista,
                });
            }
            add_steps_reopening(tx, patient_id, &[CircuitStep::Cardiologista], now, events)
        })
        .await
    }

    pub async fn add_image_exam(&self, patient_id: Uuid) -> Result<PatientStep> {
        self.run("add_image_exam", move |tx, now, events| {
            PatientRegistry::new(&mut *tx).get(patient_id)?;
            let existing = StepLedger::new(&mut *tx).list_for_patient(patient_id);
            if existing.iter().any(|row| row.step == CircuitStep::ExameImagem) {
                return Err(PreopError::StepAlreadyAdded {
                    patient_id,
                    step: CircuitStep::ExameImagem,
                });
            }
            let mut added = add_steps_reopening(tx, patient_id, &[CircuitStep::ExameImagem], now, events)?;
            added
                .pop()
                .ok_or_else(|| PreopError::Internal("no step was added".to_string()))
        })
        .await
    }

    /// 绑定或清除专科站点的专科
    pub async fn set_station_specialty(
        &self,
        station_id: Uuid,
        specialty: Option<MedicalSpecialty>,
    ) -> Result<Station> {
        self.run("set_station_specialty", move |tx, _, events| {
            let mut station = Self::load_station(tx, station_id)?;
            if station.step != CircuitStep::Especialista {
                return Err(PreopError::Validation(format!(
                    "{} 站点不能绑定专科",
                    station.step
                )));
            }
            station.current_specialty = specialty;
            tx.update_station(station.clone())?;
            tracing::info!("Station {} now serves {:?}", station.name, specialty);
            events.push(FlowEvent::StationSpecialtyChanged {
                station_id,
                specialty,
            });
            Ok(station)
        })
        .await
    }

    pub async fn set_station_active(&self, station_id: Uuid, active: bool) -> Result<Station> {
        self.run("set_station_active", move |tx, _, _| {
            let mut station = Self::load_station(tx, station_id)?;
            station.is_active = active;
            tx.update_station(station.clone())?;
            tracing::info!("Station {} active={}", station.name, active);
            Ok(station)
        })
        .await
    }

    pub async fn create_station(&self, input: NewStation) -> Result<Station> {
        self.run("create_station", move |tx, now, _| {
            let name = input.name.trim().to_string();
            if name.is_empty() {
                return Err(PreopError::Validation("站点名称不能为空".to_string()));
            }
            if input.station_number < 1 {
                return Err(PreopError::Validation(format!(
                    "站点号必须为正数: {}",
                    input.station_number
                )));
            }
            if input.specialty.is_some() && input.step != CircuitStep::Especialista {
                return Err(PreopError::Validation(format!(
                    "{} 站点不能绑定专科",
                    input.step
                )));
            }
            let mut station = Station::new(input.step, input.station_number, name, now);
            station.current_specialty = input.specialty;
            tx.insert_station(station.clone())?;
            tracing::info!("Created station {} ({} #{})", station.name, station.step, station.station_number);
            Ok(station)
        })
        .await
    }

    pub async fn mark_pending_scheduling(&self, patient_id: Uuid, reason: Option<String>) -> Result<Patient> {
        self.run("mark_pending_scheduling", move |tx, now, events| {
            let patient = PatientRegistry::new(tx).mark_pending_scheduling(patient_id, reason, now)?;
            events.push(FlowEvent::SchedulingPending {
                patient_id,
                reason: patient.scheduling_pending_reason.clone().unwrap_or_default(),
            });
            Ok(patient)
        })
        .await
    }

    pub async fn clear_pending_scheduling(&self, patient_id: Uuid) -> Result<Patient> {
        self.run("clear_pending_scheduling", move |tx, _, _| {
            PatientRegistry::new(tx).clear_pending_scheduling(patient_id)
        })
        .await
    }

    pub async fn reenter_circuit(&self, patient_id: Uuid, needs_cardio: bool) -> Result<Vec<PatientStep>> {
        self.run("reenter_circuit", move |tx, now, events| {
            let steps = PatientRegistry::new(tx).reenter_circuit(patient_id, needs_cardio, now)?;
            events.push(FlowEvent::CircuitReentered {
                patient_id,
                needs_cardio,
            });
            Ok(steps)
        })
        .await
    }

    pub async fn remove_patient(&self, patient_id: Uuid) -> Result<Patient> {
        self.run("remove_patient", move |tx, _, events| {
            let patient = PatientRegistry::new(tx).remove(patient_id)?;
            events.push(FlowEvent::PatientRemoved { patient_id });
            Ok(patient)
        })
        .await
    }

    /// 管理员直接标记环节完成
    pub async fn complete_step_manually(&self, step_id: Uuid) -> Result<PatientStep> {
        self.run("complete_step_manually", move |tx, now, events| {
            let row = StepLedger::new(&mut *tx).get(step_id)?;
            if row.status.is_active() {
                CallSession::new(&mut *tx, &mut *events).release_bindings(&row)?;
            }
            let transition = StepLedger::new(&mut *tx).transition(step_id, StepEvent::ForceComplete, now, None)?;
            events.push(FlowEvent::StepTransitioned {
                patient_id: row.patient_id,
                step_id,
                step: row.step,
                from: transition.before,
                to: transition.row.status,
                station_number: transition.row.station_number,
            });
            if PatientRegistry::new(tx).complete_if_done(row.patient_id, now)? {
                events.push(FlowEvent::PatientCompleted {
                    patient_id: row.patient_id,
                });
            }
            Ok(transition.row)
        })
        .await
    }

    /// 删除一条环节记录
    pub async fn remove_step(&self, step_id: Uuid) -> Result<PatientStep> {
        self.run("remove_step", move |tx, now, events| {
            let row = StepLedger::new(&mut *tx).get(step_id)?;
            if row.status.is_active() {
                CallSession::new(&mut *tx, &mut *events).release_bindings(&row)?;
            }
            StepLedger::new(&mut *tx).delete(step_id)?;
            tracing::info!("Removed {} step of patient {}", row.step, row.patient_id);
            if PatientRegistry::new(tx).complete_if_done(row.patient_id, now)? {
                events.push(FlowEvent::PatientCompleted {
                    patient_id: row.patient_id,
                });
            }
            Ok(row)
        })
        .await
    }

    /// 处理超时叫号，返回本次取消的数量
    pub async fn expire_stale_calls(&self) -> Result<usize> {
        self.run("expire_stale_calls", |_, _, events| {
            Ok(events
                .iter()
                .filter(|e| matches!(e, FlowEvent::CallExpired { .. }))
                .count())
        })
        .await
    }

    // ========== 查询 ==========

    pub async fn list_patients(&self, range: Option<DateRange>) -> Result<Vec<Patient>> {
        self.run("list_patients", move |tx, _, _| {
            Ok(tx.patients(&PatientFilter {
                created_within: range,
                ..Default::default()
            }))
        })
        .await
    }

    pub async fn patient(&self, patient_id: Uuid) -> Result<Patient> {
        self.run("patient", move |tx, _, _| PatientRegistry::new(tx).get(patient_id))
            .await
    }

    pub async fn list_steps(&self, filter: StepFilter) -> Result<Vec<PatientStep>> {
        self.run("list_steps", move |tx, _, _| Ok(tx.steps(&filter))).await
    }

    pub async fn list_stations(&self, filter: StationFilter) -> Result<Vec<Station>> {
        self.run("list_stations", move |tx, _, _| Ok(tx.stations(&filter)))
            .await
    }

    pub async fn list_active_announcements(&self, limit: usize) -> Result<Vec<TvCall>> {
        self.run("list_active_announcements", move |tx, _, _| {
            Ok(AnnouncementFeed::new(tx).active(limit))
        })
        .await
    }

    pub async fn day_report(&self, range: DateRange) -> Result<DayReport> {
        self.run("day_report", move |tx, _, _| {
            let patients = tx.patients(&PatientFilter::default());
            let steps = tx.steps(&StepFilter::default());
            Ok(ReportingAggregator.day_report(&patients, &steps, range))
        })
        .await
    }

    pub async fn queue_stats(&self) -> Result<Vec<QueueStats>> {
        self.run("queue_stats", |tx, _, _| {
            Ok(ReportingAggregator.queue_stats(&tx.steps(&StepFilter::default())))
        })
        .await
    }
}

/// 追加环节，同步需求标志，患者已完成时重新打开
///
/// 患者尚无记录的前置环节排在所需环节之前一并追加。
fn add_steps_reopening(
    tx: &mut dyn FlowTx,
    patient_id: Uuid,
    requested: &[CircuitStep],
    now: DateTime<Utc>,
    events: &mut Vec<FlowEvent>,
) -> Result<Vec<PatientStep>> {
    let existing = StepLedger::new(&mut *tx).list_for_patient(patient_id);
    let mut steps = Vec::with_capacity(requested.len());
    for &step in requested {
        for &required in catalog::prerequisites(step) {
            let missing = !existing.iter().any(|row| row.step == required);
            if missing && !steps.contains(&required) && !requested.contains(&required) {
                steps.push(required);
            }
        }
        steps.push(step);
    }

    let mut registry = PatientRegistry::new(&mut *tx);
    let patient = registry.get(patient_id)?;
    for &step in &steps {
        registry.note_added_step(patient_id, step)?;
    }
    if patient.is_completed {
        registry.reopen(patient_id)?;
    }

    let added = StepLedger::new(tx).add_steps(patient_id, &steps, now)?;
    for row in &added {
        tracing::info!("Added {} step for patient {}", row.step, patient_id);
        events.push(FlowEvent::StepAdded {
            patient_id,
            step: row.step,
        });
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use preop_core::{FlowType, StepStatus};

    async fn engine_with_station(step: CircuitStep) -> (FlowEngine, Station) {
        let engine = FlowEngine::in_memory(SchedulerConfig::default());
        let station = engine
            .create_station(NewStation {
                step,
                station_number: 1,
                name: format!("{} 1", step.label()),
                specialty: None,
            })
            .await
            .unwrap();
        (engine, station)
    }

    #[tokio::test]
    async fn test_events_are_published_after_commit() {
        let (engine, station) = engine_with_station(CircuitStep::TriagemMedica).await;
        let mut rx = engine.event_bus().subscribe();

        engine
            .register_patient(NewPatient::new("Ana", FlowType::CircuitoPreop))
            .await
            .unwrap();
        engine.call_next(station.id).await.unwrap();

        assert_matches!(rx.recv().await.unwrap(), FlowEvent::PatientRegistered { .. });
        assert_matches!(
            rx.recv().await.unwrap(),
            FlowEvent::StepTransitioned {
                from: StepStatus::Pending,
                to: StepStatus::Called,
                ..
            }
        );
        assert_matches!(rx.recv().await.unwrap(), FlowEvent::PatientCalled { .. });
    }

    #[tokio::test]
    async fn test_rejected_command_changes_nothing() {
        let (engine, station) = engine_with_station(CircuitStep::TriagemMedica).await;
        let registered = engine
            .register_patient(NewPatient::new("Ana", FlowType::CircuitoPreop))
            .await
            .unwrap();

        assert_matches!(
            engine.add_step(registered.patient.id, CircuitStep::TriagemMedica).await,
            Err(PreopError::DuplicateStep { .. })
        );
        assert_matches!(
            engine.start_service(station.id).await,
            Err(PreopError::NoPatientCalled { .. })
        );
        let steps = engine
            .list_steps(StepFilter::for_patient(registered.patient.id))
            .await
            .unwrap();
        assert_eq!(steps.len(), 3);
    }

    #[tokio::test]
    async fn test_add_cardio_step_ensures_ecg() {
        let engine = FlowEngine::in_memory(SchedulerConfig::default());
        let registered = engine
            .register_patient(
                NewPatient::new("Rosa", FlowType::ConsultaRetorno)
                    .with_specialty(MedicalSpecialty::Geral),
            )
            .await
            .unwrap();
        let id = registered.patient.id;

        let added = engine.add_cardio_step(id).await.unwrap();
        let kinds: Vec<CircuitStep> = added.iter().map(|s| s.step).collect();
        assert_eq!(kinds, vec![CircuitStep::ExamesLabEcg, CircuitStep::Cardiologista]);
        assert!(engine.patient(id).await.unwrap().needs_cardio);

        assert_matches!(
            engine.add_cardio_step(id).await,
            Err(PreopError::StepAlreadyAdded {
                step: CircuitStep::Cardiologista,
                ..
            })
        );
        engine.add_image_exam(id).await.unwrap();
        assert_matches!(
            engine.add_image_exam(id).await,
            Err(PreopError::StepAlreadyAdded { .. })
        );
    }

    #[tokio::test]
    async fn test_add_step_brings_missing_prerequisite() {
        let (engine, cardio) = engine_with_station(CircuitStep::Cardiologista).await;
        let registered = engine
            .register_patient(
                NewPatient::new("Otávio", FlowType::ConsultaRetorno)
                    .with_specialty(MedicalSpecialty::Geral),
            )
            .await
            .unwrap();
        let id = registered.patient.id;

        let row = engine.add_step(id, CircuitStep::Cardiologista).await.unwrap();
        assert_eq!(row.step, CircuitStep::Cardiologista);
        let ecg = engine
            .list_steps(StepFilter::for_patient(id).with_step(CircuitStep::ExamesLabEcg))
            .await
            .unwrap();
        assert_eq!(ecg.len(), 1);
        assert_eq!(ecg[0].status, StepStatus::Pending);

        // 心电图完成后即可叫号
        assert_matches!(
            engine.call_next(cardio.id).await,
            Err(PreopError::EcgPrerequisiteNotMet { waiting: 1 })
        );
        engine.complete_step_manually(ecg[0].id).await.unwrap();
        let ticket = engine.call_next(cardio.id).await.unwrap();
        assert_eq!(ticket.patient.id, id);
    }

    #[tokio::test]
    async fn test_add_step_keeps_existing_prerequisite() {
        let engine = FlowEngine::in_memory(SchedulerConfig::default());
        let registered = engine
            .register_patient(NewPatient::new("Paula", FlowType::CircuitoPreop))
            .await
            .unwrap();
        let id = registered.patient.id;

        engine.add_step(id, CircuitStep::Cardiologista).await.unwrap();
        let rows = engine.list_steps(StepFilter::for_patient(id)).await.unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(
            rows.iter().filter(|r| r.step == CircuitStep::ExamesLabEcg).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_manual_completion_cascades() {
        let engine = FlowEngine::in_memory(SchedulerConfig::default());
        let registered = engine
            .register_patient(NewPatient::new("Davi", FlowType::CircuitoPreop))
            .await
            .unwrap();

        let (last, rest) = registered.steps.split_last().unwrap();
        for row in rest {
            engine.complete_step_manually(row.id).await.unwrap();
        }
        assert!(!engine.patient(registered.patient.id).await.unwrap().is_completed);

        let row = engine.complete_step_manually(last.id).await.unwrap();
        assert_eq!(row.status, StepStatus::Completed);
        assert!(row.started_at.is_some());
        let patient = engine.patient(registered.patient.id).await.unwrap();
        assert!(patient.is_completed);
        assert!(patient.completed_at.is_some());

        // 已完成的患者追加环节后重新打开
        engine
            .add_step(registered.patient.id, CircuitStep::ExameImagem)
            .await
            .unwrap();
        let patient = engine.patient(registered.patient.id).await.unwrap();
        assert!(!patient.is_completed);
        assert!(patient.needs_image_exam);
    }

    #[tokio::test]
    async fn test_remove_step_releases_active_call() {
        let (engine, station) = engine_with_station(CircuitStep::TriagemMedica).await;
        let registered = engine
            .register_patient(NewPatient::new("Eva", FlowType::CircuitoPreop))
            .await
            .unwrap();
        let ticket = engine.call_next(station.id).await.unwrap();

        engine.remove_step(ticket.step.id).await.unwrap();
        let patient = engine.patient(registered.patient.id).await.unwrap();
        assert!(!patient.is_being_served);
        assert!(engine.list_active_announcements(5).await.unwrap().is_empty());
        let stations = engine.list_stations(StationFilter::default()).await.unwrap();
        assert!(stations[0].current_patient_ids.is_empty());
    }

    #[tokio::test]
    async fn test_station_administration() {
        let (engine, station) = engine_with_station(CircuitStep::TriagemMedica).await;
        assert_matches!(
            engine
                .set_station_specialty(station.id, Some(MedicalSpecialty::Oftalmo))
                .await,
            Err(PreopError::Validation(_))
        );
        assert_matches!(
            engine
                .create_station(NewStation {
                    step: CircuitStep::TriagemMedica,
                    station_number: 1,
                    name: "Triagem bis".into(),
                    specialty: None,
                })
                .await,
            Err(PreopError::Validation(_))
        );

        engine.set_station_active(station.id, false).await.unwrap();
        engine
            .register_patient(NewPatient::new("Fabio", FlowType::CircuitoPreop))
            .await
            .unwrap();
        assert_matches!(
            engine.call_next(station.id).await,
            Err(PreopError::StationInactive(_))
        );
    }
}
