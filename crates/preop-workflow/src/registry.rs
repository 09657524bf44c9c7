//! 患者登记
//!
//! 管理患者记录及其生命周期标志（优先、服务中、已完成、手术指征、待排期）

use crate::announcements::AnnouncementFeed;
use crate::catalog;
use crate::ledger::StepLedger;
use chrono::{DateTime, Utc};
use preop_core::utils::{normalize_name, normalize_registration_number};
use preop_core::{CircuitStep, DischargeOutcome, NewPatient, Patient, PatientStep, PreopError, Result};
use preop_store::{FlowTx, PatientFilter, StationFilter};
use uuid::Uuid;

/// 未填写原因时的默认待排期说明
pub const DEFAULT_PENDING_REASON: &str = "Data de cirurgia não definida";

/// 患者登记处
pub struct PatientRegistry<'t, T: FlowTx + ?Sized> {
    tx: &'t mut T,
}

impl<'t, T: FlowTx + ?Sized> PatientRegistry<'t, T> {
    pub fn new(tx: &'t mut T) -> Self {
        Self { tx }
    }

    /// 登记新患者并按就诊类型创建初始环节
    pub fn register(&mut self, input: NewPatient, now: DateTime<Utc>) -> Result<(Patient, Vec<PatientStep>)> {
        let name = normalize_name(&input.name)?;
        let registration_number = normalize_registration_number(input.registration_number.as_deref())?;
        let steps = catalog::initial_steps(input.flow_type, input.needs_cardio, input.needs_image_exam);

        let mut patient = Patient::from_input(input, now);
        patient.name = name;
        patient.registration_number = registration_number;
        self.tx.insert_patient(patient.clone())?;

        let rows = StepLedger::new(&mut *self.tx).add_steps(patient.id, &steps, now)?;
        tracing::info!(
            "Registered patient {} ({}) with {} steps",
            patient.id,
            patient.flow_type,
            rows.len()
        );
        Ok((patient, rows))
    }

    pub fn get(&self, patient_id: Uuid) -> Result<Patient> {
        self.tx
            .patient(patient_id)
            .ok_or_else(|| PreopError::NotFound(format!("Patient {} not found", patient_id)))
    }

    pub fn list(&self, filter: &PatientFilter) -> Vec<Patient> {
        self.tx.patients(filter)
    }

    fn update<F>(&mut self, patient_id: Uuid, apply: F) -> Result<Patient>
    where
        F: FnOnce(&mut Patient),
    {
        let mut patient = self.get(patient_id)?;
        apply(&mut patient);
        self.tx.update_patient(patient.clone())?;
        Ok(patient)
    }

    pub fn mark_being_served(&mut self, patient_id: Uuid, serving: bool) -> Result<Patient> {
        self.update(patient_id, |p| p.is_being_served = serving)
    }

    /// 标记患者完成，返回是否为本次新完成
    pub fn mark_completed(&mut self, patient_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let patient = self.get(patient_id)?;
        if patient.is_completed {
            return Ok(false);
        }
        self.update(patient_id, |p| {
            p.is_completed = true;
            p.completed_at = Some(now);
        })?;
        tracing::info!("Patient {} completed the circuit", patient_id);
        Ok(true)
    }

    /// 全部环节完成时标记患者完成
    pub fn complete_if_done(&mut self, patient_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        if !StepLedger::new(&mut *self.tx).is_all_completed(patient_id) {
            return Ok(false);
        }
        self.mark_completed(patient_id, now)
    }

    /// 撤销完成状态（新增环节时使用）
    pub fn reopen(&mut self, patient_id: Uuid) -> Result<Patient> {
        self.update(patient_id, |p| {
            p.is_completed = false;
            p.completed_at = None;
        })
    }

    /// 专科判定手术指征后重新进入术前流程
    pub fn reenter_circuit(
        &mut self,
        patient_id: Uuid,
        needs_cardio: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<PatientStep>> {
        self.get(patient_id)?;
        let rows = StepLedger::new(&mut *self.tx).add_steps(
            patient_id,
            &catalog::reentry_steps(needs_cardio),
            now,
        )?;
        self.update(patient_id, |p| {
            p.is_completed = false;
            p.completed_at = None;
            p.has_surgery_indication = true;
            p.needs_cardio |= needs_cardio;
        })?;
        tracing::info!(
            "Patient {} re-entered the pre-op circuit (needs_cardio={})",
            patient_id,
            needs_cardio
        );
        Ok(rows)
    }

    pub fn mark_pending_scheduling(
        &mut self,
        patient_id: Uuid,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Patient> {
        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_PENDING_REASON.to_string());
        self.update(patient_id, |p| {
            p.pending_surgery_scheduling = true;
            p.scheduling_pending_at = Some(now);
            p.scheduling_pending_reason = Some(reason);
        })
    }

    pub fn clear_pending_scheduling(&mut self, patient_id: Uuid) -> Result<Patient> {
        self.update(patient_id, |p| {
            p.pending_surgery_scheduling = false;
            p.scheduling_pending_at = None;
            p.scheduling_pending_reason = None;
        })
    }

    pub fn record_discharge(&mut self, patient_id: Uuid, outcome: DischargeOutcome) -> Result<Patient> {
        self.update(patient_id, |p| p.discharge_outcome = Some(outcome))
    }

    /// 手动追加环节时同步需求标志
    pub fn note_added_step(&mut self, patient_id: Uuid, step: CircuitStep) -> Result<Patient> {
        self.update(patient_id, |p| match step {
            CircuitStep::Cardiologista => p.needs_cardio = true,
            CircuitStep::ExameImagem => p.needs_image_exam = true,
            _ => {}
        })
    }

    /// 删除患者及其环节、公告和站点绑定
    pub fn remove(&mut self, patient_id: Uuid) -> Result<Patient> {
        let patient = self.get(patient_id)?;

        for mut station in self.tx.stations(&StationFilter::default()) {
            if station.release_patient(patient_id) {
                self.tx.update_station(station)?;
            }
        }

        let mut ledger = StepLedger::new(&mut *self.tx);
        for row in ledger.list_for_patient(patient_id) {
            ledger.delete(row.id)?;
        }
        AnnouncementFeed::new(&mut *self.tx).purge_patient(patient_id)?;
        self.tx.delete_patient(patient_id)?;

        tracing::info!("Removed patient {}", patient_id);
        Ok(patient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use preop_core::{FlowType, MedicalSpecialty, Station, StepStatus};
    use preop_store::{FlowStore, MemoryStore};

    #[tokio::test]
    async fn test_register_seeds_catalog_steps() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let mut registry = PatientRegistry::new(tx.as_mut());

        let input = NewPatient::new("  Paulo   Reis ", FlowType::CircuitoPreop)
            .needs_cardio(true)
            .with_registration_number("HC-1001");
        let (patient, steps) = registry.register(input, Utc::now()).unwrap();

        assert_eq!(patient.name, "Paulo Reis");
        assert_eq!(patient.registration_number.as_deref(), Some("HC-1001"));
        let kinds: Vec<CircuitStep> = steps.iter().map(|s| s.step).collect();
        assert_eq!(
            kinds,
            vec![
                CircuitStep::TriagemMedica,
                CircuitStep::ExamesLabEcg,
                CircuitStep::Agendamento,
                CircuitStep::Cardiologista,
            ]
        );
        assert!(steps.iter().all(|s| s.status == StepStatus::Pending));
    }

    #[tokio::test]
    async fn test_invalid_input_touches_nothing() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let mut registry = PatientRegistry::new(tx.as_mut());

        assert_matches!(
            registry.register(NewPatient::new("   ", FlowType::CircuitoPreop), Utc::now()),
            Err(PreopError::Validation(_))
        );
        assert_matches!(
            registry.register(
                NewPatient::new("Rui", FlowType::CircuitoPreop).with_registration_number("a b"),
                Utc::now()
            ),
            Err(PreopError::Validation(_))
        );
        assert!(registry.list(&PatientFilter::default()).is_empty());
    }

    #[tokio::test]
    async fn test_completion_and_reentry() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let now = Utc::now();
        let mut registry = PatientRegistry::new(tx.as_mut());

        let (patient, _) = registry
            .register(
                NewPatient::new("Lia", FlowType::ConsultaEspecialista).with_specialty(MedicalSpecialty::Urologia),
                now,
            )
            .unwrap();
        assert!(!registry.complete_if_done(patient.id, now).unwrap());

        assert!(registry.mark_completed(patient.id, now).unwrap());
        assert!(!registry.mark_completed(patient.id, now).unwrap());

        let steps = registry.reenter_circuit(patient.id, false, now).unwrap();
        assert_eq!(steps.len(), 3);
        let patient = registry.get(patient.id).unwrap();
        assert!(patient.has_surgery_indication);
        assert!(!patient.is_completed);
        assert!(patient.completed_at.is_none());

        // 术前环节尚未完成时不能再次入径
        assert_matches!(
            registry.reenter_circuit(patient.id, true, now),
            Err(PreopError::DuplicateStep { .. })
        );
    }

    #[tokio::test]
    async fn test_pending_scheduling_reason() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let now = Utc::now();
        let mut registry = PatientRegistry::new(tx.as_mut());
        let (patient, _) = registry
            .register(NewPatient::new("Noel", FlowType::CircuitoPreop), now)
            .unwrap();

        let marked = registry.mark_pending_scheduling(patient.id, Some(" ".into()), now).unwrap();
        assert!(marked.pending_surgery_scheduling);
        assert_eq!(marked.scheduling_pending_reason.as_deref(), Some(DEFAULT_PENDING_REASON));

        let cleared = registry.clear_pending_scheduling(patient.id).unwrap();
        assert!(!cleared.pending_surgery_scheduling);
        assert!(cleared.scheduling_pending_at.is_none());
    }

    #[tokio::test]
    async fn test_remove_cascades() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let now = Utc::now();

        let mut station = Station::new(CircuitStep::TriagemMedica, 1, "Triagem 1", now);
        let (patient, _) = PatientRegistry::new(tx.as_mut())
            .register(NewPatient::new("Ivo", FlowType::CircuitoPreop), now)
            .unwrap();
        station.bind_patient(patient.id);
        tx.insert_station(station.clone()).unwrap();
        AnnouncementFeed::new(tx.as_mut()).announce(&patient, &station, now).unwrap();

        PatientRegistry::new(tx.as_mut()).remove(patient.id).unwrap();

        assert!(tx.patient(patient.id).is_none());
        assert!(StepLedger::new(tx.as_mut()).list_for_patient(patient.id).is_empty());
        assert!(AnnouncementFeed::new(tx.as_mut()).active(5).is_empty());
        assert!(tx.station(station.id).unwrap().current_patient_ids.is_empty());
    }
}
