//! 内存存储实现
//!
//! 全局互斥锁保证事务串行执行；事务在各表的写时复制副本上工作，
//! 提交时整体替换，丢弃时原表不受影响。

use crate::filters::{CallFilter, PatientFilter, StationFilter, StepFilter};
use crate::store::{FlowStore, FlowTx, RotationKey};
use async_trait::async_trait;
use preop_core::{Patient, PatientStep, PreopError, Result, Station, StepStatus, TvCall};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// 全部数据表
#[derive(Debug, Clone, Default)]
pub struct FlowTables {
    patients: Arc<Vec<Patient>>,
    steps: Arc<Vec<PatientStep>>,
    stations: Arc<Vec<Station>>,
    tv_calls: Arc<Vec<TvCall>>,
    rotation: Arc<HashMap<RotationKey, u32>>,
}

impl FlowTables {
    pub fn patients(&self) -> &[Patient] {
        &self.patients
    }

    pub fn steps(&self) -> &[PatientStep] {
        &self.steps
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn tv_calls(&self) -> &[TvCall] {
        &self.tv_calls
    }
}

/// 内存存储
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<FlowTables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取已提交数据的快照
    pub async fn snapshot(&self) -> FlowTables {
        self.tables.lock().await.clone()
    }
}

#[async_trait]
impl FlowStore for MemoryStore {
    async fn begin<'a>(&'a self) -> Result<Box<dyn FlowTx + 'a>> {
        let guard = self.tables.lock().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }
}

/// 内存事务
struct MemoryTx<'a> {
    guard: MutexGuard<'a, FlowTables>,
    working: FlowTables,
}

impl MemoryTx<'_> {
    fn patient_index(&self, id: Uuid) -> Option<usize> {
        self.working.patients.iter().position(|p| p.id == id)
    }

    fn step_index(&self, id: Uuid) -> Option<usize> {
        self.working.steps.iter().position(|s| s.id == id)
    }

    fn station_index(&self, id: Uuid) -> Option<usize> {
        self.working.stations.iter().position(|s| s.id == id)
    }

    fn tv_call_index(&self, id: Uuid) -> Option<usize> {
        self.working.tv_calls.iter().position(|c| c.id == id)
    }

    fn ensure_patient(&self, patient_id: Uuid, what: &str) -> Result<()> {
        if self.patient_index(patient_id).is_none() {
            return Err(PreopError::DataIntegrity(format!(
                "{} references missing patient {}",
                what, patient_id
            )));
        }
        Ok(())
    }
}

impl FlowTx for MemoryTx<'_> {
    fn patient(&self, id: Uuid) -> Option<Patient> {
        self.patient_index(id).map(|i| self.working.patients[i].clone())
    }

    fn patients(&self, filter: &PatientFilter) -> Vec<Patient> {
        let mut rows: Vec<Patient> = self
            .working
            .patients
            .iter()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.created_at);
        rows
    }

    fn insert_patient(&mut self, patient: Patient) -> Result<()> {
        if self.patient_index(patient.id).is_some() {
            return Err(PreopError::Storage(format!("patient {} already exists", patient.id)));
        }
        Arc::make_mut(&mut self.working.patients).push(patient);
        Ok(())
    }

    fn update_patient(&mut self, patient: Patient) -> Result<()> {
        let index = self
            .patient_index(patient.id)
            .ok_or_else(|| PreopError::NotFound(format!("Patient {} not found", patient.id)))?;
        Arc::make_mut(&mut self.working.patients)[index] = patient;
        Ok(())
    }

    fn delete_patient(&mut self, id: Uuid) -> Result<()> {
        let index = self
            .patient_index(id)
            .ok_or_else(|| PreopError::NotFound(format!("Patient {} not found", id)))?;
        Arc::make_mut(&mut self.working.patients).remove(index);
        Ok(())
    }

    fn step(&self, id: Uuid) -> Option<PatientStep> {
        self.step_index(id).map(|i| self.working.steps[i].clone())
    }

    fn steps(&self, filter: &StepFilter) -> Vec<PatientStep> {
        self.working
            .steps
            .iter()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect()
    }

    fn insert_step(&mut self, step: PatientStep) -> Result<()> {
        self.ensure_patient(step.patient_id, "step")?;
        if self.step_index(step.id).is_some() {
            return Err(PreopError::Storage(format!("step {} already exists", step.id)));
        }
        Arc::make_mut(&mut self.working.steps).push(step);
        Ok(())
    }

    fn update_step(&mut self, step: PatientStep, expected: StepStatus) -> Result<()> {
        let index = self
            .step_index(step.id)
            .ok_or_else(|| PreopError::NotFound(format!("Step {} not found", step.id)))?;
        let current = self.working.steps[index].status;
        if current != expected {
            return Err(PreopError::LostRace(format!(
                "step {} is {} but {} was expected",
                step.id, current, expected
            )));
        }
        Arc::make_mut(&mut self.working.steps)[index] = step;
        Ok(())
    }

    fn delete_step(&mut self, id: Uuid) -> Result<()> {
        let index = self
            .step_index(id)
            .ok_or_else(|| PreopError::NotFound(format!("Step {} not found", id)))?;
        Arc::make_mut(&mut self.working.steps).remove(index);
        Ok(())
    }

    fn station(&self, id: Uuid) -> Option<Station> {
        self.station_index(id).map(|i| self.working.stations[i].clone())
    }

    fn stations(&self, filter: &StationFilter) -> Vec<Station> {
        let mut rows: Vec<Station> = self
            .working
            .stations
            .iter()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        rows.sort_by_key(|s| (s.step, s.station_number));
        rows
    }

    fn insert_station(&mut self, station: Station) -> Result<()> {
        let taken = self
            .working
            .stations
            .iter()
            .any(|s| s.id == station.id || (s.step == station.step && s.station_number == station.station_number));
        if taken {
            return Err(PreopError::Validation(format!(
                "station {} #{} already exists",
                station.step, station.station_number
            )));
        }
        Arc::make_mut(&mut self.working.stations).push(station);
        Ok(())
    }

    fn update_station(&mut self, station: Station) -> Result<()> {
        let index = self
            .station_index(station.id)
            .ok_or_else(|| PreopError::NotFound(format!("Station {} not found", station.id)))?;
        Arc::make_mut(&mut self.working.stations)[index] = station;
        Ok(())
    }

    fn tv_calls(&self, filter: &CallFilter) -> Vec<TvCall> {
        let mut rows: Vec<TvCall> = self
            .working
            .tv_calls
            .iter()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.called_at.cmp(&a.called_at));
        rows
    }

    fn insert_tv_call(&mut self, call: TvCall) -> Result<()> {
        self.ensure_patient(call.patient_id, "tv call")?;
        Arc::make_mut(&mut self.working.tv_calls).push(call);
        Ok(())
    }

    fn update_tv_call(&mut self, call: TvCall) -> Result<()> {
        let index = self
            .tv_call_index(call.id)
            .ok_or_else(|| PreopError::NotFound(format!("TV call {} not found", call.id)))?;
        Arc::make_mut(&mut self.working.tv_calls)[index] = call;
        Ok(())
    }

    fn delete_tv_call(&mut self, id: Uuid) -> Result<()> {
        let index = self
            .tv_call_index(id)
            .ok_or_else(|| PreopError::NotFound(format!("TV call {} not found", id)))?;
        Arc::make_mut(&mut self.working.tv_calls).remove(index);
        Ok(())
    }

    fn rotation_counter(&self, key: &RotationKey) -> u32 {
        self.working.rotation.get(key).copied().unwrap_or(0)
    }

    fn set_rotation_counter(&mut self, key: RotationKey, value: u32) {
        Arc::make_mut(&mut self.working.rotation).insert(key, value);
    }

    fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
