//! 查询过滤器

use preop_core::{CircuitStep, DateRange, MedicalSpecialty, Patient, PatientStep, Station, StepStatus, TvCall};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 患者查询过滤器
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientFilter {
    pub created_within: Option<DateRange>,
    pub is_completed: Option<bool>,
    pub is_being_served: Option<bool>,
    pub pending_surgery_scheduling: Option<bool>,
    pub specialty: Option<MedicalSpecialty>,
}

impl PatientFilter {
    pub fn matches(&self, patient: &Patient) -> bool {
        self.created_within
            .map_or(true, |range| range.contains(patient.created_at))
            && self.is_completed.map_or(true, |v| patient.is_completed == v)
            && self.is_being_served.map_or(true, |v| patient.is_being_served == v)
            && self
                .pending_surgery_scheduling
                .map_or(true, |v| patient.pending_surgery_scheduling == v)
            && self.specialty.map_or(true, |s| patient.specialty == s)
    }
}

/// 环节查询过滤器
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepFilter {
    pub patient_id: Option<Uuid>,
    pub step: Option<CircuitStep>,
    pub statuses: Option<Vec<StepStatus>>,
    pub station_number: Option<i32>,
    pub created_within: Option<DateRange>,
}

impl StepFilter {
    pub fn for_patient(patient_id: Uuid) -> Self {
        Self {
            patient_id: Some(patient_id),
            ..Default::default()
        }
    }

    pub fn for_step(step: CircuitStep) -> Self {
        Self {
            step: Some(step),
            ..Default::default()
        }
    }

    pub fn with_statuses(mut self, statuses: &[StepStatus]) -> Self {
        self.statuses = Some(statuses.to_vec());
        self
    }

    pub fn with_station_number(mut self, station_number: i32) -> Self {
        self.station_number = Some(station_number);
        self
    }

    pub fn with_step(mut self, step: CircuitStep) -> Self {
        self.step = Some(step);
        self
    }

    pub fn matches(&self, row: &PatientStep) -> bool {
        self.patient_id.map_or(true, |id| row.patient_id == id)
            && self.step.map_or(true, |step| row.step == step)
            && self
                .statuses
                .as_ref()
                .map_or(true, |statuses| statuses.contains(&row.status))
            && self
                .station_number
                .map_or(true, |number| row.station_number == Some(number))
            && self
                .created_within
                .map_or(true, |range| range.contains(row.created_at))
    }
}

/// 站点查询过滤器
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationFilter {
    pub step: Option<CircuitStep>,
    pub active_only: bool,
}

impl StationFilter {
    pub fn matches(&self, station: &Station) -> bool {
        self.step.map_or(true, |step| station.step == step) && (!self.active_only || station.is_active)
    }
}

/// 叫号公告查询过滤器
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallFilter {
    pub patient_id: Option<Uuid>,
    pub step: Option<CircuitStep>,
    pub active_only: bool,
}

impl CallFilter {
    pub fn matches(&self, call: &TvCall) -> bool {
        self.patient_id.map_or(true, |id| call.patient_id == id)
            && self.step.map_or(true, |step| call.step == step)
            && (!self.active_only || call.is_active)
    }
}
