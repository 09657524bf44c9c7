//! 核心数据模型定义

use crate::error::PreopError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// 术前流程环节
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum CircuitStep {
    TriagemMedica, // 医学分诊
    ExamesLabEcg,  // 化验/心电图
    Agendamento,   // 手术排期
    Cardiologista, // 心内科评估
    ExameImagem,   // 影像检查
    Especialista,  // 专科门诊
}

impl CircuitStep {
    /// 全部环节，按流程顺序
    pub const ALL: [CircuitStep; 6] = [
        CircuitStep::TriagemMedica,
        CircuitStep::ExamesLabEcg,
        CircuitStep::Agendamento,
        CircuitStep::Cardiologista,
        CircuitStep::ExameImagem,
        CircuitStep::Especialista,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TriagemMedica => "triagem_medica",
            Self::ExamesLabEcg => "exames_lab_ecg",
            Self::Agendamento => "agendamento",
            Self::Cardiologista => "cardiologista",
            Self::ExameImagem => "exame_imagem",
            Self::Especialista => "especialista",
        }
    }

    /// 显示名称
    pub fn label(&self) -> &'static str {
        match self {
            Self::TriagemMedica => "Triagem Médica",
            Self::ExamesLabEcg => "Exames Lab/ECG",
            Self::Agendamento => "Agendamento",
            Self::Cardiologista => "Cardiologista",
            Self::ExameImagem => "Exame de Imagem",
            Self::Especialista => "Consulta Especialista",
        }
    }
}

impl fmt::Display for CircuitStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CircuitStep {
    type Err = PreopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CircuitStep::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| PreopError::UnknownValue {
                kind: "circuit_step",
                value: s.to_string(),
            })
    }
}

/// 环节状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,    // 等待中
    Called,     // 已叫号
    InProgress, // 服务中
    Completed,  // 已完成
}

impl StepStatus {
    /// 是否占用站点（已叫号或服务中）
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Called | Self::InProgress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Called => "called",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "Aguardando",
            Self::Called => "Chamado",
            Self::InProgress => "Em Atendimento",
            Self::Completed => "Concluído",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepStatus {
    type Err = PreopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "called" => Ok(Self::Called),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            _ => Err(PreopError::UnknownValue {
                kind: "step_status",
                value: s.to_string(),
            }),
        }
    }
}

/// 就诊流程类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    ConsultaEspecialista, // 专科首诊
    ConsultaRetorno,      // 专科复诊
    CircuitoPreop,        // 直接进入术前流程
}

impl FlowType {
    pub const ALL: [FlowType; 3] = [
        FlowType::ConsultaEspecialista,
        FlowType::ConsultaRetorno,
        FlowType::CircuitoPreop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConsultaEspecialista => "consulta_especialista",
            Self::ConsultaRetorno => "consulta_retorno",
            Self::CircuitoPreop => "circuito_preop",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::ConsultaEspecialista => "Primeira Consulta com Especialista",
            Self::ConsultaRetorno => "Retorno com Especialista",
            Self::CircuitoPreop => "Circuito Pré-Operatório",
        }
    }
}

impl fmt::Display for FlowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlowType {
    type Err = PreopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FlowType::ALL
            .into_iter()
            .find(|flow| flow.as_str() == s)
            .ok_or_else(|| PreopError::UnknownValue {
                kind: "flow_type",
                value: s.to_string(),
            })
    }
}

/// 医学专科
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MedicalSpecialty {
    Ortopedia,
    Otorrino,
    Oftalmo,
    Trauma,
    #[default]
    Geral,
    Urologia,
    Ginecologia,
    Cardiologia,
    Outros,
}

impl MedicalSpecialty {
    pub const ALL: [MedicalSpecialty; 9] = [
        MedicalSpecialty::Ortopedia,
        MedicalSpecialty::Otorrino,
        MedicalSpecialty::Oftalmo,
        MedicalSpecialty::Trauma,
        MedicalSpecialty::Geral,
        MedicalSpecialty::Urologia,
        MedicalSpecialty::Ginecologia,
        MedicalSpecialty::Cardiologia,
        MedicalSpecialty::Outros,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ortopedia => "ORTOPEDIA",
            Self::Otorrino => "OTORRINO",
            Self::Oftalmo => "OFTALMO",
            Self::Trauma => "TRAUMA",
            Self::Geral => "GERAL",
            Self::Urologia => "UROLOGIA",
            Self::Ginecologia => "GINECOLOGIA",
            Self::Cardiologia => "CARDIOLOGIA",
            Self::Outros => "OUTROS",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Ortopedia => "Ortopedia",
            Self::Otorrino => "Otorrino",
            Self::Oftalmo => "Oftalmo",
            Self::Trauma => "Trauma",
            Self::Geral => "Geral",
            Self::Urologia => "Urologia",
            Self::Ginecologia => "Ginecologia",
            Self::Cardiologia => "Cardiologia",
            Self::Outros => "Outros",
        }
    }
}

impl fmt::Display for MedicalSpecialty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MedicalSpecialty {
    type Err = PreopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MedicalSpecialty::ALL
            .into_iter()
            .find(|specialty| specialty.as_str() == s)
            .ok_or_else(|| PreopError::UnknownValue {
                kind: "medical_specialty",
                value: s.to_string(),
            })
    }
}

/// 专科门诊结局（仅作记录，不影响状态机）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DischargeOutcome {
    Alta,                       // 出院
    ExamesComplementares,       // 补充检查
    AcompanhamentoAmbulatorial, // 原籍门诊随访
}

impl DischargeOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Alta => "Alta",
            Self::ExamesComplementares => "Solicitação de Exames Complementares",
            Self::AcompanhamentoAmbulatorial => "Acompanhamento Ambulatorial na Origem",
        }
    }
}

/// 患者信息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    pub id: Uuid,
    pub name: String,
    pub registration_number: Option<String>, // 院内登记号
    pub specialty: MedicalSpecialty,
    pub flow_type: FlowType,
    pub needs_cardio: bool,
    pub needs_image_exam: bool,
    pub is_priority: bool,
    pub is_being_served: bool,
    pub is_completed: bool,
    pub has_surgery_indication: bool,
    pub pending_surgery_scheduling: bool,
    pub scheduling_pending_at: Option<DateTime<Utc>>,
    pub scheduling_pending_reason: Option<String>,
    pub discharge_outcome: Option<DischargeOutcome>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Patient {
    /// 由登记输入构造新患者，不做字段校验
    pub fn from_input(input: NewPatient, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: input.name,
            registration_number: input.registration_number,
            specialty: input.specialty,
            flow_type: input.flow_type,
            needs_cardio: input.needs_cardio,
            needs_image_exam: input.needs_image_exam,
            is_priority: input.is_priority,
            is_being_served: false,
            is_completed: false,
            has_surgery_indication: false,
            pending_surgery_scheduling: false,
            scheduling_pending_at: None,
            scheduling_pending_reason: None,
            discharge_outcome: None,
            created_at: now,
            completed_at: None,
        }
    }

    /// 是否走心内科快速通道（心内科专科或需要心内科评估）
    pub fn is_cardio_track(&self) -> bool {
        self.specialty == MedicalSpecialty::Cardiologia || self.needs_cardio
    }

    /// 是否可以被叫号
    pub fn is_callable(&self) -> bool {
        !self.is_completed && !self.is_being_served
    }
}

/// 患者登记输入
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewPatient {
    pub name: String,
    #[serde(default)]
    pub registration_number: Option<String>,
    #[serde(default)]
    pub specialty: MedicalSpecialty,
    pub flow_type: FlowType,
    #[serde(default)]
    pub needs_cardio: bool,
    #[serde(default)]
    pub needs_image_exam: bool,
    #[serde(default)]
    pub is_priority: bool,
}

impl NewPatient {
    pub fn new(name: impl Into<String>, flow_type: FlowType) -> Self {
        Self {
            name: name.into(),
            registration_number: None,
            specialty: MedicalSpecialty::default(),
            flow_type,
            needs_cardio: false,
            needs_image_exam: false,
            is_priority: false,
        }
    }

    pub fn with_specialty(mut self, specialty: MedicalSpecialty) -> Self {
        self.specialty = specialty;
        self
    }

    pub fn with_registration_number(mut self, number: impl Into<String>) -> Self {
        self.registration_number = Some(number.into());
        self
    }

    pub fn priority(mut self, is_priority: bool) -> Self {
        self.is_priority = is_priority;
        self
    }

    pub fn needs_cardio(mut self, needs_cardio: bool) -> Self {
        self.needs_cardio = needs_cardio;
        self
    }

    pub fn needs_image_exam(mut self, needs_image_exam: bool) -> Self {
        self.needs_image_exam = needs_image_exam;
        self
    }
}

/// 患者环节记录（每名患者每个环节一行）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientStep {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub step: CircuitStep,
    pub status: StepStatus,
    pub called_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub station_number: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl PatientStep {
    pub fn pending(patient_id: Uuid, step: CircuitStep, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            patient_id,
            step,
            status: StepStatus::Pending,
            called_at: None,
            started_at: None,
            completed_at: None,
            station_number: None,
            created_at: now,
        }
    }
}

/// 服务站点
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Station {
    pub id: Uuid,
    pub step: CircuitStep,
    pub station_number: i32, // 序号，专科站点同时代表诊室
    pub name: String,
    pub is_active: bool,
    /// 当前绑定的患者，按叫号先后排列
    pub current_patient_ids: Vec<Uuid>,
    pub current_specialty: Option<MedicalSpecialty>,
    pub created_at: DateTime<Utc>,
}

impl Station {
    pub fn new(step: CircuitStep, station_number: i32, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            step,
            station_number,
            name: name.into(),
            is_active: true,
            current_patient_ids: Vec::new(),
            current_specialty: None,
            created_at: now,
        }
    }

    /// 最近一次叫号的患者
    pub fn current_patient_id(&self) -> Option<Uuid> {
        self.current_patient_ids.last().copied()
    }

    /// 是否为心内科评估站点（心内科环节或绑定心内科的专科诊室）
    pub fn serves_cardiology(&self) -> bool {
        self.step == CircuitStep::Cardiologista
            || (self.step == CircuitStep::Especialista
                && self.current_specialty == Some(MedicalSpecialty::Cardiologia))
    }

    pub fn bind_patient(&mut self, patient_id: Uuid) {
        if !self.current_patient_ids.contains(&patient_id) {
            self.current_patient_ids.push(patient_id);
        }
    }

    pub fn release_patient(&mut self, patient_id: Uuid) -> bool {
        let before = self.current_patient_ids.len();
        self.current_patient_ids.retain(|id| *id != patient_id);
        before != self.current_patient_ids.len()
    }
}

/// 叫号公告（电视屏展示）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TvCall {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub patient_name: String,
    pub step: CircuitStep,
    pub station_number: i32,
    pub station_name: String,
    pub called_at: DateTime<Utc>,
    pub is_active: bool,
}

/// 闭区间时间窗口
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// 某一天的 00:00:00 到 23:59:59.999
    pub fn day(date: NaiveDate) -> Self {
        let start = date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
        let end = date
            .and_hms_milli_opt(23, 59, 59, 999)
            .unwrap_or_default()
            .and_utc();
        Self { start, end }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}

/// 单个环节的队列统计
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueStats {
    pub step: CircuitStep,
    pub pending: usize,
    pub in_service: usize,
    pub completed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_wire_names() {
        assert_eq!(CircuitStep::ExamesLabEcg.to_string(), "exames_lab_ecg");
        assert_eq!("especialista".parse::<CircuitStep>().unwrap(), CircuitStep::Especialista);
        assert_eq!(MedicalSpecialty::Ortopedia.to_string(), "ORTOPEDIA");
        assert_eq!(
            serde_json::to_string(&FlowType::ConsultaRetorno).unwrap(),
            "\"consulta_retorno\""
        );
        assert_eq!(
            serde_json::to_string(&StepStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
    }

    #[test]
    fn test_unknown_values_are_rejected() {
        assert_matches!(
            "recepcao".parse::<CircuitStep>(),
            Err(PreopError::UnknownValue { kind: "circuit_step", .. })
        );
        assert_matches!(
            "PEDIATRIA".parse::<MedicalSpecialty>(),
            Err(PreopError::UnknownValue { kind: "medical_specialty", .. })
        );
    }

    #[test]
    fn test_station_binding() {
        let mut station = Station::new(CircuitStep::ExamesLabEcg, 1, "ECG 1", Utc::now());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        station.bind_patient(a);
        station.bind_patient(b);
        station.bind_patient(a);
        assert_eq!(station.current_patient_ids, vec![a, b]);
        assert_eq!(station.current_patient_id(), Some(b));
        assert!(station.release_patient(b));
        assert!(!station.release_patient(b));
        assert_eq!(station.current_patient_id(), Some(a));
    }

    #[test]
    fn test_cardiology_station_detection() {
        let mut station = Station::new(CircuitStep::Especialista, 4, "Consultório 4", Utc::now());
        assert!(!station.serves_cardiology());
        station.current_specialty = Some(MedicalSpecialty::Cardiologia);
        assert!(station.serves_cardiology());
        let cardio = Station::new(CircuitStep::Cardiologista, 1, "Cardio 1", Utc::now());
        assert!(cardio.serves_cardiology());
    }

    #[test]
    fn test_day_range_bounds() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let range = DateRange::day(date);
        assert!(range.contains(date.and_hms_opt(0, 0, 0).unwrap().and_utc()));
        assert!(range.contains(date.and_hms_opt(23, 59, 59).unwrap().and_utc()));
        let next = NaiveDate::from_ymd_opt(2026, 3, 11).unwrap();
        assert!(!range.contains(next.and_hms_opt(0, 0, 0).unwrap().and_utc()));
    }
}
