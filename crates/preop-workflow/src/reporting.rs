//! 统计报表
//!
//! 只读计算，不修改任何状态

use chrono::{DateTime, Utc};
use preop_core::utils::whole_minutes_between;
use preop_core::{
    CircuitStep, DateRange, FlowType, MedicalSpecialty, Patient, PatientStep, QueueStats,
    StepStatus,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// 单个环节的耗时统计
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepReport {
    pub step: CircuitStep,
    /// 窗口内完成的记录数
    pub total: usize,
    /// 参与耗时统计的记录数
    pub timed: usize,
    pub avg_minutes: f64,
    pub min_minutes: i64,
    pub max_minutes: i64,
}

/// 专科就诊与手术转化
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpecialtyReport {
    pub specialty: MedicalSpecialty,
    pub consultations: usize,
    pub surgery_indications: usize,
    /// 手术指征占比，0.0 ~ 1.0
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlowTypeReport {
    pub flow_type: FlowType,
    pub registered: usize,
    pub completed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingSchedulingEntry {
    pub patient_id: Uuid,
    pub name: String,
    pub specialty: MedicalSpecialty,
    pub pending_since: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

/// 日报
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DayReport {
    pub range: DateRange,
    pub total_patients: usize,
    pub completed_patients: usize,
    pub steps: Vec<StepReport>,
    pub specialties: Vec<SpecialtyReport>,
    pub flow_types: Vec<FlowTypeReport>,
    pub pending_scheduling: Vec<PendingSchedulingEntry>,
}

/// 报表聚合器
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportingAggregator;

impl ReportingAggregator {
    /// 计算时间窗口内的日报
    ///
    /// 环节按创建时间落入窗口统计，患者按登记时间统计；待排期列表不受窗口限制。
    pub fn day_report(&self, patients: &[Patient], steps: &[PatientStep], range: DateRange) -> DayReport {
        let completed: Vec<&PatientStep> = steps
            .iter()
            .filter(|row| row.status == StepStatus::Completed && range.contains(row.created_at))
            .collect();

        let step_reports = CircuitStep::ALL
            .iter()
            .map(|&step| step_report(step, completed.iter().copied().filter(|row| row.step == step)))
            .collect();

        let in_window: Vec<&Patient> = patients.iter().filter(|p| range.contains(p.created_at)).collect();
        let by_id: HashMap<Uuid, &Patient> = patients.iter().map(|p| (p.id, p)).collect();

        let mut specialties: HashMap<MedicalSpecialty, (usize, usize)> = HashMap::new();
        for row in completed.iter().filter(|row| row.step == CircuitStep::Especialista) {
            let Some(patient) = by_id.get(&row.patient_id) else {
                continue;
            };
            let entry = specialties.entry(patient.specialty).or_default();
            entry.0 += 1;
            if patient.has_surgery_indication {
                entry.1 += 1;
            }
        }
        let specialties = MedicalSpecialty::ALL
            .iter()
            .filter_map(|specialty| {
                specialties.get(specialty).map(|&(consultations, indications)| SpecialtyReport {
                    specialty: *specialty,
                    consultations,
                    surgery_indications: indications,
                    conversion_rate: indications as f64 / consultations as f64,
                })
            })
            .collect();

        let flow_types = FlowType::ALL
            .iter()
            .map(|&flow_type| {
                let registered: Vec<&&Patient> = in_window.iter().filter(|p| p.flow_type == flow_type).collect();
                FlowTypeReport {
                    flow_type,
                    registered: registered.len(),
                    completed: registered.iter().filter(|p| p.is_completed).count(),
                }
            })
            .collect();

        let mut pending_scheduling: Vec<PendingSchedulingEntry> = patients
            .iter()
            .filter(|p| p.pending_surgery_scheduling)
            .map(|p| PendingSchedulingEntry {
                patient_id: p.id,
                name: p.name.clone(),
                specialty: p.specialty,
                pending_since: p.scheduling_pending_at,
                reason: p.scheduling_pending_reason.clone(),
            })
            .collect();
        pending_scheduling.sort_by_key(|entry| entry.pending_since);

        DayReport {
            range,
            total_patients: in_window.len(),
            completed_patients: in_window.iter().filter(|p| p.is_completed).count(),
            steps: step_reports,
            specialties,
            flow_types,
            pending_scheduling,
        }
    }

    /// 各环节当前的队列计数
    pub fn queue_stats(&self, steps: &[PatientStep]) -> Vec<QueueStats> {
        CircuitStep::ALL
            .iter()
            .map(|&step| {
                let mut stats = QueueStats {
                    step,
                    pending: 0,
                    in_service: 0,
                    completed: 0,
                };
                for row in steps.iter().filter(|row| row.step == step) {
                    match row.status {
                        StepStatus::Pending => stats.pending += 1,
                        StepStatus::Called | StepStatus::InProgress => stats.in_service += 1,
                        StepStatus::Completed => stats.completed += 1,
                    }
                }
                stats
            })
            .collect()
    }
}

fn step_report<'a>(step: CircuitStep, rows: impl Iterator<Item = &'a PatientStep>) -> StepReport {
    let mut total = 0;
    let mut minutes = Vec::new();
    for row in rows {
        total += 1;
        if let (Some(started), Some(completed)) = (row.started_at, row.completed_at) {
            let elapsed = whole_minutes_between(started, completed);
            if elapsed > 0 {
                minutes.push(elapsed);
            }
        }
    }

    let timed = minutes.len();
    let avg_minutes = if timed == 0 {
        0.0
    } else {
        minutes.iter().sum::<i64>() as f64 / timed as f64
    };
    StepReport {
        step,
        total,
        timed,
        avg_minutes,
        min_minutes: minutes.iter().copied().min().unwrap_or(0),
        max_minutes: minutes.iter().copied().max().unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use preop_core::NewPatient;

    fn day() -> (DateRange, DateTime<Utc>) {
        let date = NaiveDate::from_ymd_opt(2026, 5, 4).unwrap();
        (DateRange::day(date), date.and_hms_opt(8, 0, 0).unwrap().and_utc())
    }

    fn done(patient: &Patient, step: CircuitStep, start: DateTime<Utc>, minutes: i64) -> PatientStep {
        let mut row = PatientStep::pending(patient.id, step, start);
        row.status = StepStatus::Completed;
        row.started_at = Some(start);
        row.completed_at = Some(start + Duration::minutes(minutes));
        row
    }

    #[test]
    fn test_step_timings_exclude_non_positive_and_missing() {
        let (range, at) = day();
        let patient = Patient::from_input(NewPatient::new("Ana", FlowType::CircuitoPreop), at);

        let mut missing = done(&patient, CircuitStep::TriagemMedica, at, 0);
        missing.started_at = None;
        let steps = vec![
            done(&patient, CircuitStep::TriagemMedica, at, 10),
            done(&patient, CircuitStep::TriagemMedica, at, 21),
            done(&patient, CircuitStep::TriagemMedica, at, 0),
            missing,
            PatientStep::pending(patient.id, CircuitStep::TriagemMedica, at),
        ];

        let report = ReportingAggregator.day_report(&[patient], &steps, range);
        let triage = report
            .steps
            .iter()
            .find(|r| r.step == CircuitStep::TriagemMedica)
            .unwrap();
        assert_eq!(triage.total, 4);
        assert_eq!(triage.timed, 2);
        assert_eq!(triage.min_minutes, 10);
        assert_eq!(triage.max_minutes, 21);
        assert!((triage.avg_minutes - 15.5).abs() < f64::EPSILON);
        assert_eq!(report.steps.len(), CircuitStep::ALL.len());
    }

    #[test]
    fn test_specialty_conversion_and_flow_counts() {
        let (range, at) = day();
        let mut indicated = Patient::from_input(
            NewPatient::new("Ana", FlowType::ConsultaEspecialista).with_specialty(MedicalSpecialty::Ortopedia),
            at,
        );
        indicated.has_surgery_indication = true;
        let mut discharged = Patient::from_input(
            NewPatient::new("Beto", FlowType::ConsultaEspecialista).with_specialty(MedicalSpecialty::Ortopedia),
            at,
        );
        discharged.is_completed = true;
        let mut pending = Patient::from_input(NewPatient::new("Caio", FlowType::CircuitoPreop), at - Duration::days(3));
        pending.pending_surgery_scheduling = true;

        let steps = vec![
            done(&indicated, CircuitStep::Especialista, at, 15),
            done(&discharged, CircuitStep::Especialista, at, 12),
        ];
        let report = ReportingAggregator.day_report(&[indicated, discharged, pending], &steps, range);

        assert_eq!(report.total_patients, 2);
        assert_eq!(report.completed_patients, 1);
        assert_eq!(report.specialties.len(), 1);
        assert_eq!(report.specialties[0].consultations, 2);
        assert_eq!(report.specialties[0].surgery_indications, 1);
        assert!((report.specialties[0].conversion_rate - 0.5).abs() < f64::EPSILON);

        let first = report
            .flow_types
            .iter()
            .find(|r| r.flow_type == FlowType::ConsultaEspecialista)
            .unwrap();
        assert_eq!((first.registered, first.completed), (2, 1));
        assert_eq!(report.pending_scheduling.len(), 1);
        assert_eq!(report.pending_scheduling[0].name, "Caio");
    }

    #[test]
    fn test_queue_stats() {
        let (_, at) = day();
        let patient = Patient::from_input(NewPatient::new("Ana", FlowType::CircuitoPreop), at);
        let mut called = PatientStep::pending(patient.id, CircuitStep::ExamesLabEcg, at);
        called.status = StepStatus::Called;
        let steps = vec![
            PatientStep::pending(patient.id, CircuitStep::ExamesLabEcg, at),
            called,
            done(&patient, CircuitStep::ExamesLabEcg, at, 5),
        ];

        let stats = ReportingAggregator.queue_stats(&steps);
        let ecg = stats.iter().find(|s| s.step == CircuitStep::ExamesLabEcg).unwrap();
        assert_eq!((ecg.pending, ecg.in_service, ecg.completed), (1, 1, 1));
        assert_eq!(stats.len(), CircuitStep::ALL.len());
    }
}
