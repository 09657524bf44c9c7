//! 标准输入命令协议
//!
//! 每行一个以 `command` 字段标记的 JSON 对象，每个响应输出一行 JSON。

use chrono::Utc;
use preop_admin::FlowMetrics;
use preop_core::{
    CircuitStep, DateRange, ErrorKind, MedicalSpecialty, NewPatient, PreopError, Result,
};
use preop_store::{StationFilter, StepFilter};
use preop_workflow::{FlowEngine, NewStation, ServiceOutcome};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// 外部命令
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    RegisterPatient(NewPatient),
    CallNext {
        station_id: Uuid,
    },
    StartService {
        station_id: Uuid,
        #[serde(default)]
        patient_id: Option<Uuid>,
    },
    FinishService {
        station_id: Uuid,
        #[serde(default)]
        patient_id: Option<Uuid>,
        #[serde(default)]
        outcome: Option<ServiceOutcome>,
    },
    CancelCall {
        station_id: Uuid,
        #[serde(default)]
        patient_id: Option<Uuid>,
    },
    AddStep {
        patient_id: Uuid,
        step: CircuitStep,
    },
    AddCardioStep {
        patient_id: Uuid,
    },
    AddImageExam {
        patient_id: Uuid,
    },
    CreateStation(NewStation),
    SetStationSpecialty {
        station_id: Uuid,
        #[serde(default)]
        specialty: Option<MedicalSpecialty>,
    },
    SetStationActive {
        station_id: Uuid,
        active: bool,
    },
    MarkPendingScheduling {
        patient_id: Uuid,
        #[serde(default)]
        reason: Option<String>,
    },
    ClearPendingScheduling {
        patient_id: Uuid,
    },
    ReenterCircuit {
        patient_id: Uuid,
        #[serde(default)]
        needs_cardio: bool,
    },
    RemovePatient {
        patient_id: Uuid,
    },
    CompleteStep {
        step_id: Uuid,
    },
    RemoveStep {
        step_id: Uuid,
    },
    ExpireStaleCalls,
    ListPatients {
        #[serde(default)]
        range: Option<DateRange>,
    },
    GetPatient {
        patient_id: Uuid,
    },
    ListSteps {
        #[serde(default)]
        filter: StepFilter,
    },
    ListStations {
        #[serde(default)]
        filter: StationFilter,
    },
    ActiveAnnouncements {
        #[serde(default)]
        limit: Option<usize>,
    },
    DayReport {
        /// 缺省为当天
        #[serde(default)]
        range: Option<DateRange>,
    },
    QueueStats,
    Metrics,
}

/// 命令响应
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            kind: None,
            error: None,
        }
    }

    pub fn failure(err: &PreopError) -> Self {
        Self {
            ok: false,
            data: None,
            kind: Some(err.kind()),
            error: Some(err.to_string()),
        }
    }
}

/// 命令分发器
pub struct Dispatcher {
    engine: Arc<FlowEngine>,
    metrics: FlowMetrics,
    announcement_limit: usize,
}

impl Dispatcher {
    pub fn new(engine: Arc<FlowEngine>, metrics: FlowMetrics, announcement_limit: usize) -> Self {
        Self {
            engine,
            metrics,
            announcement_limit,
        }
    }

    /// 解析并执行一行输入
    pub async fn handle(&self, line: &str) -> Response {
        let command = match serde_json::from_str::<Command>(line) {
            Ok(command) => command,
            Err(err) => return Response::failure(&PreopError::Validation(err.to_string())),
        };
        debug!("Dispatching command: {:?}", command);

        match self.execute(command).await {
            Ok(data) => Response::success(data),
            Err(err) => Response::failure(&err),
        }
    }

    pub async fn execute(&self, command: Command) -> Result<Value> {
        let engine = &self.engine;
        match command {
            Command::RegisterPatient(input) => to_data(engine.register_patient(input).await?),
            Command::CallNext { station_id } => match engine.call_next(station_id).await {
                Ok(ticket) => to_data(ticket),
                Err(err) => {
                    self.metrics.record_rejection(&err);
                    Err(err)
                }
            },
            Command::StartService {
                station_id,
                patient_id,
            } => to_data(engine.start_service_for(station_id, patient_id).await?),
            Command::FinishService {
                station_id,
                patient_id,
                outcome,
            } => to_data(engine.finish_service_for(station_id, patient_id, outcome).await?),
            Command::CancelCall {
                station_id,
                patient_id,
            } => to_data(engine.cancel_call_for(station_id, patient_id).await?),
            Command::AddStep { patient_id, step } => to_data(engine.add_step(patient_id, step).await?),
            Command::AddCardioStep { patient_id } => to_data(engine.add_cardio_step(patient_id).await?),
            Command::AddImageExam { patient_id } => to_data(engine.add_image_exam(patient_id).await?),
            Command::CreateStation(input) => to_data(engine.create_station(input).await?),
            Command::SetStationSpecialty {
                station_id,
                specialty,
            } => to_data(engine.set_station_specialty(station_id, specialty).await?),
            Command::SetStationActive { station_id, active } => {
                to_data(engine.set_station_active(station_id, active).await?)
            }
            Command::MarkPendingScheduling { patient_id, reason } => {
                to_data(engine.mark_pending_scheduling(patient_id, reason).await?)
            }
            Command::ClearPendingScheduling { patient_id } => {
                to_data(engine.clear_pending_scheduling(patient_id).await?)
            }
            Command::ReenterCircuit {
                patient_id,
                needs_cardio,
            } => to_data(engine.reenter_circuit(patient_id, needs_cardio).await?),
            Command::RemovePatient { patient_id } => to_data(engine.remove_patient(patient_id).await?),
            Command::CompleteStep { step_id } => to_data(engine.complete_step_manually(step_id).await?),
            Command::RemoveStep { step_id } => to_data(engine.remove_step(step_id).await?),
            Command::ExpireStaleCalls => to_data(engine.expire_stale_calls().await?),
            Command::ListPatients { range } => to_data(engine.list_patients(range).await?),
            Command::GetPatient { patient_id } => to_data(engine.patient(patient_id).await?),
            Command::ListSteps { filter } => to_data(engine.list_steps(filter).await?),
            Command::ListStations { filter } => to_data(engine.list_stations(filter).await?),
            Command::ActiveAnnouncements { limit } => to_data(
                engine
                    .list_active_announcements(limit.unwrap_or(self.announcement_limit))
                    .await?,
            ),
            Command::DayReport { range } => {
                let range = range.unwrap_or_else(|| DateRange::day(Utc::now().date_naive()));
                to_data(engine.day_report(range).await?)
            }
            Command::QueueStats => to_data(engine.queue_stats().await?),
            Command::Metrics => {
                let text = self
                    .metrics
                    .render()
                    .map_err(|e| PreopError::Internal(e.to_string()))?;
                Ok(Value::String(text))
            }
        }
    }
}

fn to_data<T: Serialize>(value: T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use preop_core::FlowType;
    use preop_workflow::SchedulerConfig;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(
            Arc::new(FlowEngine::in_memory(SchedulerConfig::default())),
            FlowMetrics::new().unwrap(),
            5,
        )
    }

    #[test]
    fn test_parse_commands() {
        let command: Command = serde_json::from_str(
            r#"{"command":"register_patient","name":"Maria Silva","flow_type":"consulta_especialista","specialty":"ORTOPEDIA"}"#,
        )
        .unwrap();
        assert_eq!(
            command,
            Command::RegisterPatient(
                NewPatient::new("Maria Silva", FlowType::ConsultaEspecialista)
                    .with_specialty(MedicalSpecialty::Ortopedia)
            )
        );

        let id = Uuid::new_v4();
        let command: Command = serde_json::from_str(&format!(
            r#"{{"command":"finish_service","station_id":"{id}","outcome":{{"type":"surgery_indicated","needs_cardio":true}}}}"#
        ))
        .unwrap();
        assert_eq!(
            command,
            Command::FinishService {
                station_id: id,
                patient_id: None,
                outcome: Some(ServiceOutcome::SurgeryIndicated { needs_cardio: true }),
            }
        );

        let command: Command = serde_json::from_str(r#"{"command":"list_steps"}"#).unwrap();
        assert!(matches!(command, Command::ListSteps { .. }));
    }

    #[tokio::test]
    async fn test_handle_round() {
        let dispatcher = dispatcher();
        let created = dispatcher
            .handle(r#"{"command":"create_station","step":"triagem_medica","station_number":1,"name":"Triagem 1"}"#)
            .await;
        assert!(created.ok);
        let station_id = created.data.unwrap()["id"].as_str().unwrap().to_string();

        let empty = dispatcher
            .handle(&format!(r#"{{"command":"call_next","station_id":"{station_id}"}}"#))
            .await;
        assert!(!empty.ok);
        assert_eq!(empty.kind, Some(ErrorKind::Precondition));

        let registered = dispatcher
            .handle(r#"{"command":"register_patient","name":"Ana","flow_type":"circuito_preop"}"#)
            .await;
        assert!(registered.ok);

        let called = dispatcher
            .handle(&format!(r#"{{"command":"call_next","station_id":"{station_id}"}}"#))
            .await;
        assert!(called.ok);
        assert_eq!(called.data.unwrap()["patient"]["name"], "Ana");

        let metrics = dispatcher.handle(r#"{"command":"metrics"}"#).await;
        let text = metrics.data.unwrap();
        assert!(text.as_str().unwrap().contains("no_candidates"));
    }

    #[tokio::test]
    async fn test_malformed_input_is_a_validation_error() {
        let dispatcher = dispatcher();
        let response = dispatcher.handle(r#"{"command":"teleport"}"#).await;
        assert!(!response.ok);
        assert_eq!(response.kind, Some(ErrorKind::Validation));

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["kind"], "validation");
        assert!(json.get("data").is_none());
    }
}
