//! 流转事件
//!
//! 事务提交后发布，界面和监控订阅。事件总线只负责推送，存储仍是唯一事实来源。

use async_trait::async_trait;
use preop_core::{CircuitStep, MedicalSpecialty, Result, StepStatus, TvCall};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// 流转事件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FlowEvent {
    PatientRegistered {
        patient_id: Uuid,
        steps: Vec<CircuitStep>,
    },
    PatientCalled {
        call: TvCall,
        from_priority_pool: bool,
    },
    StepTransitioned {
        patient_id: Uuid,
        step_id: Uuid,
        step: CircuitStep,
        from: StepStatus,
        to: StepStatus,
        station_number: Option<i32>,
    },
    CallExpired {
        patient_id: Uuid,
        step_id: Uuid,
        step: CircuitStep,
        station_number: Option<i32>,
    },
    StepAdded {
        patient_id: Uuid,
        step: CircuitStep,
    },
    PatientCompleted {
        patient_id: Uuid,
    },
    CircuitReentered {
        patient_id: Uuid,
        needs_cardio: bool,
    },
    SchedulingPending {
        patient_id: Uuid,
        reason: String,
    },
    PatientRemoved {
        patient_id: Uuid,
    },
    StationSpecialtyChanged {
        station_id: Uuid,
        specialty: Option<MedicalSpecialty>,
    },
}

impl FlowEvent {
    /// 事件名，与序列化标签一致
    pub fn name(&self) -> &'static str {
        match self {
            Self::PatientRegistered { .. } => "patient_registered",
            Self::PatientCalled { .. } => "patient_called",
            Self::StepTransitioned { .. } => "step_transitioned",
            Self::CallExpired { .. } => "call_expired",
            Self::StepAdded { .. } => "step_added",
            Self::PatientCompleted { .. } => "patient_completed",
            Self::CircuitReentered { .. } => "circuit_reentered",
            Self::SchedulingPending { .. } => "scheduling_pending",
            Self::PatientRemoved { .. } => "patient_removed",
            Self::StationSpecialtyChanged { .. } => "station_specialty_changed",
        }
    }
}

/// 事件总线
#[async_trait]
pub trait EventBus: Send + Sync {
    /// 向所有订阅者发布事件
    async fn publish(&self, event: FlowEvent) -> Result<()>;

    /// 订阅实时事件
    fn subscribe(&self) -> broadcast::Receiver<FlowEvent>;
}

/// 基于 tokio broadcast 的进程内事件总线
#[derive(Debug)]
pub struct BroadcastEventBus {
    tx: broadcast::Sender<FlowEvent>,
    capacity: usize,
}

impl BroadcastEventBus {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventBus for BroadcastEventBus {
    async fn publish(&self, event: FlowEvent) -> Result<()> {
        // 没有订阅者不算错误
        let _ = self.tx.send(event);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<FlowEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_bus_delivers_event() {
        let bus = BroadcastEventBus::new(16);
        let mut rx = bus.subscribe();
        let patient_id = Uuid::new_v4();

        bus.publish(FlowEvent::PatientCompleted { patient_id }).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event, FlowEvent::PatientCompleted { patient_id });
        assert_eq!(event.name(), "patient_completed");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = BroadcastEventBus::new(0);
        assert_eq!(bus.capacity(), 1);
        bus.publish(FlowEvent::PatientRemoved {
            patient_id: Uuid::new_v4(),
        })
        .await
        .unwrap();
    }

    #[test]
    fn test_event_tag_matches_name() {
        let event = FlowEvent::StepAdded {
            patient_id: Uuid::new_v4(),
            step: CircuitStep::ExameImagem,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], event.name());
        assert_eq!(json["step"], "exame_imagem");
    }
}
