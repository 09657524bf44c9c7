//! 环节目录
//!
//! 根据就诊类型和需求标志确定患者需要完成的环节。纯查表，无副作用。

use preop_core::{CircuitStep, FlowType, Station};

/// 术前流程的基础环节
pub const PREOP_BASE_STEPS: [CircuitStep; 3] = [
    CircuitStep::TriagemMedica,
    CircuitStep::ExamesLabEcg,
    CircuitStep::Agendamento,
];

/// 新登记患者需要创建的环节，按流程顺序
pub fn initial_steps(flow_type: FlowType, needs_cardio: bool, needs_image_exam: bool) -> Vec<CircuitStep> {
    match flow_type {
        // 专科就诊后如有手术指征，再通过重新入径补充术前环节
        FlowType::ConsultaEspecialista | FlowType::ConsultaRetorno => vec![CircuitStep::Especialista],
        FlowType::CircuitoPreop => {
            let mut steps = PREOP_BASE_STEPS.to_vec();
            if needs_cardio {
                steps.push(CircuitStep::Cardiologista);
            }
            if needs_image_exam {
                steps.push(CircuitStep::ExameImagem);
            }
            steps
        }
    }
}

/// 专科判定有手术指征后重新进入术前流程的环节
pub fn reentry_steps(needs_cardio: bool) -> Vec<CircuitStep> {
    initial_steps(FlowType::CircuitoPreop, needs_cardio, false)
}

/// 环节的前置环节
pub fn prerequisites(step: CircuitStep) -> &'static [CircuitStep] {
    match step {
        CircuitStep::Cardiologista => &[CircuitStep::ExamesLabEcg],
        _ => &[],
    }
}

/// 站点叫号前候选患者必须已完成的环节；绑定心内科的专科诊室按心内科评估处理
pub fn station_prerequisites(station: &Station) -> &'static [CircuitStep] {
    if station.serves_cardiology() {
        prerequisites(CircuitStep::Cardiologista)
    } else {
        prerequisites(station.step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use preop_core::MedicalSpecialty;

    #[test]
    fn test_specialist_flows_start_with_consultation_only() {
        assert_eq!(
            initial_steps(FlowType::ConsultaEspecialista, true, true),
            vec![CircuitStep::Especialista]
        );
        assert_eq!(
            initial_steps(FlowType::ConsultaRetorno, false, false),
            vec![CircuitStep::Especialista]
        );
    }

    #[test]
    fn test_preop_flow_optional_steps() {
        assert_eq!(
            initial_steps(FlowType::CircuitoPreop, true, false),
            vec![
                CircuitStep::TriagemMedica,
                CircuitStep::ExamesLabEcg,
                CircuitStep::Agendamento,
                CircuitStep::Cardiologista,
            ]
        );
        assert_eq!(
            initial_steps(FlowType::CircuitoPreop, false, true),
            vec![
                CircuitStep::TriagemMedica,
                CircuitStep::ExamesLabEcg,
                CircuitStep::Agendamento,
                CircuitStep::ExameImagem,
            ]
        );
        assert_eq!(initial_steps(FlowType::CircuitoPreop, false, false).len(), 3);
    }

    #[test]
    fn test_reentry_never_adds_imaging() {
        assert_eq!(reentry_steps(false), PREOP_BASE_STEPS.to_vec());
        assert!(reentry_steps(true).contains(&CircuitStep::Cardiologista));
    }

    #[test]
    fn test_cardiology_requires_ecg() {
        assert_eq!(prerequisites(CircuitStep::Cardiologista), &[CircuitStep::ExamesLabEcg]);
        assert!(prerequisites(CircuitStep::TriagemMedica).is_empty());
    }

    #[test]
    fn test_cardiology_room_inherits_ecg_prerequisite() {
        let mut room = Station::new(CircuitStep::Especialista, 1, "Consultório 1", Utc::now());
        assert!(station_prerequisites(&room).is_empty());
        room.current_specialty = Some(MedicalSpecialty::Cardiologia);
        assert_eq!(station_prerequisites(&room), &[CircuitStep::ExamesLabEcg]);
    }
}
