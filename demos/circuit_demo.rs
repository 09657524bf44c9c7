//! 术前流转演示程序
//!
//! 展示一名专科患者从首诊、获得手术指征到完成术前流程的全过程

use preop_core::{CircuitStep, FlowType, MedicalSpecialty, NewPatient, QueueStats};
use preop_workflow::{FlowEngine, NewStation, SchedulerConfig, ServiceOutcome};
use tracing::info;
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt().with_env_filter("info").init();

    let engine = FlowEngine::in_memory(SchedulerConfig::default());
    let mut events = engine.event_bus().subscribe();

    println!("🏥 术前流转演示\n");

    // 1. 创建站点
    let room = create_station(&engine, CircuitStep::Especialista, "Consultório 1").await?;
    engine
        .set_station_specialty(room, Some(MedicalSpecialty::Ortopedia))
        .await?;
    let triage = create_station(&engine, CircuitStep::TriagemMedica, "Triagem 1").await?;
    let ecg = create_station(&engine, CircuitStep::ExamesLabEcg, "Laboratório 1").await?;
    let cardio = create_station(&engine, CircuitStep::Cardiologista, "Cardiologia 1").await?;
    let agenda = create_station(&engine, CircuitStep::Agendamento, "Agendamento 1").await?;
    println!("✅ 站点创建完成");

    // 2. 专科首诊
    let maria = engine
        .register_patient(
            NewPatient::new("maria silva", FlowType::ConsultaEspecialista)
                .with_specialty(MedicalSpecialty::Ortopedia),
        )
        .await?;
    println!("📋 登记患者 {} ({} 个环节)", maria.patient.name, maria.steps.len());

    let ticket = engine.call_next(room).await?;
    println!("📢 {} → {}", ticket.call.patient_name, ticket.call.station_name);
    engine.start_service(room).await?;
    let report = engine
        .finish_service(room, Some(ServiceOutcome::SurgeryIndicated { needs_cardio: true }))
        .await?;
    println!("🔁 手术指征，重新进入术前流程: {} 个新环节", report.reentered_steps.len());

    // 3. 术前流程，心内科必须等化验完成
    for station in [triage, ecg, cardio, agenda] {
        let ticket = engine.call_next(station).await?;
        engine.start_service(station).await?;
        let outcome = (ticket.step.step == CircuitStep::Agendamento).then_some(
            ServiceOutcome::SchedulingConfirmed {
                surgery_date_defined: true,
                reason: None,
            },
        );
        let report = engine.finish_service(station, outcome).await?;
        println!(
            "   ✔ {} 完成{}",
            ticket.step.step.label(),
            if report.patient_completed { "，全部环节结束" } else { "" }
        );
    }

    // 4. 队列概览
    println!("\n📊 队列概览:");
    for QueueStats {
        step,
        pending,
        in_service,
        completed,
    } in engine.queue_stats().await?
    {
        println!("   {:<22} 等待 {} 服务中 {} 完成 {}", step.label(), pending, in_service, completed);
    }

    while let Ok(event) = events.try_recv() {
        info!("event: {}", event.name());
    }

    println!("\n✅ 演示完成！");
    Ok(())
}

async fn create_station(engine: &FlowEngine, step: CircuitStep, name: &str) -> anyhow::Result<Uuid> {
    let station = engine
        .create_station(NewStation {
            step,
            station_number: 1,
            name: name.to_string(),
            specialty: None,
        })
        .await?;
    Ok(station.id)
}
