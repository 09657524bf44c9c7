//! # 术前流转工作流模块
//!
//! 提供术前门诊的患者流转核心功能，包括：
//! - 环节目录：按就诊类型生成患者需要完成的环节
//! - 环节状态机：pending → called → in_progress → completed 及取消/超时回退
//! - 站点调度：容量、专科、心电图前置条件与优先级轮转下的叫号选择
//! - 叫号会话：开始、结束、取消与超时自动取消
//! - 叫号公告与统计报表

pub mod announcements;
pub mod catalog;
pub mod engine;
pub mod events;
pub mod ledger;
pub mod registry;
pub mod reporting;
pub mod scheduler;
pub mod session;
pub mod state_machine;

// 重新导出主要类型
pub use announcements::AnnouncementFeed;
pub use engine::{CallTicket, FlowEngine, NewStation, RegisteredPatient};
pub use events::{BroadcastEventBus, EventBus, FlowEvent};
pub use ledger::{StepLedger, StepTransition};
pub use registry::PatientRegistry;
pub use reporting::{
    DayReport, FlowTypeReport, PendingSchedulingEntry, ReportingAggregator, SpecialtyReport,
    StepReport,
};
pub use scheduler::{SchedulerConfig, Selection, StationScheduler};
pub use session::{CallSession, FinishReport, ServiceOutcome};
pub use state_machine::{StepEvent, StepStateMachine};
