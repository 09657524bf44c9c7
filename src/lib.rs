//! # Preop
//!
//! 术前门诊患者流转调度系统，汇总各子模块的公共接口

pub use preop_admin;
pub use preop_core;
pub use preop_store;
pub use preop_workflow;

pub use preop_core::{PreopError, Result};
pub use preop_workflow::FlowEngine;
