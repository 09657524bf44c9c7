//! # Preop 存储模块
//!
//! 定义流转数据的持久化协作接口，提供事务化的内存实现。
//! 每个事务在提交前对外不可见，丢弃即回滚。

pub mod filters;
pub mod memory;
pub mod store;

// 重新导出主要类型
pub use filters::{CallFilter, PatientFilter, StationFilter, StepFilter};
pub use memory::{FlowTables, MemoryStore};
pub use store::{FlowStore, FlowTx, RotationKey};
