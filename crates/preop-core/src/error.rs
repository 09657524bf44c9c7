//! 错误定义模块

use crate::models::{CircuitStep, StepStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// 术前流转系统统一错误类型
#[derive(Error, Debug)]
pub enum PreopError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("存储错误: {0}")]
    Storage(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("站点 {station_number} 已有 {current} 名患者在服务中 (容量 {capacity})")]
    CapacityExceeded {
        station_number: i32,
        current: usize,
        capacity: usize,
    },

    #[error("没有等待 {step} 的患者")]
    NoCandidates { step: CircuitStep },

    #[error("心电图前置条件未满足: {waiting} 名候选患者尚未完成 exames_lab_ecg")]
    EcgPrerequisiteNotMet { waiting: usize },

    #[error("专科站点 {station_number} 未选择专科")]
    SpecialtyNotBound { station_number: i32 },

    #[error("站点 {station_number} 没有处于 {expected} 状态的患者")]
    NoPatientCalled {
        station_number: i32,
        expected: StepStatus,
    },

    #[error("站点已停用: {0}")]
    StationInactive(String),

    #[error("无效状态转换: 从 {from} 经 {event}")]
    InvalidStateTransition { from: String, event: String },

    #[error("环节已存在: 患者 {patient_id} 的 {step}")]
    DuplicateStep { patient_id: Uuid, step: CircuitStep },

    #[error("环节已添加: 患者 {patient_id} 的 {step}")]
    StepAlreadyAdded { patient_id: Uuid, step: CircuitStep },

    #[error("并发冲突: {0}")]
    LostRace(String),

    #[error("未知的 {kind} 取值: {value}")]
    UnknownValue { kind: &'static str, value: String },

    #[error("数据完整性错误: {0}")]
    DataIntegrity(String),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

/// 错误分类
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 输入格式错误，未触及任何状态
    Validation,
    /// 前置条件不满足，状态未改变
    Precondition,
    /// 冲突，可重试
    Conflict,
    /// 不可恢复错误
    Fatal,
}

impl PreopError {
    /// 返回错误所属分类
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::Serialization(_) => ErrorKind::Validation,
            Self::NotFound(_)
            | Self::CapacityExceeded { .. }
            | Self::NoCandidates { .. }
            | Self::EcgPrerequisiteNotMet { .. }
            | Self::SpecialtyNotBound { .. }
            | Self::NoPatientCalled { .. }
            | Self::StationInactive(_)
            | Self::InvalidStateTransition { .. } => ErrorKind::Precondition,
            Self::DuplicateStep { .. } | Self::StepAlreadyAdded { .. } | Self::LostRace(_) => {
                ErrorKind::Conflict
            }
            Self::Config(_)
            | Self::Storage(_)
            | Self::UnknownValue { .. }
            | Self::DataIntegrity(_)
            | Self::Internal(_) => ErrorKind::Fatal,
        }
    }

    /// 只有冲突类错误可以原样重试
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}

/// 术前流转系统统一结果类型
pub type Result<T> = std::result::Result<T, PreopError>;
