//! 环节状态机
//!
//! 管理患者环节的生命周期状态转换

use preop_core::{PreopError, Result, StepStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// 环节状态转换事件
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StepEvent {
    Call,          // 叫号
    Start,         // 开始服务
    Finish,        // 结束服务
    Cancel,        // 手动取消
    Expire,        // 叫号超时
    ForceComplete, // 管理员直接标记完成
}

impl fmt::Display for StepEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Call => "call",
            Self::Start => "start",
            Self::Finish => "finish",
            Self::Cancel => "cancel",
            Self::Expire => "expire",
            Self::ForceComplete => "force_complete",
        };
        f.write_str(name)
    }
}

/// 环节状态机
#[derive(Debug, Clone)]
pub struct StepStateMachine {
    transitions: HashMap<(StepStatus, StepEvent), StepStatus>,
}

impl StepStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        use StepEvent::*;
        use StepStatus::*;

        let mut transitions = HashMap::new();

        // 正常推进
        transitions.insert((Pending, Call), Called);
        transitions.insert((Called, Start), InProgress);
        transitions.insert((InProgress, Finish), Completed);

        // 回退到等待
        transitions.insert((Called, Cancel), Pending);
        transitions.insert((InProgress, Cancel), Pending);
        transitions.insert((Called, Expire), Pending);

        transitions.insert((Pending, ForceComplete), Completed);
        transitions.insert((Called, ForceComplete), Completed);
        transitions.insert((InProgress, ForceComplete), Completed);

        Self { transitions }
    }

    /// 检查状态转换是否有效
    pub fn can_transition(&self, from: StepStatus, event: StepEvent) -> bool {
        self.transitions.contains_key(&(from, event))
    }

    /// 执行状态转换
    pub fn transition(&self, from: StepStatus, event: StepEvent) -> Result<StepStatus> {
        self.transitions
            .get(&(from, event))
            .copied()
            .ok_or_else(|| PreopError::InvalidStateTransition {
                from: from.to_string(),
                event: event.to_string(),
            })
    }

    /// 获取状态的所有可能事件
    pub fn possible_events(&self, current: StepStatus) -> Vec<StepEvent> {
        self.transitions
            .keys()
            .filter(|(state, _)| *state == current)
            .map(|(_, event)| *event)
            .collect()
    }
}

impl Default for StepStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
