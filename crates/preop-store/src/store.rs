//! 持久化协作接口

use crate::filters::{CallFilter, PatientFilter, StationFilter, StepFilter};
use async_trait::async_trait;
use preop_core::{CircuitStep, MedicalSpecialty, Patient, PatientStep, Result, Station, StepStatus, TvCall};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 优先级轮转计数器的键：按环节队列（专科队列再按专科区分）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RotationKey {
    pub step: CircuitStep,
    pub specialty: Option<MedicalSpecialty>,
}

impl RotationKey {
    pub fn new(step: CircuitStep, specialty: Option<MedicalSpecialty>) -> Self {
        Self { step, specialty }
    }
}

/// 流转数据存储
///
/// 每次 `begin` 开启一个可串行化事务，事务期间独占写入。
#[async_trait]
pub trait FlowStore: Send + Sync {
    async fn begin<'a>(&'a self) -> Result<Box<dyn FlowTx + 'a>>;
}

/// 存储事务
///
/// 读操作能看到本事务已写入的数据。未调用 `commit` 就被丢弃的事务不产生任何效果。
pub trait FlowTx: Send {
    // ========== 患者 ==========

    fn patient(&self, id: Uuid) -> Option<Patient>;

    /// 按 `created_at` 升序返回
    fn patients(&self, filter: &PatientFilter) -> Vec<Patient>;

    fn insert_patient(&mut self, patient: Patient) -> Result<()>;

    fn update_patient(&mut self, patient: Patient) -> Result<()>;

    fn delete_patient(&mut self, id: Uuid) -> Result<()>;

    // ========== 环节 ==========

    fn step(&self, id: Uuid) -> Option<PatientStep>;

    /// 按插入顺序返回
    fn steps(&self, filter: &StepFilter) -> Vec<PatientStep>;

    fn insert_step(&mut self, step: PatientStep) -> Result<()>;

    /// 条件更新：仅当存储中的状态仍为 `expected` 时写入，否则返回 `LostRace`
    fn update_step(&mut self, step: PatientStep, expected: StepStatus) -> Result<()>;

    fn delete_step(&mut self, id: Uuid) -> Result<()>;

    // ========== 站点 ==========

    fn station(&self, id: Uuid) -> Option<Station>;

    /// 按环节、站点号排序返回
    fn stations(&self, filter: &StationFilter) -> Vec<Station>;

    fn insert_station(&mut self, station: Station) -> Result<()>;

    fn update_station(&mut self, station: Station) -> Result<()>;

    // ========== 叫号公告 ==========

    /// 按 `called_at` 降序返回
    fn tv_calls(&self, filter: &CallFilter) -> Vec<TvCall>;

    fn insert_tv_call(&mut self, call: TvCall) -> Result<()>;

    fn update_tv_call(&mut self, call: TvCall) -> Result<()>;

    fn delete_tv_call(&mut self, id: Uuid) -> Result<()>;

    // ========== 调度状态 ==========

    fn rotation_counter(&self, key: &RotationKey) -> u32;

    fn set_rotation_counter(&mut self, key: RotationKey, value: u32);

    /// 提交事务
    fn commit(self: Box<Self>) -> Result<()>;
}
