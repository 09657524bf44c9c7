//! 叫号公告
//!
//! 电视屏读取的叫号记录。公告创建后内容不变，只会被停用。

use chrono::{DateTime, Utc};
use preop_core::{CircuitStep, Patient, Result, Station, TvCall};
use preop_store::{CallFilter, FlowTx};
use uuid::Uuid;

/// 叫号公告流
pub struct AnnouncementFeed<'t, T: FlowTx + ?Sized> {
    tx: &'t mut T,
}

impl<'t, T: FlowTx + ?Sized> AnnouncementFeed<'t, T> {
    pub fn new(tx: &'t mut T) -> Self {
        Self { tx }
    }

    /// 追加一条有效的叫号公告
    pub fn announce(&mut self, patient: &Patient, station: &Station, now: DateTime<Utc>) -> Result<TvCall> {
        let call = TvCall {
            id: Uuid::new_v4(),
            patient_id: patient.id,
            patient_name: patient.name.clone(),
            step: station.step,
            station_number: station.station_number,
            station_name: station.name.clone(),
            called_at: now,
            is_active: true,
        };
        self.tx.insert_tv_call(call.clone())?;
        Ok(call)
    }

    /// 停用患者在该环节上的全部有效公告，返回停用数量
    pub fn deactivate(&mut self, patient_id: Uuid, step: CircuitStep) -> Result<usize> {
        let active = self.tx.tv_calls(&CallFilter {
            patient_id: Some(patient_id),
            step: Some(step),
            active_only: true,
        });
        let count = active.len();
        for mut call in active {
            call.is_active = false;
            self.tx.update_tv_call(call)?;
        }
        Ok(count)
    }

    /// 最近的有效公告，按叫号时间倒序
    pub fn active(&self, limit: usize) -> Vec<TvCall> {
        let mut calls = self.tx.tv_calls(&CallFilter {
            active_only: true,
            ..Default::default()
        });
        calls.truncate(limit);
        calls
    }

    /// 删除患者的全部公告
    pub fn purge_patient(&mut self, patient_id: Uuid) -> Result<usize> {
        let calls = self.tx.tv_calls(&CallFilter {
            patient_id: Some(patient_id),
            ..Default::default()
        });
        let count = calls.len();
        for call in calls {
            self.tx.delete_tv_call(call.id)?;
        }
        Ok(count)
    }
}
