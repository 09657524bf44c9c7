//! 通用工具函数

use crate::error::{PreopError, Result};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use regex::Regex;
use std::sync::OnceLock;

/// 患者姓名最大长度
pub const MAX_NAME_LEN: usize = 200;

/// 时间来源
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// 系统时钟
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 手动推进的时钟，用于测试和回放
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// 规范化患者姓名：去除首尾空白并合并连续空白
pub fn normalize_name(raw: &str) -> Result<String> {
    let name = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if name.is_empty() {
        return Err(PreopError::Validation("患者姓名不能为空".to_string()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(PreopError::Validation(format!(
            "患者姓名超过 {} 个字符",
            MAX_NAME_LEN
        )));
    }
    Ok(name)
}

fn registration_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9./-]{0,31}$").expect("registration number pattern")
    })
}

/// 规范化登记号：空串视为未填写
pub fn normalize_registration_number(raw: Option<&str>) -> Result<Option<String>> {
    let Some(value) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    if !registration_pattern().is_match(value) {
        return Err(PreopError::Validation(format!("无效的登记号: {}", value)));
    }
    Ok(Some(value.to_string()))
}

/// 两个时间点之间的整分钟数（向零截断）
pub fn whole_minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_minutes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Maria   Silva ").unwrap(), "Maria Silva");
        assert!(normalize_name("   ").is_err());
        assert!(normalize_name(&"a".repeat(MAX_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn test_normalize_registration_number() {
        assert_eq!(normalize_registration_number(None).unwrap(), None);
        assert_eq!(normalize_registration_number(Some("  ")).unwrap(), None);
        assert_eq!(
            normalize_registration_number(Some(" 2024-0001 ")).unwrap(),
            Some("2024-0001".to_string())
        );
        assert!(normalize_registration_number(Some("12 34")).is_err());
    }

    #[test]
    fn test_manual_clock() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        clock.advance(Duration::minutes(3));
        assert_eq!(clock.now(), start + Duration::minutes(3));
    }

    #[test]
    fn test_whole_minutes_truncates() {
        let start = Utc::now();
        assert_eq!(whole_minutes_between(start, start + Duration::seconds(179)), 2);
        assert_eq!(whole_minutes_between(start, start), 0);
    }
}
