//! Monthly targets, one per assignee, role and calendar month
use chrono::Utc;

use crate::period::Period;
use crate::timestamp::TimeStamp;
use crate::user::Role;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetKey {
    pub assigned_to: String,
    pub role: Role,
    pub period: Period,
}

impl TargetKey {
    pub fn new(assigned_to: impl Into<String>, role: Role, period: Period) -> Self {
        Self {
            assigned_to: assigned_to.into(),
            role,
            period,
        }
    }

    // assignee/ROLE/yyyy/mm keeps all months of one assignee adjacent
    pub fn storage_key(&self) -> String {
        format!(
            "{}/{}/{:04}/{:02}",
            self.assigned_to,
            self.role.as_str(),
            self.period.year(),
            self.period.month()
        )
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct Target {
    #[n(0)]
    pub assigned_to: String,
    #[n(1)]
    pub role: Role,
    #[n(2)]
    pub period: Period,
    #[n(3)]
    pub assigned_by: String,
    #[n(4)]
    pub target_value: f64,
    #[n(5)]
    pub achieved_value: f64, // denormalised, see TargetLedger::refresh_achievement
    #[n(6)]
    pub updated_at: TimeStamp<Utc>,
}

impl Target {
    pub fn new(key: TargetKey, assigned_by: impl Into<String>, target_value: f64) -> Self {
        Self {
            assigned_to: key.assigned_to,
            role: key.role,
            period: key.period,
            assigned_by: assigned_by.into(),
            target_value,
            achieved_value: 0.0,
            updated_at: TimeStamp::new(),
        }
    }

    pub fn key(&self) -> TargetKey {
        TargetKey::new(self.assigned_to.clone(), self.role, self.period)
    }
}
