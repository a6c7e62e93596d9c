//! Subscription plans and the storage limits they grant.
//!
//! The plan table is fixed at compile time. A user's plan is resolved from
//! the `plan` column, falling back to the legacy `subscription_type`
//! column; anything unrecognised is treated as the free tier.

use serde::{Deserialize, Serialize};

use crate::models::user::User;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanName {
    Free,
    Paid,
    Developer,
    Team,
    Enterprise,
}

impl PlanName {
    pub const ALL: [PlanName; 5] = [
        PlanName::Free,
        PlanName::Paid,
        PlanName::Developer,
        PlanName::Team,
        PlanName::Enterprise,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanName::Free => "free",
            PlanName::Paid => "paid",
            PlanName::Developer => "developer",
            PlanName::Team => "team",
            PlanName::Enterprise => "enterprise",
        }
    }

    /// Case-insensitive lookup; `None` for names outside the table.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "free" => Some(PlanName::Free),
            "paid" => Some(PlanName::Paid),
            "developer" => Some(PlanName::Developer),
            "team" => Some(PlanName::Team),
            "enterprise" => Some(PlanName::Enterprise),
            _ => None,
        }
    }
}

/// A byte ceiling. `Unlimited` sorts above every finite value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteLimit {
    Bytes(u64),
    Unlimited,
}

impl ByteLimit {
    pub fn bytes(&self) -> Option<u64> {
        match self {
            ByteLimit::Bytes(n) => Some(*n),
            ByteLimit::Unlimited => None,
        }
    }

    /// Whether `amount` fits under this limit.
    pub fn allows(&self, amount: u64) -> bool {
        match self {
            ByteLimit::Bytes(n) => amount <= *n,
            ByteLimit::Unlimited => true,
        }
    }

    pub fn remaining(&self, used: u64) -> Option<u64> {
        self.bytes().map(|n| n.saturating_sub(used))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamQuality {
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "2160p")]
    P2160,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanConfig {
    pub name: PlanName,
    pub quota: ByteLimit,
    pub upload_limit: ByteLimit,
    /// `None` means no cap on sub-accounts
    pub max_accounts: Option<u32>,
    /// Files expire this many days after upload; `None` keeps them forever
    pub default_expiry_days: Option<u32>,
    pub stream_quality: StreamQuality,
}

pub static PLANS: [PlanConfig; 5] = [
    PlanConfig {
        name: PlanName::Free,
        quota: ByteLimit::Bytes(2 * GIB),
        upload_limit: ByteLimit::Bytes(200 * MIB),
        max_accounts: Some(1),
        default_expiry_days: Some(30),
        stream_quality: StreamQuality::P720,
    },
    PlanConfig {
        name: PlanName::Paid,
        quota: ByteLimit::Bytes(5 * GIB),
        upload_limit: ByteLimit::Bytes(500 * MIB),
        max_accounts: Some(2),
        default_expiry_days: None,
        stream_quality: StreamQuality::P1080,
    },
    PlanConfig {
        name: PlanName::Developer,
        quota: ByteLimit::Bytes(8 * GIB),
        upload_limit: ByteLimit::Bytes(GIB),
        max_accounts: Some(3),
        default_expiry_days: None,
        stream_quality: StreamQuality::P1080,
    },
    PlanConfig {
        name: PlanName::Team,
        quota: ByteLimit::Bytes(10 * GIB),
        upload_limit: ByteLimit::Bytes(GIB),
        max_accounts: None,
        default_expiry_days: None,
        stream_quality: StreamQuality::P2160,
    },
    PlanConfig {
        name: PlanName::Enterprise,
        quota: ByteLimit::Unlimited,
        upload_limit: ByteLimit::Unlimited,
        max_accounts: None,
        default_expiry_days: None,
        stream_quality: StreamQuality::Custom,
    },
];

pub fn plan_config(name: PlanName) -> &'static PlanConfig {
    match name {
        PlanName::Free => &PLANS[0],
        PlanName::Paid => &PLANS[1],
        PlanName::Developer => &PLANS[2],
        PlanName::Team => &PLANS[3],
        PlanName::Enterprise => &PLANS[4],
    }
}

pub fn resolve_plan_name(plan: Option<&str>, subscription_type: Option<&str>) -> PlanName {
    plan.filter(|p| !p.is_empty())
        .or(subscription_type.filter(|p| !p.is_empty()))
        .and_then(PlanName::parse)
        .unwrap_or(PlanName::Free)
}

pub fn resolve_plan(user: Option<&User>) -> &'static PlanConfig {
    let name = match user {
        Some(user) => resolve_plan_name(user.plan.as_deref(), user.subscription_type.as_deref()),
        None => PlanName::Free,
    };
    plan_config(name)
}
