//! Domain (tenant) model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

/// Domain status codes.
///
/// `All` is a query sentinel only and is never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainStatus {
    Enabled,
    Disabled,
    Freeze,
    All,
}

impl DomainStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainStatus::Enabled => "enabled",
            DomainStatus::Disabled => "disabled",
            DomainStatus::Freeze => "freeze",
            DomainStatus::All => "all",
        }
    }
}

impl FromStr for DomainStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enabled" => Ok(DomainStatus::Enabled),
            "disabled" => Ok(DomainStatus::Disabled),
            "freeze" => Ok(DomainStatus::Freeze),
            "all" => Ok(DomainStatus::All),
            other => Err(format!("invalid domain status '{other}'")),
        }
    }
}

/// Domain entity.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Domain {
    pub id: String,
    pub name: String,
    pub alias: String,
    pub tags: Vec<String>,
    pub metadata: serde_json::Value,
    pub status: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_by: String,
    pub updated_at: Option<DateTime<Utc>>,
    /// Permission the requesting user holds, filled per response.
    #[sqlx(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission: Option<String>,
}

impl Domain {
    /// Create a new domain owned by `created_by`.
    pub fn new(
        name: String,
        alias: String,
        tags: Vec<String>,
        metadata: serde_json::Value,
        status: DomainStatus,
        created_by: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            alias,
            tags,
            metadata,
            status: status.as_str().to_string(),
            created_by,
            created_at: Utc::now(),
            updated_by: String::new(),
            updated_at: None,
            permission: None,
        }
    }

    /// Parsed status code; unrecognised codes read as the `All` sentinel,
    /// which no authorization path accepts.
    pub fn status(&self) -> DomainStatus {
        DomainStatus::from_str(&self.status).unwrap_or(DomainStatus::All)
    }
}

/// Patch applied by `UpdateDomain` and `ChangeDomainStatus`. `None`
/// leaves the stored value untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DomainReq {
    pub name: Option<String>,
    pub alias: Option<String>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<serde_json::Value>,
    pub status: Option<DomainStatus>,
}

/// Listing filter.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub offset: u64,
    pub limit: u64,
    pub name: Option<String>,
    pub tag: Option<String>,
    pub permission: Option<String>,
    pub status: Option<DomainStatus>,
    /// Restrict to domains this user is related to; `None` lists all.
    pub subject_id: Option<String>,
}

/// One page of domains.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DomainsPage {
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
    pub domains: Vec<Domain>,
}
