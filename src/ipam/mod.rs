/// IP address inventory
pub mod inventory;

pub use inventory::{IpChange, IpInventoryManager};

use crate::{
    audit::{diff, snapshot_of, Values},
    error::{FieldErrors, IpamError, IpamResult},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row};
use std::net::{Ipv4Addr, Ipv6Addr};
use validator::Validate;

/// Address family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IpType {
    #[serde(rename = "IPv4")]
    V4,
    #[serde(rename = "IPv6")]
    V6,
}

impl IpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IpType::V4 => "IPv4",
            IpType::V6 => "IPv6",
        }
    }

    pub fn from_str(s: &str) -> IpamResult<Self> {
        match s {
            "IPv4" => Ok(IpType::V4),
            "IPv6" => Ok(IpType::V6),
            _ => Err(IpamError::validation("type", "The type must be IPv4 or IPv6.")),
        }
    }

    /// Whether `ip` is a well-formed address of this family
    pub fn accepts(&self, ip: &str) -> bool {
        match self {
            IpType::V4 => ip.parse::<Ipv4Addr>().is_ok(),
            IpType::V6 => ip.parse::<Ipv6Addr>().is_ok(),
        }
    }
}

/// A tracked address; soft-deleted records keep their row
#[derive(Debug, Clone, Serialize)]
pub struct IpAddressRecord {
    pub id: i64,
    pub ip: String,
    #[serde(rename = "type")]
    pub ip_type: IpType,
    pub label: String,
    pub comment: Option<String>,
    pub user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl IpAddressRecord {
    pub(crate) fn from_row(row: &SqliteRow) -> IpamResult<Self> {
        let ip_type: String = row.try_get("type")?;
        Ok(IpAddressRecord {
            id: row.try_get("id")?,
            ip: row.try_get("ip")?,
            ip_type: IpType::from_str(&ip_type)?,
            label: row.try_get("label")?,
            comment: row.try_get("comment")?,
            user_id: row.try_get("user_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Fields captured in create/delete/restore audit entries
    pub fn audit_snapshot(&self) -> IpamResult<Values> {
        Ok(diff::only(
            &snapshot_of(self)?,
            &["id", "ip", "type", "label", "comment"],
        ))
    }
}

/// A new inventory entry
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewIp {
    #[validate(length(min = 1, max = 45, message = "The ip field is required."))]
    pub ip: String,
    #[serde(rename = "type")]
    pub ip_type: IpType,
    #[validate(length(min = 1, max = 255, message = "The label field is required and may not exceed 255 characters."))]
    pub label: String,
    #[validate(length(max = 1000, message = "The comment may not exceed 1000 characters."))]
    pub comment: Option<String>,
}

impl NewIp {
    pub fn check(&self) -> IpamResult<()> {
        let mut errors = validation_errors(self);
        if !self.ip_type.accepts(self.ip.trim()) {
            errors.add(
                "ip",
                format!("The ip must be a valid {} address.", self.ip_type.as_str()),
            );
        }
        errors.into_result()
    }
}

/// Partial edit; absent fields are left alone
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct IpUpdate {
    #[validate(length(min = 1, max = 45, message = "The ip field is required."))]
    pub ip: Option<String>,
    #[serde(rename = "type")]
    pub ip_type: Option<IpType>,
    #[validate(length(min = 1, max = 255, message = "The label field is required and may not exceed 255 characters."))]
    pub label: Option<String>,
    #[validate(length(max = 1000, message = "The comment may not exceed 1000 characters."))]
    pub comment: Option<String>,
}

impl IpUpdate {
    pub fn check(&self) -> IpamResult<()> {
        validation_errors(self).into_result()
    }

    /// Drop every field a non-owner, non-admin editor may not touch
    pub fn restrict_to_annotations(self) -> Self {
        Self {
            ip: None,
            ip_type: None,
            label: self.label,
            comment: self.comment,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ip.is_none() && self.ip_type.is_none() && self.label.is_none() && self.comment.is_none()
    }
}

/// Inventory listing filters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IpFilter {
    /// Matches ip, label or comment
    pub search: Option<String>,
    #[serde(rename = "type")]
    pub ip_type: Option<IpType>,
}

fn validation_errors<T: Validate>(input: &T) -> FieldErrors {
    match input.validate() {
        Ok(()) => FieldErrors::new(),
        Err(errors) => errors.into(),
    }
}
