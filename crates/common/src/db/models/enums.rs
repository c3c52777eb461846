//! Closed enumerations stored as text columns

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Workflow status of a document
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "in_progress")]
    InProgress,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
    #[sea_orm(string_value = "completed")]
    Completed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum Category {
    #[sea_orm(string_value = "correspondence")]
    Correspondence,
    #[sea_orm(string_value = "policy")]
    Policy,
    #[sea_orm(string_value = "legal")]
    Legal,
    #[sea_orm(string_value = "financial")]
    Financial,
    #[sea_orm(string_value = "human_resources")]
    HumanResources,
    #[sea_orm(string_value = "procurement")]
    Procurement,
    #[sea_orm(string_value = "report")]
    Report,
    #[sea_orm(string_value = "other")]
    Other,
}

/// Urgency as declared at upload, and the AI-assigned priority
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    #[sea_orm(string_value = "low")]
    Low,
    #[sea_orm(string_value = "medium")]
    Medium,
    #[sea_orm(string_value = "high")]
    High,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[sea_orm(string_value = "super_admin")]
    SuperAdmin,
    #[sea_orm(string_value = "department_admin")]
    DepartmentAdmin,
    #[sea_orm(string_value = "officer")]
    Officer,
    #[sea_orm(string_value = "staff")]
    Staff,
}

/// Where the background pipeline left a document
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    #[sea_orm(string_value = "queued")]
    Queued,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "analyzed")]
    Analyzed,
    /// AI provider fell back for at least one call
    #[sea_orm(string_value = "degraded")]
    Degraded,
    /// No usable text; summary built from structured fields
    #[sea_orm(string_value = "metadata_only")]
    MetadataOnly,
}

impl ProcessingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingState::Queued => "queued",
            ProcessingState::Processing => "processing",
            ProcessingState::Analyzed => "analyzed",
            ProcessingState::Degraded => "degraded",
            ProcessingState::MetadataOnly => "metadata_only",
        }
    }

    pub fn needs_manual_review(&self) -> bool {
        matches!(self, ProcessingState::Degraded | ProcessingState::MetadataOnly)
    }
}

/// Kind of a history entry / ledger action
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Upload,
    ConfirmRouting,
    Route,
    Approve,
    Reject,
    Forward,
    Complete,
    Delete,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Upload => "upload",
            ActionKind::ConfirmRouting => "confirm_routing",
            ActionKind::Route => "route",
            ActionKind::Approve => "approve",
            ActionKind::Reject => "reject",
            ActionKind::Forward => "forward",
            ActionKind::Complete => "complete",
            ActionKind::Delete => "delete",
        }
    }
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::InProgress => "in_progress",
            Status::Approved => "approved",
            Status::Rejected => "rejected",
            Status::Completed => "completed",
        }
    }
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Correspondence => "correspondence",
            Category::Policy => "policy",
            Category::Legal => "legal",
            Category::Financial => "financial",
            Category::HumanResources => "human_resources",
            Category::Procurement => "procurement",
            Category::Report => "report",
            Category::Other => "other",
        }
    }
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
        }
    }
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::DepartmentAdmin => "department_admin",
            Role::Officer => "officer",
            Role::Staff => "staff",
        }
    }

    /// Roles that receive routing notifications for their department
    pub fn notification_recipients() -> &'static [Role] {
        &[Role::DepartmentAdmin, Role::Officer]
    }
}

/// Error returned when a string is not a known enum value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown value '{}'", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

fn normalize_token(s: &str) -> String {
    s.trim().to_lowercase().replace([' ', '-'], "_")
}

impl FromStr for Category {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "correspondence" => Ok(Category::Correspondence),
            "policy" => Ok(Category::Policy),
            "legal" => Ok(Category::Legal),
            "financial" | "finance" => Ok(Category::Financial),
            "human_resources" | "hr" => Ok(Category::HumanResources),
            "procurement" => Ok(Category::Procurement),
            "report" => Ok(Category::Report),
            "other" => Ok(Category::Other),
            _ => Err(UnknownVariant(s.to_string())),
        }
    }
}

impl FromStr for Urgency {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "low" => Ok(Urgency::Low),
            "medium" | "normal" => Ok(Urgency::Medium),
            "high" | "urgent" => Ok(Urgency::High),
            _ => Err(UnknownVariant(s.to_string())),
        }
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "super_admin" | "superadmin" => Ok(Role::SuperAdmin),
            "department_admin" | "admin" => Ok(Role::DepartmentAdmin),
            "officer" => Ok(Role::Officer),
            "staff" => Ok(Role::Staff),
            _ => Err(UnknownVariant(s.to_string())),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parsing_is_lenient() {
        assert_eq!("Human Resources".parse::<Category>(), Ok(Category::HumanResources));
        assert_eq!("finance".parse::<Category>(), Ok(Category::Financial));
        assert!("weather".parse::<Category>().is_err());
    }

    #[test]
    fn test_urgency_round_trips_through_str() {
        for urgency in [Urgency::Low, Urgency::Medium, Urgency::High] {
            assert_eq!(urgency.as_str().parse::<Urgency>(), Ok(urgency));
        }
    }

    #[test]
    fn test_manual_review_states() {
        assert!(ProcessingState::MetadataOnly.needs_manual_review());
        assert!(ProcessingState::Degraded.needs_manual_review());
        assert!(!ProcessingState::Analyzed.needs_manual_review());
    }
}
