//! Closed status enumerations for prompts and images.
//!
//! Transitions are expressed as methods returning `Option<Self>`; a `None`
//! means the (state, event) pair is illegal and the caller must refuse the
//! operation. The TEXT columns round-trip through `FromSql`/`ToSql`, so no
//! status string comparison happens above the row boundary.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};

/// Lifecycle of a student prompt.
///
/// `pending → approved | rejected` (teacher review),
/// `approved → processing` (generation starts),
/// `processing → processed` (generation finished),
/// `approved → processed` (generation failed before starting).
/// `rejected` and `processed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptStatus {
    Pending,
    Approved,
    Rejected,
    Processing,
    Processed,
}

impl PromptStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PromptStatus::Pending => "pending",
            PromptStatus::Approved => "approved",
            PromptStatus::Rejected => "rejected",
            PromptStatus::Processing => "processing",
            PromptStatus::Processed => "processed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PromptStatus::Pending),
            "approved" => Some(PromptStatus::Approved),
            "rejected" => Some(PromptStatus::Rejected),
            "processing" => Some(PromptStatus::Processing),
            "processed" => Some(PromptStatus::Processed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PromptStatus::Rejected | PromptStatus::Processed)
    }

    /// Teacher review. Legal only from `Pending`.
    pub fn review(self, decision: ReviewDecision) -> Option<Self> {
        match (self, decision) {
            (PromptStatus::Pending, ReviewDecision::Approved) => Some(PromptStatus::Approved),
            (PromptStatus::Pending, ReviewDecision::Rejected) => Some(PromptStatus::Rejected),
            _ => None,
        }
    }

    /// Generation picks the prompt up. Legal only from `Approved`.
    pub fn begin_generation(self) -> Option<Self> {
        match self {
            PromptStatus::Approved => Some(PromptStatus::Processing),
            _ => None,
        }
    }

    /// Generation finished, with or without an image. Legal from
    /// `Processing`, and from `Approved` for the failure path that never
    /// reached the queue.
    pub fn finish_generation(self) -> Option<Self> {
        match self {
            PromptStatus::Processing | PromptStatus::Approved => Some(PromptStatus::Processed),
            _ => None,
        }
    }
}

impl std::fmt::Display for PromptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a generated image: `pending → approved | rejected`, both
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStatus {
    Pending,
    Approved,
    Rejected,
}

impl ImageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageStatus::Pending => "pending",
            ImageStatus::Approved => "approved",
            ImageStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ImageStatus::Pending),
            "approved" => Some(ImageStatus::Approved),
            "rejected" => Some(ImageStatus::Rejected),
            _ => None,
        }
    }

    /// Teacher review. Legal only from `Pending`.
    pub fn review(self, decision: ReviewDecision) -> Option<Self> {
        match (self, decision) {
            (ImageStatus::Pending, ReviewDecision::Approved) => Some(ImageStatus::Approved),
            (ImageStatus::Pending, ReviewDecision::Rejected) => Some(ImageStatus::Rejected),
            _ => None,
        }
    }
}

impl std::fmt::Display for ImageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse content-risk classification attached to a generated image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyLevel {
    Safe,
    Moderate,
    Unsafe,
}

impl SafetyLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            SafetyLevel::Safe => "safe",
            SafetyLevel::Moderate => "moderate",
            SafetyLevel::Unsafe => "unsafe",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "safe" => Some(SafetyLevel::Safe),
            "moderate" => Some(SafetyLevel::Moderate),
            "unsafe" => Some(SafetyLevel::Unsafe),
            _ => None,
        }
    }
}

impl std::fmt::Display for SafetyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The only review inputs a teacher can submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Approved,
    Rejected,
}

impl ReviewDecision {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "approved" => Some(ReviewDecision::Approved),
            "rejected" => Some(ReviewDecision::Rejected),
            _ => None,
        }
    }
}

macro_rules! impl_sql_text_enum {
    ($ty:ty, $what:literal) => {
        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let s = value.as_str()?;
                Self::parse(s).ok_or_else(|| {
                    FromSqlError::Other(format!(concat!("invalid ", $what, " '{}'"), s).into())
                })
            }
        }

        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(self.as_str().into())
            }
        }
    };
}

impl_sql_text_enum!(PromptStatus, "prompt status");
impl_sql_text_enum!(ImageStatus, "image status");
impl_sql_text_enum!(SafetyLevel, "safety level");
