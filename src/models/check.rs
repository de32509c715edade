use serde::Serialize;
use uuid::Uuid;

use crate::models::comparison::ComparisonOutcome;

/// Outcome status of a check, stored by the platform as an integer code.
///
/// A check that has not finished yet has no status at all; that
/// in-progress state is modelled as `Option<CheckStatus>` and reported
/// as a null code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum CheckStatus {
    NoChange,
    Unavailable,
    MoveFound,
    BadQuality,
    Forbidden,
}

impl CheckStatus {
    /// Integer code used in stored check records.
    pub const fn code(self) -> u8 {
        match self {
            Self::NoChange => 0,
            Self::Unavailable => 1,
            Self::MoveFound => 2,
            Self::BadQuality => 4,
            Self::Forbidden => 5,
        }
    }
}

/// Result of a single collection attempt. Created fresh per attempt,
/// filled in by the collector, and discarded after reporting.
#[derive(Debug, Clone, Default)]
pub struct CheckResult {
    pub status: Option<CheckStatus>,
    pub image: Option<Vec<u8>>,
    /// Image format tag; always present when `image` is.
    pub extension: Option<String>,
}

impl CheckResult {
    pub fn with_status(status: CheckStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_image(image: Vec<u8>, extension: impl Into<String>) -> Self {
        Self {
            status: None,
            image: Some(image),
            extension: Some(extension.into()),
        }
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }
}

/// Everything the worker hands to the reporting endpoint for one
/// attempt. The client fills in the check id and sensor id when
/// building the wire payload.
#[derive(Debug, Clone)]
pub struct CheckReport {
    pub collect_type_id: Option<Uuid>,
    pub detail: Option<String>,
    pub status: Option<CheckStatus>,
    pub image_id: Option<Uuid>,
    /// Selects the image-check endpoint over the liveness endpoint.
    pub has_image: bool,
    pub outcome: Option<ComparisonOutcome>,
}

/// Wire shape for an image-bearing check record.
#[derive(Debug, Serialize)]
pub struct ImageCheckRecord {
    pub id: Uuid,
    pub sensor_id: Uuid,
    pub collect_type_id: Option<Uuid>,
    pub detail: Option<String>,
    pub check_status: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_id: Option<Uuid>,
    #[serde(flatten)]
    pub outcome: ComparisonOutcome,
}

/// Wire shape for a liveness-only check record.
#[derive(Debug, Serialize)]
pub struct LivenessCheckRecord {
    pub id: Uuid,
    pub sensor_id: Uuid,
    pub collect_type_id: Option<Uuid>,
    pub detail: Option<String>,
    pub check_status: Option<u8>,
    /// Always false; marks the record as image-free for the platform.
    pub image: bool,
}
