use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request to schedule a check for one sensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub sensor_id: Uuid,
    pub collect_type_id: Option<Uuid>,
    #[serde(default)]
    pub use_db: bool,
}

/// Echo of the accepted submission plus the scheduling decision.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub sensor_id: Uuid,
    pub collect_type_id: Option<Uuid>,
    pub use_db: bool,
    pub collect_type: String,
    pub priority: u8,
}
