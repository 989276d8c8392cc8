use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::ProcedureCategory;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Procedure {
    pub id: Uuid,
    pub name: String,
    pub category: ProcedureCategory,
    /// Estimated duration in minutes. Always > 0.
    pub estimated_duration_minutes: u32,
    pub description: Option<String>,
}
