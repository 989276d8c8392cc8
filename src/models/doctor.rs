use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub full_name: String,
    pub specialty: String,
    /// Professional license number (CRM). Unique across the hospital.
    pub license_number: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}
