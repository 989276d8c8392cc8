use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{AihStage, AnesthesiaEvaluation, AttachmentKind, BillingLiberation, Confirmation};

/// The central scheduling record. One row per booked slot.
///
/// Five status dimensions live on this record, each owned by a different
/// department and mutated independently: documentation readiness and
/// pre-anesthesia readiness (derived from attachment presence), anesthesia
/// evaluation, AIH administrative stage, billing liberation, and patient
/// confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub hospital_id: Uuid,
    /// Empty string marks a structural placeholder: a reserved slot with no
    /// patient recorded yet. Department views filter these out.
    pub patient_name: String,
    pub patient_birth_date: Option<NaiveDate>,
    pub patient_phone: Option<String>,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
    pub doctor_id: Uuid,
    pub procedure_id: Uuid,

    pub anesthesia_evaluation: AnesthesiaEvaluation,
    pub anesthesia_note: Option<String>,
    pub aih_stage: AihStage,
    pub aih_stage_entered_at: NaiveDateTime,
    pub billing_liberation: BillingLiberation,
    pub billing_justification: Option<String>,
    pub confirmation: Confirmation,

    /// Loaded alongside the row from the attachments table; not a column.
    pub exam_attachment_count: u32,
    pub has_anesthesia_form: bool,

    pub created_at: NaiveDateTime,
    pub deleted: bool,
}

impl Appointment {
    pub fn documentation_ready(&self) -> bool {
        self.exam_attachment_count > 0
    }

    pub fn pre_anesthesia_ready(&self) -> bool {
        self.has_anesthesia_form
    }

    pub fn is_placeholder(&self) -> bool {
        self.patient_name.trim().is_empty()
    }

    /// Time spent in the current AIH stage, for operational reporting.
    /// Re-entering a stage resets its entry timestamp, so this is always
    /// relative to the latest entry.
    pub fn time_in_current_stage(&self, now: NaiveDateTime) -> Duration {
        now - self.aih_stage_entered_at
    }
}

/// A recorded attachment fact. The bytes live in external object storage;
/// `storage_ref` is only written after that store confirmed the upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub kind: AttachmentKind,
    pub storage_ref: String,
    pub recorded_at: NaiveDateTime,
}
