//! Workflow status engine — the five status dimensions of an appointment.
//!
//! Each dimension is a small state machine owned by one department:
//! documentation readiness and pre-anesthesia readiness follow attachment
//! facts, anesthesia evaluation and billing liberation are reversible
//! verdicts with mandatory reasons on specific outcomes, the AIH stage is a
//! free-form administrative pipeline with entry timestamps, and confirmation
//! pivots around `Awaiting`.
//!
//! Writes are dimension-scoped conditional updates: the UPDATE names the
//! expected current value of only the dimension being changed, so staff
//! editing different dimensions of the same appointment never serialize
//! against each other. A lost race on the same dimension is retried a bounded
//! number of times, then reported as `ConcurrentUpdateConflict`.

use chrono::Local;
use rusqlite::Connection;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::db::repository::{
    delete_anesthesia_form, delete_attachment, get_appointment, get_attachment, insert_attachment,
    update_aih_stage, update_anesthesia_evaluation, update_billing_liberation, update_confirmation,
};
use crate::error::DomainError;
use crate::models::enums::{
    AihStage, AnesthesiaEvaluation, AttachmentKind, BillingLiberation, Confirmation,
};
use crate::models::{Appointment, Attachment};
use crate::notifier::{ChangeEvent, ChangeNotifier};

/// Retry budget for a lost race on a single dimension.
pub const MAX_TRANSITION_RETRIES: u32 = 3;

// ─── Derived readiness ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Readiness {
    pub fully_documented: bool,
    pub ready_for_billing: bool,
}

/// Pure function of the two attachment-derived flags. Recomputed on every
/// read; never cached on write.
pub fn compute_readiness(appointment: &Appointment) -> Readiness {
    let fully_documented =
        appointment.documentation_ready() && appointment.pre_anesthesia_ready();
    Readiness {
        fully_documented,
        ready_for_billing: fully_documented,
    }
}

// ─── Transitions ─────────────────────────────────────────────────────────────

/// A requested status change on one dimension. Payload fields travel with the
/// request; their required-ness depends on the target value.
#[derive(Debug, Clone)]
pub enum StatusTransition {
    AnesthesiaEvaluation {
        value: AnesthesiaEvaluation,
        note: Option<String>,
    },
    AihStage {
        stage: AihStage,
    },
    BillingLiberation {
        value: BillingLiberation,
        justification: Option<String>,
    },
    Confirmation {
        value: Confirmation,
    },
}

impl StatusTransition {
    pub fn dimension(&self) -> &'static str {
        match self {
            Self::AnesthesiaEvaluation { .. } => "anesthesia_evaluation",
            Self::AihStage { .. } => "aih_stage",
            Self::BillingLiberation { .. } => "billing_liberation",
            Self::Confirmation { .. } => "confirmation",
        }
    }
}

/// Shared mandatory-payload primitive: a target value that demands a reason
/// gets a trimmed, non-empty string or the transition fails before any write.
fn require_payload(
    dimension: &'static str,
    field: &'static str,
    value: Option<&str>,
) -> Result<String, DomainError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(DomainError::MissingRequiredField { dimension, field }),
    }
}

/// Anesthesia evaluation machine: every state is reachable from every state
/// (re-evaluation overwrites, `Unset` clears), but each evaluated target
/// demands its own note. Returns the note to store.
pub fn validate_anesthesia_transition(
    _current: AnesthesiaEvaluation,
    target: AnesthesiaEvaluation,
    note: Option<&str>,
) -> Result<Option<String>, DomainError> {
    let dimension = "anesthesia_evaluation";
    match target {
        AnesthesiaEvaluation::Unset => Ok(None),
        AnesthesiaEvaluation::Approved => {
            Ok(Some(require_payload(dimension, "approval_note", note)?))
        }
        AnesthesiaEvaluation::Rejected => {
            Ok(Some(require_payload(dimension, "rejection_reason", note)?))
        }
        AnesthesiaEvaluation::NeedsMoreInfo => {
            Ok(Some(require_payload(dimension, "supplementary_notes", note)?))
        }
    }
}

/// Billing liberation machine: mirrors the anesthesia pattern. `NotLiberated`
/// demands a justification; `Liberated` and `Unset` clear it.
pub fn validate_billing_transition(
    _current: BillingLiberation,
    target: BillingLiberation,
    justification: Option<&str>,
) -> Result<Option<String>, DomainError> {
    match target {
        BillingLiberation::Unset | BillingLiberation::Liberated => Ok(None),
        BillingLiberation::NotLiberated => Ok(Some(require_payload(
            "billing_liberation",
            "justification",
            justification,
        )?)),
    }
}

/// Confirmation machine: `Awaiting` is the pivot. Confirmed and Cancelled are
/// not directly reachable from each other; identity writes are permitted.
pub fn validate_confirmation_transition(
    current: Confirmation,
    target: Confirmation,
) -> Result<(), DomainError> {
    let legal = current == target
        || current == Confirmation::Awaiting
        || target == Confirmation::Awaiting;
    if legal {
        Ok(())
    } else {
        Err(DomainError::IllegalTransition {
            dimension: "confirmation",
            from: current.as_str(),
            to: target.as_str(),
        })
    }
}

/// Apply one status transition. Validation is a precondition of the write:
/// a rejected payload leaves the stored value untouched, and retrying the
/// same bad input fails identically. Returns the full updated snapshot.
pub fn apply_transition(
    conn: &Connection,
    notifier: &dyn ChangeNotifier,
    appointment_id: &Uuid,
    transition: StatusTransition,
) -> Result<Appointment, DomainError> {
    for _ in 0..MAX_TRANSITION_RETRIES {
        let current = load(conn, appointment_id)?;

        let affected = match &transition {
            StatusTransition::AnesthesiaEvaluation { value, note } => {
                let stored = validate_anesthesia_transition(
                    current.anesthesia_evaluation,
                    *value,
                    note.as_deref(),
                )?;
                update_anesthesia_evaluation(
                    conn,
                    appointment_id,
                    current.anesthesia_evaluation,
                    *value,
                    stored.as_deref(),
                )?
            }
            // Free-form stage jumps are an operational allowance; every entry
            // (re-entry included) restamps the stage clock.
            StatusTransition::AihStage { stage } => update_aih_stage(
                conn,
                appointment_id,
                current.aih_stage,
                *stage,
                Local::now().naive_local(),
            )?,
            StatusTransition::BillingLiberation { value, justification } => {
                let stored = validate_billing_transition(
                    current.billing_liberation,
                    *value,
                    justification.as_deref(),
                )?;
                update_billing_liberation(
                    conn,
                    appointment_id,
                    current.billing_liberation,
                    *value,
                    stored.as_deref(),
                )?
            }
            StatusTransition::Confirmation { value } => {
                validate_confirmation_transition(current.confirmation, *value)?;
                update_confirmation(conn, appointment_id, current.confirmation, *value)?
            }
        };

        if affected == 1 {
            let updated = load(conn, appointment_id)?;
            info!(
                appointment_id = %appointment_id,
                dimension = transition.dimension(),
                "status transition applied"
            );
            notifier.publish(transition_event(&updated, &transition));
            return Ok(updated);
        }
        // Lost the race on this dimension; loop re-reads and revalidates.
    }

    Err(DomainError::ConcurrentUpdateConflict {
        dimension: transition.dimension(),
        appointment_id: *appointment_id,
        attempts: MAX_TRANSITION_RETRIES,
    })
}

fn transition_event(updated: &Appointment, transition: &StatusTransition) -> ChangeEvent {
    let (changed_fields, new_values) = match transition {
        StatusTransition::AnesthesiaEvaluation { .. } => (
            vec!["anesthesia_evaluation", "anesthesia_note"],
            serde_json::json!({
                "anesthesia_evaluation": updated.anesthesia_evaluation,
                "anesthesia_note": updated.anesthesia_note,
            }),
        ),
        StatusTransition::AihStage { .. } => (
            vec!["aih_stage", "aih_stage_entered_at"],
            serde_json::json!({
                "aih_stage": updated.aih_stage,
                "aih_stage_entered_at": updated.aih_stage_entered_at,
            }),
        ),
        StatusTransition::BillingLiberation { .. } => (
            vec!["billing_liberation", "billing_justification"],
            serde_json::json!({
                "billing_liberation": updated.billing_liberation,
                "billing_justification": updated.billing_justification,
            }),
        ),
        StatusTransition::Confirmation { .. } => (
            vec!["confirmation"],
            serde_json::json!({ "confirmation": updated.confirmation }),
        ),
    };
    ChangeEvent {
        appointment_id: updated.id,
        hospital_id: updated.hospital_id,
        changed_fields,
        new_values,
    }
}

// ─── Attachment facts ────────────────────────────────────────────────────────
//
// These record presence only. The caller uploads to external object storage
// first and passes the confirmed storage_ref; no lock is held across that
// call and nothing here depends on the store being reachable.

pub fn record_exam_attachment(
    conn: &Connection,
    notifier: &dyn ChangeNotifier,
    appointment_id: &Uuid,
    storage_ref: &str,
) -> Result<Appointment, DomainError> {
    load(conn, appointment_id)?;

    insert_attachment(
        conn,
        &Attachment {
            id: Uuid::new_v4(),
            appointment_id: *appointment_id,
            kind: AttachmentKind::Exam,
            storage_ref: storage_ref.to_string(),
            recorded_at: Local::now().naive_local(),
        },
    )?;

    publish_readiness(conn, notifier, appointment_id, "documentation_ready")
}

pub fn remove_exam_attachment(
    conn: &Connection,
    notifier: &dyn ChangeNotifier,
    attachment_id: &Uuid,
) -> Result<Appointment, DomainError> {
    let attachment = get_attachment(conn, attachment_id)?.ok_or_else(|| DomainError::NotFound {
        entity: "attachment",
        id: attachment_id.to_string(),
    })?;
    if attachment.kind != AttachmentKind::Exam {
        return Err(DomainError::Validation {
            field: "attachment_id",
            reason: format!("attachment {attachment_id} is not an exam attachment"),
        });
    }

    delete_attachment(conn, attachment_id)?;
    publish_readiness(conn, notifier, &attachment.appointment_id, "documentation_ready")
}

/// At most one active pre-anesthesia form. Both the early check and the
/// partial unique index report the same `AttachmentAlreadyExists`.
pub fn attach_anesthesia_form(
    conn: &Connection,
    notifier: &dyn ChangeNotifier,
    appointment_id: &Uuid,
    storage_ref: &str,
) -> Result<Appointment, DomainError> {
    let current = load(conn, appointment_id)?;
    if current.has_anesthesia_form {
        return Err(DomainError::AttachmentAlreadyExists {
            appointment_id: *appointment_id,
        });
    }

    let result = insert_attachment(
        conn,
        &Attachment {
            id: Uuid::new_v4(),
            appointment_id: *appointment_id,
            kind: AttachmentKind::AnesthesiaForm,
            storage_ref: storage_ref.to_string(),
            recorded_at: Local::now().naive_local(),
        },
    );
    match result {
        Ok(()) => {}
        Err(e) if e.is_unique_violation() => {
            return Err(DomainError::AttachmentAlreadyExists {
                appointment_id: *appointment_id,
            });
        }
        Err(e) => return Err(e.into()),
    }

    publish_readiness(conn, notifier, appointment_id, "pre_anesthesia_ready")
}

pub fn remove_anesthesia_form(
    conn: &Connection,
    notifier: &dyn ChangeNotifier,
    appointment_id: &Uuid,
) -> Result<Appointment, DomainError> {
    load(conn, appointment_id)?;

    if !delete_anesthesia_form(conn, appointment_id)? {
        return Err(DomainError::NotFound {
            entity: "anesthesia form",
            id: appointment_id.to_string(),
        });
    }

    publish_readiness(conn, notifier, appointment_id, "pre_anesthesia_ready")
}

fn load(conn: &Connection, appointment_id: &Uuid) -> Result<Appointment, DomainError> {
    get_appointment(conn, appointment_id)?.ok_or_else(|| DomainError::NotFound {
        entity: "appointment",
        id: appointment_id.to_string(),
    })
}

fn publish_readiness(
    conn: &Connection,
    notifier: &dyn ChangeNotifier,
    appointment_id: &Uuid,
    changed: &'static str,
) -> Result<Appointment, DomainError> {
    let updated = load(conn, appointment_id)?;
    let readiness = compute_readiness(&updated);
    notifier.publish(ChangeEvent {
        appointment_id: updated.id,
        hospital_id: updated.hospital_id,
        changed_fields: vec![changed],
        new_values: serde_json::json!({
            "documentation_ready": updated.documentation_ready(),
            "pre_anesthesia_ready": updated.pre_anesthesia_ready(),
            "fully_documented": readiness.fully_documented,
        }),
    });
    Ok(updated)
}
