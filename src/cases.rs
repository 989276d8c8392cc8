//! Department-scoped read views over the appointment store.
//!
//! Every view goes through the same case loader, so the placeholder filter
//! and readiness rules are applied exactly once — department counts can never
//! diverge because one screen reimplemented the filter differently.

use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::db::repository::list_by_hospital;
use crate::error::DomainError;
use crate::models::enums::{AnesthesiaEvaluation, BillingLiberation};
use crate::models::Appointment;
use crate::workflow::compute_readiness;

/// All live, non-placeholder cases for a hospital. The single gateway every
/// view below uses; structural placeholders (reserved slots with no patient
/// recorded) are filtered here and nowhere else.
fn active_cases(conn: &Connection, hospital_id: &Uuid) -> Result<Vec<Appointment>, DomainError> {
    Ok(list_by_hospital(conn, hospital_id)?
        .into_iter()
        .filter(|a| !a.is_placeholder())
        .collect())
}

/// Cases still waiting on the anesthesia form, whatever the state of their
/// exam documents.
pub fn list_pending_documentation(
    conn: &Connection,
    hospital_id: &Uuid,
) -> Result<Vec<Appointment>, DomainError> {
    Ok(active_cases(conn, hospital_id)?
        .into_iter()
        .filter(|a| !a.pre_anesthesia_ready())
        .collect())
}

/// Cases with both readiness gates satisfied.
pub fn list_ready_for_billing(
    conn: &Connection,
    hospital_id: &Uuid,
) -> Result<Vec<Appointment>, DomainError> {
    Ok(active_cases(conn, hospital_id)?
        .into_iter()
        .filter(|a| compute_readiness(a).fully_documented)
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MissingRequirement {
    ExamDocuments,
    AnesthesiaForm,
}

/// Advisory only: these never block billing readiness, but the billing screen
/// shows them next to the case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BillingWarning {
    AnesthesiaNotApproved,
    BillingNotLiberated,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingBillingCase {
    pub appointment: Appointment,
    /// Which readiness gate is unmet, so the caller can render an actionable
    /// reason instead of a bare "not ready".
    pub missing: Vec<MissingRequirement>,
}

/// The complement of [`list_ready_for_billing`], annotated with the unmet
/// gates.
pub fn list_pending_billing(
    conn: &Connection,
    hospital_id: &Uuid,
) -> Result<Vec<PendingBillingCase>, DomainError> {
    Ok(active_cases(conn, hospital_id)?
        .into_iter()
        .filter(|a| !compute_readiness(a).fully_documented)
        .map(|appointment| {
            let mut missing = Vec::new();
            if !appointment.documentation_ready() {
                missing.push(MissingRequirement::ExamDocuments);
            }
            if !appointment.pre_anesthesia_ready() {
                missing.push(MissingRequirement::AnesthesiaForm);
            }
            PendingBillingCase { appointment, missing }
        })
        .collect())
}

/// Warnings for a case the billing department is about to submit.
pub fn billing_warnings(appointment: &Appointment) -> Vec<BillingWarning> {
    let mut warnings = Vec::new();
    if appointment.anesthesia_evaluation != AnesthesiaEvaluation::Approved {
        warnings.push(BillingWarning::AnesthesiaNotApproved);
    }
    if appointment.billing_liberation != BillingLiberation::Liberated {
        warnings.push(BillingWarning::BillingNotLiberated);
    }
    warnings
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientSummary {
    /// Display name taken from the most recently created appointment.
    pub name: String,
    pub latest_appointment_id: Uuid,
    pub appointment_count: usize,
}

/// Distinct patients for reporting. Identity is case-insensitive trimmed
/// name equality — there is no stable patient identifier in this system, so
/// two real patients sharing a name merge here. Known modeling limitation,
/// deliberately preserved.
pub fn list_distinct_patients(
    conn: &Connection,
    hospital_id: &Uuid,
) -> Result<Vec<PatientSummary>, DomainError> {
    let mut by_key: Vec<(String, PatientSummary, chrono::NaiveDateTime)> = Vec::new();

    for appointment in active_cases(conn, hospital_id)? {
        let key = appointment.patient_name.trim().to_lowercase();
        match by_key.iter_mut().find(|(k, _, _)| *k == key) {
            Some((_, summary, latest_created)) => {
                summary.appointment_count += 1;
                // Most recent creation wins the representative record.
                if appointment.created_at > *latest_created {
                    summary.name = appointment.patient_name.trim().to_string();
                    summary.latest_appointment_id = appointment.id;
                    *latest_created = appointment.created_at;
                }
            }
            None => {
                let created = appointment.created_at;
                by_key.push((
                    key,
                    PatientSummary {
                        name: appointment.patient_name.trim().to_string(),
                        latest_appointment_id: appointment.id,
                        appointment_count: 1,
                    },
                    created,
                ));
            }
        }
    }

    let mut patients: Vec<PatientSummary> = by_key.into_iter().map(|(_, s, _)| s).collect();
    patients.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    Ok(patients)
}
