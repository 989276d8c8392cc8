//! Slot booking and the scheduling-conflict guarantee.
//!
//! One live appointment per (doctor, date, time). The pre-check against the
//! store is an early reject for a friendly error; the partial unique index on
//! the appointments table is the actual enforcement, so two concurrent
//! creates for the same slot can never both commit. A lost race surfaces as
//! the same `SchedulingConflict` the pre-check would have raised.

use chrono::{Local, NaiveDate, NaiveTime};
use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

use crate::db::repository::{
    find_conflicting, get_appointment, get_doctor, get_procedure, insert_appointment,
    soft_delete_appointment, update_slot,
};
use crate::db::DatabaseError;
use crate::error::DomainError;
use crate::models::enums::{AihStage, AnesthesiaEvaluation, BillingLiberation, Confirmation};
use crate::models::Appointment;
use crate::notifier::{ChangeEvent, ChangeNotifier};
use crate::workflow::MAX_TRANSITION_RETRIES;

/// A booking request from a department. An empty `patient_name` reserves the
/// slot as a structural placeholder; department views skip it until patient
/// details are recorded.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub hospital_id: Uuid,
    pub patient_name: String,
    pub patient_birth_date: Option<NaiveDate>,
    pub patient_phone: Option<String>,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
    pub doctor_id: Uuid,
    pub procedure_id: Uuid,
}

/// Read-only conflict probe: is the slot taken by a live appointment other
/// than `exclude`?
pub fn check_conflict(
    conn: &Connection,
    doctor_id: &Uuid,
    date: NaiveDate,
    time: NaiveTime,
    exclude: Option<&Uuid>,
) -> Result<bool, DomainError> {
    Ok(find_conflicting(conn, doctor_id, date, time, exclude)?.is_some())
}

pub fn book_appointment(
    conn: &Connection,
    notifier: &dyn ChangeNotifier,
    request: BookingRequest,
) -> Result<Appointment, DomainError> {
    if get_doctor(conn, &request.doctor_id)?.is_none() {
        return Err(DomainError::NotFound {
            entity: "doctor",
            id: request.doctor_id.to_string(),
        });
    }
    if get_procedure(conn, &request.procedure_id)?.is_none() {
        return Err(DomainError::NotFound {
            entity: "procedure",
            id: request.procedure_id.to_string(),
        });
    }

    // Early reject so callers get the conflict before we touch the row.
    if check_conflict(conn, &request.doctor_id, request.scheduled_date, request.scheduled_time, None)? {
        return Err(DomainError::SchedulingConflict {
            doctor_id: request.doctor_id,
            date: request.scheduled_date,
            time: request.scheduled_time,
        });
    }

    let now = Local::now().naive_local();
    let appointment = Appointment {
        id: Uuid::new_v4(),
        hospital_id: request.hospital_id,
        patient_name: request.patient_name,
        patient_birth_date: request.patient_birth_date,
        patient_phone: request.patient_phone,
        scheduled_date: request.scheduled_date,
        scheduled_time: request.scheduled_time,
        doctor_id: request.doctor_id,
        procedure_id: request.procedure_id,
        anesthesia_evaluation: AnesthesiaEvaluation::Unset,
        anesthesia_note: None,
        aih_stage: AihStage::PendingBilling,
        aih_stage_entered_at: now,
        billing_liberation: BillingLiberation::Unset,
        billing_justification: None,
        confirmation: Confirmation::Awaiting,
        exam_attachment_count: 0,
        has_anesthesia_form: false,
        created_at: now,
        deleted: false,
    };

    match insert_appointment(conn, &appointment) {
        Ok(()) => {}
        // A concurrent racer took the slot between the pre-check and the
        // insert; the unique index caught it.
        Err(e) if e.is_unique_violation() => {
            return Err(DomainError::SchedulingConflict {
                doctor_id: appointment.doctor_id,
                date: appointment.scheduled_date,
                time: appointment.scheduled_time,
            });
        }
        Err(e) => return Err(e.into()),
    }

    info!(
        appointment_id = %appointment.id,
        doctor_id = %appointment.doctor_id,
        date = %appointment.scheduled_date,
        time = %appointment.scheduled_time,
        "appointment booked"
    );

    notifier.publish(ChangeEvent {
        appointment_id: appointment.id,
        hospital_id: appointment.hospital_id,
        changed_fields: vec!["created"],
        new_values: serde_json::to_value(&appointment).unwrap_or_default(),
    });

    Ok(appointment)
}

/// Move an appointment to a new slot (and optionally a new doctor). The
/// current slot never conflicts with itself.
pub fn reschedule_appointment(
    conn: &Connection,
    notifier: &dyn ChangeNotifier,
    id: &Uuid,
    new_doctor: Option<Uuid>,
    new_date: NaiveDate,
    new_time: NaiveTime,
) -> Result<Appointment, DomainError> {
    let mut current = get_appointment(conn, id)?.ok_or_else(|| DomainError::NotFound {
        entity: "appointment",
        id: id.to_string(),
    })?;

    let target_doctor = new_doctor.unwrap_or(current.doctor_id);
    if new_doctor.is_some() && get_doctor(conn, &target_doctor)?.is_none() {
        return Err(DomainError::NotFound {
            entity: "doctor",
            id: target_doctor.to_string(),
        });
    }

    for _ in 0..MAX_TRANSITION_RETRIES {
        if check_conflict(conn, &target_doctor, new_date, new_time, Some(id))? {
            return Err(DomainError::SchedulingConflict {
                doctor_id: target_doctor,
                date: new_date,
                time: new_time,
            });
        }

        let result = update_slot(
            conn,
            id,
            &current.doctor_id,
            current.scheduled_date,
            current.scheduled_time,
            &target_doctor,
            new_date,
            new_time,
        );
        match result {
            Ok(1) => {
                let updated = get_appointment(conn, id)?.ok_or_else(|| DomainError::NotFound {
                    entity: "appointment",
                    id: id.to_string(),
                })?;
                info!(appointment_id = %id, doctor_id = %target_doctor,
                      date = %new_date, time = %new_time, "appointment rescheduled");
                notifier.publish(ChangeEvent {
                    appointment_id: updated.id,
                    hospital_id: updated.hospital_id,
                    changed_fields: vec!["doctor_id", "scheduled_date", "scheduled_time"],
                    new_values: serde_json::json!({
                        "doctor_id": updated.doctor_id,
                        "scheduled_date": updated.scheduled_date,
                        "scheduled_time": updated.scheduled_time,
                    }),
                });
                return Ok(updated);
            }
            // Another writer moved the slot under us; re-read and retry.
            Ok(_) => {
                current = get_appointment(conn, id)?.ok_or_else(|| DomainError::NotFound {
                    entity: "appointment",
                    id: id.to_string(),
                })?;
            }
            Err(e) if e.is_unique_violation() => {
                return Err(DomainError::SchedulingConflict {
                    doctor_id: target_doctor,
                    date: new_date,
                    time: new_time,
                });
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(DomainError::ConcurrentUpdateConflict {
        dimension: "slot",
        appointment_id: *id,
        attempts: MAX_TRANSITION_RETRIES,
    })
}

/// Soft-delete: the row stays for downstream workflow references, the slot is
/// freed for rebooking.
pub fn cancel_appointment(
    conn: &Connection,
    notifier: &dyn ChangeNotifier,
    id: &Uuid,
) -> Result<(), DomainError> {
    let appointment = get_appointment(conn, id)?.ok_or_else(|| DomainError::NotFound {
        entity: "appointment",
        id: id.to_string(),
    })?;

    match soft_delete_appointment(conn, id) {
        Ok(()) => {}
        Err(DatabaseError::NotFound { .. }) => {
            return Err(DomainError::NotFound {
                entity: "appointment",
                id: id.to_string(),
            });
        }
        Err(e) => return Err(e.into()),
    }

    info!(appointment_id = %id, "appointment cancelled");
    notifier.publish(ChangeEvent {
        appointment_id: *id,
        hospital_id: appointment.hospital_id,
        changed_fields: vec!["deleted"],
        new_values: serde_json::json!({ "deleted": true }),
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::{insert_doctor, insert_procedure};
    use crate::db::sqlite::{open_database, open_memory_database};
    use crate::models::enums::ProcedureCategory;
    use crate::models::{Doctor, Procedure};
    use crate::notifier::NullNotifier;

    fn test_db() -> Connection {
        open_memory_database().unwrap()
    }

    fn seed_doctor(conn: &Connection, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        insert_doctor(
            conn,
            &Doctor {
                id,
                full_name: name.into(),
                specialty: "general surgery".into(),
                license_number: format!("CRM-{id}"),
                phone: None,
                email: None,
            },
        )
        .unwrap();
        id
    }

    fn seed_procedure(conn: &Connection) -> Uuid {
        let id = Uuid::new_v4();
        insert_procedure(
            conn,
            &Procedure {
                id,
                name: format!("Appendectomy {id}"),
                category: ProcedureCategory::Surgical,
                estimated_duration_minutes: 60,
                description: None,
            },
        )
        .unwrap();
        id
    }

    fn request(doctor_id: Uuid, procedure_id: Uuid, patient: &str) -> BookingRequest {
        BookingRequest {
            hospital_id: Uuid::new_v4(),
            patient_name: patient.into(),
            patient_birth_date: NaiveDate::from_ymd_opt(1958, 11, 3),
            patient_phone: None,
            scheduled_date: NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(),
            scheduled_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            doctor_id,
            procedure_id,
        }
    }

    #[test]
    fn same_slot_same_doctor_conflicts_other_doctor_does_not() {
        let conn = test_db();
        let d1 = seed_doctor(&conn, "Dr. Um");
        let d2 = seed_doctor(&conn, "Dr. Dois");
        let proc_id = seed_procedure(&conn);

        book_appointment(&conn, &NullNotifier, request(d1, proc_id, "Paciente A")).unwrap();

        let err = book_appointment(&conn, &NullNotifier, request(d1, proc_id, "Paciente B"))
            .unwrap_err();
        assert!(matches!(err, DomainError::SchedulingConflict { doctor_id, .. } if doctor_id == d1));

        // Same date and time, different doctor: fine.
        book_appointment(&conn, &NullNotifier, request(d2, proc_id, "Paciente C")).unwrap();
    }

    #[test]
    fn unknown_doctor_is_not_found_not_conflict() {
        let conn = test_db();
        let proc_id = seed_procedure(&conn);
        let err = book_appointment(
            &conn,
            &NullNotifier,
            request(Uuid::new_v4(), proc_id, "Paciente A"),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { entity: "doctor", .. }));
    }

    #[test]
    fn unknown_procedure_is_not_found() {
        let conn = test_db();
        let d1 = seed_doctor(&conn, "Dr. Um");
        let err = book_appointment(
            &conn,
            &NullNotifier,
            request(d1, Uuid::new_v4(), "Paciente A"),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { entity: "procedure", .. }));
    }

    #[test]
    fn reschedule_to_own_slot_never_conflicts() {
        let conn = test_db();
        let d1 = seed_doctor(&conn, "Dr. Um");
        let proc_id = seed_procedure(&conn);
        let appt = book_appointment(&conn, &NullNotifier, request(d1, proc_id, "Paciente A"))
            .unwrap();

        let moved = reschedule_appointment(
            &conn,
            &NullNotifier,
            &appt.id,
            None,
            appt.scheduled_date,
            appt.scheduled_time,
        )
        .unwrap();
        assert_eq!(moved.scheduled_time, appt.scheduled_time);
    }

    #[test]
    fn reschedule_into_taken_slot_conflicts() {
        let conn = test_db();
        let d1 = seed_doctor(&conn, "Dr. Um");
        let proc_id = seed_procedure(&conn);
        book_appointment(&conn, &NullNotifier, request(d1, proc_id, "Paciente A")).unwrap();

        let mut later = request(d1, proc_id, "Paciente B");
        later.scheduled_time = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let second = book_appointment(&conn, &NullNotifier, later).unwrap();

        let err = reschedule_appointment(
            &conn,
            &NullNotifier,
            &second.id,
            None,
            NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(),
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::SchedulingConflict { .. }));
    }

    #[test]
    fn cancelled_appointment_frees_the_slot() {
        let conn = test_db();
        let d1 = seed_doctor(&conn, "Dr. Um");
        let proc_id = seed_procedure(&conn);
        let appt = book_appointment(&conn, &NullNotifier, request(d1, proc_id, "Paciente A"))
            .unwrap();

        cancel_appointment(&conn, &NullNotifier, &appt.id).unwrap();
        book_appointment(&conn, &NullNotifier, request(d1, proc_id, "Paciente B")).unwrap();
    }

    #[test]
    fn concurrent_creates_for_one_slot_admit_exactly_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("surgenda.db");

        let setup = open_database(&path).unwrap();
        let d1 = seed_doctor(&setup, "Dr. Um");
        let proc_id = seed_procedure(&setup);
        drop(setup);

        let writers = 8;
        let mut handles = Vec::new();
        for i in 0..writers {
            let path = path.clone();
            handles.push(std::thread::spawn(move || {
                let conn = open_database(&path).unwrap();
                book_appointment(
                    &conn,
                    &NullNotifier,
                    request(d1, proc_id, &format!("Paciente {i}")),
                )
            }));
        }

        let mut successes = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.join().unwrap() {
                Ok(_) => successes += 1,
                Err(DomainError::SchedulingConflict { .. }) => conflicts += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(conflicts, writers - 1);
    }
}
