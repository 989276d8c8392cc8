use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::{AihStage, AnesthesiaEvaluation, BillingLiberation, Confirmation};
use crate::models::Appointment;

/// Shared SELECT head: the appointment row plus the two attachment-derived
/// counts, so readiness never needs a second read.
const APPOINTMENT_SELECT: &str = "SELECT a.id, a.hospital_id, a.patient_name, a.patient_birth_date, a.patient_phone,
        a.scheduled_date, a.scheduled_time, a.doctor_id, a.procedure_id,
        a.anesthesia_evaluation, a.anesthesia_note, a.aih_stage, a.aih_stage_entered_at,
        a.billing_liberation, a.billing_justification, a.confirmation, a.created_at, a.deleted,
        (SELECT COUNT(*) FROM attachments t
          WHERE t.appointment_id = a.id AND t.kind = 'exam') AS exam_count,
        (SELECT COUNT(*) FROM attachments t
          WHERE t.appointment_id = a.id AND t.kind = 'anesthesia_form') AS form_count
     FROM appointments a";

pub fn insert_appointment(conn: &Connection, appt: &Appointment) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO appointments (id, hospital_id, patient_name, patient_birth_date,
             patient_phone, scheduled_date, scheduled_time, doctor_id, procedure_id,
             anesthesia_evaluation, anesthesia_note, aih_stage, aih_stage_entered_at,
             billing_liberation, billing_justification, confirmation, created_at, deleted)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
        params![
            appt.id.to_string(),
            appt.hospital_id.to_string(),
            appt.patient_name,
            appt.patient_birth_date,
            appt.patient_phone,
            appt.scheduled_date,
            appt.scheduled_time,
            appt.doctor_id.to_string(),
            appt.procedure_id.to_string(),
            appt.anesthesia_evaluation.as_str(),
            appt.anesthesia_note,
            appt.aih_stage.as_str(),
            appt.aih_stage_entered_at,
            appt.billing_liberation.as_str(),
            appt.billing_justification,
            appt.confirmation.as_str(),
            appt.created_at,
            appt.deleted as i32,
        ],
    )?;
    Ok(())
}

/// Live (non-deleted) appointment by id.
pub fn get_appointment(conn: &Connection, id: &Uuid) -> Result<Option<Appointment>, DatabaseError> {
    let sql = format!("{APPOINTMENT_SELECT} WHERE a.id = ?1 AND a.deleted = 0");
    let mut stmt = conn.prepare(&sql)?;

    let result = stmt.query_row(params![id.to_string()], appointment_row);
    match result {
        Ok(raw) => Ok(Some(appointment_from_raw(raw)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// The conflict lookup behind the scheduling check: any live appointment
/// holding (doctor, date, time), other than `exclude` when rechecking an
/// in-place reschedule against itself.
pub fn find_conflicting(
    conn: &Connection,
    doctor_id: &Uuid,
    date: NaiveDate,
    time: NaiveTime,
    exclude: Option<&Uuid>,
) -> Result<Option<Appointment>, DatabaseError> {
    let sql = format!(
        "{APPOINTMENT_SELECT}
         WHERE a.doctor_id = ?1 AND a.scheduled_date = ?2 AND a.scheduled_time = ?3
           AND a.deleted = 0 AND (?4 IS NULL OR a.id <> ?4)
         LIMIT 1"
    );
    let mut stmt = conn.prepare(&sql)?;

    let result = stmt.query_row(
        params![doctor_id.to_string(), date, time, exclude.map(|id| id.to_string())],
        appointment_row,
    );
    match result {
        Ok(raw) => Ok(Some(appointment_from_raw(raw)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_by_hospital(
    conn: &Connection,
    hospital_id: &Uuid,
) -> Result<Vec<Appointment>, DatabaseError> {
    let sql = format!(
        "{APPOINTMENT_SELECT}
         WHERE a.hospital_id = ?1 AND a.deleted = 0
         ORDER BY a.scheduled_date, a.scheduled_time"
    );
    let mut stmt = conn.prepare(&sql)?;

    let rows = stmt.query_map(params![hospital_id.to_string()], appointment_row)?;
    let mut appointments = Vec::new();
    for row in rows {
        appointments.push(appointment_from_raw(row?)?);
    }
    Ok(appointments)
}

pub fn soft_delete_appointment(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let affected = conn.execute(
        "UPDATE appointments SET deleted = 1 WHERE id = ?1 AND deleted = 0",
        params![id.to_string()],
    )?;
    if affected == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "appointment".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

// ─── Dimension-scoped conditional updates ────────────────────────────────────
//
// Each write names the expected current value of exactly the dimension it
// changes. A return of 0 means another staff member won the race on that
// dimension; the workflow engine re-reads and retries. Writes to other
// dimensions of the same row are untouched and never conflict here.

pub fn update_anesthesia_evaluation(
    conn: &Connection,
    id: &Uuid,
    expected: AnesthesiaEvaluation,
    new: AnesthesiaEvaluation,
    note: Option<&str>,
) -> Result<usize, DatabaseError> {
    let affected = conn.execute(
        "UPDATE appointments SET anesthesia_evaluation = ?3, anesthesia_note = ?4
         WHERE id = ?1 AND anesthesia_evaluation = ?2 AND deleted = 0",
        params![id.to_string(), expected.as_str(), new.as_str(), note],
    )?;
    Ok(affected)
}

pub fn update_aih_stage(
    conn: &Connection,
    id: &Uuid,
    expected: AihStage,
    new: AihStage,
    entered_at: NaiveDateTime,
) -> Result<usize, DatabaseError> {
    let affected = conn.execute(
        "UPDATE appointments SET aih_stage = ?3, aih_stage_entered_at = ?4
         WHERE id = ?1 AND aih_stage = ?2 AND deleted = 0",
        params![id.to_string(), expected.as_str(), new.as_str(), entered_at],
    )?;
    Ok(affected)
}

pub fn update_billing_liberation(
    conn: &Connection,
    id: &Uuid,
    expected: BillingLiberation,
    new: BillingLiberation,
    justification: Option<&str>,
) -> Result<usize, DatabaseError> {
    let affected = conn.execute(
        "UPDATE appointments SET billing_liberation = ?3, billing_justification = ?4
         WHERE id = ?1 AND billing_liberation = ?2 AND deleted = 0",
        params![id.to_string(), expected.as_str(), new.as_str(), justification],
    )?;
    Ok(affected)
}

pub fn update_confirmation(
    conn: &Connection,
    id: &Uuid,
    expected: Confirmation,
    new: Confirmation,
) -> Result<usize, DatabaseError> {
    let affected = conn.execute(
        "UPDATE appointments SET confirmation = ?3
         WHERE id = ?1 AND confirmation = ?2 AND deleted = 0",
        params![id.to_string(), expected.as_str(), new.as_str()],
    )?;
    Ok(affected)
}

/// Conditional slot move for reschedules. The WHERE clause names the expected
/// current slot; the unique slot index still backstops the new one.
#[allow(clippy::too_many_arguments)]
pub fn update_slot(
    conn: &Connection,
    id: &Uuid,
    expected_doctor: &Uuid,
    expected_date: NaiveDate,
    expected_time: NaiveTime,
    new_doctor: &Uuid,
    new_date: NaiveDate,
    new_time: NaiveTime,
) -> Result<usize, DatabaseError> {
    let affected = conn.execute(
        "UPDATE appointments SET doctor_id = ?5, scheduled_date = ?6, scheduled_time = ?7
         WHERE id = ?1 AND doctor_id = ?2 AND scheduled_date = ?3 AND scheduled_time = ?4
           AND deleted = 0",
        params![
            id.to_string(),
            expected_doctor.to_string(),
            expected_date,
            expected_time,
            new_doctor.to_string(),
            new_date,
            new_time,
        ],
    )?;
    Ok(affected)
}

// ─── Row mapping ─────────────────────────────────────────────────────────────
//
// Two stages: raw strings out of the row inside the rusqlite closure, enum
// parsing afterwards where DatabaseError is available.

struct AppointmentRow {
    id: String,
    hospital_id: String,
    patient_name: String,
    patient_birth_date: Option<NaiveDate>,
    patient_phone: Option<String>,
    scheduled_date: NaiveDate,
    scheduled_time: NaiveTime,
    doctor_id: String,
    procedure_id: String,
    anesthesia_evaluation: String,
    anesthesia_note: Option<String>,
    aih_stage: String,
    aih_stage_entered_at: NaiveDateTime,
    billing_liberation: String,
    billing_justification: Option<String>,
    confirmation: String,
    created_at: NaiveDateTime,
    deleted: bool,
    exam_count: i64,
    form_count: i64,
}

fn appointment_row(row: &rusqlite::Row<'_>) -> Result<AppointmentRow, rusqlite::Error> {
    Ok(AppointmentRow {
        id: row.get(0)?,
        hospital_id: row.get(1)?,
        patient_name: row.get(2)?,
        patient_birth_date: row.get(3)?,
        patient_phone: row.get(4)?,
        scheduled_date: row.get(5)?,
        scheduled_time: row.get(6)?,
        doctor_id: row.get(7)?,
        procedure_id: row.get(8)?,
        anesthesia_evaluation: row.get(9)?,
        anesthesia_note: row.get(10)?,
        aih_stage: row.get(11)?,
        aih_stage_entered_at: row.get(12)?,
        billing_liberation: row.get(13)?,
        billing_justification: row.get(14)?,
        confirmation: row.get(15)?,
        created_at: row.get(16)?,
        deleted: row.get::<_, i64>(17)? != 0,
        exam_count: row.get(18)?,
        form_count: row.get(19)?,
    })
}

fn appointment_from_raw(raw: AppointmentRow) -> Result<Appointment, DatabaseError> {
    Ok(Appointment {
        id: Uuid::parse_str(&raw.id).unwrap_or_default(),
        hospital_id: Uuid::parse_str(&raw.hospital_id).unwrap_or_default(),
        patient_name: raw.patient_name,
        patient_birth_date: raw.patient_birth_date,
        patient_phone: raw.patient_phone,
        scheduled_date: raw.scheduled_date,
        scheduled_time: raw.scheduled_time,
        doctor_id: Uuid::parse_str(&raw.doctor_id).unwrap_or_default(),
        procedure_id: Uuid::parse_str(&raw.procedure_id).unwrap_or_default(),
        anesthesia_evaluation: AnesthesiaEvaluation::from_str(&raw.anesthesia_evaluation)?,
        anesthesia_note: raw.anesthesia_note,
        aih_stage: AihStage::from_str(&raw.aih_stage)?,
        aih_stage_entered_at: raw.aih_stage_entered_at,
        billing_liberation: BillingLiberation::from_str(&raw.billing_liberation)?,
        billing_justification: raw.billing_justification,
        confirmation: Confirmation::from_str(&raw.confirmation)?,
        exam_attachment_count: raw.exam_count.max(0) as u32,
        has_anesthesia_form: raw.form_count > 0,
        created_at: raw.created_at,
        deleted: raw.deleted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::{insert_doctor, insert_procedure};
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::ProcedureCategory;
    use crate::models::{Doctor, Procedure};

    fn test_db() -> Connection {
        open_memory_database().unwrap()
    }

    fn seed_doctor(conn: &Connection) -> Uuid {
        let id = Uuid::new_v4();
        insert_doctor(
            conn,
            &Doctor {
                id,
                full_name: "Dra. Ana Lima".into(),
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
                name: format!("Cholecystectomy {id}"),
                category: ProcedureCategory::Surgical,
                estimated_duration_minutes: 90,
                description: None,
            },
        )
        .unwrap();
        id
    }

    fn make_appointment(conn: &Connection, patient: &str, hour: u32) -> Appointment {
        let now = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap().and_hms_opt(9, 0, 0).unwrap();
        let appt = Appointment {
            id: Uuid::new_v4(),
            hospital_id: Uuid::new_v4(),
            patient_name: patient.into(),
            patient_birth_date: NaiveDate::from_ymd_opt(1970, 6, 15),
            patient_phone: None,
            scheduled_date: NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(),
            scheduled_time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            doctor_id: seed_doctor(conn),
            procedure_id: seed_procedure(conn),
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
        insert_appointment(conn, &appt).unwrap();
        appt
    }

    #[test]
    fn insert_and_retrieve_round_trip() {
        let conn = test_db();
        let appt = make_appointment(&conn, "Carlos Mota", 8);
        let loaded = get_appointment(&conn, &appt.id).unwrap().unwrap();
        assert_eq!(loaded.patient_name, "Carlos Mota");
        assert_eq!(loaded.scheduled_time, appt.scheduled_time);
        assert_eq!(loaded.anesthesia_evaluation, AnesthesiaEvaluation::Unset);
        assert_eq!(loaded.aih_stage, AihStage::PendingBilling);
        assert_eq!(loaded.exam_attachment_count, 0);
        assert!(!loaded.has_anesthesia_form);
    }

    #[test]
    fn soft_deleted_rows_are_invisible() {
        let conn = test_db();
        let appt = make_appointment(&conn, "Carlos Mota", 8);
        soft_delete_appointment(&conn, &appt.id).unwrap();
        assert!(get_appointment(&conn, &appt.id).unwrap().is_none());
        // Second delete is NotFound, not a silent no-op.
        assert!(matches!(
            soft_delete_appointment(&conn, &appt.id),
            Err(DatabaseError::NotFound { .. })
        ));
    }

    #[test]
    fn find_conflicting_respects_exclusion() {
        let conn = test_db();
        let appt = make_appointment(&conn, "Carlos Mota", 8);

        let hit = find_conflicting(
            &conn,
            &appt.doctor_id,
            appt.scheduled_date,
            appt.scheduled_time,
            None,
        )
        .unwrap();
        assert_eq!(hit.map(|a| a.id), Some(appt.id));

        // Excluding the appointment itself clears the conflict.
        let excluded = find_conflicting(
            &conn,
            &appt.doctor_id,
            appt.scheduled_date,
            appt.scheduled_time,
            Some(&appt.id),
        )
        .unwrap();
        assert!(excluded.is_none());
    }

    #[test]
    fn stale_expected_value_updates_nothing() {
        let conn = test_db();
        let appt = make_appointment(&conn, "Carlos Mota", 8);

        let affected = update_anesthesia_evaluation(
            &conn,
            &appt.id,
            AnesthesiaEvaluation::Approved, // actual value is Unset
            AnesthesiaEvaluation::Rejected,
            Some("stale"),
        )
        .unwrap();
        assert_eq!(affected, 0);

        let loaded = get_appointment(&conn, &appt.id).unwrap().unwrap();
        assert_eq!(loaded.anesthesia_evaluation, AnesthesiaEvaluation::Unset);
        assert_eq!(loaded.anesthesia_note, None);
    }

    #[test]
    fn dimension_updates_do_not_touch_other_dimensions() {
        let conn = test_db();
        let appt = make_appointment(&conn, "Carlos Mota", 8);

        let affected = update_confirmation(
            &conn,
            &appt.id,
            Confirmation::Awaiting,
            Confirmation::Confirmed,
        )
        .unwrap();
        assert_eq!(affected, 1);

        let loaded = get_appointment(&conn, &appt.id).unwrap().unwrap();
        assert_eq!(loaded.confirmation, Confirmation::Confirmed);
        assert_eq!(loaded.anesthesia_evaluation, AnesthesiaEvaluation::Unset);
        assert_eq!(loaded.billing_liberation, BillingLiberation::Unset);
        assert_eq!(loaded.aih_stage, AihStage::PendingBilling);
    }
}
