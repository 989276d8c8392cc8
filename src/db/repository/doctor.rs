use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::Doctor;

pub fn insert_doctor(conn: &Connection, doctor: &Doctor) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO doctors (id, full_name, specialty, license_number, phone, email)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            doctor.id.to_string(),
            doctor.full_name,
            doctor.specialty,
            doctor.license_number,
            doctor.phone,
            doctor.email,
        ],
    )
    .map_err(|e| {
        let wrapped = DatabaseError::from(e);
        if wrapped.is_unique_violation() {
            DatabaseError::ConstraintViolation(format!(
                "license number {} is already registered",
                doctor.license_number
            ))
        } else {
            wrapped
        }
    })?;
    Ok(())
}

pub fn get_doctor(conn: &Connection, id: &Uuid) -> Result<Option<Doctor>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, full_name, specialty, license_number, phone, email
         FROM doctors WHERE id = ?1",
    )?;

    let result = stmt.query_row(params![id.to_string()], doctor_from_row);
    match result {
        Ok(doctor) => Ok(Some(doctor)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_doctors(conn: &Connection) -> Result<Vec<Doctor>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, full_name, specialty, license_number, phone, email
         FROM doctors ORDER BY full_name",
    )?;

    let rows = stmt.query_map([], doctor_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

pub fn update_doctor(conn: &Connection, doctor: &Doctor) -> Result<(), DatabaseError> {
    let affected = conn.execute(
        "UPDATE doctors SET full_name = ?2, specialty = ?3, license_number = ?4,
         phone = ?5, email = ?6 WHERE id = ?1",
        params![
            doctor.id.to_string(),
            doctor.full_name,
            doctor.specialty,
            doctor.license_number,
            doctor.phone,
            doctor.email,
        ],
    )?;
    if affected == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "doctor".into(),
            id: doctor.id.to_string(),
        });
    }
    Ok(())
}

/// Fails with ConstraintViolation while any appointment still references the
/// doctor (FK restrict).
pub fn delete_doctor(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let result = conn.execute("DELETE FROM doctors WHERE id = ?1", params![id.to_string()]);
    match result {
        Ok(0) => Err(DatabaseError::NotFound {
            entity_type: "doctor".into(),
            id: id.to_string(),
        }),
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(DatabaseError::ConstraintViolation(format!(
                "doctor {id} is referenced by existing appointments"
            )))
        }
        Err(e) => Err(e.into()),
    }
}

fn doctor_from_row(row: &rusqlite::Row<'_>) -> Result<Doctor, rusqlite::Error> {
    Ok(Doctor {
        id: Uuid::parse_str(&row.get::<_, String>(0)?).unwrap_or_default(),
        full_name: row.get(1)?,
        specialty: row.get(2)?,
        license_number: row.get(3)?,
        phone: row.get(4)?,
        email: row.get(5)?,
    })
}
