use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::ProcedureCategory;
use crate::models::Procedure;

pub fn insert_procedure(conn: &Connection, proc: &Procedure) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO procedures (id, name, category, estimated_duration_minutes, description)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            proc.id.to_string(),
            proc.name,
            proc.category.as_str(),
            proc.estimated_duration_minutes,
            proc.description,
        ],
    )
    .map_err(|e| {
        let wrapped = DatabaseError::from(e);
        if wrapped.is_unique_violation() {
            DatabaseError::ConstraintViolation(format!(
                "procedure name {:?} already exists",
                proc.name
            ))
        } else {
            wrapped
        }
    })?;
    Ok(())
}

pub fn get_procedure(conn: &Connection, id: &Uuid) -> Result<Option<Procedure>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, category, estimated_duration_minutes, description
         FROM procedures WHERE id = ?1",
    )?;

    let result = stmt.query_row(params![id.to_string()], procedure_row);
    match result {
        Ok(raw) => Ok(Some(procedure_from_raw(raw)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_procedures(conn: &Connection) -> Result<Vec<Procedure>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, category, estimated_duration_minutes, description
         FROM procedures ORDER BY name",
    )?;

    let rows = stmt.query_map([], procedure_row)?;
    let mut procedures = Vec::new();
    for row in rows {
        procedures.push(procedure_from_raw(row?)?);
    }
    Ok(procedures)
}

pub fn delete_procedure(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let result = conn.execute("DELETE FROM procedures WHERE id = ?1", params![id.to_string()]);
    match result {
        Ok(0) => Err(DatabaseError::NotFound {
            entity_type: "procedure".into(),
            id: id.to_string(),
        }),
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(DatabaseError::ConstraintViolation(format!(
                "procedure {id} is referenced by existing appointments"
            )))
        }
        Err(e) => Err(e.into()),
    }
}

// Two-stage mapping: raw strings out of the row, enum parsing afterwards so
// the query_map closure only deals in rusqlite errors.
struct ProcedureRow {
    id: String,
    name: String,
    category: String,
    estimated_duration_minutes: u32,
    description: Option<String>,
}

fn procedure_row(row: &rusqlite::Row<'_>) -> Result<ProcedureRow, rusqlite::Error> {
    Ok(ProcedureRow {
        id: row.get(0)?,
        name: row.get(1)?,
        category: row.get(2)?,
        estimated_duration_minutes: row.get(3)?,
        description: row.get(4)?,
    })
}

fn procedure_from_raw(raw: ProcedureRow) -> Result<Procedure, DatabaseError> {
    Ok(Procedure {
        id: Uuid::parse_str(&raw.id).unwrap_or_default(),
        name: raw.name,
        category: ProcedureCategory::from_str(&raw.category)?,
        estimated_duration_minutes: raw.estimated_duration_minutes,
        description: raw.description,
    })
}
