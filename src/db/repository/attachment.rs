use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::AttachmentKind;
use crate::models::Attachment;

pub fn insert_attachment(conn: &Connection, att: &Attachment) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO attachments (id, appointment_id, kind, storage_ref, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            att.id.to_string(),
            att.appointment_id.to_string(),
            att.kind.as_str(),
            att.storage_ref,
            att.recorded_at,
        ],
    )?;
    Ok(())
}

pub fn get_attachment(conn: &Connection, id: &Uuid) -> Result<Option<Attachment>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, appointment_id, kind, storage_ref, recorded_at
         FROM attachments WHERE id = ?1",
    )?;

    let result = stmt.query_row(params![id.to_string()], attachment_row);
    match result {
        Ok(raw) => Ok(Some(attachment_from_raw(raw)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_attachments(
    conn: &Connection,
    appointment_id: &Uuid,
    kind: AttachmentKind,
) -> Result<Vec<Attachment>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, appointment_id, kind, storage_ref, recorded_at
         FROM attachments WHERE appointment_id = ?1 AND kind = ?2
         ORDER BY recorded_at",
    )?;

    let rows = stmt.query_map(params![appointment_id.to_string(), kind.as_str()], attachment_row)?;
    let mut attachments = Vec::new();
    for row in rows {
        attachments.push(attachment_from_raw(row?)?);
    }
    Ok(attachments)
}

pub fn delete_attachment(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let affected = conn.execute("DELETE FROM attachments WHERE id = ?1", params![id.to_string()])?;
    if affected == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "attachment".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Delete the single active anesthesia form, if any. Returns whether one existed.
pub fn delete_anesthesia_form(
    conn: &Connection,
    appointment_id: &Uuid,
) -> Result<bool, DatabaseError> {
    let affected = conn.execute(
        "DELETE FROM attachments WHERE appointment_id = ?1 AND kind = 'anesthesia_form'",
        params![appointment_id.to_string()],
    )?;
    Ok(affected > 0)
}

struct AttachmentRow {
    id: String,
    appointment_id: String,
    kind: String,
    storage_ref: String,
    recorded_at: NaiveDateTime,
}

fn attachment_row(row: &rusqlite::Row<'_>) -> Result<AttachmentRow, rusqlite::Error> {
    Ok(AttachmentRow {
        id: row.get(0)?,
        appointment_id: row.get(1)?,
        kind: row.get(2)?,
        storage_ref: row.get(3)?,
        recorded_at: row.get(4)?,
    })
}

fn attachment_from_raw(raw: AttachmentRow) -> Result<Attachment, DatabaseError> {
    Ok(Attachment {
        id: Uuid::parse_str(&raw.id).unwrap_or_default(),
        appointment_id: Uuid::parse_str(&raw.appointment_id).unwrap_or_default(),
        kind: AttachmentKind::from_str(&raw.kind)?,
        storage_ref: raw.storage_ref,
        recorded_at: raw.recorded_at,
    })
}
