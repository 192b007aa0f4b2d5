//! SQLite encoding for model enums and timestamps.
//!
//! This is the only place stored values are turned back into typed values, so
//! an unknown status, type or priority in the database is rejected here rather
//! than at each call site.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef};

use crate::models::{ItemStatus, ItemType, LinkType, Priority};

impl ToSql for ItemType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ItemType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for ItemStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ItemStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for Priority {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.number() as i64))
    }
}

impl FromSql for Priority {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Priority::from_number(value.as_i64()?).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for LinkType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for LinkType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// Timestamps are stored as RFC 3339 UTC with microseconds, so text order is
/// chronological order.
pub fn encode_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Decode a stored timestamp. `col` is the column index, used in the error.
pub fn decode_time(s: &str, col: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(col, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_enum_roundtrip_through_sqlite() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (ty TEXT, st TEXT, pr INTEGER, lt TEXT)")
            .unwrap();
        conn.execute(
            "INSERT INTO t VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                ItemType::Research,
                ItemStatus::InProgress,
                Priority::Hi,
                LinkType::InspiredBy
            ],
        )
        .unwrap();

        let (ty, st, pr, lt): (ItemType, ItemStatus, Priority, LinkType) = conn
            .query_row("SELECT ty, st, pr, lt FROM t", [], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })
            .unwrap();
        assert_eq!(ty, ItemType::Research);
        assert_eq!(st, ItemStatus::InProgress);
        assert_eq!(pr, Priority::Hi);
        assert_eq!(lt, LinkType::InspiredBy);

        let raw: i64 = conn.query_row("SELECT pr FROM t", [], |r| r.get(0)).unwrap();
        assert_eq!(raw, 3);
    }

    #[test]
    fn test_invalid_stored_value_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        let result: rusqlite::Result<ItemStatus> =
            conn.query_row("SELECT 'blocked'", [], |row| row.get(0));
        assert!(result.is_err());

        let result: rusqlite::Result<Priority> = conn.query_row("SELECT 7", [], |row| row.get(0));
        assert!(result.is_err());
    }

    #[test]
    fn test_time_roundtrip() {
        let now = crate::models::now();
        let encoded = encode_time(&now);
        assert!(encoded.ends_with('Z'));
        assert_eq!(decode_time(&encoded, 0).unwrap(), now);
        assert!(decode_time("yesterday", 0).is_err());
    }
}
