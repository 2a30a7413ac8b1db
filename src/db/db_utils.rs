use chrono::{DateTime, NaiveDate};
use duckdb::types::{TimeUnit, Value};
use duckdb::Connection;

use crate::db::DbError;

/// Builds `?, ?, ?` for an `IN (...)` list of `count` bound parameters.
pub fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// Executes `sql` and renders every row as `(v1, v2, ...)`, concatenated in
/// result order.
pub fn render_rows(conn: &Connection, sql: &str) -> Result<String, DbError> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;

    let mut rendered = String::new();
    while let Some(row) = rows.next()? {
        let column_count = row.as_ref().column_count();
        let mut values = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            let value: Value = row.get(idx)?;
            values.push(value_to_string(&value));
        }
        rendered.push('(');
        rendered.push_str(&values.join(", "));
        rendered.push(')');
    }

    Ok(rendered)
}

pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::TinyInt(v) => v.to_string(),
        Value::SmallInt(v) => v.to_string(),
        Value::Int(v) => v.to_string(),
        Value::BigInt(v) => v.to_string(),
        Value::HugeInt(v) => v.to_string(),
        Value::UTinyInt(v) => v.to_string(),
        Value::USmallInt(v) => v.to_string(),
        Value::UInt(v) => v.to_string(),
        Value::UBigInt(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::Decimal(v) => v.to_string(),
        Value::Text(s) => format!("'{}'", s),
        Value::Enum(s) => format!("'{}'", s),
        Value::Timestamp(unit, raw) => {
            let micros = match unit {
                TimeUnit::Second => raw.saturating_mul(1_000_000),
                TimeUnit::Millisecond => raw.saturating_mul(1_000),
                TimeUnit::Microsecond => *raw,
                TimeUnit::Nanosecond => raw / 1_000,
            };
            DateTime::from_timestamp_micros(micros)
                .map(|ts| format!("'{}'", ts.naive_utc().format("%Y-%m-%d %H:%M:%S")))
                .unwrap_or_else(|| raw.to_string())
        }
        Value::Date32(days) => NaiveDate::from_ymd_opt(1970, 1, 1)
            .and_then(|epoch| epoch.checked_add_signed(chrono::Duration::days(i64::from(*days))))
            .map(|date| format!("'{}'", date))
            .unwrap_or_else(|| days.to_string()),
        other => format!("{:?}", other),
    }
}
