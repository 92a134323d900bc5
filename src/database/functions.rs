use rusqlite::functions::FunctionFlags;
use rusqlite::types::{Value, ValueRef};
use rusqlite::Connection;

/// Registers `mv_number(x)`: the value as REAL, or NULL when it is not numeric.
///
/// Stored metadata is text, so numeric comparisons go through this instead
/// of `CAST`, which would turn `'abc'` into `0` and let it match.
pub fn register(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "mv_number",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let number = match ctx.get_raw(0) {
                ValueRef::Integer(i) => Some(i as f64),
                ValueRef::Real(f) => Some(f),
                ValueRef::Text(bytes) => std::str::from_utf8(bytes)
                    .ok()
                    .and_then(|s| s.trim().parse::<f64>().ok())
                    .filter(|f| f.is_finite()),
                ValueRef::Null | ValueRef::Blob(_) => None,
            };
            Ok(number.map(Value::Real).unwrap_or(Value::Null))
        },
    )
}
