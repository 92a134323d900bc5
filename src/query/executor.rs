use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};

use super::{CompiledQuery, FieldRef, FileColumn, Literal, Operator, Predicate};
use crate::database::models::{FileRecord, FILE_COLUMNS};
use crate::error::Result;

/// SQL expressions a predicate can compare against.
struct Operand {
    text: String,
    numeric: String,
    /// `=`/`!=` with a number compares numerically instead of by text.
    numeric_equality: bool,
}

impl Operand {
    fn file(column: FileColumn) -> Self {
        match column {
            FileColumn::Path => Self::textual("f.path"),
            FileColumn::Type => Self::textual("f.file_type"),
            FileColumn::Size => Self {
                text: "CAST(f.size AS TEXT)".to_string(),
                numeric: "f.size".to_string(),
                numeric_equality: true,
            },
        }
    }

    fn textual(column: &str) -> Self {
        Self {
            text: column.to_string(),
            numeric: format!("mv_number({})", column),
            numeric_equality: false,
        }
    }
}

fn comparison(operand: &Operand, op: Operator, literal: &Literal, params: &mut Vec<Value>) -> String {
    match (op, literal) {
        (Operator::Like | Operator::Contains, _) => {
            params.push(Value::Text(literal.canonical()));
            format!("instr(lower({}), lower(?)) > 0", operand.text)
        }
        (Operator::Eq | Operator::Ne, Literal::Number(n)) if operand.numeric_equality => {
            params.push(Value::Real(*n));
            format!("{} {} ?", operand.numeric, op.symbol())
        }
        (Operator::Eq | Operator::Ne, _) => {
            params.push(Value::Text(literal.canonical()));
            format!("{} {} ?", operand.text, op.symbol())
        }
        // Ordering with a number: stored text that is not numeric yields NULL and drops out.
        (_, Literal::Number(n)) => {
            params.push(Value::Real(*n));
            format!("{} {} ?", operand.numeric, op.symbol())
        }
        (_, _) => {
            params.push(Value::Text(literal.canonical()));
            format!("{} {} ?", operand.text, op.symbol())
        }
    }
}

fn predicate_sql(predicate: &Predicate, params: &mut Vec<Value>) -> String {
    match &predicate.field {
        FieldRef::File(column) => comparison(&Operand::file(*column), predicate.op, &predicate.literal, params),
        FieldRef::Meta(field) => {
            params.push(Value::Text(field.category.clone()));
            params.push(Value::Text(field.key.clone()));
            let condition = comparison(&Operand::textual("m.value"), predicate.op, &predicate.literal, params);
            format!(
                "EXISTS (SELECT 1 FROM metadata_fields m
                         WHERE m.file_id = f.id AND m.category = ? AND m.field_key = ? AND {})",
                condition
            )
        }
    }
}

/// Conjunction of all predicates as a `WHERE` body plus its bound values.
pub fn build_where(predicates: &[Predicate]) -> (String, Vec<Value>) {
    let mut params = Vec::new();
    let conditions: Vec<String> = predicates
        .iter()
        .map(|p| predicate_sql(p, &mut params))
        .collect();
    (conditions.join(" AND "), params)
}

/// Matching files, most recently extracted first. No predicates, no rows.
pub fn execute(conn: &Connection, query: &CompiledQuery, limit: usize, offset: usize) -> Result<Vec<FileRecord>> {
    if query.predicates.is_empty() {
        return Ok(Vec::new());
    }

    let (where_sql, mut params) = build_where(&query.predicates);
    let sql = format!(
        "SELECT {} FROM files f WHERE {} ORDER BY f.last_updated DESC, f.id DESC LIMIT ? OFFSET ?",
        FILE_COLUMNS, where_sql
    );
    params.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
    params.push(Value::Integer(i64::try_from(offset).unwrap_or(i64::MAX)));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(params.iter()), FileRecord::from_row)?;
    let files = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(files)
}
