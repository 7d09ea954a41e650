use sqlparser::ast::{
    self, AssignmentTarget, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor,
    TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use thiserror::Error;

use crate::limits::MAX_SQL_LEN;

/// Parsed command from SQL input.
///
/// Timestamps and rates stay as text; the engine owns their validation.
#[derive(Debug, PartialEq)]
pub enum Command {
    CreateFacility {
        name: String,
    },
    ListFacilities {
        name: Option<String>,
    },
    SetHourlyRate {
        name: String,
        rate: String,
    },
    DeleteFacility {
        name: String,
    },
    CreateBooking {
        facility: String,
        user: String,
        start: String,
        end: String,
    },
    ListBookings {
        facility: String,
    },
    UpdateBooking {
        facility: String,
        user: String,
        start: String,
        end: String,
    },
    DeleteBooking {
        facility: String,
        user: String,
        start: String,
    },
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    if sql.len() > MAX_SQL_LEN {
        return Err(SqlError::TooLong(sql.len()));
    }
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }
    if stmts.len() > 1 {
        return Err(SqlError::Unsupported("multiple statements".into()));
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(table, assignments, selection),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;

    match table.as_str() {
        "facilities" => {
            if values.is_empty() {
                return Err(SqlError::WrongArity("facilities", 1, 0));
            }
            Ok(Command::CreateFacility {
                name: parse_text(&values[0])?,
            })
        }
        "bookings" => {
            if values.len() < 4 {
                return Err(SqlError::WrongArity("bookings", 4, values.len()));
            }
            Ok(Command::CreateBooking {
                facility: parse_text(&values[0])?,
                user: parse_text(&values[1])?,
                start: parse_text(&values[2])?,
                end: parse_text(&values[3])?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let filters = Filters::collect(&delete.selection)?;

    match table.as_str() {
        "facilities" => Ok(Command::DeleteFacility {
            name: filters.require("name")?,
        }),
        "bookings" => Ok(Command::DeleteBooking {
            facility: filters.require("facility")?,
            user: filters.require("user")?,
            start: filters.require("start_time")?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let table = table_factor_name(&table.relation)?;
    let filters = Filters::collect(selection)?;

    let mut set: Vec<(String, &Expr)> = Vec::with_capacity(assignments.len());
    for a in assignments {
        let col = match &a.target {
            AssignmentTarget::ColumnName(name) => object_name_last(name),
            AssignmentTarget::Tuple(_) => None,
        }
        .ok_or_else(|| SqlError::Unsupported("tuple assignment".into()))?;
        set.push((col, &a.value));
    }
    let assigned = |col: &'static str| -> Result<String, SqlError> {
        set.iter()
            .find(|(c, _)| c == col)
            .ok_or(SqlError::MissingAssignment(col))
            .and_then(|(_, v)| parse_text(v))
    };
    let only = |allowed: &[&str]| -> Result<(), SqlError> {
        match set.iter().find(|(c, _)| !allowed.contains(&c.as_str())) {
            Some((c, _)) => Err(SqlError::Unsupported(format!("cannot set column {c}"))),
            None => Ok(()),
        }
    };

    match table.as_str() {
        "facilities" => {
            only(&["hourly_rate"])?;
            Ok(Command::SetHourlyRate {
                name: filters.require("name")?,
                rate: assigned("hourly_rate")?,
            })
        }
        "bookings" => {
            only(&["start_time", "end_time"])?;
            Ok(Command::UpdateBooking {
                facility: filters.require("facility")?,
                user: filters.require("user")?,
                start: assigned("start_time")?,
                end: assigned("end_time")?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;
    let filters = Filters::collect(&select.selection)?;

    match table.as_str() {
        "facilities" => Ok(Command::ListFacilities {
            name: filters.get("name")?,
        }),
        "bookings" => Ok(Command::ListBookings {
            facility: filters.require("facility")?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Table a SELECT reads from, without validating the rest of the statement.
/// Used to describe result columns before parameters are bound.
pub fn select_table(sql: &str) -> Option<String> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).ok()?;
    match stmts.first()? {
        Statement::Query(query) => match query.body.as_ref() {
            SetExpr::Select(s) => table_factor_name(&s.from.first()?.relation).ok(),
            _ => None,
        },
        _ => None,
    }
}

/// `col = value` pairs from a WHERE clause made only of equalities joined by AND.
struct Filters<'a>(Vec<(String, &'a Expr)>);

impl<'a> Filters<'a> {
    fn collect(selection: &'a Option<Expr>) -> Result<Self, SqlError> {
        let mut pairs = Vec::new();
        if let Some(expr) = selection {
            collect_eq_filters(expr, &mut pairs)?;
        }
        Ok(Self(pairs))
    }

    fn get(&self, col: &'static str) -> Result<Option<String>, SqlError> {
        match self.0.iter().find(|(c, _)| c == col) {
            Some((_, v)) => parse_text(v).map(Some),
            None => Ok(None),
        }
    }

    fn require(&self, col: &'static str) -> Result<String, SqlError> {
        self.get(col)?.ok_or(SqlError::MissingFilter(col))
    }
}

fn collect_eq_filters<'a>(expr: &'a Expr, out: &mut Vec<(String, &'a Expr)>) -> Result<(), SqlError> {
    match expr {
        Expr::Nested(inner) => collect_eq_filters(inner, out),
        Expr::BinaryOp { left, op, right } => match op {
            ast::BinaryOperator::And => {
                collect_eq_filters(left, out)?;
                collect_eq_filters(right, out)
            }
            ast::BinaryOperator::Eq => {
                let col = expr_column_name(left)
                    .ok_or_else(|| SqlError::Parse(format!("expected column, got {left}")))?;
                out.push((col, right.as_ref()));
                Ok(())
            }
            other => Err(SqlError::Unsupported(format!("operator {other} in WHERE"))),
        },
        other => Err(SqlError::Unsupported(format!("filter {other}"))),
    }
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.len() {
            0 => Err(SqlError::Parse("empty VALUES".into())),
            1 => Ok(values.rows[0].clone()),
            _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

/// Literal as text: strings verbatim, numbers in their source spelling.
fn parse_text(expr: &Expr) -> Result<String, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) | Value::Number(s, _) => Ok(s.clone()),
            Value::Null => Err(SqlError::Parse("NULL is not allowed here".into())),
            _ => Err(SqlError::Parse(format!("expected string or number, got {value}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(format!("-{}", parse_text(expr)?))
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr}")))
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SqlError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("empty query")]
    Empty,
    #[error("query too long: {0} bytes")]
    TooLong(usize),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("{0}: expected {1} values, got {2}")]
    WrongArity(&'static str, usize, usize),
    #[error("missing filter: {0}")]
    MissingFilter(&'static str),
    #[error("missing assignment: {0}")]
    MissingAssignment(&'static str),
}
