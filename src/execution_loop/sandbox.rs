//! Sandboxed execution of synthesized procedures
//!
//! A procedure is one read-only SQL `SELECT` over the table `df`. Before it
//! reaches the polars SQL engine the statement is parsed and checked against
//! allow-lists: one query statement, relations limited to `df` and its own
//! CTEs, one table per SELECT (no joins, comma lists or set operations),
//! functions limited to pure aggregate/scalar ones. Execution happens on
//! the blocking pool under a wall-clock timeout; a timed-out run is abandoned
//! and its output is never observed.

use crate::error::{AssistantError, Result};
use crate::prompts::TABLE_ALIAS;
use async_trait::async_trait;
use lazy_static::lazy_static;
use polars::prelude::*;
use polars::sql::SQLContext;
use sqlparser::ast::{
    visit_expressions, visit_relations, Expr, Query, SetExpr, Statement, TableFactor, Visit, Visitor,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::collections::HashSet;
use std::ops::ControlFlow;
use std::time::Duration;
use tracing::debug;

/// Runs untrusted procedures against a copy of an input table.
#[async_trait]
pub trait Sandbox: Send + Sync {
    async fn run(&self, code: &str, input: DataFrame, timeout: Duration) -> Result<DataFrame>;
}

lazy_static! {
    static ref ALLOWED_FUNCTIONS: HashSet<&'static str> = [
        // aggregates
        "count", "sum", "avg", "mean", "min", "max", "median", "stddev", "stddev_samp",
        "variance", "var_samp", "first", "last", "array_agg",
        // window
        "row_number", "rank", "dense_rank",
        // numeric
        "abs", "round", "ceil", "ceiling", "floor", "sqrt", "pow", "power", "ln", "log",
        "log10", "exp", "sign", "mod",
        // text
        "lower", "upper", "length", "char_length", "trim", "ltrim", "rtrim", "concat",
        "concat_ws", "substr", "substring", "replace", "left", "right", "starts_with",
        "ends_with", "regexp_like", "initcap", "reverse",
        // null handling and conditionals
        "coalesce", "nullif", "greatest", "least", "if", "ifnull",
        // temporal
        "date", "date_part", "date_trunc", "strftime", "year", "month", "day", "now",
    ]
    .into_iter()
    .collect();
}

/// Every query scope (outer query, CTEs, subqueries) must read one table.
/// Joins and set operations multiply rows, which a timeout cannot contain.
struct SingleTableScopes;

impl Visitor for SingleTableScopes {
    type Break = String;

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        match single_table_body(&query.body) {
            Ok(()) => ControlFlow::Continue(()),
            Err(reason) => ControlFlow::Break(reason),
        }
    }
}

fn single_table_body(body: &SetExpr) -> std::result::Result<(), String> {
    match body {
        SetExpr::Select(select) => {
            if select.from.len() > 1 {
                return Err("reading several tables in one FROM is not allowed".to_string());
            }
            for table in &select.from {
                if !table.joins.is_empty() || matches!(table.relation, TableFactor::NestedJoin { .. }) {
                    return Err("joins are not allowed".to_string());
                }
            }
            Ok(())
        }
        // nested queries are visited on their own
        SetExpr::Query(_) => Ok(()),
        SetExpr::SetOperation { op, .. } => Err(format!("{} is not allowed", op)),
        _ => Err("only SELECT bodies are allowed".to_string()),
    }
}

/// Reject anything but a single read-only query over `df` using allow-listed functions.
pub fn check_procedure(code: &str) -> Result<()> {
    let statements = Parser::parse_sql(&GenericDialect {}, code)
        .map_err(|e| AssistantError::Sandbox(format!("SQL parse error: {}", e)))?;

    if statements.len() != 1 {
        return Err(AssistantError::Sandbox(format!(
            "only a single SELECT statement is allowed, found {} statements",
            statements.len()
        )));
    }

    let statement = &statements[0];
    let Statement::Query(query) = statement else {
        return Err(AssistantError::Sandbox(
            "statement not allowed: only SELECT queries may run".to_string(),
        ));
    };

    if let ControlFlow::Break(reason) = statement.visit(&mut SingleTableScopes) {
        return Err(AssistantError::Sandbox(format!(
            "statement not allowed: {}; query {} on its own",
            reason, TABLE_ALIAS
        )));
    }

    let mut allowed_relations: HashSet<String> = HashSet::from([TABLE_ALIAS.to_string()]);
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            allowed_relations.insert(cte.alias.name.value.to_lowercase());
        }
    }

    let relation_check = visit_relations(statement, |relation| {
        let name = relation.to_string().to_lowercase();
        let bare = name.trim_matches('"').to_string();
        if allowed_relations.contains(&bare) {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(name)
        }
    });
    if let ControlFlow::Break(name) = relation_check {
        return Err(AssistantError::Sandbox(format!(
            "relation '{}' is not allowed; read from {}",
            name, TABLE_ALIAS
        )));
    }

    let function_check = visit_expressions(statement, |expr| {
        if let Expr::Function(function) = expr {
            let name = function.name.to_string().to_lowercase();
            if !ALLOWED_FUNCTIONS.contains(name.as_str()) {
                return ControlFlow::Break(name);
            }
        }
        ControlFlow::Continue(())
    });
    if let ControlFlow::Break(name) = function_check {
        return Err(AssistantError::Sandbox(format!("function '{}' is not allowed", name)));
    }

    Ok(())
}

/// Check and run `code` synchronously against `input`.
pub fn execute_procedure(code: &str, input: DataFrame) -> Result<DataFrame> {
    check_procedure(code)?;

    let mut ctx = SQLContext::new();
    ctx.register(TABLE_ALIAS, input.lazy());
    let output = ctx.execute(code)?.collect()?;
    Ok(output)
}

/// Sandbox backed by the polars SQL engine
#[derive(Debug, Clone, Default)]
pub struct PolarsSqlSandbox;

#[async_trait]
impl Sandbox for PolarsSqlSandbox {
    async fn run(&self, code: &str, input: DataFrame, timeout: Duration) -> Result<DataFrame> {
        let code = code.to_string();
        let handle = tokio::task::spawn_blocking(move || execute_procedure(&code, input));

        match tokio::time::timeout(timeout, handle).await {
            Err(_) => {
                debug!("Procedure exceeded {:?}; abandoning", timeout);
                Err(AssistantError::ExecutionTimeout(timeout))
            }
            Ok(Err(join_error)) => Err(AssistantError::Sandbox(format!(
                "procedure aborted: {}",
                join_error
            ))),
            Ok(Ok(result)) => result,
        }
    }
}
