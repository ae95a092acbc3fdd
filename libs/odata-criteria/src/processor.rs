//! Dialect differences between database products.
//!
//! Only what the renderer cannot express in portable SQL lives here:
//! parameter markers, scalar functions and row limiting.

use std::fmt;
use std::sync::Arc;

use crate::error::{CriteriaError, CriteriaResult};

/// Scalar functions the criteria API can render.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SqlFunction {
    Lower,
    Upper,
    Concat,
    Length,
    Trim,
    /// `(value, start[, length])`, start is 1-based.
    Substring,
    /// `(search, value)`, returns the 1-based position or 0.
    Locate,
    Round,
    Floor,
    Ceiling,
}

impl SqlFunction {
    fn arity(self) -> (usize, usize) {
        match self {
            SqlFunction::Concat => (2, usize::MAX),
            SqlFunction::Substring => (2, 3),
            SqlFunction::Locate => (2, 2),
            _ => (1, 1),
        }
    }

    fn check_arity(self, args: &[String]) -> CriteriaResult<()> {
        let (min, max) = self.arity();
        if args.len() < min || args.len() > max {
            return Err(CriteriaError::argument(format!(
                "{self:?} does not accept {} argument(s)",
                args.len()
            )));
        }
        Ok(())
    }
}

/// Product specific SQL rendering.
pub trait DatabaseProcessor: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Marker of the 1-based bind position.
    fn parameter_marker(&self, position: usize) -> String {
        format!("?{position}")
    }

    /// Render a function call over already rendered arguments.
    fn function(&self, function: SqlFunction, args: &[String]) -> CriteriaResult<String> {
        function.check_arity(args)?;
        Ok(ansi_function(function, args))
    }

    /// Trailing row-limiting clause, including its leading space.
    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        let mut out = String::new();
        if let Some(offset) = offset {
            out.push_str(&format!(" OFFSET {offset} ROWS"));
        }
        if let Some(limit) = limit {
            out.push_str(&format!(" FETCH NEXT {limit} ROWS ONLY"));
        }
        out
    }
}

fn ansi_function(function: SqlFunction, args: &[String]) -> String {
    let name = match function {
        SqlFunction::Lower => "LOWER",
        SqlFunction::Upper => "UPPER",
        SqlFunction::Concat => "CONCAT",
        SqlFunction::Length => "LENGTH",
        SqlFunction::Trim => "TRIM",
        SqlFunction::Substring => "SUBSTRING",
        SqlFunction::Locate => "LOCATE",
        SqlFunction::Round => "ROUND",
        SqlFunction::Floor => "FLOOR",
        SqlFunction::Ceiling => "CEILING",
    };
    format!("{name}({})", args.join(", "))
}

fn limit_style(limit: Option<u64>, offset: Option<u64>, unbounded: Option<&str>) -> String {
    match (limit, offset) {
        (Some(l), Some(o)) => format!(" LIMIT {l} OFFSET {o}"),
        (Some(l), None) => format!(" LIMIT {l}"),
        (None, Some(o)) => match unbounded {
            Some(all) => format!(" LIMIT {all} OFFSET {o}"),
            None => format!(" OFFSET {o}"),
        },
        (None, None) => String::new(),
    }
}

/// ANSI SQL:2008 rendering; used for unknown products.
#[derive(Debug, Default)]
pub struct DefaultProcessor;

impl DatabaseProcessor for DefaultProcessor {
    fn name(&self) -> &'static str {
        "default"
    }
}

#[derive(Debug, Default)]
pub struct PostgresProcessor;

impl DatabaseProcessor for PostgresProcessor {
    fn name(&self) -> &'static str {
        "postgresql"
    }

    fn parameter_marker(&self, position: usize) -> String {
        format!("${position}")
    }

    fn function(&self, function: SqlFunction, args: &[String]) -> CriteriaResult<String> {
        function.check_arity(args)?;
        Ok(match function {
            SqlFunction::Locate => format!("STRPOS({}, {})", args[1], args[0]),
            SqlFunction::Substring => format!("SUBSTR({})", args.join(", ")),
            other => ansi_function(other, args),
        })
    }

    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        limit_style(limit, offset, None)
    }
}

#[derive(Debug, Default)]
pub struct SqliteProcessor;

impl DatabaseProcessor for SqliteProcessor {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn function(&self, function: SqlFunction, args: &[String]) -> CriteriaResult<String> {
        function.check_arity(args)?;
        Ok(match function {
            SqlFunction::Concat => format!("({})", args.join(" || ")),
            SqlFunction::Substring => format!("SUBSTR({})", args.join(", ")),
            SqlFunction::Locate => format!("INSTR({}, {})", args[1], args[0]),
            SqlFunction::Ceiling => format!("CEIL({})", args[0]),
            other => ansi_function(other, args),
        })
    }

    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        // SQLite rejects OFFSET without LIMIT
        limit_style(limit, offset, Some("-1"))
    }
}

/// HSQLDB and H2 share the `LIMIT`/`OFFSET` syntax.
#[derive(Debug, Default)]
pub struct HsqldbProcessor;

impl DatabaseProcessor for HsqldbProcessor {
    fn name(&self) -> &'static str {
        "hsqldb"
    }

    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        limit_style(limit, offset, None)
    }
}

/// Pick the processor for a database product name as reported by the
/// driver. Unknown products get [`DefaultProcessor`].
pub fn create_processor(product_name: &str) -> Arc<dyn DatabaseProcessor> {
    let processor: Arc<dyn DatabaseProcessor> = match product_name {
        "PostgreSQL" => Arc::new(PostgresProcessor),
        "HSQL Database Engine" | "H2" => Arc::new(HsqldbProcessor),
        "SQLite" => Arc::new(SqliteProcessor),
        _ => Arc::new(DefaultProcessor),
    };
    tracing::trace!(
        product = product_name,
        processor = processor.name(),
        "selected database processor"
    );
    processor
}
