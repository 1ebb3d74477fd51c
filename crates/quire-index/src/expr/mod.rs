//! Restricted expression language for index queries and sort keys.
//!
//! Expressions see two bindings, `obj` (the decoded object) and `objPath`,
//! and any top-level field of the object by name. They can read values,
//! do arithmetic, compare, combine with `&&`/`||`, and call a small set of
//! pure string and collection functions. Nothing else is reachable.
//!
//! ```
//! use quire_index::expr::{Expression, Scope};
//! use serde_json::json;
//!
//! let query = Expression::parse("obj.t == 1 && objPath.startsWith('/a')").unwrap();
//! let obj = json!({ "t": 1 });
//! assert!(query.matches(&Scope { obj: &obj, obj_path: "/a.json" }).unwrap());
//! ```

mod eval;
mod lexer;
mod parser;

use std::fmt;

use serde_json::Value;

pub use eval::{compare_values, truthy, EvalError, Scope};

use crate::error::{IndexError, IndexResult};

/// A parsed expression together with its source text.
#[derive(Clone, PartialEq)]
pub struct Expression {
    source: String,
    ast: parser::Expr,
}

impl Expression {
    pub fn parse(source: &str) -> IndexResult<Self> {
        let ast = lexer::tokenize(source)
            .and_then(parser::parse)
            .map_err(|reason| IndexError::Parse {
                expression: source.to_string(),
                reason,
            })?;
        Ok(Self {
            source: source.to_string(),
            ast,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn evaluate(&self, scope: &Scope<'_>) -> Result<Value, EvalError> {
        eval::evaluate(&self.ast, scope)
    }

    /// Evaluate and apply truthiness.
    pub fn matches(&self, scope: &Scope<'_>) -> Result<bool, EvalError> {
        self.evaluate(scope).map(|value| truthy(&value))
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Expression").field(&self.source).finish()
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
