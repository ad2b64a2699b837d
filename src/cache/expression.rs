//! Expression evaluation for computing validators from request attributes.
//!
//! The conditional cache only needs one capability: turn an expression
//! string plus the request's [`Attributes`] into a JSON value. Any
//! `Fn(&str, &Attributes) -> Result<Value, ExpressionError>` closure will do;
//! with the `jq` feature enabled, [`JqEvaluator`] runs jq programs against
//! the attribute bag (`.post.updated_at`, `.post.id | tostring`, …).

use serde_json::Value;
use thiserror::Error;

use crate::context::Attributes;

#[derive(Debug, Error)]
pub enum ExpressionError {
    #[error("failed to compile expression `{expression}`: {reason}")]
    Compile { expression: String, reason: String },

    #[error("failed to evaluate expression `{expression}`")]
    Evaluation { expression: String },
}

/// Evaluates directive expressions.
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(&self, expression: &str, attributes: &Attributes)
    -> Result<Value, ExpressionError>;

    /// Checks that `expression` is well formed without running it.
    fn check(&self, _expression: &str) -> Result<(), ExpressionError> {
        Ok(())
    }
}

impl<F> ExpressionEvaluator for F
where
    F: Fn(&str, &Attributes) -> Result<Value, ExpressionError> + Send + Sync,
{
    fn evaluate(
        &self,
        expression: &str,
        attributes: &Attributes,
    ) -> Result<Value, ExpressionError> {
        self(expression, attributes)
    }
}

#[cfg(feature = "jq")]
pub use self::jq::JqEvaluator;

#[cfg(feature = "jq")]
mod jq {
    use std::fmt;

    use dashmap::DashMap;
    use jaq_core::{
        Ctx, Filter, Native, RcIter,
        load::{Arena, File, Loader},
    };
    use jaq_json::Val;
    use serde_json::Value;

    use super::{ExpressionError, ExpressionEvaluator};
    use crate::context::Attributes;

    /// Runs jq programs against the attribute bag.
    ///
    /// Each program is compiled once, on first use or by
    /// [`check`](ExpressionEvaluator::check), and reused afterwards.
    /// A program producing no output evaluates to `null`; one producing
    /// several outputs evaluates to an array of them.
    #[derive(Default)]
    pub struct JqEvaluator {
        compiled: DashMap<String, Filter<Native<Val>>>,
    }

    impl JqEvaluator {
        pub fn new() -> Self {
            Self::default()
        }

        /// Number of distinct programs compiled so far.
        pub fn compiled(&self) -> usize {
            self.compiled.len()
        }

        fn compile(expression: &str) -> Result<Filter<Native<Val>>, ExpressionError> {
            let program = File {
                code: expression,
                path: (),
            };
            let loader = Loader::new(jaq_std::defs().chain(jaq_json::defs()));
            let arena = Arena::default();
            let modules = loader
                .load(&arena, program)
                .map_err(|e| ExpressionError::Compile {
                    expression: expression.to_owned(),
                    reason: format!("{e:?}"),
                })?;
            jaq_core::Compiler::default()
                .with_funs(jaq_std::funs().chain(jaq_json::funs()))
                .compile(modules)
                .map_err(|e| ExpressionError::Compile {
                    expression: expression.to_owned(),
                    reason: format!("{e:?}"),
                })
        }
    }

    impl fmt::Debug for JqEvaluator {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("JqEvaluator")
                .field("compiled", &self.compiled.len())
                .finish()
        }
    }

    impl ExpressionEvaluator for JqEvaluator {
        fn evaluate(
            &self,
            expression: &str,
            attributes: &Attributes,
        ) -> Result<Value, ExpressionError> {
            let filter = match self.compiled.get(expression) {
                Some(filter) => filter,
                None => {
                    let filter = Self::compile(expression)?;
                    self.compiled
                        .entry(expression.to_owned())
                        .or_insert(filter)
                        .downgrade()
                }
            };
            let inputs = RcIter::new(core::iter::empty());
            let out = filter.run((Ctx::new([], &inputs), Val::from(attributes.to_value())));
            let results: Result<Vec<_>, _> = out.collect();
            let mut values: Vec<Value> = results
                .map_err(|_| ExpressionError::Evaluation {
                    expression: expression.to_owned(),
                })?
                .into_iter()
                .map(|v| v.into())
                .collect();
            Ok(match values.len() {
                0 => Value::Null,
                1 => values.pop().unwrap_or(Value::Null),
                _ => Value::Array(values),
            })
        }

        fn check(&self, expression: &str) -> Result<(), ExpressionError> {
            if !self.compiled.contains_key(expression) {
                let filter = Self::compile(expression)?;
                self.compiled.insert(expression.to_owned(), filter);
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lookup(expression: &str, attributes: &Attributes) -> Result<Value, ExpressionError> {
        attributes
            .get(expression)
            .cloned()
            .ok_or_else(|| ExpressionError::Evaluation {
                expression: expression.to_owned(),
            })
    }

    #[test]
    fn closures_are_evaluators() {
        let mut attributes = Attributes::new();
        attributes.insert("version", "v1");
        let evaluator: &dyn ExpressionEvaluator = &lookup;
        assert_eq!(evaluator.evaluate("version", &attributes).unwrap(), json!("v1"));
        assert!(evaluator.evaluate("missing", &attributes).is_err());
        assert!(evaluator.check("anything").is_ok());
    }

    #[cfg(feature = "jq")]
    mod jq {
        use super::*;

        fn attributes() -> Attributes {
            let mut attributes = Attributes::new();
            attributes.insert("id", "7");
            attributes.insert(
                "post",
                json!({ "revision": 3, "updated_at": "2024-03-01T12:00:00Z" }),
            );
            attributes
        }

        #[test]
        fn selects_nested_values() {
            let value = JqEvaluator::new()
                .evaluate(".post.updated_at", &attributes())
                .unwrap();
            assert_eq!(value, json!("2024-03-01T12:00:00Z"));
        }

        #[test]
        fn builds_strings() {
            let value = JqEvaluator::new()
                .evaluate(r#".id + ":" + (.post.revision | tostring)"#, &attributes())
                .unwrap();
            assert_eq!(value, json!("7:3"));
        }

        #[test]
        fn missing_paths_are_null() {
            let value = JqEvaluator::new().evaluate(".nope", &attributes()).unwrap();
            assert_eq!(value, Value::Null);
        }

        #[test]
        fn programs_compile_once() {
            let evaluator = JqEvaluator::new();
            evaluator.check(".id").unwrap();
            assert_eq!(evaluator.compiled(), 1);
            for _ in 0..3 {
                assert_eq!(evaluator.evaluate(".id", &attributes()).unwrap(), json!("7"));
            }
            evaluator.evaluate(".post", &attributes()).unwrap();
            assert_eq!(evaluator.compiled(), 2);
        }

        #[test]
        fn failed_compiles_are_not_cached() {
            let evaluator = JqEvaluator::new();
            assert!(evaluator.evaluate(".post | | .", &attributes()).is_err());
            assert_eq!(evaluator.compiled(), 0);
        }

        #[test]
        fn rejects_malformed_programs() {
            assert!(matches!(
                JqEvaluator::new().check(".post | | ."),
                Err(ExpressionError::Compile { .. })
            ));
        }
    }
}
