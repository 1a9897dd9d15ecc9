// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::sync::Arc;

use protosim_types::scope::VarScope;
use protosim_types::value::Value;

/// Failure of an expression evaluation.
///
/// A single error kind, distinct from the interpreter's control-flow
/// signals: conditionals, guards, counters and eval nodes all surface
/// evaluation problems as this type.
#[derive(Debug, thiserror::Error)]
#[error("failed to evaluate '{expression}': {reason}")]
pub struct EvalError {
    pub expression: String,
    pub reason: String,
}

impl EvalError {
    pub fn new(expression: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            reason: reason.into(),
        }
    }
}

/// Contract to the scripting engine of the surrounding system.
///
/// The interpreter evaluates lazily, at execution time, against the
/// execution's scope. Both an async path (expressions may reach into actor
/// state) and a sync path (assembly-time constant folding) are required.
#[async_trait::async_trait]
pub trait Evaluator: Send + Sync + 'static {
    async fn evaluate(&self, expression: &str, scope: &Arc<VarScope>) -> Result<Value, EvalError>;

    fn evaluate_sync(&self, expression: &str, scope: &Arc<VarScope>) -> Result<Value, EvalError>;
}

/// Minimal evaluator understanding literals (`true`, `false`, `null`,
/// integers, floats, single-quoted strings) and bare variable names looked
/// up in the scope chain. The real scripting language plugs in from the
/// outside; this one keeps the runtime usable standalone and in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScopeEvaluator;

impl ScopeEvaluator {
    fn eval(&self, expression: &str, scope: &Arc<VarScope>) -> Result<Value, EvalError> {
        let text = expression.trim();
        match text {
            "" => return Err(EvalError::new(expression, "empty expression")),
            "null" => return Ok(Value::Null),
            "true" => return Ok(Value::Bool(true)),
            "false" => return Ok(Value::Bool(false)),
            _ => {}
        }
        if let Some(quoted) = text
            .strip_prefix('\'')
            .and_then(|rest| rest.strip_suffix('\''))
        {
            return Ok(Value::from(quoted));
        }
        if let Ok(int) = text.parse::<i64>() {
            return Ok(Value::Int(int));
        }
        if let Ok(float) = text.parse::<f64>() {
            return Ok(Value::Float(float));
        }
        scope
            .get(text)
            .ok_or_else(|| EvalError::new(expression, format!("unbound variable '{text}'")))
    }
}

#[async_trait::async_trait]
impl Evaluator for ScopeEvaluator {
    async fn evaluate(&self, expression: &str, scope: &Arc<VarScope>) -> Result<Value, EvalError> {
        self.eval(expression, scope)
    }

    fn evaluate_sync(&self, expression: &str, scope: &Arc<VarScope>) -> Result<Value, EvalError> {
        self.eval(expression, scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals() {
        let scope = VarScope::new_root();
        let eval = ScopeEvaluator;
        assert_eq!(eval.evaluate_sync("true", &scope).unwrap(), Value::Bool(true));
        assert_eq!(eval.evaluate_sync("42", &scope).unwrap(), Value::Int(42));
        assert_eq!(
            eval.evaluate_sync("0.25", &scope).unwrap(),
            Value::Float(0.25)
        );
        assert_eq!(
            eval.evaluate_sync("'jabber'", &scope).unwrap(),
            Value::from("jabber")
        );
        assert_eq!(eval.evaluate_sync("null", &scope).unwrap(), Value::Null);
    }

    #[test]
    fn variables_resolve_through_the_chain() {
        let root = VarScope::new_root();
        root.set("threshold", 10i64);
        let scope = VarScope::derive(&root);

        let eval = ScopeEvaluator;
        assert_eq!(
            eval.evaluate_sync("threshold", &scope).unwrap(),
            Value::Int(10)
        );
    }

    #[test]
    fn unbound_variable_is_an_eval_error() {
        let scope = VarScope::new_root();
        let err = ScopeEvaluator.evaluate_sync("missing", &scope).unwrap_err();
        assert!(err.to_string().contains("unbound variable"));
    }
}
