//! Script engine seam.
//!
//! The scheduler never interprets expressions itself. At spawn time it
//! resolves a language name to an [`EngineFactory`] and gives the new machine
//! a fresh [`ScriptEngine`] instance; evaluation failures travel back inside
//! job results, never as administrative errors.

pub mod calc;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::bindings::Bindings;

/// An engine's failure to evaluate an expression (malformed input, runtime
/// fault). Carried inside a `JobOutcome`, not raised to administrative
/// callers.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("evaluation error: {message}")]
pub struct EvalError {
    pub message: String,
}

impl EvalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// One machine's execution engine instance. Evaluates an expression against
/// the machine's bindings; may read and write bindings.
pub trait ScriptEngine: Send {
    fn evaluate(
        &mut self,
        expression: &str,
        bindings: &mut Bindings,
    ) -> std::result::Result<Value, EvalError>;
}

/// Produces engine instances for one language.
pub trait EngineFactory: Send + Sync {
    fn language(&self) -> &str;

    fn create_engine(&self) -> Box<dyn ScriptEngine>;
}

/// Registry of supported engines, keyed by language name.
/// Lookup is case-insensitive.
#[derive(Clone, Default)]
pub struct EngineRegistry {
    factories: HashMap<String, Arc<dyn EngineFactory>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in engine registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(calc::CalcEngineFactory));
        registry
    }

    pub fn register(&mut self, factory: Arc<dyn EngineFactory>) {
        self.factories
            .insert(factory.language().to_lowercase(), factory);
    }

    pub fn resolve(&self, language: &str) -> Option<Arc<dyn EngineFactory>> {
        self.factories.get(&language.to_lowercase()).cloned()
    }

    pub fn languages(&self) -> Vec<&str> {
        self.factories.values().map(|f| f.language()).collect()
    }
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("languages", &self.languages())
            .finish()
    }
}
