//! Named transform functions
//!
//! `TransformField` operations reference transforms by name so plans
//! stay serializable and replayable. The registry maps names to pure
//! functions; callers may register their own alongside the built-ins.

use once_cell::sync::Lazy;
use recon_core::{RecondbError, Result};
use serde_json::Value;
use std::collections::HashMap;

/// A pure value transform
pub type TransformFn = fn(&Value) -> Result<Value>;

/// Name → transform lookup table
#[derive(Default)]
pub struct TransformRegistry {
    transforms: HashMap<String, TransformFn>,
}

static BUILTINS: Lazy<TransformRegistry> = Lazy::new(|| {
    let mut registry = TransformRegistry::new();
    registry.register("lowercase", lowercase);
    registry.register("uppercase", uppercase);
    registry.register("trim", trim);
    registry.register("stringify", stringify);
    registry
});

impl TransformRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with the built-in transforms:
    /// `lowercase`, `uppercase`, `trim`, `stringify`
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for (name, transform) in &BUILTINS.transforms {
            registry.transforms.insert(name.clone(), *transform);
        }
        registry
    }

    /// Register (or replace) a transform under a name
    pub fn register(&mut self, name: impl Into<String>, transform: TransformFn) {
        self.transforms.insert(name.into(), transform);
    }

    /// Look up a transform by name
    pub fn get(&self, name: &str) -> Option<TransformFn> {
        self.transforms.get(name).copied()
    }

    /// Registered transform names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.transforms.keys().cloned().collect();
        names.sort();
        names
    }
}

fn expect_string(value: &Value) -> Result<&str> {
    value.as_str().ok_or_else(|| {
        RecondbError::validation(format!("expected a string value, got {}", value))
    })
}

fn lowercase(value: &Value) -> Result<Value> {
    Ok(Value::String(expect_string(value)?.to_lowercase()))
}

fn uppercase(value: &Value) -> Result<Value> {
    Ok(Value::String(expect_string(value)?.to_uppercase()))
}

fn trim(value: &Value) -> Result<Value> {
    Ok(Value::String(expect_string(value)?.trim().to_string()))
}

fn stringify(value: &Value) -> Result<Value> {
    Ok(match value {
        Value::String(s) => Value::String(s.clone()),
        other => Value::String(other.to_string()),
    })
}
