use std::rc::Rc;

use indexmap::IndexMap;

use crate::value::Value;

/// Lexical scope: one frame of bindings plus an immutable parent chain.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    vars: IndexMap<String, Value>,
    parent: Option<Rc<Scope>>,
}

impl Scope {
    pub fn with_bindings(vars: IndexMap<String, Value>) -> Self {
        Scope { vars, parent: None }
    }

    pub fn child(parent: Rc<Scope>) -> Self {
        Scope {
            vars: IndexMap::new(),
            parent: Some(parent),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        match self.vars.get(name) {
            Some(v) => Some(v),
            None => self.parent.as_deref().and_then(|p| p.get(name)),
        }
    }

    /// Later definitions shadow earlier ones and keep the original position.
    pub fn define(&mut self, name: String, value: Value) {
        self.vars.insert(name, value);
    }

    /// Bindings of the innermost frame only.
    pub fn into_bindings(self) -> IndexMap<String, Value> {
        self.vars
    }
}
