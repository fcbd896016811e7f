use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

use crate::error::{LoxError, Result};
use crate::value::Value;

/// One scope's bindings plus an optional link to the enclosing scope.  The
/// chain is acyclic; the global scope is the only node without an enclosing
/// link.
#[derive(Debug, Clone)]
pub struct Environment {
    values: HashMap<String, Value>,
    enclosing: Option<Rc<RefCell<Environment>>>,
}

impl Environment {
    pub fn new() -> Self {
        Environment {
            values: HashMap::new(),
            enclosing: None,
        }
    }

    pub fn with_enclosing(enclosing: Rc<RefCell<Environment>>) -> Self {
        Environment {
            values: HashMap::new(),
            enclosing: Some(enclosing),
        }
    }

    /// Bind `name` in this scope.  Re-defining an existing name silently
    /// overwrites it; the resolver rejects that for local scopes, which leaves
    /// the deliberate global-redeclaration leniency.
    pub fn define(&mut self, name: &str, value: Value) {
        debug!("Defining '{}'", name);
        self.values.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str, line: usize) -> Result<Value> {
        if let Some(value) = self.values.get(name) {
            Ok(value.clone())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow().get(name, line)
        } else {
            Err(LoxError::runtime(
                line,
                format!("Undefined variable '{}'.", name),
            ))
        }
    }

    pub fn assign(&mut self, name: &str, value: Value, line: usize) -> Result<()> {
        if self.values.contains_key(name) {
            self.values.insert(name.to_string(), value);
            Ok(())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow_mut().assign(name, value, line)
        } else {
            Err(LoxError::runtime(
                line,
                format!("Undefined variable '{}'.", name),
            ))
        }
    }

    /// The environment exactly `distance` hops up the chain, if the chain is
    /// that long.
    pub fn ancestor(
        this: &Rc<RefCell<Environment>>,
        distance: usize,
    ) -> Option<Rc<RefCell<Environment>>> {
        let mut environment = Rc::clone(this);

        for _ in 0..distance {
            let enclosing = environment.borrow().enclosing.clone();
            match enclosing {
                Some(parent) => environment = parent,
                None => return None,
            }
        }

        Some(environment)
    }

    /// Read `name` from the scope exactly `distance` hops up.  The resolver
    /// guarantees the name is present there; a miss is still reported rather
    /// than trusted.
    pub fn get_at(
        this: &Rc<RefCell<Environment>>,
        distance: usize,
        name: &str,
        line: usize,
    ) -> Result<Value> {
        debug!("Reading '{}' at depth {}", name, distance);

        Self::ancestor(this, distance)
            .and_then(|environment| environment.borrow().values.get(name).cloned())
            .ok_or_else(|| LoxError::runtime(line, format!("Undefined variable '{}'.", name)))
    }

    /// Write `name` in the scope exactly `distance` hops up.
    pub fn assign_at(
        this: &Rc<RefCell<Environment>>,
        distance: usize,
        name: &str,
        value: Value,
        line: usize,
    ) -> Result<()> {
        debug!("Assigning '{}' at depth {}", name, distance);

        match Self::ancestor(this, distance) {
            Some(environment) if environment.borrow().values.contains_key(name) => {
                environment
                    .borrow_mut()
                    .values
                    .insert(name.to_string(), value);
                Ok(())
            }

            _ => Err(LoxError::runtime(
                line,
                format!("Undefined variable '{}'.", name),
            )),
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(environment: Environment) -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(environment))
    }

    #[test]
    fn define_then_get() {
        let mut env = Environment::new();
        env.define("a", Value::Number(1.0));
        assert_eq!(env.get("a", 1).unwrap(), Value::Number(1.0));
    }

    #[test]
    fn get_walks_the_chain() {
        let globals = wrap(Environment::new());
        globals.borrow_mut().define("a", Value::Number(1.0));

        let inner = Environment::with_enclosing(Rc::clone(&globals));
        assert_eq!(inner.get("a", 1).unwrap(), Value::Number(1.0));
    }

    #[test]
    fn assign_updates_the_defining_scope() {
        let globals = wrap(Environment::new());
        globals.borrow_mut().define("a", Value::Number(1.0));

        let mut inner = Environment::with_enclosing(Rc::clone(&globals));
        inner.assign("a", Value::Number(2.0), 1).unwrap();

        assert_eq!(globals.borrow().get("a", 1).unwrap(), Value::Number(2.0));
    }

    #[test]
    fn undefined_names_are_errors() {
        let env = Environment::new();
        let error = env.get("missing", 3).unwrap_err();
        assert_eq!(error.to_string(), "Undefined variable 'missing'.\n[line 3]");
    }

    #[test]
    fn assign_at_then_get_at_round_trips() {
        let globals = wrap(Environment::new());
        globals.borrow_mut().define("x", Value::Nil);

        let middle = wrap(Environment::with_enclosing(Rc::clone(&globals)));
        let leaf = wrap(Environment::with_enclosing(Rc::clone(&middle)));

        Environment::assign_at(&leaf, 2, "x", Value::Number(7.0), 1).unwrap();
        assert_eq!(
            Environment::get_at(&leaf, 2, "x", 1).unwrap(),
            Value::Number(7.0)
        );

        // Depth 0 of the leaf never sees the global binding.
        assert!(Environment::get_at(&leaf, 0, "x", 1).is_err());
    }

    #[test]
    fn shadowing_is_per_scope() {
        let globals = wrap(Environment::new());
        globals.borrow_mut().define("a", Value::Number(1.0));

        let inner = wrap(Environment::with_enclosing(Rc::clone(&globals)));
        inner.borrow_mut().define("a", Value::Number(2.0));

        assert_eq!(
            Environment::get_at(&inner, 0, "a", 1).unwrap(),
            Value::Number(2.0)
        );
        assert_eq!(
            Environment::get_at(&inner, 1, "a", 1).unwrap(),
            Value::Number(1.0)
        );
    }
}
