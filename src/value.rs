//! Runtime value representation and dispatch: the `Value` tagged union plus
//! the callable machinery (user functions, classes, instances, natives).

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use log::debug;

use crate::environment::Environment;
use crate::error::{LoxError, Result};
use crate::parser::FunctionDecl;
use crate::token::Token;

/// Host function signature; failures carry a bare message and the call site
/// supplies the line.
pub type NativeFn = fn(&[Value]) -> std::result::Result<Value, String>;

#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    Str(String),
    NativeFunction {
        name: String,
        arity: usize,
        func: NativeFn,
    },
    Function(Rc<LoxFunction>),
    Class(Rc<LoxClass>),
    Instance(Rc<RefCell<LoxInstance>>),
}

impl PartialEq for Value {
    /// Primitives compare structurally (IEEE semantics for numbers, so
    /// `NaN != NaN`); functions, classes and instances compare by identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,

            (Value::Bool(a), Value::Bool(b)) => a == b,

            (Value::Number(a), Value::Number(b)) => a == b,

            (Value::Str(a), Value::Str(b)) => a == b,

            (Value::NativeFunction { name: a, .. }, Value::NativeFunction { name: b, .. }) => {
                a == b
            }

            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),

            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),

            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),

            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),

            Value::Bool(b) => write!(f, "{}", b),

            Value::Number(n) => {
                if n.fract() == 0.0 {
                    write!(f, "{:.0}", n)
                } else {
                    write!(f, "{}", n)
                }
            }

            Value::Str(s) => write!(f, "{}", s),

            Value::NativeFunction { .. } => write!(f, "<native fn>"),

            Value::Function(function) => write!(f, "<fn {}>", function.name()),

            Value::Class(class) => write!(f, "{}", class.name),

            Value::Instance(instance) => write!(f, "{} instance", instance.borrow().class.name),
        }
    }
}

/// A user function: shared declaration plus the environment captured at the
/// point of declaration.  Methods carry the initializer flag so `init` can
/// force its return value.
#[derive(Clone)]
pub struct LoxFunction {
    pub declaration: Rc<FunctionDecl>,
    pub closure: Rc<RefCell<Environment>>,
    pub is_initializer: bool,
}

impl LoxFunction {
    pub fn new(
        declaration: Rc<FunctionDecl>,
        closure: Rc<RefCell<Environment>>,
        is_initializer: bool,
    ) -> Self {
        LoxFunction {
            declaration,
            closure,
            is_initializer,
        }
    }

    pub fn name(&self) -> &str {
        &self.declaration.name.lexeme
    }

    pub fn arity(&self) -> usize {
        self.declaration.params.len()
    }

    /// A bound method: same declaration, fresh closure with `this` defined on
    /// top of the original closure.
    pub fn bind(&self, instance: Rc<RefCell<LoxInstance>>) -> LoxFunction {
        debug!("Binding method '{}'", self.name());

        let mut environment = Environment::with_enclosing(Rc::clone(&self.closure));
        environment.define("this", Value::Instance(instance));

        LoxFunction {
            declaration: Rc::clone(&self.declaration),
            closure: Rc::new(RefCell::new(environment)),
            is_initializer: self.is_initializer,
        }
    }
}

// Closures can be cyclic (an environment holding this very function), so
// Debug stays shallow.
impl fmt::Debug for LoxFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoxFunction")
            .field("name", &self.name())
            .field("arity", &self.arity())
            .finish()
    }
}

#[derive(Debug)]
pub struct LoxClass {
    pub name: String,
    pub superclass: Option<Rc<LoxClass>>,
    pub methods: HashMap<String, LoxFunction>,
}

impl LoxClass {
    pub fn new(
        name: String,
        superclass: Option<Rc<LoxClass>>,
        methods: HashMap<String, LoxFunction>,
    ) -> Self {
        LoxClass {
            name,
            superclass,
            methods,
        }
    }

    /// Leftmost match in the inheritance chain wins.
    pub fn find_method(&self, name: &str) -> Option<&LoxFunction> {
        self.methods.get(name).or_else(|| {
            self.superclass
                .as_ref()
                .and_then(|superclass| superclass.find_method(name))
        })
    }

    /// Constructor arity is the `init` arity, or zero without one.
    pub fn arity(&self) -> usize {
        self.find_method("init").map(LoxFunction::arity).unwrap_or(0)
    }
}

pub struct LoxInstance {
    pub class: Rc<LoxClass>,
    fields: HashMap<String, Value>,
}

impl LoxInstance {
    pub fn new(class: Rc<LoxClass>) -> Self {
        LoxInstance {
            class,
            fields: HashMap::new(),
        }
    }

    /// Property lookup: fields shadow methods; a method hit is returned bound
    /// to this instance.
    pub fn get(this: &Rc<RefCell<LoxInstance>>, name: &Token) -> Result<Value> {
        if let Some(value) = this.borrow().fields.get(&name.lexeme) {
            return Ok(value.clone());
        }

        let method = this.borrow().class.find_method(&name.lexeme).cloned();
        if let Some(method) = method {
            return Ok(Value::Function(Rc::new(method.bind(Rc::clone(this)))));
        }

        Err(LoxError::runtime(
            name.line,
            format!("Undefined property '{}'.", name.lexeme),
        ))
    }

    /// Fields spring into existence on first assignment.
    pub fn set(&mut self, name: &str, value: Value) {
        self.fields.insert(name.to_string(), value);
    }
}

// Fields can refer back to the instance itself; Debug stays shallow.
impl fmt::Debug for LoxInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoxInstance")
            .field("class", &self.class.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenType;

    fn dummy_function(name: &str) -> Rc<LoxFunction> {
        let declaration = Rc::new(FunctionDecl {
            name: Token::new(TokenType::IDENTIFIER, name.to_string(), 1),
            params: Vec::new(),
            body: Vec::new(),
        });
        Rc::new(LoxFunction::new(
            declaration,
            Rc::new(RefCell::new(Environment::new())),
            false,
        ))
    }

    #[test]
    fn display_forms() {
        assert_eq!(Value::Nil.to_string(), "nil");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::Number(7.0).to_string(), "7");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
        assert_eq!(Value::Str("hi".to_string()).to_string(), "hi");
        assert_eq!(
            Value::Function(dummy_function("f")).to_string(),
            "<fn f>"
        );

        let class = Rc::new(LoxClass::new("Point".to_string(), None, HashMap::new()));
        assert_eq!(Value::Class(Rc::clone(&class)).to_string(), "Point");
        let instance = Rc::new(RefCell::new(LoxInstance::new(class)));
        assert_eq!(Value::Instance(instance).to_string(), "Point instance");
    }

    #[test]
    fn primitive_equality_is_structural() {
        assert_eq!(Value::Nil, Value::Nil);
        assert_ne!(Value::Nil, Value::Bool(false));
        assert_eq!(Value::Number(1.0), Value::Number(1.0));
        assert_ne!(Value::Number(0.0), Value::Str("0".to_string()));
        assert_eq!(Value::Str("a".to_string()), Value::Str("a".to_string()));
    }

    #[test]
    fn nan_is_not_equal_to_itself() {
        assert_ne!(Value::Number(f64::NAN), Value::Number(f64::NAN));
    }

    #[test]
    fn callables_compare_by_identity() {
        let f = dummy_function("f");
        let g = dummy_function("f");
        assert_eq!(Value::Function(Rc::clone(&f)), Value::Function(f));
        assert_ne!(Value::Function(g), Value::Function(dummy_function("f")));
    }

    #[test]
    fn fields_shadow_methods_and_missing_properties_error() {
        let class = Rc::new(LoxClass::new("C".to_string(), None, HashMap::new()));
        let instance = Rc::new(RefCell::new(LoxInstance::new(class)));
        let name = Token::new(TokenType::IDENTIFIER, "x".to_string(), 2);

        let error = LoxInstance::get(&instance, &name).unwrap_err();
        assert_eq!(error.to_string(), "Undefined property 'x'.\n[line 2]");

        instance.borrow_mut().set("x", Value::Number(3.0));
        assert_eq!(
            LoxInstance::get(&instance, &name).unwrap(),
            Value::Number(3.0)
        );
    }

    #[test]
    fn find_method_prefers_the_subclass() {
        let greet = dummy_function("greet");
        let mut base_methods = HashMap::new();
        base_methods.insert("greet".to_string(), (*greet).clone());
        let base = Rc::new(LoxClass::new("A".to_string(), None, base_methods));

        let derived = Rc::new(LoxClass::new("B".to_string(), Some(Rc::clone(&base)), {
            let mut methods = HashMap::new();
            methods.insert("greet".to_string(), (*dummy_function("greet")).clone());
            methods
        }));

        // The subclass's own table is consulted first.
        assert!(!std::ptr::eq(
            derived.find_method("greet").unwrap() as *const _,
            base.find_method("greet").unwrap() as *const _
        ));
    }
}
