//! Tree-walking evaluator.
//!
//! Statements are executed for effect, expressions for value.  The
//! interpreter owns the global environment, a pointer to the currently
//! active environment, and the side table of resolver depths keyed by
//! expression address (`note_local`).  `print` output goes through the
//! generic `W: Write` sink so the binary can use stdout and tests a buffer.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Write;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info};

use crate::environment::Environment;
use crate::error::{LoxError, Result};
use crate::parser::{Expr, LiteralValue, Stmt};
use crate::token::{Token, TokenType};
use crate::value::{LoxClass, LoxFunction, LoxInstance, Value};

/// Control-flow channel for evaluation: either a `return` unwinding to the
/// enclosing call boundary, or a runtime failure.  Block environments are
/// restored on both paths.
#[derive(Debug)]
pub enum Unwind {
    Return(Value),
    Error(LoxError),
}

impl From<LoxError> for Unwind {
    fn from(error: LoxError) -> Self {
        Unwind::Error(error)
    }
}

impl From<std::io::Error> for Unwind {
    fn from(error: std::io::Error) -> Self {
        Unwind::Error(LoxError::Io(error))
    }
}

/// Stable identity of an expression node, used as the key for resolver
/// annotations.  The session retains every parsed program, so addresses are
/// unique and live for the whole run.
fn expr_id(expr: &Expr) -> usize {
    expr as *const Expr as usize
}

pub struct Interpreter<W: Write> {
    globals: Rc<RefCell<Environment>>,
    environment: Rc<RefCell<Environment>>,
    locals: HashMap<usize, usize>,
    output: W,
}

impl<W: Write> Interpreter<W> {
    pub fn new(output: W) -> Self {
        let globals = Rc::new(RefCell::new(Environment::new()));
        globals.borrow_mut().define(
            "clock",
            Value::NativeFunction {
                name: "clock".to_string(),
                arity: 0,
                func: clock_native,
            },
        );

        Interpreter {
            environment: Rc::clone(&globals),
            globals,
            locals: HashMap::new(),
            output,
        }
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    /// Record the hop distance for a variable occurrence (resolver callback).
    pub fn note_local(&mut self, expr: &Expr, depth: usize) {
        debug!("Noting local at depth {}", depth);
        self.locals.insert(expr_id(expr), depth);
    }

    /// The recorded hop distance, if the occurrence resolved to a local.
    pub fn local_depth(&self, expr: &Expr) -> Option<usize> {
        self.locals.get(&expr_id(expr)).copied()
    }

    /// Run a resolved program.  Stops at the first runtime error.
    pub fn interpret(&mut self, statements: &[Stmt]) -> Result<()> {
        info!("Interpreting {} statement(s)", statements.len());

        for stmt in statements {
            match self.execute(stmt) {
                Ok(()) => {}

                Err(Unwind::Error(error)) => return Err(error),

                Err(Unwind::Return(_)) => {
                    unreachable!("the resolver rejects 'return' outside of functions")
                }
            }
        }

        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Statements
    // ─────────────────────────────────────────────────────────────────────────

    fn execute(&mut self, stmt: &Stmt) -> std::result::Result<(), Unwind> {
        match stmt {
            Stmt::Expression(expr) => {
                self.evaluate(expr)?;

                Ok(())
            }

            Stmt::Print(expr) => {
                let value = self.evaluate(expr)?;

                writeln!(self.output, "{}", value)?;

                Ok(())
            }

            Stmt::Var { name, initializer } => {
                let value: Value = match initializer {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };

                self.environment.borrow_mut().define(&name.lexeme, value);

                Ok(())
            }

            Stmt::Block(statements) => {
                let environment = Environment::with_enclosing(Rc::clone(&self.environment));

                self.execute_block(statements, environment)
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if is_truthy(&self.evaluate(condition)?) {
                    self.execute(then_branch)?;
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch)?;
                }

                Ok(())
            }

            Stmt::While { condition, body } => {
                while is_truthy(&self.evaluate(condition)?) {
                    self.execute(body)?;
                }

                Ok(())
            }

            Stmt::Function(declaration) => {
                // The closure is the environment active at declaration time.
                let function = LoxFunction::new(
                    Rc::clone(declaration),
                    Rc::clone(&self.environment),
                    false,
                );

                self.environment
                    .borrow_mut()
                    .define(&declaration.name.lexeme, Value::Function(Rc::new(function)));

                Ok(())
            }

            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };

                Err(Unwind::Return(value))
            }

            Stmt::Class {
                name,
                superclass,
                methods,
            } => {
                let superclass_value = match superclass {
                    Some(expr) => match self.evaluate(expr)? {
                        Value::Class(class) => Some(class),

                        _ => {
                            let line = match expr {
                                Expr::Variable(token) => token.line,
                                _ => name.line,
                            };

                            return Err(
                                LoxError::runtime(line, "Superclass must be a class.").into()
                            );
                        }
                    },

                    None => None,
                };

                // Two-step definition so methods can close over the class name.
                self.environment.borrow_mut().define(&name.lexeme, Value::Nil);

                let previous = Rc::clone(&self.environment);
                if let Some(class) = &superclass_value {
                    let mut environment =
                        Environment::with_enclosing(Rc::clone(&self.environment));
                    environment.define("super", Value::Class(Rc::clone(class)));
                    self.environment = Rc::new(RefCell::new(environment));
                }

                let mut method_table: HashMap<String, LoxFunction> = HashMap::new();
                for method in methods {
                    let is_initializer = method.name.lexeme == "init";
                    let function = LoxFunction::new(
                        Rc::clone(method),
                        Rc::clone(&self.environment),
                        is_initializer,
                    );
                    method_table.insert(method.name.lexeme.clone(), function);
                }

                self.environment = previous;

                let class = LoxClass::new(name.lexeme.clone(), superclass_value, method_table);

                self.environment.borrow_mut().assign(
                    &name.lexeme,
                    Value::Class(Rc::new(class)),
                    name.line,
                )?;

                Ok(())
            }
        }
    }

    /// Execute `statements` in `environment`, restoring the previous
    /// environment on every exit path, unwinding included.
    fn execute_block(
        &mut self,
        statements: &[Stmt],
        environment: Environment,
    ) -> std::result::Result<(), Unwind> {
        let previous = Rc::clone(&self.environment);
        self.environment = Rc::new(RefCell::new(environment));

        let mut result = Ok(());
        for stmt in statements {
            result = self.execute(stmt);
            if result.is_err() {
                break;
            }
        }

        self.environment = previous;
        result
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Expressions
    // ─────────────────────────────────────────────────────────────────────────

    fn evaluate(&mut self, expr: &Expr) -> std::result::Result<Value, Unwind> {
        match expr {
            Expr::Literal(literal) => Ok(match literal {
                LiteralValue::Nil => Value::Nil,
                LiteralValue::True => Value::Bool(true),
                LiteralValue::False => Value::Bool(false),
                LiteralValue::Number(n) => Value::Number(*n),
                LiteralValue::Str(s) => Value::Str(s.clone()),
            }),

            Expr::Grouping(inner) => self.evaluate(inner),

            Expr::Unary { operator, right } => {
                let value = self.evaluate(right)?;

                Ok(evaluate_unary(operator, value)?)
            }

            Expr::Binary {
                left,
                operator,
                right,
            } => {
                // Left operand strictly before the right one.
                let left_value = self.evaluate(left)?;
                let right_value = self.evaluate(right)?;

                Ok(evaluate_binary(left_value, operator, right_value)?)
            }

            Expr::Logical {
                left,
                operator,
                right,
            } => {
                let left_value = self.evaluate(left)?;

                match operator.token_type {
                    TokenType::OR => {
                        if is_truthy(&left_value) {
                            Ok(left_value)
                        } else {
                            self.evaluate(right)
                        }
                    }

                    TokenType::AND => {
                        if !is_truthy(&left_value) {
                            Ok(left_value)
                        } else {
                            self.evaluate(right)
                        }
                    }

                    _ => unreachable!("parser only produces 'and'/'or' logical operators"),
                }
            }

            Expr::Variable(name) => Ok(self.look_up_variable(name, expr)?),

            Expr::Assign { name, value } => {
                let value = self.evaluate(value)?;

                match self.locals.get(&expr_id(expr)) {
                    Some(&distance) => {
                        Environment::assign_at(
                            &self.environment,
                            distance,
                            &name.lexeme,
                            value.clone(),
                            name.line,
                        )?;
                    }

                    None => {
                        self.globals
                            .borrow_mut()
                            .assign(&name.lexeme, value.clone(), name.line)?;
                    }
                }

                Ok(value)
            }

            Expr::Call {
                callee,
                paren,
                arguments,
            } => {
                let callee_value = self.evaluate(callee)?;

                let mut args: Vec<Value> = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    args.push(self.evaluate(argument)?);
                }

                self.call_value(callee_value, args, paren)
            }

            Expr::Get { object, name } => match self.evaluate(object)? {
                Value::Instance(instance) => Ok(LoxInstance::get(&instance, name)?),

                _ => Err(
                    LoxError::runtime(name.line, "Only instances have properties.").into(),
                ),
            },

            Expr::Set {
                object,
                name,
                value,
            } => match self.evaluate(object)? {
                Value::Instance(instance) => {
                    let value = self.evaluate(value)?;

                    instance.borrow_mut().set(&name.lexeme, value.clone());

                    Ok(value)
                }

                _ => Err(LoxError::runtime(name.line, "Only instances have fields.").into()),
            },

            Expr::This(keyword) => Ok(self.look_up_variable(keyword, expr)?),

            Expr::Super { keyword, method } => {
                let distance = match self.locals.get(&expr_id(expr)) {
                    Some(&distance) => distance,
                    None => {
                        return Err(LoxError::runtime(
                            keyword.line,
                            "Undefined variable 'super'.",
                        )
                        .into())
                    }
                };

                let superclass = match Environment::get_at(
                    &self.environment,
                    distance,
                    "super",
                    keyword.line,
                )? {
                    Value::Class(class) => class,
                    _ => unreachable!("'super' is always bound to a class"),
                };

                // The `this` scope sits exactly one level inside `super`'s.
                let instance = match Environment::get_at(
                    &self.environment,
                    distance - 1,
                    "this",
                    keyword.line,
                )? {
                    Value::Instance(instance) => instance,
                    _ => unreachable!("'this' is always bound to an instance"),
                };

                match superclass.find_method(&method.lexeme).cloned() {
                    Some(found) => Ok(Value::Function(Rc::new(found.bind(instance)))),

                    None => Err(LoxError::runtime(
                        method.line,
                        format!("Undefined property '{}'.", method.lexeme),
                    )
                    .into()),
                }
            }
        }
    }

    /// Annotated references read the `d`-th ancestor; everything else is a
    /// global access.
    fn look_up_variable(&self, name: &Token, expr: &Expr) -> Result<Value> {
        match self.locals.get(&expr_id(expr)) {
            Some(&distance) => {
                Environment::get_at(&self.environment, distance, &name.lexeme, name.line)
            }

            None => self.globals.borrow().get(&name.lexeme, name.line),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Calls
    // ─────────────────────────────────────────────────────────────────────────

    fn call_value(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        paren: &Token,
    ) -> std::result::Result<Value, Unwind> {
        match callee {
            Value::NativeFunction { arity, func, .. } => {
                check_arity(arity, args.len(), paren)?;

                func(&args).map_err(|message| LoxError::runtime(paren.line, message).into())
            }

            Value::Function(function) => {
                check_arity(function.arity(), args.len(), paren)?;

                self.call_function(&function, args)
            }

            Value::Class(class) => {
                check_arity(class.arity(), args.len(), paren)?;

                self.instantiate(&class, args)
            }

            _ => Err(LoxError::runtime(paren.line, "Can only call functions and classes.").into()),
        }
    }

    fn call_function(
        &mut self,
        function: &LoxFunction,
        args: Vec<Value>,
    ) -> std::result::Result<Value, Unwind> {
        debug!("Calling function '{}'", function.name());

        let mut environment = Environment::with_enclosing(Rc::clone(&function.closure));
        for (param, arg) in function.declaration.params.iter().zip(args) {
            environment.define(&param.lexeme, arg);
        }

        match self.execute_block(&function.declaration.body, environment) {
            Ok(()) => {}

            Err(Unwind::Return(value)) => {
                // Initializers always hand back `this`, even on `return;`.
                if function.is_initializer {
                    return Ok(self.initializer_this(function)?);
                }

                return Ok(value);
            }

            Err(error) => return Err(error),
        }

        if function.is_initializer {
            Ok(self.initializer_this(function)?)
        } else {
            Ok(Value::Nil)
        }
    }

    fn initializer_this(&self, function: &LoxFunction) -> Result<Value> {
        Environment::get_at(
            &function.closure,
            0,
            "this",
            function.declaration.name.line,
        )
    }

    fn instantiate(
        &mut self,
        class: &Rc<LoxClass>,
        args: Vec<Value>,
    ) -> std::result::Result<Value, Unwind> {
        debug!("Instantiating class '{}'", class.name);

        let instance = Rc::new(RefCell::new(LoxInstance::new(Rc::clone(class))));

        if let Some(initializer) = class.find_method("init").cloned() {
            let bound = initializer.bind(Rc::clone(&instance));
            self.call_function(&bound, args)?;
        }

        Ok(Value::Instance(instance))
    }
}

fn check_arity(arity: usize, got: usize, paren: &Token) -> Result<()> {
    if arity == got {
        Ok(())
    } else {
        Err(LoxError::runtime(
            paren.line,
            format!("Expected {} arguments but got {}.", arity, got),
        ))
    }
}

/// `false` and `nil` are falsy; every other value is truthy.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Nil => false,

        Value::Bool(b) => *b,

        _ => true,
    }
}

fn evaluate_unary(operator: &Token, value: Value) -> Result<Value> {
    match operator.token_type {
        TokenType::MINUS => match value {
            Value::Number(n) => Ok(Value::Number(-n)),

            _ => Err(LoxError::runtime(
                operator.line,
                "Operand must be a number.",
            )),
        },

        TokenType::BANG => Ok(Value::Bool(!is_truthy(&value))),

        _ => unreachable!("parser only produces '!' and '-' unary operators"),
    }
}

fn evaluate_binary(left: Value, operator: &Token, right: Value) -> Result<Value> {
    match operator.token_type {
        TokenType::PLUS => match (left, right) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),

            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),

            _ => Err(LoxError::runtime(
                operator.line,
                "Operands must be two numbers or two strings.",
            )),
        },

        TokenType::MINUS => match (left, right) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a - b)),

            _ => Err(LoxError::runtime(operator.line, "Operands must be numbers.")),
        },

        TokenType::STAR => match (left, right) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a * b)),

            _ => Err(LoxError::runtime(operator.line, "Operands must be numbers.")),
        },

        // IEEE division: a zero divisor yields an infinity or NaN.
        TokenType::SLASH => match (left, right) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a / b)),

            _ => Err(LoxError::runtime(operator.line, "Operands must be numbers.")),
        },

        TokenType::GREATER => match (left, right) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Bool(a > b)),

            _ => Err(LoxError::runtime(operator.line, "Operands must be numbers.")),
        },

        TokenType::GREATER_EQUAL => match (left, right) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Bool(a >= b)),

            _ => Err(LoxError::runtime(operator.line, "Operands must be numbers.")),
        },

        TokenType::LESS => match (left, right) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Bool(a < b)),

            _ => Err(LoxError::runtime(operator.line, "Operands must be numbers.")),
        },

        TokenType::LESS_EQUAL => match (left, right) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Bool(a <= b)),

            _ => Err(LoxError::runtime(operator.line, "Operands must be numbers.")),
        },

        TokenType::EQUAL_EQUAL => Ok(Value::Bool(left == right)),

        TokenType::BANG_EQUAL => Ok(Value::Bool(left != right)),

        _ => unreachable!("parser only produces binary operator tokens here"),
    }
}

fn clock_native(_args: &[Value]) -> std::result::Result<Value, String> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| format!("Clock error: {}", e))?
        .as_secs_f64();

    Ok(Value::Number(timestamp))
}
