//! Static resolution pass for the Lox interpreter.
//!
//! This module performs a single AST walk to:
//! 1. **Build lexical scopes**: maintains a stack of `HashMap<String, bool>`
//!    tracking declared (false) and fully defined (true) names in each nested
//!    block or function.
//! 2. **Enforce static rules**: reports errors such as redeclaration in the
//!    same local scope, reading a variable in its own initializer, invalid
//!    `return` placement, and illegal use of `this`/`super`.
//! 3. **Record binding distances**: for every variable occurrence
//!    (`Variable`, `Assign`, `This`, `Super`), calls back into the
//!    interpreter to note the hop depth when the name is a local.  Names
//!    found in no scope are left unannotated and resolve against the globals
//!    at runtime.
//!
//! Diagnostics are accumulated: a failed check records an error and the walk
//! continues, so one bad statement does not hide the rest.

use std::collections::HashMap;
use std::io::Write;

use log::{debug, info};

use crate::error::LoxError;
use crate::interpreter::Interpreter;
use crate::parser::{Expr, FunctionDecl, Stmt};
use crate::token::Token;

/// What kind of function body, if any, is being resolved.  Validates
/// `return` placement.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum FunctionType {
    None,
    Function,
    Method,
    Initializer,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ClassType {
    /// Not inside any class
    None,

    /// Inside a class declaration _without_ a superclass
    Class,

    /// Inside a class declaration _with_ a superclass
    Subclass,
}

/// Resolver: tracks scopes, enforces static rules, and *records* binding
/// distances (locals vs. globals) by calling back into the interpreter.
pub struct Resolver<'interp, W: Write> {
    interpreter: &'interp mut Interpreter<W>,
    scopes: Vec<HashMap<String, bool>>, // false=declared, true=defined
    diagnostics: Vec<LoxError>,
    current_function: FunctionType,
    current_class: ClassType,
}

impl<'interp, W: Write> Resolver<'interp, W> {
    /// Create a new resolver bound to the given interpreter.
    pub fn new(interpreter: &'interp mut Interpreter<W>) -> Self {
        info!("Resolver instantiated");
        Resolver {
            interpreter,
            scopes: Vec::new(),
            diagnostics: Vec::new(),
            current_function: FunctionType::None,
            current_class: ClassType::None,
        }
    }

    /// Walk all top-level statements.
    pub fn resolve(&mut self, statements: &[Stmt]) {
        info!(
            "Beginning resolve pass over {} statement(s)",
            statements.len()
        );
        for stmt in statements {
            self.resolve_stmt(stmt);
        }
    }

    /// Diagnostics recorded so far, leaving the resolver's list empty.
    pub fn take_diagnostics(&mut self) -> Vec<LoxError> {
        std::mem::take(&mut self.diagnostics)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Statement resolution
    // ─────────────────────────────────────────────────────────────────────────

    fn resolve_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Class {
                name,
                superclass,
                methods,
            } => {
                let enclosing_class = self.current_class;
                self.current_class = ClassType::Class;

                self.declare(name);
                self.define(name);

                if let Some(Expr::Variable(super_name)) = superclass {
                    if super_name.lexeme == name.lexeme {
                        self.error(super_name, "A class can't inherit from itself.");
                    }
                }

                if let Some(expr) = superclass {
                    self.current_class = ClassType::Subclass;
                    self.resolve_expr(expr);

                    // Synthetic scope holding `super` for the method bodies.
                    self.begin_scope();
                    self.scopes
                        .last_mut()
                        .unwrap()
                        .insert("super".to_string(), true);
                }

                self.begin_scope();
                self.scopes
                    .last_mut()
                    .unwrap()
                    .insert("this".to_string(), true);

                for method in methods {
                    let declaration = if method.name.lexeme == "init" {
                        FunctionType::Initializer
                    } else {
                        FunctionType::Method
                    };

                    self.resolve_function(method, declaration);
                }

                self.end_scope();

                if superclass.is_some() {
                    self.end_scope();
                }

                self.current_class = enclosing_class;
            }

            Stmt::Block(statements) => {
                self.begin_scope();

                for s in statements {
                    self.resolve_stmt(s);
                }

                self.end_scope();
            }

            Stmt::Var { name, initializer } => {
                // Declared first, defined only after the initializer has been
                // resolved, so `var a = a;` is caught.
                self.declare(name);

                if let Some(expr) = initializer {
                    self.resolve_expr(expr);
                }

                self.define(name);
            }

            Stmt::Function(declaration) => {
                // Defined eagerly so the function can recurse.
                self.declare(&declaration.name);
                self.define(&declaration.name);

                self.resolve_function(declaration, FunctionType::Function);
            }

            Stmt::Expression(expr) | Stmt::Print(expr) => {
                self.resolve_expr(expr);
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition);
                self.resolve_stmt(then_branch);

                if let Some(eb) = else_branch.as_deref() {
                    self.resolve_stmt(eb);
                }
            }

            Stmt::While { condition, body } => {
                self.resolve_expr(condition);
                self.resolve_stmt(body);
            }

            Stmt::Return { keyword, value } => {
                if self.current_function == FunctionType::None {
                    self.error(keyword, "Can't return from top-level code.");
                }

                if let Some(expr) = value {
                    if self.current_function == FunctionType::Initializer {
                        self.error(keyword, "Can't return a value from an initializer.");
                    }

                    self.resolve_expr(expr);
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Expression resolution
    // ─────────────────────────────────────────────────────────────────────────

    fn resolve_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal(_) => {}

            Expr::Grouping(inner) => {
                self.resolve_expr(inner);
            }

            Expr::Unary { right, .. } => {
                self.resolve_expr(right);
            }

            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }

            Expr::Variable(name) => {
                if let Some(scope) = self.scopes.last() {
                    if scope.get(&name.lexeme) == Some(&false) {
                        self.error(name, "Can't read local variable in its own initializer.");
                    }
                }

                self.resolve_local(expr, name);
            }

            Expr::Assign { name, value } => {
                self.resolve_expr(value);
                self.resolve_local(expr, name);
            }

            Expr::Call {
                callee, arguments, ..
            } => {
                self.resolve_expr(callee);

                for arg in arguments {
                    self.resolve_expr(arg);
                }
            }

            Expr::Get { object, .. } => {
                // Property names are looked up dynamically; only the object
                // expression resolves.
                self.resolve_expr(object);
            }

            Expr::Set { object, value, .. } => {
                self.resolve_expr(value);
                self.resolve_expr(object);
            }

            Expr::This(keyword) => {
                if self.current_class == ClassType::None {
                    self.error(keyword, "Can't use 'this' outside of a class.");
                    return;
                }

                self.resolve_local(expr, keyword);
            }

            Expr::Super { keyword, .. } => {
                if self.current_class == ClassType::None {
                    self.error(keyword, "Can't use 'super' outside of a class.");
                } else if self.current_class != ClassType::Subclass {
                    self.error(keyword, "Can't use 'super' in a class with no superclass.");
                }

                self.resolve_local(expr, keyword);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Function helper
    // ─────────────────────────────────────────────────────────────────────────

    /// Enter a fresh scope for a function's parameters + body.
    ///
    /// `kind` distinguishes plain functions, methods and initializers.
    fn resolve_function(&mut self, declaration: &FunctionDecl, kind: FunctionType) {
        let enclosing = self.current_function;
        self.current_function = kind;

        self.begin_scope();

        for param in &declaration.params {
            self.declare(param);
            self.define(param);
        }

        for stmt in &declaration.body {
            self.resolve_stmt(stmt);
        }

        self.end_scope();

        self.current_function = enclosing;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Scope management
    // ─────────────────────────────────────────────────────────────────────────

    #[inline]
    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    #[inline]
    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &Token) {
        if self.scopes.is_empty() {
            // Global scope tolerates redeclaration.
            return;
        }

        let already_declared = self
            .scopes
            .last()
            .map(|scope| scope.contains_key(&name.lexeme))
            .unwrap_or(false);

        if already_declared {
            self.error(name, "Already a variable with this name in this scope.");
        }

        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.lexeme.clone(), false);
        }
    }

    fn define(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.lexeme.clone(), true);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Binding-distance helper
    // ─────────────────────────────────────────────────────────────────────────

    /// Record this variable occurrence as a local at depth `d`, or leave it
    /// for the global environment if no scope knows the name.
    fn resolve_local(&mut self, expr: &Expr, name: &Token) {
        for (depth, scope) in self.scopes.iter().rev().enumerate() {
            if scope.contains_key(&name.lexeme) {
                debug!("Resolved '{}' at depth {}", name.lexeme, depth);
                self.interpreter.note_local(expr, depth);
                return;
            }
        }

        debug!("Resolved '{}' as global", name.lexeme);
    }

    fn error(&mut self, token: &Token, message: &str) {
        self.diagnostics
            .push(LoxError::resolve(token.line, token.location(), message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::scanner::Scanner;

    fn resolve_source(source: &str) -> (Vec<Stmt>, Interpreter<Vec<u8>>, Vec<LoxError>) {
        let tokens = Scanner::new(source)
            .collect::<crate::error::Result<Vec<_>>>()
            .expect("test source scans cleanly");
        let mut parser = Parser::new(tokens);
        let program = parser.parse();
        assert!(parser.take_diagnostics().is_empty());

        let mut interpreter = Interpreter::new(Vec::new());
        let diagnostics = {
            let mut resolver = Resolver::new(&mut interpreter);
            resolver.resolve(&program);
            resolver.take_diagnostics()
        };

        (program, interpreter, diagnostics)
    }

    fn single_message(diagnostics: &[LoxError]) -> String {
        assert_eq!(diagnostics.len(), 1, "diagnostics: {:?}", diagnostics);
        diagnostics[0].to_string()
    }

    #[test]
    fn local_read_in_the_same_scope_is_depth_zero() {
        let (program, interpreter, diagnostics) = resolve_source("{ var a = 1; print a; }");
        assert!(diagnostics.is_empty());

        let Stmt::Block(block) = &program[0] else {
            panic!("expected a block");
        };
        let Stmt::Print(expr) = &block[1] else {
            panic!("expected a print statement");
        };
        assert_eq!(interpreter.local_depth(expr), Some(0));
    }

    #[test]
    fn reads_from_an_enclosing_scope_count_the_hops() {
        let (program, interpreter, diagnostics) = resolve_source("{ var a = 1; { print a; } }");
        assert!(diagnostics.is_empty());

        let Stmt::Block(outer) = &program[0] else {
            panic!("expected a block");
        };
        let Stmt::Block(inner) = &outer[1] else {
            panic!("expected a nested block");
        };
        let Stmt::Print(expr) = &inner[0] else {
            panic!("expected a print statement");
        };
        assert_eq!(interpreter.local_depth(expr), Some(1));
    }

    #[test]
    fn globals_stay_unannotated() {
        let (program, interpreter, diagnostics) = resolve_source("var a = 1; print a;");
        assert!(diagnostics.is_empty());

        let Stmt::Print(expr) = &program[1] else {
            panic!("expected a print statement");
        };
        assert_eq!(interpreter.local_depth(expr), None);
    }

    #[test]
    fn this_resolves_through_the_method_scope() {
        let (program, interpreter, diagnostics) =
            resolve_source("class A { m() { return this; } }");
        assert!(diagnostics.is_empty());

        let Stmt::Class { methods, .. } = &program[0] else {
            panic!("expected a class");
        };
        let Stmt::Return {
            value: Some(expr), ..
        } = &methods[0].body[0]
        else {
            panic!("expected a return statement");
        };
        assert_eq!(interpreter.local_depth(expr), Some(1));
    }

    #[test]
    fn reading_a_variable_in_its_own_initializer_is_rejected() {
        let (_, _, diagnostics) = resolve_source("{ var a = a; }");
        assert!(single_message(&diagnostics)
            .contains("Can't read local variable in its own initializer."));
    }

    #[test]
    fn local_redeclaration_is_rejected_but_global_is_not() {
        let (_, _, diagnostics) = resolve_source("fun f() { var a = 1; var a = 2; }");
        assert!(single_message(&diagnostics)
            .contains("Already a variable with this name in this scope."));

        let (_, _, diagnostics) = resolve_source("var a = 1; var a = 2;");
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn top_level_return_is_rejected() {
        let (_, _, diagnostics) = resolve_source("return 1;");
        assert!(single_message(&diagnostics).contains("Can't return from top-level code."));
    }

    #[test]
    fn initializers_may_not_return_values() {
        let (_, _, diagnostics) = resolve_source("class A { init() { return 1; } }");
        assert!(single_message(&diagnostics)
            .contains("Can't return a value from an initializer."));

        let (_, _, diagnostics) = resolve_source("class A { init() { return; } }");
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn this_and_super_are_rejected_outside_their_contexts() {
        let (_, _, diagnostics) = resolve_source("print this;");
        assert!(single_message(&diagnostics).contains("Can't use 'this' outside of a class."));

        let (_, _, diagnostics) = resolve_source("print super.m;");
        assert!(single_message(&diagnostics).contains("Can't use 'super' outside of a class."));

        let (_, _, diagnostics) = resolve_source("class A { m() { return super.m; } }");
        assert!(single_message(&diagnostics)
            .contains("Can't use 'super' in a class with no superclass."));
    }

    #[test]
    fn self_inheritance_is_rejected() {
        let (_, _, diagnostics) = resolve_source("class A < A {}");
        assert!(single_message(&diagnostics).contains("A class can't inherit from itself."));
    }

    #[test]
    fn resolution_continues_after_an_error() {
        // Both problems are reported in one pass.
        let (_, _, diagnostics) = resolve_source("return 1; print this;");
        assert_eq!(diagnostics.len(), 2);
    }
}
