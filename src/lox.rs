//! Session facade: wires scanner → parser → resolver → interpreter and owns
//! the per-instance error flags, so a prompt loop can reset state between
//! lines without process-wide globals.
//!
//! # Example
//!
//! ```
//! use rox::lox::Lox;
//!
//! let mut lox = Lox::new(Vec::new());
//! lox.run("fun double(x) { return x * 2; }");
//! lox.run("print double(21);");
//!
//! assert_eq!(lox.output(), b"42\n");
//! ```

use std::io::Write;

use log::{debug, info};

use crate::error::LoxError;
use crate::interpreter::Interpreter;
use crate::parser::{Parser, Stmt};
use crate::resolver::Resolver;
use crate::scanner::Scanner;
use crate::token::Token;

pub struct Lox<W: Write> {
    interpreter: Interpreter<W>,
    /// Every program ever run in this session.  Resolver annotations are
    /// keyed by expression address, and function values keep referring into
    /// these trees, so nothing is freed until the session ends.
    programs: Vec<Vec<Stmt>>,
    diagnostics: Vec<String>,
    had_error: bool,
    had_runtime_error: bool,
}

impl<W: Write> Lox<W> {
    pub fn new(output: W) -> Self {
        Lox {
            interpreter: Interpreter::new(output),
            programs: Vec::new(),
            diagnostics: Vec::new(),
            had_error: false,
            had_runtime_error: false,
        }
    }

    pub fn had_error(&self) -> bool {
        self.had_error
    }

    pub fn had_runtime_error(&self) -> bool {
        self.had_runtime_error
    }

    /// Every diagnostic line reported in this session, in order.
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    pub fn output(&self) -> &W {
        self.interpreter.output()
    }

    /// Clear the error flags; the prompt loop calls this between lines.
    pub fn reset_errors(&mut self) {
        self.had_error = false;
        self.had_runtime_error = false;
    }

    /// Run one chunk of source through the whole pipeline.  Static errors
    /// (scan, parse, resolve) suppress evaluation; a runtime error aborts the
    /// chunk at the failing statement.
    pub fn run(&mut self, source: &str) {
        info!("Running {} bytes of source", source.len());

        let mut tokens: Vec<Token> = Vec::new();
        let mut scan_errors: Vec<LoxError> = Vec::new();
        for item in Scanner::new(source) {
            match item {
                Ok(token) => tokens.push(token),
                Err(error) => scan_errors.push(error),
            }
        }
        for error in scan_errors {
            self.report(error);
        }

        let mut parser = Parser::new(tokens);
        let program = parser.parse();
        for error in parser.take_diagnostics() {
            self.report(error);
        }

        if self.had_error {
            debug!("Skipping resolution after scan/parse errors");
            self.programs.push(program);
            return;
        }

        let resolver_diagnostics = {
            let mut resolver = Resolver::new(&mut self.interpreter);
            resolver.resolve(&program);
            resolver.take_diagnostics()
        };
        for error in resolver_diagnostics {
            self.report(error);
        }

        if self.had_error {
            debug!("Skipping evaluation after resolve errors");
            self.programs.push(program);
            return;
        }

        if let Err(error) = self.interpreter.interpret(&program) {
            self.report(error);
        }

        self.programs.push(program);
    }

    /// Diagnostic sink: one line per error to stderr, flag by stage.
    fn report(&mut self, error: LoxError) {
        eprintln!("{}", error);
        self.diagnostics.push(error.to_string());

        match error {
            LoxError::Runtime { .. } => self.had_runtime_error = true,
            _ => self.had_error = true,
        }
    }
}
