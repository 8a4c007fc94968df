//! Compiled commands: code buffers, parameters, arguments and
//! [`Commandable`].
//!
//! The expression compiler writes SQL text into a [`CodeBuffer`] and
//! registers every value it meets as a [`Parameter`] named `@p{index}`.
//! Registration is by reference: the same `Arc<Value>` or
//! `Arc<Argument>` seen twice yields one parameter, two equal but
//! distinct values yield two.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::connection::{BoundParameter, Command, Connection, FromRow, RowStream};
use crate::error::{ConstructionError, Result};
use crate::value::Value;

/// Characters next to which no separating space is needed.
const SYMBOLS: &str = "(),.+-*/%=<>#;[]|&^~!:";

fn is_symbol(c: char) -> bool {
    c.is_whitespace() || SYMBOLS.contains(c)
}

// ================================================================
// Arguments and parameters
// ================================================================

/// A named placeholder bound only at execution time.
///
/// Arguments compare by identity: hold on to the `Arc` returned by
/// [`Argument::new`] and pass it back when executing.
#[derive(Debug)]
pub struct Argument {
    name: String,
}

impl Argument {
    /// Creates a new argument.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self { name: name.into() })
    }

    /// Descriptive name, used in error messages only.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Where a parameter gets its value from.
#[derive(Debug, Clone)]
pub enum ParameterSource {
    /// A value fixed at compile time.
    Value(Arc<Value>),
    /// An argument bound at execution time.
    Argument(Arc<Argument>),
}

/// A registered parameter.
#[derive(Debug, Clone)]
pub struct Parameter {
    name: String,
    source: ParameterSource,
}

impl Parameter {
    /// Generated name, `@p{index}`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value source.
    #[must_use]
    pub const fn source(&self) -> &ParameterSource {
        &self.source
    }

    /// Returns `true` if the parameter is bound at execution time.
    #[must_use]
    pub const fn is_argument(&self) -> bool {
        matches!(self.source, ParameterSource::Argument(_))
    }

    fn refers_to(&self, source: &ParameterSource) -> bool {
        match (&self.source, source) {
            (ParameterSource::Value(a), ParameterSource::Value(b)) => Arc::ptr_eq(a, b),
            (ParameterSource::Argument(a), ParameterSource::Argument(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

// ================================================================
// Code buffer
// ================================================================

/// Code whose text is produced again on every compilation.
pub trait DelayedCode: fmt::Debug + Send + Sync {
    /// Writes the current text into `buffer`, registering parameters on
    /// it as needed.
    fn write_to(&self, buffer: &mut CodeBuffer) -> Result<()>;
}

#[derive(Debug, Clone)]
enum Segment {
    Text(String),
    Delayed(Arc<dyn DelayedCode>),
}

/// Accumulates SQL text and parameters during compilation.
#[derive(Debug, Clone, Default)]
pub struct CodeBuffer {
    segments: Vec<Segment>,
    parameters: Vec<Parameter>,
}

impl CodeBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a token. A space is inserted when both the last character
    /// written and the first character of `text` are non-symbols, when a
    /// word follows `)`, or when they would form a `--` comment.
    pub fn append(&mut self, text: &str) {
        let Some(first) = text.chars().next() else {
            return;
        };
        if let Some(Segment::Text(current)) = self.segments.last_mut() {
            if let Some(last) = current.chars().next_back() {
                if (!is_symbol(last) && !is_symbol(first))
                    || (last == ')' && first.is_alphabetic())
                    || (last == '-' && first == '-')
                {
                    current.push(' ');
                }
            }
            current.push_str(text);
        } else {
            self.segments.push(Segment::Text(text.to_string()));
        }
    }

    /// Appends code to be produced at compilation time.
    pub fn append_delayed(&mut self, code: Arc<dyn DelayedCode>) {
        self.segments.push(Segment::Delayed(code));
    }

    /// Returns `true` if the buffer holds delayed code.
    #[must_use]
    pub fn is_delayed(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Delayed(_)))
    }

    fn register(&mut self, source: ParameterSource) -> String {
        if let Some(existing) = self.parameters.iter().find(|p| p.refers_to(&source)) {
            return existing.name.clone();
        }
        let name = format!("@p{}", self.parameters.len());
        self.parameters.push(Parameter {
            name: name.clone(),
            source,
        });
        name
    }

    /// Registers a value and returns its parameter name.
    pub fn value_parameter(&mut self, value: &Arc<Value>) -> String {
        self.register(ParameterSource::Value(Arc::clone(value)))
    }

    /// Registers an argument and returns its parameter name.
    pub fn argument_parameter(&mut self, argument: &Arc<Argument>) -> String {
        self.register(ParameterSource::Argument(Arc::clone(argument)))
    }

    /// Registers a value and appends its parameter name.
    pub fn append_value(&mut self, value: &Arc<Value>) {
        let name = self.value_parameter(value);
        self.append(&name);
    }

    /// Registers an argument and appends its parameter name.
    pub fn append_argument(&mut self, argument: &Arc<Argument>) {
        let name = self.argument_parameter(argument);
        self.append(&name);
    }

    /// Appends text compiled elsewhere, renaming its `@pN` parameters to
    /// parameters of this buffer.
    pub fn append_compiled(&mut self, text: &str, parameters: &[Parameter]) -> Result<()> {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(at) = rest.find("@p") {
            out.push_str(&rest[..at]);
            let tail = &rest[at + 2..];
            let digits = tail.chars().take_while(char::is_ascii_digit).count();
            if digits == 0 {
                out.push_str("@p");
                rest = tail;
                continue;
            }
            let name = &rest[at..at + 2 + digits];
            let parameter = parameters
                .iter()
                .find(|p| p.name == name)
                .ok_or_else(|| ConstructionError::UnknownArgument(name.to_string()))?;
            out.push_str(&self.register(parameter.source.clone()));
            rest = &tail[digits..];
        }
        out.push_str(rest);
        self.append(&out);
        Ok(())
    }

    /// Parameters registered so far.
    #[must_use]
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    fn fixed_text(&self) -> String {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Text(t) => Some(t.as_str()),
                Segment::Delayed(_) => None,
            })
            .collect()
    }

    /// Produces the text and parameters, running delayed code against a
    /// fresh buffer. The receiver is left untouched.
    pub fn compile(&self) -> Result<(String, Vec<Parameter>)> {
        if !self.is_delayed() {
            return Ok((self.fixed_text(), self.parameters.clone()));
        }
        let mut out = Self {
            segments: Vec::new(),
            parameters: self.parameters.clone(),
        };
        for segment in &self.segments {
            match segment {
                Segment::Text(t) => out.append(t),
                Segment::Delayed(code) => code.write_to(&mut out)?,
            }
        }
        out.compile()
    }
}

// ================================================================
// Commandable
// ================================================================

/// A compiled command, executable any number of times.
#[derive(Debug, Clone)]
pub enum Commandable {
    /// Text and parameters fixed at construction.
    Immediate {
        /// SQL text.
        text: String,
        /// Parameters in registration order.
        parameters: Vec<Parameter>,
    },
    /// Text and parameters recomputed from the buffer on every access.
    Delayed {
        /// The retained buffer.
        buffer: Arc<CodeBuffer>,
    },
}

impl Commandable {
    /// Wraps a finished buffer: immediate unless it holds delayed code.
    #[must_use]
    pub fn from_buffer(buffer: CodeBuffer) -> Self {
        if buffer.is_delayed() {
            Self::Delayed {
                buffer: Arc::new(buffer),
            }
        } else {
            Self::Immediate {
                text: buffer.fixed_text(),
                parameters: buffer.parameters,
            }
        }
    }

    /// Returns `true` for the delayed form.
    #[must_use]
    pub const fn is_delayed(&self) -> bool {
        matches!(self, Self::Delayed { .. })
    }

    /// Current text and parameters.
    pub fn command_text_and_parameters(&self) -> Result<(String, Vec<Parameter>)> {
        match self {
            Self::Immediate { text, parameters } => Ok((text.clone(), parameters.clone())),
            Self::Delayed { buffer } => buffer.compile(),
        }
    }

    /// Current text.
    pub fn command_text(&self) -> Result<String> {
        Ok(self.command_text_and_parameters()?.0)
    }

    /// Position of `argument` in the parameter list, by identity.
    pub fn index_of_argument(&self, argument: &Arc<Argument>) -> Result<usize> {
        let (_, parameters) = self.command_text_and_parameters()?;
        parameters
            .iter()
            .position(|p| matches!(&p.source, ParameterSource::Argument(a) if Arc::ptr_eq(a, argument)))
            .ok_or_else(|| ConstructionError::UnknownArgument(argument.name().to_string()).into())
    }

    /// Resolves every parameter to a value. Each argument must appear in
    /// `bindings`, matched by identity.
    pub fn bind(&self, bindings: &[(&Arc<Argument>, Value)]) -> Result<(String, Vec<BoundParameter>)> {
        let (text, parameters) = self.command_text_and_parameters()?;
        let bound = parameters
            .into_iter()
            .map(|p| -> Result<BoundParameter> {
                let value = match &p.source {
                    ParameterSource::Value(v) => Value::clone(v),
                    ParameterSource::Argument(a) => bindings
                        .iter()
                        .find(|(arg, _)| Arc::ptr_eq(arg, a))
                        .map(|(_, v)| v.clone())
                        .ok_or_else(|| ConstructionError::UnboundArgument(a.name().to_string()))?,
                };
                Ok(BoundParameter {
                    name: p.name,
                    value,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok((text, bound))
    }

    /// Executes a statement that returns no rows.
    pub fn execute_non_query<C: Connection + ?Sized>(
        &self,
        connection: &mut C,
        bindings: &[(&Arc<Argument>, Value)],
    ) -> Result<u64> {
        let (text, parameters) = self.bind(bindings)?;
        debug!(sql = %text, parameters = parameters.len(), "Executing non-query");
        let mut command = connection.create_command()?;
        command.execute_non_query(&text, &parameters)
    }

    /// Executes a query and collects its rows.
    pub fn execute_reader<C: Connection + ?Sized>(
        &self,
        connection: &mut C,
        bindings: &[(&Arc<Argument>, Value)],
    ) -> Result<Vec<crate::connection::Row>> {
        let (text, parameters) = self.bind(bindings)?;
        debug!(sql = %text, parameters = parameters.len(), "Executing reader");
        let mut command = connection.create_command()?;
        let rows: RowStream<'_> = command.execute_reader(&text, &parameters)?;
        rows.collect()
    }

    /// Executes a query and reads every row as a `T`.
    pub fn execute_records<T: FromRow, C: Connection + ?Sized>(
        &self,
        connection: &mut C,
        bindings: &[(&Arc<Argument>, Value)],
    ) -> Result<Vec<T>> {
        let (text, parameters) = self.bind(bindings)?;
        debug!(sql = %text, parameters = parameters.len(), "Executing record reader");
        let mut command = connection.create_command()?;
        let rows: RowStream<'_> = command.execute_reader(&text, &parameters)?;
        rows.map(|row| T::from_row(&row?)).collect()
    }
}

impl DelayedCode for Commandable {
    fn write_to(&self, buffer: &mut CodeBuffer) -> Result<()> {
        let (text, parameters) = self.command_text_and_parameters()?;
        // Embedded statements lose their terminator.
        let text = text.strip_suffix(';').unwrap_or(&text);
        buffer.append_compiled(text, &parameters)
    }
}
