//! The read-only static context shared by every pass of a compilation.

use crate::config::CompilerConfig;
use crate::error::{Location, XPathError, XResult};
use crate::functions::{FunctionLibrary, SystemFunction};
use indexmap::IndexMap;
use quire_types::{ItemType, SequenceType, parse_sequence_type};
use quire_xdm::Collation;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Receives non-fatal diagnostics raised during compilation.
pub trait WarningSink {
    fn warning(&self, message: &str, location: Location);
}

/// Forwards warnings to the `log` facade.
#[derive(Debug, Default)]
pub struct LogWarnings;

impl WarningSink for LogWarnings {
    fn warning(&self, message: &str, location: Location) {
        log::warn!("{}{}", message, location);
    }
}

/// Keeps warnings in memory, for callers that report them themselves.
#[derive(Debug, Default)]
pub struct CollectWarnings {
    messages: RefCell<Vec<String>>,
}

impl CollectWarnings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.borrow().clone()
    }
}

impl WarningSink for CollectWarnings {
    fn warning(&self, message: &str, location: Location) {
        self.messages
            .borrow_mut()
            .push(format!("{}{}", message, location));
    }
}

#[derive(Clone)]
pub struct StaticContext {
    pub config: CompilerConfig,
    pub functions: FunctionLibrary,
    pub globals: IndexMap<String, SequenceType>,
    pub collation: Collation,
    /// Static type of the initial context item, or `None` when the
    /// expression is evaluated without one.
    pub context_item: Option<ItemType>,
    warnings: Rc<dyn WarningSink>,
}

impl fmt::Debug for StaticContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticContext")
            .field("config", &self.config)
            .field("globals", &self.globals)
            .field("collation", &self.collation)
            .field("context_item", &self.context_item)
            .finish_non_exhaustive()
    }
}

impl Default for StaticContext {
    fn default() -> Self {
        StaticContext {
            config: CompilerConfig::default(),
            functions: FunctionLibrary::standard(),
            globals: IndexMap::new(),
            collation: Collation::default(),
            context_item: Some(ItemType::AnyItem),
            warnings: Rc::new(LogWarnings),
        }
    }
}

impl StaticContext {
    pub fn new(config: CompilerConfig) -> XResult<Self> {
        let collation = Collation::from_uri(&config.default_collation).ok_or_else(|| {
            XPathError::config(format!("unknown collation {}", config.default_collation))
        })?;
        let mut globals = IndexMap::new();
        for (name, text) in &config.variables {
            let st = parse_sequence_type(text).map_err(|e| {
                XPathError::config(format!("type of variable ${}: {}", name, e))
            })?;
            globals.insert(name.clone(), st);
        }
        Ok(StaticContext {
            config,
            globals,
            collation,
            ..Self::default()
        })
    }

    pub fn with_warning_sink(mut self, sink: Rc<dyn WarningSink>) -> Self {
        self.warnings = sink;
        self
    }

    pub fn without_context_item(mut self) -> Self {
        self.context_item = None;
        self
    }

    pub fn with_context_item_type(mut self, item_type: ItemType) -> Self {
        self.context_item = Some(item_type);
        self
    }

    pub fn declare_variable(&mut self, name: impl Into<String>, sequence_type: SequenceType) {
        self.globals.insert(name.into(), sequence_type);
    }

    pub fn variable_type(&self, name: &str) -> Option<&SequenceType> {
        self.globals.get(name)
    }

    pub fn resolve_function(&self, name: &str, arity: usize) -> XResult<SystemFunction> {
        self.functions.resolve(name, arity)
    }

    pub fn issue_warning(&self, message: &str, location: Location) {
        self.warnings.warning(message, location);
    }
}
