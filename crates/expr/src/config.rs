use crate::error::{XPathError, XResult};
use indexmap::IndexMap;
use quire_xdm::compare::CODEPOINT_COLLATION;
use serde::{Deserialize, Serialize};

/// Language level the compiler accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(try_from = "u32", into = "u32")]
pub enum XPathVersion {
    V20,
    V30,
    #[default]
    V31,
}

impl XPathVersion {
    pub fn as_number(self) -> u32 {
        match self {
            XPathVersion::V20 => 20,
            XPathVersion::V30 => 30,
            XPathVersion::V31 => 31,
        }
    }
}

impl TryFrom<u32> for XPathVersion {
    type Error = String;

    fn try_from(n: u32) -> Result<Self, Self::Error> {
        match n {
            20 => Ok(XPathVersion::V20),
            30 => Ok(XPathVersion::V30),
            31 => Ok(XPathVersion::V31),
            other => Err(format!("unsupported XPath version {}", other)),
        }
    }
}

impl From<XPathVersion> for u32 {
    fn from(v: XPathVersion) -> u32 {
        v.as_number()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompilerConfig {
    /// Defaults to `31`.
    pub xpath_version: XPathVersion,

    /// Applies the XPath 1.0 compatible conversion rules when checking
    /// singleton arguments: extra items are dropped and values are
    /// converted with `string()` or `number()`.
    pub backwards_compatible: bool,

    /// Collation URI used by comparisons. Defaults to the Unicode
    /// codepoint collation.
    pub default_collation: String,

    pub default_namespace: Option<String>,

    /// Keeps positional filters as filters, since rewriting them to
    /// `subsequence` calls prevents streamed evaluation.
    pub optimize_for_streaming: bool,

    /// Logs every rewrite the optimizer applies at `debug` level.
    pub trace_optimizer_decisions: bool,

    /// Maximum number of nodes visited when re-verifying the reference
    /// list of a variable binding. When exceeded, the binding is left as
    /// it is.
    ///
    /// Defaults to `10000`.
    pub reference_scan_budget: usize,

    /// How many times the action of a variable binding is re-optimised
    /// after an inlining made further rewrites possible.
    ///
    /// Defaults to `5`.
    pub max_optimize_rounds: usize,

    /// External variables and their declared types, e.g.
    /// `"seq": "xs:integer*"`.
    pub variables: IndexMap<String, String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            xpath_version: XPathVersion::default(),
            backwards_compatible: false,
            default_collation: CODEPOINT_COLLATION.to_string(),
            default_namespace: None,
            optimize_for_streaming: false,
            trace_optimizer_decisions: false,
            reference_scan_budget: 10000,
            max_optimize_rounds: 5,
            variables: IndexMap::new(),
        }
    }
}

impl CompilerConfig {
    pub fn from_json(json: &str) -> XResult<Self> {
        serde_json::from_str(json).map_err(|e| XPathError::config(e.to_string()))
    }

    pub fn with_backwards_compatible(mut self, on: bool) -> Self {
        self.backwards_compatible = on;
        self
    }

    pub fn with_default_collation(mut self, uri: impl Into<String>) -> Self {
        self.default_collation = uri.into();
        self
    }

    pub fn with_streaming(mut self, on: bool) -> Self {
        self.optimize_for_streaming = on;
        self
    }

    pub fn with_trace(mut self, on: bool) -> Self {
        self.trace_optimizer_decisions = on;
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, sequence_type: impl Into<String>) -> Self {
        self.variables.insert(name.into(), sequence_type.into());
        self
    }

    pub fn with_version(mut self, version: XPathVersion) -> Self {
        self.xpath_version = version;
        self
    }
}
