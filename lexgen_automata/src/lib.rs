//! Automaton pipeline for a lexical-analyzer generator.
//!
//! Rules arrive as [`Pattern`] trees tagged with a symbol id. They are
//! compiled into one Thompson NFA whose edges are labeled with combinations of
//! disjoint character classes, turned into a DFA by subset construction,
//! minimized over both states and classes, and finally flattened into compact
//! check/next tables:
//!
//! ```text
//! Pattern ──Compiler──> Nfa + Partition ──DfaBuilder──> Dfa (minimized) ──> Tables
//! ```
//!
//! The DFA recognizes the longest match at every position; when several rules
//! match the same text, the rule with the lowest symbol id wins unless reject
//! semantics are requested. Rules may be anchored at the start of a line and
//! may carry a trailing context that must follow the match without being
//! part of it.

#[macro_use]
mod macros;

pub mod classes;
pub mod compiler;
pub mod dfa;
pub mod minimize;
pub mod nfa;
pub mod pattern;
pub mod tables;

pub use classes::{ClassId, ClassSetId, ClassTable, Partition, EOF_CHAR};
pub use compiler::Compiler;
pub use dfa::{Conflict, Dfa, DfaBuilder};
pub use nfa::{Fragment, Nfa, Role, Symbol};
pub use pattern::{Locale, Lookahead, Pattern};
pub use tables::Tables;

/// The result of compiling rules into an NFA.
pub type CompileResult<T> = Result<T, CompileError>;

/// Errors that can occur during compilation
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// The rule set needs more NFA states than the configured limit
    TooComplex,
    /// Unsupported pattern feature
    UnsupportedFeature(String),
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::TooComplex => write!(f, "rule set is too complex"),
            CompileError::UnsupportedFeature(feature) => write!(f, "unsupported feature: {}", feature),
        }
    }
}

impl std::error::Error for CompileError {}
