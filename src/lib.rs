/*!
This crate turns a set of lexer rules, each written as a regular expression,
into the transition tables of a scanner.

The rules are compiled into a single DFA over disjoint character classes. At
every position the DFA recognizes the longest match; when several rules match
the same text the rule added first wins. The DFA is minimized over both its
states and its character classes and then flattened into compact check/next
[`Tables`] that a generated scanner can walk without this crate.

# Example

```
use lexgen::{LexerBuilder, Symbol};

let lexer = LexerBuilder::new()
    .rule("if")
    .rule("[a-z]+")
    .rule("[0-9]+")
    .build()?;

let tables = lexer.tables();
let mut state = 0;
for ch in "if".chars() {
    state = tables.lookup_char(state, ch).unwrap();
}
assert_eq!(tables.symbols(state).next(), Some(Symbol::Accept(0)));
# Ok::<(), lexgen::Error>(())
```

# Start conditions and anchors

Rules can be restricted to some of several start contexts with
[`Rule::contexts`]. Every context gets two head states: one used in the middle
of a line and one used at the start of a line. A rule whose pattern begins
with `^` is only reachable from the latter:

```
use lexgen::{LexerBuilder, Rule};

let lexer = LexerBuilder::new()
    .contexts(2)
    .rule_with(Rule::new("^#[a-z]+"))
    .rule_with(Rule::new("[a-z]+").contexts(&[1]))
    .build()?;

assert!(lexer.uses_line_start());
let head = lexer.dfa().head(0, false);
assert!(lexer.dfa().next_state(head, lexer.dfa().class_of('#').unwrap()).is_none());
# Ok::<(), lexgen::Error>(())
```

# Trailing context

A rule may require that some text follows its match without being part of it
(`abc/def` in lex notation). The automaton then marks where the rule's head
ended with [`Symbol::TrailHead`] and accepts the whole head plus trailing text
with [`Symbol::Accept`]. How a scanner recovers the real end of the match is
described by the rule's [`Lookahead`], see [`Lexer::rules`].

# Crate features

* **std** - Reserved. The standard library is always used; this is enabled
  by default and only forwarded to `regex-syntax`.
* **unicode** - Enables Unicode-aware rule syntax such as `\w`, `\p{L}` and
  case-insensitive matching of non-ASCII letters. Also fills in the general
  category shortcuts of the exported class table. Enabled by default.
* **logging** - Emits `log` messages from every stage of the pipeline.
*/

#![deny(missing_docs)]

pub use lexgen_automata::{
    ClassId, ClassTable, CompileError, Conflict, Dfa, Locale, Lookahead, Pattern, Symbol, Tables, EOF_CHAR,
};

use lexgen_automata::{Compiler, DfaBuilder};
use regex_syntax::ParserBuilder;

/// An error that occurred while building a lexer.
#[derive(Debug)]
pub enum Error {
    /// A rule's pattern is not a valid regular expression.
    Syntax(regex_syntax::Error),
    /// A rule uses a construct the automaton cannot express, or the rule set
    /// is too large.
    Compile(CompileError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Syntax(err) => write!(f, "{}", err),
            Error::Compile(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Syntax(err) => Some(err),
            Error::Compile(err) => Some(err),
        }
    }
}

impl From<regex_syntax::Error> for Error {
    fn from(err: regex_syntax::Error) -> Error {
        Error::Syntax(err)
    }
}

impl From<CompileError> for Error {
    fn from(err: CompileError) -> Error {
        Error::Compile(err)
    }
}

/// A single lexer rule written as a regular expression.
#[derive(Clone, Debug)]
pub struct Rule {
    /// The expression to match. A leading `^` anchors the rule at the start
    /// of a line.
    pub pattern: String,
    /// Text that must follow the match without being part of it.
    pub trailing: Option<String>,
    /// The start contexts the rule is active in. Empty means all of them.
    pub contexts: Vec<usize>,
}

impl Rule {
    /// A rule active in every context, without trailing context.
    pub fn new(pattern: &str) -> Rule {
        Rule { pattern: pattern.to_string(), trailing: None, contexts: Vec::new() }
    }

    /// Require `trailing` to follow every match of this rule.
    pub fn trailing(mut self, trailing: &str) -> Rule {
        self.trailing = Some(trailing.to_string());
        self
    }

    /// Restrict the rule to the given start contexts.
    pub fn contexts(mut self, contexts: &[usize]) -> Rule {
        self.contexts = contexts.to_vec();
        self
    }
}

#[derive(Clone, Debug)]
enum Source {
    Regex(Rule),
    Tree(Pattern, Vec<usize>),
}

/// Configures and builds a [`Lexer`].
///
/// Rules get symbol ids in the order they are added, starting at zero.
#[derive(Clone, Debug)]
pub struct LexerBuilder {
    rules: Vec<Source>,
    contexts: usize,
    reject: bool,
    state_limit: Option<usize>,
}

impl Default for LexerBuilder {
    fn default() -> LexerBuilder {
        LexerBuilder::new()
    }
}

impl LexerBuilder {
    /// A builder with one start context and no rules.
    pub fn new() -> LexerBuilder {
        LexerBuilder { rules: Vec::new(), contexts: 1, reject: false, state_limit: None }
    }

    /// Set the number of start contexts. Must be at least one.
    pub fn contexts(mut self, contexts: usize) -> LexerBuilder {
        self.contexts = contexts;
        self
    }

    /// Keep every rule that matches in a state instead of just the first.
    ///
    /// Scanners that support `REJECT` need the full list to fall back to the
    /// next rule.
    pub fn reject(mut self, yes: bool) -> LexerBuilder {
        self.reject = yes;
        self
    }

    /// Limit the number of NFA states the rules may compile to.
    pub fn state_limit(mut self, limit: usize) -> LexerBuilder {
        self.state_limit = Some(limit);
        self
    }

    /// Add a rule active in every context.
    pub fn rule(self, pattern: &str) -> LexerBuilder {
        self.rule_with(Rule::new(pattern))
    }

    /// Add a fully configured rule.
    pub fn rule_with(mut self, rule: Rule) -> LexerBuilder {
        self.rules.push(Source::Regex(rule));
        self
    }

    /// Add a rule given as a pattern tree, for constructs regular
    /// expressions cannot spell such as [`Pattern::Eof`] or locale-specific
    /// case folding.
    pub fn rule_pattern(mut self, pattern: Pattern, contexts: &[usize]) -> LexerBuilder {
        self.rules.push(Source::Tree(pattern, contexts.to_vec()));
        self
    }

    /// Compile every rule and build the tables.
    ///
    /// # Panics
    ///
    /// When the context count is zero or a rule names a context that does
    /// not exist.
    pub fn build(&self) -> Result<Lexer, Error> {
        let mut compiler = Compiler::new(self.contexts);
        if let Some(limit) = self.state_limit {
            compiler = compiler.state_limit(limit);
        }
        for (id, source) in self.rules.iter().enumerate() {
            let (pattern, contexts) = match source {
                Source::Regex(rule) => (parse_rule(rule)?, &rule.contexts),
                Source::Tree(pattern, contexts) => (pattern.clone(), contexts),
            };
            compiler.add_rule(&pattern, id as u32, contexts)?;
        }

        let (nfa, partition) = compiler.finish();
        let dfa = DfaBuilder::new().reject(self.reject).build(&nfa, partition);
        let tables = Tables::new(&dfa);
        let lookaheads = (0..self.rules.len())
            .map(|id| nfa.lookahead(id as u32).unwrap_or(Lookahead::None))
            .collect();
        Ok(Lexer {
            dfa,
            tables,
            lookaheads,
            uses_line_start: nfa.uses_line_start(),
            uses_trailing: nfa.uses_trailing(),
        })
    }
}

/// Parses one regex into a pattern tree. A `Parser` may only be used once.
fn parse(pattern: &str) -> Result<Pattern, Error> {
    let hir = ParserBuilder::new().multi_line(true).build().parse(pattern)?;
    Ok(Pattern::from_hir(&hir)?)
}

fn parse_rule(rule: &Rule) -> Result<Pattern, Error> {
    let head = parse(&rule.pattern)?;
    let trailing = match &rule.trailing {
        None => return Ok(head),
        Some(trailing) => parse(trailing)?,
    };
    Ok(match head {
        Pattern::Anchor { begin_line, sub, trailing: None } => {
            Pattern::Anchor { begin_line, sub, trailing: Some(Box::new(trailing)) }
        }
        head => Pattern::followed_by(head, trailing),
    })
}

/// A compiled rule set.
#[derive(Clone, Debug)]
pub struct Lexer {
    dfa: Dfa,
    tables: Tables,
    lookaheads: Vec<Lookahead>,
    uses_line_start: bool,
    uses_trailing: bool,
}

impl Lexer {
    /// The compact tables of the minimized DFA.
    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    /// The minimized DFA the tables encode.
    pub fn dfa(&self) -> &Dfa {
        &self.dfa
    }

    /// The trailing-context kind of every rule, indexed by symbol id.
    pub fn rules(&self) -> &[Lookahead] {
        &self.lookaheads
    }

    /// States where a rule could never win because an earlier rule matches
    /// the same text. Always empty with reject semantics.
    pub fn conflicts(&self) -> Vec<Conflict> {
        self.dfa.conflicts()
    }

    /// Whether any rule is anchored at the start of a line. Scanners that
    /// see `false` can ignore the line-start heads.
    pub fn uses_line_start(&self) -> bool {
        self.uses_line_start
    }

    /// Whether any rule has a trailing context.
    pub fn uses_trailing(&self) -> bool {
        self.uses_trailing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_keeps_the_line_anchor() {
        let pattern = parse_rule(&Rule::new("^ab").trailing("c")).unwrap();
        assert!(pattern.begins_line());
        assert_eq!(pattern.lookahead(), Lookahead::TrailingFixed(1));
    }

    #[test]
    fn trailing_rules_build() {
        let lexer = LexerBuilder::new()
            .rule_with(Rule::new("a").trailing("b"))
            .rule_with(Rule::new("^x+").trailing("y+"))
            .rule("z")
            .rule_pattern(Pattern::followed_by(Pattern::literal("q"), Pattern::Eof), &[])
            .build()
            .unwrap();
        assert!(lexer.uses_trailing());
        assert_eq!(
            lexer.rules(),
            &[Lookahead::TrailingFixed(1), Lookahead::Variable, Lookahead::None, Lookahead::TrailingFixed(0)]
        );
    }

    #[test]
    fn anchors_in_trailing_context_are_rejected() {
        let err = LexerBuilder::new().rule_with(Rule::new("a").trailing("^b")).build().unwrap_err();
        assert!(matches!(err, Error::Compile(CompileError::UnsupportedFeature(_))));
    }

    #[test]
    fn syntax_errors_surface() {
        let err = LexerBuilder::new().rule("a(").build().unwrap_err();
        assert!(matches!(err, Error::Syntax(_)));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn state_limit_applies() {
        let err = LexerBuilder::new().state_limit(8).rule("[a-z]{20}").build().unwrap_err();
        assert!(matches!(err, Error::Compile(CompileError::TooComplex)));
    }
}
