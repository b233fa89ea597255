use crate::classes::{Partition, EOF_CHAR};
use crate::nfa::{Fragment, Nfa, Role, State, StateId, Symbol};
use crate::pattern::{Locale, Pattern};
use crate::{CompileError, CompileResult};
use regex_syntax::hir::{ClassUnicode, ClassUnicodeRange};

/// Default upper bound on the number of NFA states.
const DEFAULT_STATE_LIMIT: usize = 1 << 20;

/// Compiler that converts rule patterns into one Thompson NFA
///
/// Every rule is attached to the head states of the contexts it belongs to.
/// Edges are labeled with class combinations handed out by the compiler's
/// [`Partition`], which the DFA builder takes over once all rules are in.
pub struct Compiler {
    nfa: Nfa,
    partition: Partition,
    state_limit: usize,
    /// Set while compiling a trailing context.
    in_trailing: bool,
}

impl Compiler {
    /// Create a compiler for rules spread over `contexts` start contexts
    pub fn new(contexts: usize) -> Self {
        assert!(contexts > 0, "at least one context is required");
        Self { nfa: Nfa::new(contexts), partition: Partition::new(), state_limit: DEFAULT_STATE_LIMIT, in_trailing: false }
    }

    /// Limit the number of NFA states; exceeding it fails with
    /// [`CompileError::TooComplex`].
    pub fn state_limit(mut self, limit: usize) -> Self {
        self.state_limit = limit;
        self
    }

    /// Compile one rule and attach it to `contexts` (every context when
    /// empty). `symbol` is the rule's id; lower ids win ties.
    pub fn add_rule(&mut self, pattern: &Pattern, symbol: u32, contexts: &[usize]) -> CompileResult<()> {
        let (begin_line, sub, trailing) = match pattern {
            Pattern::Anchor { begin_line, sub, trailing } => (*begin_line, &**sub, trailing.as_deref()),
            other => (false, other, None),
        };

        let head = self.compile_pattern(sub)?;
        match trailing {
            Some(trailing) => {
                self.nfa.mark(head.end, Role::TrailHead, Symbol::TrailHead(symbol));
                self.in_trailing = true;
                let tail = self.compile_pattern(trailing);
                self.in_trailing = false;
                let tail = tail?;
                self.nfa.connect(head.end, tail.start);
                self.nfa.mark(tail.end, Role::Trailing, Symbol::Accept(symbol));
                self.nfa.uses_trailing = true;
            }
            None => self.nfa.mark(head.end, Role::Normal, Symbol::Accept(symbol)),
        }

        let all: Vec<usize>;
        let contexts = if contexts.is_empty() {
            all = (0..self.nfa.contexts()).collect();
            &all[..]
        } else {
            contexts
        };
        for &context in contexts {
            self.nfa.connect(self.nfa.head(context, true), head.start);
            if !begin_line {
                self.nfa.connect(self.nfa.head(context, false), head.start);
            }
        }
        self.nfa.uses_line_start |= begin_line;

        let slot = symbol as usize;
        if self.nfa.lookaheads.len() <= slot {
            self.nfa.lookaheads.resize(slot + 1, None);
        }
        self.nfa.lookaheads[slot] = Some(pattern.lookahead());

        trace!("compiled rule {} into {} NFA states so far", symbol, self.nfa.len());
        Ok(())
    }

    /// Finish compilation, handing out the NFA and the class partition
    pub fn finish(self) -> (Nfa, Partition) {
        debug!("NFA has {} states and {} character classes", self.nfa.len(), self.partition.len());
        (self.nfa, self.partition)
    }

    /// Compile a pattern node to an NFA fragment
    fn compile_pattern(&mut self, pattern: &Pattern) -> CompileResult<Fragment> {
        match pattern {
            Pattern::Alternation(alts) => self.compile_alternation(alts),
            Pattern::Concat(items) => self.compile_concat(items),
            Pattern::Repeat { sub, min, max } => self.compile_repetition(sub, *min, *max),
            Pattern::Literal { text, case_insensitive, locale } => self.compile_literal(text, *case_insensitive, *locale),
            Pattern::Class(class) => self.compile_class(class),
            Pattern::Anchor { .. } => {
                Err(CompileError::UnsupportedFeature("anchor or trailing context below the top of a rule".to_string()))
            }
            Pattern::Eof => self.compile_eof(),
        }
    }

    fn state(&mut self) -> CompileResult<StateId> {
        if self.nfa.len() >= self.state_limit {
            return Err(CompileError::TooComplex);
        }
        Ok(self.nfa.add_state(State::default()))
    }

    /// Compile empty match
    fn compile_empty(&mut self) -> CompileResult<Fragment> {
        let start = self.state()?;
        Ok(Fragment { start, end: start })
    }

    /// Compile a literal, one state per character
    fn compile_literal(&mut self, text: &str, case_insensitive: bool, locale: Locale) -> CompileResult<Fragment> {
        let start = self.state()?;
        let mut end = start;
        for ch in text.chars() {
            let set = match locale.fold(ch).filter(|_| case_insensitive) {
                Some(other) => {
                    let pair = ClassUnicode::new([ClassUnicodeRange::new(ch, ch), ClassUnicodeRange::new(other, other)]);
                    self.partition.classify(&pair)
                }
                None => self.partition.classify_char(ch),
            };
            let next = self.state()?;
            self.nfa.set_edge(end, set, next);
            end = next;
        }
        Ok(Fragment { start, end })
    }

    /// Compile character class
    fn compile_class(&mut self, class: &ClassUnicode) -> CompileResult<Fragment> {
        let set = self.partition.classify(class);
        let start = self.state()?;
        let end = self.state()?;
        self.nfa.set_edge(start, set, end);
        Ok(Fragment { start, end })
    }

    /// End of input is an edge on the sentinel inside a trailing context and
    /// matches nothing anywhere else
    fn compile_eof(&mut self) -> CompileResult<Fragment> {
        if !self.in_trailing {
            return self.compile_empty();
        }
        let set = self.partition.classify_char(EOF_CHAR);
        let start = self.state()?;
        let end = self.state()?;
        self.nfa.set_edge(start, set, end);
        Ok(Fragment { start, end })
    }

    fn compile_concat(&mut self, items: &[Pattern]) -> CompileResult<Fragment> {
        let mut items = items.iter();
        let first = match items.next() {
            Some(first) => self.compile_pattern(first)?,
            None => return self.compile_empty(),
        };
        let mut end = first.end;
        for item in items {
            let fragment = self.compile_pattern(item)?;
            self.nfa.connect(end, fragment.start);
            end = fragment.end;
        }
        Ok(Fragment { start: first.start, end })
    }

    fn compile_alternation(&mut self, alts: &[Pattern]) -> CompileResult<Fragment> {
        let start = self.state()?;
        let end = self.state()?;
        for alt in alts {
            let fragment = self.compile_pattern(alt)?;
            self.nfa.connect(start, fragment.start);
            self.nfa.connect(fragment.end, end);
        }
        Ok(Fragment { start, end })
    }

    /// Compile `sub{min,max}` by unrolling copies of `sub`.
    ///
    /// At least one copy is always built. After the k-th copy (and before the
    /// first when `min` is zero) an exit leads to the shared end once
    /// `k >= min`. An unbounded repetition loops the last copy onto itself.
    fn compile_repetition(&mut self, sub: &Pattern, min: u32, max: Option<u32>) -> CompileResult<Fragment> {
        let start = self.state()?;
        let end = self.state()?;

        if max == Some(0) {
            // Built for its classes only; nothing reaches it.
            self.compile_pattern(sub)?;
            self.nfa.connect(start, end);
            return Ok(Fragment { start, end });
        }

        let copies = max.unwrap_or(min).max(1);
        if min == 0 {
            self.nfa.connect(start, end);
        }
        let mut current = start;
        let mut last = None;
        for k in 1..=copies {
            let copy = self.compile_pattern(sub)?;
            self.nfa.connect(current, copy.start);
            if k >= min {
                self.nfa.connect(copy.end, end);
            }
            current = copy.end;
            last = Some(copy);
        }
        if max.is_none() {
            if let Some(last) = last {
                self.nfa.connect(last.end, last.start);
            }
        }
        Ok(Fragment { start, end })
    }
}
