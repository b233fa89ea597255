//! Subset construction.
//!
//! Each DFA state stands for the epsilon closure of a set of NFA states.
//! States are created breadth first from the heads, one per NFA head, and
//! deduplicated through a cache keyed by the sorted NFA state set. The
//! finished automaton is always minimized (see [`crate::minimize`]).

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Index;

use crate::classes::{ClassId, Partition};
use crate::nfa::{self, Nfa, Symbol};

/// Index of a DFA state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(u32);

impl StateId {
    #[inline]
    pub fn new(index: usize) -> StateId {
        debug_assert!(index <= u32::MAX as usize);
        StateId(index as u32)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A DFA state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State {
    pub(crate) id: StateId,
    /// Sorted by class.
    pub(crate) transitions: Vec<(ClassId, StateId)>,
    /// Sorted; see [`Symbol`] for the order.
    pub(crate) symbols: Vec<Symbol>,
    /// Rules that also matched here but lost to the winner.
    pub(crate) conflicts: Vec<Symbol>,
}

impl State {
    pub fn id(&self) -> StateId {
        self.id
    }

    pub fn transitions(&self) -> &[(ClassId, StateId)] {
        &self.transitions
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn conflicts(&self) -> &[Symbol] {
        &self.conflicts
    }

    /// The rule accepted in this state, if any.
    pub fn winner(&self) -> Option<Symbol> {
        self.symbols.first().copied().filter(|s| matches!(s, Symbol::Accept(_)))
    }

    pub fn next(&self, class: ClassId) -> Option<StateId> {
        self.transitions.binary_search_by_key(&class, |&(c, _)| c).ok().map(|i| self.transitions[i].1)
    }
}

/// Rules that matched the same text in one state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub state: StateId,
    pub winner: Symbol,
    pub losers: Vec<Symbol>,
}

/// A minimized DFA over character classes.
///
/// The first [`Dfa::heads`] states are the heads, laid out like the NFA's:
/// `head(ctx, line_start) == 2 * ctx + line_start`.
#[derive(Debug, Clone)]
pub struct Dfa {
    pub(crate) states: Vec<State>,
    pub(crate) heads: usize,
    pub(crate) partition: Partition,
}

impl Dfa {
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    /// Number of head states.
    pub fn heads(&self) -> usize {
        self.heads
    }

    /// The head state of `context`; see [`Nfa::head`].
    pub fn head(&self, context: usize, line_start: bool) -> StateId {
        let head = context * 2 + usize::from(line_start);
        assert!(head < self.heads, "context {} out of range", context);
        StateId::new(head)
    }

    /// The character classes the transitions are keyed by.
    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    /// The class of `ch`, or `None` when no rule can consume it.
    pub fn class_of(&self, ch: char) -> Option<ClassId> {
        self.partition.class_of(ch)
    }

    /// The target of `from` on `class`, if it has a transition there.
    pub fn next_state(&self, from: StateId, class: ClassId) -> Option<StateId> {
        self[from].next(class)
    }

    /// Every state where more than one rule matched, for diagnostics.
    pub fn conflicts(&self) -> Vec<Conflict> {
        self.states
            .iter()
            .filter(|state| !state.conflicts.is_empty())
            .filter_map(|state| {
                Some(Conflict { state: state.id, winner: state.winner()?, losers: state.conflicts.clone() })
            })
            .collect()
    }
}

impl Index<StateId> for Dfa {
    type Output = State;

    #[inline]
    fn index(&self, id: StateId) -> &State {
        &self.states[id.index()]
    }
}

/// Builds minimized DFAs from compiled NFAs.
#[derive(Debug, Clone, Default)]
pub struct DfaBuilder {
    reject: bool,
}

impl DfaBuilder {
    pub fn new() -> DfaBuilder {
        DfaBuilder::default()
    }

    /// Keep every rule matched in a state instead of only the first one.
    pub fn reject(mut self, yes: bool) -> DfaBuilder {
        self.reject = yes;
        self
    }

    /// Runs subset construction over `nfa`, whose edges refer to
    /// `partition`, then minimizes the result.
    pub fn build(&self, nfa: &Nfa, partition: Partition) -> Dfa {
        let mut dfa = self.construct(nfa, partition);
        dfa.minimize();
        dfa
    }

    pub(crate) fn construct(&self, nfa: &Nfa, partition: Partition) -> Dfa {
        let mut builder = Construction {
            nfa,
            partition: &partition,
            reject: self.reject,
            states: Vec::new(),
            sets: Vec::new(),
            cache: HashMap::new(),
        };
        for head in 0..nfa.head_count() {
            let closure = nfa.epsilon_closure(&[nfa::StateId::new(head)]);
            let id = builder.push(closure.clone().into_boxed_slice());
            builder.cache.entry(closure.into_boxed_slice()).or_insert(id);
        }

        let mut next = 0;
        while next < builder.states.len() {
            builder.expand(StateId::new(next));
            next += 1;
        }
        debug!("subset construction produced {} DFA states from {} NFA states", builder.states.len(), nfa.len());

        let states = builder.states;
        Dfa { states, heads: nfa.head_count(), partition }
    }
}

struct Construction<'a> {
    nfa: &'a Nfa,
    partition: &'a Partition,
    reject: bool,
    states: Vec<State>,
    /// The NFA states behind each DFA state.
    sets: Vec<Box<[nfa::StateId]>>,
    cache: HashMap<Box<[nfa::StateId]>, StateId>,
}

impl Construction<'_> {
    fn push(&mut self, set: Box<[nfa::StateId]>) -> StateId {
        let id = StateId::new(self.states.len());
        let mut symbols: Vec<Symbol> = set.iter().filter_map(|&n| self.nfa[n].accept).collect();
        symbols.sort_unstable();
        symbols.dedup();
        let mut conflicts = Vec::new();
        if !self.reject {
            let accepts = symbols.iter().take_while(|s| matches!(s, Symbol::Accept(_))).count();
            if accepts > 1 {
                conflicts = symbols.drain(1..accepts).collect();
            }
        }
        trace!("DFA state {} = NFA {:?}, symbols {:?}", id, set, symbols);
        self.states.push(State { id, transitions: Vec::new(), symbols, conflicts });
        self.sets.push(set);
        id
    }

    fn expand(&mut self, id: StateId) {
        let mut moves: BTreeMap<ClassId, Vec<nfa::StateId>> = BTreeMap::new();
        for &n in self.sets[id.index()].iter() {
            if let Some((set, target)) = self.nfa[n].edge {
                for &class in self.partition.set(set) {
                    moves.entry(class).or_default().push(target);
                }
            }
        }

        let mut transitions = Vec::with_capacity(moves.len());
        for (class, targets) in moves {
            let closure = self.nfa.epsilon_closure(&targets).into_boxed_slice();
            let target = match self.cache.get(&closure) {
                Some(&target) => target,
                None => {
                    let target = self.push(closure.clone());
                    self.cache.insert(closure, target);
                    target
                }
            };
            transitions.push((class, target));
        }
        self.states[id.index()].transitions = transitions;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use crate::pattern::Pattern;

    fn compile(rules: &[Pattern]) -> (Nfa, Partition) {
        let mut compiler = Compiler::new(1);
        for (i, rule) in rules.iter().enumerate() {
            compiler.add_rule(rule, i as u32, &[]).unwrap();
        }
        compiler.finish()
    }

    fn word() -> Pattern {
        Pattern::repeat(Pattern::class(&[('a', 'z')]), 1, None)
    }

    fn walk(dfa: &Dfa, input: &str) -> Option<StateId> {
        let mut state = dfa.head(0, false);
        for ch in input.chars() {
            state = dfa.next_state(state, dfa.class_of(ch)?)?;
        }
        Some(state)
    }

    #[test]
    fn set_equal_closures_share_one_state() {
        let (nfa, partition) = compile(&[Pattern::Concat(vec![Pattern::class(&[('a', 'b')]), Pattern::literal("c")]), Pattern::literal("za")]);
        let dfa = DfaBuilder::new().construct(&nfa, partition);
        let head = dfa.head(0, false);
        let a = dfa.next_state(head, dfa.class_of('a').unwrap()).unwrap();
        let b = dfa.next_state(head, dfa.class_of('b').unwrap()).unwrap();
        assert_ne!(dfa.class_of('a'), dfa.class_of('b'));
        assert_eq!(a, b);
        // two heads, after [ab], after z, after [ab]c, after za
        assert_eq!(dfa.len(), 6);
    }

    #[test]
    fn heads_are_distinct_even_when_equal() {
        let (nfa, partition) = compile(&[Pattern::literal("x")]);
        let dfa = DfaBuilder::new().construct(&nfa, partition);
        assert_eq!(dfa[StateId::new(0)].transitions(), dfa[StateId::new(1)].transitions());
        assert_eq!(dfa.heads(), 2);
    }

    #[test]
    fn earliest_rule_wins() {
        let (nfa, partition) = compile(&[Pattern::literal("if"), word()]);
        let dfa = DfaBuilder::new().build(&nfa, partition);
        let state = &dfa[walk(&dfa, "if").unwrap()];
        assert_eq!(state.symbols(), &[Symbol::Accept(0)]);
        assert_eq!(state.conflicts(), &[Symbol::Accept(1)]);
        let conflicts = dfa.conflicts();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].winner, Symbol::Accept(0));

        let state = &dfa[walk(&dfa, "is").unwrap()];
        assert_eq!(state.symbols(), &[Symbol::Accept(1)]);
    }

    #[test]
    fn reject_keeps_every_rule() {
        let (nfa, partition) = compile(&[Pattern::literal("if"), word()]);
        let dfa = DfaBuilder::new().reject(true).build(&nfa, partition);
        let state = &dfa[walk(&dfa, "if").unwrap()];
        assert_eq!(state.symbols(), &[Symbol::Accept(0), Symbol::Accept(1)]);
        assert!(state.conflicts().is_empty());
        assert!(dfa.conflicts().is_empty());
    }

    #[test]
    fn trail_heads_follow_accepts() {
        let (nfa, partition) = compile(&[
            Pattern::literal("ab"),
            Pattern::followed_by(Pattern::literal("ab"), Pattern::literal("c")),
        ]);
        let dfa = DfaBuilder::new().build(&nfa, partition);
        let state = &dfa[walk(&dfa, "ab").unwrap()];
        assert_eq!(state.symbols(), &[Symbol::Accept(0), Symbol::TrailHead(1)]);
        assert_eq!(state.winner(), Some(Symbol::Accept(0)));
        let state = &dfa[walk(&dfa, "abc").unwrap()];
        assert_eq!(state.symbols(), &[Symbol::Accept(1)]);
    }
}
