use crate::classes::ClassSetId;
use crate::pattern::Lookahead;
use std::fmt;
use std::ops::Index;

/// A state ID in the NFA
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

/// A symbol carried by an accepting state.
///
/// Every `Accept` orders before every `TrailHead`, and within a variant
/// symbols order by id, so the lowest `Accept` in a sorted list is the rule
/// defined first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Symbol {
    /// The rule with this id matched.
    Accept(u32),
    /// The head of the rule with this id matched; its trailing context may
    /// follow.
    TrailHead(u32),
}

impl Symbol {
    /// The sign encoding used by compact tables: `Accept(i)` is `i`,
    /// `TrailHead(i)` is `-(i + 1)`.
    pub fn encode(self) -> i32 {
        match self {
            Symbol::Accept(id) => id as i32,
            Symbol::TrailHead(id) => -(id as i32) - 1,
        }
    }

    /// Inverse of [`Symbol::encode`].
    pub fn decode(value: i32) -> Symbol {
        if value >= 0 {
            Symbol::Accept(value as u32)
        } else {
            Symbol::TrailHead((-(value + 1)) as u32)
        }
    }
}

/// Where a state sits relative to a rule's trailing context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Role {
    #[default]
    Normal,
    /// End of a rule's head, where its trailing context begins.
    TrailHead,
    /// End of a rule's trailing context.
    Trailing,
}

/// A Thompson NFA state: any number of epsilon edges plus at most one edge
/// consuming a class combination.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct State {
    pub epsilon: Vec<StateId>,
    pub edge: Option<(ClassSetId, StateId)>,
    pub role: Role,
    pub accept: Option<Symbol>,
}

/// Fragment of an NFA with start and end states
#[derive(Debug, Clone, Copy)]
pub struct Fragment {
    pub start: StateId,
    pub end: StateId,
}

/// The NFA of a whole rule set.
///
/// The first `2 * contexts` states are the heads: `head(ctx, false)` is
/// where scanning starts in the middle of a line and `head(ctx, true)` where
/// it starts at the beginning of one.
#[derive(Debug, Clone, PartialEq)]
pub struct Nfa {
    states: Vec<State>,
    contexts: usize,
    pub(crate) lookaheads: Vec<Option<Lookahead>>,
    pub(crate) uses_line_start: bool,
    pub(crate) uses_trailing: bool,
}

impl Nfa {
    /// Create an NFA with only the head states of `contexts` contexts
    pub fn new(contexts: usize) -> Self {
        Self {
            states: vec![State::default(); contexts * 2],
            contexts,
            lookaheads: Vec::new(),
            uses_line_start: false,
            uses_trailing: false,
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub fn contexts(&self) -> usize {
        self.contexts
    }

    /// Number of head states.
    pub fn head_count(&self) -> usize {
        self.contexts * 2
    }

    /// The head where scanning in `context` starts, at the beginning of a
    /// line or in the middle of one.
    pub fn head(&self, context: usize, line_start: bool) -> StateId {
        assert!(context < self.contexts, "context {} out of range", context);
        StateId::new(context * 2 + usize::from(line_start))
    }

    /// Whether any rule is anchored at the start of a line.
    pub fn uses_line_start(&self) -> bool {
        self.uses_line_start
    }

    /// Whether any rule has a trailing context.
    pub fn uses_trailing(&self) -> bool {
        self.uses_trailing
    }

    /// The trailing-context kind of the rule with this symbol id, if a rule
    /// with that id was compiled.
    pub fn lookahead(&self, symbol: u32) -> Option<Lookahead> {
        self.lookaheads.get(symbol as usize).copied().flatten()
    }

    /// Add a new state and return its ID
    pub fn add_state(&mut self, state: State) -> StateId {
        let id = StateId::new(self.states.len());
        self.states.push(state);
        id
    }

    /// Create a state without edges
    pub fn empty(&mut self) -> StateId {
        self.add_state(State::default())
    }

    /// Connect two states with an epsilon transition
    pub fn connect(&mut self, from: StateId, to: StateId) {
        self.states[from.index()].epsilon.push(to);
    }

    /// Set the consuming edge of a state
    pub fn set_edge(&mut self, from: StateId, set: ClassSetId, to: StateId) {
        let state = &mut self.states[from.index()];
        debug_assert!(state.edge.is_none(), "state {} already has a consuming edge", from);
        state.edge = Some((set, to));
    }

    pub fn mark(&mut self, id: StateId, role: Role, accept: Symbol) {
        let state = &mut self.states[id.index()];
        state.role = role;
        state.accept = Some(accept);
    }

    /// Get the epsilon closure of a set of states, sorted by id
    pub fn epsilon_closure(&self, states: &[StateId]) -> Vec<StateId> {
        let mut seen = vec![false; self.states.len()];
        let mut closure = Vec::with_capacity(states.len());
        let mut stack: Vec<StateId> = states.to_vec();

        while let Some(id) = stack.pop() {
            if std::mem::replace(&mut seen[id.index()], true) {
                continue;
            }
            closure.push(id);
            for &next in &self.states[id.index()].epsilon {
                if !seen[next.index()] {
                    stack.push(next);
                }
            }
        }

        closure.sort_unstable();
        closure
    }
}

impl Index<StateId> for Nfa {
    type Output = State;

    #[inline]
    fn index(&self, id: StateId) -> &State {
        &self.states[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_order_puts_accepts_first() {
        let mut symbols = vec![Symbol::TrailHead(0), Symbol::Accept(3), Symbol::Accept(1), Symbol::TrailHead(2)];
        symbols.sort();
        assert_eq!(symbols, vec![Symbol::Accept(1), Symbol::Accept(3), Symbol::TrailHead(0), Symbol::TrailHead(2)]);
    }

    #[test]
    fn symbol_encoding_keeps_zero_distinct() {
        assert_eq!(Symbol::Accept(0).encode(), 0);
        assert_eq!(Symbol::TrailHead(0).encode(), -1);
        assert_eq!(Symbol::TrailHead(7).encode(), -8);
        for symbol in [Symbol::Accept(0), Symbol::TrailHead(0), Symbol::Accept(9), Symbol::TrailHead(9)] {
            assert_eq!(Symbol::decode(symbol.encode()), symbol);
        }
    }

    #[test]
    fn closure_follows_epsilon_chains_and_cycles() {
        let mut nfa = Nfa::new(1);
        let a = nfa.empty();
        let b = nfa.empty();
        let c = nfa.empty();
        let head = nfa.head(0, false);
        nfa.connect(head, a);
        nfa.connect(a, b);
        nfa.connect(b, a);
        nfa.connect(c, head);
        assert_eq!(nfa.epsilon_closure(&[head]), vec![head, a, b]);
        assert_eq!(nfa.epsilon_closure(&[c]), vec![head, a, b, c]);
    }

    #[test]
    fn heads_come_first() {
        let nfa = Nfa::new(3);
        assert_eq!(nfa.head_count(), 6);
        assert_eq!(nfa.head(0, false), StateId::new(0));
        assert_eq!(nfa.head(0, true), StateId::new(1));
        assert_eq!(nfa.head(2, true), StateId::new(5));
    }
}
