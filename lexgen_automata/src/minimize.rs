//! Joint minimization of DFA states and character classes.
//!
//! States are minimized first with Moore's partition refinement. Classes are
//! minimized afterwards over the transposed transition table: two classes
//! whose columns agree in every state are indistinguishable and merge.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::classes::{ClassFate, ClassId};
use crate::dfa::{Dfa, StateId};
use crate::nfa::Symbol;

impl Dfa {
    /// Merges equivalent states, then equivalent character classes.
    ///
    /// Head states survive even when equivalent to other states. Running
    /// this on an already minimized DFA changes nothing.
    pub fn minimize(&mut self) {
        #[cfg(feature = "logging")]
        let (states, classes) = (self.states.len(), self.partition.len());
        self.minimize_states();
        self.minimize_classes();
        debug!(
            "minimized DFA: {} -> {} states, {} -> {} classes",
            states,
            self.states.len(),
            classes,
            self.partition.len()
        );
    }

    fn minimize_states(&mut self) {
        let block = self.equivalence_blocks();

        // The lowest index of a block represents it; heads represent
        // themselves.
        let mut rep = HashMap::new();
        let mut keep = Vec::with_capacity(self.states.len());
        let mut new_index = Vec::with_capacity(self.states.len());
        let mut survivors = 0;
        for (i, &b) in block.iter().enumerate() {
            let first = *rep.entry(b).or_insert(i);
            if i < self.heads || first == i {
                keep.push(true);
                new_index.push(StateId::new(survivors));
                survivors += 1;
            } else {
                keep.push(false);
                new_index.push(new_index[first]);
            }
        }
        if survivors == self.states.len() {
            return;
        }

        // Losers recorded on dropped states move to their representative.
        let mut extra: HashMap<usize, Vec<Symbol>> = HashMap::new();
        for (i, &b) in block.iter().enumerate() {
            if !keep[i] && !self.states[i].conflicts.is_empty() {
                extra.entry(rep[&b]).or_default().extend(self.states[i].conflicts.iter().copied());
            }
        }

        let old = std::mem::take(&mut self.states);
        for (i, mut state) in old.into_iter().enumerate() {
            if !keep[i] {
                continue;
            }
            state.id = new_index[i];
            for (_, target) in &mut state.transitions {
                *target = new_index[target.index()];
            }
            if let Some(more) = extra.remove(&i) {
                state.conflicts.extend(more);
                state.conflicts.sort_unstable();
                state.conflicts.dedup();
            }
            self.states.push(state);
        }
        trace!("state minimization kept {} states", self.states.len());
    }

    /// Moore refinement: returns a block number per state such that two
    /// states share a block exactly when no input tells them apart.
    fn equivalence_blocks(&self) -> Vec<usize> {
        let mut block = Vec::with_capacity(self.states.len());
        let mut initial: HashMap<&[Symbol], usize> = HashMap::new();
        for state in &self.states {
            let next = initial.len();
            block.push(*initial.entry(&state.symbols[..]).or_insert(next));
        }
        let mut count = initial.len();

        loop {
            let mut signatures: HashMap<(usize, Vec<(ClassId, usize)>), usize> = HashMap::new();
            let mut refined = Vec::with_capacity(block.len());
            for (i, state) in self.states.iter().enumerate() {
                let targets = state.transitions.iter().map(|&(class, t)| (class, block[t.index()])).collect();
                let next = signatures.len();
                refined.push(*signatures.entry((block[i], targets)).or_insert(next));
            }
            block = refined;
            // Blocks only ever split, so an unchanged count is a fixed point.
            if signatures.len() == count {
                return block;
            }
            count = signatures.len();
        }
    }

    fn minimize_classes(&mut self) {
        let classes = self.partition.len();
        let mut columns = vec![vec![None; self.states.len()]; classes];
        for (i, state) in self.states.iter().enumerate() {
            for &(class, target) in &state.transitions {
                columns[class.index()][i] = Some(target);
            }
        }

        let mut fates = vec![ClassFate::Keep; classes];
        let mut seen: HashMap<&[Option<StateId>], ClassId> = HashMap::new();
        for (i, column) in columns.iter().enumerate() {
            let class = ClassId::new(i);
            if !self.partition.is_referenced(class) {
                fates[i] = ClassFate::Drop;
                continue;
            }
            match seen.entry(&column[..]) {
                Entry::Occupied(rep) => fates[i] = ClassFate::MergeInto(*rep.get()),
                Entry::Vacant(slot) => {
                    slot.insert(class);
                }
            }
        }
        if fates.iter().all(|fate| *fate == ClassFate::Keep) {
            return;
        }

        let map = self.partition.merge(&fates);
        for state in &mut self.states {
            state.transitions = state
                .transitions
                .iter()
                .filter(|(class, _)| fates[class.index()] == ClassFate::Keep)
                .filter_map(|&(class, target)| Some((map[class.index()]?, target)))
                .collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::Compiler;
    use crate::dfa::{Dfa, DfaBuilder, StateId};
    use crate::nfa::Symbol;
    use crate::pattern::Pattern;

    fn build(rules: &[Pattern], minimize: bool) -> Dfa {
        let mut compiler = Compiler::new(1);
        for (i, rule) in rules.iter().enumerate() {
            compiler.add_rule(rule, i as u32, &[]).unwrap();
        }
        let (nfa, partition) = compiler.finish();
        let builder = DfaBuilder::new();
        if minimize {
            builder.build(&nfa, partition)
        } else {
            builder.construct(&nfa, partition)
        }
    }

    fn accepts(dfa: &Dfa, input: &str) -> Option<Symbol> {
        let mut state = dfa.head(0, false);
        for ch in input.chars() {
            state = dfa.next_state(state, dfa.class_of(ch)?)?;
        }
        dfa[state].winner()
    }

    #[test]
    fn equivalent_states_merge() {
        let rules = [Pattern::Alternation(vec![Pattern::literal("ab"), Pattern::literal("cb")])];
        let raw = build(&rules, false);
        let dfa = build(&rules, true);
        assert!(dfa.len() < raw.len());
        // two heads, one state after `a` or `c`, one accepting state
        assert_eq!(dfa.len(), 4);
        for input in ["ab", "cb"] {
            assert_eq!(accepts(&dfa, input), Some(Symbol::Accept(0)));
        }
        assert_eq!(accepts(&dfa, "a"), None);
        assert_eq!(accepts(&dfa, "bb"), None);
    }

    #[test]
    fn equivalent_classes_merge() {
        let rules = [Pattern::Alternation(vec![Pattern::literal("ax"), Pattern::literal("bx")])];
        let dfa = build(&rules, true);
        assert_eq!(dfa.class_of('a'), dfa.class_of('b'));
        assert_ne!(dfa.class_of('a'), dfa.class_of('x'));
        // The unreferenced catch-all is gone.
        assert_eq!(dfa.partition().len(), 2);
        assert_eq!(dfa.class_of('z'), None);
        assert_eq!(accepts(&dfa, "bx"), Some(Symbol::Accept(0)));
    }

    #[test]
    fn heads_survive() {
        let dfa = build(&[Pattern::literal("x")], true);
        assert_eq!(dfa.heads(), 2);
        assert_eq!(dfa[StateId::new(0)].transitions(), dfa[StateId::new(1)].transitions());
        assert_eq!(dfa.len(), 3);
    }

    #[test]
    fn minimize_is_idempotent() {
        let rules = [
            Pattern::literal("if"),
            Pattern::literal("in"),
            Pattern::repeat(Pattern::class(&[('a', 'z')]), 1, None),
            Pattern::repeat(Pattern::class(&[('0', '9')]), 1, None),
        ];
        let dfa = build(&rules, true);
        let mut again = dfa.clone();
        again.minimize();
        assert_eq!(again.states(), dfa.states());
        assert_eq!(again.partition().len(), dfa.partition().len());
    }

    #[test]
    fn transitions_stay_sorted_and_in_range() {
        let rules = [
            Pattern::literal("while"),
            Pattern::literal("when"),
            Pattern::repeat(Pattern::class(&[('a', 'z'), ('_', '_')]), 1, None),
        ];
        let dfa = build(&rules, true);
        for state in dfa.states() {
            assert!(state.transitions().windows(2).all(|w| w[0].0 < w[1].0));
            for &(class, target) in state.transitions() {
                assert!(class.index() < dfa.partition().len());
                assert!(target.index() < dfa.len());
            }
        }
    }
}
