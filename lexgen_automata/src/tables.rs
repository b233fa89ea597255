//! Compact encoding of a minimized DFA.
//!
//! `states` holds four integers per state:
//!
//! ```text
//! [ base | default | symbol count | symbol offset ]
//! ```
//!
//! `trans` starts with interleaved `(check, next)` pairs. The transition of
//! state `s` on class `c` lives in pair `base(s) + c` if that pair's check is
//! `s`; a `next` of `-1` there means "no transition". Otherwise the lookup
//! continues in the default state, if any. Default states always have a lower
//! index than the states using them, so the chain is finite. After the pairs
//! comes the symbol area, where symbol lists (sign encoded, see
//! [`Symbol::encode`]) overlap whenever one list ends where another begins.

use crate::classes::{ClassId, ClassTable};
use crate::dfa::{Dfa, State};
use crate::nfa::Symbol;

/// Base of a state that stores no pairs.
pub const NO_TRANSITIONS: i32 = i32::MIN;
/// Encodes a missing default state, a missing target and a free pair.
pub const NONE: i32 = -1;

/// Integers per state in `states`.
pub const STRIDE: usize = 4;

/// Only states with at least this many transitions use or serve as defaults.
const DEFAULT_MIN_TRANSITIONS: usize = 5;

/// A default must cover at least this share (in percent) of a state's
/// transitions.
const DEFAULT_MIN_COVERAGE: usize = 70;

/// Compact transition tables for a DFA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tables {
    states: Vec<i32>,
    trans: Vec<i32>,
    pairs: usize,
    classes: ClassTable,
}

impl Tables {
    /// Encodes a (minimized) DFA.
    pub fn new(dfa: &Dfa) -> Tables {
        let mut comb = Comb::default();
        let mut symbol_area = Vec::new();
        let mut states = Vec::with_capacity(dfa.len() * STRIDE);
        let mut offsets = Vec::with_capacity(dfa.len());

        for (i, state) in dfa.states().iter().enumerate() {
            let default = pick_default(dfa, i);
            let entries: Vec<(ClassId, i32)> = match default {
                Some(d) => differences(state, &dfa.states()[d]),
                None => state.transitions().iter().map(|&(c, t)| (c, t.index() as i32)).collect(),
            };
            let base = if entries.is_empty() { NO_TRANSITIONS } else { comb.place(i as i32, &entries) };
            let symbols: Vec<i32> = state.symbols().iter().map(|s| s.encode()).collect();
            offsets.push(intern_symbols(&mut symbol_area, &symbols));
            states.extend_from_slice(&[base, default.map_or(NONE, |d| d as i32), symbols.len() as i32, 0]);
        }

        let pairs = comb.check.len();
        let mut trans = Vec::with_capacity(2 * pairs + symbol_area.len());
        for (check, next) in comb.check.iter().zip(&comb.next) {
            trans.push(*check);
            trans.push(*next);
        }
        for (row, offset) in states.chunks_mut(STRIDE).zip(offsets) {
            row[3] = (2 * pairs + offset) as i32;
        }
        trans.extend(symbol_area);

        debug!(
            "encoded {} states: {} pairs, {} symbol slots, {} states with defaults",
            dfa.len(),
            pairs,
            trans.len() - 2 * pairs,
            states.chunks(STRIDE).filter(|row| row[1] != NONE).count()
        );
        Tables { states, trans, pairs, classes: dfa.partition().table() }
    }

    /// The per-state rows, [`STRIDE`] integers each.
    pub fn states(&self) -> &[i32] {
        &self.states
    }

    /// Check/next pairs followed by the symbol area.
    pub fn trans(&self) -> &[i32] {
        &self.trans
    }

    /// Maps input characters to the class ids used by `next_state`.
    pub fn class_table(&self) -> &ClassTable {
        &self.classes
    }

    /// Number of DFA states. State `i` is row `i` of `states`.
    pub fn state_count(&self) -> usize {
        self.states.len() / STRIDE
    }

    /// Number of check/next pairs at the front of `trans`.
    pub fn pair_count(&self) -> usize {
        self.pairs
    }

    fn row(&self, state: usize) -> &[i32] {
        &self.states[state * STRIDE..(state + 1) * STRIDE]
    }

    /// The state `state` falls back on for classes it does not store.
    pub fn default_state(&self, state: usize) -> Option<usize> {
        match self.row(state)[1] {
            NONE => None,
            d => Some(d as usize),
        }
    }

    /// The symbols of `state`, winners first, decoded from the symbol area.
    pub fn symbols(&self, state: usize) -> impl Iterator<Item = Symbol> + '_ {
        let row = self.row(state);
        let (len, offset) = (row[2] as usize, row[3] as usize);
        self.trans[offset..offset + len].iter().map(|&v| Symbol::decode(v))
    }

    /// The target of `state` on `class`, following default states.
    pub fn next_state(&self, state: usize, class: ClassId) -> Option<usize> {
        let mut state = state;
        loop {
            let row = self.row(state);
            if row[0] != NO_TRANSITIONS {
                let slot = i64::from(row[0]) + class.index() as i64;
                if slot >= 0 && (slot as usize) < self.pairs {
                    let slot = slot as usize;
                    if self.trans[2 * slot] == state as i32 {
                        return match self.trans[2 * slot + 1] {
                            NONE => None,
                            next => Some(next as usize),
                        };
                    }
                }
            }
            state = self.default_state(state)?;
        }
    }

    /// Like [`Tables::next_state`], mapping `ch` through the class table.
    pub fn lookup_char(&self, state: usize, ch: char) -> Option<usize> {
        self.next_state(state, self.classes.lookup(ch)?)
    }
}

/// Among earlier states with enough transitions, picks the one that agrees
/// with the most of `state`'s transitions, if it agrees with enough of them.
fn pick_default(dfa: &Dfa, state: usize) -> Option<usize> {
    let transitions = dfa.states()[state].transitions();
    if transitions.len() < DEFAULT_MIN_TRANSITIONS {
        return None;
    }
    let mut best: Option<(usize, usize)> = None;
    for (i, candidate) in dfa.states()[..state].iter().enumerate() {
        if candidate.transitions().len() < DEFAULT_MIN_TRANSITIONS {
            continue;
        }
        let covered = transitions.iter().filter(|&&(c, t)| candidate.next(c) == Some(t)).count();
        if best.map_or(true, |(_, most)| covered > most) {
            best = Some((i, covered));
        }
    }
    let (candidate, covered) = best?;
    if covered * 100 >= transitions.len() * DEFAULT_MIN_COVERAGE {
        Some(candidate)
    } else {
        None
    }
}

/// The entries `state` must store on top of `default`: transitions that
/// differ, plus explicit `NONE` for classes only the default has.
fn differences(state: &State, default: &State) -> Vec<(ClassId, i32)> {
    let (ours, theirs) = (state.transitions(), default.transitions());
    let mut entries = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < ours.len() || j < theirs.len() {
        match (ours.get(i), theirs.get(j)) {
            (Some(&(c, t)), Some(&(d, u))) if c == d => {
                if t != u {
                    entries.push((c, t.index() as i32));
                }
                i += 1;
                j += 1;
            }
            (Some(&(c, t)), Some(&(d, _))) if c < d => {
                entries.push((c, t.index() as i32));
                i += 1;
            }
            (Some(&(c, t)), None) => {
                entries.push((c, t.index() as i32));
                i += 1;
            }
            (_, Some(&(d, _))) => {
                entries.push((d, NONE));
                j += 1;
            }
            (None, None) => unreachable!(),
        }
    }
    entries
}

/// Appends `symbols` to the symbol area unless it already occurs there,
/// reusing any tail of the area that matches its beginning. Returns the
/// offset of the list inside the area.
fn intern_symbols(area: &mut Vec<i32>, symbols: &[i32]) -> usize {
    if symbols.is_empty() {
        return 0;
    }
    if let Some(at) = area.windows(symbols.len()).position(|w| w == symbols) {
        return at;
    }
    let overlap = (1..symbols.len()).rev().find(|&k| area.ends_with(&symbols[..k])).unwrap_or(0);
    let offset = area.len() - overlap;
    area.extend_from_slice(&symbols[overlap..]);
    offset
}

/// Row displacement over the check/next pairs.
#[derive(Debug, Default)]
struct Comb {
    check: Vec<i32>,
    next: Vec<i32>,
    /// Every pair below this one is taken.
    first_free: usize,
}

impl Comb {
    /// Places the sorted `entries` of `state` at the first base where all of
    /// them land on free pairs, and returns that base.
    fn place(&mut self, state: i32, entries: &[(ClassId, i32)]) -> i32 {
        let lowest = entries[0].0.index() as i64;
        let mut base = self.first_free as i64 - lowest;
        while !entries.iter().all(|&(c, _)| self.is_free((base + c.index() as i64) as usize)) {
            base += 1;
        }
        for &(c, target) in entries {
            let slot = (base + c.index() as i64) as usize;
            if slot >= self.check.len() {
                self.check.resize(slot + 1, NONE);
                self.next.resize(slot + 1, NONE);
            }
            self.check[slot] = state;
            self.next[slot] = target;
        }
        while !self.is_free(self.first_free) {
            self.first_free += 1;
        }
        base as i32
    }

    fn is_free(&self, slot: usize) -> bool {
        self.check.get(slot).map_or(true, |&owner| owner == NONE)
    }
}
