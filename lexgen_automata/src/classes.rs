//! Character classes: the alphabet of the DFA.
//!
//! Every code point referenced by any rule belongs to exactly one class, and
//! two code points share a class only if no rule can tell them apart. Each
//! NFA edge asks for an arbitrary set of code points; the partition answers
//! with a [`ClassSetId`], a memoized combination of classes whose union is
//! exactly the requested set. Requests that cut through an existing class
//! split it, and both halves stay members of every combination the original
//! belonged to, so previously handed out combinations remain exact.

use std::collections::HashMap;
use std::mem;

use regex_syntax::hir::{Class, ClassUnicode, ClassUnicodeRange, HirKind};

/// The dedicated end-of-input character. `U+FFFF` is a Unicode noncharacter
/// and never appears in well-formed text.
pub const EOF_CHAR: char = '\u{FFFF}';

/// Two-letter Unicode general categories, in the order the class table
/// reports them. `Cs` is left out: surrogates are not scalar values.
const GENERAL_CATEGORIES: &[&str] = &[
    "Lu", "Ll", "Lt", "Lm", "Lo", "Mn", "Mc", "Me", "Nd", "Nl", "No", "Pc", "Pd", "Ps", "Pe", "Pi", "Pf",
    "Po", "Sm", "Sc", "Sk", "So", "Zs", "Zl", "Zp", "Cc", "Cf", "Co", "Cn",
];

/// Index of a character class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u32);

impl ClassId {
    #[inline]
    pub fn new(index: usize) -> ClassId {
        debug_assert!(index <= u32::MAX as usize);
        ClassId(index as u32)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a memoized class combination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassSetId(u32);

impl ClassSetId {
    #[inline]
    fn new(index: usize) -> ClassSetId {
        ClassSetId(index as u32)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
struct CharClass {
    chars: ClassUnicode,
    /// Every combination this class was folded into.
    containers: Vec<ClassSetId>,
}

/// What happens to a class when the partition is merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassFate {
    Keep,
    /// Fold the class into an earlier class that is kept.
    MergeInto(ClassId),
    /// Forget the class. Its code points no longer belong to any class.
    Drop,
}

/// A partition of the code points referenced by a rule set into disjoint
/// classes.
#[derive(Debug, Clone)]
pub struct Partition {
    classes: Vec<CharClass>,
    /// Member classes of each combination, sorted.
    sets: Vec<Vec<ClassId>>,
    by_char: HashMap<char, ClassSetId>,
    by_ranges: HashMap<Vec<(char, char)>, ClassSetId>,
}

impl Partition {
    /// Creates a partition holding a single catch-all class with every code
    /// point. The catch-all shrinks as requests split pieces off it.
    pub fn new() -> Partition {
        let all = ClassUnicode::new([ClassUnicodeRange::new('\0', char::MAX)]);
        Partition {
            classes: vec![CharClass { chars: all, containers: Vec::new() }],
            sets: Vec::new(),
            by_char: HashMap::new(),
            by_ranges: HashMap::new(),
        }
    }

    /// Number of classes.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// The code points of a class.
    pub fn chars(&self, class: ClassId) -> &ClassUnicode {
        &self.classes[class.index()].chars
    }

    /// The combinations a class was folded into. Empty only for a catch-all
    /// class no request ever covered in full.
    pub fn containers(&self, class: ClassId) -> &[ClassSetId] {
        &self.classes[class.index()].containers
    }

    /// Whether any NFA edge can consume the class.
    pub fn is_referenced(&self, class: ClassId) -> bool {
        !self.classes[class.index()].containers.is_empty()
    }

    /// The member classes of a combination.
    pub fn set(&self, set: ClassSetId) -> &[ClassId] {
        &self.sets[set.index()]
    }

    pub fn classes(&self) -> impl Iterator<Item = (ClassId, &ClassUnicode)> + '_ {
        self.classes.iter().enumerate().map(|(i, class)| (ClassId::new(i), &class.chars))
    }

    /// Finds the class that contains `ch`.
    pub fn class_of(&self, ch: char) -> Option<ClassId> {
        self.classes.iter().position(|class| contains(&class.chars, ch)).map(ClassId::new)
    }

    /// Returns the combination consisting of exactly `ch`.
    pub fn classify_char(&mut self, ch: char) -> ClassSetId {
        if let Some(&set) = self.by_char.get(&ch) {
            return set;
        }
        let key = vec![(ch, ch)];
        let set = match self.by_ranges.get(&key) {
            Some(&set) => set,
            None => {
                let class = match self.class_of(ch) {
                    Some(class) => class,
                    None => panic!("code point {:?} is not covered by any character class", ch),
                };
                let class = if is_single(&self.classes[class.index()].chars) {
                    class
                } else {
                    let single = ClassUnicode::new([ClassUnicodeRange::new(ch, ch)]);
                    self.split(class, single)
                };
                self.intern(key, vec![class])
            }
        };
        self.by_char.insert(ch, set);
        set
    }

    /// Returns the combination whose union is the requested code points.
    ///
    /// Classes fully inside the request join the combination as they are;
    /// classes straddling its border are split first. Code points outside
    /// every class are ignored.
    pub fn classify(&mut self, request: &ClassUnicode) -> ClassSetId {
        let key = ranges_key(request);
        if let Some(&set) = self.by_ranges.get(&key) {
            return set;
        }
        let mut members = Vec::new();
        // Classes created by splitting below lie inside the request already.
        for i in 0..self.classes.len() {
            let mut overlap = self.classes[i].chars.clone();
            overlap.intersect(request);
            if overlap.ranges().is_empty() {
                continue;
            }
            if overlap == self.classes[i].chars {
                members.push(ClassId::new(i));
            } else {
                members.push(self.split(ClassId::new(i), overlap));
            }
        }
        members.sort();
        trace!("classified {:?} into {} classes", key, members.len());
        self.intern(key, members)
    }

    /// Carves `part` out of `class`. The original index keeps the remainder
    /// and the returned class holds `part`; both belong to every combination
    /// the original belonged to.
    fn split(&mut self, class: ClassId, part: ClassUnicode) -> ClassId {
        let source = &mut self.classes[class.index()];
        source.chars.difference(&part);
        debug_assert!(!source.chars.ranges().is_empty(), "split must leave a remainder");
        let containers = source.containers.clone();
        let new = ClassId::new(self.classes.len());
        for &set in &containers {
            // `new` is the largest id, so member lists stay sorted.
            self.sets[set.index()].push(new);
        }
        self.classes.push(CharClass { chars: part, containers });
        new
    }

    fn intern(&mut self, key: Vec<(char, char)>, members: Vec<ClassId>) -> ClassSetId {
        let set = ClassSetId::new(self.sets.len());
        for &class in &members {
            self.classes[class.index()].containers.push(set);
        }
        self.sets.push(members);
        self.by_ranges.insert(key, set);
        set
    }

    /// Folds classes into their representatives, drops the ones marked for
    /// dropping and renumbers the survivors contiguously, preserving order.
    ///
    /// Returns the new id of every old class (dropped classes map to `None`,
    /// merged classes to their representative's new id).
    pub fn merge(&mut self, fates: &[ClassFate]) -> Vec<Option<ClassId>> {
        assert_eq!(fates.len(), self.classes.len(), "one fate per class");
        for (i, fate) in fates.iter().enumerate() {
            if let ClassFate::MergeInto(rep) = *fate {
                assert!(
                    rep.index() < i && fates[rep.index()] == ClassFate::Keep,
                    "class {} merged into {:?}, which is not an earlier kept class",
                    i,
                    rep
                );
                let chars = mem::replace(&mut self.classes[i].chars, ClassUnicode::empty());
                let containers = mem::take(&mut self.classes[i].containers);
                let target = &mut self.classes[rep.index()];
                target.chars.union(&chars);
                for set in containers {
                    if !target.containers.contains(&set) {
                        target.containers.push(set);
                    }
                }
            }
        }

        let mut map = vec![None; fates.len()];
        let mut next = 0;
        for (i, fate) in fates.iter().enumerate() {
            if *fate == ClassFate::Keep {
                map[i] = Some(ClassId::new(next));
                next += 1;
            }
        }
        for (i, fate) in fates.iter().enumerate() {
            if let ClassFate::MergeInto(rep) = *fate {
                map[i] = map[rep.index()];
            }
        }

        let old = mem::take(&mut self.classes);
        self.classes = old
            .into_iter()
            .zip(fates)
            .filter(|(_, fate)| **fate == ClassFate::Keep)
            .map(|(class, _)| class)
            .collect();
        for members in &mut self.sets {
            let mut renamed: Vec<ClassId> = members.iter().filter_map(|c| map[c.index()]).collect();
            renamed.sort();
            renamed.dedup();
            *members = renamed;
        }
        debug!("merged character classes: {} -> {}", fates.len(), self.classes.len());
        map
    }

    /// Builds the lookup table a consumer uses to map input to classes.
    pub fn table(&self) -> ClassTable {
        let mut ascii = [None; 128];
        let mut ranges = Vec::new();
        for (id, chars) in self.classes() {
            for range in chars.iter() {
                let (start, end) = (range.start(), range.end());
                if (start as u32) < 0x80 {
                    let ascii_end = (end as u32).min(0x7F);
                    for slot in &mut ascii[start as usize..=ascii_end as usize] {
                        *slot = Some(id);
                    }
                }
                if (end as u32) >= 0x80 {
                    let start = if (start as u32) < 0x80 { '\u{80}' } else { start };
                    ranges.push((start, end, id));
                }
            }
        }
        ranges.sort_by_key(|&(start, _, _)| start);
        let mut coalesced: Vec<(char, char, ClassId)> = Vec::with_capacity(ranges.len());
        for (start, end, id) in ranges {
            match coalesced.last_mut() {
                Some(last) if last.2 == id && successor(last.1) == Some(start) => last.1 = end,
                _ => coalesced.push((start, end, id)),
            }
        }

        let mut categories = Vec::new();
        for &name in GENERAL_CATEGORIES {
            let Some(members) = general_category(name) else { continue };
            let hits: Vec<ClassId> = self
                .classes()
                .filter(|(_, chars)| {
                    let mut overlap = (*chars).clone();
                    overlap.intersect(&members);
                    !overlap.ranges().is_empty()
                })
                .map(|(id, _)| id)
                .collect();
            match hits.as_slice() {
                [] => categories.push((name, None)),
                [id] => {
                    let mut overlap = self.chars(*id).clone();
                    overlap.intersect(&members);
                    if overlap == members {
                        categories.push((name, Some(*id)));
                    }
                }
                _ => {}
            }
        }
        ClassTable { ascii, ranges: coalesced, categories }
    }
}

impl Default for Partition {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps input characters to class ids.
///
/// ASCII is a direct array; everything else is a sorted list of ranges. The
/// category list names general categories that lie wholly inside one class
/// (`Some`) or wholly outside every class (`None`), so a consumer that already
/// knows a character's category can skip the range search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassTable {
    ascii: [Option<ClassId>; 128],
    ranges: Vec<(char, char, ClassId)>,
    categories: Vec<(&'static str, Option<ClassId>)>,
}

impl ClassTable {
    pub fn ascii(&self) -> &[Option<ClassId>; 128] {
        &self.ascii
    }

    pub fn ranges(&self) -> &[(char, char, ClassId)] {
        &self.ranges
    }

    pub fn categories(&self) -> &[(&'static str, Option<ClassId>)] {
        &self.categories
    }

    /// The shortcut for a general category, if the category is uniform.
    pub fn category(&self, name: &str) -> Option<Option<ClassId>> {
        self.categories.iter().find(|(n, _)| *n == name).map(|&(_, id)| id)
    }

    pub fn lookup(&self, ch: char) -> Option<ClassId> {
        if ch.is_ascii() {
            return self.ascii[ch as usize];
        }
        let i = self
            .ranges
            .binary_search_by(|&(start, end, _)| {
                if ch < start {
                    std::cmp::Ordering::Greater
                } else if ch > end {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .ok()?;
        Some(self.ranges[i].2)
    }
}

fn ranges_key(class: &ClassUnicode) -> Vec<(char, char)> {
    class.iter().map(|r| (r.start(), r.end())).collect()
}

fn contains(class: &ClassUnicode, ch: char) -> bool {
    class
        .ranges()
        .binary_search_by(|r| {
            if ch < r.start() {
                std::cmp::Ordering::Greater
            } else if ch > r.end() {
                std::cmp::Ordering::Less
            } else {
                std::cmp::Ordering::Equal
            }
        })
        .is_ok()
}

fn is_single(class: &ClassUnicode) -> bool {
    matches!(class.ranges(), [r] if r.start() == r.end())
}

fn successor(ch: char) -> Option<char> {
    match ch {
        '\u{D7FF}' => Some('\u{E000}'),
        _ => char::from_u32(ch as u32 + 1),
    }
}

/// Looks up the code points of a general category in `regex-syntax`'s
/// Unicode tables. Returns `None` when the tables were compiled out.
fn general_category(name: &str) -> Option<ClassUnicode> {
    let hir = regex_syntax::Parser::new().parse(&format!(r"\p{{{}}}", name)).ok()?;
    match hir.kind() {
        HirKind::Class(Class::Unicode(class)) if !class.ranges().is_empty() => Some(class.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(ranges: &[(char, char)]) -> ClassUnicode {
        ClassUnicode::new(ranges.iter().map(|&(s, e)| ClassUnicodeRange::new(s, e)))
    }

    fn union_of(p: &Partition, set: ClassSetId) -> ClassUnicode {
        let mut all = ClassUnicode::empty();
        for &c in p.set(set) {
            all.union(p.chars(c));
        }
        all
    }

    fn assert_disjoint(p: &Partition) {
        let classes: Vec<_> = p.classes().collect();
        for (i, (_, a)) in classes.iter().enumerate() {
            for (_, b) in &classes[i + 1..] {
                let mut overlap = (*a).clone();
                overlap.intersect(b);
                assert!(overlap.ranges().is_empty(), "{:?} overlaps {:?}", a, b);
            }
        }
    }

    #[test]
    fn char_requests_are_memoized() {
        let mut p = Partition::new();
        let a = p.classify_char('a');
        assert_eq!(p.classify_char('a'), a);
        assert_eq!(p.len(), 2);
        assert_eq!(p.set(a).len(), 1);
        assert_eq!(union_of(&p, a), class(&[('a', 'a')]));
    }

    #[test]
    fn single_char_range_request_shares_the_char_combination() {
        let mut p = Partition::new();
        let by_range = p.classify(&class(&[('x', 'x')]));
        assert_eq!(p.classify_char('x'), by_range);
    }

    #[test]
    fn splitting_keeps_earlier_combinations_exact() {
        let mut p = Partition::new();
        let lower = p.classify(&class(&[('a', 'z')]));
        let vowels = p.classify(&class(&[('a', 'a'), ('e', 'e'), ('i', 'i'), ('o', 'o'), ('u', 'u')]));
        let digits_and_c = p.classify(&class(&[('0', '9'), ('c', 'c')]));

        assert_disjoint(&p);
        assert_eq!(union_of(&p, lower), class(&[('a', 'z')]));
        assert_eq!(union_of(&p, vowels), class(&[('a', 'a'), ('e', 'e'), ('i', 'i'), ('o', 'o'), ('u', 'u')]));
        assert_eq!(union_of(&p, digits_and_c), class(&[('0', '9'), ('c', 'c')]));

        // A class carved out of [a-z] belongs to both combinations.
        let c = p.class_of('c').unwrap();
        assert!(p.containers(c).contains(&lower));
        assert!(p.containers(c).contains(&digits_and_c));
    }

    #[test]
    fn catch_all_stays_unreferenced() {
        let mut p = Partition::new();
        p.classify_char('a');
        p.classify(&class(&[('0', '9')]));
        let rest = p.class_of('!').unwrap();
        assert_eq!(rest, ClassId::new(0));
        assert!(!p.is_referenced(rest));
        assert!(p.is_referenced(p.class_of('5').unwrap()));
    }

    #[test]
    fn empty_request_gives_empty_combination() {
        let mut p = Partition::new();
        let empty = p.classify(&ClassUnicode::empty());
        assert!(p.set(empty).is_empty());
        assert_eq!(p.len(), 1);
    }

    #[test]
    fn merge_folds_and_renumbers() {
        let mut p = Partition::new();
        let ab = p.classify(&class(&[('a', 'b')]));
        p.classify_char('a');
        p.classify_char('x');
        // classes: 0 = rest, 1 = b, 2 = a, 3 = x
        let a = p.class_of('a').unwrap();
        let b = p.class_of('b').unwrap();
        assert!(b < a);
        let fates = vec![ClassFate::Drop, ClassFate::Keep, ClassFate::MergeInto(b), ClassFate::Keep];
        let map = p.merge(&fates);
        assert_eq!(map, vec![None, Some(ClassId::new(0)), Some(ClassId::new(0)), Some(ClassId::new(1))]);
        assert_eq!(p.len(), 2);
        assert_eq!(p.chars(ClassId::new(0)), &class(&[('a', 'b')]));
        assert_eq!(p.class_of('!'), None);
        assert_eq!(p.set(ab), &[ClassId::new(0)]);
    }

    #[test]
    fn table_lookup() {
        let mut p = Partition::new();
        p.classify(&class(&[('a', 'z'), ('\u{3b1}', '\u{3c9}')]));
        p.classify_char('q');
        let table = p.table();
        assert_eq!(table.lookup('a'), p.class_of('a'));
        assert_eq!(table.lookup('q'), p.class_of('q'));
        assert_eq!(table.lookup('\u{3b2}'), p.class_of('a'));
        assert_eq!(table.lookup('\u{10000}'), Some(ClassId::new(0)));
        assert!(table.ranges().windows(2).all(|w| w[0].1 < w[1].0));
    }

    #[cfg(feature = "unicode")]
    #[test]
    fn uniform_categories() {
        let mut p = Partition::new();
        p.classify_char('a');
        let n = p.len();
        let mut fates = vec![ClassFate::Keep; n];
        fates[0] = ClassFate::Drop;
        p.merge(&fates);
        let table = p.table();
        // Spaces are in no class at all, lowercase letters are split.
        assert_eq!(table.category("Zs"), Some(None));
        assert_eq!(table.category("Ll"), None);
    }
}
