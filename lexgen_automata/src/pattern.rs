use crate::{CompileError, CompileResult};
use regex_syntax::hir::{Class, ClassUnicode, ClassUnicodeRange, Hir, HirKind, Look};

/// Casing rules used when a literal is matched case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    /// Simple one-to-one Unicode case mapping.
    #[default]
    Invariant,
    /// Like `Invariant`, except that dotted and dotless `i` pair up the
    /// Turkish and Azerbaijani way: `i`/`İ` and `ı`/`I`.
    Turkic,
}

impl Locale {
    /// Returns the other-case counterpart of `ch`, if it has exactly one.
    pub fn fold(self, ch: char) -> Option<char> {
        if self == Locale::Turkic {
            match ch {
                'i' => return Some('\u{130}'),
                '\u{130}' => return Some('i'),
                'I' => return Some('\u{131}'),
                '\u{131}' => return Some('I'),
                _ => {}
            }
        }
        let mut lower = ch.to_lowercase();
        if let (Some(l), None) = (lower.next(), lower.next()) {
            if l != ch {
                return Some(l);
            }
        }
        let mut upper = ch.to_uppercase();
        if let (Some(u), None) = (upper.next(), upper.next()) {
            if u != ch {
                return Some(u);
            }
        }
        None
    }
}

/// A node of a rule's pattern tree.
///
/// Trees are produced upstream (see [`Pattern::from_hir`] for one producer)
/// and are trusted to be well formed.
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    /// Matches any one of the alternatives.
    Alternation(Vec<Pattern>),
    /// Matches each element in order. An empty concatenation matches the
    /// empty string.
    Concat(Vec<Pattern>),
    /// Matches `sub` between `min` and `max` times (`None` is unbounded).
    Repeat {
        sub: Box<Pattern>,
        min: u32,
        max: Option<u32>,
    },
    /// Matches a literal string.
    Literal {
        text: String,
        case_insensitive: bool,
        locale: Locale,
    },
    /// Matches one code point from the set.
    Class(ClassUnicode),
    /// Top-level wrapper carrying line anchoring and trailing context.
    Anchor {
        begin_line: bool,
        sub: Box<Pattern>,
        trailing: Option<Box<Pattern>>,
    },
    /// Matches the end of input.
    Eof,
}

/// How a rule's trailing context has to be resolved by a consumer once the
/// automaton accepts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookahead {
    /// The rule has no trailing context.
    None,
    /// The trailing context always has this length; back up by it.
    TrailingFixed(usize),
    /// The matched text always has this length.
    HeadFixed(usize),
    /// Neither side has a fixed length. The end of the match is the last
    /// position at which the automaton carried the rule's trail-head mark.
    Variable,
}

impl Pattern {
    /// A case-sensitive literal.
    pub fn literal(text: &str) -> Pattern {
        Pattern::Literal { text: text.to_string(), case_insensitive: false, locale: Locale::Invariant }
    }

    /// A case-insensitive literal using the given casing rules.
    pub fn literal_nocase(text: &str, locale: Locale) -> Pattern {
        Pattern::Literal { text: text.to_string(), case_insensitive: true, locale }
    }

    /// A class of the given inclusive ranges.
    pub fn class(ranges: &[(char, char)]) -> Pattern {
        Pattern::Class(ClassUnicode::new(ranges.iter().map(|&(s, e)| ClassUnicodeRange::new(s, e))))
    }

    /// `sub` repeated `min` to `max` times; `None` leaves it unbounded.
    pub fn repeat(sub: Pattern, min: u32, max: Option<u32>) -> Pattern {
        Pattern::Repeat { sub: Box::new(sub), min, max }
    }

    /// `sub` only when followed by `trailing`.
    pub fn followed_by(sub: Pattern, trailing: Pattern) -> Pattern {
        Pattern::Anchor { begin_line: false, sub: Box::new(sub), trailing: Some(Box::new(trailing)) }
    }

    /// `sub` only at the start of a line.
    pub fn line_start(sub: Pattern) -> Pattern {
        Pattern::Anchor { begin_line: true, sub: Box::new(sub), trailing: None }
    }

    /// The length in code points of every string this node matches, if they
    /// all have the same length.
    pub fn fixed_length(&self) -> Option<usize> {
        match self {
            Pattern::Alternation(alts) => {
                let mut alts = alts.iter();
                let first = alts.next()?.fixed_length()?;
                for alt in alts {
                    if alt.fixed_length()? != first {
                        return None;
                    }
                }
                Some(first)
            }
            Pattern::Concat(items) => {
                items.iter().try_fold(0usize, |acc, item| acc.checked_add(item.fixed_length()?))
            }
            Pattern::Repeat { sub, min, max } => {
                if *max != Some(*min) {
                    return None;
                }
                sub.fixed_length()?.checked_mul(*min as usize)
            }
            Pattern::Literal { text, .. } => Some(text.chars().count()),
            Pattern::Class(_) => Some(1),
            Pattern::Anchor { sub, .. } => sub.fixed_length(),
            Pattern::Eof => Some(0),
        }
    }

    /// Whether this rule is anchored at the start of a line.
    pub fn begins_line(&self) -> bool {
        matches!(self, Pattern::Anchor { begin_line: true, .. })
    }

    /// Classifies the trailing context of a rule.
    pub fn lookahead(&self) -> Lookahead {
        match self {
            Pattern::Anchor { sub, trailing: Some(trailing), .. } => {
                if let Some(n) = trailing.fixed_length() {
                    Lookahead::TrailingFixed(n)
                } else if let Some(n) = sub.fixed_length() {
                    Lookahead::HeadFixed(n)
                } else {
                    Lookahead::Variable
                }
            }
            _ => Lookahead::None,
        }
    }

    /// Converts a `regex-syntax` HIR into a pattern tree.
    ///
    /// Only `^` at the very start of the expression is accepted as a look
    /// assertion; it turns the result into a line-anchored rule. Every other
    /// assertion is reported as unsupported.
    pub fn from_hir(hir: &Hir) -> CompileResult<Pattern> {
        match strip_line_start(hir) {
            Some(rest) => {
                let items = rest.iter().map(convert).collect::<CompileResult<_>>()?;
                Ok(Pattern::line_start(Pattern::Concat(items)))
            }
            None => convert(hir),
        }
    }
}

/// Returns whatever follows a leading line-start assertion, or `None` when
/// `hir` does not start with one.
fn strip_line_start(hir: &Hir) -> Option<&[Hir]> {
    match hir.kind() {
        HirKind::Look(Look::Start | Look::StartLF | Look::StartCRLF) => Some(&[]),
        HirKind::Concat(items) => match items.first().map(|h| h.kind()) {
            Some(HirKind::Look(Look::Start | Look::StartLF | Look::StartCRLF)) => Some(&items[1..]),
            _ => None,
        },
        _ => None,
    }
}

fn convert(hir: &Hir) -> CompileResult<Pattern> {
    match hir.kind() {
        HirKind::Empty => Ok(Pattern::Concat(Vec::new())),
        HirKind::Literal(literal) => match std::str::from_utf8(&literal.0) {
            Ok(text) => Ok(Pattern::literal(text)),
            Err(_) => Err(CompileError::UnsupportedFeature("literal is not valid UTF-8".to_string())),
        },
        HirKind::Class(Class::Unicode(class)) => Ok(Pattern::Class(class.clone())),
        HirKind::Class(Class::Bytes(class)) => {
            if !class.is_ascii() {
                return Err(CompileError::UnsupportedFeature("byte class outside ASCII".to_string()));
            }
            let ranges = class
                .iter()
                .map(|r| ClassUnicodeRange::new(char::from(r.start()), char::from(r.end())));
            Ok(Pattern::Class(ClassUnicode::new(ranges)))
        }
        HirKind::Look(look) => Err(CompileError::UnsupportedFeature(format!("look-around assertion {:?}", look))),
        HirKind::Repetition(rep) => Ok(Pattern::repeat(convert(&rep.sub)?, rep.min, rep.max)),
        HirKind::Capture(capture) => convert(&capture.sub),
        HirKind::Concat(items) => Ok(Pattern::Concat(items.iter().map(convert).collect::<CompileResult<_>>()?)),
        HirKind::Alternation(alts) => Ok(Pattern::Alternation(alts.iter().map(convert).collect::<CompileResult<_>>()?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex_syntax::Parser;

    fn parse(pattern: &str) -> Pattern {
        let hir = Parser::new().parse(pattern).unwrap();
        Pattern::from_hir(&hir).unwrap()
    }

    #[test]
    fn fixed_length_propagates() {
        assert_eq!(Pattern::literal("abc").fixed_length(), Some(3));
        assert_eq!(parse("a[bc]d").fixed_length(), Some(3));
        assert_eq!(parse("ab|cd").fixed_length(), Some(2));
        assert_eq!(parse("ab|c").fixed_length(), None);
        assert_eq!(parse("(ab){3}").fixed_length(), Some(6));
        assert_eq!(parse("a{2,3}").fixed_length(), None);
        assert_eq!(parse("a*").fixed_length(), None);
        assert_eq!(Pattern::Eof.fixed_length(), Some(0));
    }

    #[test]
    fn lookahead_classification() {
        let fixed = Pattern::followed_by(parse("a+"), Pattern::literal("b"));
        assert_eq!(fixed.lookahead(), Lookahead::TrailingFixed(1));

        let head = Pattern::followed_by(parse("ab"), parse("c*"));
        assert_eq!(head.lookahead(), Lookahead::HeadFixed(2));

        let variable = Pattern::followed_by(parse("a+"), parse("b+"));
        assert_eq!(variable.lookahead(), Lookahead::Variable);

        assert_eq!(parse("ab").lookahead(), Lookahead::None);
    }

    #[test]
    fn leading_caret_marks_line_start() {
        let pattern = parse("(?m)^ab");
        assert!(pattern.begins_line());
        assert_eq!(pattern.fixed_length(), Some(2));
        assert!(!parse("ab").begins_line());
    }

    #[test]
    fn other_assertions_are_rejected() {
        let hir = Parser::new().parse(r"a\b").unwrap();
        assert!(matches!(Pattern::from_hir(&hir), Err(CompileError::UnsupportedFeature(_))));
        let hir = Parser::new().parse(r"a$").unwrap();
        assert!(Pattern::from_hir(&hir).is_err());
    }

    #[test]
    fn turkic_folding() {
        assert_eq!(Locale::Invariant.fold('a'), Some('A'));
        assert_eq!(Locale::Invariant.fold('Q'), Some('q'));
        assert_eq!(Locale::Invariant.fold('1'), None);
        assert_eq!(Locale::Turkic.fold('i'), Some('\u{130}'));
        assert_eq!(Locale::Turkic.fold('I'), Some('\u{131}'));
        assert_eq!(Locale::Turkic.fold('k'), Some('K'));
    }
}
