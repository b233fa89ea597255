use lexgen::{Lexer, Lookahead, Symbol, EOF_CHAR};

/// A token recognized at the start of the input.
#[derive(Debug, PartialEq, Eq)]
pub struct Token {
    pub rule: u32,
    pub len: usize,
}

impl Token {
    pub fn new(rule: u32, len: usize) -> Token {
        Token { rule, len }
    }
}

/// Runs the tables of `lexer` over `input` the way a generated scanner
/// would: longest match first, trailing contexts cut off according to the
/// rule's lookahead kind, end of input fed as the sentinel character.
pub fn scan(lexer: &Lexer, input: &str, context: usize, line_start: bool) -> Option<Token> {
    let tables = lexer.tables();
    let chars: Vec<char> = input.chars().collect();
    let mut state = 2 * context + usize::from(line_start);
    let mut best = None;
    let mut marks = Vec::new();
    let mut pos = 0;
    loop {
        note(lexer, state, pos, &mut best, &mut marks);
        let ch = chars.get(pos).copied().unwrap_or(EOF_CHAR);
        state = match tables.lookup_char(state, ch) {
            Some(next) => next,
            None => break,
        };
        if pos == chars.len() {
            // Only trailing contexts consume the sentinel, and a match that
            // needed it beats one of the same length that did not.
            let mut at_eof = None;
            note(lexer, state, pos, &mut at_eof, &mut marks);
            best = at_eof.or(best);
            break;
        }
        pos += 1;
    }

    let (rule, end) = best?;
    let len = match lexer.rules()[rule as usize] {
        Lookahead::None => end,
        Lookahead::TrailingFixed(n) => end - n,
        Lookahead::HeadFixed(n) => n,
        Lookahead::Variable => marks.iter().rev().find(|&&(r, at)| r == rule && at <= end)?.1,
    };
    Some(Token::new(rule, len))
}

fn note(lexer: &Lexer, state: usize, pos: usize, best: &mut Option<(u32, usize)>, marks: &mut Vec<(u32, usize)>) {
    for symbol in lexer.tables().symbols(state) {
        match symbol {
            Symbol::Accept(rule) => {
                if best.map_or(true, |(_, end)| end < pos) {
                    *best = Some((rule, pos));
                }
            }
            Symbol::TrailHead(rule) => marks.push((rule, pos)),
        }
    }
}
