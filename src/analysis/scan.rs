//! Lexical helpers shared by analyzers and syntax validators.
//!
//! [`mask`] blanks out comments and string contents while keeping line
//! structure, so keyword and declaration patterns only see real code.

use regex::Regex;
use std::sync::OnceLock;

/// Lexical rules of a language family.
#[derive(Debug, Clone, Copy)]
pub struct Syntax {
    pub line_comments: &'static [&'static str],
    pub block_comment: Option<(&'static str, &'static str)>,
    pub quotes: &'static [char],
    /// `"""` / `'''` strings.
    pub triple_quoted: bool,
    /// Plain quoted strings may span lines.
    pub multiline_strings: bool,
    /// `'` may start a lifetime rather than a char literal.
    pub lifetimes: bool,
}

pub const PYTHON: Syntax = Syntax {
    line_comments: &["#"],
    block_comment: None,
    quotes: &['"', '\''],
    triple_quoted: true,
    multiline_strings: false,
    lifetimes: false,
};

pub const RUST: Syntax = Syntax {
    line_comments: &["//"],
    block_comment: Some(("/*", "*/")),
    quotes: &['"', '\''],
    triple_quoted: false,
    multiline_strings: true,
    lifetimes: true,
};

pub const BRACE: Syntax = Syntax {
    line_comments: &["//"],
    block_comment: Some(("/*", "*/")),
    quotes: &['"', '\'', '`'],
    triple_quoted: false,
    multiline_strings: false,
    lifetimes: false,
};

fn starts_with_at(chars: &[char], at: usize, pattern: &str) -> bool {
    let mut idx = at;
    for p in pattern.chars() {
        if chars.get(idx) != Some(&p) {
            return false;
        }
        idx += 1;
    }
    true
}

fn blank(c: char) -> char {
    if c == '\n' {
        '\n'
    } else {
        ' '
    }
}

fn is_char_literal(chars: &[char], at: usize) -> bool {
    chars.get(at + 1) == Some(&'\\') || chars.get(at + 2) == Some(&'\'')
}

/// Replace comments and string contents with spaces. Quote characters are
/// kept so that string boundaries stay visible; newlines are always kept.
pub fn mask(source: &str, syntax: &Syntax) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if syntax
            .line_comments
            .iter()
            .any(|marker| starts_with_at(&chars, i, marker))
        {
            while i < chars.len() && chars[i] != '\n' {
                out.push(' ');
                i += 1;
            }
            continue;
        }

        if let Some((open, close)) = syntax.block_comment {
            if starts_with_at(&chars, i, open) {
                let open_len = open.chars().count();
                out.extend(std::iter::repeat(' ').take(open_len));
                i += open_len;
                while i < chars.len() && !starts_with_at(&chars, i, close) {
                    out.push(blank(chars[i]));
                    i += 1;
                }
                let close_len = close.chars().count().min(chars.len() - i);
                out.extend(std::iter::repeat(' ').take(close_len));
                i += close_len;
                continue;
            }
        }

        if syntax.quotes.contains(&c) {
            if c == '\'' && syntax.lifetimes && !is_char_literal(&chars, i) {
                out.push(c);
                i += 1;
                continue;
            }

            let triple = syntax.triple_quoted
                && chars.get(i + 1) == Some(&c)
                && chars.get(i + 2) == Some(&c);
            let delim_len = if triple { 3 } else { 1 };
            out.extend(std::iter::repeat(c).take(delim_len));
            i += delim_len;

            while i < chars.len() {
                let d = chars[i];
                if d == '\\' {
                    out.push(' ');
                    i += 1;
                    if i < chars.len() {
                        out.push(blank(chars[i]));
                        i += 1;
                    }
                    continue;
                }
                if triple {
                    if d == c && chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c) {
                        out.extend(std::iter::repeat(c).take(3));
                        i += 3;
                        break;
                    }
                } else if d == c {
                    out.push(c);
                    i += 1;
                    break;
                } else if d == '\n' && !syntax.multiline_strings && c != '`' {
                    // Unterminated single-line string: stop at end of line
                    break;
                }
                out.push(blank(d));
                i += 1;
            }
            continue;
        }

        out.push(c);
        i += 1;
    }

    out
}

/// Whether every string and block comment is closed.
pub fn literals_closed(source: &str, syntax: &Syntax) -> bool {
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if syntax
            .line_comments
            .iter()
            .any(|marker| starts_with_at(&chars, i, marker))
        {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        if let Some((open, close)) = syntax.block_comment {
            if starts_with_at(&chars, i, open) {
                i += open.chars().count();
                while i < chars.len() && !starts_with_at(&chars, i, close) {
                    i += 1;
                }
                if i >= chars.len() {
                    return false;
                }
                i += close.chars().count();
                continue;
            }
        }
        if syntax.quotes.contains(&c) {
            if c == '\'' && syntax.lifetimes && !is_char_literal(&chars, i) {
                i += 1;
                continue;
            }
            let triple = syntax.triple_quoted
                && chars.get(i + 1) == Some(&c)
                && chars.get(i + 2) == Some(&c);
            i += if triple { 3 } else { 1 };
            let mut closed = false;
            while i < chars.len() {
                let d = chars[i];
                if d == '\\' {
                    i += 2;
                    continue;
                }
                if triple {
                    if d == c && chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c) {
                        i += 3;
                        closed = true;
                        break;
                    }
                } else if d == c {
                    i += 1;
                    closed = true;
                    break;
                } else if d == '\n' && !syntax.multiline_strings && c != '`' {
                    break;
                }
                i += 1;
            }
            if !closed {
                return false;
            }
            continue;
        }
        i += 1;
    }

    true
}

/// Whether `()`, `[]` and `{}` nest correctly outside comments and strings.
pub fn delimiters_balanced(source: &str, syntax: &Syntax) -> bool {
    let masked = mask(source, syntax);
    let mut stack = Vec::new();
    for c in masked.chars() {
        match c {
            '(' | '[' | '{' => stack.push(c),
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if stack.pop() != Some(expected) {
                    return false;
                }
            }
            _ => {}
        }
    }
    stack.is_empty()
}

/// Count matches of `pattern` in already-masked source.
pub fn count_matches(masked: &str, pattern: &Regex) -> usize {
    pattern.find_iter(masked).count()
}

/// Collect the first capture group of every match, in source order and
/// without duplicates.
pub fn collect_names(masked: &str, pattern: &Regex) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in pattern.captures_iter(masked) {
        if let Some(m) = caps.get(1) {
            let name = m.as_str();
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    names
}

/// Lines with something other than whitespace after masking. A line that
/// held only a comment masks down to nothing.
pub fn count_code_lines(masked: &str) -> usize {
    masked.lines().filter(|line| !line.trim().is_empty()).count()
}

/// Compile a regex literal once.
pub fn cached(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static regex must compile"))
}
