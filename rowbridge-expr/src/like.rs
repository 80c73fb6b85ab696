//! SQL `LIKE` matching and escaping.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Char(char),
    AnyOne,
    AnyMany,
}

fn tokenize(pattern: &str, fold: bool) -> Vec<Token> {
    let mut out = Vec::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        let token = match c {
            '%' => Token::AnyMany,
            '_' => Token::AnyOne,
            // A trailing backslash matches itself.
            '\\' => Token::Char(chars.next().unwrap_or('\\')),
            other => Token::Char(other),
        };
        // Collapse runs of `%`.
        if token == Token::AnyMany && out.last() == Some(&Token::AnyMany) {
            continue;
        }
        out.push(match token {
            Token::Char(c) if fold => Token::Char(fold_char(c)),
            t => t,
        });
    }
    out
}

#[inline]
fn fold_char(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Match `value` against a `LIKE` pattern with `%`, `_` and `\` escapes.
pub fn like_match(value: &str, pattern: &str, case_insensitive: bool) -> bool {
    let tokens = tokenize(pattern, case_insensitive);
    let text: Vec<char> = if case_insensitive {
        value.chars().map(fold_char).collect()
    } else {
        value.chars().collect()
    };

    let (mut t, mut p) = (0usize, 0usize);
    // Position after the last `%` and the text position it was tried at.
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        match tokens.get(p) {
            Some(Token::AnyMany) => {
                p += 1;
                backtrack = Some((p, t));
                continue;
            }
            Some(Token::AnyOne) => {
                p += 1;
                t += 1;
                continue;
            }
            Some(Token::Char(c)) if *c == text[t] => {
                p += 1;
                t += 1;
                continue;
            }
            _ => {}
        }
        match backtrack {
            Some((bp, bt)) => {
                p = bp;
                t = bt + 1;
                backtrack = Some((bp, bt + 1));
            }
            None => return false,
        }
    }
    tokens[p..].iter().all(|tok| *tok == Token::AnyMany)
}

/// Escape `%`, `_` and `\` so `raw` matches itself inside a `LIKE` pattern.
pub fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
