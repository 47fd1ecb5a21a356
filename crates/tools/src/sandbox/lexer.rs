//! Tokenizer for the script language.

use super::ScriptError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Str(String),
    /// Raw text pieces and `${...}` source pieces, in order
    Template(Vec<TemplatePiece>),
    Ident(String),
    Punct(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePiece {
    Raw(String),
    Source(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
}

// Longest operators first so that `===` wins over `==` and `=`.
const PUNCTUATORS: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "??", "+=", "-=", "*=", "/=", "%=",
    "++", "--", "=>", "+", "-", "*", "/", "%", "<", ">", "=", "!", "?", ":", ".", ",", ";",
    "(", ")", "{", "}", "[", "]",
];

pub fn tokenize(source: &str) -> Result<Vec<Spanned>, ScriptError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut line = 1;

    while i < chars.len() {
        let c = chars[i];

        if c == '\n' {
            line += 1;
            i += 1;
            continue;
        }
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // Comments
        if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        if c == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            loop {
                match chars.get(i) {
                    None => return Err(ScriptError::syntax("unterminated comment", line)),
                    Some('*') if chars.get(i + 1) == Some(&'/') => {
                        i += 2;
                        break;
                    }
                    Some('\n') => {
                        line += 1;
                        i += 1;
                    }
                    Some(_) => i += 1,
                }
            }
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                i += 1;
                if i < chars.len() && (chars[i] == '+' || chars[i] == '-') {
                    i += 1;
                }
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            let text: String = chars[start..i].iter().collect();
            let number = text
                .parse()
                .map_err(|_| ScriptError::syntax(format!("invalid number '{text}'"), line))?;
            tokens.push(Spanned { token: Token::Number(number), line });
            continue;
        }

        if c.is_alphabetic() || c == '_' || c == '$' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$') {
                i += 1;
            }
            let ident: String = chars[start..i].iter().collect();
            tokens.push(Spanned { token: Token::Ident(ident), line });
            continue;
        }

        if c == '"' || c == '\'' {
            let start_line = line;
            let (text, next) = read_string(&chars, i + 1, c, &mut line)?;
            tokens.push(Spanned { token: Token::Str(text), line: start_line });
            i = next;
            continue;
        }

        if c == '`' {
            let start_line = line;
            let (pieces, next) = read_template(&chars, i + 1, &mut line)?;
            tokens.push(Spanned { token: Token::Template(pieces), line: start_line });
            i = next;
            continue;
        }

        let rest = &chars[i..];
        let punct = PUNCTUATORS.iter().find(|p| {
            let p_chars: Vec<char> = p.chars().collect();
            rest.starts_with(&p_chars)
        });
        match punct {
            Some(p) => {
                tokens.push(Spanned { token: Token::Punct(p), line });
                i += p.len();
            }
            None => {
                return Err(ScriptError::syntax(format!("unexpected character '{c}'"), line));
            }
        }
    }

    Ok(tokens)
}

fn read_escape(chars: &[char], i: usize, line: usize) -> Result<(char, usize), ScriptError> {
    let escaped = match chars.get(i) {
        Some('n') => '\n',
        Some('t') => '\t',
        Some('r') => '\r',
        Some('0') => '\0',
        Some('u') => {
            let hex: String = chars.get(i + 1..i + 5).unwrap_or(&[]).iter().collect();
            let code = u32::from_str_radix(&hex, 16)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| ScriptError::syntax("invalid unicode escape", line))?;
            return Ok((code, i + 5));
        }
        Some(other) => *other,
        None => return Err(ScriptError::syntax("unterminated string", line)),
    };
    Ok((escaped, i + 1))
}

fn read_string(
    chars: &[char],
    mut i: usize,
    quote: char,
    line: &mut usize,
) -> Result<(String, usize), ScriptError> {
    let mut text = String::new();
    loop {
        match chars.get(i) {
            None | Some('\n') => return Err(ScriptError::syntax("unterminated string", *line)),
            Some(c) if *c == quote => return Ok((text, i + 1)),
            Some('\\') => {
                let (c, next) = read_escape(chars, i + 1, *line)?;
                text.push(c);
                i = next;
            }
            Some(c) => {
                text.push(*c);
                i += 1;
            }
        }
    }
}

fn read_template(
    chars: &[char],
    mut i: usize,
    line: &mut usize,
) -> Result<(Vec<TemplatePiece>, usize), ScriptError> {
    let mut pieces = Vec::new();
    let mut raw = String::new();
    loop {
        match chars.get(i) {
            None => return Err(ScriptError::syntax("unterminated template literal", *line)),
            Some('`') => {
                if !raw.is_empty() {
                    pieces.push(TemplatePiece::Raw(raw));
                }
                return Ok((pieces, i + 1));
            }
            Some('\\') => {
                let (c, next) = read_escape(chars, i + 1, *line)?;
                raw.push(c);
                i = next;
            }
            Some('$') if chars.get(i + 1) == Some(&'{') => {
                if !raw.is_empty() {
                    pieces.push(TemplatePiece::Raw(std::mem::take(&mut raw)));
                }
                i += 2;
                let start = i;
                let mut depth = 1;
                while depth > 0 {
                    match chars.get(i) {
                        None => {
                            return Err(ScriptError::syntax("unterminated template expression", *line));
                        }
                        Some('{') => depth += 1,
                        Some('}') => depth -= 1,
                        Some('\n') => *line += 1,
                        Some(_) => {}
                    }
                    i += 1;
                }
                pieces.push(TemplatePiece::Source(chars[start..i - 1].iter().collect()));
            }
            Some(c) => {
                if *c == '\n' {
                    *line += 1;
                }
                raw.push(*c);
                i += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn longest_operator_wins() {
        assert_eq!(
            kinds("a === b !== c"),
            vec![
                Token::Ident("a".into()),
                Token::Punct("==="),
                Token::Ident("b".into()),
                Token::Punct("!=="),
                Token::Ident("c".into()),
            ]
        );
    }

    #[test]
    fn numbers_strings_and_comments() {
        assert_eq!(
            kinds("// note\n1.5e2 /* x */ 'it\\'s'"),
            vec![Token::Number(150.0), Token::Str("it's".into())]
        );
    }

    #[test]
    fn template_pieces() {
        assert_eq!(
            kinds("`a ${b + 1} c`"),
            vec![Token::Template(vec![
                TemplatePiece::Raw("a ".into()),
                TemplatePiece::Source("b + 1".into()),
                TemplatePiece::Raw(" c".into()),
            ])]
        );
    }

    #[test]
    fn tracks_lines_and_rejects_garbage() {
        let tokens = tokenize("a\nb").unwrap();
        assert_eq!(tokens[1].line, 2);
        let err = tokenize("let x = #").unwrap_err();
        assert!(err.to_string().contains("unexpected character"));
        assert!(tokenize("'open").is_err());
    }
}
