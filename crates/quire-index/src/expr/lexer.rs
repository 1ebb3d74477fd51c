use std::iter::Peekable;
use std::str::Chars;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Bang,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let mut chars = source.chars().peekable();
    let mut tokens = Vec::new();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let token = match c {
            '0'..='9' => number(&mut chars)?,
            '"' | '\'' => {
                chars.next();
                Token::Str(string(&mut chars, c)?)
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => ident(&mut chars),
            _ => {
                chars.next();
                symbol(c, &mut chars)?
            }
        };
        tokens.push(token);
    }
    Ok(tokens)
}

fn number(chars: &mut Peekable<Chars<'_>>) -> Result<Token, String> {
    let mut text = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() || c == '.' {
            text.push(c);
            chars.next();
        } else {
            break;
        }
    }
    text.parse::<f64>()
        .map(Token::Number)
        .map_err(|_| format!("invalid number literal {text:?}"))
}

fn string(chars: &mut Peekable<Chars<'_>>, quote: char) -> Result<String, String> {
    let mut text = String::new();
    loop {
        match chars.next() {
            None => return Err("unterminated string literal".into()),
            Some(c) if c == quote => return Ok(text),
            Some('\\') => match chars.next() {
                Some('n') => text.push('\n'),
                Some('t') => text.push('\t'),
                Some(other) => text.push(other),
                None => return Err("unterminated escape".into()),
            },
            Some(c) => text.push(c),
        }
    }
}

fn ident(chars: &mut Peekable<Chars<'_>>) -> Token {
    let mut text = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_alphanumeric() || c == '_' || c == '$' {
            text.push(c);
            chars.next();
        } else {
            break;
        }
    }
    Token::Ident(text)
}

fn symbol(c: char, chars: &mut Peekable<Chars<'_>>) -> Result<Token, String> {
    let mut follows = |expected: char| {
        if chars.peek() == Some(&expected) {
            chars.next();
            true
        } else {
            false
        }
    };
    let token = match c {
        '.' => Token::Dot,
        ',' => Token::Comma,
        '(' => Token::LParen,
        ')' => Token::RParen,
        '[' => Token::LBracket,
        ']' => Token::RBracket,
        '+' => Token::Plus,
        '-' => Token::Minus,
        '*' => Token::Star,
        '/' => Token::Slash,
        '%' => Token::Percent,
        '!' if follows('=') => {
            follows('=');
            Token::NotEq
        }
        '!' => Token::Bang,
        '=' if follows('=') => {
            follows('=');
            Token::Eq
        }
        '<' if follows('=') => Token::LtEq,
        '<' => Token::Lt,
        '>' if follows('=') => Token::GtEq,
        '>' => Token::Gt,
        '&' if follows('&') => Token::And,
        '|' if follows('|') => Token::Or,
        other => return Err(format!("unexpected character {other:?}")),
    };
    Ok(token)
}
