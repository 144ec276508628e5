//! MQL 词法分析模块
//!
//! 以显式状态机实现: 每个状态只依赖当前字符和最多一个字符的回退,
//! 不需要任意回溯。Start 状态根据首字符分派到各 token 状态,
//! 各状态发出 token 后回到 Start。输入耗尽后持续返回 Eof。

use crate::{QueryError, QueryResult};
use tracing::trace;

/// Token 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// 未加引号的单词
    Symbol,
    /// 形如数字的未加引号单词
    Number,
    /// 引号字符串(已去除分隔符并处理转义)
    String,
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    And,
    Or,
    LParen,
    RParen,
    Whitespace,
    Eof,
}

impl TokenKind {
    pub fn name(&self) -> &'static str {
        match self {
            TokenKind::Symbol => "symbol",
            TokenKind::Number => "number",
            TokenKind::String => "string",
            TokenKind::Eq => "eq",
            TokenKind::Ne => "ne",
            TokenKind::Gt => "gt",
            TokenKind::Gte => "gte",
            TokenKind::Lt => "lt",
            TokenKind::Lte => "lte",
            TokenKind::Contains => "contains",
            TokenKind::And => "and",
            TokenKind::Or => "or",
            TokenKind::LParen => "lparen",
            TokenKind::RParen => "rparen",
            TokenKind::Whitespace => "whitespace",
            TokenKind::Eof => "eof",
        }
    }

    /// 可作为列名或比较值的 token
    pub fn is_operand(&self) -> bool {
        matches!(self, TokenKind::Symbol | TokenKind::Number | TokenKind::String)
    }

    pub fn is_comparison_op(&self) -> bool {
        matches!(
            self,
            TokenKind::Eq
                | TokenKind::Ne
                | TokenKind::Gt
                | TokenKind::Gte
                | TokenKind::Lt
                | TokenKind::Lte
                | TokenKind::Contains
        )
    }

    pub fn is_logical_op(&self) -> bool {
        matches!(self, TokenKind::And | TokenKind::Or)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    /// token 起始位置(字节偏移)
    pub offset: usize,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{:?}", self.kind.name(), self.value)
    }
}

/// 输入游标
///
/// 只支持前进和回退一个字符。读到输入末尾时返回 None 且偏移不变,
/// 此时的回退是空操作。
struct Cursor<'a> {
    input: &'a str,
    offset: usize,
    last_width: Option<usize>,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            offset: 0,
            last_width: None,
        }
    }

    fn advance(&mut self) -> Option<char> {
        match self.input[self.offset..].chars().next() {
            Some(c) => {
                let width = c.len_utf8();
                self.offset += width;
                self.last_width = Some(width);
                Some(c)
            }
            None => {
                self.last_width = Some(0);
                None
            }
        }
    }

    fn backup(&mut self) {
        if let Some(width) = self.last_width.take() {
            self.offset -= width;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexState {
    Start,
    Greater,
    Lesser,
    NotEqual,
    Whitespace,
    Text,
    Eof,
}

/// 状态转移结果: 下一个状态,以及可能发出的 token
type Step = (LexState, Option<Token>);

pub struct Lexer<'a> {
    cursor: Cursor<'a>,
    state: LexState,
    start: usize,
    skip_whitespace: bool,
    failed: Option<QueryError>,
    finished: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            cursor: Cursor::new(input),
            state: LexState::Start,
            start: 0,
            skip_whitespace: false,
            failed: None,
            finished: false,
        }
    }

    /// 不发出 Whitespace token
    pub fn skip_whitespace(mut self, skip: bool) -> Self {
        self.skip_whitespace = skip;
        self
    }

    pub fn input(&self) -> &'a str {
        self.cursor.input
    }

    /// 获取下一个 token
    ///
    /// # Brief
    /// 驱动状态机直到发出一个 token。输入耗尽后每次调用都返回 Eof;
    /// 词法错误是终止性的,之后每次调用都返回同一个错误。
    ///
    /// # Returns
    /// 下一个 Token,或词法错误
    pub fn next_token(&mut self) -> QueryResult<Token> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        loop {
            let step = match self.state {
                LexState::Start => self.lex_start(),
                LexState::Greater => Ok(self.lex_or_equal(TokenKind::Gte, ">=", TokenKind::Gt, ">")),
                LexState::Lesser => Ok(self.lex_or_equal(TokenKind::Lte, "<=", TokenKind::Lt, "<")),
                LexState::NotEqual => self.lex_not_equal(),
                LexState::Whitespace => Ok(self.lex_whitespace()),
                LexState::Text => self.lex_text(),
                LexState::Eof => Ok((LexState::Eof, Some(self.emit(TokenKind::Eof, "")))),
            };
            let (next, token) = match step {
                Ok(step) => step,
                Err(err) => {
                    self.failed = Some(err.clone());
                    return Err(err);
                }
            };
            self.state = next;
            if let Some(token) = token {
                if self.skip_whitespace && token.kind == TokenKind::Whitespace {
                    continue;
                }
                trace!(kind = token.kind.name(), value = %token.value, offset = token.offset, "lexed token");
                return Ok(token);
            }
        }
    }

    /// 将整个输入切分为 token 列表(包含结尾的 Eof)
    pub fn tokenize(input: &str) -> QueryResult<Vec<Token>> {
        let mut lexer = Lexer::new(input);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token()?;
            let eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if eof {
                return Ok(tokens);
            }
        }
    }

    fn emit(&self, kind: TokenKind, value: impl Into<String>) -> Token {
        Token {
            kind,
            value: value.into(),
            offset: self.start,
        }
    }

    fn lex_start(&mut self) -> QueryResult<Step> {
        self.start = self.cursor.offset;
        let step = match self.cursor.advance() {
            None => (LexState::Eof, Some(self.emit(TokenKind::Eof, ""))),
            Some('>') => (LexState::Greater, None),
            Some('<') => (LexState::Lesser, None),
            Some('!') => (LexState::NotEqual, None),
            Some('%') => (LexState::Start, Some(self.emit(TokenKind::Contains, "%"))),
            Some('=') => (LexState::Start, Some(self.emit(TokenKind::Eq, "="))),
            Some('(') => (LexState::Start, Some(self.emit(TokenKind::LParen, "("))),
            Some(')') => (LexState::Start, Some(self.emit(TokenKind::RParen, ")"))),
            Some(c) if is_space(c) => (LexState::Whitespace, None),
            Some(_) => {
                self.cursor.backup();
                (LexState::Text, None)
            }
        };
        Ok(step)
    }

    fn lex_or_equal(
        &mut self,
        with_eq: TokenKind,
        with_eq_text: &str,
        without_eq: TokenKind,
        without_eq_text: &str,
    ) -> Step {
        match self.cursor.advance() {
            Some('=') => (LexState::Start, Some(self.emit(with_eq, with_eq_text))),
            _ => {
                self.cursor.backup();
                (LexState::Start, Some(self.emit(without_eq, without_eq_text)))
            }
        }
    }

    fn lex_not_equal(&mut self) -> QueryResult<Step> {
        match self.cursor.advance() {
            Some('=') => Ok((LexState::Start, Some(self.emit(TokenKind::Ne, "!=")))),
            other => Err(QueryError::InvalidNotEqual {
                got: match other {
                    Some(c) => format!("!{}", c),
                    None => "!".to_string(),
                },
                position: self.start,
                input: self.input().to_string(),
            }),
        }
    }

    fn lex_whitespace(&mut self) -> Step {
        loop {
            match self.cursor.advance() {
                Some(c) if is_space(c) => continue,
                Some(_) => {
                    self.cursor.backup();
                    break;
                }
                None => break,
            }
        }
        (LexState::Start, Some(self.emit(TokenKind::Whitespace, "")))
    }

    fn lex_text(&mut self) -> QueryResult<Step> {
        match self.cursor.advance() {
            Some(c) if is_delimiter(c) => self.lex_quoted(c),
            Some(_) => {
                self.cursor.backup();
                self.lex_bare()
            }
            None => Ok((LexState::Start, None)),
        }
    }

    fn lex_quoted(&mut self, delimiter: char) -> QueryResult<Step> {
        let mut buf = String::new();
        loop {
            match self.cursor.advance() {
                None => {
                    return Err(QueryError::MissingClosingDelimiter {
                        delimiter,
                        position: self.start,
                        input: self.input().to_string(),
                    })
                }
                Some('\\') => match self.cursor.advance() {
                    None => {
                        return Err(QueryError::TrailingBackslash {
                            position: self.cursor.offset - 1,
                            input: self.input().to_string(),
                        })
                    }
                    Some(c) if c == delimiter || c == '\\' => buf.push(c),
                    Some(c) => {
                        buf.push('\\');
                        buf.push(c);
                    }
                },
                Some(c) if c == delimiter => break,
                Some(c) => buf.push(c),
            }
        }
        // 引号内的 and/or 始终是普通字符串
        Ok((LexState::Start, Some(self.emit(TokenKind::String, buf))))
    }

    fn lex_bare(&mut self) -> QueryResult<Step> {
        let mut buf = String::new();
        loop {
            match self.cursor.advance() {
                Some(c) if is_space(c) || is_special(c) => {
                    self.cursor.backup();
                    break;
                }
                Some(c) => buf.push(c),
                None => break,
            }
        }

        if is_number_shaped(&buf) {
            if buf.matches('.').count() > 1 {
                return Err(QueryError::InvalidNumber {
                    literal: buf,
                    position: self.start,
                    input: self.input().to_string(),
                });
            }
            return Ok((LexState::Start, Some(self.emit(TokenKind::Number, buf))));
        }

        let token = if buf.eq_ignore_ascii_case("and") {
            self.emit(TokenKind::And, "and")
        } else if buf.eq_ignore_ascii_case("or") {
            self.emit(TokenKind::Or, "or")
        } else {
            self.emit(TokenKind::Symbol, buf)
        };
        Ok((LexState::Start, Some(token)))
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = QueryResult<Token>;

    /// 逐个产出 token,遇到 Eof 或错误后结束
    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_token() {
            Ok(token) if token.kind == TokenKind::Eof => {
                self.finished = true;
                None
            }
            Ok(token) => Some(Ok(token)),
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

fn is_special(c: char) -> bool {
    matches!(c, '=' | '>' | '<' | '!' | '(' | ')' | '%')
}

fn is_delimiter(c: char) -> bool {
    matches!(c, '"' | '\'' | '`')
}

fn is_number_shaped(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => true,
        Some('.') => matches!(chars.next(), Some(c) if c.is_ascii_digit()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn kinds_and_values(input: &str) -> Vec<(TokenKind, String)> {
        Lexer::tokenize(input)
            .unwrap()
            .into_iter()
            .map(|t| (t.kind, t.value))
            .collect()
    }

    fn tok(kind: TokenKind, value: &str) -> (TokenKind, String) {
        (kind, value.to_string())
    }

    #[test]
    fn test_eof_repeats() {
        let mut lexer = Lexer::new("");
        for _ in 0..3 {
            assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Eof);
        }
    }

    #[test]
    fn test_operators() {
        let cases = [
            (">", TokenKind::Gt),
            (">=", TokenKind::Gte),
            ("<", TokenKind::Lt),
            ("<=", TokenKind::Lte),
            ("=", TokenKind::Eq),
            ("!=", TokenKind::Ne),
            ("%", TokenKind::Contains),
            ("(", TokenKind::LParen),
            (")", TokenKind::RParen),
        ];
        for (input, kind) in cases {
            assert_eq!(
                kinds_and_values(input),
                vec![tok(kind, input), tok(TokenKind::Eof, "")],
                "input {input:?}"
            );
        }
    }

    #[test]
    fn test_comparison() {
        assert_eq!(
            kinds_and_values(r#"name="""#),
            vec![
                tok(TokenKind::Symbol, "name"),
                tok(TokenKind::Eq, "="),
                tok(TokenKind::String, ""),
                tok(TokenKind::Eof, ""),
            ]
        );
        assert_eq!(
            kinds_and_values("greater>than"),
            vec![
                tok(TokenKind::Symbol, "greater"),
                tok(TokenKind::Gt, ">"),
                tok(TokenKind::Symbol, "than"),
                tok(TokenKind::Eof, ""),
            ]
        );
    }

    #[test]
    fn test_whitespace_is_one_token() {
        assert_eq!(
            kinds_and_values(" \t\r\n leading"),
            vec![
                tok(TokenKind::Whitespace, ""),
                tok(TokenKind::Symbol, "leading"),
                tok(TokenKind::Eof, ""),
            ]
        );
    }

    #[test]
    fn test_skip_whitespace() {
        let mut lexer = Lexer::new("a = b").skip_whitespace(true);
        let kinds: Vec<TokenKind> = std::iter::from_fn(|| lexer.next().map(|t| t.unwrap().kind)).collect();
        assert_eq!(kinds, vec![TokenKind::Symbol, TokenKind::Eq, TokenKind::Symbol]);
    }

    #[test]
    fn test_logical_keywords_ignore_case() {
        for input in ["and", "AND", "And"] {
            assert_eq!(kinds_and_values(input)[0], tok(TokenKind::And, "and"));
        }
        for input in ["or", "OR", "oR"] {
            assert_eq!(kinds_and_values(input)[0], tok(TokenKind::Or, "or"));
        }
        assert_eq!(kinds_and_values("android")[0], tok(TokenKind::Symbol, "android"));
    }

    #[test]
    fn test_quoted_keywords_are_strings() {
        assert_eq!(kinds_and_values(r#""and""#)[0], tok(TokenKind::String, "and"));
        assert_eq!(kinds_and_values("'OR'")[0], tok(TokenKind::String, "OR"));
    }

    #[test]
    fn test_quoted_strings() {
        assert_eq!(kinds_and_values(r#""alice eve""#)[0], tok(TokenKind::String, "alice eve"));
        assert_eq!(kinds_and_values("`a=b (c)`")[0], tok(TokenKind::String, "a=b (c)"));
        assert_eq!(kinds_and_values(r#""it's""#)[0], tok(TokenKind::String, "it's"));
        assert_eq!(kinds_and_values("'say \"hi\"'")[0], tok(TokenKind::String, "say \"hi\""));
    }

    #[test]
    fn test_escapes() {
        assert_eq!(kinds_and_values(r#""a\"b""#)[0], tok(TokenKind::String, r#"a"b"#));
        assert_eq!(kinds_and_values(r"'a\'b'")[0], tok(TokenKind::String, "a'b"));
        assert_eq!(kinds_and_values(r#""alice\\eve""#)[0], tok(TokenKind::String, r"alice\eve"));
        assert_eq!(kinds_and_values(r#""a\nb""#)[0], tok(TokenKind::String, r"a\nb"));
    }

    #[test]
    fn test_missing_closing_delimiter() {
        let err = Lexer::tokenize(r#"name="alice"#).unwrap_err();
        assert!(matches!(
            err,
            QueryError::MissingClosingDelimiter { delimiter: '"', position: 5, .. }
        ));
        let err = Lexer::tokenize(r#"name="alice\""#).unwrap_err();
        assert!(matches!(err, QueryError::MissingClosingDelimiter { .. }));
    }

    #[test]
    fn test_trailing_backslash() {
        let err = Lexer::tokenize(r#"name="alice\"#).unwrap_err();
        assert!(matches!(err, QueryError::TrailingBackslash { position: 11, .. }));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds_and_values("21")[0], tok(TokenKind::Number, "21"));
        assert_eq!(kinds_and_values("21.5")[0], tok(TokenKind::Number, "21.5"));
        assert_eq!(kinds_and_values(".5")[0], tok(TokenKind::Number, ".5"));
        assert_eq!(kinds_and_values("2023-01-02")[0], tok(TokenKind::Number, "2023-01-02"));
        assert_eq!(kinds_and_values(".x")[0], tok(TokenKind::Symbol, ".x"));
        assert_eq!(kinds_and_values("\"1.2.3\"")[0], tok(TokenKind::String, "1.2.3"));
    }

    #[test]
    fn test_invalid_number() {
        let err = Lexer::tokenize("length=1.11.").unwrap_err();
        assert!(matches!(
            err,
            QueryError::InvalidNumber { ref literal, position: 7, .. } if literal == "1.11."
        ));
    }

    #[test]
    fn test_invalid_not_equal() {
        let mut lexer = Lexer::new("   !not");
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Whitespace);
        let err = lexer.next_token().unwrap_err();
        assert!(matches!(err, QueryError::InvalidNotEqual { ref got, position: 3, .. } if got == "!n"));
        assert!(err.to_string().contains(r#"got "!n""#));
        // 错误是终止性的
        assert_eq!(lexer.next_token().unwrap_err(), err);
    }

    #[test]
    fn test_not_equal_at_eof() {
        let err = Lexer::tokenize("name!").unwrap_err();
        assert!(matches!(err, QueryError::InvalidNotEqual { ref got, .. } if got == "!"));
    }

    #[test]
    fn test_offsets_and_unicode() {
        let tokens = Lexer::tokenize("名前=ä >= 1").unwrap();
        let offsets: Vec<(TokenKind, usize)> = tokens.iter().map(|t| (t.kind, t.offset)).collect();
        assert_eq!(
            offsets,
            vec![
                (TokenKind::Symbol, 0),
                (TokenKind::Eq, 6),
                (TokenKind::Symbol, 7),
                (TokenKind::Whitespace, 9),
                (TokenKind::Gte, 10),
                (TokenKind::Whitespace, 12),
                (TokenKind::Number, 13),
                (TokenKind::Eof, 14),
            ]
        );
    }

    #[test]
    fn test_token_display() {
        let token = Token {
            kind: TokenKind::Eq,
            value: "=".to_string(),
            offset: 0,
        };
        assert_eq!(token.to_string(), r#"eq:"=""#);
    }

    proptest! {
        #[test]
        fn prop_eof_is_idempotent(input in "[a-z0-9 =<>!()%\"'`.\\\\]{0,24}", extra in 1usize..8) {
            let mut lexer = Lexer::new(&input);
            loop {
                match lexer.next_token() {
                    Ok(token) if token.kind == TokenKind::Eof => break,
                    Ok(_) => continue,
                    Err(_) => return Ok(()),
                }
            }
            for _ in 0..extra {
                prop_assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Eof);
            }
        }

        #[test]
        fn prop_keywords_ignore_case(word in "(?i:and|or)") {
            let tokens = Lexer::tokenize(&word).unwrap();
            prop_assert!(tokens[0].kind.is_logical_op());
            let quoted = format!("\"{}\"", word);
            let tokens = Lexer::tokenize(&quoted).unwrap();
            prop_assert_eq!(tokens[0].kind, TokenKind::String);
            prop_assert_eq!(&tokens[0].value, &word);
        }
    }
}
