//! Lexer for the Jam language
//!
//! Jam tokenisation is word-based: the input splits on whitespace, and
//! punctuation like `;` `:` `{` `=` is special only when it stands alone as
//! a word (`a=b` is one plain word). Double quotes group whitespace into a
//! word and `\` escapes the next character; a quoted or escaped word is
//! never reclassified as a keyword or operator. `#` starts a comment when
//! it begins a token.
//!
//! One mode switch: after the `actions` keyword, the `{`-delimited body is
//! captured raw (brace-counted) instead of being tokenised, since action
//! bodies are shell text.

use crate::parser::types::ParseError;

/// Token types for the Jam lexer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    Eof,

    // Punctuation (only when standing alone as a word)
    Semicolon, // ;
    Colon,     // :
    LBrace,    // {
    RBrace,    // }
    LParen,    // (
    RParen,    // )
    LBracket,  // [
    RBracket,  // ]

    // Operators
    Equals,         // =
    PlusEquals,     // +=
    QuestionEquals, // ?=
    NotEquals,      // !=
    Less,           // <
    LessEq,         // <=
    Greater,        // >
    GreaterEq,      // >=
    AndAnd,         // &&
    OrOr,           // ||
    Bang,           // !

    // Reserved words
    Actions,
    Bind,
    Break,
    Case,
    Continue,
    Default,
    Else,
    For,
    If,
    In,
    Include,
    Local,
    On,
    Rule,
    Return,
    Switch,
    While,

    // Everything else
    Word,

    // Raw text of an actions body
    ActionBody,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eof => "EOF",
            Self::Semicolon => ";",
            Self::Colon => ":",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::Equals => "=",
            Self::PlusEquals => "+=",
            Self::QuestionEquals => "?=",
            Self::NotEquals => "!=",
            Self::Less => "<",
            Self::LessEq => "<=",
            Self::Greater => ">",
            Self::GreaterEq => ">=",
            Self::AndAnd => "&&",
            Self::OrOr => "||",
            Self::Bang => "!",
            Self::Actions => "actions",
            Self::Bind => "bind",
            Self::Break => "break",
            Self::Case => "case",
            Self::Continue => "continue",
            Self::Default => "default",
            Self::Else => "else",
            Self::For => "for",
            Self::If => "if",
            Self::In => "in",
            Self::Include => "include",
            Self::Local => "local",
            Self::On => "on",
            Self::Rule => "rule",
            Self::Return => "return",
            Self::Switch => "switch",
            Self::While => "while",
            Self::Word => "WORD",
            Self::ActionBody => "ACTIONS-BODY",
        }
    }
}

fn classify(word: &str) -> TokenType {
    match word {
        ";" => TokenType::Semicolon,
        ":" => TokenType::Colon,
        "{" => TokenType::LBrace,
        "}" => TokenType::RBrace,
        "(" => TokenType::LParen,
        ")" => TokenType::RParen,
        "[" => TokenType::LBracket,
        "]" => TokenType::RBracket,
        "=" => TokenType::Equals,
        "+=" => TokenType::PlusEquals,
        "?=" => TokenType::QuestionEquals,
        "!=" => TokenType::NotEquals,
        "<" => TokenType::Less,
        "<=" => TokenType::LessEq,
        ">" => TokenType::Greater,
        ">=" => TokenType::GreaterEq,
        "&&" => TokenType::AndAnd,
        "||" => TokenType::OrOr,
        "!" => TokenType::Bang,
        "actions" => TokenType::Actions,
        "bind" => TokenType::Bind,
        "break" => TokenType::Break,
        "case" => TokenType::Case,
        "continue" => TokenType::Continue,
        "default" => TokenType::Default,
        "else" => TokenType::Else,
        "for" => TokenType::For,
        "if" => TokenType::If,
        "in" => TokenType::In,
        "include" => TokenType::Include,
        "local" => TokenType::Local,
        "on" => TokenType::On,
        "rule" => TokenType::Rule,
        "return" => TokenType::Return,
        "switch" => TokenType::Switch,
        "while" => TokenType::While,
        _ => TokenType::Word,
    }
}

#[derive(Debug, Clone)]
pub struct Token {
    pub token_type: TokenType,
    pub value: String,
    pub line: usize,
    /// Any part of the word was quoted or escaped; such a word is never a
    /// keyword or operator.
    pub quoted: bool,
}

pub struct Lexer<'a> {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    file: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &str, file: &'a str) -> Self {
        Lexer {
            chars: input.chars().collect(),
            pos: 0,
            line: 1,
            file,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        // set after `actions`, cleared at `;`; arms the raw-body capture
        let mut pending_actions = false;

        loop {
            self.skip_blank();
            if self.pos >= self.chars.len() {
                break;
            }
            if self.chars[self.pos] == '#' {
                self.skip_comment();
                continue;
            }

            let token = self.read_word()?;
            match token.token_type {
                TokenType::Actions => pending_actions = true,
                TokenType::Semicolon => pending_actions = false,
                TokenType::LBrace if pending_actions => {
                    pending_actions = false;
                    tokens.push(token);
                    let body = self.read_action_body()?;
                    tokens.push(body);
                    tokens.push(Token {
                        token_type: TokenType::RBrace,
                        value: "}".to_string(),
                        line: self.line,
                        quoted: false,
                    });
                    continue;
                }
                _ => {}
            }
            tokens.push(token);
        }

        tokens.push(Token {
            token_type: TokenType::Eof,
            value: String::new(),
            line: self.line,
            quoted: false,
        });
        Ok(tokens)
    }

    fn skip_blank(&mut self) {
        while self.pos < self.chars.len() {
            let c = self.chars[self.pos];
            if c == '\n' {
                self.line += 1;
                self.pos += 1;
            } else if c.is_whitespace() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn skip_comment(&mut self) {
        while self.pos < self.chars.len() && self.chars[self.pos] != '\n' {
            self.pos += 1;
        }
    }

    fn read_word(&mut self) -> Result<Token, ParseError> {
        let start_line = self.line;
        let mut value = String::new();
        let mut quoted = false;
        let mut in_quote = false;

        while self.pos < self.chars.len() {
            let c = self.chars[self.pos];
            if c == '"' {
                quoted = true;
                in_quote = !in_quote;
                self.pos += 1;
            } else if c == '\\' {
                quoted = true;
                self.pos += 1;
                if self.pos < self.chars.len() {
                    if self.chars[self.pos] == '\n' {
                        self.line += 1;
                    }
                    value.push(self.chars[self.pos]);
                    self.pos += 1;
                }
            } else if c.is_whitespace() && !in_quote {
                break;
            } else {
                if c == '\n' {
                    self.line += 1;
                }
                value.push(c);
                self.pos += 1;
            }
        }

        if in_quote {
            return Err(ParseError::new(
                "unterminated quote",
                self.file,
                start_line,
            ));
        }

        let token_type = if quoted { TokenType::Word } else { classify(&value) };
        Ok(Token {
            token_type,
            value,
            line: start_line,
            quoted,
        })
    }

    // Raw capture after `actions ... {`, ending at the balancing `}`.
    // Braces are counted naively; this is how Jam itself scans action text.
    fn read_action_body(&mut self) -> Result<Token, ParseError> {
        let start_line = self.line;
        let mut depth = 1usize;
        let mut body = String::new();

        while self.pos < self.chars.len() {
            let c = self.chars[self.pos];
            if c == '{' {
                depth += 1;
            } else if c == '}' {
                depth -= 1;
                if depth == 0 {
                    self.pos += 1;
                    return Ok(Token {
                        token_type: TokenType::ActionBody,
                        value: body,
                        line: start_line,
                        quoted: false,
                    });
                }
            } else if c == '\n' {
                self.line += 1;
            }
            body.push(c);
            self.pos += 1;
        }

        Err(ParseError::new(
            "unterminated actions body",
            self.file,
            start_line,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Vec<Token> {
        Lexer::new(input, "test").tokenize().unwrap()
    }

    #[test]
    fn test_simple_invocation() {
        let tokens = lex("ECHO hello world ;");
        assert_eq!(tokens.len(), 5);
        assert_eq!(tokens[0].token_type, TokenType::Word);
        assert_eq!(tokens[0].value, "ECHO");
        assert_eq!(tokens[3].token_type, TokenType::Semicolon);
        assert_eq!(tokens[4].token_type, TokenType::Eof);
    }

    #[test]
    fn test_punctuation_only_standalone() {
        let tokens = lex("a=b c ;");
        assert_eq!(tokens[0].token_type, TokenType::Word);
        assert_eq!(tokens[0].value, "a=b");

        let tokens = lex("X = y ;");
        assert_eq!(tokens[1].token_type, TokenType::Equals);
    }

    #[test]
    fn test_operators() {
        let tokens = lex("X += a ; Y ?= b ;");
        assert_eq!(tokens[1].token_type, TokenType::PlusEquals);
        assert_eq!(tokens[5].token_type, TokenType::QuestionEquals);
    }

    #[test]
    fn test_keywords() {
        let tokens = lex("if x { } else { }");
        assert_eq!(tokens[0].token_type, TokenType::If);
        assert_eq!(tokens[4].token_type, TokenType::Else);
    }

    #[test]
    fn test_quoted_word_is_never_keyword() {
        let tokens = lex("ECHO \"if\" ;");
        assert_eq!(tokens[1].token_type, TokenType::Word);
        assert_eq!(tokens[1].value, "if");
        assert!(tokens[1].quoted);
    }

    #[test]
    fn test_quotes_group_whitespace() {
        let tokens = lex("ECHO \"hello world\" ;");
        assert_eq!(tokens[1].value, "hello world");
        assert!(tokens[1].quoted);
    }

    #[test]
    fn test_backslash_escape() {
        let tokens = lex("ECHO a\\ b ;");
        assert_eq!(tokens[1].value, "a b");
        assert!(tokens[1].quoted);
    }

    #[test]
    fn test_comment() {
        let tokens = lex("# a comment\nECHO x ;");
        assert_eq!(tokens[0].value, "ECHO");
    }

    #[test]
    fn test_line_numbers() {
        let tokens = lex("A = 1 ;\nB = 2 ;");
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[4].line, 2);
    }

    #[test]
    fn test_action_body_raw() {
        let tokens = lex("actions cp {\n cp $(>) $(<)\n}");
        let body = tokens
            .iter()
            .find(|t| t.token_type == TokenType::ActionBody)
            .unwrap();
        assert_eq!(body.value, "\n cp $(>) $(<)\n");
        // the closing brace is still emitted
        assert!(tokens.iter().any(|t| t.token_type == TokenType::RBrace));
    }

    #[test]
    fn test_action_body_nested_braces() {
        let tokens = lex("actions sh { if true; then { echo x; } fi }");
        let body = tokens
            .iter()
            .find(|t| t.token_type == TokenType::ActionBody)
            .unwrap();
        assert!(body.value.contains("{ echo x; }"));
    }

    #[test]
    fn test_actions_flag_does_not_leak_past_semicolon() {
        // `actions` as an ordinary argument must not arm raw capture
        let tokens = lex("ECHO actions ;\nif x { ECHO y ; }");
        assert!(!tokens.iter().any(|t| t.token_type == TokenType::ActionBody));
    }

    #[test]
    fn test_unterminated_quote() {
        assert!(Lexer::new("ECHO \"oops ;", "test").tokenize().is_err());
    }

    #[test]
    fn test_unterminated_actions() {
        assert!(Lexer::new("actions cp { cp a b", "test").tokenize().is_err());
    }
}
