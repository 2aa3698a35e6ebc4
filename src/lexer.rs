use crate::utils::decode_entities;

/// Represents the different kinds of tokens that the lexer can produce.
///
/// Markup is lexed in two modes. Between tags the lexer produces text-like
/// tokens; after a `<` it switches to tag mode and produces names, `=` and
/// quoted values until the tag is closed again.
#[derive(Debug, PartialEq, Clone)]
pub enum TokenType {
    // == Special Tokens ==
    /// Represents the end of the input.
    Eof,
    /// Represents a token that could not be recognized, such as an unclosed
    /// comment or attribute value.
    Unknown,

    // == Content mode ==
    /// Character data with entities already decoded.
    Text(String),
    /// Character data made only of whitespace.
    Whitespace(String),
    /// `<!-- ... -->`, holding the raw comment body.
    Comment(String),
    /// `<![CDATA[ ... ]]>`, holding the raw section body.
    CData(String),
    /// `<? ... ?>` or `<! ... >` declarations, holding the raw body.
    Declaration(String),
    /// `<`, starting an opening tag.
    TagOpen,
    /// `</`, starting a closing tag.
    EndTagOpen,

    // == Tag mode ==
    /// An element or attribute name.
    Name(String),
    /// `=` between an attribute name and its value.
    Equals,
    /// A quoted attribute value with entities decoded.
    String(String),
    /// `>`, ending a tag.
    TagClose,
    /// `/>`, ending a self-closing tag.
    EmptyTagClose,
}

/// A token with its type and position
#[derive(Debug, Clone)]
pub struct Token {
    pub ttype: TokenType,
    pub pos_start: usize,
    pub pos_end: usize,
}

impl Token {
    pub fn new(ttype: TokenType, pos_start: usize, pos_end: usize) -> Token {
        Token {
            ttype,
            pos_start,
            pos_end,
        }
    }
}

pub struct Lexer<'a> {
    input: &'a str,
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    position: usize,
    in_tag: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.chars().peekable(),
            position: 0,
            in_tag: false,
        }
    }

    pub fn lex(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            if token.ttype == TokenType::Eof {
                tokens.push(token);
                break;
            }
            tokens.push(token);
        }
        tokens
    }

    pub fn next_token(&mut self) -> Token {
        if self.in_tag {
            self.skip_whitespace();
        }
        let start_pos = self.position;

        let ttype = if self.in_tag {
            self.next_tag_token()
        } else {
            self.next_content_token()
        };

        Token::new(ttype, start_pos, self.position)
    }

    fn next_content_token(&mut self) -> TokenType {
        match self.peek() {
            None => TokenType::Eof,
            Some('<') => {
                let rest = &self.input[self.position..];
                if rest.starts_with("<!--") {
                    self.read_delimited("<!--", "-->", TokenType::Comment)
                } else if rest.starts_with("<![CDATA[") {
                    self.read_delimited("<![CDATA[", "]]>", TokenType::CData)
                } else if rest.starts_with("<?") {
                    self.read_delimited("<?", "?>", TokenType::Declaration)
                } else if rest.starts_with("<!") {
                    self.read_delimited("<!", ">", TokenType::Declaration)
                } else if rest.starts_with("</") {
                    self.advance();
                    self.advance();
                    self.in_tag = true;
                    TokenType::EndTagOpen
                } else {
                    self.advance();
                    self.in_tag = true;
                    TokenType::TagOpen
                }
            }
            Some(_) => self.read_text(),
        }
    }

    fn next_tag_token(&mut self) -> TokenType {
        let Some(c) = self.advance() else {
            return TokenType::Eof;
        };
        match c {
            '=' => TokenType::Equals,
            '>' => {
                self.in_tag = false;
                TokenType::TagClose
            }
            '/' => {
                if self.peek() == Some(&'>') {
                    self.advance();
                    self.in_tag = false;
                    TokenType::EmptyTagClose
                } else {
                    TokenType::Unknown
                }
            }
            '"' | '\'' => self.read_string(c),
            c if is_name_start(c) => self.read_name(c),
            _ => TokenType::Unknown,
        }
    }

    fn advance(&mut self) -> Option<char> {
        let char = self.chars.next();
        if let Some(c) = char {
            self.position += c.len_utf8();
        }
        char
    }

    fn peek(&mut self) -> Option<&char> {
        self.chars.peek()
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Reads everything between `open` and `close`. An unterminated section
    /// consumes the rest of the input and yields `Unknown`.
    fn read_delimited(
        &mut self,
        open: &str,
        close: &str,
        make: fn(String) -> TokenType,
    ) -> TokenType {
        for _ in open.chars() {
            self.advance();
        }
        let body_start = self.position;
        match self.input[body_start..].find(close) {
            Some(offset) => {
                let body = self.input[body_start..body_start + offset].to_string();
                while self.position < body_start + offset + close.len() {
                    self.advance();
                }
                make(body)
            }
            None => {
                while self.advance().is_some() {}
                TokenType::Unknown
            }
        }
    }

    fn read_text(&mut self) -> TokenType {
        let start = self.position;
        while let Some(c) = self.peek() {
            if *c == '<' {
                break;
            }
            self.advance();
        }
        let raw = &self.input[start..self.position];
        if raw.chars().all(char::is_whitespace) {
            TokenType::Whitespace(raw.to_string())
        } else {
            TokenType::Text(decode_entities(raw))
        }
    }

    fn read_string(&mut self, quote: char) -> TokenType {
        let start = self.position;
        while let Some(c) = self.peek() {
            if *c == quote {
                let raw = &self.input[start..self.position];
                let value = decode_entities(raw);
                self.advance(); // Consume the closing quote
                return TokenType::String(value);
            }
            if *c == '<' {
                break;
            }
            self.advance();
        }
        TokenType::Unknown // Unclosed string
    }

    fn read_name(&mut self, first_char: char) -> TokenType {
        let mut name = String::new();
        name.push(first_char);

        while let Some(&c) = self.peek() {
            if is_name_char(c) {
                name.push(c);
                self.advance();
            } else {
                break;
            }
        }
        TokenType::Name(name)
    }
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == ':'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | ':' | '-' | '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_tokens(input: &str, expected: Vec<TokenType>) {
        let mut lexer = Lexer::new(input);
        let tokens = lexer.lex();
        let token_types: Vec<TokenType> = tokens.into_iter().map(|t| t.ttype).collect();

        // Filter out whitespace and comments for most tests
        let filtered_tokens: Vec<TokenType> = token_types
            .into_iter()
            .filter(|t| !matches!(t, TokenType::Whitespace(_) | TokenType::Comment(_)))
            .collect();

        assert_eq!(filtered_tokens, expected);
    }

    #[test]
    fn test_eof() {
        assert_tokens("", vec![TokenType::Eof]);
    }

    #[test]
    fn test_simple_element() {
        assert_tokens(
            r#"<Widget Type="Item">text</Widget>"#,
            vec![
                TokenType::TagOpen,
                TokenType::Name("Widget".to_string()),
                TokenType::Name("Type".to_string()),
                TokenType::Equals,
                TokenType::String("Item".to_string()),
                TokenType::TagClose,
                TokenType::Text("text".to_string()),
                TokenType::EndTagOpen,
                TokenType::Name("Widget".to_string()),
                TokenType::TagClose,
                TokenType::Eof,
            ],
        );
    }

    #[test]
    fn test_self_closing_and_single_quotes() {
        assert_tokens(
            "<li Null='true'/>",
            vec![
                TokenType::TagOpen,
                TokenType::Name("li".to_string()),
                TokenType::Name("Null".to_string()),
                TokenType::Equals,
                TokenType::String("true".to_string()),
                TokenType::EmptyTagClose,
                TokenType::Eof,
            ],
        );
    }

    #[test]
    fn test_comments_cdata_and_declarations() {
        let mut lexer = Lexer::new("<?xml version=\"1.0\"?><!-- note --><![CDATA[a<b]]>");
        let tokens: Vec<TokenType> = lexer.lex().into_iter().map(|t| t.ttype).collect();
        assert_eq!(
            tokens,
            vec![
                TokenType::Declaration("xml version=\"1.0\"".to_string()),
                TokenType::Comment(" note ".to_string()),
                TokenType::CData("a<b".to_string()),
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_entities_are_decoded() {
        assert_tokens(
            "<a>1 &lt; 2 &amp;&#65;&#x42;</a>",
            vec![
                TokenType::TagOpen,
                TokenType::Name("a".to_string()),
                TokenType::TagClose,
                TokenType::Text("1 < 2 &AB".to_string()),
                TokenType::EndTagOpen,
                TokenType::Name("a".to_string()),
                TokenType::TagClose,
                TokenType::Eof,
            ],
        );
    }

    #[test]
    fn test_whitespace_is_kept_between_tags() {
        let mut lexer = Lexer::new("<a>\n  <b/>\n</a>");
        let tokens: Vec<TokenType> = lexer.lex().into_iter().map(|t| t.ttype).collect();
        assert_eq!(tokens[3], TokenType::Whitespace("\n  ".to_string()));
    }

    #[test]
    fn test_unclosed_comment_is_unknown() {
        let mut lexer = Lexer::new("<!-- never closed");
        let tokens = lexer.lex();
        assert_eq!(tokens[0].ttype, TokenType::Unknown);
        assert_eq!(tokens[1].ttype, TokenType::Eof);
    }

    #[test]
    fn test_positions_are_byte_offsets() {
        let mut lexer = Lexer::new("<é a=\"1\"/>");
        let tokens = lexer.lex();
        assert_eq!(tokens[1].pos_start, 1);
        assert_eq!(tokens[1].pos_end, 3);
    }
}
