use crate::ast::{Attribute, Content, Document, Element};
use crate::error::ParserError;
use crate::lexer::{Lexer, Token, TokenType};
use miette::NamedSource;
use std::sync::Arc;

/// Recursive-descent parser for definition markup.
pub struct Parser<'a> {
    source: Arc<NamedSource<String>>,
    source_text: &'a str,
    tokens: Vec<Token>,
    position: usize,
}

impl<'a> Parser<'a> {
    pub fn new(source_text: &'a str) -> Self {
        Self::new_with_name(source_text, "source.xml".to_string())
    }

    pub fn new_with_name(source_text: &'a str, name: String) -> Self {
        let mut lexer = Lexer::new(source_text);
        let tokens = lexer.lex();
        Self {
            source: Arc::new(NamedSource::new(name, source_text.to_string())),
            source_text,
            tokens,
            position: 0,
        }
    }

    /// Parses the whole input.
    ///
    /// ```ebnf
    /// Document ::= Misc* Element? Misc* Eof
    /// Misc     ::= Whitespace | Comment | Declaration
    /// ```
    pub fn parse_document(&mut self) -> Result<Document, ParserError> {
        self.skip_misc();
        if self.check(&TokenType::Eof) {
            return Ok(Document::default());
        }

        let root = self.parse_element()?;

        self.skip_misc();
        if !self.check(&TokenType::Eof) {
            let token = self.current_token()?;
            return Err(ParserError::TrailingContent {
                src: (*self.source).clone(),
                span: (token.pos_start, token.pos_end - token.pos_start).into(),
            });
        }
        Ok(Document::new(root))
    }

    /// ```ebnf
    /// Element   ::= "<" Name Attribute* ( "/>" | ">" Content* "</" Name ">" )
    /// Attribute ::= Name "=" String
    /// ```
    fn parse_element(&mut self) -> Result<Element, ParserError> {
        let start = self.current_token()?.pos_start;
        self.expect(&TokenType::TagOpen, "'<'")?;
        let name = self.expect_name("an element name")?;

        let mut element = Element::new(name);
        element.pos_start = start;

        loop {
            let token = self.current_token()?.clone();
            match token.ttype {
                TokenType::Name(attr_name) => {
                    self.advance();
                    self.expect(&TokenType::Equals, "'='")?;
                    let value = match &self.current_token()?.ttype {
                        TokenType::String(v) => v.clone(),
                        _ => return self.err_unexpected("a quoted attribute value"),
                    };
                    self.advance();
                    if element.attribute(&attr_name).is_some() {
                        return Err(ParserError::DuplicateAttribute {
                            src: (*self.source).clone(),
                            span: (token.pos_start, token.pos_end - token.pos_start).into(),
                            name: attr_name,
                        });
                    }
                    element.attributes.push(Attribute {
                        name: attr_name,
                        value,
                    });
                }
                TokenType::EmptyTagClose => {
                    element.pos_end = token.pos_end;
                    self.advance();
                    return Ok(element);
                }
                TokenType::TagClose => {
                    self.advance();
                    break;
                }
                TokenType::Eof => return self.err_eof(),
                _ => return self.err_unexpected("an attribute, '>' or '/>'"),
            }
        }

        self.parse_content(&mut element)?;

        let close = self.current_token()?.clone();
        self.expect(&TokenType::EndTagOpen, "a closing tag")?;
        let close_name = self.expect_name("the closing tag name")?;
        if close_name != element.name {
            return Err(ParserError::MismatchedTag {
                src: (*self.source).clone(),
                span: (close.pos_start, self.current_token()?.pos_end - close.pos_start).into(),
                expected: element.name,
                found: close_name,
            });
        }
        element.pos_end = self.current_token()?.pos_end;
        self.expect(&TokenType::TagClose, "'>'")?;
        Ok(element)
    }

    /// ```ebnf
    /// Content ::= Element | Text | Whitespace | CData | Comment | Declaration
    /// ```
    fn parse_content(&mut self, element: &mut Element) -> Result<(), ParserError> {
        loop {
            let token = self.current_token()?;
            let content = match &token.ttype {
                TokenType::EndTagOpen => return Ok(()),
                TokenType::Eof => return self.err_eof(),
                TokenType::TagOpen => Content::Element(self.parse_element()?),
                TokenType::Text(t) => Content::Text(t.clone()),
                TokenType::Whitespace(t) => Content::Whitespace(t.clone()),
                TokenType::CData(t) => Content::CData(t.clone()),
                TokenType::Comment(t) => Content::Comment(t.clone()),
                TokenType::Declaration(t) => Content::ProcessingInstruction(t.clone()),
                _ => return self.err_unexpected("element content"),
            };
            if !matches!(content, Content::Element(_)) {
                self.advance();
            }
            element.children.push(content);
        }
    }

    fn skip_misc(&mut self) {
        while let Ok(token) = self.current_token() {
            match token.ttype {
                TokenType::Whitespace(_) | TokenType::Comment(_) | TokenType::Declaration(_) => {
                    self.advance()
                }
                _ => break,
            }
        }
    }

    fn expect_name(&mut self, expected: &str) -> Result<String, ParserError> {
        match &self.current_token()?.ttype {
            TokenType::Name(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => self.err_unexpected(expected),
        }
    }

    fn current_token(&self) -> Result<&Token, ParserError> {
        self.tokens.get(self.position).ok_or_else(|| {
            let pos = self.source_text.len().saturating_sub(1);
            ParserError::UnexpectedEof {
                src: (*self.source).clone(),
                span: (pos, 0).into(),
            }
        })
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    fn expect(&mut self, expected: &TokenType, description: &str) -> Result<(), ParserError> {
        if self.check(expected) {
            self.advance();
            Ok(())
        } else if self.check(&TokenType::Eof) {
            self.err_eof()
        } else {
            self.err_unexpected(description)
        }
    }

    fn check(&self, ttype: &TokenType) -> bool {
        if let Ok(token) = self.current_token() {
            std::mem::discriminant(&token.ttype) == std::mem::discriminant(ttype)
        } else {
            false
        }
    }

    fn err_unexpected<T>(&self, expected: &str) -> Result<T, ParserError> {
        let token = self.current_token()?;
        if token.ttype == TokenType::Eof {
            return self.err_eof();
        }
        Err(ParserError::UnexpectedToken {
            src: (*self.source).clone(),
            span: (token.pos_start, token.pos_end - token.pos_start).into(),
            expected: expected.to_string(),
        })
    }

    fn err_eof<T>(&self) -> Result<T, ParserError> {
        let pos = self.source_text.len();
        Err(ParserError::UnexpectedEof {
            src: (*self.source).clone(),
            span: (pos, 0).into(),
        })
    }
}

/// Parses a complete document from text.
///
/// # Errors
/// Returns a [`ParserError`] describing the first syntax problem found.
pub fn parse_str(source: &str, name: &str) -> Result<Document, ParserError> {
    Parser::new_with_name(source, name.to_string()).parse_document()
}
