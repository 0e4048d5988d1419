//! Recursive-descent parser for the shell language
//!
//! Grammar, informally:
//!
//! ```text
//! chunk    := (pipeline (NEWLINE | ';'))*
//! pipeline := form ('|' form)*
//! form     := compound (compound | option | '=' | redir)*
//! option   := '&' BAREWORD ('=' compound)?
//! redir    := REDIR compound?
//! compound := indexed indexed*            (adjacent, no whitespace)
//! indexed  := primary ('[' compound* ']')* (adjacent)
//! primary  := BAREWORD | QUOTED | VARIABLE | '(' chunk ')'
//!           | '[' compound* ']' | '[' ('&' compound '=' compound)* ']' | '[&]'
//!           | '{' ('|' signature '|')? chunk '}'
//! ```

use super::ast::*;
use super::lexer::{tokenize, RedirMode, Spanned, Token};
use crate::frontend::{ParseError, Source};

/// Parse a whole source into a chunk.
///
/// # Errors
///
/// A `ParseError` located at the offending token.
pub fn parse(source: &Source) -> Result<Chunk, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
    };
    let chunk = parser.chunk(None)?;
    match parser.peek() {
        Some(tok) => Err(parser.error(format!("unexpected {}", tok))),
        None => Ok(chunk),
    }
}

struct Parser<'s> {
    source: &'s Source,
    tokens: Vec<Spanned<Token>>,
    pos: usize,
}

fn is_word_start(tok: &Token) -> bool {
    matches!(
        tok,
        Token::Bareword(_)
            | Token::Quoted(_)
            | Token::Variable(_)
            | Token::LParen
            | Token::LBracket
            | Token::LBrace
    )
}

fn continues_compound(tok: &Token) -> bool {
    matches!(
        tok,
        Token::Bareword(_) | Token::Quoted(_) | Token::Variable(_) | Token::LParen
    )
}

impl Parser<'_> {
    // ═══════════════════════════════════════════════════════════════════
    // Token access
    // ═══════════════════════════════════════════════════════════════════

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn peek_is(&self, tok: &Token) -> bool {
        self.peek() == Some(tok)
    }

    fn advance(&mut self) -> Option<Spanned<Token>> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    /// Start of the next token, or end of input.
    fn here(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map_or(self.source.code.len(), |t| t.span.start)
    }

    /// End of the last consumed token.
    fn prev_end(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or(0, |t| t.span.end)
    }

    /// Whether the next token touches the previous one.
    fn adjacent(&self) -> bool {
        self.pos > 0 && self.here() == self.prev_end() && self.pos < self.tokens.len()
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message).with_location(self.source.location(self.here()))
    }

    fn describe_next(&self) -> String {
        self.peek()
            .map_or_else(|| "end of input".to_string(), ToString::to_string)
    }

    fn expect(&mut self, tok: &Token) -> Result<(), ParseError> {
        if self.peek_is(tok) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected {}, found {}", tok, self.describe_next())))
        }
    }

    fn skip_newlines(&mut self) {
        while self.peek_is(&Token::Newline) {
            self.pos += 1;
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), Some(Token::Newline | Token::Semicolon)) {
            self.pos += 1;
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Structure
    // ═══════════════════════════════════════════════════════════════════

    fn chunk(&mut self, close: Option<Token>) -> Result<Chunk, ParseError> {
        let mut pipelines = Vec::new();
        loop {
            self.skip_separators();
            match self.peek().cloned() {
                None => match &close {
                    Some(close) => {
                        return Err(self.error(format!("expected {}, found end of input", close)))
                    }
                    None => break,
                },
                Some(tok) if close.as_ref() == Some(&tok) => break,
                Some(_) => pipelines.push(self.pipeline()?),
            }
            match self.peek().cloned() {
                None | Some(Token::Newline | Token::Semicolon) => {}
                Some(tok) if close.as_ref() == Some(&tok) => {}
                Some(tok) => return Err(self.error(format!("unexpected {}", tok))),
            }
        }
        Ok(Chunk { pipelines })
    }

    fn pipeline(&mut self) -> Result<Pipeline, ParseError> {
        let start = self.here();
        let mut forms = vec![self.form()?];
        while self.peek_is(&Token::Pipe) {
            self.pos += 1;
            self.skip_newlines();
            forms.push(self.form()?);
        }
        Ok(Pipeline {
            forms,
            span: start..self.prev_end(),
        })
    }

    fn form(&mut self) -> Result<Form, ParseError> {
        let start = self.here();
        match self.peek() {
            Some(tok) if is_word_start(tok) => {}
            _ => return Err(self.error(format!("expected command, found {}", self.describe_next()))),
        }
        let head = self.compound()?;
        let mut items = Vec::new();
        let mut redirs = Vec::new();

        loop {
            match self.peek().cloned() {
                None
                | Some(
                    Token::Newline
                    | Token::Semicolon
                    | Token::Pipe
                    | Token::RParen
                    | Token::RBrace,
                ) => break,
                Some(Token::Amp) => items.push(FormItem::Opt(self.option()?)),
                Some(Token::Eq) => {
                    let start = self.here();
                    self.pos += 1;
                    items.push(FormItem::Eq(start..self.prev_end()));
                }
                Some(Token::Redir((fd, mode))) => redirs.push(self.redir(fd, mode)?),
                Some(tok) if is_word_start(&tok) => items.push(FormItem::Arg(self.compound()?)),
                Some(tok) => return Err(self.error(format!("unexpected {}", tok))),
            }
        }

        Ok(Form {
            head,
            items,
            redirs,
            span: start..self.prev_end(),
        })
    }

    fn option(&mut self) -> Result<OptionArg, ParseError> {
        let start = self.here();
        self.expect(&Token::Amp)?;
        let name = match self.peek().cloned() {
            Some(Token::Bareword(name)) if self.adjacent() => {
                self.pos += 1;
                name
            }
            _ => return Err(self.error("expected option name")),
        };
        let value = if self.peek_is(&Token::Eq) && self.adjacent() {
            self.pos += 1;
            match self.peek() {
                Some(tok) if is_word_start(tok) && self.adjacent() => Some(self.compound()?),
                _ => return Err(self.error("expected option value")),
            }
        } else {
            None
        };
        Ok(OptionArg {
            name,
            value,
            span: start..self.prev_end(),
        })
    }

    fn redir(&mut self, fd: Option<usize>, mode: RedirMode) -> Result<Redir, ParseError> {
        let start = self.here();
        self.pos += 1;
        let target = match mode {
            RedirMode::Dup(_) => None,
            RedirMode::Write | RedirMode::Append => match self.peek() {
                Some(tok) if is_word_start(tok) => Some(self.compound()?),
                _ => return Err(self.error("expected redirection target")),
            },
        };
        Ok(Redir {
            fd: fd.unwrap_or(1),
            mode,
            target,
            span: start..self.prev_end(),
        })
    }

    // ═══════════════════════════════════════════════════════════════════
    // Words
    // ═══════════════════════════════════════════════════════════════════

    fn compound(&mut self) -> Result<Compound, ParseError> {
        let start = self.here();
        let mut parts = vec![self.indexed()?];
        while self.adjacent() && self.peek().is_some_and(continues_compound) {
            parts.push(self.indexed()?);
        }
        Ok(Compound {
            parts,
            span: start..self.prev_end(),
        })
    }

    fn indexed(&mut self) -> Result<Indexed, ParseError> {
        let start = self.here();
        let head = self.primary()?;
        let mut indices = Vec::new();
        while self.peek_is(&Token::LBracket) && self.adjacent() {
            self.pos += 1;
            indices.push(self.words_until(&Token::RBracket)?);
        }
        Ok(Indexed {
            head,
            indices,
            span: start..self.prev_end(),
        })
    }

    /// Whitespace- or newline-separated words up to and including `close`.
    fn words_until(&mut self, close: &Token) -> Result<Vec<Compound>, ParseError> {
        let mut words = Vec::new();
        loop {
            self.skip_newlines();
            match self.peek() {
                Some(tok) if tok == close => {
                    self.pos += 1;
                    return Ok(words);
                }
                Some(tok) if is_word_start(tok) => words.push(self.compound()?),
                _ => {
                    return Err(self.error(format!(
                        "expected {}, found {}",
                        close,
                        self.describe_next()
                    )))
                }
            }
        }
    }

    fn primary(&mut self) -> Result<Primary, ParseError> {
        let start = self.here();
        let Some(Spanned { token, .. }) = self.advance() else {
            return Err(self.error("expected word, found end of input"));
        };
        match token {
            Token::Bareword(s) => Ok(Primary::Bareword(s)),
            Token::Quoted(s) => Ok(Primary::Quoted(s)),
            Token::Variable((name, explode)) => {
                if name.is_empty() {
                    return Err(ParseError::new("expected variable name")
                        .with_location(self.source.location(start)));
                }
                Ok(Primary::Variable { name, explode })
            }
            Token::LParen => {
                let chunk = self.chunk(Some(Token::RParen))?;
                self.expect(&Token::RParen)?;
                Ok(Primary::Capture(chunk))
            }
            Token::LBracket => self.list_or_map(),
            Token::LBrace => self.lambda(start),
            other => Err(ParseError::new(format!("unexpected {}", other))
                .with_location(self.source.location(start))),
        }
    }

    fn list_or_map(&mut self) -> Result<Primary, ParseError> {
        self.skip_newlines();
        if !self.peek_is(&Token::Amp) {
            return Ok(Primary::List(self.words_until(&Token::RBracket)?));
        }

        let mut pairs = Vec::new();
        loop {
            self.skip_newlines();
            if self.peek_is(&Token::RBracket) {
                self.pos += 1;
                return Ok(Primary::Map(pairs));
            }
            self.expect(&Token::Amp)?;
            if self.peek_is(&Token::RBracket) {
                continue;
            }
            if !(self.adjacent() && self.peek().is_some_and(is_word_start)) {
                return Err(self.error("expected map key"));
            }
            let key = self.compound()?;
            if !(self.peek_is(&Token::Eq) && self.adjacent()) {
                return Err(self.error("expected '=' after map key"));
            }
            self.pos += 1;
            if !(self.adjacent() && self.peek().is_some_and(is_word_start)) {
                return Err(self.error("expected map value"));
            }
            let value = self.compound()?;
            pairs.push((key, value));
        }
    }

    fn lambda(&mut self, start: usize) -> Result<Primary, ParseError> {
        let mut params = Vec::new();
        let mut options = Vec::new();
        let mut rest_options = None;

        if self.peek_is(&Token::Pipe) && self.adjacent() {
            self.pos += 1;
            loop {
                let here = self.here();
                match self.advance().map(|t| t.token) {
                    Some(Token::Pipe) => break,
                    Some(Token::Newline) => {}
                    Some(Token::Bareword(word)) => match word.strip_prefix('@') {
                        Some(name) => {
                            if params.iter().any(|p: &Param| p.rest) {
                                return Err(ParseError::new("multiple rest parameters")
                                    .with_location(self.source.location(here)));
                            }
                            params.push(Param {
                                name: name.to_string(),
                                rest: true,
                            });
                        }
                        None => params.push(Param {
                            name: word,
                            rest: false,
                        }),
                    },
                    Some(Token::Amp) => match self.advance().map(|t| t.token) {
                        Some(Token::Bareword(word)) => match word.strip_prefix('@') {
                            Some(name) => rest_options = Some(name.to_string()),
                            None => {
                                self.expect(&Token::Eq)?;
                                options.push((word, self.compound()?));
                            }
                        },
                        _ => {
                            return Err(ParseError::new("expected option name")
                                .with_location(self.source.location(here)))
                        }
                    },
                    Some(other) => {
                        return Err(ParseError::new(format!(
                            "unexpected {} in lambda signature",
                            other
                        ))
                        .with_location(self.source.location(here)))
                    }
                    None => return Err(self.error("unterminated lambda signature")),
                }
            }
        }

        let body = self.chunk(Some(Token::RBrace))?;
        self.expect(&Token::RBrace)?;
        Ok(Primary::Lambda(Lambda {
            params,
            options,
            rest_options,
            body,
            span: start..self.prev_end(),
        }))
    }
}
