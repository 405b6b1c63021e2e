//! Lexical analysis: turns the raw source text into a stream of tokens.
//!
//! The scanner is pull-based – the parser asks for one token at a time and
//! no token vector is materialised. It knows nothing about semantics beyond
//! recognising reserved words, operators and literals. Multi-character
//! operators are matched longest-first to avoid ambiguity, and comments may
//! nest to arbitrary depth.

use log::trace;

use crate::error::{CompileError, CompileResult};
use crate::token::{SourcePos, Token, TokenType, MAX_ID_LENGTH, RESERVED_WORDS};

/// Initial capacity for string literal payloads; grown by doubling.
const INITIAL_STRING_LEN: usize = 1024;

/// A cursor over the source bytes with one character of lookahead.
pub struct Scanner<'a> {
  src: &'a [u8],
  next: usize,
  ch: Option<u8>,
  pos: SourcePos,
}

impl<'a> Scanner<'a> {
  pub fn new(source: &'a str) -> Self {
    let mut scanner = Self {
      src: source.as_bytes(),
      next: 0,
      ch: None,
      pos: SourcePos::new(1, 0),
    };
    scanner.next_char();
    scanner
  }

  /// Advance to the next token, skipping whitespace and comments. The
  /// position in the returned token refers to the token's first character.
  pub fn get_token(&mut self) -> CompileResult<Token> {
    loop {
      while matches!(self.ch, Some(b' ') | Some(b'\t') | Some(b'\n')) {
        self.next_char();
      }

      let start = self.pos;

      let Some(ch) = self.ch else {
        return Ok(Token::new(TokenType::Eof, start));
      };

      if ch.is_ascii_alphabetic() || ch == b'_' {
        return self.scan_word(start);
      }

      if ch.is_ascii_digit() {
        return self.scan_number(start);
      }

      match ch {
        b'"' => return self.scan_string(start),
        b'{' => {
          self.skip_comment()?;
          self.next_char();
          continue;
        }
        b'(' => return Ok(self.single(TokenType::OpenParenthesis, start)),
        b')' => return Ok(self.single(TokenType::CloseParenthesis, start)),
        b'[' => return Ok(self.single(TokenType::OpenBracket, start)),
        b']' => return Ok(self.single(TokenType::CloseBracket, start)),
        b'+' => return Ok(self.single(TokenType::Plus, start)),
        b'-' => return Ok(self.single(TokenType::Minus, start)),
        b'*' => return Ok(self.single(TokenType::Multiply, start)),
        b'/' => return Ok(self.single(TokenType::Divide, start)),
        b';' => return Ok(self.single(TokenType::Semicolon, start)),
        b',' => return Ok(self.single(TokenType::Comma, start)),
        b'.' => return Ok(self.single(TokenType::Concatenate, start)),
        b'=' => return Ok(self.single(TokenType::Equal, start)),
        b':' => {
          self.next_char();
          if self.ch == Some(b'=') {
            return Ok(self.single(TokenType::Gets, start));
          }
          return Err(illegal_character(start, b':'));
        }
        b'<' => {
          self.next_char();
          return Ok(match self.ch {
            Some(b'>') => self.single(TokenType::NotEqual, start),
            Some(b'=') => self.single(TokenType::LessEqual, start),
            _ => Token::new(TokenType::LessThan, start),
          });
        }
        b'>' => {
          self.next_char();
          return Ok(match self.ch {
            Some(b'=') => self.single(TokenType::GreaterEqual, start),
            _ => Token::new(TokenType::GreaterThan, start),
          });
        }
        other => return Err(illegal_character(start, other)),
      }
    }
  }

  // ----- Utility functions -----

  /// Read the next source character, maintaining the one-based position.
  /// The column counter advances per character and resets after a newline,
  /// so the line number always equals one plus the newlines consumed.
  fn next_char(&mut self) {
    let last = self.ch;
    self.ch = self.src.get(self.next).copied();
    if self.ch.is_some() {
      self.next += 1;
    }
    match (last, self.ch) {
      (Some(b'\n'), _) => {
        self.pos.line += 1;
        self.pos.col = 1;
      }
      (_, Some(_)) => self.pos.col += 1,
      _ => {}
    }
  }

  /// Consume the current character and produce a payload-free token.
  fn single(&mut self, typ: TokenType, start: SourcePos) -> Token {
    self.next_char();
    Token::new(typ, start)
  }

  /// Scan a reserved word or an identifier of at most [`MAX_ID_LENGTH`]
  /// characters. Reserved words are recognised by binary search.
  fn scan_word(&mut self, start: SourcePos) -> CompileResult<Token> {
    let mut lexeme = String::new();

    while let Some(ch) = self.ch {
      if !(ch.is_ascii_alphanumeric() || ch == b'_') {
        break;
      }
      if lexeme.len() == MAX_ID_LENGTH {
        return Err(CompileError::at(start, "identifier too long"));
      }
      lexeme.push(char::from(ch));
      self.next_char();
    }

    match RESERVED_WORDS.binary_search_by(|(word, _)| (*word).cmp(lexeme.as_str())) {
      Ok(index) => Ok(Token::new(RESERVED_WORDS[index].1, start)),
      Err(_) => {
        trace!("identifier '{lexeme}' at {start}");
        let mut token = Token::new(TokenType::Id, start);
        token.lexeme = lexeme;
        Ok(token)
      }
    }
  }

  /// Accumulate a number with an overflow check before every step: the
  /// running value may never exceed `(INT_MAX - digit) / 10`.
  fn scan_number(&mut self, start: SourcePos) -> CompileResult<Token> {
    let mut value: i32 = 0;

    while let Some(ch) = self.ch {
      if !ch.is_ascii_digit() {
        break;
      }
      let digit = i32::from(ch - b'0');
      if value > (i32::MAX - digit) / 10 {
        return Err(CompileError::at(start, "number too large"));
      }
      value = 10 * value + digit;
      self.next_char();
    }

    let mut token = Token::new(TokenType::Number, start);
    token.value = value;
    Ok(token)
  }

  /// Scan a string literal. Only printable ASCII is allowed inside; the
  /// accepted escapes `\n`, `\t`, `\"` and `\\` are stored as their
  /// two-character sequence verbatim.
  fn scan_string(&mut self, start: SourcePos) -> CompileResult<Token> {
    let mut payload = String::with_capacity(INITIAL_STRING_LEN);
    self.next_char();

    loop {
      match self.ch {
        None => return Err(CompileError::at(start, "string not closed")),
        Some(b'"') => break,
        Some(ch) if !ch.is_ascii_graphic() && ch != b' ' => {
          return Err(CompileError::at(
            self.pos,
            format!("non-printable character (ASCII #{ch}) in string"),
          ));
        }
        Some(b'\\') => {
          let escape_pos = self.pos;
          self.next_char();
          match self.ch {
            Some(esc @ (b'n' | b't' | b'"' | b'\\')) => {
              payload.push('\\');
              payload.push(char::from(esc));
              self.next_char();
            }
            Some(other) => {
              return Err(CompileError::at(
                escape_pos,
                format!("illegal escape code '\\{}' in string", char::from(other)),
              ));
            }
            None => return Err(CompileError::at(start, "string not closed")),
          }
        }
        Some(ch) => {
          payload.push(char::from(ch));
          self.next_char();
        }
      }
    }

    self.next_char();
    let mut token = Token::new(TokenType::Str, start);
    token.string = payload;
    Ok(token)
  }

  /// Skip a comment, recursing on every nested opening brace. An unclosed
  /// comment reports at the brace that opened the level which ran out of
  /// input.
  fn skip_comment(&mut self) -> CompileResult<()> {
    let start = self.pos;
    self.next_char();

    loop {
      match self.ch {
        None => return Err(CompileError::at(start, "comment not closed")),
        Some(b'}') => return Ok(()),
        Some(b'{') => {
          self.skip_comment()?;
          self.next_char();
        }
        Some(_) => self.next_char(),
      }
    }
  }
}

fn illegal_character(pos: SourcePos, ch: u8) -> CompileError {
  CompileError::at(
    pos,
    format!("illegal character '{}' (ASCII #{ch})", char::from(ch)),
  )
}
