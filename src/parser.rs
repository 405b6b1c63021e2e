//! Recursive-descent parser for the ALAN-2022 grammar.
//!
//! There is no AST: one method per production recognises the input and
//! drives the symbol table and the code emitter synchronously, so code falls
//! out of the parse in a single pass. The scanner is pulled one token at a
//! time and `token` always holds the single token of lookahead.

use log::debug;

use crate::codegen::{Bytecode, CodeGen, JvmAType};
use crate::error::{CompileError, CompileResult};
use crate::scanner::Scanner;
use crate::symboltable::{IdProp, SymbolTable};
use crate::token::{SourcePos, Token, TokenType};
use crate::valtypes::ValType;

/// Parse a complete source unit, producing the filled code generator.
pub fn parse(source: &str) -> CompileResult<CodeGen> {
  let mut scanner = Scanner::new(source);
  let token = scanner.get_token()?;
  let mut parser = Parser {
    scanner,
    token,
    symbols: SymbolTable::new(),
    code: CodeGen::new(),
    return_type: ValType::CALLABLE,
  };
  parser.parse_source()?;
  Ok(parser.code)
}

struct Parser<'a> {
  scanner: Scanner<'a>,
  /// The lookahead token.
  token: Token,
  symbols: SymbolTable,
  code: CodeGen,
  /// The type of the subroutine being parsed; governs `leave`.
  return_type: ValType,
}

// Token-class predicates from the grammar's FIRST sets.

fn starts_expr(typ: TokenType) -> bool {
  matches!(
    typ,
    TokenType::Minus
      | TokenType::Id
      | TokenType::True
      | TokenType::False
      | TokenType::Not
      | TokenType::Number
      | TokenType::OpenParenthesis
  )
}

fn starts_statement(typ: TokenType) -> bool {
  matches!(
    typ,
    TokenType::Id
      | TokenType::Call
      | TokenType::If
      | TokenType::Get
      | TokenType::Leave
      | TokenType::Put
      | TokenType::While
  )
}

fn is_type_token(typ: TokenType) -> bool {
  matches!(typ, TokenType::Boolean | TokenType::Integer)
}

fn relop_bytecode(typ: TokenType) -> Option<Bytecode> {
  match typ {
    TokenType::Equal => Some(Bytecode::IfIcmpeq),
    TokenType::GreaterEqual => Some(Bytecode::IfIcmpge),
    TokenType::GreaterThan => Some(Bytecode::IfIcmpgt),
    TokenType::LessEqual => Some(Bytecode::IfIcmple),
    TokenType::LessThan => Some(Bytecode::IfIcmplt),
    TokenType::NotEqual => Some(Bytecode::IfIcmpne),
    _ => None,
  }
}

impl<'a> Parser<'a> {
  // ----- Token plumbing -----

  fn advance(&mut self) -> CompileResult<()> {
    self.token = self.scanner.get_token()?;
    Ok(())
  }

  fn expected(&self, typ: TokenType) -> CompileError {
    CompileError::at(
      self.token.pos,
      format!("expected {}, but found {}", typ, self.token.typ),
    )
  }

  fn expect(&mut self, typ: TokenType) -> CompileResult<()> {
    if self.token.typ == typ {
      self.advance()
    } else {
      Err(self.expected(typ))
    }
  }

  fn expect_id(&mut self) -> CompileResult<(String, SourcePos)> {
    if self.token.typ == TokenType::Id {
      let name = std::mem::take(&mut self.token.lexeme);
      let pos = self.token.pos;
      self.advance()?;
      Ok((name, pos))
    } else {
      Err(self.expected(TokenType::Id))
    }
  }

  // ----- Semantic helpers -----

  fn lookup(&self, name: &str, pos: SourcePos) -> CompileResult<IdProp> {
    self
      .symbols
      .find_name(name)
      .cloned()
      .ok_or_else(|| CompileError::at(pos, format!("unknown identifier {name}")))
  }

  fn check_types(&self, found: ValType, expected: ValType, pos: SourcePos) -> CompileResult<()> {
    if found == expected {
      Ok(())
    } else {
      Err(CompileError::at(
        pos,
        format!("incompatible types (expected {expected}, found {found})"),
      ))
    }
  }

  // ----- Parser routines -----

  /// `source = "source" id { funcdef } body`
  fn parse_source(&mut self) -> CompileResult<()> {
    debug!("<source>");
    self.expect(TokenType::Source)?;
    let (class_name, _) = self.expect_id()?;
    self.code.set_class_name(&class_name);

    while self.token.typ == TokenType::Function {
      self.parse_funcdef()?;
    }

    self.return_type = ValType::CALLABLE;
    self
      .code
      .init_subroutine("main", IdProp::callable(ValType::CALLABLE, Vec::new()));
    self.parse_body()?;
    self.code.gen_1(Bytecode::Return);
    let width = self.symbols.variables_width();
    self.code.close_subroutine(width);

    if self.token.typ != TokenType::Eof {
      return Err(self.expected(TokenType::Eof));
    }
    Ok(())
  }

  /// `funcdef = "function" id "(" [type id {"," type id}] ")" ["to" type] body`
  fn parse_funcdef(&mut self) -> CompileResult<()> {
    self.expect(TokenType::Function)?;
    let (name, name_pos) = self.expect_id()?;
    debug!("<funcdef> {name}");
    self.expect(TokenType::OpenParenthesis)?;

    // The parameter list is collected before the subroutine scope exists,
    // then drained into it in declaration order.
    let mut params: Vec<(String, ValType, SourcePos)> = Vec::new();
    if is_type_token(self.token.typ) {
      loop {
        let typ = self.parse_type()?;
        let (id, pos) = self.expect_id()?;
        params.push((id, typ, pos));
        if self.token.typ != TokenType::Comma {
          break;
        }
        self.expect(TokenType::Comma)?;
      }
    }
    self.expect(TokenType::CloseParenthesis)?;

    let mut return_type = ValType::CALLABLE;
    if self.token.typ == TokenType::To {
      self.expect(TokenType::To)?;
      return_type = self.parse_type()?;
      return_type.set_as_callable();
    }

    let param_types = params.iter().map(|(_, typ, _)| *typ).collect();
    let prop = IdProp::callable(return_type, param_types);
    if !self.symbols.open_subroutine(&name, prop.clone()) {
      return Err(CompileError::at(
        name_pos,
        format!("multiple defenition of {name}"),
      ));
    }
    self.code.init_subroutine(&name, prop);
    self.return_type = return_type;

    for (id, typ, pos) in params {
      let offset = self.symbols.variables_width();
      if !self.symbols.insert_name(&id, IdProp::variable(typ, offset)) {
        return Err(CompileError::at(pos, format!("multiple defenition of {id}")));
      }
    }

    self.parse_body()?;
    if !return_type.returns_value() {
      self.code.gen_1(Bytecode::Return);
    }
    let width = self.symbols.variables_width();
    self.symbols.close_subroutine();
    self.code.close_subroutine(width);
    Ok(())
  }

  /// `body = "begin" {vardef} statements "end"`
  fn parse_body(&mut self) -> CompileResult<()> {
    self.expect(TokenType::Begin)?;
    while is_type_token(self.token.typ) {
      self.parse_vardef()?;
    }
    self.parse_statements()?;
    self.expect(TokenType::End)
  }

  /// `type = ("boolean" | "integer") ["array"]`
  fn parse_type(&mut self) -> CompileResult<ValType> {
    let mut typ = match self.token.typ {
      TokenType::Boolean => {
        self.expect(TokenType::Boolean)?;
        ValType::BOOLEAN
      }
      TokenType::Integer => {
        self.expect(TokenType::Integer)?;
        ValType::INTEGER
      }
      other => {
        return Err(CompileError::at(
          self.token.pos,
          format!("expected type, but found {other}"),
        ));
      }
    };
    if self.token.typ == TokenType::Array {
      self.expect(TokenType::Array)?;
      typ.set_as_array();
    }
    Ok(typ)
  }

  /// `vardef = type id {"," id} ";"`
  fn parse_vardef(&mut self) -> CompileResult<()> {
    let typ = self.parse_type()?;
    loop {
      let (name, pos) = self.expect_id()?;
      let offset = self.symbols.variables_width();
      if !self.symbols.insert_name(&name, IdProp::variable(typ, offset)) {
        return Err(CompileError::at(pos, format!("multiple defenition of {name}")));
      }
      if self.token.typ != TokenType::Comma {
        break;
      }
      self.expect(TokenType::Comma)?;
    }
    self.expect(TokenType::Semicolon)
  }

  /// `statements = "relax" | statement {";" statement}`
  fn parse_statements(&mut self) -> CompileResult<()> {
    if self.token.typ == TokenType::Relax {
      return self.expect(TokenType::Relax);
    }
    if !starts_statement(self.token.typ) {
      return Err(CompileError::at(
        self.token.pos,
        format!("expected statement, but found {}", self.token.typ),
      ));
    }
    self.parse_statement()?;
    while self.token.typ == TokenType::Semicolon {
      self.expect(TokenType::Semicolon)?;
      self.parse_statement()?;
    }
    Ok(())
  }

  /// `statement = assign | call | if | input | leave | output | while`
  fn parse_statement(&mut self) -> CompileResult<()> {
    debug!("<statement> {}", self.token.typ);
    match self.token.typ {
      TokenType::Id => self.parse_assign(),
      TokenType::Call => self.parse_call(),
      TokenType::If => self.parse_if(),
      TokenType::Get => self.parse_input(),
      TokenType::Leave => self.parse_leave(),
      TokenType::Put => self.parse_output(),
      TokenType::While => self.parse_while(),
      other => Err(CompileError::at(
        self.token.pos,
        format!("expected statement, but found {other}"),
      )),
    }
  }

  /// `assign = id ["[" simple "]"] ":=" (expr | "array" simple)`
  fn parse_assign(&mut self) -> CompileResult<()> {
    let (name, pos) = self.expect_id()?;
    let prop = self.lookup(&name, pos)?;
    if prop.typ.is_callable() {
      return Err(CompileError::at(pos, format!("{name} is not a variable")));
    }

    let mut subscripted = false;
    if self.token.typ == TokenType::OpenBracket {
      if !prop.typ.is_array() {
        return Err(CompileError::at(pos, format!("{name} is not an array")));
      }
      self.expect(TokenType::OpenBracket)?;
      self.code.gen_2(Bytecode::Aload, prop.offset as i32);
      let index_pos = self.token.pos;
      let index_type = self.parse_simple()?;
      self.check_types(index_type, ValType::INTEGER, index_pos)?;
      self.expect(TokenType::CloseBracket)?;
      subscripted = true;
    }

    self.expect(TokenType::Gets)?;

    if starts_expr(self.token.typ) {
      let expr_pos = self.token.pos;
      let expr_type = self.parse_expr()?;
      if subscripted {
        self.check_types(expr_type, prop.typ.element_type(), expr_pos)?;
        self.code.gen_1(Bytecode::Iastore);
      } else if prop.typ.is_array() {
        self.check_types(expr_type, prop.typ, expr_pos)?;
        self.code.gen_2(Bytecode::Astore, prop.offset as i32);
      } else {
        self.check_types(expr_type, prop.typ, expr_pos)?;
        self.code.gen_2(Bytecode::Istore, prop.offset as i32);
      }
    } else if self.token.typ == TokenType::Array {
      if subscripted || !prop.typ.is_array() {
        return Err(CompileError::at(pos, format!("{name} is not an array")));
      }
      self.expect(TokenType::Array)?;
      let size_pos = self.token.pos;
      let size_type = self.parse_simple()?;
      self.check_types(size_type, ValType::INTEGER, size_pos)?;
      // the access code is iaload/iastore, so both element types live in
      // an int array
      self.code.gen_newarray(JvmAType::Int);
      self.code.gen_2(Bytecode::Astore, prop.offset as i32);
    } else {
      return Err(CompileError::at(
        self.token.pos,
        format!("expected expression or string, but found {}", self.token.typ),
      ));
    }
    Ok(())
  }

  /// `call = "call" id "(" [expr {"," expr}] ")"`
  fn parse_call(&mut self) -> CompileResult<()> {
    self.expect(TokenType::Call)?;
    let (name, pos) = self.expect_id()?;
    let prop = self.lookup(&name, pos)?;
    if !prop.typ.is_callable() || prop.typ.returns_value() {
      return Err(CompileError::at(pos, format!("{name} is not a procedure")));
    }
    self.parse_arguments(&name, pos, &prop)
  }

  /// `if = "if" expr "then" statements {"elsif" expr "then" statements}
  /// ["else" statements] "end"`
  fn parse_if(&mut self) -> CompileResult<()> {
    self.expect(TokenType::If)?;
    let end = self.code.get_label();
    let mut next = self.code.get_label();

    let cond_pos = self.token.pos;
    let cond_type = self.parse_expr()?;
    self.check_types(cond_type, ValType::BOOLEAN, cond_pos)?;
    self.code.gen_2_label(Bytecode::Ifeq, next);
    self.expect(TokenType::Then)?;
    self.parse_statements()?;
    self.code.gen_2_label(Bytecode::Goto, end);
    self.code.gen_label(next);

    while self.token.typ == TokenType::Elsif {
      next = self.code.get_label();
      self.expect(TokenType::Elsif)?;
      let cond_pos = self.token.pos;
      let cond_type = self.parse_expr()?;
      self.check_types(cond_type, ValType::BOOLEAN, cond_pos)?;
      self.code.gen_2_label(Bytecode::Ifeq, next);
      self.expect(TokenType::Then)?;
      self.parse_statements()?;
      self.code.gen_2_label(Bytecode::Goto, end);
      self.code.gen_label(next);
    }

    if self.token.typ == TokenType::Else {
      self.expect(TokenType::Else)?;
      self.parse_statements()?;
    }

    self.code.gen_label(end);
    self.expect(TokenType::End)
  }

  /// `input = "get" id ["[" simple "]"]`
  fn parse_input(&mut self) -> CompileResult<()> {
    self.expect(TokenType::Get)?;
    let (name, pos) = self.expect_id()?;
    let prop = self.lookup(&name, pos)?;
    if prop.typ.is_callable() {
      return Err(CompileError::at(pos, format!("{name} is not a variable")));
    }

    if self.token.typ == TokenType::OpenBracket {
      if !prop.typ.is_array() {
        return Err(CompileError::at(pos, format!("{name} is not an array")));
      }
      self.expect(TokenType::OpenBracket)?;
      self.code.gen_2(Bytecode::Aload, prop.offset as i32);
      let index_pos = self.token.pos;
      let index_type = self.parse_simple()?;
      self.check_types(index_type, ValType::INTEGER, index_pos)?;
      self.expect(TokenType::CloseBracket)?;
      self.code.gen_read(prop.typ.element_type());
      self.code.gen_1(Bytecode::Iastore);
    } else {
      if prop.typ.is_array() {
        return Err(CompileError::at(
          pos,
          format!("expected scalar value, but found {}", prop.typ),
        ));
      }
      self.code.gen_read(prop.typ);
      self.code.gen_2(Bytecode::Istore, prop.offset as i32);
    }
    Ok(())
  }

  /// `leave = "leave" [expr]`
  fn parse_leave(&mut self) -> CompileResult<()> {
    self.expect(TokenType::Leave)?;
    if !starts_expr(self.token.typ) {
      return Ok(());
    }
    let expr_pos = self.token.pos;
    let expr_type = self.parse_expr()?;
    if !self.return_type.returns_value() {
      return Err(CompileError::at(
        expr_pos,
        "cannot return a value from a procedure",
      ));
    }
    self.check_types(expr_type, self.return_type.return_type(), expr_pos)?;
    if expr_type.is_array() {
      self.code.gen_1(Bytecode::Areturn);
    } else {
      self.code.gen_1(Bytecode::Ireturn);
    }
    Ok(())
  }

  /// `output = "put" (string | expr) {"." (string | expr)}`
  fn parse_output(&mut self) -> CompileResult<()> {
    self.expect(TokenType::Put)?;
    self.parse_output_item()?;
    while self.token.typ == TokenType::Concatenate {
      self.expect(TokenType::Concatenate)?;
      self.parse_output_item()?;
    }
    Ok(())
  }

  fn parse_output_item(&mut self) -> CompileResult<()> {
    if self.token.typ == TokenType::Str {
      let string = std::mem::take(&mut self.token.string);
      self.code.gen_print_string(string);
      self.expect(TokenType::Str)
    } else if starts_expr(self.token.typ) {
      let expr_pos = self.token.pos;
      let expr_type = self.parse_expr()?;
      if expr_type.is_array() {
        return Err(CompileError::at(
          expr_pos,
          format!("expected scalar value, but found {expr_type}"),
        ));
      }
      self.code.gen_print(expr_type);
      Ok(())
    } else {
      Err(CompileError::at(
        self.token.pos,
        format!("expected expression or string, but found {}", self.token.typ),
      ))
    }
  }

  /// `while = "while" expr "do" statements "end"`
  fn parse_while(&mut self) -> CompileResult<()> {
    self.expect(TokenType::While)?;
    let start = self.code.get_label();
    let end = self.code.get_label();

    self.code.gen_label(start);
    let cond_pos = self.token.pos;
    let cond_type = self.parse_expr()?;
    self.check_types(cond_type, ValType::BOOLEAN, cond_pos)?;
    self.code.gen_2_label(Bytecode::Ifeq, end);
    self.expect(TokenType::Do)?;
    self.parse_statements()?;
    self.code.gen_2_label(Bytecode::Goto, start);
    self.code.gen_label(end);
    self.expect(TokenType::End)
  }

  /// `expr = simple [relop simple]`
  fn parse_expr(&mut self) -> CompileResult<ValType> {
    let lhs_pos = self.token.pos;
    let lhs_type = self.parse_simple()?;

    if let Some(opcode) = relop_bytecode(self.token.typ) {
      self.check_types(lhs_type, ValType::INTEGER, lhs_pos)?;
      self.advance()?;
      let rhs_pos = self.token.pos;
      let rhs_type = self.parse_simple()?;
      self.check_types(rhs_type, ValType::INTEGER, rhs_pos)?;
      self.code.gen_cmp(opcode);
      return Ok(ValType::BOOLEAN);
    }
    Ok(lhs_type)
  }

  /// `simple = ["-"] term {addop term}`
  fn parse_simple(&mut self) -> CompileResult<ValType> {
    let mut negated = false;
    if self.token.typ == TokenType::Minus {
      // lowered as 0 - term
      self.code.gen_2(Bytecode::Ldc, 0);
      self.expect(TokenType::Minus)?;
      negated = true;
    }

    let term_pos = self.token.pos;
    let mut typ = self.parse_term()?;
    if negated {
      self.check_types(typ, ValType::INTEGER, term_pos)?;
      self.code.gen_1(Bytecode::Isub);
    }

    loop {
      let (opcode, operand_type) = match self.token.typ {
        TokenType::Plus => (Bytecode::Iadd, ValType::INTEGER),
        TokenType::Minus => (Bytecode::Isub, ValType::INTEGER),
        TokenType::Or => (Bytecode::Ior, ValType::BOOLEAN),
        _ => break,
      };
      let op_pos = self.token.pos;
      self.check_types(typ, operand_type, op_pos)?;
      self.advance()?;
      let rhs_pos = self.token.pos;
      let rhs_type = self.parse_term()?;
      self.check_types(rhs_type, operand_type, rhs_pos)?;
      self.code.gen_1(opcode);
      typ = operand_type;
    }
    Ok(typ)
  }

  /// `term = factor {mulop factor}`
  fn parse_term(&mut self) -> CompileResult<ValType> {
    let mut typ = self.parse_factor()?;

    loop {
      let (opcode, operand_type) = match self.token.typ {
        TokenType::And => (Bytecode::Iand, ValType::BOOLEAN),
        TokenType::Multiply => (Bytecode::Imul, ValType::INTEGER),
        TokenType::Divide => (Bytecode::Idiv, ValType::INTEGER),
        TokenType::Remainder => (Bytecode::Irem, ValType::INTEGER),
        _ => break,
      };
      let op_pos = self.token.pos;
      self.check_types(typ, operand_type, op_pos)?;
      self.advance()?;
      let rhs_pos = self.token.pos;
      let rhs_type = self.parse_factor()?;
      self.check_types(rhs_type, operand_type, rhs_pos)?;
      self.code.gen_1(opcode);
      typ = operand_type;
    }
    Ok(typ)
  }

  /// `factor = id ["[" simple "]" | "(" [expr {"," expr}] ")"] | number
  /// | "(" expr ")" | "not" factor | "true" | "false"`
  fn parse_factor(&mut self) -> CompileResult<ValType> {
    match self.token.typ {
      TokenType::Id => {
        let (name, pos) = self.expect_id()?;
        let prop = self.lookup(&name, pos)?;

        if self.token.typ == TokenType::OpenBracket {
          if prop.typ.is_callable() {
            return Err(CompileError::at(pos, format!("{name} is not a variable")));
          }
          if !prop.typ.is_array() {
            return Err(CompileError::at(pos, format!("{name} is not an array")));
          }
          self.code.gen_2(Bytecode::Aload, prop.offset as i32);
          self.expect(TokenType::OpenBracket)?;
          let index_pos = self.token.pos;
          let index_type = self.parse_simple()?;
          self.check_types(index_type, ValType::INTEGER, index_pos)?;
          self.expect(TokenType::CloseBracket)?;
          self.code.gen_1(Bytecode::Iaload);
          return Ok(prop.typ.element_type());
        }

        if self.token.typ == TokenType::OpenParenthesis {
          if !prop.typ.is_callable() || !prop.typ.returns_value() {
            return Err(CompileError::at(pos, format!("{name} is not a function")));
          }
          self.parse_arguments(&name, pos, &prop)?;
          return Ok(prop.typ.return_type());
        }

        if prop.typ.is_callable() {
          return Err(CompileError::at(pos, format!("{name} is not a variable")));
        }
        if prop.typ.is_array() {
          self.code.gen_2(Bytecode::Aload, prop.offset as i32);
        } else {
          self.code.gen_2(Bytecode::Iload, prop.offset as i32);
        }
        Ok(prop.typ)
      }
      TokenType::Number => {
        self.code.gen_2(Bytecode::Ldc, self.token.value);
        self.expect(TokenType::Number)?;
        Ok(ValType::INTEGER)
      }
      TokenType::OpenParenthesis => {
        self.expect(TokenType::OpenParenthesis)?;
        let typ = self.parse_expr()?;
        self.expect(TokenType::CloseParenthesis)?;
        Ok(typ)
      }
      TokenType::Not => {
        self.expect(TokenType::Not)?;
        let operand_pos = self.token.pos;
        let typ = self.parse_factor()?;
        self.check_types(typ, ValType::BOOLEAN, operand_pos)?;
        self.code.gen_2(Bytecode::Ldc, 1);
        self.code.gen_1(Bytecode::Ixor);
        Ok(ValType::BOOLEAN)
      }
      TokenType::True => {
        self.code.gen_2(Bytecode::Ldc, 1);
        self.expect(TokenType::True)?;
        Ok(ValType::BOOLEAN)
      }
      TokenType::False => {
        self.code.gen_2(Bytecode::Ldc, 0);
        self.expect(TokenType::False)?;
        Ok(ValType::BOOLEAN)
      }
      other => Err(CompileError::at(
        self.token.pos,
        format!("expected factor, but found {other}"),
      )),
    }
  }

  /// Parse a parenthesised argument list, checking arity and argument types
  /// against the callee, then emit the invocation.
  fn parse_arguments(&mut self, name: &str, pos: SourcePos, prop: &IdProp) -> CompileResult<()> {
    self.expect(TokenType::OpenParenthesis)?;
    let mut nargs = 0usize;
    if starts_expr(self.token.typ) {
      loop {
        let arg_pos = self.token.pos;
        let arg_type = self.parse_expr()?;
        if nargs < prop.params.len() {
          self.check_types(arg_type, prop.params[nargs], arg_pos)?;
        }
        nargs += 1;
        if self.token.typ != TokenType::Comma {
          break;
        }
        self.expect(TokenType::Comma)?;
      }
    }
    if nargs < prop.params.len() {
      return Err(CompileError::at(
        pos,
        format!("too few arguments for call to {name}"),
      ));
    }
    if nargs > prop.params.len() {
      return Err(CompileError::at(
        pos,
        format!("too many arguments for call to {name}"),
      ));
    }
    self.code.gen_call(name, prop);
    self.expect(TokenType::CloseParenthesis)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn listing(source: &str) -> String {
    parse(source).expect("compilation failure").make_listing()
  }

  fn compile_err(source: &str) -> String {
    parse(source).expect_err("compilation succeeded").to_string()
  }

  // ----- End-to-end scenarios -----

  #[test]
  fn empty_program() {
    let out = listing("source E begin relax end");
    assert!(out.starts_with(".class public E\n"));
    assert!(out.contains(
      ".method public static main([Ljava/lang/String;)V\n\
       .limit stack 0\n\
       .limit locals 1\n\
       \treturn\n\
       .end method\n"
    ));
  }

  #[test]
  fn echo_integer() {
    let out = listing("source Echo begin integer x; get x; put x end");
    assert!(out.contains(
      ".method public static main([Ljava/lang/String;)V\n\
       .limit stack 4\n\
       .limit locals 2\n"
    ));
    assert!(out.contains("\tinvokestatic Echo/readInt()I\n\tistore 1\n"));
    assert!(out.contains("\tiload 1\n"));
    assert!(out.contains("java/io/PrintStream/print(I)V\n"));
  }

  #[test]
  fn while_loop_emits_one_label_pair() {
    let out = listing(
      "source Loop begin\n\
       \x20 integer i, s;\n\
       \x20 i := 0; s := 0;\n\
       \x20 while i < 10 do s := s + i; i := i + 1 end\n\
       end",
    );
    // one start/end pair with the comparison materialised in between
    assert!(out.contains("L1:\n\tiload 1\n\tldc 10\n\tif_icmplt L3\n"));
    assert!(out.contains("\tifeq L2\n"));
    assert!(out.contains("\tgoto L1\nL2:\n"));
    assert_eq!(out.matches("\tgoto L1\n").count(), 1);
    assert!(out.contains(".limit locals 3\n"));
  }

  #[test]
  fn function_with_return() {
    let out = listing(
      "source F\n\
       function sq(integer x) to integer begin leave x*x end\n\
       begin put sq(7) end",
    );
    assert!(out.contains(
      ".method public static sq(I)I\n\
       .limit stack 3\n\
       .limit locals 1\n\
       \tiload 0\n\
       \tiload 0\n\
       \timul\n\
       \tireturn\n\
       .end method\n"
    ));
    assert!(out.contains("\tldc 7\n\tinvokestatic F.sq(I)I\n"));
    let sq = out.find("static sq(I)I").unwrap();
    let main = out.find("static main(").unwrap();
    assert!(sq < main);
  }

  #[test]
  fn array_allocation_and_access() {
    let out = listing(
      "source A begin\n\
       \x20 integer a array; integer i;\n\
       \x20 a := array 10; i := 0;\n\
       \x20 while i < 10 do a[i] := i*i; i := i+1 end;\n\
       \x20 put a[5]\n\
       end",
    );
    assert!(out.contains("\tldc 10\n\tnewarray int\n\tastore 1\n"));
    assert!(out.contains("\taload 1\n\tiload 2\n\tiload 2\n\tiload 2\n\timul\n\tiastore\n"));
    assert!(out.contains("\taload 1\n\tldc 5\n\tiaload\n"));
  }

  #[test]
  fn duplicate_definition_is_fatal() {
    let err = compile_err("source D\nbegin\n  integer x;\n  integer x;\n  relax\nend");
    assert_eq!(err, "4:11: multiple defenition of x");
  }

  // ----- Structure and statements -----

  #[test]
  fn procedures_get_a_return_epilog() {
    let out = listing(
      "source P\n\
       function hello() begin put \"hi\" end\n\
       begin call hello() end",
    );
    assert!(out.contains(".method public static hello()V\n"));
    let hello = out.find(".method public static hello()V").unwrap();
    let end = out[hello..].find(".end method").unwrap();
    assert!(out[hello..hello + end].contains("\treturn\n"));
    assert!(out.contains("\tinvokestatic P.hello()V\n"));
  }

  #[test]
  fn parameters_occupy_the_first_slots() {
    let out = listing(
      "source P\n\
       function add(integer a, integer b) to integer begin\n\
       \x20 integer s;\n\
       \x20 s := a + b;\n\
       \x20 leave s\n\
       end\n\
       begin put add(1, 2) end",
    );
    assert!(out.contains(".method public static add(II)I\n"));
    assert!(out.contains(".limit locals 3\n"));
    assert!(out.contains("\tiload 0\n\tiload 1\n\tiadd\n\tistore 2\n"));
  }

  #[test]
  fn if_elsif_else_shares_one_end_label() {
    let out = listing(
      "source C begin\n\
       \x20 integer x;\n\
       \x20 x := 1;\n\
       \x20 if x < 0 then put \"neg\"\n\
       \x20 elsif x = 0 then put \"zero\"\n\
       \x20 else put \"pos\"\n\
       \x20 end\n\
       end",
    );
    // both arms jump to the shared end label L1
    assert_eq!(out.matches("\tgoto L1\n").count(), 2);
    assert!(out.contains("\tifeq L2\n"));
    assert!(out.contains("L1:\n"));
  }

  #[test]
  fn boolean_operators_lower_to_bitwise_forms() {
    let out = listing(
      "source B begin\n\
       \x20 boolean p, q;\n\
       \x20 p := true; q := false;\n\
       \x20 p := p and not q or p\n\
       end",
    );
    assert!(out.contains("\tixor\n"));
    assert!(out.contains("\tiand\n"));
    assert!(out.contains("\tior\n"));
  }

  #[test]
  fn unary_minus_is_zero_minus_term() {
    let out = listing("source N begin integer x; x := -5 end");
    assert!(out.contains("\tldc 0\n\tldc 5\n\tisub\n\tistore 1\n"));
  }

  #[test]
  fn output_concatenation_prints_each_item() {
    let out = listing("source O begin integer x; x := 2; put \"x = \" . x . \"\\n\" end");
    assert!(out.contains("\tldc \"x = \"\n"));
    assert!(out.contains("\tldc \"\\n\"\n"));
    assert!(out.contains("java/io/PrintStream/print(Ljava/lang/String;)V\n"));
    assert!(out.contains("java/io/PrintStream/print(I)V\n"));
  }

  #[test]
  fn boolean_io_uses_the_boolean_helpers() {
    let out = listing("source B begin boolean p; get p; put p end");
    assert!(out.contains("\tinvokestatic B/readBoolean()Z\n"));
    assert!(out.contains("java/io/PrintStream/print(Z)V\n"));
  }

  #[test]
  fn subscripted_input_reads_into_the_element() {
    let out = listing("source G begin integer a array; a := array 3; get a[1] end");
    assert!(out.contains("\taload 1\n\tldc 1\n\tinvokestatic G/readInt()I\n\tiastore\n"));
  }

  #[test]
  fn whole_array_assignment_stores_the_reference() {
    let out = listing(
      "source W begin\n\
       \x20 integer a array, b array;\n\
       \x20 a := array 4;\n\
       \x20 b := a\n\
       end",
    );
    assert!(out.contains("\taload 1\n\tastore 2\n"));
  }

  #[test]
  fn array_parameters_and_returns_in_descriptors() {
    let out = listing(
      "source V\n\
       function head(integer v array) to integer begin leave v[0] end\n\
       function mk(integer n) to integer array begin\n\
       \x20 integer t array;\n\
       \x20 t := array n;\n\
       \x20 leave t\n\
       end\n\
       begin\n\
       \x20 integer a array;\n\
       \x20 a := mk(3);\n\
       \x20 put head(a)\n\
       end",
    );
    assert!(out.contains(".method public static head([I)I\n"));
    assert!(out.contains(".method public static mk(I)[I\n"));
    assert!(out.contains("\tinvokestatic V.mk(I)[I\n"));
    assert!(out.contains("\tinvokestatic V.head([I)I\n"));
    assert!(out.contains("\tareturn\n"));
  }

  // ----- Diagnostics -----

  #[test]
  fn expected_but_found() {
    let err = compile_err("source X relax end");
    assert_eq!(err, "1:10: expected 'begin', but found 'relax'");
  }

  #[test]
  fn statement_expected() {
    let err = compile_err("source X begin 1 end");
    assert_eq!(err, "1:16: expected statement, but found number");
  }

  #[test]
  fn factor_expected() {
    let err = compile_err("source X begin integer x; x := 1 + ; relax end");
    assert_eq!(err, "1:36: expected factor, but found ';'");
  }

  #[test]
  fn type_expected() {
    let err = compile_err("source X function f(integer a, b) begin relax end begin relax end");
    assert_eq!(err, "1:32: expected type, but found identifier");
  }

  #[test]
  fn expression_or_string_expected() {
    let err = compile_err("source X begin put end");
    assert_eq!(err, "1:20: expected expression or string, but found 'end'");
  }

  #[test]
  fn unterminated_program() {
    let err = compile_err("source X begin relax");
    assert_eq!(err, "1:20: expected 'end', but found end-of-file");
  }

  #[test]
  fn trailing_tokens_are_rejected() {
    let err = compile_err("source X begin relax end junk");
    assert_eq!(err, "1:26: expected end-of-file, but found identifier");
  }

  #[test]
  fn unknown_identifier() {
    let err = compile_err("source X begin x := 1 end");
    assert_eq!(err, "1:16: unknown identifier x");
  }

  #[test]
  fn assignment_type_mismatch() {
    let err = compile_err("source X begin integer x; x := true end");
    assert_eq!(err, "1:32: incompatible types (expected integer, found boolean)");
  }

  #[test]
  fn condition_must_be_boolean() {
    let err = compile_err("source X begin if 1 then relax end end");
    assert_eq!(err, "1:19: incompatible types (expected boolean, found integer)");
  }

  #[test]
  fn relop_operands_must_be_integers() {
    let err = compile_err("source X begin if true < false then relax end end");
    assert_eq!(err, "1:19: incompatible types (expected integer, found boolean)");
  }

  #[test]
  fn not_requires_a_boolean_operand() {
    let err = compile_err("source X begin boolean p; p := not 1 end");
    assert_eq!(err, "1:36: incompatible types (expected boolean, found integer)");
  }

  #[test]
  fn mixed_operand_types_in_addition() {
    let err = compile_err("source X begin integer x; x := 1 + true end");
    assert_eq!(err, "1:36: incompatible types (expected integer, found boolean)");
  }

  #[test]
  fn call_arity_is_checked() {
    let prelude = "source X\nfunction f(integer a, integer b) begin relax end\n";
    let err = compile_err(&format!("{prelude}begin call f(1) end"));
    assert_eq!(err, "3:12: too few arguments for call to f");
    let err = compile_err(&format!("{prelude}begin call f(1, 2, 3) end"));
    assert_eq!(err, "3:12: too many arguments for call to f");
  }

  #[test]
  fn argument_types_are_checked() {
    let err = compile_err(
      "source X\n\
       function f(integer a array) begin relax end\n\
       begin call f(1) end",
    );
    assert_eq!(err, "3:14: incompatible types (expected integer array, found integer)");
  }

  #[test]
  fn calling_a_variable_is_an_error() {
    let err = compile_err("source X begin integer x; call x() end");
    assert_eq!(err, "1:32: x is not a procedure");
  }

  #[test]
  fn calling_a_function_as_a_procedure_is_an_error() {
    let err = compile_err(
      "source X\n\
       function f() to integer begin leave 1 end\n\
       begin call f() end",
    );
    assert_eq!(err, "3:12: f is not a procedure");
  }

  #[test]
  fn using_a_procedure_as_a_factor_is_an_error() {
    let err = compile_err(
      "source X\n\
       function p() begin relax end\n\
       begin put p() end",
    );
    assert_eq!(err, "3:11: p is not a function");
  }

  #[test]
  fn assigning_to_a_function_is_an_error() {
    let err = compile_err(
      "source X\n\
       function f() to integer begin leave 1 end\n\
       begin f := 3 end",
    );
    assert_eq!(err, "3:7: f is not a variable");
  }

  #[test]
  fn subscripting_a_scalar_is_an_error() {
    let err = compile_err("source X begin integer x; x[0] := 1 end");
    assert_eq!(err, "1:27: x is not an array");
  }

  #[test]
  fn leave_with_a_value_outside_a_function() {
    let err = compile_err("source X begin leave 1 end");
    assert_eq!(err, "1:22: cannot return a value from a procedure");
  }

  #[test]
  fn functions_cannot_see_main_variables() {
    let err = compile_err(
      "source X\n\
       function f() begin x := 1 end\n\
       begin integer x; relax end",
    );
    assert_eq!(err, "2:20: unknown identifier x");
  }

  #[test]
  fn duplicate_parameter_names_are_fatal() {
    let err = compile_err(
      "source X\n\
       function f(integer a, integer a) begin relax end\n\
       begin relax end",
    );
    assert_eq!(err, "2:31: multiple defenition of a");
  }

  #[test]
  fn relax_body_takes_no_statements() {
    let err = compile_err("source X begin relax; put 1 end");
    assert_eq!(err, "1:21: expected 'end', but found ';'");
  }
}
