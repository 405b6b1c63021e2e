//! Value types for ALAN-2022 identifiers and expressions.
//!
//! A value type is a base scalar plus two orthogonal flags: `array` marks a
//! one-dimensional array of the base scalar, and `callable` marks an
//! identifier that names a subroutine, in which case the base encodes the
//! return type (a pure procedure has no base at all).

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
  None,
  Boolean,
  Integer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValType {
  pub base: BaseType,
  pub array: bool,
  pub callable: bool,
}

impl ValType {
  pub const BOOLEAN: ValType = ValType {
    base: BaseType::Boolean,
    array: false,
    callable: false,
  };

  pub const INTEGER: ValType = ValType {
    base: BaseType::Integer,
    array: false,
    callable: false,
  };

  /// The type of a pure procedure: callable, no return value.
  pub const CALLABLE: ValType = ValType {
    base: BaseType::None,
    array: false,
    callable: true,
  };

  pub fn is_variable(self) -> bool {
    !self.callable
  }

  pub fn is_array(self) -> bool {
    self.array
  }

  pub fn is_boolean(self) -> bool {
    self.base == BaseType::Boolean
  }

  pub fn is_integer(self) -> bool {
    self.base == BaseType::Integer
  }

  pub fn is_callable(self) -> bool {
    self.callable
  }

  /// Whether a call to this (callable) type leaves a value on the stack.
  pub fn returns_value(self) -> bool {
    self.base != BaseType::None
  }

  pub fn set_as_array(&mut self) {
    self.array = true;
  }

  pub fn set_as_callable(&mut self) {
    self.callable = true;
  }

  /// Clear the callable flag, leaving the return type exposed.
  pub fn set_return_type(&mut self) {
    self.callable = false;
  }

  /// The value produced by invoking this callable, or by reading one
  /// element of this array.
  pub fn return_type(self) -> ValType {
    ValType {
      callable: false,
      ..self
    }
  }

  /// This array type's element type.
  pub fn element_type(self) -> ValType {
    ValType {
      array: false,
      ..self
    }
  }
}

impl fmt::Display for ValType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.callable {
      return f.write_str(if self.returns_value() {
        "function"
      } else {
        "procedure"
      });
    }
    let base = match self.base {
      BaseType::Boolean => "boolean",
      BaseType::Integer => "integer",
      BaseType::None => "void",
    };
    if self.array {
      write!(f, "{base} array")
    } else {
      f.write_str(base)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn flags_are_orthogonal() {
    let mut t = ValType::INTEGER;
    assert!(t.is_variable() && t.is_integer() && !t.is_array());

    t.set_as_array();
    assert!(t.is_array() && t.is_integer());

    t.set_as_callable();
    assert!(t.is_callable() && !t.is_variable());

    t.set_return_type();
    assert!(t.is_variable() && t.is_array() && t.is_integer());
  }

  #[test]
  fn display_names() {
    let mut int_array = ValType::INTEGER;
    int_array.set_as_array();
    assert_eq!(ValType::BOOLEAN.to_string(), "boolean");
    assert_eq!(int_array.to_string(), "integer array");
    assert_eq!(ValType::CALLABLE.to_string(), "procedure");

    let mut func = ValType::INTEGER;
    func.set_as_callable();
    assert_eq!(func.to_string(), "function");
  }

  #[test]
  fn return_type_of_a_function_is_its_base() {
    let mut func = ValType::BOOLEAN;
    func.set_as_callable();
    assert_eq!(func.return_type(), ValType::BOOLEAN);
  }
}
