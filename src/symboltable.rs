//! The two-level scoped symbol table for ALAN-2022.
//!
//! The global scope holds subroutine bindings (and the main body's
//! variables, since the main body never opens a scope of its own). At most
//! one subroutine scope is active on top of it while a function definition
//! is being parsed. Lookups search the active scope first; the fallback into
//! the global scope only ever resolves callables, so a subroutine can never
//! see the main body's variables.

use crate::hashtable::HashTab;
use crate::valtypes::ValType;

/// The properties of one identifier binding. For variables, `offset` is the
/// local-frame slot index and `params` is empty; for subroutines, `offset`
/// is unused and `params` records the parameter types in declaration order.
#[derive(Debug, Clone)]
pub struct IdProp {
  pub typ: ValType,
  pub offset: u32,
  pub params: Vec<ValType>,
}

impl IdProp {
  pub fn variable(typ: ValType, offset: u32) -> Self {
    Self {
      typ,
      offset,
      params: Vec::new(),
    }
  }

  pub fn callable(typ: ValType, params: Vec<ValType>) -> Self {
    Self {
      typ,
      offset: 0,
      params,
    }
  }
}

struct Scope {
  bindings: HashTab<IdProp>,
  /// The next free local-variable slot; doubles as the frame width once the
  /// scope is fully populated.
  next_offset: u32,
}

impl Scope {
  fn new(next_offset: u32) -> Self {
    Self {
      bindings: HashTab::new(),
      next_offset,
    }
  }
}

pub struct SymbolTable {
  scopes: Vec<Scope>,
}

impl SymbolTable {
  /// Create the table with its global scope. Offset 1 leaves slot 0 for the
  /// main method's argument array.
  pub fn new() -> Self {
    Self {
      scopes: vec![Scope::new(1)],
    }
  }

  /// Bind a subroutine in the global scope and activate a fresh scope for
  /// its parameters and locals. Returns false if the name is taken.
  pub fn open_subroutine(&mut self, name: &str, prop: IdProp) -> bool {
    if !self.insert_name(name, prop) {
      return false;
    }
    self.scopes.push(Scope::new(0));
    true
  }

  /// Drop the subroutine scope and reactivate the global scope.
  pub fn close_subroutine(&mut self) {
    if self.scopes.len() > 1 {
      self.scopes.pop();
    }
  }

  /// Insert a binding into the active scope. Returns false if the name is
  /// already reachable. Variables claim the next local slot.
  pub fn insert_name(&mut self, name: &str, prop: IdProp) -> bool {
    if self.find_name(name).is_some() {
      return false;
    }
    let is_variable = prop.typ.is_variable();
    let scope = self.active_mut();
    if !scope.bindings.insert(name.to_string(), prop) {
      return false;
    }
    if is_variable {
      scope.next_offset += 1;
    }
    true
  }

  /// Look a name up in the active scope, falling back to the global scope
  /// for callables only.
  pub fn find_name(&self, name: &str) -> Option<&IdProp> {
    let active = self.scopes.last().expect("symbol table has no scope");
    if let Some(prop) = active.bindings.get(name) {
      return Some(prop);
    }
    if self.scopes.len() > 1 {
      if let Some(prop) = self.scopes[0].bindings.get(name) {
        if prop.typ.is_callable() {
          return Some(prop);
        }
      }
    }
    None
  }

  /// The number of local-variable slots claimed in the active scope.
  pub fn variables_width(&self) -> u32 {
    self.scopes.last().expect("symbol table has no scope").next_offset
  }

  fn active_mut(&mut self) -> &mut Scope {
    self.scopes.last_mut().expect("symbol table has no scope")
  }
}

impl Default for SymbolTable {
  fn default() -> Self {
    Self::new()
  }
}
