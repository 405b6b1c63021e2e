//! Crate root: wires together the compilation pipeline.
//!
//! The stages are intentionally small and composable:
//! - `scanner` turns the source text into a stream of positioned tokens.
//! - `parser` recognises the ALAN-2022 grammar, binding names in the
//!   `symboltable` and emitting stack-machine code as productions are
//!   reduced – there is no separate semantic pass and no AST.
//! - `codegen` accumulates per-subroutine bodies and serialises the Jasmin
//!   listing for the external assembler.
//! - `error` centralises the diagnostic types shared by the other modules.

pub mod codegen;
pub mod error;
pub mod hashtable;
pub mod parser;
pub mod scanner;
pub mod symboltable;
pub mod token;
pub mod valtypes;

pub use error::{CompileError, CompileResult};

/// A successfully compiled unit: the class name declared by the `source`
/// clause and the Jasmin listing for it.
#[derive(Debug)]
pub struct CompiledUnit {
  pub class_name: String,
  pub jasmin: String,
}

/// Compile ALAN-2022 source text into a Jasmin assembly listing.
pub fn compile(source: &str) -> CompileResult<CompiledUnit> {
  let code = parser::parse(source)?;
  let jasmin = code.make_listing();
  Ok(CompiledUnit {
    class_name: code.class_name().to_string(),
    jasmin,
  })
}
