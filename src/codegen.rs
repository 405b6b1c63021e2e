//! Code generation: accumulates JVM instructions per subroutine body and
//! serialises the whole program as a Jasmin assembly listing.
//!
//! The emitter keeps no intermediate representation beyond a flat, tagged
//! code stream per body. Stack depth is tracked as instructions are
//! appended – each opcode carries a fixed (pop, push) stack effect – so the
//! `.limit stack` directive falls out of emission without a separate
//! analysis pass.

use itertools::Itertools;
use log::debug;

use crate::symboltable::IdProp;
use crate::valtypes::ValType;

/// A symbolic branch target, materialised as `Lnnn` during serialisation.
pub type Label = u32;

/// The JVM instruction subset the compiler emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bytecode {
  Aload,
  Areturn,
  Astore,
  Getstatic,
  Goto,
  Iadd,
  Iaload,
  Iand,
  Iastore,
  Idiv,
  Ifeq,
  IfIcmpeq,
  IfIcmpge,
  IfIcmpgt,
  IfIcmple,
  IfIcmplt,
  IfIcmpne,
  Iload,
  Imul,
  Ineg,
  Invokestatic,
  Invokevirtual,
  Ior,
  Istore,
  Isub,
  Irem,
  Ireturn,
  Ixor,
  Ldc,
  Newarray,
  Return,
  Swap,
}

impl Bytecode {
  pub fn mnemonic(self) -> &'static str {
    match self {
      Bytecode::Aload => "aload",
      Bytecode::Areturn => "areturn",
      Bytecode::Astore => "astore",
      Bytecode::Getstatic => "getstatic",
      Bytecode::Goto => "goto",
      Bytecode::Iadd => "iadd",
      Bytecode::Iaload => "iaload",
      Bytecode::Iand => "iand",
      Bytecode::Iastore => "iastore",
      Bytecode::Idiv => "idiv",
      Bytecode::Ifeq => "ifeq",
      Bytecode::IfIcmpeq => "if_icmpeq",
      Bytecode::IfIcmpge => "if_icmpge",
      Bytecode::IfIcmpgt => "if_icmpgt",
      Bytecode::IfIcmple => "if_icmple",
      Bytecode::IfIcmplt => "if_icmplt",
      Bytecode::IfIcmpne => "if_icmpne",
      Bytecode::Iload => "iload",
      Bytecode::Imul => "imul",
      Bytecode::Ineg => "ineg",
      Bytecode::Invokestatic => "invokestatic",
      Bytecode::Invokevirtual => "invokevirtual",
      Bytecode::Ior => "ior",
      Bytecode::Istore => "istore",
      Bytecode::Isub => "isub",
      Bytecode::Irem => "irem",
      Bytecode::Ireturn => "ireturn",
      Bytecode::Ixor => "ixor",
      Bytecode::Ldc => "ldc",
      Bytecode::Newarray => "newarray",
      Bytecode::Return => "return",
      Bytecode::Swap => "swap",
    }
  }

  /// The fixed (pop, push) stack effect of the instruction.
  fn stack_effect(self) -> (i32, i32) {
    match self {
      Bytecode::Aload => (0, 1),
      Bytecode::Areturn => (1, 0),
      Bytecode::Astore => (1, 0),
      Bytecode::Getstatic => (0, 1),
      Bytecode::Goto => (0, 0),
      Bytecode::Iadd => (2, 1),
      Bytecode::Iaload => (2, 1),
      Bytecode::Iand => (2, 1),
      Bytecode::Iastore => (3, 0),
      Bytecode::Idiv => (2, 1),
      Bytecode::Ifeq => (1, 0),
      Bytecode::IfIcmpeq
      | Bytecode::IfIcmpge
      | Bytecode::IfIcmpgt
      | Bytecode::IfIcmple
      | Bytecode::IfIcmplt
      | Bytecode::IfIcmpne => (2, 0),
      Bytecode::Iload => (0, 1),
      Bytecode::Imul => (2, 1),
      Bytecode::Ineg => (1, 1),
      Bytecode::Invokestatic => (0, 1),
      Bytecode::Invokevirtual => (0, 0),
      Bytecode::Ior => (2, 1),
      Bytecode::Istore => (1, 0),
      Bytecode::Isub => (2, 1),
      Bytecode::Irem => (2, 1),
      Bytecode::Ireturn => (1, 0),
      Bytecode::Ixor => (2, 1),
      Bytecode::Ldc => (0, 1),
      Bytecode::Newarray => (1, 1),
      Bytecode::Return => (0, 0),
      Bytecode::Swap => (2, 2),
    }
  }

  /// Whether the mnemonic stands alone on its line; all other instructions
  /// are followed by exactly one operand item.
  fn standalone(self) -> bool {
    matches!(
      self,
      Bytecode::Areturn
        | Bytecode::Iadd
        | Bytecode::Iaload
        | Bytecode::Iand
        | Bytecode::Iastore
        | Bytecode::Idiv
        | Bytecode::Imul
        | Bytecode::Ineg
        | Bytecode::Ior
        | Bytecode::Isub
        | Bytecode::Irem
        | Bytecode::Ireturn
        | Bytecode::Ixor
        | Bytecode::Return
        | Bytecode::Swap
    )
  }
}

/// Primitive element types accepted by `newarray`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JvmAType {
  Boolean,
  Char,
  Float,
  Double,
  Byte,
  Short,
  Int,
  Long,
}

impl JvmAType {
  fn name(self) -> &'static str {
    match self {
      JvmAType::Boolean => "boolean",
      JvmAType::Char => "char",
      JvmAType::Float => "float",
      JvmAType::Double => "double",
      JvmAType::Byte => "byte",
      JvmAType::Short => "short",
      JvmAType::Int => "int",
      JvmAType::Long => "long",
    }
  }
}

/// One item in a body's code stream.
#[derive(Debug, Clone)]
enum Code {
  Label(Label),
  Instruction(Bytecode),
  /// Integer immediate operand.
  Int(i32),
  /// Element-type operand of `newarray`.
  ArrayType(JvmAType),
  /// String literal operand of `ldc`, stored unquoted.
  Str(String),
  /// Reference to an external or generated method or field.
  Ref(String),
  /// Branch target operand.
  LabelRef(Label),
}

/// A completed subroutine body, ready for serialisation.
#[derive(Debug)]
struct Body {
  name: String,
  prop: IdProp,
  code: Vec<Code>,
  max_stack_depth: i32,
  variables_width: u32,
}

/// The body currently being emitted into.
#[derive(Debug)]
struct OpenBody {
  name: String,
  prop: IdProp,
  code: Vec<Code>,
  stack_depth: i32,
  max_stack_depth: i32,
}

#[derive(Debug)]
pub struct CodeGen {
  class_name: String,
  bodies: Vec<Body>,
  current: Option<OpenBody>,
  next_label: Label,
}

impl CodeGen {
  pub fn new() -> Self {
    Self {
      class_name: String::new(),
      bodies: Vec::new(),
      current: None,
      next_label: 1,
    }
  }

  pub fn set_class_name(&mut self, name: &str) {
    self.class_name = name.to_string();
  }

  pub fn class_name(&self) -> &str {
    &self.class_name
  }

  /// Start collecting code for a new subroutine.
  pub fn init_subroutine(&mut self, name: &str, prop: IdProp) {
    self.current = Some(OpenBody {
      name: name.to_string(),
      prop,
      code: Vec::new(),
      stack_depth: 0,
      max_stack_depth: 0,
    });
  }

  /// Finish the open subroutine and append it to the body list in
  /// encounter order.
  pub fn close_subroutine(&mut self, variables_width: u32) {
    let open = self.current.take().expect("no open subroutine body");
    self.bodies.push(Body {
      name: open.name,
      prop: open.prop,
      code: open.code,
      max_stack_depth: open.max_stack_depth,
      variables_width,
    });
  }

  /// Allocate a fresh label from the per-program counter.
  pub fn get_label(&mut self) -> Label {
    let label = self.next_label;
    self.next_label += 1;
    label
  }

  // ----- Emission -----

  pub fn gen_1(&mut self, opcode: Bytecode) {
    self.push(Code::Instruction(opcode));
    self.adjust_stack(opcode);
  }

  pub fn gen_2(&mut self, opcode: Bytecode, operand: i32) {
    self.push(Code::Instruction(opcode));
    self.push(Code::Int(operand));
    self.adjust_stack(opcode);
  }

  pub fn gen_label(&mut self, label: Label) {
    self.push(Code::Label(label));
  }

  pub fn gen_2_label(&mut self, opcode: Bytecode, label: Label) {
    self.push(Code::Instruction(opcode));
    self.push(Code::LabelRef(label));
    self.adjust_stack(opcode);
  }

  pub fn gen_newarray(&mut self, atype: JvmAType) {
    self.push(Code::Instruction(Bytecode::Newarray));
    self.push(Code::ArrayType(atype));
    self.adjust_stack(Bytecode::Newarray);
  }

  /// Invoke a subroutine of the compilation unit, encoding its signature
  /// from the identifier properties.
  pub fn gen_call(&mut self, name: &str, prop: &IdProp) {
    let params: String = prop
      .params
      .iter()
      .map(|p| if p.is_array() { "[I" } else { "I" })
      .join("");
    let descriptor = format!(
      "{}.{}({}){}{}",
      self.class_name,
      name,
      params,
      if prop.typ.is_array() { "[" } else { "" },
      if prop.typ.returns_value() { "I" } else { "V" },
    );
    self.push(Code::Instruction(Bytecode::Invokestatic));
    self.push(Code::Ref(descriptor));
    self.adjust_stack(Bytecode::Invokestatic);
  }

  /// Materialise a boolean from a comparison: branch to L1 on the
  /// condition, push 0 and jump L2, else land on L1 and push 1.
  pub fn gen_cmp(&mut self, opcode: Bytecode) {
    let l1 = self.get_label();
    let l2 = self.get_label();
    self.gen_2_label(opcode, l1);
    self.gen_2(Bytecode::Ldc, 0);
    self.gen_2_label(Bytecode::Goto, l2);
    self.gen_label(l1);
    self.gen_2(Bytecode::Ldc, 1);
    self.gen_label(l2);
  }

  /// Read one scalar of the given type via the generated helper methods.
  pub fn gen_read(&mut self, typ: ValType) {
    let reference = if typ.is_boolean() {
      format!("{}/readBoolean()Z", self.class_name)
    } else {
      format!("{}/readInt()I", self.class_name)
    };
    self.push(Code::Instruction(Bytecode::Invokestatic));
    self.push(Code::Ref(reference));
    self.adjust_stack(Bytecode::Invokestatic);
  }

  /// Print the scalar on top of the stack with the `print` overload
  /// selected by its type.
  pub fn gen_print(&mut self, typ: ValType) {
    let typ = typ.return_type();
    let method = if typ.is_boolean() {
      "java/io/PrintStream/print(Z)V"
    } else {
      "java/io/PrintStream/print(I)V"
    };
    self.push(Code::Instruction(Bytecode::Getstatic));
    self.push(Code::Ref(REF_PRINT_STREAM.to_string()));
    self.push(Code::Instruction(Bytecode::Swap));
    self.push(Code::Instruction(Bytecode::Invokevirtual));
    self.push(Code::Ref(method.to_string()));
    self.adjust_stack(Bytecode::Getstatic);
    self.adjust_stack(Bytecode::Swap);
    self.adjust_stack(Bytecode::Invokevirtual);
  }

  /// Print a string literal.
  pub fn gen_print_string(&mut self, string: String) {
    self.push(Code::Instruction(Bytecode::Getstatic));
    self.push(Code::Ref(REF_PRINT_STREAM.to_string()));
    self.push(Code::Instruction(Bytecode::Ldc));
    self.push(Code::Str(string));
    self.push(Code::Instruction(Bytecode::Invokevirtual));
    self.push(Code::Ref(
      "java/io/PrintStream/print(Ljava/lang/String;)V".to_string(),
    ));
    self.adjust_stack(Bytecode::Getstatic);
    self.adjust_stack(Bytecode::Ldc);
    self.adjust_stack(Bytecode::Invokevirtual);
  }

  fn push(&mut self, code: Code) {
    self
      .current
      .as_mut()
      .expect("no open subroutine body")
      .code
      .push(code);
  }

  /// Apply an instruction's stack effect: the push side first, so the
  /// transient maximum is what bounds the declared stack limit.
  fn adjust_stack(&mut self, opcode: Bytecode) {
    let (pop, push) = opcode.stack_effect();
    let body = self.current.as_mut().expect("no open subroutine body");
    body.stack_depth += push;
    if body.stack_depth > body.max_stack_depth {
      body.max_stack_depth = body.stack_depth;
    }
    body.stack_depth -= pop;
  }

  // ----- Serialisation -----

  /// Serialise the class preamble and every body, in encounter order, as a
  /// Jasmin listing.
  pub fn make_listing(&self) -> String {
    let mut out = String::new();
    self.write_preamble(&mut out);
    for body in &self.bodies {
      self.write_method(&mut out, body);
    }
    debug!("jasmin listing:\n{out}");
    out
  }

  fn write_preamble(&self, out: &mut String) {
    let cls = &self.class_name;
    out.push_str(&format!(
      ".class public {cls}\n\
       .super java/lang/Object\n\n\
       .field private static final charsetName Ljava/lang/String;\n\
       .field private static final usLocale Ljava/util/Locale;\n\
       .field private static final scanner Ljava/util/Scanner;\n\n\
       .method static public <clinit>()V\n\
       .limit stack 5\n\
       .limit locals 1\n\
       \tldc\t\"UTF-8\"\n\
       \tputstatic {cls}/charsetName Ljava/lang/String;\n\
       \tnew\tjava/util/Locale\n\
       \tdup\n\
       \tldc\t\"en\"\n\
       \tldc\t\"US\"\n\
       \tinvokespecial java/util/Locale/<init>(Ljava/lang/String;Ljava/lang/String;)V\n\
       \tputstatic {cls}/usLocale Ljava/util/Locale;\n\
       \tnew\tjava/util/Scanner\n\
       \tdup\n\
       \tnew\tjava/io/BufferedInputStream\n\
       \tdup\n\
       \tgetstatic java/lang/System/in Ljava/io/InputStream;\n\
       \tinvokespecial java/io/BufferedInputStream/<init>(Ljava/io/InputStream;)V\n\
       \tgetstatic {cls}/charsetName Ljava/lang/String;\n\
       \tinvokespecial java/util/Scanner/<init>(Ljava/io/InputStream;Ljava/lang/String;)V\n\
       \tputstatic {cls}/scanner Ljava/util/Scanner;\n\
       \tgetstatic {cls}/scanner Ljava/util/Scanner;\n\
       \tgetstatic {cls}/usLocale Ljava/util/Locale;\n\
       \tinvokevirtual java/util/Scanner/useLocale(Ljava/util/Locale;)Ljava/util/Scanner;\n\
       \tpop\n\
       \treturn\n\
       .end method\n\n"
    ));

    out.push_str(
      ".method public <init>()V\n\
       \taload_0\n\
       \tinvokespecial java/lang/Object/<init>()V\n\
       \treturn\n\
       .end method\n\n",
    );

    out.push_str(&format!(
      ".method public static readInt()I\n\
       .limit stack 1\n\
       .limit locals 1\n\
       \tgetstatic {cls}/scanner Ljava/util/Scanner;\n\
       \tinvokevirtual java/util/Scanner/nextInt()I\n\
       \tireturn\n\
       .end method\n\n"
    ));

    out.push_str(&format!(
      ".method public static readBoolean()Z\n\
       .limit stack 2\n\
       .limit locals 1\n\
       \tgetstatic {cls}/scanner Ljava/util/Scanner;\n\
       \tinvokevirtual java/util/Scanner/next()Ljava/lang/String;\n\
       \tastore 0\n\
       \taload 0\n\
       \tldc\t\"true\"\n\
       \tinvokevirtual java/lang/String/equalsIgnoreCase(Ljava/lang/String;)Z\n\
       \tifeq False\n\
       \ticonst_1\n\
       \tireturn\n\
       False:\n\
       \taload 0\n\
       \tldc\t\"false\"\n\
       \tinvokevirtual java/lang/String/equalsIgnoreCase(Ljava/lang/String;)Z\n\
       \tifeq Exception\n\
       \ticonst_0\n\
       \tireturn\n\
       Exception:\n\
       \tnew\tjava/util/InputMismatchException\n\
       \tdup\n\
       \tinvokespecial java/util/InputMismatchException/<init>()V\n\
       \tathrow\n\
       .end method\n\n"
    ));
  }

  fn write_method(&self, out: &mut String, body: &Body) {
    if body.name == "main" {
      out.push_str(".method public static main([Ljava/lang/String;)V\n");
    } else {
      let params: String = body
        .prop
        .params
        .iter()
        .map(|p| if p.is_array() { "[I" } else { "I" })
        .join("");
      out.push_str(&format!(
        ".method public static {}({}){}{}\n",
        body.name,
        params,
        if body.prop.typ.is_array() { "[" } else { "" },
        if body.prop.typ.returns_value() { "I" } else { "V" },
      ));
    }
    out.push_str(&format!(".limit stack {}\n", body.max_stack_depth));
    out.push_str(&format!(".limit locals {}\n", body.variables_width));

    for item in &body.code {
      match item {
        Code::Label(label) => out.push_str(&format!("L{label}:\n")),
        Code::LabelRef(label) => out.push_str(&format!(" L{label}\n")),
        Code::Instruction(opcode) => {
          out.push('\t');
          out.push_str(opcode.mnemonic());
          if opcode.standalone() {
            out.push('\n');
          }
        }
        Code::Int(value) => out.push_str(&format!(" {value}\n")),
        Code::ArrayType(atype) => out.push_str(&format!(" {}\n", atype.name())),
        Code::Ref(reference) => out.push_str(&format!(" {reference}\n")),
        Code::Str(string) => out.push_str(&format!(" \"{string}\"\n")),
      }
    }

    // guard against a dangling label at the end of the code stream
    if matches!(body.code.last(), Some(Code::Label(_))) {
      out.push_str("\tnop\n");
    }

    out.push_str(".end method\n\n");
  }
}

impl Default for CodeGen {
  fn default() -> Self {
    Self::new()
  }
}

const REF_PRINT_STREAM: &str = "java/lang/System/out Ljava/io/PrintStream;";
