//! Operand synthesis and formatting.
//!
//! Operands are structured values rendered per syntax, instead of the
//! stringly-typed spelling the emitters would otherwise juggle: a spill slot
//! is a [Mem::Frame], a symbol is a [Mem::Sym], and the indexed forms
//! compose on top of either. The reserved `stack:<N>` name shape is parsed
//! exactly once, in [stack_operand].

use crate::back::asm::{Gpr, Syntax, Target, Width};
use crate::back::regalloc::{Allocation, Loc};
use crate::common::Id;
use crate::error::{Error, Result};
use crate::middle::ir::{Type, Value};

/// Longest symbol the fixed-size label buffer accommodates.
pub const MAX_SYMBOL: usize = 31;

/// Reject names that do not fit the label buffer. Fatal: there is no
/// truncation fallback.
pub fn checked_sym(name: Id) -> Result<Id> {
    if name.len() > MAX_SYMBOL {
        return Err(Error::SymbolTooLong(name.to_string()));
    }
    Ok(name)
}

/// A synthesized x86 memory operand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mem {
    /// Frame-pointer relative: negative displacements are spill slots and
    /// locals, positive ones are stack parameters.
    Frame(i32),
    /// A named location with a byte offset.
    Sym { name: Id, off: i32 },
    /// Dereference of a pointer held in a register.
    Deref { base: Gpr, off: i32 },
    /// Indexed form over a frame or symbol base: `base(,index,scale)`.
    Indexed { base: Box<Mem>, index: Gpr, scale: u32 },
}

impl Mem {
    pub fn sym(name: Id) -> Mem {
        Mem::Sym { name, off: 0 }
    }

    pub fn deref(base: Gpr) -> Mem {
        Mem::Deref { base, off: 0 }
    }

    /// The same location displaced by `off` bytes (trailing copies of wide
    /// stores).
    pub fn offset(&self, off: i32) -> Mem {
        match self.clone() {
            Mem::Frame(d) => Mem::Frame(d + off),
            Mem::Sym { name, off: o } => Mem::Sym { name, off: o + off },
            Mem::Deref { base, off: o } => Mem::Deref { base, off: o + off },
            Mem::Indexed { base, index, scale } => Mem::Indexed {
                base: Box::new(base.offset(off)),
                index,
                scale,
            },
        }
    }

    /// Attach a hardware index to this base.
    pub fn indexed(self, index: Gpr, scale: u32) -> Mem {
        Mem::Indexed { base: Box::new(self), index, scale }
    }

    /// Render the address; `kw` is the Intel size keyword, ignored in AT&T
    /// (callers omit it under `lea` and XMM moves).
    pub fn render(&self, syntax: Syntax, target: Target, kw: Option<&str>) -> String {
        match syntax {
            Syntax::Att => self.att(target),
            Syntax::Intel => match kw {
                Some(kw) => format!("{kw} [{}]", self.intel(target)),
                None => format!("[{}]", self.intel(target)),
            },
        }
    }

    fn att(&self, target: Target) -> String {
        match self {
            Mem::Frame(d) => format!("{d}(%{})", target.bp()),
            Mem::Sym { name, off: 0 } => name.to_string(),
            Mem::Sym { name, off } => format!("{name}{off:+}"),
            Mem::Deref { base, off: 0 } => format!("(%{})", base.name(target.word())),
            Mem::Deref { base, off } => format!("{off}(%{})", base.name(target.word())),
            Mem::Indexed { base, index, scale } => {
                let idx = index.name(target.word());
                match base.as_ref() {
                    Mem::Frame(d) => format!("{d}(%{},%{idx},{scale})", target.bp()),
                    Mem::Sym { name, off: 0 } => format!("{name}(,%{idx},{scale})"),
                    Mem::Sym { name, off } => format!("{name}{off:+}(,%{idx},{scale})"),
                    Mem::Deref { base, off: 0 } => {
                        format!("(%{},%{idx},{scale})", base.name(target.word()))
                    }
                    Mem::Deref { base, off } => {
                        format!("{off}(%{},%{idx},{scale})", base.name(target.word()))
                    }
                    Mem::Indexed { .. } => {
                        unimplemented!("internal error: nested indexed operand")
                    }
                }
            }
        }
    }

    /// The bracket-free Intel address text; indexed forms compose over it.
    fn intel(&self, target: Target) -> String {
        match self {
            Mem::Frame(d) => format!("{}{d:+}", target.bp()),
            Mem::Sym { name, off: 0 } => name.to_string(),
            Mem::Sym { name, off } => format!("{name}{off:+}"),
            Mem::Deref { base, off: 0 } => base.name(target.word()).to_string(),
            Mem::Deref { base, off } => format!("{}{off:+}", base.name(target.word())),
            Mem::Indexed { base, index, scale } => {
                format!("{}+{}*{scale}", base.intel(target), index.name(target.word()))
            }
        }
    }
}

/// Any printable operand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    Reg(Gpr, Width),
    Xmm(u8),
    Imm(i64),
    /// A symbol used as an immediate address.
    SymImm(Id),
    Mem(Mem),
}

impl Operand {
    pub fn render(&self, syntax: Syntax, target: Target, kw: Option<&str>) -> String {
        match (self, syntax) {
            (Operand::Reg(r, w), Syntax::Att) => format!("%{}", r.name(*w)),
            (Operand::Reg(r, w), Syntax::Intel) => r.name(*w).to_string(),
            (Operand::Xmm(i), Syntax::Att) => format!("%xmm{i}"),
            (Operand::Xmm(i), Syntax::Intel) => format!("xmm{i}"),
            (Operand::Imm(v), Syntax::Att) => format!("${v}"),
            (Operand::Imm(v), Syntax::Intel) => v.to_string(),
            (Operand::SymImm(n), Syntax::Att) => format!("${n}"),
            (Operand::SymImm(n), Syntax::Intel) => n.to_string(),
            (Operand::Mem(m), _) => m.render(syntax, target, kw),
        }
    }
}

/// Operand for a value id at the given access width; `Value::NONE` has no
/// location.
pub fn location(alloc: &Allocation, v: Value, w: Width, target: Target) -> Option<Operand> {
    if v.is_none() {
        return None;
    }
    Some(match alloc.loc(v) {
        Loc::Reg(r) => Operand::Reg(r, w),
        Loc::Spill(slot) => Operand::Mem(spill_mem(slot, target)),
    })
}

/// Frame form of a spill slot.
pub fn spill_mem(slot: u32, target: Target) -> Mem {
    Mem::Frame(-((slot * target.word_size()) as i32))
}

/// Resolve a `name` into a memory operand, honoring the reserved
/// `stack:<N>` shape for frame-relative references.
pub fn stack_operand(name: Id) -> Mem {
    if let Some(rest) = name.strip_prefix("stack:") {
        if let Ok(off) = rest.parse::<i32>() {
            return Mem::Frame(-off);
        }
    }
    Mem::sym(name)
}

/// Byte size of a type on the given target.
pub fn type_size(t: Type, target: Target) -> u32 {
    use Type::*;
    match t {
        Char | UChar | Bool => 1,
        Short | UShort => 2,
        Int | UInt | Float => 4,
        LLong | ULLong | Double | FloatComplex => 8,
        LDouble => 10,
        DoubleComplex => 16,
        LDoubleComplex => 20,
        Ptr | Array | Struct | Union => target.word_size(),
    }
}

/// Width (and therefore AT&T suffix) used to move a value of type `t`.
/// Eight-byte types fall back to `l` on the 32-bit target.
pub fn type_width(t: Type, target: Target) -> Width {
    Width::for_size(type_size(t, target), target)
}

/// Sign/zero-extending load mnemonic for sub-word types, AT&T form.
/// Full-width loads need none.
pub fn ext_mnemonic(t: Type, target: Target) -> Option<&'static str> {
    let signed = t.is_signed();
    match type_size(t, target) {
        1 => Some(match (signed, target.is64()) {
            (true, true) => "movsbq",
            (true, false) => "movsbl",
            (false, true) => "movzbq",
            (false, false) => "movzbl",
        }),
        2 => Some(match (signed, target.is64()) {
            (true, true) => "movswq",
            (true, false) => "movswl",
            (false, true) => "movzwq",
            (false, false) => "movzwl",
        }),
        _ => None,
    }
}

/// Intel spelling of the extension: `movsx`/`movzx` with a sized memory
/// operand.
pub fn ext_mnemonic_intel(t: Type) -> &'static str {
    if t.is_signed() {
        "movsx"
    } else {
        "movzx"
    }
}

/// Hardware index scale for an indexed access: explicit `imm` when
/// non-zero, otherwise inferred from the access type.
pub fn index_scale(imm: i64, t: Type, target: Target) -> u32 {
    if imm != 0 {
        return imm as u32;
    }
    use Type::*;
    match t {
        Char | UChar | Bool => 1,
        Short | UShort => 2,
        Double | LLong | ULLong | FloatComplex => 8,
        Ptr if target.is64() => 8,
        LDouble => 10,
        DoubleComplex => 16,
        LDoubleComplex => 20,
        _ => 4,
    }
}

/// Scales the hardware addressing modes accept directly; anything else is
/// pre-multiplied with `imul`.
pub fn hw_scale(scale: u32) -> bool {
    matches!(scale, 1 | 2 | 4 | 8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::back::asm::{Syntax::*, Target::*};
    use crate::common::id;

    #[test]
    fn stack_names_parse_to_frame_offsets() {
        assert_eq!(stack_operand(id("stack:16")), Mem::Frame(-16));
        assert_eq!(stack_operand(id("stack:0")), Mem::Frame(0));
        assert_eq!(stack_operand(id("counter")), Mem::sym(id("counter")));
        // Malformed offsets stay symbols; the shape is `stack:<decimal>`.
        assert_eq!(stack_operand(id("stack:x")), Mem::sym(id("stack:x")));
    }

    #[test]
    fn frame_rendering() {
        let m = Mem::Frame(-8);
        assert_eq!(m.render(Att, X64, None), "-8(%rbp)");
        assert_eq!(m.render(Att, X86, None), "-8(%ebp)");
        assert_eq!(m.render(Intel, X64, Some("qword ptr")), "qword ptr [rbp-8]");
        assert_eq!(Mem::Frame(16).render(Att, X64, None), "16(%rbp)");
        assert_eq!(Mem::Frame(16).render(Intel, X64, None), "[rbp+16]");
    }

    #[test]
    fn indexed_rendering() {
        let m = Mem::sym(id("buf")).indexed(Gpr::Di, 1);
        assert_eq!(m.render(Att, X64, None), "buf(,%rdi,1)");
        assert_eq!(m.render(Intel, X64, Some("byte ptr")), "byte ptr [buf+rdi*1]");

        let f = Mem::Frame(-8).indexed(Gpr::A, 4);
        assert_eq!(f.render(Att, X64, None), "-8(%rbp,%rax,4)");
        assert_eq!(f.render(Intel, X64, None), "[rbp-8+rax*4]");

        let d = Mem::deref(Gpr::D).indexed(Gpr::A, 8);
        assert_eq!(d.render(Att, X64, None), "(%rdx,%rax,8)");
        assert_eq!(d.render(Intel, X64, None), "[rdx+rax*8]");
    }

    #[test]
    fn offsets_compose() {
        let m = Mem::sym(id("z")).offset(16);
        assert_eq!(m.render(Att, X64, None), "z+16");
        assert_eq!(Mem::Frame(-24).offset(16).render(Att, X64, None), "-8(%rbp)");
        assert_eq!(
            Mem::deref(Gpr::A).offset(16).render(Intel, X64, Some("dword ptr")),
            "dword ptr [rax+16]"
        );
    }

    #[test]
    fn sizes_and_suffixes() {
        assert_eq!(type_size(Type::Bool, X64), 1);
        assert_eq!(type_size(Type::UShort, X64), 2);
        assert_eq!(type_size(Type::Float, X64), 4);
        assert_eq!(type_size(Type::Double, X64), 8);
        assert_eq!(type_size(Type::Ptr, X86), 4);
        assert_eq!(type_size(Type::Ptr, X64), 8);
        assert_eq!(type_size(Type::LDouble, X64), 10);
        assert_eq!(type_size(Type::LDoubleComplex, X64), 20);
        assert_eq!(type_width(Type::LLong, X64), Width::Quad);
        assert_eq!(type_width(Type::LLong, X86), Width::Long);
        assert_eq!(type_width(Type::Short, X64), Width::Word);
    }

    #[test]
    fn extension_table() {
        assert_eq!(ext_mnemonic(Type::Char, X64), Some("movsbq"));
        assert_eq!(ext_mnemonic(Type::Char, X86), Some("movsbl"));
        assert_eq!(ext_mnemonic(Type::UChar, X64), Some("movzbq"));
        assert_eq!(ext_mnemonic(Type::Bool, X86), Some("movzbl"));
        assert_eq!(ext_mnemonic(Type::Short, X64), Some("movswq"));
        assert_eq!(ext_mnemonic(Type::UShort, X64), Some("movzwq"));
        assert_eq!(ext_mnemonic(Type::UShort, X86), Some("movzwl"));
        assert_eq!(ext_mnemonic(Type::Int, X64), None);
        assert_eq!(ext_mnemonic(Type::Double, X64), None);
    }

    #[test]
    fn scale_selection() {
        assert_eq!(index_scale(0, Type::UChar, X64), 1);
        assert_eq!(index_scale(0, Type::Short, X64), 2);
        assert_eq!(index_scale(0, Type::Int, X64), 4);
        assert_eq!(index_scale(0, Type::Double, X64), 8);
        assert_eq!(index_scale(0, Type::Ptr, X64), 8);
        assert_eq!(index_scale(0, Type::Ptr, X86), 4);
        assert_eq!(index_scale(0, Type::LDouble, X64), 10);
        assert_eq!(index_scale(3, Type::Int, X64), 3);
        assert!(hw_scale(8));
        assert!(!hw_scale(10));
    }

    #[test]
    fn long_symbols_are_fatal() {
        let long = "a".repeat(32);
        assert!(checked_sym(id(&long)).is_err());
        assert!(checked_sym(id("main")).is_ok());
    }
}
