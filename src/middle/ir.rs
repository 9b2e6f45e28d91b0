//! The linear three-address IR consumed by the back end.
//!
//! Instructions are flat records rather than per-opcode payloads: the
//! optimizer and the register allocator scan `dest`/`src1`/`src2` uniformly,
//! and the emitter dispatches on the opcode tag with an exhaustive match.

use std::fmt;

use derive_more::Display;

use crate::common::Id;

/// An SSA-like temporary named by a positive integer.
///
/// [Value::NONE] (id 0) means "no operand" and must never produce a register
/// reference.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
#[display("v{_0}")]
pub struct Value(pub u32);

impl Value {
    pub const NONE: Value = Value(0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    pub fn is_some(self) -> bool {
        self.0 != 0
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The closed opcode set. Display gives the textual mnemonic.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
pub enum Opcode {
    #[display("const")]
    Const,
    #[display("load")]
    Load,
    #[display("store")]
    Store,
    #[display("loadparam")]
    LoadParam,
    #[display("storeparam")]
    StoreParam,
    #[display("addr")]
    Addr,
    #[display("loadptr")]
    LoadPtr,
    #[display("storeptr")]
    StorePtr,
    #[display("loadidx")]
    LoadIdx,
    #[display("storeidx")]
    StoreIdx,
    #[display("bfload")]
    BfLoad,
    #[display("bfstore")]
    BfStore,
    #[display("arg")]
    Arg,
    #[display("globstring")]
    GlobString,
    #[display("globwstring")]
    GlobWString,
    #[display("add")]
    Add,
    #[display("sub")]
    Sub,
    #[display("mul")]
    Mul,
    #[display("div")]
    Div,
    #[display("mod")]
    Mod,
    #[display("shl")]
    Shl,
    #[display("shr")]
    Shr,
    #[display("and")]
    And,
    #[display("or")]
    Or,
    #[display("xor")]
    Xor,
    #[display("fadd")]
    FAdd,
    #[display("fsub")]
    FSub,
    #[display("fmul")]
    FMul,
    #[display("fdiv")]
    FDiv,
    #[display("lfadd")]
    LfAdd,
    #[display("lfsub")]
    LfSub,
    #[display("lfmul")]
    LfMul,
    #[display("lfdiv")]
    LfDiv,
    #[display("ptradd")]
    PtrAdd,
    #[display("ptrdiff")]
    PtrDiff,
    #[display("cmpeq")]
    CmpEq,
    #[display("cmpne")]
    CmpNe,
    #[display("cmplt")]
    CmpLt,
    #[display("cmple")]
    CmpLe,
    #[display("cmpgt")]
    CmpGt,
    #[display("cmpge")]
    CmpGe,
    #[display("logand")]
    LogAnd,
    #[display("logor")]
    LogOr,
    #[display("label")]
    Label,
    #[display("br")]
    Br,
    #[display("bcond")]
    BCond,
    #[display("call")]
    Call,
    #[display("ret")]
    Ret,
    #[display("func")]
    FuncBegin,
    #[display("endfunc")]
    FuncEnd,
    #[display("globvar")]
    GlobVar,
    #[display("globarray")]
    GlobArray,
    #[display("globstruct")]
    GlobStruct,
    #[display("globunion")]
    GlobUnion,
    #[display("globaddr")]
    GlobAddr,
}

impl Opcode {
    /// Parse a textual mnemonic.
    pub fn from_mnemonic(s: &str) -> Option<Opcode> {
        use Opcode::*;
        Some(match s {
            "const" => Const,
            "load" => Load,
            "store" => Store,
            "loadparam" => LoadParam,
            "storeparam" => StoreParam,
            "addr" => Addr,
            "loadptr" => LoadPtr,
            "storeptr" => StorePtr,
            "loadidx" => LoadIdx,
            "storeidx" => StoreIdx,
            "bfload" => BfLoad,
            "bfstore" => BfStore,
            "arg" => Arg,
            "globstring" => GlobString,
            "globwstring" => GlobWString,
            "add" => Add,
            "sub" => Sub,
            "mul" => Mul,
            "div" => Div,
            "mod" => Mod,
            "shl" => Shl,
            "shr" => Shr,
            "and" => And,
            "or" => Or,
            "xor" => Xor,
            "fadd" => FAdd,
            "fsub" => FSub,
            "fmul" => FMul,
            "fdiv" => FDiv,
            "lfadd" => LfAdd,
            "lfsub" => LfSub,
            "lfmul" => LfMul,
            "lfdiv" => LfDiv,
            "ptradd" => PtrAdd,
            "ptrdiff" => PtrDiff,
            "cmpeq" => CmpEq,
            "cmpne" => CmpNe,
            "cmplt" => CmpLt,
            "cmple" => CmpLe,
            "cmpgt" => CmpGt,
            "cmpge" => CmpGe,
            "logand" => LogAnd,
            "logor" => LogOr,
            "label" => Label,
            "br" => Br,
            "bcond" => BCond,
            "call" => Call,
            "ret" => Ret,
            "func" => FuncBegin,
            "endfunc" => FuncEnd,
            "globvar" => GlobVar,
            "globarray" => GlobArray,
            "globstruct" => GlobStruct,
            "globunion" => GlobUnion,
            "globaddr" => GlobAddr,
            _ => return None,
        })
    }

    /// Pure value-producing opcodes: no memory or control effects, safe to
    /// reorder and to hoist out of loops.
    pub fn is_pure(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            Const
                | Add
                | Sub
                | Mul
                | Div
                | Mod
                | Shl
                | Shr
                | And
                | Or
                | Xor
                | FAdd
                | FSub
                | FMul
                | FDiv
                | LfAdd
                | LfSub
                | LfMul
                | LfDiv
                | PtrAdd
                | PtrDiff
                | CmpEq
                | CmpNe
                | CmpLt
                | CmpLe
                | CmpGt
                | CmpGe
                | LogAnd
                | LogOr
        )
    }
}

/// Primitive type tags carried on every instruction.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
pub enum Type {
    #[display("char")]
    Char,
    #[display("uchar")]
    UChar,
    #[display("bool")]
    Bool,
    #[display("short")]
    Short,
    #[display("ushort")]
    UShort,
    #[display("int")]
    Int,
    #[display("uint")]
    UInt,
    #[display("llong")]
    LLong,
    #[display("ullong")]
    ULLong,
    #[display("float")]
    Float,
    #[display("double")]
    Double,
    #[display("ldouble")]
    LDouble,
    #[display("fcomplex")]
    FloatComplex,
    #[display("dcomplex")]
    DoubleComplex,
    #[display("ldcomplex")]
    LDoubleComplex,
    #[display("ptr")]
    Ptr,
    #[display("array")]
    Array,
    #[display("struct")]
    Struct,
    #[display("union")]
    Union,
}

impl Type {
    /// Parse a textual type name.
    pub fn from_name(s: &str) -> Option<Type> {
        use Type::*;
        Some(match s {
            "char" => Char,
            "uchar" => UChar,
            "bool" => Bool,
            "short" => Short,
            "ushort" => UShort,
            "int" => Int,
            "uint" => UInt,
            "llong" => LLong,
            "ullong" => ULLong,
            "float" => Float,
            "double" => Double,
            "ldouble" => LDouble,
            "fcomplex" => FloatComplex,
            "dcomplex" => DoubleComplex,
            "ldcomplex" => LDoubleComplex,
            "ptr" => Ptr,
            "array" => Array,
            "struct" => Struct,
            "union" => Union,
        _ => return None,
        })
    }

    /// Signed integer types. Plain `char` is treated as signed.
    pub fn is_signed(self) -> bool {
        matches!(self, Type::Char | Type::Short | Type::Int | Type::LLong)
    }
}

/// Pack a bit-field access descriptor into the `imm` field.
pub fn bf_imm(shift: u32, width: u32) -> i64 {
    ((shift as i64) << 32) | width as i64
}

/// One IR instruction.
///
/// `imm` is overloaded by opcode: the literal for `Const`, the packed
/// `(shift << 32) | width` for bit-field ops, the parameter index for
/// `LoadParam`/`StoreParam`, the index scale for `LoadIdx`/`StoreIdx`, the
/// element size for `PtrAdd`/`PtrDiff`, and the frame size (patched by the
/// register allocator) for `FuncBegin`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Inst {
    pub op: Opcode,
    pub dest: Value,
    pub src1: Value,
    pub src2: Value,
    pub imm: i64,
    pub name: Option<Id>,
    pub ty: Type,
}

impl Inst {
    pub fn new(op: Opcode) -> Inst {
        Inst {
            op,
            dest: Value::NONE,
            src1: Value::NONE,
            src2: Value::NONE,
            imm: 0,
            name: None,
            ty: Type::Int,
        }
    }

    pub fn dest(mut self, v: Value) -> Inst {
        self.dest = v;
        self
    }

    pub fn src1(mut self, v: Value) -> Inst {
        self.src1 = v;
        self
    }

    pub fn src2(mut self, v: Value) -> Inst {
        self.src2 = v;
        self
    }

    pub fn imm(mut self, imm: i64) -> Inst {
        self.imm = imm;
        self
    }

    pub fn name(mut self, name: Id) -> Inst {
        self.name = Some(name);
        self
    }

    pub fn ty(mut self, ty: Type) -> Inst {
        self.ty = ty;
        self
    }

    /// Bit position of a bit-field access.
    pub fn bf_shift(&self) -> u32 {
        (self.imm >> 32) as u32
    }

    /// Width in bits of a bit-field access.
    pub fn bf_width(&self) -> u32 {
        (self.imm & 0xffff_ffff) as u32
    }
}

impl fmt::Display for Inst {
    /// The textual form accepted by the IR reader.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Opcode::*;

        let name = |f: &mut fmt::Formatter<'_>, n: &Option<Id>| match n {
            Some(n) => write!(f, "{n}"),
            None => write!(f, "?"),
        };

        if self.dest.is_some() {
            write!(f, "{} = ", self.dest)?;
        }
        match self.op {
            Const => write!(f, "const {}", self.imm)?,
            Load | Addr | GlobString | GlobWString | Label | Br | GlobVar | GlobArray
            | GlobStruct | GlobUnion | GlobAddr => {
                write!(f, "{} ", self.op)?;
                name(f, &self.name)?;
            }
            Store => {
                write!(f, "store {}, ", self.src1)?;
                name(f, &self.name)?;
            }
            LoadParam => write!(f, "loadparam {}", self.imm)?,
            StoreParam => write!(f, "storeparam {}, {}", self.src1, self.imm)?,
            LoadPtr => write!(f, "loadptr {}", self.src1)?,
            StorePtr => write!(f, "storeptr {}, {}", self.src1, self.src2)?,
            LoadIdx => {
                write!(f, "loadidx ")?;
                name(f, &self.name)?;
                write!(f, ", {} scale={}", self.src1, self.imm)?;
            }
            StoreIdx => {
                write!(f, "storeidx {}, {}, ", self.src1, self.src2)?;
                name(f, &self.name)?;
                write!(f, " scale={}", self.imm)?;
            }
            BfLoad => {
                write!(f, "bfload ")?;
                name(f, &self.name)?;
                write!(f, " shift={} width={}", self.bf_shift(), self.bf_width())?;
            }
            BfStore => {
                write!(f, "bfstore {}, ", self.src1)?;
                name(f, &self.name)?;
                write!(f, " shift={} width={}", self.bf_shift(), self.bf_width())?;
            }
            Arg => write!(f, "arg {}", self.src1)?,
            PtrAdd | PtrDiff => {
                write!(f, "{} {}, {} size={}", self.op, self.src1, self.src2, self.imm)?
            }
            Add | Sub | Mul | Div | Mod | Shl | Shr | And | Or | Xor | FAdd | FSub | FMul
            | FDiv | LfAdd | LfSub | LfMul | LfDiv | CmpEq | CmpNe | CmpLt | CmpLe | CmpGt
            | CmpGe | LogAnd | LogOr => {
                write!(f, "{} {}, {}", self.op, self.src1, self.src2)?
            }
            BCond => {
                write!(f, "bcond {}, ", self.src1)?;
                name(f, &self.name)?;
            }
            Call => {
                write!(f, "call ")?;
                name(f, &self.name)?;
            }
            Ret => {
                write!(f, "ret")?;
                if self.src1.is_some() {
                    write!(f, " {}", self.src1)?;
                }
            }
            FuncBegin => {
                write!(f, "func ")?;
                name(f, &self.name)?;
            }
            FuncEnd => write!(f, "endfunc")?,
        }
        // The type tag matters for the typed memory and arithmetic forms.
        match self.op {
            Const | Load | Store | LoadParam | StoreParam | LoadPtr | StorePtr | LoadIdx | StoreIdx
            | Arg | Add | Sub | Mul | Div | Mod | Shl | Shr | And | Or | Xor | FAdd | FSub
            | FMul | FDiv | LfAdd | LfSub | LfMul | LfDiv | PtrAdd | PtrDiff | CmpEq | CmpNe
            | CmpLt | CmpLe | CmpGt | CmpGe | LogAnd | LogOr | Ret => {
                write!(f, " : {}", self.ty)?
            }
            _ => {}
        }
        Ok(())
    }
}

/// A function: its interned name and the forward-only instruction list,
/// opened by `FuncBegin` and closed by `FuncEnd`.
#[derive(Clone, Debug)]
pub struct Function {
    pub name: Id,
    pub body: Vec<Inst>,
}

impl Function {
    pub fn new(name: Id) -> Function {
        Function { name, body: Vec::new() }
    }

    /// Highest value id referenced, for sizing location maps.
    pub fn max_value(&self) -> u32 {
        self.body
            .iter()
            .flat_map(|i| [i.dest, i.src1, i.src2])
            .map(|v| v.0)
            .max()
            .unwrap_or(0)
    }
}

/// A translation unit's worth of functions.
#[derive(Clone, Debug, Default)]
pub struct Module {
    pub funcs: Vec<Function>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::id;

    #[test]
    fn value_sentinel() {
        assert!(Value::NONE.is_none());
        assert!(Value(3).is_some());
    }

    #[test]
    fn bf_imm_round_trip() {
        let inst = Inst::new(Opcode::BfLoad).imm(bf_imm(3, 5));
        assert_eq!(inst.bf_shift(), 3);
        assert_eq!(inst.bf_width(), 5);
        let wide = Inst::new(Opcode::BfStore).imm(bf_imm(0, 64));
        assert_eq!(wide.bf_shift(), 0);
        assert_eq!(wide.bf_width(), 64);
    }

    #[test]
    fn purity() {
        assert!(Opcode::Add.is_pure());
        assert!(Opcode::Const.is_pure());
        assert!(Opcode::CmpLt.is_pure());
        assert!(!Opcode::Load.is_pure());
        assert!(!Opcode::Store.is_pure());
        assert!(!Opcode::Call.is_pure());
        assert!(!Opcode::BCond.is_pure());
    }

    #[test]
    fn mnemonic_round_trip() {
        for op in [
            Opcode::Const,
            Opcode::LoadIdx,
            Opcode::BfStore,
            Opcode::LfDiv,
            Opcode::CmpGe,
            Opcode::FuncBegin,
            Opcode::GlobAddr,
        ] {
            assert_eq!(Opcode::from_mnemonic(&op.to_string()), Some(op));
        }
        assert_eq!(Opcode::from_mnemonic("frobnicate"), None);
    }

    #[test]
    fn max_value_scans_all_operands() {
        let mut f = Function::new(id("f"));
        f.body.push(Inst::new(Opcode::Add).dest(Value(7)).src1(Value(2)).src2(Value(3)));
        assert_eq!(f.max_value(), 7);
    }
}
