//! The textual IR reader.
//!
//! A line-oriented developer format standing in for the C front end: one
//! instruction per line inside `func <name>` / `endfunc` brackets, with
//! `#` comments. Defining forms are `v<N> = <op> <operands>`, the rest
//! plain `<op> <operands>`; operands are value ids, integers, and names,
//! separated by commas or spaces. `key=<int>` attributes carry scales and
//! bit-field geometry, and a trailing `: <type>` sets the type tag
//! (defaulting to `int`).
//!
//! ```text
//! func main
//!     v1 = const 5 : int
//!     store v1, x : int
//!     v2 = loadidx buf, v1 scale=1 : uchar
//!     arg v2 : int
//!     call puti
//!     ret v2 : int
//! endfunc
//! ```

use regex::Regex;
use thiserror::Error;

use crate::common::{id, Id};
use crate::middle::ir::{bf_imm, Function, Inst, Module, Opcode, Type, Value};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("line {line}: {kind}")]
pub struct ReadError {
    pub line: usize,
    pub kind: ReadErrorKind,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReadErrorKind {
    #[error("unknown mnemonic {0:?}")]
    UnknownOp(String),
    #[error("unknown type {0:?}")]
    UnknownType(String),
    #[error("unknown attribute {0:?}")]
    UnknownAttr(String),
    #[error("expected {0}")]
    Expected(&'static str),
    #[error("instruction outside a function")]
    OutsideFunction,
    #[error("nested function definition")]
    NestedFunction,
    #[error("missing endfunc")]
    UnterminatedFunction,
    #[error("malformed line")]
    Malformed,
}

use ReadErrorKind::*;

/// Parse a whole translation unit.
pub fn parse_module(text: &str) -> Result<Module, ReadError> {
    Reader::new().parse(text)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Val(Value),
    Int(i64),
    Name(Id),
}

/// Recognized `key=<int>` attributes.
#[derive(Debug, Default)]
struct Attrs {
    scale: i64,
    shift: i64,
    width: i64,
    size: i64,
}

/// One tokenized instruction line.
struct Line {
    ops: Vec<Tok>,
    attrs: Attrs,
    ty: Option<Type>,
}

impl Line {
    fn arg(&self, i: usize) -> Result<&Tok, ReadErrorKind> {
        self.ops.get(i).ok_or(Expected("operand"))
    }

    fn val(&self, i: usize) -> Result<Value, ReadErrorKind> {
        match self.arg(i)? {
            Tok::Val(v) => Ok(*v),
            _ => Err(Expected("value id")),
        }
    }

    fn int(&self, i: usize) -> Result<i64, ReadErrorKind> {
        match self.arg(i)? {
            Tok::Int(n) => Ok(*n),
            _ => Err(Expected("integer")),
        }
    }

    fn name(&self, i: usize) -> Result<Id, ReadErrorKind> {
        match self.arg(i)? {
            Tok::Name(n) => Ok(*n),
            _ => Err(Expected("name")),
        }
    }
}

pub struct Reader {
    re_def: Regex,
    re_val: Regex,
    re_int: Regex,
    re_attr: Regex,
    re_name: Regex,
}

impl Default for Reader {
    fn default() -> Reader {
        Reader::new()
    }
}

impl Reader {
    pub fn new() -> Reader {
        Reader {
            re_def: Regex::new(r"^v(\d+)\s*=\s*(.*)$").unwrap(),
            re_val: Regex::new(r"^v(\d+)$").unwrap(),
            re_int: Regex::new(r"^-?\d+$").unwrap(),
            re_attr: Regex::new(r"^([a-z]+)=(-?\d+)$").unwrap(),
            re_name: Regex::new(r"^[A-Za-z_.$][A-Za-z0-9_.$:]*$").unwrap(),
        }
    }

    pub fn parse(&self, text: &str) -> Result<Module, ReadError> {
        let mut module = Module::default();
        let mut current: Option<Function> = None;
        let mut last = 0;

        for (no, raw) in text.lines().enumerate() {
            let no = no + 1;
            last = no;
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let fail = |kind| ReadError { line: no, kind };

            if let Some(rest) = line.strip_prefix("func ") {
                if current.is_some() {
                    return Err(fail(NestedFunction));
                }
                let name = rest.trim();
                if !self.re_name.is_match(name) {
                    return Err(fail(Expected("function name")));
                }
                let mut f = Function::new(id(name));
                f.body.push(Inst::new(Opcode::FuncBegin).name(id(name)));
                current = Some(f);
                continue;
            }
            if line == "endfunc" {
                let mut f = current.take().ok_or_else(|| fail(OutsideFunction))?;
                f.body.push(Inst::new(Opcode::FuncEnd));
                module.funcs.push(f);
                continue;
            }

            let f = current.as_mut().ok_or_else(|| fail(OutsideFunction))?;
            let inst = self.parse_inst(line).map_err(fail)?;
            f.body.push(inst);
        }

        if current.is_some() {
            return Err(ReadError { line: last, kind: UnterminatedFunction });
        }
        Ok(module)
    }

    fn parse_inst(&self, line: &str) -> Result<Inst, ReadErrorKind> {
        let (dest, rest) = match self.re_def.captures(line) {
            Some(c) => {
                let n: u32 = c[1].parse().map_err(|_| Malformed)?;
                (Value(n), c.get(2).map(|m| m.as_str().to_string()).unwrap_or_default())
            }
            None => (Value::NONE, line.to_string()),
        };

        let cleaned = rest.replace(',', " ");
        let mut words = cleaned.split_whitespace();
        let mnemonic = words.next().ok_or(Expected("mnemonic"))?;
        let op = Opcode::from_mnemonic(mnemonic)
            .ok_or_else(|| UnknownOp(mnemonic.to_string()))?;
        if matches!(op, Opcode::FuncBegin | Opcode::FuncEnd) {
            // Function brackets have their own line forms.
            return Err(Malformed);
        }

        let mut parsed = Line { ops: Vec::new(), attrs: Attrs::default(), ty: None };
        let mut words = words.peekable();
        while let Some(word) = words.next() {
            if word == ":" {
                let ty = words.next().ok_or(Expected("type name"))?;
                parsed.ty = Some(
                    Type::from_name(ty).ok_or_else(|| UnknownType(ty.to_string()))?,
                );
                if words.next().is_some() {
                    return Err(Malformed);
                }
                break;
            }
            if let Some(c) = self.re_attr.captures(word) {
                let value: i64 = c[2].parse().map_err(|_| Malformed)?;
                match &c[1] {
                    "scale" => parsed.attrs.scale = value,
                    "shift" => parsed.attrs.shift = value,
                    "width" => parsed.attrs.width = value,
                    "size" => parsed.attrs.size = value,
                    key => return Err(UnknownAttr(key.to_string())),
                }
            } else if let Some(c) = self.re_val.captures(word) {
                let n: u32 = c[1].parse().map_err(|_| Malformed)?;
                parsed.ops.push(Tok::Val(Value(n)));
            } else if self.re_int.is_match(word) {
                parsed.ops.push(Tok::Int(word.parse().map_err(|_| Malformed)?));
            } else if self.re_name.is_match(word) {
                parsed.ops.push(Tok::Name(id(word)));
            } else {
                return Err(Malformed);
            }
        }

        build(op, dest, &parsed)
    }
}

/// Defining opcodes must name a destination.
fn needs_dest(op: Opcode) -> bool {
    use Opcode::*;
    op.is_pure()
        || matches!(
            op,
            Load | LoadParam | Addr | LoadPtr | LoadIdx | BfLoad | GlobString | GlobWString
        )
}

fn build(op: Opcode, dest: Value, line: &Line) -> Result<Inst, ReadErrorKind> {
    use Opcode::*;

    if needs_dest(op) && dest.is_none() {
        return Err(Expected("destination value"));
    }

    let mut inst = Inst::new(op).dest(dest).ty(line.ty.unwrap_or(Type::Int));
    match op {
        Const => inst.imm = line.int(0)?,
        Load | Addr | GlobString | GlobWString | Label | Br | GlobVar | GlobArray
        | GlobStruct | GlobUnion | GlobAddr => inst.name = Some(line.name(0)?),
        Store => {
            inst.src1 = line.val(0)?;
            inst.name = Some(line.name(1)?);
        }
        LoadParam => inst.imm = line.int(0)?,
        StoreParam => {
            inst.src1 = line.val(0)?;
            inst.imm = line.int(1)?;
        }
        LoadPtr => inst.src1 = line.val(0)?,
        StorePtr => {
            inst.src1 = line.val(0)?;
            inst.src2 = line.val(1)?;
        }
        LoadIdx => {
            inst.name = Some(line.name(0)?);
            inst.src1 = line.val(1)?;
            inst.imm = line.attrs.scale;
        }
        StoreIdx => {
            inst.src1 = line.val(0)?;
            inst.src2 = line.val(1)?;
            inst.name = Some(line.name(2)?);
            inst.imm = line.attrs.scale;
        }
        BfLoad => {
            inst.name = Some(line.name(0)?);
            inst.imm = bf_imm(line.attrs.shift as u32, line.attrs.width as u32);
        }
        BfStore => {
            inst.src1 = line.val(0)?;
            inst.name = Some(line.name(1)?);
            inst.imm = bf_imm(line.attrs.shift as u32, line.attrs.width as u32);
        }
        Arg => inst.src1 = line.val(0)?,
        PtrAdd | PtrDiff => {
            inst.src1 = line.val(0)?;
            inst.src2 = line.val(1)?;
            inst.imm = line.attrs.size;
        }
        Add | Sub | Mul | Div | Mod | Shl | Shr | And | Or | Xor | FAdd | FSub | FMul | FDiv
        | LfAdd | LfSub | LfMul | LfDiv | CmpEq | CmpNe | CmpLt | CmpLe | CmpGt | CmpGe
        | LogAnd | LogOr => {
            inst.src1 = line.val(0)?;
            inst.src2 = line.val(1)?;
        }
        BCond => {
            inst.src1 = line.val(0)?;
            inst.name = Some(line.name(1)?);
        }
        Call => inst.name = Some(line.name(0)?),
        Ret => {
            if !line.ops.is_empty() {
                inst.src1 = line.val(0)?;
            }
        }
        FuncBegin | FuncEnd => unreachable!("handled by the line forms"),
    }
    Ok(inst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_small_function() {
        let m = parse_module(
            "# demo\n\
             func main\n\
                 v1 = const 5 : int\n\
                 store v1, x : int\n\
                 v2 = loadidx buf, v1 scale=1 : uchar\n\
                 v3 = add v1, v2 : int\n\
                 arg v3 : int\n\
                 call puti\n\
                 ret v3 : int\n\
             endfunc\n",
        )
        .unwrap();

        assert_eq!(m.funcs.len(), 1);
        let f = &m.funcs[0];
        assert_eq!(*f.name, "main");
        assert_eq!(f.body[0].op, Opcode::FuncBegin);
        assert_eq!(f.body.last().unwrap().op, Opcode::FuncEnd);

        let idx = &f.body[3];
        assert_eq!(idx.op, Opcode::LoadIdx);
        assert_eq!(idx.dest, Value(2));
        assert_eq!(idx.src1, Value(1));
        assert_eq!(idx.imm, 1);
        assert_eq!(idx.ty, Type::UChar);
    }

    #[test]
    fn bitfield_attrs_pack() {
        let m = parse_module(
            "func f\n\
                 v1 = bfload flags shift=3 width=5\n\
                 bfstore v1, flags shift=3 width=5\n\
             endfunc\n",
        )
        .unwrap();
        let load = &m.funcs[0].body[1];
        assert_eq!(load.bf_shift(), 3);
        assert_eq!(load.bf_width(), 5);
        assert_eq!(load.imm, (3i64 << 32) | 5);
    }

    #[test]
    fn stack_names_survive() {
        let m = parse_module("func f\nv1 = addr stack:16\nendfunc\n").unwrap();
        assert_eq!(*m.funcs[0].body[1].name.unwrap(), "stack:16");
    }

    #[test]
    fn display_round_trips() {
        let text = "func f\n\
                        v1 = const 7 : int\n\
                        v2 = bfload flags shift=2 width=6\n\
                        v3 = ptradd v1, v2 size=4 : ptr\n\
                        storeidx v2, v3, buf scale=8 : double\n\
                        bcond v3, out\n\
                        label out\n\
                        ret v3 : int\n\
                    endfunc\n";
        let m = parse_module(text).unwrap();
        let dumped: String = m.funcs[0].body[1..m.funcs[0].body.len() - 1]
            .iter()
            .map(|i| format!("{i}\n"))
            .collect();
        let reparsed = parse_module(&format!("func f\n{dumped}endfunc\n")).unwrap();
        assert_eq!(m.funcs[0].body, reparsed.funcs[0].body);
    }

    #[test]
    fn errors_carry_line_numbers() {
        let err = parse_module("func f\n  v1 = frobnicate 3\nendfunc\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.kind, UnknownOp("frobnicate".to_string()));

        let err = parse_module("v1 = const 5\n").unwrap_err();
        assert_eq!(err.kind, OutsideFunction);

        let err = parse_module("func f\nv1 = const 5\n").unwrap_err();
        assert_eq!(err.kind, UnterminatedFunction);

        let err = parse_module("func f\nload x : int\nendfunc\n").unwrap_err();
        assert_eq!(err.kind, Expected("destination value"));

        let err = parse_module("func f\nv1 = load x : quux\nendfunc\n").unwrap_err();
        assert_eq!(err.kind, UnknownType("quux".to_string()));
    }
}
