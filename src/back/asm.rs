//! The assembly text buffer and the target/syntax vocabulary.
//!
//! Everything here is plain data: the two assembler syntaxes, the two
//! targets, operand widths with their AT&T suffixes, and the six-entry
//! general-purpose register file the allocator hands out positions in.

use derive_more::Display;

/// Assembler syntax selector, propagated unchanged to every emitter.
///
/// Both syntaxes must assemble to identical object code; AT&T carries
/// operand-size suffixes and `%`/`$` sigils, Intel carries `ptr` size
/// keywords and destination-first operand order.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum Syntax {
    #[display("att")]
    Att,
    #[display("intel")]
    Intel,
}

/// Code generation target.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum Target {
    #[display("x86")]
    X86,
    #[display("x64")]
    X64,
}

impl Target {
    pub fn is64(self) -> bool {
        matches!(self, Target::X64)
    }

    /// Pointer/word size in bytes.
    pub fn word_size(self) -> u32 {
        if self.is64() {
            8
        } else {
            4
        }
    }

    /// Width of a pointer-sized operand.
    pub fn word(self) -> Width {
        if self.is64() {
            Width::Quad
        } else {
            Width::Long
        }
    }

    /// Frame pointer register name.
    pub fn bp(self) -> &'static str {
        if self.is64() {
            "rbp"
        } else {
            "ebp"
        }
    }

    /// Stack pointer register name.
    pub fn sp(self) -> &'static str {
        if self.is64() {
            "rsp"
        } else {
            "esp"
        }
    }
}

/// Operand widths; Display is the AT&T size suffix.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Display)]
pub enum Width {
    #[display("b")]
    Byte,
    #[display("w")]
    Word,
    #[display("l")]
    Long,
    #[display("q")]
    Quad,
}

impl Width {
    pub fn bytes(self) -> u32 {
        match self {
            Width::Byte => 1,
            Width::Word => 2,
            Width::Long => 4,
            Width::Quad => 8,
        }
    }

    /// Width used to move a `size`-byte operand, capped at the target word.
    pub fn for_size(size: u32, target: Target) -> Width {
        match size {
            1 => Width::Byte,
            2 => Width::Word,
            4 => Width::Long,
            _ => target.word(),
        }
    }

    /// Intel memory-operand size keyword.
    pub fn keyword(self) -> &'static str {
        match self {
            Width::Byte => "byte ptr",
            Width::Word => "word ptr",
            Width::Long => "dword ptr",
            Width::Quad => "qword ptr",
        }
    }
}

/// The six allocatable general-purpose register positions, in file order.
/// Position 0 (A) is the primary scratch and position 1 (B) the secondary;
/// the allocator keeps live values out of both.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Gpr {
    A,
    B,
    C,
    D,
    Si,
    Di,
}

/// Primary per-instruction scratch register.
pub const SCRATCH0: Gpr = Gpr::A;
/// Secondary scratch, used when one emission needs two temporaries.
pub const SCRATCH1: Gpr = Gpr::B;

impl Gpr {
    pub const FILE: [Gpr; 6] = [Gpr::A, Gpr::B, Gpr::C, Gpr::D, Gpr::Si, Gpr::Di];

    pub fn index(self) -> usize {
        match self {
            Gpr::A => 0,
            Gpr::B => 1,
            Gpr::C => 2,
            Gpr::D => 3,
            Gpr::Si => 4,
            Gpr::Di => 5,
        }
    }

    pub fn from_index(i: usize) -> Gpr {
        Gpr::FILE[i]
    }

    /// Register name at the given access width. `sil`/`dil` are x64-only;
    /// the allocator keeps byte values out of SI/DI on x86.
    pub fn name(self, w: Width) -> &'static str {
        const BYTE: [&str; 6] = ["al", "bl", "cl", "dl", "sil", "dil"];
        const WORD: [&str; 6] = ["ax", "bx", "cx", "dx", "si", "di"];
        const LONG: [&str; 6] = ["eax", "ebx", "ecx", "edx", "esi", "edi"];
        const QUAD: [&str; 6] = ["rax", "rbx", "rcx", "rdx", "rsi", "rdi"];
        match w {
            Width::Byte => BYTE[self.index()],
            Width::Word => WORD[self.index()],
            Width::Long => LONG[self.index()],
            Width::Quad => QUAD[self.index()],
        }
    }
}

/// Growable assembly text buffer.
///
/// Instruction lines are indented four spaces; labels and directives sit
/// flush left.
#[derive(Debug, Default)]
pub struct Asm {
    out: String,
}

impl Asm {
    pub fn new() -> Asm {
        Asm::default()
    }

    /// Append one instruction line.
    pub fn ins(&mut self, line: impl AsRef<str>) {
        self.out.push_str("    ");
        self.out.push_str(line.as_ref());
        self.out.push('\n');
    }

    /// Append a label definition.
    pub fn label(&mut self, name: &str) {
        self.out.push_str(name);
        self.out.push_str(":\n");
    }

    /// Append a directive or other flush-left line.
    pub fn raw(&mut self, line: &str) {
        self.out.push_str(line);
        self.out.push('\n');
    }

    pub fn text(&self) -> &str {
        &self.out
    }

    pub fn into_text(self) -> String {
        self.out
    }
}
