//! End-to-end: IR text through the reader, LICM, the linear-scan
//! allocator, and the emitter.

use vc::back::{Codegen, Syntax, Target};
use vc::middle::ir::Opcode;
use vc::middle::{licm, parse_module};

fn compile(text: &str, syntax: Syntax, target: Target, optimize: bool) -> String {
    let mut module = parse_module(text).unwrap();
    if optimize {
        licm::run(&mut module);
    }
    let mut cg = Codegen::new(syntax, target);
    cg.emit_module(&mut module).unwrap();
    cg.finish()
}

const SUM: &str = "\
func main
    v1 = const 2 : int
    v2 = const 3 : int
    v3 = add v1, v2 : int
    arg v3 : int
    call puti
    ret v3 : int
endfunc
";

#[test]
fn whole_function_att_x64() {
    // v3 lives across the call, so the allocator spills it; v1/v2 take the
    // first two pool registers.
    let expected = "\
.text
.globl main
main:
    pushq %rbp
    movq %rsp, %rbp
    subq $8, %rsp
    movq $2, %rcx
    movq $3, %rdx
    movq %rcx, %rax
    addl %edx, %eax
    movq %rax, -8(%rbp)
    movq -8(%rbp), %rdi
    call puti
    movq -8(%rbp), %rax
    leave
    ret
";
    assert_eq!(compile(SUM, Syntax::Att, Target::X64, false), expected);
}

#[test]
fn whole_function_intel_x64() {
    let out = compile(SUM, Syntax::Intel, Target::X64, false);
    assert!(out.contains("mov rbp, rsp"), "{out}");
    assert!(out.contains("sub rsp, 8"), "{out}");
    assert!(out.contains("mov rdi, qword ptr [rbp-8]"), "{out}");
    assert!(out.contains("add eax, edx"), "{out}");
}

#[test]
fn syntax_parity_instruction_counts() {
    let att = compile(SUM, Syntax::Att, Target::X64, false);
    let intel = compile(SUM, Syntax::Intel, Target::X64, false);
    assert_eq!(att.lines().count(), intel.lines().count());
}

#[test]
fn x86_passes_arguments_on_the_stack() {
    let out = compile(SUM, Syntax::Att, Target::X86, false);
    assert!(out.contains("pushl"), "{out}");
    assert!(out.contains("addl $4, %esp"), "{out}");
    assert!(out.contains("%ebp"), "{out}");
    assert!(!out.contains("%rbp"), "{out}");
}

const LOOPED: &str = "\
func looped
    v1 = const 1 : int
    v2 = const 2 : int
    v3 = const 3 : int
    label top
    bcond v1, done
    v4 = add v2, v3 : int
    store v4, acc : int
    br top
    label done
    ret : int
endfunc
";

#[test]
fn licm_hoists_the_invariant_add() {
    let mut module = parse_module(LOOPED).unwrap();
    licm::run(&mut module);
    let ops: Vec<Opcode> = module.funcs[0].body.iter().map(|i| i.op).collect();
    assert_eq!(
        ops,
        vec![
            Opcode::FuncBegin,
            Opcode::Const,
            Opcode::Const,
            Opcode::Const,
            Opcode::Add,
            Opcode::Label,
            Opcode::BCond,
            Opcode::Store,
            Opcode::Br,
            Opcode::Label,
            Opcode::Ret,
            Opcode::FuncEnd,
        ]
    );
}

#[test]
fn hoisted_code_lands_above_the_loop_header() {
    let out = compile(LOOPED, Syntax::Att, Target::X64, true);
    let lines: Vec<&str> = out.lines().collect();
    let add = lines.iter().position(|l| l.contains("addl")).expect("add emitted");
    let top = lines.iter().position(|l| *l == "top:").expect("header emitted");
    assert!(add < top, "{out}");

    // Unoptimized, the add stays inside the loop.
    let out = compile(LOOPED, Syntax::Att, Target::X64, false);
    let lines: Vec<&str> = out.lines().collect();
    let add = lines.iter().position(|l| l.contains("addl")).unwrap();
    let top = lines.iter().position(|l| *l == "top:").unwrap();
    assert!(add > top, "{out}");
}

#[test]
fn branch_shape_survives_to_assembly() {
    let out = compile(LOOPED, Syntax::Att, Target::X64, true);
    assert!(out.contains("cmpq $0, %rcx"), "{out}");
    assert!(out.contains("je done"), "{out}");
    assert!(out.contains("jmp top"), "{out}");
}

const BITFIELDS: &str = "\
func flagger
    v1 = load word : llong
    bfstore v1, word shift=3 width=5
    v2 = bfload word shift=3 width=5
    store v2, out : llong
    ret v2 : llong
endfunc
";

#[test]
fn bitfield_program_masks_and_shifts() {
    let out = compile(BITFIELDS, Syntax::Att, Target::X64, false);
    assert!(out.contains("shrq $3, "), "{out}");
    assert!(out.contains("shlq $3, %rcx"), "{out}");
    assert!(out.contains("andq $31, "), "{out}");
    assert!(out.contains("andq $-249, %rax"), "{out}");
}

#[test]
fn reader_rejects_garbage_with_a_line_number() {
    let err = parse_module("func f\n    v1 = mystery 1\nendfunc\n").unwrap_err();
    assert_eq!(err.line, 2);
    assert!(err.to_string().contains("mystery"));
}
