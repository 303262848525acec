//! Source-to-execution scenarios: assemble real programs and drive them to completion
//! through the public `Vm`/`assemble` surface, rather than poking interpreter internals.

use tcvm::assembler::assemble;
use tcvm::interpreter::{ExecuteOutcome, Vm};

fn run_to_completion(source: &str) -> (ExecuteOutcome, Vm) {
    let code = assemble(source).expect("assembly should succeed");
    let mut vm = Vm::with_defaults().unwrap();
    vm.load_program(&code).unwrap();
    let outcome = vm.run(None);
    (outcome, vm)
}

#[test]
fn a_forward_jump_over_a_halt_leaves_r0_unchanged() {
    let (outcome, vm) = run_to_completion("JMP forward\nforward:\nHLT\n");
    assert_eq!(outcome, ExecuteOutcome::Halted);
    assert_eq!(vm.registers().signed(0), 0);
}

#[test]
fn a_string_buffer_created_inside_a_call_does_not_survive_its_return() {
    // `func` creates buffer 7 and fills it with "hello" at the deeper call depth;
    // returning releases it. The caller then creates the same id fresh and fills it
    // with "world" (5 bytes) -- if the inner buffer had leaked through, the length
    // would read 10 ("helloworld") instead.
    let source = "\
JMP start
msg1:
DAT.STR \"hello\"
msg2:
DAT.STR \"world\"
start:
CAL func
CSB @7
ASS @7, msg2
SBL @7, R1
HLT
func:
CSB @7
ASS @7, msg1
RET
";
    let (outcome, vm) = run_to_completion(source);
    assert_eq!(outcome, ExecuteOutcome::Halted);
    assert_eq!(vm.registers().signed(1), 5);
}

#[test]
fn unbounded_recursion_halts_with_a_stack_overflow_rather_than_panicking() {
    let source = "start:\nCAL start\nHLT\n";
    let code = assemble(source).expect("assembly should succeed");
    let mut vm = Vm::new(64, 16).unwrap();
    vm.load_program(&code).unwrap();
    let outcome = vm.run(None);
    assert!(matches!(outcome, ExecuteOutcome::Error(tcvm::error::VmError::StackOverflow)));
}

#[test]
fn psh_pop_round_trips_any_register_through_the_stack_regardless_of_which_register() {
    let (outcome, vm) = run_to_completion("MOV R3, #123\nPSH R3\nPOP R3\nHLT\n");
    assert_eq!(outcome, ExecuteOutcome::Halted);
    assert_eq!(vm.registers().signed(3), 123);
}

#[test]
fn cmp_then_a_conditional_jump_takes_the_equal_branch() {
    let source = "\
MOV R0, #5
MOV R1, #5
CMP R0, R1
JZR equal
MOV R2, #1
HLT
equal:
MOV R2, #2
HLT
";
    let (outcome, vm) = run_to_completion(source);
    assert_eq!(outcome, ExecuteOutcome::Halted);
    assert_eq!(vm.registers().signed(2), 2);
}
