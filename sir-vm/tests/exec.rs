//! Arithmetic, control-flow and call semantics over hand-written IR.

mod common;

use common::{run_err, run_i32};
use sir_asm::TrapReason;
use test_case::test_case;

#[test]
fn addition_program_returns_42() {
    let result = run_i32(
        "\
sigs:
  sig main: () -> i32
func main locals=0 stack=2 sig=0
  enter 0
  const.i32 41
  const.i32 1
  add.i32
  ret
end
entry main
",
    );
    assert_eq!(result, 42);
}

#[test_case("add.i32", 7, 3, 10)]
#[test_case("sub.i32", 7, 3, 4)]
#[test_case("mul.i32", 7, 3, 21)]
#[test_case("div.i32", 7, 3, 2)]
#[test_case("mod.i32", 7, 3, 1)]
#[test_case("and.i32", 0b1100, 0b1010, 0b1000)]
#[test_case("or.i32", 0b1100, 0b1010, 0b1110)]
#[test_case("xor.i32", 0b1100, 0b1010, 0b0110)]
#[test_case("shl.i32", 1, 4, 16)]
#[test_case("shr.i32", -8, 1, -4)]
fn i32_binary_semantics(op: &str, a: i32, b: i32, expected: i32) {
    let text = format!(
        "\
sigs:
  sig main: () -> i32
func main locals=0 stack=2 sig=0
  enter 0
  const.i32 {a}
  const.i32 {b}
  {op}
  ret
end
entry main
"
    );
    assert_eq!(run_i32(&text), expected);
}

#[test]
fn division_by_zero_traps() {
    let err = run_err(
        "\
sigs:
  sig main: () -> i32
func main locals=0 stack=2 sig=0
  enter 0
  const.i32 1
  const.i32 0
  div.i32
  ret
end
entry main
",
    );
    assert_eq!(err.trap_reason(), Some(TrapReason::DivisionByZero));
    assert_ne!(err.exit_code(), 0);
}

#[test]
fn int_min_divided_by_minus_one_traps() {
    let err = run_err(
        "\
sigs:
  sig main: () -> i32
func main locals=0 stack=2 sig=0
  enter 0
  const.i32 -2147483648
  const.i32 -1
  div.i32
  ret
end
entry main
",
    );
    assert_eq!(err.trap_reason(), Some(TrapReason::IntegerOverflow));
}

#[test]
fn shift_counts_wrap_by_bit_width() {
    // shl.i32(x, 33) equals shl.i32(x, 1).
    let by_33 = run_i32(
        "\
sigs:
  sig main: () -> i32
func main locals=0 stack=2 sig=0
  enter 0
  const.i32 3
  const.i32 33
  shl.i32
  ret
end
entry main
",
    );
    assert_eq!(by_33, 6);
}

#[test]
fn addition_wraps_two_complement() {
    let result = run_i32(
        "\
sigs:
  sig main: () -> i32
func main locals=0 stack=2 sig=0
  enter 0
  const.i32 2147483647
  const.i32 1
  add.i32
  ret
end
entry main
",
    );
    assert_eq!(result, i32::MIN);
}

#[test]
fn float_division_never_traps() {
    let result = common::run(
        "\
sigs:
  sig main: () -> f64
func main locals=0 stack=2 sig=0
  enter 0
  const.f64 1.0
  const.f64 0.0
  div.f64
  ret
end
entry main
",
    )
    .unwrap();
    assert!(f64::from_bits(result).is_infinite());
}

#[test]
fn conversions_round_trip() {
    let result = run_i32(
        "\
sigs:
  sig main: () -> i32
func main locals=0 stack=1 sig=0
  enter 0
  const.i32 -5
  conv.i32.f64
  conv.f64.i32
  ret
end
entry main
",
    );
    assert_eq!(result, -5);
}

#[test]
fn calls_pass_arguments_into_locals() {
    let result = run_i32(
        "\
sigs:
  sig main: () -> i32
  sig add2: (i32, i32) -> i32
func main locals=0 stack=2 sig=0
  enter 0
  const.i32 40
  const.i32 2
  call 1 2
  ret
end
func add2 locals=2 stack=2 sig=1
  enter 2
  ldloc 0
  ldloc 1
  add.i32
  ret
end
entry main
",
    );
    assert_eq!(result, 42);
}

#[test]
fn tailcall_reuses_the_frame() {
    let result = run_i32(
        "\
sigs:
  sig main: () -> i32
  sig countdown: (i32) -> i32
func main locals=0 stack=1 sig=0
  enter 0
  const.i32 100000
  call 1 1
  ret
end
func countdown locals=1 stack=2 sig=1
  enter 1
  ldloc 0
  const.i32 0
  cmp.eq.i32
  jmp.false recurse
  const.i32 7
  ret
recurse:
  ldloc 0
  dec.i32
  tailcall 1 1
end
entry main
",
    );
    // 100k self-calls would blow the depth limit without frame reuse.
    assert_eq!(result, 7);
}

#[test]
fn indirect_calls_bind_closures() {
    let result = run_i32(
        "\
sigs:
  sig main: () -> i32
  sig double: (i32) -> i32
func main locals=0 stack=2 sig=0
  enter 0
  const.i32 21
  newclosure 1 0
  callcheck
  call.indirect 1 1
  ret
end
func double locals=1 stack=2 sig=1
  enter 1
  ldloc 0
  ldloc 0
  add.i32
  ret
end
entry main
",
    );
    assert_eq!(result, 42);
}

#[test]
fn indirect_call_signature_mismatch_traps() {
    let err = run_err(
        "\
sigs:
  sig main: () -> i32
  sig double: (i32) -> i32
func main locals=0 stack=2 sig=0
  enter 0
  const.i32 21
  newclosure 1 0
  call.indirect 0 1
  ret
end
func double locals=1 stack=2 sig=1
  enter 1
  ldloc 0
  ret
end
entry main
",
    );
    assert_eq!(err.trap_reason(), Some(TrapReason::SignatureMismatch));
}

#[test]
fn callcheck_rejects_non_closures() {
    let err = run_err(
        "\
sigs:
  sig main: () -> i32
func main locals=0 stack=1 sig=0
  enter 0
  const.null
  callcheck
  ret
end
entry main
",
    );
    assert_eq!(err.trap_reason(), Some(TrapReason::NotCallable));
}

#[test]
fn jmptable_selects_cases_and_default() {
    for (selector, expected) in [(0, 10), (1, 11), (7, 99), (-1, 99)] {
        let text = format!(
            "\
sigs:
  sig main: () -> i32
func main locals=0 stack=1 sig=0
  enter 0
  const.i32 {selector}
  jmptable dflt c0 c1
c0:
  const.i32 10
  ret
c1:
  const.i32 11
  ret
dflt:
  const.i32 99
  ret
end
entry main
"
        );
        assert_eq!(run_i32(&text), expected, "selector {selector}");
    }
}

#[test]
fn explicit_trap_intrinsic_aborts() {
    let err = run_err(
        "\
sigs:
  sig main: () -> i32
func main locals=0 stack=1 sig=0
  enter 0
  intrinsic 0x0000
  const.i32 0
  ret
end
entry main
",
    );
    assert_eq!(err.trap_reason(), Some(TrapReason::Explicit));
}

#[test]
fn globals_are_initialized_from_consts() {
    let result = run_i32(
        "\
sigs:
  sig main: () -> i32
consts:
  const __ginit_counter i32 40
globals:
  global counter i32 init=__ginit_counter
func main locals=0 stack=2 sig=0
  enter 0
  ldglob 0
  const.i32 2
  add.i32
  ret
end
entry main
",
    );
    assert_eq!(result, 42);
}

#[test]
fn stack_underflow_is_fatal() {
    let err = run_err(
        "\
sigs:
  sig main: () -> i32
func main locals=0 stack=1 sig=0
  enter 0
  pop
  const.i32 0
  ret
end
entry main
",
    );
    assert_eq!(err.trap_reason(), Some(TrapReason::StackUnderflow));
}

#[test]
fn min_max_intrinsics() {
    let result = run_i32(
        "\
sigs:
  sig main: () -> i32
func main locals=0 stack=2 sig=0
  enter 0
  const.i32 3
  const.i32 9
  intrinsic 0x0023
  ret
end
entry main
",
    );
    assert_eq!(result, 9);
}
