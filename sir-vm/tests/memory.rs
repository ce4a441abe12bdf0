//! Heap opcodes: artifacts, arrays, lists, strings and the traps their
//! misuse raises.

mod common;

use common::{run_err, run_i32, vm_for};
use sir_asm::TrapReason;

#[test]
fn artifact_fields_store_and_load() {
    // P { x: 3, y: 4 } => x*x + y*y = 25.
    let result = run_i32(
        "\
types:
  type Point size=8 kind=artifact
  field x i32 offset=0
  field y i32 offset=4
sigs:
  sig main: () -> i32
func main locals=1 stack=3 sig=0
  enter 1
  newobj 16
  stloc 0
  ldloc 0
  const.i32 3
  stfld 0
  ldloc 0
  const.i32 4
  stfld 1
  ldloc 0
  ldfld 0
  ldloc 0
  ldfld 0
  mul.i32
  ldloc 0
  ldfld 1
  ldloc 0
  ldfld 1
  mul.i32
  add.i32
  ret
end
entry main
",
    );
    assert_eq!(result, 25);
}

#[test]
fn narrow_fields_sign_extend() {
    let result = run_i32(
        "\
types:
  type Small size=4 kind=artifact
  field b i8 offset=0
  field h i16 offset=2
sigs:
  sig main: () -> i32
func main locals=1 stack=3 sig=0
  enter 1
  newobj 16
  stloc 0
  ldloc 0
  const.i32 -3
  stfld 0
  ldloc 0
  const.i32 -300
  stfld 1
  ldloc 0
  ldfld 0
  ldloc 0
  ldfld 1
  add.i32
  ret
end
entry main
",
    );
    assert_eq!(result, -303);
}

#[test]
fn null_field_access_traps() {
    let err = run_err(
        "\
types:
  type Point size=8 kind=artifact
  field x i32 offset=0
sigs:
  sig main: () -> i32
func main locals=0 stack=1 sig=0
  enter 0
  const.null
  ldfld 0
  ret
end
entry main
",
    );
    assert_eq!(err.trap_reason(), Some(TrapReason::NullReference));
}

#[test]
fn typeof_reports_the_type_id() {
    let result = run_i32(
        "\
types:
  type Point size=8 kind=artifact
  field x i32 offset=0
sigs:
  sig main: () -> i32
func main locals=0 stack=1 sig=0
  enter 0
  newobj 16
  typeof
  ret
end
entry main
",
    );
    assert_eq!(result, 16);
}

#[test]
fn arrays_are_zeroed_and_indexable() {
    let result = run_i32(
        "\
sigs:
  sig main: () -> i32
func main locals=1 stack=4 sig=0
  enter 1
  newarray 5 3
  stloc 0
  ldloc 0
  const.i32 1
  const.i32 40
  array.set.i32
  ldloc 0
  const.i32 1
  array.get.i32
  ldloc 0
  const.i32 2
  array.get.i32
  add.i32
  ldloc 0
  array.len
  sub.i32
  const.i32 39
  sub.i32
  ret
end
entry main
",
    );
    // 40 + 0 - 3 - 39 = -2.
    assert_eq!(result, -2);
}

#[test]
fn array_out_of_bounds_traps() {
    let err = run_err(
        "\
sigs:
  sig main: () -> i32
func main locals=0 stack=2 sig=0
  enter 0
  newarray 5 1
  const.i32 5
  array.get.i32
  ret
end
entry main
",
    );
    assert_eq!(err.trap_reason(), Some(TrapReason::IndexOutOfBounds));
}

#[test]
fn list_push_pop_preserves_order() {
    // Capacity 0, push 1..5, pop once: len 4, remaining 1,2,3,4.
    let result = run_i32(
        "\
sigs:
  sig main: () -> i32
func main locals=2 stack=3 sig=0
  enter 2
  newlist 5 0
  stloc 0
  const.i32 1
  stloc 1
fill:
  ldloc 1
  const.i32 5
  cmp.le.i32
  jmp.false filled
  ldloc 0
  ldloc 1
  list.push.i32
  ldloc 1
  inc.i32
  stloc 1
  jmp fill
filled:
  ldloc 0
  list.pop.i32
  pop
  ldloc 0
  list.len
  const.i32 4
  cmp.eq.i32
  jmp.false bad
  ldloc 0
  const.i32 0
  list.get.i32
  const.i32 1000
  mul.i32
  ldloc 0
  const.i32 3
  list.get.i32
  add.i32
  ret
bad:
  const.i32 -1
  ret
end
entry main
",
    );
    // first element 1 and last remaining element 4.
    assert_eq!(result, 1004);
}

#[test]
fn list_insert_and_remove_shift_elements() {
    let result = run_i32(
        "\
sigs:
  sig main: () -> i32
func main locals=1 stack=4 sig=0
  enter 1
  newlist 5 0
  stloc 0
  ldloc 0
  const.i32 1
  list.push.i32
  ldloc 0
  const.i32 3
  list.push.i32
  ldloc 0
  const.i32 1
  const.i32 2
  list.insert.i32
  ldloc 0
  const.i32 0
  list.remove.i32
  pop
  ldloc 0
  const.i32 0
  list.get.i32
  ldloc 0
  const.i32 1
  list.get.i32
  const.i32 10
  mul.i32
  add.i32
  ret
end
entry main
",
    );
    // [1,3] -> insert 2 at 1 -> [1,2,3] -> remove head -> [2,3].
    assert_eq!(result, 32);
}

#[test]
fn pop_on_empty_list_traps() {
    let err = run_err(
        "\
sigs:
  sig main: () -> i32
func main locals=0 stack=1 sig=0
  enter 0
  newlist 5 0
  list.pop.i32
  ret
end
entry main
",
    );
    assert_eq!(err.trap_reason(), Some(TrapReason::IndexOutOfBounds));
}

#[test]
fn strings_concat_and_measure() {
    let result = run_i32(
        "\
sigs:
  sig main: () -> i32
consts:
  const a string \"foo\"
  const b string \"bar!\"
func main locals=0 stack=2 sig=0
  enter 0
  const.string 0
  const.string 1
  string.concat
  string.len
  ret
end
entry main
",
    );
    assert_eq!(result, 7);
}

#[test]
fn string_chars_and_slices() {
    let result = run_i32(
        "\
sigs:
  sig main: () -> i32
consts:
  const text string \"hello\"
func main locals=0 stack=3 sig=0
  enter 0
  const.string 0
  const.i32 1
  const.i32 3
  string.slice
  const.i32 0
  string.get.char
  ret
end
entry main
",
    );
    assert_eq!(result, i32::from(b'e'));
}

#[test]
fn string_slice_out_of_range_traps() {
    let err = run_err(
        "\
sigs:
  sig main: () -> i32
consts:
  const text string \"abc\"
func main locals=0 stack=3 sig=0
  enter 0
  const.string 0
  const.i32 2
  const.i32 5
  string.slice
  string.len
  ret
end
entry main
",
    );
    assert_eq!(err.trap_reason(), Some(TrapReason::InvalidStringIndex));
}

#[test]
fn closure_payload_reads_little_endian() {
    let mut vm = vm_for(
        "\
sigs:
  sig main: () -> i32
  sig read: () -> i32
func main locals=0 stack=3 sig=0
  enter 0
  newarray 5 1
  dup
  const.i32 0
  const.i32 77
  array.set.i32
  newclosure 1 1
  callcheck
  call.indirect 1 0
  ret
end
func read locals=0 stack=2 sig=1
  enter 0
  ldupv 0
  const.i32 0
  array.get.i32
  ret
end
entry main
",
    );
    assert_eq!(vm.run().unwrap(), Some(77));
}
