//! Collection behavior driven through whole programs: the
//! allocation-count trigger, root enumeration and closure upvalue
//! preservation.

mod common;

use common::{run_i32, vm_for};

/// Enough allocations to cross the collection threshold several times.
const CHURN: u32 = 20_000;

#[test]
fn upvalues_survive_collection() {
    // A closure captures a boxed 99; the loop churns the heap past the
    // collection threshold before the closure is finally invoked.
    let text = format!(
        "\
sigs:
  sig main: () -> i32
  sig get: () -> i32
func main locals=2 stack=4 sig=0
  enter 2
  newarray 5 1
  dup
  const.i32 0
  const.i32 99
  array.set.i32
  newclosure 1 1
  stloc 0
  const.i32 0
  stloc 1
churn:
  ldloc 1
  const.i32 {CHURN}
  cmp.lt.i32
  jmp.false done
  newlist 5 0
  pop
  ldloc 1
  inc.i32
  stloc 1
  jmp churn
done:
  ldloc 0
  callcheck
  call.indirect 1 0
  ret
end
func get locals=0 stack=2 sig=1
  enter 0
  ldupv 0
  const.i32 0
  array.get.i32
  ret
end
entry main
"
    );
    assert_eq!(run_i32(&text), 99);
}

#[test]
fn churned_garbage_is_reclaimed() {
    let text = format!(
        "\
sigs:
  sig main: () -> i32
func main locals=1 stack=2 sig=0
  enter 1
  const.i32 0
  stloc 0
churn:
  ldloc 0
  const.i32 {CHURN}
  cmp.lt.i32
  jmp.false done
  newlist 5 4
  pop
  ldloc 0
  inc.i32
  stloc 0
  jmp churn
done:
  const.i32 0
  ret
end
entry main
"
    );
    let mut vm = vm_for(&text);
    vm.run().unwrap();
    // Nothing is rooted once the entry frame is gone.
    vm.collect();
    assert_eq!(vm.live_objects(), 0);
}

#[test]
fn interned_const_strings_stay_rooted() {
    let mut vm = vm_for(
        "\
sigs:
  sig main: () -> i32
consts:
  const text string \"keepme\"
func main locals=0 stack=1 sig=0
  enter 0
  const.string 0
  string.len
  ret
end
entry main
",
    );
    assert_eq!(vm.run().unwrap(), Some(6));
    vm.collect();
    // The const pool remains a root for the lifetime of the VM.
    assert_eq!(vm.live_objects(), 1);
}

#[test]
fn globals_root_their_referents() {
    let mut vm = vm_for(
        "\
sigs:
  sig main: () -> i32
consts:
  const __ginit_banner string \"hi\"
globals:
  global banner string init=__ginit_banner
func main locals=0 stack=1 sig=0
  enter 0
  ldglob 0
  string.len
  ret
end
entry main
",
    );
    assert_eq!(vm.run().unwrap(), Some(2));
    vm.collect();
    assert_eq!(vm.live_objects(), 1);
}
