#![allow(dead_code)]

use sir_vm::{loader, Interpreter, InterpreterError, RecordingHost};

pub fn vm_for(text: &str) -> Interpreter<RecordingHost> {
    vm_with_host(text, RecordingHost::with_args(&["prog"]))
}

pub fn vm_with_host(text: &str, host: RecordingHost) -> Interpreter<RecordingHost> {
    let module = loader::parse_module(text).expect("test ir parses");
    Interpreter::new(module, host).expect("test module initializes")
}

pub fn run(text: &str) -> Option<u64> {
    vm_for(text).run().expect("test program completes")
}

pub fn run_i32(text: &str) -> i32 {
    run(text).expect("test program returns a value") as u32 as i32
}

pub fn run_err(text: &str) -> InterpreterError {
    vm_for(text).run().expect_err("test program should trap")
}
