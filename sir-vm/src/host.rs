//! Host interface for reserved-module calls and dynamic-call intrinsics.
//!
//! The interpreter is generic over [`Host`], the seam through which every
//! effectful operation leaves the VM. [`StdHost`] backs `core.os`,
//! `core.io`, `core.fs` and `core.log` with the standard library; the
//! dynamic-library family reports itself unavailable there, since the
//! native bridge lives outside this crate. Host failures surface as
//! negative return codes, never as traps.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Return-ABI class of a dynamic call, one per `DlCall*` intrinsic.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DlReturn {
    /// i8
    I8,
    /// i16
    I16,
    /// i32
    I32,
    /// i64
    I64,
    /// u8
    U8,
    /// u16
    U16,
    /// u32
    U32,
    /// u64
    U64,
    /// f32
    F32,
    /// f64
    F64,
    /// bool
    Bool,
    /// char
    Char,
    /// NUL-terminated string
    Str0,
    /// void (companions of void externs)
    Void,
}

/// Outcome of a dynamic call.
#[derive(Clone, Debug, PartialEq)]
pub enum DlOutcome {
    /// Scalar result as a raw stack slot.
    Word(u64),
    /// String result, to be interned by the interpreter.
    Str(String),
}

/// Everything the VM asks of its embedding.
pub trait Host {
    /// Program arguments, `argv[0]` included.
    fn args(&self) -> &[String];
    /// Environment lookup.
    fn env_var(&self, name: &str) -> Option<String>;
    /// Current working directory.
    fn cwd(&self) -> String;
    /// Monotonic clock in nanoseconds.
    fn time_mono_ns(&mut self) -> i64;
    /// Wall clock in nanoseconds since the epoch.
    fn time_wall_ns(&mut self) -> i64;
    /// Block the executing thread.
    fn sleep_ms(&mut self, ms: i32);
    /// Uniform random word.
    fn random_u64(&mut self) -> u64;
    /// Write bytes to standard output.
    fn write_stdout(&mut self, bytes: &[u8]);
    /// Write bytes to standard error.
    fn write_stderr(&mut self, bytes: &[u8]);
    /// Leveled log message (`core.log.log`).
    fn log(&mut self, message: &str, level: i32);

    /// Open a file. Flags: `0` read, `1` write (create + truncate),
    /// `2` read-write (create), `3` append (create). Negative on failure.
    fn fs_open(&mut self, path: &str, flags: i32) -> i32;
    /// Close a descriptor; negative on failure.
    fn fs_close(&mut self, fd: i32) -> i32;
    /// Read into `buf`; bytes read, or negative on failure.
    fn fs_read(&mut self, fd: i32, buf: &mut [u8]) -> i32;
    /// Write from `buf`; bytes written, or negative on failure.
    fn fs_write(&mut self, fd: i32, buf: &[u8]) -> i32;

    /// Open a dynamic library; `0` on failure.
    fn dl_open(&mut self, path: &str) -> i64;
    /// Resolve a symbol; `0` on failure.
    fn dl_sym(&mut self, handle: i64, name: &str) -> i64;
    /// Close a library handle; negative on failure.
    fn dl_close(&mut self, handle: i64) -> i32;
    /// Message of the most recent dynamic-library failure.
    fn dl_last_error(&mut self) -> String;
    /// Invoke a foreign function at `addr` with scalar arguments.
    fn dl_call(&mut self, ret: DlReturn, addr: i64, args: &[u64]) -> DlOutcome;
}

/// Standard-library host. Dynamic-library operations always fail and set
/// `last_error`; embeddings with a native bridge supply their own [`Host`].
#[derive(Debug)]
pub struct StdHost {
    args: Vec<String>,
    epoch: Instant,
    rng: StdRng,
    files: HashMap<i32, File>,
    next_fd: i32,
    dl_error: String,
}

impl StdHost {
    /// Host over the process environment and the given program arguments.
    pub fn new(args: Vec<String>) -> Self {
        Self {
            args,
            epoch: Instant::now(),
            rng: StdRng::from_entropy(),
            files: HashMap::new(),
            next_fd: 3,
            dl_error: String::new(),
        }
    }

    /// Host over the process's own argument list.
    pub fn from_env() -> Self {
        Self::new(std::env::args().collect())
    }
}

impl Host for StdHost {
    fn args(&self) -> &[String] {
        &self.args
    }

    fn env_var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn cwd(&self) -> String {
        std::env::current_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    }

    fn time_mono_ns(&mut self) -> i64 {
        self.epoch.elapsed().as_nanos() as i64
    }

    fn time_wall_ns(&mut self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0)
    }

    fn sleep_ms(&mut self, ms: i32) {
        if ms > 0 {
            std::thread::sleep(std::time::Duration::from_millis(ms as u64));
        }
    }

    fn random_u64(&mut self) -> u64 {
        self.rng.gen()
    }

    fn write_stdout(&mut self, bytes: &[u8]) {
        let mut stdout = std::io::stdout();
        let _ = stdout.write_all(bytes);
        let _ = stdout.flush();
    }

    fn write_stderr(&mut self, bytes: &[u8]) {
        let _ = std::io::stderr().write_all(bytes);
    }

    fn log(&mut self, message: &str, level: i32) {
        match level {
            0 => tracing::error!(target: "sir", "{message}"),
            1 => tracing::warn!(target: "sir", "{message}"),
            2 => tracing::info!(target: "sir", "{message}"),
            3 => tracing::debug!(target: "sir", "{message}"),
            _ => tracing::trace!(target: "sir", "{message}"),
        }
    }

    fn fs_open(&mut self, path: &str, flags: i32) -> i32 {
        let mut options = OpenOptions::new();
        match flags {
            0 => options.read(true),
            1 => options.write(true).create(true).truncate(true),
            2 => options.read(true).write(true).create(true),
            3 => options.append(true).create(true),
            _ => return -1,
        };
        match options.open(path) {
            Ok(file) => {
                let fd = self.next_fd;
                self.next_fd += 1;
                self.files.insert(fd, file);
                fd
            }
            Err(_) => -1,
        }
    }

    fn fs_close(&mut self, fd: i32) -> i32 {
        match self.files.remove(&fd) {
            Some(_) => 0,
            None => -1,
        }
    }

    fn fs_read(&mut self, fd: i32, buf: &mut [u8]) -> i32 {
        match self.files.get_mut(&fd) {
            Some(file) => match file.read(buf) {
                Ok(n) => n as i32,
                Err(_) => -1,
            },
            None => -1,
        }
    }

    fn fs_write(&mut self, fd: i32, buf: &[u8]) -> i32 {
        match self.files.get_mut(&fd) {
            Some(file) => match file.write(buf) {
                Ok(n) => n as i32,
                Err(_) => -1,
            },
            None => -1,
        }
    }

    fn dl_open(&mut self, _path: &str) -> i64 {
        self.dl_error = "dynamic library support not available in this host".into();
        0
    }

    fn dl_sym(&mut self, _handle: i64, _name: &str) -> i64 {
        self.dl_error = "dynamic library support not available in this host".into();
        0
    }

    fn dl_close(&mut self, _handle: i64) -> i32 {
        -1
    }

    fn dl_last_error(&mut self) -> String {
        self.dl_error.clone()
    }

    fn dl_call(&mut self, _ret: DlReturn, _addr: i64, _args: &[u64]) -> DlOutcome {
        self.dl_error = "dynamic library support not available in this host".into();
        DlOutcome::Word(0)
    }
}

/// Deterministic capture host for tests: canned argv and environment,
/// captured output streams, scripted dynamic-call answers.
#[cfg(any(test, feature = "test-helpers"))]
#[derive(Debug, Default)]
pub struct RecordingHost {
    /// Canned program arguments.
    pub args: Vec<String>,
    /// Canned environment.
    pub env: HashMap<String, String>,
    /// Everything written to standard output.
    pub stdout: Vec<u8>,
    /// Everything written to standard error.
    pub stderr: Vec<u8>,
    /// `(message, level)` pairs from `core.log.log`.
    pub logs: Vec<(String, i32)>,
    /// Recorded dynamic calls: `(ret, addr, args)`.
    pub dl_calls: Vec<(DlReturn, i64, Vec<u64>)>,
    /// Answer returned for every dynamic call.
    pub dl_answer: u64,
    /// Answer returned by `dl_open`/`dl_sym`.
    pub dl_handle: i64,
    /// Monotonic clock, advanced manually.
    pub now_ns: i64,
    /// In-memory files keyed by descriptor: `(content, cursor)`.
    pub files: HashMap<i32, (Vec<u8>, usize)>,
    next_fd: i32,
    rng_state: u64,
}

#[cfg(any(test, feature = "test-helpers"))]
impl RecordingHost {
    /// Host with the given canned argv.
    pub fn with_args(args: &[&str]) -> Self {
        Self {
            args: args.iter().map(|a| a.to_string()).collect(),
            rng_state: 0x5DEE_CE66,
            next_fd: 3,
            ..Self::default()
        }
    }

    /// Captured stdout as UTF-8.
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl Host for RecordingHost {
    fn args(&self) -> &[String] {
        &self.args
    }

    fn env_var(&self, name: &str) -> Option<String> {
        self.env.get(name).cloned()
    }

    fn cwd(&self) -> String {
        "/".into()
    }

    fn time_mono_ns(&mut self) -> i64 {
        self.now_ns += 1;
        self.now_ns
    }

    fn time_wall_ns(&mut self) -> i64 {
        self.now_ns
    }

    fn sleep_ms(&mut self, ms: i32) {
        self.now_ns += i64::from(ms.max(0)) * 1_000_000;
    }

    fn random_u64(&mut self) -> u64 {
        // xorshift; deterministic across runs.
        self.rng_state ^= self.rng_state << 13;
        self.rng_state ^= self.rng_state >> 7;
        self.rng_state ^= self.rng_state << 17;
        self.rng_state
    }

    fn write_stdout(&mut self, bytes: &[u8]) {
        self.stdout.extend_from_slice(bytes);
    }

    fn write_stderr(&mut self, bytes: &[u8]) {
        self.stderr.extend_from_slice(bytes);
    }

    fn log(&mut self, message: &str, level: i32) {
        self.logs.push((message.into(), level));
    }

    fn fs_open(&mut self, _path: &str, _flags: i32) -> i32 {
        let fd = self.next_fd;
        self.next_fd += 1;
        self.files.insert(fd, (Vec::new(), 0));
        fd
    }

    fn fs_close(&mut self, fd: i32) -> i32 {
        match self.files.remove(&fd) {
            Some(_) => 0,
            None => -1,
        }
    }

    fn fs_read(&mut self, fd: i32, buf: &mut [u8]) -> i32 {
        let Some((content, cursor)) = self.files.get_mut(&fd) else {
            return -1;
        };
        let remaining = &content[*cursor..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        *cursor += n;
        n as i32
    }

    fn fs_write(&mut self, fd: i32, buf: &[u8]) -> i32 {
        let Some((content, _)) = self.files.get_mut(&fd) else {
            return -1;
        };
        content.extend_from_slice(buf);
        buf.len() as i32
    }

    fn dl_open(&mut self, _path: &str) -> i64 {
        self.dl_handle
    }

    fn dl_sym(&mut self, _handle: i64, _name: &str) -> i64 {
        self.dl_handle
    }

    fn dl_close(&mut self, _handle: i64) -> i32 {
        0
    }

    fn dl_last_error(&mut self) -> String {
        String::new()
    }

    fn dl_call(&mut self, ret: DlReturn, addr: i64, args: &[u64]) -> DlOutcome {
        self.dl_calls.push((ret, addr, args.to_vec()));
        DlOutcome::Word(self.dl_answer)
    }
}
