//! Runtime interpreter error implementation.

use sir_asm::TrapReason;

/// Malformed IR text. Carries the offending line when known.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct IrParseError {
    /// One-based source line of the failure, zero when not line-specific.
    pub line: usize,
    /// Human-readable description.
    pub message: String,
}

impl IrParseError {
    pub(crate) fn new(line: usize, message: impl Into<String>) -> Self {
        Self { line, message: message.into() }
    }

    pub(crate) fn whole_module(message: impl Into<String>) -> Self {
        Self { line: 0, message: message.into() }
    }
}

impl From<sir_asm::EncodeError> for IrParseError {
    fn from(err: sir_asm::EncodeError) -> Self {
        Self::whole_module(err.to_string())
    }
}

/// Interpreter runtime error variants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[must_use]
pub enum InterpreterError {
    /// The execution resulted in a well-formed trap, attributed to the
    /// faulting function and byte offset.
    #[error("execution trap: {reason} in function {function} at offset {offset}")]
    Trap {
        /// The trap reason.
        reason: TrapReason,
        /// Index of the faulting function.
        function: u32,
        /// Byte offset of the faulting opcode within the function body.
        offset: usize,
    },
    /// The module referenced an index outside its own tables; detected at
    /// initialization rather than mid-execution.
    #[error("inconsistent module: {0}")]
    BadModule(String),
    /// The call stack exceeded the interpreter's depth limit.
    #[error("call depth limit of {0} exceeded")]
    CallDepthExceeded(usize),
}

impl InterpreterError {
    /// The trap reason that caused this error, if applicable.
    pub const fn trap_reason(&self) -> Option<TrapReason> {
        match self {
            Self::Trap { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// Process exit code for a failed execution; never zero.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Trap { reason, .. } => *reason as u8 as i32 + 64,
            Self::BadModule(_) => 2,
            Self::CallDepthExceeded(_) => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_nonzero() {
        let trap = InterpreterError::Trap {
            reason: TrapReason::DivisionByZero,
            function: 0,
            offset: 0,
        };
        assert_ne!(trap.exit_code(), 0);
        assert_ne!(InterpreterError::BadModule(String::new()).exit_code(), 0);
    }
}
