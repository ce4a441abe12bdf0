//! Bytecode encoder with forward-reference label resolution.
//!
//! Emission is append-only; jumps reference [`Label`]s that may be bound
//! after the jump is emitted. A fixup list of (offset slot, label) pairs is
//! resolved at [`CodeBuilder::finish`], and any label still unbound there
//! is a fatal [`EncodeError`].

use crate::{Layout, Opcode};

/// An abstract jump target within one function body.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Label(u32);

impl Label {
    /// The label's numeric id, for diagnostics.
    pub const fn id(self) -> u32 {
        self.0
    }
}

/// Encoding failure.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum EncodeError {
    /// A jump referenced a label that was never bound.
    #[error("unbound label {0}")]
    UnboundLabel(u32),
    /// A label was bound at two positions.
    #[error("label {0} bound twice")]
    ReboundLabel(u32),
    /// A resolved jump distance does not fit the 32-bit offset slot.
    #[error("jump offset out of range for label {0}")]
    OffsetOutOfRange(u32),
}

/// Append-only bytecode builder for one function body.
#[derive(Debug, Default)]
pub struct CodeBuilder {
    code: Vec<u8>,
    labels: Vec<Option<usize>>,
    fixups: Vec<(usize, Label)>,
}

impl CodeBuilder {
    /// Fresh builder with no code.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current length of the encoded stream in bytes.
    pub fn position(&self) -> usize {
        self.code.len()
    }

    /// Create a new, unbound label.
    pub fn new_label(&mut self) -> Label {
        let label = Label(self.labels.len() as u32);
        self.labels.push(None);
        label
    }

    /// Bind `label` to the current position.
    pub fn bind_label(&mut self, label: Label) -> Result<(), EncodeError> {
        let slot = &mut self.labels[label.0 as usize];
        if slot.is_some() {
            return Err(EncodeError::ReboundLabel(label.0));
        }
        *slot = Some(self.code.len());
        Ok(())
    }

    /// Emit an opcode with no immediate.
    pub fn simple(&mut self, op: Opcode) {
        debug_assert_eq!(op.layout(), Layout::None, "{op} carries an immediate");
        self.code.push(op as u8);
    }

    /// Emit an opcode with a signed immediate of its declared width.
    pub fn with_signed(&mut self, op: Opcode, imm: i64) {
        self.code.push(op as u8);
        match op.layout() {
            Layout::I8 => self.code.push(imm as i8 as u8),
            Layout::I16 => self.code.extend((imm as i16).to_le_bytes()),
            Layout::I32 => self.code.extend((imm as i32).to_le_bytes()),
            Layout::I64 => self.code.extend(imm.to_le_bytes()),
            layout => unreachable!("{op} has layout {layout:?}, not signed"),
        }
    }

    /// Emit an opcode with an unsigned immediate of its declared width.
    pub fn with_unsigned(&mut self, op: Opcode, imm: u64) {
        self.code.push(op as u8);
        match op.layout() {
            Layout::U8 => self.code.push(imm as u8),
            Layout::U16 => self.code.extend((imm as u16).to_le_bytes()),
            Layout::U32 => self.code.extend((imm as u32).to_le_bytes()),
            Layout::U64 => self.code.extend(imm.to_le_bytes()),
            layout => unreachable!("{op} has layout {layout:?}, not unsigned"),
        }
    }

    /// Emit an opcode with a float immediate of its declared width.
    pub fn with_float(&mut self, op: Opcode, imm: f64) {
        self.code.push(op as u8);
        match op.layout() {
            Layout::F32 => self.code.extend((imm as f32).to_bits().to_le_bytes()),
            Layout::F64 => self.code.extend(imm.to_bits().to_le_bytes()),
            layout => unreachable!("{op} has layout {layout:?}, not float"),
        }
    }

    /// Emit a `call`-shaped opcode: u32 id plus u8 count.
    pub fn with_id_count(&mut self, op: Opcode, id: u32, count: u8) {
        debug_assert_eq!(op.layout(), Layout::U32U8);
        self.code.push(op as u8);
        self.code.extend(id.to_le_bytes());
        self.code.push(count);
    }

    /// Emit a `newarray`-shaped opcode: two u32 words.
    pub fn with_id_pair(&mut self, op: Opcode, first: u32, second: u32) {
        debug_assert_eq!(op.layout(), Layout::U32U32);
        self.code.push(op as u8);
        self.code.extend(first.to_le_bytes());
        self.code.extend(second.to_le_bytes());
    }

    /// Emit a jump-shaped opcode targeting `label`.
    pub fn with_jump(&mut self, op: Opcode, label: Label) {
        debug_assert_eq!(op.layout(), Layout::Jump);
        self.code.push(op as u8);
        self.push_offset_slot(label);
    }

    /// Emit a `jmptable` over `cases` with the given `default` target.
    pub fn jmp_table(&mut self, cases: &[Label], default: Label) {
        self.code.push(Opcode::JmpTable as u8);
        self.code.extend((cases.len() as u16).to_le_bytes());
        self.push_offset_slot(default);
        for case in cases {
            self.push_offset_slot(*case);
        }
    }

    /// Open a function body: `enter` with the frame's locals count.
    pub fn enter(&mut self, locals: u16) {
        self.with_unsigned(Opcode::Enter, locals.into());
    }

    /// Close the current path: `ret`.
    pub fn ret(&mut self) {
        self.simple(Opcode::Ret);
    }

    /// Resolve every fixup and return the encoded stream.
    pub fn finish(self) -> Result<Vec<u8>, EncodeError> {
        let CodeBuilder { mut code, labels, fixups } = self;
        for (slot, label) in fixups {
            let target = labels[label.0 as usize]
                .ok_or(EncodeError::UnboundLabel(label.0))?;
            let base = slot + 4;
            let distance = target as i64 - base as i64;
            let offset = i32::try_from(distance)
                .map_err(|_| EncodeError::OffsetOutOfRange(label.0))?;
            code[slot..base].copy_from_slice(&offset.to_le_bytes());
        }
        Ok(code)
    }

    fn push_offset_slot(&mut self, label: Label) {
        self.fixups.push((self.code.len(), label));
        self.code.extend(0i32.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_reference_resolves() {
        let mut b = CodeBuilder::new();
        let target = b.new_label();
        b.enter(0);
        b.with_jump(Opcode::Jmp, target);
        b.simple(Opcode::Nop);
        b.bind_label(target).unwrap();
        b.ret();
        let code = b.finish().unwrap();
        // enter(3 bytes), jmp opcode, then the offset slot.
        let offset = i32::from_le_bytes(code[4..8].try_into().unwrap());
        // Slot ends at 8; nop at 8; target bound at 9.
        assert_eq!(offset, 1);
    }

    #[test]
    fn backward_reference_is_negative() {
        let mut b = CodeBuilder::new();
        let top = b.new_label();
        b.bind_label(top).unwrap();
        b.simple(Opcode::Nop);
        b.with_jump(Opcode::Jmp, top);
        let code = b.finish().unwrap();
        let offset = i32::from_le_bytes(code[2..6].try_into().unwrap());
        assert_eq!(offset, -6);
    }

    #[test]
    fn unbound_label_is_fatal() {
        let mut b = CodeBuilder::new();
        let dangling = b.new_label();
        b.with_jump(Opcode::Jmp, dangling);
        assert_eq!(b.finish(), Err(EncodeError::UnboundLabel(0)));
    }

    #[test]
    fn rebinding_is_fatal() {
        let mut b = CodeBuilder::new();
        let label = b.new_label();
        b.bind_label(label).unwrap();
        b.simple(Opcode::Nop);
        assert_eq!(b.bind_label(label), Err(EncodeError::ReboundLabel(0)));
    }

    #[test]
    fn immediates_encode_little_endian() {
        let mut b = CodeBuilder::new();
        b.with_signed(Opcode::ConstI32, 0x0102_0304);
        let code = b.finish().unwrap();
        assert_eq!(code, [Opcode::ConstI32 as u8, 0x04, 0x03, 0x02, 0x01]);
    }
}
