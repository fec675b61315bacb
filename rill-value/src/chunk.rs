//! Definitions for [`Chunk`] and [`OpCode`].

use crate::{Value, ValueArray};
use enum_primitive_derive::Primitive;
use std::collections::HashMap;

/// Represents an opcode. Internally represented using 1 byte (`u8`).
/// Multi-byte operands are stored big endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Primitive)]
#[repr(u8)]
pub enum OpCode {
    /// Load a constant onto the stack.
    /// *2 bytes (1 operand)*
    Ldc = 0,
    /// Loads `true` onto the stack.
    /// *1 byte*
    LdTrue = 1,
    /// Loads `false` onto the stack.
    /// *1 byte*
    LdFalse = 2,
    /// Load a local variable (frame slot) onto the stack.
    /// *2 bytes (1 operand)*
    LdLoc = 3,
    /// Stores the top value on the stack into a local variable. The value is not popped.
    /// *2 bytes (1 operand)*
    StLoc = 4,
    /// Load a global variable onto the stack.
    /// *2 bytes (1 operand)*
    LdGlobal = 5,
    /// Stores the top value on the stack into a global variable. The value is not popped.
    /// *2 bytes (1 operand)*
    StGlobal = 6,
    /// Negate the last value on the stack.
    /// *1 byte*
    Neg = 7,
    /// Logical not on a boolean value.
    /// *1 byte*
    Not = 8,
    Add = 9,
    Sub = 10,
    Mul = 11,
    Div = 12,
    Rem = 13,
    Eq = 14,
    Greater = 15,
    Less = 16,
    /// Pops and disposes the last value on the stack.
    /// *1 byte*
    Pop = 17,
    /// Duplicates the last value on the stack.
    /// *1 byte*
    Dup = 18,
    /// Converts the `Int` on the top of the stack into a `Float`.
    /// *1 byte*
    I2F = 19,
    /// Calls a function of the module. Operands are the function index (2 bytes) and the arity.
    /// The arguments are already on the stack and become the callee's first locals.
    /// *4 bytes (2 operands)*
    Call = 20,
    /// Calls a native function. Operands are the native index and the arity.
    /// *3 bytes (2 operands)*
    CallNative = 21,
    /// Returns the last value on the stack to the caller.
    /// *1 byte*
    Ret = 22,
    /// Returns from a `Void` function.
    /// *1 byte*
    RetVoid = 23,
    /// Unconditional jump to an absolute offset.
    /// *5 bytes (1 operand)*
    Jmp = 24,
    /// Pops the last value on the stack and jumps to an absolute offset if it is `false`.
    /// *5 bytes (1 operand)*
    JmpIfFalse = 25,
    /// Load a constant whose index does not fit in a byte.
    /// *5 bytes (1 operand)*
    LdcWide = 26,
}

/// Represents a chunk of bytecode.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// A [`Vec`] of [`OpCode`]s and operands.
    pub code: Vec<u8>, // a byte array
    /// Source code lines for each byte in `code`.
    pub lines: Vec<usize>,
    /// Constant table for this [`Chunk`].
    pub constants: ValueArray,
    /// The name of the chunk.
    /// For most cases, should be the name of the function.
    /// If the [`Chunk`] is the top-level chunk, the name should be `<script>`.
    pub name: String,
    /// Comments attached to instruction offsets. Printed by the disassembler.
    pub debug_annotations: HashMap<usize, String>,
    /// Jump labels as `(offset, name)` in placement order.
    pub labels: Vec<(usize, String)>,
}

/// `u8` and `OpCode` should implement this trait.
pub trait ToByteCode {
    /// Transforms `self` into an `u8`.
    fn to_byte_code(&self) -> u8;
}

impl ToByteCode for OpCode {
    fn to_byte_code(&self) -> u8 {
        *self as u8
    }
}

impl ToByteCode for u8 {
    fn to_byte_code(&self) -> u8 {
        *self
    }
}

impl Chunk {
    /// Create an empty chunk with the specified `name`.
    ///
    /// # Example
    /// ```
    /// use rill_value::chunk::Chunk;
    /// let chunk = Chunk::new("my_chunk".to_string());
    /// assert_eq!(chunk.name, "my_chunk");
    /// ```
    pub fn new(name: String) -> Self {
        Self {
            code: Vec::new(),
            lines: Vec::new(),
            constants: ValueArray::new(),
            name,
            debug_annotations: HashMap::new(),
            labels: Vec::new(),
        }
    }

    /// Write data to the [`Chunk`]. This can be an [`OpCode`] or an operand (`u8`).
    ///
    /// # Params
    /// * `opcode` - The data to write to the chunk.
    /// * `line` - The original source line. This is used for runtime error messages and debugging.
    ///
    /// # Example
    /// ```
    /// use rill_value::chunk::{Chunk, OpCode};
    /// let mut chunk = Chunk::new("my_chunk".to_string());
    /// chunk.write_chunk(OpCode::Ldc, 1);
    /// chunk.write_chunk(1, 1);
    /// assert_eq!(chunk.code, vec![0, 1]);
    /// assert_eq!(chunk.lines, vec![1, 1]);
    /// ```
    pub fn write_chunk(&mut self, opcode: impl ToByteCode, line: usize) {
        debug_assert_eq!(self.code.len(), self.lines.len());
        self.code.push(opcode.to_byte_code());
        self.lines.push(line);
    }

    /// Writes a 2 byte operand.
    pub fn write_u16(&mut self, value: u16, line: usize) {
        let [high, low] = value.to_be_bytes();
        self.write_chunk(high, line);
        self.write_chunk(low, line);
    }

    /// Writes a 4 byte operand.
    pub fn write_u32(&mut self, value: u32, line: usize) {
        for byte in value.to_be_bytes() {
            self.write_chunk(byte, line);
        }
    }

    /// Overwrites the 4 byte operand at `offset`. Used to patch jump targets.
    pub fn patch_u32(&mut self, offset: usize, value: u32) {
        self.code[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
    }

    pub fn read_u16(&self, offset: usize) -> u16 {
        u16::from_be_bytes([self.code[offset], self.code[offset + 1]])
    }

    pub fn read_u32(&self, offset: usize) -> u32 {
        u32::from_be_bytes([
            self.code[offset],
            self.code[offset + 1],
            self.code[offset + 2],
            self.code[offset + 3],
        ])
    }

    /// Add a constant to the constant table. Equal constants are stored once.
    /// Returns the index of the constant.
    ///
    /// # Example
    /// ```
    /// use rill_value::chunk::Chunk;
    /// use rill_value::Value;
    /// let mut chunk = Chunk::new("my_chunk".to_string());
    /// assert_eq!(chunk.add_constant(Value::Bool(true)), 0);
    /// assert_eq!(chunk.add_constant(Value::Int(2)), 1);
    /// assert_eq!(chunk.add_constant(Value::Bool(true)), 0);
    /// assert_eq!(chunk.constants, vec![Value::Bool(true), Value::Int(2)]);
    /// ```
    pub fn add_constant(&mut self, value: Value) -> usize {
        // Int(1) and Float(1.0) never compare equal, so deduplication keeps types apart
        if let Some(index) = self.constants.iter().position(|c| *c == value) {
            return index;
        }
        self.constants.push(value);
        self.constants.len() - 1
    }

    /// Places a label at the current end of the chunk.
    pub fn place_label(&mut self, name: impl ToString) {
        self.labels.push((self.code.len(), name.to_string()));
    }

    /// Attaches a comment to the next instruction to be written.
    /// Several comments on the same instruction are joined with `, `.
    pub fn annotate_next(&mut self, annotation: impl ToString) {
        let annotation = annotation.to_string();
        self.debug_annotations
            .entry(self.code.len())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&annotation);
            })
            .or_insert(annotation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jump_operands() {
        let mut chunk = Chunk::new("test".to_string());
        chunk.write_chunk(OpCode::Jmp, 1);
        chunk.write_u32(0, 1);
        chunk.patch_u32(1, 0x0001_2345);
        assert_eq!(chunk.code, vec![OpCode::Jmp as u8, 0x00, 0x01, 0x23, 0x45]);
        assert_eq!(chunk.read_u32(1), 0x0001_2345);
        assert_eq!(chunk.lines, vec![1; 5]);
    }

    #[test]
    fn test_constant_table_grows_past_a_byte() {
        let mut chunk = Chunk::new("test".to_string());
        for i in 0..300 {
            assert_eq!(chunk.add_constant(Value::Int(i)), i as usize);
        }
        // existing constants are still found
        assert_eq!(chunk.add_constant(Value::Int(3)), 3);
        assert_eq!(chunk.add_constant(Value::Int(299)), 299);
        assert_eq!(chunk.constants.len(), 300);
    }

    #[test]
    fn test_int_and_float_constants_are_distinct() {
        let mut chunk = Chunk::new("test".to_string());
        assert_eq!(chunk.add_constant(Value::Int(1)), 0);
        assert_eq!(chunk.add_constant(Value::Float(1.0)), 1);
    }
}
