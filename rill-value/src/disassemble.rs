//! [`Chunk`] disassembling support.

use crate::chunk::{Chunk, OpCode};
use crate::native::Native;
use console::style;
use num_traits::FromPrimitive;
use std::fmt;

impl Chunk {
    /// Disassemble simple (1 byte) instruction.
    fn simple_instr(
        &self,
        f: &mut fmt::Formatter<'_>,
        name: &str,
        offset: usize,
        msg: &str,
    ) -> Result<usize, fmt::Error> {
        writeln!(f, "{}{}", name, msg)?;
        Ok(offset + 1)
    }

    /// Disassemble `ldc` (2 bytes) and `ldc_wide` (5 bytes) instruction.
    fn constant_instr(
        &self,
        f: &mut fmt::Formatter<'_>,
        name: &str,
        offset: usize,
        msg: &str,
    ) -> Result<usize, fmt::Error> {
        let (constant_index, next) = if name == "ldc_wide" {
            (self.read_u32(offset + 1) as usize, offset + 5)
        } else {
            (self.code[offset + 1] as usize, offset + 2)
        };
        match self.constants.get(constant_index) {
            Some(constant) => writeln!(
                f,
                "{:<12} {:<3} (value = {:?}){}",
                name, constant_index, constant, msg
            )?,
            None => writeln!(f, "{:<12} {:<3} (invalid){}", name, constant_index, msg)?,
        }
        Ok(next)
    }

    /// Disassemble `ldloc`, `stloc`, `ldglobal` and `stglobal` (2 bytes) instruction.
    fn ld_or_st_instr(
        &self,
        f: &mut fmt::Formatter<'_>,
        name: &str,
        offset: usize,
        msg: &str,
    ) -> Result<usize, fmt::Error> {
        let var_offset = self.code[offset + 1];
        writeln!(f, "{:<12} {}{}", name, var_offset, msg)?;
        Ok(offset + 2)
    }

    /// Disassemble `call` (4 bytes) instruction.
    fn call_instr(
        &self,
        f: &mut fmt::Formatter<'_>,
        name: &str,
        offset: usize,
        msg: &str,
    ) -> Result<usize, fmt::Error> {
        let index = self.read_u16(offset + 1);
        let arity = self.code[offset + 3];
        writeln!(f, "{:<12} {} {}{}", name, index, arity, msg)?;
        Ok(offset + 4)
    }

    /// Disassemble `call_native` (3 bytes) instruction.
    fn call_native_instr(
        &self,
        f: &mut fmt::Formatter<'_>,
        name: &str,
        offset: usize,
        msg: &str,
    ) -> Result<usize, fmt::Error> {
        let index = self.code[offset + 1];
        let arity = self.code[offset + 2];
        let native = Native::from_index(index).map_or("?", Native::name);
        writeln!(f, "{:<12} {} {} ({}){}", name, index, arity, native, msg)?;
        Ok(offset + 3)
    }

    /// Disassembles `jmp` and `jmp_if_false` (5 bytes) instruction.
    fn jmp_instr(
        &self,
        f: &mut fmt::Formatter<'_>,
        name: &str,
        offset: usize,
        msg: &str,
    ) -> Result<usize, fmt::Error> {
        let target = self.read_u32(offset + 1);
        match self.label_at(target as usize) {
            Some(label) => writeln!(f, "{:<12} {} ({}){}", name, target, label, msg)?,
            None => writeln!(f, "{:<12} {}{}", name, target, msg)?,
        }
        Ok(offset + 5)
    }

    /// Returns the first label placed at `offset`.
    fn label_at(&self, offset: usize) -> Option<&str> {
        self.labels
            .iter()
            .find(|(label_offset, _)| *label_offset == offset)
            .map(|(_, name)| name.as_str())
    }

    fn write_labels(&self, f: &mut fmt::Formatter<'_>, offset: usize) -> fmt::Result {
        for (_, name) in self.labels.iter().filter(|(at, _)| *at == offset) {
            writeln!(f, "{}:", name)?;
        }
        Ok(())
    }

    /// Disassembles the instruction at the given `offset`.
    fn disassemble_instr(
        &self,
        f: &mut fmt::Formatter<'_>,
        offset: usize,
    ) -> Result<usize, fmt::Error> {
        write!(f, "{:04} ", style(offset).black().bright())?;

        let instr = self.code[offset];

        // Print source line number.
        if offset > 0 && self.lines[offset] == self.lines[offset - 1] {
            write!(f, "{:>4} ", "|")?;
        } else {
            write!(f, "{:>4} ", self.lines[offset])?;
        }

        let msg = match self.debug_annotations.get(&offset) {
            Some(annotation) => format!(
                " {}",
                style(format!("// {}", annotation)).color256(29) // dark green
            ),
            None => String::new(),
        };
        let msg = msg.as_str();

        match OpCode::from_u8(instr) {
            Some(OpCode::Ldc) => self.constant_instr(f, "ldc", offset, msg),
            Some(OpCode::LdTrue) => self.simple_instr(f, "ld_true", offset, msg),
            Some(OpCode::LdFalse) => self.simple_instr(f, "ld_false", offset, msg),
            Some(OpCode::LdLoc) => self.ld_or_st_instr(f, "ldloc", offset, msg),
            Some(OpCode::StLoc) => self.ld_or_st_instr(f, "stloc", offset, msg),
            Some(OpCode::LdGlobal) => self.ld_or_st_instr(f, "ldglobal", offset, msg),
            Some(OpCode::StGlobal) => self.ld_or_st_instr(f, "stglobal", offset, msg),
            Some(OpCode::Neg) => self.simple_instr(f, "neg", offset, msg),
            Some(OpCode::Not) => self.simple_instr(f, "not", offset, msg),
            Some(OpCode::Add) => self.simple_instr(f, "add", offset, msg),
            Some(OpCode::Sub) => self.simple_instr(f, "sub", offset, msg),
            Some(OpCode::Mul) => self.simple_instr(f, "mul", offset, msg),
            Some(OpCode::Div) => self.simple_instr(f, "div", offset, msg),
            Some(OpCode::Rem) => self.simple_instr(f, "rem", offset, msg),
            Some(OpCode::Eq) => self.simple_instr(f, "eq", offset, msg),
            Some(OpCode::Greater) => self.simple_instr(f, "greater", offset, msg),
            Some(OpCode::Less) => self.simple_instr(f, "less", offset, msg),
            Some(OpCode::Pop) => self.simple_instr(f, "pop", offset, msg),
            Some(OpCode::Dup) => self.simple_instr(f, "dup", offset, msg),
            Some(OpCode::I2F) => self.simple_instr(f, "i2f", offset, msg),
            Some(OpCode::Call) => self.call_instr(f, "call", offset, msg),
            Some(OpCode::CallNative) => self.call_native_instr(f, "call_native", offset, msg),
            Some(OpCode::Ret) => self.simple_instr(f, "ret", offset, msg),
            Some(OpCode::RetVoid) => self.simple_instr(f, "ret_void", offset, msg),
            Some(OpCode::Jmp) => self.jmp_instr(f, "jmp", offset, msg),
            Some(OpCode::JmpIfFalse) => self.jmp_instr(f, "jmp_if_false", offset, msg),
            Some(OpCode::LdcWide) => self.constant_instr(f, "ldc_wide", offset, msg),
            None => self.simple_instr(f, "invalid", offset, msg), // skip bad instruction
        } // returns the next ip
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "== {} ==", self.name)?;

        let mut offset = 0;
        while offset < self.code.len() {
            self.write_labels(f, offset)?;
            offset = self.disassemble_instr(f, offset)?;
        }
        // labels placed after the last instruction
        self.write_labels(f, self.code.len())?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;
    use insta::assert_snapshot;

    #[test]
    fn test_disassemble() {
        console::set_colors_enabled(false);
        let mut chunk = Chunk::new("main".to_string());
        let constant = chunk.add_constant(Value::Int(1)) as u8;
        chunk.place_label("L0");
        chunk.annotate_next("let x");
        chunk.write_chunk(OpCode::Ldc, 1);
        chunk.write_chunk(constant, 1);
        chunk.write_chunk(OpCode::LdTrue, 2);
        chunk.write_chunk(OpCode::JmpIfFalse, 2);
        chunk.write_u32(0, 2);
        chunk.write_chunk(OpCode::CallNative, 3);
        chunk.write_chunk(Native::Str.index(), 3);
        chunk.write_chunk(1, 3);
        for i in 2..=300 {
            chunk.add_constant(Value::Int(i));
        }
        chunk.write_chunk(OpCode::LdcWide, 4);
        chunk.write_u32(299, 4);
        chunk.write_chunk(OpCode::RetVoid, 4);
        chunk.place_label("L1");

        assert_snapshot!(chunk.to_string(), @r"
        == main ==
        L0:
        0000    1 ldc          0   (value = 1) // let x
        0002    2 ld_true
        0003    | jmp_if_false 0 (L0)
        0008    3 call_native  2 1 (str)
        0011    4 ldc_wide     299 (value = 300)
        0016    | ret_void
        L1:
        ");
    }
}
