//! The stack machine executing a [`Module`].

use derive_more::{Display, Error};
use num_traits::FromPrimitive;
use rill_value::chunk::OpCode;
use rill_value::module::{Function, Module};
use rill_value::native::{Native, NativeError};
use rill_value::{Value, ValueArray};
use std::io::Write;
use std::mem;

/// Maximum number of nested calls, the script frame included.
pub const MAX_FRAMES: usize = 256;

#[derive(Debug, Display, Error)]
pub enum RuntimeError {
    #[display("[line {line}] division by zero")]
    DivisionByZero { line: usize },
    #[display("[line {line}] stack overflow")]
    StackOverflow { line: usize },
    #[display("[line {line}] global {index} read before initialization")]
    UninitializedGlobal { index: u8, line: usize },
    #[display("[line {line}] {message}")]
    TypeError { message: String, line: usize },
    #[display("invalid bytecode: {message}")]
    InvalidBytecode { message: String },
    #[display("[line {line}] {source}")]
    Native { source: NativeError, line: usize },
}

struct CallFrame<'a> {
    /// Instruction pointer.
    ip: usize,
    function: &'a Function,
    /// Stack index of local slot `0`.
    base: usize,
}

pub struct Vm<'a> {
    module: &'a Module,
    /// VM stack.
    stack: ValueArray,
    globals: Vec<Option<Value>>,
    /// The running frame. Callers are kept in `call_stack`.
    frame: CallFrame<'a>,
    call_stack: Vec<CallFrame<'a>>,
    out: &'a mut dyn Write,
}

impl<'a> Vm<'a> {
    /// Creates a VM ready to run the script of `module`. `print` writes to `out`.
    pub fn new(module: &'a Module, out: &'a mut dyn Write) -> Self {
        Self {
            module,
            stack: Vec::with_capacity(256),
            globals: vec![None; module.globals as usize],
            frame: CallFrame {
                ip: 0,
                function: &module.script,
                base: 0,
            },
            call_stack: Vec::new(),
            out,
        }
    }

    /// Executes the script of `module`.
    pub fn interpret(module: &Module, out: &mut dyn Write) -> Result<(), RuntimeError> {
        Vm::new(module, out).run()
    }

    /// Global slots. `None` for a global that was never stored.
    pub fn globals(&self) -> &[Option<Value>] {
        &self.globals
    }

    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    fn invalid(message: impl ToString) -> RuntimeError {
        RuntimeError::InvalidBytecode {
            message: message.to_string(),
        }
    }

    /// Source line of the instruction being executed.
    fn line(&self) -> usize {
        let lines = &self.frame.function.chunk.lines;
        lines
            .get(self.frame.ip.saturating_sub(1))
            .copied()
            .unwrap_or_default()
    }

    fn type_error(&self, message: impl ToString) -> RuntimeError {
        RuntimeError::TypeError {
            message: message.to_string(),
            line: self.line(),
        }
    }

    fn read_byte(&mut self) -> Result<u8, RuntimeError> {
        let code = &self.frame.function.chunk.code;
        let byte = code.get(self.frame.ip).copied().ok_or_else(|| {
            Self::invalid(format!(
                "'{}' ends without returning",
                self.frame.function.name
            ))
        })?;
        self.frame.ip += 1;
        Ok(byte)
    }

    fn read_u16(&mut self) -> Result<u16, RuntimeError> {
        let high = self.read_byte()?;
        let low = self.read_byte()?;
        Ok(u16::from_be_bytes([high, low]))
    }

    fn read_u32(&mut self) -> Result<u32, RuntimeError> {
        let mut bytes = [0; 4];
        for byte in &mut bytes {
            *byte = self.read_byte()?;
        }
        Ok(u32::from_be_bytes(bytes))
    }

    fn read_constant(&mut self, wide: bool) -> Result<Value, RuntimeError> {
        let index = if wide {
            self.read_u32()? as usize
        } else {
            self.read_byte()? as usize
        };
        self.frame
            .function
            .chunk
            .constants
            .get(index)
            .cloned()
            .ok_or_else(|| Self::invalid(format!("constant {} does not exist", index)))
    }

    fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.stack
            .pop()
            .ok_or_else(|| Self::invalid("stack underflow"))
    }

    fn peek(&self) -> Result<&Value, RuntimeError> {
        self.stack
            .last()
            .ok_or_else(|| Self::invalid("stack underflow"))
    }

    fn local_index(&self, slot: u8) -> Result<usize, RuntimeError> {
        let index = self.frame.base + slot as usize;
        if index < self.stack.len() {
            Ok(index)
        } else {
            Err(Self::invalid(format!("local slot {} is not allocated", slot)))
        }
    }

    fn global_mut(&mut self, slot: u8) -> Result<&mut Option<Value>, RuntimeError> {
        self.globals
            .get_mut(slot as usize)
            .ok_or_else(|| Self::invalid(format!("global slot {} does not exist", slot)))
    }

    /// Leaves the running frame. Returns `false` when the script frame returns.
    fn leave_frame(&mut self) -> bool {
        self.stack.truncate(self.frame.base);
        match self.call_stack.pop() {
            Some(caller) => {
                self.frame = caller;
                true
            }
            None => false,
        }
    }

    fn call(&mut self, index: u16, arity: u8) -> Result<(), RuntimeError> {
        let function = self
            .module
            .function(index)
            .ok_or_else(|| Self::invalid(format!("function {} does not exist", index)))?;
        if function.arity != arity {
            return Err(Self::invalid(format!(
                "'{}' expects {} arguments, called with {}",
                function.name, function.arity, arity
            )));
        }
        if self.call_stack.len() + 1 >= MAX_FRAMES {
            return Err(RuntimeError::StackOverflow { line: self.line() });
        }
        let base = self
            .stack
            .len()
            .checked_sub(arity as usize)
            .ok_or_else(|| Self::invalid("stack underflow"))?;

        let callee = CallFrame {
            ip: 0,
            function,
            base,
        };
        let caller = mem::replace(&mut self.frame, callee);
        self.call_stack.push(caller);
        Ok(())
    }

    fn call_native(&mut self, index: u8, arity: u8) -> Result<(), RuntimeError> {
        let native = Native::from_index(index)
            .ok_or_else(|| Self::invalid(format!("native {} does not exist", index)))?;
        if native.arity() != arity {
            return Err(Self::invalid(format!(
                "{}() expects {} arguments, called with {}",
                native.name(),
                native.arity(),
                arity
            )));
        }
        let start = self
            .stack
            .len()
            .checked_sub(arity as usize)
            .ok_or_else(|| Self::invalid("stack underflow"))?;
        let args = self.stack.split_off(start);
        let result = native
            .call(&args, self.out)
            .map_err(|source: NativeError| RuntimeError::Native {
                source,
                line: self.line(),
            })?;
        if let Some(value) = result {
            self.stack.push(value);
        }
        Ok(())
    }

    /// Runs until the script returns.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        /// Generate vm for arithmetic operators on two numbers of the same type.
        macro_rules! gen_num_binary_op {
            ($self: ident, $op: tt, $int_op: ident) => {{
                let b = $self.pop()?;
                let a = $self.pop()?;
                match (a, b) {
                    (Value::Int(a), Value::Int(b)) => $self.stack.push(Value::Int(a.$int_op(b))),
                    (Value::Float(a), Value::Float(b)) => $self.stack.push(Value::Float(a $op b)),
                    (a, b) => {
                        return Err($self.type_error(format!(
                            "operands must be two Int or two Float, found {} and {}",
                            a.type_name(),
                            b.type_name()
                        )))
                    }
                }
            }};
        }

        /// Generate vm for comparison operators.
        macro_rules! gen_cmp_op {
            ($self: ident, $op: tt) => {{
                let b = $self.pop()?;
                let a = $self.pop()?;
                let result = match (&a, &b) {
                    (Value::Int(a), Value::Int(b)) => a $op b,
                    (Value::Float(a), Value::Float(b)) => a $op b,
                    (Value::Str(a), Value::Str(b)) => a $op b,
                    _ => {
                        return Err($self.type_error(format!(
                            "cannot compare {} and {}",
                            a.type_name(),
                            b.type_name()
                        )))
                    }
                };
                $self.stack.push(Value::Bool(result));
            }};
        }

        /// Generate vm for `div` and `rem`, which fail on an `Int` zero divisor.
        macro_rules! gen_div_op {
            ($self: ident, $op: tt, $int_op: ident) => {{
                let b = $self.pop()?;
                let a = $self.pop()?;
                match (a, b) {
                    (Value::Int(_), Value::Int(0)) => {
                        return Err(RuntimeError::DivisionByZero { line: $self.line() })
                    }
                    (Value::Int(a), Value::Int(b)) => $self.stack.push(Value::Int(a.$int_op(b))),
                    (Value::Float(a), Value::Float(b)) => $self.stack.push(Value::Float(a $op b)),
                    (a, b) => {
                        return Err($self.type_error(format!(
                            "operands must be two Int or two Float, found {} and {}",
                            a.type_name(),
                            b.type_name()
                        )))
                    }
                }
            }};
        }

        loop {
            let instr = self.read_byte()?;
            let op = OpCode::from_u8(instr)
                .ok_or_else(|| Self::invalid(format!("unknown opcode {}", instr)))?;
            tracing::trace!(
                function = %self.frame.function.name,
                ip = self.frame.ip - 1,
                ?op,
                stack = ?self.stack,
                "execute"
            );

            match op {
                OpCode::Ldc => {
                    let constant = self.read_constant(false)?;
                    self.stack.push(constant);
                }
                OpCode::LdcWide => {
                    let constant = self.read_constant(true)?;
                    self.stack.push(constant);
                }
                OpCode::LdTrue => self.stack.push(Value::Bool(true)),
                OpCode::LdFalse => self.stack.push(Value::Bool(false)),
                OpCode::LdLoc => {
                    let slot = self.read_byte()?;
                    let index = self.local_index(slot)?;
                    let value = self.stack[index].clone();
                    self.stack.push(value);
                }
                OpCode::StLoc => {
                    let slot = self.read_byte()?;
                    let index = self.local_index(slot)?;
                    let value = self.peek()?.clone();
                    self.stack[index] = value;
                }
                OpCode::LdGlobal => {
                    let slot = self.read_byte()?;
                    match self.global_mut(slot)?.clone() {
                        Some(value) => self.stack.push(value),
                        None => {
                            return Err(RuntimeError::UninitializedGlobal {
                                index: slot,
                                line: self.line(),
                            })
                        }
                    }
                }
                OpCode::StGlobal => {
                    let slot = self.read_byte()?;
                    let value = self.peek()?.clone();
                    *self.global_mut(slot)? = Some(value);
                }
                OpCode::Neg => match self.pop()? {
                    Value::Int(val) => self.stack.push(Value::Int(val.wrapping_neg())),
                    Value::Float(val) => self.stack.push(Value::Float(-val)),
                    val => {
                        return Err(self.type_error(format!(
                            "operand must be a number, found {}",
                            val.type_name()
                        )))
                    }
                },
                OpCode::Not => match self.pop()? {
                    Value::Bool(val) => self.stack.push(Value::Bool(!val)),
                    val => {
                        return Err(self.type_error(format!(
                            "operand must be a Bool, found {}",
                            val.type_name()
                        )))
                    }
                },
                OpCode::Add => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    match (a, b) {
                        (Value::Int(a), Value::Int(b)) => {
                            self.stack.push(Value::Int(a.wrapping_add(b)))
                        }
                        (Value::Float(a), Value::Float(b)) => self.stack.push(Value::Float(a + b)),
                        (Value::Str(a), Value::Str(b)) => {
                            // handle string concatenation
                            self.stack.push(Value::from(format!("{}{}", a, b)));
                        }
                        (a, b) => {
                            return Err(self.type_error(format!(
                                "operands must be two numbers or two strings, found {} and {}",
                                a.type_name(),
                                b.type_name()
                            )))
                        }
                    }
                }
                OpCode::Sub => gen_num_binary_op!(self, -, wrapping_sub),
                OpCode::Mul => gen_num_binary_op!(self, *, wrapping_mul),
                OpCode::Div => gen_div_op!(self, /, wrapping_div),
                OpCode::Rem => gen_div_op!(self, %, wrapping_rem),
                OpCode::Eq => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.stack.push(Value::Bool(a == b));
                }
                OpCode::Greater => gen_cmp_op!(self, >),
                OpCode::Less => gen_cmp_op!(self, <),
                OpCode::Pop => {
                    self.pop()?; // throw away result
                }
                OpCode::Dup => {
                    let value = self.peek()?.clone();
                    self.stack.push(value);
                }
                OpCode::I2F => match self.pop()? {
                    Value::Int(val) => self.stack.push(Value::Float(val as f64)),
                    val => {
                        return Err(self.type_error(format!(
                            "cannot convert {} to Float",
                            val.type_name()
                        )))
                    }
                },
                OpCode::Call => {
                    let index = self.read_u16()?;
                    let arity = self.read_byte()?;
                    self.call(index, arity)?;
                }
                OpCode::CallNative => {
                    let index = self.read_byte()?;
                    let arity = self.read_byte()?;
                    self.call_native(index, arity)?;
                }
                OpCode::Ret => {
                    let value = self.pop()?;
                    if !self.leave_frame() {
                        return Err(Self::invalid("the script cannot return a value"));
                    }
                    self.stack.push(value);
                }
                OpCode::RetVoid => {
                    if !self.leave_frame() {
                        return Ok(());
                    }
                }
                OpCode::Jmp => {
                    let target = self.read_u32()?;
                    self.frame.ip = target as usize;
                }
                OpCode::JmpIfFalse => {
                    let target = self.read_u32()?;
                    match self.pop()? {
                        Value::Bool(false) => self.frame.ip = target as usize,
                        Value::Bool(true) => {}
                        val => {
                            return Err(self.type_error(format!(
                                "condition must be a Bool, found {}",
                                val.type_name()
                            )))
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::{CodeGenerator, CompileOptions};
    use rill_parser::parse;
    use rill_passes::analyze::SemanticAnalyzer;
    use rill_source::Source;

    fn compile(text: &str) -> Module {
        let source = Source::new(text);
        let mut program = parse(&source);
        let table = SemanticAnalyzer::new(&source).analyze(&mut program);
        assert_eq!(source.diagnostics.error_messages(), Vec::<String>::new());
        CodeGenerator::new(&source, &table, CompileOptions::default())
            .generate(&program)
            .unwrap()
    }

    /// Runs `text` and returns what it printed.
    fn run(text: &str) -> Result<String, RuntimeError> {
        let module = compile(text);
        let mut out = Vec::new();
        Vm::interpret(&module, &mut out)?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_global_arithmetic() {
        let module = compile("let x = 1 + 2 * 3; let y = x / 2; let z = -x % 4;");
        let mut out = Vec::new();
        let mut vm = Vm::new(&module, &mut out);
        vm.run().unwrap();
        assert_eq!(
            vm.globals(),
            &[
                Some(Value::Int(7)),
                Some(Value::Int(3)),
                Some(Value::Int(-3))
            ]
        );
        assert!(vm.stack().is_empty());
    }

    #[test]
    fn test_print() {
        assert_eq!(
            run(r#"print("hello, " + "world"); print(str(len("héllo")));"#).unwrap(),
            "hello, world\n5\n"
        );
    }

    #[test]
    fn test_float_widening() {
        let module = compile("let f: Float = 1; let g = f / 2 + 1;");
        let mut out = Vec::new();
        let mut vm = Vm::new(&module, &mut out);
        vm.run().unwrap();
        assert_eq!(vm.globals()[1], Some(Value::Float(1.5)));
    }

    #[test]
    fn test_control_flow() {
        let text = r#"
            fn fib(n: Int) -> Int {
                if (n < 2) return n;
                return fib(n - 1) + fib(n - 2);
            }
            let i = 0;
            while (i <= 10) {
                if (i % 5 == 0) print(str(fib(i)));
                i = i + 1;
            }
        "#;
        assert_eq!(run(text).unwrap(), "0\n5\n55\n");
    }

    #[test]
    fn test_locals_and_blocks() {
        let text = r#"
            fn sum(n: Int) -> Int {
                let total = 0;
                let i = 1;
                while (i <= n) {
                    let next = total + i;
                    total = next;
                    i = i + 1;
                }
                return total;
            }
            {
                let a = sum(4);
                {
                    let b = a * 2;
                    print(str(b));
                }
                print(str(a));
            }
        "#;
        assert_eq!(run(text).unwrap(), "20\n10\n");
    }

    #[test]
    fn test_short_circuit() {
        let text = r#"
            fn loud(b: Bool) -> Bool {
                print("evaluated");
                return b;
            }
            let a = false && loud(true);
            let b = true || loud(false);
            let c = true && loud(false);
        "#;
        let module = compile(text);
        let mut out = Vec::new();
        let mut vm = Vm::new(&module, &mut out);
        vm.run().unwrap();
        assert_eq!(
            vm.globals(),
            &[
                Some(Value::Bool(false)),
                Some(Value::Bool(true)),
                Some(Value::Bool(false))
            ]
        );
        drop(vm);
        assert_eq!(String::from_utf8(out).unwrap(), "evaluated\n");
    }

    #[test]
    fn test_void_functions_and_defaults() {
        let text = r#"
            let greeting: String;
            fn greet(name: String) {
                if (name == "") return;
                print(greeting + name);
            }
            greeting = "hi ";
            greet("");
            greet("rill");
        "#;
        assert_eq!(run(text).unwrap(), "hi rill\n");
    }

    #[test]
    fn test_string_comparison() {
        assert_eq!(
            run(r#"if ("abc" < "abd" && "b" >= "a") print("ordered");"#).unwrap(),
            "ordered\n"
        );
    }

    #[test]
    fn test_division_by_zero() {
        let err = run("let a = 0;\nlet b = 1 / a;").unwrap_err();
        assert!(matches!(err, RuntimeError::DivisionByZero { line: 2 }));
        assert_eq!(err.to_string(), "[line 2] division by zero");
        assert!(matches!(
            run("let a = 0; let b = 1 % a;"),
            Err(RuntimeError::DivisionByZero { .. })
        ));
        // float division follows IEEE 754
        assert!(run("let a = 0.0; let b = 1.0 / a;").is_ok());
    }

    #[test]
    fn test_stack_overflow() {
        let err = run("fn f(n: Int) -> Int { return f(n + 1); }\nf(0);").unwrap_err();
        assert!(matches!(err, RuntimeError::StackOverflow { line: 1 }));
    }

    #[test]
    fn test_uninitialized_global() {
        let text = "let early = read();\nlet late = 1;\nfn read() -> Int { return late; }";
        let err = run(text).unwrap_err();
        assert_eq!(
            err.to_string(),
            "[line 3] global 1 read before initialization"
        );
    }

    #[test]
    fn test_wrapping_int_arithmetic() {
        let module = compile("let max = 9223372036854775807; let wrapped = max + 1;");
        let mut out = Vec::new();
        let mut vm = Vm::new(&module, &mut out);
        vm.run().unwrap();
        assert_eq!(vm.globals()[1], Some(Value::Int(i64::MIN)));
    }

    #[test]
    fn test_invalid_bytecode() {
        let mut script = Function::new("<script>", 0);
        script.chunk.write_chunk(OpCode::Pop, 1);
        let module = Module {
            script,
            functions: Vec::new(),
            globals: 0,
        };
        let err = Vm::interpret(&module, &mut Vec::new()).unwrap_err();
        assert_eq!(err.to_string(), "invalid bytecode: stack underflow");

        let module = Module {
            script: Function::new("<script>", 0),
            functions: Vec::new(),
            globals: 0,
        };
        let err = Vm::interpret(&module, &mut Vec::new()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid bytecode: '<script>' ends without returning"
        );
    }

    fn print_lines(count: usize) -> String {
        let body: Vec<String> = (0..count)
            .map(|i| format!("print(\"line {}\");", i))
            .collect();
        format!("fn main() {{ {} }}\nmain();", body.join(" "))
    }

    #[test]
    fn test_constant_table_boundary() {
        for count in [256, 257] {
            let module = compile(&print_lines(count));
            assert_eq!(module.functions[0].chunk.constants.len(), count);

            let mut out = Vec::new();
            Vm::interpret(&module, &mut out).unwrap();
            let out = String::from_utf8(out).unwrap();
            assert_eq!(out.lines().count(), count);
            assert_eq!(out.lines().last(), Some(format!("line {}", count - 1).as_str()));
        }
    }

    #[test]
    fn test_max_parameters() {
        let params: Vec<String> = (0..255).map(|i| format!("p{}: Int", i)).collect();
        let args: Vec<String> = (0..255).map(|i| i.to_string()).collect();
        let text = format!(
            "fn last({}) -> Int {{ return p254 - p0; }}\nprint(str(last({})));",
            params.join(", "),
            args.join(", ")
        );
        let module = compile(&text);
        assert_eq!(module.functions[0].arity, 255);
        assert_eq!(run(&text).unwrap(), "254\n");
    }

    #[test]
    fn test_jump_past_u16_range() {
        let body = "i = i + 1; ".repeat(15000);
        let text = format!(
            "let i = 0;\nwhile (i < 1) {{ {}}}\nprint(str(i));",
            body
        );
        let module = compile(&text);
        assert!(module.script.chunk.code.len() > usize::from(u16::MAX));
        assert_eq!(run(&text).unwrap(), "15000\n");
    }
}
