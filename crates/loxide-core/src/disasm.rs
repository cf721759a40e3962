//! Human-readable bytecode disassembly, used by the CLI's `:toggle-bytecode`
//! debug mode and by `help()` on a function value. Mirrors the teacher's
//! `bytecode::disasm` module in shape: one line per instruction, operand
//! values resolved against the chunk's constants pool where useful.

use crate::chunk::{Chunk, OpCode};
use crate::gc::Heap;
use std::fmt::Write as _;

/// Disassembles every instruction in `chunk`, labelling the block with
/// `name`. Constant operands are rendered via `heap` where the operand is a
/// heap reference (e.g. a nested function); object references that aren't
/// resolvable fall back to their raw representation.
pub fn disassemble_chunk(chunk: &Chunk, name: &str, heap: &Heap) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "== {name} ==");
    let mut offset = 0;
    while offset < chunk.code.len() {
        offset = disassemble_instruction(chunk, offset, heap, &mut out);
    }
    out
}

/// Disassembles one instruction at `offset`, appending it to `out` and
/// returning the offset of the next instruction.
pub fn disassemble_instruction(chunk: &Chunk, offset: usize, heap: &Heap, out: &mut String) -> usize {
    let _ = write!(out, "{offset:04} ");
    let line = chunk.line_at(offset);
    if offset > 0 && line == chunk.line_at(offset - 1) {
        let _ = write!(out, "   | ");
    } else {
        let _ = write!(out, "{line:4} ");
    }

    let Some(op) = OpCode::from_byte(chunk.code[offset]) else {
        let _ = writeln!(out, "unknown opcode {}", chunk.code[offset]);
        return offset + 1;
    };

    match op {
        OpCode::LoadConstant => constant_instruction("LOAD_CONSTANT", chunk, offset, heap, out),
        OpCode::GetGlobal => constant_instruction("GET_GLOBAL", chunk, offset, heap, out),
        OpCode::SetGlobal => constant_instruction("SET_GLOBAL", chunk, offset, heap, out),
        OpCode::DefineGlobal => constant_instruction("DEFINE_GLOBAL", chunk, offset, heap, out),
        OpCode::GetProperty => constant_instruction("GET_PROPERTY", chunk, offset, heap, out),
        OpCode::SetProperty => constant_instruction("SET_PROPERTY", chunk, offset, heap, out),
        OpCode::NewClass => constant_instruction("NEW_CLASS", chunk, offset, heap, out),
        OpCode::NewMethod => constant_instruction("NEW_METHOD", chunk, offset, heap, out),

        OpCode::GetLocal => byte_instruction("GET_LOCAL", chunk, offset, out),
        OpCode::SetLocal => byte_instruction("SET_LOCAL", chunk, offset, out),
        OpCode::GetUpvalue => byte_instruction("GET_UPVALUE", chunk, offset, out),
        OpCode::SetUpvalue => byte_instruction("SET_UPVALUE", chunk, offset, out),
        OpCode::Call => byte_instruction("CALL", chunk, offset, out),

        OpCode::Jump => jump_instruction("JUMP", 1, chunk, offset, out),
        OpCode::JumpIfFalse => jump_instruction("JUMP_IF_FALSE", 1, chunk, offset, out),
        OpCode::Loop => jump_instruction("LOOP", -1, chunk, offset, out),

        OpCode::NewClosure => closure_instruction(chunk, offset, heap, out),

        OpCode::Nil => simple("NIL", offset, out),
        OpCode::True => simple("TRUE", offset, out),
        OpCode::False => simple("FALSE", offset, out),
        OpCode::Pop => simple("POP", offset, out),
        OpCode::GetIndex => simple("GET_INDEX", offset, out),
        OpCode::SetIndex => simple("SET_INDEX", offset, out),
        OpCode::Equal => simple("EQUAL", offset, out),
        OpCode::Greater => simple("GREATER", offset, out),
        OpCode::Less => simple("LESS", offset, out),
        OpCode::Add => simple("ADD", offset, out),
        OpCode::Subtract => simple("SUBTRACT", offset, out),
        OpCode::Multiply => simple("MULTIPLY", offset, out),
        OpCode::Divide => simple("DIVIDE", offset, out),
        OpCode::Not => simple("NOT", offset, out),
        OpCode::Negate => simple("NEGATE", offset, out),
        OpCode::Print => simple("PRINT", offset, out),
        OpCode::Println => simple("PRINTLN", offset, out),
        OpCode::CloseUpvalue => simple("CLOSE_UPVALUE", offset, out),
        OpCode::Return => simple("RETURN", offset, out),
    }
}

fn simple(name: &str, offset: usize, out: &mut String) -> usize {
    let _ = writeln!(out, "{name}");
    offset + 1
}

fn byte_instruction(name: &str, chunk: &Chunk, offset: usize, out: &mut String) -> usize {
    let slot = chunk.code[offset + 1];
    let _ = writeln!(out, "{name:<16} {slot:4}");
    offset + 2
}

fn jump_instruction(name: &str, sign: i32, chunk: &Chunk, offset: usize, out: &mut String) -> usize {
    let jump = chunk.read_u16(offset + 1) as i32;
    let target = offset as i32 + 3 + sign * jump;
    let _ = writeln!(out, "{name:<16} {offset:4} -> {target}");
    offset + 3
}

fn constant_instruction(name: &str, chunk: &Chunk, offset: usize, heap: &Heap, out: &mut String) -> usize {
    let idx = chunk.code[offset + 1];
    let value = chunk.constants.get(idx as usize).copied();
    let _ = write!(out, "{name:<16} {idx:4} '");
    match value {
        Some(v) => crate::format::write_debug_value(out, v, heap),
        None => {
            let _ = write!(out, "<invalid>");
        }
    }
    let _ = writeln!(out, "'");
    offset + 2
}

fn closure_instruction(chunk: &Chunk, offset: usize, heap: &Heap, out: &mut String) -> usize {
    let idx = chunk.code[offset + 1];
    let value = chunk.constants.get(idx as usize).copied();
    let _ = write!(out, "{:<16} {idx:4} '", "NEW_CLOSURE");
    match value {
        Some(v) => crate::format::write_debug_value(out, v, heap),
        None => {
            let _ = write!(out, "<invalid>");
        }
    }
    let mut next = offset + 2;
    if let Some(crate::value::Value::Obj(r)) = value {
        if let Some(f) = heap.as_function(r) {
            let _ = writeln!(out, "'");
            for _ in 0..f.upvalue_count {
                let is_local = chunk.code[next];
                let index = chunk.code[next + 1];
                let kind = if is_local != 0 { "local" } else { "upvalue" };
                let _ = writeln!(out, "{next:04}      |                     {kind} {index}");
                next += 2;
            }
            return next;
        }
    }
    let _ = writeln!(out, "'");
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn disassembles_a_simple_constant_load() {
        let mut chunk = Chunk::new();
        let idx = chunk.add_constant(Value::Number(1.5)).unwrap();
        chunk.write_op(OpCode::LoadConstant, 1);
        chunk.write_byte(idx, 1);
        chunk.write_op(OpCode::Return, 1);
        let heap = Heap::new();
        let text = disassemble_chunk(&chunk, "test", &heap);
        assert!(text.contains("LOAD_CONSTANT"));
        assert!(text.contains("RETURN"));
        assert!(text.contains('1'));
    }

    #[test]
    fn jump_target_accounts_for_instruction_width() {
        let mut chunk = Chunk::new();
        let j = chunk.emit_jump(OpCode::Jump, 1);
        chunk.write_op(OpCode::Nil, 1);
        chunk.patch_jump(j).unwrap();
        let heap = Heap::new();
        let text = disassemble_chunk(&chunk, "test", &heap);
        assert!(text.contains("JUMP"));
        assert!(text.contains("-> 4"));
    }
}
