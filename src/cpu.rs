use bitflags::bitflags;

use crate::memory::Memory;
use crate::opcodes::{AddressingMode, Instruction, Mnemonic, INSTRUCTION_TABLE};

pub const STACK_BASE: u16 = 0x0100;
pub const NMI_VECTOR: u16 = 0xFFFA;
pub const RESET_VECTOR: u16 = 0xFFFC;
pub const IRQ_VECTOR: u16 = 0xFFFE;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StatusFlags: u8 {
        const CARRY = 0b0000_0001;
        const ZERO = 0b0000_0010;
        const INTERRUPT_DISABLE = 0b0000_0100;
        const DECIMAL_MODE = 0b0000_1000;
        const BREAK_COMMAND = 0b0001_0000;
        const UNUSED = 0b0010_0000;
        const OVERFLOW = 0b0100_0000;
        const NEGATIVE = 0b1000_0000;
    }
}

/// Cycle-driven 6502 core. One call to [`Cpu::tick`] is one CPU cycle;
/// the instruction is executed in full on its first cycle and the
/// remaining cycles are burned down one tick at a time, which keeps the
/// externally visible timing exact without micro-stepping the bus.
pub struct Cpu {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub sp: u8,
    pub status: StatusFlags,
    pub pc: u16,

    /// Total cycles since power-on.
    pub cycles: u64,
    cycles_remaining: u8,

    // Transient per-instruction state.
    pub opcode: u8,
    addr_abs: u16,
    addr_rel: u16,
    fetched: u8,
}

impl Cpu {
    pub fn new() -> Self {
        Cpu {
            a: 0,
            x: 0,
            y: 0,
            sp: 0xFD,
            status: StatusFlags::from_bits_truncate(0b0010_0100),
            pc: 0,
            cycles: 0,
            cycles_remaining: 0,
            opcode: 0,
            addr_abs: 0,
            addr_rel: 0,
            fetched: 0,
        }
    }

    /// True when the next tick will fetch a new opcode.
    pub fn instruction_complete(&self) -> bool {
        self.cycles_remaining == 0
    }

    pub fn reset<M: Memory>(&mut self, memory: &mut M) {
        self.pc = memory.read_u16(RESET_VECTOR);

        self.a = 0;
        self.x = 0;
        self.y = 0;
        self.sp = 0xFD;
        self.status = StatusFlags::UNUSED | StatusFlags::INTERRUPT_DISABLE;

        self.addr_abs = 0;
        self.addr_rel = 0;
        self.fetched = 0;

        self.cycles_remaining = 8;
    }

    /// Advance one CPU cycle. On the fetch cycle the instruction is
    /// decoded from the static table and executed; page-cross penalties
    /// only apply when both the addressing mode crossed a page and the
    /// operation is a read that accepts the extra cycle.
    pub fn tick<M: Memory>(&mut self, memory: &mut M) {
        if self.cycles_remaining == 0 {
            self.opcode = memory.read(self.pc);
            self.status.insert(StatusFlags::UNUSED);
            self.pc = self.pc.wrapping_add(1);

            let instr = INSTRUCTION_TABLE[self.opcode as usize];
            self.cycles_remaining = instr.cycles;

            let page_crossed = self.resolve_address(memory, instr.mode);
            let takes_penalty = self.execute(memory, &instr);

            if page_crossed && takes_penalty {
                self.cycles_remaining += 1;
            }

            self.status.insert(StatusFlags::UNUSED);
        }

        self.cycles_remaining -= 1;
        self.cycles += 1;
    }

    /// Non-maskable interrupt entry.
    pub fn nmi<M: Memory>(&mut self, memory: &mut M) {
        self.interrupt(memory, NMI_VECTOR, 8);
    }

    /// Maskable interrupt entry; ignored while the I flag is set.
    pub fn irq<M: Memory>(&mut self, memory: &mut M) {
        if !self.status.contains(StatusFlags::INTERRUPT_DISABLE) {
            self.interrupt(memory, IRQ_VECTOR, 7);
        }
    }

    fn interrupt<M: Memory>(&mut self, memory: &mut M, vector: u16, cycles: u8) {
        self.push_u16(memory, self.pc);

        let mut pushed = self.status;
        pushed.remove(StatusFlags::BREAK_COMMAND);
        pushed.insert(StatusFlags::UNUSED);
        self.push(memory, pushed.bits());

        self.status.insert(StatusFlags::INTERRUPT_DISABLE);
        self.pc = memory.read_u16(vector);
        self.cycles_remaining = cycles;
    }

    // Addressing-mode resolution. Leaves the effective address in
    // `addr_abs` (or the sign-extended offset in `addr_rel` for
    // branches) and reports whether a page boundary was crossed.
    fn resolve_address<M: Memory>(&mut self, memory: &mut M, mode: AddressingMode) -> bool {
        match mode {
            AddressingMode::Implied => {
                self.fetched = self.a;
                false
            }
            AddressingMode::Immediate => {
                self.addr_abs = self.pc;
                self.pc = self.pc.wrapping_add(1);
                false
            }
            AddressingMode::ZeroPage => {
                self.addr_abs = memory.read(self.pc) as u16;
                self.pc = self.pc.wrapping_add(1);
                false
            }
            AddressingMode::ZeroPageX => {
                self.addr_abs = memory.read(self.pc).wrapping_add(self.x) as u16;
                self.pc = self.pc.wrapping_add(1);
                false
            }
            AddressingMode::ZeroPageY => {
                self.addr_abs = memory.read(self.pc).wrapping_add(self.y) as u16;
                self.pc = self.pc.wrapping_add(1);
                false
            }
            AddressingMode::Relative => {
                self.addr_rel = memory.read(self.pc) as i8 as u16;
                self.pc = self.pc.wrapping_add(1);
                false
            }
            AddressingMode::Absolute => {
                self.addr_abs = memory.read_u16(self.pc);
                self.pc = self.pc.wrapping_add(2);
                false
            }
            AddressingMode::AbsoluteX => {
                let base = memory.read_u16(self.pc);
                self.pc = self.pc.wrapping_add(2);
                self.addr_abs = base.wrapping_add(self.x as u16);
                (self.addr_abs & 0xFF00) != (base & 0xFF00)
            }
            AddressingMode::AbsoluteY => {
                let base = memory.read_u16(self.pc);
                self.pc = self.pc.wrapping_add(2);
                self.addr_abs = base.wrapping_add(self.y as u16);
                (self.addr_abs & 0xFF00) != (base & 0xFF00)
            }
            AddressingMode::Indirect => {
                let ptr = memory.read_u16(self.pc);
                self.pc = self.pc.wrapping_add(2);
                // Hardware bug: the high byte of the pointer never
                // crosses a page when the low byte is $FF.
                let hi_addr = if ptr & 0x00FF == 0x00FF {
                    ptr & 0xFF00
                } else {
                    ptr + 1
                };
                self.addr_abs = ((memory.read(hi_addr) as u16) << 8) | memory.read(ptr) as u16;
                false
            }
            AddressingMode::IndirectX => {
                let t = memory.read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                let lo = memory.read(t.wrapping_add(self.x) as u16) as u16;
                let hi = memory.read(t.wrapping_add(self.x).wrapping_add(1) as u16) as u16;
                self.addr_abs = (hi << 8) | lo;
                false
            }
            AddressingMode::IndirectY => {
                let t = memory.read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                let lo = memory.read(t as u16) as u16;
                let hi = memory.read(t.wrapping_add(1) as u16) as u16;
                let base = (hi << 8) | lo;
                self.addr_abs = base.wrapping_add(self.y as u16);
                (self.addr_abs & 0xFF00) != (base & 0xFF00)
            }
        }
    }

    fn fetch<M: Memory>(&mut self, memory: &mut M, mode: AddressingMode) -> u8 {
        if mode != AddressingMode::Implied {
            self.fetched = memory.read(self.addr_abs);
        }
        self.fetched
    }

    fn push<M: Memory>(&mut self, memory: &mut M, data: u8) {
        memory.write(STACK_BASE + self.sp as u16, data);
        self.sp = self.sp.wrapping_sub(1);
    }

    fn pop<M: Memory>(&mut self, memory: &mut M) -> u8 {
        self.sp = self.sp.wrapping_add(1);
        memory.read(STACK_BASE + self.sp as u16)
    }

    fn push_u16<M: Memory>(&mut self, memory: &mut M, data: u16) {
        self.push(memory, (data >> 8) as u8);
        self.push(memory, (data & 0xFF) as u8);
    }

    fn pop_u16<M: Memory>(&mut self, memory: &mut M) -> u16 {
        let lo = self.pop(memory) as u16;
        let hi = self.pop(memory) as u16;
        (hi << 8) | lo
    }

    fn set_zn(&mut self, value: u8) {
        self.status.set(StatusFlags::ZERO, value == 0);
        self.status.set(StatusFlags::NEGATIVE, value & 0x80 != 0);
    }

    fn add_to_a(&mut self, value: u8) {
        let carry = self.status.contains(StatusFlags::CARRY) as u16;
        let sum = self.a as u16 + value as u16 + carry;
        self.status.set(StatusFlags::CARRY, sum > 0xFF);
        self.status.set(
            StatusFlags::OVERFLOW,
            (!(self.a ^ value) & (self.a ^ sum as u8)) & 0x80 != 0,
        );
        self.a = sum as u8;
        self.set_zn(self.a);
    }

    fn compare(&mut self, register: u8, value: u8) {
        let result = register.wrapping_sub(value);
        self.status.set(StatusFlags::CARRY, register >= value);
        self.set_zn(result);
    }

    fn branch(&mut self, taken: bool) {
        if taken {
            self.cycles_remaining += 1;
            let target = self.pc.wrapping_add(self.addr_rel);
            if target & 0xFF00 != self.pc & 0xFF00 {
                self.cycles_remaining += 1;
            }
            self.pc = target;
        }
    }

    // Operation dispatch. The returned bool says whether the operation
    // accepts the addressing mode's page-cross penalty.
    fn execute<M: Memory>(&mut self, memory: &mut M, instr: &Instruction) -> bool {
        let mode = instr.mode;
        match instr.mnemonic {
            Mnemonic::ADC => {
                let value = self.fetch(memory, mode);
                self.add_to_a(value);
                true
            }
            Mnemonic::SBC => {
                let value = self.fetch(memory, mode);
                self.add_to_a(!value);
                true
            }
            Mnemonic::AND => {
                let value = self.fetch(memory, mode);
                self.a &= value;
                self.set_zn(self.a);
                true
            }
            Mnemonic::ORA => {
                let value = self.fetch(memory, mode);
                self.a |= value;
                self.set_zn(self.a);
                true
            }
            Mnemonic::EOR => {
                let value = self.fetch(memory, mode);
                self.a ^= value;
                self.set_zn(self.a);
                true
            }
            Mnemonic::ASL => {
                let value = self.fetch(memory, mode);
                self.status.set(StatusFlags::CARRY, value & 0x80 != 0);
                let result = value << 1;
                self.set_zn(result);
                if mode == AddressingMode::Implied {
                    self.a = result;
                } else {
                    memory.write(self.addr_abs, result);
                }
                false
            }
            Mnemonic::LSR => {
                let value = self.fetch(memory, mode);
                self.status.set(StatusFlags::CARRY, value & 0x01 != 0);
                let result = value >> 1;
                self.set_zn(result);
                if mode == AddressingMode::Implied {
                    self.a = result;
                } else {
                    memory.write(self.addr_abs, result);
                }
                false
            }
            Mnemonic::ROL => {
                let value = self.fetch(memory, mode);
                let carry_in = self.status.contains(StatusFlags::CARRY) as u8;
                self.status.set(StatusFlags::CARRY, value & 0x80 != 0);
                let result = (value << 1) | carry_in;
                self.set_zn(result);
                if mode == AddressingMode::Implied {
                    self.a = result;
                } else {
                    memory.write(self.addr_abs, result);
                }
                false
            }
            Mnemonic::ROR => {
                let value = self.fetch(memory, mode);
                let carry_in = self.status.contains(StatusFlags::CARRY) as u8;
                self.status.set(StatusFlags::CARRY, value & 0x01 != 0);
                let result = (carry_in << 7) | (value >> 1);
                self.set_zn(result);
                if mode == AddressingMode::Implied {
                    self.a = result;
                } else {
                    memory.write(self.addr_abs, result);
                }
                false
            }
            Mnemonic::BCC => {
                self.branch(!self.status.contains(StatusFlags::CARRY));
                false
            }
            Mnemonic::BCS => {
                self.branch(self.status.contains(StatusFlags::CARRY));
                false
            }
            Mnemonic::BEQ => {
                self.branch(self.status.contains(StatusFlags::ZERO));
                false
            }
            Mnemonic::BNE => {
                self.branch(!self.status.contains(StatusFlags::ZERO));
                false
            }
            Mnemonic::BMI => {
                self.branch(self.status.contains(StatusFlags::NEGATIVE));
                false
            }
            Mnemonic::BPL => {
                self.branch(!self.status.contains(StatusFlags::NEGATIVE));
                false
            }
            Mnemonic::BVC => {
                self.branch(!self.status.contains(StatusFlags::OVERFLOW));
                false
            }
            Mnemonic::BVS => {
                self.branch(self.status.contains(StatusFlags::OVERFLOW));
                false
            }
            Mnemonic::BIT => {
                let value = self.fetch(memory, mode);
                self.status.set(StatusFlags::ZERO, self.a & value == 0);
                self.status.set(StatusFlags::NEGATIVE, value & 0x80 != 0);
                self.status.set(StatusFlags::OVERFLOW, value & 0x40 != 0);
                false
            }
            Mnemonic::BRK => {
                // The Immediate resolver already consumed the padding
                // byte, so PC sits at opcode + 2 here.
                self.push_u16(memory, self.pc);
                let pushed = self.status | StatusFlags::BREAK_COMMAND | StatusFlags::UNUSED;
                self.push(memory, pushed.bits());
                self.status.insert(StatusFlags::INTERRUPT_DISABLE);
                self.pc = memory.read_u16(IRQ_VECTOR);
                false
            }
            Mnemonic::CLC => {
                self.status.remove(StatusFlags::CARRY);
                false
            }
            Mnemonic::CLD => {
                self.status.remove(StatusFlags::DECIMAL_MODE);
                false
            }
            Mnemonic::CLI => {
                self.status.remove(StatusFlags::INTERRUPT_DISABLE);
                false
            }
            Mnemonic::CLV => {
                self.status.remove(StatusFlags::OVERFLOW);
                false
            }
            Mnemonic::SEC => {
                self.status.insert(StatusFlags::CARRY);
                false
            }
            Mnemonic::SED => {
                self.status.insert(StatusFlags::DECIMAL_MODE);
                false
            }
            Mnemonic::SEI => {
                self.status.insert(StatusFlags::INTERRUPT_DISABLE);
                false
            }
            Mnemonic::CMP => {
                let value = self.fetch(memory, mode);
                self.compare(self.a, value);
                true
            }
            Mnemonic::CPX => {
                let value = self.fetch(memory, mode);
                self.compare(self.x, value);
                false
            }
            Mnemonic::CPY => {
                let value = self.fetch(memory, mode);
                self.compare(self.y, value);
                false
            }
            Mnemonic::DEC => {
                let value = self.fetch(memory, mode).wrapping_sub(1);
                memory.write(self.addr_abs, value);
                self.set_zn(value);
                false
            }
            Mnemonic::DEX => {
                self.x = self.x.wrapping_sub(1);
                self.set_zn(self.x);
                false
            }
            Mnemonic::DEY => {
                self.y = self.y.wrapping_sub(1);
                self.set_zn(self.y);
                false
            }
            Mnemonic::INC => {
                let value = self.fetch(memory, mode).wrapping_add(1);
                memory.write(self.addr_abs, value);
                self.set_zn(value);
                false
            }
            Mnemonic::INX => {
                self.x = self.x.wrapping_add(1);
                self.set_zn(self.x);
                false
            }
            Mnemonic::INY => {
                self.y = self.y.wrapping_add(1);
                self.set_zn(self.y);
                false
            }
            Mnemonic::JMP => {
                self.pc = self.addr_abs;
                false
            }
            Mnemonic::JSR => {
                self.pc = self.pc.wrapping_sub(1);
                self.push_u16(memory, self.pc);
                self.pc = self.addr_abs;
                false
            }
            Mnemonic::LDA => {
                self.a = self.fetch(memory, mode);
                self.set_zn(self.a);
                true
            }
            Mnemonic::LDX => {
                self.x = self.fetch(memory, mode);
                self.set_zn(self.x);
                true
            }
            Mnemonic::LDY => {
                self.y = self.fetch(memory, mode);
                self.set_zn(self.y);
                true
            }
            Mnemonic::NOP => {
                // The $1C/$3C/$5C/$7C/$DC/$FC multi-byte NOPs honor the
                // page-cross penalty like reads do.
                mode == AddressingMode::AbsoluteX
            }
            Mnemonic::PHA => {
                self.push(memory, self.a);
                false
            }
            Mnemonic::PHP => {
                let pushed = self.status | StatusFlags::BREAK_COMMAND | StatusFlags::UNUSED;
                self.push(memory, pushed.bits());
                false
            }
            Mnemonic::PLA => {
                self.a = self.pop(memory);
                self.set_zn(self.a);
                false
            }
            Mnemonic::PLP => {
                self.status = StatusFlags::from_bits_truncate(self.pop(memory));
                self.status.remove(StatusFlags::BREAK_COMMAND);
                self.status.insert(StatusFlags::UNUSED);
                false
            }
            Mnemonic::RTI => {
                self.status = StatusFlags::from_bits_truncate(self.pop(memory));
                self.status.remove(StatusFlags::BREAK_COMMAND);
                self.status.insert(StatusFlags::UNUSED);
                self.pc = self.pop_u16(memory);
                false
            }
            Mnemonic::RTS => {
                self.pc = self.pop_u16(memory).wrapping_add(1);
                false
            }
            Mnemonic::STA => {
                memory.write(self.addr_abs, self.a);
                false
            }
            Mnemonic::STX => {
                memory.write(self.addr_abs, self.x);
                false
            }
            Mnemonic::STY => {
                memory.write(self.addr_abs, self.y);
                false
            }
            Mnemonic::TAX => {
                self.x = self.a;
                self.set_zn(self.x);
                false
            }
            Mnemonic::TAY => {
                self.y = self.a;
                self.set_zn(self.y);
                false
            }
            Mnemonic::TSX => {
                self.x = self.sp;
                self.set_zn(self.x);
                false
            }
            Mnemonic::TXA => {
                self.a = self.x;
                self.set_zn(self.a);
                false
            }
            Mnemonic::TXS => {
                self.sp = self.x;
                false
            }
            Mnemonic::TYA => {
                self.a = self.y;
                self.set_zn(self.a);
                false
            }

            // Undocumented opcodes.
            Mnemonic::SLO => {
                let value = self.fetch(memory, mode);
                self.status.set(StatusFlags::CARRY, value & 0x80 != 0);
                let result = value << 1;
                memory.write(self.addr_abs, result);
                self.a |= result;
                self.set_zn(self.a);
                false
            }
            Mnemonic::RLA => {
                let value = self.fetch(memory, mode);
                let carry_in = self.status.contains(StatusFlags::CARRY) as u8;
                self.status.set(StatusFlags::CARRY, value & 0x80 != 0);
                let result = (value << 1) | carry_in;
                memory.write(self.addr_abs, result);
                self.a &= result;
                self.set_zn(self.a);
                false
            }
            Mnemonic::SRE => {
                let value = self.fetch(memory, mode);
                self.status.set(StatusFlags::CARRY, value & 0x01 != 0);
                let result = value >> 1;
                memory.write(self.addr_abs, result);
                self.a ^= result;
                self.set_zn(self.a);
                false
            }
            Mnemonic::RRA => {
                let value = self.fetch(memory, mode);
                let carry_in = self.status.contains(StatusFlags::CARRY) as u8;
                self.status.set(StatusFlags::CARRY, value & 0x01 != 0);
                let result = (carry_in << 7) | (value >> 1);
                memory.write(self.addr_abs, result);
                self.add_to_a(result);
                false
            }
            Mnemonic::SAX => {
                memory.write(self.addr_abs, self.a & self.x);
                false
            }
            Mnemonic::LAX => {
                let value = self.fetch(memory, mode);
                self.a = value;
                self.x = value;
                self.set_zn(value);
                true
            }
            Mnemonic::DCP => {
                let value = self.fetch(memory, mode).wrapping_sub(1);
                memory.write(self.addr_abs, value);
                self.compare(self.a, value);
                false
            }
            Mnemonic::ISC => {
                let value = self.fetch(memory, mode).wrapping_add(1);
                memory.write(self.addr_abs, value);
                self.add_to_a(!value);
                false
            }
            Mnemonic::ANC => {
                let value = self.fetch(memory, mode);
                self.a &= value;
                self.set_zn(self.a);
                self.status
                    .set(StatusFlags::CARRY, self.a & 0x80 != 0);
                false
            }
            Mnemonic::ALR => {
                let value = self.fetch(memory, mode);
                self.a &= value;
                self.status.set(StatusFlags::CARRY, self.a & 0x01 != 0);
                self.a >>= 1;
                self.status.set(StatusFlags::ZERO, self.a == 0);
                self.status.remove(StatusFlags::NEGATIVE);
                false
            }
            Mnemonic::ARR => {
                let value = self.fetch(memory, mode);
                let carry_in = self.status.contains(StatusFlags::CARRY) as u8;
                self.a = (carry_in << 7) | ((self.a & value) >> 1);
                self.set_zn(self.a);
                self.status.set(StatusFlags::CARRY, self.a & 0x40 != 0);
                self.status.set(
                    StatusFlags::OVERFLOW,
                    ((self.a & 0x40) ^ ((self.a & 0x20) << 1)) != 0,
                );
                false
            }
            Mnemonic::XAA => {
                let value = self.fetch(memory, mode);
                self.a = self.x & value;
                self.set_zn(self.a);
                false
            }
            Mnemonic::AXS => {
                let value = self.fetch(memory, mode);
                let operand = self.a & self.x;
                self.x = operand.wrapping_sub(value);
                self.status.set(StatusFlags::CARRY, operand >= value);
                self.set_zn(self.x);
                false
            }
            Mnemonic::AHX => {
                let value = self.a & self.x & ((self.addr_abs >> 8) as u8).wrapping_add(1);
                memory.write(self.addr_abs, value);
                false
            }
            Mnemonic::SHY => {
                let value = self.y & ((self.addr_abs >> 8) as u8).wrapping_add(1);
                memory.write(self.addr_abs, value);
                false
            }
            Mnemonic::SHX => {
                let value = self.x & ((self.addr_abs >> 8) as u8).wrapping_add(1);
                memory.write(self.addr_abs, value);
                false
            }
            Mnemonic::TAS => {
                self.sp = self.a & self.x;
                let value = self.sp & ((self.addr_abs >> 8) as u8).wrapping_add(1);
                memory.write(self.addr_abs, value);
                false
            }
            Mnemonic::LAS => {
                let value = self.fetch(memory, mode) & self.sp;
                self.a = value;
                self.x = value;
                self.sp = value;
                self.set_zn(value);
                true
            }
            Mnemonic::JAM => {
                // Halt without crashing: point PC back at the opcode so
                // the CPU keeps refetching the same instruction.
                self.pc = self.pc.wrapping_sub(1);
                false
            }
        }
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Cpu::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct TestBus {
        ram: Vec<u8>,
    }

    impl TestBus {
        fn new() -> Self {
            TestBus {
                ram: vec![0; 0x10000],
            }
        }
    }

    impl Memory for TestBus {
        fn read(&mut self, addr: u16) -> u8 {
            self.ram[addr as usize]
        }

        fn write(&mut self, addr: u16, data: u8) {
            self.ram[addr as usize] = data;
        }
    }

    fn setup(program: &[u8]) -> (Cpu, TestBus) {
        let mut bus = TestBus::new();
        for (i, byte) in program.iter().enumerate() {
            bus.ram[0x8000 + i] = *byte;
        }
        bus.ram[0xFFFC] = 0x00;
        bus.ram[0xFFFD] = 0x80;

        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        while !cpu.instruction_complete() {
            cpu.tick(&mut bus);
        }
        (cpu, bus)
    }

    /// Run one full instruction, returning the cycles it consumed.
    fn step(cpu: &mut Cpu, bus: &mut TestBus) -> u64 {
        let start = cpu.cycles;
        cpu.tick(bus);
        while !cpu.instruction_complete() {
            cpu.tick(bus);
        }
        cpu.cycles - start
    }

    #[test]
    fn reset_state() {
        let (cpu, _) = setup(&[0xEA]);
        assert_eq!(cpu.pc, 0x8000);
        assert_eq!(cpu.sp, 0xFD);
        assert_eq!(cpu.status.bits() & 0x24, 0x24);
    }

    #[test]
    fn adc_signed_overflow() {
        // $50 + $50 overflows into the sign bit.
        let (mut cpu, mut bus) = setup(&[0x69, 0x50]);
        cpu.a = 0x50;
        step(&mut cpu, &mut bus);

        assert_eq!(cpu.a, 0xA0);
        assert!(cpu.status.contains(StatusFlags::NEGATIVE));
        assert!(cpu.status.contains(StatusFlags::OVERFLOW));
        assert!(!cpu.status.contains(StatusFlags::ZERO));
        assert!(!cpu.status.contains(StatusFlags::CARRY));
    }

    #[test]
    fn sbc_borrow() {
        let (mut cpu, mut bus) = setup(&[0xE9, 0xF0]);
        cpu.a = 0x50;
        cpu.status.insert(StatusFlags::CARRY);
        step(&mut cpu, &mut bus);

        assert_eq!(cpu.a, 0x60);
        assert!(!cpu.status.contains(StatusFlags::NEGATIVE));
        assert!(!cpu.status.contains(StatusFlags::OVERFLOW));
        assert!(!cpu.status.contains(StatusFlags::ZERO));
        assert!(!cpu.status.contains(StatusFlags::CARRY));
    }

    #[test]
    fn indirect_jmp_page_wrap_bug() {
        // JMP ($10FF): high byte comes from $1000, not $1100.
        let (mut cpu, mut bus) = setup(&[0x6C, 0xFF, 0x10]);
        bus.ram[0x10FF] = 0x34;
        bus.ram[0x1100] = 0x00;
        bus.ram[0x1000] = 0x78;
        step(&mut cpu, &mut bus);

        assert_eq!(cpu.pc, 0x7834);
    }

    #[test]
    fn php_plp_round_trip() {
        let (mut cpu, mut bus) = setup(&[0x08, 0x28]);
        cpu.status.insert(StatusFlags::CARRY | StatusFlags::NEGATIVE | StatusFlags::DECIMAL_MODE);
        let before = cpu.status;
        step(&mut cpu, &mut bus);

        // The pushed copy carries B and U set.
        assert_eq!(
            bus.ram[0x01FD],
            (before | StatusFlags::BREAK_COMMAND | StatusFlags::UNUSED).bits()
        );

        cpu.status = StatusFlags::UNUSED;
        step(&mut cpu, &mut bus);
        assert!(!cpu.status.contains(StatusFlags::BREAK_COMMAND));
        assert!(cpu.status.contains(StatusFlags::UNUSED));
        assert!(cpu.status.contains(StatusFlags::CARRY));
        assert!(cpu.status.contains(StatusFlags::NEGATIVE));
        assert!(cpu.status.contains(StatusFlags::DECIMAL_MODE));
    }

    #[test]
    fn branch_cycle_accounting() {
        // Not taken: 2 cycles.
        let (mut cpu, mut bus) = setup(&[0xD0, 0x10]);
        cpu.status.insert(StatusFlags::ZERO);
        assert_eq!(step(&mut cpu, &mut bus), 2);

        // Taken, same page: 3 cycles.
        let (mut cpu, mut bus) = setup(&[0xD0, 0x10]);
        cpu.status.remove(StatusFlags::ZERO);
        assert_eq!(step(&mut cpu, &mut bus), 3);
        assert_eq!(cpu.pc, 0x8012);

        // Taken, crossing a page: 4 cycles.
        let (mut cpu, mut bus) = setup(&[0xD0, 0x7F]);
        cpu.pc = 0x80F0;
        bus.ram[0x80F0] = 0xD0;
        bus.ram[0x80F1] = 0x7F;
        cpu.status.remove(StatusFlags::ZERO);
        assert_eq!(step(&mut cpu, &mut bus), 4);
        assert_eq!(cpu.pc, 0x8171);
    }

    #[test]
    fn page_cross_read_penalty() {
        // LDA $80FF,X with X=1 crosses into $8100: 5 cycles.
        let (mut cpu, mut bus) = setup(&[0xBD, 0xFF, 0x80]);
        cpu.x = 1;
        bus.ram[0x8100] = 0x42;
        assert_eq!(step(&mut cpu, &mut bus), 5);
        assert_eq!(cpu.a, 0x42);

        // Same read without the cross: 4 cycles.
        let (mut cpu, mut bus) = setup(&[0xBD, 0x00, 0x81]);
        cpu.x = 1;
        bus.ram[0x8101] = 0x99;
        assert_eq!(step(&mut cpu, &mut bus), 4);
        assert_eq!(cpu.a, 0x99);
    }

    #[test]
    fn store_never_takes_penalty() {
        let (mut cpu, mut bus) = setup(&[0x9D, 0xFF, 0x80]);
        cpu.a = 0x55;
        cpu.x = 1;
        assert_eq!(step(&mut cpu, &mut bus), 5);
        assert_eq!(bus.ram[0x8100], 0x55);
    }

    #[test]
    fn brk_pushes_pc_plus_one() {
        let (mut cpu, mut bus) = setup(&[0x00, 0xFF]);
        bus.ram[0xFFFE] = 0x00;
        bus.ram[0xFFFF] = 0x90;
        step(&mut cpu, &mut bus);

        assert_eq!(cpu.pc, 0x9000);
        assert!(cpu.status.contains(StatusFlags::INTERRUPT_DISABLE));

        // Pushed return address is the byte after the padding byte.
        let hi = bus.ram[0x01FD] as u16;
        let lo = bus.ram[0x01FC] as u16;
        assert_eq!((hi << 8) | lo, 0x8002);
        // Pushed status carries B and U.
        assert_eq!(bus.ram[0x01FB] & 0x30, 0x30);
    }

    #[test]
    fn jam_freezes_in_place() {
        let (mut cpu, mut bus) = setup(&[0x02]);
        for _ in 0..10 {
            step(&mut cpu, &mut bus);
        }
        assert_eq!(cpu.pc, 0x8000);
    }

    #[test]
    fn nmi_vectors_and_pushes() {
        let (mut cpu, mut bus) = setup(&[0xEA]);
        bus.ram[0xFFFA] = 0x34;
        bus.ram[0xFFFB] = 0x12;
        cpu.nmi(&mut bus);

        assert_eq!(cpu.pc, 0x1234);
        // B clear, U set in the pushed copy.
        assert_eq!(bus.ram[0x01FB] & 0x30, 0x20);
        assert!(cpu.status.contains(StatusFlags::INTERRUPT_DISABLE));
    }

    #[test]
    fn irq_masked_by_interrupt_disable() {
        let (mut cpu, mut bus) = setup(&[0xEA]);
        bus.ram[0xFFFE] = 0x00;
        bus.ram[0xFFFF] = 0x40;
        cpu.status.insert(StatusFlags::INTERRUPT_DISABLE);
        cpu.irq(&mut bus);
        assert_eq!(cpu.pc, 0x8000);

        cpu.status.remove(StatusFlags::INTERRUPT_DISABLE);
        cpu.irq(&mut bus);
        assert_eq!(cpu.pc, 0x4000);
    }

    #[test]
    fn lax_loads_both_registers() {
        let (mut cpu, mut bus) = setup(&[0xA7, 0x10]);
        bus.ram[0x0010] = 0x8F;
        step(&mut cpu, &mut bus);
        assert_eq!(cpu.a, 0x8F);
        assert_eq!(cpu.x, 0x8F);
        assert!(cpu.status.contains(StatusFlags::NEGATIVE));
    }

    #[test]
    fn sax_stores_a_and_x() {
        let (mut cpu, mut bus) = setup(&[0x87, 0x10]);
        cpu.a = 0xF0;
        cpu.x = 0x3C;
        step(&mut cpu, &mut bus);
        assert_eq!(bus.ram[0x0010], 0x30);
    }

    #[test]
    fn dcp_decrements_then_compares() {
        let (mut cpu, mut bus) = setup(&[0xC7, 0x10]);
        bus.ram[0x0010] = 0x41;
        cpu.a = 0x40;
        step(&mut cpu, &mut bus);
        assert_eq!(bus.ram[0x0010], 0x40);
        assert!(cpu.status.contains(StatusFlags::ZERO));
        assert!(cpu.status.contains(StatusFlags::CARRY));
    }

    #[test]
    fn zero_page_x_wraps() {
        let (mut cpu, mut bus) = setup(&[0xB5, 0xFF]);
        cpu.x = 0x01;
        bus.ram[0x0000] = 0x77;
        step(&mut cpu, &mut bus);
        assert_eq!(cpu.a, 0x77);
    }
}
