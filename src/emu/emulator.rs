use std::{collections::VecDeque, io::Write};

use anyhow::Result;
use rustc_hash::FxHashSet;

use crate::plat::{InstrFormat, Instruction, Opcode, PlatformError, Register};

use super::{
    alu::{Alu, AluOp, AluOutput},
    clock::Clock,
    debugger::Debugger,
    ram::Ram,
    registers::{EmuRegisters, Fl},
    EResult, EmuError,
};

/// How many executed instructions are kept for the debugger's backtrace.
pub const HISTORY_LEN: usize = 256;

/// Why the emulator stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    /// A [HLT][Opcode::Hlt] instruction was executed.
    Hlt,
    /// The byte at `pc` is not a known opcode.
    UnknownOpcode { opcode: u8, pc: u8 },
    /// A fault ended the run. See [`Emulator::fault`].
    Fault,
    /// Stopped from the debugger.
    User,
}

/// The emulator's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmuState {
    /// The emulator is allowed to run.
    Running,
    /// Stops execution, but doesn't put the emulator in a hard, unrecoverable [`Halt`][EmuState::Halt] state.
    /// Entered when a breakpoint is reached.
    Pause,
    /// Execution is over.
    Halt(HaltReason),
}

/// What happens to PC once an instruction has executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    /// Advance PC past the instruction.
    Next,
    /// PC was explicitly set by the instruction.
    Jump(u8),
    /// Leave PC where it is.
    Stop,
}

/// The main emulation context for the LS-8.
///
/// Program output (`prn`, `pra`) goes to `output`.
pub struct Emulator<W: Write> {
    pub registers: EmuRegisters,
    pub ram: Ram,
    pub state: EmuState,
    pub instr_history: VecDeque<(u8, Instruction)>,
    pub breakpoints: FxHashSet<u8>,
    output: W,
    steps: u64,
    step_limit: Option<u64>,
    skip_breakpoint: bool,
    clock: Option<Clock>,
    fault: Option<EmuError>,
}

impl<W: Write> Emulator<W> {
    /// Loads a binary program into a new [Emulator] instance.
    ///
    /// # Errors
    ///
    /// This function will return an error if the program doesn't fit in memory.
    pub fn new(program: &[u8], output: W) -> EResult<Self> {
        let mut ram = Ram::new();
        ram.load(program)?;
        Ok(Self {
            registers: EmuRegisters::default(),
            ram,
            state: EmuState::Running,
            instr_history: VecDeque::with_capacity(HISTORY_LEN),
            breakpoints: FxHashSet::default(),
            output,
            steps: 0,
            step_limit: None,
            skip_breakpoint: false,
            clock: None,
            fault: None,
        })
    }

    /// Caps the number of instructions a run may execute. `None` removes the cap.
    pub fn set_step_limit(&mut self, limit: Option<u64>) {
        self.step_limit = limit;
    }

    /// Throttles execution to `rate_hz` instructions per second.
    ///
    /// # Errors
    ///
    /// This function will return an error if the rate is invalid or the Tokio runtime fails to initialize.
    pub fn set_clock_rate(&mut self, rate_hz: f64) -> EResult<()> {
        self.clock = Some(Clock::new(rate_hz)?);
        Ok(())
    }

    /// Number of instructions executed so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// The fault that ended the run, if any.
    pub fn fault(&self) -> Option<&EmuError> {
        self.fault.as_ref()
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Runs the emulator until it leaves the [`Running`][EmuState::Running] state, and returns the state it ended up in.
    ///
    /// # Errors
    ///
    /// This function will return an error if an instruction faults, or if an earlier fault
    /// (e.g. one hit while stepping in the debugger) already ended the run.
    pub fn run_while_running(&mut self) -> EResult<EmuState> {
        loop {
            if let Some(fault) = &self.fault {
                return Err(fault.clone());
            }
            if self.state != EmuState::Running {
                return Ok(self.state);
            }
            if !self.skip_breakpoint && self.breakpoints.contains(&self.registers.pc) {
                log::info!("breakpoint at {:#04x}", self.registers.pc);
                self.state = EmuState::Pause;
                continue;
            }
            self.skip_breakpoint = false;
            self.step()?;
        }
    }

    /// Runs the program to completion, resuming past any breakpoints.
    ///
    /// # Errors
    ///
    /// This function will return an error if an instruction faults.
    pub fn run_until_halt(&mut self) -> EResult<HaltReason> {
        loop {
            match self.run_while_running()? {
                EmuState::Halt(reason) => return Ok(reason),
                EmuState::Pause | EmuState::Running => self.cont(),
            }
        }
    }

    /// Leaves the [`Pause`][EmuState::Pause] state. A breakpoint at the current PC won't fire again until it is passed.
    pub fn cont(&mut self) {
        if self.state == EmuState::Pause {
            self.state = EmuState::Running;
            self.skip_breakpoint = true;
        }
    }

    /// Ends the run from outside the program. Has no effect if the emulator already halted.
    pub fn stop(&mut self) {
        if !matches!(self.state, EmuState::Halt(_)) {
            self.state = EmuState::Halt(HaltReason::User);
        }
    }

    /// Executes a single instruction. Does nothing once the emulator has halted.
    ///
    /// # Errors
    ///
    /// This function will return an error if the instruction faults. The emulator is halted afterwards.
    pub fn step(&mut self) -> EResult<()> {
        if let EmuState::Halt(_) = self.state {
            return Ok(());
        }
        let result = self.step_inner();
        if let Err(err) = &result {
            self.state = EmuState::Halt(HaltReason::Fault);
            self.fault = Some(err.clone());
        }
        result
    }

    fn step_inner(&mut self) -> EResult<()> {
        if let Some(limit) = self.step_limit {
            if self.steps >= limit {
                return Err(EmuError::StepLimitExceeded(limit));
            }
        }
        if let Some(clock) = self.clock.as_mut() {
            clock.tick();
        }
        if log::log_enabled!(log::Level::Trace) {
            log::trace!("{}", self.trace());
        }

        let pc = self.registers.pc;
        // operand bytes are over-read unconditionally and wrap around the end of memory
        let bytes = [
            self.ram.read(pc),
            self.ram.read(pc.wrapping_add(1)),
            self.ram.read(pc.wrapping_add(2)),
        ];
        let instr = match Instruction::from_bytes(bytes) {
            Ok(instr) => instr,
            Err(PlatformError::InvalidOpcode(opcode)) => {
                log::warn!("unknown instruction {:#010b} at pc {:#04x}", opcode, pc);
                self.state = EmuState::Halt(HaltReason::UnknownOpcode { opcode, pc });
                return Ok(());
            }
            Err(PlatformError::InvalidRegister(reg)) => {
                return Err(EmuError::InvalidRegister { reg, pc })
            }
            Err(PlatformError::InvalidInstruction) => {
                unreachable!("decoded instruction failed validation")
            }
        };

        log::debug!(">>> [{:#04x}] {}", pc, instr);
        if self.instr_history.len() == HISTORY_LEN {
            self.instr_history.pop_front();
        }
        self.instr_history.push_back((pc, instr));
        self.steps += 1;

        match self.execute(pc, instr)? {
            Flow::Next => {
                let width = instr.op.width();
                self.registers.pc = pc
                    .checked_add(width)
                    .ok_or(EmuError::PcOutOfBounds { pc, width })?;
            }
            Flow::Jump(addr) => self.registers.pc = addr,
            Flow::Stop => {}
        }
        Ok(())
    }

    fn execute(&mut self, pc: u8, instr: Instruction) -> EResult<Flow> {
        if let Some(op) = AluOp::from_opcode(instr.op) {
            let (dest, right) = match instr.format {
                InstrFormat::RR(a, b) => (a, self.registers.get(b)),
                InstrFormat::R(a) => (a, 0),
                _ => unreachable!("ALU instruction with invalid format"),
            };
            let left = self.registers.get(dest);
            match Alu::execute(op, left, right)
                .map_err(|source| EmuError::Arithmetic { pc, source })?
            {
                AluOutput::Value(v) => self.registers.set(dest, v),
                AluOutput::Flags(fl) => self.registers.fl = fl,
            }
            return Ok(Flow::Next);
        }

        let flow = match (instr.op, instr.format) {
            (Opcode::Nop, InstrFormat::OpOnly) => Flow::Next,
            (Opcode::Hlt, InstrFormat::OpOnly) => {
                self.state = EmuState::Halt(HaltReason::Hlt);
                Flow::Stop
            }
            (Opcode::Ldi, InstrFormat::RI(dest, imm)) => {
                self.registers.set(dest, imm);
                Flow::Next
            }
            (Opcode::Ld, InstrFormat::RR(dest, addr)) => {
                let value = self.ram.read(self.registers.get(addr));
                self.registers.set(dest, value);
                Flow::Next
            }
            (Opcode::St, InstrFormat::RR(addr, src)) => {
                self.ram
                    .write(self.registers.get(addr), self.registers.get(src));
                Flow::Next
            }
            (Opcode::Push, InstrFormat::R(src)) => {
                let value = self.registers.get(src);
                self.push(pc, value)?;
                Flow::Next
            }
            (Opcode::Pop, InstrFormat::R(dest)) => {
                let value = self.pop(pc)?;
                self.registers.set(dest, value);
                Flow::Next
            }
            (Opcode::Prn, InstrFormat::R(src)) => {
                let value = self.registers.get(src);
                writeln!(self.output, "{}", value).map_err(EmuError::output)?;
                self.output.flush().map_err(EmuError::output)?;
                Flow::Next
            }
            (Opcode::Pra, InstrFormat::R(src)) => {
                let value = self.registers.get(src);
                self.output.write_all(&[value]).map_err(EmuError::output)?;
                self.output.flush().map_err(EmuError::output)?;
                Flow::Next
            }
            (Opcode::Call, InstrFormat::R(target)) => {
                let target = self.registers.get(target);
                let width = instr.op.width();
                let ret = pc
                    .checked_add(width)
                    .ok_or(EmuError::PcOutOfBounds { pc, width })?;
                self.push(pc, ret)?;
                Flow::Jump(target)
            }
            (Opcode::Ret, InstrFormat::OpOnly) => Flow::Jump(self.pop(pc)?),
            (Opcode::Int, _) | (Opcode::Iret, _) => {
                return Err(EmuError::Unimplemented {
                    opcode: instr.op as u8,
                    pc,
                })
            }
            (Opcode::Jmp, InstrFormat::R(target)) => Flow::Jump(self.registers.get(target)),
            (
                Opcode::Jeq | Opcode::Jne | Opcode::Jgt | Opcode::Jlt | Opcode::Jle | Opcode::Jge,
                InstrFormat::R(target),
            ) => {
                if self.condition_holds(instr.op) {
                    Flow::Jump(self.registers.get(target))
                } else {
                    Flow::Next
                }
            }
            _ => unreachable!("Invalid instruction found which wasn't caught by validate()"),
        };
        Ok(flow)
    }

    fn condition_holds(&self, op: Opcode) -> bool {
        let fl = self.registers.fl;
        match op {
            Opcode::Jeq => fl.contains(Fl::EQUAL),
            Opcode::Jne => !fl.contains(Fl::EQUAL),
            Opcode::Jgt => fl.contains(Fl::GREATER),
            Opcode::Jge => fl.intersects(Fl::GREATER | Fl::EQUAL),
            Opcode::Jlt => fl.contains(Fl::LESS),
            Opcode::Jle => fl.intersects(Fl::LESS | Fl::EQUAL),
            _ => false,
        }
    }

    /// Decrements SP, then stores `value` at the new top of the stack.
    fn push(&mut self, pc: u8, value: u8) -> EResult<()> {
        let sp = self.registers.sp();
        let sp = sp
            .checked_sub(1)
            .ok_or(EmuError::StackOverflow { pc, sp })?;
        self.registers.set_sp(sp);
        self.ram.write(sp, value);
        Ok(())
    }

    /// Reads the top of the stack, then increments SP.
    fn pop(&mut self, pc: u8) -> EResult<u8> {
        let sp = self.registers.sp();
        let value = self.ram.read(sp);
        let sp = sp
            .checked_add(1)
            .ok_or(EmuError::StackUnderflow { pc, sp })?;
        self.registers.set_sp(sp);
        Ok(value)
    }

    /// Formats PC, FL, the three bytes at PC and every register as one line of hex.
    pub fn trace(&self) -> String {
        let pc = self.registers.pc;
        let mut line = format!(
            "TRACE: {:02X} | {:02X} | {:02X} {:02X} {:02X} |",
            pc,
            self.registers.fl.bits(),
            self.ram.read(pc),
            self.ram.read(pc.wrapping_add(1)),
            self.ram.read(pc.wrapping_add(2)),
        );
        for reg in Register::ALL {
            line.push_str(&format!(" {:02X}", self.registers.get(reg)));
        }
        line
    }

    pub fn debug(&mut self) -> Result<()> {
        Debugger::new(self).repl()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plat::{Register::*, RAM_SIZE, SP_INIT};

    fn assemble(instrs: &[(Opcode, InstrFormat)]) -> Vec<u8> {
        instrs
            .iter()
            .flat_map(|&(op, format)| Instruction { op, format }.to_bytes().unwrap())
            .collect()
    }

    fn run(program: &[u8]) -> (Emulator<Vec<u8>>, EResult<HaltReason>) {
        let mut emu = Emulator::new(program, Vec::new()).unwrap();
        emu.set_step_limit(Some(10_000));
        let result = emu.run_until_halt();
        (emu, result)
    }

    fn output(emu: &Emulator<Vec<u8>>) -> &str {
        std::str::from_utf8(emu.output()).unwrap()
    }

    #[test]
    fn test_mul_and_print() {
        let program = assemble(&[
            (Opcode::Ldi, InstrFormat::RI(R0, 8)),
            (Opcode::Ldi, InstrFormat::RI(R1, 9)),
            (Opcode::Mul, InstrFormat::RR(R0, R1)),
            (Opcode::Prn, InstrFormat::R(R0)),
            (Opcode::Hlt, InstrFormat::OpOnly),
        ]);
        let (emu, result) = run(&program);
        assert_eq!(result.unwrap(), HaltReason::Hlt);
        assert_eq!(output(&emu), "72\n");
        // PC stays on the HLT
        assert_eq!(emu.registers.pc, 10);
    }

    #[test]
    fn test_push_pop() {
        let program = assemble(&[
            (Opcode::Ldi, InstrFormat::RI(R0, 5)),
            (Opcode::Push, InstrFormat::R(R0)),
            (Opcode::Pop, InstrFormat::R(R1)),
            (Opcode::Hlt, InstrFormat::OpOnly),
        ]);
        let (emu, result) = run(&program);
        result.unwrap();
        assert_eq!(emu.registers.get(R1), 5);
        assert_eq!(emu.registers.sp(), SP_INIT);
        assert_eq!(emu.ram.read(SP_INIT - 1), 5);
    }

    #[test]
    fn test_stack_is_lifo() {
        let program = assemble(&[
            (Opcode::Ldi, InstrFormat::RI(R0, 1)),
            (Opcode::Ldi, InstrFormat::RI(R1, 2)),
            (Opcode::Push, InstrFormat::R(R0)),
            (Opcode::Push, InstrFormat::R(R1)),
            (Opcode::Pop, InstrFormat::R(R2)),
            (Opcode::Pop, InstrFormat::R(R3)),
            (Opcode::Hlt, InstrFormat::OpOnly),
        ]);
        let (emu, result) = run(&program);
        result.unwrap();
        assert_eq!(emu.registers.get(R2), 2);
        assert_eq!(emu.registers.get(R3), 1);
        assert_eq!(emu.registers.sp(), SP_INIT);
    }

    #[test]
    fn test_call_ret() {
        // 0: ldi r1 $8 / 3: call r1 / 5: prn r0 / 7: hlt / 8: ldi r0 $42 / 11: ret
        let program = assemble(&[
            (Opcode::Ldi, InstrFormat::RI(R1, 8)),
            (Opcode::Call, InstrFormat::R(R1)),
            (Opcode::Prn, InstrFormat::R(R0)),
            (Opcode::Hlt, InstrFormat::OpOnly),
            (Opcode::Ldi, InstrFormat::RI(R0, 42)),
            (Opcode::Ret, InstrFormat::OpOnly),
        ]);
        let (emu, result) = run(&program);
        assert_eq!(result.unwrap(), HaltReason::Hlt);
        assert_eq!(output(&emu), "42\n");
        assert_eq!(emu.registers.sp(), SP_INIT);
        // return address was PC of the call + 2
        assert_eq!(emu.ram.read(SP_INIT - 1), 5);
        assert_eq!(emu.registers.get(R1), 8);
    }

    #[test]
    fn test_call_reads_target_before_pushing() {
        // call through sp: the target is sp's value before the return address is pushed
        let mut program = assemble(&[(Opcode::Call, InstrFormat::R(Register::SP))]);
        program.resize(RAM_SIZE, 0);
        program[SP_INIT as usize] = Opcode::Hlt as u8;
        let (emu, result) = run(&program);
        assert_eq!(result.unwrap(), HaltReason::Hlt);
        assert_eq!(emu.registers.pc, SP_INIT);
    }

    #[test]
    fn test_store_advances_pc() {
        let program = assemble(&[
            (Opcode::Ldi, InstrFormat::RI(R0, 200)),
            (Opcode::Ldi, InstrFormat::RI(R1, 77)),
            (Opcode::St, InstrFormat::RR(R0, R1)),
            (Opcode::Ld, InstrFormat::RR(R2, R0)),
            (Opcode::Prn, InstrFormat::R(R2)),
            (Opcode::Hlt, InstrFormat::OpOnly),
        ]);
        let (emu, result) = run(&program);
        result.unwrap();
        assert_eq!(emu.ram.read(200), 77);
        assert_eq!(output(&emu), "77\n");
    }

    /// Prints 1 if `jump` is taken after comparing `a` with `b`, 0 otherwise.
    fn branch_program(a: u8, b: u8, jump: Opcode) -> Vec<u8> {
        assemble(&[
            (Opcode::Ldi, InstrFormat::RI(R0, a)),
            (Opcode::Ldi, InstrFormat::RI(R1, b)),
            (Opcode::Ldi, InstrFormat::RI(R2, 20)),
            (Opcode::Ldi, InstrFormat::RI(R3, 1)),
            (Opcode::Cmp, InstrFormat::RR(R0, R1)),
            (jump, InstrFormat::R(R2)),
            (Opcode::Ldi, InstrFormat::RI(R3, 0)),
            // 20
            (Opcode::Prn, InstrFormat::R(R3)),
            (Opcode::Hlt, InstrFormat::OpOnly),
        ])
    }

    #[test]
    fn test_branch_truth_table() {
        let cases = [
            (Opcode::Jeq, [false, true, false]),
            (Opcode::Jne, [true, false, true]),
            (Opcode::Jgt, [false, false, true]),
            (Opcode::Jge, [false, true, true]),
            (Opcode::Jlt, [true, false, false]),
            (Opcode::Jle, [true, true, false]),
        ];
        for (jump, expected) in cases {
            // less, equal, greater
            for ((a, b), taken) in [(1, 2), (2, 2), (3, 2)].into_iter().zip(expected) {
                let (emu, result) = run(&branch_program(a, b, jump));
                result.unwrap();
                let want = if taken { "1\n" } else { "0\n" };
                assert_eq!(output(&emu), want, "{:?} with {} vs {}", jump, a, b);
            }
        }
    }

    #[test]
    fn test_unknown_opcode_halts() {
        let program = [Opcode::Nop as u8, 0xFF, Opcode::Hlt as u8];
        let (emu, result) = run(&program);
        assert_eq!(
            result.unwrap(),
            HaltReason::UnknownOpcode { opcode: 0xFF, pc: 1 }
        );
        assert_eq!(emu.steps(), 1);
    }

    #[test]
    fn test_divide_by_zero_faults() {
        let program = assemble(&[
            (Opcode::Ldi, InstrFormat::RI(R0, 8)),
            (Opcode::Div, InstrFormat::RR(R0, R1)),
            (Opcode::Hlt, InstrFormat::OpOnly),
        ]);
        let (emu, result) = run(&program);
        assert!(matches!(result, Err(EmuError::Arithmetic { pc: 3, .. })));
        assert_eq!(emu.state, EmuState::Halt(HaltReason::Fault));
    }

    #[test]
    fn test_stack_overflow() {
        // ldi sp $0 / push r0
        let program = assemble(&[
            (Opcode::Ldi, InstrFormat::RI(Register::SP, 0)),
            (Opcode::Push, InstrFormat::R(R0)),
        ]);
        let (_, result) = run(&program);
        assert!(matches!(
            result,
            Err(EmuError::StackOverflow { pc: 3, sp: 0 })
        ));
    }

    #[test]
    fn test_stack_underflow() {
        let program = assemble(&[
            (Opcode::Ldi, InstrFormat::RI(Register::SP, 255)),
            (Opcode::Pop, InstrFormat::R(R0)),
        ]);
        let (_, result) = run(&program);
        assert!(matches!(
            result,
            Err(EmuError::StackUnderflow { pc: 3, sp: 255 })
        ));
    }

    #[test]
    fn test_invalid_register_faults() {
        let program = [Opcode::Prn as u8, 9];
        let (_, result) = run(&program);
        assert!(matches!(
            result,
            Err(EmuError::InvalidRegister { reg: 9, pc: 0 })
        ));
    }

    #[test]
    fn test_pc_out_of_bounds() {
        let mut program = vec![Opcode::Nop as u8; RAM_SIZE];
        program[254] = Opcode::Ldi as u8;
        let (_, result) = run(&program);
        assert!(matches!(
            result,
            Err(EmuError::PcOutOfBounds { pc: 254, width: 3 })
        ));
    }

    #[test]
    fn test_interrupts_unimplemented() {
        let program = [Opcode::Iret as u8];
        let (_, result) = run(&program);
        assert!(matches!(
            result,
            Err(EmuError::Unimplemented { opcode: 0b0001_0011, pc: 0 })
        ));
    }

    #[test]
    fn test_step_limit() {
        // jmp r0 spins on address 0 forever
        let program = assemble(&[(Opcode::Jmp, InstrFormat::R(R0))]);
        let mut emu = Emulator::new(&program, Vec::new()).unwrap();
        emu.set_step_limit(Some(50));
        assert!(matches!(
            emu.run_until_halt(),
            Err(EmuError::StepLimitExceeded(50))
        ));
        assert_eq!(emu.steps(), 50);
    }

    #[test]
    fn test_step_after_halt_is_noop() {
        let program = [Opcode::Hlt as u8];
        let (mut emu, result) = run(&program);
        result.unwrap();
        emu.step().unwrap();
        assert_eq!(emu.steps(), 1);
        assert_eq!(emu.state, EmuState::Halt(HaltReason::Hlt));
    }

    #[test]
    fn test_breakpoint_pauses() {
        let program = assemble(&[
            (Opcode::Ldi, InstrFormat::RI(R0, 1)),
            (Opcode::Ldi, InstrFormat::RI(R0, 2)),
            (Opcode::Hlt, InstrFormat::OpOnly),
        ]);
        let mut emu = Emulator::new(&program, Vec::new()).unwrap();
        emu.breakpoints.insert(3);
        assert_eq!(emu.run_while_running().unwrap(), EmuState::Pause);
        assert_eq!(emu.registers.pc, 3);
        assert_eq!(emu.registers.get(R0), 1);
        emu.cont();
        assert_eq!(
            emu.run_while_running().unwrap(),
            EmuState::Halt(HaltReason::Hlt)
        );
        assert_eq!(emu.registers.get(R0), 2);
    }

    #[test]
    fn test_history_records_pc() {
        let program = assemble(&[
            (Opcode::Ldi, InstrFormat::RI(R0, 1)),
            (Opcode::Hlt, InstrFormat::OpOnly),
        ]);
        let (emu, _) = run(&program);
        let pcs: Vec<u8> = emu.instr_history.iter().map(|(pc, _)| *pc).collect();
        assert_eq!(pcs, [0, 3]);
    }

    #[test]
    fn test_trace_line() {
        let program = assemble(&[(Opcode::Ldi, InstrFormat::RI(R0, 8))]);
        let emu = Emulator::new(&program, Vec::new()).unwrap();
        assert_eq!(
            emu.trace(),
            "TRACE: 00 | 00 | 82 00 08 | 00 00 00 00 00 00 00 F4"
        );
    }

    #[test]
    fn test_fault_while_paused_is_not_lost() {
        let program = assemble(&[
            (Opcode::Div, InstrFormat::RR(R0, R1)),
            (Opcode::Hlt, InstrFormat::OpOnly),
        ]);
        let mut emu = Emulator::new(&program, Vec::new()).unwrap();
        emu.state = EmuState::Pause;
        // stepping from the debugger surfaces the fault once...
        assert!(matches!(emu.step(), Err(EmuError::Arithmetic { pc: 0, .. })));
        assert_eq!(emu.state, EmuState::Halt(HaltReason::Fault));
        // ...and resuming afterwards must still report it
        emu.cont();
        assert!(matches!(
            emu.run_while_running(),
            Err(EmuError::Arithmetic { pc: 0, .. })
        ));
        assert!(matches!(
            emu.run_until_halt(),
            Err(EmuError::Arithmetic { pc: 0, .. })
        ));
        assert!(matches!(emu.fault(), Some(EmuError::Arithmetic { .. })));
    }

    #[test]
    fn test_stop_is_not_a_fault() {
        let program = assemble(&[
            (Opcode::Ldi, InstrFormat::RI(R0, 1)),
            (Opcode::Prn, InstrFormat::R(R0)),
            (Opcode::Hlt, InstrFormat::OpOnly),
        ]);
        let mut emu = Emulator::new(&program, Vec::new()).unwrap();
        emu.breakpoints.insert(3);
        assert_eq!(emu.run_while_running().unwrap(), EmuState::Pause);
        emu.stop();
        assert_eq!(emu.state, EmuState::Halt(HaltReason::User));
        assert_ne!(HaltReason::User, HaltReason::Hlt);
        assert!(emu.fault().is_none());
        assert_eq!(emu.run_until_halt().unwrap(), HaltReason::User);
        assert_eq!(emu.steps(), 1);
        assert_eq!(output(&emu), "");

        // stopping after a fault keeps the fault
        let mut emu = Emulator::new(&[Opcode::Div as u8, 0, 1], Vec::new()).unwrap();
        assert!(emu.step().is_err());
        emu.stop();
        assert_eq!(emu.state, EmuState::Halt(HaltReason::Fault));
    }

    #[test]
    fn test_push_pop_all_register_pairs() {
        for src in Register::ALL {
            for dest in Register::ALL {
                let mut instrs = vec![];
                if src != Register::SP {
                    instrs.push((Opcode::Ldi, InstrFormat::RI(src, 0x5A)));
                }
                instrs.extend([
                    (Opcode::Push, InstrFormat::R(src)),
                    (Opcode::Pop, InstrFormat::R(dest)),
                    (Opcode::Hlt, InstrFormat::OpOnly),
                ]);
                let (emu, result) = run(&assemble(&instrs));
                assert_eq!(result.unwrap(), HaltReason::Hlt);

                // pushing sp stores its value from before the decrement
                let pushed = if src == Register::SP { SP_INIT } else { 0x5A };
                assert_eq!(emu.ram.read(SP_INIT - 1), pushed, "push {} pop {}", src, dest);
                if dest == Register::SP {
                    // popping into sp overwrites the incremented stack pointer
                    assert_eq!(emu.registers.sp(), pushed, "push {} pop {}", src, dest);
                } else {
                    assert_eq!(emu.registers.get(dest), pushed, "push {} pop {}", src, dest);
                    assert_eq!(emu.registers.sp(), SP_INIT, "push {} pop {}", src, dest);
                }
            }
        }
    }

    #[test]
    fn test_call_ret_any_target() {
        // 0: ldi rN target / 3: call rN / 5: hlt
        // the return address is pushed to SP_INIT - 1, so a stub there would be clobbered
        for target in (6..=u8::MAX).filter(|&t| t != SP_INIT - 1) {
            let reg = Register::ALL[target as usize % 7];
            let mut program = assemble(&[
                (Opcode::Ldi, InstrFormat::RI(reg, target)),
                (Opcode::Call, InstrFormat::R(reg)),
                (Opcode::Hlt, InstrFormat::OpOnly),
            ]);
            program.resize(RAM_SIZE, 0);
            program[target as usize] = Opcode::Ret as u8;

            let (emu, result) = run(&program);
            assert_eq!(result.unwrap(), HaltReason::Hlt, "target {:#04x}", target);
            assert_eq!(emu.registers.pc, 5, "target {:#04x}", target);
            assert_eq!(emu.registers.sp(), SP_INIT, "target {:#04x}", target);
            let pcs: Vec<u8> = emu.instr_history.iter().map(|(pc, _)| *pc).collect();
            assert_eq!(pcs, [0, 3, target, 5]);
        }
    }
}
