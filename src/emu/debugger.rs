use std::{cell::RefCell, io::Write};

use anyhow::Result;
use easy_repl::{command, repl::LoopStatus, CommandStatus, Repl};

use crate::plat::{parse_addr, Register};

use super::emulator::{EmuState, Emulator};

pub struct Debugger<'b, W: Write> {
    pub emu: RefCell<&'b mut Emulator<W>>,
}

impl<'b, W: Write> Debugger<'b, W> {
    pub fn new(emu: &'b mut Emulator<W>) -> Self {
        Self {
            emu: RefCell::new(emu),
        }
    }

    pub fn repl(&self) -> Result<()> {
        let mut repl = Repl::builder()
            .description("LS-8 Debug REPL")
            .add(
                "c",
                command! {
                    "Continue execution",
                    () => || {
                        self.emu.borrow_mut().cont();
                        Ok(CommandStatus::Quit)
                    }
                },
            )
            .add(
                "s",
                command! {
                    "Step one instruction",
                    () => || {
                        let mut emu = self.emu.borrow_mut();
                        emu.step()?;
                        eprintln!("{}", emu.trace());
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "bt",
                command! {
                    "Print last X instructions executed",
                    (x:usize) => |x| {
                        let emu = self.emu.borrow();
                        for (pc, instr) in emu.instr_history.iter().rev().take(x).rev() {
                            eprintln!("[{:02X}] {}", pc, instr);
                        }
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "pr",
                command! {
                    "Print the value of all registers",
                    () => || {
                        let emu = self.emu.borrow();
                        for reg in Register::ALL {
                            eprintln!("{}={:02X}", reg, emu.registers.get(reg));
                        }
                        eprintln!("pc={:02X}", emu.registers.pc);
                        eprintln!("fl={:?}", emu.registers.fl);
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "peek",
                command! {
                    "Peek a value from memory",
                    (addr:String) => |addr: String| {
                        let emu = self.emu.borrow();
                        let addr = parse_addr(&addr)?;
                        let val = emu.ram.read(addr);
                        eprintln!("{:02X}={:02X}", addr, val);
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "b",
                command! {
                    "Set a breakpoint at an address",
                    (addr:String) => |addr: String| {
                        let addr = parse_addr(&addr)?;
                        self.emu.borrow_mut().breakpoints.insert(addr);
                        eprintln!("breakpoint at {:02X}", addr);
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "halt",
                command! {
                    "Halt execution",
                    () => || {
                        self.emu.borrow_mut().stop();
                        Ok(CommandStatus::Quit)
                    }
                },
            )
            .build()?;
        eprintln!("LS-8 Debug REPL");
        'repl: loop {
            eprintln!();
            {
                let emu = self.emu.borrow();
                if let Some((pc, instr)) = emu.instr_history.back() {
                    eprintln!("Last instruction:\n[pc={:02X}] --> {}", pc, instr);
                }
                eprintln!("{}", emu.trace());
            }

            let status = repl.next()?;
            if let LoopStatus::Break = status {
                break 'repl;
            }
            {
                let emu = self.emu.borrow();
                if let EmuState::Halt(_) = emu.state {
                    break 'repl;
                }
            }
        }
        Ok(())
    }
}
