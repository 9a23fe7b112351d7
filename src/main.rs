use std::{io, path::PathBuf};

use anyhow::{anyhow, Result};
use clap::{ArgAction, Parser};
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};

use ls8::{
    emu::emulator::{EmuState, Emulator, HaltReason},
    loader,
    plat::parse_addr,
};

/// Runs an LS-8 program image.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Program image: one 8-digit binary byte per line, `#` comments allowed
    program: PathBuf,
    /// Log a trace line (PC, FL, next three bytes, registers) before every instruction
    #[arg(long)]
    trace: bool,
    /// Start in the debug REPL instead of running
    #[arg(long)]
    debug: bool,
    /// Pause in the debug REPL when PC reaches this address (decimal or 0x hex)
    #[arg(short, long = "break", value_parser = parse_addr)]
    breakpoints: Vec<u8>,
    /// Fail the run after this many instructions
    #[arg(long)]
    max_steps: Option<u64>,
    /// Throttle execution to this many instructions per second
    #[arg(long)]
    clock_hz: Option<f64>,
    /// Increase log verbosity
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn log_level(&self) -> LevelFilter {
        #[cfg(debug_assertions)]
        let base = LevelFilter::Trace;
        #[cfg(not(debug_assertions))]
        let base = LevelFilter::Info;
        if self.trace {
            return LevelFilter::Trace;
        }
        match self.verbose {
            0 => base,
            1 => base.max(LevelFilter::Debug),
            _ => LevelFilter::Trace,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    TermLogger::init(
        args.log_level(),
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )?;

    let program = loader::load_file(&args.program)?;
    let mut emu = Emulator::new(&program, io::stdout())?;
    emu.set_step_limit(args.max_steps);
    if let Some(rate) = args.clock_hz {
        emu.set_clock_rate(rate)?;
    }
    emu.breakpoints.extend(args.breakpoints.iter().copied());
    if args.debug {
        emu.state = EmuState::Pause;
    }

    let reason = loop {
        match emu.run_while_running()? {
            EmuState::Halt(reason) => break reason,
            EmuState::Pause => {
                emu.debug()?;
                // the REPL can exit without choosing (e.g. on EOF)
                emu.cont();
            }
            EmuState::Running => {}
        }
    };
    match reason {
        HaltReason::UnknownOpcode { opcode, pc } => {
            log::warn!("stopped on unknown instruction {:#010b} at {:#04x}", opcode, pc)
        }
        HaltReason::Fault => {
            return Err(emu
                .fault()
                .cloned()
                .map_or_else(|| anyhow!("run ended on a fault"), anyhow::Error::from))
        }
        HaltReason::User => {
            log::info!("stopped from the debugger after {} instructions", emu.steps())
        }
        HaltReason::Hlt => log::info!("halted after {} instructions", emu.steps()),
    }
    Ok(())
}
