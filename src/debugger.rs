use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use directories_next::ProjectDirs;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use thiserror::Error;
use tracing::{debug, info};

use crate::*;

const DEFAULT_LIST_COUNT: u32 = 8;
const DEFAULT_DUMP_COUNT: u32 = 16;

#[derive(Debug, Error)]
pub enum DebuggerError {
    #[error("line editor: {0}")]
    Readline(#[from] ReadlineError),

    #[error("could not install Ctrl-C handler: {0}")]
    Ctrlc(#[from] ctrlc::Error),
}

struct Breakpoint {
    id  : u64,
    unit: UnitId,
    pc  : u32,
}

pub struct Debugger {
    alive: bool,
    machine: Machine,
    ctrlc_count: u32,

    // Ctrl-C help
    comms: SystemCommunication,

    breakpoint_id: u64,
    breakpoints: HashMap<(UnitId, u32), Breakpoint>,
}

impl Debugger {
    pub fn new(machine: Machine) -> Debugger {
        let comms = machine.comms().clone();

        Debugger {
            alive: true,
            machine: machine,
            ctrlc_count: 0,
            comms: comms,
            breakpoint_id: 0,
            breakpoints: HashMap::new(),
        }
    }

    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    pub fn run(&mut self) -> Result<(), DebuggerError> {
        let comms = self.comms.clone();
        ctrlc::set_handler(move || {
            println!("Break!");
            comms.break_run();
        })?;

        let mut rl = DefaultEditor::new()?;

        let history = history_path();
        if let Some(path) = history.as_ref() {
            if rl.load_history(path).is_err() {
                info!(target: "DEBUGGER", "no history at {}", path.display());
            }
        }

        let mut lastline = String::from("");
        while self.alive {
            let prompt = format!("<CPU:${:08X} RCP:${:08X}>@ ", self.machine.cpu().pc(), self.machine.rcp().pc());
            let readline = rl.readline(&prompt);

            match readline {
                Ok(line) => {
                    let mut line_str = String::from(line.trim());

                    // an empty line repeats the last command
                    if line_str.is_empty() {
                        line_str = lastline.clone();
                    }

                    lastline = line_str.clone();

                    if !line_str.is_empty() {
                        rl.add_history_entry(line_str.as_str())?;
                        if let Err(err) = self.handle_line(line_str.as_str()) {
                            println!("error: {}", err);
                        }
                    }

                    self.ctrlc_count = 0;
                },

                Err(ReadlineError::Interrupted) => {
                    self.ctrlc_count += 1;
                    if self.ctrlc_count == 3 {
                        println!("Exiting...");
                        break;
                    } else if self.ctrlc_count == 1 {
                        println!("Ctrl-C, press twice more to exit");
                    }
                },

                Err(ReadlineError::Eof) => {
                    println!("Exiting...");
                    break;
                },

                Err(err) => {
                    return Err(err.into());
                },
            };
        }

        if let Some(path) = history.as_ref() {
            rl.save_history(path)?;
        }

        Ok(())
    }

    pub fn handle_line(&mut self, line: &str) -> Result<(), String> {
        for line in line.split(';') {
            let parts = line.split_whitespace().collect::<Vec<&str>>();

            if parts.is_empty() { continue; }

            debug!(target: "DEBUGGER", "command {:?}", parts);

            match parts[0] {
                "r" | "ru" | "run"          => self.run_rounds(&parts)?,
                "s" | "st" | "ste" | "step" => self.step(&parts)?,
                "res" | "rese" | "reset"    => self.reset(&parts)?,
                "regs" | "rd"               => self.dump_regs(&parts)?,
                "l" | "li" | "list"         => self.list(&parts)?,
                "b" | "br" | "bre" | "brea"
                 | "break" | "bp"           => self.breakpoint(&parts)?,
                "db" | "del" | "dbr"
                 | "dbrea" | "dbreak"       => self.delete_breakpoint(&parts)?,
                "w" | "wr" | "write"        => self.write_memory(&parts)?,
                "m" | "mem"                 => self.dump_memory(&parts)?,
                "f" | "faults"              => self.faults(&parts)?,
                "fp" | "fingerprint"        => self.fingerprint(&parts)?,
                "q" | "quit" | "exit"       => self.alive = false,

                _ => {
                    return Err(format!("unsupported debugger command \"{}\"", parts[0]));
                },
            };
        }

        Ok(())
    }

    fn run_rounds(&mut self, parts: &[&str]) -> Result<(), String> {
        let limit = match parts.get(1) {
            Some(s) => Some(parse_int_u32(s)? as u64),
            None => None,
        };

        self.comms.break_rounds.store(false, Ordering::SeqCst);

        let mut rounds = 0u64;
        while limit.map_or(true, |limit| rounds < limit) {
            if self.comms.break_rounds.swap(false, Ordering::SeqCst) {
                break;
            }

            rounds += 1;
            if self.round() {
                break;
            }
        }

        println!("ran {} round(s)", rounds);
        self.print_next_instructions();
        Ok(())
    }

    fn step(&mut self, parts: &[&str]) -> Result<(), String> {
        let count = match parts.get(1) {
            Some(s) => parse_int_u32(s)?,
            None => 1,
        };

        for _ in 0..count {
            // Ctrl-C
            if self.comms.break_rounds.swap(false, Ordering::SeqCst) {
                break;
            }

            if self.round() {
                break;
            }
        }

        self.print_next_instructions();
        Ok(())
    }

    // run one round, returns true when execution should stop. the round always completes
    // so the 3:2 interleave is kept, a breakpoint on any instruction executed in it stops after
    fn round(&mut self) -> bool {
        let breakpoints = &self.breakpoints;
        let mut hit: Option<u64> = None;

        self.machine.run_round_with(|id, pc| {
            if hit.is_none() {
                hit = breakpoints.get(&(id, pc)).map(|bp| bp.id);
            }
        });

        let break_hit = self.machine.take_break();
        if break_hit {
            println!("BREAK instruction executed");
        }

        if let Some(bp) = hit.and_then(|id| self.breakpoints.values().find(|bp| bp.id == id)) {
            println!("Breakpoint {} ({} ${:08X}) hit", bp.id, bp.unit, bp.pc);
            return true;
        }

        break_hit
    }

    fn print_next_instructions(&self) {
        for id in [UnitId::Cpu, UnitId::Rcp] {
            let unit = self.machine.unit(id);
            match unit.disassemble(self.machine.memory()) {
                Ok(text) => println!("{} ${:08X}: {}", id, unit.pc(), text),
                Err(fault) => println!("{}", fault),
            }
        }
    }

    fn reset(&mut self, _: &[&str]) -> Result<(), String> {
        self.machine.reset();
        Ok(())
    }

    fn dump_regs(&mut self, parts: &[&str]) -> Result<(), String> {
        let id = parse_unit(parts.get(1).copied())?;
        let unit = self.machine.unit(id);
        let regs = unit.regs().regs();

        for k in 0..8 {
            for j in 0..4 {
                let r = k*4 + j;
                print!("R{:02}(${:>4}): ${:08X}_{:08X} ", r, RegisterFile::abi_name(r), regs[r] >> 32, regs[r] & 0xFFFF_FFFF);
            }
            println!("");
        }

        let mode = unit.mode();
        println!("mode: {}-bit {}", if mode.sixty_four_bit { 64 } else { 32 }, if mode.kernel { "kernel" } else { "user" });

        match unit.pending_branch() {
            Some(target) => println!("{} PC: ${:08X} (branch to ${:08X} pending)", id, unit.pc(), target),
            None => println!("{} PC: ${:08X}", id, unit.pc()),
        }

        Ok(())
    }

    fn list(&mut self, parts: &[&str]) -> Result<(), String> {
        let id = parse_unit(parts.get(1).copied())?;
        let count = match parts.get(2) {
            Some(s) => parse_int_u32(s)?,
            None => DEFAULT_LIST_COUNT,
        };

        let pc = self.machine.unit(id).pc();
        for i in 0..count {
            let index = pc.wrapping_add(i);
            match self.machine.memory().read_u32(index) {
                Ok(word) => {
                    let marker = if i == 0 { ">" } else { " " };
                    println!("{}${:08X}: {:08X}  {}", marker, index, word, decode_to_text(word));
                },
                Err(err) => return Err(err.to_string()),
            }
        }

        Ok(())
    }

    fn breakpoint(&mut self, parts: &[&str]) -> Result<(), String> {
        if parts.len() == 1 {
            let mut all = self.breakpoints.values().collect::<Vec<_>>();
            all.sort_by_key(|bp| bp.id);
            for bp in all {
                println!("{}: {} ${:08X}", bp.id, bp.unit, bp.pc);
            }
            return Ok(());
        }

        let pc = parse_int_u32(parts[1])?;
        let unit = parse_unit(parts.get(2).copied())?;

        let id = self.breakpoint_id;
        self.breakpoint_id += 1;

        self.breakpoints.insert((unit, pc), Breakpoint {
            id  : id,
            unit: unit,
            pc  : pc,
        });

        println!("breakpoint {} set at {} ${:08X}", id, unit, pc);
        Ok(())
    }

    fn delete_breakpoint(&mut self, parts: &[&str]) -> Result<(), String> {
        if parts.len() != 2 {
            return Err(format!("usage: db [breakpoint id]"));
        }

        let search_id = parse_int_u32(parts[1])? as u64;

        let found_key = self.breakpoints.iter()
            .find(|(_, bp)| bp.id == search_id)
            .map(|(key, _)| *key);

        match found_key {
            Some(key) => {
                self.breakpoints.remove(&key);
                Ok(())
            },
            None => Err(format!("breakpoint id {} not valid", search_id)),
        }
    }

    fn write_memory(&mut self, parts: &[&str]) -> Result<(), String> {
        if parts.len() != 3 {
            return Err(format!("usage: w [index] [value]"));
        }

        let index = parse_int_u32(parts[1])?;
        let value = parse_int_u32(parts[2])?;

        self.machine.memory_mut().write_u32(value, index).map_err(|err| err.to_string())
    }

    fn dump_memory(&mut self, parts: &[&str]) -> Result<(), String> {
        let index = match parts.get(1) {
            Some(s) => parse_int_u32(s)?,
            None => return Err(format!("usage: m [index] [count]")),
        };

        let count = match parts.get(2) {
            Some(s) => parse_int_u32(s)?,
            None => DEFAULT_DUMP_COUNT,
        };

        let block = self.machine.memory().read_block(index, count).map_err(|err| err.to_string())?;
        for (row, words) in block.chunks(4).enumerate() {
            print!("${:08X}:", index.wrapping_add((row * 4) as u32));
            for word in words {
                print!(" {:08X}", word);
            }
            println!("");
        }

        Ok(())
    }

    fn faults(&mut self, _: &[&str]) -> Result<(), String> {
        let diagnostics = self.machine.diagnostics();

        for id in [UnitId::Cpu, UnitId::Rcp] {
            for kind in InstructionFault::ALL {
                println!("{} {:>20}: {}", id, kind.to_string(), diagnostics.count(id, kind));
            }
        }

        if let Some(fault) = diagnostics.last_fault() {
            println!("last: {}", fault);
        }

        Ok(())
    }

    fn fingerprint(&mut self, _: &[&str]) -> Result<(), String> {
        println!("${:016X} after {} round(s)", self.machine.fingerprint(), self.machine.total_rounds());
        Ok(())
    }
}

fn history_path() -> Option<PathBuf> {
    let dirs = ProjectDirs::from("", "", "n64-interp")?;
    let dir = dirs.data_dir();
    fs::create_dir_all(dir).ok()?;
    Some(dir.join("history.txt"))
}

fn parse_unit(s: Option<&str>) -> Result<UnitId, String> {
    match s {
        None | Some("cpu") | Some("c") => Ok(UnitId::Cpu),
        Some("rcp") | Some("r") => Ok(UnitId::Rcp),
        Some(other) => Err(format!("unknown unit \"{}\" (cpu or rcp)", other)),
    }
}

/// Parse `$`-prefixed or `0x`-prefixed hexadecimal, or decimal.
pub fn parse_int(s: &str) -> Result<i64, String> {
    let result = if let Some(hex) = s.strip_prefix('$') {
        i64::from_str_radix(hex, 16)
    } else if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16)
    } else {
        s.parse::<i64>()
    };

    result.map_err(|err| format!("invalid number \"{}\": {}", s, err))
}

/// `parse_int` limited to the 32-bit range, for word indexes and PCs.
pub fn parse_int_u32(s: &str) -> Result<u32, String> {
    let v = parse_int(s)?;
    u32::try_from(v).map_err(|_| format!("{} does not fit in 32 bits", s))
}
