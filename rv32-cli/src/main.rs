use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};

use clap::Parser;
use goblin::elf::program_header::PT_LOAD;
use log::info;

use rv32core::{Bus, Config, CpuView, Exception, Rv};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to write the memory signature to, in the format riscv-tests' target-side harness
    /// expects (one 32-bit little-endian word per line, hex, no `0x` prefix).
    #[arg(long, short)]
    signature: Option<String>,

    /// Maximum number of instructions to retire before giving up on a guest that never executes
    /// an ECALL.
    #[arg(long, default_value_t = 100_000_000)]
    max_instructions: u64,

    /// ELF file to run.
    elf: String,
}

/// A flat, sparsely-backed guest address space plus an ECALL-halts syscall convention. Good
/// enough for a benchmark/conformance-suite harness; a real embedder would back this with an
/// MMU and a richer syscall shim.
struct FlatMemory {
    bytes: HashMap<u32, u8>,
    halted: bool,
}

impl FlatMemory {
    fn new() -> Self {
        Self { bytes: HashMap::new(), halted: false }
    }

    fn load(&mut self, addr: u32, data: &[u8]) {
        for (i, &byte) in data.iter().enumerate() {
            self.bytes.insert(addr.wrapping_add(i as u32), byte);
        }
    }

    fn read_byte(&self, addr: u32) -> u8 {
        *self.bytes.get(&addr).unwrap_or(&0)
    }

    fn write_byte(&mut self, addr: u32, value: u8) {
        self.bytes.insert(addr, value);
    }
}

impl Bus for FlatMemory {
    fn mem_ifetch(&mut self, addr: u32) -> u32 {
        self.mem_read_w(addr)
    }

    fn mem_read_b(&mut self, addr: u32) -> u8 {
        self.read_byte(addr)
    }

    fn mem_read_s(&mut self, addr: u32) -> u16 {
        u16::from_le_bytes([self.read_byte(addr), self.read_byte(addr.wrapping_add(1))])
    }

    fn mem_read_w(&mut self, addr: u32) -> u32 {
        u32::from_le_bytes([
            self.read_byte(addr),
            self.read_byte(addr.wrapping_add(1)),
            self.read_byte(addr.wrapping_add(2)),
            self.read_byte(addr.wrapping_add(3)),
        ])
    }

    fn mem_write_b(&mut self, addr: u32, value: u8) {
        self.write_byte(addr, value);
    }

    fn mem_write_s(&mut self, addr: u32, value: u16) {
        for (i, byte) in value.to_le_bytes().into_iter().enumerate() {
            self.write_byte(addr.wrapping_add(i as u32), byte);
        }
    }

    fn mem_write_w(&mut self, addr: u32, value: u32) {
        for (i, byte) in value.to_le_bytes().into_iter().enumerate() {
            self.write_byte(addr.wrapping_add(i as u32), byte);
        }
    }

    fn on_ecall(&mut self, mut cpu: CpuView<'_>, pc: u32, _inst: u32) {
        info!("ecall at pc={pc:#010x}, halting");
        self.halted = true;
        cpu.raise(Exception::EnvironmentCall);
    }

    fn on_ebreak(&mut self, mut cpu: CpuView<'_>, pc: u32, _inst: u32) {
        info!("ebreak at pc={pc:#010x}, halting");
        self.halted = true;
        cpu.raise(Exception::Breakpoint);
    }
}

fn main() -> std::io::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut buf = Vec::new();
    File::open(&args.elf)?.read_to_end(&mut buf)?;
    let elf = goblin::elf::Elf::parse(&buf).expect("failed to parse elf file");

    let mut memory = FlatMemory::new();
    for header in elf.program_headers.iter().filter(|h| h.p_type == PT_LOAD) {
        memory.load(header.p_paddr as u32, &buf[header.file_range()]);
    }

    let config = Config {
        reset_vector: elf.entry as u32,
        ..Config::default()
    };
    let mut rv = Rv::with_config(memory, config);

    let mut retired = 0u64;
    while retired < args.max_instructions && !rv.userdata().halted {
        retired += rv.step(4096);
    }

    if retired >= args.max_instructions && !rv.userdata().halted {
        eprintln!("warning: instruction budget exhausted before halt");
    }

    if let Some(path) = args.signature {
        let mut signature_start = None;
        let mut signature_end = None;
        for sym in elf.syms.iter() {
            let Some(name) = elf.strtab.get_at(sym.st_name) else {
                continue;
            };
            if name == "begin_signature" {
                signature_start = Some(sym.st_value as u32);
            } else if name == "end_signature" {
                signature_end = Some(sym.st_value as u32);
            }
        }
        let signature_start = signature_start.expect("missing symbol `begin_signature`");
        let signature_end = signature_end.expect("missing symbol `end_signature`");
        assert!(signature_start <= signature_end);

        let mut file = File::create(path)?;
        let mut addr = signature_start;
        while addr < signature_end {
            let word = rv.userdata_mut().mem_read_w(addr);
            writeln!(file, "{word:08x}")?;
            addr = addr.wrapping_add(4);
        }
    }

    Ok(())
}
