use clap::{Parser, Subcommand};
use memmap2::Mmap;
use scid_decompiler::{CompiledUnit, DecompilerConfig, StaticLookup, SymbolStore};
use scid_ir::instruction::Instruction;
use scid_isa::{Operand, OperandKind, Version};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[cfg(target_env = "msvc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "scid", about = "SCI script bytecode decompiler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the instructions of one function
    Disasm {
        /// Raw code buffer of a script unit
        input: PathBuf,
        /// Function entry offset (decimal or 0x-prefixed hex)
        #[arg(short, long, value_parser = parse_offset)]
        entry: u32,
        /// Opcode table to decode with
        #[arg(long, default_value = "sci0")]
        version: Version,
    },
    /// Reconstruct a script unit described by a YAML manifest
    Decompile {
        /// Manifest naming the code file and the unit's tables
        manifest: PathBuf,
        /// Decompiler configuration (YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Override the configured opcode table
        #[arg(long)]
        version: Option<Version>,
        /// Decompile functions one after another
        #[arg(long)]
        sequential: bool,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Write the companion symbol tables, with new bindings, here
        #[arg(long)]
        symbols_out: Option<PathBuf>,
    },
}

/// Everything `decompile` needs besides the code bytes.
#[derive(Deserialize)]
struct Manifest {
    /// Code buffer, relative to the manifest.
    code: PathBuf,
    unit: CompiledUnit,
    #[serde(default)]
    lookup: StaticLookup,
    /// Known export names by unit, then export index.
    #[serde(default)]
    symbols: BTreeMap<u16, BTreeMap<u16, String>>,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Disasm {
            input,
            entry,
            version,
        } => cmd_disasm(&input, entry, version),
        Commands::Decompile {
            manifest,
            config,
            version,
            sequential,
            output,
            symbols_out,
        } => {
            let mut config = match config {
                Some(path) => read_yaml::<DecompilerConfig>(&path),
                None => DecompilerConfig::default(),
            };
            if let Some(v) = version {
                config.version = v;
            }
            if sequential {
                config.parallel = false;
            }
            cmd_decompile(
                &manifest,
                &config,
                output.as_deref(),
                symbols_out.as_deref(),
            )
        }
    }
}

fn parse_offset(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid offset '{s}': {e}"))
}

fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("Error: {msg}");
    std::process::exit(1);
}

fn read_yaml<T: for<'de> Deserialize<'de>>(path: &Path) -> T {
    let text = fs::read_to_string(path)
        .unwrap_or_else(|e| fail(format_args!("reading {}: {e}", path.display())));
    serde_yaml::from_str(&text)
        .unwrap_or_else(|e| fail(format_args!("parsing {}: {e}", path.display())))
}

fn map_file(path: &Path) -> Mmap {
    let file =
        File::open(path).unwrap_or_else(|e| fail(format_args!("opening {}: {e}", path.display())));
    // The mapping is read-only and dropped before the process exits.
    match unsafe { Mmap::map(&file) } {
        Ok(map) => map,
        Err(e) => fail(format_args!("mapping {}: {e}", path.display())),
    }
}

fn cmd_disasm(path: &Path, entry: u32, version: Version) {
    let code = map_file(path);
    let instructions = scid_decompiler::decode_function(version, &code, entry)
        .unwrap_or_else(|e| fail(e));

    println!("# {} ({version}), entry {entry:#06x}", path.display());
    for insn in &instructions {
        let operands: Vec<String> = insn
            .operands
            .iter()
            .map(|op| format_operand(insn, op))
            .collect();
        let ops = if operands.is_empty() {
            String::new()
        } else {
            format!(" {}", operands.join(", "))
        };
        println!("    {:#06x}  {}{ops}", insn.address, insn.mnemonic());
    }
}

fn format_operand(insn: &Instruction, op: &Operand) -> String {
    match op {
        Operand::Value {
            kind: OperandKind::Label,
            value,
        } => match insn.target {
            Some(target) => format!("-> {target:#06x}"),
            None => format!("{value:+}"),
        },
        Operand::Value { value, .. } => format!("{value}"),
        Operand::Text { text, .. } => format!("\"{text}\""),
    }
}

fn cmd_decompile(
    path: &Path,
    config: &DecompilerConfig,
    output: Option<&Path>,
    symbols_out: Option<&Path>,
) {
    let Manifest {
        code,
        mut unit,
        lookup,
        symbols,
    } = read_yaml(path);
    let code_path = path.parent().unwrap_or(Path::new(".")).join(code);
    unit.code = map_file(&code_path).to_vec();

    let store = SymbolStore::from(symbols);
    let script = scid_decompiler::reconstruct(&unit, &lookup, &store, config)
        .unwrap_or_else(|e| fail(format_args!("unit {}: {e}", unit.number)));

    let degraded = script.bodies().filter(|b| !b.is_structured()).count();
    if degraded > 0 {
        log::warn!(
            "unit {}: {degraded} function(s) not fully structured",
            unit.number
        );
    }

    let text = serde_yaml::to_string(&script).unwrap_or_else(|e| fail(e));
    match output {
        Some(out) => fs::write(out, text)
            .unwrap_or_else(|e| fail(format_args!("writing {}: {e}", out.display()))),
        None => print!("{text}"),
    }

    if let Some(out) = symbols_out {
        let tables = serde_yaml::to_string(&store.snapshot()).unwrap_or_else(|e| fail(e));
        fs::write(out, tables)
            .unwrap_or_else(|e| fail(format_args!("writing {}: {e}", out.display())));
    }
}
