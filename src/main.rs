use std::env;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, IsTerminal};
use std::path::{Path, PathBuf};

use a816_core::{AssembleOptions, Block, MappingMode, RenderOptions};
use a816_ips::{IpsWriter, SfcWriter, read_patch, write_blocks};
use a816_isa65816::{AddressingMode, DecodedOpcode, decode_opcode, format_instruction};
use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use tracing::{Level, info};

#[derive(Debug, Parser)]
#[command(
    name = "a816",
    version,
    about = "Cross-assembler for the 65C816 producing IPS patches and SNES images",
    long_about = None,
    after_help = "Examples:\n  a816 assemble hack.s -o hack.ips\n  a816 assemble hack.s -f sfc -o game.sfc -m high\n  a816 inspect hack.ips --disassemble"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Assemble a source file into an IPS patch or a ROM image.
    Assemble(AssembleArgs),
    /// List the records of an IPS patch.
    Inspect(InspectArgs),
}

#[derive(Debug, Parser)]
struct AssembleArgs {
    /// Assembly source file.
    #[arg(value_name = "INPUT")]
    input: PathBuf,
    /// Output file path.
    #[arg(short = 'o', long = "output", value_name = "OUTPUT", default_value = "a.out")]
    output: PathBuf,
    /// Output format.
    #[arg(short = 'f', long = "format", value_enum, default_value_t = OutputFormat::Ips)]
    format: OutputFormat,
    /// Cartridge address mapping.
    #[arg(short = 'm', long = "mapping", value_enum, default_value_t = Mapping::Low)]
    mapping: Mapping,
    /// Offset every output address by the 0x200 byte copier header.
    #[arg(long)]
    copier_header: bool,
    /// Print every scope's symbols to stdout after assembling.
    #[arg(long)]
    dump_symbols: bool,
    /// Write the symbol tables as JSON.
    #[arg(long, value_name = "FILE")]
    symbols_json: Option<PathBuf>,
    /// Pre-defined symbols (repeatable), bound as text in the root scope.
    #[arg(short = 'D', long = "define", value_name = "KEY=VALUE", value_parser = parse_define)]
    defines: Vec<(String, String)>,
    /// Log every pass at debug level.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Parser)]
struct InspectArgs {
    /// IPS patch to read.
    #[arg(value_name = "PATCH")]
    patch: PathBuf,
    /// Decode each record as 65C816 instructions. Immediates are read as
    /// 8-bit unless --m16 or --x16 is given.
    #[arg(long)]
    disassemble: bool,
    /// Read accumulator immediates as 16-bit (M flag clear).
    #[arg(long, requires = "disassemble")]
    m16: bool,
    /// Read index register immediates as 16-bit (X flag clear).
    #[arg(long, requires = "disassemble")]
    x16: bool,
}

/// Register widths the disassembly assumes.
#[derive(Debug, Clone, Copy, Default)]
struct RegisterWidths {
    m16: bool,
    x16: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Ips,
    #[value(alias = "img")]
    Sfc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mapping {
    Low,
    Low2,
    High,
}

impl From<Mapping> for MappingMode {
    fn from(mapping: Mapping) -> Self {
        match mapping {
            Mapping::Low => MappingMode::Low,
            Mapping::Low2 => MappingMode::Low2,
            Mapping::High => MappingMode::High,
        }
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Assemble(args)) => assemble_command(args),
        Some(Commands::Inspect(args)) => inspect_command(args),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn assemble_command(args: AssembleArgs) -> anyhow::Result<()> {
    init_logging(args.verbose);

    let source = std::fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read '{}'", args.input.display()))?;
    let options = AssembleOptions {
        mapping: args.mapping.into(),
        defines: args.defines,
        render: RenderOptions {
            color: stderr_supports_color(),
        },
    };
    let mut assembly =
        a816_core::assemble_source(&args.input.display().to_string(), &source, &options)
            .map_err(|error| anyhow::anyhow!(error.rendered))?;
    let blocks = assembly
        .emit_blocks()
        .map_err(|error| anyhow::anyhow!(error.rendered))?;

    match args.format {
        OutputFormat::Ips => write_ips(&args.output, &blocks, args.copier_header)?,
        OutputFormat::Sfc => write_image(&args.output, &blocks, args.copier_header)?,
    }
    info!(output = %args.output.display(), format = ?args.format, "wrote output");

    if args.dump_symbols {
        print!("{}", assembly.dump_symbols());
    }
    if let Some(path) = args.symbols_json {
        let json = serde_json::to_string_pretty(&assembly.symbol_tables())?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write '{}'", path.display()))?;
    }
    Ok(())
}

fn write_ips(path: &Path, blocks: &[Block], copier_header: bool) -> anyhow::Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create '{}'", path.display()))?;
    let mut writer = IpsWriter::new(BufWriter::new(file)).with_copier_header(copier_header);
    write_blocks(&mut writer, blocks)
}

// Blocks are written over an existing image so a ROM can be patched in place.
fn write_image(path: &Path, blocks: &[Block], copier_header: bool) -> anyhow::Result<()> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("failed to open '{}'", path.display()))?;
    let mut writer = SfcWriter::new(BufWriter::new(file)).with_copier_header(copier_header);
    write_blocks(&mut writer, blocks)
}

fn inspect_command(args: InspectArgs) -> anyhow::Result<()> {
    init_logging(false);

    let widths = RegisterWidths {
        m16: args.m16,
        x16: args.x16,
    };
    let blocks = read_patch(&args.patch)?;
    for block in &blocks {
        println!("{:#08x} {:>5} bytes", block.address, block.bytes.len());
        if args.disassemble {
            for line in disassemble(block, widths) {
                println!("  {line}");
            }
        }
    }
    Ok(())
}

fn disassemble(block: &Block, widths: RegisterWidths) -> Vec<String> {
    let mut lines = Vec::new();
    let mut offset = 0;
    while offset < block.bytes.len() {
        let len = decode_opcode(block.bytes[offset])
            .map_or(1, |decoded| 1 + operand_len(&decoded, widths));
        let end = (offset + len).min(block.bytes.len());
        let address = block.address as usize + offset;
        lines.push(format!("{address:06x}  {}", format_instruction(&block.bytes[offset..end])));
        offset = end;
    }
    lines
}

// Immediates whose width follows the M or X flag; everything else has
// the width its opcode implies.
fn operand_len(decoded: &DecodedOpcode, widths: RegisterWidths) -> usize {
    let wide = match (decoded.mode, decoded.mnemonic) {
        (AddressingMode::Immediate, "ldx" | "ldy" | "cpx" | "cpy") => widths.x16,
        (AddressingMode::Immediate, "adc" | "and" | "bit" | "cmp" | "eor" | "lda" | "ora" | "sbc") => {
            widths.m16
        }
        _ => false,
    };
    if wide {
        2
    } else {
        decoded.size.map_or(0, |size| size.byte_len())
    }
}

fn parse_define(text: &str) -> Result<(String, String), String> {
    let (key, value) = text
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, found '{text}'"))?;
    if key.is_empty() {
        return Err(format!("missing symbol name in '{text}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn stderr_supports_color() -> bool {
    if env::var_os("NO_COLOR").is_some() {
        return false;
    }

    if let Some(force) = env::var_os("CLICOLOR_FORCE") {
        return force != "0";
    }

    if let Some(choice) = env::var_os("CLICOLOR")
        && choice == "0"
    {
        return false;
    }

    std::io::stderr().is_terminal()
}
