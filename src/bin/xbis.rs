//! xbis CLI — XML <-> XBIS conversion.

#[cfg(feature = "fast-alloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use clap::{Args, Parser, Subcommand};
use std::io::{Read, Write};
use std::process;

use xbis::writer::WriterConfig;

#[derive(Parser)]
#[command(name = "xbis", about = "XML <-> XBIS conversion", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Encode XML to XBIS
    Encode(EncodeArgs),
    /// Decode XBIS to XML
    Decode(DecodeArgs),
}

#[derive(Args)]
struct CommonArgs {
    /// Input file (- for stdin)
    #[arg(short, long)]
    input: String,

    /// Output file (- or omitted for stdout)
    #[arg(short, long)]
    output: Option<String>,
}

#[derive(Args)]
struct EncodeArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Share depth for character content (0 disables sharing)
    #[arg(long, default_value_t = 6)]
    content_share_depth: u64,

    /// Share depth for attribute values (0 disables sharing)
    #[arg(long, default_value_t = 6)]
    attribute_share_depth: u64,
}

#[derive(Args)]
struct DecodeArgs {
    #[command(flatten)]
    common: CommonArgs,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("xbis: {e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Encode(args) => {
            let input = read_input(&args.common.input)?;
            let xml = String::from_utf8(input)?;
            let config = WriterConfig {
                content_share_depth: args.content_share_depth,
                attribute_share_depth: args.attribute_share_depth,
                ..WriterConfig::default()
            };
            let events = xbis::parse_xml_events(&xml)?;
            let bytes = xbis::encode_with_config(&events, config)?;
            write_output(args.common.output.as_deref(), &bytes)
        }
        Command::Decode(args) => {
            let input = read_input(&args.common.input)?;
            let xml = xbis::decode_to_xml(&input)?;
            write_output(args.common.output.as_deref(), xml.as_bytes())
        }
    }
}

fn read_input(path: &str) -> std::io::Result<Vec<u8>> {
    let mut data = Vec::new();
    if path == "-" {
        std::io::stdin().lock().read_to_end(&mut data)?;
    } else {
        data = std::fs::read(path)?;
    }
    Ok(data)
}

fn write_output(path: Option<&str>, data: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        None | Some("-") => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(data)?;
            stdout.flush()?;
        }
        Some(p) => std::fs::write(p, data)?,
    }
    Ok(())
}
