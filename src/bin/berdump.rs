//! Dumps the decoded tree of a message.
//!
//! The input is read from a file or, if the file is `-`, from standard
//! input. It can be raw octets or, with `--hex`, hex digits with any
//! amount of white space in between.
//!
//! Usage:
//!   berdump ber cert.der
//!   berdump --hex stream --protocol kerberos as-req.hex
//!   berdump directory record.mrc
//!   berdump rlc --rlc-mode um5 pdu.bin

use std::{fs, io};
use std::io::Read;
use std::path::PathBuf;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;
use berdissect::{
    ByteCursor, ChannelKey, ChannelType, Chunk, Config, ConnectionId,
    DecodeContext, Direction, Dissection, Mode, Protocol, Registry, Session,
};
use berdissect::decode::decode_ber;
use berdissect::directory::decode_record;
use berdissect::rlc::RlcMode;

#[derive(Parser, Debug)]
#[command(name = "berdump")]
#[command(about = "Decodes protocol messages and prints their structure")]
#[command(version)]
struct Args {
    /// Path to a configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// The input is hex encoded
    #[arg(long)]
    hex: bool,

    /// Check against the Distinguished Encoding Rules
    #[arg(long)]
    der: bool,

    #[command(subcommand)]
    kind: Kind,
}

#[derive(Subcommand, Debug)]
enum Kind {
    /// A single BER encoded value without type information
    Ber {
        file: PathBuf,
    },

    /// A byte stream of a protocol, split into messages
    Stream {
        #[arg(short, long)]
        protocol: Protocol,

        file: PathBuf,
    },

    /// A directory based record such as MARC
    Directory {
        file: PathBuf,
    },

    /// A single RLC PDU
    Rlc {
        #[arg(long, value_enum, default_value = "am")]
        rlc_mode: RlcModeArg,

        file: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RlcModeArg {
    Um5,
    Um10,
    Am,
}

impl From<RlcModeArg> for RlcMode {
    fn from(arg: RlcModeArg) -> Self {
        match arg {
            RlcModeArg::Um5 => RlcMode::Um5,
            RlcModeArg::Um10 => RlcMode::Um10,
            RlcModeArg::Am => RlcMode::Am,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let mut config = match args.config {
        Some(ref path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if args.der {
        config.mode = Mode::Der;
    }
    debug!("using {:?}", config);

    match args.kind {
        Kind::Ber { ref file } => {
            let data = read_input(file, args.hex)?;
            let registry = Registry::from_config(&config);
            let mut ctx = DecodeContext::new(&registry, config.mode)
                .with_max_depth(config.max_depth);
            let tree = decode_ber(ByteCursor::new(&data), &mut ctx);
            print!("{tree}");
            print_fatal(ctx.finish().1.as_ref());
        }
        Kind::Stream { protocol, ref file } => {
            let data = read_input(file, args.hex)?;
            let mut session = Session::new(config);
            let chunk = Chunk::new(ConnectionId(0), Direction::Uplink, data);
            let res = session.feed(chunk, protocol);
            if res.is_empty() {
                println!("no complete message");
            }
            for (idx, dissection) in res.iter().enumerate() {
                println!("--- message {idx}");
                print_dissection(dissection);
            }
        }
        Kind::Directory { ref file } => {
            let data = read_input(file, args.hex)?;
            let registry = Registry::new();
            let mut ctx = DecodeContext::new(&registry, config.mode);
            let tree = decode_record(
                ByteCursor::new(&data), &mut ctx, config.z3950.max_record_size
            );
            print!("{tree}");
            let (summary, fatal) = ctx.finish();
            for field in summary {
                println!("{} = {}", field.key, field.value);
            }
            print_fatal(fatal.as_ref());
        }
        Kind::Rlc { rlc_mode, ref file } => {
            let data = read_input(file, args.hex)?;
            let mut session = Session::new(config);
            let key = ChannelKey::new(0, ChannelType::Drb, 0, Direction::Uplink);
            let dissection = session.feed_rlc(
                key, rlc_mode.into(), 0, data, false
            );
            print_dissection(&dissection);
        }
    }
    Ok(())
}

fn read_input(path: &PathBuf, hex: bool) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    if path.as_os_str() == "-" {
        io::stdin().read_to_end(&mut data).context("failed to read stdin")?;
    }
    else {
        data = fs::read(path).with_context(|| {
            format!("failed to read {}", path.display())
        })?;
    }
    if hex {
        let digits: Vec<u8> = data.into_iter().filter(|ch| {
            !ch.is_ascii_whitespace()
        }).collect();
        data = hex::decode(digits).context("invalid hex input")?;
    }
    Ok(data)
}

fn print_dissection(dissection: &Dissection) {
    print!("{}", dissection.decoded_tree());
    for field in dissection.summary_fields() {
        println!("{} = {}", field.key, field.value);
    }
    print_fatal(dissection.fatal());
}

fn print_fatal(fatal: Option<&berdissect::FatalError>) {
    if let Some(fatal) = fatal {
        eprintln!("decoding aborted: {fatal}");
    }
}
