//!                      MIPS64 Linux Boot Composer CLI                      !//
//!
//! Crafted by HaמuL in 2026
//! Description: Dry-runs a linux/initrd/boot sequence against a simulated
//!              physical address space and reports the resulting layout
//! Licence: Public Domain

mod logger;

use anyhow::{Context, Result, bail};
use clap::Parser;
use mipsboot::{
    BootConfig, BootContext, Error, ErrorKind, FileSource, PhysArena, Preference,
    commands::{cmd_initrd, cmd_linux, run_script}
};
use std::{fs, path::PathBuf};

/// Compose a MIPS64 Linux boot without booting anything
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Kernel ELF image, followed by its command line
    kernel: Option<String>,

    /// Kernel command line arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    cmdline: Vec<String>,

    /// Ramdisk file, or newc:NAME:PATH (repeatable)
    #[arg(short, long)]
    initrd: Vec<String>,

    /// Run linux/initrd/boot/unload commands from a file instead
    #[arg(short, long, conflicts_with = "kernel")]
    script: Option<PathBuf>,

    /// Physical RAM base of the simulated machine
    #[arg(long, default_value = "0", value_parser = parse_num)]
    mem_base: u64,

    /// Physical RAM size of the simulated machine
    #[arg(long, default_value = "0x10000000", value_parser = parse_num)]
    mem_size: u64,

    /// Firmware-owned range as BASE:SIZE (repeatable)
    #[arg(short, long, value_parser = parse_range)]
    reserve: Vec<(u64, u64)>,

    /// Place the argument blob and ramdisk as low as possible
    #[arg(long)]
    low: bool,

    /// Hex dump the argument blob
    #[arg(short, long)]
    dump: bool,

    /// More log output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8
}

fn parse_num(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse()
    };
    return parsed.map_err(|err| format!("`{}`: {}", s, err));
}

fn parse_range(s: &str) -> Result<(u64, u64), String> {
    let (base, size) = s.split_once(':').ok_or_else(|| format!("`{}`: expected BASE:SIZE", s))?;
    return Ok((parse_num(base)?, parse_num(size)?));
}

/// Files straight from the host filesystem.
struct HostFiles;

impl FileSource for HostFiles {
    fn read(&mut self, path: &str) -> mipsboot::Result<Vec<u8>> {
        return fs::read(path).map_err(|err| {
            log::debug!("{}: {}", path, err);
            Error::FileNotFound(path.to_string())
        });
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    logger::init(args.verbose)?;

    let mut arena = PhysArena::new(args.mem_base, args.mem_size);
    for &(base, size) in &args.reserve {
        arena.reserve(base, size)
            .with_context(|| format!("cannot reserve 0x{:x}+0x{:x}", base, size))?;
    }
    let mut config = BootConfig::default();
    if args.low { config = config.with_preference(Preference::Low); }

    let mut ctx = BootContext::new(arena, config);
    let mut files = HostFiles;

    if let Some(script) = &args.script {
        let text = fs::read_to_string(script)
            .with_context(|| format!("cannot read {}", script.display()))?;
        handed_off(run_script(&mut ctx, &mut files, &text)).context("script failed")?;
    } else {
        let Some(kernel) = &args.kernel else {
            bail!("nothing to compose: give a kernel or --script");
        };
        let argv: Vec<&str> = [kernel.as_str()].into_iter()
            .chain(args.cmdline.iter().map(String::as_str))
            .collect();
        cmd_linux(&mut ctx, &mut files, &argv).with_context(|| format!("linux {}", kernel))?;
        if !args.initrd.is_empty() {
            let rd: Vec<&str> = args.initrd.iter().map(String::as_str).collect();
            cmd_initrd(&mut ctx, &mut files, &rd).context("initrd")?;
        }
        handed_off(ctx.boot().map(|never| match never {}))?;
    }

    report(&ctx, args.dump);
    return Ok(());
}

/// The simulated kernel always comes back; that is the expected outcome.
fn handed_off(result: mipsboot::Result<()>) -> mipsboot::Result<()> {
    return match result {
        Err(err) if err.kind() == ErrorKind::Handoff => Ok(()),
        other => other
    };
}

fn report(ctx: &BootContext<PhysArena>, dump: bool) {
    println!("state:   {:?}", ctx.state());
    if let Some(image) = ctx.image() {
        println!(
            "kernel:  {}-bit, 0x{:x} bytes at 0x{:x} (linked at 0x{:x}), entry 0x{:x}",
            image.class().bits(), image.total_size(), image.phys_base(), image.target_base(), image.entry()
        );
    }
    if let Some(rd) = ctx.ramdisk() {
        println!("initrd:  0x{:x} bytes at 0x{:x}", rd.size(), rd.addr());
    }
    if let Some(blob) = ctx.args() {
        println!("argv:    0x{:x} bytes at 0x{:x}", blob.bytes().len(), blob.base());
        for (idx, arg) in blob.argv().iter().enumerate() {
            println!("  [{}] {}", idx, arg);
        }
        if dump {
            for (line, chunk) in blob.bytes().chunks(16).enumerate() {
                println!("  {:08x}  {}", blob.base() as usize + line * 16, hex::encode(chunk));
            }
        }
    }

    let state = match ctx.relocator().handoff() {
        Some(state) => Some(*state),
        None => ctx.register_state().ok()
    };
    if let Some(state) = state {
        println!(
            "handoff: jump ${} = 0x{:x}, a0 = {}, a1 = 0x{:x}",
            state.jumpreg, state.entry(), state.argc(), state.argv()
        );
    }
}
