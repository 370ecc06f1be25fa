//! Command-line front-end for the emulator core.
//!
//! Loads a boot ROM (and optionally a disc image), then runs the machine
//! frame by frame. Rendering goes to the null renderer for now; the
//! hardware-accelerated back-end plugs in through the same trait.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use waystation_core::devices::gpu::renderer::NullRenderer;
use waystation_core::devices::psx::Psx;

#[derive(Parser)]
#[command(name = "waystation", about = "A PlayStation emulator")]
struct Args {
    /// Boot ROM image, exactly 512 KiB
    bios: PathBuf,

    /// Disc image, raw sector dump or ISO
    #[arg(short, long)]
    disc: Option<PathBuf>,

    /// PS-X EXE to side-load once the boot ROM reaches the shell
    #[arg(short, long)]
    exe: Option<PathBuf>,

    /// Stop after this many frames instead of running forever
    #[arg(long)]
    frames: Option<u64>,

    /// Print every executed instruction to standard error
    #[arg(long)]
    trace: bool,
}

fn run(args: &Args) -> anyhow::Result<()> {
    let mut psx = Psx::new_from_file(&args.bios, Box::new(NullRenderer::new()))
        .with_context(|| format!("could not load boot ROM '{}'", args.bios.display()))?;

    if let Some(disc) = &args.disc {
        psx.insert_disc(disc)
            .with_context(|| format!("could not open disc image '{}'", disc.display()))?;
    }

    if let Some(exe) = &args.exe {
        psx.sideload_exe(exe)
            .with_context(|| format!("could not load executable '{}'", exe.display()))?;
    }

    if args.trace {
        while args.frames.map_or(true, |frames| psx.frames() < frames) {
            eprintln!("{}", psx.cpu.debug_string());
            psx.step();
        }
    } else {
        match args.frames {
            Some(frames) => {
                while psx.frames() < frames {
                    psx.run_frame();
                }
                log::info!("stopping after {} frames", frames);
            }
            None => loop {
                psx.run_frame();
            },
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {:#}", error);
            ExitCode::FAILURE
        }
    }
}
