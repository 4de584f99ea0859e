//! pdc002 - flash firmware through the PDC002 USB bootloader

mod cli;

use clap::Parser;
use cli::{Cli, Commands, Format};
use indicatif::{ProgressBar, ProgressStyle};
use pdc002::{
    messages, Bootloader, Context, FlashOptions, FlashProgrammer, Mismatch, Observer, Operation,
    Read, Stage, Status, Transport,
};
use std::fs::File;
use std::io::Write;
use std::path::Path;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logger at the level chosen by -v unless RUST_LOG overrides it
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(cli.log_level().as_str()),
    )
    .init();

    let context = Context::new()?;
    let mut bootloader = context.open(&cli.device_config())?;

    match cli.command {
        Commands::Flash {
            firmware,
            abort_on_mismatch,
        } => run_flash(&mut bootloader, &firmware, abort_on_mismatch),
        Commands::Status => {
            print_status(bootloader.status_request()?);
            Ok(())
        }
        Commands::Read {
            address,
            length,
            format,
        } => {
            let data = read_with_progress(&mut bootloader, address, length)?;
            match format {
                Format::Hex => {
                    let bytes: Vec<String> = data.iter().map(|b| format!("{:02x}", b)).collect();
                    println!("address {:08x} = {}", address, bytes.join(" "));
                }
                Format::Log => {
                    for message in messages::decode(&data) {
                        println!("{}", message);
                    }
                }
            }
            Ok(())
        }
        Commands::Dump {
            address,
            length,
            output,
        } => {
            println!("dumping to {:?}", output);
            let data = read_with_progress(&mut bootloader, address, length)?;
            File::create(&output)?.write_all(&data)?;
            println!("dump complete");
            Ok(())
        }
        Commands::Reset => {
            print_status(bootloader.reset()?);
            Ok(())
        }
    }
}

fn print_status(status: Status) {
    match status {
        Status::Success => println!("status: success"),
        Status::Error => println!("status: error"),
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} {msg:12} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

fn run_flash<T: Transport>(
    bootloader: &mut Bootloader<T>,
    firmware: &Path,
    abort_on_mismatch: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut image = File::open(firmware)?;
    let options = FlashOptions { abort_on_mismatch };

    let mut programmer =
        FlashProgrammer::with_observer(bootloader, options, ProgressObserver::default());
    let result = programmer.run(&mut image);
    programmer.into_observer().finish();
    let report = result?;

    if report.is_verified() {
        println!("programming complete!");
        Ok(())
    } else {
        Err(format!(
            "programming complete, but {} of {} chunks failed verification",
            report.mismatches.len(),
            report.chunks_verified
        )
        .into())
    }
}

fn read_with_progress<T: Transport>(
    bootloader: &mut Bootloader<T>,
    address: u32,
    length: usize,
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let mut data = vec![0u8; length];
    let mut read = Read::at(bootloader, &mut data, address);

    let pb = ProgressBar::new(read.total() as u64);
    pb.set_style(bar_style());
    pb.set_message("reading");
    for step in &mut read {
        pb.set_position(step? as u64);
    }
    pb.finish_and_clear();

    Ok(data)
}

/// Shows a progress bar for every multi-command stage of a flashing run.
#[derive(Default)]
struct ProgressObserver {
    bar: Option<ProgressBar>,
}

impl ProgressObserver {
    fn finish(self) {
        if let Some(bar) = self.bar {
            bar.abandon();
        }
    }
}

impl Observer for ProgressObserver {
    fn start(&mut self, stage: Stage, total: usize) {
        if total == 0 {
            return;
        }
        let bar = ProgressBar::new(total as u64);
        bar.set_style(bar_style());
        bar.set_message(match stage {
            Stage::Erased => "erasing",
            Stage::Programmed => "programming",
            Stage::Verified => "verifying",
            _ => "",
        });
        self.bar = Some(bar);
    }

    fn progress(&mut self, done: usize) {
        if let Some(bar) = &self.bar {
            bar.set_position(done as u64);
        }
    }

    fn reached(&mut self, _stage: Stage) {
        if let Some(bar) = self.bar.take() {
            bar.finish();
        }
    }

    fn mismatch(&mut self, mismatch: &Mismatch) {
        if let Some(bar) = &self.bar {
            bar.println(format!(
                "mismatch at 0x{:08x} (first difference at +0x{:x})",
                mismatch.address,
                mismatch.first_difference().unwrap_or(0)
            ));
        }
    }
}
