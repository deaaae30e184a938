use anyhow::{Context, Result, bail};
use clap::Parser;
use std::io::Write;
use std::time::Duration;

use swrng::device::DeviceHandle;
use swrng::devices::DeviceSet;
use swrng::scan::{DeviceScanner, SystemScanner};
use swrng::stats::Stats;

mod cli;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = cli::Cli::parse();
    match args.cmd {
        cli::Cmd::List(opts) => list(opts),
        cli::Cmd::Info(opts) => info(opts),
        cli::Cmd::Read(opts) => read(opts),
        cli::Cmd::Noise(opts) => noise(opts),
    }
}

fn list(opts: cli::ListOpts) -> Result<()> {
    let paths = SystemScanner::default().scan().context("scanning for devices")?;
    if paths.is_empty() {
        eprintln!("no devices found");
        return Ok(());
    }
    let config = opts.channel.to_config();
    for path in paths {
        match DeviceHandle::open(&path, &config) {
            Ok(device) => println!("{}", device),
            Err(e) => eprintln!("{}: {}", path, e),
        }
    }
    Ok(())
}

fn info(opts: cli::InfoOpts) -> Result<()> {
    let device = DeviceHandle::open(&opts.dev, &opts.channel.to_config())
        .with_context(|| format!("opening {}", opts.dev))?;
    println!("{}", device);
    device.self_diagnostics().context("self-diagnostics")?;
    println!("self-diagnostics: ok");

    let table = device.frequency_table().context("frequency table")?;
    let counts: Vec<u16> = table
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    let min = counts.iter().copied().min().unwrap_or_default();
    let max = counts.iter().copied().max().unwrap_or_default();
    let sum: u64 = counts.iter().map(|&c| c as u64).sum();
    println!(
        "frequency table: {} bins, min={} max={} total={}",
        counts.len(),
        min,
        max,
        sum
    );
    device.close();
    Ok(())
}

fn read(opts: cli::ReadOpts) -> Result<()> {
    if opts.block == 0 {
        bail!("--block must be positive");
    }
    let config = opts.to_config();
    let set = DeviceSet::from_config(&config, &SystemScanner::default())
        .context("opening devices")?;
    for device in set.devices() {
        tracing::info!(device = %device, "using");
    }
    tracing::info!(devices = set.len(), policy = ?set.policy(), "reading");

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut stats = Stats::new();
    let mut buf = vec![0u8; opts.block];
    let interval = Duration::from_secs_f64(opts.stats.max(0.1));

    loop {
        let want = if opts.bytes == 0 {
            buf.len()
        } else {
            let left = opts.bytes - stats.total();
            if left == 0 {
                break;
            }
            left.min(buf.len() as u64) as usize
        };
        set.random_bytes(&mut buf[..want]).context("reading random bytes")?;
        emit(&mut out, &buf[..want], opts.hex).context("writing output")?;
        stats.add_bytes(want);
        stats.maybe_log(interval);
    }
    out.flush()?;
    set.close();
    Ok(())
}

fn noise(opts: cli::NoiseOpts) -> Result<()> {
    let device = DeviceHandle::open(&opts.dev, &opts.channel.to_config())
        .with_context(|| format!("opening {}", opts.dev))?;
    let chunk = match opts.source {
        cli::NoiseSource::First => device.first_noise(),
        cli::NoiseSource::Second => device.second_noise(),
    }
    .context("reading noise source")?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    emit(&mut out, &chunk, opts.hex)?;
    out.flush()?;
    device.close();
    Ok(())
}

fn emit(out: &mut impl Write, bytes: &[u8], hex: bool) -> std::io::Result<()> {
    if !hex {
        return out.write_all(bytes);
    }
    for line in bytes.chunks(32) {
        for b in line {
            write!(out, "{:02x}", b)?;
        }
        writeln!(out)?;
    }
    Ok(())
}
