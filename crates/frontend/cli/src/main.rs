use anyhow::{bail, Context, Result};
use clap::Parser;
use emu_core::logging::{LogCategory, LogConfig, LogLevel};
use emu_core::System;
use emu_sms::{ConsoleType, ForcedConfig, MapperType, SmsConfig, SmsSystem, Zone};
use serde::de::DeserializeOwned;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

/// Largest output picture: 320-wide overscan on a PAL field, 4 bytes a pixel.
const MAX_VIDEO_BYTES: usize = 320 * 288 * 4;

#[derive(Parser)]
#[command(about = "Run a Master System, Game Gear or SG-1000 ROM without a display")]
struct Args {
    /// ROM image (.sms, .gg, .sg, .sc or raw .bin)
    rom: PathBuf,

    /// Number of frames to run
    #[arg(long, default_value_t = 60)]
    frames: u32,

    /// Emulator settings as JSON (missing fields use defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Force the console: Sms, GameGear or Sg1000
    #[arg(long, value_parser = parse_variant::<ConsoleType>)]
    system: Option<ConsoleType>,

    /// Force the region, e.g. ExportPal or JapanNtsc
    #[arg(long, value_parser = parse_variant::<Zone>)]
    zone: Option<Zone>,

    /// Force the mapper, e.g. Sega, Codemasters, Korean, Msx or Janggun
    #[arg(long, value_parser = parse_variant::<MapperType>)]
    mapper: Option<MapperType>,

    /// Leave the YM2413 out
    #[arg(long, default_value_t = false)]
    no_fm: bool,

    /// Boot ROM to run before the cartridge
    #[arg(long)]
    bios: Option<PathBuf>,

    /// Pro Action Replay or Game Genie code; repeatable
    #[arg(long = "cheat")]
    cheats: Vec<String>,

    /// Restore this save state before running
    #[arg(long)]
    load_state: Option<PathBuf>,

    /// Write a save state here after the last frame
    #[arg(long)]
    state_out: Option<PathBuf>,

    /// Load cartridge RAM from this file
    #[arg(long)]
    ram_in: Option<PathBuf>,

    /// Write cartridge RAM here after the last frame, if the game has any
    #[arg(long)]
    ram_out: Option<PathBuf>,

    /// Write the last frame as a binary PPM
    #[arg(long)]
    dump_frame: Option<PathBuf>,

    /// Print a digest every N frames (0 = only the last)
    #[arg(long, default_value_t = 0)]
    every: u32,

    /// Core log level: off, error, warn, info, debug, trace
    #[arg(long, default_value = "off")]
    log_level: String,

    /// Per-category override such as `vdp=debug`; repeatable
    #[arg(long = "log")]
    log_categories: Vec<String>,

    /// Send core logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn configure_logging(args: &Args) -> Result<()> {
    let config = LogConfig::global();
    let level = LogLevel::from_str(&args.log_level).with_context(|| format!("unknown log level {}", args.log_level))?;
    config.set_global_level(level);
    for entry in &args.log_categories {
        let Some((name, level)) = entry.split_once('=') else {
            bail!("expected CATEGORY=LEVEL, got {entry}");
        };
        let category = LogCategory::from_str(name).with_context(|| format!("unknown log category {name}"))?;
        let level = LogLevel::from_str(level).with_context(|| format!("unknown log level {level}"))?;
        config.set_level(category, level);
    }
    if let Some(path) = &args.log_file {
        config.set_log_file(path.clone())?;
    }
    Ok(())
}

/// Parse a config enum by its serde variant name.
fn parse_variant<T: DeserializeOwned>(name: &str) -> std::result::Result<T, String> {
    serde_json::from_value(serde_json::Value::String(name.to_string())).map_err(|e| e.to_string())
}

fn load_config(args: &Args) -> Result<SmsConfig> {
    let mut config: SmsConfig = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => SmsConfig::default(),
    };
    if let Some(system) = args.system {
        config.forced.system = system;
    }
    if let Some(zone) = args.zone {
        config.forced.zone = zone;
    }
    if let Some(mapper) = args.mapper {
        config.forced.mapper = mapper;
    }
    if args.no_fm {
        config.fm_enabled = false;
    }
    if args.bios.is_some() {
        config.bios_enabled = true;
    }
    Ok(config)
}

fn write_ppm(path: &PathBuf, sms: &SmsSystem) -> Result<()> {
    let frame = sms.output_frame();
    let mut out = BufWriter::new(File::create(path)?);
    write!(out, "P6\n{} {}\n255\n", frame.width, frame.height)?;
    for &rgb in &frame.pixels {
        out.write_all(&[(rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8])?;
    }
    out.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    configure_logging(&args)?;

    let config = load_config(&args)?;
    let bytes_per_pixel = config.pixel_format.bytes_per_pixel();
    let mut sms = SmsSystem::new(config);

    if let Some(path) = &args.bios {
        let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        sms.load_bios(&data)?;
        log::info!("BIOS loaded from {}", path.display());
    }

    let rom = fs::read(&args.rom).with_context(|| format!("reading {}", args.rom.display()))?;
    sms.load_rom(&rom, &ForcedConfig::default(), Some(&args.rom))?;

    if let Some(path) = &args.ram_in {
        sms.load_ram(&fs::read(path)?)?;
    }
    for code in &args.cheats {
        let cheat = sms.add_cheat(code)?;
        log::info!("cheat {code}: {cheat:?}");
    }
    if let Some(path) = &args.load_state {
        sms.load_state(&fs::read(path)?)?;
    }

    println!("{}", serde_json::to_string_pretty(&sms.cartridge())?);
    println!("{}", serde_json::to_string_pretty(&sms.runtime_info())?);

    let mut video = vec![0u8; MAX_VIDEO_BYTES];
    let mut audio = vec![0i16; 8192];
    let mut audio_digest = crc32fast::Hasher::new();
    let mut samples = 0usize;

    for frame in 1..=args.frames {
        let n = sms.run_frame(Some(&mut video), Some(&mut audio))?;
        samples += n;
        for s in &audio[..n] {
            audio_digest.update(&s.to_le_bytes());
        }

        if frame == args.frames || (args.every > 0 && frame % args.every == 0) {
            let info = sms.runtime_info();
            let len = (info.width * info.height) as usize * bytes_per_pixel;
            println!(
                "frame {frame}: {}x{} video {:08X} audio {:08X} ({} samples)",
                info.width,
                info.height,
                crc32fast::hash(&video[..len]),
                audio_digest.clone().finalize(),
                samples / 2
            );
        }
    }

    if let Some(path) = &args.dump_frame {
        write_ppm(path, &sms)?;
    }
    if let Some(path) = &args.state_out {
        let mut state = vec![0u8; sms.save_state_size()?];
        let n = sms.save_state(&mut state)?;
        fs::write(path, &state[..n])?;
        log::info!("wrote {n}-byte state to {}", path.display());
    }
    if let Some(path) = &args.ram_out {
        match sms.save_ram() {
            Some(ram) => fs::write(path, ram)?,
            None => log::warn!("cartridge has no RAM to save"),
        }
    }
    Ok(())
}
