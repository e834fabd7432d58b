//! Category-filtered logging shared by every emulated component.
//!
//! Components call [`log`] with a [`LogCategory`] and a [`LogLevel`]. The
//! thresholds live in atomics inside a process-wide [`LogConfig`], so a
//! disabled category costs one relaxed load and the message closure never
//! runs.
//!
//! Messages go to stderr unless [`LogConfig::set_log_file`] installed a file.
//! Each category gets a budget of messages per one-second bucket; anything
//! over the budget is counted and summarized when the next bucket opens.
//!
//! ```rust
//! use emu_core::logging::{log, LogCategory, LogLevel};
//!
//! log(LogCategory::Vdp, LogLevel::Debug, || {
//!     format!("VDP: register {} <- {:02X}", 1, 0xE0)
//! });
//! ```

use std::fs::{File, OpenOptions};
use std::io::{LineWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::time::{Duration, Instant};

const BUCKET: Duration = Duration::from_secs(1);
const DEFAULT_BUDGET: usize = 60;

/// Verbosity threshold; higher values are chattier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    const LADDER: [LogLevel; 6] = [
        LogLevel::Off,
        LogLevel::Error,
        LogLevel::Warn,
        LogLevel::Info,
        LogLevel::Debug,
        LogLevel::Trace,
    ];

    /// Accepts a name, a common abbreviation or the numeric level.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase();
        if let Ok(n) = s.parse::<usize>() {
            return Self::LADDER.get(n).copied();
        }
        let level = match s.as_str() {
            "off" | "none" => LogLevel::Off,
            "error" | "err" => LogLevel::Error,
            "warn" | "warning" => LogLevel::Warn,
            "info" => LogLevel::Info,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => return None,
        };
        Some(level)
    }

    fn load(cell: &AtomicU8) -> Self {
        Self::LADDER
            .get(cell.load(Ordering::Relaxed) as usize)
            .copied()
            .unwrap_or(LogLevel::Off)
    }
}

/// Which part of the machine a message comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LogCategory {
    /// Z80 execution (undocumented opcodes, halts)
    CPU,
    /// Memory map, mapper bank switching and I/O port decode
    Bus,
    Vdp,
    /// SN76489 tone/noise generator
    Psg,
    /// YM2413
    Fm,
    /// Band-limited sample buffers and mixing
    Audio,
    /// IRQ and NMI delivery
    Interrupts,
    /// Cartridge loading and metadata resolution
    Cartridge,
    /// Hardware the emulator knowingly skips
    Stubs,
}

const CATEGORY_COUNT: usize = LogCategory::ALL.len();

impl LogCategory {
    pub const ALL: [LogCategory; 9] = [
        LogCategory::CPU,
        LogCategory::Bus,
        LogCategory::Vdp,
        LogCategory::Psg,
        LogCategory::Fm,
        LogCategory::Audio,
        LogCategory::Interrupts,
        LogCategory::Cartridge,
        LogCategory::Stubs,
    ];

    fn slot(self) -> usize {
        self as usize
    }

    /// Parse a category name as typed on the command line.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        let category = match s.trim().to_ascii_lowercase().as_str() {
            "cpu" | "z80" => LogCategory::CPU,
            "bus" | "mem" | "memory" => LogCategory::Bus,
            "vdp" | "video" => LogCategory::Vdp,
            "psg" => LogCategory::Psg,
            "fm" | "ym2413" => LogCategory::Fm,
            "audio" | "sound" => LogCategory::Audio,
            "irq" | "interrupts" => LogCategory::Interrupts,
            "cart" | "cartridge" => LogCategory::Cartridge,
            "stubs" => LogCategory::Stubs,
            _ => return None,
        };
        Some(category)
    }
}

/// Message budget for one category inside the current bucket.
#[derive(Default)]
struct Bucket {
    opened: Option<Instant>,
    emitted: usize,
    suppressed: usize,
}

/// What [`Throttle::admit`] decided for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Admission {
    emit: bool,
    /// Messages suppressed during the previous bucket, reported once.
    carried: usize,
}

struct Throttle {
    budget: AtomicUsize,
    buckets: Mutex<[Bucket; CATEGORY_COUNT]>,
}

impl Throttle {
    fn new(budget: usize) -> Self {
        Self {
            budget: AtomicUsize::new(budget),
            buckets: Mutex::new(Default::default()),
        }
    }

    fn admit(&self, category: LogCategory, now: Instant) -> Admission {
        let mut buckets = relock(self.buckets.lock());
        let bucket = &mut buckets[category.slot()];

        let mut carried = 0;
        let expired = bucket
            .opened
            .map_or(true, |opened| now.duration_since(opened) >= BUCKET);
        if expired {
            carried = std::mem::take(&mut bucket.suppressed);
            bucket.opened = Some(now);
            bucket.emitted = 0;
        }

        let emit = bucket.emitted < self.budget.load(Ordering::Relaxed);
        if emit {
            bucket.emitted += 1;
        } else {
            bucket.suppressed += 1;
        }
        Admission { emit, carried }
    }
}

/// A poisoned lock only means another thread panicked mid-log; the data is
/// still usable.
fn relock<T>(result: std::sync::LockResult<MutexGuard<'_, T>>) -> MutexGuard<'_, T> {
    result.unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Process-wide log thresholds and sink.
pub struct LogConfig {
    /// Slot 0 is the global level, then one slot per category.
    levels: [AtomicU8; CATEGORY_COUNT + 1],
    sink: Mutex<Option<LineWriter<File>>>,
    throttle: Throttle,
}

impl LogConfig {
    fn new() -> Self {
        Self {
            levels: Default::default(),
            sink: Mutex::new(None),
            throttle: Throttle::new(DEFAULT_BUDGET),
        }
    }

    pub fn global() -> &'static Self {
        static CONFIG: OnceLock<LogConfig> = OnceLock::new();
        CONFIG.get_or_init(LogConfig::new)
    }

    pub fn set_global_level(&self, level: LogLevel) {
        self.levels[0].store(level as u8, Ordering::Relaxed);
    }

    pub fn get_global_level(&self) -> LogLevel {
        LogLevel::load(&self.levels[0])
    }

    pub fn set_level(&self, category: LogCategory, level: LogLevel) {
        self.levels[category.slot() + 1].store(level as u8, Ordering::Relaxed);
    }

    pub fn get_level(&self, category: LogCategory) -> LogLevel {
        LogLevel::load(&self.levels[category.slot() + 1])
    }

    /// A category level other than Off replaces the global one.
    pub fn should_log(&self, category: LogCategory, level: LogLevel) -> bool {
        let threshold = match self.get_level(category) {
            LogLevel::Off => self.get_global_level(),
            own => own,
        };
        level != LogLevel::Off && level <= threshold
    }

    pub fn reset(&self) {
        for cell in &self.levels {
            cell.store(LogLevel::Off as u8, Ordering::Relaxed);
        }
    }

    /// Messages each category may emit per second.
    pub fn set_rate_limit(&self, per_second: usize) {
        self.throttle.budget.store(per_second, Ordering::Relaxed);
    }

    pub fn get_rate_limit(&self) -> usize {
        self.throttle.budget.load(Ordering::Relaxed)
    }

    /// Append messages to `path` instead of stderr.
    pub fn set_log_file(&self, path: PathBuf) -> std::io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        *relock(self.sink.lock()) = Some(LineWriter::new(file));
        Ok(())
    }

    pub fn clear_log_file(&self) {
        *relock(self.sink.lock()) = None;
    }

    fn emit(&self, line: &str) {
        let mut sink = relock(self.sink.lock());
        if let Some(file) = sink.as_mut() {
            if writeln!(file, "{line}").is_ok() {
                return;
            }
        }
        eprintln!("{line}");
    }
}

/// Log a message if `category` is enabled at `level`.
///
/// The closure only runs when the message will actually be written.
pub fn log<F>(category: LogCategory, level: LogLevel, message_fn: F)
where
    F: FnOnce() -> String,
{
    let config = LogConfig::global();
    if !config.should_log(category, level) {
        return;
    }

    let admission = config.throttle.admit(category, Instant::now());
    if admission.carried > 0 {
        config.emit(&format!(
            "[{category:?}] {} message(s) suppressed by the rate limit",
            admission.carried
        ));
    }
    if admission.emit {
        config.emit(&message_fn());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::from_str("off"), Some(LogLevel::Off));
        assert_eq!(LogLevel::from_str("ERR"), Some(LogLevel::Error));
        assert_eq!(LogLevel::from_str("WARNING"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_str("3"), Some(LogLevel::Info));
        assert_eq!(LogLevel::from_str(" debug "), Some(LogLevel::Debug));
        assert_eq!(LogLevel::from_str("TRACE"), Some(LogLevel::Trace));
        assert_eq!(LogLevel::from_str("6"), None);
        assert_eq!(LogLevel::from_str("loud"), None);
    }

    #[test]
    fn test_category_parsing() {
        assert_eq!(LogCategory::from_str("VDP"), Some(LogCategory::Vdp));
        assert_eq!(LogCategory::from_str("ym2413"), Some(LogCategory::Fm));
        assert_eq!(LogCategory::from_str("Audio"), Some(LogCategory::Audio));
        assert_eq!(LogCategory::from_str("cart"), Some(LogCategory::Cartridge));
        assert_eq!(LogCategory::from_str("ppu"), None);
    }

    #[test]
    fn test_category_slots_follow_all() {
        for (i, category) in LogCategory::ALL.into_iter().enumerate() {
            assert_eq!(category.slot(), i);
        }
    }

    #[test]
    fn test_should_log_with_category_level() {
        let config = LogConfig::new();
        config.set_level(LogCategory::Psg, LogLevel::Info);

        assert!(config.should_log(LogCategory::Psg, LogLevel::Warn));
        assert!(config.should_log(LogCategory::Psg, LogLevel::Info));
        assert!(!config.should_log(LogCategory::Psg, LogLevel::Debug));
        assert!(!config.should_log(LogCategory::Fm, LogLevel::Error));
    }

    #[test]
    fn test_category_level_overrides_global() {
        let config = LogConfig::new();
        config.set_global_level(LogLevel::Error);
        config.set_level(LogCategory::CPU, LogLevel::Debug);

        assert!(config.should_log(LogCategory::CPU, LogLevel::Debug));
        assert!(!config.should_log(LogCategory::Bus, LogLevel::Warn));
        assert!(config.should_log(LogCategory::Bus, LogLevel::Error));
    }

    #[test]
    fn test_reset() {
        let config = LogConfig::new();
        config.set_global_level(LogLevel::Trace);
        config.set_level(LogCategory::Vdp, LogLevel::Debug);

        config.reset();

        assert_eq!(config.get_global_level(), LogLevel::Off);
        assert_eq!(config.get_level(LogCategory::Vdp), LogLevel::Off);
    }

    #[test]
    fn test_throttle_is_per_category() {
        let throttle = Throttle::new(3);
        let now = Instant::now();
        for _ in 0..3 {
            assert!(throttle.admit(LogCategory::Bus, now).emit);
        }
        assert!(!throttle.admit(LogCategory::Bus, now).emit);
        assert!(throttle.admit(LogCategory::Vdp, now).emit);
    }

    #[test]
    fn test_throttle_reports_suppressed_count_once() {
        let throttle = Throttle::new(2);
        let start = Instant::now();
        for _ in 0..6 {
            throttle.admit(LogCategory::Stubs, start);
        }

        let later = start + BUCKET;
        assert_eq!(
            throttle.admit(LogCategory::Stubs, later),
            Admission { emit: true, carried: 4 }
        );
        assert_eq!(
            throttle.admit(LogCategory::Stubs, later),
            Admission { emit: true, carried: 0 }
        );
    }
}
