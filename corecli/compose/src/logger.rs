use log::{Level, LevelFilter, Metadata, Record};

/// Coloured level tags on stderr, so stdout stays a clean report.
struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) { return; }
        let level = match record.level() {
            Level::Error => "\x1b[31mERROR\x1b[0m",
            Level::Warn  => "\x1b[33mWARN\x1b[0m",
            Level::Info  => "\x1b[32mINFO\x1b[0m",
            Level::Debug => "\x1b[90mDEBUG\x1b[0m",
            Level::Trace => "\x1b[90mTRACE\x1b[0m"
        };
        eprintln!("[{}] {}", level, record.args());
    }

    fn flush(&self) {}
}

pub fn init(verbosity: u8) -> anyhow::Result<()> {
    let filter = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace
    };
    log::set_logger(&LOGGER)
        .map(|()| log::set_max_level(filter))
        .map_err(|err| anyhow::anyhow!("cannot install logger: {}", err))?;
    return Ok(());
}
