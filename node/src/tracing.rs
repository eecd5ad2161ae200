pub use tracing::Level;

use std::fmt::Result;

use time::{OffsetDateTime, UtcOffset};
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::fmt::{format::Writer, time::FormatTime};

fn clock_timer(w: &mut Writer<'_>, offset: UtcOffset) -> Result {
    let now = OffsetDateTime::now_utc().to_offset(offset);
    write!(
        w,
        "{:02}:{:02}:{:02}+{:03}",
        now.hour(),
        now.minute(),
        now.second(),
        now.millisecond()
    )
}

/// Wall clock time of day with millisecond precision, `HH:MM:SS+mmm`.
///
/// The offset is read once, when the timer is created. The local offset is
/// only available while the process is single threaded.
struct ClockTimer {
    offset: UtcOffset,
}

impl ClockTimer {
    fn local() -> Self {
        let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
        Self { offset }
    }
}

impl FormatTime for ClockTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> Result {
        clock_timer(w, self.offset)
    }
}

/// Installs the process wide subscriber. Logs go to stdout, which is what
/// the launcher collects from every node.
///
/// Call it before spawning threads or building a multi-threaded runtime,
/// otherwise timestamps fall back to UTC.
pub fn initialize(max_log_level: Level) -> std::result::Result<(), SetGlobalDefaultError> {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(max_log_level)
        .with_ansi(std::io::IsTerminal::is_terminal(&std::io::stdout()))
        .with_target(false)
        .with_timer(ClockTimer::local())
        .with_writer(std::io::stdout)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
}
