use console::style;
use std::process;

use crate::CommandError;

/// Reports `error` with its whole context chain on stderr and exits with status 1.
pub fn exit_with_error(error: CommandError) -> ! {
    eprintln!("{} {:#}", style("[ERROR]").for_stderr().red().bold(), error);
    process::exit(1)
}
