use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "browser-remote")]
#[command(about = "Native messaging host that evaluates HTTP queries in the browser")]
pub struct Args {
    /// Web server hostname
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Web server port; the next free port is used if it is taken
    #[arg(long, default_value_t = 5555)]
    pub port: u16,

    /// How many ports to try before giving up
    #[arg(long, default_value_t = 10)]
    pub port_tries: u32,

    /// Seconds to wait for the browser before answering with a timeout
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Log file, appended to
    #[arg(long, default_value = "browser_remote.log")]
    pub log_file: PathBuf,

    /// Log to stderr instead of the log file
    #[arg(long)]
    pub log_stderr: bool,

    /// Arguments the browser passes to native hosts (extension origin, window id)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, hide = true)]
    pub browser_args: Vec<String>,
}
