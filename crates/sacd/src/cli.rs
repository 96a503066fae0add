//! Command line

use clap::Parser;
use std::path::PathBuf;

/// Default configuration file
pub const DEFAULT_CONFIG: &str = "/etc/sac/sac.conf";

#[derive(Debug, Parser)]
#[command(name = "sacd")]
#[command(about = "Source address client: reconfigures services when the default source address changes")]
#[command(version)]
pub struct Args {
    /// Enable logging of DEBUG messages
    #[arg(short, long)]
    pub debug: bool,

    /// Process announcements from any source
    #[arg(short = 'I', long)]
    pub insecure: bool,

    /// Quit after first source address change
    #[arg(short = 'O', long)]
    pub one_shot: bool,

    /// Specify configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Log messages to stderr (not syslog)
    #[arg(short = 'e', long, conflicts_with = "syslog")]
    pub stderr: bool,

    /// Log messages to syslog (not stderr)
    #[arg(short = 'l', long)]
    pub syslog: bool,
}

impl Args {
    /// Explicit log destination, if one was requested
    pub fn use_syslog(&self) -> Option<bool> {
        match (self.stderr, self.syslog) {
            (true, _) => Some(false),
            (_, true) => Some(true),
            _ => None,
        }
    }
}
