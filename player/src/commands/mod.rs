mod decrypt;
mod probe;
mod type_supported;

pub use decrypt::Decrypt;
pub use probe::Probe;
pub use type_supported::TypeSupported;

use clap::{ColorChoice, Parser, Subcommand};

/// Decrypt and inspect common encryption protected fragmented mp4, and check media source admission rules.
#[derive(Debug, Clone, Parser)]
#[command(version, author = "clitic <clitic21@gmail.com>", about)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// When to output colored text.
    #[arg(long, global = true, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Show debug logs, twice for trace logs.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only show errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    Decrypt(Decrypt),
    Probe(Probe),
    TypeSupported(TypeSupported),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn global_flags_after_subcommand() {
        let args = Args::try_parse_from([
            "player",
            "decrypt",
            "segment.m4s",
            "--key",
            "eb676abbcb345e96bbcf616630f1a3da:100b6c20940f779a4589152b57d2dacb",
            "-o",
            "out.mp4",
            "-vv",
        ])
        .unwrap();

        assert_eq!(args.verbose, 2);
        assert!(!args.quiet);
        assert!(matches!(args.command, Commands::Decrypt(_)));
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        let args = Args::try_parse_from(["player", "-q", "-v", "type-supported", "video/mp4"]);
        assert!(args.is_err());
    }

    #[test]
    fn decrypt_requires_a_key() {
        assert!(Args::try_parse_from(["player", "decrypt", "a.m4s", "-o", "b.mp4"]).is_err());
    }
}
