use std::num::NonZeroU32;
use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;

use crate::console::Verbosity;
use crate::restore::format::DumpFormat;
use crate::restore::{DumpSource, RestoreRequest};

#[derive(Clone, Debug, Parser)]
#[command(
    name = "restoretool",
    version = env!("CARGO_PKG_VERSION"),
    about = "Restore PostgreSQL and TimescaleDB dumps into a managed database service",
    long_about = None
)]
pub struct Cli {
    /// Dump to restore: a file, a directory-format dump, or "-" for stdin
    #[arg(value_name = "DUMP")]
    pub dump: PathBuf,

    /// Service to restore into
    #[arg(short, long, value_name = "ID")]
    pub service: String,

    /// Target database name
    #[arg(short, long, default_value = "defaultdb")]
    pub database: String,

    /// Role to connect as
    #[arg(long, default_value = "admin")]
    pub role: String,

    /// Dump format, when detection needs overriding
    #[arg(short, long, value_name = "FORMAT", value_parser = DumpFormat::from_str)]
    pub format: Option<DumpFormat>,

    /// Drop existing objects before recreating them (archive dumps only)
    #[arg(long)]
    pub clean: bool,

    /// Abort at the first failed statement or archive entry
    #[arg(long)]
    pub stop_on_error: bool,

    /// Run the whole restore inside one transaction
    #[arg(short = '1', long, conflicts_with = "jobs")]
    pub single_transaction: bool,

    /// Parallel worker count for pg_restore
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<NonZeroU32>,

    /// Run the TimescaleDB restore hooks even when the extension is not detected
    #[arg(long, conflicts_with = "skip_hooks")]
    pub with_hooks: bool,

    /// Never run the TimescaleDB restore hooks
    #[arg(long)]
    pub skip_hooks: bool,

    /// Skip the confirmation prompt for destructive restores
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Fail preflight when no stored password is found for the role
    #[arg(long)]
    pub require_stored_password: bool,

    /// Print warnings and errors only
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Print extra diagnostics, including the exact tool invocations
    #[arg(short, long)]
    pub verbose: bool,

    /// Alternate config file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl Cli {
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else if self.verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        }
    }

    pub fn into_request(self) -> RestoreRequest {
        let verbosity = self.verbosity();
        let source = if self.dump.as_os_str() == "-" {
            DumpSource::Stdin
        } else {
            DumpSource::File(self.dump)
        };
        RestoreRequest {
            service_id: self.service,
            database: self.database,
            role: self.role,
            source,
            format_override: self.format,
            clean: self.clean,
            stop_on_error: self.stop_on_error,
            single_transaction: self.single_transaction,
            jobs: self.jobs,
            force_hooks: self.with_hooks,
            skip_hooks: self.skip_hooks,
            assume_yes: self.yes,
            require_stored_password: self.require_stored_password,
            verbosity,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_target_the_default_database_as_admin() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from(["restoretool", "dump.sql", "--service", "svc-1"])?;
        assert_eq!(cli.database, "defaultdb");
        assert_eq!(cli.role, "admin");
        assert_eq!(cli.verbosity(), Verbosity::Normal);
        assert!(!cli.clean);

        let request = cli.into_request();
        assert!(matches!(request.source, DumpSource::File(_)));
        Ok(())
    }

    #[test]
    fn dash_reads_from_stdin() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from(["restoretool", "-", "--service", "svc-1"])?;
        assert!(cli.into_request().source.is_stdin());
        Ok(())
    }

    #[test]
    fn format_override_accepts_the_short_spellings() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from([
            "restoretool", "dump.bin", "--service", "svc-1", "--format", "gz",
        ])?;
        assert_eq!(cli.format, Some(DumpFormat::PlainCompressed));
        Ok(())
    }

    #[test]
    fn single_transaction_conflicts_with_jobs() {
        let result = Cli::try_parse_from([
            "restoretool", "dump.dump", "--service", "svc-1", "-1", "--jobs", "4",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn hook_flags_conflict() {
        let result = Cli::try_parse_from([
            "restoretool", "dump.sql", "--service", "svc-1", "--with-hooks", "--skip-hooks",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        let result = Cli::try_parse_from([
            "restoretool", "dump.sql", "--service", "svc-1", "--quiet", "--verbose",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn jobs_rejects_zero() {
        let result = Cli::try_parse_from([
            "restoretool", "dump.dump", "--service", "svc-1", "--jobs", "0",
        ]);
        assert!(result.is_err());
    }
}
