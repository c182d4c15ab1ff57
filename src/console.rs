use console::style;

/// Output volume requested on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

impl Verbosity {
    pub fn is_quiet(&self) -> bool {
        *self == Verbosity::Quiet
    }

    pub fn is_verbose(&self) -> bool {
        *self == Verbosity::Verbose
    }
}

/// All progress and warnings go to stderr; stdout stays reserved for child
/// tool passthrough.
#[derive(Debug, Clone, Copy)]
pub struct Console {
    verbosity: Verbosity,
}

impl Console {
    pub fn new(verbosity: Verbosity) -> Self {
        Console { verbosity }
    }

    pub fn is_quiet(&self) -> bool {
        self.verbosity.is_quiet()
    }

    pub fn is_verbose(&self) -> bool {
        self.verbosity.is_verbose()
    }

    /// Routine progress line, suppressed by --quiet.
    pub fn info(&self, msg: &str) {
        if self.verbosity != Verbosity::Quiet {
            eprintln!("{msg}");
        }
    }

    /// Checkmarked progress line, suppressed by --quiet.
    pub fn success(&self, msg: &str) {
        if self.verbosity != Verbosity::Quiet {
            eprintln!("{} {msg}", style("✓").for_stderr().green());
        }
    }

    /// Warnings always print, even under --quiet.
    pub fn warn(&self, msg: &str) {
        eprintln!("{} {msg}", style("⚠").for_stderr().yellow());
    }

    /// Extra detail, printed only with --verbose.
    pub fn verbose(&self, msg: &str) {
        if self.verbosity == Verbosity::Verbose {
            eprintln!("{}", style(msg).for_stderr().dim());
        }
    }

    /// A line of child-tool stderr, relayed as it arrives.
    pub fn tool_line(&self, line: &str) {
        eprintln!("{}", style(line).for_stderr().dim());
    }
}
