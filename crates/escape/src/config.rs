#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DebugLevel {
    /// No diagnostics.
    Off,
    /// One line per decision: leaking parameters, heap allocations, moved
    /// variables and allocations that do not escape.
    Summary,
    /// `Summary` with levels and loop depths appended.
    Verbose,
}

#[derive(Debug, Clone)]
pub struct EscapeConfig {
    pub debug: DebugLevel,
    /// Diagnostics kept in the report; `0` keeps all of them.
    pub max_diagnostics: usize,
}

impl EscapeConfig {
    pub fn for_level(debug: DebugLevel) -> Self {
        match debug {
            DebugLevel::Off => Self {
                debug,
                max_diagnostics: 200,
            },
            DebugLevel::Summary => Self {
                debug,
                max_diagnostics: 200,
            },
            DebugLevel::Verbose => Self {
                debug,
                max_diagnostics: 500,
            },
        }
    }

    pub fn should_report(&self) -> bool {
        !matches!(self.debug, DebugLevel::Off)
    }

    pub fn is_verbose(&self) -> bool {
        matches!(self.debug, DebugLevel::Verbose)
    }
}

impl Default for EscapeConfig {
    fn default() -> Self {
        Self::for_level(DebugLevel::Off)
    }
}
