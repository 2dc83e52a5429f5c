//! Exit codes for the `km` CLI.
//!
//! Exit code ranges:
//! - 0-9: operational outcomes (the run or command completed, maybe partially)
//! - 10-19: user/environment errors (recoverable by user action)
//! - 20-29: internal errors

/// Exit codes for `km` commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Command completed.
    Clean = 0,

    /// Run persisted, but the report could not be delivered.
    DeliveryFailed = 3,

    /// Run persisted, but analysis preconditions failed.
    AnalysisFailed = 4,

    /// The sample source failed unrecoverably; the poller stopped.
    SourceLost = 6,

    /// Invalid arguments or input files.
    ArgsError = 10,

    /// Configuration could not be loaded or is invalid.
    ConfigError = 11,

    /// Run record missing, unreadable or of an unsupported version.
    RecordError = 15,

    /// Internal error (bug).
    InternalError = 20,

    /// I/O error.
    IoError = 21,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == ExitCode::Clean
    }

    /// Codes below 10 describe how a run ended rather than a failure to run.
    pub fn is_operational(self) -> bool {
        (self as i32) < 10
    }

    pub fn is_user_error(self) -> bool {
        (10..20).contains(&(self as i32))
    }

    pub fn is_internal_error(self) -> bool {
        (self as i32) >= 20
    }

    /// Stable name for JSON output.
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK",
            ExitCode::DeliveryFailed => "ERR_DELIVERY",
            ExitCode::AnalysisFailed => "ERR_ANALYSIS",
            ExitCode::SourceLost => "ERR_SOURCE",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::RecordError => "ERR_RECORD",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges() {
        assert!(ExitCode::Clean.is_success());
        assert!(ExitCode::DeliveryFailed.is_operational());
        assert!(!ExitCode::DeliveryFailed.is_success());
        assert!(ExitCode::ConfigError.is_user_error());
        assert!(ExitCode::IoError.is_internal_error());
    }

    #[test]
    fn display() {
        assert_eq!(ExitCode::RecordError.to_string(), "ERR_RECORD (15)");
        assert_eq!(i32::from(ExitCode::SourceLost), 6);
    }
}
