use crate::entry::Level;
use appinsights_channel::SeverityLevel;

/// Maps an entry level to the Application Insights severity scale.
///
/// `Debug` and `Trace` have no counterpart and map to [`SeverityLevel::Verbose`], the
/// collector's default.
pub const fn map_severity(level: Level) -> SeverityLevel {
    match level {
        Level::Panic | Level::Fatal => SeverityLevel::Critical,
        Level::Error => SeverityLevel::Error,
        Level::Warn => SeverityLevel::Warning,
        Level::Info => SeverityLevel::Information,
        Level::Debug | Level::Trace => SeverityLevel::Verbose,
    }
}
