mod config;
mod diagnostics;

pub use config::*;
pub use diagnostics::format_diagnostics;
pub use diagnostics::Diagnostic;
pub use diagnostics::Diagnostics;
pub use diagnostics::SourceInfo;
pub use diagnostics::Warning;

#[cfg(test)]
pub(crate) use config::tests::SAMPLE as SAMPLE_CONFIG;
