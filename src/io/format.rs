//! Nice GUGA-CI output formatting.

use std::fmt;

use log;

const GUGACI_BANNER_LENGTH: usize = 103;

/// Logs a warning to the `gugaci-output` logger.
macro_rules! gugaci_warn {
    ($fmt:expr $(, $($arg:tt)*)?) => { log::warn!(target: "gugaci-output", $fmt, $($($arg)*)?); }
}

/// Logs a main output line to the `gugaci-output` logger.
macro_rules! gugaci_output {
    ($fmt:expr $(, $($arg:tt)*)?) => { log::info!(target: "gugaci-output", $fmt, $($($arg)*)?); }
}

pub(crate) use {gugaci_output, gugaci_warn};

/// Logs a nicely formatted section title to the `gugaci-output` logger.
pub(crate) fn log_title(title: &str) {
    let length = title.chars().count().max(GUGACI_BANNER_LENGTH - 6);
    let bar = "─".repeat(length);
    gugaci_output!("┌──{bar}──┐");
    gugaci_output!("│§ {title:^length$} §│");
    gugaci_output!("└──{bar}──┘");
}

/// Logs a nicely formatted subtitle to the `gugaci-output` logger.
pub(crate) fn log_subtitle(subtitle: &str) {
    let length = subtitle.chars().count();
    let bar = "═".repeat(length);
    gugaci_output!("{}", subtitle);
    gugaci_output!("{}", bar);
}

/// A trait for logging GUGA-CI outputs nicely.
pub(crate) trait GugaCiOutput: fmt::Debug + fmt::Display {
    /// Logs display output nicely.
    fn log_output_display(&self) {
        let lines = self.to_string();
        lines.lines().for_each(|line| {
            gugaci_output!("{line}");
        })
    }

    /// Logs debug output nicely.
    fn log_output_debug(&self) {
        let lines = format!("{self:?}");
        lines.lines().for_each(|line| {
            gugaci_output!("{line}");
        })
    }
}

impl<T: fmt::Debug + fmt::Display> GugaCiOutput for T {}
