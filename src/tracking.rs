use std::{error::Error as _, rc::Rc};

use regex::Regex;

use crate::{
    settings::AnalyticsSettings, Error, ExperimentId, Result, SelectedVariation, Window,
};

/// Receives the outcome of a run for analytics.
pub trait Tracker {
    /// Publish the variations selected during a run.
    fn track_selections(&self, selections: &[SelectedVariation]) -> Result<()>;
    /// Record that a run failed.
    fn track_error(&self, error: &Error);
}

pub(crate) struct NoopTracker;
impl Tracker for NoopTracker {
    fn track_selections(&self, _selections: &[SelectedVariation]) -> Result<()> {
        Ok(())
    }
    fn track_error(&self, _error: &Error) {}
}

/// Publishes the tracking string into a global slot of the page, where the analytics tag picks
/// it up.
pub struct GlobalVariableTracker {
    window: Rc<dyn Window>,
    analytics: AnalyticsSettings,
}

impl GlobalVariableTracker {
    pub fn new(window: Rc<dyn Window>, analytics: AnalyticsSettings) -> Self {
        GlobalVariableTracker { window, analytics }
    }
}

impl Tracker for GlobalVariableTracker {
    fn track_selections(&self, selections: &[SelectedVariation]) -> Result<()> {
        let encoded = encode_selections(
            selections
                .iter()
                .map(|s| (s.experiment_id, s.variation_index)),
            &self.analytics,
        );
        log::trace!(target: "mvt", tracking = encoded.as_str(); "publishing tracking variable");
        self.window.set_global(&self.analytics.variable, encoded);
        Ok(())
    }

    fn track_error(&self, error: &Error) {
        let current = self.window.global(&self.analytics.variable).unwrap_or_default();
        self.window
            .set_global(&self.analytics.variable, format!("{current}(error)"));
        self.window
            .set_global(&self.analytics.error, error_report(error));
    }
}

/// Encode `experiment:variation` pairs as `<prefix><id>:<index>` entries, sorted and joined with
/// the separator.
pub fn encode_selections(
    pairs: impl IntoIterator<Item = (ExperimentId, usize)>,
    analytics: &AnalyticsSettings,
) -> String {
    let mut entries: Vec<String> = pairs
        .into_iter()
        .map(|(id, index)| format!("{}{id}:{index}", analytics.prefix))
        .collect();
    entries.sort();
    entries.join(&analytics.separator)
}

/// Error message followed by its sources, one per line, without indentation.
pub fn error_report(error: &Error) -> String {
    let mut report = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        report.push_str(&format!("\ncaused by: {cause}"));
        source = cause.source();
    }

    match Regex::new(r"\n\s+") {
        Ok(indent) => indent.replace_all(&report, "\n").into_owned(),
        Err(_) => report,
    }
}
