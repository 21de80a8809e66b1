use std::rc::Rc;

use crate::{
    random::{RandomSource, ThreadRandom},
    settings::Settings,
    storage::Persistence,
    tracking::{NoopTracker, Tracker},
    ExperimentRunner, Window,
};

/// Configuration for [`ExperimentRunner`].
pub struct RunnerConfig {
    pub(crate) settings: Settings,
    pub(crate) persistence: Persistence,
    /// `None` publishes tracking through a global page variable.
    pub(crate) tracker: Option<Box<dyn Tracker>>,
    pub(crate) random: Box<dyn RandomSource>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig::from_settings(Settings::default())
    }
}

impl RunnerConfig {
    /// Create a runner configuration with default settings.
    ///
    /// ```
    /// # use mvt::RunnerConfig;
    /// RunnerConfig::new();
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: Settings) -> Self {
        RunnerConfig {
            settings,
            persistence: Persistence::Local,
            tracker: None,
            random: Box::new(ThreadRandom),
        }
    }

    pub fn settings(&mut self, settings: Settings) -> &mut Self {
        self.settings = settings;
        self
    }

    /// Choose how long allocations are kept. Defaults to [`Persistence::Local`].
    pub fn persistence(&mut self, persistence: Persistence) -> &mut Self {
        self.persistence = persistence;
        self
    }

    /// Send run outcomes to a custom tracker instead of the global page variable.
    ///
    /// ```
    /// # use mvt::{Error, RunnerConfig, SelectedVariation, Tracker};
    /// struct Stdout;
    /// impl Tracker for Stdout {
    ///     fn track_selections(&self, selections: &[SelectedVariation]) -> mvt::Result<()> {
    ///         println!("{selections:?}");
    ///         Ok(())
    ///     }
    ///     fn track_error(&self, error: &Error) {
    ///         println!("{error}");
    ///     }
    /// }
    ///
    /// let mut config = RunnerConfig::new();
    /// config.tracker(Stdout);
    /// ```
    pub fn tracker(&mut self, tracker: impl Tracker + 'static) -> &mut Self {
        self.tracker = Some(Box::new(tracker));
        self
    }

    /// Do not report selections or errors anywhere.
    pub fn without_tracking(&mut self) -> &mut Self {
        self.tracker(NoopTracker)
    }

    /// Override the randomness used for new allocations.
    pub fn random_source(&mut self, random: impl RandomSource + 'static) -> &mut Self {
        self.random = Box::new(random);
        self
    }

    /// Create an [`ExperimentRunner`] bound to `window`.
    ///
    /// ```
    /// # use std::rc::Rc;
    /// # use mvt::{MemoryWindow, RunnerConfig};
    /// let runner = RunnerConfig::new().to_runner(Rc::new(MemoryWindow::new()));
    /// ```
    pub fn to_runner(self, window: Rc<dyn Window>) -> ExperimentRunner {
        ExperimentRunner::new(self, window)
    }
}
