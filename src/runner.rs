use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    rc::Rc,
};

use crate::{
    allocation::{merge_overrides, AllocationMap},
    location,
    random::RandomSource,
    segmentation::compute_selections,
    settings::Settings,
    storage::PersistentStore,
    tracking::{error_report, GlobalVariableTracker, Tracker},
    Activation, Error, Experiment, Result, RunnerConfig, Window,
};

/// How a run ended. A run never propagates failures to its caller.
#[derive(Debug)]
pub enum RunOutcome {
    /// The kill switch was present in the URL. Nothing was read, written or executed.
    Disabled,
    /// Allocations were persisted and `selected` triggers were armed.
    Completed { selected: usize },
    /// The run was aborted. The error has already been logged and tracked.
    Failed(Error),
}

/// Runs a set of experiments against a page.
///
/// A run loads the persisted allocations, applies URL overrides, allocates new experiments,
/// publishes tracking, persists the allocations and finally arms every selected trigger.
///
/// ```
/// # use std::rc::Rc;
/// # use mvt::{triggers, Experiment, MemoryWindow, RunnerConfig, Variation, Window};
/// let window = Rc::new(MemoryWindow::new());
/// let runner = RunnerConfig::new().to_runner(window.clone());
///
/// let experiments = [Experiment::new(1, triggers::immediately())
///     .variation(Variation::new(1.0))
///     .variation(Variation::new(1.0).style("body{color:red}"))];
/// runner.run(&experiments);
///
/// assert!(window.global("nuk_mvt_tracking").is_some());
/// ```
pub struct ExperimentRunner {
    window: Rc<dyn Window>,
    settings: Settings,
    store: PersistentStore,
    tracker: Box<dyn Tracker>,
    random: Box<dyn RandomSource>,
}

impl ExperimentRunner {
    pub fn new(config: RunnerConfig, window: Rc<dyn Window>) -> Self {
        let RunnerConfig {
            settings,
            persistence,
            tracker,
            random,
        } = config;

        let tracker = tracker.unwrap_or_else(|| {
            Box::new(GlobalVariableTracker::new(
                window.clone(),
                settings.analytics.clone(),
            ))
        });

        ExperimentRunner {
            store: PersistentStore::new(window.clone(), persistence),
            window,
            settings,
            tracker,
            random,
        }
    }

    pub fn run(&self, experiments: &[Experiment]) -> RunOutcome {
        // Until the URL says otherwise, failures are surfaced in full.
        let mut debug = true;

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.run_protected(experiments, &mut debug)
        }));

        let error = match result {
            Ok(Ok(outcome)) => return outcome,
            Ok(Err(err)) => err,
            Err(payload) => Error::RunPanicked(panic_message(payload)),
        };

        self.handle_error(&error, debug);
        RunOutcome::Failed(error)
    }

    fn run_protected(&self, experiments: &[Experiment], debug: &mut bool) -> Result<RunOutcome> {
        let window = &*self.window;

        if location::is_disabled(window, &self.settings.url) {
            window.console_log("ab-test:disable");
            log::info!(target: "mvt", "experiments disabled through the URL");
            return Ok(RunOutcome::Disabled);
        }

        *debug = location::is_debug_enabled(window, &self.settings.url);
        if *debug {
            window.console_log("ab-test:debug");
        }

        let storage_key = &self.settings.storage.key;
        let persisted = self
            .store
            .get(storage_key)
            .map(AllocationMap::from_json_value)
            .unwrap_or_default();
        let mut allocations =
            merge_overrides(window, &persisted, &self.settings.url.override_param);

        let selections =
            compute_selections(Some(experiments), Some(&mut allocations), &*self.random)?;
        log::debug!(target: "mvt",
                    experiments = experiments.len(),
                    selected = selections.len();
                    "computed selections");

        self.tracker.track_selections(&selections)?;
        self.store
            .set(storage_key, &serde_json::to_value(&allocations)?);

        for selected in &selections {
            (selected.trigger)(Activation::new(self.window.clone(), selected));
        }

        Ok(RunOutcome::Completed {
            selected: selections.len(),
        })
    }

    fn handle_error(&self, error: &Error, debug: bool) {
        self.window.console_log("nuk-mvt:error");
        if error.is_programmer_error() {
            log::error!(target: "mvt", debug; "experiments were set up incorrectly: {error}");
        } else {
            log::warn!(target: "mvt", debug; "experiment run failed: {error}");
        }

        self.tracker.track_error(error);

        if debug {
            self.window.console_log(&error_report(error));
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use serde_json::json;

    use super::*;
    use crate::{
        random::FixedRandom, triggers, window::Storage, AnalyticsSettings, MemoryStorage,
        MemoryWindow, SelectedVariation, Variation,
    };

    const KEY: &str = "nuk_mvt";

    type Log = Rc<RefCell<Vec<String>>>;

    fn recording(log: &Log, label: &str) -> Variation {
        let log = log.clone();
        let label = label.to_owned();
        Variation::new(1.0).effect(move |_, options| {
            log.borrow_mut().push(format!("{label} {options}"));
        })
    }

    fn experiments(log: &Log) -> Vec<Experiment> {
        vec![
            Experiment::new(7, triggers::immediately())
                .variation(recording(log, "7.0"))
                .variation(recording(log, "7.1").style(".seven{}")),
            Experiment::new(4, triggers::immediately())
                .variation(recording(log, "4.0"))
                .variation(recording(log, "4.1")),
        ]
    }

    fn runner(window: &Rc<MemoryWindow>, fractions: &[f64]) -> ExperimentRunner {
        let mut settings = Settings::default();
        settings.analytics = AnalyticsSettings {
            prefix: "C".to_owned(),
            ..Default::default()
        };
        let mut config = RunnerConfig::from_settings(settings);
        config.random_source(FixedRandom::new(fractions.to_vec()));
        config.to_runner(window.clone())
    }

    fn persisted(window: &MemoryWindow) -> serde_json::Value {
        let raw = window.memory_local_storage().unwrap().raw(KEY).unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    #[test]
    fn full_run_allocates_persists_tracks_and_executes() {
        let _ = env_logger::builder().is_test(true).try_init();
        let window = Rc::new(MemoryWindow::new());
        let log = Log::default();

        let outcome = runner(&window, &[0.9, 0.1]).run(&experiments(&log));

        assert!(matches!(outcome, RunOutcome::Completed { selected: 2 }));
        assert_eq!(persisted(&window), json!({"7": 1, "4": 0}));
        assert_eq!(window.global("nuk_mvt_tracking").as_deref(), Some("C4:0-C7:1"));
        assert_eq!(*log.borrow(), vec!["7.1 null", "4.0 null"]);
        assert_eq!(window.styles(), vec![".seven{}"]);
        assert!(window.console_lines().is_empty());
    }

    #[test]
    fn allocations_survive_across_runs() {
        let window = Rc::new(MemoryWindow::new());
        let log = Log::default();

        runner(&window, &[0.9, 0.9]).run(&experiments(&log));
        runner(&window, &[0.0, 0.0]).run(&experiments(&log));

        assert_eq!(persisted(&window), json!({"7": 1, "4": 1}));
        assert_eq!(*log.borrow(), vec!["7.1 null", "4.1 null", "7.1 null", "4.1 null"]);
    }

    #[test]
    fn allocations_survive_when_local_storage_is_full() {
        let window = Rc::new(
            MemoryWindow::new().with_local_storage(Some(MemoryStorage::new().with_quota(4))),
        );
        let log = Log::default();

        runner(&window, &[0.9, 0.9]).run(&experiments(&log));
        runner(&window, &[0.0, 0.0]).run(&experiments(&log));

        let session = window.memory_session_storage().unwrap().raw(KEY).unwrap();
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&session).unwrap(),
            json!({"7": 1, "4": 1})
        );
        assert_eq!(*log.borrow(), vec!["7.1 null", "4.1 null", "7.1 null", "4.1 null"]);
    }

    #[test]
    fn url_overrides_are_applied_and_persisted() {
        let window = Rc::new(MemoryWindow::new().with_hash("#mvt=7.0-99.3"));
        window
            .memory_local_storage()
            .unwrap()
            .set_item(KEY, r#"{"7": 1, "4": 1}"#)
            .unwrap();
        let log = Log::default();

        runner(&window, &[0.0]).run(&experiments(&log));

        assert_eq!(persisted(&window), json!({"7": 0, "4": 1, "99": 3}));
        assert_eq!(window.global("nuk_mvt_tracking").as_deref(), Some("C4:1-C7:0"));
        assert_eq!(*log.borrow(), vec!["7.0 null", "4.1 null"]);
    }

    #[test]
    fn kill_switch_prevents_everything() {
        let window = Rc::new(MemoryWindow::new().with_hash("#debug_ab_tests&disable_ab_tests"));
        let log = Log::default();

        let outcome = runner(&window, &[0.5]).run(&experiments(&log));

        assert!(matches!(outcome, RunOutcome::Disabled));
        assert_eq!(window.memory_local_storage().unwrap().accesses(), 0);
        assert_eq!(window.memory_session_storage().unwrap().accesses(), 0);
        assert!(window.cookie_writes().is_empty());
        assert_eq!(window.global("nuk_mvt_tracking"), None);
        assert!(log.borrow().is_empty());
        assert_eq!(window.console_lines(), vec!["ab-test:disable"]);
    }

    #[test]
    fn corrupt_storage_starts_from_empty_map() {
        let window = Rc::new(MemoryWindow::new());
        window
            .memory_local_storage()
            .unwrap()
            .set_item(KEY, "[1, 2")
            .unwrap();
        let log = Log::default();

        let outcome = runner(&window, &[0.0]).run(&experiments(&log));

        assert!(matches!(outcome, RunOutcome::Completed { selected: 2 }));
        assert_eq!(persisted(&window), json!({"7": 0, "4": 0}));
    }

    #[test]
    fn unavailable_storage_degrades_to_cookie() {
        let window = Rc::new(
            MemoryWindow::new()
                .with_local_storage(Some(MemoryStorage::failing()))
                .with_session_storage(None),
        );
        let log = Log::default();

        runner(&window, &[0.9, 0.9]).run(&experiments(&log));
        runner(&window, &[0.0, 0.0]).run(&experiments(&log));

        assert_eq!(window.cookie_writes().len(), 2);
        assert_eq!(*log.borrow(), vec!["7.1 null", "4.1 null", "7.1 null", "4.1 null"]);
    }

    #[test]
    fn deferred_trigger_fires_after_run() {
        let window = Rc::new(MemoryWindow::new());
        let log = Log::default();
        let armed: Rc<RefCell<Option<Activation>>> = Rc::default();

        let experiment = {
            let armed = armed.clone();
            Experiment::new(1, move |activation| *armed.borrow_mut() = Some(activation))
                .variation(recording(&log, "1.0"))
        };
        let never = Experiment::new(2, |_activation| {}).variation(recording(&log, "2.0"));

        runner(&window, &[0.0]).run(&[experiment, never]);
        assert!(log.borrow().is_empty());

        let activation = armed.borrow_mut().take().unwrap();
        assert_eq!(activation.experiment_id(), 1);
        activation.fire(&json!({"elements": 3}));
        assert_eq!(*log.borrow(), vec![r#"1.0 {"elements":3}"#]);
    }

    #[test]
    fn panicking_trigger_is_isolated_and_tracked() {
        let window = Rc::new(MemoryWindow::new().with_hash("#debug_ab_tests"));
        let experiment =
            Experiment::new(3, |_activation| panic!("boom")).variation(Variation::new(1.0));

        let outcome = runner(&window, &[0.0]).run(&[experiment]);

        assert!(matches!(outcome, RunOutcome::Failed(Error::RunPanicked(ref m)) if m == "boom"));
        assert_eq!(
            window.global("nuk_mvt_tracking").as_deref(),
            Some("C3:0(error)")
        );
        assert_eq!(
            window.global("nuk_mvt_error").as_deref(),
            Some("experiment run panicked: boom")
        );
        assert_eq!(
            window.console_lines(),
            vec![
                "ab-test:debug",
                "nuk-mvt:error",
                "experiment run panicked: boom"
            ]
        );
    }

    struct FailingTracker(Rc<RefCell<Vec<String>>>);

    impl Tracker for FailingTracker {
        fn track_selections(&self, _selections: &[SelectedVariation]) -> Result<()> {
            Err(Error::StorageUnavailable("analytics slot is read-only".to_owned()))
        }
        fn track_error(&self, error: &Error) {
            self.0.borrow_mut().push(error.to_string());
        }
    }

    #[test]
    fn tracker_failure_aborts_before_persisting() {
        let window = Rc::new(MemoryWindow::new());
        let errors = Rc::new(RefCell::new(Vec::new()));
        let log = Log::default();

        let mut config = RunnerConfig::new();
        config
            .tracker(FailingTracker(errors.clone()))
            .random_source(FixedRandom::new([0.0]));
        let outcome = config.to_runner(window.clone()).run(&experiments(&log));

        assert!(matches!(outcome, RunOutcome::Failed(Error::StorageUnavailable(_))));
        assert_eq!(
            *errors.borrow(),
            vec!["storage unavailable: analytics slot is read-only"]
        );
        assert_eq!(window.memory_local_storage().unwrap().raw(KEY), None);
        assert!(log.borrow().is_empty());
        // Debug output is off unless requested through the URL.
        assert_eq!(window.console_lines(), vec!["nuk-mvt:error"]);
    }

    #[test]
    fn without_tracking_leaves_globals_untouched() {
        let window = Rc::new(MemoryWindow::new());
        let log = Log::default();

        let mut config = RunnerConfig::new();
        config.without_tracking();
        config.to_runner(window.clone()).run(&experiments(&log));

        assert_eq!(window.global("nuk_mvt_tracking"), None);
        assert_eq!(log.borrow().len(), 2);
    }
}
