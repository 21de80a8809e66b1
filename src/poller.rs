//! Waiting for the page to be ready before a variation touches it.
//!
//! [`DomPoller`] is a state machine: each [`DomPoller::tick`] checks the selector requirements and
//! predicates once. [`DomPoller::run`] drives it on the current thread, sleeping between ticks on
//! a stop channel so the owner of the page can cancel it.
use std::{
    sync::mpsc::{Receiver, RecvTimeoutError},
    time::Duration,
};

use crate::window::{ElementRef, Window};

/// Elements that must be present, and how many of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorRequirement {
    pub selector: String,
    pub quantity: usize,
}

impl From<&str> for SelectorRequirement {
    fn from(selector: &str) -> Self {
        SelectorRequirement {
            selector: selector.to_owned(),
            quantity: 1,
        }
    }
}

impl From<(&str, usize)> for SelectorRequirement {
    fn from((selector, quantity): (&str, usize)) -> Self {
        SelectorRequirement {
            selector: selector.to_owned(),
            quantity,
        }
    }
}

pub type Predicate = Box<dyn Fn(&dyn Window) -> bool>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    /// Every selector resolved and every predicate held. One list of elements per selector.
    Ready(Vec<Vec<ElementRef>>),
    /// Not ready yet, try again after the interval. `missing` names the first unresolved
    /// selector, `None` when only predicates are failing.
    Pending { missing: Option<String> },
    /// The time ceiling was reached. The poller will not report ready anymore.
    TimedOut { missing: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Ready(Vec<Vec<ElementRef>>),
    TimedOut { missing: Option<String> },
    Cancelled,
}

pub struct DomPoller {
    requirements: Vec<SelectorRequirement>,
    predicates: Vec<Predicate>,
    resolved: Vec<Option<Vec<ElementRef>>>,
    interval: Duration,
    limit: Duration,
    elapsed: Duration,
    timed_out: bool,
}

impl DomPoller {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);
    pub const DEFAULT_LIMIT: Duration = Duration::from_secs(15);

    pub fn new<S: Into<SelectorRequirement>>(selectors: impl IntoIterator<Item = S>) -> Self {
        let requirements: Vec<SelectorRequirement> =
            selectors.into_iter().map(Into::into).collect();
        DomPoller {
            resolved: vec![None; requirements.len()],
            requirements,
            predicates: Vec::new(),
            interval: Self::DEFAULT_INTERVAL,
            limit: Self::DEFAULT_LIMIT,
            elapsed: Duration::ZERO,
            timed_out: false,
        }
    }

    /// Additionally require `predicate` to hold in the same tick as the selectors.
    pub fn predicate(mut self, predicate: impl Fn(&dyn Window) -> bool + 'static) -> Self {
        self.predicates.push(Box::new(predicate));
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_limit(mut self, limit: Duration) -> Self {
        self.limit = limit;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Check the page once.
    pub fn tick(&mut self, window: &dyn Window) -> PollState {
        let missing = self.resolve_selectors(window);

        if self.timed_out {
            return PollState::TimedOut { missing };
        }

        if missing.is_none() && self.predicates.iter().all(|p| p(window)) {
            let elements = self.resolved.iter().flatten().cloned().collect();
            return PollState::Ready(elements);
        }

        self.elapsed += self.interval;
        if self.elapsed < self.limit {
            return PollState::Pending { missing };
        }

        self.timed_out = true;
        let target = missing
            .as_deref()
            .map(|selector| format!(":{selector}"))
            .unwrap_or_default();
        window.console_log(&format!("ab-test:timeout{target}"));
        log::warn!(target: "mvt", missing = missing.as_deref(); "gave up waiting for the page");
        PollState::TimedOut { missing }
    }

    /// Tick until ready, timed out or cancelled through `stop`.
    pub fn run(mut self, window: &dyn Window, stop: &Receiver<()>) -> PollOutcome {
        loop {
            match self.tick(window) {
                PollState::Ready(elements) => return PollOutcome::Ready(elements),
                PollState::TimedOut { missing } => return PollOutcome::TimedOut { missing },
                PollState::Pending { .. } => {}
            }

            match stop.recv_timeout(self.interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) => {
                    log::debug!(target: "mvt", "poller received stop command");
                    return PollOutcome::Cancelled;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    // Nobody can cancel anymore, keep polling at the same pace.
                    std::thread::sleep(self.interval);
                }
            }
        }
    }

    /// Return the first selector that is still short of elements. Resolved selectors are not
    /// queried again.
    fn resolve_selectors(&mut self, window: &dyn Window) -> Option<String> {
        for (requirement, slot) in self.requirements.iter().zip(self.resolved.iter_mut()) {
            if slot.is_some() {
                continue;
            }
            let found = window.query_selector_all(&requirement.selector);
            if found.len() < requirement.quantity {
                return Some(requirement.selector.clone());
            }
            *slot = Some(found);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc, sync::mpsc};

    use super::*;
    use crate::MemoryWindow;

    #[test]
    fn ready_immediately_without_selectors() {
        let window = MemoryWindow::new();
        let mut poller = DomPoller::new(Vec::<&str>::new());
        assert_eq!(poller.tick(&window), PollState::Ready(vec![]));
    }

    #[test]
    fn returns_elements_per_selector() {
        let window = MemoryWindow::new()
            .with_elements("#one", 1)
            .with_elements(".two", 2);
        let mut poller = DomPoller::new(["#one", ".two"]);

        let PollState::Ready(elements) = poller.tick(&window) else {
            panic!("expected ready");
        };
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].len(), 1);
        assert_eq!(elements[1][1].selector, ".two");
        assert_eq!(elements[1][1].position, 1);
    }

    #[test]
    fn waits_for_missing_elements() {
        let window = MemoryWindow::new().with_elements("#one", 1);
        let mut poller = DomPoller::new(["#one", "#two"]);

        assert_eq!(
            poller.tick(&window),
            PollState::Pending {
                missing: Some("#two".to_owned())
            }
        );

        window.add_elements("#two", 1);
        assert!(matches!(poller.tick(&window), PollState::Ready(_)));
    }

    #[test]
    fn honours_quantity() {
        let window = MemoryWindow::new().with_elements("li", 2);
        let mut poller = DomPoller::new([("li", 3usize)]);
        assert!(matches!(poller.tick(&window), PollState::Pending { .. }));

        window.add_elements("li", 1);
        let PollState::Ready(elements) = poller.tick(&window) else {
            panic!("expected ready");
        };
        assert_eq!(elements[0].len(), 3);
    }

    #[test]
    fn waits_for_predicates_and_selectors_together() {
        let window = MemoryWindow::new();
        let flag = Rc::new(Cell::new(false));
        let mut poller = {
            let flag = flag.clone();
            DomPoller::new(["#form"]).predicate(move |_| flag.get())
        };

        assert_eq!(
            poller.tick(&window),
            PollState::Pending {
                missing: Some("#form".to_owned())
            }
        );

        window.add_elements("#form", 1);
        assert_eq!(poller.tick(&window), PollState::Pending { missing: None });

        flag.set(true);
        assert!(matches!(poller.tick(&window), PollState::Ready(_)));
    }

    #[test]
    fn gives_up_after_150_attempts() {
        let window = MemoryWindow::new();
        let mut poller = DomPoller::new(["#never"]);

        let mut attempts = 0;
        let state = loop {
            attempts += 1;
            match poller.tick(&window) {
                PollState::Pending { .. } => continue,
                state => break state,
            }
        };

        assert_eq!(attempts, 150);
        assert_eq!(
            state,
            PollState::TimedOut {
                missing: Some("#never".to_owned())
            }
        );
        assert_eq!(window.console_lines(), vec!["ab-test:timeout:#never"]);

        // A timed out poller stays timed out.
        window.add_elements("#never", 1);
        assert!(matches!(poller.tick(&window), PollState::TimedOut { .. }));
    }

    #[test]
    fn run_until_ready() {
        let window = MemoryWindow::new();
        let checks = Rc::new(Cell::new(0));
        let poller = {
            let checks = checks.clone();
            DomPoller::new(Vec::<&str>::new())
                .predicate(move |_| {
                    checks.set(checks.get() + 1);
                    checks.get() >= 3
                })
                .with_interval(Duration::from_millis(1))
        };
        let (_stop, stop_receiver) = mpsc::channel();

        assert_eq!(poller.run(&window, &stop_receiver), PollOutcome::Ready(vec![]));
        assert_eq!(checks.get(), 3);
    }

    #[test]
    fn run_times_out() {
        let window = MemoryWindow::new();
        let poller = DomPoller::new(["#never"])
            .with_interval(Duration::from_millis(1))
            .with_limit(Duration::from_millis(5));
        let (_stop, stop_receiver) = mpsc::channel();

        assert_eq!(
            poller.run(&window, &stop_receiver),
            PollOutcome::TimedOut {
                missing: Some("#never".to_owned())
            }
        );
    }

    #[test]
    fn run_can_be_cancelled() {
        let window = MemoryWindow::new();
        let poller = DomPoller::new(["#never"]);
        let (stop, stop_receiver) = mpsc::channel();
        stop.send(()).unwrap();

        assert_eq!(poller.run(&window, &stop_receiver), PollOutcome::Cancelled);
        assert!(window.console_lines().is_empty());
    }
}
