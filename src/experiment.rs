use std::{fmt, rc::Rc};

use crate::{manifest::Manifest, Result, Window};

pub type ExperimentId = u64;

/// Side effect applied when a variation is activated. Receives the page and the options the
/// trigger passed along.
pub type Effect = Rc<dyn Fn(&dyn Window, &serde_json::Value)>;

/// Gate deciding whether and when a variation runs.
///
/// The trigger receives an [`Activation`] and may fire it right away, keep it to fire later (from
/// an event handler or a poller), or drop it. An armed trigger cannot be cancelled.
pub type Trigger = Rc<dyn Fn(Activation)>;

/// One arm of an experiment.
#[derive(Clone)]
pub struct Variation {
    /// Relative probability mass. Zero-weight variations are only reachable through an explicit
    /// prior allocation.
    pub weight: f64,
    pub style: Option<String>,
    pub effect: Option<Effect>,
}

impl Variation {
    pub fn new(weight: f64) -> Self {
        Variation {
            weight,
            style: None,
            effect: None,
        }
    }

    pub fn style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    pub fn effect(mut self, effect: impl Fn(&dyn Window, &serde_json::Value) + 'static) -> Self {
        self.effect = Some(Rc::new(effect));
        self
    }
}

impl fmt::Debug for Variation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variation")
            .field("weight", &self.weight)
            .field("style", &self.style)
            .field("effect", &self.effect.is_some())
            .finish()
    }
}

/// A declared experiment.
#[derive(Clone)]
pub struct Experiment {
    pub name: Option<String>,
    /// Stable id used as the allocation key. An experiment without an id is never run.
    pub id: Option<ExperimentId>,
    pub trigger: Trigger,
    pub variations: Vec<Rc<Variation>>,
}

impl Experiment {
    pub fn new(id: ExperimentId, trigger: impl Fn(Activation) + 'static) -> Self {
        Experiment {
            name: None,
            id: Some(id),
            trigger: Rc::new(trigger),
            variations: Vec::new(),
        }
    }

    /// Declare an experiment whose name and id come from the manifest entry `key`.
    pub fn from_manifest(
        manifest: &Manifest,
        key: &str,
        trigger: impl Fn(Activation) + 'static,
    ) -> Result<Self> {
        let entry = manifest.entry(key)?;
        Ok(Experiment {
            name: Some(entry.name.clone()),
            id: entry.id,
            trigger: Rc::new(trigger),
            variations: Vec::new(),
        })
    }

    pub fn variation(mut self, variation: Variation) -> Self {
        self.variations.push(Rc::new(variation));
        self
    }

    /// Return the id if the experiment can take part in a run.
    pub fn runnable_id(&self) -> Option<ExperimentId> {
        if self.variations.is_empty() {
            return None;
        }
        self.id
    }
}

impl fmt::Debug for Experiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Experiment")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("variations", &self.variations)
            .finish_non_exhaustive()
    }
}

/// The variation chosen for an experiment during one run. Never persisted.
#[derive(Clone)]
pub struct SelectedVariation {
    pub experiment_id: ExperimentId,
    pub variation_index: usize,
    pub trigger: Trigger,
    /// `None` when a persisted index no longer points at a declared variation.
    pub variation: Option<Rc<Variation>>,
}

impl fmt::Debug for SelectedVariation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectedVariation")
            .field("experiment_id", &self.experiment_id)
            .field("variation_index", &self.variation_index)
            .field("variation", &self.variation)
            .finish_non_exhaustive()
    }
}

/// Callback handed to a trigger. Firing it applies the selected variation to the page.
#[derive(Clone)]
pub struct Activation {
    window: Rc<dyn Window>,
    experiment_id: ExperimentId,
    variation_index: usize,
    variation: Option<Rc<Variation>>,
}

impl Activation {
    pub(crate) fn new(window: Rc<dyn Window>, selected: &SelectedVariation) -> Self {
        Activation {
            window,
            experiment_id: selected.experiment_id,
            variation_index: selected.variation_index,
            variation: selected.variation.clone(),
        }
    }

    pub fn experiment_id(&self) -> ExperimentId {
        self.experiment_id
    }

    pub fn variation_index(&self) -> usize {
        self.variation_index
    }

    /// The page the activation applies to, for triggers that need to inspect it.
    pub fn window(&self) -> &dyn Window {
        &*self.window
    }

    /// Inject the variation's style, then run its effect with `options`.
    ///
    /// This runs outside the runner's error isolation: the trigger decides when it happens.
    pub fn fire(&self, options: &serde_json::Value) {
        let Some(variation) = &self.variation else {
            log::warn!(target: "mvt",
                       experiment_id = self.experiment_id,
                       variation_index = self.variation_index;
                       "allocated variation is not declared, nothing to run");
            return;
        };

        log::debug!(target: "mvt",
                    experiment_id = self.experiment_id,
                    variation_index = self.variation_index;
                    "running variation");

        if let Some(style) = &variation.style {
            if let Err(err) = self.window.append_style(style) {
                log::warn!(target: "mvt", experiment_id = self.experiment_id; "{err}");
            }
        }
        if let Some(effect) = &variation.effect {
            effect(&*self.window, options);
        }
    }
}

impl fmt::Debug for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Activation")
            .field("experiment_id", &self.experiment_id)
            .field("variation_index", &self.variation_index)
            .finish_non_exhaustive()
    }
}

/// Ready-made triggers.
pub mod triggers {
    use super::Activation;
    use crate::{location, Window};

    /// Fire as soon as the run arms the trigger.
    pub fn immediately() -> impl Fn(Activation) {
        |activation: Activation| activation.fire(&serde_json::Value::Null)
    }

    /// Fire right away when `predicate` holds for the page, never otherwise.
    pub fn when(predicate: impl Fn(&dyn Window) -> bool) -> impl Fn(Activation) {
        move |activation: Activation| {
            if predicate(activation.window()) {
                activation.fire(&serde_json::Value::Null);
            }
        }
    }

    /// Fire when the query string carries `key=expected`.
    pub fn when_query_value(key: &str, expected: &str) -> impl Fn(Activation) {
        let key = key.to_owned();
        let expected = expected.to_owned();
        when(move |window| location::query_value(window, &key).as_deref() == Some(&*expected))
    }
}
