//! Assigning sessions to variations.
use crate::{
    random::RandomSource, AllocationMap, Error, Experiment, ExperimentId, Result,
    SelectedVariation,
};

/// Resolve one variation per runnable experiment.
///
/// Existing allocations are reused verbatim, even if the index no longer fits the declared
/// variations. Experiments without an allocation get one (weighted random) and `allocations` is
/// updated in place, so the caller can persist it.
///
/// Both arguments are required; passing `None` is a caller bug reported as
/// [`Error::InvalidArgument`].
pub fn compute_selections(
    experiments: Option<&[Experiment]>,
    allocations: Option<&mut AllocationMap>,
    random: &dyn RandomSource,
) -> Result<Vec<SelectedVariation>> {
    let experiments = experiments.ok_or(Error::InvalidArgument("experiments"))?;
    let allocations = allocations.ok_or(Error::InvalidArgument("allocations"))?;

    let selections = experiments
        .iter()
        .filter_map(|experiment| {
            let id = experiment.runnable_id()?;
            let variation_index = allocate(experiment, id, allocations, random)?;

            Some(SelectedVariation {
                experiment_id: id,
                variation_index,
                trigger: experiment.trigger.clone(),
                variation: experiment.variations.get(variation_index).cloned(),
            })
        })
        .collect();

    Ok(selections)
}

fn allocate(
    experiment: &Experiment,
    id: ExperimentId,
    allocations: &mut AllocationMap,
    random: &dyn RandomSource,
) -> Option<usize> {
    if let Some(index) = allocations.get(id) {
        if index >= experiment.variations.len() {
            log::warn!(target: "mvt",
                       experiment_id = id,
                       variation_index = index;
                       "allocated variation is out of range, keeping it");
        }
        return Some(index);
    }

    let index = if experiment.variations.len() == 1 {
        0
    } else {
        let weights: Vec<f64> = experiment.variations.iter().map(|v| v.weight).collect();
        weighted_index(&weights, random.next_fraction())?
    };

    log::debug!(target: "mvt", experiment_id = id, variation_index = index; "allocated new variation");
    allocations.insert(id, index);
    Some(index)
}

/// Pick an index from `weights` for a uniform `fraction` of the total weight.
///
/// Returns the first variation whose cumulative weight strictly exceeds the draw. A draw equal to
/// the total selects the last variation. Returns `None` when nothing can be selected, which only
/// happens with non-finite weights.
pub fn weighted_index(weights: &[f64], fraction: f64) -> Option<usize> {
    let cumulative: Vec<f64> = weights
        .iter()
        .scan(0.0, |acc, weight| {
            *acc += weight;
            Some(*acc)
        })
        .collect();
    let total = *cumulative.last()?;

    let draw = fraction * total;
    if draw == total {
        return Some(cumulative.len() - 1);
    }
    cumulative.iter().position(|&c| draw < c)
}
