use super::model::{AEMode, BladeModeType, Dataset, SymmetryType, TurbineComponent, WhirlType};

// ---------------------------------------------------------------------------
// Mode filter: which classification labels are selected
// ---------------------------------------------------------------------------

/// Category selection over AEMode labels. A `None` field is a wildcard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModeFilter {
    pub symmetry_type: Option<SymmetryType>,
    pub whirl_type: Option<WhirlType>,
    pub wt_component: Option<TurbineComponent>,
    pub blade_mode_type: Option<BladeModeType>,
}

fn field_matches<T: PartialEq>(wanted: Option<T>, actual: Option<T>) -> bool {
    match wanted {
        None => true,
        Some(w) => actual == Some(w),
    }
}

impl ModeFilter {
    /// The filter that lets every mode through.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn matches(&self, mode: &AEMode) -> bool {
        field_matches(self.symmetry_type, mode.symmetry_type)
            && field_matches(self.whirl_type, mode.whirl_type)
            && field_matches(self.wt_component, mode.wt_component)
            && field_matches(self.blade_mode_type, mode.blade_mode_type)
    }
}

/// Indices of the coupled modes that pass the filter.
pub fn filtered_modes(dataset: &Dataset, filter: &ModeFilter) -> Vec<usize> {
    dataset
        .modes()
        .iter()
        .enumerate()
        .filter(|(_, mode)| filter.matches(mode))
        .map(|(i, _)| i)
        .collect()
}

/// Indices of the participation modes that pass the filter.
pub fn filtered_participation_modes(dataset: &Dataset, filter: &ModeFilter) -> Vec<usize> {
    dataset
        .participation_modes()
        .iter()
        .enumerate()
        .filter(|(_, mode)| filter.matches(mode))
        .map(|(i, _)| i)
        .collect()
}
