//! Feature toggle state machine.
//!
//! The simulator exposes three features forming a dependency lattice:
//! branch prediction ⇒ data forwarding ⇒ pipelining. Only the four states
//! along that chain are reachable, so they are modelled as a tagged enum
//! rather than three independent booleans; illegal combinations are
//! unrepresentable.
//!
//! On the wire each toggle command *flips* one feature (the payload line is
//! an empty object). Disabling a feature first flips off everything that
//! depends on it, one worker command per step, so [`FeatureState::plan`]
//! reports the dependent flips to apply before the requested one, keeping
//! the worker's internal state in lockstep with the session's recorded
//! state.

use crate::error::{Error, Result};

/// One of the simulator's three toggleable features.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    Pipeline,
    DataForwarding,
    BranchPrediction,
}

impl Feature {
    /// Command name understood by the worker.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Pipeline => "pipeline",
            Self::DataForwarding => "data_forward",
            Self::BranchPrediction => "branch_prediction",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Pipeline => "pipelining",
            Self::DataForwarding => "data forwarding",
            Self::BranchPrediction => "branch prediction",
        }
    }
}

/// Per-session feature state: the four reachable points of the lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeatureState {
    /// Single-cycle execution, no pipeline.
    #[default]
    Scalar,
    /// Pipelined, stalls on every hazard.
    Pipelined,
    /// Pipelined with data forwarding.
    Forwarding,
    /// Pipelined with data forwarding and branch prediction.
    Predicting,
}

impl FeatureState {
    pub fn pipeline_enabled(self) -> bool {
        self != Self::Scalar
    }

    pub fn data_forwarding_enabled(self) -> bool {
        matches!(self, Self::Forwarding | Self::Predicting)
    }

    pub fn branch_prediction_enabled(self) -> bool {
        self == Self::Predicting
    }

    fn enabled(self, feature: Feature) -> bool {
        match feature {
            Feature::Pipeline => self.pipeline_enabled(),
            Feature::DataForwarding => self.data_forwarding_enabled(),
            Feature::BranchPrediction => self.branch_prediction_enabled(),
        }
    }

    /// Validate `set <feature> = enabled` against the lattice and return
    /// the dependent flips to apply before flipping `feature` itself,
    /// most-dependent first. Enables never cascade, so the list is empty
    /// for them.
    ///
    /// Enabling a feature whose prerequisite is off, or toggling a feature
    /// to the value it already has, is rejected before any worker command
    /// is issued.
    pub fn plan(self, feature: Feature, enabled: bool) -> Result<Vec<Feature>> {
        if self.enabled(feature) == enabled {
            let state = if enabled { "enabled" } else { "disabled" };
            return Err(Error::invalid_toggle(format!(
                "{} is already {state}",
                feature.label()
            )));
        }

        if enabled {
            match feature {
                Feature::Pipeline => {}
                Feature::DataForwarding => {
                    if !self.pipeline_enabled() {
                        return Err(Error::invalid_toggle(
                            "data forwarding requires pipelining to be enabled",
                        ));
                    }
                }
                Feature::BranchPrediction => {
                    if !self.data_forwarding_enabled() {
                        return Err(Error::invalid_toggle(
                            "branch prediction requires data forwarding to be enabled",
                        ));
                    }
                }
            }
            Ok(Vec::new())
        } else {
            // Cascade: dependents flip off first, most-dependent first.
            let mut cascade = Vec::new();
            if self.branch_prediction_enabled() && feature != Feature::BranchPrediction {
                cascade.push(Feature::BranchPrediction);
            }
            if self.data_forwarding_enabled() && feature == Feature::Pipeline {
                cascade.push(Feature::DataForwarding);
            }
            Ok(cascade)
        }
    }

    /// Apply one flip. Panics are avoided by construction: `plan` only
    /// emits flips that are valid single edges of the lattice.
    pub fn apply_flip(self, feature: Feature) -> Self {
        match (self, feature) {
            (Self::Scalar, Feature::Pipeline) => Self::Pipelined,
            (Self::Pipelined, Feature::Pipeline) => Self::Scalar,
            (Self::Pipelined, Feature::DataForwarding) => Self::Forwarding,
            (Self::Forwarding, Feature::DataForwarding) => Self::Pipelined,
            (Self::Forwarding, Feature::BranchPrediction) => Self::Predicting,
            (Self::Predicting, Feature::BranchPrediction) => Self::Forwarding,
            // Off-lattice flip: leave the state unchanged rather than
            // invent an unreachable combination.
            (state, _) => state,
        }
    }
}
