use std::sync::Arc;

use cpacfa::Cfa;
use cpaformal::{abstraction::AbstractFormula, abstraction::AbstractionManager, prover::SharedProver};

use crate::{
    config::AnalysisConfig,
    merge::MergeSep,
    precision::{PredicatePrecision, SharedPrecision},
    state::AbstractState,
    stop::PredicateStop,
    transfer::PredicateTransferRelation,
    utils::error::CpaResult,
};

/// The predicate analysis as a configurable program analysis: its domain
/// managers, transfer relation, merge and stop operators and precision.
///
/// Every collaborator is passed in by the caller; nothing is global.
#[derive(Debug)]
pub struct PredicateCpa {
    cfa: Arc<Cfa>,
    config: AnalysisConfig,
    abstraction: Arc<AbstractionManager>,
    precision: SharedPrecision,
    transfer: PredicateTransferRelation,
    stop: PredicateStop,
    merge: MergeSep,
}

impl PredicateCpa {
    /// Analysis with a fresh abstraction manager over `prover` and an empty
    /// precision.
    pub fn new(cfa: Arc<Cfa>, config: AnalysisConfig, prover: SharedProver) -> CpaResult<Self> {
        let abstraction = Arc::new(AbstractionManager::new(prover, config.semantic_entailment));
        Self::with_managers(cfa, config, abstraction, PredicatePrecision::new().shared())
    }

    pub fn with_managers(
        cfa: Arc<Cfa>,
        config: AnalysisConfig,
        abstraction: Arc<AbstractionManager>,
        precision: SharedPrecision,
    ) -> CpaResult<Self> {
        config.validate()?;
        Ok(Self {
            transfer: PredicateTransferRelation::new(cfa.clone(), config.clone(), abstraction.clone()),
            stop: PredicateStop::new(abstraction.clone()),
            merge: MergeSep,
            cfa,
            config,
            abstraction,
            precision,
        })
    }

    /// Abstraction state at the entry of the main function.
    pub fn initial_state(&self) -> AbstractState {
        AbstractState::initial(self.cfa.entry(), AbstractFormula::TRUE)
    }

    pub fn cfa(&self) -> &Arc<Cfa> {
        &self.cfa
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn abstraction(&self) -> &Arc<AbstractionManager> {
        &self.abstraction
    }

    pub fn precision(&self) -> &SharedPrecision {
        &self.precision
    }

    pub fn transfer(&self) -> &PredicateTransferRelation {
        &self.transfer
    }

    pub fn stop(&self) -> &PredicateStop {
        &self.stop
    }

    pub fn merge(&self) -> &MergeSep {
        &self.merge
    }
}
