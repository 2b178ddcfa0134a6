use anyhow::Result;
use tracing::{info, info_span};

use crate::app::aggregate_use_case::{AggregateInputs, AggregateOutcome, AggregateUseCase};
use crate::app::baseline_use_case::{BaselineInputs, BaselineOutcome, BaselineUseCase};
use crate::app::enrich_use_case::{EnrichInputs, EnrichOutcome, EnrichUseCase};
use crate::app::unify_use_case::{UnifyInputs, UnifyOutcome, UnifyUseCase};
use crate::config::PipelineConfig;
use crate::pipeline::storage::TableStore;

impl UnifyInputs {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            historical: config.paths.historical_input.clone(),
            dob_now: config.paths.dob_now_input.clone(),
            output: config.paths.unified_output.clone(),
        }
    }
}

impl EnrichInputs {
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            unified: config.paths.unified_output.clone(),
            districts: config.paths.districts_input.clone(),
            output: config.paths.enriched_output.clone(),
            crs_override: config.districts_crs()?,
        })
    }
}

impl AggregateInputs {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            enriched: config.paths.enriched_output.clone(),
            monthly_output: config.paths.monthly_output.clone(),
            modeling_output: config.paths.modeling_output.clone(),
            min_district_total: config.aggregate.min_district_total,
        }
    }
}

impl BaselineInputs {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            modeling: config.paths.modeling_output.clone(),
            output: config.paths.baseline_output.clone(),
            settings: config.baseline_settings(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub unify: UnifyOutcome,
    pub enrich: EnrichOutcome,
    pub aggregate: AggregateOutcome,
    pub baseline: BaselineOutcome,
}

/// Runs unify, assign-districts, aggregate and baseline in order; each stage
/// reads what the previous one persisted.
pub struct PipelineUseCase<'a> {
    store: &'a dyn TableStore,
    config: &'a PipelineConfig,
}

impl<'a> PipelineUseCase<'a> {
    pub fn new(store: &'a dyn TableStore, config: &'a PipelineConfig) -> Self {
        Self { store, config }
    }

    pub fn execute(&self) -> Result<PipelineOutcome> {
        let span = info_span!("run");
        let _enter = span.enter();
        let manifest_dir = &self.config.paths.manifest_dir;

        let unify = UnifyUseCase::new(self.store).execute(
            &UnifyInputs::from_config(self.config),
            self.config.overlap_window(),
            manifest_dir,
        )?;
        let enrich = EnrichUseCase::new(self.store)
            .execute(&EnrichInputs::from_config(self.config)?, manifest_dir)?;
        let aggregate = AggregateUseCase::new(self.store)
            .execute(&AggregateInputs::from_config(self.config), manifest_dir)?;
        let baseline = BaselineUseCase::new(self.store)
            .execute(&BaselineInputs::from_config(self.config), manifest_dir)?;

        info!(
            "Pipeline complete: {} permits unified, {} with a district, {} monthly rows, \
             {} districts evaluated",
            unify.output.rows,
            enrich.report.matched(),
            aggregate.aggregation.aggregate_rows,
            baseline.report.districts_evaluated()
        );

        Ok(PipelineOutcome {
            unify,
            enrich,
            aggregate,
            baseline,
        })
    }
}
