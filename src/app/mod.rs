// Application layer: one use case per pipeline stage, each reading from and
// writing to a TableStore

pub mod aggregate_use_case;
pub mod baseline_use_case;
pub mod enrich_use_case;
pub mod inspect_use_case;
pub mod pipeline_use_case;
pub mod unify_use_case;

pub use aggregate_use_case::{AggregateInputs, AggregateUseCase};
pub use baseline_use_case::{BaselineInputs, BaselineUseCase};
pub use enrich_use_case::{EnrichInputs, EnrichUseCase};
pub use inspect_use_case::InspectUseCase;
pub use pipeline_use_case::PipelineUseCase;
pub use unify_use_case::{UnifyInputs, UnifyUseCase};
