// ============================================================================
// Consumer Pipelines
// ============================================================================
//
// One pipeline per subscription: decode -> validate -> persist. The only
// difference between the two is the StoreAdapter they are built with.
//
// ============================================================================

mod consumer;
mod errors;

pub use consumer::ConsumerPipeline;
pub use errors::PipelineError;
