// ============================================================================
// Domain Layer
// ============================================================================
//
// The placed-order entity, its canonical wire encoding, and the single
// validation function shared by the publish path and both consumer pipelines.
//
// Nothing in here performs I/O.
//
// ============================================================================

pub mod order;
