//! Shared domain types for the transit pipeline.

mod types;

pub use types::{
    DataKind, GroundTruth, LightCurve, OrbitalParameters, RunConfig, TransitWindow,
    DEFAULT_DURATION_D, DEFAULT_ECC, DEFAULT_EXP_TIME_D, DEFAULT_INC_DEG, DEFAULT_SUPERSAMPLE,
    DEFAULT_U1, DEFAULT_U2, DEFAULT_W_DEG,
};
