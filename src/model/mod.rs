//! Limb-darkened transit light-curve model.

mod transit;

pub use transit::{light_curve, model_flux_at, ModelParams};
