//! Generalized Linear Model fitting for negative binomial data

mod fitting;
pub mod linalg;
mod negative_binomial;

pub use fitting::{fit_gene, fit_glm, GeneFit, GlmFit, GlmFitParams};
pub use negative_binomial::{
    deviance, nb_log_likelihood, nb_mean, nb_weight, unit_deviance, MAX_BETA, MIN_MU,
    POISSON_DISPERSION,
};
