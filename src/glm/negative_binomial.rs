//! Negative binomial distribution utilities

use statrs::function::gamma::ln_gamma;

/// Dispersions below this are evaluated with the Poisson limit
pub const POISSON_DISPERSION: f64 = 1e-14;

/// Floor applied to fitted means so log(mu) and (y - mu)/mu stay finite
pub const MIN_MU: f64 = 1e-10;

/// Maximum absolute coefficient (natural log scale) before IRLS gives up
pub const MAX_BETA: f64 = 30.0;

/// Maximum eta value to prevent overflow (exp(700) ≈ 1e304)
pub const MAX_ETA: f64 = 700.0;

/// Mean from the linear predictor, which already includes the offset
pub fn nb_mean(eta: f64) -> f64 {
    eta.clamp(-MAX_ETA, MAX_ETA).exp().max(MIN_MU)
}

/// IRLS working weight for the log link: mu^2 / Var(Y) = mu / (1 + phi * mu)
pub fn nb_weight(mu: f64, phi: f64) -> f64 {
    mu / (1.0 + phi * mu)
}

/// log P(Y = y) under NB(mean = mu, dispersion = phi)
pub fn nb_log_likelihood(y: f64, mu: f64, phi: f64) -> f64 {
    if y == 0.0 && mu == 0.0 {
        return 0.0;
    }
    if mu <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if phi < POISSON_DISPERSION {
        return y * mu.ln() - mu - ln_gamma(y + 1.0);
    }

    let size = 1.0 / phi;
    ln_gamma(y + size) - ln_gamma(size) - ln_gamma(y + 1.0)
        - size * (phi * mu).ln_1p()
        + y * (mu.ln() - (size + mu).ln())
}

/// Unit deviance of one observation, 2 * (loglik(saturated) - loglik(mu))
pub fn unit_deviance(y: f64, mu: f64, phi: f64) -> f64 {
    if mu <= 0.0 {
        return if y > 0.0 { f64::INFINITY } else { 0.0 };
    }
    let poisson = phi < POISSON_DISPERSION;
    if y == 0.0 {
        return if poisson { 2.0 * mu } else { 2.0 / phi * (phi * mu).ln_1p() };
    }
    let log_ratio = y * (y / mu).ln();
    let dev = if poisson {
        2.0 * (log_ratio - (y - mu))
    } else {
        2.0 * (log_ratio - (y + 1.0 / phi) * ((phi * y).ln_1p() - (phi * mu).ln_1p()))
    };
    dev.max(0.0)
}

/// Total deviance of a gene's observations
pub fn deviance(counts: &[f64], mu: &[f64], phi: f64) -> f64 {
    counts
        .iter()
        .zip(mu.iter())
        .map(|(&y, &m)| unit_deviance(y, m, phi))
        .sum()
}
