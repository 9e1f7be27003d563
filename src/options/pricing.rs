use std::f64::consts::{PI, SQRT_2};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::function::erf::erfc;

use crate::{
    config::OptionsConfig,
    constants::options::{DAYS_PER_YEAR, IV_LOWER, IV_MAX_ITERATIONS, IV_TOLERANCE, IV_UPPER},
    error::{EngineError, Result},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionRight {
    Call,
    Put,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    pub underlying: f64,
    pub strike: f64,
    /// Years until expiry
    pub time_to_expiry: f64,
    pub risk_free_rate: f64,
    pub volatility: f64,
    pub right: OptionRight,
}

impl OptionContract {
    pub fn new(
        right: OptionRight,
        underlying: f64,
        strike: f64,
        time_to_expiry: f64,
        risk_free_rate: f64,
        volatility: f64,
    ) -> Self {
        Self {
            underlying,
            strike,
            time_to_expiry,
            risk_free_rate,
            volatility,
            right,
        }
    }

    pub fn with_volatility(self, volatility: f64) -> Self {
        Self { volatility, ..self }
    }

    pub fn with_right(self, right: OptionRight) -> Self {
        Self { right, ..self }
    }

    /// Calendar days between the two dates as a fraction of a year
    pub fn years_between(current: NaiveDate, expiry: NaiveDate) -> f64 {
        (expiry - current).num_days() as f64 / DAYS_PER_YEAR
    }

    pub fn intrinsic_value(&self) -> f64 {
        match self.right {
            OptionRight::Call => (self.underlying - self.strike).max(0.0),
            OptionRight::Put => (self.strike - self.underlying).max(0.0),
        }
    }

    fn validate_market(&self) -> Result<()> {
        let positive = [
            ("underlying price", self.underlying),
            ("strike", self.strike),
            ("time to expiry", self.time_to_expiry),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(EngineError::InvalidInput(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        if !self.risk_free_rate.is_finite() {
            return Err(EngineError::InvalidInput(format!(
                "risk free rate must be finite, got {}",
                self.risk_free_rate
            )));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.validate_market()?;
        if !self.volatility.is_finite() || self.volatility <= 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "volatility must be positive, got {}",
                self.volatility
            )));
        }
        Ok(())
    }
}

/// Sensitivities of one contract's theoretical price.
///
/// Theta is per calendar day, vega per volatility point and rho per
/// percentage point of the risk free rate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Greeks {
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub rho: f64,
}

pub fn norm_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / SQRT_2)
}

pub fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}

fn d1_d2(contract: &OptionContract) -> (f64, f64) {
    let sqrt_t = contract.time_to_expiry.sqrt();
    let vol_sqrt_t = contract.volatility * sqrt_t;
    let d1 = ((contract.underlying / contract.strike).ln()
        + (contract.risk_free_rate + 0.5 * contract.volatility.powi(2)) * contract.time_to_expiry)
        / vol_sqrt_t;
    (d1, d1 - vol_sqrt_t)
}

/// Unchecked Black-Scholes price, callers validate first
fn raw_price(contract: &OptionContract) -> f64 {
    let (d1, d2) = d1_d2(contract);
    let discounted_strike =
        contract.strike * (-contract.risk_free_rate * contract.time_to_expiry).exp();
    match contract.right {
        OptionRight::Call => contract.underlying * norm_cdf(d1) - discounted_strike * norm_cdf(d2),
        OptionRight::Put => discounted_strike * norm_cdf(-d2) - contract.underlying * norm_cdf(-d1),
    }
}

/// Derivative of the price with respect to volatility, per unit of volatility
fn raw_vega(contract: &OptionContract) -> f64 {
    let (d1, _) = d1_d2(contract);
    contract.underlying * norm_pdf(d1) * contract.time_to_expiry.sqrt()
}

pub fn price(contract: &OptionContract) -> Result<f64> {
    contract.validate()?;
    Ok(raw_price(contract))
}

pub fn price_and_greeks(contract: &OptionContract) -> Result<(f64, Greeks)> {
    contract.validate()?;

    let (d1, d2) = d1_d2(contract);
    let s = contract.underlying;
    let k = contract.strike;
    let t = contract.time_to_expiry;
    let r = contract.risk_free_rate;
    let sigma = contract.volatility;
    let sqrt_t = t.sqrt();
    let discount = (-r * t).exp();
    let pdf_d1 = norm_pdf(d1);

    let gamma = pdf_d1 / (s * sigma * sqrt_t);
    let vega = s * pdf_d1 * sqrt_t / 100.0;
    let decay = -s * pdf_d1 * sigma / (2.0 * sqrt_t);

    let (delta, theta, rho) = match contract.right {
        OptionRight::Call => (
            norm_cdf(d1),
            (decay - r * k * discount * norm_cdf(d2)) / DAYS_PER_YEAR,
            k * t * discount * norm_cdf(d2) / 100.0,
        ),
        OptionRight::Put => (
            norm_cdf(d1) - 1.0,
            (decay + r * k * discount * norm_cdf(-d2)) / DAYS_PER_YEAR,
            -k * t * discount * norm_cdf(-d2) / 100.0,
        ),
    };

    Ok((
        raw_price(contract),
        Greeks {
            delta,
            gamma,
            theta,
            vega,
            rho,
        },
    ))
}

/// |C - P - (S - K e^{-rT})| for a call and put priced on the same contract
pub fn put_call_parity_gap(call_price: f64, put_price: f64, contract: &OptionContract) -> f64 {
    let forward = contract.underlying
        - contract.strike * (-contract.risk_free_rate * contract.time_to_expiry).exp();
    (call_price - put_price - forward).abs()
}

/// Bracketed Newton/bisection root finder over a fixed volatility interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IvSolver {
    pub lower: f64,
    pub upper: f64,
    pub max_iterations: u32,
    pub tolerance: f64,
}

impl Default for IvSolver {
    fn default() -> Self {
        Self {
            lower: IV_LOWER,
            upper: IV_UPPER,
            max_iterations: IV_MAX_ITERATIONS,
            tolerance: IV_TOLERANCE,
        }
    }
}

impl From<&OptionsConfig> for IvSolver {
    fn from(config: &OptionsConfig) -> Self {
        Self {
            lower: config.iv_lower,
            upper: config.iv_upper,
            max_iterations: config.iv_max_iterations,
            tolerance: config.iv_tolerance,
        }
    }
}

impl IvSolver {
    /// Finds the volatility that reproduces `observed_price`. The contract's own
    /// volatility is ignored.
    pub fn solve(&self, contract: &OptionContract, observed_price: f64) -> Result<f64> {
        contract.validate_market()?;
        if !observed_price.is_finite() {
            return Err(EngineError::InvalidInput(format!(
                "observed price must be finite, got {observed_price}"
            )));
        }

        let price_at = |sigma: f64| raw_price(&contract.with_volatility(sigma));
        let floor = price_at(self.lower);
        let ceiling = price_at(self.upper);
        if observed_price < floor - self.tolerance || observed_price > ceiling + self.tolerance {
            return Err(EngineError::Convergence {
                iterations: 0,
                reason: format!(
                    "observed price {observed_price:.6} outside achievable range [{floor:.6}, {ceiling:.6}]"
                ),
            });
        }

        let mut low = self.lower;
        let mut high = self.upper;
        let mut sigma = 0.2_f64.clamp(low, high);

        for _ in 0..self.max_iterations {
            let candidate = contract.with_volatility(sigma);
            let diff = raw_price(&candidate) - observed_price;
            if diff.abs() < self.tolerance {
                return Ok(sigma);
            }

            if diff > 0.0 {
                high = sigma;
            } else {
                low = sigma;
            }

            let vega = raw_vega(&candidate);
            let newton = sigma - diff / vega;
            sigma = if vega > 1e-12 && newton > low && newton < high {
                newton
            } else {
                0.5 * (low + high)
            };

            if high - low < f64::EPSILON * high.max(1.0) {
                return Ok(sigma);
            }
        }

        Err(EngineError::Convergence {
            iterations: self.max_iterations,
            reason: format!("bracket narrowed to [{low:.6}, {high:.6}]"),
        })
    }
}

pub fn implied_volatility(contract: &OptionContract, observed_price: f64) -> Result<f64> {
    IvSolver::default().solve(contract, observed_price)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn contract(right: OptionRight) -> OptionContract {
        OptionContract::new(right, 100.0, 100.0, 0.5, 0.01, 0.30)
    }

    #[test]
    fn test_known_call_value() {
        let call = OptionContract::new(OptionRight::Call, 100.0, 100.0, 1.0, 0.05, 0.2);
        assert_relative_eq!(price(&call).unwrap(), 10.4506, epsilon = 2e-4);
        let put = call.with_right(OptionRight::Put);
        assert_relative_eq!(price(&put).unwrap(), 5.5735, epsilon = 2e-4);
    }

    #[test]
    fn test_put_call_parity_greeks() {
        for (s, k, t, sigma) in [
            (100.0, 100.0, 0.5, 0.3),
            (80.0, 120.0, 2.0, 0.6),
            (150.0, 90.0, 0.05, 0.15),
            (10.0, 10.5, 0.25, 1.2),
        ] {
            let call = OptionContract::new(OptionRight::Call, s, k, t, 0.03, sigma);
            let put = call.with_right(OptionRight::Put);
            let (call_price, call_greeks) = price_and_greeks(&call).unwrap();
            let (put_price, put_greeks) = price_and_greeks(&put).unwrap();

            assert_relative_eq!(call_greeks.delta - put_greeks.delta, 1.0, epsilon = 1e-12);
            assert_eq!(call_greeks.gamma, put_greeks.gamma);
            assert_eq!(call_greeks.vega, put_greeks.vega);
            assert!(call_greeks.gamma >= 0.0 && call_greeks.vega >= 0.0);
            assert!((-1.0..=1.0).contains(&put_greeks.delta));
            assert!(put_call_parity_gap(call_price, put_price, &call) < 1e-9);
        }
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        let base = contract(OptionRight::Call);
        for bad in [
            OptionContract { time_to_expiry: 0.0, ..base },
            OptionContract { volatility: 0.0, ..base },
            OptionContract { underlying: -1.0, ..base },
            OptionContract { strike: 0.0, ..base },
            OptionContract { volatility: f64::NAN, ..base },
        ] {
            assert!(matches!(price_and_greeks(&bad), Err(EngineError::InvalidInput(_))));
        }
    }

    #[test]
    fn test_implied_volatility_recovers_sigma() {
        let call = contract(OptionRight::Call);
        let observed = price(&call).unwrap();
        let sigma = implied_volatility(&call.with_volatility(0.9), observed).unwrap();
        assert!((sigma - 0.30).abs() < 1e-3, "sigma {sigma}");

        let put = contract(OptionRight::Put);
        let observed = price(&put).unwrap();
        let sigma = implied_volatility(&put, observed).unwrap();
        assert!((sigma - 0.30).abs() < 1e-3, "sigma {sigma}");
    }

    #[test]
    fn test_implied_volatility_out_of_bounds() {
        let call = contract(OptionRight::Call);
        // A call can never be worth more than the underlying
        assert!(matches!(
            implied_volatility(&call, 150.0),
            Err(EngineError::Convergence { .. })
        ));
        assert!(matches!(
            implied_volatility(&call, -1.0),
            Err(EngineError::Convergence { .. })
        ));
    }

    #[test]
    fn test_implied_volatility_iteration_budget() {
        let call = contract(OptionRight::Call);
        let observed = price(&call).unwrap();
        let solver = IvSolver {
            max_iterations: 1,
            tolerance: 1e-14,
            ..IvSolver::default()
        };
        assert!(matches!(
            solver.solve(&call, observed),
            Err(EngineError::Convergence { iterations: 1, .. })
        ));
    }

    #[test]
    fn test_theta_is_daily() {
        let (_, greeks) = price_and_greeks(&contract(OptionRight::Call)).unwrap();
        assert!(greeks.theta < 0.0);
        assert!(greeks.theta > -0.1, "daily theta should be small: {}", greeks.theta);
    }

    #[test]
    fn test_years_between() {
        let current = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let expiry = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        assert_relative_eq!(OptionContract::years_between(current, expiry), 365.0 / 365.0);
    }
}
