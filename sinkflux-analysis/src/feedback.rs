//! Carbon-cycle feedback parameters
//!
//! Uptake $U$ by a sink is regressed on atmospheric CO2 concentration $C$ and
//! global mean temperature $T$,
//!
//! $$ U = c_0 + c_C C + c_T T $$
//!
//! giving the concentration feedback $\beta = c_C / s$ (with $s$ the GtC per
//! ppm conversion), the climate feedback $\gamma = c_T$ and the
//! concentration-equivalent climate feedback $u_\gamma = \gamma \phi / \rho$.
//!
//! For emissions growing at $r$ percent per year the fraction of emissions
//! remaining in the atmosphere is
//!
//! $$ AF = \frac{1}{1 - b (\beta + u_\gamma)}, \quad b = \frac{1}{\ln(1 + r / 100)} $$

use crate::regression::ols;
use log::{debug, info};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use sinkflux_core::errors::{SinkfluxError, SinkfluxResult};
use sinkflux_core::timeseries::{inner_join, FloatValue, TimeKey, Timeseries};
use std::collections::BTreeMap;
use std::ops::Add;

/// Physical constants used to derive feedback parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConstants {
    /// Mass of carbon in one ppm of atmospheric CO2
    /// unit: GtC / ppm
    /// default: 2.12
    pub gtc_per_ppm: FloatValue,
    /// Ocean buffer factor
    /// default: 0.015 / 2.12
    pub phi: FloatValue,
    /// Temperature sensitivity of the ocean
    /// default: 1.94
    pub rho: FloatValue,
    /// Assumed growth rate of emissions
    /// unit: % / yr
    /// default: 2.0
    pub emission_rate: FloatValue,
}

impl Default for FeedbackConstants {
    fn default() -> Self {
        Self {
            gtc_per_ppm: 2.12,
            phi: 0.015 / 2.12,
            rho: 1.94,
            emission_rate: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeedbackParameters {
    /// Concentration feedback
    /// unit: (uptake unit) / GtC
    pub beta: FloatValue,
    /// Climate feedback
    /// unit: (uptake unit) / K
    pub gamma: FloatValue,
    /// Climate feedback expressed per unit concentration
    pub u_gamma: FloatValue,
}

impl FeedbackParameters {
    /// Scale the concentration-like parameters, e.g. by 12 to turn a fit on
    /// monthly uptake into per-year values
    pub fn scaled(&self, factor: FloatValue) -> Self {
        Self {
            beta: self.beta * factor,
            gamma: self.gamma,
            u_gamma: self.u_gamma * factor,
        }
    }

    /// Unweighted mean of several parameter sets
    pub fn mean(parameters: &[FeedbackParameters]) -> SinkfluxResult<Self> {
        if parameters.is_empty() {
            return Err(SinkfluxError::insufficient(
                "mean of feedback parameters",
                1,
                0,
            ));
        }
        let n = parameters.len() as FloatValue;
        let total = parameters.iter().fold(
            FeedbackParameters {
                beta: 0.0,
                gamma: 0.0,
                u_gamma: 0.0,
            },
            |acc, p| acc + *p,
        );
        Ok(Self {
            beta: total.beta / n,
            gamma: total.gamma / n,
            u_gamma: total.u_gamma / n,
        })
    }

    fn combined_feedback(&self) -> FloatValue {
        self.beta + self.u_gamma
    }
}

/// Land and ocean parameters add to the total sink response
impl Add for FeedbackParameters {
    type Output = FeedbackParameters;

    fn add(self, other: Self) -> Self {
        Self {
            beta: self.beta + other.beta,
            gamma: self.gamma + other.gamma,
            u_gamma: self.u_gamma + other.u_gamma,
        }
    }
}

/// Carbon taken up relative to the first sample, split by driver
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CarbonGained {
    /// Attributed to rising CO2 via β
    pub beta: FloatValue,
    /// Attributed to warming via γ
    pub gamma: FloatValue,
    /// Attributed to warming via u_γ
    pub u_gamma: FloatValue,
}

/// Per-model fits and their average
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleFeedback {
    pub models: BTreeMap<String, FeedbackParameters>,
    pub mean: FeedbackParameters,
}

/// Fits feedback parameters with a fixed set of physical constants
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedbackRegressor {
    constants: FeedbackConstants,
}

impl FeedbackRegressor {
    pub fn from_parameters(constants: FeedbackConstants) -> Self {
        Self { constants }
    }

    pub fn constants(&self) -> &FeedbackConstants {
        &self.constants
    }

    /// Least-squares fit of `uptake` against `co2` and `temperature`
    ///
    /// The three series are aligned on their common time keys first.
    pub fn fit_feedback(
        &self,
        uptake: &Timeseries,
        co2: &Timeseries,
        temperature: &Timeseries,
    ) -> SinkfluxResult<FeedbackParameters> {
        let aligned = inner_join(&[uptake, co2, temperature])?;
        let n = aligned.time.len();
        if n < 3 {
            return Err(SinkfluxError::insufficient("feedback regression", 3, n));
        }

        let design = Array2::from_shape_fn((n, 3), |(i, j)| match j {
            0 => 1.0,
            1 => aligned.columns[1][i],
            _ => aligned.columns[2][i],
        });
        let coefficients = ols(design.view(), aligned.columns[0].view())?;
        debug!(
            "Fitted feedback of '{}' over {} samples: {:?}",
            uptake.name(),
            n,
            coefficients
        );

        let gamma = coefficients[2];
        Ok(FeedbackParameters {
            beta: coefficients[1] / self.constants.gtc_per_ppm,
            gamma,
            u_gamma: gamma * self.constants.phi / self.constants.rho,
        })
    }

    /// Fit each model over its own time coverage then average the parameters
    pub fn fit_ensemble(
        &self,
        uptake: &BTreeMap<String, Timeseries>,
        co2: &Timeseries,
        temperature: &Timeseries,
    ) -> SinkfluxResult<EnsembleFeedback> {
        let models = uptake
            .iter()
            .map(|(model, series)| {
                self.fit_feedback(series, co2, temperature)
                    .map(|parameters| (model.clone(), parameters))
            })
            .collect::<SinkfluxResult<BTreeMap<_, _>>>()?;
        let fits: Vec<FeedbackParameters> = models.values().copied().collect();
        let mean = FeedbackParameters::mean(&fits)?;
        info!("Averaged feedback parameters over {} models", models.len());
        Ok(EnsembleFeedback { models, mean })
    }

    /// Independent fits over each `[start, end]` window
    pub fn fit_windows(
        &self,
        uptake: &Timeseries,
        co2: &Timeseries,
        temperature: &Timeseries,
        windows: &[(TimeKey, TimeKey)],
    ) -> SinkfluxResult<Vec<FeedbackParameters>> {
        windows
            .iter()
            .map(|(start, end)| {
                let window = uptake.between(*start, *end)?;
                self.fit_feedback(&window, co2, temperature)
            })
            .collect()
    }

    /// Uptake implied by `parameters` along the CO2 and temperature paths
    pub fn carbon_gained(
        &self,
        parameters: &FeedbackParameters,
        co2: &Timeseries,
        temperature: &Timeseries,
    ) -> SinkfluxResult<CarbonGained> {
        let aligned = inner_join(&[co2, temperature])?;
        let c = &aligned.columns[0];
        let t = &aligned.columns[1];
        let delta_c: FloatValue = c.iter().map(|v| v - c[0]).sum();
        let delta_t: FloatValue = t.iter().map(|v| v - t[0]).sum();
        let scale = self.constants.gtc_per_ppm;
        Ok(CarbonGained {
            beta: parameters.beta * delta_c * scale,
            gamma: parameters.gamma * delta_t,
            u_gamma: parameters.u_gamma * delta_c * scale,
        })
    }

    pub fn airborne_fraction(&self, parameters: &FeedbackParameters) -> SinkfluxResult<FloatValue> {
        airborne_fraction(parameters, self.constants.emission_rate)
    }

    pub fn landborne_fraction(&self, parameters: &FeedbackParameters) -> SinkfluxResult<FloatValue> {
        landborne_fraction(parameters, self.constants.emission_rate)
    }

    pub fn oceanborne_fraction(&self, parameters: &FeedbackParameters) -> SinkfluxResult<FloatValue> {
        oceanborne_fraction(parameters, self.constants.emission_rate)
    }
}

fn growth_exponent(emission_rate: FloatValue) -> SinkfluxResult<FloatValue> {
    if !(emission_rate > -100.0) || emission_rate == 0.0 || !emission_rate.is_finite() {
        return Err(SinkfluxError::NumericDomain(format!(
            "emission growth rate must be finite, non-zero and above -100%, got {}",
            emission_rate
        )));
    }
    Ok((1.0 + emission_rate / 100.0).ln())
}

/// Denominators this close to zero are rounding residue of an exact zero
const SINGULAR_TOLERANCE: FloatValue = 4.0 * FloatValue::EPSILON;

fn finite_ratio(denominator: FloatValue, context: &str) -> SinkfluxResult<FloatValue> {
    let value = 1.0 / denominator;
    if denominator.abs() <= SINGULAR_TOLERANCE || !value.is_finite() {
        return Err(SinkfluxError::NumericDomain(format!(
            "{} is undefined for these parameters (denominator {})",
            context, denominator
        )));
    }
    Ok(value)
}

/// Fraction of emissions that stays in the atmosphere
///
/// `parameters` should describe the whole sink, i.e. land plus ocean.
pub fn airborne_fraction(
    parameters: &FeedbackParameters,
    emission_rate: FloatValue,
) -> SinkfluxResult<FloatValue> {
    let b = 1.0 / growth_exponent(emission_rate)?;
    finite_ratio(
        1.0 - b * parameters.combined_feedback(),
        "airborne fraction",
    )
}

fn sink_borne_fraction(
    parameters: &FeedbackParameters,
    emission_rate: FloatValue,
    context: &str,
) -> SinkfluxResult<FloatValue> {
    let a = growth_exponent(emission_rate)?;
    let feedback = parameters.combined_feedback();
    if feedback == 0.0 {
        return Err(SinkfluxError::NumericDomain(format!(
            "{} is undefined when beta + u_gamma is zero",
            context
        )));
    }
    finite_ratio(-1.0 + a / feedback, context)
}

/// Emissions taken up by land relative to those remaining airborne
pub fn landborne_fraction(
    parameters: &FeedbackParameters,
    emission_rate: FloatValue,
) -> SinkfluxResult<FloatValue> {
    sink_borne_fraction(parameters, emission_rate, "land-borne fraction")
}

/// Emissions taken up by the ocean relative to those remaining airborne
pub fn oceanborne_fraction(
    parameters: &FeedbackParameters,
    emission_rate: FloatValue,
) -> SinkfluxResult<FloatValue> {
    sink_borne_fraction(parameters, emission_rate, "ocean-borne fraction")
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn drivers(first_year: i32, n: usize) -> (Timeseries, Timeseries) {
        let co2 = Timeseries::yearly(
            "CO2",
            first_year,
            (0..n).map(|i| 315.0 + 1.5 * i as f64).collect(),
        )
        .unwrap();
        let temperature = Timeseries::yearly(
            "T",
            first_year,
            (0..n).map(|i| 0.02 * i as f64 + 0.1 * (i as f64 * 1.3).sin()).collect(),
        )
        .unwrap();
        (co2, temperature)
    }

    fn synthetic_uptake(co2: &Timeseries, temperature: &Timeseries) -> Timeseries {
        co2.with_values(&co2.values().mapv(|c| 0.5 * c) + &temperature.values().mapv(|t| 0.5 * t))
            .unwrap()
            .renamed("uptake")
    }

    #[test]
    fn recovers_known_coefficients() {
        let (co2, temperature) = drivers(1959, 60);
        let uptake = synthetic_uptake(&co2, &temperature);
        let regressor = FeedbackRegressor::default();
        let fit = regressor.fit_feedback(&uptake, &co2, &temperature).unwrap();
        assert_relative_eq!(fit.beta, 0.5 / 2.12, epsilon = 1e-8);
        assert_relative_eq!(fit.gamma, 0.5, epsilon = 1e-8);
        assert_relative_eq!(fit.u_gamma, 0.5 * (0.015 / 2.12) / 1.94, epsilon = 1e-8);
    }

    #[test]
    fn constants_are_injected() {
        let (co2, temperature) = drivers(1959, 30);
        let uptake = synthetic_uptake(&co2, &temperature);
        let regressor = FeedbackRegressor::from_parameters(FeedbackConstants {
            gtc_per_ppm: 1.0,
            phi: 1.0,
            rho: 2.0,
            ..Default::default()
        });
        let fit = regressor.fit_feedback(&uptake, &co2, &temperature).unwrap();
        assert_relative_eq!(fit.beta, 0.5, epsilon = 1e-8);
        assert_relative_eq!(fit.u_gamma, 0.25, epsilon = 1e-8);
    }

    #[test]
    fn disjoint_series_fail_alignment() {
        let (co2, temperature) = drivers(1959, 20);
        let uptake = Timeseries::yearly("uptake", 2000, vec![1.0; 10]).unwrap();
        assert!(matches!(
            FeedbackRegressor::default().fit_feedback(&uptake, &co2, &temperature),
            Err(SinkfluxError::DataAlignment(_))
        ));
    }

    #[test]
    fn ensemble_fits_models_over_their_own_coverage() {
        let (co2, temperature) = drivers(1959, 60);
        let full = synthetic_uptake(&co2, &temperature);
        let window = full
            .between(TimeKey::Year(1980), TimeKey::Year(2000))
            .unwrap();
        let short = window.with_values(window.values().mapv(|v| 3.0 * v)).unwrap();
        let uptake = BTreeMap::from([
            ("A".to_string(), full),
            ("B".to_string(), short),
        ]);
        let ensemble = FeedbackRegressor::default()
            .fit_ensemble(&uptake, &co2, &temperature)
            .unwrap();
        assert_eq!(ensemble.models.len(), 2);
        assert_relative_eq!(ensemble.models["B"].gamma, 1.5, epsilon = 1e-6);
        assert_relative_eq!(ensemble.mean.gamma, 1.0, epsilon = 1e-6);
        assert_relative_eq!(ensemble.mean.beta, 1.0 / 2.12, epsilon = 1e-8);
    }

    #[test]
    fn windowed_fits() {
        let (co2, temperature) = drivers(1960, 40);
        let uptake = synthetic_uptake(&co2, &temperature);
        let windows = [
            (TimeKey::Year(1960), TimeKey::Year(1979)),
            (TimeKey::Year(1980), TimeKey::Year(1999)),
        ];
        let fits = FeedbackRegressor::default()
            .fit_windows(&uptake, &co2, &temperature, &windows)
            .unwrap();
        assert_eq!(fits.len(), 2);
        for fit in fits {
            assert_relative_eq!(fit.gamma, 0.5, epsilon = 1e-6);
        }
    }

    #[test]
    fn scaling_leaves_gamma() {
        let monthly = FeedbackParameters {
            beta: 0.01,
            gamma: -0.3,
            u_gamma: 0.002,
        };
        let yearly = monthly.scaled(12.0);
        assert_relative_eq!(yearly.beta, 0.12);
        assert_relative_eq!(yearly.u_gamma, 0.024);
        assert_eq!(yearly.gamma, -0.3);
    }

    #[test]
    fn carbon_gained_relative_to_first_sample() {
        let co2 = Timeseries::yearly("CO2", 2000, vec![300.0, 301.0, 303.0]).unwrap();
        let temperature = Timeseries::yearly("T", 2000, vec![0.0, 0.1, 0.3]).unwrap();
        let parameters = FeedbackParameters {
            beta: 1.0,
            gamma: 2.0,
            u_gamma: 0.5,
        };
        let gained = FeedbackRegressor::default()
            .carbon_gained(&parameters, &co2, &temperature)
            .unwrap();
        assert_relative_eq!(gained.beta, 4.0 * 2.12, epsilon = 1e-12);
        assert_relative_eq!(gained.gamma, 0.8, epsilon = 1e-12);
        assert_relative_eq!(gained.u_gamma, 2.0 * 2.12, epsilon = 1e-12);
    }

    #[test]
    fn fractions() {
        let land = FeedbackParameters {
            beta: 0.01,
            gamma: -0.5,
            u_gamma: -0.002,
        };
        let ocean = FeedbackParameters {
            beta: 0.005,
            gamma: -0.2,
            u_gamma: -0.001,
        };
        let total = land + ocean;
        let a = (1.02f64).ln();
        assert_relative_eq!(
            airborne_fraction(&total, 2.0).unwrap(),
            1.0 / (1.0 - 0.012 / a),
            epsilon = 1e-12
        );
        assert_relative_eq!(
            landborne_fraction(&land, 2.0).unwrap(),
            1.0 / (-1.0 + a / 0.008),
            epsilon = 1e-12
        );
        assert_relative_eq!(
            oceanborne_fraction(&ocean, 2.0).unwrap(),
            1.0 / (-1.0 + a / 0.004),
            epsilon = 1e-12
        );
    }

    #[test]
    fn fractions_reject_singular_denominators() {
        let a = (1.02f64).ln();
        let singular = FeedbackParameters {
            beta: a,
            gamma: 0.0,
            u_gamma: 0.0,
        };
        assert!(matches!(
            airborne_fraction(&singular, 2.0),
            Err(SinkfluxError::NumericDomain(_))
        ));
        assert!(matches!(
            landborne_fraction(&singular, 2.0),
            Err(SinkfluxError::NumericDomain(_))
        ));
        let zero = FeedbackParameters {
            beta: 0.0,
            gamma: 1.0,
            u_gamma: 0.0,
        };
        assert!(matches!(
            oceanborne_fraction(&zero, 2.0),
            Err(SinkfluxError::NumericDomain(_))
        ));
        assert!(matches!(
            airborne_fraction(&zero, 0.0),
            Err(SinkfluxError::NumericDomain(_))
        ));
        assert!(matches!(
            airborne_fraction(&zero, -100.0),
            Err(SinkfluxError::NumericDomain(_))
        ));
    }
}
