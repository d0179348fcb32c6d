//! Statistics across an ensemble of models
//!
//! Each member is a [`RegionalSeries`] from one model. The members must share
//! their time axis, sinks, resolution and threshold latitude. The spread is
//! the population standard deviation,
//!
//! $$ \sigma = \sqrt{\frac{1}{n} \sum_k (x_k - \bar{x})^2} $$

use crate::errors::{SinkfluxError, SinkfluxResult};
use crate::regional::RegionalSeries;
use crate::spatial::Sink;
use crate::timeseries::{FloatValue, TimeIndexed};
use log::debug;
use ndarray::Array2;
use std::collections::BTreeMap;

/// Ensemble mean and spread with the same layout as the members
#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleStatistics {
    pub mean: RegionalSeries,
    pub std: RegionalSeries,
}

pub fn ensemble_statistics(members: &[RegionalSeries]) -> SinkfluxResult<EnsembleStatistics> {
    let Some(first) = members.first() else {
        return Err(SinkfluxError::DataAlignment(
            "an ensemble needs at least one member".to_string(),
        ));
    };
    let sinks: Vec<Sink> = first.sinks().collect();
    for (index, member) in members.iter().enumerate().skip(1) {
        if member.time() != first.time()
            || member.resolution() != first.resolution()
            || member.threshold_latitude() != first.threshold_latitude()
            || member.sinks().collect::<Vec<_>>() != sinks
        {
            return Err(SinkfluxError::DataAlignment(format!(
                "ensemble member {} does not share the layout of the first member",
                index
            )));
        }
    }
    debug!(
        "Computing ensemble statistics over {} members and {} steps",
        members.len(),
        first.len()
    );

    let n = members.len() as FloatValue;
    let mut means = BTreeMap::new();
    let mut spreads = BTreeMap::new();
    for sink in sinks {
        let mut mean = Array2::<FloatValue>::zeros(first.totals(sink)?.dim());
        for member in members {
            mean += &member.totals(sink)?;
        }
        mean /= n;

        let mut variance = Array2::<FloatValue>::zeros(mean.dim());
        for member in members {
            let deviation = &member.totals(sink)? - &mean;
            variance += &deviation.mapv(|d| d * d);
        }
        variance /= n;

        means.insert(sink, mean);
        spreads.insert(sink, variance.mapv(FloatValue::sqrt));
    }

    let rebuild = |totals| {
        RegionalSeries::new(
            first.resolution(),
            first.time().to_vec(),
            first.threshold_latitude(),
            totals,
        )
        .map(|series| series.with_statistic(first.statistic()))
    };
    Ok(EnsembleStatistics {
        mean: rebuild(means)?,
        std: rebuild(spreads)?,
    })
}
