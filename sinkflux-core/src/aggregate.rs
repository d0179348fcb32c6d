//! Spatial integration of gridded fluxes into regional totals
//!
//! For every time step $t$ and sink, each cell contributes
//!
//! $$ M_{ij}(t) = F_{ij}(t) \cdot A_{ij} \cdot f(t) \cdot s $$
//!
//! where $F$ is the flux rate, $A$ the cell area, $f(t)$ the factor turning
//! the rate into a total over the step (see [`FluxRate`]) and $s$ the mass
//! scale (1e-15 turns grams into GtC). The Earth total sums every cell; the
//! South, Tropical and North totals sum the rows of each latitude band.
//!
//! State variables such as surface temperature are not integrated but
//! averaged. With [`RegionalStatistic::AreaMean`] each region reports
//!
//! $$ \bar{F}_r(t) = \frac{\sum_{ij \in r} F_{ij}(t) A_{ij}}{\sum_{ij \in r} A_{ij}} $$
//!
//! over the cells with a finite value; the rate factor and mass scale are
//! not applied.

use crate::calendar::{CalendarPolicy, FluxRate};
use crate::errors::{SinkfluxError, SinkfluxResult};
use crate::grid::{validate_latitude_order, CellArea};
use crate::regional::{RegionalSeries, RegionalStatistic, N_REGIONS};
use crate::spatial::{LatitudeBands, Region, Sink, DEFAULT_THRESHOLD_LATITUDE};
use crate::timeseries::{validate_time_axis, FloatValue, Resolution, TimeIndexed, TimeKey};
use log::{debug, warn};
use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, ArrayView3, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What to do when an expected time step has no data
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GapPolicy {
    /// Abort with [`SinkfluxError::DataGap`]
    #[default]
    Fail,
    /// Leave the step out of the output series
    Omit,
}

/// Parameters for spatial aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationParameters {
    /// Latitude separating the tropical band from the extratropics
    /// unit: degrees
    /// default: 23.0
    pub threshold_latitude: FloatValue,
    /// Factor applied to every cell mass
    /// unit: GtC / g
    /// default: 1e-15
    pub mass_scale: FloatValue,
    /// Time unit of the flux values
    /// default: PerYear
    pub flux_rate: FluxRate,
    /// Month and year lengths
    /// default: Fixed365
    pub calendar: CalendarPolicy,
    /// default: Fail
    pub gap_policy: GapPolicy,
    /// Ignore NaN/infinite cells (masked land or ocean)
    /// default: true
    pub mask_non_finite: bool,
    /// Integrate to totals or take area-weighted means
    /// default: Total
    pub statistic: RegionalStatistic,
}

impl Default for AggregationParameters {
    fn default() -> Self {
        Self {
            threshold_latitude: DEFAULT_THRESHOLD_LATITUDE,
            mass_scale: 1e-15,
            flux_rate: FluxRate::default(),
            calendar: CalendarPolicy::default(),
            gap_policy: GapPolicy::default(),
            mask_non_finite: true,
            statistic: RegionalStatistic::default(),
        }
    }
}

/// Flux rates on a (time, latitude, longitude) grid
///
/// Several named variables may share the same coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct GriddedField {
    time: Vec<TimeKey>,
    latitudes: Array1<FloatValue>,
    longitudes: Array1<FloatValue>,
    variables: BTreeMap<String, Array3<FloatValue>>,
}

impl GriddedField {
    pub fn new(
        time: Vec<TimeKey>,
        latitudes: Vec<FloatValue>,
        longitudes: Vec<FloatValue>,
    ) -> SinkfluxResult<Self> {
        validate_time_axis(&time)?;
        if latitudes.is_empty() || longitudes.is_empty() {
            return Err(SinkfluxError::Configuration(
                "a gridded field needs at least one latitude and one longitude".to_string(),
            ));
        }
        validate_latitude_order(&latitudes)?;
        Ok(Self {
            time,
            latitudes: Array1::from_vec(latitudes),
            longitudes: Array1::from_vec(longitudes),
            variables: BTreeMap::new(),
        })
    }

    /// Attach a variable with shape `(n_time, n_lat, n_lon)`
    pub fn with_variable(mut self, name: &str, data: Array3<FloatValue>) -> SinkfluxResult<Self> {
        let expected = (self.time.len(), self.latitudes.len(), self.longitudes.len());
        if data.dim() != expected {
            return Err(SinkfluxError::Configuration(format!(
                "variable '{}' has shape {:?}, expected {:?}",
                name,
                data.dim(),
                expected
            )));
        }
        self.variables.insert(name.to_string(), data);
        Ok(self)
    }

    pub fn variable(&self, name: &str) -> SinkfluxResult<ArrayView3<'_, FloatValue>> {
        self.variables
            .get(name)
            .map(|data| data.view())
            .ok_or_else(|| {
                SinkfluxError::Configuration(format!("no variable named '{}' in the field", name))
            })
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(|name| name.as_str())
    }

    pub fn latitudes(&self) -> ArrayView1<'_, FloatValue> {
        self.latitudes.view()
    }

    pub fn longitudes(&self) -> ArrayView1<'_, FloatValue> {
        self.longitudes.view()
    }

    /// `(n_lat, n_lon)`
    pub fn grid_shape(&self) -> (usize, usize) {
        (self.latitudes.len(), self.longitudes.len())
    }
}

impl TimeIndexed for GriddedField {
    fn time(&self) -> &[TimeKey] {
        &self.time
    }
}

/// Which field variable holds the flux of each sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkVariables {
    names: BTreeMap<Sink, String>,
}

impl SinkVariables {
    pub fn land_and_ocean(land: &str, ocean: &str) -> Self {
        let mut names = BTreeMap::new();
        names.insert(Sink::Land, land.to_string());
        names.insert(Sink::Ocean, ocean.to_string());
        Self { names }
    }

    pub fn land_only(land: &str) -> Self {
        Self::single(Sink::Land, land)
    }

    pub fn ocean_only(ocean: &str) -> Self {
        Self::single(Sink::Ocean, ocean)
    }

    fn single(sink: Sink, name: &str) -> Self {
        let mut names = BTreeMap::new();
        names.insert(sink, name.to_string());
        Self { names }
    }

    pub fn get(&self, sink: Sink) -> Option<&str> {
        self.names.get(&sink).map(|name| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Sink, &str)> {
        self.names.iter().map(|(sink, name)| (*sink, name.as_str()))
    }
}

/// Re-runs a spatial aggregation with a different band threshold
///
/// Latitude bands can only be re-split from per-cell data, so anything that
/// can re-split a regional series has to go back to the gridded field.
pub trait Reaggregate {
    fn reaggregate(&self, threshold_latitude: FloatValue) -> SinkfluxResult<RegionalSeries>;
}

/// Integrates gridded fluxes into [`RegionalSeries`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpatialAggregator {
    parameters: AggregationParameters,
}

impl SpatialAggregator {
    pub fn from_parameters(parameters: AggregationParameters) -> Self {
        Self { parameters }
    }

    pub fn parameters(&self) -> &AggregationParameters {
        &self.parameters
    }

    /// Regional totals for every expected time step of `field`
    ///
    /// The expected steps run from `range.0` to `range.1` inclusive, or over
    /// the field's own first and last key when no range is given. Steps
    /// missing from the field are handled according to the gap policy; they
    /// are never zero-filled.
    pub fn integrate_regional(
        &self,
        field: &GriddedField,
        areas: &CellArea,
        variables: &SinkVariables,
        range: Option<(TimeKey, TimeKey)>,
    ) -> SinkfluxResult<RegionalSeries> {
        let bands = LatitudeBands::new(self.parameters.threshold_latitude)?;
        if areas.shape() != field.grid_shape() {
            return Err(SinkfluxError::Configuration(format!(
                "cell areas have shape {:?} but the field grid is {:?}",
                areas.shape(),
                field.grid_shape()
            )));
        }

        let sinks = variables
            .iter()
            .map(|(sink, name)| field.variable(name).map(|data| (sink, data)))
            .collect::<SinkfluxResult<Vec<_>>>()?;
        if sinks.is_empty() {
            return Err(SinkfluxError::Configuration(
                "no sink variables to aggregate".to_string(),
            ));
        }

        let expected = self.expected_keys(field, range)?;
        let row_regions: Vec<Region> = field
            .latitudes()
            .iter()
            .map(|lat| bands.classify(*lat))
            .collect();

        debug!(
            "Aggregating {} time steps over a {:?} grid with threshold {}",
            expected.len(),
            field.grid_shape(),
            bands.threshold()
        );

        let mut time = Vec::with_capacity(expected.len());
        let mut rows: BTreeMap<Sink, Vec<[FloatValue; N_REGIONS]>> = BTreeMap::new();
        for key in expected {
            let Some(index) = field.position(key) else {
                match self.parameters.gap_policy {
                    GapPolicy::Fail => return Err(SinkfluxError::DataGap(key.to_string())),
                    GapPolicy::Omit => {
                        warn!("No data for {}, omitting it from the regional series", key);
                        continue;
                    }
                }
            };

            let factor = self
                .parameters
                .flux_rate
                .step_factor(self.parameters.calendar, key)
                * self.parameters.mass_scale;
            for (sink, data) in sinks.iter() {
                let (weighted, covered) = self.weighted_sums(
                    data.index_axis(Axis(0), index),
                    areas.areas(),
                    &row_regions,
                );
                let values = match self.parameters.statistic {
                    RegionalStatistic::Total => weighted.map(|sum| sum * factor),
                    RegionalStatistic::AreaMean => {
                        let mut means = [FloatValue::NAN; N_REGIONS];
                        for (mean, (sum, area)) in
                            means.iter_mut().zip(weighted.iter().zip(covered.iter()))
                        {
                            if *area > 0.0 {
                                *mean = sum / area;
                            }
                        }
                        means
                    }
                };
                rows.entry(*sink).or_default().push(values);
            }
            time.push(key);
        }

        if time.is_empty() {
            return Err(SinkfluxError::DataGap(
                "every time step in the requested range".to_string(),
            ));
        }

        let resolution = if time[0].is_monthly() {
            Resolution::Monthly
        } else {
            Resolution::Yearly
        };
        let totals = rows
            .into_iter()
            .map(|(sink, values)| {
                let n = values.len();
                let flat = values.into_iter().flatten().collect();
                Array2::from_shape_vec((n, N_REGIONS), flat)
                    .map(|array| (sink, array))
                    .map_err(|e| SinkfluxError::Configuration(e.to_string()))
            })
            .collect::<SinkfluxResult<BTreeMap<_, _>>>()?;

        Ok(RegionalSeries::new(resolution, time, bands.threshold(), totals)?
            .with_statistic(self.parameters.statistic))
    }

    /// An aggregation bound to its inputs, which can later be re-split
    pub fn bind<'a>(
        &'a self,
        field: &'a GriddedField,
        areas: &'a CellArea,
        variables: &'a SinkVariables,
        range: Option<(TimeKey, TimeKey)>,
    ) -> SpatialAggregation<'a> {
        SpatialAggregation {
            aggregator: self,
            field,
            areas,
            variables,
            range,
        }
    }

    fn expected_keys(
        &self,
        field: &GriddedField,
        range: Option<(TimeKey, TimeKey)>,
    ) -> SinkfluxResult<Vec<TimeKey>> {
        let (start, end) = match range {
            Some(range) => range,
            None => match (field.first_key(), field.last_key()) {
                (Some(start), Some(end)) => (start, end),
                _ => {
                    return Err(SinkfluxError::Configuration(
                        "field has no time steps".to_string(),
                    ))
                }
            },
        };
        let field_monthly = field.time()[0].is_monthly();
        if start.is_monthly() != field_monthly {
            return Err(SinkfluxError::Configuration(format!(
                "time range {}..{} does not match the resolution of the field",
                start, end
            )));
        }
        let keys = TimeKey::range_inclusive(start, end)?;
        if keys.is_empty() {
            return Err(SinkfluxError::Configuration(format!(
                "empty time range {}..{}",
                start, end
            )));
        }
        Ok(keys)
    }

    /// Per region, the sum of `value * area` and the area of the cells counted
    fn weighted_sums(
        &self,
        flux: ArrayView2<'_, FloatValue>,
        areas: ArrayView2<'_, FloatValue>,
        row_regions: &[Region],
    ) -> ([FloatValue; N_REGIONS], [FloatValue; N_REGIONS]) {
        let mut weighted = [0.0; N_REGIONS];
        let mut covered = [0.0; N_REGIONS];
        for ((flux_row, area_row), region) in flux
            .rows()
            .into_iter()
            .zip(areas.rows())
            .zip(row_regions.iter())
        {
            let (row_sum, row_area) = flux_row
                .iter()
                .zip(area_row.iter())
                .filter(|(value, _)| !self.parameters.mask_non_finite || value.is_finite())
                .fold((0.0, 0.0), |(sum, total), (value, area)| {
                    (sum + value * area, total + area)
                });
            for index in [usize::from(Region::Earth), usize::from(*region)] {
                weighted[index] += row_sum;
                covered[index] += row_area;
            }
        }
        (weighted, covered)
    }
}

/// A spatial aggregation bound to its field, areas and variables
pub struct SpatialAggregation<'a> {
    aggregator: &'a SpatialAggregator,
    field: &'a GriddedField,
    areas: &'a CellArea,
    variables: &'a SinkVariables,
    range: Option<(TimeKey, TimeKey)>,
}

impl SpatialAggregation<'_> {
    /// Aggregate with the aggregator's own threshold
    pub fn run(&self) -> SinkfluxResult<RegionalSeries> {
        self.aggregator
            .integrate_regional(self.field, self.areas, self.variables, self.range)
    }
}

impl Reaggregate for SpatialAggregation<'_> {
    fn reaggregate(&self, threshold_latitude: FloatValue) -> SinkfluxResult<RegionalSeries> {
        let aggregator = SpatialAggregator::from_parameters(AggregationParameters {
            threshold_latitude,
            ..self.aggregator.parameters.clone()
        });
        aggregator.integrate_regional(self.field, self.areas, self.variables, self.range)
    }
}
