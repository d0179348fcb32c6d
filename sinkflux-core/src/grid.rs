//! Surface areas of latitude/longitude grid cells
//!
//! The area of a box bounded by two parallels and two meridians on a sphere
//! of radius $R$ is
//!
//! $$ A = 2 \pi R^2 (\sin\phi_{max} - \sin\phi_{min}) \frac{\Delta\lambda}{360} $$
//!
//! where $\Delta\lambda$ is the longitude span in degrees, unwrapped across the
//! 0°/360° discontinuity so that it always lies in (0°, 360°].
//!
//! Areas depend only on the coordinate grid, so a [`CellArea`] can be computed
//! once and reused for every time step of a dataset sharing that grid.

use crate::errors::{SinkfluxError, SinkfluxResult};
use crate::timeseries::FloatValue;
use log::debug;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Mean radius of the Earth in metres
pub const EARTH_RADIUS: FloatValue = 6.371e6;

/// Parameters for grid geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridParameters {
    /// Radius of the sphere
    /// unit: m
    /// default: 6.371e6
    pub earth_radius: FloatValue,
}

impl Default for GridParameters {
    fn default() -> Self {
        Self {
            earth_radius: EARTH_RADIUS,
        }
    }
}

/// Spherical geometry of lat/lon grids
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    parameters: GridParameters,
}

impl GridGeometry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parameters(parameters: GridParameters) -> Self {
        Self { parameters }
    }

    pub fn parameters(&self) -> &GridParameters {
        &self.parameters
    }

    /// Total surface area of the sphere, $4 \pi R^2$
    pub fn sphere_area(&self) -> FloatValue {
        4.0 * PI * self.parameters.earth_radius.powi(2)
    }

    /// Area of a single lat/lon box in square metres
    ///
    /// Latitudes are in degrees north; longitudes in degrees east in any
    /// convention (`[0, 360)` or `[-180, 180)`).
    pub fn cell_area(
        &self,
        min_lat: FloatValue,
        max_lat: FloatValue,
        min_lon: FloatValue,
        max_lon: FloatValue,
    ) -> FloatValue {
        let radius = self.parameters.earth_radius;
        let band = max_lat.to_radians().sin() - min_lat.to_radians().sin();
        2.0 * PI * radius * radius * band * unwrapped_span(min_lon, max_lon) / 360.0
    }

    /// Area of every cell of a grid given by its cell-centre coordinates
    ///
    /// Cell edges are placed half-way between neighbouring coordinates; edge
    /// cells extend by half of their single neighbouring step. Latitude edges
    /// are clipped to the poles. At least two coordinates are needed along
    /// each axis to infer the spacing.
    pub fn grid_areas(
        &self,
        latitudes: &[FloatValue],
        longitudes: &[FloatValue],
    ) -> SinkfluxResult<CellArea> {
        validate_latitudes(latitudes)?;
        if longitudes.len() < 2 {
            return Err(SinkfluxError::Configuration(format!(
                "at least 2 longitudes are needed to infer the grid spacing, got {}",
                longitudes.len()
            )));
        }
        if longitudes.iter().any(|lon| !lon.is_finite()) {
            return Err(SinkfluxError::Configuration(
                "longitudes must be finite".to_string(),
            ));
        }

        let lat_bounds: Vec<(FloatValue, FloatValue)> = cell_bounds(latitudes, false)
            .into_iter()
            .map(|(lower, upper)| (lower.max(-90.0), upper.min(90.0)))
            .collect();
        if longitudes
            .windows(2)
            .any(|pair| wrapped_difference(pair[1] - pair[0]) == 0.0)
        {
            return Err(SinkfluxError::Configuration(
                "longitudes must not repeat".to_string(),
            ));
        }
        let lon_bounds = cell_bounds(longitudes, true);

        debug!(
            "Computing cell areas for a {}x{} grid",
            latitudes.len(),
            longitudes.len()
        );
        Ok(self.areas_from_bounds(latitudes.to_vec(), &lat_bounds, &lon_bounds))
    }

    /// Cell areas from explicit cell bounds
    ///
    /// Used when a grid has a single longitude column (or latitude row), so
    /// spacing cannot be inferred. Each row is labelled by the midpoint of its
    /// latitude bounds.
    pub fn areas_from_bounds(
        &self,
        latitudes: Vec<FloatValue>,
        lat_bounds: &[(FloatValue, FloatValue)],
        lon_bounds: &[(FloatValue, FloatValue)],
    ) -> CellArea {
        let areas = Array2::from_shape_fn((lat_bounds.len(), lon_bounds.len()), |(i, j)| {
            let (min_lat, max_lat) = lat_bounds[i];
            let (min_lon, max_lon) = lon_bounds[j];
            self.cell_area(min_lat, max_lat, min_lon, max_lon)
        });
        CellArea {
            latitudes: Array1::from_vec(latitudes),
            areas,
        }
    }

    /// Cell areas from explicit bounds, labelling rows by their bound midpoints
    pub fn cells_from_bounds(
        &self,
        lat_bounds: &[(FloatValue, FloatValue)],
        lon_bounds: &[(FloatValue, FloatValue)],
    ) -> CellArea {
        let latitudes = lat_bounds
            .iter()
            .map(|(lower, upper)| 0.5 * (lower + upper))
            .collect();
        self.areas_from_bounds(latitudes, lat_bounds, lon_bounds)
    }
}

/// Area of each (latitude, longitude) cell in square metres
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellArea {
    latitudes: Array1<FloatValue>,
    areas: Array2<FloatValue>,
}

impl CellArea {
    /// Latitude label of each row (degrees north)
    pub fn latitudes(&self) -> ArrayView1<'_, FloatValue> {
        self.latitudes.view()
    }

    /// Areas with shape `(n_lat, n_lon)`
    pub fn areas(&self) -> ArrayView2<'_, FloatValue> {
        self.areas.view()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.areas.dim()
    }

    pub fn total(&self) -> FloatValue {
        self.areas.sum()
    }
}

/// Longitude span in (0, 360] degrees
fn unwrapped_span(min_lon: FloatValue, max_lon: FloatValue) -> FloatValue {
    let span = (max_lon - min_lon).rem_euclid(360.0);
    if span == 0.0 {
        360.0
    } else {
        span
    }
}

/// Wrap a longitude difference into [-180, 180)
fn wrapped_difference(delta: FloatValue) -> FloatValue {
    (delta + 180.0).rem_euclid(360.0) - 180.0
}

fn validate_latitudes(latitudes: &[FloatValue]) -> SinkfluxResult<()> {
    if latitudes.len() < 2 {
        return Err(SinkfluxError::Configuration(format!(
            "at least 2 latitudes are needed to infer the grid spacing, got {}",
            latitudes.len()
        )));
    }
    if latitudes.iter().any(|lat| !lat.is_finite() || lat.abs() > 90.0) {
        return Err(SinkfluxError::Configuration(
            "latitudes must be finite and within [-90, 90]".to_string(),
        ));
    }
    validate_latitude_order(latitudes)
}

/// Latitudes must be strictly increasing or strictly decreasing
pub(crate) fn validate_latitude_order(latitudes: &[FloatValue]) -> SinkfluxResult<()> {
    let increasing = latitudes.windows(2).all(|pair| pair[1] > pair[0]);
    let decreasing = latitudes.windows(2).all(|pair| pair[1] < pair[0]);
    if !(increasing || decreasing) {
        return Err(SinkfluxError::Configuration(
            "latitudes must be strictly increasing or strictly decreasing".to_string(),
        ));
    }
    Ok(())
}

/// Lower and upper edge of each cell from its centre coordinates
fn cell_bounds(coordinates: &[FloatValue], wrap: bool) -> Vec<(FloatValue, FloatValue)> {
    let steps: Vec<FloatValue> = coordinates
        .windows(2)
        .map(|pair| {
            let delta = pair[1] - pair[0];
            if wrap {
                wrapped_difference(delta)
            } else {
                delta
            }
        })
        .collect();
    let last = coordinates.len() - 1;

    coordinates
        .iter()
        .enumerate()
        .map(|(i, centre)| {
            let before = if i == 0 { steps[0] } else { steps[i - 1] };
            let after = if i == last { steps[last - 1] } else { steps[i] };
            let a = centre - 0.5 * before;
            let b = centre + 0.5 * after;
            (a.min(b), a.max(b))
        })
        .collect()
}
