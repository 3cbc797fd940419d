//! Earth locations and affine grid transforms.
//!
//! Grids in this crate are navigated by an affine
//! [`EarthTransform`]: six coefficients in the usual
//! geo-transform order mapping pixel `(col, row)` to
//! `(lon, lat)`. Full map projection math is not modelled;
//! any projection reduces to this form locally.

use crate::chunking::{COL, ROW};
use crate::Result;
use anyhow::anyhow;
use nalgebra::{Matrix3, Point2, Vector3};
use serde_derive::{Deserialize, Serialize};

/// Mean earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Homogeneous 2D affine transform on `(x, y)` points.
pub type PixelTransform = Matrix3<f64>;

/// A point on the earth in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EarthLocation {
    pub lat: f64,
    pub lon: f64,
}

impl EarthLocation {
    pub fn new(lat: f64, lon: f64) -> Self {
        EarthLocation { lat, lon }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite() && self.lat.abs() <= 90.
    }

    /// Great circle distance in kilometres.
    pub fn distance(&self, other: &EarthLocation) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.lon - self.lon).to_radians();
        let a = (dlat / 2.).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.).sin().powi(2);
        2. * EARTH_RADIUS_KM * a.sqrt().min(1.).asin()
    }
}

/// Navigation of a `rows x cols` grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EarthTransform {
    pub dims: [usize; 2],
    pub geo: [f64; 6],
}

impl EarthTransform {
    pub fn new(dims: [usize; 2], geo: [f64; 6]) -> Self {
        EarthTransform { dims, geo }
    }

    /// A regular lat/lon grid with the given upper-left
    /// corner and pixel size in degrees.
    pub fn regular(dims: [usize; 2], north: f64, west: f64, res: f64) -> Self {
        EarthTransform::new(dims, [west, res, 0., north, 0., -res])
    }

    /// The transform as a matrix taking `(col, row)` to
    /// `(lon, lat)`.
    pub fn pixel_transform(&self) -> PixelTransform {
        let t = &self.geo;
        Matrix3::from_columns(&[
            Vector3::new(t[1], t[4], 0.),
            Vector3::new(t[2], t[5], 0.),
            Vector3::new(t[0], t[3], 1.),
        ])
    }

    /// Location of the centre of a pixel.
    pub fn location(&self, coords: [usize; 2]) -> EarthLocation {
        self.location_at(coords[ROW] as f64 + 0.5, coords[COL] as f64 + 0.5)
    }

    /// Location of fractional pixel coordinates.
    pub fn location_at(&self, row: f64, col: f64) -> EarthLocation {
        let pt = self.pixel_transform().transform_point(&Point2::new(col, row));
        EarthLocation::new(pt.y, pt.x)
    }

    /// Check if two transforms navigate the same grid, up to
    /// a relative tolerance on the coefficients.
    pub fn is_congruent(&self, other: &EarthTransform) -> bool {
        const TOL: f64 = 1e-9;
        self.dims == other.dims
            && self
                .geo
                .iter()
                .zip(other.geo.iter())
                .all(|(a, b)| (a - b).abs() <= TOL * a.abs().max(b.abs()).max(1.))
    }
}

/// Compute the affine transform from pixel coordinates of
/// the first grid to pixel coordinates of the second.
pub fn transform_between(from: &EarthTransform, to: &EarthTransform) -> Result<PixelTransform> {
    to.pixel_transform()
        .try_inverse()
        .ok_or_else(|| anyhow!("couldn't invert destination transform"))
        .map(|inv| inv * from.pixel_transform())
}

/// Converts a transform between pixel coordinates into a
/// function mapping the centre of an integer pixel `[row,
/// col]` to the pixel of the target grid containing it, or
/// `None` if it falls outside the target `dims`.
pub fn index_transformer(t: PixelTransform, dims: [usize; 2]) -> impl Fn([usize; 2]) -> Option<[usize; 2]> {
    move |[i, j]| {
        let pt = t.transform_point(&Point2::new(j as f64 + 0.5, i as f64 + 0.5));

        if !(pt.x >= 0. && pt.y >= 0.) {
            return None;
        }
        let j_2 = pt.x.floor() as usize;
        let i_2 = pt.y.floor() as usize;

        if i_2 >= dims[ROW] || j_2 >= dims[COL] {
            None
        } else {
            Some([i_2, j_2])
        }
    }
}
