use crate::error::{ProcessingError, Result};
use crate::models::SiteLocation;
use std::collections::BTreeMap;

/// A single-band georeferenced grid held in memory.
///
/// Rows run from `origin_y` in steps of `pixel_height` (negative for
/// north-up grids), columns from `origin_x` in steps of `pixel_width`.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterGrid {
    origin_x: f64,
    origin_y: f64,
    pixel_width: f64,
    pixel_height: f64,
    rows: Vec<Vec<f64>>,
}

impl RasterGrid {
    pub fn new(
        origin_x: f64,
        origin_y: f64,
        pixel_width: f64,
        pixel_height: f64,
        rows: Vec<Vec<f64>>,
    ) -> Result<Self> {
        if pixel_width == 0.0 || pixel_height == 0.0 {
            return Err(ProcessingError::Config(
                "Raster pixel size must be non-zero".to_string(),
            ));
        }
        let width = rows.first().map(|r| r.len()).unwrap_or(0);
        if rows.iter().any(|r| r.len() != width) {
            return Err(ProcessingError::InvalidFormat(
                "Raster rows have different lengths".to_string(),
            ));
        }

        Ok(Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            rows,
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.rows.first().map(|r| r.len()).unwrap_or(0))
    }

    /// Pixel value at a coordinate, `None` outside the grid.
    ///
    /// Offsets are truncated toward zero, so a coordinate less than one
    /// pixel before the origin still lands in the first row or column.
    pub fn value_at(&self, longitude: f64, latitude: f64) -> Option<f64> {
        let y = ((latitude - self.origin_y) / self.pixel_height).trunc();
        let x = ((longitude - self.origin_x) / self.pixel_width).trunc();
        if !x.is_finite() || !y.is_finite() || x < 0.0 || y < 0.0 {
            return None;
        }

        self.rows
            .get(y as usize)
            .and_then(|row| row.get(x as usize))
            .copied()
    }

    /// Value under each site, keyed by site code
    pub fn extract_sites(&self, sites: &[SiteLocation]) -> BTreeMap<String, Option<f64>> {
        sites
            .iter()
            .map(|s| (s.site.clone(), self.value_at(s.longitude, s.latitude)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> RasterGrid {
        // 2 x 3 grid, north-up, 0.5 degree pixels
        RasterGrid::new(
            -107.0,
            35.0,
            0.5,
            -0.5,
            vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]],
        )
        .unwrap()
    }

    #[test]
    fn test_value_at_truncates() {
        let grid = grid();
        assert_eq!(grid.shape(), (2, 3));
        assert_eq!(grid.value_at(-106.9, 34.9), Some(1.0));
        assert_eq!(grid.value_at(-106.2, 34.4), Some(5.0));
        assert_eq!(grid.value_at(-106.0 + 0.01, 34.01), Some(6.0));
    }

    #[test]
    fn test_outside_grid_is_none() {
        let grid = grid();
        assert_eq!(grid.value_at(-105.0, 34.9), None);
        assert_eq!(grid.value_at(-106.9, 33.0), None);
        assert_eq!(grid.value_at(-108.0, 34.9), None);
    }

    #[test]
    fn test_extract_sites() {
        let sites = vec![
            SiteLocation::new("US-Seg", 34.36, -106.70),
            SiteLocation::new("US-Vcm", 35.89, -106.53),
        ];
        let values = grid().extract_sites(&sites);
        assert_eq!(values["US-Seg"], Some(4.0));
        assert_eq!(values["US-Vcm"], None);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let result = RasterGrid::new(0.0, 0.0, 1.0, -1.0, vec![vec![1.0], vec![1.0, 2.0]]);
        assert!(result.is_err());
    }
}
