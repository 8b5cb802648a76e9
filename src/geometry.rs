//! Text-instance polygons and the crop-window geometry around them.

use geo::{Area, BooleanOps, Coord, LineString, Polygon as GeoPolygon, Rect};
use serde::{Deserialize, Serialize};

/// Minimum intersection area for a clipped polygon to survive boundary repair
pub const DEFAULT_MIN_REPAIR_AREA: f64 = 8.0;

/// Ordered (x, y) vertices of one text instance in pixel space
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Polygon {
    points: Vec<[f32; 2]>,
}

/// Axis-aligned extent of a polygon
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

/// Crop window in pixel indices, `[y0, y1) x [x0, x1)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub y0: usize,
    pub x0: usize,
    pub y1: usize,
    pub x1: usize,
}

impl Window {
    /// Window covering a whole `height x width` image
    pub fn full(height: usize, width: usize) -> Self {
        Self {
            y0: 0,
            x0: 0,
            y1: height,
            x1: width,
        }
    }

    pub fn height(&self) -> usize {
        self.y1 - self.y0
    }

    pub fn width(&self) -> usize {
        self.x1 - self.x0
    }
}

impl Polygon {
    pub fn new(points: Vec<[f32; 2]>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[[f32; 2]] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Bounding box, or `None` for a polygon without vertices
    pub fn bounds(&self) -> Option<Bounds> {
        let (first, rest) = self.points.split_first()?;
        let init = Bounds {
            min_x: first[0],
            min_y: first[1],
            max_x: first[0],
            max_y: first[1],
        };
        Some(rest.iter().fold(init, |b, &[x, y]| Bounds {
            min_x: b.min_x.min(x),
            min_y: b.min_y.min(y),
            max_x: b.max_x.max(x),
            max_y: b.max_y.max(y),
        }))
    }

    /// Multiply x and y coordinates independently
    pub fn scale(&mut self, sx: f32, sy: f32) {
        for p in &mut self.points {
            p[0] *= sx;
            p[1] *= sy;
        }
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        for p in &mut self.points {
            p[0] += dx;
            p[1] += dy;
        }
    }

    /// Strict overlap between the bounding box and a crop window.
    ///
    /// The max corner must lie past the window start and the min corner
    /// before the window end, on both axes.
    pub fn overlaps(&self, window: &Window) -> bool {
        let Some(b) = self.bounds() else {
            return false;
        };
        b.max_x > window.x0 as f32
            && b.max_y > window.y0 as f32
            && b.min_x < window.x1 as f32
            && b.min_y < window.y1 as f32
    }

    /// Shoelace area of the polygon
    pub fn area(&self) -> f64 {
        if self.points.len() < 3 {
            return 0.0;
        }
        self.to_geo().unsigned_area()
    }

    /// Intersect with the rectangle `[0, 0, width, height]`.
    ///
    /// Returns the boundary of the intersection without the closing vertex,
    /// or `None` when the overlapping area is below `min_area`, degenerate,
    /// or the polygon has non-finite coordinates.
    /// A multi-part intersection keeps its largest part.
    pub fn clip_to_rect(&self, width: f64, height: f64, min_area: f64) -> Option<Polygon> {
        if self.points.len() < 3 || width <= 0.0 || height <= 0.0 {
            return None;
        }
        if self.points.iter().flatten().any(|v| !v.is_finite()) {
            return None;
        }

        let b = self.bounds()?;
        let inside = b.min_x >= 0.0
            && b.min_y >= 0.0
            && f64::from(b.max_x) <= width
            && f64::from(b.max_y) <= height;
        if inside {
            let area = self.area();
            return (area > 0.0 && area >= min_area).then(|| self.clone());
        }

        let rect = Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: width, y: height }).to_polygon();
        let clipped = rect.intersection(&self.to_geo());

        let (largest, area) = clipped
            .into_iter()
            .map(|p| {
                let area = p.unsigned_area();
                (p, area)
            })
            .max_by(|a, b| a.1.total_cmp(&b.1))?;

        if area <= 0.0 || area < min_area {
            return None;
        }

        let mut points: Vec<[f32; 2]> = largest
            .exterior()
            .coords()
            .map(|c| [c.x as f32, c.y as f32])
            .collect();
        if points.len() > 1 && points.first() == points.last() {
            points.pop();
        }
        Some(Polygon::new(points))
    }

    fn to_geo(&self) -> GeoPolygon<f64> {
        let ring: Vec<(f64, f64)> = self
            .points
            .iter()
            .map(|&[x, y]| (f64::from(x), f64::from(y)))
            .collect();
        GeoPolygon::new(LineString::from(ring), vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn rect(x0: f32, y0: f32, x1: f32, y1: f32) -> Polygon {
        Polygon::new(vec![[x0, y0], [x1, y0], [x1, y1], [x0, y1]])
    }

    #[test]
    fn test_bounds() {
        let poly = Polygon::new(vec![[10.0, 40.0], [50.0, 10.0], [30.0, 25.0]]);
        let b = poly.bounds().unwrap();
        assert_eq!(b.min_x, 10.0);
        assert_eq!(b.min_y, 10.0);
        assert_eq!(b.max_x, 50.0);
        assert_eq!(b.max_y, 40.0);
        assert!(Polygon::default().bounds().is_none());
    }

    #[test]
    fn test_overlaps_is_strict() {
        let poly = rect(10.0, 10.0, 50.0, 40.0);
        let touching = Window {
            y0: 40,
            x0: 0,
            y1: 80,
            x1: 100,
        };
        assert!(!poly.overlaps(&touching));

        let inside = Window {
            y0: 5,
            x0: 5,
            y1: 60,
            x1: 60,
        };
        assert!(poly.overlaps(&inside));

        let left_of = Window {
            y0: 0,
            x0: 50,
            y1: 100,
            x1: 90,
        };
        assert!(!poly.overlaps(&left_of));
    }

    #[test]
    fn test_scale_and_translate() {
        let mut poly = rect(10.0, 10.0, 20.0, 30.0);
        poly.translate(-10.0, -10.0);
        poly.scale(2.0, 0.5);
        assert_eq!(poly.points(), &[[0.0, 0.0], [20.0, 0.0], [20.0, 10.0], [0.0, 10.0]]);
    }

    #[test]
    fn test_clip_keeps_inside_polygon() {
        let poly = rect(1.0, 1.0, 5.0, 5.0);
        let clipped = poly.clip_to_rect(10.0, 10.0, DEFAULT_MIN_REPAIR_AREA).unwrap();
        assert_eq!(clipped, poly);
    }

    #[test]
    fn test_clip_trims_overhang() {
        let poly = rect(48.0, 6.0, 68.0, 20.0);
        let clipped = poly.clip_to_rect(64.0, 32.0, DEFAULT_MIN_REPAIR_AREA).unwrap();
        assert_relative_eq!(clipped.area(), 16.0 * 14.0, epsilon = 1e-3);
        for &[x, y] in clipped.points() {
            assert!((0.0..=64.0).contains(&x), "x out of range: {}", x);
            assert!((0.0..=32.0).contains(&y), "y out of range: {}", y);
        }
        assert_ne!(clipped.points().first(), clipped.points().last());
    }

    #[test]
    fn test_clip_drops_small_remainder() {
        let poly = rect(63.0, 0.0, 70.0, 3.0);
        assert!(poly.clip_to_rect(64.0, 32.0, DEFAULT_MIN_REPAIR_AREA).is_none());
    }

    #[test]
    fn test_clip_drops_degenerate() {
        let line = Polygon::new(vec![[0.0, 0.0], [10.0, 10.0], [20.0, 20.0]]);
        assert!(line.clip_to_rect(64.0, 64.0, 0.0).is_none());

        let outside = rect(100.0, 100.0, 120.0, 120.0);
        assert!(outside.clip_to_rect(64.0, 64.0, 0.0).is_none());
    }

    #[test]
    fn test_clip_drops_non_finite() {
        let runaway = rect(10.0, 10.0, f32::INFINITY, 20.0);
        assert!(runaway.clip_to_rect(64.0, 64.0, 0.0).is_none());

        let nan = Polygon::new(vec![[1.0, 1.0], [f32::NAN, 5.0], [1.0, 5.0]]);
        assert!(nan.clip_to_rect(64.0, 64.0, 0.0).is_none());
    }
}
