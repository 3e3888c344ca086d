// SPDX-License-Identifier: GPL-3.0-only

//! Plane geometry used by hit testing.
//!
//! All coordinates are in layout units with the origin at the top left and
//! y growing downwards. Angles are in degrees, positive values rotate
//! clockwise on screen.

/// A point in layout coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    /// Creates a point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Returns the point moved by `(dx, dy)`.
    #[must_use]
    pub fn offset_by(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Rotates the point around the origin by `degrees`.
    #[must_use]
    pub fn rotate(self, degrees: f64) -> Self {
        if degrees == 0.0 {
            return self;
        }
        let (sin, cos) = degrees.to_radians().sin_cos();
        Self::new(self.x * cos - self.y * sin, self.x * sin + self.y * cos)
    }
}

/// An axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    /// Returns `true` if the point lies inside, left/top edges inclusive.
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.y >= self.y
            && point.x < self.x + self.width
            && point.y < self.y + self.height
    }

    /// Center of the rectangle.
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Button shape, anchored at the button origin.
///
/// Without an explicit polygon the outline is the `width` x `height`
/// rectangle. The width is also the horizontal advance of the button
/// inside its row.
#[derive(Debug, Clone, PartialEq)]
pub struct Outline {
    pub width: f64,
    pub height: f64,
    pub polygon: Option<Vec<Point>>,
}

impl Outline {
    /// Rectangular outline.
    #[must_use]
    pub fn rectangle(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            polygon: None,
        }
    }

    /// Bounding rectangle at the origin.
    pub fn bounds(&self) -> Bounds {
        Bounds {
            x: 0.0,
            y: 0.0,
            width: self.width,
            height: self.height,
        }
    }

    /// Tests whether a point, relative to the button origin, is inside.
    pub fn contains(&self, point: Point) -> bool {
        match &self.polygon {
            None => self.bounds().contains(point),
            Some(polygon) => polygon_contains(polygon, point),
        }
    }
}

/// Even-odd ray casting test.
pub fn polygon_contains(polygon: &[Point], point: Point) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (a, b) = (polygon[i], polygon[j]);
        if (a.y > point.y) != (b.y > point.y)
            && point.x < (b.x - a.x) * (point.y - a.y) / (b.y - a.y) + a.x
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}
