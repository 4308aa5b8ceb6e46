/// Axis-aligned face box in source-frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Builds a box from corner coordinates, truncating toward zero.
    pub fn from_corners(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        let x = x1 as i32;
        let y = y1 as i32;
        Self::new(x, y, x2 as i32 - x, y2 as i32 - y)
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn area(&self) -> i64 {
        if self.width <= 0 || self.height <= 0 {
            return 0;
        }
        self.width as i64 * self.height as i64
    }

    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let ix1 = self.x.max(other.x);
        let iy1 = self.y.max(other.y);
        let ix2 = self.right().min(other.right());
        let iy2 = self.bottom().min(other.bottom());

        let inter = (ix2 - ix1).max(0) as f64 * (iy2 - iy1).max(0) as f64;
        if inter == 0.0 {
            return 0.0;
        }

        let union = self.area() as f64 + other.area() as f64 - inter;
        if union <= 0.0 {
            return 0.0;
        }
        inter / union
    }

    /// Grows the box by `fraction` of its size on every side.
    pub fn padded(&self, fraction: f64) -> BoundingBox {
        let x_pad = (fraction * self.width as f64) as i32;
        let y_pad = (fraction * self.height as f64) as i32;
        BoundingBox::new(
            self.x - x_pad,
            self.y - y_pad,
            self.width + 2 * x_pad,
            self.height + 2 * y_pad,
        )
    }

    /// Intersects the box with a `frame_w` x `frame_h` frame.
    ///
    /// Returns `None` when nothing of positive area remains.
    pub fn clipped(&self, frame_w: u32, frame_h: u32) -> Option<BoundingBox> {
        let x1 = self.x.max(0);
        let y1 = self.y.max(0);
        let x2 = self.right().min(frame_w as i32);
        let y2 = self.bottom().min(frame_h as i32);

        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(BoundingBox::new(x1, y1, x2 - x1, y2 - y1))
    }
}
