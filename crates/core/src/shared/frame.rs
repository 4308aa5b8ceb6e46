use ndarray::ArrayView3;

use crate::shared::bbox::BoundingBox;

/// A single decoded image: contiguous interleaved bytes in row-major order.
///
/// Crops are produced with [`Frame::crop`], which copies pixels so later
/// pipeline stages never keep the full source frame alive.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Copies the pixels inside `bbox` into a new frame.
    ///
    /// The box is clipped to the frame first; an empty intersection yields a
    /// zero-sized frame.
    pub fn crop(&self, bbox: &BoundingBox) -> Frame {
        let Some(clipped) = bbox.clipped(self.width, self.height) else {
            return Frame::new(Vec::new(), 0, 0, self.channels);
        };

        let ch = self.channels as usize;
        let stride = self.width as usize * ch;
        let row_len = clipped.width as usize * ch;
        let mut data = Vec::with_capacity(row_len * clipped.height as usize);

        for row in clipped.y as usize..(clipped.y + clipped.height) as usize {
            let start = row * stride + clipped.x as usize * ch;
            data.extend_from_slice(&self.data[start..start + row_len]);
        }

        Frame::new(
            data,
            clipped.width as u32,
            clipped.height as u32,
            self.channels,
        )
    }

    /// Resamples an RGB frame to exactly `width` x `height`.
    pub fn resized(&self, width: u32, height: u32) -> Result<Frame, Box<dyn std::error::Error>> {
        if self.channels != 3 {
            return Err(format!("cannot resize a {}-channel frame", self.channels).into());
        }
        let img = image::RgbImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or("frame buffer does not match its dimensions")?;
        let resized =
            image::imageops::resize(&img, width, height, image::imageops::FilterType::Triangle);
        Ok(Frame::new(resized.into_raw(), width, height, 3))
    }

    /// Resamples by a uniform factor, keeping at least one pixel per axis.
    pub fn scaled(&self, factor: f64) -> Result<Frame, Box<dyn std::error::Error>> {
        let w = ((self.width as f64 * factor).round() as u32).max(1);
        let h = ((self.height as f64 * factor).round() as u32).max(1);
        self.resized(w, h)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
