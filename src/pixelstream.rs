use crate::pixel::Pixel;

/// The bytes of a sequence of pixels, in wire order.
pub struct PixelStream<P, I>
where
    P: Pixel,
    I: Iterator<Item = P>,
{
    pixel_stream: I,
    bytes_iter: Option<P::BytesIter>,
    finished: bool,
}

impl<I, P> PixelStream<P, I>
where
    P: Pixel,
    I: Iterator<Item = P>,
{
    fn new(pixel_stream: I) -> Self {
        Self {
            pixel_stream,
            bytes_iter: None,
            finished: false,
        }
    }
}

impl<I, P> PixelStream<P, I>
where
    P: Pixel,
    I: ExactSizeIterator<Item = P>,
{
    /// The number of bytes the remaining pixels produce.
    pub fn byte_len(&self) -> usize {
        self.pixel_stream.len() * P::BYTES
    }
}

impl<I, P> Iterator for PixelStream<P, I>
where
    P: Pixel,
    I: Iterator<Item = P>,
{
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        loop {
            if self.finished {
                return None;
            }

            if self.bytes_iter.is_none() {
                self.bytes_iter = self.pixel_stream.next().map(|p| p.into_ws281x_bytes());
            }

            if let Some(bytes_iter) = self.bytes_iter.as_mut() {
                if let Some(byte) = bytes_iter.next() {
                    return Some(byte);
                } else {
                    self.bytes_iter = None;
                }
            } else {
                self.finished = true;
            }
        }
    }
}

/// Converts an iterator of pixels into a pixel stream, usable by the driver's
/// [`render_pixels`](crate::pwm::Ws281xDriver::render_pixels) function.
pub trait IntoPixelStream {
    /// The pixel type.
    type Pixel: Pixel;
    /// The pixel iterator type.
    type PixelIter: Iterator<Item = Self::Pixel>;

    /// Converts the current object into a pixel stream.
    fn into_pixel_stream(self) -> PixelStream<Self::Pixel, Self::PixelIter>;
}

impl<T> IntoPixelStream for T
where
    T: IntoIterator,
    <T as IntoIterator>::Item: Pixel,
{
    type Pixel = <T as IntoIterator>::Item;
    type PixelIter = <T as IntoIterator>::IntoIter;

    fn into_pixel_stream(self) -> PixelStream<Self::Pixel, Self::PixelIter> {
        PixelStream::new(self.into_iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    #[test]
    fn flattens_pixels_in_wire_order() {
        let pixels = [[1u8, 2, 3], [4, 5, 6]];
        let stream = pixels.into_pixel_stream();
        assert_eq!(stream.byte_len(), 6);
        assert_eq!(stream.collect::<Vec<_>>(), [2, 1, 3, 5, 4, 6]);
    }

    #[test]
    fn borrowed_pixels() {
        let pixels = [[9u8, 8, 7, 6]];
        let stream = pixels.iter().into_pixel_stream();
        assert_eq!(stream.byte_len(), 4);
        assert_eq!(stream.collect::<Vec<_>>(), [9, 8, 7, 6]);
    }

    #[test]
    fn empty_stream() {
        let mut stream = Vec::<[u8; 3]>::new().into_pixel_stream();
        assert_eq!(stream.byte_len(), 0);
        assert_eq!(stream.next(), None);
        assert_eq!(stream.next(), None);
    }
}
