use bytes::Bytes;
use image::ImageFormat;

use super::frame::PixelFormat;
use crate::error::SourceError;

/// Converts a raw grabber buffer into a luminance plane of `width * height` bytes.
pub fn decode_luma(
    data: &[u8],
    format: PixelFormat,
    width: u32,
    height: u32,
) -> Result<Bytes, SourceError> {
    let expected = width as usize * height as usize;
    match format {
        PixelFormat::Grey => {
            if data.len() < expected {
                return Err(SourceError::device(format!(
                    "short GREY buffer: {} bytes, expected {}",
                    data.len(),
                    expected
                )));
            }
            Ok(Bytes::copy_from_slice(&data[..expected]))
        }
        PixelFormat::Yuyv4 => {
            // Y0 U Y1 V: luminance lives on even bytes
            if data.len() < expected * 2 {
                return Err(SourceError::device(format!(
                    "short YUYV buffer: {} bytes, expected {}",
                    data.len(),
                    expected * 2
                )));
            }
            let luma: Vec<u8> = data[..expected * 2].iter().step_by(2).copied().collect();
            Ok(Bytes::from(luma))
        }
        PixelFormat::Mjpeg => {
            let image = image::load_from_memory_with_format(data, ImageFormat::Jpeg)?.into_luma8();
            if image.width() != width || image.height() != height {
                return Err(SourceError::device(format!(
                    "decoded {}x{} JPEG, expected {}x{}",
                    image.width(),
                    image.height(),
                    width,
                    height
                )));
            }
            Ok(Bytes::from(image.into_raw()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yuyv_keeps_luminance_bytes() {
        let raw = [10u8, 128, 20, 128, 30, 128, 40, 128];
        let luma = decode_luma(&raw, PixelFormat::Yuyv4, 2, 2).unwrap();
        assert_eq!(&luma[..], &[10, 20, 30, 40]);
    }

    #[test]
    fn short_grey_buffer_is_a_device_error() {
        let err = decode_luma(&[0u8; 3], PixelFormat::Grey, 2, 2).unwrap_err();
        assert!(matches!(err, SourceError::Device(_)));
    }
}
