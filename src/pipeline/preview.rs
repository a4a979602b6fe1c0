//! Fast monitoring preview: nearest-neighbour downscale into pooled buffers

use image::GrayImage;

use crate::capture::Frame;

/// Preview width keeping the input aspect ratio for a given preview height.
pub fn output_width(input_width: u32, input_height: u32, output_height: u32) -> u32 {
    if input_height == 0 {
        return output_height;
    }
    let width = (u64::from(output_height) * u64::from(input_width) + u64::from(input_height) / 2)
        / u64::from(input_height);
    (width as u32).max(1)
}

/// Nearest-neighbour resample of `frame` into `dst`, whatever its size.
pub fn resize_nearest(frame: &Frame, dst: &mut GrayImage) {
    let (dst_w, dst_h) = dst.dimensions();
    if dst_w == 0 || dst_h == 0 {
        return;
    }
    let (src_w, src_h) = (u64::from(frame.width()), u64::from(frame.height()));
    let (dst_w, dst_h) = (u64::from(dst_w), u64::from(dst_h));

    let row_len = dst_w as usize;
    let pixels: &mut [u8] = dst;
    for (y, out) in pixels.chunks_exact_mut(row_len).enumerate() {
        let src = frame.row(((y as u64 * src_h) / dst_h) as u32);
        for (x, dst_px) in out.iter_mut().enumerate() {
            *dst_px = src[((x as u64 * src_w) / dst_w) as usize];
        }
    }
}
