//! Output bound fitting and nearest-neighbour downscaling.

/// Bytes per pixel for BGRA frames.
pub const BGRA_BYTES_PER_PIXEL: usize = 4;

/// Fit `width`x`height` inside `max_width`x`max_height`, preserving aspect ratio.
///
/// A zero bound leaves that axis unconstrained; two zero bounds keep the
/// native size. Frames are only ever shrunk, never enlarged, and the result
/// is at least 1x1 for non-empty input.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (width, height);
    }

    let fits_width = max_width == 0 || width <= max_width;
    let fits_height = max_height == 0 || height <= max_height;
    if fits_width && fits_height {
        return (width, height);
    }

    let (w, h) = (width as u64, height as u64);
    let width_limited = if max_height == 0 {
        true
    } else if max_width == 0 {
        false
    } else {
        w * max_height as u64 >= h * max_width as u64
    };

    if width_limited {
        let scaled_h = (h * max_width as u64 / w).max(1) as u32;
        (max_width, scaled_h)
    } else {
        let scaled_w = (w * max_height as u64 / h).max(1) as u32;
        (scaled_w, max_height)
    }
}

/// Nearest-neighbour resample of a BGRA image into a tightly packed buffer.
///
/// `src_stride` is the byte length of one source row and may include padding.
/// Returns `None` when `src` is too short for the described geometry.
pub fn downscale_bgra(
    src: &[u8],
    src_width: u32,
    src_height: u32,
    src_stride: usize,
    dst_width: u32,
    dst_height: u32,
) -> Option<Vec<u8>> {
    let row_bytes = src_width as usize * BGRA_BYTES_PER_PIXEL;
    if src_stride < row_bytes {
        return None;
    }
    if src_height > 0 && src.len() < src_stride * (src_height as usize - 1) + row_bytes {
        return None;
    }

    let dst_row = dst_width as usize * BGRA_BYTES_PER_PIXEL;
    let mut dst = vec![0u8; dst_row * dst_height as usize];
    if src_width == 0 || src_height == 0 {
        return Some(dst);
    }

    for dy in 0..dst_height as usize {
        let sy = dy * src_height as usize / dst_height as usize;
        let src_row = &src[sy * src_stride..sy * src_stride + row_bytes];
        let out_row = &mut dst[dy * dst_row..(dy + 1) * dst_row];
        for dx in 0..dst_width as usize {
            let sx = dx * src_width as usize / dst_width as usize;
            let s = sx * BGRA_BYTES_PER_PIXEL;
            let d = dx * BGRA_BYTES_PER_PIXEL;
            out_row[d..d + BGRA_BYTES_PER_PIXEL]
                .copy_from_slice(&src_row[s..s + BGRA_BYTES_PER_PIXEL]);
        }
    }
    Some(dst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn zero_bounds_keep_native_size() {
        assert_eq!(fit_within(2560, 1440, 0, 0), (2560, 1440));
    }

    #[test]
    fn landscape_is_width_limited() {
        assert_eq!(fit_within(2560, 1440, 1280, 720), (1280, 720));
        assert_eq!(fit_within(3840, 1600, 1280, 720), (1280, 533));
    }

    #[test]
    fn portrait_is_height_limited() {
        assert_eq!(fit_within(1080, 1920, 1280, 720), (405, 720));
    }

    #[test]
    fn single_axis_bound() {
        assert_eq!(fit_within(1920, 1080, 960, 0), (960, 540));
        assert_eq!(fit_within(1920, 1080, 0, 540), (960, 540));
    }

    #[test]
    fn never_enlarges() {
        assert_eq!(fit_within(800, 600, 1920, 1080), (800, 600));
    }

    #[test]
    fn downscale_picks_nearest_pixels() {
        // 2x2 image: distinct pixel per quadrant, stride padded by 4 bytes.
        let src: Vec<u8> = vec![
            1, 1, 1, 1, 2, 2, 2, 2, 0, 0, 0, 0, //
            3, 3, 3, 3, 4, 4, 4, 4, 0, 0, 0, 0,
        ];
        let out = downscale_bgra(&src, 2, 2, 12, 1, 1).unwrap();
        assert_eq!(out, vec![1, 1, 1, 1]);

        let same = downscale_bgra(&src, 2, 2, 12, 2, 2).unwrap();
        assert_eq!(same, vec![1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4]);
    }

    #[test]
    fn downscale_rejects_short_buffers() {
        assert!(downscale_bgra(&[0u8; 12], 2, 2, 8, 1, 1).is_none());
        assert!(downscale_bgra(&[0u8; 16], 2, 2, 4, 1, 1).is_none());
    }

    proptest! {
        #[test]
        fn fitted_size_never_exceeds_bound(
            w in 1u32..8000,
            h in 1u32..8000,
            max_w in 0u32..4000,
            max_h in 0u32..4000,
        ) {
            let (fw, fh) = fit_within(w, h, max_w, max_h);
            prop_assert!(fw >= 1 && fh >= 1);
            prop_assert!(fw <= w && fh <= h);
            if max_w > 0 {
                prop_assert!(fw <= max_w);
            }
            if max_h > 0 {
                prop_assert!(fh <= max_h);
            }
        }

        #[test]
        fn fitted_size_preserves_aspect(
            w in 16u32..8000,
            h in 16u32..8000,
            max_w in 16u32..4000,
            max_h in 16u32..4000,
        ) {
            let (fw, fh) = fit_within(w, h, max_w, max_h);
            // Truncation loses at most one pixel on the scaled axis.
            let lhs = fw as f64 * h as f64;
            let rhs = fh as f64 * w as f64;
            prop_assert!((lhs - rhs).abs() <= w.max(h) as f64);
        }

        #[test]
        fn fitting_is_idempotent(
            w in 1u32..8000,
            h in 1u32..8000,
            max_w in 0u32..4000,
            max_h in 0u32..4000,
        ) {
            let once = fit_within(w, h, max_w, max_h);
            prop_assert_eq!(fit_within(once.0, once.1, max_w, max_h), once);
        }
    }
}
