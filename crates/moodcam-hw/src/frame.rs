//! Pixel conversion from camera buffers to packed RGB.

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("buffer too short for {format}: expected {expected} bytes, got {actual}")]
    InvalidLength {
        format: &'static str,
        expected: usize,
        actual: usize,
    },
}

fn check_len(format: &'static str, buf: &[u8], expected: usize) -> Result<(), FrameError> {
    if buf.len() < expected {
        return Err(FrameError::InvalidLength {
            format,
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

/// BT.601 limited-range YCbCr to RGB for one pixel.
fn ycbcr_to_rgb(y: u8, cb: u8, cr: u8) -> [u8; 3] {
    let c = (y as f32 - 16.0) * 1.164;
    let d = cb as f32 - 128.0;
    let e = cr as f32 - 128.0;
    let clamp = |v: f32| v.round().clamp(0.0, 255.0) as u8;
    [
        clamp(c + 1.596 * e),
        clamp(c - 0.392 * d - 0.813 * e),
        clamp(c + 2.017 * d),
    ]
}

/// Convert packed YUYV 4:2:2 to RGB.
///
/// Each 4-byte group `[Y0, U, Y1, V]` yields two pixels sharing `U`/`V`.
/// With an odd pixel count the last group is cut after `U`; its missing
/// chroma is taken as neutral.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = (width * height) as usize;
    check_len("YUYV", yuyv, pixels * 2)?;
    let yuyv = &yuyv[..pixels * 2];

    let mut rgb = Vec::with_capacity(pixels * 3);
    for group in yuyv.chunks(4) {
        let u = group.get(1).copied().unwrap_or(128);
        let v = group.get(3).copied().unwrap_or(128);
        rgb.extend_from_slice(&ycbcr_to_rgb(group[0], u, v));
        if let Some(&y1) = group.get(2) {
            rgb.extend_from_slice(&ycbcr_to_rgb(y1, u, v));
        }
    }
    Ok(rgb)
}

/// Replicate 8-bit grey into three channels.
pub fn grey_to_rgb(grey: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = (width * height) as usize;
    check_len("GREY", grey, pixels)?;
    Ok(grey[..pixels].iter().flat_map(|&g| [g, g, g]).collect())
}

/// Trim an RGB24 buffer to the frame size.
pub fn rgb24(buf: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 3) as usize;
    check_len("RGB3", buf, expected)?;
    Ok(buf[..expected].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_black_and_white() {
        // Two pixels: Y=16 (black), Y=235 (white), neutral chroma.
        let rgb = yuyv_to_rgb(&[16, 128, 235, 128], 2, 1).unwrap();
        assert_eq!(rgb, vec![0, 0, 0, 255, 255, 255]);
    }

    #[test]
    fn test_yuyv_red_chroma() {
        let rgb = yuyv_to_rgb(&[81, 90, 81, 240], 2, 1).unwrap();
        // Roughly pure red.
        assert!(rgb[0] > 240 && rgb[1] < 10 && rgb[2] < 10, "{rgb:?}");
    }

    #[test]
    fn test_yuyv_output_size() {
        let yuyv = vec![128u8; 4 * 2 * 2];
        assert_eq!(yuyv_to_rgb(&yuyv, 4, 2).unwrap().len(), 4 * 2 * 3);
    }

    #[test]
    fn test_yuyv_odd_width_keeps_every_pixel() {
        // 3x1: one full group plus a trailing [Y, U].
        let rgb = yuyv_to_rgb(&[16, 128, 235, 128, 235, 128], 3, 1).unwrap();
        assert_eq!(rgb.len(), 3 * 3);
        assert_eq!(&rgb[6..], &[255, 255, 255]);

        let rgb = yuyv_to_rgb(&vec![128u8; 5 * 3 * 2], 5, 3).unwrap();
        assert_eq!(rgb.len(), 5 * 3 * 3);
    }

    #[test]
    fn test_yuyv_too_short() {
        assert_eq!(
            yuyv_to_rgb(&[1, 2], 2, 1),
            Err(FrameError::InvalidLength { format: "YUYV", expected: 4, actual: 2 })
        );
    }

    #[test]
    fn test_grey_replicates() {
        assert_eq!(grey_to_rgb(&[7, 200], 2, 1).unwrap(), vec![7, 7, 7, 200, 200, 200]);
        assert!(grey_to_rgb(&[7], 2, 1).is_err());
    }

    #[test]
    fn test_rgb24_trims_padding() {
        let buf = vec![1u8; 3 * 4 + 5];
        assert_eq!(rgb24(&buf, 2, 2).unwrap().len(), 12);
    }
}
