//! Video output dimension selection.

use cadenza_core::Dimensions;

/// Canonical output width for a peak video bitrate.
///
/// Common video encoders require even dimensions, so every returned value is
/// rounded down to even.
fn canonical_width(peak_kbps: u32) -> u32 {
    match peak_kbps {
        0..=399 => 416,
        400..=799 => 480,
        800..=1199 => 640,
        1200..=2199 => 768,
        2200..=3299 => 960,
        3300..=8599 => 1280,
        _ => 1920,
    }
}

fn even(value: u32) -> u32 {
    value & !1
}

/// Select output dimensions for a peak bitrate and optional source size.
///
/// A source already smaller than the canonical size is kept (even-rounded)
/// rather than upscaled; otherwise the canonical width applies, preserving
/// the source aspect ratio when known and assuming 16:9 when not.
/// Idempotent: feeding the result back as the source yields the same value.
pub fn select_dimensions(peak_kbps: u32, source: Option<Dimensions>) -> Dimensions {
    let width = canonical_width(peak_kbps);

    let Some(src) = source else {
        return Dimensions::new(width, even(width * 9 / 16));
    };

    if src.width <= width {
        return Dimensions::new(even(src.width), even(src.height));
    }

    let height = (u64::from(width) * u64::from(src.height) / u64::from(src.width)) as u32;
    Dimensions::new(even(width), even(height))
}

/// Audio bitrate paired with a video rendition of the given peak bitrate.
pub fn suitable_audio_bitrate(peak_kbps: u32) -> u32 {
    match peak_kbps {
        0..=1199 => 64,
        1200..=3299 => 128,
        _ => 192,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_widths_follow_bitrate_table() {
        assert_eq!(select_dimensions(200, None).width, 416);
        assert_eq!(select_dimensions(400, None).width, 480);
        assert_eq!(select_dimensions(800, None).width, 640);
        assert_eq!(select_dimensions(1200, None).width, 768);
        assert_eq!(select_dimensions(2200, None).width, 960);
        assert_eq!(select_dimensions(3300, None).width, 1280);
        assert_eq!(select_dimensions(8600, None).width, 1920);
    }

    #[test]
    fn unknown_source_assumes_sixteen_by_nine() {
        let dim = select_dimensions(1200, None);
        assert_eq!(dim, Dimensions::new(768, 432));
    }

    #[test]
    fn smaller_source_is_never_upscaled() {
        let dim = select_dimensions(2200, Some(Dimensions::new(640, 480)));
        assert_eq!(dim, Dimensions::new(640, 480));
    }

    #[test]
    fn odd_source_dimensions_are_rounded_even() {
        let dim = select_dimensions(2200, Some(Dimensions::new(639, 481)));
        assert_eq!(dim, Dimensions::new(638, 480));
    }

    #[test]
    fn larger_source_is_rescaled_preserving_aspect() {
        // 1920x1080 at 1200 kbps: canonical width 768, height 768*1080/1920 = 432.
        let dim = select_dimensions(1200, Some(Dimensions::new(1920, 1080)));
        assert_eq!(dim, Dimensions::new(768, 432));

        // 4:3 source keeps its aspect ratio.
        let dim = select_dimensions(1200, Some(Dimensions::new(1440, 1080)));
        assert_eq!(dim, Dimensions::new(768, 576));
    }

    #[test]
    fn selection_is_idempotent_and_even() {
        for (peak, src) in [
            (200, Some(Dimensions::new(1921, 1083))),
            (1200, Some(Dimensions::new(853, 480))),
            (2200, None),
            (9000, Some(Dimensions::new(3840, 2160))),
        ] {
            let first = select_dimensions(peak, src);
            let second = select_dimensions(peak, Some(first));
            assert_eq!(first, second, "peak={peak} src={src:?}");
            assert_eq!(first.width % 2, 0);
            assert_eq!(first.height % 2, 0);
        }
    }

    #[test]
    fn audio_bitrate_scales_with_video_peak() {
        assert_eq!(suitable_audio_bitrate(800), 64);
        assert_eq!(suitable_audio_bitrate(2200), 128);
        assert_eq!(suitable_audio_bitrate(5000), 192);
    }
}
