pub mod math {
    pub fn degree_to_radian(degree: f32) -> f32 {
        degree * std::f32::consts::PI / 180.0
    }

    /// Number of groups of `group` needed to cover `extent`.
    pub fn div_ceil(extent: u32, group: u32) -> u32 {
        (extent + group - 1) / group
    }
}

pub mod color {
    /// Convert hue (degrees), saturation and value into linear RGB.
    pub fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> glam::Vec3 {
        let h = hue.rem_euclid(360.0) / 60.0;
        let c = value * saturation;
        let x = c * (1.0 - (h % 2.0 - 1.0).abs());
        let m = value - c;

        let (r, g, b) = match h as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };
        glam::Vec3::new(r + m, g + m, b + m)
    }
}
