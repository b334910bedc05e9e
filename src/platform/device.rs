/// Viewport metrics media queries are evaluated against
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceMetrics {
    pub width: u32,
    pub height: u32,
    pub dpr: f32,
    pub touch: bool,
}

impl Default for DeviceMetrics {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            dpr: 1.0,
            touch: false,
        }
    }
}

impl DeviceMetrics {
    pub fn is_portrait(&self) -> bool {
        self.height >= self.width
    }

    /// Pixel ratio clamped to something a canvas can be scaled by.
    pub fn pixel_ratio(&self) -> f32 {
        if self.dpr.is_finite() && self.dpr > 0.0 {
            self.dpr
        } else {
            1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_metrics_are_a_landscape_desktop() {
        let m = DeviceMetrics::default();
        assert_eq!(m.width, 1280);
        assert!(!m.is_portrait());
        assert_eq!(m.pixel_ratio(), 1.0);
    }

    #[test]
    fn pixel_ratio_falls_back_to_one() {
        let m = DeviceMetrics {
            dpr: 0.0,
            ..Default::default()
        };
        assert_eq!(m.pixel_ratio(), 1.0);
        let m = DeviceMetrics {
            dpr: f32::NAN,
            ..Default::default()
        };
        assert_eq!(m.pixel_ratio(), 1.0);
    }
}
