use serde::{Deserialize, Serialize};

pub const DEFAULT_END_SLACK_PX: f64 = 1.0;

/// Answers "has the scroll position reached the end of the content?".
/// Sampled once per scroll event.
pub trait Viewport {
    fn reached_end(&self) -> bool;
}

impl Viewport for bool {
    fn reached_end(&self) -> bool {
        *self
    }
}

/// Raw scroll geometry of the activity list, in CSS pixels. Values may be
/// fractional on zoomed or high-DPI displays.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

impl ScrollMetrics {
    /// Pixels of content still below the visible area.
    pub fn remaining(&self) -> f64 {
        (self.scroll_height - (self.scroll_top + self.client_height)).max(0.0)
    }

    pub fn with_slack(self, slack_px: f64) -> ScrollSample {
        ScrollSample {
            metrics: self,
            slack_px: if slack_px.is_finite() {
                slack_px.max(0.0)
            } else {
                DEFAULT_END_SLACK_PX
            },
        }
    }
}

/// Scroll geometry plus the tolerance used to call it "at the end".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollSample {
    pub metrics: ScrollMetrics,
    pub slack_px: f64,
}

impl Viewport for ScrollSample {
    fn reached_end(&self) -> bool {
        self.metrics.remaining() <= self.slack_px
    }
}

impl Viewport for ScrollMetrics {
    fn reached_end(&self) -> bool {
        self.with_slack(DEFAULT_END_SLACK_PX).reached_end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(scroll_top: f64) -> ScrollMetrics {
        ScrollMetrics {
            scroll_top,
            scroll_height: 1000.0,
            client_height: 400.0,
        }
    }

    #[test]
    fn exact_bottom_reaches_end() {
        assert!(metrics(600.0).reached_end());
        assert!(!metrics(500.0).reached_end());
    }

    #[test]
    fn fractional_bottom_still_reaches_end() {
        // 599.5 + 400 never equals 1000 exactly.
        assert!(metrics(599.5).reached_end());
        assert!(!metrics(598.0).reached_end());
    }

    #[test]
    fn slack_is_configurable() {
        assert!(metrics(550.0).with_slack(50.0).reached_end());
        assert!(!metrics(550.0).with_slack(10.0).reached_end());
        assert!(!metrics(599.0).with_slack(-5.0).reached_end());
    }

    #[test]
    fn non_finite_slack_falls_back_to_default() {
        assert!(metrics(599.5).with_slack(f64::NAN).reached_end());
        assert!(!metrics(500.0).with_slack(f64::NAN).reached_end());
        assert!(!metrics(500.0).with_slack(f64::INFINITY).reached_end());
    }

    #[test]
    fn overscroll_counts_as_end() {
        assert_eq!(metrics(700.0).remaining(), 0.0);
        assert!(metrics(700.0).reached_end());
    }
}
