/// Sliding windows over recent speed and bearing samples
use std::collections::VecDeque;

/// Two independently sized FIFO windows
///
/// The speed window is usually short so the averaged speed follows the car
/// quickly, while the bearing window spans a few more seconds so that a turn
/// shows up as a single large delta rather than several small ones.
#[derive(Debug, Clone)]
pub struct SmoothingBuffer {
    speeds: VecDeque<f64>,
    bearings: VecDeque<f64>,
    speed_capacity: usize,
    bearing_capacity: usize,
}

impl SmoothingBuffer {
    pub fn new(speed_capacity: usize, bearing_capacity: usize) -> Self {
        let speed_capacity = speed_capacity.max(1);
        let bearing_capacity = bearing_capacity.max(1);
        Self {
            speeds: VecDeque::with_capacity(speed_capacity + 1),
            bearings: VecDeque::with_capacity(bearing_capacity + 1),
            speed_capacity,
            bearing_capacity,
        }
    }

    /// Append a sample, evicting the oldest entry of a full window
    ///
    /// A fix without a track only feeds the speed window.
    pub fn push(&mut self, speed: f64, bearing: Option<f64>) {
        self.speeds.push_back(speed);
        while self.speeds.len() > self.speed_capacity {
            self.speeds.pop_front();
        }

        if let Some(bearing) = bearing {
            self.bearings.push_back(bearing.rem_euclid(360.0));
            while self.bearings.len() > self.bearing_capacity {
                self.bearings.pop_front();
            }
        }
    }

    /// Mean of the speed window, available once the window is full
    pub fn averaged_speed(&self) -> Option<f64> {
        if self.speeds.len() < self.speed_capacity {
            return None;
        }
        Some(self.speeds.iter().sum::<f64>() / self.speeds.len() as f64)
    }

    /// Spread of the bearing window in degrees, always within `[0, 180]`
    pub fn bearing_delta(&self) -> Option<f64> {
        if self.bearings.len() < self.bearing_capacity {
            return None;
        }

        let max = self.bearings.iter().copied().fold(f64::MIN, f64::max);
        let min = self.bearings.iter().copied().fold(f64::MAX, f64::min);
        let delta = (max - min).abs();

        // 350° and 10° are 20° apart, not 340°
        if delta > 180.0 {
            Some(360.0 - delta)
        } else {
            Some(delta)
        }
    }
}
