/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/

//! Frame timing: derives the frame length (VTS) for a target frame rate
//! and the integration-time bounds that follow from it.

use crate::ControlError;

#[cfg(feature = "rttdebug")]
use panic_rtt_core::rprintln;

/// Frame rate packed the way sensor stacks pass it around:
/// numerator in the upper 16 bits, denominator in the lower 16 bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fps(pub u32);

impl Fps {
    pub const fn new(num: u16, den: u16) -> Self {
        Self(((num as u32) << 16) | den as u32)
    }

    pub const fn num(self) -> u32 {
        self.0 >> 16
    }

    pub const fn den(self) -> u32 {
        self.0 & 0xffff
    }

    /// Frame rate in Q8 fixed point, or None for a zero denominator
    pub fn q8(self) -> Option<u32> {
        fps_q8(self.num(), self.den())
    }
}

fn fps_q8(num: u32, den: u32) -> Option<u32> {
    if den == 0 {
        return None;
    }
    let (num, den) = (num as u64, den as u64);
    let q8 = ((num / den) << 8) + (((num % den) << 8) / den);
    if q8 > u32::MAX as u64 {
        return None;
    }
    Some(q8 as u32)
}

/// Live timing state of the active sensor mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingParameters {
    /// Pixel clock in Hz
    pub pixel_clock: u64,
    /// Line length in pixel clocks (HTS)
    pub total_width: u32,
    /// Frame length in lines (VTS)
    pub total_height: u32,
    pub min_integration_lines: u32,
    pub max_integration_native_lines: u32,
}

impl TimingParameters {
    /// Clamp a shutter line count into the current integration window
    pub fn clamp_integration(&self, lines: u32) -> u32 {
        lines
            .min(self.max_integration_native_lines)
            .max(self.min_integration_lines)
    }

    /// Frame rate currently produced, in Q8 fixed point
    pub fn frame_rate_q8(&self) -> u32 {
        let line_clocks = self.total_width as u64 * self.total_height as u64;
        if line_clocks == 0 {
            return 0;
        }
        ((self.pixel_clock << 8) / line_clocks) as u32
    }
}

/// Device envelope for frame-rate changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingLimits {
    pub min_fps: u32,
    pub max_fps: u32,
    /// Lines of blanking the shutter must leave inside each frame
    pub integration_margin: u32,
    /// Largest value the VTS register holds
    pub max_vts: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct TimingController {
    limits: TimingLimits,
}

impl TimingController {
    pub fn new(limits: TimingLimits) -> Self {
        Self { limits }
    }

    /// Frame length in lines needed for `num / den` frames per second.
    /// Nothing is modified; all rejections happen here.
    pub fn frame_length(
        &self,
        num: u32,
        den: u32,
        params: &TimingParameters,
    ) -> Result<u32, ControlError> {
        if num == 0 || params.total_width == 0 {
            return Err(ControlError::OutOfRange);
        }
        let requested = fps_q8(num, den).ok_or(ControlError::OutOfRange)?;
        let min = self.limits.min_fps << 8;
        let max = self.limits.max_fps << 8;
        if requested < min || requested > max {
            #[cfg(feature = "rttdebug")]
            rprintln!("fps {}/{} outside [{}, {}]", num, den, min, max);
            return Err(ControlError::OutOfRange);
        }

        let vts = params.pixel_clock * den as u64
            / params.total_width as u64
            / num as u64;
        if vts > self.limits.max_vts as u64 {
            return Err(ControlError::OutOfRange);
        }
        let vts = vts as u32;
        match vts.checked_sub(self.limits.integration_margin) {
            Some(max_lines)
                if max_lines > 0 && max_lines >= params.min_integration_lines =>
            {
                Ok(vts)
            }
            _ => Err(ControlError::OutOfRange),
        }
    }

    /// Retarget `params` to `num / den` frames per second.
    /// On error `params` is left untouched.
    pub fn recompute_fps(
        &self,
        num: u32,
        den: u32,
        params: &mut TimingParameters,
    ) -> Result<(), ControlError> {
        let vts = self.frame_length(num, den, params)?;
        params.total_height = vts;
        params.max_integration_native_lines = vts - self.limits.integration_margin;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMITS: TimingLimits = TimingLimits {
        min_fps: 5,
        max_fps: 30,
        integration_margin: 4,
        max_vts: 0xffff,
    };

    fn params_1080p() -> TimingParameters {
        TimingParameters {
            pixel_clock: 74_250_000,
            total_width: 2200,
            total_height: 1125,
            min_integration_lines: 2,
            max_integration_native_lines: 1121,
        }
    }

    #[test]
    fn thirty_fps_at_1080p_timing() {
        let ctl = TimingController::new(LIMITS);
        let mut params = params_1080p();
        params.total_height = 2000;
        ctl.recompute_fps(30, 1, &mut params).unwrap();
        assert_eq!(params.total_height, 1125);
        assert_eq!(params.max_integration_native_lines, 1121);
        assert_eq!(params.min_integration_lines, 2);
        // within one line time of the target
        let achieved = params.pixel_clock as f64
            / (params.total_width as f64 * params.total_height as f64);
        assert!((achieved - 30.0).abs() < 30.0 / params.total_height as f64);
        assert_eq!(params.frame_rate_q8(), 30 << 8);
    }

    #[test]
    fn fractional_rate() {
        let ctl = TimingController::new(LIMITS);
        let mut params = params_1080p();
        ctl.recompute_fps(30000, 1001, &mut params).unwrap();
        // 74.25 MHz * 1001 / 2200 / 30000
        assert_eq!(params.total_height, 1126);
        assert_eq!(params.max_integration_native_lines, 1122);
    }

    #[test]
    fn lower_rate_stretches_frame() {
        let ctl = TimingController::new(LIMITS);
        let mut params = params_1080p();
        ctl.recompute_fps(15, 1, &mut params).unwrap();
        assert_eq!(params.total_height, 2250);
        assert_eq!(params.max_integration_native_lines, 2246);
    }

    #[test]
    fn out_of_envelope_leaves_params_alone() {
        let ctl = TimingController::new(LIMITS);
        let mut params = params_1080p();
        let before = params;
        assert_eq!(
            ctl.recompute_fps(60, 1, &mut params),
            Err(ControlError::OutOfRange)
        );
        assert_eq!(
            ctl.recompute_fps(4, 1, &mut params),
            Err(ControlError::OutOfRange)
        );
        assert_eq!(params, before);
    }

    #[test]
    fn degenerate_ratios_rejected() {
        let ctl = TimingController::new(LIMITS);
        let mut params = params_1080p();
        assert!(ctl.recompute_fps(0, 1, &mut params).is_err());
        assert!(ctl.recompute_fps(30, 0, &mut params).is_err());
    }

    #[test]
    fn vts_register_overflow_rejected() {
        let ctl = TimingController::new(TimingLimits {
            max_vts: 2000,
            ..LIMITS
        });
        let mut params = params_1080p();
        assert_eq!(
            ctl.recompute_fps(5, 1, &mut params),
            Err(ControlError::OutOfRange)
        );
        assert_eq!(params.total_height, 1125);
    }

    #[test]
    fn packed_fps() {
        let fps = Fps::new(25, 1);
        assert_eq!(fps.0, 0x0019_0001);
        assert_eq!((fps.num(), fps.den()), (25, 1));
        assert_eq!(fps.q8(), Some(25 << 8));
        assert_eq!(Fps::new(30000, 1001).q8(), Some(7672));
        assert_eq!(Fps::new(30, 0).q8(), None);
    }

    #[test]
    fn clamp_integration_window() {
        let params = params_1080p();
        assert_eq!(params.clamp_integration(0), 2);
        assert_eq!(params.clamp_integration(500), 500);
        assert_eq!(params.clamp_integration(5000), 1121);
    }
}
