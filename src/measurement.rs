//! Measurement adapter (Component G): NTC temperature conversion and the
//! debounced/inhibited threshold-alert mechanism shared by every ADC
//! channel that can trip an ISR.
//!
//! Grounded on the Beta-equation temperature calculation and the
//! `adc_alerts_upper`/`adc_alerts_lower` debounce logic in `adc_dma.cpp`.

const KELVIN_OFFSET_C: f32 = 273.15;
const BETA_REFERENCE_TEMP_C: f32 = 25.0;

/// Resistance-to-temperature conversion for a 10k NTC thermistor biased by a
/// series resistor off the same supply rail as the ADC reference.
///
/// `vcc_fraction` is the ADC-measured node voltage divided by supply
/// voltage (`v_temp / vcc` in the original), avoiding having to know the
/// absolute ADC reference in this module.
pub fn ntc_temperature_c(vcc_fraction: f32, series_resistor_ohm: f32, ntc_nominal_ohm: f32, beta: f32) -> f32 {
    let rts = series_resistor_ohm * vcc_fraction / (1.0 - vcc_fraction);
    1.0 / (1.0 / (KELVIN_OFFSET_C + BETA_REFERENCE_TEMP_C) + 1.0 / beta * libm_ln(rts / ntc_nominal_ohm)) - KELVIN_OFFSET_C
}

/// `ln` without pulling in `std`: a few Newton iterations on `f32::exp`
/// would drift too far for this use, so we keep a direct binding point
/// here — swapped for `libm::logf` when the `nostd` feature is active.
#[cfg(feature = "std")]
fn libm_ln(x: f32) -> f32 {
    x.ln()
}

#[cfg(not(feature = "std"))]
fn libm_ln(x: f32) -> f32 {
    libm::logf(x)
}

/// Out-of-range sentinel below which an NTC reading is treated as "sensor
/// not connected" rather than a real low temperature.
pub const NTC_DISCONNECTED_THRESHOLD_C: f32 = -50.0;

/// A one-sided threshold comparator with a one-tick debounce and a
/// one-shot post-trip inhibit window, mirroring `AdcAlert` in the original
/// firmware (used there to mask the brief voltage ringing a PWM switch-on
/// edge causes).
#[derive(Debug, Clone, Copy, Default)]
pub struct AlertThreshold {
    pub limit: f32,
    direction: AlertDirection,
    debounce_ticks: u32,
    inhibit_ticks: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AlertDirection {
    Upper,
    Lower,
}

impl Default for AlertDirection {
    fn default() -> Self {
        AlertDirection::Upper
    }
}

impl AlertThreshold {
    pub fn upper(limit: f32) -> Self {
        Self { limit, direction: AlertDirection::Upper, debounce_ticks: 0, inhibit_ticks: 0 }
    }

    pub fn lower(limit: f32) -> Self {
        Self { limit, direction: AlertDirection::Lower, debounce_ticks: 0, inhibit_ticks: 0 }
    }

    /// Silences trips for `ticks` fast ticks, e.g. around a PWM switch-on
    /// edge that causes a brief, expected voltage spike.
    pub fn inhibit(&mut self, ticks: u32) {
        self.inhibit_ticks = ticks;
    }

    /// Call once per fast tick with the latest reading. Returns `true` on
    /// the tick the alert fires (after the debounce window and outside any
    /// inhibit window), not on every tick the condition holds.
    pub fn check(&mut self, reading: f32) -> bool {
        if self.inhibit_ticks > 0 {
            self.inhibit_ticks -= 1;
            self.debounce_ticks = 0;
            return false;
        }

        let tripped = match self.direction {
            AlertDirection::Upper => reading > self.limit,
            AlertDirection::Lower => reading < self.limit,
        };

        if tripped {
            self.debounce_ticks += 1;
            self.debounce_ticks == 2
        } else {
            self.debounce_ticks = 0;
            false
        }
    }
}

/// Internal MCU overtemperature hysteresis band from `adc_dma.cpp`: trips
/// above 80°C, clears only once back below 70°C.
pub struct InternalOvertemp {
    tripped: bool,
}

impl InternalOvertemp {
    const TRIP_C: f32 = 80.0;
    const CLEAR_C: f32 = 70.0;

    pub fn new() -> Self {
        Self { tripped: false }
    }

    pub fn update(&mut self, internal_temp_c: f32) -> bool {
        if internal_temp_c > Self::TRIP_C {
            self.tripped = true;
        } else if internal_temp_c < Self::CLEAR_C {
            self.tripped = false;
        }
        self.tripped
    }
}

impl Default for InternalOvertemp {
    fn default() -> Self {
        Self::new()
    }
}
