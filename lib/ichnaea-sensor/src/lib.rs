// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A uniform facade over the board's multiplexed analog front end: one
//! shared ADC input behind a 3-line GPIO mux, fanned out into per-element
//! unit conversions (voltage dividers, a thermistor β-model, and a
//! current-sense amplifier gain).

#![cfg_attr(not(test), no_std)]

use ichnaea_hal::{Adc, AdcChannel, Clock, Gpio, GpioPin};
use ringbuf::*;

/// Every analog element the facade knows how to read. The discriminant
/// doubles as the element's cache/config slot index.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[repr(usize)]
pub enum Element {
    VinSolarInput = 0,
    VoutLoad,
    IoutLoad,
    Rail1V1,
    Rail3V3,
    Rail5V0,
    Rail12V0,
    BoardTempA,
    BoardTempB,
    FanSpeed,
}

const MAX_ELEMENTS: usize = Element::FanSpeed as usize + 1;

#[derive(Copy, Clone, PartialEq, Debug)]
pub enum MeasurementMode {
    /// Trigger a fresh acquisition and update the cache.
    Refresh,
    /// Return whatever is already cached (0.0 if never sampled).
    Cached,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum MeasurementError {
    /// `measurement` was called from interrupt context.
    InvalidContext,
}

/// How a raw ADC voltage at the mux output maps to an engineering value.
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum Conversion {
    /// No conversion: the ADC already reads the engineering unit directly.
    Direct,
    /// A resistive divider above the ADC input: `Vin = Vout * (r1+r2)/r2`.
    VoltageDivider { r1_ohms: f32, r2_ohms: f32 },
    /// An NTC thermistor forming the bottom leg of a divider against
    /// `r_fixed_ohms`, excited by `excitation_volts`, modeled by the β
    /// equation against reference point `(r0_ohms, t0_celsius)`.
    ThermistorBeta {
        excitation_volts: f32,
        r_fixed_ohms: f32,
        r0_ohms: f32,
        beta: f32,
        t0_celsius: f32,
    },
    /// A shunt-resistor current sense behind an op-amp of known gain.
    CurrentSenseGain { gain: f32, shunt_ohms: f32 },
}

/// Wiring for one element: which shared ADC channel it lands on, which
/// 3-bit mux code selects it, and how to convert the raw reading.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct ElementConfig {
    pub channel: AdcChannel,
    pub mux_select: [GpioPin; 3],
    pub mux_code: u8,
    pub conversion: Conversion,
}

#[derive(Copy, Clone, PartialEq, Debug)]
enum Trace {
    Measured(Element, f32),
    DeniedInterruptContext,
    None,
}

ringbuf!(Trace, 32, Trace::None);

/// Settling time after changing mux select lines, rounded up to this
/// facade's microsecond-granularity delay primitive (source requires
/// ≥ 50 ns; the HAL clock only offers whole microseconds).
const MUX_SETTLE_US: u32 = 1;
/// Minimum spacing between the three samples averaged per acquisition.
const SAMPLE_SPACING_US: u32 = 50;

/// Reports whether the calling context is an interrupt handler. Supplied
/// by the board; the facade has no way to know this on its own.
pub type InterruptContextProbe = fn() -> bool;

pub struct SensorFacade<A: Adc, G: Gpio, C: Clock> {
    adc: A,
    gpio: G,
    clock: C,
    in_interrupt: InterruptContextProbe,
    configs: [Option<ElementConfig>; MAX_ELEMENTS],
    cache: [f32; MAX_ELEMENTS],
}

impl<A: Adc, G: Gpio, C: Clock> SensorFacade<A, G, C> {
    pub fn new(adc: A, gpio: G, clock: C, in_interrupt: InterruptContextProbe) -> Self {
        Self {
            adc,
            gpio,
            clock,
            in_interrupt,
            configs: [None; MAX_ELEMENTS],
            cache: [0.0; MAX_ELEMENTS],
        }
    }

    /// Wires up `elem`'s channel, mux code, and conversion. Idempotent: a
    /// later call for the same element replaces its config and clears its
    /// cached value, since the old value no longer has a defined meaning.
    pub fn configure(&mut self, elem: Element, config: ElementConfig) {
        let idx = elem as usize;
        self.configs[idx] = Some(config);
        self.cache[idx] = 0.0;
    }

    /// Reads `elem` per `mode`. `Refresh` is not callable from interrupt
    /// context — averaging three samples with inter-sample spacing would
    /// block far too long there — and fails with [`MeasurementError::InvalidContext`].
    /// `Cached` is always safe to call.
    pub fn measurement(
        &mut self,
        elem: Element,
        mode: MeasurementMode,
    ) -> Result<f32, MeasurementError> {
        let idx = elem as usize;

        if mode == MeasurementMode::Cached {
            return Ok(self.cache[idx]);
        }

        if (self.in_interrupt)() {
            ringbuf_entry!(Trace::DeniedInterruptContext);
            return Err(MeasurementError::InvalidContext);
        }

        let Some(config) = self.configs[idx] else {
            return Ok(0.0);
        };

        for (bit, pin) in config.mux_select.iter().enumerate() {
            self.gpio.set(*pin, (config.mux_code >> bit) & 1 != 0);
        }
        self.clock.delay_us(MUX_SETTLE_US);

        let mut sum = 0.0f32;
        for i in 0..3 {
            sum += self.adc.read_voltage(config.channel);
            if i < 2 {
                self.clock.delay_us(SAMPLE_SPACING_US);
            }
        }
        let raw = sum / 3.0;

        let value = apply_conversion(config.conversion, raw);
        self.cache[idx] = value;
        ringbuf_entry!(Trace::Measured(elem, value));
        Ok(value)
    }
}

fn apply_conversion(conversion: Conversion, v: f32) -> f32 {
    match conversion {
        Conversion::Direct => v,
        Conversion::VoltageDivider { r1_ohms, r2_ohms } => v * (r1_ohms + r2_ohms) / r2_ohms,
        Conversion::CurrentSenseGain { gain, shunt_ohms } => v / (gain * shunt_ohms),
        Conversion::ThermistorBeta {
            excitation_volts,
            r_fixed_ohms,
            r0_ohms,
            beta,
            t0_celsius,
        } => {
            let r = r_fixed_ohms * v / (excitation_volts - v);
            let t0_kelvin = t0_celsius + 273.15;
            let t_kelvin = 1.0 / (1.0 / t0_kelvin + libm::logf(r / r0_ohms) / beta);
            t_kelvin - 273.15
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::HashMap;

    struct FakeAdc {
        voltages: HashMap<u8, f32>,
        cached: HashMap<u8, f32>,
    }

    impl FakeAdc {
        fn new() -> Self {
            Self {
                voltages: HashMap::new(),
                cached: HashMap::new(),
            }
        }

        fn set(&mut self, channel: AdcChannel, v: f32) {
            self.voltages.insert(channel.0, v);
        }
    }

    impl Adc for FakeAdc {
        fn read_voltage(&mut self, channel: AdcChannel) -> f32 {
            let v = *self.voltages.get(&channel.0).unwrap_or(&0.0);
            self.cached.insert(channel.0, v);
            v
        }

        fn cached(&self, channel: AdcChannel) -> f32 {
            *self.cached.get(&channel.0).unwrap_or(&0.0)
        }
    }

    struct FakeGpio {
        levels: HashMap<u8, bool>,
    }

    impl FakeGpio {
        fn new() -> Self {
            Self {
                levels: HashMap::new(),
            }
        }
    }

    impl Gpio for FakeGpio {
        fn set(&mut self, pin: GpioPin, level: bool) {
            self.levels.insert(pin.0, level);
        }

        fn get(&self, pin: GpioPin) -> bool {
            *self.levels.get(&pin.0).unwrap_or(&false)
        }
    }

    struct FakeClock {
        delayed_us: Cell<u64>,
    }

    impl FakeClock {
        fn new() -> Self {
            Self {
                delayed_us: Cell::new(0),
            }
        }
    }

    impl Clock for FakeClock {
        fn millis(&self) -> u64 {
            0
        }

        fn micros(&self) -> u64 {
            self.delayed_us.get()
        }

        fn delay_us(&self, n: u32) {
            self.delayed_us.set(self.delayed_us.get() + n as u64);
        }
    }

    fn never_in_interrupt() -> bool {
        false
    }

    fn always_in_interrupt() -> bool {
        true
    }

    const CH: AdcChannel = AdcChannel(0);
    const SEL: [GpioPin; 3] = [GpioPin(0), GpioPin(1), GpioPin(2)];

    #[test]
    fn direct_conversion_passes_through() {
        let mut adc = FakeAdc::new();
        adc.set(CH, 3.3);
        let mut facade = SensorFacade::new(adc, FakeGpio::new(), FakeClock::new(), never_in_interrupt);
        facade.configure(
            Element::Rail3V3,
            ElementConfig {
                channel: CH,
                mux_select: SEL,
                mux_code: 0,
                conversion: Conversion::Direct,
            },
        );

        let v = facade
            .measurement(Element::Rail3V3, MeasurementMode::Refresh)
            .unwrap();
        assert_eq!(v, 3.3);
    }

    #[test]
    fn voltage_divider_scales_up() {
        let mut adc = FakeAdc::new();
        adc.set(CH, 1.0);
        let mut facade = SensorFacade::new(adc, FakeGpio::new(), FakeClock::new(), never_in_interrupt);
        facade.configure(
            Element::VinSolarInput,
            ElementConfig {
                channel: CH,
                mux_select: SEL,
                mux_code: 1,
                conversion: Conversion::VoltageDivider {
                    r1_ohms: 9000.0,
                    r2_ohms: 1000.0,
                },
            },
        );

        let v = facade
            .measurement(Element::VinSolarInput, MeasurementMode::Refresh)
            .unwrap();
        assert!((v - 10.0).abs() < 1e-4);
    }

    #[test]
    fn thermistor_beta_model_matches_reference_point() {
        // At R = R0 exactly, T must equal T0 regardless of beta.
        let r0 = 10_000.0;
        let excitation = 3.3;
        let r_fixed = 10_000.0; // matched divider at the reference point
        let v_mid = excitation * r0 / (r_fixed + r0);

        let mut adc = FakeAdc::new();
        adc.set(CH, v_mid);
        let mut facade = SensorFacade::new(adc, FakeGpio::new(), FakeClock::new(), never_in_interrupt);
        facade.configure(
            Element::BoardTempA,
            ElementConfig {
                channel: CH,
                mux_select: SEL,
                mux_code: 2,
                conversion: Conversion::ThermistorBeta {
                    excitation_volts: excitation,
                    r_fixed_ohms: r_fixed,
                    r0_ohms: r0,
                    beta: 3950.0,
                    t0_celsius: 25.0,
                },
            },
        );

        let t = facade
            .measurement(Element::BoardTempA, MeasurementMode::Refresh)
            .unwrap();
        assert!((t - 25.0).abs() < 1e-2);
    }

    #[test]
    fn current_sense_gain_divides_out_amplification() {
        let mut adc = FakeAdc::new();
        adc.set(CH, 1.0); // amplified shunt voltage
        let mut facade = SensorFacade::new(adc, FakeGpio::new(), FakeClock::new(), never_in_interrupt);
        facade.configure(
            Element::IoutLoad,
            ElementConfig {
                channel: CH,
                mux_select: SEL,
                mux_code: 3,
                conversion: Conversion::CurrentSenseGain {
                    gain: 50.0,
                    shunt_ohms: 0.002,
                },
            },
        );

        let i = facade
            .measurement(Element::IoutLoad, MeasurementMode::Refresh)
            .unwrap();
        assert!((i - 10.0).abs() < 1e-4);
    }

    #[test]
    fn refresh_denied_from_interrupt_context() {
        let mut facade = SensorFacade::new(
            FakeAdc::new(),
            FakeGpio::new(),
            FakeClock::new(),
            always_in_interrupt,
        );
        facade.configure(
            Element::Rail12V0,
            ElementConfig {
                channel: CH,
                mux_select: SEL,
                mux_code: 4,
                conversion: Conversion::Direct,
            },
        );

        let result = facade.measurement(Element::Rail12V0, MeasurementMode::Refresh);
        assert_eq!(result, Err(MeasurementError::InvalidContext));
    }

    #[test]
    fn cached_mode_never_touches_hardware_and_survives_interrupt_context() {
        let mut adc = FakeAdc::new();
        adc.set(CH, 5.0);
        let mut facade = SensorFacade::new(adc, FakeGpio::new(), FakeClock::new(), never_in_interrupt);
        facade.configure(
            Element::Rail5V0,
            ElementConfig {
                channel: CH,
                mux_select: SEL,
                mux_code: 5,
                conversion: Conversion::Direct,
            },
        );
        facade
            .measurement(Element::Rail5V0, MeasurementMode::Refresh)
            .unwrap();

        facade.in_interrupt = always_in_interrupt;
        let cached = facade
            .measurement(Element::Rail5V0, MeasurementMode::Cached)
            .unwrap();
        assert_eq!(cached, 5.0);
    }

    #[test]
    fn unconfigured_element_reads_as_zero() {
        let mut facade = SensorFacade::new(FakeAdc::new(), FakeGpio::new(), FakeClock::new(), never_in_interrupt);
        let v = facade
            .measurement(Element::FanSpeed, MeasurementMode::Refresh)
            .unwrap();
        assert_eq!(v, 0.0);
    }

    #[test]
    fn averaging_spaces_three_samples_by_at_least_50us() {
        let mut adc = FakeAdc::new();
        adc.set(CH, 1.0);
        let clock = FakeClock::new();
        let mut facade = SensorFacade::new(adc, FakeGpio::new(), clock, never_in_interrupt);
        facade.configure(
            Element::VoutLoad,
            ElementConfig {
                channel: CH,
                mux_select: SEL,
                mux_code: 6,
                conversion: Conversion::Direct,
            },
        );
        facade
            .measurement(Element::VoutLoad, MeasurementMode::Refresh)
            .unwrap();
        // 1us settle + 2 * 50us inter-sample spacing.
        assert_eq!(facade.clock.micros(), 101);
    }
}
