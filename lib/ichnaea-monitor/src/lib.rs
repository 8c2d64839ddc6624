// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The monitor engine: one rate-limited, filtered, hysteresis-debounced
//! range check per analog element, escalating to the fault router on a
//! sustained out-of-range condition.
//!
//! Grounded on `app_monitor.cpp`: `refreshPDIDependencies` (per-element
//! config reload forcing invalid), the nine near-identical
//! `monitorXxx()` functions (rate-limit, sample, filter, publish,
//! predicate, hysteresis, escalate), `apply_mon_range_event_hysteresis`
//! (the entry/exit debounce state machine), and `monitorTemperature`'s
//! averaging of the two board-temperature sensors into one monitor slot
//! and `monitorFanSpeed`'s independent absolute escalation timer.

#![cfg_attr(not(test), no_std)]

use byteorder::{ByteOrder, LittleEndian};
use core::sync::atomic::{AtomicBool, Ordering};
use ichnaea_filter::{FilterConfig, IirFilter};
use ichnaea_hal::{Adc, Clock, Gpio, Nvm};
use ichnaea_panic::{FaultCode, FaultSink};
use ichnaea_pdi::{keys, Durability, OnWriteFn, PdiDatabase, PdiKey, MAX_VALUE_SIZE};
pub use ichnaea_sensor::Element;
use ichnaea_sensor::{MeasurementMode, SensorFacade};
use ringbuf::*;

const NUM_ELEMENTS: usize = Element::FanSpeed as usize + 1;
/// Fallback sample period for an element with no filter config registered
/// yet: no extra throttling beyond whatever cadence the caller drives
/// [`MonitorEngine::run`] at.
const DEFAULT_SAMPLE_RATE_MS: u32 = 0;
const FAN_OOR_ESCALATION_DEFAULT_MS: u32 = 10_000;

const RAIL_1V1_NOMINAL: f32 = 1.1;
const RAIL_3V3_NOMINAL: f32 = 3.3;
const RAIL_5V0_NOMINAL: f32 = 5.0;
const RAIL_12V0_NOMINAL: f32 = 12.0;

/// Fixed 5% band for the small DC rail monitors (§4.4), applied out of
/// the box rather than left at a permissive default that never trips.
const RAIL_PCT_ERROR_OOR_LIMIT_DEFAULT: f32 = 5.0;

const RUNNABLE_ELEMENTS: [Element; 9] = [
    Element::VinSolarInput,
    Element::VoutLoad,
    Element::IoutLoad,
    Element::Rail1V1,
    Element::Rail3V3,
    Element::Rail5V0,
    Element::Rail12V0,
    Element::BoardTempA,
    Element::FanSpeed,
];

#[derive(Copy, Clone, PartialEq, Debug)]
enum Trace {
    Ran(Element, f32, bool),
    ConfigRefreshed(Element),
    FanEscalated,
    None,
}

ringbuf!(Trace, 32, Trace::None);

/// The condition an element's filtered value is judged against. The
/// variant carries whatever the predicate needs; none of this is
/// board-specific, it's just what the source's union of per-element limit
/// structs held.
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum Limits {
    InputVoltage { min: f32, max: f32 },
    LoadOvercurrent { user_limit: f32, system_limit: f32 },
    OutputVoltage { target: f32, system_limit: f32, pct_err: f32 },
    /// The three low-voltage DC rails and the 12V0 rail: a fixed nominal
    /// (there's no PDI-backed target for these, only the board's known
    /// design voltage) plus a configurable percent-error band.
    LowVoltageRail { nominal: f32, pct_err: f32 },
    Temperature { low: f32, high: f32 },
    FanSpeed { target: f32, pct_err: f32 },
}

fn pct_error(value: f32, nominal: f32) -> f32 {
    if nominal == 0.0 {
        if value == 0.0 {
            0.0
        } else {
            f32::INFINITY
        }
    } else {
        ((value - nominal) / nominal).abs() * 100.0
    }
}

impl Limits {
    fn is_out_of_range(&self, value: f32) -> bool {
        match *self {
            Limits::InputVoltage { min, max } => value < min || value > max,
            Limits::LoadOvercurrent { user_limit, system_limit } => {
                value > user_limit || value > system_limit
            }
            Limits::OutputVoltage { target, system_limit, pct_err } => {
                value > system_limit || pct_error(value, target) > pct_err
            }
            Limits::LowVoltageRail { nominal, pct_err } => pct_error(value, nominal) > pct_err,
            Limits::Temperature { low, high } => value < low || value > high,
            Limits::FanSpeed { target, pct_err } => pct_error(value, target) > pct_err,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Debug)]
enum RangeEvent {
    OutOfRange,
    InRange,
    NoChange,
}

/// Applies the hysteresis state machine (§4.4) in place and reports the
/// transition, if any, that just occurred.
///
/// Entering OOR clears the exit timer; returning to range clears the entry
/// timer — each is reset on the *other* direction's transition, not just on
/// reaching steady state, so a signal that oscillates faster than its own
/// debounce delay never accumulates a stale partial timer.
fn apply_hysteresis(state: &mut MonitorState, is_oor: bool, now_ms: u64) -> RangeEvent {
    if is_oor {
        state.oor_exit_time = 0;
        if !state.oor_latched {
            if state.oor_enter_time == 0 {
                state.oor_enter_time = now_ms;
            }
            if now_ms.wrapping_sub(state.oor_enter_time) >= state.oor_enter_delay_ms {
                state.valid = false;
                state.oor_latched = true;
                state.oor_enter_time = 0;
                return RangeEvent::OutOfRange;
            }
        }
    } else {
        state.oor_enter_time = 0;
        if state.oor_latched {
            if state.oor_exit_time == 0 {
                state.oor_exit_time = now_ms;
            }
            if now_ms.wrapping_sub(state.oor_exit_time) >= state.oor_exit_delay_ms {
                state.valid = true;
                state.oor_latched = false;
                state.oor_exit_time = 0;
                return RangeEvent::InRange;
            }
        }
    }
    RangeEvent::NoChange
}

#[derive(Copy, Clone)]
struct MonitorState {
    limits: Limits,
    filter: IirFilter,
    sample_rate_ms: u64,
    oor_enter_delay_ms: u64,
    oor_exit_delay_ms: u64,
    last_run_time: u64,
    oor_enter_time: u64,
    oor_exit_time: u64,
    valid: bool,
    oor_latched: bool,
    /// `None` for the rails that are only ever logged, never escalated
    /// (1V1/3V3/5V0 — the 12V0 rail, by contrast, does escalate).
    fault_code: Option<FaultCode>,
    last_raw: f32,
    last_filtered: f32,
}

impl MonitorState {
    const fn new() -> Self {
        Self {
            limits: Limits::InputVoltage { min: 0.0, max: f32::MAX },
            filter: IirFilter::new(),
            sample_rate_ms: DEFAULT_SAMPLE_RATE_MS as u64,
            oor_enter_delay_ms: 0,
            oor_exit_delay_ms: 0,
            last_run_time: 0,
            oor_enter_time: 0,
            oor_exit_time: 0,
            valid: false,
            oor_latched: false,
            fault_code: None,
            last_raw: 0.0,
            last_filtered: 0.0,
        }
    }
}

/// The monitor engine (C4): one [`MonitorState`] per analog element,
/// sampled through a [`SensorFacade`] and published to a [`PdiDatabase`].
///
/// `BoardTempB` has no state of its own — it's folded into `BoardTempA`'s
/// slot as a single composite temperature monitor, matching the source's
/// choice to average the two board-temperature readings rather than run
/// two independent monitors.
pub struct MonitorEngine {
    enabled: bool,
    states: [MonitorState; NUM_ELEMENTS],
    fan_invalid_since: u64,
    fan_escalated: bool,
    fan_oor_escalation_ms: u32,
}

/// Per-element config-changed flags, set by PDI on-write callbacks (plain
/// `fn` pointers, so they can't close over the owning engine) and consumed
/// by the next [`MonitorEngine::run`] call for that element.
static CONFIG_DIRTY: [AtomicBool; NUM_ELEMENTS] = [AtomicBool::new(false); NUM_ELEMENTS];

fn mark_dirty(elem: Element) {
    CONFIG_DIRTY[elem as usize].store(true, Ordering::Relaxed);
}

fn on_write_vin(_key: PdiKey) {
    mark_dirty(Element::VinSolarInput);
}
fn on_write_vout(_key: PdiKey) {
    mark_dirty(Element::VoutLoad);
}
fn on_write_iout(_key: PdiKey) {
    mark_dirty(Element::IoutLoad);
}
fn on_write_temp(_key: PdiKey) {
    mark_dirty(Element::BoardTempA);
}
fn on_write_fan(_key: PdiKey) {
    mark_dirty(Element::FanSpeed);
}
fn on_write_12v0(_key: PdiKey) {
    mark_dirty(Element::Rail12V0);
}
fn on_write_1v1(_key: PdiKey) {
    mark_dirty(Element::Rail1V1);
}
fn on_write_3v3(_key: PdiKey) {
    mark_dirty(Element::Rail3V3);
}
fn on_write_5v0(_key: PdiKey) {
    mark_dirty(Element::Rail5V0);
}

fn on_write_fn(elem: Element) -> OnWriteFn {
    use Element::*;
    match elem {
        VinSolarInput => on_write_vin,
        VoutLoad => on_write_vout,
        IoutLoad => on_write_iout,
        BoardTempA | BoardTempB => on_write_temp,
        FanSpeed => on_write_fan,
        Rail12V0 => on_write_12v0,
        Rail1V1 => on_write_1v1,
        Rail3V3 => on_write_3v3,
        Rail5V0 => on_write_5v0,
    }
}

fn filter_config_key(elem: Element) -> PdiKey {
    use Element::*;
    match elem {
        VinSolarInput => keys::MON_FILTER_VIN,
        VoutLoad => keys::MON_FILTER_VOUT,
        IoutLoad => keys::MON_FILTER_IOUT,
        BoardTempA | BoardTempB => keys::MON_FILTER_TEMP,
        FanSpeed => keys::MON_FILTER_FAN_SPEED,
        Rail12V0 => keys::MON_FILTER_12V0,
        Rail1V1 => keys::MON_FILTER_1V1,
        Rail3V3 => keys::MON_FILTER_3V3,
        Rail5V0 => keys::MON_FILTER_5V0,
    }
}

fn entry_delay_key(elem: Element) -> PdiKey {
    use Element::*;
    match elem {
        VinSolarInput => keys::MON_VIN_OOR_ENTRY_DELAY_MS,
        VoutLoad => keys::MON_VOUT_OOR_ENTRY_DELAY_MS,
        IoutLoad => keys::MON_IOUT_OOR_ENTRY_DELAY_MS,
        BoardTempA | BoardTempB => keys::MON_TEMP_OOR_ENTRY_DELAY_MS,
        FanSpeed => keys::MON_FAN_SPEED_OOR_ENTRY_DELAY_MS,
        Rail12V0 => keys::MON_12V0_OOR_ENTRY_DELAY_MS,
        Rail1V1 => keys::MON_1V1_OOR_ENTRY_DELAY_MS,
        Rail3V3 => keys::MON_3V3_OOR_ENTRY_DELAY_MS,
        Rail5V0 => keys::MON_5V0_OOR_ENTRY_DELAY_MS,
    }
}

fn exit_delay_key(elem: Element) -> PdiKey {
    use Element::*;
    match elem {
        VinSolarInput => keys::MON_VIN_OOR_EXIT_DELAY_MS,
        VoutLoad => keys::MON_VOUT_OOR_EXIT_DELAY_MS,
        IoutLoad => keys::MON_IOUT_OOR_EXIT_DELAY_MS,
        BoardTempA | BoardTempB => keys::MON_TEMP_OOR_EXIT_DELAY_MS,
        FanSpeed => keys::MON_FAN_SPEED_OOR_EXIT_DELAY_MS,
        Rail12V0 => keys::MON_12V0_OOR_EXIT_DELAY_MS,
        Rail1V1 => keys::MON_1V1_OOR_EXIT_DELAY_MS,
        Rail3V3 => keys::MON_3V3_OOR_EXIT_DELAY_MS,
        Rail5V0 => keys::MON_5V0_OOR_EXIT_DELAY_MS,
    }
}

fn raw_key(elem: Element) -> Option<PdiKey> {
    use Element::*;
    Some(match elem {
        VinSolarInput => keys::MON_VIN_RAW,
        VoutLoad => keys::MON_VOUT_RAW,
        IoutLoad => keys::MON_IOUT_RAW,
        BoardTempA => keys::MON_TEMP_RAW,
        FanSpeed => keys::MON_FAN_SPEED_RAW,
        Rail12V0 => keys::MON_12V0_RAW,
        Rail1V1 | Rail3V3 | Rail5V0 | BoardTempB => return None,
    })
}

fn filtered_key(elem: Element) -> PdiKey {
    use Element::*;
    match elem {
        VinSolarInput => keys::MON_VIN_FILTERED,
        VoutLoad => keys::MON_VOUT_FILTERED,
        IoutLoad => keys::MON_IOUT_FILTERED,
        BoardTempA | BoardTempB => keys::MON_TEMP_FILTERED,
        FanSpeed => keys::MON_FAN_SPEED_FILTERED,
        Rail12V0 => keys::MON_12V0_FILTERED,
        Rail1V1 => keys::MON_1V1_FILTERED,
        Rail3V3 => keys::MON_3V3_FILTERED,
        Rail5V0 => keys::MON_5V0_FILTERED,
    }
}

fn valid_key(elem: Element) -> PdiKey {
    use Element::*;
    match elem {
        VinSolarInput => keys::MON_VIN_VALID,
        VoutLoad => keys::MON_VOUT_VALID,
        IoutLoad => keys::MON_IOUT_VALID,
        BoardTempA | BoardTempB => keys::MON_TEMP_VALID,
        FanSpeed => keys::MON_FAN_SPEED_VALID,
        Rail12V0 => keys::MON_12V0_VALID,
        Rail1V1 => keys::MON_1V1_VALID,
        Rail3V3 => keys::MON_3V3_VALID,
        Rail5V0 => keys::MON_5V0_VALID,
    }
}

fn read_f32<N: Nvm>(pdi: &PdiDatabase<N>, key: PdiKey, default: f32) -> f32 {
    let mut buf = [0u8; 4];
    if pdi.read(key, &mut buf) == 4 {
        LittleEndian::read_f32(&buf)
    } else {
        default
    }
}

fn read_u32<N: Nvm>(pdi: &PdiDatabase<N>, key: PdiKey, default: u32) -> u32 {
    let mut buf = [0u8; 4];
    if pdi.read(key, &mut buf) == 4 {
        LittleEndian::read_u32(&buf)
    } else {
        default
    }
}

/// Encodes a [`FilterConfig`] as `[order:u8][sample_rate_ms:u16 LE][coefficients:f32 LE * n]`,
/// `n` being only as many coefficients as `order` actually uses — the full
/// 15-coefficient, u32-sample-rate in-memory representation doesn't fit in
/// a 64-byte PDI slot, so the wire form is this narrower encoding instead.
fn encode_filter_config(config: &FilterConfig, out: &mut [u8]) -> usize {
    let n = ichnaea_filter::coefficients_for_order(config.order);
    out[0] = config.order;
    LittleEndian::write_u16(&mut out[1..3], config.sample_rate_ms.min(u16::MAX as u32) as u16);
    for i in 0..n {
        LittleEndian::write_f32(&mut out[3 + i * 4..3 + i * 4 + 4], config.coefficients[i]);
    }
    3 + n * 4
}

fn decode_filter_config(buf: &[u8]) -> FilterConfig {
    if buf.len() < 3 {
        return FilterConfig::passthrough(DEFAULT_SAMPLE_RATE_MS);
    }
    let order = buf[0].clamp(1, ichnaea_filter::MAX_ORDER);
    let sample_rate_ms = LittleEndian::read_u16(&buf[1..3]) as u32;
    let n = ichnaea_filter::coefficients_for_order(order);
    let mut coefficients = [0.0f32; ichnaea_filter::MAX_COEFFICIENTS];
    for (i, c) in coefficients.iter_mut().enumerate().take(n) {
        let start = 3 + i * 4;
        if start + 4 <= buf.len() {
            *c = LittleEndian::read_f32(&buf[start..start + 4]);
        }
    }
    FilterConfig {
        order,
        sample_rate_ms,
        coefficients,
    }
}

fn element_limits<N: Nvm>(
    elem: Element,
    pdi: &PdiDatabase<N>,
) -> (Limits, Option<FaultCode>, u64, u64) {
    use Element::*;
    let entry = read_u32(pdi, entry_delay_key(elem), 0) as u64;
    let exit = read_u32(pdi, exit_delay_key(elem), 0) as u64;
    let (limits, fault_code) = match elem {
        VinSolarInput => (
            Limits::InputVoltage {
                min: read_f32(pdi, keys::CONFIG_MIN_SYSTEM_VOLTAGE_INPUT, 0.0),
                max: read_f32(pdi, keys::CONFIG_MAX_SYSTEM_VOLTAGE_INPUT, f32::MAX),
            },
            Some(FaultCode::MonVinOor),
        ),
        VoutLoad => (
            Limits::OutputVoltage {
                target: read_f32(pdi, keys::TARGET_SYSTEM_VOLTAGE_OUTPUT, 0.0),
                system_limit: read_f32(pdi, keys::CONFIG_SYSTEM_VOLTAGE_OUTPUT_RATED_LIMIT, f32::MAX),
                pct_err: read_f32(pdi, keys::MON_VOUT_PCT_ERROR_OOR_LIMIT, 100.0),
            },
            Some(FaultCode::MonVoutOor),
        ),
        IoutLoad => (
            Limits::LoadOvercurrent {
                user_limit: read_f32(pdi, keys::TARGET_SYSTEM_CURRENT_OUTPUT, f32::MAX),
                system_limit: read_f32(pdi, keys::CONFIG_SYSTEM_CURRENT_OUTPUT_RATED_LIMIT, f32::MAX),
            },
            Some(FaultCode::MonIoutOor),
        ),
        BoardTempA | BoardTempB => (
            Limits::Temperature {
                low: read_f32(pdi, keys::CONFIG_MIN_TEMP_LIMIT, f32::MIN),
                high: read_f32(pdi, keys::CONFIG_MAX_TEMP_LIMIT, f32::MAX),
            },
            Some(FaultCode::MonTempOor),
        ),
        FanSpeed => (
            Limits::FanSpeed {
                target: read_f32(pdi, keys::TARGET_FAN_SPEED_RPM, 0.0),
                pct_err: read_f32(pdi, keys::MON_FAN_SPEED_PCT_ERROR_OOR_LIMIT, 100.0),
            },
            Some(FaultCode::MonFanSpeedOor),
        ),
        Rail12V0 => (
            Limits::LowVoltageRail {
                nominal: RAIL_12V0_NOMINAL,
                pct_err: read_f32(pdi, keys::MON_12V0_PCT_ERROR_OOR_LIMIT, RAIL_PCT_ERROR_OOR_LIMIT_DEFAULT),
            },
            Some(FaultCode::Mon12V0Oor),
        ),
        Rail1V1 => (
            Limits::LowVoltageRail {
                nominal: RAIL_1V1_NOMINAL,
                pct_err: read_f32(pdi, keys::MON_1V1_PCT_ERROR_OOR_LIMIT, RAIL_PCT_ERROR_OOR_LIMIT_DEFAULT),
            },
            None,
        ),
        Rail3V3 => (
            Limits::LowVoltageRail {
                nominal: RAIL_3V3_NOMINAL,
                pct_err: read_f32(pdi, keys::MON_3V3_PCT_ERROR_OOR_LIMIT, RAIL_PCT_ERROR_OOR_LIMIT_DEFAULT),
            },
            None,
        ),
        Rail5V0 => (
            Limits::LowVoltageRail {
                nominal: RAIL_5V0_NOMINAL,
                pct_err: read_f32(pdi, keys::MON_5V0_PCT_ERROR_OOR_LIMIT, RAIL_PCT_ERROR_OOR_LIMIT_DEFAULT),
            },
            None,
        ),
    };
    (limits, fault_code, entry, exit)
}

fn publish_raw<N: Nvm>(elem: Element, pdi: &mut PdiDatabase<N>, value: f32) {
    if let Some(key) = raw_key(elem) {
        pdi.write(key, &value.to_le_bytes());
    }
}

fn publish_filtered<N: Nvm>(elem: Element, pdi: &mut PdiDatabase<N>, value: f32) {
    pdi.write(filtered_key(elem), &value.to_le_bytes());
}

fn publish_valid<N: Nvm>(elem: Element, pdi: &mut PdiDatabase<N>, valid: bool) {
    pdi.write(valid_key(elem), &[valid as u8]);
}

impl MonitorEngine {
    pub const fn new() -> Self {
        Self {
            enabled: false,
            states: [MonitorState::new(); NUM_ELEMENTS],
            fan_invalid_since: 0,
            fan_escalated: false,
            fan_oor_escalation_ms: FAN_OOR_ESCALATION_DEFAULT_MS,
        }
    }

    /// Registers every config/telemetry PDI key this engine owns and loads
    /// their initial values. Equivalent to the source's `driver_init`
    /// (key registration) immediately followed by one `refreshPDIDependencies`
    /// pass per element.
    pub fn initialize<N: Nvm>(&mut self, pdi: &mut PdiDatabase<N>) {
        for &elem in RUNNABLE_ELEMENTS.iter() {
            Self::register_element(elem, pdi);
            self.refresh_config(elem, pdi);
        }
    }

    fn register_element<N: Nvm>(elem: Element, pdi: &mut PdiDatabase<N>) {
        let on_write = Some(on_write_fn(elem));

        let mut filter_buf = [0u8; MAX_VALUE_SIZE];
        let n = encode_filter_config(&FilterConfig::passthrough(DEFAULT_SAMPLE_RATE_MS), &mut filter_buf);
        let _ = pdi.insert(filter_config_key(elem), Durability::Persistent, &filter_buf[..n], None, on_write);

        // The 12V0 rail gets a much longer default entry delay than the
        // rest: the source notes this accounts for the LTC7871's own
        // startup time after an engage, so a normal sub-second debounce
        // would spuriously fault on every power-up.
        let default_entry_delay: u32 = if elem == Element::Rail12V0 { 2000 } else { 0 };
        let _ = pdi.insert(
            entry_delay_key(elem),
            Durability::Persistent,
            &default_entry_delay.to_le_bytes(),
            None,
            on_write,
        );
        let _ = pdi.insert(exit_delay_key(elem), Durability::Persistent, &0u32.to_le_bytes(), None, on_write);

        match elem {
            Element::VinSolarInput => {
                let _ = pdi.insert(keys::CONFIG_MIN_SYSTEM_VOLTAGE_INPUT, Durability::Persistent, &0f32.to_le_bytes(), None, on_write);
                let _ = pdi.insert(keys::CONFIG_MAX_SYSTEM_VOLTAGE_INPUT, Durability::Persistent, &f32::MAX.to_le_bytes(), None, on_write);
            }
            Element::VoutLoad => {
                let _ = pdi.insert(keys::TARGET_SYSTEM_VOLTAGE_OUTPUT, Durability::Persistent, &0f32.to_le_bytes(), None, on_write);
                let _ = pdi.insert(keys::CONFIG_SYSTEM_VOLTAGE_OUTPUT_RATED_LIMIT, Durability::Persistent, &f32::MAX.to_le_bytes(), None, on_write);
                let _ = pdi.insert(keys::MON_VOUT_PCT_ERROR_OOR_LIMIT, Durability::Persistent, &100f32.to_le_bytes(), None, on_write);
            }
            Element::IoutLoad => {
                let _ = pdi.insert(keys::CONFIG_SYSTEM_CURRENT_OUTPUT_RATED_LIMIT, Durability::Persistent, &f32::MAX.to_le_bytes(), None, on_write);
                let _ = pdi.insert(keys::TARGET_SYSTEM_CURRENT_OUTPUT, Durability::Persistent, &f32::MAX.to_le_bytes(), None, on_write);
            }
            Element::BoardTempA | Element::BoardTempB => {
                let _ = pdi.insert(keys::CONFIG_MIN_TEMP_LIMIT, Durability::Persistent, &f32::MIN.to_le_bytes(), None, on_write);
                let _ = pdi.insert(keys::CONFIG_MAX_TEMP_LIMIT, Durability::Persistent, &f32::MAX.to_le_bytes(), None, on_write);
            }
            Element::FanSpeed => {
                let _ = pdi.insert(keys::TARGET_FAN_SPEED_RPM, Durability::Persistent, &0f32.to_le_bytes(), None, on_write);
                let _ = pdi.insert(keys::MON_FAN_SPEED_PCT_ERROR_OOR_LIMIT, Durability::Persistent, &100f32.to_le_bytes(), None, on_write);
                let _ = pdi.insert(
                    keys::TARGET_FAN_SPEED_OOR_ESCALATION_MS,
                    Durability::Persistent,
                    &FAN_OOR_ESCALATION_DEFAULT_MS.to_le_bytes(),
                    None,
                    on_write,
                );
            }
            Element::Rail12V0 => {
                let _ = pdi.insert(keys::MON_12V0_PCT_ERROR_OOR_LIMIT, Durability::Persistent, &RAIL_PCT_ERROR_OOR_LIMIT_DEFAULT.to_le_bytes(), None, on_write);
            }
            Element::Rail1V1 => {
                let _ = pdi.insert(keys::MON_1V1_PCT_ERROR_OOR_LIMIT, Durability::Persistent, &RAIL_PCT_ERROR_OOR_LIMIT_DEFAULT.to_le_bytes(), None, on_write);
            }
            Element::Rail3V3 => {
                let _ = pdi.insert(keys::MON_3V3_PCT_ERROR_OOR_LIMIT, Durability::Persistent, &RAIL_PCT_ERROR_OOR_LIMIT_DEFAULT.to_le_bytes(), None, on_write);
            }
            Element::Rail5V0 => {
                let _ = pdi.insert(keys::MON_5V0_PCT_ERROR_OOR_LIMIT, Durability::Persistent, &RAIL_PCT_ERROR_OOR_LIMIT_DEFAULT.to_le_bytes(), None, on_write);
            }
        }

        if let Some(raw) = raw_key(elem) {
            let _ = pdi.insert(raw, Durability::Volatile, &0f32.to_le_bytes(), None, None);
        }
        let _ = pdi.insert(filtered_key(elem), Durability::Volatile, &0f32.to_le_bytes(), None, None);
        let _ = pdi.insert(valid_key(elem), Durability::Volatile, &[0u8], None, None);
    }

    fn refresh_config<N: Nvm>(&mut self, elem: Element, pdi: &mut PdiDatabase<N>) {
        let idx = elem as usize;

        let mut buf = [0u8; MAX_VALUE_SIZE];
        let filter_config = if pdi.read(filter_config_key(elem), &mut buf) > 0 {
            decode_filter_config(&buf)
        } else {
            FilterConfig::passthrough(DEFAULT_SAMPLE_RATE_MS)
        };
        let (limits, fault_code, enter_delay, exit_delay) = element_limits(elem, pdi);

        if elem == Element::FanSpeed {
            self.fan_oor_escalation_ms =
                read_u32(pdi, keys::TARGET_FAN_SPEED_OOR_ESCALATION_MS, FAN_OOR_ESCALATION_DEFAULT_MS);
        }

        let state = &mut self.states[idx];
        state.filter.initialize(filter_config);
        state.sample_rate_ms = filter_config.sample_rate_ms as u64;
        state.limits = limits;
        state.fault_code = fault_code;
        state.oor_enter_delay_ms = enter_delay;
        state.oor_exit_delay_ms = exit_delay;
        state.valid = false;
        state.oor_latched = false;
        state.oor_enter_time = 0;
        state.oor_exit_time = 0;

        CONFIG_DIRTY[idx].store(false, Ordering::Relaxed);
        ringbuf_entry!(Trace::ConfigRefreshed(elem));
    }

    /// Enables sampling and forces every element back to invalid — the
    /// source's `enable()` always starts from "nothing has been proven
    /// in-range yet", regardless of whatever the filtered values happen
    /// to already read.
    pub fn enable(&mut self) {
        self.enabled = true;
        for state in self.states.iter_mut() {
            state.valid = false;
            state.oor_latched = false;
            state.oor_enter_time = 0;
            state.oor_exit_time = 0;
        }
        self.fan_invalid_since = 0;
        self.fan_escalated = false;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Zeros every element's filter state without touching configuration
    /// or validity — a narrower operation than [`enable`](Self::enable).
    pub fn reset(&mut self) {
        for state in self.states.iter_mut() {
            state.filter.reset();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_valid(&self, elem: Element) -> bool {
        self.states[elem as usize].valid
    }

    pub fn filtered(&self, elem: Element) -> f32 {
        self.states[elem as usize].last_filtered
    }

    /// Runs one element's rate-limit/sample/filter/publish/hysteresis
    /// cycle. A no-op if the engine is disabled, or if `elem` hasn't been
    /// rate-limit-eligible since its last run. `BoardTempB` is a no-op:
    /// its reading is folded into `BoardTempA`'s composite sample instead
    /// of running its own monitor.
    pub fn run<A: Adc, G: Gpio, C: Clock, N: Nvm, F: FaultSink>(
        &mut self,
        elem: Element,
        now_ms: u64,
        sensors: &mut SensorFacade<A, G, C>,
        pdi: &mut PdiDatabase<N>,
        faults: &mut F,
    ) {
        if elem == Element::BoardTempB {
            return;
        }
        let idx = elem as usize;

        if CONFIG_DIRTY[idx].swap(false, Ordering::Relaxed) {
            self.refresh_config(elem, pdi);
        }

        if !self.enabled {
            return;
        }

        let sample_rate_ms = self.states[idx].sample_rate_ms;
        let last_run = self.states[idx].last_run_time;
        if now_ms.wrapping_sub(last_run) <= sample_rate_ms {
            return;
        }
        self.states[idx].last_run_time = now_ms;

        let raw = match elem {
            Element::BoardTempA => {
                let a = sensors.measurement(Element::BoardTempA, MeasurementMode::Refresh).unwrap_or(0.0);
                let b = sensors.measurement(Element::BoardTempB, MeasurementMode::Refresh).unwrap_or(0.0);
                (a + b) / 2.0
            }
            _ => sensors.measurement(elem, MeasurementMode::Refresh).unwrap_or(0.0),
        };

        let state = &mut self.states[idx];
        state.last_raw = raw;
        let filtered = state.filter.apply(raw);
        state.last_filtered = filtered;
        let is_oor = state.limits.is_out_of_range(filtered);
        let event = apply_hysteresis(state, is_oor, now_ms);
        let fault_code = state.fault_code;
        let valid = state.valid;

        publish_raw(elem, pdi, raw);
        publish_filtered(elem, pdi, filtered);
        publish_valid(elem, pdi, valid);

        if event == RangeEvent::OutOfRange {
            if let Some(code) = fault_code {
                faults.raise(code);
            }
        }

        if elem == Element::FanSpeed {
            self.run_fan_escalation(is_oor, now_ms, faults);
        }

        ringbuf_entry!(Trace::Ran(elem, filtered, valid));
    }

    /// Runs every monitored element once. Convenience for callers that
    /// don't need fine-grained per-element scheduling.
    pub fn run_all<A: Adc, G: Gpio, C: Clock, N: Nvm, F: FaultSink>(
        &mut self,
        now_ms: u64,
        sensors: &mut SensorFacade<A, G, C>,
        pdi: &mut PdiDatabase<N>,
        faults: &mut F,
    ) {
        for &elem in RUNNABLE_ELEMENTS.iter() {
            self.run(elem, now_ms, sensors, pdi, faults);
        }
    }

    /// The fan's second, independent timer: regardless of its own
    /// entry/exit debounce above, an out-of-range fan speed that persists
    /// for `fan_oor_escalation_ms` (10s by default) raises a fault exactly
    /// once, reset only by a clean in-range reading.
    fn run_fan_escalation<F: FaultSink>(&mut self, is_oor: bool, now_ms: u64, faults: &mut F) {
        if is_oor {
            if self.fan_invalid_since == 0 {
                self.fan_invalid_since = now_ms;
            }
            if !self.fan_escalated
                && now_ms.wrapping_sub(self.fan_invalid_since) >= self.fan_oor_escalation_ms as u64
            {
                self.fan_escalated = true;
                ringbuf_entry!(Trace::FanEscalated);
                faults.raise(FaultCode::MonFanSpeedOor);
            }
        } else {
            self.fan_invalid_since = 0;
            self.fan_escalated = false;
        }
    }
}

impl Default for MonitorEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ichnaea_hal::{AdcChannel, GpioPin, NvmError};
    use std::collections::HashMap;

    struct FakeAdc {
        voltages: HashMap<u8, f32>,
    }
    impl FakeAdc {
        fn new() -> Self {
            Self { voltages: HashMap::new() }
        }
        fn set(&mut self, ch: AdcChannel, v: f32) {
            self.voltages.insert(ch.0, v);
        }
    }
    impl Adc for FakeAdc {
        fn read_voltage(&mut self, channel: AdcChannel) -> f32 {
            *self.voltages.get(&channel.0).unwrap_or(&0.0)
        }
        fn cached(&self, channel: AdcChannel) -> f32 {
            *self.voltages.get(&channel.0).unwrap_or(&0.0)
        }
    }

    struct FakeGpio;
    impl Gpio for FakeGpio {
        fn set(&mut self, _pin: GpioPin, _level: bool) {}
        fn get(&self, _pin: GpioPin) -> bool {
            false
        }
    }

    struct FakeClock;
    impl Clock for FakeClock {
        fn millis(&self) -> u64 {
            0
        }
        fn micros(&self) -> u64 {
            0
        }
        fn delay_us(&self, _n: u32) {}
    }

    #[derive(Default)]
    struct FakeNvm {
        cells: HashMap<u32, u8>,
    }
    impl Nvm for FakeNvm {
        fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), NvmError> {
            for (i, b) in buf.iter_mut().enumerate() {
                *b = *self.cells.get(&(offset + i as u32)).unwrap_or(&0xFF);
            }
            Ok(())
        }
        fn write(&mut self, offset: u32, buf: &[u8]) -> Result<(), NvmError> {
            for (i, b) in buf.iter().enumerate() {
                self.cells.insert(offset + i as u32, *b);
            }
            Ok(())
        }
        fn erase(&mut self, offset: u32, len: u32) -> Result<(), NvmError> {
            for a in offset..offset + len {
                self.cells.insert(a, 0xFF);
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeFaultSink {
        raised: Vec<FaultCode>,
    }
    impl FaultSink for FakeFaultSink {
        fn raise(&mut self, code: FaultCode) -> bool {
            self.raised.push(code);
            true
        }
    }

    fn never_in_interrupt() -> bool {
        false
    }

    const CH: AdcChannel = AdcChannel(0);
    const SEL: [GpioPin; 3] = [GpioPin(0), GpioPin(1), GpioPin(2)];

    fn configured_facade(value: f32) -> SensorFacade<FakeAdc, FakeGpio, FakeClock> {
        let mut adc = FakeAdc::new();
        adc.set(CH, value);
        let mut facade = SensorFacade::new(adc, FakeGpio, FakeClock, never_in_interrupt);
        facade.configure(
            Element::VinSolarInput,
            ichnaea_sensor::ElementConfig {
                channel: CH,
                mux_select: SEL,
                mux_code: 0,
                conversion: ichnaea_sensor::Conversion::Direct,
            },
        );
        facade
    }

    #[test]
    fn hysteresis_requires_entry_delay_before_latching() {
        let mut state = MonitorState::new();
        state.oor_enter_delay_ms = 50;

        assert_eq!(apply_hysteresis(&mut state, true, 0), RangeEvent::NoChange);
        assert!(!state.oor_latched);
        assert_eq!(apply_hysteresis(&mut state, true, 49), RangeEvent::NoChange);
        assert_eq!(apply_hysteresis(&mut state, true, 50), RangeEvent::OutOfRange);
        assert!(state.oor_latched);
    }

    #[test]
    fn hysteresis_clears_entry_timer_on_a_transient_return_to_range() {
        let mut state = MonitorState::new();
        state.oor_enter_delay_ms = 100;

        assert_eq!(apply_hysteresis(&mut state, true, 0), RangeEvent::NoChange);
        // A brief return to range before the delay elapses clears the timer
        // rather than just pausing it.
        assert_eq!(apply_hysteresis(&mut state, false, 40), RangeEvent::NoChange);
        assert_eq!(state.oor_enter_time, 0);
        // Going OOR again restarts the delay from this new time, not from 0.
        assert_eq!(apply_hysteresis(&mut state, true, 80), RangeEvent::NoChange);
        assert_eq!(apply_hysteresis(&mut state, true, 179), RangeEvent::NoChange);
        assert_eq!(apply_hysteresis(&mut state, true, 180), RangeEvent::OutOfRange);
    }

    #[test]
    fn hysteresis_requires_exit_delay_before_clearing() {
        let mut state = MonitorState::new();
        state.oor_enter_delay_ms = 0;
        state.oor_exit_delay_ms = 30;

        assert_eq!(apply_hysteresis(&mut state, true, 0), RangeEvent::OutOfRange);
        assert_eq!(apply_hysteresis(&mut state, false, 10), RangeEvent::NoChange);
        assert_eq!(apply_hysteresis(&mut state, false, 29), RangeEvent::NoChange);
        assert_eq!(apply_hysteresis(&mut state, false, 30), RangeEvent::InRange);
        assert!(!state.oor_latched);
    }

    #[test]
    fn voltage_oor_entry_and_exit_escalates_and_recovers() {
        let mut engine = MonitorEngine::new();
        let mut pdi = PdiDatabase::initialize(FakeNvm::default());
        engine.initialize(&mut pdi);
        engine.enable();

        pdi.write(keys::CONFIG_MIN_SYSTEM_VOLTAGE_INPUT, &15.0f32.to_le_bytes());
        pdi.write(keys::MON_VIN_OOR_ENTRY_DELAY_MS, &0u32.to_le_bytes());
        pdi.write(keys::MON_VIN_OOR_EXIT_DELAY_MS, &0u32.to_le_bytes());

        let mut sensors = configured_facade(10.0); // below the 15V minimum
        let mut faults = FakeFaultSink::default();

        engine.run(Element::VinSolarInput, 1, &mut sensors, &mut pdi, &mut faults);
        assert!(!engine.is_valid(Element::VinSolarInput));
        assert_eq!(faults.raised, vec![FaultCode::MonVinOor]);

        let mut buf = [0u8; 4];
        pdi.read(keys::MON_VIN_VALID, &mut buf);
        assert_eq!(buf[0], 0);

        // A later sample back above the minimum, with the exit delay
        // already elapsed (it's 0), must recover the signal to valid.
        let mut recovered_sensors = configured_facade(20.0);
        engine.run(Element::VinSolarInput, 2, &mut recovered_sensors, &mut pdi, &mut faults);
        assert!(engine.is_valid(Element::VinSolarInput));

        pdi.read(keys::MON_VIN_VALID, &mut buf);
        assert_eq!(buf[0], 1);
    }

    #[test]
    fn temperature_monitor_averages_the_two_board_sensors() {
        let mut adc = FakeAdc::new();
        let ch_a = AdcChannel(0);
        let ch_b = AdcChannel(1);
        adc.set(ch_a, 1.0);
        adc.set(ch_b, 3.0);
        let mut facade = SensorFacade::new(adc, FakeGpio, FakeClock, never_in_interrupt);
        facade.configure(
            Element::BoardTempA,
            ichnaea_sensor::ElementConfig {
                channel: ch_a,
                mux_select: SEL,
                mux_code: 0,
                conversion: ichnaea_sensor::Conversion::Direct,
            },
        );
        facade.configure(
            Element::BoardTempB,
            ichnaea_sensor::ElementConfig {
                channel: ch_b,
                mux_select: SEL,
                mux_code: 1,
                conversion: ichnaea_sensor::Conversion::Direct,
            },
        );

        let mut engine = MonitorEngine::new();
        let mut pdi = PdiDatabase::initialize(FakeNvm::default());
        engine.initialize(&mut pdi);
        engine.enable();
        let mut faults = FakeFaultSink::default();

        engine.run(Element::BoardTempA, 1, &mut facade, &mut pdi, &mut faults);
        // Passthrough filter: the published value is the plain average.
        assert_eq!(engine.filtered(Element::BoardTempA), 2.0);

        // BoardTempB has no monitor slot of its own.
        engine.run(Element::BoardTempB, 2, &mut facade, &mut pdi, &mut faults);
        assert_eq!(engine.filtered(Element::BoardTempA), 2.0);
    }

    #[test]
    fn fan_speed_escalates_after_ten_seconds_regardless_of_its_own_exit_debounce() {
        let mut engine = MonitorEngine::new();
        let mut pdi = PdiDatabase::initialize(FakeNvm::default());
        engine.initialize(&mut pdi);
        engine.enable();

        // Target 0 RPM with a tiny tolerance means any nonzero reading
        // is immediately out of range, latching on the very first sample.
        pdi.write(keys::TARGET_FAN_SPEED_RPM, &0f32.to_le_bytes());
        pdi.write(keys::MON_FAN_SPEED_PCT_ERROR_OOR_LIMIT, &0f32.to_le_bytes());
        pdi.write(keys::MON_FAN_SPEED_OOR_ENTRY_DELAY_MS, &0u32.to_le_bytes());
        pdi.write(keys::TARGET_FAN_SPEED_OOR_ESCALATION_MS, &10_000u32.to_le_bytes());

        let mut sensors = {
            let mut adc = FakeAdc::new();
            adc.set(CH, 1.0);
            let mut facade = SensorFacade::new(adc, FakeGpio, FakeClock, never_in_interrupt);
            facade.configure(
                Element::FanSpeed,
                ichnaea_sensor::ElementConfig {
                    channel: CH,
                    mux_select: SEL,
                    mux_code: 0,
                    conversion: ichnaea_sensor::Conversion::Direct,
                },
            );
            facade
        };
        let mut faults = FakeFaultSink::default();

        engine.run(Element::FanSpeed, 1, &mut sensors, &mut pdi, &mut faults);
        assert!(faults.raised.is_empty(), "not yet 10s in");

        engine.run(Element::FanSpeed, 10_001, &mut sensors, &mut pdi, &mut faults);
        assert_eq!(faults.raised, vec![FaultCode::MonFanSpeedOor]);

        // It only escalates once per sustained excursion.
        engine.run(Element::FanSpeed, 20_001, &mut sensors, &mut pdi, &mut faults);
        assert_eq!(faults.raised.len(), 1);
    }

    #[test]
    fn load_overcurrent_trips_on_either_the_user_or_the_system_limit() {
        let mut engine = MonitorEngine::new();
        let mut pdi = PdiDatabase::initialize(FakeNvm::default());
        engine.initialize(&mut pdi);
        engine.enable();

        pdi.write(keys::TARGET_SYSTEM_CURRENT_OUTPUT, &5.0f32.to_le_bytes());
        pdi.write(keys::CONFIG_SYSTEM_CURRENT_OUTPUT_RATED_LIMIT, &10.0f32.to_le_bytes());

        let mut sensors = {
            let mut adc = FakeAdc::new();
            adc.set(CH, 7.0);
            let mut facade = SensorFacade::new(adc, FakeGpio, FakeClock, never_in_interrupt);
            facade.configure(
                Element::IoutLoad,
                ichnaea_sensor::ElementConfig {
                    channel: CH,
                    mux_select: SEL,
                    mux_code: 0,
                    conversion: ichnaea_sensor::Conversion::Direct,
                },
            );
            facade
        };
        let mut faults = FakeFaultSink::default();

        // 7 A is below the 10 A system limit but above the 5 A user limit.
        engine.run(Element::IoutLoad, 1, &mut sensors, &mut pdi, &mut faults);
        assert_eq!(faults.raised, vec![FaultCode::MonIoutOor]);
        assert!(!engine.is_valid(Element::IoutLoad));
    }

    #[test]
    fn writing_a_config_key_forces_the_monitor_invalid_on_its_next_run() {
        let mut engine = MonitorEngine::new();
        let mut pdi = PdiDatabase::initialize(FakeNvm::default());
        engine.initialize(&mut pdi);
        engine.enable();

        let mut sensors = configured_facade(20.0);
        let mut faults = FakeFaultSink::default();
        engine.run(Element::VinSolarInput, 1, &mut sensors, &mut pdi, &mut faults);

        // A later write to a config key this element depends on must mark
        // it dirty, and the next run must reload before sampling.
        pdi.write(keys::CONFIG_MAX_SYSTEM_VOLTAGE_INPUT, &15.0f32.to_le_bytes());
        assert!(CONFIG_DIRTY[Element::VinSolarInput as usize].load(Ordering::Relaxed));

        engine.run(Element::VinSolarInput, 200, &mut sensors, &mut pdi, &mut faults);
        assert!(!CONFIG_DIRTY[Element::VinSolarInput as usize].load(Ordering::Relaxed));
        // 20V now exceeds the newly-lowered 15V ceiling.
        assert!(!engine.is_valid(Element::VinSolarInput));
    }
}
