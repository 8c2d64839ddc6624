// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The power manager (C7): the component that actually binds the monitor
//! engine, the controller driver, and the PDI database together, per the
//! data-flow chain in §2 — Sensor Facade feeds the Monitor, the Monitor
//! publishes filtered values and validity into PDI, and the Power Manager
//! reads *PDI*, not the sensor facade directly, before deciding whether to
//! engage the controller. Grounded on the source's power-manager
//! equivalent, which likewise never touches the ADC directly and only ever
//! reads the monitor's published PDI entries plus its own rated-limit and
//! target config.

#![cfg_attr(not(test), no_std)]

use byteorder::{ByteOrder, LittleEndian};
use ichnaea_controller::{ControllerDriver, ControllerMode};
use ichnaea_hal::{Clock, Gpio, Nvm, Spi};
use ichnaea_monitor::MonitorEngine;
use ichnaea_panic::FaultSink;
use ichnaea_pdi::{keys, Durability, PdiDatabase, PdiKey};
use ringbuf::*;

/// Load current at or below this is treated as "no load present" for the
/// engage preflight — real sensor noise means this can never be checked
/// against a literal zero.
const NO_LOAD_CURRENT_EPSILON_A: f32 = 0.5;

#[derive(Copy, Clone, PartialEq, Debug)]
enum Trace {
    PreflightRejected,
    Engaged,
    EngageFailed,
    Disengaged,
    SetpointApplied,
    None,
}

ringbuf!(Trace, 32, Trace::None);

fn read_f32<N: Nvm>(pdi: &PdiDatabase<N>, key: PdiKey, default: f32) -> f32 {
    let mut buf = [0u8; 4];
    if pdi.read(key, &mut buf) == 4 {
        LittleEndian::read_f32(&buf)
    } else {
        default
    }
}

/// Registers the PDI keys this manager owns and nobody else does: the hard
/// rated-limit band (distinct from the monitor's softer operating band),
/// the per-phase current target and rated limit, the inductor DCR the
/// controller's current-setpoint math needs, and the output-current
/// zero-offset calibration.
pub fn initialize_pdi<N: Nvm>(pdi: &mut PdiDatabase<N>) {
    let _ = pdi.insert(
        keys::CONFIG_MIN_SYSTEM_VOLTAGE_INPUT_RATED_LIMIT,
        Durability::Persistent,
        &0f32.to_le_bytes(),
        None,
        None,
    );
    let _ = pdi.insert(
        keys::CONFIG_MAX_SYSTEM_VOLTAGE_INPUT_RATED_LIMIT,
        Durability::Persistent,
        &f32::MAX.to_le_bytes(),
        None,
        None,
    );
    let _ = pdi.insert(
        keys::CONFIG_PHASE_CURRENT_OUTPUT_RATED_LIMIT,
        Durability::Persistent,
        &f32::MAX.to_le_bytes(),
        None,
        None,
    );
    let _ = pdi.insert(
        keys::TARGET_SYSTEM_CURRENT_OUTPUT,
        Durability::Persistent,
        &0f32.to_le_bytes(),
        None,
        None,
    );
    let _ = pdi.insert(
        keys::TARGET_PHASE_CURRENT_OUTPUT,
        Durability::Persistent,
        &0f32.to_le_bytes(),
        None,
        None,
    );
    let _ = pdi.insert(
        keys::CONFIG_LTC_PHASE_INDUCTOR_DCR,
        Durability::Persistent,
        &0f32.to_le_bytes(),
        None,
        None,
    );
    let _ = pdi.insert(
        keys::CAL_OUTPUT_CURRENT,
        Durability::Persistent,
        &0f32.to_le_bytes(),
        None,
        None,
    );
}

/// Binds the controller driver to the monitor engine and PDI database: runs
/// the engage preflight, pumps pending setpoint requests, and drives the
/// controller's periodic fault monitoring.
pub struct PowerManager<S: Spi, G: Gpio, C: Clock> {
    controller: ControllerDriver<S, G, C>,
    pending_voltage: Option<f32>,
    pending_current: Option<f32>,
    fault_led: bool,
}

impl<S: Spi, G: Gpio, C: Clock> PowerManager<S, G, C> {
    pub fn new(controller: ControllerDriver<S, G, C>) -> Self {
        Self {
            controller,
            pending_voltage: None,
            pending_current: None,
            fault_led: false,
        }
    }

    pub fn mode(&self) -> ControllerMode {
        self.controller.mode()
    }

    /// True while the controller is `Faulted` and the fault LED should be
    /// lit; updated by the last [`Self::periodic`] call.
    pub fn fault_led(&self) -> bool {
        self.fault_led
    }

    /// Gathers the monitor's last-published measurements and the PDI
    /// setpoints/rated limits, runs the engage preflight (§4.7), and only if
    /// every check passes asks the controller to engage. On success, enables
    /// and resets the monitor so it starts proving the now-live output
    /// in-range from a clean slate rather than trusting whatever was last
    /// recorded while disengaged.
    pub fn engage<N: Nvm, F: FaultSink>(
        &mut self,
        pdi: &mut PdiDatabase<N>,
        monitor: &mut MonitorEngine,
        faults: &mut F,
    ) -> bool {
        let vin = read_f32(pdi, keys::MON_VIN_FILTERED, 0.0);
        let vin_min = read_f32(pdi, keys::CONFIG_MIN_SYSTEM_VOLTAGE_INPUT_RATED_LIMIT, 0.0);
        let vin_max = read_f32(pdi, keys::CONFIG_MAX_SYSTEM_VOLTAGE_INPUT_RATED_LIMIT, f32::MAX);
        let vout_measured = read_f32(pdi, keys::MON_VOUT_FILTERED, 0.0);
        let vout_rated_limit = read_f32(pdi, keys::CONFIG_SYSTEM_VOLTAGE_OUTPUT_RATED_LIMIT, f32::MAX);
        let cal_offset = read_f32(pdi, keys::CAL_OUTPUT_CURRENT, 0.0);
        let iout_measured = read_f32(pdi, keys::MON_IOUT_FILTERED, 0.0) - cal_offset;
        let iout_rated_limit = read_f32(pdi, keys::CONFIG_SYSTEM_CURRENT_OUTPUT_RATED_LIMIT, f32::MAX);
        let iphase_target = read_f32(pdi, keys::TARGET_PHASE_CURRENT_OUTPUT, 0.0);
        let iphase_rated_limit = read_f32(pdi, keys::CONFIG_PHASE_CURRENT_OUTPUT_RATED_LIMIT, f32::MAX);
        let vout_target = read_f32(pdi, keys::TARGET_SYSTEM_VOLTAGE_OUTPUT, 0.0);
        let iout_target = read_f32(pdi, keys::TARGET_SYSTEM_CURRENT_OUTPUT, 0.0);
        let dcr_ohms = read_f32(pdi, keys::CONFIG_LTC_PHASE_INDUCTOR_DCR, 0.0);

        let preflight_ok = vin >= vin_min
            && vin <= vin_max
            && vout_measured < vout_rated_limit
            && iout_measured.abs() <= NO_LOAD_CURRENT_EPSILON_A
            && vout_target < vin
            && vout_target < vout_rated_limit
            && iout_target < iout_rated_limit
            && iphase_target < iphase_rated_limit;

        if !preflight_ok {
            ringbuf_entry!(Trace::PreflightRejected);
            return false;
        }

        let engaged = self.controller.engage(vout_target, iout_target, vin, dcr_ohms, faults);
        if engaged {
            monitor.enable();
            monitor.reset();
            ringbuf_entry!(Trace::Engaged);
        } else {
            ringbuf_entry!(Trace::EngageFailed);
        }
        engaged
    }

    /// Unconditionally tears down the controller and disables the monitor,
    /// regardless of the manager's own idea of what state it's in.
    pub fn disengage<F: FaultSink>(&mut self, monitor: &mut MonitorEngine, faults: &mut F) {
        self.controller.disengage(faults);
        monitor.disable();
        ringbuf_entry!(Trace::Disengaged);
    }

    /// Drives the per-cycle control-task work: while `Enabled`, applies any
    /// pending setpoint request and runs the controller's fault monitoring;
    /// while `Faulted`, lights the fault LED; while `Disabled`, does nothing.
    pub fn periodic<N: Nvm, F: FaultSink>(&mut self, pdi: &mut PdiDatabase<N>, faults: &mut F) {
        match self.controller.mode() {
            ControllerMode::Enabled => {
                self.apply_pending_setpoint(pdi, faults);
                self.controller.run_fault_monitoring(faults);
                self.fault_led = false;
            }
            ControllerMode::Faulted => {
                self.fault_led = true;
            }
            ControllerMode::Disabled => {
                self.fault_led = false;
            }
        }
    }

    fn apply_pending_setpoint<N: Nvm, F: FaultSink>(&mut self, pdi: &mut PdiDatabase<N>, faults: &mut F) {
        if let Some(voltage) = self.pending_voltage.take() {
            let vin = read_f32(pdi, keys::MON_VIN_FILTERED, 0.0);
            self.controller.set_output_voltage(voltage, vin, faults);
            ringbuf_entry!(Trace::SetpointApplied);
        }
        if let Some(current) = self.pending_current.take() {
            let dcr_ohms = read_f32(pdi, keys::CONFIG_LTC_PHASE_INDUCTOR_DCR, 0.0);
            self.controller.set_output_current_limit(current, dcr_ohms, faults);
            ringbuf_entry!(Trace::SetpointApplied);
        }
    }

    /// Enqueues a new output-voltage setpoint; a later call before the next
    /// [`Self::periodic`] replaces it (latest-wins), not accumulates.
    pub fn set_output_voltage(&mut self, voltage: f32) {
        self.pending_voltage = Some(voltage);
    }

    /// Enqueues a new output-current-limit setpoint; latest-wins, same as
    /// [`Self::set_output_voltage`].
    pub fn set_output_current_limit(&mut self, current: f32) {
        self.pending_current = Some(current);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ichnaea_controller::{ControllerConfig, Pins};
    use ichnaea_hal::{GpioPin, NvmError, SpiError, SpiPort};
    use ichnaea_panic::FaultCode;
    use std::cell::Cell;
    use std::collections::HashMap;

    struct FakeSpi {
        registers: HashMap<u8, u8>,
        chip_ctrl: u8,
        status: u8,
    }
    impl FakeSpi {
        fn new() -> Self {
            Self { registers: HashMap::new(), chip_ctrl: 0, status: 0 }
        }
    }
    impl Spi for FakeSpi {
        fn transfer(&mut self, _port: SpiPort, tx: &[u8], rx: &mut [u8]) -> Result<(), SpiError> {
            let addr = tx[0] >> 1;
            let is_read = tx[0] & 1 != 0;
            if is_read {
                let data = if addr == ichnaea_controller::REG_MFR_CHIP_CTRL {
                    self.chip_ctrl
                } else if addr == ichnaea_controller::REG_MFR_STATUS {
                    self.status
                } else {
                    *self.registers.get(&addr).unwrap_or(&0)
                };
                rx[1] = data;
                rx[2] = ichnaea_controller::compute_pec(tx[0], data);
            } else {
                let data = tx[1];
                if addr == ichnaea_controller::REG_MFR_CHIP_CTRL {
                    self.chip_ctrl = data;
                } else {
                    self.registers.insert(addr, data);
                }
            }
            Ok(())
        }
    }

    struct FakeGpio {
        levels: HashMap<u8, bool>,
    }
    impl FakeGpio {
        fn new() -> Self {
            Self { levels: HashMap::new() }
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
        now: Cell<u64>,
    }
    impl FakeClock {
        fn new() -> Self {
            Self { now: Cell::new(0) }
        }
    }
    impl Clock for FakeClock {
        fn millis(&self) -> u64 {
            let t = self.now.get();
            self.now.set(t + 1);
            t
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

    fn pins() -> Pins {
        Pins {
            spi_port: SpiPort(0),
            chip_select: GpioPin(0),
            pwmen: GpioPin(1),
            run: GpioPin(2),
            ccm: GpioPin(3),
            dcm: GpioPin(4),
        }
    }

    fn controller_config() -> ControllerConfig {
        ControllerConfig {
            vlow_ra_ohms: 15_000.0,
            vlow_rb_ohms: 470_000.0,
            setcur_rfb_ohms: 10_000.0,
            board_rev: 2,
            pgood_timeout_ms: 50,
        }
    }

    fn straps_engage_ready(spi: &mut FakeSpi) {
        // ILIM_SET = 40mV (0b011) | DRVCC_SET = 10V (0b10 << 3); buck mode; PGOOD set.
        spi.registers.insert(ichnaea_controller::REG_MFR_CONFIG1, 0b0000_0011 | (0b10 << 3));
        spi.registers.insert(ichnaea_controller::REG_MFR_CONFIG2, 1);
        spi.status = 1;
    }

    fn manager_with_clean_straps() -> (PowerManager<FakeSpi, FakeGpio, FakeClock>, PdiDatabase<FakeNvm>, MonitorEngine) {
        let mut spi = FakeSpi::new();
        straps_engage_ready(&mut spi);
        let controller = ControllerDriver::new(spi, FakeGpio::new(), FakeClock::new(), pins(), controller_config());
        let manager = PowerManager::new(controller);

        let mut pdi = PdiDatabase::initialize(FakeNvm::default());
        let mut monitor = MonitorEngine::new();
        monitor.initialize(&mut pdi);
        initialize_pdi(&mut pdi);

        (manager, pdi, monitor)
    }

    fn seed_healthy_preflight(pdi: &mut PdiDatabase<FakeNvm>) {
        pdi.write(keys::CONFIG_MIN_SYSTEM_VOLTAGE_INPUT_RATED_LIMIT, &10.0f32.to_le_bytes());
        pdi.write(keys::CONFIG_MAX_SYSTEM_VOLTAGE_INPUT_RATED_LIMIT, &90.0f32.to_le_bytes());
        pdi.write(keys::MON_VIN_FILTERED, &48.0f32.to_le_bytes());
        pdi.write(keys::MON_VOUT_FILTERED, &0.0f32.to_le_bytes());
        pdi.write(keys::MON_IOUT_FILTERED, &0.0f32.to_le_bytes());
        pdi.write(keys::CONFIG_SYSTEM_VOLTAGE_OUTPUT_RATED_LIMIT, &60.0f32.to_le_bytes());
        pdi.write(keys::CONFIG_SYSTEM_CURRENT_OUTPUT_RATED_LIMIT, &150.0f32.to_le_bytes());
        pdi.write(keys::CONFIG_PHASE_CURRENT_OUTPUT_RATED_LIMIT, &30.0f32.to_le_bytes());
        pdi.write(keys::TARGET_SYSTEM_VOLTAGE_OUTPUT, &12.0f32.to_le_bytes());
        pdi.write(keys::TARGET_SYSTEM_CURRENT_OUTPUT, &30.0f32.to_le_bytes());
        pdi.write(keys::TARGET_PHASE_CURRENT_OUTPUT, &5.0f32.to_le_bytes());
        pdi.write(keys::CONFIG_LTC_PHASE_INDUCTOR_DCR, &1e-3f32.to_le_bytes());
    }

    #[test]
    fn engage_succeeds_with_healthy_preflight_and_enables_monitor() {
        let (mut manager, mut pdi, mut monitor) = manager_with_clean_straps();
        seed_healthy_preflight(&mut pdi);
        let mut faults = FakeFaultSink::default();

        let ok = manager.engage(&mut pdi, &mut monitor, &mut faults);

        assert!(ok);
        assert_eq!(manager.mode(), ControllerMode::Enabled);
        assert!(monitor.is_enabled());
    }

    #[test]
    fn engage_rejects_when_input_voltage_outside_rated_limit() {
        let (mut manager, mut pdi, mut monitor) = manager_with_clean_straps();
        seed_healthy_preflight(&mut pdi);
        // Below the 10V rated-limit floor seeded above.
        pdi.write(keys::MON_VIN_FILTERED, &5.0f32.to_le_bytes());
        let mut faults = FakeFaultSink::default();

        let ok = manager.engage(&mut pdi, &mut monitor, &mut faults);

        assert!(!ok);
        assert_eq!(manager.mode(), ControllerMode::Disabled);
    }

    #[test]
    fn engage_rejects_when_load_current_already_present() {
        let (mut manager, mut pdi, mut monitor) = manager_with_clean_straps();
        seed_healthy_preflight(&mut pdi);
        pdi.write(keys::MON_IOUT_FILTERED, &5.0f32.to_le_bytes());
        let mut faults = FakeFaultSink::default();

        let ok = manager.engage(&mut pdi, &mut monitor, &mut faults);

        assert!(!ok);
    }

    #[test]
    fn engage_rejects_when_target_voltage_exceeds_input() {
        let (mut manager, mut pdi, mut monitor) = manager_with_clean_straps();
        seed_healthy_preflight(&mut pdi);
        pdi.write(keys::TARGET_SYSTEM_VOLTAGE_OUTPUT, &60.0f32.to_le_bytes());
        let mut faults = FakeFaultSink::default();

        let ok = manager.engage(&mut pdi, &mut monitor, &mut faults);

        assert!(!ok);
    }

    #[test]
    fn engage_rejects_when_per_phase_target_exceeds_its_rated_limit() {
        let (mut manager, mut pdi, mut monitor) = manager_with_clean_straps();
        seed_healthy_preflight(&mut pdi);
        pdi.write(keys::TARGET_PHASE_CURRENT_OUTPUT, &35.0f32.to_le_bytes());
        let mut faults = FakeFaultSink::default();

        let ok = manager.engage(&mut pdi, &mut monitor, &mut faults);

        assert!(!ok);
    }

    #[test]
    fn disengage_disables_monitor_regardless_of_prior_state() {
        let (mut manager, mut pdi, mut monitor) = manager_with_clean_straps();
        seed_healthy_preflight(&mut pdi);
        let mut faults = FakeFaultSink::default();
        manager.engage(&mut pdi, &mut monitor, &mut faults);
        assert!(monitor.is_enabled());

        manager.disengage(&mut monitor, &mut faults);

        assert!(!monitor.is_enabled());
        assert_eq!(manager.mode(), ControllerMode::Disabled);
    }

    #[test]
    fn periodic_does_not_light_fault_led_while_disabled() {
        let (mut manager, mut pdi, _monitor) = manager_with_clean_straps();
        let mut faults = FakeFaultSink::default();

        manager.periodic(&mut pdi, &mut faults);
        assert!(!manager.fault_led());
    }

    #[test]
    fn pending_setpoint_is_latest_wins_and_consumed_once() {
        let (mut manager, mut pdi, mut monitor) = manager_with_clean_straps();
        seed_healthy_preflight(&mut pdi);
        let mut faults = FakeFaultSink::default();
        manager.engage(&mut pdi, &mut monitor, &mut faults);

        manager.set_output_voltage(11.0);
        manager.set_output_voltage(13.0); // latest-wins over the 11.0 above
        assert!(manager.pending_voltage.is_some());

        manager.periodic(&mut pdi, &mut faults);
        assert!(manager.pending_voltage.is_none(), "single-shot consumption");
    }
}
