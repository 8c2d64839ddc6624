// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wires the core components (sensor facade, monitor engine, PDI database,
//! controller driver, power manager, panic router) into the four scheduled
//! bodies described for the Monitor/Control/Background/Delayed I/O tasks.
//!
//! Real preemptive scheduling and inter-task messaging are somebody else's
//! problem; what lives here is just a single owning context and four plain
//! functions meant to be called once per period by an external
//! scheduler/executor, in the shape of `task-power`'s and `task-thermal`'s
//! `loop { ...; hl::sleep_for(period_ms) }` bodies, minus the `userlib`
//! IPC machinery those tasks also carry.

#![cfg_attr(not(test), no_std)]

use ichnaea_controller::ControllerDriver;
use ichnaea_hal::{Adc, Clock, Gpio, Nvm, Spi, System};
use ichnaea_monitor::MonitorEngine;
use ichnaea_panic::{FaultCode, PanicRouter};
use ichnaea_pdi::PdiDatabase;
use ichnaea_power::PowerManager;
use ichnaea_sensor::SensorFacade;
use ringbuf::*;

/// How far along the cooperative shutdown sequence the application is.
/// Advances strictly Control → Monitor → Delayed I/O → Halted; each task
/// advances it by exactly one step, in that order, so no task can observe a
/// later stage before an earlier one has had its own chance to stop.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum ShutdownPhase {
    Running,
    ControlStopping,
    MonitorStopping,
    IoStopping,
    Halted,
}

#[derive(Copy, Clone, PartialEq, Debug)]
enum Trace {
    ShutdownRequested,
    ControlStopped,
    MonitorStopped,
    IoStopped,
    None,
}

ringbuf!(Trace, 16, Trace::None);

/// Owns every core component for one board instance. Generic over the same
/// HAL traits the leaf components already are, so the whole application can
/// run against in-memory fakes in tests just as the leaf crates do.
pub struct ApplicationContext<A, G, C, SP, SY, N>
where
    A: Adc,
    G: Gpio,
    C: Clock,
    SP: Spi,
    SY: System,
    N: Nvm,
{
    sensors: SensorFacade<A, G, C>,
    monitor: MonitorEngine,
    pdi: PdiDatabase<N>,
    power: PowerManager<SP, G, C>,
    panic: PanicRouter<SY>,
    clock: C,
    phase: ShutdownPhase,
}

impl<A, G, C, SP, SY, N> ApplicationContext<A, G, C, SP, SY, N>
where
    A: Adc,
    G: Gpio,
    C: Clock,
    SP: Spi,
    SY: System,
    N: Nvm,
{
    /// Assembles the context from already-constructed components and runs
    /// each component's own `initialize()` against the shared PDI database,
    /// in leaf-dependency order: the monitor first (it owns the per-signal
    /// config/telemetry keys the power manager's preflight reads), then the
    /// power manager's own rated-limit/target/calibration keys.
    pub fn new(
        sensors: SensorFacade<A, G, C>,
        controller: ControllerDriver<SP, G, C>,
        panic: PanicRouter<SY>,
        clock: C,
        mut pdi: PdiDatabase<N>,
    ) -> Self {
        let mut monitor = MonitorEngine::new();
        monitor.initialize(&mut pdi);
        ichnaea_power::initialize_pdi(&mut pdi);

        Self {
            sensors,
            monitor,
            pdi,
            power: PowerManager::new(controller),
            panic,
            clock,
            phase: ShutdownPhase::Running,
        }
    }

    /// Begins the cooperative shutdown sequence. Only ever called from
    /// [`background_task`]'s caller; the four task bodies themselves only
    /// ever observe and advance `phase`, never originate it.
    pub fn request_shutdown(&mut self) {
        if self.phase == ShutdownPhase::Running {
            self.phase = ShutdownPhase::ControlStopping;
            ringbuf_entry!(Trace::ShutdownRequested);
        }
    }

    pub fn last_error(&self) -> FaultCode {
        self.panic.last_error()
    }

    pub fn boot_count(&self) -> u32 {
        self.pdi.boot_count()
    }

    /// Runs the engage preflight against current PDI/monitor state and, if
    /// it passes, engages the controller. For whatever sits above this
    /// layer (RPC/CLI wiring, out of scope here) to call on command.
    pub fn engage(&mut self) -> bool {
        self.power.engage(&mut self.pdi, &mut self.monitor, &mut self.panic)
    }

    pub fn disengage(&mut self) {
        self.power.disengage(&mut self.monitor, &mut self.panic);
    }

    pub fn set_output_voltage(&mut self, voltage: f32) {
        self.power.set_output_voltage(voltage);
    }

    pub fn set_output_current_limit(&mut self, current: f32) {
        self.power.set_output_current_limit(current);
    }

    pub fn monitor(&self) -> &MonitorEngine {
        &self.monitor
    }

    pub fn pdi_mut(&mut self) -> &mut PdiDatabase<N> {
        &mut self.pdi
    }
}

/// Priority-20, ~10 ms period body: samples every monitored element,
/// filters, publishes to PDI, and escalates faults through the panic
/// router. No-ops once the shutdown sequence reaches `MonitorStopping`.
pub fn monitor_task<A, G, C, SP, SY, N>(ctx: &mut ApplicationContext<A, G, C, SP, SY, N>)
where
    A: Adc,
    G: Gpio,
    C: Clock,
    SP: Spi,
    SY: System,
    N: Nvm,
{
    if ctx.phase == ShutdownPhase::MonitorStopping {
        ctx.monitor.disable();
        ctx.phase = ShutdownPhase::IoStopping;
        ringbuf_entry!(Trace::MonitorStopped);
        return;
    }
    if ctx.phase != ShutdownPhase::Running {
        return;
    }

    let now_ms = ctx.clock.millis();
    ctx.monitor.run_all(now_ms, &mut ctx.sensors, &mut ctx.pdi, &mut ctx.panic);
}

/// Priority-15, ~25 ms period body: applies any pending setpoint and drives
/// the controller's own fault monitoring. Engage/disengage/setpoint
/// requests arrive through [`ApplicationContext::engage`] and friends, from
/// whatever sits above this layer (RPC/CLI wiring is explicitly out of
/// scope here). First to stop on shutdown.
pub fn control_task<A, G, C, SP, SY, N>(ctx: &mut ApplicationContext<A, G, C, SP, SY, N>)
where
    A: Adc,
    G: Gpio,
    C: Clock,
    SP: Spi,
    SY: System,
    N: Nvm,
{
    if ctx.phase == ShutdownPhase::ControlStopping {
        ctx.power.disengage(&mut ctx.monitor, &mut ctx.panic);
        ctx.phase = ShutdownPhase::MonitorStopping;
        ringbuf_entry!(Trace::ControlStopped);
        return;
    }
    if ctx.phase != ShutdownPhase::Running {
        return;
    }

    ctx.power.periodic(&mut ctx.pdi, &mut ctx.panic);
}

/// Priority-5, 100 ms-awaitable body: flushes dirty persistent PDI entries
/// to NVM. Stops third, after Control and Monitor have each had their turn.
pub fn delayed_io_task<A, G, C, SP, SY, N>(ctx: &mut ApplicationContext<A, G, C, SP, SY, N>)
where
    A: Adc,
    G: Gpio,
    C: Clock,
    SP: Spi,
    SY: System,
    N: Nvm,
{
    if ctx.phase == ShutdownPhase::IoStopping {
        ctx.pdi.flush();
        ctx.phase = ShutdownPhase::Halted;
        ringbuf_entry!(Trace::IoStopped);
        return;
    }
    if ctx.phase != ShutdownPhase::Running {
        return;
    }

    ctx.pdi.flush();
}

/// Priority-10 idle body. Does nothing while running; once every other
/// task has stopped (`phase == Halted`) it performs the final flush and
/// reset, per its role as the task that exits last. Routes the reset
/// through the panic router's own unhandled-fault path (`SystemThreadExit`
/// has no registered handler by construction) rather than calling a reset
/// primitive directly, so a board that *does* want to intercept shutdown
/// can register a handler for it like any other fault.
pub fn background_task<A, G, C, SP, SY, N>(ctx: &mut ApplicationContext<A, G, C, SP, SY, N>) -> !
where
    A: Adc,
    G: Gpio,
    C: Clock,
    SP: Spi,
    SY: System,
    N: Nvm,
{
    if ctx.phase == ShutdownPhase::Halted {
        ctx.pdi.flush();
        ctx.panic.throw_error(FaultCode::SystemThreadExit);
        unreachable!("throw_error with no registered handler performs a warm reset");
    }
    panic!("background_task called before shutdown was requested");
}

#[cfg(test)]
mod tests {
    use super::*;
    use ichnaea_controller::{ControllerConfig, Pins};
    use ichnaea_hal::{GpioPin, NvmError, SpiError, SpiPort};
    use std::cell::Cell;
    use std::collections::HashMap;

    struct FakeAdc;
    impl Adc for FakeAdc {
        fn read_voltage(&mut self, _channel: ichnaea_hal::AdcChannel) -> f32 {
            0.0
        }
        fn cached(&self, _channel: ichnaea_hal::AdcChannel) -> f32 {
            0.0
        }
    }

    #[derive(Clone)]
    struct FakeGpio;
    impl Gpio for FakeGpio {
        fn set(&mut self, _pin: GpioPin, _level: bool) {}
        fn get(&self, _pin: GpioPin) -> bool {
            false
        }
    }

    #[derive(Clone)]
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

    struct FakeSpi {
        registers: HashMap<u8, u8>,
        chip_ctrl: u8,
        status: u8,
    }
    impl FakeSpi {
        fn new() -> Self {
            Self { registers: HashMap::new(), chip_ctrl: 0, status: 1 }
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

    struct FakeSystem {
        resets: Cell<u32>,
    }
    impl System for FakeSystem {
        fn warm_reset(&mut self) -> ! {
            self.resets.set(self.resets.get() + 1);
            panic!("warm reset requested");
        }
    }

    fn never_in_interrupt() -> bool {
        false
    }

    type TestContext = ApplicationContext<FakeAdc, FakeGpio, FakeClock, FakeSpi, FakeSystem, FakeNvm>;

    fn new_context() -> TestContext {
        let sensors = SensorFacade::new(FakeAdc, FakeGpio, FakeClock::new(), never_in_interrupt);
        let controller = ControllerDriver::new(
            FakeSpi::new(),
            FakeGpio,
            FakeClock::new(),
            Pins {
                spi_port: SpiPort(0),
                chip_select: GpioPin(0),
                pwmen: GpioPin(1),
                run: GpioPin(2),
                ccm: GpioPin(3),
                dcm: GpioPin(4),
            },
            ControllerConfig {
                vlow_ra_ohms: 15_000.0,
                vlow_rb_ohms: 470_000.0,
                setcur_rfb_ohms: 10_000.0,
                board_rev: 2,
                pgood_timeout_ms: 50,
            },
        );
        let panic = PanicRouter::new(FakeSystem { resets: Cell::new(0) });
        let pdi = PdiDatabase::initialize(FakeNvm::default());

        ApplicationContext::new(sensors, controller, panic, FakeClock::new(), pdi)
    }

    #[test]
    fn monitor_and_control_and_io_tasks_run_without_panicking_while_idle() {
        let mut ctx = new_context();
        monitor_task(&mut ctx);
        control_task(&mut ctx);
        delayed_io_task(&mut ctx);
        assert_eq!(ctx.boot_count(), 1);
    }

    #[test]
    fn shutdown_sequence_advances_one_task_at_a_time() {
        let mut ctx = new_context();
        ctx.request_shutdown();
        assert_eq!(ctx.phase, ShutdownPhase::ControlStopping);

        control_task(&mut ctx);
        assert_eq!(ctx.phase, ShutdownPhase::MonitorStopping);

        // A second control_task call before monitor_task's turn must be a no-op.
        control_task(&mut ctx);
        assert_eq!(ctx.phase, ShutdownPhase::MonitorStopping);

        monitor_task(&mut ctx);
        assert_eq!(ctx.phase, ShutdownPhase::IoStopping);

        delayed_io_task(&mut ctx);
        assert_eq!(ctx.phase, ShutdownPhase::Halted);
    }

    #[test]
    #[should_panic(expected = "warm reset requested")]
    fn background_task_resets_once_every_other_task_has_stopped() {
        let mut ctx = new_context();
        ctx.request_shutdown();
        control_task(&mut ctx);
        monitor_task(&mut ctx);
        delayed_io_task(&mut ctx);
        background_task(&mut ctx);
    }

    #[test]
    #[should_panic(expected = "called before shutdown was requested")]
    fn background_task_is_not_meant_to_be_polled_while_running() {
        let mut ctx = new_context();
        background_task(&mut ctx);
    }
}
