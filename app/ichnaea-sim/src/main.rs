// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Drives one [`ichnaea_app::ApplicationContext`] through a fixed number of
//! round-robin iterations against in-memory HAL fakes, printing the
//! resulting mode/telemetry each pass. Stands in for the external
//! scheduler that `monitor_task`/`control_task`/`delayed_io_task`/
//! `background_task` are written to be called from; real task creation and
//! IPC are somebody else's problem (see the crate's own doc comment).

use std::cell::Cell;
use std::collections::HashMap;
use std::time::Instant;

use ichnaea_app::{background_task, control_task, delayed_io_task, monitor_task, ApplicationContext};
use ichnaea_controller::{ControllerConfig, ControllerDriver, Pins};
use ichnaea_hal::{Adc, AdcChannel, Clock, Gpio, GpioPin, Nvm, NvmError, Spi, SpiError, SpiPort, System};
use ichnaea_panic::PanicRouter;
use ichnaea_pdi::PdiDatabase;
use ichnaea_sensor::SensorFacade;

struct SimAdc;
impl Adc for SimAdc {
    fn read_voltage(&mut self, _channel: AdcChannel) -> f32 {
        0.0
    }
    fn cached(&self, _channel: AdcChannel) -> f32 {
        0.0
    }
}

#[derive(Clone)]
struct SimGpio;
impl Gpio for SimGpio {
    fn set(&mut self, _pin: GpioPin, _level: bool) {}
    fn get(&self, _pin: GpioPin) -> bool {
        false
    }
}

#[derive(Clone)]
struct SimClock {
    start: Instant,
}
impl SimClock {
    fn new() -> Self {
        Self { start: Instant::now() }
    }
}
impl Clock for SimClock {
    fn millis(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
    fn micros(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
    fn delay_us(&self, n: u32) {
        std::thread::sleep(std::time::Duration::from_micros(n as u64));
    }
}

struct SimSpi {
    registers: HashMap<u8, u8>,
    chip_ctrl: u8,
    status: u8,
}
impl SimSpi {
    fn new() -> Self {
        Self { registers: HashMap::new(), chip_ctrl: 0, status: 0 }
    }
}
impl Spi for SimSpi {
    fn transfer(&mut self, _port: SpiPort, tx: &[u8], rx: &mut [u8]) -> Result<(), SpiError> {
        if tx.len() != 3 || rx.len() != 3 {
            return Err(SpiError::ShortTransfer);
        }
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
struct SimNvm {
    cells: HashMap<u32, u8>,
}
impl Nvm for SimNvm {
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

struct SimSystem {
    resets: Cell<u32>,
}
impl System for SimSystem {
    fn warm_reset(&mut self) -> ! {
        self.resets.set(self.resets.get() + 1);
        println!("ichnaea-sim: warm reset requested, exiting");
        std::process::exit(0);
    }
}

fn never_in_interrupt() -> bool {
    false
}

type SimContext = ApplicationContext<SimAdc, SimGpio, SimClock, SimSpi, SimSystem, SimNvm>;

fn new_context() -> SimContext {
    let sensors = SensorFacade::new(SimAdc, SimGpio, SimClock::new(), never_in_interrupt);
    let controller = ControllerDriver::new(
        SimSpi::new(),
        SimGpio,
        SimClock::new(),
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
    let panic = PanicRouter::new(SimSystem { resets: Cell::new(0) });
    let pdi = PdiDatabase::initialize(SimNvm::default());

    ApplicationContext::new(sensors, controller, panic, SimClock::new(), pdi)
}

const ITERATIONS: u32 = 20;

fn main() {
    let mut ctx = new_context();
    println!("ichnaea-sim: boot_count={}", ctx.boot_count());

    for i in 0..ITERATIONS {
        monitor_task(&mut ctx);
        control_task(&mut ctx);
        delayed_io_task(&mut ctx);
        if i == ITERATIONS / 2 {
            ctx.request_shutdown();
        }
    }

    // Drive the cooperative shutdown sequence to completion: each task body
    // advances the phase by exactly one step per call, Control first.
    for _ in 0..4 {
        control_task(&mut ctx);
        monitor_task(&mut ctx);
        delayed_io_task(&mut ctx);
    }

    println!("ichnaea-sim: last_error={:?}", ctx.last_error());
    background_task(&mut ctx);
}
