// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fault routing: a registered-handler-per-code panic dispatcher with a
//! last-error latch.
//!
//! The API surface mirrors the source firmware's `Panic` namespace
//! (`throwError`, `assertion`, `getLastError`, `resetError`,
//! `registerHandler`) rather than inventing a new error-handling vocabulary.
//! Handlers are plain function pointers — no allocation, no closures — since
//! the handler table is expected to be built once before any task starts and
//! then treated as read-only.

#![cfg_attr(not(test), no_std)]

use ichnaea_hal::System;
use ringbuf::*;

/// Error codes that can be reported by the system.
///
/// `LtcDataWriteFail..=LtcFault` forms a contiguous sub-range of
/// LTC7871-specific codes, mirroring the source's `_ERR_LTC_START`/
/// `_ERR_LTC_END` sentinel trick; [`FaultCode::is_ltc_fault`] is the
/// idiomatic replacement for range-comparing raw integers against those
/// sentinels.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[repr(u32)]
pub enum FaultCode {
    NoError = 0,
    Unknown,
    AssertionFail,
    InvalidParam,
    InvalidContext,
    SystemInitFail,
    PostFail,
    BoardVersionReadFail,
    SystemThreadExit,

    LtcDataWriteFail,
    LtcDataReadFail,
    LtcPecReadFail,
    LtcPecWriteFail,
    LtcCmdFail,
    LtcHwStrapFail,
    LtcFault,

    MonVinOor,
    MonVoutOor,
    MonIoutOor,
    MonTempOor,
    MonFanSpeedOor,
    Mon12V0Oor,

    PwrDwnFail,
}

const NUM_CODES: usize = FaultCode::PwrDwnFail as usize + 1;

impl FaultCode {
    /// True for the contiguous range of LTC7871 communication/fault codes.
    pub fn is_ltc_fault(self) -> bool {
        let v = self as u32;
        (FaultCode::LtcDataWriteFail as u32..=FaultCode::LtcFault as u32).contains(&v)
    }
}

/// A registered fault handler. Returns `true` if it recovered the condition.
pub type ErrorCallback = fn(FaultCode) -> bool;

/// A narrow escalation surface for code that needs to raise faults without
/// being generic over the board's concrete [`System`] implementation — the
/// monitor engine and controller driver take `&mut dyn FaultSink` rather than
/// threading a `PanicRouter<S>` type parameter through their own generics.
pub trait FaultSink {
    /// Raises `code` through the router; returns whether it recovered.
    fn raise(&mut self, code: FaultCode) -> bool;
}

impl<S: System> FaultSink for PanicRouter<S> {
    fn raise(&mut self, code: FaultCode) -> bool {
        self.throw_error(code)
    }
}

#[derive(Copy, Clone, PartialEq, Debug)]
enum Trace {
    Thrown(FaultCode),
    Recovered(FaultCode),
    UnhandledReset(FaultCode),
    HandlerRegistered(FaultCode),
    None,
}

ringbuf!(Trace, 32, Trace::None);

/// The fault router. Generic over the board's [`System`] implementation so
/// the "default handler reboots the system" behavior has somewhere to go
/// without requiring handlers to close over global state.
pub struct PanicRouter<S: System> {
    system: S,
    handlers: [Option<ErrorCallback>; NUM_CODES],
    last_error: FaultCode,
}

impl<S: System> PanicRouter<S> {
    /// Equivalent of the source's `Panic::powerUp()`: establishes an empty
    /// handler table and a clean last-error latch.
    pub fn new(system: S) -> Self {
        Self {
            system,
            handlers: [None; NUM_CODES],
            last_error: FaultCode::NoError,
        }
    }

    /// Registers (or replaces) the handler for `code`.
    ///
    /// Per the concurrency contract, this is only ever called during
    /// initialization; the table is read-only once tasks start.
    pub fn register_handler(&mut self, code: FaultCode, handler: ErrorCallback) {
        ringbuf_entry!(Trace::HandlerRegistered(code));
        self.handlers[code as usize] = Some(handler);
    }

    /// Latches `code` as the last error, dispatches to its registered
    /// handler if any, and returns whether the handler reports recovery.
    ///
    /// If no handler is registered for `code`, this performs a warm reset
    /// and does not return.
    pub fn throw_error(&mut self, code: FaultCode) -> bool {
        ringbuf_entry!(Trace::Thrown(code));
        self.last_error = code;

        match self.handlers[code as usize] {
            Some(handler) => {
                let recovered = handler(code);
                if recovered {
                    ringbuf_entry!(Trace::Recovered(code));
                }
                recovered
            }
            None => {
                ringbuf_entry!(Trace::UnhandledReset(code));
                self.system.warm_reset();
            }
        }
    }

    /// Throws `code` if `predicate` is false. If the resulting dispatch does
    /// not recover, performs a warm reset — this is how fatal assertions
    /// (§7 class 3) terminate.
    pub fn assertion(&mut self, predicate: bool, code: FaultCode) {
        if !predicate && !self.throw_error(code) {
            self.system.warm_reset();
        }
    }

    pub fn last_error(&self) -> FaultCode {
        self.last_error
    }

    pub fn reset_error(&mut self) {
        self.last_error = FaultCode::NoError;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct FakeSystem {
        reset_count: Rc<Cell<u32>>,
    }

    impl System for FakeSystem {
        fn warm_reset(&mut self) -> ! {
            self.reset_count.set(self.reset_count.get() + 1);
            panic!("warm_reset");
        }
    }

    fn recovers(_code: FaultCode) -> bool {
        true
    }

    fn does_not_recover(_code: FaultCode) -> bool {
        false
    }

    #[test]
    fn unregistered_code_defaults_to_no_error() {
        let counter = Rc::new(Cell::new(0));
        let router = PanicRouter::new(FakeSystem {
            reset_count: counter,
        });
        assert_eq!(router.last_error(), FaultCode::NoError);
    }

    #[test]
    fn registered_handler_recovers_without_reset() {
        let counter = Rc::new(Cell::new(0));
        let mut router = PanicRouter::new(FakeSystem {
            reset_count: counter.clone(),
        });
        router.register_handler(FaultCode::LtcPecReadFail, recovers);

        let recovered = router.throw_error(FaultCode::LtcPecReadFail);

        assert!(recovered);
        assert_eq!(router.last_error(), FaultCode::LtcPecReadFail);
        assert_eq!(counter.get(), 0);
    }

    #[test]
    #[should_panic(expected = "warm_reset")]
    fn unhandled_code_resets() {
        let counter = Rc::new(Cell::new(0));
        let mut router = PanicRouter::new(FakeSystem {
            reset_count: counter,
        });
        router.throw_error(FaultCode::SystemInitFail);
    }

    #[test]
    #[should_panic(expected = "warm_reset")]
    fn assertion_failure_with_non_recovering_handler_resets() {
        let counter = Rc::new(Cell::new(0));
        let mut router = PanicRouter::new(FakeSystem {
            reset_count: counter,
        });
        router.register_handler(FaultCode::AssertionFail, does_not_recover);
        router.assertion(false, FaultCode::AssertionFail);
    }

    #[test]
    fn assertion_true_never_dispatches() {
        let counter = Rc::new(Cell::new(0));
        let mut router = PanicRouter::new(FakeSystem {
            reset_count: counter,
        });
        router.assertion(true, FaultCode::AssertionFail);
        assert_eq!(router.last_error(), FaultCode::NoError);
    }

    #[test]
    fn reset_error_clears_latch() {
        let counter = Rc::new(Cell::new(0));
        let mut router = PanicRouter::new(FakeSystem {
            reset_count: counter,
        });
        router.register_handler(FaultCode::LtcCmdFail, recovers);
        router.throw_error(FaultCode::LtcCmdFail);
        router.reset_error();
        assert_eq!(router.last_error(), FaultCode::NoError);
    }

    #[test]
    fn ltc_fault_range_is_contiguous() {
        assert!(FaultCode::LtcDataWriteFail.is_ltc_fault());
        assert!(FaultCode::LtcPecReadFail.is_ltc_fault());
        assert!(FaultCode::LtcFault.is_ltc_fault());
        assert!(!FaultCode::NoError.is_ltc_fault());
        assert!(!FaultCode::MonVinOor.is_ltc_fault());
        assert!(!FaultCode::PwrDwnFail.is_ltc_fault());
    }
}
