// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Programmable Data Item database: a typed key-value store over NVM
//! with a RAM cache, per-key write/sanitize callbacks, and two durability
//! classes.
//!
//! Grounded on `system_db.cpp` (cold-start recovery, boot-count bump at
//! init) and `app_pdi.cpp`/`app_pdi.hpp` (one RAM-cache struct per key,
//! `PDIKey` as a stable numeric tag). The underlying flash-journaling layer
//! (FlashDB in the source) is out of scope per this crate's HAL boundary;
//! this database instead owns a small fixed directory of its own directly
//! over the raw [`Nvm`] trait, described in the module-level docs below.

#![cfg_attr(not(test), no_std)]

pub mod keys;

use byteorder::{ByteOrder, LittleEndian};
use ichnaea_hal::Nvm;
use ringbuf::*;

/// A stable 32-bit key. See [`keys`] for the named key set.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct PdiKey(pub u32);

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Durability {
    /// Backed by NVM; synced at insertion and flushed on write.
    Persistent,
    /// RAM-only; writes never touch NVM.
    Volatile,
}

/// Invoked on the data being written, in place, before it is committed to
/// the RAM cache. Must be idempotent (P2): applying it twice to its own
/// output must be a no-op.
pub type SanitizeFn = fn(&mut [u8]);

/// Invoked synchronously, on the writing task's stack, after a write commits.
/// Must not write the key that triggered it (re-entrant same-key writes are
/// undefined); writing other keys from within is fine.
pub type OnWriteFn = fn(PdiKey);

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum PdiError {
    /// The directory has no room for another entry.
    Full,
    /// `decode` was given a key with no matching registered entry.
    UnknownKey,
    /// `decode` was given a wire buffer too short to contain its own header.
    Truncated,
}

/// Maximum payload size of a single PDI entry's value.
pub const MAX_VALUE_SIZE: usize = 64;
/// Maximum number of distinct PDI keys this database can hold.
pub const MAX_ENTRIES: usize = 96;

/// Byte offset of the PDI region within the backing NVM device (§6).
pub const PDI_REGION_OFFSET: u32 = 0;
/// Size of the PDI region.
pub const PDI_REGION_SIZE: u32 = 1024 * 1024;
/// Erase granularity used during cold-start recovery.
const RECOVERY_ERASE_STRIDE: u32 = 64 * 1024;

const SUPERBLOCK_MAGIC: u32 = 0x4943_4844; // "ICHD"
const SUPERBLOCK_SIZE: u32 = 4;
const SLOT_HEADER_SIZE: u32 = 6; // key: u32, len: u16
const SLOT_SIZE: u32 = SLOT_HEADER_SIZE + MAX_VALUE_SIZE as u32;

#[derive(Copy, Clone, PartialEq, Debug)]
enum Trace {
    ColdStart,
    ColdStartRecovered,
    ColdStartDegraded,
    Inserted(PdiKey),
    Written(PdiKey, usize),
    Flushed(PdiKey),
    None,
}

ringbuf!(Trace, 64, Trace::None);

struct Slot {
    key: PdiKey,
    durability: Durability,
    len: usize,
    data: [u8; MAX_VALUE_SIZE],
    sanitize: Option<SanitizeFn>,
    on_write: Option<OnWriteFn>,
    nvm_slot: Option<u32>,
    dirty: bool,
}

/// The PDI database. Generic over the board's [`Nvm`] implementation.
pub struct PdiDatabase<N: Nvm> {
    nvm: N,
    slots: heapless::Vec<Slot, MAX_ENTRIES>,
    next_nvm_slot: u32,
    degraded: bool,
}

impl<N: Nvm> PdiDatabase<N> {
    /// Mounts the database, performing the one-shot cold-start recovery
    /// (erase the whole PDI region, reformat, retry) if the region doesn't
    /// look like a previously-formatted directory. If recovery also fails,
    /// the database comes up permanently degraded: reads return registered
    /// defaults and writes are accepted into RAM only. This never fails
    /// outright — degradation *is* the failure mode, exactly as in the
    /// source, where a second init failure is a logged, continuing
    /// condition rather than a panic.
    ///
    /// Bumps and flushes `boot_count` before returning, unconditionally and
    /// before any other entry is inserted.
    pub fn initialize(mut nvm: N) -> Self {
        let degraded = if Self::try_mount(&mut nvm) {
            false
        } else {
            ringbuf_entry!(Trace::ColdStart);
            let erased = Self::erase_region(&mut nvm);
            let reformatted = erased
                && nvm
                    .write(PDI_REGION_OFFSET, &SUPERBLOCK_MAGIC.to_le_bytes())
                    .is_ok();
            let recovered = reformatted && Self::try_mount(&mut nvm);
            if recovered {
                ringbuf_entry!(Trace::ColdStartRecovered);
            } else {
                ringbuf_entry!(Trace::ColdStartDegraded);
            }
            !recovered
        };

        let mut db = Self {
            nvm,
            slots: heapless::Vec::new(),
            next_nvm_slot: 0,
            degraded,
        };
        db.bump_boot_count();
        db
    }

    fn try_mount(nvm: &mut N) -> bool {
        let mut buf = [0u8; SUPERBLOCK_SIZE as usize];
        nvm.read(PDI_REGION_OFFSET, &mut buf).is_ok()
            && LittleEndian::read_u32(&buf) == SUPERBLOCK_MAGIC
    }

    fn erase_region(nvm: &mut N) -> bool {
        let mut addr = PDI_REGION_OFFSET;
        while addr < PDI_REGION_OFFSET + PDI_REGION_SIZE {
            if nvm.erase(addr, RECOVERY_ERASE_STRIDE).is_err() {
                return false;
            }
            addr += RECOVERY_ERASE_STRIDE;
        }
        true
    }

    /// True once cold-start recovery has exhausted itself; reads fall back
    /// to defaults and writes no longer reach NVM.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    fn slot_index(&self, key: PdiKey) -> Option<usize> {
        self.slots.iter().position(|s| s.key == key)
    }

    /// Registers `key`. Idempotent: re-inserting an already-registered key
    /// is a no-op. If persistent, syncs from NVM over the just-written
    /// default (the default is written to the RAM cache unconditionally
    /// first, mirroring `pdi_insert_and_create`'s write-then-sync order).
    pub fn insert(
        &mut self,
        key: PdiKey,
        durability: Durability,
        default: &[u8],
        sanitize: Option<SanitizeFn>,
        on_write: Option<OnWriteFn>,
    ) -> Result<(), PdiError> {
        if self.slot_index(key).is_some() {
            return Ok(());
        }

        let len = default.len().min(MAX_VALUE_SIZE);
        let mut data = [0u8; MAX_VALUE_SIZE];
        data[..len].copy_from_slice(&default[..len]);

        let nvm_slot = match durability {
            Durability::Persistent => {
                let slot = self.next_nvm_slot;
                self.next_nvm_slot += 1;
                Some(slot)
            }
            Durability::Volatile => None,
        };

        let mut slot = Slot {
            key,
            durability,
            len,
            data,
            sanitize,
            on_write,
            nvm_slot,
            dirty: false,
        };

        if let (Durability::Persistent, Some(offset), false) =
            (slot.durability, slot.nvm_slot, self.degraded)
        {
            if let Some((stored_len, stored)) = self.read_nvm_slot(offset) {
                slot.len = stored_len;
                slot.data = stored;
            }
        }

        self.slots
            .push(slot)
            .map_err(|_| PdiError::Full)?;
        ringbuf_entry!(Trace::Inserted(key));
        Ok(())
    }

    fn read_nvm_slot(&mut self, slot_index: u32) -> Option<(usize, [u8; MAX_VALUE_SIZE])> {
        let offset = SUPERBLOCK_SIZE + slot_index * SLOT_SIZE;
        let mut header = [0u8; SLOT_HEADER_SIZE as usize];
        self.nvm.read(offset, &mut header).ok()?;
        // An erased (all-0xFF) or zeroed slot means "never written".
        let stored_key = LittleEndian::read_u32(&header[0..4]);
        if stored_key == 0 || stored_key == u32::MAX {
            return None;
        }
        let len = LittleEndian::read_u16(&header[4..6]) as usize;
        if len == 0 || len > MAX_VALUE_SIZE {
            return None;
        }
        let mut data = [0u8; MAX_VALUE_SIZE];
        self.nvm
            .read(offset + SLOT_HEADER_SIZE, &mut data[..len])
            .ok()?;
        Some((len, data))
    }

    /// Reads the current RAM-cache value for `key` into `buf`. Returns the
    /// number of bytes copied — `0` if the key is not registered, matching
    /// the source's "invalid key returns size 0" behavior rather than an
    /// error type.
    pub fn read(&self, key: PdiKey, buf: &mut [u8]) -> usize {
        let Some(idx) = self.slot_index(key) else {
            return 0;
        };
        let slot = &self.slots[idx];
        let n = slot.len.min(buf.len());
        buf[..n].copy_from_slice(&slot.data[..n]);
        n
    }

    /// Sanitizes (if a sanitizer is registered) and commits `buf` as the new
    /// value for `key`, then invokes the write callback. Persistent entries
    /// are marked dirty for the next [`flush`](Self::flush) unless the
    /// database is degraded, in which case the write lands in RAM only.
    /// Returns the number of bytes committed — `0` if `key` is unregistered.
    pub fn write(&mut self, key: PdiKey, buf: &[u8]) -> usize {
        let Some(idx) = self.slot_index(key) else {
            return 0;
        };

        let len = buf.len().min(MAX_VALUE_SIZE);
        let mut scratch = [0u8; MAX_VALUE_SIZE];
        scratch[..len].copy_from_slice(&buf[..len]);

        let (sanitize, on_write, persistent) = {
            let slot = &self.slots[idx];
            (slot.sanitize, slot.on_write, slot.durability == Durability::Persistent)
        };

        if let Some(sanitize) = sanitize {
            sanitize(&mut scratch[..len]);
        }

        {
            let slot = &mut self.slots[idx];
            slot.data[..len].copy_from_slice(&scratch[..len]);
            slot.len = len;
            if persistent && !self.degraded {
                slot.dirty = true;
            }
        }

        ringbuf_entry!(Trace::Written(key, len));

        if let Some(on_write) = on_write {
            on_write(key);
        }

        len
    }

    pub fn exists(&self, key: PdiKey) -> bool {
        self.slot_index(key).is_some()
    }

    /// Encodes `key`'s current value as `[key:u32 LE][len:u16 LE][payload]`
    /// into `out`. Returns the number of bytes written, or `0` if `key` is
    /// unregistered or `out` is too small.
    pub fn encode(&self, key: PdiKey, out: &mut [u8]) -> usize {
        let Some(idx) = self.slot_index(key) else {
            return 0;
        };
        let slot = &self.slots[idx];
        let total = 6 + slot.len;
        if out.len() < total {
            return 0;
        }
        LittleEndian::write_u32(&mut out[0..4], key.0);
        LittleEndian::write_u16(&mut out[4..6], slot.len as u16);
        out[6..total].copy_from_slice(&slot.data[..slot.len]);
        total
    }

    /// Decodes a buffer produced by [`encode`](Self::encode) into the RAM
    /// cache of the matching registered key (NVM is untouched — a
    /// subsequent `flush` is needed to persist it for a `Persistent` key).
    pub fn decode(&mut self, wire: &[u8]) -> Result<PdiKey, PdiError> {
        if wire.len() < 6 {
            return Err(PdiError::Truncated);
        }
        let key = PdiKey(LittleEndian::read_u32(&wire[0..4]));
        let len = LittleEndian::read_u16(&wire[4..6]) as usize;
        if wire.len() < 6 + len {
            return Err(PdiError::Truncated);
        }
        if !self.exists(key) {
            return Err(PdiError::UnknownKey);
        }
        self.write(key, &wire[6..6 + len]);
        Ok(key)
    }

    /// Forces every dirty persistent entry to NVM.
    pub fn flush(&mut self) {
        if self.degraded {
            return;
        }
        for slot in self.slots.iter_mut() {
            if !slot.dirty {
                continue;
            }
            let Some(nvm_slot) = slot.nvm_slot else {
                continue;
            };
            let offset = SUPERBLOCK_SIZE + nvm_slot * SLOT_SIZE;
            let mut header = [0u8; SLOT_HEADER_SIZE as usize];
            LittleEndian::write_u32(&mut header[0..4], slot.key.0);
            LittleEndian::write_u16(&mut header[4..6], slot.len as u16);
            if self.nvm.write(offset, &header).is_ok()
                && self
                    .nvm
                    .write(offset + SLOT_HEADER_SIZE, &slot.data[..slot.len])
                    .is_ok()
            {
                slot.dirty = false;
                ringbuf_entry!(Trace::Flushed(slot.key));
            }
        }
    }

    fn bump_boot_count(&mut self) {
        let zero = 0u32.to_le_bytes();
        let _ = self.insert(keys::BOOT_COUNT, Durability::Persistent, &zero, None, None);

        let mut buf = [0u8; 4];
        let n = self.read(keys::BOOT_COUNT, &mut buf);
        let count = if n == 4 { u32::from_le_bytes(buf) } else { 0 };
        self.write(keys::BOOT_COUNT, &count.wrapping_add(1).to_le_bytes());
        self.flush();
    }

    /// Current boot count, for observability callers (§7).
    pub fn boot_count(&self) -> u32 {
        let mut buf = [0u8; 4];
        let n = self.read(keys::BOOT_COUNT, &mut buf);
        if n == 4 {
            u32::from_le_bytes(buf)
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeNvm {
        cells: HashMap<u32, u8>,
        fail_after_erases: Option<u32>,
        erases_seen: u32,
    }

    impl FakeNvm {
        fn always_ok() -> Self {
            Self::default()
        }

        fn failing_forever() -> Self {
            Self {
                fail_after_erases: Some(0),
                ..Self::default()
            }
        }
    }

    impl Nvm for FakeNvm {
        fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), ichnaea_hal::NvmError> {
            for (i, b) in buf.iter_mut().enumerate() {
                *b = *self.cells.get(&(offset + i as u32)).unwrap_or(&0xFF);
            }
            Ok(())
        }

        fn write(&mut self, offset: u32, buf: &[u8]) -> Result<(), ichnaea_hal::NvmError> {
            for (i, b) in buf.iter().enumerate() {
                self.cells.insert(offset + i as u32, *b);
            }
            Ok(())
        }

        fn erase(&mut self, offset: u32, len: u32) -> Result<(), ichnaea_hal::NvmError> {
            if let Some(limit) = self.fail_after_erases {
                if self.erases_seen >= limit {
                    return Err(ichnaea_hal::NvmError::DeviceFault);
                }
            }
            self.erases_seen += 1;
            for a in offset..offset + len {
                self.cells.insert(a, 0xFF);
            }
            Ok(())
        }
    }

    #[test]
    fn fresh_nvm_cold_starts_and_is_not_degraded() {
        let db = PdiDatabase::initialize(FakeNvm::always_ok());
        assert!(!db.is_degraded());
    }

    #[test]
    fn permanently_bad_nvm_degrades_instead_of_failing() {
        let db = PdiDatabase::initialize(FakeNvm::failing_forever());
        assert!(db.is_degraded());
    }

    #[test]
    fn boot_count_increments_across_mounts() {
        let nvm = FakeNvm::always_ok();
        let mut db = PdiDatabase::initialize(nvm);
        assert_eq!(db.boot_count(), 1);

        // Re-mount against the same backing cells (simulated by taking the
        // inner map out and handing it to a fresh FakeNvm) to exercise the
        // "already formatted" path incrementing further.
        let preserved = core::mem::replace(&mut db.nvm, FakeNvm::always_ok());
        let db2 = PdiDatabase::initialize(preserved);
        assert_eq!(db2.boot_count(), 2);
    }

    #[test]
    fn insert_is_idempotent_by_key() {
        let mut db = PdiDatabase::initialize(FakeNvm::always_ok());
        let key = keys::key("test_key");
        db.insert(key, Durability::Volatile, &[1, 2, 3], None, None)
            .unwrap();
        db.write(key, &[9, 9, 9]);
        db.insert(key, Durability::Volatile, &[1, 2, 3], None, None)
            .unwrap();

        let mut buf = [0u8; 3];
        assert_eq!(db.read(key, &mut buf), 3);
        assert_eq!(buf, [9, 9, 9], "re-insert must not clobber an existing value");
    }

    #[test]
    fn missing_key_reads_as_zero_bytes() {
        let db = PdiDatabase::initialize(FakeNvm::always_ok());
        let mut buf = [0u8; 4];
        assert_eq!(db.read(keys::key("does_not_exist"), &mut buf), 0);
    }

    #[test]
    fn write_applies_sanitize_before_commit() {
        fn clamp_to_positive(data: &mut [u8]) {
            let v = i32::from_le_bytes(data.try_into().unwrap());
            let clamped = v.max(0);
            data.copy_from_slice(&clamped.to_le_bytes());
        }

        let mut db = PdiDatabase::initialize(FakeNvm::always_ok());
        let key = keys::key("signed_value");
        db.insert(key, Durability::Volatile, &0i32.to_le_bytes(), Some(clamp_to_positive), None)
            .unwrap();
        db.write(key, &(-5i32).to_le_bytes());

        let mut buf = [0u8; 4];
        db.read(key, &mut buf);
        assert_eq!(i32::from_le_bytes(buf), 0);
    }

    #[test]
    fn on_write_callback_fires_after_commit() {
        use std::sync::atomic::{AtomicU32, Ordering};
        static CALLS: AtomicU32 = AtomicU32::new(0);
        fn bump(_key: PdiKey) {
            CALLS.fetch_add(1, Ordering::SeqCst);
        }

        let mut db = PdiDatabase::initialize(FakeNvm::always_ok());
        let key = keys::key("watched_value");
        db.insert(key, Durability::Volatile, &[0], None, Some(bump))
            .unwrap();
        let before = CALLS.load(Ordering::SeqCst);
        db.write(key, &[1]);
        assert_eq!(CALLS.load(Ordering::SeqCst), before + 1);
    }

    #[test]
    fn encode_decode_round_trips() {
        let mut db = PdiDatabase::initialize(FakeNvm::always_ok());
        let key = keys::key("roundtrip_value");
        db.insert(key, Durability::Volatile, &[1, 2, 3, 4], None, None)
            .unwrap();
        db.write(key, &[10, 20, 30, 40]);

        let mut wire = [0u8; 16];
        let n = db.encode(key, &mut wire);
        assert!(n > 0);

        db.write(key, &[0, 0, 0, 0]);
        let decoded_key = db.decode(&wire[..n]).unwrap();
        assert_eq!(decoded_key, key);

        let mut out = [0u8; 4];
        db.read(key, &mut out);
        assert_eq!(out, [10, 20, 30, 40]);
    }

    #[test]
    fn persistent_write_survives_flush_and_remount() {
        let nvm = FakeNvm::always_ok();
        let mut db = PdiDatabase::initialize(nvm);
        let key = keys::key("persisted_value");
        db.insert(key, Durability::Persistent, &0u32.to_le_bytes(), None, None)
            .unwrap();
        db.write(key, &42u32.to_le_bytes());
        db.flush();

        let preserved = core::mem::replace(&mut db.nvm, FakeNvm::always_ok());
        let mut db2 = PdiDatabase::initialize(preserved);
        db2.insert(key, Durability::Persistent, &0u32.to_le_bytes(), None, None)
            .unwrap();

        let mut buf = [0u8; 4];
        db2.read(key, &mut buf);
        assert_eq!(u32::from_le_bytes(buf), 42);
    }

    #[test]
    fn degraded_database_accepts_writes_in_ram_only() {
        let mut db = PdiDatabase::initialize(FakeNvm::failing_forever());
        assert!(db.is_degraded());

        let key = keys::key("ram_only_value");
        db.insert(key, Durability::Persistent, &0u32.to_le_bytes(), None, None)
            .unwrap();
        db.write(key, &7u32.to_le_bytes());

        let mut buf = [0u8; 4];
        db.read(key, &mut buf);
        assert_eq!(u32::from_le_bytes(buf), 7);
    }
}
