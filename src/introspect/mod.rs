//! Mutex-guarded read-only view of emulator state, rendered as JSON
//! documents for the four HTTP topics.
//!
//! Grounded on `DebugInfoProvider` (see `original_source/src/debugger/
//! DebugInfoProvider.cc`): one provider-wide mutex, one document per
//! topic, `timestamp`/`status` preamble on every document, side-effect-free
//! memory peeks.

mod view;

pub use view::{CpuRegisters, EmulatorView, MachineStatus, SlotInfo, TextScreen};

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Value, json};

/// Clamp `(start, size)` so `start <= 0xFFFF` and `start + size <= 0x10000`.
/// Used by both `IntrospectionProvider::memory_info` and `HttpConnection`'s
/// query-parameter handling.
#[must_use]
pub fn clamp_memory_range(start: u32, size: u32) -> (u16, u16) {
    let start = start.min(0xFFFF);
    let max_size = 0x10000 - start;
    let size = size.min(0x10000).min(max_size);
    (start as u16, size as u16)
}

fn timestamp_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

fn hex8(v: u8) -> String {
    format!("{v:02X}")
}

fn hex16(v: u16) -> String {
    format!("{v:04X}")
}

/// Guards access to an `EmulatorView` with a single coarse mutex. Coarse is
/// fine: introspection is low-frequency relative to emulation, and the
/// emulator is not assumed thread-safe for anything but peeks.
pub struct IntrospectionProvider {
    machine: Mutex<Box<dyn EmulatorView>>,
}

impl IntrospectionProvider {
    #[must_use]
    pub fn new(machine: Box<dyn EmulatorView>) -> Self {
        Self {
            machine: Mutex::new(machine),
        }
    }

    /// Run `f` against the guarded view. Used by callers (the push
    /// connection's welcome snapshot, the formatter-driven endpoints)
    /// that need `&dyn EmulatorView` rather than a rendered JSON document.
    pub fn with_view<R>(&self, f: impl FnOnce(&dyn EmulatorView) -> R) -> R {
        let machine = self.machine.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        f(machine.as_ref())
    }

    fn no_machine_doc() -> Value {
        json!({
            "timestamp": timestamp_ms() as u64,
            "status": MachineStatus::NoMachine.as_str(),
            "message": "No machine loaded",
        })
    }

    #[must_use]
    pub fn machine_info(&self) -> String {
        let machine = self.machine.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if machine.status() == MachineStatus::NoMachine {
            return Self::no_machine_doc().to_string();
        }

        let slots = machine.slots();
        let slot_pages: Value = slots
            .iter()
            .map(|s| {
                let mut entry = json!({
                    "address": hex16(u16::from(s.page) * 0x4000),
                    "primary": s.primary,
                    "secondary": s.secondary.map_or(-1, i32::from),
                    "expanded": s.expanded,
                });
                if let Some(device) = &s.device {
                    entry["device"] = json!(device);
                }
                (format!("page{}", s.page), entry)
            })
            .collect::<serde_json::Map<_, _>>()
            .into();

        json!({
            "timestamp": timestamp_ms() as u64,
            "status": machine.status().as_str(),
            "machine_id": machine.machine_id(),
            "machine_name": machine.machine_name(),
            "machine_type": machine.machine_type(),
            "slots": slot_pages,
            "extensions": machine.extensions(),
            "cpu_type": machine.cpu_type(),
        })
        .to_string()
    }

    #[must_use]
    pub fn io_info(&self) -> String {
        let machine = self.machine.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if machine.status() == MachineStatus::NoMachine {
            return Self::no_machine_doc().to_string();
        }

        let slots = machine.slots();
        let primary: Value = slots
            .iter()
            .map(|s| (format!("page{}", s.page), json!(s.primary)))
            .collect::<serde_json::Map<_, _>>()
            .into();
        let secondary: Value = slots
            .iter()
            .map(|s| {
                (
                    format!("page{}", s.page),
                    json!(s.secondary.map_or(-1, i32::from)),
                )
            })
            .collect::<serde_json::Map<_, _>>()
            .into();
        let expanded: Vec<bool> = slots.iter().map(|s| s.expanded).collect();

        json!({
            "timestamp": timestamp_ms() as u64,
            "status": machine.status().as_str(),
            "primary_slots": primary,
            "secondary_slots": secondary,
            "expanded": expanded,
        })
        .to_string()
    }

    #[must_use]
    pub fn cpu_info(&self) -> String {
        let machine = self.machine.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if machine.status() == MachineStatus::NoMachine {
            return Self::no_machine_doc().to_string();
        }

        let regs = machine.registers();
        json!({
            "timestamp": timestamp_ms() as u64,
            "status": machine.status().as_str(),
            "registers": {
                "af": hex16(regs.af), "bc": hex16(regs.bc),
                "de": hex16(regs.de), "hl": hex16(regs.hl),
                "af2": hex16(regs.af2), "bc2": hex16(regs.bc2),
                "de2": hex16(regs.de2), "hl2": hex16(regs.hl2),
                "ix": hex16(regs.ix), "iy": hex16(regs.iy),
                "sp": hex16(regs.sp), "pc": hex16(regs.pc),
                "i": hex8(regs.i), "r": hex8(regs.r),
            },
            "registers_8bit": {
                "a": hex8(regs.a()), "f": hex8(regs.f()),
                "b": hex8(regs.b()), "c": hex8(regs.c()),
                "d": hex8(regs.d()), "e": hex8(regs.e()),
                "h": hex8(regs.h()), "l": hex8(regs.l()),
            },
            "flags": {
                "s": regs.f() & 0x80 != 0,
                "z": regs.f() & 0x40 != 0,
                "f5": regs.f() & 0x20 != 0,
                "h": regs.f() & 0x10 != 0,
                "f3": regs.f() & 0x08 != 0,
                "pv": regs.f() & 0x04 != 0,
                "n": regs.f() & 0x02 != 0,
                "c": regs.f() & 0x01 != 0,
            },
            "interrupts": {
                "iff1": regs.iff1, "iff2": regs.iff2,
                "im": regs.im, "halted": regs.halted,
            },
            "cpu_type": machine.cpu_type(),
        })
        .to_string()
    }

    #[must_use]
    pub fn memory_info(&self, start: u32, size: u32) -> String {
        let (start, size) = clamp_memory_range(start, size);
        let machine = self.machine.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if machine.status() == MachineStatus::NoMachine {
            let mut doc = Self::no_machine_doc();
            doc["start"] = json!(hex16(start));
            doc["size"] = json!(size);
            return doc.to_string();
        }

        let bytes = machine.peek_memory(start, usize::from(size));
        let data: String = bytes.iter().map(|b| hex8(*b)).collect();

        let first_page = start / 0x4000;
        let last_addr = start.saturating_add(size.saturating_sub(1)).min(0xFFFF);
        let last_page = (last_addr / 0x4000).min(3);
        let slots = machine.slots();
        let slot_info: Vec<Value> = slots
            .iter()
            .filter(|s| u32::from(s.page) >= u32::from(first_page) && u32::from(s.page) <= u32::from(last_page))
            .map(|s| {
                json!({
                    "page": s.page,
                    "address": hex16(u16::from(s.page) * 0x4000),
                    "primary": s.primary,
                    "secondary": s.secondary.map_or(-1, i32::from),
                })
            })
            .collect();

        json!({
            "timestamp": timestamp_ms() as u64,
            "status": machine.status().as_str(),
            "start": hex16(start),
            "size": size,
            "data": data,
            "slot_info": slot_info,
        })
        .to_string()
    }
}
