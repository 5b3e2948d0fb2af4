//! A fake `EmulatorView` used by unit and integration tests, and by the
//! demo binary. Not part of the public contract a real integration needs
//! to satisfy — just a fixture.

use crate::introspect::{CpuRegisters, EmulatorView, MachineStatus, SlotInfo, TextScreen};

/// A small, deterministic machine: 4 unexpanded slots, no extensions, a
/// register file set by the caller, and an optional canned text screen.
pub struct FakeMachine {
    status: MachineStatus,
    registers: CpuRegisters,
    slots: [SlotInfo; 4],
    extensions: Vec<String>,
    memory: Vec<u8>,
    text_screen: Option<TextScreen>,
}

impl FakeMachine {
    #[must_use]
    pub fn absent() -> Self {
        Self {
            status: MachineStatus::NoMachine,
            ..Self::running_default()
        }
    }

    #[must_use]
    pub fn running_default() -> Self {
        Self {
            status: MachineStatus::Running,
            registers: CpuRegisters::default(),
            slots: [0u8, 1, 2, 3].map(|page| SlotInfo {
                page,
                primary: 0,
                secondary: None,
                expanded: false,
                device: None,
            }),
            extensions: Vec::new(),
            memory: vec![0; 0x10000],
            text_screen: None,
        }
    }

    #[must_use]
    pub fn powered_off() -> Self {
        Self {
            status: MachineStatus::PoweredOff,
            ..Self::running_default()
        }
    }

    #[must_use]
    pub fn with_registers(mut self, registers: CpuRegisters) -> Self {
        self.registers = registers;
        self
    }

    #[must_use]
    pub fn with_extension(mut self, name: impl Into<String>) -> Self {
        self.extensions.push(name.into());
        self
    }

    #[must_use]
    pub fn with_memory_byte(mut self, addr: u16, value: u8) -> Self {
        self.memory[usize::from(addr)] = value;
        self
    }

    #[must_use]
    pub fn with_slot(mut self, page: u8, primary: i8, secondary: Option<i8>, expanded: bool) -> Self {
        self.slots[usize::from(page)] = SlotInfo {
            page,
            primary,
            secondary,
            expanded,
            device: None,
        };
        self
    }

    #[must_use]
    pub fn with_text_screen(mut self, screen: TextScreen) -> Self {
        self.text_screen = Some(screen);
        self
    }
}

impl EmulatorView for FakeMachine {
    fn status(&self) -> MachineStatus {
        self.status
    }

    fn machine_id(&self) -> String {
        "fake".to_string()
    }

    fn machine_name(&self) -> String {
        "Fake Machine".to_string()
    }

    fn machine_type(&self) -> String {
        "msx2".to_string()
    }

    fn cpu_type(&self) -> &'static str {
        "Z80"
    }

    fn extensions(&self) -> Vec<String> {
        self.extensions.clone()
    }

    fn registers(&self) -> CpuRegisters {
        self.registers
    }

    fn slots(&self) -> [SlotInfo; 4] {
        self.slots.clone()
    }

    fn peek_memory(&self, addr: u16, len: usize) -> Vec<u8> {
        let start = usize::from(addr);
        let end = (start + len).min(self.memory.len());
        self.memory[start..end].to_vec()
    }

    fn text_screen(&self) -> Option<TextScreen> {
        self.text_screen.clone()
    }
}
