//! `JsonLineFormatter` — the JSON-Lines wire protocol used by the push
//! stream and by SSE frames.
//!
//! Grounded on `DebugStreamFormatter` (see `original_source/src/debugger/
//! DebugStreamFormatter.cc`): one line per fact, fixed key order
//! `emu,cat,sec,fld,val` then extras in call-site order, hex values
//! uppercase and zero-padded. Unlike the source this is ported from, extras
//! here are an ordered `Vec`, not a sorted map — the wire contract pins key
//! order to how each method builds its extras, not to alphabetical order.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::introspect::{CpuRegisters, EmulatorView, MachineStatus};

const PROTOCOL_VERSION: &str = "1.0";

/// Knobs that change which lines `full_snapshot` emits, without changing
/// the format of any individual line.
#[derive(Debug, Clone, Copy)]
pub struct FormatterOptions {
    /// Emit `mach/video/mode` and the 24 `mem/text/row` lines when the
    /// view reports a text-mode screen. Left on by default: a dashboard
    /// with no video support just never supplies a `TextScreen`.
    pub include_video_text: bool,
}

impl Default for FormatterOptions {
    fn default() -> Self {
        Self {
            include_video_text: true,
        }
    }
}

fn timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn escape_json(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

fn hex8(v: u8) -> String {
    format!("{v:02X}")
}

fn hex16(v: u16) -> String {
    format!("{v:04X}")
}

/// Builds JSON-Lines wire-format strings. Stateless aside from the `emu`
/// identifier and a couple of rendering options; cheap to construct, safe
/// to share across connections (it holds no machine reference).
#[derive(Debug, Clone)]
pub struct JsonLineFormatter {
    emu_id: String,
    product: String,
    options: FormatterOptions,
}

impl JsonLineFormatter {
    #[must_use]
    pub fn new(emu_id: impl Into<String>) -> Self {
        Self::with_options(emu_id, FormatterOptions::default())
    }

    #[must_use]
    pub fn with_options(emu_id: impl Into<String>, options: FormatterOptions) -> Self {
        Self {
            emu_id: emu_id.into(),
            product: "msx-debug-stream".to_string(),
            options,
        }
    }

    fn line(&self, cat: &str, sec: &str, fld: &str, val: &str, extra: &[(&str, String)]) -> String {
        let mut json = String::with_capacity(64 + 16 * extra.len());
        json.push_str("{\"emu\":\"");
        json.push_str(&escape_json(&self.emu_id));
        json.push_str("\",\"cat\":\"");
        json.push_str(cat);
        json.push_str("\",\"sec\":\"");
        json.push_str(sec);
        json.push_str("\",\"fld\":\"");
        json.push_str(fld);
        json.push_str("\",\"val\":\"");
        json.push_str(&escape_json(val));
        json.push('"');
        for (key, value) in extra {
            json.push_str(",\"");
            json.push_str(key);
            json.push_str("\":\"");
            json.push_str(&escape_json(value));
            json.push('"');
        }
        json.push('}');
        json
    }

    // ---- System messages (cat: sys) ----------------------------------

    #[must_use]
    pub fn hello(&self) -> String {
        let val = format!("{} {}", self.product, PROTOCOL_VERSION);
        self.line(
            "sys",
            "conn",
            "hello",
            &val,
            &[("ver", PROTOCOL_VERSION.to_string()), ("ts", timestamp_ms().to_string())],
        )
    }

    #[must_use]
    pub fn goodbye(&self) -> String {
        self.line("sys", "conn", "goodbye", "disconnecting", &[("ts", timestamp_ms().to_string())])
    }

    // ---- Full state snapshot ------------------------------------------

    /// Emits, in a fixed order, every line a fresh client needs to build a
    /// complete picture of machine/CPU/memory state. See the module
    /// doc on key ordering: this order is part of the wire contract.
    #[must_use]
    pub fn full_snapshot(&self, view: &dyn EmulatorView) -> Vec<String> {
        let mut lines = Vec::new();
        lines.push(self.line("sys", "info", "timestamp", &timestamp_ms().to_string(), &[]));

        if view.status() == MachineStatus::NoMachine {
            lines.push(self.line("mach", "info", "status", "no_machine", &[]));
            return lines;
        }

        lines.push(self.line("mach", "info", "id", &view.machine_id(), &[]));
        lines.push(self.line("mach", "info", "name", &view.machine_name(), &[]));
        lines.push(self.line("mach", "info", "type", &view.machine_type(), &[]));
        lines.push(self.line("mach", "info", "status", view.status().as_str(), &[]));

        let extensions = view.extensions();
        for (idx, ext) in extensions.iter().enumerate() {
            lines.push(self.line("mach", "ext", &idx.to_string(), ext, &[]));
        }
        lines.push(self.line("mach", "ext", "count", &extensions.len().to_string(), &[]));

        lines.push(self.line("cpu", "info", "type", view.cpu_type(), &[]));

        let regs = view.registers();
        lines.extend(self.cpu_register_lines(&regs));
        lines.extend(self.cpu_register8_lines(&regs));
        lines.push(self.cpu_flags_all(&regs));
        lines.extend(self.cpu_flag_lines(&regs));
        lines.push(self.line("cpu", "int", "iff1", if regs.iff1 { "1" } else { "0" }, &[]));
        lines.push(self.line("cpu", "int", "iff2", if regs.iff2 { "1" } else { "0" }, &[]));
        lines.push(self.line("cpu", "int", "im", &regs.im.to_string(), &[]));
        lines.push(self.line("cpu", "int", "halt", if regs.halted { "1" } else { "0" }, &[]));

        let slots = view.slots();
        for slot in &slots {
            let mut val = slot.primary.to_string();
            if let Some(secondary) = slot.secondary {
                val.push('-');
                val.push_str(&secondary.to_string());
            }
            let mut extra = vec![
                ("addr", hex16(u16::from(slot.page) * 0x4000)),
                ("expanded", if slot.expanded { "1".to_string() } else { "0".to_string() }),
            ];
            if let Some(device) = &slot.device {
                extra.push(("device", device.clone()));
            }
            lines.push(self.line("mem", "slot", &format!("page{}", slot.page), &val, &extra));
        }
        for slot in &slots {
            lines.push(self.line(
                "mem",
                "expanded",
                &format!("slot{}", slot.page),
                if slot.expanded { "1" } else { "0" },
                &[],
            ));
        }

        if self.options.include_video_text {
            if let Some(screen) = view.text_screen() {
                lines.push(self.line(
                    "mach",
                    "video",
                    "mode",
                    screen.mode_name,
                    &[("text_support", "1".to_string()), ("base", hex8(screen.base))],
                ));
                for (idx, row) in screen.rows.iter().enumerate() {
                    lines.push(self.line(
                        "mem",
                        "text",
                        "row",
                        row,
                        &[("idx", idx.to_string()), ("addr", hex16((idx * screen.columns) as u16))],
                    ));
                }
            }
        }

        lines
    }

    fn cpu_register_lines(&self, regs: &CpuRegisters) -> Vec<String> {
        [
            ("af", regs.af),
            ("bc", regs.bc),
            ("de", regs.de),
            ("hl", regs.hl),
            ("af2", regs.af2),
            ("bc2", regs.bc2),
            ("de2", regs.de2),
            ("hl2", regs.hl2),
            ("ix", regs.ix),
            ("iy", regs.iy),
            ("sp", regs.sp),
            ("pc", regs.pc),
        ]
        .into_iter()
        .map(|(fld, v)| self.line("cpu", "reg", fld, &hex16(v), &[]))
        .chain(["i", "r"].into_iter().zip([regs.i, regs.r]).map(|(fld, v)| self.line("cpu", "reg", fld, &hex8(v), &[])))
        .collect()
    }

    fn cpu_register8_lines(&self, regs: &CpuRegisters) -> Vec<String> {
        [
            ("a", regs.a()),
            ("f", regs.f()),
            ("b", regs.b()),
            ("c", regs.c()),
            ("d", regs.d()),
            ("e", regs.e()),
            ("h", regs.h()),
            ("l", regs.l()),
        ]
        .into_iter()
        .map(|(fld, v)| self.line("cpu", "reg8", fld, &hex8(v), &[]))
        .collect()
    }

    fn cpu_flags_all(&self, regs: &CpuRegisters) -> String {
        let f = regs.f();
        let mnemonic: String = [
            (0x80, 'S'),
            (0x40, 'Z'),
            (0x20, '5'),
            (0x10, 'H'),
            (0x08, '3'),
            (0x04, 'P'),
            (0x02, 'N'),
            (0x01, 'C'),
        ]
        .into_iter()
        .map(|(mask, ch)| if f & mask != 0 { ch } else { '-' })
        .collect();
        self.line("cpu", "flags", "all", &mnemonic, &[("raw", hex8(f))])
    }

    fn cpu_flag_lines(&self, regs: &CpuRegisters) -> Vec<String> {
        let f = regs.f();
        [("s", 0x80), ("z", 0x40), ("h", 0x10), ("pv", 0x04), ("n", 0x02), ("c", 0x01)]
            .into_iter()
            .map(|(fld, mask)| self.line("cpu", "flag", fld, if f & mask != 0 { "1" } else { "0" }, &[]))
            .collect()
    }

    // ---- Streaming events ----------------------------------------------

    #[must_use]
    pub fn register_update(&self, reg: &str, value: u16) -> String {
        self.line("cpu", "reg", reg, &hex16(value), &[("ts", timestamp_ms().to_string())])
    }

    #[must_use]
    pub fn register8_update(&self, reg: &str, value: u8) -> String {
        self.line("cpu", "reg", reg, &hex8(value), &[("ts", timestamp_ms().to_string())])
    }

    #[must_use]
    pub fn flag_update(&self, flag: &str, value: bool) -> String {
        self.line("cpu", "flag", flag, if value { "1" } else { "0" }, &[("ts", timestamp_ms().to_string())])
    }

    #[must_use]
    pub fn memory_read(&self, addr: u16, value: u8) -> String {
        self.line(
            "mem",
            "read",
            "byte",
            &hex8(value),
            &[("addr", hex16(addr)), ("ts", timestamp_ms().to_string())],
        )
    }

    #[must_use]
    pub fn memory_write(&self, addr: u16, value: u8) -> String {
        self.line(
            "mem",
            "write",
            "byte",
            &hex8(value),
            &[("addr", hex16(addr)), ("ts", timestamp_ms().to_string())],
        )
    }

    #[must_use]
    pub fn io_port_read(&self, port: u8, value: u8) -> String {
        self.line(
            "io",
            "port",
            "read",
            &hex8(value),
            &[("addr", hex8(port)), ("ts", timestamp_ms().to_string())],
        )
    }

    #[must_use]
    pub fn io_port_write(&self, port: u8, value: u8) -> String {
        self.line(
            "io",
            "port",
            "write",
            &hex8(value),
            &[("addr", hex8(port)), ("ts", timestamp_ms().to_string())],
        )
    }

    /// All registers collapsed into one space-separated value, the form
    /// `TraceWorker` broadcasts alongside each `dbg/trace/exec` line.
    #[must_use]
    pub fn cpu_reg_all(&self, regs: &CpuRegisters) -> String {
        let val = format!(
            "AF={} BC={} DE={} HL={} IX={} IY={} SP={} PC={}",
            hex16(regs.af),
            hex16(regs.bc),
            hex16(regs.de),
            hex16(regs.hl),
            hex16(regs.ix),
            hex16(regs.iy),
            hex16(regs.sp),
            hex16(regs.pc),
        );
        self.line("cpu", "reg", "all", &val, &[("ts", timestamp_ms().to_string())])
    }

    #[must_use]
    pub fn trace_exec(&self, addr: u16, disasm: &str) -> String {
        self.line("dbg", "trace", "exec", disasm, &[("addr", hex16(addr)), ("ts", timestamp_ms().to_string())])
    }

    #[must_use]
    pub fn breakpoint_hit(&self, index: usize, addr: u16) -> String {
        self.line(
            "dbg",
            "bp",
            "hit",
            &index.to_string(),
            &[("addr", hex16(addr)), ("ts", timestamp_ms().to_string())],
        )
    }

    #[must_use]
    pub fn watchpoint_hit(&self, index: usize, addr: u16, kind: &str) -> String {
        self.line(
            "dbg",
            "wp",
            "hit",
            &index.to_string(),
            &[("addr", hex16(addr)), ("type", kind.to_string()), ("ts", timestamp_ms().to_string())],
        )
    }
}
