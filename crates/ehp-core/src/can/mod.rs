// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! CAN transceiver facade: translates the co-processor's ASCII line
//! protocol to/from structured CAN frames, tracks link readiness and an
//! error budget (spec.md §4.2).

use crate::hpap::{CanFrame, CanTransmit};
use crate::platform::{Log, Monotonic};

/// Bus access mode requested of, or reported by, the co-processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Normal: transmit and receive.
    Normal,
    /// Listen-only: receive only, `sendCanMessage` is a silent no-op.
    ListenOnly,
}

impl Mode {
    fn as_str(self) -> &'static str {
        match self {
            Mode::Normal => "NOR",
            Mode::ListenOnly => "LIS",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "NOR" => Some(Mode::Normal),
            "LIS" => Some(Mode::ListenOnly),
            _ => None,
        }
    }
}

/// Runtime configuration for the facade (spec.md §6).
#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub mode: Mode,
    pub bitrate: u32,
    /// Error count, across categories, that triggers an RSFP reset request.
    pub error_threshold: u32,
    /// Milliseconds of no progress before the ready watchdog fires.
    pub watchdog_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::Normal,
            bitrate: 20_000,
            error_threshold: 5,
            watchdog_ms: 30_000,
        }
    }
}

/// Per-category error counters.
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorCounters {
    pub rx: u32,
    pub tx: u32,
    pub err: u32,
}

/// A line emitted by (or to) the CAN co-processor over RSFP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Ready,
    SetupOk(String),
    SetupError(String),
    CanRx(CanFrame),
    CanTxOk(String),
    CanTxError(String),
    /// Anything that didn't parse as one of the above; caller decides
    /// whether to count it as an error.
    Unrecognised,
}

fn parse_hex_id(s: &str) -> Option<(u16, bool, bool)> {
    let raw = u32::from_str_radix(s, 16).ok()?;
    let extended = raw & (1 << 31) != 0;
    let rtr = raw & (1 << 30) != 0;
    let id = (raw & 0x7FF) as u16;
    Some((id, extended, rtr))
}

/// Parse one ASCII record received over RSFP from the co-processor.
pub fn parse_record(line: &str) -> Record {
    let mut parts = line.split_whitespace();
    match parts.next() {
        Some("READY") => Record::Ready,
        Some("SETUP") => match parts.next() {
            Some("OK") => Record::SetupOk(parts.collect::<Vec<_>>().join(" ")),
            Some(rest) if rest.starts_with('E') => {
                Record::SetupError(std::iter::once(rest).chain(parts).collect::<Vec<_>>().join(" "))
            }
            _ => Record::Unrecognised,
        },
        Some("CANRX") => {
            let id_hex = match parts.next() {
                Some(v) => v,
                None => return Record::Unrecognised,
            };
            let len: u8 = match parts.next().and_then(|v| v.parse().ok()) {
                Some(v) => v,
                None => return Record::Unrecognised,
            };
            let (id, extended, rtr) = match parse_hex_id(id_hex) {
                Some(v) => v,
                None => return Record::Unrecognised,
            };
            let mut data = [0u8; 8];
            for (i, byte_str) in parts.enumerate().take(8) {
                match u8::from_str_radix(byte_str, 16) {
                    Ok(b) => data[i] = b,
                    Err(_) => return Record::Unrecognised,
                }
            }
            Record::CanRx(CanFrame {
                id,
                extended,
                rtr,
                len: len.min(8),
                data,
            })
        }
        Some("CANTX") => match parts.next() {
            Some("OK") => Record::CanTxOk(parts.collect::<Vec<_>>().join(" ")),
            Some(rest) if rest.starts_with('E') => {
                Record::CanTxError(std::iter::once(rest).chain(parts).collect::<Vec<_>>().join(" "))
            }
            _ => Record::Unrecognised,
        },
        _ => Record::Unrecognised,
    }
}

/// Render an outbound `SETUP <bitrate-hex> <mode>` record.
pub fn format_setup(bitrate: u32, mode: Mode) -> String {
    format!("SETUP {:X} {}", bitrate, mode.as_str())
}

/// Render an outbound `CANTX <id-hex> <len> <bytes...>` record.
pub fn format_cantx(frame: &CanFrame) -> String {
    let mut id = frame.id as u32 & 0x7FF;
    if frame.extended {
        id |= 1 << 31;
    }
    if frame.rtr {
        id |= 1 << 30;
    }
    let mut s = format!("CANTX {:X} {}", id, frame.len);
    for b in &frame.data[..frame.len as usize] {
        s.push(' ');
        s.push_str(&format!("{:02X}", b));
    }
    s
}

/// Translates the co-processor's line protocol to/from CAN frames and
/// tracks readiness. The gateway sends `SETUP` in reply to `READY` and
/// expects `SETUP OK` before it is considered ready.
pub struct Facade {
    config: Config,
    ready: bool,
    listen_only_pin_asserted: bool,
    errors: ErrorCounters,
    last_progress: Monotonic,
    reset_requested: bool,
}

impl Facade {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            ready: false,
            listen_only_pin_asserted: false,
            errors: ErrorCounters::default(),
            last_progress: 0,
            reset_requested: false,
        }
    }

    pub fn ready(&self) -> bool {
        self.ready
    }

    pub fn errors(&self) -> ErrorCounters {
        self.errors
    }

    /// Set the hardware listen-only override pin. While asserted the
    /// effective mode is always `ListenOnly`, regardless of configuration.
    pub fn set_listen_only_pin(&mut self, asserted: bool) {
        self.listen_only_pin_asserted = asserted;
    }

    fn effective_mode(&self) -> Mode {
        if self.listen_only_pin_asserted {
            Mode::ListenOnly
        } else {
            self.config.mode
        }
    }

    /// Whether an RSFP reset was requested by an error-budget breach since
    /// the last call; clears the flag.
    pub fn take_reset_requested(&mut self) -> bool {
        std::mem::replace(&mut self.reset_requested, false)
    }

    fn note_progress(&mut self, now: Monotonic) {
        self.last_progress = now;
    }

    fn bump_error(&mut self, now: Monotonic, log: &mut impl Log) {
        self.errors.err += 1;
        self.note_progress(now);
        if self.errors.err > self.config.error_threshold {
            log.warn("can: error threshold exceeded, requesting RSFP reset");
            self.reset_requested = true;
            self.ready = false;
        }
    }

    /// Feed one RSFP-delivered ASCII record (without CRLF) from the
    /// co-processor. Returns a `CANTX`/`SETUP` reply line to send back over
    /// RSFP, if any, and — for `CANRX` — the decoded frame.
    pub fn on_record(
        &mut self,
        line: &str,
        now: Monotonic,
        log: &mut impl Log,
    ) -> (Option<String>, Option<CanFrame>) {
        match parse_record(line) {
            Record::Ready => {
                self.note_progress(now);
                log.info("can: co-processor ready, sending setup");
                (
                    Some(format_setup(self.config.bitrate, self.effective_mode())),
                    None,
                )
            }
            Record::SetupOk(_) => {
                self.ready = true;
                self.errors = ErrorCounters::default();
                self.note_progress(now);
                log.info("can: setup acknowledged, link ready");
                (None, None)
            }
            Record::SetupError(_) => {
                self.ready = false;
                self.bump_error(now, log);
                (None, None)
            }
            Record::CanRx(frame) => {
                self.errors.rx += 1;
                self.note_progress(now);
                (None, Some(frame))
            }
            Record::CanTxOk(_) => {
                self.errors.tx += 1;
                self.note_progress(now);
                (None, None)
            }
            Record::CanTxError(_) => {
                self.bump_error(now, log);
                (None, None)
            }
            Record::Unrecognised => {
                self.bump_error(now, log);
                (None, None)
            }
        }
    }

    /// Ready watchdog: call periodically. Drops readiness if no progress
    /// has been observed within `watchdog_ms`.
    pub fn poll_watchdog(&mut self, now: Monotonic, log: &mut impl Log) {
        if self.ready && now.saturating_sub(self.last_progress) > self.config.watchdog_ms {
            log.warn("can: watchdog expired, link no longer ready");
            self.ready = false;
        }
    }
}

impl CanTransmit for Facade {
    fn ready(&self) -> bool {
        self.ready
    }

    /// `sendCanMessage` in listen-only mode drops silently: a safety
    /// property, not an error (spec.md §4.2).
    fn transmit(&mut self, _frame: CanFrame) -> bool {
        if self.effective_mode() == Mode::ListenOnly {
            return false;
        }
        true
    }
}
