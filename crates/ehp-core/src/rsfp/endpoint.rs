// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The RSFP endpoint state machine (spec.md §4.1, §5, §7, §8).
//!
//! Mirrors the shape of `hdds_micro::transport::hc12::framing::FrameDecoder`
//! (byte-fed decoder state) combined with an explicit tagged per-slot
//! variant for the transmit window, per spec.md §9's redesign note:
//! "State-machine state stored implicitly across fields ... becomes an
//! explicit tagged variant `{Acked, Unacked, Sent{deadline, retries}}`."

use super::frame::{self, err_arg, op, Frame, LineError, MAX_FRAME_SIZE, SEQ_SPACE};
use crate::error::{Error, Result};
use crate::platform::{Log, Monotonic, SerialPort};

/// Number of slots in the retransmission window.
pub const WINDOW_SIZE: usize = 6;

/// Default per-frame acknowledgement timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 2_000;

/// Default retransmission budget per slot.
pub const DEFAULT_RESEND_LIMIT: u8 = 4;

/// Runtime configuration for an [`Endpoint`] (spec.md §6).
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Milliseconds to wait for an ack before retransmitting.
    pub timeout_ms: u64,
    /// Number of retransmissions attempted before giving up.
    pub resend_limit: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            resend_limit: DEFAULT_RESEND_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SlotPhase {
    Acked,
    Unacked,
    Sent { deadline: Monotonic, retries: u8 },
}

#[derive(Debug, Clone)]
struct Slot {
    seq: u8,
    payload: Vec<u8>,
    phase: SlotPhase,
}

impl Slot {
    const fn empty() -> Self {
        Self {
            seq: 0,
            payload: Vec::new(),
            phase: SlotPhase::Acked,
        }
    }
}

/// One direction-pair of the reliable serial framing protocol.
///
/// Owns both the transmit window (ring of [`WINDOW_SIZE`] slots) and the
/// receive line-assembly buffer. A single `Endpoint` talks to exactly one
/// peer over one [`SerialPort`].
pub struct Endpoint {
    config: Config,

    // --- transmit side ---
    slots: [Slot; WINDOW_SIZE],
    last_index: usize,
    first_unacked_index: usize,
    occupancy: u8,
    next_tx_seq: u8,
    timeout_enabled: bool,

    // --- receive side ---
    rx_buf: Vec<u8>,
    next_rx_seq: u8,
    last_ack_sent: Option<u8>,
}

impl Endpoint {
    /// Construct a fresh endpoint in the same state [`Endpoint::reset`] puts
    /// an existing one in.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            slots: [
                Slot::empty(),
                Slot::empty(),
                Slot::empty(),
                Slot::empty(),
                Slot::empty(),
                Slot::empty(),
            ],
            last_index: 0,
            first_unacked_index: 0,
            occupancy: 0,
            next_tx_seq: SEQ_SPACE - 1,
            timeout_enabled: true,
            rx_buf: Vec::with_capacity(MAX_FRAME_SIZE),
            next_rx_seq: 0,
            last_ack_sent: None,
        }
    }

    /// Flush both buffers, zero all slots and reset sequence counters.
    /// Called on startup and on CAN-transceiver error-threshold recovery
    /// (spec.md §4.2).
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            *slot = Slot::empty();
        }
        self.last_index = 0;
        self.first_unacked_index = 0;
        self.occupancy = 0;
        self.next_tx_seq = SEQ_SPACE - 1;
        self.rx_buf.clear();
        self.next_rx_seq = 0;
        self.last_ack_sent = None;
    }

    /// Whether the transmit window has a free slot.
    pub fn can_queue(&self) -> bool {
        (self.occupancy as usize) < WINDOW_SIZE
    }

    /// Number of slots currently outstanding (unacked or in flight).
    pub fn occupancy(&self) -> u8 {
        self.occupancy
    }

    /// Enqueue a payload for transmission. Assigns the next sequence
    /// number, writes the slot and — if the window was empty — transmits
    /// immediately.
    pub fn queue<S: SerialPort>(
        &mut self,
        payload: &[u8],
        now: Monotonic,
        serial: &mut S,
    ) -> Result<()> {
        if !self.can_queue() {
            return Err(Error::QueueFull);
        }
        let idx = if self.occupancy == 0 {
            self.first_unacked_index
        } else {
            (self.last_index + 1) % WINDOW_SIZE
        };

        self.next_tx_seq = (self.next_tx_seq + 1) % SEQ_SPACE;
        let seq = self.next_tx_seq;

        let was_empty = self.occupancy == 0;
        self.slots[idx] = Slot {
            seq,
            payload: payload.to_vec(),
            phase: SlotPhase::Unacked,
        };
        self.last_index = idx;
        if was_empty {
            self.first_unacked_index = idx;
        }
        self.occupancy += 1;

        if was_empty {
            self.transmit_slot(idx, now, serial);
        }
        Ok(())
    }

    fn transmit_slot<S: SerialPort>(&mut self, idx: usize, now: Monotonic, serial: &mut S) {
        let mut buf = Vec::with_capacity(MAX_FRAME_SIZE);
        let slot = &self.slots[idx];
        // encode_data() cannot fail here: payload length was already bounds
        // checked by the caller that queued it.
        let _ = frame::encode_data(slot.seq, &slot.payload, &mut buf);
        serial.write(&buf);
        self.slots[idx].phase = SlotPhase::Sent {
            deadline: now + self.config.timeout_ms,
            retries: self.config.resend_limit,
        };
    }

    /// Advance the head of the window after it was acked: mark it `Acked`,
    /// free the slot and, if the new head was already queued (`Unacked`),
    /// transmit it now (`window head & idle` transition).
    fn advance_head<S: SerialPort>(&mut self, now: Monotonic, serial: &mut S) {
        self.slots[self.first_unacked_index] = Slot::empty();
        self.occupancy -= 1;
        if self.occupancy > 0 {
            self.first_unacked_index = (self.first_unacked_index + 1) % WINDOW_SIZE;
            if self.slots[self.first_unacked_index].phase == SlotPhase::Unacked {
                self.transmit_slot(self.first_unacked_index, now, serial);
            }
        }
    }

    /// Apply an incoming ack with wire value `s`; acknowledges the slot
    /// whose sequence is `s - 1 mod SEQ_SPACE`. Stale acks are ignored.
    fn on_ack<S: SerialPort>(&mut self, s: u8, now: Monotonic, serial: &mut S) {
        if self.occupancy == 0 {
            return;
        }
        let target_seq = (s + SEQ_SPACE - 1) % SEQ_SPACE;
        let head = &self.slots[self.first_unacked_index];
        if head.seq == target_seq && matches!(head.phase, SlotPhase::Sent { .. }) {
            self.advance_head(now, serial);
        }
    }

    /// Enable or disable the timeout/retransmission branch, as instructed
    /// by the peer's `#T+`/`#T-` control frame.
    pub fn set_timeout_enabled(&mut self, enabled: bool) {
        self.timeout_enabled = enabled;
    }

    /// Whether retransmission on timeout is currently enabled.
    pub fn timeout_enabled(&self) -> bool {
        self.timeout_enabled
    }

    /// Drive the transmit-side timeout branch. Call periodically (e.g. once
    /// per maintenance tick) with the current monotonic time.
    pub fn poll_timeout<S: SerialPort>(
        &mut self,
        now: Monotonic,
        serial: &mut S,
        log: &mut impl Log,
    ) {
        if !self.timeout_enabled || self.occupancy == 0 {
            return;
        }
        let idx = self.first_unacked_index;
        let (deadline, retries) = match self.slots[idx].phase {
            SlotPhase::Sent { deadline, retries } => (deadline, retries),
            _ => return,
        };
        if now < deadline {
            return;
        }
        if retries > 0 {
            let mut buf = Vec::with_capacity(MAX_FRAME_SIZE);
            let slot = &self.slots[idx];
            let _ = frame::encode_data(slot.seq, &slot.payload, &mut buf);
            serial.write(&buf);
            self.slots[idx].phase = SlotPhase::Sent {
                deadline: now + self.config.timeout_ms,
                retries: retries - 1,
            };
        } else {
            let mut buf = Vec::with_capacity(8);
            frame::encode_control(op::ERROR, err_arg::RETRY_GIVEUP, &mut buf);
            serial.write(&buf);
            log.warn("rsfp: retransmission budget exhausted, giving up on slot locally");
            self.advance_head(now, serial);
        }
    }

    fn send_ack<S: SerialPort>(&mut self, serial: &mut S) {
        let ack_value = frame::seq_to_char(self.next_rx_seq);
        self.last_ack_sent = Some(ack_value);
        let mut buf = Vec::with_capacity(8);
        frame::encode_control(op::ACK, ack_value, &mut buf);
        serial.write(&buf);
    }

    fn resend_last_ack<S: SerialPort>(&mut self, serial: &mut S) {
        if let Some(ack_value) = self.last_ack_sent {
            let mut buf = Vec::with_capacity(8);
            frame::encode_control(op::ACK, ack_value, &mut buf);
            serial.write(&buf);
        }
    }

    /// Feed one received byte into the line-assembly buffer. Returns the
    /// delivered payload if this byte completed a newly-accepted data
    /// frame (duplicates and control frames never produce a delivery).
    pub fn feed<S: SerialPort>(
        &mut self,
        byte: u8,
        now: Monotonic,
        serial: &mut S,
        log: &mut impl Log,
    ) -> Option<Vec<u8>> {
        if self.rx_buf.len() >= MAX_FRAME_SIZE {
            self.emit_error(err_arg::BAD_FRAMING, serial, log, "rsfp: line buffer overflow");
            self.rx_buf.clear();
        }
        self.rx_buf.push(byte);
        if byte != b'\n' {
            return None;
        }

        let has_cr = self.rx_buf.len() >= 2 && self.rx_buf[self.rx_buf.len() - 2] == b'\r';
        let line_end = if has_cr {
            self.rx_buf.len() - 2
        } else {
            self.rx_buf.len() - 1
        };
        let line = std::mem::take(&mut self.rx_buf);
        let result = if !has_cr || line_end == 0 {
            self.emit_error(err_arg::BAD_FRAMING, serial, log, "rsfp: bad terminator or empty line");
            None
        } else {
            self.dispatch_line(&line[..line_end], now, serial, log)
        };
        result
    }

    fn dispatch_line<S: SerialPort>(
        &mut self,
        line: &[u8],
        now: Monotonic,
        serial: &mut S,
        log: &mut impl Log,
    ) -> Option<Vec<u8>> {
        match frame::parse_line(line) {
            Err(LineError::BadFraming) => {
                self.emit_error(err_arg::BAD_FRAMING, serial, log, "rsfp: malformed frame");
                None
            }
            Err(LineError::WrongControlSize) => {
                self.emit_error(err_arg::WRONG_SIZE, serial, log, "rsfp: bad control frame size");
                None
            }
            Ok(Frame::Data { seq, payload }) => {
                if seq == self.next_rx_seq {
                    self.next_rx_seq = (self.next_rx_seq + 1) % SEQ_SPACE;
                    let delivered = payload.to_vec();
                    self.send_ack(serial);
                    Some(delivered)
                } else {
                    self.resend_last_ack(serial);
                    None
                }
            }
            Ok(Frame::Control { op: o, arg }) if o == op::ACK => {
                if let Some(s) = frame::char_to_seq(arg) {
                    self.on_ack(s, now, serial);
                }
                None
            }
            Ok(Frame::Control { op: o, arg }) if o == op::ERROR => {
                log.warn(&format!("rsfp: peer reported error {}", arg as char));
                None
            }
            Ok(Frame::Control { op: o, arg }) if o == op::TIMEOUT => {
                match arg {
                    b'+' => self.set_timeout_enabled(true),
                    b'-' => self.set_timeout_enabled(false),
                    _ => {}
                }
                let mut buf = Vec::with_capacity(8);
                frame::encode_control_response(op::TIMEOUT, &[arg], &mut buf);
                serial.write(&buf);
                None
            }
            Ok(Frame::Control { op: o, arg: _ }) if o == op::DEBUG => {
                let snapshot = format!("occ={}", self.occupancy);
                let mut buf = Vec::with_capacity(MAX_FRAME_SIZE);
                frame::encode_control_response(op::DEBUG, snapshot.as_bytes(), &mut buf);
                serial.write(&buf);
                None
            }
            Ok(Frame::Control { .. }) => {
                self.emit_error(err_arg::UNKNOWN_OP, serial, log, "rsfp: unknown control op");
                None
            }
            Ok(Frame::ControlResponse { .. }) => None,
        }
    }

    fn emit_error<S: SerialPort>(
        &mut self,
        arg: u8,
        serial: &mut S,
        log: &mut impl Log,
        msg: &str,
    ) {
        let mut buf = Vec::with_capacity(8);
        frame::encode_control(op::ERROR, arg, &mut buf);
        serial.write(&buf);
        log.warn(msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::NullLog;

    #[derive(Default)]
    struct MemPort {
        tx: Vec<u8>,
    }
    impl SerialPort for MemPort {
        fn write(&mut self, data: &[u8]) -> usize {
            self.tx.extend_from_slice(data);
            data.len()
        }
        fn read(&mut self, _buf: &mut [u8]) -> usize {
            0
        }
    }

    fn feed_str(ep: &mut Endpoint, s: &str, now: Monotonic, port: &mut MemPort, log: &mut NullLog) -> Option<Vec<u8>> {
        let mut last = None;
        for &b in s.as_bytes() {
            if let Some(p) = ep.feed(b, now, port, log) {
                last = Some(p);
            }
        }
        last
    }

    #[test]
    fn first_queue_transmits_immediately() {
        let mut ep = Endpoint::new(Config::default());
        let mut port = MemPort::default();
        ep.queue(b"READY", 0, &mut port).unwrap();
        assert_eq!(port.tx, b"+A READY\r\n");
        assert_eq!(ep.occupancy(), 1);
    }

    #[test]
    fn ack_advances_window() {
        let mut ep = Endpoint::new(Config::default());
        let mut port = MemPort::default();
        ep.queue(b"READY", 0, &mut port).unwrap();
        assert!(!ep.can_queue() || ep.occupancy() == 1);

        let mut log = NullLog;
        // peer sends back "#=B\r\n" acknowledging seq 0
        feed_str(&mut ep, "#=B\r\n", 10, &mut port, &mut log);
        assert_eq!(ep.occupancy(), 0);
        assert!(ep.can_queue());
    }

    #[test]
    fn stale_ack_ignored() {
        let mut ep = Endpoint::new(Config::default());
        let mut port = MemPort::default();
        ep.queue(b"X", 0, &mut port).unwrap();
        let mut log = NullLog;
        // ack for a seq that doesn't match the head is ignored
        feed_str(&mut ep, "#=Z\r\n", 10, &mut port, &mut log);
        assert_eq!(ep.occupancy(), 1);
    }

    #[test]
    fn retransmit_then_giveup() {
        let mut ep = Endpoint::new(Config {
            timeout_ms: 100,
            resend_limit: 2,
        });
        let mut port = MemPort::default();
        let mut log = NullLog;
        ep.queue(b"X", 0, &mut port).unwrap();
        port.tx.clear();

        ep.poll_timeout(150, &mut port, &mut log); // retry 1
        assert_eq!(port.tx, b"+A X\r\n");
        port.tx.clear();

        ep.poll_timeout(300, &mut port, &mut log); // retry 2
        assert_eq!(port.tx, b"+A X\r\n");
        port.tx.clear();

        ep.poll_timeout(450, &mut port, &mut log); // budget exhausted -> give up
        assert_eq!(port.tx, b"#!R\r\n");
        assert_eq!(ep.occupancy(), 0);
    }

    #[test]
    fn duplicate_suppressed_no_redelivery() {
        let mut ep = Endpoint::new(Config::default());
        let mut port = MemPort::default();
        let mut log = NullLog;

        let first = feed_str(&mut ep, "+A READY\r\n", 0, &mut port, &mut log);
        assert_eq!(first, Some(b"READY".to_vec()));

        let dup = feed_str(&mut ep, "+A READY\r\n", 10, &mut port, &mut log);
        assert_eq!(dup, None);
    }

    #[test]
    fn bad_terminator_reports_framing_error() {
        let mut ep = Endpoint::new(Config::default());
        let mut port = MemPort::default();
        let mut log = NullLog;
        feed_str(&mut ep, "garbage\n", 0, &mut port, &mut log);
        assert_eq!(port.tx, b"#!E\r\n");
    }

    #[test]
    fn unknown_control_op_reports_error() {
        let mut ep = Endpoint::new(Config::default());
        let mut port = MemPort::default();
        let mut log = NullLog;
        feed_str(&mut ep, "#Zx\r\n", 0, &mut port, &mut log);
        assert_eq!(port.tx, b"#!C\r\n");
    }

    #[test]
    fn queue_full_rejected() {
        let mut ep = Endpoint::new(Config::default());
        let mut port = MemPort::default();
        for i in 0..WINDOW_SIZE {
            ep.queue(&[i as u8], 0, &mut port).unwrap();
        }
        assert!(!ep.can_queue());
        assert_eq!(ep.queue(b"overflow", 0, &mut port), Err(Error::QueueFull));
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut ep = Endpoint::new(Config::default());
        let mut port = MemPort::default();
        ep.queue(b"X", 0, &mut port).unwrap();
        ep.reset();
        assert_eq!(ep.occupancy(), 0);
        assert!(ep.can_queue());
        // next queued frame wraps back to sequence 0
        let mut port2 = MemPort::default();
        ep.queue(b"Y", 0, &mut port2).unwrap();
        assert_eq!(port2.tx, b"+A Y\r\n");
    }

    #[test]
    fn timeout_toggle_echoes_control_response() {
        let mut ep = Endpoint::new(Config::default());
        let mut port = MemPort::default();
        let mut log = NullLog;
        feed_str(&mut ep, "#T-\r\n", 0, &mut port, &mut log);
        assert_eq!(port.tx, b">T-\r\n");
        assert!(!ep.timeout_enabled());
    }
}
