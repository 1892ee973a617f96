// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Glues the CAN facade to the RSFP endpoint that actually owns the wire:
//! the facade only decides *what* an outbound frame should look like and
//! whether it's allowed (listen-only gating), the formatting and queueing
//! over RSFP is this binary's job (see [`ehp_core::can::format_cantx`]).

use ehp_core::can::{self, Config as FacadeConfig, Facade};
use ehp_core::hpap::{self, CanFrame, CanTransmit, Message};
use ehp_core::platform::{Log, Monotonic, SerialPort};
use ehp_core::rsfp::{Config as RsfpConfig, Endpoint};

use crate::loopback::LoopbackPort;

pub struct Bridge {
    port: LoopbackPort,
    endpoint: Endpoint,
    facade: Facade,
    now: Monotonic,
}

impl Bridge {
    pub fn new(port: LoopbackPort, facade_config: FacadeConfig) -> Self {
        Self {
            port,
            endpoint: Endpoint::new(RsfpConfig::default()),
            facade: Facade::new(facade_config),
            now: 0,
        }
    }

    pub fn set_now(&mut self, now: Monotonic) {
        self.now = now;
    }

    pub fn facade(&self) -> &Facade {
        &self.facade
    }

    /// Drain whatever bytes the co-processor has sent since the last
    /// call, feeding each completed line to the CAN facade and returning
    /// the HPAP messages decoded from any `CANRX` records it produced.
    /// `SETUP` replies the facade wants to send back are queued directly.
    pub fn poll(&mut self, log: &mut impl Log) -> Vec<Message> {
        let mut messages = Vec::new();
        let mut buf = [0u8; 256];
        let n = self.port.read(&mut buf);
        for &byte in &buf[..n] {
            let Some(payload) = self.endpoint.feed(byte, self.now, &mut self.port, log) else {
                continue;
            };
            let line = String::from_utf8_lossy(&payload).into_owned();
            let (reply, frame) = self.facade.on_record(&line, self.now, log);
            if let Some(reply_line) = reply {
                let _ = self.endpoint.queue(reply_line.as_bytes(), self.now, &mut self.port);
            }
            if let Some(frame) = frame {
                if let Some(msg) = hpap::decode(&frame) {
                    messages.push(msg);
                }
            }
        }
        self.endpoint.poll_timeout(self.now, &mut self.port, log);
        self.facade.poll_watchdog(self.now, log);
        if self.facade.take_reset_requested() {
            self.endpoint.reset();
        }
        messages
    }
}

impl CanTransmit for Bridge {
    fn ready(&self) -> bool {
        self.facade.ready()
    }

    fn transmit(&mut self, frame: CanFrame) -> bool {
        if !self.facade.transmit(frame) {
            return false;
        }
        let line = can::format_cantx(&frame);
        let _ = self.endpoint.queue(line.as_bytes(), self.now, &mut self.port);
        true
    }
}
