// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! An in-memory duplex byte pipe standing in for the physical serial link
//! to the CAN co-processor, so the gateway and the simulated firmware each
//! get a plain `SerialPort`.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use ehp_core::platform::SerialPort;

type Queue = Rc<RefCell<VecDeque<u8>>>;

#[derive(Clone)]
pub struct LoopbackPort {
    outbound: Queue,
    inbound: Queue,
}

impl SerialPort for LoopbackPort {
    fn write(&mut self, data: &[u8]) -> usize {
        self.outbound.borrow_mut().extend(data.iter().copied());
        data.len()
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        let mut inbound = self.inbound.borrow_mut();
        let n = buf.len().min(inbound.len());
        for slot in buf.iter_mut().take(n) {
            *slot = inbound.pop_front().expect("checked len above");
        }
        n
    }
}

/// A connected pair: bytes written to one end are read from the other.
pub fn pair() -> (LoopbackPort, LoopbackPort) {
    let a_to_b: Queue = Rc::new(RefCell::new(VecDeque::new()));
    let b_to_a: Queue = Rc::new(RefCell::new(VecDeque::new()));
    (
        LoopbackPort { outbound: a_to_b.clone(), inbound: b_to_a.clone() },
        LoopbackPort { outbound: b_to_a, inbound: a_to_b },
    )
}
