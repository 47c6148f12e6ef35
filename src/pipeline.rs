//! Pipeline assembly and broadcast control (spec §4.3).
//!
//! A pipeline is an ordered list of [`Element`]s already wired input-to-output via shared
//! ringbuffers (source -> decoder -> sink). It owns no stage-specific knowledge; it only
//! knows how to fan a command out to every registered element in the right order and how
//! to forward every element's events to a single listener.

use std::sync::mpsc::{Receiver, Sender};
use std::time::Duration;

use crate::element::{Element, State};
use crate::events::TaggedEvent;

/// An ordered set of elements, linked source-to-sink, controlled as a unit.
pub struct Pipeline {
    elements: Vec<Element>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self { elements: Vec::new() }
    }

    /// Register an element, appending it to the end of the chain (source first, sink last).
    pub fn register(&mut self, element: Element) {
        self.elements.push(element);
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Start (or resume) every element in forward order: source opens first so downstream
    /// stages have something to read immediately.
    pub fn run(&self) {
        for el in &self.elements {
            el.resume();
        }
    }

    pub fn pause(&self) {
        for el in &self.elements {
            el.pause();
        }
    }

    pub fn resume(&self) {
        for el in &self.elements {
            el.resume();
        }
    }

    /// Seek every element; each subclass decides whether a given seek offset is meaningful
    /// to it (spec §4.3: "seek is broadcast, not targeted").
    pub fn seek(&self, offset: u64) {
        for el in &self.elements {
            el.seek(offset);
        }
    }

    /// Stop in reverse order (sink first) so upstream stages don't keep pushing into a
    /// ringbuffer whose consumer has already gone away.
    pub fn stop(&self) {
        for el in self.elements.iter().rev() {
            el.stop();
        }
    }

    /// Block until every element reaches a terminal state or the shared timeout elapses.
    /// Returns `true` if all elements stopped in time.
    pub fn wait_for_stop(&self, timeout: Duration) -> bool {
        self.elements.iter().all(|el| el.wait_for_stop(timeout).is_terminal())
    }

    /// Reset every linking ringbuffer (clears bytes + sticky flags) once every element is
    /// confirmed stopped. Callers must not call this while any element might still be
    /// blocked on one of these buffers (spec §4.1's `reset` contract).
    pub fn reset_ringbuffers(&self, ringbuffers: &[crate::ringbuffer::RingBuffer]) {
        for rb in ringbuffers {
            rb.reset();
        }
    }

    pub fn states(&self) -> Vec<(String, State)> {
        self.elements.iter().map(|el| (el.tag().to_string(), el.state())).collect()
    }

    /// Tear down every element's task thread. Consumes the pipeline.
    pub fn terminate(self) {
        for el in self.elements {
            el.terminate();
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Fan events from every element's shared sender into one `Receiver<TaggedEvent>` the
/// player listens on. Elements already send into a clone of the same channel passed to
/// [`crate::element::Builder::run`], so this is purely documentation of that convention —
/// kept as a thin helper so call sites read intent-first.
pub fn shared_event_channel() -> (Sender<TaggedEvent>, Receiver<TaggedEvent>) {
    std::sync::mpsc::channel()
}
