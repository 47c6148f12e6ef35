//! Audio element runtime (spec §4.2): a staged processor with its own task thread, a
//! command queue, and exactly one input and one output endpoint.
//!
//! An element is built in three steps, mirroring the original `audio_element_init` /
//! `audio_element_set_{input,output}_ringbuf` / `audio_element_run` split:
//!
//! ```ignore
//! let element = Element::init("source", Box::new(my_spec))
//!     .with_output_ringbuf(rb)
//!     .run(events_tx, io_timeout);
//! element.resume();
//! element.wait_for_stop(Duration::from_secs(5));
//! ```
//!
//! The task body is exactly the loop spec.md §4.2 describes: wait for any command; on
//! RESUME call `open`; then alternate "dispatch any pending command, then call `process`"
//! until a terminal outcome, at which point `close` runs and the element blocks again
//! waiting for the next command. `Destroy` is the only way to end the thread.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::Result;
use crate::events::{ElementError, ElementStatus, TaggedEvent};
use crate::ringbuffer::{IoStatus, RingBuffer};

/// Element lifecycle state (spec §4.2 state diagram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    None,
    Init,
    Running,
    Paused,
    Stopped,
    Finished,
    Error,
}

impl State {
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Stopped | State::Finished | State::Error)
    }
}

/// Commands accepted by an element's task, always processed in FIFO order (spec §5).
#[derive(Debug, Clone, Copy)]
enum Command {
    Resume,
    Pause,
    /// Seek carries a byte offset; what it means (file position vs. logical sample index)
    /// is up to the subclass's `ElementSpec::seek`.
    Seek(u64),
    Stop,
    Destroy,
}

/// What a single `process` invocation accomplished (spec §4.2's enumerated return values).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Progress was made; `usize` bytes moved. The task loops immediately.
    Progressed(usize),
    /// No more input will ever arrive; the element should finish cleanly.
    Done,
    /// Unrecoverable failure outside the decode-retry taxonomy.
    Fail,
    /// The decoder exhausted its retry budget (spec §7: 4 consecutive bad frames).
    ProcessFail,
    /// A peer aborted a ringbuffer.
    Abort,
    /// Non-fatal: a blocking I/O call inside `process` timed out. The element keeps running.
    Timeout,
}

/// Per-element typed info record (spec §4.2), guarded by its own mutex so any thread may
/// read it (and writers are expected to read-modify-write atomically).
#[derive(Debug, Clone, Default)]
pub struct ElementInfo {
    pub in_samplerate: u32,
    pub in_channels: u16,
    pub bits: u16,
    pub out_samplerate: u32,
    pub out_channels: u16,
    pub byte_pos: u64,
    pub total_bytes: u64,
    pub uri: String,
}

/// One side of an element's I/O: either a shared ringbuffer or a plain callback.
pub enum Endpoint {
    None,
    RingBuffer(RingBuffer),
    ReadCallback(Box<dyn FnMut(&mut [u8]) -> Result<usize> + Send>),
    WriteCallback(Box<dyn FnMut(&[u8]) -> Result<usize> + Send>),
}

/// Outcome of an in-`process` I/O call via [`ElementIo`], already translated from
/// ringbuffer/callback status into the shape `process` implementations react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOutcome {
    Ok(usize),
    Done,
    Aborted,
    TimedOut,
}

/// Handed to [`ElementSpec::process`] so it can move bytes through whichever endpoints were
/// configured, without reaching into the task/command machinery directly.
pub struct ElementIo<'a> {
    input: &'a mut Endpoint,
    output: &'a mut Endpoint,
    commands: &'a Sender<Command>,
    timeout: Duration,
}

impl ElementIo<'_> {
    /// Read bytes via the configured input endpoint. Any `Abort` self-posts a `Stop`
    /// command (spec §4.2: "any ABORT triggers a stop of the element").
    pub fn input(&mut self, buf: &mut [u8]) -> IoOutcome {
        match self.input {
            Endpoint::RingBuffer(rb) => match rb.read(buf, Some(self.timeout)) {
                IoStatus::Ok(n) => IoOutcome::Ok(n),
                IoStatus::Done => IoOutcome::Done,
                IoStatus::Abort => {
                    let _ = self.commands.send(Command::Stop);
                    IoOutcome::Aborted
                }
                IoStatus::Timeout => IoOutcome::TimedOut,
            },
            Endpoint::ReadCallback(cb) => match cb(buf) {
                Ok(0) => IoOutcome::Done,
                Ok(n) => IoOutcome::Ok(n),
                Err(_) => {
                    let _ = self.commands.send(Command::Stop);
                    IoOutcome::Aborted
                }
            },
            Endpoint::WriteCallback(_) | Endpoint::None => IoOutcome::Aborted,
        }
    }

    /// Write bytes via the configured output endpoint. A `Timeout` auto-pauses the element
    /// to create backpressure (spec §4.2); an `Abort` self-posts `Stop`.
    pub fn output(&mut self, buf: &[u8]) -> IoOutcome {
        match self.output {
            Endpoint::RingBuffer(rb) => match rb.write(buf, Some(self.timeout)) {
                IoStatus::Ok(n) => IoOutcome::Ok(n),
                IoStatus::Done => IoOutcome::Done,
                IoStatus::Abort => {
                    let _ = self.commands.send(Command::Stop);
                    IoOutcome::Aborted
                }
                IoStatus::Timeout => {
                    let _ = self.commands.send(Command::Pause);
                    IoOutcome::TimedOut
                }
            },
            Endpoint::WriteCallback(cb) => match cb(buf) {
                Ok(n) => IoOutcome::Ok(n),
                Err(_) => {
                    let _ = self.commands.send(Command::Stop);
                    IoOutcome::Aborted
                }
            },
            Endpoint::ReadCallback(_) | Endpoint::None => IoOutcome::Aborted,
        }
    }
}

/// Subclass behavior for one pipeline stage (source/decoder/sink). Implementations own
/// whatever scratch buffers and codec/demuxer state they need; the runtime only calls
/// `open`/`process`/`close`/`seek` at the right times.
pub trait ElementSpec: Send {
    /// Called once per RESUME-from-rest transition, before entering the running loop.
    fn open(&mut self) -> Result<()>;

    /// Called repeatedly while running. Must move at least one byte or return a terminal
    /// outcome; an implementation that returns `Progressed(0)` risks busy-looping (the
    /// runtime does not guard against this, matching the original's contract).
    fn process(&mut self, io: &mut ElementIo) -> ProcessOutcome;

    /// Called when leaving the running state for any reason (stop/finish/error).
    fn close(&mut self);

    /// Optional: react to a SEEK command. Default is a no-op (not every stage needs to
    /// re-synchronize internal state on seek).
    fn seek(&mut self, _offset: u64) {}
}

struct Shared {
    state: Mutex<State>,
    cv: Condvar,
    info: Mutex<ElementInfo>,
}

/// A staged processor task. Cloning an `Element` handle is not supported (there is exactly
/// one owner, typically a [`crate::pipeline::Pipeline`]); instead, commands are issued through
/// `&self` methods that are cheap to call from any thread.
pub struct Element {
    tag: String,
    shared: Arc<Shared>,
    commands: Sender<Command>,
    handle: Option<JoinHandle<()>>,
}

/// Builder returned by [`Element::init`], wired with endpoints before [`Builder::run`].
pub struct Builder {
    tag: String,
    spec: Box<dyn ElementSpec>,
    input: Endpoint,
    output: Endpoint,
}

impl Element {
    /// Create an element in state `Init`. Mirrors `audio_element_init`.
    pub fn init(tag: impl Into<String>, spec: Box<dyn ElementSpec>) -> Builder {
        Builder {
            tag: tag.into(),
            spec,
            input: Endpoint::None,
            output: Endpoint::None,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn state(&self) -> State {
        *self.shared.state.lock().unwrap()
    }

    pub fn info(&self) -> ElementInfo {
        self.shared.info.lock().unwrap().clone()
    }

    pub fn with_info<R>(&self, f: impl FnOnce(&mut ElementInfo) -> R) -> R {
        f(&mut self.shared.info.lock().unwrap())
    }

    fn send(&self, cmd: Command) {
        // The task thread's Receiver only ever disconnects once the thread has returned
        // (Destroy already processed, or it panicked); a stray send afterward is harmless.
        let _ = self.commands.send(cmd);
    }

    pub fn resume(&self) {
        self.send(Command::Resume);
    }

    pub fn pause(&self) {
        self.send(Command::Pause);
    }

    pub fn stop(&self) {
        self.send(Command::Stop);
    }

    pub fn seek(&self, offset: u64) {
        self.send(Command::Seek(offset));
    }

    /// Enqueue DESTROY and join the task thread. Idempotent-ish: calling it twice is a bug
    /// (the second `join` panics), matching "at most one task per element".
    pub fn terminate(mut self) {
        self.send(Command::Destroy);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }

    /// Block until the element reaches a terminal state or `timeout` elapses. Returns the
    /// state observed (spec §4.2 `wait_for_stop_ms`, generalized to any terminal state).
    pub fn wait_for_stop(&self, timeout: Duration) -> State {
        let guard = self.shared.state.lock().unwrap();
        let (guard, _) = self
            .cv()
            .wait_timeout_while(guard, timeout, |s| !s.is_terminal())
            .unwrap();
        *guard
    }

    fn cv(&self) -> &Condvar {
        &self.shared.cv
    }
}

impl Builder {
    pub fn with_input_ringbuf(mut self, rb: RingBuffer) -> Self {
        self.input = Endpoint::RingBuffer(rb);
        self
    }

    pub fn with_output_ringbuf(mut self, rb: RingBuffer) -> Self {
        self.output = Endpoint::RingBuffer(rb);
        self
    }

    pub fn with_read_callback(
        mut self,
        cb: impl FnMut(&mut [u8]) -> Result<usize> + Send + 'static,
    ) -> Self {
        self.input = Endpoint::ReadCallback(Box::new(cb));
        self
    }

    pub fn with_write_callback(
        mut self,
        cb: impl FnMut(&[u8]) -> Result<usize> + Send + 'static,
    ) -> Self {
        self.output = Endpoint::WriteCallback(Box::new(cb));
        self
    }

    /// Spawn the element's task thread (`audio_element_run`).
    pub fn run(self, events: Sender<TaggedEvent>, io_timeout: Duration) -> Element {
        let Builder { tag, mut spec, mut input, mut output } = self;
        let shared = Arc::new(Shared {
            state: Mutex::new(State::Init),
            cv: Condvar::new(),
            info: Mutex::new(ElementInfo::default()),
        });
        let (tx, rx): (Sender<Command>, Receiver<Command>) = mpsc::channel();
        let task_shared = shared.clone();
        let task_tag = tag.clone();
        let task_tx = tx.clone();

        let set_state = {
            let shared = task_shared.clone();
            move |s: State| {
                *shared.state.lock().unwrap() = s;
                shared.cv.notify_all();
            }
        };
        let emit = {
            let tag = task_tag.clone();
            let events = events.clone();
            move |status: ElementStatus| {
                let _ = events.send(TaggedEvent { tag: tag.clone(), status });
            }
        };

        let handle = thread::Builder::new()
            .name(format!("liteplayer-el-{task_tag}"))
            .spawn(move || {
                run_task(
                    &mut *spec,
                    &mut input,
                    &mut output,
                    &rx,
                    &task_tx,
                    io_timeout,
                    &set_state,
                    &emit,
                );
            })
            .expect("failed to spawn element task thread");

        Element { tag, shared, commands: tx, handle: Some(handle) }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_task(
    spec: &mut dyn ElementSpec,
    input: &mut Endpoint,
    output: &mut Endpoint,
    rx: &Receiver<Command>,
    tx: &Sender<Command>,
    timeout: Duration,
    set_state: &dyn Fn(State),
    emit: &dyn Fn(ElementStatus),
) {
    'outer: loop {
        let cmd = match rx.recv() {
            Ok(cmd) => cmd,
            Err(_) => break 'outer,
        };
        match cmd {
            Command::Destroy => break 'outer,
            Command::Resume => {
                if let Err(err) = spec.open() {
                    tracing::warn!(error = %err, "element open failed");
                    set_state(State::Error);
                    emit(ElementStatus::Error(ElementError::ErrorOpen));
                    continue 'outer;
                }
                set_state(State::Running);
                emit(ElementStatus::StateRunning);

                'running: loop {
                    // Drain all pending commands without blocking before processing more
                    // data (spec §4.2: "wait-or-dispatch command; process").
                    loop {
                        match rx.try_recv() {
                            Ok(Command::Pause) => {
                                set_state(State::Paused);
                                emit(ElementStatus::StatePaused);
                                match wait_while_paused(rx, spec) {
                                    PausedExit::Resumed => {
                                        set_state(State::Running);
                                        emit(ElementStatus::StateRunning);
                                    }
                                    PausedExit::Stopped => {
                                        spec.close();
                                        set_state(State::Stopped);
                                        emit(ElementStatus::StateStopped);
                                        continue 'outer;
                                    }
                                    PausedExit::Destroyed => {
                                        spec.close();
                                        break 'outer;
                                    }
                                }
                            }
                            Ok(Command::Stop) => {
                                spec.close();
                                set_state(State::Stopped);
                                emit(ElementStatus::StateStopped);
                                continue 'outer;
                            }
                            Ok(Command::Seek(offset)) => spec.seek(offset),
                            Ok(Command::Resume) => {}
                            Ok(Command::Destroy) => {
                                spec.close();
                                break 'outer;
                            }
                            Err(TryRecvError::Empty) => break,
                            Err(TryRecvError::Disconnected) => {
                                spec.close();
                                break 'outer;
                            }
                        }
                    }

                    let mut io = ElementIo { input, output, commands: tx, timeout };
                    match spec.process(&mut io) {
                        ProcessOutcome::Progressed(_) => continue 'running,
                        ProcessOutcome::Done => {
                            spec.close();
                            set_state(State::Finished);
                            emit(ElementStatus::StateFinished);
                            continue 'outer;
                        }
                        ProcessOutcome::Fail | ProcessOutcome::ProcessFail => {
                            spec.close();
                            set_state(State::Error);
                            emit(ElementStatus::Error(ElementError::ErrorProcess));
                            continue 'outer;
                        }
                        ProcessOutcome::Abort => {
                            spec.close();
                            set_state(State::Stopped);
                            emit(ElementStatus::StateStopped);
                            continue 'outer;
                        }
                        ProcessOutcome::Timeout => {
                            emit(ElementStatus::Error(ElementError::ErrorTimeout));
                            continue 'running;
                        }
                    }
                }
            }
            // Pause/Stop/Seek/etc. with no active run: nothing to do.
            Command::Pause | Command::Stop | Command::Seek(_) => {}
        }
    }
}

enum PausedExit {
    Resumed,
    Stopped,
    Destroyed,
}

/// Blocks on the command channel while paused. A SEEK while paused is delivered to the
/// subclass but does not change state (spec §4.2).
fn wait_while_paused(rx: &Receiver<Command>, spec: &mut dyn ElementSpec) -> PausedExit {
    loop {
        match rx.recv() {
            Ok(Command::Resume) => return PausedExit::Resumed,
            Ok(Command::Stop) => return PausedExit::Stopped,
            Ok(Command::Destroy) => return PausedExit::Destroyed,
            Ok(Command::Seek(offset)) => spec.seek(offset),
            Ok(Command::Pause) => {}
            Err(_) => return PausedExit::Destroyed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSpec {
        opened: Arc<AtomicUsize>,
        produced: Arc<AtomicUsize>,
        limit: usize,
    }

    impl ElementSpec for CountingSpec {
        fn open(&mut self) -> Result<()> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn process(&mut self, io: &mut ElementIo) -> ProcessOutcome {
            let n = self.produced.fetch_add(1, Ordering::SeqCst);
            if n >= self.limit {
                return ProcessOutcome::Done;
            }
            match io.output(&[n as u8]) {
                IoOutcome::Ok(_) => ProcessOutcome::Progressed(1),
                IoOutcome::Done => ProcessOutcome::Done,
                IoOutcome::Aborted => ProcessOutcome::Abort,
                IoOutcome::TimedOut => ProcessOutcome::Timeout,
            }
        }

        fn close(&mut self) {}
    }

    #[test]
    fn resume_runs_to_finish_and_reports_states() {
        let rb = RingBuffer::new(64);
        let opened = Arc::new(AtomicUsize::new(0));
        let produced = Arc::new(AtomicUsize::new(0));
        let spec = CountingSpec { opened: opened.clone(), produced: produced.clone(), limit: 5 };
        let (tx, rx) = mpsc::channel();

        let element = Element::init("counter", Box::new(spec))
            .with_output_ringbuf(rb.clone())
            .run(tx, Duration::from_millis(100));

        element.resume();
        let state = element.wait_for_stop(Duration::from_secs(2));
        assert_eq!(state, State::Finished);
        assert_eq!(opened.load(Ordering::SeqCst), 1);

        let mut seen_running = false;
        let mut seen_finished = false;
        while let Ok(ev) = rx.try_recv() {
            match ev.status {
                ElementStatus::StateRunning => seen_running = true,
                ElementStatus::StateFinished => seen_finished = true,
                _ => {}
            }
        }
        assert!(seen_running && seen_finished);
        element.terminate();
    }

    struct BlockingSpec {
        seeks: Arc<Mutex<Vec<u64>>>,
    }

    impl ElementSpec for BlockingSpec {
        fn open(&mut self) -> Result<()> {
            Ok(())
        }

        fn process(&mut self, io: &mut ElementIo) -> ProcessOutcome {
            let mut buf = [0u8; 1];
            match io.input(&mut buf) {
                IoOutcome::Ok(0) | IoOutcome::Done => ProcessOutcome::Done,
                IoOutcome::Ok(_) => ProcessOutcome::Progressed(1),
                IoOutcome::Aborted => ProcessOutcome::Abort,
                IoOutcome::TimedOut => ProcessOutcome::Timeout,
            }
        }

        fn close(&mut self) {}

        fn seek(&mut self, offset: u64) {
            self.seeks.lock().unwrap().push(offset);
        }
    }

    #[test]
    fn pause_then_resume_then_stop_reports_each_state() {
        let rb = RingBuffer::new(64);
        let seeks = Arc::new(Mutex::new(Vec::new()));
        let spec = BlockingSpec { seeks: seeks.clone() };
        let (tx, rx) = mpsc::channel();

        let element = Element::init("blocker", Box::new(spec))
            .with_input_ringbuf(rb.clone())
            .run(tx, Duration::from_millis(50));

        element.resume();
        // Give the task a moment to enter the running state before pausing it.
        thread::sleep(Duration::from_millis(20));
        element.pause();
        thread::sleep(Duration::from_millis(20));
        element.seek(42);
        thread::sleep(Duration::from_millis(20));
        element.stop();

        let state = element.wait_for_stop(Duration::from_secs(2));
        assert_eq!(state, State::Stopped);
        assert_eq!(*seeks.lock().unwrap(), vec![42]);

        let mut statuses = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            statuses.push(format!("{:?}", ev.status));
        }
        assert!(statuses.iter().any(|s| s.contains("StateRunning")));
        assert!(statuses.iter().any(|s| s.contains("StatePaused")));
        assert!(statuses.iter().any(|s| s.contains("StateStopped")));
        element.terminate();
    }

    #[test]
    fn open_failure_reports_error_open() {
        struct FailOpen;
        impl ElementSpec for FailOpen {
            fn open(&mut self) -> Result<()> {
                Err(crate::error::Error::msg("boom"))
            }
            fn process(&mut self, _io: &mut ElementIo) -> ProcessOutcome {
                ProcessOutcome::Done
            }
            fn close(&mut self) {}
        }

        let (tx, rx) = mpsc::channel();
        let element = Element::init("failing", Box::new(FailOpen)).run(tx, Duration::from_millis(50));
        element.resume();
        let state = element.wait_for_stop(Duration::from_secs(2));
        assert_eq!(state, State::Error);
        let ev = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(matches!(ev.status, ElementStatus::Error(ElementError::ErrorOpen)));
        element.terminate();
    }

    #[test]
    fn abort_on_output_rb_stops_element() {
        let rb = RingBuffer::new(1);
        let produced = Arc::new(AtomicUsize::new(0));
        let spec = CountingSpec {
            opened: Arc::new(AtomicUsize::new(0)),
            produced: produced.clone(),
            limit: 1_000_000,
        };
        let (tx, _rx) = mpsc::channel();
        let element = Element::init("producer", Box::new(spec))
            .with_output_ringbuf(rb.clone())
            .run(tx, Duration::from_millis(50));
        element.resume();
        thread::sleep(Duration::from_millis(20));
        rb.abort();
        let state = element.wait_for_stop(Duration::from_secs(2));
        assert_eq!(state, State::Stopped);
        element.terminate();
    }
}
