use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::io::{self, Write};
use std::panic::Location;

use crate::bits::hex16;

const THROTTLE_TARGET: &str = "pocketboy::throttled";
const DEFAULT_THROTTLE_PERIOD: u32 = 1_000;
const DEFAULT_TRACE_CAPACITY: usize = 1_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<Level> for log::Level {
    fn from(level: Level) -> Self {
        match level {
            Level::Trace => log::Level::Trace,
            Level::Debug => log::Level::Debug,
            Level::Info => log::Level::Info,
            Level::Warn => log::Level::Warn,
            Level::Error => log::Level::Error,
        }
    }
}

pub trait LogSink: 'static {
    fn log(&self, level: Level, target: &'static str, args: fmt::Arguments);
}

/// Forwards to the `log` facade.
pub struct LogCrateSink;

impl LogSink for LogCrateSink {
    fn log(&self, level: Level, target: &'static str, args: fmt::Arguments) {
        log::log!(target: target, log::Level::from(level), "{args}");
    }
}

/// Logger for messages that may fire on every instruction or every frame.
///
/// Suppression is keyed by call site: the first message from a site goes
/// through, then one out of every `period`.
pub struct ThrottledLogger {
    sink: Box<dyn LogSink>,
    period: u32,
    counters: HashMap<(&'static str, u32, u32), u32>,
    warned: HashSet<&'static str>,
}

impl ThrottledLogger {
    pub fn new(sink: Box<dyn LogSink>) -> Self {
        Self::with_period(sink, DEFAULT_THROTTLE_PERIOD)
    }

    pub fn with_period(sink: Box<dyn LogSink>, period: u32) -> Self {
        Self {
            sink,
            period: period.max(1),
            counters: HashMap::new(),
            warned: HashSet::new(),
        }
    }

    pub fn set_sink(&mut self, sink: Box<dyn LogSink>) {
        self.sink = sink;
    }

    #[track_caller]
    pub fn log(&mut self, level: Level, args: fmt::Arguments) {
        let caller = Location::caller();
        let key = (caller.file(), caller.line(), caller.column());
        let counter = self.counters.entry(key).or_insert(0);
        if *counter == 0 {
            self.sink
                .log(level, THROTTLE_TARGET, format_args!("[throttled] {args}"));
        }
        *counter += 1;
        if *counter == self.period {
            *counter = 0;
        }
    }

    #[track_caller]
    pub fn warn(&mut self, args: fmt::Arguments) {
        self.log(Level::Warn, args);
    }

    /// Emit `args` the first time `key` is seen and never again.
    pub fn warn_once(&mut self, key: &'static str, args: fmt::Arguments) {
        if self.warned.insert(key) {
            self.sink.log(Level::Warn, THROTTLE_TARGET, args);
        }
    }
}

impl Default for ThrottledLogger {
    fn default() -> Self {
        Self::new(Box::new(LogCrateSink))
    }
}

/// Bounded record of executed program counters, dumped on request.
pub struct PcTrace {
    entries: VecDeque<u16>,
    capacity: usize,
    enabled: bool,
}

impl PcTrace {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TRACE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
            enabled: false,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record(&mut self, pc: u16) {
        if !self.enabled {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(pc);
    }

    pub fn entries(&self) -> impl Iterator<Item = u16> + '_ {
        self.entries.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// One zero-padded hex value per line.
    pub fn write_to<W: Write>(&self, mut out: W) -> io::Result<()> {
        for pc in &self.entries {
            writeln!(out, "{}", hex16(*pc))?;
        }
        out.flush()
    }
}

impl Default for PcTrace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Capture(Rc<RefCell<Vec<String>>>);

    impl LogSink for Capture {
        fn log(&self, _level: Level, _target: &'static str, args: fmt::Arguments) {
            self.0.borrow_mut().push(args.to_string());
        }
    }

    #[test]
    fn throttles_per_call_site() {
        let lines = Rc::new(RefCell::new(Vec::new()));
        let mut logger = ThrottledLogger::with_period(Box::new(Capture(lines.clone())), 3);
        for i in 0..7 {
            logger.log(Level::Info, format_args!("a{i}"));
        }
        logger.log(Level::Info, format_args!("b"));
        assert_eq!(
            *lines.borrow(),
            vec!["[throttled] a0", "[throttled] a3", "[throttled] a6", "[throttled] b"]
        );
    }

    #[test]
    fn warn_once_is_once() {
        let lines = Rc::new(RefCell::new(Vec::new()));
        let mut logger = ThrottledLogger::new(Box::new(Capture(lines.clone())));
        logger.warn_once("window", format_args!("window layer unsupported"));
        logger.warn_once("window", format_args!("window layer unsupported"));
        assert_eq!(lines.borrow().len(), 1);
    }

    #[test]
    fn pc_trace_drops_oldest_and_formats_hex() {
        let mut trace = PcTrace::with_capacity(2);
        trace.record(0x0100);
        assert!(trace.is_empty());
        trace.set_enabled(true);
        trace.record(0x0100);
        trace.record(0x0101);
        trace.record(0x0150);
        let mut out = Vec::new();
        trace.write_to(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "0x0101\n0x0150\n");
    }
}
