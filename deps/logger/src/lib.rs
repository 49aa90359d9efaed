use log::{LevelFilter, Metadata, Record};
use std::cell::OnceCell;
use std::path::Path;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::{Mutex, MutexGuard, OnceLock};

thread_local! {
    static G_TAG: OnceCell<String> = const { OnceCell::new() };
}
static G_ID: AtomicU64 = AtomicU64::new(1);
static G_LOGGER: OnceLock<Logger> = OnceLock::new();

const G_CONSOLE: &str = "console";
const G_FILE: &str = "file";
const G_MEMORY: &str = "memory";

/// named threads are tagged by name, the rest get a process-unique number
fn thread_tag() -> String {
    G_TAG.with(|x| {
        x.get_or_init(|| match std::thread::current().name() {
            Some(name) => name.to_string(),
            None => format!("t{}", G_ID.fetch_add(1, Relaxed)),
        })
        .clone()
    })
}

/// a simple sync logger which impl log::Log
pub struct Logger {
    sinks: Mutex<Vec<Box<dyn Sink>>>,
    abort_on_error: AtomicBool,
}

trait Sink: Send {
    fn sink(&mut self, line: &str);

    fn flush(&mut self);

    fn name(&self) -> &'static str;

    fn drain(&mut self) -> Vec<String> {
        Vec::new()
    }
}

impl log::Log for Logger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        let line = format!(
            "{} {} [{}] {}:{} {}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S.%6f"),
            thread_tag(),
            record.level().as_str(),
            record.file().unwrap_or("?"),
            record.line().unwrap_or(0),
            record.args()
        );
        let mut sinks = self.lock();

        for p in sinks.iter_mut() {
            p.sink(&line);
        }

        if record.level() == log::Level::Error && self.should_abort() {
            let bt = std::backtrace::Backtrace::force_capture();
            let buf = format!("{}", bt);
            for p in sinks.iter_mut() {
                p.sink(&buf);
                p.flush();
            }
            std::process::abort();
        }
    }

    fn flush(&self) {
        for p in self.lock().iter_mut() {
            p.flush();
        }
    }
}

struct Console;

impl Sink for Console {
    fn sink(&mut self, line: &str) {
        let _ = std::io::Write::write_all(&mut std::io::stdout().lock(), line.as_bytes());
    }

    fn flush(&mut self) {
        let _ = std::io::Write::flush(&mut std::io::stdout());
    }

    fn name(&self) -> &'static str {
        G_CONSOLE
    }
}

/// NOTE: file rolling is not support at present
struct File {
    w: std::fs::File,
}

impl File {
    fn new(path: impl AsRef<Path>, trunc: bool) -> Result<Self, std::io::Error> {
        let mut ops = std::fs::File::options();
        ops.write(true).create(true);
        if trunc {
            ops.truncate(true);
        } else {
            ops.append(true);
        }
        ops.open(path).map(|w| Self { w })
    }
}

impl Sink for File {
    fn sink(&mut self, line: &str) {
        let _ = std::io::Write::write_all(&mut self.w, line.as_bytes());
    }

    fn flush(&mut self) {
        let _ = std::io::Write::flush(&mut self.w);
    }

    fn name(&self) -> &'static str {
        G_FILE
    }
}

/// keeps formatted lines in process until someone drains them
#[derive(Default)]
struct Memory {
    lines: Vec<String>,
}

impl Sink for Memory {
    fn sink(&mut self, line: &str) {
        self.lines.push(line.trim_end().to_string());
    }

    fn flush(&mut self) {}

    fn name(&self) -> &'static str {
        G_MEMORY
    }

    fn drain(&mut self) -> Vec<String> {
        std::mem::take(&mut self.lines)
    }
}

impl Logger {
    /// install the global logger on first call, later calls return the same instance
    pub fn init() -> &'static Self {
        let mut fresh = false;
        let logger = G_LOGGER.get_or_init(|| {
            fresh = true;
            Self {
                sinks: Mutex::new(Vec::new()),
                abort_on_error: AtomicBool::new(false),
            }
        });
        if fresh && log::set_logger(logger).is_ok() {
            log::set_max_level(LevelFilter::Trace);
        }
        logger
    }

    pub fn get() -> Option<&'static Self> {
        G_LOGGER.get()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Box<dyn Sink>>> {
        // sinks keep no cross-call invariants, a poisoned lock is still usable
        self.sinks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn exist(&self, name: &'static str) -> bool {
        self.lock().iter().any(|x| x.name() == name)
    }

    fn should_abort(&self) -> bool {
        self.abort_on_error.load(Relaxed)
    }

    pub fn abort_on_error(&self, flag: bool) -> &Self {
        self.abort_on_error.store(flag, Relaxed);
        self
    }

    pub fn add_console(&self) -> &Self {
        if !self.exist(G_CONSOLE) {
            self.lock().push(Box::new(Console));
        }
        self
    }

    pub fn add_file(&self, path: impl AsRef<Path>, trunc: bool) -> Option<&Self> {
        if self.exist(G_FILE) {
            return Some(self);
        }
        match File::new(&path, trunc) {
            Err(e) => {
                eprintln!("can't open {:?}, error {}", path.as_ref(), e);
                None
            }
            Ok(f) => {
                self.lock().push(Box::new(f));
                Some(self)
            }
        }
    }

    pub fn add_memory(&self) -> &Self {
        if !self.exist(G_MEMORY) {
            self.lock().push(Box::new(Memory::default()));
        }
        self
    }

    /// drain every line captured by the memory sink so far
    pub fn take_memory(&self) -> Vec<String> {
        self.lock()
            .iter_mut()
            .find(|x| x.name() == G_MEMORY)
            .map(|x| x.drain())
            .unwrap_or_default()
    }

    fn remove_impl(&self, name: &'static str) {
        let mut sinks = self.lock();
        if let Some(idx) = sinks.iter().position(|x| x.name() == name) {
            let mut s = sinks.remove(idx);
            s.flush();
        }
    }

    pub fn remove_file(&self) {
        self.remove_impl(G_FILE);
    }

    pub fn remove_console(&self) {
        self.remove_impl(G_CONSOLE);
    }

    pub fn remove_memory(&self) {
        self.remove_impl(G_MEMORY);
    }

    pub fn flush(&self) {
        log::Log::flush(self);
    }
}
