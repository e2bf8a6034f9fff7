//! Console entry points and the interception shim
//!
//! A [`Console`] is an explicit capability object: one swappable handler per
//! [`LogLevel`]. The process-wide instance lives behind [`Console::global`];
//! embedders and tests can create private ones with [`Console::new`].
//!
//! Every [`Interception`] adds one layer per wrapped level on top of whatever
//! is bound at that moment. Layers stack when several taps share a console,
//! and [`Interception::restore`] removes exactly its own layer: the displaced
//! `Arc` goes back if this layer is still on top, otherwise the layer above is
//! relinked past it. Layers may be removed in any order.

use super::arg::Arg;
use super::engine::FlushEngine;
use super::log_level::LogLevel;
use super::serializer::format_message;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::runtime::Handle;

/// A console entry point.
pub type Handler = Arc<dyn Fn(&[Arg]) + Send + Sync>;

static GLOBAL: OnceLock<Arc<Console>> = OnceLock::new();

pub struct Console {
    handlers: RwLock<[Handler; 5]>,
    /// Interception layers currently linked in, bottom first
    layers: Mutex<Vec<Layer>>,
}

impl Console {
    /// A console whose handlers print to stdout/stderr.
    #[must_use]
    pub fn new() -> Self {
        Self::with_handlers(LogLevel::ALL.map(default_handler))
    }

    /// A console with explicit handlers, indexed in [`LogLevel::ALL`] order.
    #[must_use]
    pub fn with_handlers(handlers: [Handler; 5]) -> Self {
        Self {
            handlers: RwLock::new(handlers),
            layers: Mutex::new(Vec::new()),
        }
    }

    /// The process-wide console.
    pub fn global() -> Arc<Console> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Console::new())))
    }

    /// The handler currently bound to `level`.
    pub fn handler(&self, level: LogLevel) -> Handler {
        Arc::clone(&self.handlers.read()[level.slot()])
    }

    /// Bind `handler` to `level`, returning the handler it displaced.
    pub fn replace(&self, level: LogLevel, handler: Handler) -> Handler {
        std::mem::replace(&mut self.handlers.write()[level.slot()], handler)
    }

    /// Invoke the entry point for `level`.
    ///
    /// The lock is released before the handler runs, so handlers may call
    /// back into the console.
    pub fn call(&self, level: LogLevel, args: &[Arg]) {
        let handler = self.handler(level);
        handler(args);
    }

    #[inline]
    pub fn log(&self, args: &[Arg]) {
        self.call(LogLevel::Log, args);
    }

    #[inline]
    pub fn info(&self, args: &[Arg]) {
        self.call(LogLevel::Info, args);
    }

    #[inline]
    pub fn warn(&self, args: &[Arg]) {
        self.call(LogLevel::Warn, args);
    }

    #[inline]
    pub fn error(&self, args: &[Arg]) {
        self.call(LogLevel::Error, args);
    }

    #[inline]
    pub fn debug(&self, args: &[Arg]) {
        self.call(LogLevel::Debug, args);
    }
}

impl Console {
    /// Bind a wrapper built by `make` on top of the handler currently bound
    /// to `level`.
    fn push_layer(&self, level: LogLevel, make: impl FnOnce(Arc<Link>) -> Handler) -> Layer {
        let mut layers = self.layers.lock();

        let link = Arc::new(Link::new(self.handler(level)));
        let installed = make(Arc::clone(&link));
        self.replace(level, Arc::clone(&installed));

        let layer = Layer {
            level,
            installed,
            link,
        };
        layers.push(layer.clone());
        layer
    }

    /// Unlink `layer`, leaving every other layer in place.
    fn remove_layer(&self, layer: &Layer) {
        let mut layers = self.layers.lock();
        layers.retain(|other| !Arc::ptr_eq(&other.link, &layer.link));

        let below = layer.link.previous();
        if Arc::ptr_eq(&self.handler(layer.level), &layer.installed) {
            self.replace(layer.level, below);
        } else if let Some(above) = layers.iter().find(|other| {
            other.level == layer.level && Arc::ptr_eq(&other.link.previous(), &layer.installed)
        }) {
            above.link.set_previous(below);
        }
        // A foreign `replace` may have buried the layer; it then only forwards
        layer.link.detach();
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Console {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Console").finish_non_exhaustive()
    }
}

/// Warn and error go to stderr, the rest to stdout.
pub fn default_handler(level: LogLevel) -> Handler {
    if level.is_stderr() {
        Arc::new(|args: &[Arg]| eprintln!("{}", format_message(args)))
    } else {
        Arc::new(|args: &[Arg]| println!("{}", format_message(args)))
    }
}

/// The set of entry points a tap has wrapped.
///
/// Dropping it removes its layers, same as [`Interception::restore`].
pub struct Interception {
    console: Arc<Console>,
    layers: Vec<Layer>,
}

/// One wrapper bound to one level.
#[derive(Clone)]
struct Layer {
    level: LogLevel,
    installed: Handler,
    link: Arc<Link>,
}

/// The handler a wrapper forwards to. Swappable so a layer underneath can be
/// unlinked while this one stays bound.
struct Link {
    previous: RwLock<Handler>,
    detached: AtomicBool,
}

impl Link {
    fn new(previous: Handler) -> Self {
        Self {
            previous: RwLock::new(previous),
            detached: AtomicBool::new(false),
        }
    }

    fn previous(&self) -> Handler {
        Arc::clone(&self.previous.read())
    }

    fn set_previous(&self, handler: Handler) {
        *self.previous.write() = handler;
    }

    fn forward(&self, args: &[Arg]) {
        let previous = self.previous();
        previous(args);
    }

    fn detach(&self) {
        self.detached.store(true, Ordering::Release);
    }

    fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }
}

impl Interception {
    /// Wrap each level in `levels`.
    ///
    /// The wrapper forwards the untouched arguments to the handler below it
    /// when `passthrough` is set, then serializes the call and appends it to
    /// `engine`. Reaching the batch threshold spawns a flush on `runtime`.
    pub fn install(
        console: Arc<Console>,
        levels: impl IntoIterator<Item = LogLevel>,
        passthrough: bool,
        engine: &Arc<FlushEngine>,
        runtime: &Handle,
    ) -> Self {
        let layers = levels
            .into_iter()
            .map(|level| {
                console.push_layer(level, |link| wrap(level, link, passthrough, engine, runtime))
            })
            .collect();

        Self { console, layers }
    }

    pub fn levels(&self) -> impl Iterator<Item = LogLevel> + '_ {
        self.layers.iter().map(|layer| layer.level)
    }

    /// Whether the wrapper for `level` is the outermost handler on the console.
    pub fn is_installed(&self, level: LogLevel) -> bool {
        self.layers.iter().any(|layer| {
            layer.level == level && Arc::ptr_eq(&layer.installed, &self.console.handler(level))
        })
    }

    /// Remove every layer this interception added, in reverse install order.
    pub fn restore(mut self) {
        self.unlink();
    }

    fn unlink(&mut self) {
        for layer in self.layers.drain(..).rev() {
            self.console.remove_layer(&layer);
        }
    }
}

impl Drop for Interception {
    fn drop(&mut self) {
        self.unlink();
    }
}

impl fmt::Debug for Interception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interception")
            .field("levels", &self.levels().collect::<Vec<_>>())
            .finish()
    }
}

fn wrap(
    level: LogLevel,
    link: Arc<Link>,
    passthrough: bool,
    engine: &Arc<FlushEngine>,
    runtime: &Handle,
) -> Handler {
    let engine = Arc::clone(engine);
    let runtime = runtime.clone();

    Arc::new(move |args: &[Arg]| {
        if link.is_detached() {
            link.forward(args);
            return;
        }
        if passthrough {
            link.forward(args);
        }

        let record = engine.serializer().serialize(level, args);
        if engine.append(record) {
            let engine = Arc::clone(&engine);
            runtime.spawn(async move { engine.flush().await });
        }
    })
}
