//! Stateful fold over one or more streams.

use std::collections::HashMap;
use std::sync::Arc;

use crate::envelope::{EventEnvelope, StreamName};
use crate::interfaces::event_store::{EventIterator, EventStore, EventStoreError, Result};

/// Handler verdict: keep folding or stop cooperatively.
///
/// `Stop` takes effect between events: the current handler completes, its
/// position is recorded, and the run exits before the next event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

type Handler<S> = Box<dyn FnMut(&mut S, &EventEnvelope) -> Result<Flow> + Send>;

enum Selector {
    Stream(StreamName),
    Streams(Vec<StreamName>),
    Categories(Vec<String>),
    All,
}

/// A composable query over persisted event streams.
///
/// Exactly one stream selector (`from_*`) and one handler mode (`when` /
/// `when_any`) must be configured before [`Query::run`]. Cursor positions
/// live in memory for the lifetime of the query object, so a second `run`
/// resumes where the previous one finished; [`Query::reset`] drops state
/// and cursors back to their initial values.
pub struct Query<S> {
    store: Arc<dyn EventStore>,
    init: Box<dyn Fn() -> S + Send>,
    state: S,
    selector: Option<Selector>,
    handlers: HashMap<String, Handler<S>>,
    any_handler: Option<Handler<S>>,
    positions: HashMap<StreamName, i64>,
    misuse: Option<&'static str>,
}

impl<S> Query<S> {
    /// Create a query with an initial-state factory.
    pub fn new(store: Arc<dyn EventStore>, init: impl Fn() -> S + Send + 'static) -> Self {
        let state = init();
        Self {
            store,
            init: Box::new(init),
            state,
            selector: None,
            handlers: HashMap::new(),
            any_handler: None,
            positions: HashMap::new(),
            misuse: None,
        }
    }

    /// Read events of a single stream, in order.
    pub fn from_stream(self, stream_name: StreamName) -> Self {
        self.set_selector(Selector::Stream(stream_name))
    }

    /// Read events of the listed streams, interleaved round-robin: one
    /// event per non-exhausted stream per round, streams in the order
    /// given.
    pub fn from_streams(self, stream_names: Vec<StreamName>) -> Self {
        self.set_selector(Selector::Streams(stream_names))
    }

    /// Read events of every stream named `<category>-...`.
    pub fn from_category(self, category: impl Into<String>) -> Self {
        self.set_selector(Selector::Categories(vec![category.into()]))
    }

    /// Read events of every stream in any of the given categories.
    pub fn from_categories(self, categories: Vec<String>) -> Self {
        self.set_selector(Selector::Categories(categories))
    }

    /// Read events of every stream except internal (`$`-prefixed) ones.
    pub fn from_all(self) -> Self {
        self.set_selector(Selector::All)
    }

    fn set_selector(mut self, selector: Selector) -> Self {
        if self.selector.is_some() {
            self.misuse = Some("from_* was already called");
        } else {
            self.selector = Some(selector);
        }
        self
    }

    /// Register a handler for events named `event_name`. Events with no
    /// registered handler are skipped but still advance the cursor.
    pub fn when(
        mut self,
        event_name: impl Into<String>,
        handler: impl FnMut(&mut S, &EventEnvelope) -> Result<Flow> + Send + 'static,
    ) -> Self {
        if self.any_handler.is_some() {
            self.misuse = Some("when_any was already called");
        } else {
            self.handlers.insert(event_name.into(), Box::new(handler));
        }
        self
    }

    /// Register a handler applied to every event.
    pub fn when_any(
        mut self,
        handler: impl FnMut(&mut S, &EventEnvelope) -> Result<Flow> + Send + 'static,
    ) -> Self {
        if !self.handlers.is_empty() {
            self.misuse = Some("when was already called");
        } else if self.any_handler.is_some() {
            self.misuse = Some("when_any was already called");
        } else {
            self.any_handler = Some(Box::new(handler));
        }
        self
    }

    /// The current state.
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Drop state and cursors back to their initial values; the next
    /// [`Query::run`] re-reads every selected stream from the start.
    pub fn reset(&mut self) {
        self.state = (self.init)();
        self.positions.clear();
    }

    /// Drive the fold until every selected stream is exhausted or a
    /// handler stops the run.
    ///
    /// The selection set is frozen at the start of the call. After each
    /// successfully handled event the stream's cursor advances, so a
    /// failing handler leaves the cursor on the last success and the
    /// failing event is reprocessed by the next `run`.
    pub async fn run(&mut self) -> Result<()> {
        if let Some(misuse) = self.misuse {
            return Err(EventStoreError::Runtime(misuse.to_string()));
        }
        if self.any_handler.is_none() && self.handlers.is_empty() {
            return Err(EventStoreError::Runtime(
                "no handlers configured".to_string(),
            ));
        }

        let streams = self.resolve_streams().await?;
        let mut cursors = Vec::with_capacity(streams.len());
        for stream_name in streams {
            let from = self.positions.get(&stream_name).copied().unwrap_or(0) + 1;
            let iterator = self.store.load(&stream_name, from, None, None).await?;
            cursors.push(Cursor {
                stream_name,
                iterator,
                exhausted: false,
            });
        }

        'rounds: loop {
            let mut progressed = false;
            for cursor in &mut cursors {
                if cursor.exhausted {
                    continue;
                }
                let Some(event) = cursor.iterator.next().await? else {
                    cursor.exhausted = true;
                    continue;
                };
                progressed = true;

                let handler = match self.any_handler.as_mut() {
                    Some(handler) => Some(handler),
                    None => self.handlers.get_mut(&event.event_name),
                };
                let flow = match handler {
                    Some(handler) => handler(&mut self.state, &event)?,
                    None => Flow::Continue,
                };

                if let Some(no) = event.no {
                    self.positions.insert(cursor.stream_name.clone(), no);
                }
                if flow == Flow::Stop {
                    break 'rounds;
                }
            }
            if !progressed {
                break;
            }
        }
        Ok(())
    }

    async fn resolve_streams(&self) -> Result<Vec<StreamName>> {
        let selector = self
            .selector
            .as_ref()
            .ok_or_else(|| EventStoreError::Runtime("no streams configured".to_string()))?;
        match selector {
            Selector::Stream(name) => Ok(vec![name.clone()]),
            Selector::Streams(names) => Ok(names.clone()),
            Selector::Categories(categories) => {
                let names = self.store.fetch_stream_names(None, None, 0).await?;
                Ok(names
                    .into_iter()
                    .filter(|name| categories.iter().any(|c| name.in_category(c)))
                    .collect())
            }
            Selector::All => {
                let names = self.store.fetch_stream_names(None, None, 0).await?;
                Ok(names.into_iter().filter(|name| !name.is_internal()).collect())
            }
        }
    }
}

struct Cursor {
    stream_name: StreamName,
    iterator: Box<dyn EventIterator>,
    exhausted: bool,
}
