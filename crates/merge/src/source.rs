//! One input of the k-way merge: a run's stream plus its read-ahead buffer.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use stream::{Handlers, ReadStream, StreamError};
use tracing::trace;

/// Items and terminal state pushed by the run's stream handlers.
pub(crate) struct Inbox<T> {
    pub(crate) items: VecDeque<T>,
    pub(crate) ended: bool,
    pub(crate) error: Option<StreamError>,
}

/// An outstanding fill: demand granted to the run's stream that has not
/// been satisfied yet.
#[derive(Debug, Clone, Copy)]
struct Fill {
    requested: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FillStatus {
    /// A head item is buffered, or the source is finished.
    Ready,
    /// Waiting for the stream; drive again later.
    Pending,
}

pub(crate) struct MergeSource<T> {
    /// Position in the run list. Ties go to the lower index.
    pub(crate) index: usize,
    stream: Box<dyn ReadStream<T>>,
    pub(crate) inbox: Rc<RefCell<Inbox<T>>>,
    fill: Option<Fill>,
    fills_started: u64,
}

impl<T: 'static> MergeSource<T> {
    pub(crate) fn new(index: usize, mut stream: Box<dyn ReadStream<T>>) -> Self {
        let inbox = Rc::new(RefCell::new(Inbox {
            items: VecDeque::new(),
            ended: false,
            error: None,
        }));

        let on_data = Rc::clone(&inbox);
        let on_end = Rc::clone(&inbox);
        let on_error = Rc::clone(&inbox);
        stream.set_handlers(
            Handlers::new(move |item| on_data.borrow_mut().items.push_back(item))
                .on_end(move || on_end.borrow_mut().ended = true)
                .on_error(move |e| on_error.borrow_mut().error = Some(e)),
        );

        Self {
            index,
            stream,
            inbox,
            fill: None,
            fills_started: 0,
        }
    }
}

impl<T> MergeSource<T> {
    pub(crate) fn buffered(&self) -> usize {
        self.inbox.borrow().items.len()
    }

    /// The run has ended and every buffered item has been taken.
    pub(crate) fn is_done(&self) -> bool {
        let inbox = self.inbox.borrow();
        inbox.ended && inbox.items.is_empty()
    }

    /// The run's stream raised its end event; only buffered items remain.
    pub(crate) fn is_exhausted(&self) -> bool {
        self.inbox.borrow().ended
    }

    pub(crate) fn take_error(&mut self) -> Option<StreamError> {
        self.inbox.borrow_mut().error.take()
    }

    pub(crate) fn pop(&mut self) -> Option<T> {
        self.inbox.borrow_mut().items.pop_front()
    }

    /// Number of distinct fills issued so far. Coalesced requests do not
    /// count.
    pub(crate) fn fills_started(&self) -> u64 {
        self.fills_started
    }

    pub(crate) fn fill_in_flight(&self) -> bool {
        self.fill.is_some()
    }

    /// Tops the buffer up to `target` items.
    ///
    /// While a fill is outstanding a new request attaches to it: no extra
    /// demand is granted, the same stream is simply driven again.
    pub(crate) fn fill(&mut self, target: usize) -> FillStatus {
        if self.fill.is_none() {
            let want = target.saturating_sub(self.buffered()) as u64;
            let finished = {
                let inbox = self.inbox.borrow();
                inbox.ended || inbox.error.is_some()
            };
            if want > 0 && !finished {
                self.stream.demand().request(want);
                self.fill = Some(Fill { requested: want });
                self.fills_started += 1;
                trace!(source = self.index, requested = want, "fill started");
            }
        }
        if self.fill.is_some() {
            self.stream.drive();
        }
        self.settle()
    }

    fn settle(&mut self) -> FillStatus {
        let inbox = self.inbox.borrow();
        let finished = inbox.ended || inbox.error.is_some();
        if let Some(fill) = self.fill {
            if finished || !self.stream.demand().has_demand() {
                trace!(
                    source = self.index,
                    requested = fill.requested,
                    buffered = inbox.items.len(),
                    "fill settled"
                );
                self.fill = None;
            }
        }
        if finished || !inbox.items.is_empty() {
            FillStatus::Ready
        } else {
            FillStatus::Pending
        }
    }
}
