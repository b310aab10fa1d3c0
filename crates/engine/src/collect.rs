//! Input phase: pulls batches from the input stream into the run builder and
//! hands the finished runs to a merge engine once the input ends.
//!
//! Input is only pulled while the consumer has outstanding output demand.
//! A pull that yields nothing (the input reported `WouldBlock`) suspends the
//! phase until the next `drive`.
use std::cell::RefCell;
use std::collections::VecDeque;
use std::mem;
use std::rc::Rc;

use merge::MergeEngine;
use spill::RunBuilder;
use stream::{ReadStream, StreamError};
use tracing::{debug, info};

use crate::{Phase, SortingStream, INPUT_BATCH};

/// Items and terminal state pushed by the input's handlers.
pub(crate) struct InputInbox<T> {
    pub(crate) items: VecDeque<T>,
    pub(crate) ended: bool,
    pub(crate) error: Option<StreamError>,
}

impl<T> Default for InputInbox<T> {
    fn default() -> Self {
        Self {
            items: VecDeque::new(),
            ended: false,
            error: None,
        }
    }
}

pub(crate) struct Collector<T> {
    pub(crate) input: Box<dyn ReadStream<T>>,
    pub(crate) inbox: Rc<RefCell<InputInbox<T>>>,
    pub(crate) builder: RunBuilder<T>,
}

/// Outcome of one pull from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pull {
    /// Items were offered; pull again if demand allows.
    Progress,
    /// The input has nothing to give right now.
    Suspended,
    /// The input raised its end event.
    Ended,
}

impl<T> Collector<T> {
    /// Offers everything the input has pushed so far. Returns how many
    /// items were offered.
    fn absorb(&mut self) -> Result<u64, StreamError> {
        let batch = mem::take(&mut self.inbox.borrow_mut().items);
        let mut n = 0;
        for item in batch {
            self.builder.offer(item)?;
            n += 1;
        }
        if let Some(err) = self.inbox.borrow_mut().error.take() {
            return Err(StreamError::Upstream(Box::new(err)));
        }
        Ok(n)
    }

    fn pull(&mut self, items_in: &mut u64) -> Result<Pull, StreamError> {
        *items_in += self.absorb()?;
        if self.inbox.borrow().ended {
            return Ok(Pull::Ended);
        }

        let input_demand = self.input.demand();
        if !input_demand.has_demand() {
            input_demand.request(INPUT_BATCH);
        }
        self.input.drive();

        let offered = self.absorb()?;
        *items_in += offered;
        if self.inbox.borrow().ended {
            Ok(Pull::Ended)
        } else if offered == 0 {
            Ok(Pull::Suspended)
        } else {
            Ok(Pull::Progress)
        }
    }
}

impl<T: 'static> SortingStream<T> {
    /// Runs the input phase for as long as output demand and input
    /// readiness allow. Switches to the merge phase when the input ends.
    pub(crate) fn collect(&mut self) {
        loop {
            let wanted = self.outlet.as_ref().is_some_and(|o| o.ready());
            if !wanted {
                return;
            }
            let Phase::Collecting(collector) = &mut self.phase else {
                return;
            };
            match collector.pull(&mut self.stats.items_in) {
                Ok(Pull::Progress) => {}
                Ok(Pull::Suspended) => return,
                Ok(Pull::Ended) => {
                    self.start_merge();
                    return;
                }
                Err(e) => {
                    self.fail(e);
                    return;
                }
            }
        }
    }

    /// Closes the run builder and replaces the input phase with a merge
    /// over its runs. The output outlet moves into the merge engine.
    fn start_merge(&mut self) {
        let Phase::Collecting(collector) = mem::replace(&mut self.phase, Phase::Failed) else {
            return;
        };
        let Collector { input, builder, .. } = *collector;
        drop(input);

        let runs = match builder.finish() {
            Ok(runs) => runs,
            Err(e) => {
                self.fail(e);
                return;
            }
        };
        self.stats.spills = runs.iter().filter(|r| r.path().is_some()).count() as u64;
        self.stats.runs = runs.len();
        info!(
            items = self.stats.items_in,
            spills = self.stats.spills,
            runs = self.stats.runs,
            "input collected, merging"
        );

        let Some(outlet) = self.outlet.take() else {
            return;
        };
        let mut engine = MergeEngine::new(
            runs,
            Rc::clone(&self.ordering),
            Rc::clone(&self.codec.deserializer),
            Rc::clone(&self.fs),
        )
        .with_config(&self.config)
        .with_outlet(outlet);
        engine.drive();
        self.phase = Phase::Merging(engine);
    }

    /// Aborts the sort: drops the run builder (deleting its files) and
    /// raises the error event.
    pub(crate) fn fail(&mut self, err: StreamError) {
        self.phase = Phase::Failed;
        debug!(error = &err as &dyn std::error::Error, items = self.stats.items_in, "sort failed");
        if let Some(outlet) = self.outlet.as_mut() {
            outlet.fail(err);
        }
    }
}
