use super::*;

/// Per-channel progress of an active unaligned capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptureState {
    /// Barrier not yet seen; data on this channel is still in flight.
    Open,
    /// Barrier seen; nothing more to capture here.
    Settled,
    /// Reached end of input.
    Closed,
}

/// In-flight elements recorded on one channel between the trigger and that
/// channel's own barrier.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelInFlight<T> {
    pub channel: ChannelId,
    pub elements: Vec<StreamElement<T>>,
}

/// The complete in-flight portion of an unaligned snapshot, one record per
/// input channel in declaration order. A channel that was already drained
/// when its barrier arrived contributes an empty record, recording the fact
/// that nothing was in flight there.
#[derive(Debug, Clone, PartialEq)]
pub struct InFlightState<T> {
    pub checkpoint_id: CheckpointId,
    pub channels: Vec<ChannelInFlight<T>>,
}

impl<T> InFlightState<T> {
    pub fn num_elements(&self) -> usize {
        self.channels.iter().map(|c| c.elements.len()).sum()
    }
}

/// Outcome of feeding one element into the unaligned capture.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureResult<T> {
    /// Deliver the element to the operator now. During an active capture,
    /// data on unsettled channels is both recorded and forwarded; channels
    /// are never blocked.
    Forward(StreamElement<T>),
    /// First barrier of a checkpoint: snapshot operator state immediately
    /// and forward the barrier downstream ahead of any buffered output.
    TriggerSnapshot(Barrier),
    /// First barrier of a checkpoint on the only unsettled channel: trigger
    /// and the in-flight portion (all empty) is complete at once.
    TriggerAndComplete {
        barrier: Barrier,
        in_flight: InFlightState<T>,
    },
    /// A further channel delivered its barrier; the capture continues on the
    /// remaining channels.
    Settled { checkpoint_id: CheckpointId },
    /// The last channel settled: the in-flight portion is final and the
    /// subtask can acknowledge. When `resume` is set, an end-of-input marker
    /// completed the capture and must still be delivered downstream.
    InFlightComplete {
        in_flight: InFlightState<T>,
        resume: Option<StreamElement<T>>,
    },
    /// A newer barrier arrived during an active capture: the old checkpoint
    /// is abandoned and the newer one triggers in the same step. `in_flight`
    /// is present when the newer capture completed immediately.
    AbortAndTrigger {
        aborted: CheckpointId,
        barrier: Barrier,
        in_flight: Option<InFlightState<T>>,
    },
    /// The active capture was abandoned. When `resume` is set, the element
    /// that caused the abort must still be processed normally.
    Aborted {
        checkpoint_id: CheckpointId,
        cause: AbortCause,
        resume: Option<StreamElement<T>>,
    },
    /// A stale barrier or duplicate cancel with no effect.
    Ignored,
}

/// Unaligned-mode capture tracker for one subtask's input.
///
/// Where the aligner trades latency for a small snapshot, this trades
/// snapshot size for latency: the first barrier triggers the local snapshot
/// immediately, and data arriving on not-yet-settled channels is recorded
/// into the checkpoint while continuing to flow. Recorded elements are
/// re-injected into the channel on restore before any new data.
#[derive(Debug)]
pub struct UnalignedCapture<T> {
    /// Input channels in declaration order.
    order: Vec<ChannelId>,
    states: HashMap<ChannelId, CaptureState>,
    newest_seen: HashMap<ChannelId, CheckpointId>,
    active: Option<Barrier>,
    in_flight: HashMap<ChannelId, Vec<StreamElement<T>>>,
    captured_elements: usize,
    max_in_flight_elements: usize,
    last_cleared: Option<CheckpointId>,
}

impl<T: Clone> UnalignedCapture<T> {
    pub fn new(channels: Vec<ChannelId>) -> Self {
        assert!(!channels.is_empty(), "capture needs at least one input channel");
        let states = channels.iter().map(|c| (*c, CaptureState::Open)).collect();
        Self {
            order: channels,
            states,
            newest_seen: HashMap::new(),
            active: None,
            in_flight: HashMap::new(),
            captured_elements: 0,
            max_in_flight_elements: 10_000,
            last_cleared: None,
        }
    }

    pub fn with_max_in_flight_elements(mut self, max: usize) -> Self {
        self.max_in_flight_elements = max;
        self
    }

    pub fn is_capturing(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_checkpoint_id(&self) -> Option<CheckpointId> {
        self.active.as_ref().map(|b| b.checkpoint_id)
    }

    pub fn num_captured_elements(&self) -> usize {
        self.captured_elements
    }

    pub fn process_element(
        &mut self,
        channel: ChannelId,
        element: StreamElement<T>,
    ) -> Result<CaptureResult<T>, CheckpointError> {
        let state = *self
            .states
            .get(&channel)
            .ok_or(CheckpointError::UnknownChannel { channel })?;
        if state == CaptureState::Closed {
            return Err(CheckpointError::ChannelClosed { channel });
        }

        match element {
            StreamElement::CheckpointBarrier(barrier) => self.on_barrier(channel, barrier),
            StreamElement::CancelMarker(marker) => Ok(self.on_cancel(marker)),
            StreamElement::End => Ok(self.on_end(channel)),
            data => Ok(self.on_data(channel, state, data)),
        }
    }

    fn on_barrier(
        &mut self,
        channel: ChannelId,
        barrier: Barrier,
    ) -> Result<CaptureResult<T>, CheckpointError> {
        if let Some(&newest) = self.newest_seen.get(&channel) {
            if barrier.checkpoint_id < newest {
                return Err(CheckpointError::BarrierOutOfOrder {
                    channel,
                    newest,
                    incoming: barrier.checkpoint_id,
                });
            }
            if barrier.checkpoint_id == newest {
                return Err(CheckpointError::DuplicateBarrier {
                    channel,
                    checkpoint_id: barrier.checkpoint_id,
                });
            }
        }
        self.newest_seen.insert(channel, barrier.checkpoint_id);

        if self.is_cleared(barrier.checkpoint_id) {
            return Ok(CaptureResult::Ignored);
        }

        let result = match self.active.as_ref().map(|b| b.checkpoint_id) {
            None => {
                self.begin(barrier.clone(), channel);
                match self.complete_if_settled() {
                    Some(in_flight) => CaptureResult::TriggerAndComplete { barrier, in_flight },
                    None => CaptureResult::TriggerSnapshot(barrier),
                }
            }
            Some(current) if barrier.checkpoint_id == current => {
                self.states.insert(channel, CaptureState::Settled);
                match self.complete_if_settled() {
                    Some(in_flight) => CaptureResult::InFlightComplete {
                        in_flight,
                        resume: None,
                    },
                    None => CaptureResult::Settled {
                        checkpoint_id: current,
                    },
                }
            }
            Some(current) if barrier.checkpoint_id > current => {
                self.abandon_capture();
                self.mark_cleared(current);
                self.begin(barrier.clone(), channel);
                CaptureResult::AbortAndTrigger {
                    aborted: current,
                    barrier,
                    in_flight: self.complete_if_settled(),
                }
            }
            Some(_) => CaptureResult::Ignored,
        };
        Ok(result)
    }

    fn on_cancel(&mut self, marker: CancelMarker) -> CaptureResult<T> {
        if self.is_cleared(marker.checkpoint_id) {
            return CaptureResult::Ignored;
        }
        match self.active.as_ref().map(|b| b.checkpoint_id) {
            Some(current) if marker.checkpoint_id >= current => {
                self.abandon_capture();
                self.mark_cleared(marker.checkpoint_id);
                CaptureResult::Aborted {
                    checkpoint_id: current,
                    cause: AbortCause::Cancelled,
                    resume: None,
                }
            }
            _ => {
                self.mark_cleared(marker.checkpoint_id);
                CaptureResult::Ignored
            }
        }
    }

    fn on_end(&mut self, channel: ChannelId) -> CaptureResult<T> {
        self.states.insert(channel, CaptureState::Closed);
        if self.active.is_some() {
            if let Some(in_flight) = self.complete_if_settled() {
                // The end marker completed the capture but still has to
                // reach downstream.
                return CaptureResult::InFlightComplete {
                    in_flight,
                    resume: Some(StreamElement::End),
                };
            }
        }
        CaptureResult::Forward(StreamElement::End)
    }

    fn on_data(
        &mut self,
        channel: ChannelId,
        state: CaptureState,
        element: StreamElement<T>,
    ) -> CaptureResult<T> {
        let active_id = self.active.as_ref().map(|b| b.checkpoint_id);
        if let (Some(current), CaptureState::Open) = (active_id, state) {
            if self.captured_elements >= self.max_in_flight_elements {
                self.abandon_capture();
                self.mark_cleared(current);
                return CaptureResult::Aborted {
                    checkpoint_id: current,
                    cause: AbortCause::BufferOverflow,
                    resume: Some(element),
                };
            }
            self.in_flight
                .entry(channel)
                .or_default()
                .push(element.clone());
            self.captured_elements += 1;
        }
        CaptureResult::Forward(element)
    }

    fn begin(&mut self, barrier: Barrier, channel: ChannelId) {
        self.active = Some(barrier);
        self.in_flight.clear();
        self.captured_elements = 0;
        self.states.insert(channel, CaptureState::Settled);
    }

    /// Finalizes the capture once no channel remains open, returning the
    /// per-channel in-flight records in declaration order.
    fn complete_if_settled(&mut self) -> Option<InFlightState<T>> {
        let barrier = self.active.as_ref()?;
        let settled = self.states.values().all(|s| *s != CaptureState::Open);
        if !settled {
            return None;
        }
        let checkpoint_id = barrier.checkpoint_id;
        let channels = self
            .order
            .iter()
            .map(|channel| ChannelInFlight {
                channel: *channel,
                elements: self.in_flight.remove(channel).unwrap_or_default(),
            })
            .collect();
        self.finish_capture(checkpoint_id);
        Some(InFlightState {
            checkpoint_id,
            channels,
        })
    }

    fn finish_capture(&mut self, checkpoint_id: CheckpointId) {
        self.active = None;
        self.in_flight.clear();
        self.captured_elements = 0;
        self.unsettle_all();
        self.mark_cleared(checkpoint_id);
    }

    fn abandon_capture(&mut self) {
        self.active = None;
        self.in_flight.clear();
        self.captured_elements = 0;
        self.unsettle_all();
    }

    fn unsettle_all(&mut self) {
        for state in self.states.values_mut() {
            if *state == CaptureState::Settled {
                *state = CaptureState::Open;
            }
        }
    }

    fn is_cleared(&self, checkpoint_id: CheckpointId) -> bool {
        self.last_cleared.is_some_and(|c| checkpoint_id <= c)
    }

    fn mark_cleared(&mut self, checkpoint_id: CheckpointId) {
        self.last_cleared = Some(match self.last_cleared {
            Some(current) => current.max(checkpoint_id),
            None => checkpoint_id,
        });
    }
}
