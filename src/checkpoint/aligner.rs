use super::*;

/// What an input channel is currently doing with respect to alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelState {
    /// Flowing freely.
    Open,
    /// Delivered its barrier for the pending checkpoint; data behind the
    /// barrier is withheld until the alignment resolves.
    Blocked(CheckpointId),
    /// Reached end of input.
    Closed,
}

/// Why a pending alignment was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortCause {
    /// A barrier for a newer checkpoint arrived while this one was still
    /// aligning; the newer one can still succeed, this one cannot.
    SupersededBy(CheckpointId),
    /// A cancel marker arrived.
    Cancelled,
    /// The withheld-element budget was exhausted.
    BufferOverflow,
}

/// Outcome of feeding one element into the aligner.
#[derive(Debug, Clone, PartialEq)]
pub enum AlignResult<T> {
    /// Deliver the element to the operator now.
    Forward(StreamElement<T>),
    /// The element was withheld (data behind a blocked channel) or consumed
    /// (a barrier that did not yet complete the alignment).
    Buffering,
    /// Every live channel delivered its barrier. Take the snapshot, then
    /// replay `buffered` in arrival order before reading new input.
    Aligned {
        barrier: Barrier,
        /// An older checkpoint this barrier aborted in the same step, to be
        /// declined upstream. Set when a superseding barrier finds every
        /// other channel already closed.
        superseded: Option<CheckpointId>,
        buffered: Vec<(ChannelId, StreamElement<T>)>,
    },
    /// The pending alignment was abandoned. Replay `drained` in arrival
    /// order; the checkpoint must be declined upstream.
    Aborted {
        checkpoint_id: CheckpointId,
        cause: AbortCause,
        drained: Vec<(ChannelId, StreamElement<T>)>,
    },
    /// A stale barrier or duplicate cancel with no effect.
    Ignored,
}

/// Aligned-mode barrier tracker for one subtask's input.
///
/// Feed every incoming element through [`process_element`]; the result says
/// whether to forward it, hold it, snapshot, or abort. At most one
/// checkpoint is ever tracked at a time; a newer barrier supersedes an
/// unfinished older alignment rather than queueing behind it.
///
/// [`process_element`]: BarrierAligner::process_element
#[derive(Debug)]
pub struct BarrierAligner<T> {
    channel_states: HashMap<ChannelId, ChannelState>,
    /// Newest barrier id seen per channel, for the in-order guarantee.
    newest_seen: HashMap<ChannelId, CheckpointId>,
    pending: Option<Barrier>,
    buffered: VecDeque<(ChannelId, StreamElement<T>)>,
    max_buffered_elements: usize,
    /// High-water mark of checkpoints already completed, aborted, or
    /// cancelled here. Anything at or below is stale.
    last_cleared: Option<CheckpointId>,
}

impl<T> BarrierAligner<T> {
    pub fn new(channels: Vec<ChannelId>) -> Self {
        assert!(!channels.is_empty(), "aligner needs at least one input channel");
        Self {
            channel_states: channels.into_iter().map(|c| (c, ChannelState::Open)).collect(),
            newest_seen: HashMap::new(),
            pending: None,
            buffered: VecDeque::new(),
            max_buffered_elements: 10_000,
            last_cleared: None,
        }
    }

    pub fn with_max_buffered_elements(mut self, max: usize) -> Self {
        self.max_buffered_elements = max;
        self
    }

    pub fn is_aligning(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending_checkpoint_id(&self) -> Option<CheckpointId> {
        self.pending.as_ref().map(|b| b.checkpoint_id)
    }

    pub fn num_buffered(&self) -> usize {
        self.buffered.len()
    }

    /// Whether the channel is currently withheld from consumption. The data
    /// path uses this as its backpressure signal.
    pub fn is_channel_blocked(&self, channel: ChannelId) -> bool {
        matches!(
            self.channel_states.get(&channel),
            Some(ChannelState::Blocked(_))
        )
    }

    pub fn num_open_channels(&self) -> usize {
        self.channel_states
            .values()
            .filter(|s| **s != ChannelState::Closed)
            .count()
    }

    pub fn process_element(
        &mut self,
        channel: ChannelId,
        element: StreamElement<T>,
    ) -> Result<AlignResult<T>, CheckpointError> {
        let state = *self
            .channel_states
            .get(&channel)
            .ok_or(CheckpointError::UnknownChannel { channel })?;
        if state == ChannelState::Closed {
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
    ) -> Result<AlignResult<T>, CheckpointError> {
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
            // The checkpoint already resolved here; the straggler barrier
            // carries no work.
            return Ok(AlignResult::Ignored);
        }

        let result = match self.pending.as_ref().map(|b| b.checkpoint_id) {
            None => {
                self.pending = Some(barrier);
                self.channel_states
                    .insert(channel, ChannelState::Blocked(barrier.checkpoint_id));
                self.resolve_if_complete(barrier, None)
            }
            Some(current) if barrier.checkpoint_id == current => {
                self.channel_states
                    .insert(channel, ChannelState::Blocked(barrier.checkpoint_id));
                self.resolve_if_complete(barrier, None)
            }
            Some(current) if barrier.checkpoint_id > current => {
                // The coordinator has moved on; the unfinished alignment can
                // never complete and blocks progress if kept.
                let drained = self.abandon_pending();
                self.mark_cleared(current);
                self.pending = Some(barrier);
                self.channel_states
                    .insert(channel, ChannelState::Blocked(barrier.checkpoint_id));
                match self.resolve_if_complete(barrier, Some(current)) {
                    // Possible when every other channel is already closed.
                    AlignResult::Aligned {
                        barrier,
                        superseded,
                        buffered,
                    } => {
                        // Elements released by the abort precede the
                        // superseding barrier in arrival order.
                        let mut replay = drained;
                        replay.extend(buffered);
                        AlignResult::Aligned {
                            barrier,
                            superseded,
                            buffered: replay,
                        }
                    }
                    _ => AlignResult::Aborted {
                        checkpoint_id: current,
                        cause: AbortCause::SupersededBy(barrier.checkpoint_id),
                        drained,
                    },
                }
            }
            // Older than the pending checkpoint: it was implicitly abandoned
            // when the pending one started on another channel.
            Some(_) => AlignResult::Ignored,
        };
        Ok(result)
    }

    fn on_cancel(&mut self, marker: CancelMarker) -> AlignResult<T> {
        if self.is_cleared(marker.checkpoint_id) {
            // Duplicate delivery on other channels is expected.
            return AlignResult::Ignored;
        }
        match self.pending.as_ref().map(|b| b.checkpoint_id) {
            Some(current) if marker.checkpoint_id >= current => {
                let drained = self.abandon_pending();
                self.mark_cleared(marker.checkpoint_id);
                AlignResult::Aborted {
                    checkpoint_id: current,
                    cause: AbortCause::Cancelled,
                    drained,
                }
            }
            _ => {
                // No matching alignment: remember the id so a late barrier
                // for it is ignored instead of starting a doomed alignment.
                self.mark_cleared(marker.checkpoint_id);
                AlignResult::Ignored
            }
        }
    }

    fn on_end(&mut self, channel: ChannelId) -> AlignResult<T> {
        self.channel_states.insert(channel, ChannelState::Closed);
        match self.pending.clone() {
            Some(barrier) => {
                // The finished channel can no longer deliver its barrier, so
                // it stops counting toward the alignment. Its end marker is
                // replayed with the withheld elements.
                self.buffered.push_back((channel, StreamElement::End));
                self.resolve_if_complete(barrier, None)
            }
            None => AlignResult::Forward(StreamElement::End),
        }
    }

    fn on_data(
        &mut self,
        channel: ChannelId,
        state: ChannelState,
        element: StreamElement<T>,
    ) -> AlignResult<T> {
        let pending_id = self.pending.as_ref().map(|b| b.checkpoint_id);
        match (pending_id, state) {
            (Some(current), ChannelState::Blocked(_)) => {
                if self.buffered.len() >= self.max_buffered_elements {
                    let mut drained = self.abandon_pending();
                    drained.push((channel, element));
                    self.mark_cleared(current);
                    return AlignResult::Aborted {
                        checkpoint_id: current,
                        cause: AbortCause::BufferOverflow,
                        drained,
                    };
                }
                self.buffered.push_back((channel, element));
                AlignResult::Buffering
            }
            _ => AlignResult::Forward(element),
        }
    }

    /// Completes the pending alignment when no channel is still open.
    fn resolve_if_complete(
        &mut self,
        barrier: Barrier,
        superseded: Option<CheckpointId>,
    ) -> AlignResult<T> {
        let complete = self
            .channel_states
            .values()
            .all(|s| *s != ChannelState::Open);
        if !complete {
            return AlignResult::Buffering;
        }
        self.pending = None;
        self.unblock_all();
        self.mark_cleared(barrier.checkpoint_id);
        let buffered = self.buffered.drain(..).collect();
        AlignResult::Aligned {
            barrier,
            superseded,
            buffered,
        }
    }

    /// Drops the pending alignment and releases everything withheld for it.
    fn abandon_pending(&mut self) -> Vec<(ChannelId, StreamElement<T>)> {
        self.pending = None;
        self.unblock_all();
        self.buffered.drain(..).collect()
    }

    fn unblock_all(&mut self) {
        for state in self.channel_states.values_mut() {
            if matches!(state, ChannelState::Blocked(_)) {
                *state = ChannelState::Open;
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
