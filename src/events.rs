//! Event types for the PetalSonic bridge

#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// A renderer was bound and pulls may now produce audio
    RendererBound,
    /// The renderer was unbound; pulls starve until another one is bound
    RendererUnbound,
    /// The ring was reallocated for a new audio configuration
    Reconfigured {
        capacity: usize,
        channels: u16,
    },
    /// A host pull could not be served in full
    Underrun {
        requested: usize,
        delivered: usize,
    },
    /// A write overran the ring and unread samples were dropped
    OverflowReset {
        discarded: u64,
    },
    /// The host asked for a different channel count than the bridge was configured with
    ChannelMismatch {
        expected: u16,
        actual: u16,
    },
    /// The output stream reported an error
    StreamError {
        error: String,
    },
}

impl BridgeEvent {
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::Underrun { .. }
                | Self::OverflowReset { .. }
                | Self::ChannelMismatch { .. }
                | Self::StreamError { .. }
        )
    }
}

/// Snapshot of the bridge counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Samples copied into the ring by the producer
    pub samples_rendered: u64,
    /// Samples copied out of the ring by the consumer
    pub samples_consumed: u64,
    /// Pulls that delivered fewer samples than requested
    pub underruns: u64,
    /// Writes that overran the ring
    pub overflow_resets: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_events_are_not_errors() {
        assert!(!BridgeEvent::RendererBound.is_error());
        assert!(!BridgeEvent::RendererUnbound.is_error());
        assert!(
            !BridgeEvent::Reconfigured {
                capacity: 40,
                channels: 2
            }
            .is_error()
        );
    }

    #[test]
    fn degraded_audio_events_are_errors() {
        assert!(
            BridgeEvent::Underrun {
                requested: 20,
                delivered: 8
            }
            .is_error()
        );
        assert!(BridgeEvent::OverflowReset { discarded: 4 }.is_error());
        assert!(
            BridgeEvent::ChannelMismatch {
                expected: 2,
                actual: 1
            }
            .is_error()
        );
    }
}
