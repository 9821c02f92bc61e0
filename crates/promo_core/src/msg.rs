use crate::StreamEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// Caller kicked off the request; opens the channel for index 0.
    GenerateRequested,
    /// A decoded event arrived on the channel for `index`.
    ChannelEvent { index: usize, event: StreamEvent },
    /// The channel for `index` reached its sentinel (or closed early).
    ChannelClosed { index: usize },
    /// External cancellation of the whole request.
    CancelRequested,
}
