//! Dispatcher configuration.

/// Default length of generated subscription keys and event ids.
pub const DEFAULT_KEY_LENGTH: usize = 24;

/// Configuration for a [`Dispatcher`](crate::Dispatcher).
#[derive(Clone, Debug)]
pub struct DispatcherConfig {
    /// Length of generated subscription keys and event ids.
    /// Default: 24
    pub key_length: usize,

    /// Delete trie nodes left with no records and no children on unsubscribe.
    /// Default: true
    pub prune_empty_nodes: bool,

    /// Catch handler panics and report them as delivery errors.
    /// Default: true
    pub catch_panics: bool,

    /// Queue size used by `subscribe_channel` when none is given.
    /// Default: 1000
    pub channel_buffer_size: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            key_length: DEFAULT_KEY_LENGTH,
            prune_empty_nodes: true,
            catch_panics: true,
            channel_buffer_size: 1000,
        }
    }
}
