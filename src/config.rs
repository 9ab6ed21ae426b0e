/// Tunables for [`crate::provider::PlugProvider`].
///
/// None of these affect correctness; they bound how much work a single `run()` drain is willing
/// to do before returning control to the caller's loop.
#[derive(Debug, Clone, Copy)]
pub struct ProviderConfig {
    /// Receive buffer size, in bytes, for both the devlink monitor socket and the uevent socket.
    pub recv_buffer_size: usize,
    /// Maximum number of messages drained from a single socket in one `run()` call before moving
    /// on to the next socket. `0` means unbounded (drain to `EWOULDBLOCK`).
    pub drain_batch_limit: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            recv_buffer_size: 16 * 1024,
            drain_batch_limit: 0,
        }
    }
}

impl ProviderConfig {
    pub fn builder() -> ProviderConfigBuilder {
        ProviderConfigBuilder(Self::default())
    }
}

/// Builder for [`ProviderConfig`], matching the builder style used elsewhere in this crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderConfigBuilder(ProviderConfig);

impl ProviderConfigBuilder {
    pub fn recv_buffer_size(mut self, size: usize) -> Self {
        self.0.recv_buffer_size = size;
        self
    }

    pub fn drain_batch_limit(mut self, limit: usize) -> Self {
        self.0.drain_batch_limit = limit;
        self
    }

    pub fn build(self) -> ProviderConfig {
        self.0
    }
}
