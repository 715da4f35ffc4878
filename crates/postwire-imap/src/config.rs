//! Engine configuration.

use crate::quirks::ServerType;

/// Default maximum number of commands in flight at once.
pub const DEFAULT_MAX_DEPTH: usize = 4;

/// Upper bound on the pipeline depth.
pub const MAX_PIPELINE_DEPTH: usize = 16;

/// Default size of the tokenizer's read buffer.
pub const DEFAULT_READ_BUFFER: usize = 8 * 1024;

/// Default chunk size used when streaming literal payloads.
pub const DEFAULT_LITERAL_CHUNK: usize = 16 * 1024;

/// Sections larger than this are spilled to a temporary file by default.
pub const DEFAULT_MEMORY_THRESHOLD: usize = 1024 * 1024;

/// Largest literal the parsers will read into memory.
pub const DEFAULT_MAX_LITERAL_SIZE: usize = 16 * 1024 * 1024;

/// Configuration for an [`Engine`](crate::Engine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Prefix character for generated tags.
    pub tag_prefix: char,
    /// Whether independent commands may be sent before earlier ones complete.
    pub pipelining: bool,
    /// Maximum number of commands in flight.
    pub max_pipeline_depth: usize,
    /// Initial capacity of the read buffer.
    pub read_buffer_size: usize,
    /// Chunk size for streaming literal payloads into section storage.
    pub literal_chunk_size: usize,
    /// Section size above which the default sink factory uses a temp file.
    pub memory_threshold: usize,
    /// Largest literal read into memory by the response parsers. Section
    /// payloads are streamed and not subject to this limit.
    pub max_literal_size: usize,
    /// Server type to assume instead of detecting it from capabilities.
    pub server_type: Option<ServerType>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tag_prefix: 'A',
            pipelining: true,
            max_pipeline_depth: DEFAULT_MAX_DEPTH,
            read_buffer_size: DEFAULT_READ_BUFFER,
            literal_chunk_size: DEFAULT_LITERAL_CHUNK,
            memory_threshold: DEFAULT_MEMORY_THRESHOLD,
            max_literal_size: DEFAULT_MAX_LITERAL_SIZE,
            server_type: None,
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }
}

/// Builder for [`EngineConfig`].
#[derive(Debug, Clone)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineConfigBuilder {
    /// Creates a builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    /// Sets the tag prefix.
    #[must_use]
    pub const fn tag_prefix(mut self, prefix: char) -> Self {
        self.config.tag_prefix = prefix;
        self
    }

    /// Enables or disables pipelining.
    #[must_use]
    pub const fn pipelining(mut self, enabled: bool) -> Self {
        self.config.pipelining = enabled;
        self
    }

    /// Sets the maximum pipeline depth (clamped to `1..=MAX_PIPELINE_DEPTH`).
    #[must_use]
    pub const fn max_pipeline_depth(mut self, depth: usize) -> Self {
        self.config.max_pipeline_depth = if depth == 0 {
            1
        } else if depth > MAX_PIPELINE_DEPTH {
            MAX_PIPELINE_DEPTH
        } else {
            depth
        };
        self
    }

    /// Sets the read buffer capacity.
    #[must_use]
    pub const fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Sets the literal streaming chunk size (at least 1 byte).
    #[must_use]
    pub const fn literal_chunk_size(mut self, size: usize) -> Self {
        self.config.literal_chunk_size = if size == 0 { 1 } else { size };
        self
    }

    /// Sets the in-memory threshold for section storage.
    #[must_use]
    pub const fn memory_threshold(mut self, bytes: usize) -> Self {
        self.config.memory_threshold = bytes;
        self
    }

    /// Sets the largest literal the parsers will buffer in memory.
    #[must_use]
    pub const fn max_literal_size(mut self, bytes: usize) -> Self {
        self.config.max_literal_size = bytes;
        self
    }

    /// Forces a server type instead of detecting it.
    #[must_use]
    pub const fn server_type(mut self, server_type: ServerType) -> Self {
        self.config.server_type = Some(server_type);
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> EngineConfig {
        self.config
    }
}
