//! Streamed message sections and the storage they are written to.
//!
//! Storage is pluggable: a [`SinkFactory`] decides where each section's bytes
//! go (memory, a temporary file, a cache) and is told through
//! [`SinkFactory::commit`] once a section is complete and its UID is known.
//! The [`FetchContext`] owns every stream until the caller takes it.

use std::fmt;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use crate::config::DEFAULT_MEMORY_THRESHOLD;
use crate::summary::Annotation;
use crate::types::{Flags, MessageId, SeqNum, Uid};
use crate::{Error, Result};

/// Storage a section can be written to and read back from.
pub trait SectionStore: Read + Write + Seek + Send {}

impl<T: Read + Write + Seek + Send> SectionStore for T {}

/// Owned, type-erased section storage.
pub type SectionStream = Box<dyn SectionStore>;

/// Identity of a section about to be stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionKey<'a> {
    /// Sequence number of the message.
    pub seq: SeqNum,
    /// UID, if it arrived before the section.
    pub uid: Option<Uid>,
    /// Section specifier (`""`, `TEXT`, `1.2`, ...).
    pub spec: &'a str,
    /// Origin of a partial fetch.
    pub origin: Option<u64>,
}

/// Creates storage for incoming sections.
pub trait SinkFactory: Send {
    /// Creates storage for a section of `len` bytes.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the storage cannot be created; the fetch is
    /// then aborted.
    fn create(&mut self, key: &SectionKey<'_>, len: usize) -> io::Result<SectionStream>;

    /// Called exactly once per section, after its bytes are complete and its
    /// UID is known.
    fn commit(&mut self, _section: &Section) {}
}

/// Keeps small sections in memory and spills large ones to a temporary file.
#[derive(Debug, Clone, Copy)]
pub struct DefaultSinkFactory {
    memory_threshold: usize,
}

impl Default for DefaultSinkFactory {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_THRESHOLD)
    }
}

impl DefaultSinkFactory {
    /// Creates a factory that spills sections larger than `memory_threshold`.
    #[must_use]
    pub const fn new(memory_threshold: usize) -> Self {
        Self { memory_threshold }
    }

    /// Largest section kept in memory.
    #[must_use]
    pub const fn memory_threshold(&self) -> usize {
        self.memory_threshold
    }

    /// Returns true if a section of `len` bytes goes to a temporary file.
    #[must_use]
    pub const fn spills(&self, len: usize) -> bool {
        len > self.memory_threshold
    }
}

impl SinkFactory for DefaultSinkFactory {
    fn create(&mut self, key: &SectionKey<'_>, len: usize) -> io::Result<SectionStream> {
        if self.spills(len) {
            tracing::debug!(
                seq = key.seq.get(),
                spec = key.spec,
                bytes = len,
                "spilling section to temporary file"
            );
            Ok(Box::new(tempfile::tempfile()?))
        } else {
            Ok(Box::new(Cursor::new(Vec::with_capacity(len))))
        }
    }
}

/// Receives cumulative progress while a literal is streamed.
pub trait TransferProgress: Send {
    /// `transferred` of `total` bytes of the current section have arrived.
    fn report(&mut self, transferred: u64, total: u64);
}

/// A retrievable slice of a message.
pub struct Section {
    seq: SeqNum,
    uid: Option<Uid>,
    spec: String,
    origin: Option<u64>,
    length: u64,
    stream: SectionStream,
    committed: bool,
}

impl fmt::Debug for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Section")
            .field("seq", &self.seq)
            .field("uid", &self.uid)
            .field("spec", &self.spec)
            .field("origin", &self.origin)
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

impl Section {
    /// Wraps a fully written stream, rewinding it to the start.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be rewound.
    pub fn new(
        key: &SectionKey<'_>,
        length: u64,
        mut stream: SectionStream,
    ) -> io::Result<Self> {
        stream.flush()?;
        stream.seek(SeekFrom::Start(0))?;
        Ok(Self {
            seq: key.seq,
            uid: key.uid,
            spec: key.spec.to_string(),
            origin: key.origin,
            length,
            stream,
            committed: false,
        })
    }

    /// Sequence number of the message.
    #[must_use]
    pub const fn seq(&self) -> SeqNum {
        self.seq
    }

    /// UID of the message, once known.
    #[must_use]
    pub const fn uid(&self) -> Option<Uid> {
        self.uid
    }

    /// Section specifier.
    #[must_use]
    pub fn spec(&self) -> &str {
        &self.spec
    }

    /// Origin of a partial fetch.
    #[must_use]
    pub const fn origin(&self) -> Option<u64> {
        self.origin
    }

    /// Number of bytes stored.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.length
    }

    /// Returns true if the section is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Returns true if the section is addressed by `id`, `spec` and `origin`.
    #[must_use]
    pub fn matches(&self, id: MessageId, spec: &str, origin: Option<u64>) -> bool {
        let id_matches = match id {
            MessageId::Seq(seq) => self.seq == seq,
            MessageId::Uid(uid) => self.uid == Some(uid),
        };
        id_matches && self.origin == origin && self.spec.eq_ignore_ascii_case(spec)
    }

    /// Gives up ownership of the stream, positioned at the start.
    #[must_use]
    pub fn into_stream(self) -> SectionStream {
        self.stream
    }

    /// Reads the whole section into memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be read.
    pub fn read_to_vec(&mut self) -> io::Result<Vec<u8>> {
        self.stream.seek(SeekFrom::Start(0))?;
        let mut data = Vec::new();
        self.stream.read_to_end(&mut data)?;
        self.stream.seek(SeekFrom::Start(0))?;
        Ok(data)
    }
}

/// Change observed for a message while its sections were streamed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchEvent {
    /// FLAGS arrived.
    FlagsChanged {
        /// Sequence number.
        seq: SeqNum,
        /// UID, if the response carried one.
        uid: Option<Uid>,
        /// New flags.
        flags: Flags,
    },
    /// X-GM-LABELS arrived.
    LabelsChanged {
        /// Sequence number.
        seq: SeqNum,
        /// UID, if the response carried one.
        uid: Option<Uid>,
        /// New labels.
        labels: Vec<String>,
    },
    /// MODSEQ arrived.
    ModSeqChanged {
        /// Sequence number.
        seq: SeqNum,
        /// UID, if the response carried one.
        uid: Option<Uid>,
        /// New mod-sequence.
        mod_seq: u64,
    },
    /// ANNOTATION arrived.
    AnnotationsChanged {
        /// Sequence number.
        seq: SeqNum,
        /// UID, if the response carried one.
        uid: Option<Uid>,
        /// New annotations.
        annotations: Vec<Annotation>,
    },
}

impl FetchEvent {
    /// Sequence number the event belongs to.
    #[must_use]
    pub const fn seq(&self) -> SeqNum {
        match self {
            Self::FlagsChanged { seq, .. }
            | Self::LabelsChanged { seq, .. }
            | Self::ModSeqChanged { seq, .. }
            | Self::AnnotationsChanged { seq, .. } => *seq,
        }
    }

    /// UID the event belongs to, if known.
    #[must_use]
    pub const fn uid(&self) -> Option<Uid> {
        match self {
            Self::FlagsChanged { uid, .. }
            | Self::LabelsChanged { uid, .. }
            | Self::ModSeqChanged { uid, .. }
            | Self::AnnotationsChanged { uid, .. } => *uid,
        }
    }

    pub(crate) const fn set_uid(&mut self, new_uid: Uid) {
        match self {
            Self::FlagsChanged { uid, .. }
            | Self::LabelsChanged { uid, .. }
            | Self::ModSeqChanged { uid, .. }
            | Self::AnnotationsChanged { uid, .. } => *uid = Some(new_uid),
        }
    }
}

/// Sections collected for one in-flight command.
pub struct FetchContext {
    sections: Vec<Section>,
    factory: Box<dyn SinkFactory>,
    progress: Option<Box<dyn TransferProgress>>,
}

impl fmt::Debug for FetchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchContext")
            .field("sections", &self.sections)
            .field("has_progress", &self.progress.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for FetchContext {
    fn default() -> Self {
        Self::new(DefaultSinkFactory::default())
    }
}

impl FetchContext {
    /// Creates a context that stores sections through `factory`.
    pub fn new(factory: impl SinkFactory + 'static) -> Self {
        Self::with_boxed_factory(Box::new(factory))
    }

    /// Creates a context from an already boxed factory.
    #[must_use]
    pub fn with_boxed_factory(factory: Box<dyn SinkFactory>) -> Self {
        Self {
            sections: Vec::new(),
            factory,
            progress: None,
        }
    }

    /// Installs a progress observer.
    #[must_use]
    pub fn with_progress(mut self, progress: impl TransferProgress + 'static) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    pub(crate) fn create_stream(
        &mut self,
        key: &SectionKey<'_>,
        len: usize,
    ) -> io::Result<SectionStream> {
        self.factory.create(key, len)
    }

    pub(crate) fn report_progress(&mut self, transferred: u64, total: u64) {
        if let Some(progress) = self.progress.as_mut() {
            progress.report(transferred, total);
        }
    }

    /// Adds a completed section, replacing an earlier delivery of the same
    /// section for the same message.
    pub fn insert(&mut self, section: Section) {
        let duplicate = self.sections.iter().position(|s| {
            s.seq == section.seq
                && s.origin == section.origin
                && s.spec.eq_ignore_ascii_case(&section.spec)
        });
        if let Some(index) = duplicate {
            tracing::debug!(
                seq = section.seq.get(),
                spec = %section.spec,
                "replacing duplicate section"
            );
            drop(self.sections.swap_remove(index));
        }
        self.sections.push(section);
        self.commit_ready();
    }

    /// Assigns a UID to every section of `seq` that lacks one.
    pub fn assign_uid(&mut self, seq: SeqNum, uid: Uid) {
        for section in self.sections.iter_mut().filter(|s| s.seq == seq) {
            section.uid = Some(uid);
        }
        self.commit_ready();
    }

    fn commit_ready(&mut self) {
        for section in &mut self.sections {
            if section.uid.is_some() && !section.committed {
                section.committed = true;
                self.factory.commit(section);
            }
        }
    }

    /// Removes and returns the section addressed by `id`, `spec` and `origin`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the response did not contain it.
    pub fn take(&mut self, id: MessageId, spec: &str, origin: Option<u64>) -> Result<Section> {
        let index = self
            .sections
            .iter()
            .position(|s| s.matches(id, spec, origin))
            .ok_or_else(|| {
                let origin = origin.map(|o| format!("<{o}>")).unwrap_or_default();
                Error::NotFound(format!("{id} BODY[{spec}]{origin}"))
            })?;
        Ok(self.sections.remove(index))
    }

    /// Returns the sections in arrival order.
    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter()
    }

    /// Number of sections held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    /// Returns true if no sections are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Releases every section, in arrival order.
    #[must_use]
    pub fn into_sections(self) -> Vec<Section> {
        self.sections
    }

    /// Drops every section and its storage.
    pub fn dispose(&mut self) {
        if !self.sections.is_empty() {
            tracing::debug!(count = self.sections.len(), "disposing sections");
        }
        self.sections.clear();
    }
}
