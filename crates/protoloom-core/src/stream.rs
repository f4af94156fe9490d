//! Sequences of varint-length-prefixed messages over one byte source.
//!
//! ## Framing
//!
//! Each message is written as `varint(len) || message bytes`, back to back,
//! with nothing marking the end of the stream: a clean end of input between
//! two messages ends the sequence.
//!
//! ## Size guard
//!
//! The reader's size guard is re-armed before every message, so the limit
//! bounds each message on its own rather than the stream as a whole. Buffer
//! refills never touch it.
//!
//! ## Failure
//!
//! The first decode failure is returned and the reader stops: once one
//! length prefix is wrong the framing of everything after it is unknown.

use crate::descriptor::MessageDescriptor;
use crate::error::Result;
use crate::extension::ExtensionRegistry;
use crate::message::{DecodeOptions, Message, RuntimeMode};
use crate::wire::WireReader;
use std::io::{self, Read, Write};
use std::iter::FusedIterator;
use tracing::debug;

/// Single-pass reader of length-prefixed messages
#[derive(Debug)]
pub struct MessageStreamReader<'a, R> {
    reader: WireReader<R>,
    descriptor: MessageDescriptor,
    registry: &'a ExtensionRegistry,
    mode: RuntimeMode,
    messages_read: u64,
    finished: bool,
}

impl<R: Read> MessageStreamReader<'static, R> {
    /// Reads messages of type `descriptor` with default options
    pub fn new(source: R, descriptor: &MessageDescriptor) -> Self {
        Self::with_options(source, descriptor, &DecodeOptions::default())
    }

    /// Reads messages of type `descriptor` with the given options
    pub fn with_options(source: R, descriptor: &MessageDescriptor, options: &DecodeOptions) -> Self {
        Self {
            reader: options.reader(source),
            descriptor: descriptor.clone(),
            registry: ExtensionRegistry::empty(),
            mode: options.mode,
            messages_read: 0,
            finished: false,
        }
    }
}

impl<'a, R: Read> MessageStreamReader<'a, R> {
    /// Resolves extensions through `registry`
    pub fn with_registry<'b>(self, registry: &'b ExtensionRegistry) -> MessageStreamReader<'b, R> {
        MessageStreamReader {
            reader: self.reader,
            descriptor: self.descriptor,
            registry,
            mode: self.mode,
            messages_read: self.messages_read,
            finished: self.finished,
        }
    }

    /// Sets the per-message size limit
    pub fn with_size_limit(mut self, limit: u64) -> Self {
        self.reader.set_size_limit(limit);
        self
    }

    /// Sets the nesting limit
    pub fn with_recursion_limit(mut self, limit: u32) -> Self {
        self.reader.set_recursion_limit(limit);
        self
    }

    /// Sets the runtime mode
    pub fn with_mode(mut self, mode: RuntimeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Messages yielded so far
    pub fn messages_read(&self) -> u64 {
        self.messages_read
    }

    /// Reads the next message, or `None` at a clean end of input
    pub fn read_next(&mut self) -> Result<Option<Message>> {
        if self.finished {
            return Ok(None);
        }
        match self.read_one() {
            Ok(None) => {
                debug!(messages = self.messages_read, "end of message stream");
                self.finished = true;
                Ok(None)
            }
            Ok(Some(message)) => {
                self.messages_read += 1;
                Ok(Some(message))
            }
            Err(e) => {
                debug!(
                    messages = self.messages_read,
                    offset = self.reader.position(),
                    error = %e,
                    "message stream failed"
                );
                self.finished = true;
                Err(e)
            }
        }
    }

    fn read_one(&mut self) -> Result<Option<Message>> {
        self.reader.reset_size_counter();
        if self.reader.is_at_end()? {
            return Ok(None);
        }
        let len = self.reader.read_length()?;
        debug!(index = self.messages_read, len, "reading stream message");

        let previous = self.reader.push_limit(len)?;
        let message = Message::decode_from(&self.descriptor, &mut self.reader, self.registry, self.mode)?;
        self.reader.pop_limit(previous);
        Ok(Some(message))
    }

    /// Returns the underlying source
    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }
}

impl<R: Read> Iterator for MessageStreamReader<'_, R> {
    type Item = Result<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_next().transpose()
    }
}

impl<R: Read> FusedIterator for MessageStreamReader<'_, R> {}

/// Writes length-prefixed messages readable by [`MessageStreamReader`]
#[derive(Debug)]
pub struct MessageStreamWriter<W> {
    sink: W,
    messages_written: u64,
}

impl<W: Write> MessageStreamWriter<W> {
    #[allow(missing_docs)]
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            messages_written: 0,
        }
    }

    /// Appends one message
    pub fn write(&mut self, message: &Message) -> Result<()> {
        let bytes = message.encode_length_delimited_to_vec()?;
        self.sink.write_all(&bytes)?;
        self.messages_written += 1;
        Ok(())
    }

    /// Flushes the sink
    pub fn flush(&mut self) -> Result<()> {
        self.sink.flush()?;
        Ok(())
    }

    /// Messages written so far
    pub fn messages_written(&self) -> u64 {
        self.messages_written
    }

    /// Returns the sink
    pub fn into_inner(self) -> W {
        self.sink
    }
}

/// A re-iterable message stream.
///
/// Holds a provider that opens the byte source; each [`iter`](Self::iter)
/// call opens it afresh, so the stream can be walked any number of times as
/// long as the source can be re-opened.
pub struct MessageStream<'a, F> {
    provider: F,
    descriptor: MessageDescriptor,
    registry: &'a ExtensionRegistry,
    options: DecodeOptions,
}

impl<F, R> MessageStream<'static, F>
where
    F: Fn() -> io::Result<R>,
    R: Read,
{
    /// Creates a stream of `descriptor` messages over sources from `provider`
    pub fn new(descriptor: &MessageDescriptor, provider: F) -> Self {
        Self {
            provider,
            descriptor: descriptor.clone(),
            registry: ExtensionRegistry::empty(),
            options: DecodeOptions::default(),
        }
    }
}

impl<'a, F, R> MessageStream<'a, F>
where
    F: Fn() -> io::Result<R>,
    R: Read,
{
    /// Resolves extensions through `registry`
    pub fn with_registry<'b>(self, registry: &'b ExtensionRegistry) -> MessageStream<'b, F> {
        MessageStream {
            provider: self.provider,
            descriptor: self.descriptor,
            registry,
            options: self.options,
        }
    }

    /// Replaces the decode options
    pub fn with_options(mut self, options: DecodeOptions) -> Self {
        self.options = options;
        self
    }

    /// Opens the source and returns a reader positioned at its start
    pub fn iter(&self) -> Result<MessageStreamReader<'a, R>> {
        let source = (self.provider)()?;
        Ok(MessageStreamReader::with_options(source, &self.descriptor, &self.options)
            .with_registry(self.registry))
    }
}

impl<F> std::fmt::Debug for MessageStream<'_, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageStream")
            .field("descriptor", &self.descriptor)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
