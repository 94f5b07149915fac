#[cfg(test)] use mockall::automock;

/// Result of a non-blocking read from the stream
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes were copied into the buffer. `Data(0)` means that nothing is available right
    ///  now, which is *not* an error
    Data(usize),
    /// The stream has a discontinuity (e.g. data was lost), so the current stream position can
    ///  not be trusted to be aligned with frame boundaries any more
    Broken,
}

/// How the transport should push buffered data out after a frame was written
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FlushMode {
    /// do not request a flush
    None,
    /// mark the data as ready for delivery, without soliciting acknowledgements
    #[default]
    Passive,
    /// deliver and actively solicit acknowledgements from receivers
    Active,
}

/// The sending half of a stream transport. Writes are non-blocking and best effort: a transport
///  with a full transmit buffer accepts only part of the data (or nothing at all).
///
/// Implementations are expected to treat the start of every write call as a potential frame
///  boundary, so that [StreamReader::seek_frame_start] can find it on the receiving side.
#[cfg_attr(test, automock)]
pub trait StreamWriter: Send {
    /// returns the number of bytes the transport accepted
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize>;

    fn flush(&mut self, blocking: bool, mode: FlushMode) -> std::io::Result<()>;
}

/// The receiving half of a stream transport. All operations are non-blocking. An `Err` is an
///  unrecoverable transport failure, as opposed to [ReadOutcome::Broken] which the receiver
///  recovers from.
#[cfg_attr(test, automock)]
pub trait StreamReader: Send {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<ReadOutcome>;

    /// Position the stream at the start of the next frame, discarding data before it. Returns
    ///  `false` if no frame start is available (yet).
    fn seek_frame_start(&mut self) -> std::io::Result<bool>;
}
