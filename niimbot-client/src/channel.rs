//! Transport abstraction between the engine and a physical link.
//!
//! The engine only ever writes whole frames. Bytes travelling the other way
//! are pushed into the engine through an [`InboundSink`]; a reader task
//! reassembles them into candidate frames first.

use crate::error::PrinterError;
use crate::sequencer::InboundSink;
use async_trait::async_trait;
use bytes::Bytes;
use niimbot_protocol::FrameAssembler;
use std::io;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Default RFCOMM device path.
pub const DEFAULT_DEVICE: &str = "/dev/rfcomm0";

/// Write side of a printer link.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Writes one encoded frame.
    ///
    /// `ack_required` is set for request/response commands and cleared for
    /// fire-and-forget image rows. Links without write acknowledgements may
    /// ignore it.
    async fn write(&self, frame: Bytes, ack_required: bool) -> Result<(), PrinterError>;
}

#[async_trait]
impl<C: Channel + ?Sized> Channel for Box<C> {
    async fn write(&self, frame: Bytes, ack_required: bool) -> Result<(), PrinterError> {
        (**self).write(frame, ack_required).await
    }
}

/// Channel over any async byte stream.
pub struct StreamChannel<W> {
    writer: Mutex<W>,
}

impl<W> StreamChannel<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

#[async_trait]
impl<W> Channel for StreamChannel<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write(&self, frame: Bytes, ack_required: bool) -> Result<(), PrinterError> {
        let mut writer = self.writer.lock().await;
        writer.write_all(&frame).await?;
        writer.flush().await?;
        tracing::trace!(
            bytes = %hex::encode(&frame),
            ack_required,
            "Frame written"
        );
        Ok(())
    }
}

/// Spawns a task reading `reader` and delivering complete candidate frames
/// to `sink`.
///
/// End of stream and read errors are reported as a disconnect. The task
/// stops on its own once the engine behind `sink` is gone.
pub fn spawn_reader<R>(mut reader: R, sink: InboundSink, buffer_size: usize) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut assembler = FrameAssembler::new();
        let mut buf = vec![0u8; buffer_size];

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => {
                    tracing::debug!("Link closed by peer");
                    sink.disconnected();
                    return;
                }
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!(error = %e, "Read from link failed");
                    sink.disconnected();
                    return;
                }
            };

            tracing::trace!(bytes = %hex::encode(&buf[..n]), "Received chunk");
            assembler.extend(&buf[..n]);

            while let Some(frame) = assembler.next_frame() {
                if !sink.deliver(frame) {
                    tracing::debug!("Engine stopped, reader exiting");
                    return;
                }
            }
        }
    })
}

/// Both halves of an opened RFCOMM device.
pub struct RfcommLink {
    pub channel: StreamChannel<tokio::fs::File>,
    pub reader: tokio::fs::File,
}

/// Opens a bound RFCOMM TTY (e.g. `/dev/rfcomm0`) in raw mode.
///
/// The device must already be paired and bound, for example with
/// `rfcomm bind 0 <address>`.
pub fn open_rfcomm(path: impl AsRef<Path>) -> Result<RfcommLink, PrinterError> {
    let path = path.as_ref();
    let file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| {
            tracing::debug!(device = %path.display(), error = %e, "Open failed");
            match e.kind() {
                io::ErrorKind::NotFound => PrinterError::NotConnected,
                _ => PrinterError::Io(e),
            }
        })?;

    configure_tty_raw(&file)?;
    let reader = file.try_clone()?;

    tracing::info!(device = %path.display(), "Opened printer link");
    Ok(RfcommLink {
        channel: StreamChannel::new(tokio::fs::File::from_std(file)),
        reader: tokio::fs::File::from_std(reader),
    })
}

#[cfg(unix)]
fn configure_tty_raw(file: &std::fs::File) -> io::Result<()> {
    use std::mem::MaybeUninit;
    use std::os::unix::io::AsRawFd;

    let fd = file.as_raw_fd();
    let mut termios = MaybeUninit::uninit();
    if unsafe { libc::tcgetattr(fd, termios.as_mut_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    let mut termios = unsafe { termios.assume_init() };

    // XON/XOFF must be off: 0x11 and 0x13 occur in frame payloads
    termios.c_iflag &= !(libc::IGNBRK
        | libc::BRKINT
        | libc::PARMRK
        | libc::ISTRIP
        | libc::INLCR
        | libc::IGNCR
        | libc::ICRNL
        | libc::IXON
        | libc::IXOFF
        | libc::IXANY);
    termios.c_oflag &= !libc::OPOST;
    termios.c_lflag &= !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::ISIG | libc::IEXTEN);
    termios.c_cflag &= !(libc::CSIZE | libc::PARENB);
    termios.c_cflag |= libc::CS8;

    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
fn configure_tty_raw(_file: &std::fs::File) -> io::Result<()> {
    Ok(())
}
