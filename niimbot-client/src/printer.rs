//! High-level printer API.

use crate::channel::{open_rfcomm, spawn_reader, Channel};
use crate::config::PrinterConfig;
use crate::error::PrinterError;
use crate::job::{check_density, check_label_type, check_quantity, PrintJob};
use crate::sequencer::{InboundSink, Sequencer};
use bytes::Bytes;
use niimbot_protocol::raster::{encode_image, Inverted, PixelSource, Rotated};
use niimbot_protocol::response::{
    decode_ack, decode_heartbeat, decode_info, decode_print_status, decode_rfid,
};
use niimbot_protocol::{Heartbeat, InfoKey, InfoValue, PrintStatus, Request, RfidTag};
use std::path::Path;

/// One connected printer.
///
/// Cheap to clone; clones share the command queue.
#[derive(Clone)]
pub struct Printer {
    sequencer: Sequencer,
    config: PrinterConfig,
}

impl Printer {
    /// Starts an engine on `channel`.
    ///
    /// Replies must be fed into [`Printer::inbound_sink`].
    pub fn new<C: Channel + 'static>(channel: C, config: PrinterConfig) -> Self {
        let sequencer = Sequencer::spawn(channel, config.response_timeout());
        Self { sequencer, config }
    }

    /// Opens an RFCOMM device and starts reading replies from it.
    pub fn open(device: impl AsRef<Path>, config: PrinterConfig) -> Result<Self, PrinterError> {
        let link = open_rfcomm(device)?;
        let printer = Self::new(link.channel, config);
        spawn_reader(
            link.reader,
            printer.inbound_sink(),
            printer.config.read_buffer_size,
        );
        Ok(printer)
    }

    /// Returns the sink the link reader delivers frames to.
    pub fn inbound_sink(&self) -> InboundSink {
        self.sequencer.inbound_sink()
    }

    pub fn config(&self) -> &PrinterConfig {
        &self.config
    }

    /// Returns whether the engine still accepts commands.
    pub fn is_connected(&self) -> bool {
        self.sequencer.is_running()
    }

    /// Fails everything outstanding and releases the link.
    pub async fn cleanup(&self) {
        self.sequencer.cleanup().await
    }

    // =========================================================================
    // Helper methods
    // =========================================================================

    async fn request(&self, request: Request) -> Result<Bytes, PrinterError> {
        self.sequencer.send(request).await
    }

    async fn ack(&self, request: Request) -> Result<bool, PrinterError> {
        let operation = request.code.name();
        let payload = self.request(request).await?;
        Ok(decode_ack(operation, &payload)?)
    }

    // =========================================================================
    // Settings
    // =========================================================================

    /// Sets print darkness (1-5).
    pub async fn set_label_density(&self, density: u8) -> Result<bool, PrinterError> {
        check_density(density)?;
        self.ack(Request::set_label_density(density)).await
    }

    /// Sets the media type (1-3).
    pub async fn set_label_type(&self, label_type: u8) -> Result<bool, PrinterError> {
        check_label_type(label_type)?;
        self.ack(Request::set_label_type(label_type)).await
    }

    pub async fn set_dimension(&self, width: u16, height: u16) -> Result<bool, PrinterError> {
        self.ack(Request::set_dimension(width, height)).await
    }

    pub async fn set_quantity(&self, quantity: u16) -> Result<bool, PrinterError> {
        check_quantity(quantity as u32)?;
        self.ack(Request::set_quantity(quantity)).await
    }

    // =========================================================================
    // Print control
    // =========================================================================

    pub async fn start_print(&self) -> Result<bool, PrinterError> {
        self.ack(Request::start_print()).await
    }

    pub async fn end_print(&self) -> Result<bool, PrinterError> {
        self.ack(Request::end_print()).await
    }

    pub async fn start_page_print(&self) -> Result<bool, PrinterError> {
        self.ack(Request::start_page_print()).await
    }

    pub async fn end_page_print(&self) -> Result<bool, PrinterError> {
        self.ack(Request::end_page_print()).await
    }

    pub async fn allow_print_clear(&self) -> Result<bool, PrinterError> {
        self.ack(Request::allow_print_clear()).await
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get_print_status(&self) -> Result<PrintStatus, PrinterError> {
        let payload = self.request(Request::get_print_status()).await?;
        Ok(decode_print_status(&payload)?)
    }

    /// Reads one device property.
    pub async fn get_info(&self, key: InfoKey) -> Result<InfoValue, PrinterError> {
        let payload = self.request(Request::get_info(key)).await?;
        Ok(decode_info(key, &payload)?)
    }

    /// Reads the label roll's RFID tag. `None` when no tag is present.
    pub async fn get_rfid(&self) -> Result<Option<RfidTag>, PrinterError> {
        let payload = self.request(Request::get_rfid()).await?;
        Ok(decode_rfid(&payload)?)
    }

    pub async fn heartbeat(&self) -> Result<Heartbeat, PrinterError> {
        let payload = self.request(Request::heartbeat()).await?;
        Ok(decode_heartbeat(&payload)?)
    }

    // =========================================================================
    // Printing
    // =========================================================================

    /// Prints `source` with the settings in `job`.
    ///
    /// Parameters and image size are checked before anything is sent. Steps
    /// run in this order, each waiting for the previous one:
    ///
    /// 1. density, label type
    /// 2. start print, start page
    /// 3. dimension (width, height), quantity
    /// 4. image rows, paced by the configured line delay
    /// 5. end page
    /// 6. poll print status until the page counter reaches the quantity
    /// 7. end print
    ///
    /// A failing step aborts the job; earlier steps are not undone.
    pub async fn print_image<S>(&self, source: &S, job: &PrintJob) -> Result<(), PrinterError>
    where
        S: PixelSource + ?Sized,
    {
        job.validate()?;
        let raster = Raster::prepare(source, job)?;
        let quantity = job.quantity as u16;

        tracing::info!(
            width = raster.width,
            height = raster.height,
            density = job.density,
            label_type = job.label_type,
            quantity,
            "Starting print job"
        );

        self.step("setLabelDensity", self.set_label_density(job.density))
            .await?;
        self.step("setLabelType", self.set_label_type(job.label_type))
            .await?;
        self.step("startPrint", self.start_print()).await?;
        self.step("startPagePrint", self.start_page_print()).await?;
        self.step(
            "setDimension",
            self.set_dimension(raster.width, raster.height),
        )
        .await?;
        self.step("setQuantity", self.set_quantity(quantity)).await?;

        tracing::debug!(rows = raster.lines.len(), "Sending image rows");
        self.sequencer
            .send_lines(raster.lines, self.config.line_delay())
            .await?;

        self.step("endPagePrint", self.end_page_print()).await?;
        self.wait_for_pages(quantity).await?;
        self.step("endPrint", self.end_print()).await?;

        tracing::info!("Print job complete");
        Ok(())
    }

    async fn step(
        &self,
        name: &str,
        command: impl std::future::Future<Output = Result<bool, PrinterError>>,
    ) -> Result<(), PrinterError> {
        match command.await {
            Ok(true) => {
                tracing::debug!(step = name, "Print step acknowledged");
                Ok(())
            }
            Ok(false) => {
                tracing::warn!(step = name, "Printer answered print step with a zero flag");
                Ok(())
            }
            Err(e) => {
                tracing::error!(step = name, error = %e, "Print step failed");
                Err(e)
            }
        }
    }

    /// Polls print status until `quantity` pages are reported.
    ///
    /// Timeouts count as attempts and are retried; any other error aborts.
    /// Running out of attempts is logged and the job carries on.
    async fn wait_for_pages(&self, quantity: u16) -> Result<(), PrinterError> {
        let max_attempts = self.config.max_poll_attempts;
        let mut printed = 0u16;

        for attempt in 1..=max_attempts {
            match self.get_print_status().await {
                Ok(status) => {
                    printed = status.page;
                    tracing::debug!(
                        attempt,
                        page = status.page,
                        quantity,
                        progress1 = status.progress1,
                        progress2 = status.progress2,
                        "Print status"
                    );
                    if status.page >= quantity {
                        return Ok(());
                    }
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(attempt, "Print status poll timed out, retrying");
                }
                Err(e) => {
                    tracing::error!(attempt, error = %e, "Print status poll failed");
                    return Err(e);
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.config.poll_interval()).await;
            }
        }

        tracing::warn!(
            printed,
            quantity,
            attempts = max_attempts,
            "Printer did not report completion, finishing anyway"
        );
        Ok(())
    }
}

/// Encoded image rows plus the dimensions announced to the printer.
struct Raster {
    width: u16,
    height: u16,
    lines: Vec<Bytes>,
}

impl Raster {
    fn prepare<S>(source: &S, job: &PrintJob) -> Result<Self, PrinterError>
    where
        S: PixelSource + ?Sized,
    {
        let mut source: Box<dyn PixelSource + '_> = Box::new(source);
        if job.rotate {
            source = Box::new(Rotated(source));
        }
        if job.invert {
            source = Box::new(Inverted(source));
        }

        let frames = encode_image(&*source)?;
        let lines = frames
            .iter()
            .map(|frame| frame.encode().map(|b| b.freeze()))
            .collect::<Result<Vec<_>, _>>()?;

        // encode_image bounds both sides well inside u16
        Ok(Self {
            width: source.width() as u16,
            height: source.height() as u16,
            lines,
        })
    }
}
