//! Command execution.

use crate::{Commands, RasterArgs};
use colored::Colorize;
use niimbot_client::{PrintJob, Printer};
use niimbot_protocol::raster::MAX_WIDTH;
use niimbot_protocol::{render_preview, InfoKey, Inverted, PixelSource, RgbaSource, Rotated};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;

/// Executes a printer command and returns the formatted output.
pub async fn execute(
    printer: &Printer,
    cmd: Commands,
) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        Commands::Preview { .. } => unreachable!(), // Handled without a printer

        Commands::Info { keys } => {
            let keys = if keys.is_empty() {
                InfoKey::ALL.to_vec()
            } else {
                keys
            };

            let mut values = Map::new();
            for key in keys {
                let value = printer.get_info(key).await?;
                values.insert(key.to_string(), serde_json::to_value(&value)?);
            }
            Ok(format_json(&Value::Object(values)))
        }

        Commands::Rfid => match printer.get_rfid().await? {
            Some(tag) => Ok(format_json(&tag)),
            None => Ok("No RFID tag detected".yellow().to_string()),
        },

        Commands::Heartbeat => {
            let heartbeat = printer.heartbeat().await?;
            Ok(format_json(&heartbeat))
        }

        Commands::Status => {
            let status = printer.get_print_status().await?;
            Ok(format_json(&status))
        }

        Commands::Print {
            image,
            density,
            label_type,
            quantity,
            raster,
        } => {
            let source = load_image(&image, &raster)?;
            let job = PrintJob::new()
                .density(density)
                .label_type(label_type)
                .quantity(quantity)
                .rotate(raster.rotate)
                .invert(raster.invert);

            printer.print_image(&source, &job).await?;
            Ok(format!(
                "{} {} ({} {})",
                "Printed".green(),
                image.display().to_string().cyan(),
                quantity,
                if quantity == 1 { "copy" } else { "copies" }
            ))
        }
    }
}

/// Writes the dots an image would print as a black and white PNG.
pub fn preview(
    image: &Path,
    out: &Path,
    raster: &RasterArgs,
) -> Result<String, Box<dyn std::error::Error>> {
    let source = load_image(image, raster)?;

    let mut source: Box<dyn PixelSource> = Box::new(source);
    if raster.rotate {
        source = Box::new(Rotated(source));
    }
    if raster.invert {
        source = Box::new(Inverted(source));
    }

    let (width, height) = (source.width(), source.height());
    render_preview(&*source).save(out)?;

    let mut output = format!(
        "{} {} ({}x{})",
        "Wrote".green(),
        out.display().to_string().cyan(),
        width,
        height
    );
    if width > MAX_WIDTH {
        output.push_str(&format!(
            "\n{}: width exceeds the printable maximum of {} pixels",
            "Warning".yellow(),
            MAX_WIDTH
        ));
    }
    Ok(output)
}

fn load_image(path: &Path, raster: &RasterArgs) -> Result<RgbaSource, Box<dyn std::error::Error>> {
    let image = image::open(path)
        .map_err(|e| format!("failed to load '{}': {}", path.display(), e))?
        .to_rgba8();
    tracing::debug!(
        path = %path.display(),
        width = image.width(),
        height = image.height(),
        "Loaded image"
    );
    Ok(RgbaSource::with_threshold(image, raster.threshold))
}

/// Formats a result as pretty JSON.
fn format_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("<unserializable: {}>", e))
}
