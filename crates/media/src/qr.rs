//! Render QR challenge payloads as PNG images.

use std::io::Cursor;

use {
    anyhow::{Context, Result},
    base64::Engine,
    image::{DynamicImage, ImageFormat, Luma},
    qrcode::QrCode,
};

/// Smallest edge length of a rendered code, in pixels.
const MIN_DIMENSION: u32 = 256;

/// Encode `payload` as a QR code and return PNG bytes.
pub fn render_png(payload: &str) -> Result<Vec<u8>> {
    if payload.is_empty() {
        anyhow::bail!("empty QR payload");
    }
    let code = QrCode::new(payload.as_bytes())
        .map_err(|e| anyhow::anyhow!("failed to encode QR payload: {e}"))?;
    let img = code
        .render::<Luma<u8>>()
        .min_dimensions(MIN_DIMENSION, MIN_DIMENSION)
        .quiet_zone(true)
        .build();

    let mut png = Vec::new();
    DynamicImage::ImageLuma8(img)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .context("failed to write PNG")?;
    Ok(png)
}

/// Encode `payload` as a `data:image/png;base64,...` URL.
pub fn render_data_url(payload: &str) -> Result<String> {
    let png = render_png(payload)?;
    Ok(format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png)
    ))
}
