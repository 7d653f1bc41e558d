use anyhow::{Context, Result};
use base64::Engine;
use qrcode::render::svg;
use qrcode::{Color, EcLevel, QrCode};

const SVG_MIN_SIZE: u32 = 256;

/// Renders a pairing code as a `data:image/svg+xml;base64,` URL observers can
/// drop straight into an `<img>` tag.
pub fn svg_data_url(code: &str) -> Result<String> {
    let qr = QrCode::with_error_correction_level(code.as_bytes(), EcLevel::L)
        .context("Failed to create QR code")?;
    let image = qr
        .render::<svg::Color>()
        .min_dimensions(SVG_MIN_SIZE, SVG_MIN_SIZE)
        .build();
    let encoded = base64::engine::general_purpose::STANDARD.encode(image.as_bytes());
    Ok(format!("data:image/svg+xml;base64,{}", encoded))
}

/// Compact terminal rendering: two module rows per text line.
pub fn terminal(code: &str) -> Result<String> {
    let qr = QrCode::with_error_correction_level(code.as_bytes(), EcLevel::L)
        .context("Failed to create QR code")?;

    let width = qr.width();
    let colors = qr.into_colors();
    let is_dark = |row: usize, col: usize| row < width && colors[row * width + col] == Color::Dark;

    let mut out = String::new();
    for row in (0..width).step_by(2) {
        for col in 0..width {
            out.push(match (is_dark(row, col), is_dark(row + 1, col)) {
                (true, true) => '█',
                (true, false) => '▀',
                (false, true) => '▄',
                (false, false) => ' ',
            });
        }
        out.push('\n');
    }
    Ok(out)
}
