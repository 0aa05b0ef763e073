use base64::{engine::general_purpose::STANDARD, Engine};
use qrcode::{render::svg, QrCode};

use crate::error::{AppError, Result};

/// Render `url` as an SVG QR code wrapped in a `data:` URI
pub fn qr_data_uri(url: &str) -> Result<String> {
    let code = QrCode::new(url.as_bytes())
        .map_err(|e| AppError::Internal(format!("QR code generation failed: {}", e)))?;

    let image = code
        .render::<svg::Color>()
        .min_dimensions(200, 200)
        .dark_color(svg::Color("#000000"))
        .light_color(svg::Color("#ffffff"))
        .build();

    Ok(format!("data:image/svg+xml;base64,{}", STANDARD.encode(image)))
}
