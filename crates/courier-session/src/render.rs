// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! QR rendering for credential challenges.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use qrcode::render::svg;
use qrcode::{Color, EcLevel, QrCode};

use courier_core::CourierError;

/// Minimum edge length of the SVG rendering, in pixels.
const SVG_MIN_DIMENSION: u32 = 256;

fn encode(raw: &str) -> Result<QrCode, CourierError> {
    QrCode::with_error_correction_level(raw.as_bytes(), EcLevel::L)
        .map_err(|e| CourierError::Internal(format!("QR generation failed: {e}")))
}

/// Renders `raw` as an SVG image embedded in a `data:` URL.
pub fn svg_data_url(raw: &str) -> Result<String, CourierError> {
    let image = encode(raw)?
        .render::<svg::Color<'_>>()
        .min_dimensions(SVG_MIN_DIMENSION, SVG_MIN_DIMENSION)
        .quiet_zone(true)
        .build();
    Ok(format!("data:image/svg+xml;base64,{}", STANDARD.encode(image)))
}

/// Renders `raw` for a terminal using Unicode half blocks.
///
/// Two module rows share one text line, so the output is roughly square in a
/// typical terminal font.
pub fn terminal(raw: &str) -> Result<String, CourierError> {
    let code = encode(raw)?;
    let width = code.width();
    let colors = code.into_colors();
    let dark = |row: usize, col: usize| row < width && colors[row * width + col] == Color::Dark;

    let mut out = String::with_capacity((width + 1) * width.div_ceil(2));
    for row in (0..width).step_by(2) {
        for col in 0..width {
            out.push(match (dark(row, col), dark(row + 1, col)) {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn svg_is_base64_data_url() {
        let url = svg_data_url("2@abc,def,ghi").unwrap();
        let encoded = url.strip_prefix("data:image/svg+xml;base64,").unwrap();
        let decoded = String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap();
        assert!(decoded.contains("<svg"));
    }

    #[test]
    fn terminal_packs_two_rows_per_line() {
        let code = encode("2@abc").unwrap();
        let width = code.width();
        let text = terminal("2@abc").unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), width.div_ceil(2));
        assert!(lines.iter().all(|l| l.chars().count() == width));
    }
}
