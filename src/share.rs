//! Tells the user how a display joins the session.

use qrcode::{Color, QrCode, types::QrError};

use crate::session_id::SessionId;

const INDENT: &str = "  ";

/// Renders `data` as a QR code using half-block characters, two module
/// rows per text line.
pub fn render_qr(data: &str) -> Result<String, QrError> {
    let code = QrCode::new(data.as_bytes())?;
    let width = code.width();
    let colors = code.to_colors();
    let rows: Vec<&[Color]> = colors.chunks(width).collect();

    let mut out = String::new();
    for pair in rows.chunks(2) {
        out.push_str(INDENT);
        for x in 0..width {
            let top = pair[0][x] == Color::Dark;
            let bottom = pair.get(1).is_some_and(|row| row[x] == Color::Dark);
            out.push(match (top, bottom) {
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

/// Session name, join link and its QR code, ready to print.
pub fn share_banner(session_id: &SessionId, base_url: &str) -> String {
    let url = session_id.share_url(base_url);
    let mut banner = format!("Session: {session_id}\nOpen on the display: {url}\n");
    match render_qr(&url) {
        Ok(qr) => {
            banner.push('\n');
            banner.push_str(&qr);
        }
        Err(e) => tracing::warn!("Failed to render QR code: {}", e),
    }
    banner
}
