//! Media helpers: QR challenge rendering.

pub mod qr;

pub use qr::{render_data_url, render_png};
