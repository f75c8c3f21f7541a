//! Vision/OCR Layer
//!
//! Text extraction from captured frames and card code recognition on the
//! extracted text.

pub mod card_code;
pub mod ocr;

pub use card_code::CardCode;
pub use ocr::{CommandOcr, TextRecognizer};
