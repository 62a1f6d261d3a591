//! Remote speech-to-text client.

pub mod google;
pub mod interface;

pub use google::GoogleRecognizer;
pub use interface::{RecognitionError, RecognitionService};
