//! Core gateway components: audio buffering, EPD segmentation, batch
//! recognition dispatch and ordered delivery.

pub mod audio;
pub mod dispatch;
pub mod epd;
pub mod session;
pub mod stt;
