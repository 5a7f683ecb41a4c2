pub mod decode;
pub mod playback;
pub mod smoothing;
pub mod spectrum;
