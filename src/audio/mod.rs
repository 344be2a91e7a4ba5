pub mod codec;
pub mod vad;

pub use codec::VoiceActivity;
pub use vad::VadState;
