// Audio parameters expected by the voice engine
pub const SAMPLE_RATE: u32 = 48000; // 48 kHz sample rate
pub const BIT_DEPTH: u16 = 16; // 16 bits per sample
pub const CHANNELS: u16 = 1; // Mono
pub const FRAME_SIZE: usize = 960; // 20 ms at 48 kHz
pub const BYTES_PER_SAMPLE: usize = (BIT_DEPTH / 8) as usize;
