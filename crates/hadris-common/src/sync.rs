/// A bounded producer/consumer ring buffer used to decouple image
/// generation from the sink that streams it out (a file, a burner device, a
/// network socket).
pub mod ring_buffer;
