// Fixed pool of reusable playback buffers with blocking back-pressure

mod pool;

pub use pool::{Append, BufferPool, FilledBuffer, PacketDesc, PoolConfig};

#[cfg(test)]
mod tests;
