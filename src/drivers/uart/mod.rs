pub mod pl011;

/// A byte sink the console can write log lines to.
pub trait ConsoleSink: Sync {
    fn write_bytes(&self, bytes: &[u8]);
}
