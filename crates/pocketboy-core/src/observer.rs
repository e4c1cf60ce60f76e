/// A change the emulated program made that a presentation layer may want to
/// redraw. The core never reads anything back from observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryEvent {
    /// Write into tile pattern memory, 0x8000-0x97FF.
    TileDataWritten(u16),
    /// Write into one of the two tile maps, 0x9800-0x9FFF.
    TileMapWritten(u16),
    /// Write into the I/O register block, 0xFF00-0xFF7F.
    IoRegisterWritten { address: u16, value: u8 },
    /// LCDC changed, so every decoded tile may now look different.
    AllTilesInvalidated,
    /// The switchable ROM window now shows this bank.
    BankSwitched(usize),
    /// A push or interrupt entry wrote this stack byte.
    StackWritten(u16),
}

pub trait MemoryObserver {
    fn notify(&mut self, event: MemoryEvent);
}

impl<F> MemoryObserver for F
where
    F: FnMut(MemoryEvent),
{
    fn notify(&mut self, event: MemoryEvent) {
        self(event)
    }
}
