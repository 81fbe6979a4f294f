use anyhow::{Result, bail};

pub const ADDRESS_SPACE: usize = 0x10000;

/// Mirror redirects followed before an access settles on the current address.
pub const MAX_MIRROR_HOPS: usize = 8;

/// Where an access to one address slot goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler<D> {
    /// Backing byte at the same address.
    Memory,
    /// Redirects to `base + (addr - base) % length`, then dispatches through the target slot.
    Mirror { base: u16, length: u16 },
    /// Memory-mapped device identified by tag.
    External(D),
}

/// Receiver for accesses routed to [`Handler::External`] slots.
pub trait MemoryHandler<D> {
    fn read(&mut self, device: D, addr: u16) -> u8;
    fn write(&mut self, device: D, addr: u16, value: u8);
}

/// Final destination of an access after mirror redirects are followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target<D> {
    Memory(u16),
    External(D, u16),
}

/// Per-address configurable address space.
///
/// Every one of the 65536 addresses owns a read handler and a write handler. Mirroring
/// installs redirect tags instead of duplicating storage, so every alias of a byte shares
/// one backing cell.
pub struct MemoryMap<D> {
    memory: Box<[u8]>,
    readers: Box<[Handler<D>]>,
    writers: Box<[Handler<D>]>,
}

impl<D: Copy> Default for MemoryMap<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Copy> MemoryMap<D> {
    pub fn new() -> Self {
        Self {
            memory: vec![0; ADDRESS_SPACE].into_boxed_slice(),
            readers: vec![Handler::Memory; ADDRESS_SPACE].into_boxed_slice(),
            writers: vec![Handler::Memory; ADDRESS_SPACE].into_boxed_slice(),
        }
    }

    pub fn read_handler(&self, addr: u16) -> Handler<D> {
        self.readers[addr as usize]
    }

    pub fn write_handler(&self, addr: u16) -> Handler<D> {
        self.writers[addr as usize]
    }

    pub fn configure_read(&mut self, addr: u16, handler: Handler<D>) {
        self.readers[addr as usize] = handler;
    }

    pub fn configure_write(&mut self, addr: u16, handler: Handler<D>) {
        self.writers[addr as usize] = handler;
    }

    pub fn configure(&mut self, addr: u16, handler: Handler<D>) {
        self.configure_read(addr, handler);
        self.configure_write(addr, handler);
    }

    /// Installs `handler` for both directions over `start..=end`.
    pub fn configure_range(&mut self, start: u16, end: u16, handler: Handler<D>) {
        for addr in start..=end {
            self.configure(addr, handler);
        }
    }

    pub fn configure_read_range(&mut self, start: u16, end: u16, handler: Handler<D>) {
        for addr in start..=end {
            self.configure_read(addr, handler);
        }
    }

    pub fn configure_write_range(&mut self, start: u16, end: u16, handler: Handler<D>) {
        for addr in start..=end {
            self.configure_write(addr, handler);
        }
    }

    /// Mirrors the segment `base..base + segment_length` across `range` bytes starting at
    /// `base`. The first segment keeps its handlers; every later address redirects into it.
    pub fn configure_address_mirroring(
        &mut self,
        base: u16,
        segment_length: u16,
        range: u32,
    ) -> Result<()> {
        if segment_length == 0 {
            bail!("mirror segment length must be non-zero");
        }
        if range == 0 || range % segment_length as u32 != 0 {
            bail!(
                "mirror range ${range:X} is not a multiple of segment length ${segment_length:X}"
            );
        }
        if base as u32 + range > ADDRESS_SPACE as u32 {
            bail!("mirror range ${base:04X}+${range:X} runs past the end of the address space");
        }

        let handler = Handler::Mirror {
            base,
            length: segment_length,
        };
        let start = base as u32 + segment_length as u32;
        let end = base as u32 + range;
        for addr in start..end {
            self.configure(addr as u16, handler);
        }
        Ok(())
    }

    pub fn resolve_read(&self, addr: u16) -> Target<D> {
        Self::resolve(&self.readers, addr)
    }

    pub fn resolve_write(&self, addr: u16) -> Target<D> {
        Self::resolve(&self.writers, addr)
    }

    /// Follows mirror redirects. Chains longer than [`MAX_MIRROR_HOPS`], including
    /// mirrors that point back at each other, settle on plain memory.
    fn resolve(table: &[Handler<D>], mut addr: u16) -> Target<D> {
        for _ in 0..MAX_MIRROR_HOPS {
            match table[addr as usize] {
                Handler::Memory => return Target::Memory(addr),
                Handler::External(device) => return Target::External(device, addr),
                Handler::Mirror { base, length } => {
                    let redirected = base.wrapping_add(addr.wrapping_sub(base) % length);
                    if redirected == addr {
                        return Target::Memory(addr);
                    }
                    addr = redirected;
                }
            }
        }
        Target::Memory(addr)
    }

    pub fn read(&mut self, addr: u16, devices: &mut dyn MemoryHandler<D>) -> u8 {
        match self.resolve_read(addr) {
            Target::Memory(addr) => self.memory[addr as usize],
            Target::External(device, addr) => devices.read(device, addr),
        }
    }

    pub fn write(&mut self, addr: u16, value: u8, devices: &mut dyn MemoryHandler<D>) {
        match self.resolve_write(addr) {
            Target::Memory(addr) => self.memory[addr as usize] = value,
            Target::External(device, addr) => devices.write(device, addr, value),
        }
    }

    /// Reads the backing array, bypassing handlers.
    pub fn peek(&self, addr: u16) -> u8 {
        self.memory[addr as usize]
    }

    /// Writes the backing array, bypassing handlers.
    pub fn poke(&mut self, addr: u16, value: u8) {
        self.memory[addr as usize] = value;
    }

    /// Zeroes backing storage. Handler wiring is left untouched.
    pub fn wipe(&mut self) {
        self.memory.fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Tag {
        Latch,
    }

    #[derive(Default)]
    struct Recorder {
        reads: Vec<u16>,
        writes: Vec<(u16, u8)>,
    }

    impl MemoryHandler<Tag> for Recorder {
        fn read(&mut self, _device: Tag, addr: u16) -> u8 {
            self.reads.push(addr);
            0x5A
        }

        fn write(&mut self, _device: Tag, addr: u16, value: u8) {
            self.writes.push((addr, value));
        }
    }

    #[test]
    fn mirrored_ram_shares_storage_in_both_directions() {
        let mut map = MemoryMap::<Tag>::new();
        let mut devices = Recorder::default();
        map.configure_address_mirroring(0x0000, 0x0800, 0x2000).unwrap();

        map.write(0x0123, 0x42, &mut devices);
        assert_eq!(map.read(0x0923, &mut devices), 0x42);
        assert_eq!(map.read(0x1123, &mut devices), 0x42);
        assert_eq!(map.read(0x1923, &mut devices), 0x42);

        map.write(0x1FFF, 0x99, &mut devices);
        assert_eq!(map.read(0x07FF, &mut devices), 0x99);
        assert!(devices.reads.is_empty());
    }

    #[test]
    fn canonical_segment_keeps_its_handlers() {
        let mut map = MemoryMap::<Tag>::new();
        map.configure_address_mirroring(0x2000, 8, 0x2000).unwrap();
        assert_eq!(map.read_handler(0x2000), Handler::Memory);
        assert_eq!(map.read_handler(0x2007), Handler::Memory);
        assert_eq!(
            map.read_handler(0x2008),
            Handler::Mirror {
                base: 0x2000,
                length: 8
            }
        );
        assert_eq!(map.read_handler(0x4000), Handler::Memory);
    }

    #[test]
    fn mirrors_follow_device_handlers_of_the_canonical_segment() {
        let mut map = MemoryMap::new();
        let mut devices = Recorder::default();
        map.configure_range(0x2000, 0x2007, Handler::External(Tag::Latch));
        map.configure_address_mirroring(0x2000, 8, 0x2000).unwrap();

        assert_eq!(map.read(0x3FFA, &mut devices), 0x5A);
        map.write(0x200E, 0x11, &mut devices);

        assert_eq!(devices.reads, vec![0x2002]);
        assert_eq!(devices.writes, vec![(0x2006, 0x11)]);
    }

    #[test]
    fn uneven_mirror_range_is_rejected_without_partial_effect() {
        let mut map = MemoryMap::<Tag>::new();
        assert!(map.configure_address_mirroring(0x0000, 0x0800, 0x1900).is_err());
        assert!(map.configure_address_mirroring(0x0000, 0, 0x0800).is_err());
        assert!(map.configure_address_mirroring(0xF000, 0x0800, 0x2000).is_err());
        assert_eq!(map.read_handler(0x0800), Handler::Memory);
    }

    #[test]
    fn split_read_and_write_handlers() {
        let mut map = MemoryMap::new();
        let mut devices = Recorder::default();
        map.configure_read(0x4017, Handler::External(Tag::Latch));

        map.write(0x4017, 0x40, &mut devices);
        assert_eq!(map.peek(0x4017), 0x40);
        assert_eq!(map.read(0x4017, &mut devices), 0x5A);
    }

    #[test]
    fn wipe_clears_storage_but_not_wiring() {
        let mut map = MemoryMap::<Tag>::new();
        map.configure_address_mirroring(0x0000, 0x0800, 0x2000).unwrap();
        map.poke(0x0010, 0xAA);
        map.wipe();
        assert_eq!(map.peek(0x0010), 0);
        assert_eq!(map.resolve_read(0x0810), Target::Memory(0x0010));
    }

    #[test]
    fn mirror_cycles_settle_on_memory() {
        let mut map = MemoryMap::<Tag>::new();
        map.configure_range(0x6000, 0x60FF, Handler::Mirror { base: 0x6100, length: 0x100 });
        map.configure_range(0x6100, 0x61FF, Handler::Mirror { base: 0x6000, length: 0x100 });
        map.poke(0x6005, 0x77);

        assert_eq!(map.resolve_read(0x6005), Target::Memory(0x6005));
        assert_eq!(map.resolve_write(0x6105), Target::Memory(0x6105));
        assert_eq!(map.read(0x6005, &mut Recorder::default()), 0x77);
    }
}
