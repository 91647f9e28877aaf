//! Memory and I/O bus interface.

/// Memory bus interface.
///
/// Components access memory through this trait. The bus handles address
/// decoding and routing to the appropriate device. Timing is not the bus's
/// concern: the caller charges its own clock for every access.
pub trait Bus {
    /// Read a byte from the given address.
    ///
    /// `opcode_fetch` is true when the CPU is fetching an opcode byte (an M1
    /// cycle), which lets hosts model ROM traps or fetch-only contention.
    fn read(&mut self, address: u16, opcode_fetch: bool) -> u8;

    /// Write a byte to the given address.
    fn write(&mut self, address: u16, value: u8);
}

/// Bus with a separate port address space and interrupt acknowledge hooks.
pub trait IoBus: Bus {
    /// Read a byte from an I/O port. The full 16-bit port address is passed.
    fn read_io(&mut self, port: u16) -> u8;

    /// Write a byte to an I/O port.
    fn write_io(&mut self, port: u16, value: u8);

    /// Byte placed on the data lines by the interrupting device.
    ///
    /// Sampled during maskable interrupt acknowledge in modes 0 and 2. An
    /// idle data bus floats high, hence the default.
    fn interrupt_vector(&mut self) -> u8 {
        0xFF
    }

    /// Called when the CPU accepts an interrupt, before dispatch.
    fn on_interrupt(&mut self, _nmi: bool) {}

    /// Called when the CPU executes RETI.
    fn on_reti(&mut self) {}
}

/// Flat 64 KiB RAM bus with a 64 Ki-port I/O space, for tests and tools.
///
/// Port reads return whatever was last stored with [`SimpleBus::set_port`]
/// (0xFF by default). Port writes are recorded in order.
pub struct SimpleBus {
    memory: Vec<u8>,
    ports: Vec<u8>,
    port_writes: Vec<(u16, u8)>,
    vector: u8,
    opcode_fetches: u64,
    interrupts: Vec<bool>,
    reti_count: u32,
}

impl SimpleBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            memory: vec![0; 0x1_0000],
            ports: vec![0xFF; 0x1_0000],
            port_writes: Vec::new(),
            vector: 0xFF,
            opcode_fetches: 0,
            interrupts: Vec::new(),
            reti_count: 0,
        }
    }

    /// Copy `data` into memory starting at `address`, wrapping at 0xFFFF.
    pub fn load(&mut self, address: u16, data: &[u8]) {
        let mut addr = address;
        for &byte in data {
            self.memory[addr as usize] = byte;
            addr = addr.wrapping_add(1);
        }
    }

    /// Read memory without any side effects.
    #[must_use]
    pub fn peek(&self, address: u16) -> u8 {
        self.memory[address as usize]
    }

    /// Read a little-endian word without any side effects.
    #[must_use]
    pub fn peek16(&self, address: u16) -> u16 {
        u16::from_le_bytes([self.peek(address), self.peek(address.wrapping_add(1))])
    }

    /// Write memory without any side effects.
    pub fn poke(&mut self, address: u16, value: u8) {
        self.memory[address as usize] = value;
    }

    /// Value returned by subsequent reads of `port`.
    pub fn set_port(&mut self, port: u16, value: u8) {
        self.ports[port as usize] = value;
    }

    /// Byte supplied during interrupt acknowledge.
    pub fn set_interrupt_vector(&mut self, vector: u8) {
        self.vector = vector;
    }

    /// Port writes seen so far, oldest first.
    #[must_use]
    pub fn port_writes(&self) -> &[(u16, u8)] {
        &self.port_writes
    }

    /// Number of reads flagged as opcode fetches.
    #[must_use]
    pub const fn opcode_fetches(&self) -> u64 {
        self.opcode_fetches
    }

    /// Interrupts acknowledged so far (`true` for NMI).
    #[must_use]
    pub fn interrupts(&self) -> &[bool] {
        &self.interrupts
    }

    /// Number of RETI instructions executed.
    #[must_use]
    pub const fn reti_count(&self) -> u32 {
        self.reti_count
    }
}

impl Default for SimpleBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for SimpleBus {
    fn read(&mut self, address: u16, opcode_fetch: bool) -> u8 {
        if opcode_fetch {
            self.opcode_fetches += 1;
        }
        self.memory[address as usize]
    }

    fn write(&mut self, address: u16, value: u8) {
        self.memory[address as usize] = value;
    }
}

impl IoBus for SimpleBus {
    fn read_io(&mut self, port: u16) -> u8 {
        self.ports[port as usize]
    }

    fn write_io(&mut self, port: u16, value: u8) {
        self.port_writes.push((port, value));
    }

    fn interrupt_vector(&mut self) -> u8 {
        self.vector
    }

    fn on_interrupt(&mut self, nmi: bool) {
        self.interrupts.push(nmi);
    }

    fn on_reti(&mut self) {
        self.reti_count += 1;
    }
}
