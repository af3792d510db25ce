//! Per-op capability bits, propagated onto IR nodes and AND-ed across a
//! plan so a host can refuse to run a plan that doesn't meet a required
//! subset (e.g. refuse `Fs`/`Net` in a browser-hosted build).

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        /// Processes one batch at a time with bounded buffering.
        const STREAMING      = 0b0000_0001;
        /// Memory use independent of input size.
        const BOUNDED_MEMORY = 0b0000_0010;
        /// No filesystem or network access.
        const BROWSER_SAFE   = 0b0000_0100;
        /// Same input always produces the same main-channel bytes.
        const DETERMINISTIC  = 0b0000_1000;
        /// Touches the filesystem.
        const FS             = 0b0001_0000;
        /// Touches the network.
        const NET            = 0b0010_0000;
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities::empty()
    }
}
