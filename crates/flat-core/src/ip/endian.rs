//! Host byte order, detected once per process.

use std::sync::LazyLock;

/// Byte order of the host CPU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

static NATIVE: LazyLock<Endian> = LazyLock::new(|| {
    if 1u16.to_ne_bytes()[0] == 1 {
        Endian::Little
    } else {
        Endian::Big
    }
});

/// The host byte order. Computed on first use and read-only afterwards.
pub fn native() -> Endian {
    *NATIVE
}

/// True when the host stores the least significant byte first.
pub fn natively_little() -> bool {
    native() == Endian::Little
}
