//! Byte-size helpers for cache budgets.

/// Readable byte quantities: `20.mib()`, `64.kib()`.
pub trait Memory {
    fn kib(self) -> usize;
    fn mib(self) -> usize;
}

impl Memory for usize {
    fn kib(self) -> usize {
        self * 1024
    }

    fn mib(self) -> usize {
        self * 1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kib_and_mib() {
        assert_eq!(1.kib(), 1024);
        assert_eq!(4.kib(), 4096);
        assert_eq!(1.mib(), 1024 * 1024);
        assert_eq!(20.mib(), 20 * 1024 * 1024);
    }
}
