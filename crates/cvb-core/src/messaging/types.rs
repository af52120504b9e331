/// Files above this many bytes take the large-transfer path.
pub const LARGE_TRANSFER_THRESHOLD: u64 = 50 * 1024 * 1024;

/// Which upload path a file should take.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferRoute {
    Small,
    Large,
}

/// Size-based routing decision. The core computes the policy; the sink
/// executes it.
pub fn transfer_route(size_bytes: u64, threshold: u64) -> TransferRoute {
    if size_bytes > threshold {
        TransferRoute::Large
    } else {
        TransferRoute::Small
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_split_at_the_threshold() {
        assert_eq!(transfer_route(0, LARGE_TRANSFER_THRESHOLD), TransferRoute::Small);
        assert_eq!(
            transfer_route(LARGE_TRANSFER_THRESHOLD, LARGE_TRANSFER_THRESHOLD),
            TransferRoute::Small
        );
        assert_eq!(
            transfer_route(LARGE_TRANSFER_THRESHOLD + 1, LARGE_TRANSFER_THRESHOLD),
            TransferRoute::Large
        );
    }
}
