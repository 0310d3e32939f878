//! Pure batch-partitioning helper, isolated so batch-size invariants are
//! testable without any I/O.

use crate::types::AccountId;

/// Splits `accounts` into batches of at most `batch_size`, preserving
/// order. Every account appears in exactly one batch; the number of
/// batches is `ceil(accounts.len() / batch_size)`.
pub fn partition_into_batches(accounts: &[AccountId], batch_size: usize) -> Vec<Vec<AccountId>> {
    assert!(batch_size > 0, "batch_size must be positive");
    accounts.chunks(batch_size).map(|chunk| chunk.to_vec()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accounts(n: usize) -> Vec<AccountId> {
        (0..n).map(|i| format!("acct-{i}")).collect()
    }

    #[test]
    fn fifteen_accounts_batch_size_ten_yields_two_batches() {
        let batches = partition_into_batches(&accounts(15), 10);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 10);
        assert_eq!(batches[1].len(), 5);
    }

    #[test]
    fn every_account_appears_exactly_once() {
        let input = accounts(23);
        let batches = partition_into_batches(&input, 7);
        let total: usize = batches.iter().map(Vec::len).sum();
        assert_eq!(total, input.len());
        assert!(batches.iter().all(|b| b.len() <= 7));
        assert_eq!(batches.len(), 4); // ceil(23/7)
    }

    #[test]
    fn single_account_single_batch() {
        let batches = partition_into_batches(&accounts(1), 10);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 1);
    }
}
