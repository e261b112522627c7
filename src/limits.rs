/// Longest accepted price list / voucher code.
pub const MAX_CODE_LEN: usize = 64;

/// Longest accepted display name.
pub const MAX_NAME_LEN: usize = 256;

/// Upper bound on price lines per price list and promotion lines per voucher.
pub const MAX_LINES_PER_ENTITY: usize = 2_048;

/// Widest interval accepted, in days (~10 years).
pub const MAX_INTERVAL_DAYS: i64 = 3_660;

/// Upper bound on price lists or vouchers held by a local store.
pub const MAX_ENTITIES: usize = 100_000;

/// Bounded capacity of the scheduler trigger channel.
pub const TRIGGER_QUEUE_CAPACITY: usize = 64;

/// Bounded capacity of the journal writer channel.
pub const JOURNAL_QUEUE_CAPACITY: usize = 4_096;

/// Largest percentage a promotion can carry.
pub const MAX_PERCENT: u8 = 100;

/// Largest journal record payload, in bytes. A longer length prefix is read
/// as a torn record.
pub const MAX_JOURNAL_RECORD_LEN: usize = 16 * 1024 * 1024;
