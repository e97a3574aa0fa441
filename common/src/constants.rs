pub const MAX_FILENAME_LEN: usize = 1024;
// Room for "_" and a u64 index.
pub const MAX_FRAGMENT_NAME_LEN: usize = MAX_FILENAME_LEN + 21;
// Longest on-disk fragment file name before falling back to a hash.
pub const MAX_ENCODED_NAME_LEN: usize = 200;

pub const FRAGMENT_DIR_NAME: &str = "fragments";
pub const TMP_DIR_NAME: &str = "tmp";

pub const FILE_KEY_PREFIX: &str = "file";
pub const SHARD_KEY_PREFIX: &str = "shard";
pub const SHARD_ADDR_KEY_PREFIX: &str = "shard_addr";
pub const SHARD_SEQ_KEY: &str = "seq:shard";

pub const FILENAME_PARAM: &str = "filename";

pub const FILE_STATE_HEADER: &str = "x-file-state";
pub const FRAGMENT_COUNT_HEADER: &str = "x-fragment-count";
pub const EPOCH_HEADER: &str = "x-epoch";
