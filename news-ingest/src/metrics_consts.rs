pub const ENVELOPES_RECEIVED: &str = "news_ingest_envelopes_received";
pub const ENVELOPE_PARSE_ERROR: &str = "news_ingest_envelope_parse_error";
pub const EMPTY_PAYLOADS: &str = "news_ingest_empty_payloads";
pub const RECORDS_PER_ENVELOPE: &str = "news_ingest_records_per_envelope";
pub const RECORDS_SEEN: &str = "news_ingest_records_seen";
pub const DUPLICATES_IN_BATCH: &str = "news_ingest_duplicates_in_batch";
pub const FORCED_SMALL_BATCH: &str = "news_ingest_forced_small_batch";
pub const BATCH_ACQUIRE_TIME: &str = "news_ingest_batch_acquire_time_ms";
pub const RECORDS_PUBLISHED: &str = "news_ingest_records_published";
pub const PUBLISH_BATCH_SIZE: &str = "news_ingest_publish_batch_size";
pub const BATCHES_MERGED: &str = "news_ingest_batches_merged";
pub const ROWS_MERGED: &str = "news_ingest_rows_merged";
pub const MERGE_BATCH_TIME: &str = "news_ingest_merge_batch_time_ms";
pub const MERGE_STEP_FAILED: &str = "news_ingest_merge_step_failed";
pub const BATCHES_FAILED: &str = "news_ingest_batches_failed";
pub const OFFSET_STORE_FAILED: &str = "news_ingest_offset_store_failed";
