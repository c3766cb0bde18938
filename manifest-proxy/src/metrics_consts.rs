pub const MANIFEST_READS_COUNTER: &str = "manifest_reads_total";
pub const FLAG_READS_COUNTER: &str = "manifest_flag_reads_total";
pub const FLAGS_CREATED_COUNTER: &str = "manifest_flags_created_total";
pub const FLAGS_UPDATED_COUNTER: &str = "manifest_flags_updated_total";
pub const FLAGS_DELETED_COUNTER: &str = "manifest_flags_deleted_total";
pub const FLAG_REQUEST_ERROR_COUNTER: &str = "manifest_request_error_total";
