/// Process-wide tuning, loaded once at the composition root and threaded
/// through as shared, read-only configuration. Never a package-level singleton.
#[derive(Debug, Clone)]
pub struct PlatformSettings {
    pub ais_max_page_size: u32,
    pub ais_default_page_size: u32,

    pub bulk_max_file_size_bytes: u64,
    pub bulk_status_polls_to_complete: u32,

    pub fx_quote_ttl_seconds: i64,
    pub fx_rate_scale: u32,

    pub idempotency_default_ttl_seconds: i64,

    pub rate_limit_ais_rpm: u32,
    pub rate_limit_general_rpm: u32,
    pub rate_limit_burst_pct: u32,
    pub rate_limit_max_concurrent_bulk_per_participant: u32,

    pub security_dpop_replay_window_seconds: i64,
    pub security_header_skew_seconds: i64,
    pub security_jwks_cache_ttl_seconds: i64,
    pub security_par_ttl_seconds: i64,

    pub saga_timeout_monitor_interval_seconds: u64,
    pub saga_max_transient_retries: u32,
    pub saga_retry_backoff_cap_seconds: u64,

    pub snapshot_event_interval: u32,
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            ais_max_page_size: 200,
            ais_default_page_size: 50,

            bulk_max_file_size_bytes: 5_000_000,
            bulk_status_polls_to_complete: 3,

            fx_quote_ttl_seconds: 120,
            fx_rate_scale: 6,

            idempotency_default_ttl_seconds: 86_400,

            rate_limit_ais_rpm: 500,
            rate_limit_general_rpm: 1_000,
            rate_limit_burst_pct: 10,
            rate_limit_max_concurrent_bulk_per_participant: 10,

            security_dpop_replay_window_seconds: 300,
            security_header_skew_seconds: 60,
            security_jwks_cache_ttl_seconds: 300,
            security_par_ttl_seconds: 60,

            saga_timeout_monitor_interval_seconds: 15,
            saga_max_transient_retries: 3,
            saga_retry_backoff_cap_seconds: 30,

            snapshot_event_interval: 100,
        }
    }
}
