//! Default value functions referenced by serde attributes.

pub fn default_port() -> u16 {
    3545
}

pub fn default_lock_timeout_ms() -> u64 {
    2_000
}

pub fn default_event_buffer_size() -> usize {
    128
}

pub fn default_max_sessions() -> usize {
    1_024
}

pub fn default_cors_origins() -> String {
    "*".to_string()
}

pub fn default_voice_token_ttl_secs() -> u64 {
    120
}

pub fn default_log_dir() -> String {
    "logs".to_string()
}

pub fn default_log_filename() -> String {
    "server.log".to_string()
}
