use chrono::{DateTime, Utc};

/// server-style timestamp for records created in process
pub fn now() -> DateTime<Utc> {
    Utc::now()
}
