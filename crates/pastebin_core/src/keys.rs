//! Key layout inside the shared key-value namespace.
//!
//! | key                   | value                       |
//! |-----------------------|-----------------------------|
//! | `bin:record:{id}`     | JSON bin record             |
//! | `bin:alias:{alias}`   | id of the bin holding alias |
//! | `bin:clicks:{id}`     | click counter               |
//! | `user:email:{email}`  | JSON user record            |

pub const BIN_RECORD_PREFIX: &str = "bin:record:";
pub const BIN_ALIAS_PREFIX: &str = "bin:alias:";
pub const BIN_CLICKS_PREFIX: &str = "bin:clicks:";

/// Every user key lives under this prefix; bulk user removal is scoped to it.
pub const USER_PREFIX: &str = "user:";
pub const USER_EMAIL_PREFIX: &str = "user:email:";

pub fn bin_record(id: &str) -> String {
    format!("{BIN_RECORD_PREFIX}{id}")
}

pub fn bin_alias(alias: &str) -> String {
    format!("{BIN_ALIAS_PREFIX}{alias}")
}

pub fn bin_clicks(id: &str) -> String {
    format!("{BIN_CLICKS_PREFIX}{id}")
}

pub fn user_email(email: &str) -> String {
    format!("{USER_EMAIL_PREFIX}{email}")
}
