pub mod csrf {

    pub const COOKIE_NAME: &str = "XSRF-TOKEN";

    pub const HEADER_NAME: &str = "X-XSRF-TOKEN";
}

pub mod limits {

    pub const DEFAULT_PAGE_SIZE: u64 = 20;

    pub const MAX_PAGE_SIZE: u64 = 100;
}

/// Label used when a client address cannot be determined.
pub const UNKNOWN_CLIENT: &str = "unknown";
