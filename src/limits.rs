/// Longest stay a search may ask about.
pub const MAX_STAY_NIGHTS: u32 = 730;

/// Combined size of a lodge's blocked and booked lists after a toggle.
pub const MAX_DATES_PER_LODGE: usize = 10_000;

pub const MAX_NAME_LEN: usize = 256;
